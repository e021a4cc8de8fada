// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Logplex framing and HTTP delivery.
//!
//! Records are framed as octet-counted RFC 5424 syslog messages:
//!
//! ```text
//! <len> <prival>1 <timestamp> <host> <token> <procid> - - <payload>
//! ```
//!
//! and posted in batches with `Content-Type: application/logplex-1`.

use async_trait::async_trait;
use chrono::SecondsFormat;
use reqwest::{StatusCode, Url};
use std::env;
use std::io::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, warn};

use crate::errors::Creation;
use crate::http::build_client;
use crate::transport::{Batch, Record, Transport, TransportError};

/// local0.info
pub const DEFAULT_PRIVAL: u8 = 134;

const CONTENT_TYPE: &str = "application/logplex-1";

#[derive(Debug, Clone)]
pub struct LogplexConfig {
    /// Full drain URL, e.g. `https://east.logplex.io/logs`.
    pub url: Url,
    /// Logplex token; also the basic auth password.
    pub token: String,
    /// Per-request timeout. `None` lets a stalled request hold its slot.
    pub timeout: Option<Duration>,
    pub https_proxy: Option<String>,
    pub prival: u8,
}

impl LogplexConfig {
    #[must_use]
    pub fn new(url: Url, token: impl Into<String>) -> Self {
        LogplexConfig {
            url,
            token: token.into(),
            timeout: None,
            https_proxy: None,
            prival: DEFAULT_PRIVAL,
        }
    }

    /// Reads `LOGPLEX_URL`, `LOGPLEX_TOKEN`, `LOGPLEX_TIMEOUT_MS` and
    /// `LOGPLEX_PROXY_HTTPS` (or `HTTPS_PROXY`).
    pub fn from_env() -> Result<Self, Creation> {
        let url = env::var("LOGPLEX_URL")
            .map_err(|_| Creation::InvalidConfig("LOGPLEX_URL is not set".to_string()))?;
        let url = Url::parse(&url)
            .map_err(|e| Creation::InvalidConfig(format!("invalid LOGPLEX_URL '{url}': {e}")))?;
        let token = env::var("LOGPLEX_TOKEN")
            .map_err(|_| Creation::InvalidConfig("LOGPLEX_TOKEN is not set".to_string()))?;
        let timeout = match env::var("LOGPLEX_TIMEOUT_MS") {
            Ok(val) => Some(Duration::from_millis(val.trim().parse().map_err(|_| {
                Creation::InvalidConfig(format!("LOGPLEX_TIMEOUT_MS has an invalid value '{val}'"))
            })?)),
            Err(_) => None,
        };
        let https_proxy = env::var("LOGPLEX_PROXY_HTTPS")
            .or_else(|_| env::var("HTTPS_PROXY"))
            .ok();

        Ok(LogplexConfig {
            url,
            token,
            timeout,
            https_proxy,
            prival: DEFAULT_PRIVAL,
        })
    }
}

#[derive(Debug, Default)]
struct FrameBuffer {
    data: Vec<u8>,
    framed: u64,
}

/// Frame buffer plus HTTP client for one Logplex drain.
#[derive(Debug)]
pub struct LogplexTransport {
    client: reqwest::Client,
    url: Url,
    token: String,
    prival: u8,
    buffer: Mutex<FrameBuffer>,
    frame_id: AtomicU64,
}

impl LogplexTransport {
    pub fn new(config: LogplexConfig) -> Result<Self, Creation> {
        let client = build_client(config.timeout, config.https_proxy.as_deref())?;
        Ok(Self::with_client(config, client))
    }

    /// Uses a caller-provided HTTP client; `config.timeout` and
    /// `config.https_proxy` are then the caller's business.
    #[must_use]
    pub fn with_client(config: LogplexConfig, client: reqwest::Client) -> Self {
        LogplexTransport {
            client,
            url: config.url,
            token: config.token,
            prival: config.prival,
            buffer: Mutex::new(FrameBuffer::default()),
            frame_id: AtomicU64::new(0),
        }
    }
}

/// Appends one octet-counted syslog frame to `out`.
fn frame(out: &mut Vec<u8>, prival: u8, token: &str, record: &Record<'_>) {
    let header = format!(
        "<{prival}>1 {} {} {token} {} - - ",
        record
            .timestamp
            .to_rfc3339_opts(SecondsFormat::Micros, true),
        record.host,
        record.proc_id,
    );
    let len = header.len() + record.payload.len();

    // Writing into a Vec cannot fail.
    let _ = write!(out, "{len} {header}");
    out.extend_from_slice(record.payload);
}

#[async_trait]
impl Transport for LogplexTransport {
    fn buffer_record(&self, record: &Record<'_>) -> usize {
        #[allow(clippy::expect_used)]
        let mut buffer = self.buffer.lock().expect("lock poisoned");
        frame(&mut buffer.data, self.prival, &self.token, record);
        buffer.framed += 1;
        buffer.data.len()
    }

    fn swap_batch(&self) -> Batch {
        #[allow(clippy::expect_used)]
        let mut buffer = self.buffer.lock().expect("lock poisoned");
        let FrameBuffer { data, framed } = std::mem::take(&mut *buffer);
        Batch::new(framed, data)
    }

    async fn deliver(&self, batch: &Batch) -> Result<StatusCode, TransportError> {
        let frame_id = self.frame_id.fetch_add(1, Ordering::Relaxed);
        debug!(
            "LOGPLEX | Posting {} messages ({} bytes), frame {}",
            batch.framed(),
            batch.data().len(),
            frame_id
        );

        let resp = self
            .client
            .post(self.url.clone())
            .basic_auth("token", Some(&self.token))
            .header("Content-Type", CONTENT_TYPE)
            .header("Logplex-Msg-Count", batch.framed())
            .header("Logplex-Frame-Id", frame_id)
            .body(batch.data().to_vec())
            .send()
            .await;

        match resp {
            Ok(resp) => Ok(resp.status()),
            Err(e) => {
                warn!("LOGPLEX | Failed to post frame {}: {}", frame_id, e);
                Err(TransportError::Request(e))
            }
        }
    }
}
