// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

use std::env;
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    time::{interval, Duration},
};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use logplex_client::{logplex::LogplexConfig, Client, ClientConfig, Stats};

const DEFAULT_STATS_INTERVAL_SECS: u64 = 10;
const DEFAULT_HOST: &str = "localhost";
const DEFAULT_PROC_ID: &str = "shipper";

#[tokio::main]
pub async fn main() {
    let log_level = env::var("LOGPLEX_LOG_LEVEL")
        .map(|val| val.to_lowercase())
        .unwrap_or("info".to_string());

    let env_filter = format!("h2=off,hyper=off,rustls=off,{}", log_level);

    #[allow(clippy::expect_used)]
    let subscriber = tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_new(env_filter).expect("could not parse log level in configuration"),
        )
        .with_level(true)
        .with_thread_names(false)
        .with_thread_ids(false)
        .with_line_number(false)
        .with_file(false)
        .with_target(true)
        .with_writer(std::io::stderr)
        .finish();

    #[allow(clippy::expect_used)]
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    debug!("Logging subsystem enabled");

    let client_config = match ClientConfig::from_env() {
        Ok(c) => c,
        Err(e) => {
            error!("Error reading client configuration: {e}");
            return;
        }
    };
    let logplex_config = match LogplexConfig::from_env() {
        Ok(c) => c,
        Err(e) => {
            error!("Error reading Logplex configuration: {e}");
            return;
        }
    };

    let host = env::var("LOGPLEX_HOST").unwrap_or_else(|_| DEFAULT_HOST.to_string());
    let proc_id = env::var("LOGPLEX_PROC_ID").unwrap_or_else(|_| DEFAULT_PROC_ID.to_string());
    let stats_interval = env::var("LOGPLEX_STATS_INTERVAL_SECS")
        .ok()
        .and_then(|secs| secs.parse::<u64>().ok())
        .unwrap_or(DEFAULT_STATS_INTERVAL_SECS);

    let client = match Client::logplex(&client_config, logplex_config) {
        Ok(client) => client,
        Err(e) => {
            error!("Error starting Logplex client: {e}");
            return;
        }
    };
    info!("Shipping stdin to Logplex as {host} {proc_id}");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stats_ticker = interval(Duration::from_secs(stats_interval.max(1)));
    stats_ticker.tick().await; // discard first tick, which is instantaneous

    loop {
        tokio::select! {
            line = lines.next_line() => match line {
                Ok(Some(line)) => {
                    if let Err(e) = client
                        .buffer_message(chrono::Utc::now(), &host, &proc_id, line.as_bytes())
                        .await
                    {
                        warn!("Dropping line: {e}");
                        break;
                    }
                }
                Ok(None) => {
                    debug!("Reached end of input");
                    break;
                }
                Err(e) => {
                    error!("Error reading stdin: {e}");
                    break;
                }
            },
            _ = stats_ticker.tick() => log_stats("Statistics", &client.statistics()),
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, shutting down");
                break;
            }
        }
    }

    client.flush().await;
    client.close().await;
    log_stats("Final statistics", &client.statistics());
}

fn log_stats(label: &str, stats: &Stats) {
    info!(
        "{label}: total={} successful={} rejected={} cancelled={} dropped={} requests={} in_flight={}",
        stats.total.messages,
        stats.successful.messages,
        stats.rejected.messages,
        stats.cancelled.messages,
        stats.dropped.messages,
        stats.total.requests,
        stats.concurrency,
    );
}
