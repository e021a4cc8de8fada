// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The batching client.
//!
//! ```text
//!   buffer_message ──► Transport::buffer_record
//!          │
//!          │ size / immediate trigger        periodic ticker
//!          v                                       │
//!   ┌──────────────┐ <─────────────────────────────┘
//!   │ flush attempt│  swap batch, empty → done
//!   └──────┬───────┘
//!          │ token?
//!     yes  │  no ──► dropped
//!          v
//!   ┌──────────────┐
//!   │   delivery   │  cancelled / rejected / successful
//!   └──────────────┘
//! ```
//!
//! Saturation is shed at flush time: a batch that finds no free delivery
//! slot is dropped, never queued. There are no retries.

use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, trace, warn};

use crate::admission::{AdmissionPool, AdmissionToken};
use crate::config::ClientConfig;
use crate::errors::{BufferError, Creation};
use crate::lifecycle::{ClientState, Lifecycle};
use crate::logplex::{LogplexConfig, LogplexTransport};
use crate::stats::{GaugeGuard, Outcome, Stats, StatsAggregator};
use crate::transport::{Batch, Record, Transport};
use crate::trigger::TimeTrigger;

/// Handle to a running client. Cheap to clone; all clones share one buffer,
/// one delivery pool and one set of statistics.
///
/// Dropping the last handle signals shutdown but does not wait for
/// in-flight deliveries; call [`Client::close`] for that.
#[derive(Clone)]
pub struct Client {
    inner: Arc<Inner>,
}

/// An admitted delivery's hold on the pool. Fields drop in declaration
/// order, so the gauge falls before the token is returned and never reads
/// above capacity.
struct DeliverySlot {
    _in_flight: GaugeGuard,
    _token: AdmissionToken,
}

struct Inner {
    transport: Arc<dyn Transport>,
    request_size_trigger: usize,
    time_trigger: TimeTrigger,
    success_status: StatusCode,
    admission: AdmissionPool,
    stats: StatsAggregator,
    lifecycle: Lifecycle,
}

impl Client {
    /// Starts a client on the current Tokio runtime.
    ///
    /// Fails without starting anything when the configuration is invalid or
    /// no runtime is available. A periodic ticker is spawned only for
    /// [`TimeTrigger::Periodic`].
    pub fn new(config: &ClientConfig, transport: Arc<dyn Transport>) -> Result<Self, Creation> {
        config.validate()?;
        let time_trigger = config.resolve_time_trigger()?;
        let lifecycle = Lifecycle::new()?;

        let inner = Arc::new(Inner {
            transport,
            request_size_trigger: config.request_size_trigger,
            time_trigger,
            success_status: config.success_status,
            admission: AdmissionPool::new(config.concurrency),
            stats: StatsAggregator::default(),
            lifecycle,
        });

        if let Some(period) = time_trigger.period() {
            Inner::spawn_ticker(&inner, period);
        }

        debug!(
            "LOGPLEX | Client started: concurrency={}, size trigger={}B, time trigger={:?}",
            inner.admission.capacity(),
            inner.request_size_trigger,
            inner.time_trigger
        );

        Ok(Client { inner })
    }

    /// Starts a client that ships to a Logplex drain.
    pub fn logplex(config: &ClientConfig, logplex: LogplexConfig) -> Result<Self, Creation> {
        let transport = LogplexTransport::new(logplex)?;
        Self::new(config, Arc::new(transport))
    }

    /// Frames one record and, if a trigger fires, makes a flush attempt.
    ///
    /// Never waits on the network: a flush attempt either hands the batch
    /// to a delivery task or drops it.
    pub async fn buffer_message(
        &self,
        when: DateTime<Utc>,
        host: &str,
        proc_id: &str,
        log: &[u8],
    ) -> Result<(), BufferError> {
        if self.inner.lifecycle.is_shutting_down() {
            return Err(BufferError::Closed);
        }

        let buffered = self.inner.transport.buffer_record(&Record {
            timestamp: when,
            host,
            proc_id,
            payload: log,
        });

        if self
            .inner
            .time_trigger
            .fires_after_buffer(buffered, self.inner.request_size_trigger)
        {
            Inner::flush(&self.inner).await;
        }

        Ok(())
    }

    /// Makes one flush attempt now, outside the configured triggers. Subject
    /// to the same admit-or-drop decision as any other attempt.
    pub async fn flush(&self) {
        Inner::flush(&self.inner).await;
    }

    #[must_use]
    pub fn statistics(&self) -> Stats {
        self.inner.stats.snapshot()
    }

    #[must_use]
    pub fn state(&self) -> ClientState {
        self.inner.lifecycle.state()
    }

    /// Stops the ticker, refuses new records and waits for every background
    /// task, including in-flight deliveries, to finish.
    ///
    /// Records still sitting in the buffer are discarded unaccounted. Calling
    /// this again only waits for the same tasks.
    pub async fn close(&self) {
        let lifecycle = &self.inner.lifecycle;
        if lifecycle.is_shutting_down() {
            debug!("LOGPLEX | Close already in progress, waiting for it");
        } else {
            info!(
                "LOGPLEX | Closing client with {} deliveries in flight",
                self.inner.admission.in_circulation()
            );
        }

        lifecycle.signal_shutdown();
        self.inner.admission.close();
        debug!(
            "LOGPLEX | Waiting for {} background tasks",
            lifecycle.tracked()
        );
        lifecycle.wait().await;

        debug!("LOGPLEX | Client closed: {:?}", self.inner.stats.snapshot());
    }
}

impl Inner {
    /// The ticker holds only a weak reference, so dropping every handle
    /// without closing still lets it exit.
    fn spawn_ticker(inner: &Arc<Self>, period: Duration) {
        let weak = Arc::downgrade(inner);
        let shutdown = inner.lifecycle.shutdown_token();
        inner.lifecycle.spawn(async move {
            // The first tick of a plain interval fires at once; start one
            // period out instead.
            let mut interval = interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = interval.tick() => {}
                    () = shutdown.cancelled() => break,
                }
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                Inner::flush(&inner).await;
            }
            trace!("LOGPLEX | Periodic flush stopped");
        });
    }

    /// One flush attempt: swap the batch out, then admit or drop it.
    async fn flush(inner: &Arc<Self>) {
        let _flushing = inner.stats.track_flush();

        let _registration = inner.lifecycle.register();
        if inner.lifecycle.is_shutting_down() {
            return;
        }

        let batch = inner.transport.swap_batch();
        if batch.is_empty() {
            return;
        }

        match inner.admission.try_acquire() {
            Some(token) => {
                let slot = DeliverySlot {
                    _in_flight: inner.stats.track_delivery(),
                    _token: token,
                };
                let worker = Arc::clone(inner);
                inner
                    .lifecycle
                    .spawn(async move { worker.deliver(batch, slot).await });
            }
            None => {
                debug!(
                    "LOGPLEX | No delivery slot free, dropping {} messages",
                    batch.framed()
                );
                inner.stats.record(Outcome::Dropped, batch.framed());

                // Keep a hot buffering loop from starving delivery tasks of
                // the turn they need to hand their tokens back.
                tokio::task::yield_now().await;
            }
        }
    }

    /// Runs one admitted delivery. The slot is released on every exit path.
    async fn deliver(&self, batch: Batch, _slot: DeliverySlot) {
        let result = self.transport.deliver(&batch).await;
        let outcome = Outcome::classify(&result, self.success_status);
        match &result {
            Err(e) => warn!(
                "LOGPLEX | Delivery of {} messages cancelled: {}",
                batch.framed(),
                e
            ),
            Ok(status) if outcome == Outcome::Rejected => warn!(
                "LOGPLEX | Delivery of {} messages rejected with {}",
                batch.framed(),
                status
            ),
            Ok(_) => trace!("LOGPLEX | Delivered {} messages", batch.framed()),
        }

        self.stats.record(outcome, batch.framed());
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.lifecycle.signal_shutdown();
        self.admission.close();
    }
}
