// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Delivery accounting.
//!
//! Counters live behind one mutex so a category and the running totals move
//! together. The two gauges are plain atomics: they are touched on every
//! flush attempt and never need to agree with the counters.

use reqwest::StatusCode;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};

use crate::transport::TransportError;

/// Terminal classification of one batch. Every flushed batch ends up in
/// exactly one of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// No admission token was free at flush time.
    Dropped,
    /// The transport gave up without a usable response.
    Cancelled,
    /// The collector answered with something other than the expected status.
    Rejected,
    Successful,
}

impl Outcome {
    /// Classifies a delivery result. Depends only on the shape of the result.
    #[must_use]
    pub fn classify(
        result: &Result<StatusCode, TransportError>,
        success_status: StatusCode,
    ) -> Self {
        match result {
            Err(_) => Outcome::Cancelled,
            Ok(status) if *status == success_status => Outcome::Successful,
            Ok(_) => Outcome::Rejected,
        }
    }
}

/// Message and request counts for one category.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Tally {
    pub messages: u64,
    pub requests: u64,
}

impl Tally {
    fn add(&mut self, framed: u64) {
        self.messages += framed;
        self.requests += 1;
    }
}

/// Point-in-time copy of the client's statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Stats {
    /// Deliveries currently holding an admission token.
    pub concurrency: i64,
    /// Flush attempts currently in progress.
    pub flushing: i64,

    pub total: Tally,
    pub dropped: Tally,
    pub cancelled: Tally,
    pub rejected: Tally,
    pub successful: Tally,
}

impl Stats {
    /// Sum of the four terminal categories. Equals `total` in any snapshot.
    #[must_use]
    pub fn accounted(&self) -> Tally {
        let mut sum = Tally::default();
        for tally in [self.dropped, self.cancelled, self.rejected, self.successful] {
            sum.messages += tally.messages;
            sum.requests += tally.requests;
        }
        sum
    }
}

#[derive(Debug, Default)]
pub(crate) struct StatsAggregator {
    counters: Mutex<Stats>,
    concurrency: Arc<AtomicI64>,
    flushing: Arc<AtomicI64>,
}

impl StatsAggregator {
    pub(crate) fn record(&self, outcome: Outcome, framed: u64) {
        #[allow(clippy::expect_used)]
        let mut counters = self.counters.lock().expect("lock poisoned");
        counters.total.add(framed);
        match outcome {
            Outcome::Dropped => counters.dropped.add(framed),
            Outcome::Cancelled => counters.cancelled.add(framed),
            Outcome::Rejected => counters.rejected.add(framed),
            Outcome::Successful => counters.successful.add(framed),
        }
    }

    pub(crate) fn snapshot(&self) -> Stats {
        let mut stats = {
            #[allow(clippy::expect_used)]
            let counters = self.counters.lock().expect("lock poisoned");
            *counters
        };
        stats.concurrency = self.concurrency.load(Ordering::SeqCst);
        stats.flushing = self.flushing.load(Ordering::SeqCst);
        stats
    }

    /// Counts a flush attempt until the guard drops.
    pub(crate) fn track_flush(&self) -> GaugeGuard {
        GaugeGuard::new(&self.flushing)
    }

    /// Counts an admitted delivery until the guard drops. The guard is owned
    /// so it can move into the delivery task.
    pub(crate) fn track_delivery(&self) -> GaugeGuard {
        GaugeGuard::new(&self.concurrency)
    }
}

#[derive(Debug)]
pub(crate) struct GaugeGuard {
    gauge: Arc<AtomicI64>,
}

impl GaugeGuard {
    fn new(gauge: &Arc<AtomicI64>) -> Self {
        gauge.fetch_add(1, Ordering::SeqCst);
        GaugeGuard {
            gauge: Arc::clone(gauge),
        }
    }
}

impl Drop for GaugeGuard {
    fn drop(&mut self) {
        self.gauge.fetch_sub(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_classify() {
        let success = StatusCode::NO_CONTENT;
        assert_eq!(
            Outcome::classify(&Ok(StatusCode::NO_CONTENT), success),
            Outcome::Successful
        );
        assert_eq!(
            Outcome::classify(&Ok(StatusCode::OK), success),
            Outcome::Rejected
        );
        assert_eq!(
            Outcome::classify(&Ok(StatusCode::INTERNAL_SERVER_ERROR), success),
            Outcome::Rejected
        );
        assert_eq!(
            Outcome::classify(&Err(TransportError::Other("reset".into())), success),
            Outcome::Cancelled
        );
    }

    #[test]
    fn test_classify_is_repeatable() {
        let success = StatusCode::NO_CONTENT;
        let response = Ok(StatusCode::FORBIDDEN);
        assert_eq!(
            Outcome::classify(&response, success),
            Outcome::classify(&response, success)
        );
    }

    #[test]
    fn test_record_updates_category_and_total() {
        let stats = StatsAggregator::default();
        stats.record(Outcome::Successful, 3);
        stats.record(Outcome::Dropped, 2);

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.total, Tally { messages: 5, requests: 2 });
        assert_eq!(snapshot.successful, Tally { messages: 3, requests: 1 });
        assert_eq!(snapshot.dropped, Tally { messages: 2, requests: 1 });
        assert_eq!(snapshot.cancelled, Tally::default());
        assert_eq!(snapshot.rejected, Tally::default());
    }

    #[test]
    fn test_gauge_guards() {
        let stats = StatsAggregator::default();
        {
            let _flush = stats.track_flush();
            let _delivery = stats.track_delivery();
            let snapshot = stats.snapshot();
            assert_eq!(snapshot.flushing, 1);
            assert_eq!(snapshot.concurrency, 1);
        }
        let snapshot = stats.snapshot();
        assert_eq!(snapshot.flushing, 0);
        assert_eq!(snapshot.concurrency, 0);
    }

    #[test]
    fn test_snapshot_is_a_copy() {
        let stats = StatsAggregator::default();
        let before = stats.snapshot();
        stats.record(Outcome::Rejected, 1);
        assert_eq!(before.total, Tally::default());
        assert_eq!(stats.snapshot().rejected.messages, 1);
    }

    fn outcome_strategy() -> impl Strategy<Value = Outcome> {
        prop_oneof![
            Just(Outcome::Dropped),
            Just(Outcome::Cancelled),
            Just(Outcome::Rejected),
            Just(Outcome::Successful),
        ]
    }

    proptest! {
        #[test]
        fn categories_always_sum_to_total(
            updates in prop::collection::vec((outcome_strategy(), 1u64..50), 0..64)
        ) {
            let stats = Arc::new(StatsAggregator::default());
            let halves = updates.split_at(updates.len() / 2);
            let (left, right) = (halves.0.to_vec(), halves.1.to_vec());

            let worker = {
                let stats = Arc::clone(&stats);
                std::thread::spawn(move || {
                    for (outcome, framed) in left {
                        stats.record(outcome, framed);
                    }
                })
            };
            for (outcome, framed) in right {
                stats.record(outcome, framed);
                let snapshot = stats.snapshot();
                prop_assert_eq!(snapshot.accounted(), snapshot.total);
            }
            worker.join().unwrap();

            let snapshot = stats.snapshot();
            prop_assert_eq!(snapshot.accounted(), snapshot.total);
            prop_assert_eq!(snapshot.total.requests, updates.len() as u64);
            prop_assert_eq!(
                snapshot.total.messages,
                updates.iter().map(|(_, framed)| framed).sum::<u64>()
            );
        }
    }
}
