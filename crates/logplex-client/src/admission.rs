// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Bounded pool of delivery slots.
//!
//! The pool is a counting semaphore pre-filled with `capacity` permits.
//! Acquisition never waits: a flush attempt that finds the pool empty drops
//! its batch instead of queueing. A token returns its permit when dropped,
//! so every exit path of a delivery task gives the slot back.

use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore, TryAcquireError};
use tracing::trace;

#[derive(Debug)]
pub(crate) struct AdmissionPool {
    permits: Arc<Semaphore>,
    capacity: usize,
}

/// Permission to run one delivery. Held by exactly one task.
#[derive(Debug)]
pub(crate) struct AdmissionToken {
    _permit: OwnedSemaphorePermit,
}

impl AdmissionPool {
    pub(crate) fn new(capacity: usize) -> Self {
        AdmissionPool {
            permits: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    /// Takes a token if one is free. Never blocks.
    pub(crate) fn try_acquire(&self) -> Option<AdmissionToken> {
        match Arc::clone(&self.permits).try_acquire_owned() {
            Ok(permit) => Some(AdmissionToken { _permit: permit }),
            Err(TryAcquireError::NoPermits) => None,
            Err(TryAcquireError::Closed) => {
                trace!("LOGPLEX | Admission pool closed, refusing token");
                None
            }
        }
    }

    /// Tokens currently held by delivery tasks.
    pub(crate) fn in_circulation(&self) -> usize {
        self.capacity
            .saturating_sub(self.permits.available_permits())
    }

    pub(crate) fn capacity(&self) -> usize {
        self.capacity
    }

    /// Refuses every later acquisition. Outstanding tokens may still be
    /// returned.
    pub(crate) fn close(&self) {
        self.permits.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_pool_starts_full() {
        let pool = AdmissionPool::new(3);
        assert_eq!(pool.capacity(), 3);
        assert_eq!(pool.in_circulation(), 0);
    }

    #[test]
    fn test_acquire_until_exhausted() {
        let pool = AdmissionPool::new(2);
        let first = pool.try_acquire();
        let second = pool.try_acquire();
        assert!(first.is_some());
        assert!(second.is_some());
        assert!(pool.try_acquire().is_none());
        assert_eq!(pool.in_circulation(), 2);

        drop(first);
        assert_eq!(pool.in_circulation(), 1);
        assert!(pool.try_acquire().is_some());
    }

    #[test]
    fn test_closed_pool_refuses_tokens() {
        let pool = AdmissionPool::new(1);
        let held = pool.try_acquire();
        pool.close();
        assert!(pool.try_acquire().is_none());
        drop(held);
        assert!(pool.try_acquire().is_none());
    }

    proptest! {
        #[test]
        fn tokens_never_exceed_capacity(
            capacity in 1usize..8,
            threads in 1usize..8,
            rounds in 1usize..200,
        ) {
            let pool = Arc::new(AdmissionPool::new(capacity));
            let held = Arc::new(AtomicUsize::new(0));
            let peak = Arc::new(AtomicUsize::new(0));

            let workers: Vec<_> = (0..threads)
                .map(|_| {
                    let pool = Arc::clone(&pool);
                    let held = Arc::clone(&held);
                    let peak = Arc::clone(&peak);
                    std::thread::spawn(move || {
                        for _ in 0..rounds {
                            if let Some(token) = pool.try_acquire() {
                                let now = held.fetch_add(1, Ordering::SeqCst) + 1;
                                peak.fetch_max(now, Ordering::SeqCst);
                                assert!(pool.in_circulation() <= capacity);
                                std::thread::yield_now();
                                held.fetch_sub(1, Ordering::SeqCst);
                                drop(token);
                            }
                        }
                    })
                })
                .collect();
            for worker in workers {
                worker.join().unwrap();
            }

            prop_assert!(peak.load(Ordering::SeqCst) <= capacity);
            prop_assert_eq!(pool.in_circulation(), 0);
        }
    }
}
