// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Shutdown coordination for background tasks.
//!
//! Every background task runs on a [`TaskTracker`], so closing can wait for
//! all of them. A single [`CancellationToken`] is the only cancellation
//! signal; it is level-triggered and seen by every waiter at once.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::task_tracker::TaskTrackerToken;
use tokio_util::task::TaskTracker;

use crate::errors::Creation;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    Running,
    /// Shutdown was signalled; background tasks may still be finishing.
    Closing,
    Closed,
}

#[derive(Debug)]
pub(crate) struct Lifecycle {
    runtime: Handle,
    tracker: TaskTracker,
    shutdown: CancellationToken,
    closed: AtomicBool,
}

impl Lifecycle {
    /// Binds to the current Tokio runtime.
    pub(crate) fn new() -> Result<Self, Creation> {
        let runtime = Handle::try_current().map_err(|e| Creation::Runtime(e.to_string()))?;
        Ok(Lifecycle {
            runtime,
            tracker: TaskTracker::new(),
            shutdown: CancellationToken::new(),
            closed: AtomicBool::new(false),
        })
    }

    pub(crate) fn state(&self) -> ClientState {
        if !self.shutdown.is_cancelled() {
            ClientState::Running
        } else if self.closed.load(Ordering::SeqCst) {
            ClientState::Closed
        } else {
            ClientState::Closing
        }
    }

    pub(crate) fn is_shutting_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Registers work with the tracker without spawning.
    ///
    /// Callers check [`Lifecycle::is_shutting_down`] only after taking the
    /// token: either close sees the token and waits for it, or the caller
    /// sees the shutdown.
    pub(crate) fn register(&self) -> TaskTrackerToken {
        self.tracker.token()
    }

    pub(crate) fn spawn<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.tracker.spawn_on(task, &self.runtime);
    }

    /// A handle on the shutdown signal that does not keep the lifecycle alive.
    pub(crate) fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub(crate) fn signal_shutdown(&self) {
        self.tracker.close();
        self.shutdown.cancel();
    }

    /// Waits for every tracked task, then marks the lifecycle closed.
    pub(crate) async fn wait(&self) {
        self.tracker.wait().await;
        self.closed.store(true, Ordering::SeqCst);
    }

    pub(crate) fn tracked(&self) -> usize {
        self.tracker.len()
    }
}
