// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Batching, backpressure-aware client for shipping syslog records to Logplex.
//!
//! Records are framed into a shared buffer by a [`transport::Transport`]
//! collaborator. A flush attempt swaps the buffer out and either admits the
//! batch to a bounded pool of delivery tasks or drops it when every slot is
//! busy. Outcomes are only visible through [`stats::Stats`].

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

mod admission;
pub mod client;
pub mod config;
pub mod errors;
pub mod http;
mod lifecycle;
pub mod logplex;
pub mod stats;
pub mod transport;
pub mod trigger;

pub use client::Client;
pub use config::ClientConfig;
pub use lifecycle::ClientState;
pub use stats::{Outcome, Stats, Tally};
pub use transport::{Batch, Record, Transport, TransportError};
pub use trigger::{TimeTrigger, TimeTriggerBehavior};
