// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The collaborator seam between the delivery core and the wire.
//!
//! A [`Transport`] owns the shared frame buffer and the HTTP exchange. The
//! core never looks inside a [`Batch`]; it only needs the framed count for
//! accounting and the status code of a delivery for classification.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::StatusCode;

/// One log record as handed to [`crate::Client::buffer_message`].
#[derive(Debug, Clone, Copy)]
pub struct Record<'a> {
    pub timestamp: DateTime<Utc>,
    pub host: &'a str,
    pub proc_id: &'a str,
    pub payload: &'a [u8],
}

/// Buffered records detached from the live buffer by a swap.
///
/// A batch is owned by exactly one delivery task once admitted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Batch {
    framed: u64,
    data: Vec<u8>,
}

impl Batch {
    #[must_use]
    pub fn new(framed: u64, data: Vec<u8>) -> Self {
        Batch { framed, data }
    }

    /// Number of records framed into this batch.
    #[must_use]
    pub fn framed(&self) -> u64 {
        self.framed
    }

    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.framed == 0
    }
}

/// A delivery that produced no usable response.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("{0}")]
    Other(String),
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// Frames one record into the shared buffer and returns the buffered
    /// volume afterwards. Must be safe to call concurrently with
    /// [`Transport::swap_batch`].
    fn buffer_record(&self, record: &Record<'_>) -> usize;

    /// Detaches the pending buffer, leaving an empty one behind. May return
    /// an empty batch.
    fn swap_batch(&self) -> Batch;

    /// Sends a batch to the collector and returns the response status.
    async fn deliver(&self, batch: &Batch) -> Result<StatusCode, TransportError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_batch() {
        let batch = Batch::default();
        assert!(batch.is_empty());
        assert_eq!(batch.framed(), 0);
        assert!(batch.data().is_empty());
    }

    #[test]
    fn test_batch_accessors() {
        let batch = Batch::new(2, b"12 frame-one\n12 frame-two\n".to_vec());
        assert!(!batch.is_empty());
        assert_eq!(batch.framed(), 2);
        assert_eq!(batch.data(), b"12 frame-one\n12 frame-two\n");
    }
}
