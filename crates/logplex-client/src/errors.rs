// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

/// Errors raised while constructing a [`crate::Client`]. Nothing is started
/// when one of these is returned.
#[derive(Debug, thiserror::Error)]
pub enum Creation {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("No Tokio runtime to host background tasks: {0}")]
    Runtime(String),

    #[error("Failed to build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),
}

/// Errors surfaced synchronously by [`crate::Client::buffer_message`].
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum BufferError {
    #[error("Failed trying to buffer a message: client already closed")]
    Closed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_creation_display() {
        let error = Creation::InvalidConfig("negative period".to_string());
        assert_eq!(error.to_string(), "Invalid configuration: negative period");
    }

    #[test]
    fn test_closed_display() {
        assert_eq!(
            BufferError::Closed.to_string(),
            "Failed trying to buffer a message: client already closed"
        );
    }
}
