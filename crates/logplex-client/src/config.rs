// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use reqwest::StatusCode;
use std::env;
use tracing::debug;

use crate::errors::Creation;
use crate::trigger::{TimeTrigger, TimeTriggerBehavior};

const DEFAULT_REQUEST_SIZE_TRIGGER: usize = 100 * 1024;
const DEFAULT_CONCURRENCY: usize = 3;
const DEFAULT_PERIOD_MS: i64 = 250;

/// Delivery scheduling knobs for a [`crate::Client`].
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Buffered bytes at which a flush is attempted right after buffering.
    pub request_size_trigger: usize,
    /// Maximum number of deliveries in flight.
    pub concurrency: usize,
    /// Flush period in milliseconds when `time_trigger` is `Periodic`.
    /// Zero means flush after every record; negative is rejected.
    pub period_ms: i64,
    pub time_trigger: TimeTriggerBehavior,
    /// The one status that counts a delivery as successful.
    pub success_status: StatusCode,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            request_size_trigger: DEFAULT_REQUEST_SIZE_TRIGGER,
            concurrency: DEFAULT_CONCURRENCY,
            period_ms: DEFAULT_PERIOD_MS,
            time_trigger: TimeTriggerBehavior::Periodic,
            success_status: StatusCode::NO_CONTENT,
        }
    }
}

impl ClientConfig {
    /// Create configuration from environment variables, falling back to the
    /// defaults for anything unset.
    pub fn from_env() -> Result<Self, Creation> {
        let defaults = Self::default();

        let request_size_trigger = parse_var(
            "LOGPLEX_REQUEST_SIZE_TRIGGER",
            defaults.request_size_trigger,
        )?;
        let concurrency = parse_var("LOGPLEX_CONCURRENCY", defaults.concurrency)?;
        let period_ms = parse_var("LOGPLEX_PERIOD_MS", defaults.period_ms)?;
        let time_trigger = match env::var("LOGPLEX_TIME_TRIGGER") {
            Ok(val) => val.parse().map_err(Creation::InvalidConfig)?,
            Err(_) => defaults.time_trigger,
        };

        let config = Self {
            request_size_trigger,
            concurrency,
            period_ms,
            time_trigger,
            success_status: defaults.success_status,
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), Creation> {
        if self.concurrency == 0 {
            return Err(Creation::InvalidConfig(
                "concurrency must be greater than 0".to_string(),
            ));
        }

        self.resolve_time_trigger()?;
        Ok(())
    }

    pub(crate) fn resolve_time_trigger(&self) -> Result<TimeTrigger, Creation> {
        TimeTrigger::resolve(self.time_trigger, self.period_ms)
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, default: T) -> Result<T, Creation> {
    match env::var(name) {
        Ok(val) => val.trim().parse::<T>().map_err(|_| {
            Creation::InvalidConfig(format!("{name} has an invalid value '{val}'"))
        }),
        Err(_) => {
            debug!("LOGPLEX | {name} not set, using default");
            Ok(default)
        }
    }
}
