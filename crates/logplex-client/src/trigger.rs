// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! When to consider flushing.
//!
//! Two independent triggers feed flush attempts:
//! - **size**: after buffering, when the buffered volume reaches the
//!   configured threshold. Always active.
//! - **time**: one of [`TimeTrigger::Periodic`], [`TimeTrigger::Immediate`]
//!   or [`TimeTrigger::Never`], fixed at construction.

use serde::{Deserialize, Deserializer};
use std::str::FromStr;
use std::time::Duration;

use crate::errors::Creation;

/// Requested time-trigger behavior, before the period is applied.
///
/// `Periodic` is the default so that a configuration only needs a period.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TimeTriggerBehavior {
    #[default]
    Periodic,
    Immediate,
    Never,
}

impl FromStr for TimeTriggerBehavior {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "periodic" | "periodically" => Ok(TimeTriggerBehavior::Periodic),
            "immediate" | "immediately" => Ok(TimeTriggerBehavior::Immediate),
            "never" => Ok(TimeTriggerBehavior::Never),
            other => Err(format!(
                "Invalid time trigger '{other}'. Must be one of: periodic, immediate, never"
            )),
        }
    }
}

impl<'de> Deserialize<'de> for TimeTriggerBehavior {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = String::deserialize(deserializer)?;
        value.parse().map_err(serde::de::Error::custom)
    }
}

/// Resolved time-trigger policy.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TimeTrigger {
    /// Flush once per elapsed period. The period is never zero.
    Periodic(Duration),
    /// Flush after every buffered record.
    Immediate,
    /// Only the size trigger flushes.
    Never,
}

impl TimeTrigger {
    /// Resolves the configured behavior and period (milliseconds).
    ///
    /// A zero period under `Periodic` becomes `Immediate`; a negative period
    /// is rejected. The period is ignored for the other behaviors.
    pub fn resolve(behavior: TimeTriggerBehavior, period_ms: i64) -> Result<Self, Creation> {
        match behavior {
            TimeTriggerBehavior::Periodic => match u64::try_from(period_ms) {
                Err(_) => Err(Creation::InvalidConfig(format!(
                    "negative flush period not allowed: {period_ms}ms"
                ))),
                Ok(0) => Ok(TimeTrigger::Immediate),
                Ok(ms) => Ok(TimeTrigger::Periodic(Duration::from_millis(ms))),
            },
            TimeTriggerBehavior::Immediate => Ok(TimeTrigger::Immediate),
            TimeTriggerBehavior::Never => Ok(TimeTrigger::Never),
        }
    }

    /// The timer period, if this policy needs a timer at all.
    #[must_use]
    pub fn period(&self) -> Option<Duration> {
        match self {
            TimeTrigger::Periodic(period) => Some(*period),
            TimeTrigger::Immediate | TimeTrigger::Never => None,
        }
    }

    /// Whether buffering a record should be followed by a flush attempt.
    #[must_use]
    pub fn fires_after_buffer(&self, buffered: usize, request_size_trigger: usize) -> bool {
        buffered >= request_size_trigger || matches!(self, TimeTrigger::Immediate)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn resolve_periodic() {
        assert_eq!(
            TimeTrigger::resolve(TimeTriggerBehavior::Periodic, 100).unwrap(),
            TimeTrigger::Periodic(Duration::from_millis(100))
        );
    }

    #[test]
    fn resolve_zero_period_is_immediate() {
        assert_eq!(
            TimeTrigger::resolve(TimeTriggerBehavior::Periodic, 0).unwrap(),
            TimeTrigger::Immediate
        );
    }

    #[test]
    fn resolve_negative_period_fails() {
        let err = TimeTrigger::resolve(TimeTriggerBehavior::Periodic, -1).unwrap_err();
        assert!(matches!(err, Creation::InvalidConfig(_)));
    }

    #[test]
    fn resolve_ignores_period_for_other_behaviors() {
        assert_eq!(
            TimeTrigger::resolve(TimeTriggerBehavior::Never, -5).unwrap(),
            TimeTrigger::Never
        );
        assert_eq!(
            TimeTrigger::resolve(TimeTriggerBehavior::Immediate, 1000).unwrap(),
            TimeTrigger::Immediate
        );
    }

    #[test]
    fn period_only_for_periodic() {
        assert_eq!(
            TimeTrigger::Periodic(Duration::from_secs(1)).period(),
            Some(Duration::from_secs(1))
        );
        assert_eq!(TimeTrigger::Immediate.period(), None);
        assert_eq!(TimeTrigger::Never.period(), None);
    }

    #[test]
    fn size_trigger_is_always_active() {
        let never = TimeTrigger::Never;
        assert!(!never.fires_after_buffer(99, 100));
        assert!(never.fires_after_buffer(100, 100));
        assert!(never.fires_after_buffer(101, 100));

        let periodic = TimeTrigger::Periodic(Duration::from_secs(1));
        assert!(!periodic.fires_after_buffer(1, 100));
        assert!(periodic.fires_after_buffer(100, 100));
    }

    #[test]
    fn immediate_fires_on_every_record() {
        assert!(TimeTrigger::Immediate.fires_after_buffer(1, 100));
    }

    #[test]
    fn parse_behavior() {
        assert_eq!(
            "never".parse::<TimeTriggerBehavior>().unwrap(),
            TimeTriggerBehavior::Never
        );
        assert_eq!(
            " Immediate ".parse::<TimeTriggerBehavior>().unwrap(),
            TimeTriggerBehavior::Immediate
        );
        assert!("sometimes".parse::<TimeTriggerBehavior>().is_err());
    }

    #[test]
    fn deserialize_behavior() {
        let behavior: TimeTriggerBehavior = serde_json::from_str("\"periodic\"").unwrap();
        assert_eq!(behavior, TimeTriggerBehavior::Periodic);

        let err = serde_json::from_str::<TimeTriggerBehavior>("\"hourly\"");
        assert!(err.is_err());
    }
}
