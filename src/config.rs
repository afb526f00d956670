//! Scheduler configuration.

use crate::error::{Error, Result};
use crate::time::VirtualTime;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default time step when simulating the passage of time.
///
/// Much finer than any scheduling interval used by the client library, so
/// tasks scheduled relative to one another during a drain are not skipped
/// over in a single jump.
pub const DEFAULT_STEP: Duration = Duration::from_millis(10);

/// Scheduler settings.
///
/// # Example
///
/// ```json
/// {
///   "defaultStepMs": 5,
///   "initialTimeMs": 1000
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Step used by `advance_time` when the caller gives none. Must be > 0.
    #[serde(alias = "defaultStepMs")]
    pub default_step_ms: u64,
    /// Virtual time the clock reads when the scheduler is created.
    #[serde(alias = "initialTimeMs")]
    pub initial_time_ms: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            default_step_ms: 10,
            initial_time_ms: 0,
        }
    }
}

impl SchedulerConfig {
    /// Parse and validate a JSON document.
    pub fn from_json(input: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(input)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the scheduler cannot honour.
    pub fn validate(&self) -> Result<()> {
        if self.default_step_ms == 0 {
            return Err(Error::config("default_step_ms must be greater than 0"));
        }
        Ok(())
    }

    /// The default advancement step.
    #[must_use]
    pub const fn default_step(&self) -> Duration {
        Duration::from_millis(self.default_step_ms)
    }

    /// The initial clock reading.
    #[must_use]
    pub const fn initial_time(&self) -> VirtualTime {
        VirtualTime::from_millis(self.initial_time_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_default_step() {
        let config = SchedulerConfig::default();
        assert_eq!(config.default_step(), DEFAULT_STEP);
        assert_eq!(config.initial_time(), VirtualTime::ZERO);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn parses_camel_case_aliases() {
        let config =
            SchedulerConfig::from_json(r#"{"defaultStepMs": 5, "initialTimeMs": 1000}"#).unwrap();
        assert_eq!(config.default_step(), Duration::from_millis(5));
        assert_eq!(config.initial_time(), VirtualTime::from_millis(1000));
    }

    #[test]
    fn parses_snake_case_and_fills_defaults() {
        let config = SchedulerConfig::from_json(r#"{"initial_time_ms": 7}"#).unwrap();
        assert_eq!(config.default_step_ms, 10);
        assert_eq!(config.initial_time_ms, 7);

        let empty = SchedulerConfig::from_json("{}").unwrap();
        assert_eq!(empty, SchedulerConfig::default());
    }

    #[test]
    fn zero_step_is_rejected() {
        let err = SchedulerConfig::from_json(r#"{"default_step_ms": 0}"#).unwrap_err();
        assert!(matches!(err, Error::Config(_)), "{err}");
    }

    #[test]
    fn malformed_json_is_reported() {
        let err = SchedulerConfig::from_json("{not json").unwrap_err();
        assert!(matches!(err, Error::Json(_)), "{err}");
    }

    #[test]
    fn serializes_with_snake_case_keys() {
        let json = serde_json::to_value(SchedulerConfig::default()).unwrap();
        assert_eq!(json["default_step_ms"], 10);
        assert_eq!(json["initial_time_ms"], 0);
    }
}
