//! Batcher configuration.

use crate::{Error, ErrorContext, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatcherConfig {
    /// How long a window accepts submissions. Zero disables batching.
    #[serde(rename = "timeout_ms", with = "duration_ms", default = "default_timeout")]
    pub timeout: Duration,
}

fn default_timeout() -> Duration {
    Duration::from_millis(10)
}

impl Default for BatcherConfig {
    fn default() -> Self {
        Self {
            timeout: default_timeout(),
        }
    }
}

impl BatcherConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every call runs the work function on its own.
    pub fn disabled() -> Self {
        Self {
            timeout: Duration::ZERO,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn is_batching_enabled(&self) -> bool {
        !self.timeout.is_zero()
    }

    pub fn from_yaml_str(s: &str) -> Result<Self> {
        serde_yaml::from_str(s).map_err(|e| {
            Error::configuration_with_context(
                "invalid batcher config",
                ErrorContext::new()
                    .with_details(e.to_string())
                    .with_source("config.yaml"),
            )
        })
    }

    pub fn from_json_str(s: &str) -> Result<Self> {
        serde_json::from_str(s).map_err(|e| {
            Error::configuration_with_context(
                "invalid batcher config",
                ErrorContext::new()
                    .with_details(e.to_string())
                    .with_source("config.json"),
            )
        })
    }
}

/// Whole milliseconds in `d`, saturating at `u64::MAX`.
pub(crate) fn duration_millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(super::duration_millis(*d))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = BatcherConfig::default();
        assert_eq!(config.timeout, Duration::from_millis(10));
        assert!(config.is_batching_enabled());
    }

    #[test]
    fn test_config_builder() {
        let config = BatcherConfig::new().with_timeout(Duration::from_millis(250));
        assert_eq!(config.timeout, Duration::from_millis(250));
    }

    #[test]
    fn test_disabled() {
        assert!(!BatcherConfig::disabled().is_batching_enabled());
        assert!(!BatcherConfig::new()
            .with_timeout(Duration::ZERO)
            .is_batching_enabled());
    }

    #[test]
    fn test_from_yaml() {
        let config = BatcherConfig::from_yaml_str("timeout_ms: 50\n").unwrap();
        assert_eq!(config.timeout, Duration::from_millis(50));
    }

    #[test]
    fn test_from_json_missing_field_uses_default() {
        let config = BatcherConfig::from_json_str("{}").unwrap();
        assert_eq!(config, BatcherConfig::default());
    }

    #[test]
    fn test_from_json_zero_disables() {
        let config = BatcherConfig::from_json_str(r#"{"timeout_ms": 0}"#).unwrap();
        assert!(!config.is_batching_enabled());
    }

    #[test]
    fn test_invalid_config() {
        let err = BatcherConfig::from_json_str(r#"{"timeout_ms": "soon"}"#).unwrap_err();
        assert!(matches!(err, Error::Configuration { .. }));
        assert_eq!(err.context().source.as_deref(), Some("config.json"));
    }

    #[test]
    fn test_duration_millis_saturates() {
        assert_eq!(duration_millis(Duration::from_millis(1500)), 1500);
        assert_eq!(duration_millis(Duration::MAX), u64::MAX);
    }

    #[test]
    fn test_serialize_huge_timeout_saturates() {
        let config = BatcherConfig::new().with_timeout(Duration::MAX);
        let json = serde_json::to_value(config).unwrap();
        assert_eq!(json, serde_json::json!({ "timeout_ms": u64::MAX }));
    }

    #[test]
    fn test_serialize_roundtrip_field_name() {
        let json = serde_json::to_value(BatcherConfig::new()).unwrap();
        assert_eq!(json, serde_json::json!({ "timeout_ms": 10 }));
    }
}
