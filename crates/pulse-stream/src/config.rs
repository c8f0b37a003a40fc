//! Stream configuration.

use crate::error::{StreamError, StreamResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for a [`UnifiedStream`](crate::UnifiedStream).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamConfig {
    /// Reconnect automatically after a connection ends.
    #[serde(default = "default_reconnect")]
    pub reconnect: bool,
    /// Base delay for exponential backoff.
    #[serde(default = "default_reconnect_interval_ms")]
    pub reconnect_interval_ms: u64,
    /// Upper bound for a single backoff delay.
    #[serde(default = "default_max_reconnect_delay_ms")]
    pub max_reconnect_delay_ms: u64,
    /// Failed attempts before the controller is exhausted (0 = unlimited).
    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,
    /// Ping cadence while connected.
    #[serde(default = "default_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,
    /// Pong deadline for duplex transports.
    #[serde(default = "default_heartbeat_timeout_ms")]
    pub heartbeat_timeout_ms: u64,
    /// Poll cadence while the transport is exhausted.
    #[serde(default = "default_fallback_interval_ms")]
    pub fallback_interval_ms: u64,
    /// Probe the transport on this cadence while polling. Disabled if unset.
    #[serde(default)]
    pub recovery_probe_interval_ms: Option<u64>,
    /// Capacity of the per-update broadcast feed.
    #[serde(default = "default_update_buffer")]
    pub update_buffer: usize,
}

fn default_reconnect() -> bool {
    true
}

fn default_reconnect_interval_ms() -> u64 {
    1_000
}

fn default_max_reconnect_delay_ms() -> u64 {
    30_000
}

fn default_max_reconnect_attempts() -> u32 {
    5
}

fn default_heartbeat_interval_ms() -> u64 {
    30_000
}

fn default_heartbeat_timeout_ms() -> u64 {
    10_000
}

fn default_fallback_interval_ms() -> u64 {
    5_000
}

fn default_update_buffer() -> usize {
    256
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            reconnect: default_reconnect(),
            reconnect_interval_ms: default_reconnect_interval_ms(),
            max_reconnect_delay_ms: default_max_reconnect_delay_ms(),
            max_reconnect_attempts: default_max_reconnect_attempts(),
            heartbeat_interval_ms: default_heartbeat_interval_ms(),
            heartbeat_timeout_ms: default_heartbeat_timeout_ms(),
            fallback_interval_ms: default_fallback_interval_ms(),
            recovery_probe_interval_ms: None,
            update_buffer: default_update_buffer(),
        }
    }
}

impl StreamConfig {
    /// Reject configurations that would spin or never fire.
    pub fn validate(&self) -> StreamResult<()> {
        let non_zero = [
            ("reconnect_interval_ms", self.reconnect_interval_ms),
            ("max_reconnect_delay_ms", self.max_reconnect_delay_ms),
            ("heartbeat_interval_ms", self.heartbeat_interval_ms),
            ("heartbeat_timeout_ms", self.heartbeat_timeout_ms),
            ("fallback_interval_ms", self.fallback_interval_ms),
        ];
        for (name, value) in non_zero {
            if value == 0 {
                return Err(StreamError::InvalidConfig(format!("{name} must be > 0")));
            }
        }
        if self.recovery_probe_interval_ms == Some(0) {
            return Err(StreamError::InvalidConfig(
                "recovery_probe_interval_ms must be > 0".to_string(),
            ));
        }
        if self.reconnect_interval_ms > self.max_reconnect_delay_ms {
            return Err(StreamError::InvalidConfig(format!(
                "reconnect_interval_ms ({}) exceeds max_reconnect_delay_ms ({})",
                self.reconnect_interval_ms, self.max_reconnect_delay_ms
            )));
        }
        if self.update_buffer == 0 {
            return Err(StreamError::InvalidConfig(
                "update_buffer must be > 0".to_string(),
            ));
        }
        Ok(())
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_millis(self.heartbeat_timeout_ms)
    }

    pub fn fallback_interval(&self) -> Duration {
        Duration::from_millis(self.fallback_interval_ms)
    }

    pub fn recovery_probe_interval(&self) -> Option<Duration> {
        self.recovery_probe_interval_ms.map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok};

    #[test]
    fn test_default_config_is_valid() {
        let config = StreamConfig::default();
        assert!(config.reconnect);
        assert_eq!(config.max_reconnect_attempts, 5);
        assert_ok!(config.validate());
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: StreamConfig = from_json(
            r#"{"max_reconnect_attempts": 3, "reconnect_interval_ms": 100}"#,
        );
        assert_eq!(config.max_reconnect_attempts, 3);
        assert_eq!(config.reconnect_interval_ms, 100);
        assert_eq!(config.fallback_interval_ms, 5_000);
        assert_eq!(config.recovery_probe_interval_ms, None);
    }

    #[test]
    fn test_validate_rejects_zero_intervals() {
        let config = StreamConfig {
            fallback_interval_ms: 0,
            ..Default::default()
        };
        assert_err!(config.validate());

        let config = StreamConfig {
            recovery_probe_interval_ms: Some(0),
            ..Default::default()
        };
        assert_err!(config.validate());
    }

    #[test]
    fn test_validate_rejects_base_above_cap() {
        let config = StreamConfig {
            reconnect_interval_ms: 60_000,
            max_reconnect_delay_ms: 1_000,
            ..Default::default()
        };
        assert_err!(config.validate());
    }

    fn from_json(json: &str) -> StreamConfig {
        serde_json::from_str(json).unwrap()
    }
}
