//! Monitor configuration.

use crate::error::{MonitorError, MonitorResult};
use pulse_stream::StreamConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Top-level monitor configuration, loaded from TOML.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Streaming endpoint: absolute URL or origin-relative path.
    pub endpoint: String,
    /// Origin joined onto a relative `endpoint`.
    #[serde(default)]
    pub base_url: Option<String>,
    /// REST URL polled while the transport is exhausted.
    #[serde(default)]
    pub fallback_url: Option<String>,
    /// Payload field used to de-duplicate activity. No feed without it.
    #[serde(default)]
    pub identity_field: Option<String>,
    /// Maximum number of activity items kept.
    #[serde(default = "default_feed_capacity")]
    pub feed_capacity: usize,
    /// Total timeout for one fallback request (ms).
    #[serde(default = "default_http_timeout_ms")]
    pub http_timeout_ms: u64,
    /// Interval between metric refreshes and summary logs (ms).
    #[serde(default = "default_report_interval_ms")]
    pub report_interval_ms: u64,
    #[serde(default)]
    pub stream: StreamConfig,
}

fn default_feed_capacity() -> usize {
    100
}

fn default_http_timeout_ms() -> u64 {
    10_000
}

fn default_report_interval_ms() -> u64 {
    10_000
}

impl MonitorConfig {
    /// Config with defaults for everything but the endpoint.
    pub fn for_endpoint(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            base_url: None,
            fallback_url: None,
            identity_field: None,
            feed_capacity: default_feed_capacity(),
            http_timeout_ms: default_http_timeout_ms(),
            report_interval_ms: default_report_interval_ms(),
            stream: StreamConfig::default(),
        }
    }

    /// Load from a specific file.
    pub fn from_file(path: impl AsRef<Path>) -> MonitorResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            MonitorError::Config(format!("Failed to read config {}: {e}", path.display()))
        })?;
        Self::parse(&content)
    }

    /// Parse and validate TOML content.
    pub fn parse(content: &str) -> MonitorResult<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| MonitorError::Config(format!("Failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> MonitorResult<()> {
        if self.endpoint.trim().is_empty() {
            return Err(MonitorError::Config("endpoint must not be empty".to_string()));
        }
        if self.feed_capacity == 0 {
            return Err(MonitorError::Config("feed_capacity must be > 0".to_string()));
        }
        if self.http_timeout_ms == 0 || self.report_interval_ms == 0 {
            return Err(MonitorError::Config(
                "http_timeout_ms and report_interval_ms must be > 0".to_string(),
            ));
        }
        self.stream.validate()?;
        Ok(())
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_millis(self.http_timeout_ms)
    }

    pub fn report_interval(&self) -> Duration {
        Duration::from_millis(self.report_interval_ms)
    }
}
