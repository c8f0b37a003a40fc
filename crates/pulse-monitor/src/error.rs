//! Monitor error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Stream error: {0}")]
    Stream(#[from] pulse_stream::StreamError),

    #[error("Telemetry error: {0}")]
    Telemetry(#[from] pulse_telemetry::TelemetryError),

    #[error("HTTP client error: {0}")]
    Http(String),
}

pub type MonitorResult<T> = Result<T, MonitorError>;
