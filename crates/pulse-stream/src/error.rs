//! Stream and transport error types.

use thiserror::Error;

/// Errors surfaced by stream construction and configuration.
///
/// Runtime failures never escape as `StreamError`; they resolve into
/// connection state transitions instead.
#[derive(Debug, Error)]
pub enum StreamError {
    #[error("Invalid endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Fallback fetch failed: {0}")]
    FetchFailed(String),

    #[error("Fallback fetch timed out after {0}ms")]
    FetchTimedOut(u64),

    #[error("Fallback fetch panicked")]
    FetchPanicked,

    #[error("No tokio runtime available: {0}")]
    NoRuntime(String),
}

pub type StreamResult<T> = Result<T, StreamError>;

/// Errors reported by a transport connection through its `on_error` callback.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Connection closed: code={code}, reason={reason}")]
    ConnectionClosed { code: u16, reason: String },

    #[error("Unexpected HTTP status: {0}")]
    HttpStatus(u16),

    #[error("Read failed: {0}")]
    ReadFailed(String),

    #[error("Send failed: {0}")]
    SendFailed(String),

    #[error("Heartbeat timeout")]
    HeartbeatTimeout,
}

impl From<tokio_tungstenite::tungstenite::Error> for TransportError {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::ConnectionFailed(e.to_string())
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        match e.status() {
            Some(status) => Self::HttpStatus(status.as_u16()),
            None => Self::ConnectionFailed(e.to_string()),
        }
    }
}
