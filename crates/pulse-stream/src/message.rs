//! Inbound payload parsing and the update records handed to consumers.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::warn;

/// Longest payload excerpt included in parse-failure logs.
const LOG_PREVIEW_CHARS: usize = 120;

/// Which source produced an update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpdateSource {
    Transport,
    Fallback,
}

impl fmt::Display for UpdateSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transport => write!(f, "transport"),
            Self::Fallback => write!(f, "fallback"),
        }
    }
}

/// One accepted update, in arrival order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StreamUpdate<T> {
    /// Monotonic sequence number of this update within the stream.
    pub seq: u64,
    pub source: UpdateSource,
    pub received_at: DateTime<Utc>,
    pub payload: T,
}

/// Parse a raw text frame as JSON.
///
/// Returns `None` (and logs) for anything that is not a JSON document. A
/// malformed frame never affects the connection that delivered it.
pub fn parse_text(raw: &str) -> Option<serde_json::Value> {
    match serde_json::from_str(raw) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(
                error = %e,
                preview = %preview(raw),
                "Dropping malformed message"
            );
            None
        }
    }
}

/// Decode a parsed payload into the stream's item type.
pub fn decode<T: DeserializeOwned>(value: serde_json::Value) -> Option<T> {
    match serde_json::from_value(value) {
        Ok(item) => Some(item),
        Err(e) => {
            warn!(error = %e, "Dropping message that does not match the payload type");
            None
        }
    }
}

fn preview(raw: &str) -> String {
    if raw.chars().count() <= LOG_PREVIEW_CHARS {
        raw.to_string()
    } else {
        let mut out: String = raw.chars().take(LOG_PREVIEW_CHARS).collect();
        out.push('…');
        out
    }
}
