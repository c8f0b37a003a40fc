//! Consumer-facing connectivity status.

use crate::reconnect::ConnectionState;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Connectivity as seen by consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConnectionStatus {
    /// The transport is live and authoritative.
    Connected,
    /// A transport connection is being (re)established.
    Connecting,
    /// The transport is unavailable; data comes from fallback polling.
    Polling,
    /// The transport is unavailable and no fallback is running.
    OfflineError,
}

impl ConnectionStatus {
    /// Project controller state and poller activity onto a status.
    ///
    /// `parked` marks an explicit disconnect, which reads as offline.
    pub fn project(state: ConnectionState, polling: bool, parked: bool) -> Self {
        match state {
            ConnectionState::Connected => Self::Connected,
            _ if polling => Self::Polling,
            ConnectionState::Exhausted => Self::OfflineError,
            ConnectionState::Idle if parked => Self::OfflineError,
            ConnectionState::Idle | ConnectionState::Connecting | ConnectionState::Disconnected => {
                Self::Connecting
            }
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Connected => "connected",
            Self::Connecting => "connecting",
            Self::Polling => "polling",
            Self::OfflineError => "offline-error",
        }
    }

    pub fn all() -> [Self; 4] {
        [
            Self::Connected,
            Self::Connecting,
            Self::Polling,
            Self::OfflineError,
        ]
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_projection_table() {
        use ConnectionState::*;
        assert_eq!(
            ConnectionStatus::project(Connected, false, false),
            ConnectionStatus::Connected
        );
        assert_eq!(
            ConnectionStatus::project(Connected, true, false),
            ConnectionStatus::Connected
        );
        assert_eq!(
            ConnectionStatus::project(Connecting, false, false),
            ConnectionStatus::Connecting
        );
        assert_eq!(
            ConnectionStatus::project(Disconnected, false, false),
            ConnectionStatus::Connecting
        );
        assert_eq!(
            ConnectionStatus::project(Exhausted, true, false),
            ConnectionStatus::Polling
        );
        assert_eq!(
            ConnectionStatus::project(Connecting, true, false),
            ConnectionStatus::Polling
        );
        assert_eq!(
            ConnectionStatus::project(Exhausted, false, false),
            ConnectionStatus::OfflineError
        );
        assert_eq!(
            ConnectionStatus::project(Idle, false, false),
            ConnectionStatus::Connecting
        );
        assert_eq!(
            ConnectionStatus::project(Idle, false, true),
            ConnectionStatus::OfflineError
        );
    }

    #[test]
    fn test_status_serializes_kebab_case() {
        assert_eq!(
            serde_json::to_string(&ConnectionStatus::OfflineError).unwrap(),
            "\"offline-error\""
        );
        for status in ConnectionStatus::all() {
            assert_eq!(
                serde_json::to_string(&status).unwrap(),
                format!("\"{}\"", status.as_str())
            );
        }
    }
}
