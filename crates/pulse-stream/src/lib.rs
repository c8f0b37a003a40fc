//! Live-update stream client.
//!
//! Keeps a consumer supplied with the latest value from a streaming
//! endpoint:
//! - WebSocket or Server-Sent Events transport, picked from the endpoint
//! - Automatic reconnection with exponential backoff and jitter
//! - Fallback polling once reconnection is exhausted
//! - One `(data, status, last_update_at)` view regardless of the source

pub mod backoff;
pub mod config;
pub mod endpoint;
pub mod error;
pub mod feed;
pub mod heartbeat;
pub mod message;
pub mod poller;
pub mod reconnect;
pub mod status;
pub mod stream;
pub mod timer;
pub mod transport;

pub use backoff::RetryBudget;
pub use config::StreamConfig;
pub use endpoint::{Endpoint, TransportKind};
pub use error::{StreamError, StreamResult, TransportError};
pub use feed::ActivityFeed;
pub use message::{StreamUpdate, UpdateSource};
pub use poller::{FallbackFetch, FallbackSession, FetchFuture};
pub use reconnect::{ConnectionState, ReconnectController};
pub use status::ConnectionStatus;
pub use stream::{StreamBuilder, StreamItem, StreamSnapshot, StreamStats, UnifiedStream};
pub use transport::{ConnectionHandle, Connector, Emitter, NetworkConnector, TransportListener};

use std::sync::Once;

static INIT_CRYPTO: Once = Once::new();

/// Install the rustls crypto provider.
/// Called by [`NetworkConnector`] before any TLS connection is made.
pub fn init_crypto() {
    INIT_CRYPTO.call_once(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}
