//! Transport connections.
//!
//! A transport connection relays one live channel through four callbacks:
//! `on_open`, `on_message`, `on_error`, `on_close`. The concrete kind
//! (duplex WebSocket or SSE push stream) is picked once from the
//! [`Endpoint`] and is invisible to everything above this module.
//!
//! Contract enforced by [`Emitter`]:
//! - `on_open` fires at most once.
//! - `on_close` fires at most once and always follows `on_open` when the
//!   channel ends, whether by error or graceful shutdown. A failed open
//!   reports `on_error` then `on_close`.
//! - No callback starts after [`ConnectionHandle::close`] returns. A
//!   callback already running on another thread may still complete, so
//!   listeners that share state with the closer must tag deliveries (the
//!   stream filters by connection id).

mod sse;
mod ws;

use crate::endpoint::{Endpoint, TransportKind};
use crate::error::{StreamError, StreamResult, TransportError};
use crate::message::parse_text;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Connect timeout for push streams. The stream itself has no total timeout.
const HTTP_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Receiver of transport callbacks.
///
/// Implementations must not block; they are invoked from connection tasks.
pub trait TransportListener: Send + Sync + 'static {
    fn on_open(&self);
    fn on_message(&self, payload: serde_json::Value);
    fn on_error(&self, error: TransportError);
    fn on_close(&self);
}

struct EmitterInner {
    listener: Arc<dyn TransportListener>,
    /// Set synchronously by `ConnectionHandle::close`.
    closed: AtomicBool,
    opened: AtomicBool,
    ended: AtomicBool,
}

/// Callback side of a connection, held by the connection task.
#[derive(Clone)]
pub struct Emitter {
    inner: Arc<EmitterInner>,
}

impl Emitter {
    pub fn new(listener: Arc<dyn TransportListener>) -> Self {
        Self {
            inner: Arc::new(EmitterInner {
                listener,
                closed: AtomicBool::new(false),
                opened: AtomicBool::new(false),
                ended: AtomicBool::new(false),
            }),
        }
    }

    /// True once the caller closed the connection or the channel ended.
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire) || self.inner.ended.load(Ordering::Acquire)
    }

    pub fn open(&self) {
        if self.is_closed() || self.inner.opened.swap(true, Ordering::AcqRel) {
            return;
        }
        self.inner.listener.on_open();
    }

    /// Parse a text frame and deliver it; malformed frames are dropped.
    pub fn text(&self, raw: &str) {
        if self.is_closed() {
            return;
        }
        if let Some(payload) = parse_text(raw) {
            self.message(payload);
        }
    }

    pub fn message(&self, payload: serde_json::Value) {
        if self.is_closed() {
            return;
        }
        self.inner.listener.on_message(payload);
    }

    pub fn error(&self, error: TransportError) {
        if self.is_closed() {
            return;
        }
        self.inner.listener.on_error(error);
    }

    /// Report the end of the channel. Only the first call is delivered.
    pub fn close(&self) {
        if self.inner.closed.load(Ordering::Acquire) {
            return;
        }
        if self.inner.ended.swap(true, Ordering::AcqRel) {
            return;
        }
        self.inner.listener.on_close();
    }

    fn shut(&self) {
        self.inner.closed.store(true, Ordering::Release);
    }
}

/// Owner side of a connection.
///
/// Dropping the handle closes the connection.
pub struct ConnectionHandle {
    kind: TransportKind,
    emitter: Emitter,
    cancel: CancellationToken,
    ping_tx: Option<mpsc::UnboundedSender<()>>,
}

impl ConnectionHandle {
    /// Build a handle for a connection task that reports through `emitter`.
    ///
    /// `ping_tx` is only present for transports that carry their own pings.
    pub fn new(
        kind: TransportKind,
        emitter: &Emitter,
        cancel: CancellationToken,
        ping_tx: Option<mpsc::UnboundedSender<()>>,
    ) -> Self {
        Self {
            kind,
            emitter: emitter.clone(),
            cancel,
            ping_tx,
        }
    }

    pub fn kind(&self) -> TransportKind {
        self.kind
    }

    /// Liveness ping. No-op for push transports.
    pub fn ping(&self) {
        if self.emitter.is_closed() {
            return;
        }
        if let Some(tx) = &self.ping_tx {
            let _ = tx.send(());
        }
    }

    /// Close the connection. Idempotent; suppresses callbacks that have not
    /// started yet, then cancels the connection task.
    pub fn close(&self) {
        self.emitter.shut();
        if !self.cancel.is_cancelled() {
            debug!(kind = %self.kind, "Closing transport connection");
            self.cancel.cancel();
        }
    }

    pub fn is_closed(&self) -> bool {
        self.emitter.is_closed()
    }
}

impl Drop for ConnectionHandle {
    fn drop(&mut self) {
        self.close();
    }
}

/// Opens transport connections.
///
/// `open` must not invoke the emitter synchronously; callbacks are
/// delivered from the connection's own task.
pub trait Connector: Send + Sync + 'static {
    fn open(&self, endpoint: &Endpoint, emitter: Emitter) -> ConnectionHandle;
}

/// Connector that dials real WebSocket and SSE endpoints.
pub struct NetworkConnector {
    runtime: Handle,
    http: reqwest::Client,
    heartbeat_timeout: Duration,
}

impl NetworkConnector {
    /// Create a connector bound to the current tokio runtime.
    pub fn new(heartbeat_timeout: Duration) -> StreamResult<Self> {
        let runtime =
            Handle::try_current().map_err(|e| StreamError::NoRuntime(e.to_string()))?;
        Self::with_runtime(runtime, heartbeat_timeout)
    }

    pub fn with_runtime(runtime: Handle, heartbeat_timeout: Duration) -> StreamResult<Self> {
        crate::init_crypto();
        let http = reqwest::Client::builder()
            .connect_timeout(HTTP_CONNECT_TIMEOUT)
            .build()
            .map_err(|e| StreamError::InvalidConfig(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self {
            runtime,
            http,
            heartbeat_timeout,
        })
    }
}

impl Connector for NetworkConnector {
    fn open(&self, endpoint: &Endpoint, emitter: Emitter) -> ConnectionHandle {
        match endpoint.kind() {
            TransportKind::Duplex => ws::open(
                &self.runtime,
                endpoint.url().to_string(),
                emitter,
                self.heartbeat_timeout,
            ),
            TransportKind::Push => sse::open(
                &self.runtime,
                self.http.clone(),
                endpoint.url().to_string(),
                emitter,
            ),
        }
    }
}
