//! Unified live-update stream.
//!
//! [`UnifiedStream`] owns one transport connection, the reconnection
//! controller and an optional fallback poller, and exposes a single
//! `(data, status, last_update_at)` view to consumers.
//!
//! All mutable state sits in one [`Core`] behind a `parking_lot::Mutex`.
//! Transport callbacks and timer firings lock it and run a synchronous
//! handler; nothing awaits while the lock is held. Every connection and
//! timer carries an id, and events from ids that are no longer current are
//! dropped.

use crate::config::StreamConfig;
use crate::endpoint::Endpoint;
use crate::error::{StreamError, StreamResult, TransportError};
use crate::message::{decode, StreamUpdate, UpdateSource};
use crate::poller::{FallbackFetch, FallbackPoller, FallbackSession};
use crate::reconnect::{ConnectionState, LossOutcome, ReconnectController, Transition};
use crate::status::ConnectionStatus;
use crate::timer::{Scheduler, TimerHandle};
use crate::transport::{ConnectionHandle, Connector, Emitter, NetworkConnector, TransportListener};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::{Arc, Weak};
use tokio::runtime::Handle;
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};

/// Payload types a stream can carry.
pub trait StreamItem: DeserializeOwned + Clone + Send + Sync + 'static {}

impl<T> StreamItem for T where T: DeserializeOwned + Clone + Send + Sync + 'static {}

/// Consumer view of the stream at one point in time.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StreamSnapshot<T> {
    pub data: Option<T>,
    pub status: ConnectionStatus,
    pub last_update_at: Option<DateTime<Utc>>,
    /// Number of updates applied so far.
    pub seq: u64,
}

impl<T> Default for StreamSnapshot<T> {
    fn default() -> Self {
        Self {
            data: None,
            status: ConnectionStatus::Connecting,
            last_update_at: None,
            seq: 0,
        }
    }
}

/// Running counters for one stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StreamStats {
    pub connections_opened: u64,
    pub transport_updates: u64,
    pub fallback_updates: u64,
    pub malformed_dropped: u64,
    pub transport_errors: u64,
    pub stale_discarded: u64,
}

struct LiveConnection {
    id: u64,
    handle: ConnectionHandle,
}

struct Core<T> {
    this: Weak<Mutex<Core<T>>>,
    endpoint: Endpoint,
    config: StreamConfig,
    connector: Arc<dyn Connector>,
    scheduler: Scheduler,
    controller: ReconnectController,
    poller: Option<FallbackPoller<T>>,
    connection: Option<LiveConnection>,
    next_connection_id: u64,
    reconnect_timer: Option<TimerHandle>,
    heartbeat_timer: Option<TimerHandle>,
    probe_timer: Option<TimerHandle>,
    /// Sequence number of the last applied update.
    seq: u64,
    /// Bumped on disconnect and teardown; fetches from older epochs are void.
    epoch: u64,
    /// Set by `disconnect()`; Idle then reads as offline.
    parked: bool,
    torn_down: bool,
    stats: StreamStats,
    snapshot_tx: watch::Sender<StreamSnapshot<T>>,
    updates_tx: broadcast::Sender<StreamUpdate<T>>,
}

/// Run `f` against the core if the stream is still alive.
fn with_core<T>(core: &Weak<Mutex<Core<T>>>, f: impl FnOnce(&mut Core<T>)) {
    if let Some(core) = core.upgrade() {
        let mut guard = core.lock();
        f(&mut *guard);
    }
}

/// Forwards callbacks of one connection into the core.
struct CoreListener<T> {
    core: Weak<Mutex<Core<T>>>,
    connection_id: u64,
}

impl<T: StreamItem> TransportListener for CoreListener<T> {
    fn on_open(&self) {
        with_core(&self.core, |core| core.on_transport_open(self.connection_id));
    }

    fn on_message(&self, payload: serde_json::Value) {
        with_core(&self.core, |core| {
            core.on_transport_message(self.connection_id, payload)
        });
    }

    fn on_error(&self, error: TransportError) {
        with_core(&self.core, |core| {
            core.on_transport_error(self.connection_id, error)
        });
    }

    fn on_close(&self) {
        with_core(&self.core, |core| core.on_transport_close(self.connection_id));
    }
}

impl<T: StreamItem> Core<T> {
    fn is_current(&self, connection_id: u64) -> bool {
        !self.torn_down
            && self
                .connection
                .as_ref()
                .is_some_and(|c| c.id == connection_id)
    }

    fn polling(&self) -> bool {
        self.poller.as_ref().is_some_and(|p| p.is_active())
    }

    fn publish_status(&self) {
        let status = ConnectionStatus::project(self.controller.state(), self.polling(), self.parked);
        self.snapshot_tx.send_if_modified(|snapshot| {
            if snapshot.status == status {
                return false;
            }
            info!(from = %snapshot.status, to = %status, "Stream status changed");
            snapshot.status = status;
            true
        });
    }

    fn close_connection(&mut self) {
        if let Some(connection) = self.connection.take() {
            connection.handle.close();
        }
    }

    fn cancel_timers(&mut self) {
        self.reconnect_timer = None;
        self.heartbeat_timer = None;
        self.probe_timer = None;
    }

    fn open_connection(&mut self) {
        self.close_connection();

        let id = self.next_connection_id;
        self.next_connection_id += 1;
        self.stats.connections_opened += 1;

        let listener = Arc::new(CoreListener {
            core: self.this.clone(),
            connection_id: id,
        });
        let emitter = Emitter::new(listener);
        debug!(connection_id = id, endpoint = %self.endpoint, "Opening transport connection");
        let handle = self.connector.open(&self.endpoint, emitter);
        self.connection = Some(LiveConnection { id, handle });
    }

    fn start(&mut self) {
        if let Some(t) = self.controller.start() {
            self.apply_transition(t);
            self.open_connection();
        }
        self.publish_status();
    }

    fn apply_transition(&mut self, t: Transition) {
        if t.left(ConnectionState::Connected) {
            self.heartbeat_timer = None;
        }

        if t.entered(ConnectionState::Connected) {
            self.probe_timer = None;
            if let Some(poller) = self.poller.as_mut() {
                poller.deactivate();
            }
            let core = self.this.clone();
            self.heartbeat_timer = Some(self.scheduler.every(
                self.config.heartbeat_interval(),
                false,
                move |timer_id| with_core(&core, |c| c.on_heartbeat(timer_id)),
            ));
        }

        if t.entered(ConnectionState::Exhausted) {
            self.start_fallback();
        }
    }

    fn start_fallback(&mut self) {
        if let Some(poller) = self.poller.as_mut() {
            if !poller.is_active() {
                let core = self.this.clone();
                let timer = self.scheduler.every(
                    self.config.fallback_interval(),
                    true,
                    move |timer_id| with_core(&core, |c| c.on_poll_tick(timer_id)),
                );
                poller.activate(self.config.fallback_interval_ms, timer);
            }
        } else {
            warn!(endpoint = %self.endpoint, "Transport exhausted and no fallback configured");
        }

        if self.probe_timer.is_none() {
            if let Some(interval) = self.config.recovery_probe_interval() {
                let core = self.this.clone();
                self.probe_timer = Some(self.scheduler.every(interval, false, move |timer_id| {
                    with_core(&core, |c| c.on_probe_timer(timer_id))
                }));
            }
        }
    }

    fn on_transport_open(&mut self, connection_id: u64) {
        if !self.is_current(connection_id) {
            return;
        }
        if let Some(t) = self.controller.on_open() {
            self.apply_transition(t);
        }
        self.publish_status();
    }

    fn on_transport_message(&mut self, connection_id: u64, payload: serde_json::Value) {
        if !self.is_current(connection_id) {
            return;
        }
        match decode::<T>(payload) {
            Some(item) => self.apply_update(item, UpdateSource::Transport),
            None => self.stats.malformed_dropped += 1,
        }
    }

    fn on_transport_error(&mut self, connection_id: u64, error: TransportError) {
        if !self.is_current(connection_id) {
            return;
        }
        warn!(connection_id, error = %error, "Transport error");
        self.stats.transport_errors += 1;
        self.handle_loss();
    }

    fn on_transport_close(&mut self, connection_id: u64) {
        if !self.is_current(connection_id) {
            return;
        }
        info!(connection_id, "Transport closed");
        self.handle_loss();
    }

    fn handle_loss(&mut self) {
        self.close_connection();

        match self.controller.on_connection_lost() {
            LossOutcome::Retry { delay, transitions } => {
                for t in transitions {
                    self.apply_transition(t);
                }
                let core = self.this.clone();
                self.reconnect_timer = Some(self.scheduler.once(delay, move |timer_id| {
                    with_core(&core, |c| c.on_reconnect_timer(timer_id))
                }));
            }
            LossOutcome::Exhausted { transitions } => {
                for t in transitions {
                    self.apply_transition(t);
                }
            }
            LossOutcome::ProbeFailed { transition } => {
                self.apply_transition(transition);
            }
            LossOutcome::Ignored => {}
        }
        self.publish_status();
    }

    fn on_reconnect_timer(&mut self, timer_id: u64) {
        if self.torn_down || self.reconnect_timer.as_ref().map(|t| t.id()) != Some(timer_id) {
            return;
        }
        self.reconnect_timer = None;
        if let Some(t) = self.controller.on_retry_due() {
            self.apply_transition(t);
            self.open_connection();
        }
        self.publish_status();
    }

    fn on_heartbeat(&mut self, timer_id: u64) {
        if self.torn_down || self.heartbeat_timer.as_ref().map(|t| t.id()) != Some(timer_id) {
            return;
        }
        if let Some(connection) = &self.connection {
            debug!(connection_id = connection.id, "Heartbeat ping");
            connection.handle.ping();
        }
    }

    fn on_probe_timer(&mut self, timer_id: u64) {
        if self.torn_down || self.probe_timer.as_ref().map(|t| t.id()) != Some(timer_id) {
            return;
        }
        if let Some(t) = self.controller.probe() {
            info!(endpoint = %self.endpoint, "Probing transport recovery");
            self.apply_transition(t);
            self.open_connection();
            self.publish_status();
        }
    }

    fn on_poll_tick(&mut self, timer_id: u64) {
        if self.torn_down {
            return;
        }
        let Some(poller) = self.poller.as_mut() else {
            return;
        };
        if !poller.owns_timer(timer_id) {
            return;
        }
        let core = self.this.clone();
        poller.dispatch(
            &self.scheduler,
            self.seq,
            self.epoch,
            self.config.fallback_interval(),
            move |fetch_id, result| with_core(&core, |c| c.on_fetch_settled(fetch_id, result)),
        );
    }

    fn on_fetch_settled(&mut self, fetch_id: u64, result: Result<T, StreamError>) {
        let Some(poller) = self.poller.as_mut() else {
            return;
        };
        let Some(settled) = poller.settle(fetch_id, result.as_ref().map(|_| ())) else {
            return;
        };
        if self.torn_down || settled.epoch != self.epoch {
            debug!(fetch_id, "Discarding fetch from a closed session");
            return;
        }
        let Ok(item) = result else {
            return;
        };
        if settled.dispatch_seq != self.seq {
            debug!(
                fetch_id,
                dispatch_seq = settled.dispatch_seq,
                current_seq = self.seq,
                "Discarding stale fallback result"
            );
            self.stats.stale_discarded += 1;
            return;
        }
        self.apply_update(item, UpdateSource::Fallback);
    }

    fn apply_update(&mut self, item: T, source: UpdateSource) {
        self.seq += 1;
        let seq = self.seq;
        let received_at = Utc::now();
        match source {
            UpdateSource::Transport => self.stats.transport_updates += 1,
            UpdateSource::Fallback => self.stats.fallback_updates += 1,
        }

        let update = StreamUpdate {
            seq,
            source,
            received_at,
            payload: item.clone(),
        };
        self.snapshot_tx.send_modify(|snapshot| {
            snapshot.data = Some(item);
            snapshot.last_update_at = Some(received_at);
            snapshot.seq = seq;
        });
        // No subscribers is fine.
        let _ = self.updates_tx.send(update);
    }

    fn reset(&mut self) {
        if self.torn_down {
            return;
        }
        info!(endpoint = %self.endpoint, state = %self.controller.state(), "Manual reset");
        self.cancel_timers();
        self.close_connection();
        // An active poller keeps serving data until the new connection opens.
        self.controller.reset();
        self.parked = false;
        self.start();
    }

    fn disconnect(&mut self) {
        if self.torn_down {
            return;
        }
        info!(endpoint = %self.endpoint, "Disconnecting stream");
        self.epoch += 1;
        self.cancel_timers();
        self.close_connection();
        if let Some(poller) = self.poller.as_mut() {
            poller.abandon();
        }
        self.controller.disconnect();
        self.parked = true;
        self.publish_status();
    }

    fn teardown(&mut self) {
        if self.torn_down {
            return;
        }
        debug!(endpoint = %self.endpoint, "Tearing down stream");
        self.torn_down = true;
        self.epoch += 1;
        self.cancel_timers();
        self.close_connection();
        if let Some(poller) = self.poller.as_mut() {
            poller.abandon();
        }
        self.controller.disconnect();
    }
}

/// Builder for [`UnifiedStream`].
pub struct StreamBuilder<T> {
    endpoint: String,
    base_url: Option<String>,
    config: StreamConfig,
    fetcher: Option<Arc<dyn FallbackFetch<T>>>,
    connector: Option<Arc<dyn Connector>>,
    runtime: Option<Handle>,
}

impl<T: StreamItem> StreamBuilder<T> {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            base_url: None,
            config: StreamConfig::default(),
            fetcher: None,
            connector: None,
            runtime: None,
        }
    }

    pub fn config(mut self, config: StreamConfig) -> Self {
        self.config = config;
        self
    }

    /// Origin used to resolve a relative endpoint such as `/ws/telemetry`.
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Data source used while the transport is exhausted.
    pub fn fallback<F: FallbackFetch<T>>(mut self, fetcher: F) -> Self {
        self.fetcher = Some(Arc::new(fetcher));
        self
    }

    pub fn fallback_arc(mut self, fetcher: Arc<dyn FallbackFetch<T>>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    /// Replace the network connector.
    pub fn connector(mut self, connector: Arc<dyn Connector>) -> Self {
        self.connector = Some(connector);
        self
    }

    pub fn runtime(mut self, runtime: Handle) -> Self {
        self.runtime = Some(runtime);
        self
    }

    /// Validate, build and start connecting.
    pub fn spawn(self) -> StreamResult<UnifiedStream<T>> {
        self.config.validate()?;

        let mut endpoint = Endpoint::parse(self.endpoint)?;
        if let Some(base) = &self.base_url {
            endpoint = endpoint.with_base(base)?;
        }

        let runtime = match self.runtime {
            Some(runtime) => runtime,
            None => Handle::try_current().map_err(|e| StreamError::NoRuntime(e.to_string()))?,
        };

        let connector: Arc<dyn Connector> = match self.connector {
            Some(connector) => connector,
            None => {
                if endpoint.is_relative() {
                    return Err(StreamError::InvalidEndpoint(format!(
                        "relative endpoint {} needs a base URL",
                        endpoint.url()
                    )));
                }
                Arc::new(NetworkConnector::with_runtime(
                    runtime.clone(),
                    self.config.heartbeat_timeout(),
                )?)
            }
        };

        let (snapshot_tx, snapshot_rx) = watch::channel(StreamSnapshot::default());
        let (updates_tx, _) = broadcast::channel(self.config.update_buffer);
        let config = self.config;
        let fetcher = self.fetcher;

        info!(
            endpoint = %endpoint,
            kind = %endpoint.kind(),
            fallback = fetcher.is_some(),
            "Starting unified stream"
        );

        let core = Arc::new_cyclic(|this| {
            Mutex::new(Core {
                this: this.clone(),
                endpoint,
                controller: ReconnectController::new(&config),
                config,
                connector,
                scheduler: Scheduler::new(runtime),
                poller: fetcher.map(FallbackPoller::new),
                connection: None,
                next_connection_id: 1,
                reconnect_timer: None,
                heartbeat_timer: None,
                probe_timer: None,
                seq: 0,
                epoch: 0,
                parked: false,
                torn_down: false,
                stats: StreamStats::default(),
                snapshot_tx,
                updates_tx: updates_tx.clone(),
            })
        });

        core.lock().start();

        Ok(UnifiedStream {
            core,
            snapshot_rx,
            updates_tx,
        })
    }
}

/// A live-update stream with automatic reconnection and fallback polling.
///
/// Dropping the stream tears it down.
pub struct UnifiedStream<T: StreamItem> {
    core: Arc<Mutex<Core<T>>>,
    snapshot_rx: watch::Receiver<StreamSnapshot<T>>,
    updates_tx: broadcast::Sender<StreamUpdate<T>>,
}

impl<T: StreamItem> UnifiedStream<T> {
    pub fn builder(endpoint: impl Into<String>) -> StreamBuilder<T> {
        StreamBuilder::new(endpoint)
    }

    /// Connect with `config` and no fallback.
    pub fn connect(endpoint: impl Into<String>, config: StreamConfig) -> StreamResult<Self> {
        StreamBuilder::new(endpoint).config(config).spawn()
    }

    /// Latest accepted value.
    pub fn data(&self) -> Option<T> {
        self.snapshot_rx.borrow().data.clone()
    }

    pub fn status(&self) -> ConnectionStatus {
        self.snapshot_rx.borrow().status
    }

    pub fn last_update_at(&self) -> Option<DateTime<Utc>> {
        self.snapshot_rx.borrow().last_update_at
    }

    pub fn snapshot(&self) -> StreamSnapshot<T> {
        self.snapshot_rx.borrow().clone()
    }

    /// Receiver that observes every snapshot change.
    pub fn subscribe(&self) -> watch::Receiver<StreamSnapshot<T>> {
        self.snapshot_rx.clone()
    }

    /// Receiver for every accepted update from now on.
    pub fn updates(&self) -> broadcast::Receiver<StreamUpdate<T>> {
        self.updates_tx.subscribe()
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.core.lock().controller.state()
    }

    /// Retry attempts consumed since the last successful connection.
    pub fn attempt(&self) -> u32 {
        self.core.lock().controller.attempt()
    }

    /// Current fallback session, if a fallback is configured.
    pub fn fallback_session(&self) -> Option<FallbackSession> {
        self.core
            .lock()
            .poller
            .as_ref()
            .map(|p| p.session().clone())
    }

    pub fn stats(&self) -> StreamStats {
        self.core.lock().stats
    }

    pub fn endpoint(&self) -> Endpoint {
        self.core.lock().endpoint.clone()
    }

    /// Tear down transport and timers, then reconnect with a fresh retry
    /// budget. Fallback polling, if running, carries on until the new
    /// connection opens.
    pub fn reset(&self) {
        self.core.lock().reset();
    }

    /// Close everything and go offline. `reset()` brings the stream back.
    pub fn disconnect(&self) {
        self.core.lock().disconnect();
    }

    /// Close everything permanently. No further updates are published.
    pub fn teardown(&self) {
        self.core.lock().teardown();
    }
}

impl<T: StreamItem> Drop for UnifiedStream<T> {
    fn drop(&mut self) {
        self.core.lock().teardown();
    }
}
