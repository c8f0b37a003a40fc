//! Heartbeat tracking for duplex connections.
//!
//! Tracks ping/pong timing and inbound activity so a silent connection can
//! be declared dead. Owned by a single connection task, so no locking.

use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Liveness monitor for one duplex connection.
#[derive(Debug)]
pub struct HeartbeatMonitor {
    /// How long to wait for a pong (or any inbound frame) after a ping.
    timeout: Duration,
    last_ping: Option<Instant>,
    last_pong: Option<Instant>,
    last_message: Instant,
    waiting_for_pong: bool,
}

impl HeartbeatMonitor {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            last_ping: None,
            last_pong: None,
            last_message: Instant::now(),
            waiting_for_pong: false,
        }
    }

    /// Record that a ping was sent.
    pub fn record_ping(&mut self) {
        let now = Instant::now();
        self.last_ping = Some(now);
        self.waiting_for_pong = true;
        debug!("Recorded ping");
    }

    /// Record that a pong was received.
    pub fn record_pong(&mut self) {
        let now = Instant::now();
        self.last_pong = Some(now);
        self.waiting_for_pong = false;

        if let Some(ping_time) = self.last_ping {
            let rtt_ms = now.saturating_duration_since(ping_time).as_millis() as u64;
            debug!(rtt_ms, "Received pong");
        }
    }

    /// Any inbound frame proves the peer is alive.
    pub fn record_message(&mut self) {
        self.last_message = Instant::now();
        self.waiting_for_pong = false;
    }

    pub fn is_waiting_for_pong(&self) -> bool {
        self.waiting_for_pong
    }

    /// Instant by which a pong must arrive, if one is outstanding.
    pub fn pong_deadline(&self) -> Option<Instant> {
        if !self.waiting_for_pong {
            return None;
        }
        self.last_ping.map(|ping| ping + self.timeout)
    }

    /// Check if the outstanding ping has gone unanswered for too long.
    pub fn is_timed_out(&self) -> bool {
        self.pong_deadline()
            .is_some_and(|deadline| Instant::now() >= deadline)
    }

    pub fn time_since_last_message(&self) -> Duration {
        Instant::now().saturating_duration_since(self.last_message)
    }

    pub fn stats(&self) -> HeartbeatStats {
        HeartbeatStats {
            last_ping: self.last_ping,
            last_pong: self.last_pong,
            waiting_for_pong: self.waiting_for_pong,
            time_since_last_message: self.time_since_last_message(),
        }
    }
}

/// Heartbeat statistics.
#[derive(Debug, Clone)]
pub struct HeartbeatStats {
    pub last_ping: Option<Instant>,
    pub last_pong: Option<Instant>,
    pub waiting_for_pong: bool,
    pub time_since_last_message: Duration,
}
