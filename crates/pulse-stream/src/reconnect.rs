//! Reconnection controller.
//!
//! A synchronous state machine that owns the retry budget and decides when
//! a new transport connection should be opened. It performs no I/O itself:
//! every method returns what the driver has to do next, which keeps the
//! transition rules testable without a runtime.
//!
//! ```text
//! Idle ──start──▶ Connecting ──open──▶ Connected
//!                   ▲     │                │
//!        retry due  │     │ lost           │ lost
//!                   │     ▼                ▼
//!                 Disconnected ◀───────────┘
//!                   │
//!                   │ budget spent / reconnect disabled
//!                   ▼
//!                Exhausted ──reset/probe──▶ Connecting
//! ```
//!
//! Any state returns to `Idle` on `disconnect()`.

use crate::backoff::RetryBudget;
use crate::config::StreamConfig;
use std::fmt;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Connection state owned by the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    Idle,
    Connecting,
    Connected,
    Disconnected,
    Exhausted,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Connecting => write!(f, "connecting"),
            Self::Connected => write!(f, "connected"),
            Self::Disconnected => write!(f, "disconnected"),
            Self::Exhausted => write!(f, "exhausted"),
        }
    }
}

/// A state change reported to the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: ConnectionState,
    pub to: ConnectionState,
}

impl Transition {
    pub fn entered(&self, state: ConnectionState) -> bool {
        self.from != state && self.to == state
    }

    pub fn left(&self, state: ConnectionState) -> bool {
        self.from == state && self.to != state
    }
}

/// What the driver must do after a connection ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LossOutcome {
    /// Schedule a retry after the delay; the controller is `Disconnected`.
    Retry {
        delay: Duration,
        transitions: [Transition; 1],
    },
    /// The budget is spent (or reconnect disabled); the controller is `Exhausted`.
    Exhausted { transitions: [Transition; 2] },
    /// A recovery probe failed; the controller went straight back to `Exhausted`.
    ProbeFailed { transition: Transition },
    /// The event did not apply in the current state.
    Ignored,
}

/// Reconnection controller.
#[derive(Debug, Clone)]
pub struct ReconnectController {
    state: ConnectionState,
    budget: RetryBudget,
    reconnect: bool,
    /// Set while a recovery probe is in flight from `Exhausted`.
    probing: bool,
}

impl ReconnectController {
    pub fn new(config: &StreamConfig) -> Self {
        Self {
            state: ConnectionState::Idle,
            budget: RetryBudget::from_config(config),
            reconnect: config.reconnect,
            probing: false,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn budget(&self) -> &RetryBudget {
        &self.budget
    }

    pub fn attempt(&self) -> u32 {
        self.budget.attempt
    }

    pub fn is_probing(&self) -> bool {
        self.probing
    }

    fn transition(&mut self, to: ConnectionState) -> Transition {
        let from = self.state;
        self.state = to;
        debug!(%from, %to, attempt = self.budget.attempt, "Connection state transition");
        Transition { from, to }
    }

    /// `Idle → Connecting`. The driver opens a transport on `Some`.
    pub fn start(&mut self) -> Option<Transition> {
        if self.state != ConnectionState::Idle {
            debug!(state = %self.state, "start() ignored");
            return None;
        }
        Some(self.transition(ConnectionState::Connecting))
    }

    /// `Connecting → Connected`; resets the retry budget.
    pub fn on_open(&mut self) -> Option<Transition> {
        if self.state != ConnectionState::Connecting {
            debug!(state = %self.state, "on_open ignored");
            return None;
        }
        self.budget.reset();
        self.probing = false;
        info!("Transport connected");
        Some(self.transition(ConnectionState::Connected))
    }

    /// The current connection closed, errored, or failed to open.
    pub fn on_connection_lost(&mut self) -> LossOutcome {
        if !matches!(
            self.state,
            ConnectionState::Connecting | ConnectionState::Connected
        ) {
            debug!(state = %self.state, "connection loss ignored");
            return LossOutcome::Ignored;
        }

        if self.probing {
            self.probing = false;
            debug!("Recovery probe failed, staying on fallback");
            return LossOutcome::ProbeFailed {
                transition: self.transition(ConnectionState::Exhausted),
            };
        }

        let lost = self.transition(ConnectionState::Disconnected);

        if !self.reconnect {
            warn!("Reconnect disabled, transport exhausted");
            let exhausted = self.transition(ConnectionState::Exhausted);
            return LossOutcome::Exhausted {
                transitions: [lost, exhausted],
            };
        }

        match self.budget.record_failure() {
            Some(delay) => {
                warn!(
                    attempt = self.budget.attempt,
                    max_attempts = self.budget.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    "Reconnecting"
                );
                LossOutcome::Retry {
                    delay,
                    transitions: [lost],
                }
            }
            None => {
                error!(
                    attempt = self.budget.attempt,
                    "Max reconnection attempts reached"
                );
                let exhausted = self.transition(ConnectionState::Exhausted);
                LossOutcome::Exhausted {
                    transitions: [lost, exhausted],
                }
            }
        }
    }

    /// Backoff delay elapsed: `Disconnected → Connecting`.
    pub fn on_retry_due(&mut self) -> Option<Transition> {
        if self.state != ConnectionState::Disconnected {
            debug!(state = %self.state, "retry ignored");
            return None;
        }
        Some(self.transition(ConnectionState::Connecting))
    }

    /// Recovery signal while exhausted: one attempt, budget untouched.
    pub fn probe(&mut self) -> Option<Transition> {
        if self.state != ConnectionState::Exhausted {
            return None;
        }
        self.probing = true;
        Some(self.transition(ConnectionState::Connecting))
    }

    /// Manual retry: fresh budget, back to `Idle` ready for `start()`.
    pub fn reset(&mut self) -> Option<Transition> {
        self.budget.reset();
        self.probing = false;
        if self.state == ConnectionState::Idle {
            return None;
        }
        info!(from = %self.state, "Reconnection controller reset");
        Some(self.transition(ConnectionState::Idle))
    }

    /// Explicit disconnect: any state returns to `Idle`.
    pub fn disconnect(&mut self) -> Option<Transition> {
        self.probing = false;
        if self.state == ConnectionState::Idle {
            return None;
        }
        Some(self.transition(ConnectionState::Idle))
    }
}
