//! Retry budget and backoff delay computation.

use crate::config::StreamConfig;
use rand::Rng;
use std::time::Duration;

/// Jitter applied to every backoff delay (±20%).
pub const JITTER_RATIO: f64 = 0.2;

/// Exponent cap so `base * 2^attempt` cannot overflow.
const MAX_EXPONENT: u32 = 20;

/// Reconnection budget owned by the reconnection controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryBudget {
    /// Failed attempts since the last successful connection.
    pub attempt: u32,
    /// Attempts allowed before exhaustion (0 = unlimited).
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl RetryBudget {
    pub fn new(max_attempts: u32, base_delay_ms: u64, max_delay_ms: u64) -> Self {
        Self {
            attempt: 0,
            max_attempts,
            base_delay_ms,
            max_delay_ms,
        }
    }

    pub fn from_config(config: &StreamConfig) -> Self {
        Self::new(
            config.max_reconnect_attempts,
            config.reconnect_interval_ms,
            config.max_reconnect_delay_ms,
        )
    }

    /// Reset after a successful connection.
    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    /// Whether the budget is spent.
    pub fn is_exhausted(&self) -> bool {
        self.max_attempts > 0 && self.attempt >= self.max_attempts
    }

    /// Record a failed or closed connection.
    ///
    /// Returns the delay before the next attempt, or `None` once the
    /// budget is spent. The delay is computed from the attempt count
    /// *before* this failure so the first retry waits about `base_delay_ms`.
    pub fn record_failure(&mut self) -> Option<Duration> {
        if self.is_exhausted() {
            return None;
        }
        let delay = self.delay_for_attempt(self.attempt);
        self.attempt = self.attempt.saturating_add(1);
        if self.is_exhausted() {
            None
        } else {
            Some(delay)
        }
    }

    /// Backoff delay for a given attempt with jitter applied.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let capped = self.raw_delay_ms(attempt);
        let factor = rand::thread_rng().gen_range(1.0 - JITTER_RATIO..=1.0 + JITTER_RATIO);
        Duration::from_millis(apply_jitter(capped, factor))
    }

    /// `min(base * 2^attempt, max)` without jitter.
    pub fn raw_delay_ms(&self, attempt: u32) -> u64 {
        let exponent = attempt.min(MAX_EXPONENT);
        self.base_delay_ms
            .saturating_mul(1u64 << exponent)
            .min(self.max_delay_ms)
    }
}

fn apply_jitter(delay_ms: u64, factor: f64) -> u64 {
    (delay_ms as f64 * factor).round().max(0.0) as u64
}
