//! Shared test support.

#![allow(dead_code)]

pub mod mock_sse;
pub mod mock_ws;
pub mod scripted;

use serde::Deserialize;
use std::time::Duration;

/// Payload used across the stream tests.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Reading {
    pub source: String,
    pub value: u64,
}

/// Let spawned tasks run to quiescence on the current-thread runtime.
pub async fn settle() {
    for _ in 0..32 {
        tokio::task::yield_now().await;
    }
}

/// Move the paused clock forward in small steps so interval timers fire
/// on every period.
pub async fn advance_ms(total_ms: u64) {
    const STEP_MS: u64 = 10;
    let mut elapsed = 0;
    while elapsed < total_ms {
        let step = STEP_MS.min(total_ms - elapsed);
        tokio::time::advance(Duration::from_millis(step)).await;
        settle().await;
        elapsed += step;
    }
}
