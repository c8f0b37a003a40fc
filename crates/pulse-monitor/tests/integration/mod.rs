//! Integration tests for pulse-monitor.
//!
//! These tests run the monitor against local servers:
//! - WebSocket feed with duplicate activity
//! - REST fallback when the stream endpoint is unreachable

pub mod common;
