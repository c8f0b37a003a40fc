//! Pulse monitor.
//!
//! Wires a [`pulse_stream::UnifiedStream`] to:
//! - TOML configuration
//! - A REST fallback fetcher
//! - Prometheus metrics and structured logs
//! - A de-duplicated activity feed

pub mod app;
pub mod config;
pub mod error;
pub mod fetcher;

pub use app::{Monitor, RunSummary};
pub use config::MonitorConfig;
pub use error::{MonitorError, MonitorResult};
pub use fetcher::HttpFetcher;
