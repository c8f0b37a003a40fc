//! Monitor application.
//!
//! Runs one [`UnifiedStream`] of JSON payloads and reports on it:
//! status transitions are logged, stream counters are exported as metrics,
//! and payloads are folded into an [`ActivityFeed`] when an identity field
//! is configured.

use crate::config::MonitorConfig;
use crate::error::MonitorResult;
use crate::fetcher::HttpFetcher;
use pulse_stream::{
    ActivityFeed, ConnectionStatus, StreamStats, StreamUpdate, UnifiedStream, UpdateSource,
};
use pulse_telemetry::Metrics;
use serde::Serialize;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, info, warn};

/// What a finished run observed.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub final_status: ConnectionStatus,
    pub stats: StreamStats,
    pub feed_len: usize,
    pub latest: Option<Value>,
}

/// Identity of `value` under `field`. Strings are used as-is, other JSON
/// values by their serialized form.
pub fn identity_of(value: &Value, field: &str) -> Option<String> {
    match value.get(field)? {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// Counter delta that tolerates a counter restarting from zero.
fn delta(now: u64, before: u64) -> u64 {
    if now >= before {
        now - before
    } else {
        now
    }
}

pub struct Monitor {
    config: MonitorConfig,
    stream: UnifiedStream<Value>,
    feed: Option<ActivityFeed<Value, String>>,
    /// Subscribed at construction so no update is missed before `run`.
    updates: Option<broadcast::Receiver<StreamUpdate<Value>>>,
    last_stats: StreamStats,
    last_fetches: (u64, u64),
}

impl Monitor {
    /// Build the stream and start connecting. Must run inside a tokio runtime.
    pub fn new(config: MonitorConfig) -> MonitorResult<Self> {
        config.validate()?;

        let mut builder =
            UnifiedStream::<Value>::builder(config.endpoint.clone()).config(config.stream.clone());
        if let Some(base) = &config.base_url {
            builder = builder.base_url(base.clone());
        }
        if let Some(url) = &config.fallback_url {
            let fetcher = Arc::new(HttpFetcher::new(url.clone(), config.http_timeout())?);
            info!(url = %fetcher.url(), "Fallback polling configured");
            builder = builder.fallback(move || {
                let fetcher = fetcher.clone();
                async move { fetcher.fetch().await }
            });
        }
        let stream = builder.spawn()?;
        let updates = Some(stream.updates());

        let feed = config.identity_field.clone().map(|field| {
            ActivityFeed::new(config.feed_capacity, move |item: &Value| {
                identity_of(item, &field).unwrap_or_default()
            })
        });

        Metrics::status_set(&config.endpoint, stream.status().as_str());

        Ok(Self {
            config,
            stream,
            feed,
            updates,
            last_stats: StreamStats::default(),
            last_fetches: (0, 0),
        })
    }

    pub fn stream(&self) -> &UnifiedStream<Value> {
        &self.stream
    }

    pub fn feed(&self) -> Option<&ActivityFeed<Value, String>> {
        self.feed.as_ref()
    }

    /// Fold one update into the activity feed. Array payloads contribute
    /// each element; items without an identity are skipped.
    /// Returns how many new items were added.
    pub fn ingest(&mut self, update: &StreamUpdate<Value>) -> usize {
        let (Some(feed), Some(field)) = (self.feed.as_mut(), self.config.identity_field.as_deref())
        else {
            return 0;
        };

        let items: Vec<&Value> = match &update.payload {
            Value::Array(items) => items.iter().collect(),
            other => vec![other],
        };

        let mut added = 0;
        // Oldest first so the feed ends newest-first.
        for item in items.into_iter().rev() {
            if identity_of(item, field).is_none() {
                debug!(seq = update.seq, "Skipping item without identity");
                continue;
            }
            if feed.push(item.clone()) {
                added += 1;
            }
        }
        added
    }

    /// Export counters accumulated since the previous call.
    pub fn record_metrics(&mut self) {
        let endpoint = self.config.endpoint.as_str();
        let stats = self.stream.stats();
        let prev = std::mem::replace(&mut self.last_stats, stats);

        Metrics::updates(
            endpoint,
            "transport",
            delta(stats.transport_updates, prev.transport_updates),
        );
        Metrics::updates(
            endpoint,
            "fallback",
            delta(stats.fallback_updates, prev.fallback_updates),
        );
        Metrics::malformed(endpoint, delta(stats.malformed_dropped, prev.malformed_dropped));
        Metrics::transport_errors(endpoint, delta(stats.transport_errors, prev.transport_errors));
        Metrics::stale_discarded(endpoint, delta(stats.stale_discarded, prev.stale_discarded));
        Metrics::reconnect_attempts(endpoint, self.stream.attempt());

        if let Some(session) = self.stream.fallback_session() {
            let (prev_fetches, prev_failures) = self.last_fetches;
            let failures = delta(session.failure_count, prev_failures);
            let fetches = delta(session.fetch_count, prev_fetches);
            Metrics::fallback_fetches(endpoint, "error", failures);
            Metrics::fallback_fetches(endpoint, "ok", fetches.saturating_sub(failures));
            self.last_fetches = (session.fetch_count, session.failure_count);
        }

        if let Some(at) = self.stream.last_update_at() {
            let age = chrono::Utc::now().signed_duration_since(at);
            Metrics::update_age(endpoint, age.num_milliseconds() as f64 / 1_000.0);
        }
    }

    /// Consume the stream until `shutdown` resolves, then tear it down.
    pub async fn run<S>(mut self, shutdown: S) -> MonitorResult<RunSummary>
    where
        S: Future<Output = ()>,
    {
        let mut status_rx = self.stream.subscribe();
        let mut updates = match self.updates.take() {
            Some(rx) => rx,
            None => self.stream.updates(),
        };
        let mut report = tokio::time::interval(self.config.report_interval());
        let mut last_status = self.stream.status();
        tokio::pin!(shutdown);

        info!(endpoint = %self.config.endpoint, status = %last_status, "Monitor running");

        loop {
            tokio::select! {
                changed = status_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let status = status_rx.borrow_and_update().status;
                    if status != last_status {
                        info!(from = %last_status, to = %status, "Status changed");
                        Metrics::status_set(&self.config.endpoint, status.as_str());
                        last_status = status;
                    }
                }

                update = updates.recv() => {
                    match update {
                        Ok(update) => {
                            let added = self.ingest(&update);
                            debug!(
                                seq = update.seq,
                                source = %update.source,
                                added,
                                "Update received"
                            );
                            if update.source == UpdateSource::Fallback {
                                debug!("Serving fallback data");
                            }
                        }
                        Err(RecvError::Lagged(skipped)) => {
                            warn!(skipped, "Update consumer lagged, history incomplete");
                        }
                        Err(RecvError::Closed) => break,
                    }
                }

                _ = report.tick() => {
                    self.record_metrics();
                    let stats = self.stream.stats();
                    info!(
                        status = %self.stream.status(),
                        transport_updates = stats.transport_updates,
                        fallback_updates = stats.fallback_updates,
                        feed_len = self.feed.as_ref().map_or(0, |f| f.len()),
                        "Stream summary"
                    );
                }

                () = &mut shutdown => {
                    info!("Shutdown signal received");
                    break;
                }
            }
        }

        let final_status = self.stream.status();
        self.stream.teardown();
        self.record_metrics();

        Ok(RunSummary {
            final_status,
            stats: self.stream.stats(),
            feed_len: self.feed.as_ref().map_or(0, |f| f.len()),
            latest: self.stream.data(),
        })
    }
}
