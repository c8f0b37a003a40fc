//! Fallback poller.
//!
//! Substitute data source while the transport is exhausted: an immediate
//! fetch, then one per interval. Failures are recorded and polling carries
//! on. At most one fetch is in flight; a tick that finds one still running
//! is skipped. Every fetch is bounded by a timeout and a panicking fetch
//! settles as a failure, so a bad fetch never wedges the poller.

use crate::error::StreamError;
use crate::timer::{Scheduler, TimerHandle};
use chrono::{DateTime, Utc};
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use serde::Serialize;
use std::fmt::Display;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub type FetchFuture<T> = BoxFuture<'static, Result<T, StreamError>>;

/// Caller-supplied data fetch used while streaming is unavailable.
///
/// Implemented for any `Fn() -> impl Future<Output = Result<T, E>>` closure
/// where `E: Display`.
pub trait FallbackFetch<T>: Send + Sync + 'static {
    fn fetch(&self) -> FetchFuture<T>;
}

impl<T, F, Fut, E> FallbackFetch<T> for F
where
    T: Send + 'static,
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
    E: Display + 'static,
{
    fn fetch(&self) -> FetchFuture<T> {
        let fut = (self)();
        Box::pin(async move { fut.await.map_err(|e| StreamError::FetchFailed(e.to_string())) })
    }
}

/// Bookkeeping for one fallback period.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FallbackSession {
    pub active: bool,
    pub interval_ms: u64,
    pub last_fetch_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub fetch_count: u64,
    pub failure_count: u64,
}

/// A fetch that has been dispatched and not yet settled.
#[derive(Debug)]
struct InFlight {
    id: u64,
    dispatch_seq: u64,
    epoch: u64,
    task: JoinHandle<()>,
}

/// Identity of a settled fetch, returned to the stream for the
/// sequence check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SettledFetch {
    pub dispatch_seq: u64,
    pub epoch: u64,
}

/// Fallback poller state.
pub struct FallbackPoller<T> {
    fetcher: Arc<dyn FallbackFetch<T>>,
    session: FallbackSession,
    timer: Option<TimerHandle>,
    in_flight: Option<InFlight>,
    next_fetch_id: u64,
}

impl<T: Send + 'static> FallbackPoller<T> {
    pub fn new(fetcher: Arc<dyn FallbackFetch<T>>) -> Self {
        Self {
            fetcher,
            session: FallbackSession::default(),
            timer: None,
            in_flight: None,
            next_fetch_id: 1,
        }
    }

    pub fn session(&self) -> &FallbackSession {
        &self.session
    }

    pub fn is_active(&self) -> bool {
        self.session.active
    }

    pub fn has_in_flight(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Whether `timer_id` belongs to the live poll interval.
    pub fn owns_timer(&self, timer_id: u64) -> bool {
        self.timer.as_ref().is_some_and(|t| t.id() == timer_id)
    }

    /// Start a new session driven by `timer`, which must fire immediately
    /// and then once per `interval_ms`.
    ///
    /// A fetch still running from an earlier session is aborted; the new
    /// session's immediate fetch supersedes it.
    pub fn activate(&mut self, interval_ms: u64, timer: TimerHandle) {
        if let Some(in_flight) = self.in_flight.take() {
            debug!(fetch_id = in_flight.id, "Aborting fetch left over from previous session");
            in_flight.task.abort();
        }
        info!(interval_ms, "Fallback polling started");
        self.session = FallbackSession {
            active: true,
            interval_ms,
            ..FallbackSession::default()
        };
        self.timer = Some(timer);
    }

    /// Stop the interval. An in-flight fetch is left to settle.
    pub fn deactivate(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.cancel();
        }
        if self.session.active {
            info!(
                fetches = self.session.fetch_count,
                failures = self.session.failure_count,
                "Fallback polling stopped"
            );
        }
        self.session.active = false;
    }

    /// Stop the interval and abort any in-flight fetch.
    pub fn abandon(&mut self) {
        self.deactivate();
        if let Some(in_flight) = self.in_flight.take() {
            debug!(fetch_id = in_flight.id, "Aborting in-flight fetch");
            in_flight.task.abort();
        }
    }

    /// Dispatch one fetch unless another is still running.
    ///
    /// `on_settled(fetch_id, result)` runs on the fetch task once the
    /// fetch resolves, fails, panics or exceeds `timeout`. Returns the
    /// fetch id, or `None` if skipped.
    pub fn dispatch<F>(
        &mut self,
        scheduler: &Scheduler,
        dispatch_seq: u64,
        epoch: u64,
        timeout: Duration,
        on_settled: F,
    ) -> Option<u64>
    where
        F: FnOnce(u64, Result<T, StreamError>) + Send + 'static,
    {
        if let Some(in_flight) = &self.in_flight {
            debug!(fetch_id = in_flight.id, "Poll tick skipped, fetch still in flight");
            return None;
        }

        let id = self.next_fetch_id;
        self.next_fetch_id += 1;

        let fetcher = self.fetcher.clone();
        let task = scheduler.spawn(async move {
            // The fetcher is called inside the guarded future so a panic
            // while building the request is caught too.
            let fetch = AssertUnwindSafe(async move { fetcher.fetch().await }).catch_unwind();
            let result = match tokio::time::timeout(timeout, fetch).await {
                Ok(Ok(result)) => result,
                Ok(Err(_)) => Err(StreamError::FetchPanicked),
                Err(_) => Err(StreamError::FetchTimedOut(timeout.as_millis() as u64)),
            };
            on_settled(id, result);
        });

        debug!(fetch_id = id, dispatch_seq, "Fallback fetch dispatched");
        self.in_flight = Some(InFlight {
            id,
            dispatch_seq,
            epoch,
            task,
        });
        Some(id)
    }

    /// Record the outcome of fetch `fetch_id`.
    ///
    /// Returns `None` if the fetch is unknown (already abandoned).
    pub fn settle(&mut self, fetch_id: u64, outcome: Result<(), &StreamError>) -> Option<SettledFetch> {
        if self.in_flight.as_ref().map(|f| f.id) != Some(fetch_id) {
            return None;
        }
        let in_flight = self.in_flight.take()?;

        self.session.last_fetch_at = Some(Utc::now());
        self.session.fetch_count += 1;
        match outcome {
            Ok(()) => {
                self.session.last_error = None;
            }
            Err(e) => {
                warn!(error = %e, fetch_id, "Fallback fetch failed");
                self.session.failure_count += 1;
                self.session.last_error = Some(e.to_string());
            }
        }

        Some(SettledFetch {
            dispatch_seq: in_flight.dispatch_seq,
            epoch: in_flight.epoch,
        })
    }
}
