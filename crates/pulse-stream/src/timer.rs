//! Cancellable one-shot and repeating timers.
//!
//! Every schedule call returns a [`TimerHandle`]. Cancelling or dropping the
//! handle aborts the timer task. A firing that already raced past the abort
//! is filtered by the caller's timer id, so handlers must check it.

use std::future::Future;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};

/// Handle to a scheduled timer. Aborts the timer when cancelled or dropped.
#[derive(Debug)]
pub struct TimerHandle {
    id: u64,
    task: JoinHandle<()>,
}

impl TimerHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Stop the timer. Idempotent.
    pub fn cancel(&self) {
        self.task.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for TimerHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Spawns timers onto a runtime and hands out monotonically increasing ids.
#[derive(Debug)]
pub struct Scheduler {
    runtime: Handle,
    next_id: u64,
}

impl Scheduler {
    pub fn new(runtime: Handle) -> Self {
        Self {
            runtime,
            next_id: 1,
        }
    }

    pub fn runtime(&self) -> &Handle {
        &self.runtime
    }

    fn allocate_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Run `fire(id)` once after `delay`.
    pub fn once<F>(&mut self, delay: Duration, fire: F) -> TimerHandle
    where
        F: FnOnce(u64) + Send + 'static,
    {
        let id = self.allocate_id();
        let task = self.runtime.spawn(async move {
            time::sleep(delay).await;
            fire(id);
        });
        TimerHandle { id, task }
    }

    /// Run `fire(id)` every `period`. The first firing happens immediately
    /// when `immediate` is set, otherwise after one period.
    pub fn every<F>(&mut self, period: Duration, immediate: bool, mut fire: F) -> TimerHandle
    where
        F: FnMut(u64) + Send + 'static,
    {
        let id = self.allocate_id();
        let task = self.runtime.spawn(async move {
            let start = if immediate {
                time::Instant::now()
            } else {
                time::Instant::now() + period
            };
            let mut ticker = time::interval_at(start, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                fire(id);
            }
        });
        TimerHandle { id, task }
    }

    /// Spawn a detached task (connection I/O, fetches).
    pub fn spawn<F>(&self, future: F) -> JoinHandle<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.runtime.spawn(future)
    }
}
