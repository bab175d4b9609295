//! Lifecycle-owned expiry sweeps for the counter store and the response cache.
//!
//! Sweeps only reclaim memory; the stores already treat stale data as absent.

use crate::cache::ResponseCache;
use crate::limits::CounterStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Something with stale entries to drop.
pub trait Sweep: Send + Sync + 'static {
    /// Drop expired entries, returning how many were removed.
    fn sweep(&self) -> usize;
}

impl Sweep for CounterStore {
    fn sweep(&self) -> usize {
        CounterStore::sweep(self)
    }
}

impl Sweep for ResponseCache {
    fn sweep(&self) -> usize {
        ResponseCache::sweep(self)
    }
}

/// Background tickers that stop on [`Sweeper::shutdown`] or when dropped.
#[derive(Debug, Default)]
pub struct Sweeper {
    token: CancellationToken,
    tasks: Vec<(&'static str, JoinHandle<()>)>,
}

impl Sweeper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sweep `target` every `period`. Must be called inside a tokio runtime.
    pub fn spawn<T: Sweep>(&mut self, name: &'static str, target: Arc<T>, period: Duration) {
        let token = self.token.child_token();
        let period = period.max(Duration::from_millis(1));

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // First tick completes immediately.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        let removed = target.sweep();
                        debug!(sweeper = name, removed, "Sweep finished");
                    }
                }
            }
        });

        self.tasks.push((name, handle));
    }

    /// Number of running sweep tasks.
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Stop every ticker and wait for them to exit.
    pub async fn shutdown(mut self) {
        self.token.cancel();
        for (name, handle) in self.tasks.drain(..) {
            let _ = handle.await;
            info!(sweeper = name, "Sweeper stopped");
        }
    }
}

impl Drop for Sweeper {
    fn drop(&mut self) {
        self.token.cancel();
        for (_, handle) in &self.tasks {
            handle.abort();
        }
    }
}
