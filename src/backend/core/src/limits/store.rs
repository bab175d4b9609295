//! Windowed counter store.
//!
//! A process-wide map from client key to `(count, window_start)` with a
//! fixed-window policy. Both the per-client rate limiters and the global
//! upstream quota are built on it, each under its own key namespace.

use crate::clock::{SharedClock, SystemClock};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::Serialize;
use std::time::Duration;
use tracing::debug;

// ═══════════════════════════════════════════════════════════════════════════════
// Records
// ═══════════════════════════════════════════════════════════════════════════════

/// Request count for one key within its current window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CounterRecord {
    /// Requests admitted in this window (never exceeds the limit).
    pub count: u64,
    /// When the window opened.
    pub window_start: DateTime<Utc>,
    /// Window length the record was opened with.
    #[serde(skip)]
    window: ChronoDuration,
}

impl CounterRecord {
    fn open(now: DateTime<Utc>, window: ChronoDuration) -> Self {
        Self {
            count: 1,
            window_start: now,
            window,
        }
    }

    /// End of the window.
    pub fn reset_at(&self) -> DateTime<Utc> {
        self.window_start + self.window
    }

    /// True once `now` is strictly past the end of the window.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now - self.window_start > self.window
    }
}

/// Outcome of a single [`CounterStore::check`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CounterDecision {
    pub admitted: bool,
    pub limit: u64,
    pub count: u64,
    pub remaining: u64,
    pub window_start: DateTime<Utc>,
    pub reset_at: DateTime<Utc>,
    /// Whole seconds until the window resets, at least 1. Only set on rejection.
    pub retry_after_secs: Option<u64>,
}

// ═══════════════════════════════════════════════════════════════════════════════
// Store
// ═══════════════════════════════════════════════════════════════════════════════

/// Fixed-window counters keyed by string.
pub struct CounterStore {
    records: DashMap<String, CounterRecord>,
    clock: SharedClock,
}

impl Default for CounterStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CounterStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CounterStore")
            .field("records", &self.records.len())
            .finish()
    }
}

impl CounterStore {
    /// Create a store on the system clock.
    pub fn new() -> Self {
        Self::with_clock(SystemClock::shared())
    }

    /// Create a store on an explicit clock.
    pub fn with_clock(clock: SharedClock) -> Self {
        Self {
            records: DashMap::new(),
            clock,
        }
    }

    /// Current time on the store's clock.
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Count one request against `key` and decide whether to admit it.
    ///
    /// A rejected request does not increment the count. A record whose window
    /// has elapsed is replaced rather than reset in place.
    pub fn check(&self, key: &str, window: Duration, limit: u64) -> CounterDecision {
        let now = self.clock.now();
        let window = ChronoDuration::from_std(window).unwrap_or(ChronoDuration::zero());

        // Shard lock held for the whole read-modify-write.
        let (admitted, record) = match self.records.entry(key.to_string()) {
            Entry::Vacant(vacant) => {
                if limit == 0 {
                    (false, CounterRecord { count: 0, ..CounterRecord::open(now, window) })
                } else {
                    (true, *vacant.insert(CounterRecord::open(now, window)))
                }
            }
            Entry::Occupied(occupied) if limit == 0 && occupied.get().is_expired(now) => {
                occupied.remove();
                (false, CounterRecord { count: 0, ..CounterRecord::open(now, window) })
            }
            Entry::Occupied(mut occupied) => {
                let record = occupied.get_mut();
                if record.is_expired(now) {
                    *record = CounterRecord::open(now, window);
                    (true, *record)
                } else if record.count < limit {
                    record.count += 1;
                    (true, *record)
                } else {
                    (false, *record)
                }
            }
        };

        let reset_at = record.reset_at();
        let retry_after_secs = (!admitted).then(|| retry_after_secs(now, reset_at));

        CounterDecision {
            admitted,
            limit,
            count: record.count,
            remaining: limit.saturating_sub(record.count),
            window_start: record.window_start,
            reset_at,
            retry_after_secs,
        }
    }

    /// Current record for a key, if any (expired or not).
    pub fn get(&self, key: &str) -> Option<CounterRecord> {
        self.records.get(key).map(|r| *r)
    }

    /// Number of records held, including stale ones not yet swept.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Remove every record whose window has elapsed. Returns how many went.
    pub fn sweep(&self) -> usize {
        let now = self.clock.now();
        let keys: Vec<String> = self
            .records
            .iter()
            .filter(|r| r.value().is_expired(now))
            .map(|r| r.key().clone())
            .collect();

        let mut removed = 0;
        for key in keys {
            // Re-check: the record may have been replaced since the snapshot.
            if self
                .records
                .remove_if(&key, |_, record| record.is_expired(now))
                .is_some()
            {
                removed += 1;
            }
        }

        if removed > 0 {
            debug!(removed, remaining = self.records.len(), "Swept expired counter records");
        }
        removed
    }
}

fn retry_after_secs(now: DateTime<Utc>, reset_at: DateTime<Utc>) -> u64 {
    let ms = (reset_at - now).num_milliseconds().max(0) as u64;
    ms.div_ceil(1000).max(1)
}
