//! In-memory response store with per-entry TTL and bulk eviction.
//!
//! Entries are evicted oldest-inserted first in batches once the store is
//! full. Reads never reorder entries.

use super::CacheConfig;
use crate::clock::{SharedClock, SystemClock};
use crate::error::Result;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use metrics::{counter, gauge};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::debug;

// ═══════════════════════════════════════════════════════════════════════════════
// Cache Entry
// ═══════════════════════════════════════════════════════════════════════════════

/// A cached payload with its lifetime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub payload: Value,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    #[serde(skip)]
    seq: u64,
}

impl CacheEntry {
    /// An entry is gone from `expires_at` onwards.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Cache Statistics
// ═══════════════════════════════════════════════════════════════════════════════

/// Cache statistics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheStats {
    /// Total number of cache hits
    pub hits: u64,

    /// Total number of cache misses
    pub misses: u64,

    /// Entries removed to make room
    pub evictions: u64,

    /// Entries removed because their TTL ran out
    pub expirations: u64,

    /// Current number of entries
    pub entries: u64,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total > 0 {
            self.hits as f64 / total as f64
        } else {
            0.0
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Store
// ═══════════════════════════════════════════════════════════════════════════════

/// Stale order slots tolerated beyond the live entry count before compacting.
const ORDER_SLACK: usize = 64;

#[derive(Default)]
struct Inner {
    entries: HashMap<String, CacheEntry>,
    /// Insertion order. A slot is live only while `entries[key].seq == seq`.
    order: VecDeque<(u64, String)>,
    next_seq: u64,
}

impl Inner {
    fn is_live(&self, seq: u64, key: &str) -> bool {
        self.entries.get(key).is_some_and(|e| e.seq == seq)
    }

    fn compact(&mut self) {
        let entries = &self.entries;
        self.order
            .retain(|(seq, key)| entries.get(key).is_some_and(|e| e.seq == *seq));
    }

    /// Remove one entry, compacting the order once stale slots pile up.
    fn forget(&mut self, key: &str) -> bool {
        let removed = self.entries.remove(key).is_some();
        if self.order.len() > 2 * self.entries.len() + ORDER_SLACK {
            self.compact();
        }
        removed
    }

    fn evict_oldest(&mut self, batch: usize) -> usize {
        let mut evicted = 0;
        while evicted < batch {
            let Some((seq, key)) = self.order.pop_front() else {
                break;
            };
            if self.is_live(seq, &key) {
                self.entries.remove(&key);
                evicted += 1;
            }
        }
        evicted
    }
}

/// Process-local response cache.
pub struct ResponseCache {
    inner: Mutex<Inner>,
    config: CacheConfig,
    clock: SharedClock,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    expirations: AtomicU64,
}

impl std::fmt::Debug for ResponseCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseCache")
            .field("config", &self.config)
            .field("entries", &self.len())
            .finish()
    }
}

impl ResponseCache {
    /// Create a cache on the system clock.
    pub fn new(config: CacheConfig) -> Self {
        Self::with_clock(config, SystemClock::shared())
    }

    /// Create a cache on an explicit clock. `max_entries` is at least 1.
    pub fn with_clock(mut config: CacheConfig, clock: SharedClock) -> Self {
        config.max_entries = config.max_entries.max(1);
        Self {
            inner: Mutex::new(Inner::default()),
            config,
            clock,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            expirations: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Get a live payload. An expired entry is removed and reported absent.
    pub fn get(&self, key: &str) -> Option<Value> {
        let now = self.clock.now();
        let mut inner = self.inner.lock();

        let expired = inner.entries.get(key).map(|e| e.is_expired(now));
        let result = match expired {
            Some(true) => {
                inner.forget(key);
                let len = inner.entries.len();
                self.expirations.fetch_add(1, Ordering::Relaxed);
                gauge!("cache_entries").set(len as f64);
                None
            }
            Some(false) => inner.entries.get(key).map(|e| e.payload.clone()),
            None => None,
        };
        drop(inner);

        if result.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
            counter!("cache_hits_total").increment(1);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            counter!("cache_misses_total").increment(1);
        }
        result
    }

    /// Store a payload with the default TTL.
    pub fn insert(&self, key: impl Into<String>, payload: Value) {
        self.set(key, payload, self.config.default_ttl());
    }

    /// Store a payload. A zero TTL is stored as one millisecond.
    pub fn set(&self, key: impl Into<String>, payload: Value, ttl: Duration) {
        let key = key.into();
        let now = self.clock.now();
        let ttl = ChronoDuration::from_std(ttl)
            .unwrap_or_else(|_| ChronoDuration::days(36_500))
            .max(ChronoDuration::milliseconds(1));
        let expires_at = now.checked_add_signed(ttl).unwrap_or(DateTime::<Utc>::MAX_UTC);

        let mut inner = self.inner.lock();

        if let Some(existing) = inner.entries.get_mut(&key) {
            // Overwrite keeps the original insertion slot.
            existing.payload = payload;
            existing.created_at = now;
            existing.expires_at = expires_at;
            return;
        }

        let mut evicted = 0;
        if inner.entries.len() >= self.config.max_entries {
            evicted = inner.evict_oldest(self.config.eviction_batch.max(1));
        }

        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.order.push_back((seq, key.clone()));
        inner.entries.insert(
            key,
            CacheEntry {
                payload,
                created_at: now,
                expires_at,
                seq,
            },
        );
        let len = inner.entries.len();
        drop(inner);

        if evicted > 0 {
            self.evictions.fetch_add(evicted as u64, Ordering::Relaxed);
            counter!("cache_evictions_total").increment(evicted as u64);
            debug!(evicted, "Evicted oldest cache entries");
        }
        gauge!("cache_entries").set(len as f64);
    }

    /// Remove one key.
    pub fn remove(&self, key: &str) -> bool {
        let mut inner = self.inner.lock();
        let removed = inner.forget(key);
        let len = inner.entries.len();
        drop(inner);

        if removed {
            gauge!("cache_entries").set(len as f64);
        }
        removed
    }

    /// Remove every key matching a regex, or everything when `pattern` is `None`.
    pub fn clear(&self, pattern: Option<&str>) -> Result<usize> {
        let regex = pattern.map(regex::Regex::new).transpose()?;

        let mut inner = self.inner.lock();
        let removed = match regex {
            None => {
                let n = inner.entries.len();
                inner.entries.clear();
                inner.order.clear();
                n
            }
            Some(regex) => {
                let before = inner.entries.len();
                inner.entries.retain(|key, _| !regex.is_match(key));
                inner.compact();
                before - inner.entries.len()
            }
        };
        let len = inner.entries.len();
        drop(inner);

        gauge!("cache_entries").set(len as f64);
        debug!(removed, pattern = ?pattern, "Cleared cache entries");
        Ok(removed)
    }

    /// Drop every expired entry. Returns how many went.
    pub fn sweep(&self) -> usize {
        let now = self.clock.now();
        let mut inner = self.inner.lock();

        let before = inner.entries.len();
        inner.entries.retain(|_, entry| !entry.is_expired(now));
        let removed = before - inner.entries.len();
        inner.compact();
        let len = inner.entries.len();
        drop(inner);

        if removed > 0 {
            self.expirations.fetch_add(removed as u64, Ordering::Relaxed);
            debug!(removed, remaining = len, "Swept expired cache entries");
        }
        gauge!("cache_entries").set(len as f64);
        removed
    }

    /// Entries currently held, including expired ones not yet swept.
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether a key is held and live.
    pub fn contains(&self, key: &str) -> bool {
        let now = self.clock.now();
        self.inner
            .lock()
            .entries
            .get(key)
            .is_some_and(|e| !e.is_expired(now))
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            expirations: self.expirations.load(Ordering::Relaxed),
            entries: self.len() as u64,
        }
    }
}
