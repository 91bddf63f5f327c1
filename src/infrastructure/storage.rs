//! In-process counting store.
//!
//! Provides a concurrent, sharded key-value store with per-key expiry, for
//! single-instance deployments and for tests.
//!
//! Every distinct caller leaves an entry behind, so expired entries are
//! reclaimed in bulk every [`DEFAULT_PURGE_INTERVAL`] writes. Memory stays
//! bounded by the number of callers seen within the longest TTL.

use crate::application::ports::{Clock, CounterStore, StoreError};
use crate::infrastructure::clock::SystemClock;
use async_trait::async_trait;
use dashmap::mapref::entry::Entry as MapEntry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Writes between two sweeps of expired entries.
pub const DEFAULT_PURGE_INTERVAL: u64 = 1024;

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }
}

/// Thread-safe sharded store backed by DashMap.
///
/// Expiry is lazy: an expired entry is dropped when it is next touched, and
/// every `purge_interval` writes (`set_with_expiry` or `increment`) the whole
/// map is swept by [`MemoryStore::purge_expired`].
///
/// `increment` runs under the shard lock of its key, so it is atomic with
/// respect to other operations on the same key. A missing key is created
/// with value 1 and no expiry, as Redis `INCR` does.
#[derive(Debug)]
pub struct MemoryStore {
    map: DashMap<String, Entry>,
    clock: Arc<dyn Clock>,
    writes: AtomicU64,
    purge_interval: u64,
}

impl MemoryStore {
    /// Create a store driven by the system clock.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock::new()))
    }

    /// Create a store driven by a custom clock (mainly for testing).
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            map: DashMap::new(),
            clock,
            writes: AtomicU64::new(0),
            purge_interval: DEFAULT_PURGE_INTERVAL,
        }
    }

    /// Sweep expired entries every `writes` writes instead of the default.
    ///
    /// Zero is treated as one: sweep on every write.
    pub fn with_purge_interval(mut self, writes: u64) -> Self {
        self.purge_interval = writes.max(1);
        self
    }

    /// Number of entries held, including expired ones not yet purged.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Check if the store holds no entries.
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Drop every expired entry. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let before = self.map.len();
        self.map.retain(|_, entry| !entry.is_expired(now));
        before.saturating_sub(self.map.len())
    }

    /// Count a write and sweep when the interval comes round.
    ///
    /// Must not be called while holding a guard into the map.
    fn record_write(&self) {
        let writes = self.writes.fetch_add(1, Ordering::Relaxed) + 1;
        if writes % self.purge_interval == 0 {
            let removed = self.purge_expired();
            if removed > 0 {
                tracing::debug!(
                    removed,
                    remaining = self.map.len(),
                    "purged expired entries"
                );
            }
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CounterStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let now = self.clock.now();

        if let Some(entry) = self.map.get(key) {
            if !entry.is_expired(now) {
                return Ok(Some(entry.value.clone()));
            }
        } else {
            return Ok(None);
        }

        // Drop the guard above before taking the write lock
        self.map.remove_if(key, |_, entry| entry.is_expired(now));
        Ok(None)
    }

    async fn set_with_expiry(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<(), StoreError> {
        let expires_at = self.clock.now().checked_add(ttl);
        self.map.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at,
            },
        );
        self.record_write();
        Ok(())
    }

    async fn increment(&self, key: &str) -> Result<i64, StoreError> {
        let result = self.increment_entry(key);
        self.record_write();
        result
    }
}

impl MemoryStore {
    fn increment_entry(&self, key: &str) -> Result<i64, StoreError> {
        let now = self.clock.now();

        match self.map.entry(key.to_string()) {
            MapEntry::Occupied(mut occupied) if !occupied.get().is_expired(now) => {
                let entry = occupied.get_mut();
                let current = entry
                    .value
                    .trim()
                    .parse::<i64>()
                    .map_err(|_| StoreError::NotNumeric {
                        key: key.to_string(),
                    })?;
                let next = current.checked_add(1).ok_or_else(|| StoreError::NotNumeric {
                    key: key.to_string(),
                })?;
                entry.value = next.to_string();
                Ok(next)
            }
            MapEntry::Occupied(mut occupied) => {
                occupied.insert(Entry {
                    value: "1".to_string(),
                    expires_at: None,
                });
                Ok(1)
            }
            MapEntry::Vacant(vacant) => {
                vacant.insert(Entry {
                    value: "1".to_string(),
                    expires_at: None,
                });
                Ok(1)
            }
        }
    }
}
