//! LRU client cache

use std::{num::NonZeroUsize, sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use lru::LruCache;
use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::debug;

use crate::{stats::CacheStats, sweeper::Sweeper, Result};

/// Default number of clients kept alive by a cache
pub const DEFAULT_MAX_SIZE: usize = 20;

/// A cached value with its bookkeeping
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    /// The cached value
    pub value: V,
    /// Wall-clock creation time
    pub created_at: DateTime<Utc>,
    /// Wall-clock time of the last hit (or creation)
    pub last_used: DateTime<Utc>,
    /// Number of hits since creation
    pub hit_count: u64,
    /// Monotonic creation instant, used for age checks
    born: Instant,
}

impl<V> CacheEntry<V> {
    fn new(value: V) -> Self {
        let now = Utc::now();
        Self {
            value,
            created_at: now,
            last_used: now,
            hit_count: 0,
            born: Instant::now(),
        }
    }

    /// Time elapsed since the entry was created
    pub fn age(&self) -> Duration {
        self.born.elapsed()
    }

    fn touch(&mut self) {
        self.hit_count += 1;
        self.last_used = Utc::now();
    }
}

pub(crate) struct CacheState<V> {
    entries: LruCache<String, CacheEntry<V>>,
    hits: u64,
    misses: u64,
}

impl<V> CacheState<V> {
    /// Remove every entry whose age exceeds `max_age`
    pub(crate) fn sweep(&mut self, max_age: Duration) -> usize {
        let expired: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.age() > max_age)
            .map(|(key, _)| key.clone())
            .collect();

        for key in &expired {
            self.entries.pop(key);
        }
        expired.len()
    }
}

/// Bounded keyed store with least-recently-used eviction
///
/// `get` refreshes recency; `set` on a full cache evicts exactly one entry,
/// the one accessed longest ago. Entries can additionally be expired by age
/// with [`ClientCache::sweep`] or the background cleanup task.
pub struct ClientCache<V> {
    state: Arc<Mutex<CacheState<V>>>,
    max_size: usize,
    sweeper: Mutex<Option<Sweeper>>,
}

impl<V: Clone + Send + 'static> ClientCache<V> {
    /// Create a cache holding at most `max_size` entries (minimum 1)
    pub fn new(max_size: usize) -> Self {
        let capacity = NonZeroUsize::new(max_size).unwrap_or(NonZeroUsize::MIN);
        Self {
            state: Arc::new(Mutex::new(CacheState {
                entries: LruCache::new(capacity),
                hits: 0,
                misses: 0,
            })),
            max_size: capacity.get(),
            sweeper: Mutex::new(None),
        }
    }

    /// Look up a value, counting a hit or a miss
    pub fn get(&self, key: &str) -> Option<V> {
        let mut state = self.state.lock();
        let value = state.entries.get_mut(key).map(|entry| {
            entry.touch();
            entry.value.clone()
        });

        if value.is_some() {
            state.hits += 1;
        } else {
            state.misses += 1;
        }
        value
    }

    /// Insert or replace a value as the most recently used entry
    pub fn set(&self, key: impl Into<String>, value: V) {
        let key = key.into();
        let mut state = self.state.lock();
        if let Some((evicted, _)) = state.entries.push(key.clone(), CacheEntry::new(value)) {
            if evicted != key {
                debug!(evicted = %evicted, inserted = %key, "Evicted least recently used client");
            }
        }
    }

    /// Remove a single entry
    pub fn delete(&self, key: &str) -> bool {
        self.state.lock().entries.pop(key).is_some()
    }

    /// Remove all entries and reset hit/miss counters
    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.entries.clear();
        state.hits = 0;
        state.misses = 0;
    }

    /// Check presence without touching recency or counters
    pub fn contains(&self, key: &str) -> bool {
        self.state.lock().entries.contains(key)
    }

    /// Peek at an entry's bookkeeping without touching recency or counters
    pub fn entry(&self, key: &str) -> Option<CacheEntry<V>> {
        self.state.lock().entries.peek(key).cloned()
    }

    /// Keys ordered from least to most recently used
    pub fn keys(&self) -> Vec<String> {
        let state = self.state.lock();
        let mut keys: Vec<String> = state.entries.iter().map(|(key, _)| key.clone()).collect();
        keys.reverse();
        keys
    }

    /// Number of live entries
    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    /// Check if the cache is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum number of entries
    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Snapshot of counters and entry ages
    pub fn stats(&self) -> CacheStats {
        let state = self.state.lock();
        let (oldest_entry, newest_entry) = state.entries.iter().fold(
            (None, None),
            |(oldest, newest): (Option<DateTime<Utc>>, Option<DateTime<Utc>>), (_, entry)| {
                (
                    Some(oldest.map_or(entry.created_at, |t| t.min(entry.created_at))),
                    Some(newest.map_or(entry.created_at, |t| t.max(entry.created_at))),
                )
            },
        );

        CacheStats {
            total_entries: state.entries.len(),
            total_hits: state.hits,
            total_misses: state.misses,
            average_hit_rate: CacheStats::hit_rate(state.hits, state.misses),
            oldest_entry,
            newest_entry,
        }
    }

    /// Remove entries older than `max_age`, returning how many were removed
    pub fn sweep(&self, max_age: Duration) -> usize {
        self.state.lock().sweep(max_age)
    }

    /// Start the periodic age sweep
    ///
    /// Returns `Ok(false)` when a sweep task is already running.
    pub fn start_cleanup(&self, interval: Duration, max_age: Duration) -> Result<bool> {
        let mut slot = self.sweeper.lock();
        if slot.as_ref().is_some_and(Sweeper::is_running) {
            return Ok(false);
        }

        *slot = Some(Sweeper::spawn(Arc::downgrade(&self.state), interval, max_age)?);
        Ok(true)
    }

    /// Stop the periodic age sweep, returning whether one was running
    pub fn stop_cleanup(&self) -> bool {
        match self.sweeper.lock().take() {
            Some(sweeper) => {
                let was_running = sweeper.is_running();
                sweeper.stop();
                was_running
            }
            None => false,
        }
    }

    /// Whether the periodic sweep is active
    pub fn is_cleanup_running(&self) -> bool {
        self.sweeper.lock().as_ref().is_some_and(Sweeper::is_running)
    }
}

impl<V: Clone + Send + 'static> Default for ClientCache<V> {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_SIZE)
    }
}

impl<V> Drop for ClientCache<V> {
    fn drop(&mut self) {
        if let Some(sweeper) = self.sweeper.get_mut().take() {
            sweeper.stop();
        }
    }
}
