//! Bounded, time-aware cache for parse and detection results.
//!
//! Keyed by content fingerprints, bounded by both an entry count and an
//! optional byte budget, with LRU eviction and lazy-plus-sweep TTL expiry.
//! No module-level state: every cache is an explicit value with injected
//! configuration, so engines can run with independent or deliberately
//! shared instances.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::debug;

pub const DEFAULT_MAX_ENTRIES: usize = 1000;
pub const DEFAULT_TTL: Duration = Duration::from_secs(300);

#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub max_entries: usize,
    /// Optional byte budget over the per-entry size estimates. `None`
    /// bounds by entry count only.
    pub max_bytes: Option<u64>,
    /// TTL applied by `put`; `None` disables expiry for default puts.
    pub default_ttl: Option<Duration>,
    /// How often an incoming `put` triggers a full expiry sweep.
    pub sweep_interval: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: DEFAULT_MAX_ENTRIES,
            max_bytes: None,
            default_ttl: Some(DEFAULT_TTL),
            sweep_interval: DEFAULT_TTL,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub expirations: u64,
    pub current_size: usize,
    pub max_size: usize,
    pub current_bytes: u64,
}

/// Observable removal, delivered to the event hook after the triggering
/// call has released the cache lock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheEvent<K> {
    Evicted(K),
    Expired(K),
}

pub type EventHook<K> = Arc<dyn Fn(CacheEvent<K>) + Send + Sync>;

/// Metadata about one live entry, without touching its LRU position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryInfo {
    /// Time since the entry was inserted.
    pub age: Duration,
    /// Time since the entry was last returned by `get`.
    pub idle: Duration,
    pub size_estimate_bytes: u64,
}

struct Slot<V> {
    value: V,
    inserted_at: Instant,
    last_accessed_at: Instant,
    expires_at: Option<Instant>,
    size_estimate_bytes: u64,
    /// Monotonic access tick; the smallest tick is the LRU entry.
    tick: u64,
}

struct Inner<K, V> {
    map: HashMap<K, Slot<V>>,
    tick: u64,
    total_bytes: u64,
    last_sweep: Instant,
    hits: u64,
    misses: u64,
    evictions: u64,
    expirations: u64,
}

pub struct ResultCache<K, V> {
    config: CacheConfig,
    inner: Mutex<Inner<K, V>>,
    hook: Option<EventHook<K>>,
}

impl<K, V> ResultCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new(config: CacheConfig) -> Self {
        Self::build(config, None)
    }

    /// Cache with an observer for evictions and expirations. The hook runs
    /// outside the lock and its panics are not caught; it must not block.
    pub fn with_event_hook(config: CacheConfig, hook: EventHook<K>) -> Self {
        Self::build(config, Some(hook))
    }

    fn build(config: CacheConfig, hook: Option<EventHook<K>>) -> Self {
        Self {
            config,
            inner: Mutex::new(Inner {
                map: HashMap::new(),
                tick: 0,
                total_bytes: 0,
                last_sweep: Instant::now(),
                hits: 0,
                misses: 0,
                evictions: 0,
                expirations: 0,
            }),
            hook,
        }
    }

    /// Look up a key, refreshing its LRU position. Expired entries are
    /// reclaimed here (lazy expiry) and count as misses.
    pub fn get(&self, key: &K) -> Option<V> {
        let now = Instant::now();
        let (result, events) = {
            let mut inner = self.inner.lock().expect("cache lock poisoned");
            let expired = match inner.map.get(key) {
                None => {
                    inner.misses += 1;
                    return None;
                }
                Some(slot) => slot.expires_at.is_some_and(|at| at <= now),
            };
            if expired {
                let slot = inner.map.remove(key).expect("entry checked above");
                inner.total_bytes -= slot.size_estimate_bytes;
                inner.expirations += 1;
                inner.misses += 1;
                (None, vec![CacheEvent::Expired(key.clone())])
            } else {
                inner.tick += 1;
                let tick = inner.tick;
                let slot = inner.map.get_mut(key).expect("entry checked above");
                slot.tick = tick;
                slot.last_accessed_at = now;
                let value = slot.value.clone();
                inner.hits += 1;
                (Some(value), Vec::new())
            }
        };
        self.fire(events);
        result
    }

    /// Insert with the configured default TTL.
    pub fn put(&self, key: K, value: V, size_estimate_bytes: u64) {
        self.put_with_ttl(key, value, self.config.default_ttl, size_estimate_bytes);
    }

    /// Insert with an explicit TTL (`None` = never expires). Runs the
    /// opportunistic expiry sweep first when the sweep interval has elapsed,
    /// then evicts least-recently-used entries until both bounds hold.
    pub fn put_with_ttl(
        &self,
        key: K,
        value: V,
        ttl: Option<Duration>,
        size_estimate_bytes: u64,
    ) {
        let now = Instant::now();
        let events = {
            let mut inner = self.inner.lock().expect("cache lock poisoned");
            let mut events = Vec::new();

            if now.duration_since(inner.last_sweep) >= self.config.sweep_interval {
                Self::sweep_locked(&mut inner, now, &mut events);
            }

            if let Some(old) = inner.map.remove(&key) {
                inner.total_bytes -= old.size_estimate_bytes;
            }
            inner.tick += 1;
            let tick = inner.tick;
            inner.map.insert(
                key,
                Slot {
                    value,
                    inserted_at: now,
                    last_accessed_at: now,
                    expires_at: ttl.map(|t| now + t),
                    size_estimate_bytes,
                    tick,
                },
            );
            inner.total_bytes += size_estimate_bytes;

            while Self::over_bounds(&inner, &self.config) {
                let lru = inner
                    .map
                    .iter()
                    .min_by_key(|(_, slot)| slot.tick)
                    .map(|(k, _)| k.clone());
                match lru {
                    Some(k) => {
                        let slot = inner.map.remove(&k).expect("lru key present");
                        inner.total_bytes -= slot.size_estimate_bytes;
                        inner.evictions += 1;
                        events.push(CacheEvent::Evicted(k));
                    }
                    None => break,
                }
            }
            events
        };
        self.fire(events);
    }

    pub fn invalidate(&self, key: &K) -> bool {
        let mut inner = self.inner.lock().expect("cache lock poisoned");
        match inner.map.remove(key) {
            Some(slot) => {
                inner.total_bytes -= slot.size_estimate_bytes;
                true
            }
            None => false,
        }
    }

    pub fn clear(&self) {
        let mut inner = self.inner.lock().expect("cache lock poisoned");
        inner.map.clear();
        inner.total_bytes = 0;
    }

    /// Remove every expired entry now, regardless of the sweep interval.
    /// Returns how many entries were reclaimed.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let events = {
            let mut inner = self.inner.lock().expect("cache lock poisoned");
            let mut events = Vec::new();
            Self::sweep_locked(&mut inner, now, &mut events);
            events
        };
        let count = events.len();
        self.fire(events);
        count
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("cache lock poisoned").map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, key: &K) -> bool {
        let inner = self.inner.lock().expect("cache lock poisoned");
        inner.map.contains_key(key)
    }

    /// Inspect an entry's lifecycle without counting a hit or refreshing
    /// its LRU position.
    pub fn entry_info(&self, key: &K) -> Option<EntryInfo> {
        let now = Instant::now();
        let inner = self.inner.lock().expect("cache lock poisoned");
        inner.map.get(key).map(|slot| EntryInfo {
            age: now.duration_since(slot.inserted_at),
            idle: now.duration_since(slot.last_accessed_at),
            size_estimate_bytes: slot.size_estimate_bytes,
        })
    }

    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.lock().expect("cache lock poisoned");
        CacheStats {
            hits: inner.hits,
            misses: inner.misses,
            evictions: inner.evictions,
            expirations: inner.expirations,
            current_size: inner.map.len(),
            max_size: self.config.max_entries,
            current_bytes: inner.total_bytes,
        }
    }

    fn over_bounds(inner: &Inner<K, V>, config: &CacheConfig) -> bool {
        if inner.map.len() > config.max_entries {
            return true;
        }
        match config.max_bytes {
            Some(budget) => inner.total_bytes > budget && inner.map.len() > 1,
            None => false,
        }
    }

    fn sweep_locked(inner: &mut Inner<K, V>, now: Instant, events: &mut Vec<CacheEvent<K>>) {
        let expired: Vec<K> = inner
            .map
            .iter()
            .filter(|(_, slot)| slot.expires_at.is_some_and(|at| at <= now))
            .map(|(k, _)| k.clone())
            .collect();
        for k in expired {
            let slot = inner.map.remove(&k).expect("expired key present");
            inner.total_bytes -= slot.size_estimate_bytes;
            inner.expirations += 1;
            events.push(CacheEvent::Expired(k));
        }
        inner.last_sweep = now;
    }

    fn fire(&self, events: Vec<CacheEvent<K>>) {
        if events.is_empty() {
            return;
        }
        debug!(count = events.len(), "cache reclaimed entries");
        if let Some(hook) = &self.hook {
            for event in events {
                hook(event);
            }
        }
    }
}
