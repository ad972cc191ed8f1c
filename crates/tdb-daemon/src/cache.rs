//! Per-process TTL cache with lazy eviction.
//!
//! Entries are checked on read: an expired entry is removed and reported as
//! a miss. Inserts sweep every expired entry once the map reaches the sweep
//! threshold, which then doubles relative to what survived. Nothing runs in
//! the background.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Mutex;
use std::time::{Duration, Instant};

pub const DEFAULT_SWEEP_THRESHOLD: usize = 1024;

struct Entries<K, V> {
    map: HashMap<K, (Instant, V)>,
    sweep_at: usize,
}

pub struct TtlCache<K, V> {
    ttl: Duration,
    min_sweep_at: usize,
    entries: Mutex<Entries<K, V>>,
}

impl<K: Eq + Hash, V: Clone> TtlCache<K, V> {
    pub fn new(ttl: Duration) -> Self {
        Self::with_sweep_threshold(ttl, DEFAULT_SWEEP_THRESHOLD)
    }

    pub fn with_sweep_threshold(ttl: Duration, threshold: usize) -> Self {
        let min_sweep_at = threshold.max(1);
        Self {
            ttl,
            min_sweep_at,
            entries: Mutex::new(Entries {
                map: HashMap::new(),
                sweep_at: min_sweep_at,
            }),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn get(&self, key: &K) -> Option<V> {
        self.get_at(key, Instant::now())
    }

    pub fn get_at(&self, key: &K, now: Instant) -> Option<V> {
        let mut entries = self.entries.lock().ok()?;
        match entries.map.get(key) {
            Some((stored_at, v)) if now.saturating_duration_since(*stored_at) < self.ttl => {
                Some(v.clone())
            }
            Some(_) => {
                entries.map.remove(key);
                None
            }
            None => None,
        }
    }

    pub fn insert(&self, key: K, value: V) {
        self.insert_at(key, value, Instant::now());
    }

    pub fn insert_at(&self, key: K, value: V, now: Instant) {
        let Ok(mut entries) = self.entries.lock() else {
            return;
        };
        if entries.map.len() >= entries.sweep_at {
            let ttl = self.ttl;
            entries
                .map
                .retain(|_, (stored_at, _)| now.saturating_duration_since(*stored_at) < ttl);
            entries.sweep_at = self.min_sweep_at.max(entries.map.len() * 2);
        }
        entries.map.insert(key, (now, value));
    }

    /// Entries currently held, expired or not.
    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.map.len()).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hit_before_ttl_miss_after() {
        let cache: TtlCache<String, u32> = TtlCache::new(Duration::from_millis(100));
        let t0 = Instant::now();
        cache.insert_at("u1".into(), 7, t0);

        assert_eq!(cache.get_at(&"u1".into(), t0 + Duration::from_millis(99)), Some(7));
        assert_eq!(cache.get_at(&"u1".into(), t0 + Duration::from_millis(100)), None);
        // lazily evicted on the expired read
        assert!(cache.is_empty());
    }

    #[test]
    fn keys_are_independent() {
        let cache: TtlCache<String, u32> = TtlCache::new(Duration::from_secs(5));
        let t0 = Instant::now();
        cache.insert_at("a".into(), 1, t0);
        cache.insert_at("b".into(), 2, t0 + Duration::from_secs(4));

        let later = t0 + Duration::from_secs(6);
        assert_eq!(cache.get_at(&"a".into(), later), None);
        assert_eq!(cache.get_at(&"b".into(), later), Some(2));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn insert_sweeps_expired_entries_past_threshold() {
        let cache: TtlCache<u32, u32> = TtlCache::with_sweep_threshold(Duration::from_secs(5), 4);
        let t0 = Instant::now();
        for k in 0..4 {
            cache.insert_at(k, k, t0);
        }
        assert_eq!(cache.len(), 4);

        cache.insert_at(99, 99, t0 + Duration::from_secs(10));
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get_at(&99, t0 + Duration::from_secs(11)), Some(99));
    }

    #[test]
    fn live_entries_survive_a_sweep() {
        let cache: TtlCache<u32, u32> = TtlCache::with_sweep_threshold(Duration::from_secs(5), 2);
        let t0 = Instant::now();
        cache.insert_at(1, 1, t0);
        cache.insert_at(2, 2, t0 + Duration::from_secs(4));
        cache.insert_at(3, 3, t0 + Duration::from_secs(6));

        // key 1 expired; key 2 is still fresh
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get_at(&2, t0 + Duration::from_secs(6)), Some(2));
    }
}
