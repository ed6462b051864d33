//! # Least Recently Used (LRU) Policy
//!
//! Baseline recency policy over one [`OrderedMap`] of entries.
//!
//! ```text
//!   capacity = 3, C pinned
//!
//!   LRU ─► [A] ◄──► [C*] ◄──► [B] ◄── MRU
//!
//!   refresh(A):   [C*] [B] [A]
//!   put(D):       victim = first unpinned from the LRU end = B
//!                 slot of B is reused for D:   [C*] [A] [D]
//! ```
//!
//! The victim search has no reserved region, so the MRU itself may go when
//! everything else is pinned. If every entry is pinned the map grows past its
//! declared capacity and the condition is logged.

use crate::ds::OrderedMap;
use crate::entry::CacheEntry;
use crate::env::CacheEnv;
use crate::error::{CacheError, ConfigError, InvariantError, Result};
use crate::policy::{discard_file, report_exhausted};
use crate::stats::{CacheStats, StatusSummary};
use crate::traits::{PolicyCore, Staging};

#[derive(Debug)]
pub struct LruCache {
    map: OrderedMap<String, CacheEntry>,
    capacity: usize,
    env: CacheEnv,
    staging: Staging,
}

impl LruCache {
    pub fn new(env: CacheEnv, capacity: usize) -> std::result::Result<Self, ConfigError> {
        if capacity == 0 {
            return Err(ConfigError::new("LRU capacity must be > 0"));
        }
        Ok(Self {
            map: OrderedMap::new(capacity),
            capacity,
            env,
            staging: Staging::default(),
        })
    }

    /// Resident keys from least to most recently used.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.map.iter().map(|(_, key, _)| key.as_str())
    }
}

impl PolicyCore for LruCache {
    fn name(&self) -> &str {
        "LRU"
    }

    fn capacity(&self) -> Option<usize> {
        Some(self.capacity)
    }

    fn len(&self) -> usize {
        self.map.len()
    }

    fn env(&self) -> &CacheEnv {
        &self.env
    }

    fn staging(&self) -> &Staging {
        &self.staging
    }

    fn staging_mut(&mut self) -> &mut Staging {
        &mut self.staging
    }

    fn resident(&self, key: &str) -> Option<&CacheEntry> {
        self.map.get_by_key(key)
    }

    fn resident_mut(&mut self, key: &str) -> Option<&mut CacheEntry> {
        self.map.get_by_key_mut(key)
    }

    fn admit(&mut self, key: String, entry: CacheEntry) -> Result<()> {
        if self.map.len() < self.capacity {
            self.map.add(key, entry)?;
            return Ok(());
        }
        match self
            .map
            .find_first_with_predicate(CacheEntry::is_evictable, false, 0)
        {
            Some(victim) => {
                if let Some(old) = self.map.get(victim) {
                    discard_file(&self.env, "LRU", old);
                }
                self.staging.counters.evictions += 1;
                self.map.replace(victim, key, entry);
            }
            None => {
                report_exhausted("LRU", "LRU", self.capacity, &mut self.staging.counters);
                self.map.add(key, entry)?;
            }
        }
        Ok(())
    }

    fn promote(&mut self, key: &str) -> Result<()> {
        if self.map.refresh_with_key(key) {
            Ok(())
        } else {
            Err(CacheError::protocol(key, "refresh on unknown key"))
        }
    }

    fn resident_stats(&self) -> CacheStats {
        CacheStats::of_map(&self.map)
    }

    fn describe(&self, summary: &mut StatusSummary) {
        summary.set_int("lru_size", self.map.len() as u64);
    }

    fn check_invariants(&self) -> std::result::Result<(), InvariantError> {
        self.map.check_invariants()?;
        if self.map.iter().any(|(_, _, entry)| !entry.available) {
            return Err(InvariantError::new("unavailable entry in the ranked map"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::*;
    use crate::policy::test_support::{env, put_file, touch};
    use crate::storage::Storage;
    use crate::traits::FileCache;

    fn keys(cache: &LruCache) -> Vec<&str> {
        cache.keys().collect()
    }

    mod eviction {
        use super::*;

        #[test]
        fn evicts_least_recently_touched() {
            let (env, storage) = env();
            let mut cache = LruCache::new(env, 3).unwrap();
            for key in ["A", "B", "C"] {
                put_file(&mut cache, &storage, key);
            }
            touch(&mut cache, "A");
            put_file(&mut cache, &storage, "D");

            assert_eq!(cache.len(), 3);
            assert_eq!(keys(&cache), vec!["C", "A", "D"]);
            assert!(!storage.file_exists(Path::new("B")));
            assert_eq!(cache.counters().evictions, 1);
            cache.check_invariants().unwrap();
        }

        #[test]
        fn pinned_head_is_skipped() {
            let (env, storage) = env();
            let mut cache = LruCache::new(env, 2).unwrap();
            put_file(&mut cache, &storage, "A");
            put_file(&mut cache, &storage, "B");
            cache.entry_mut("A").unwrap().lock();

            put_file(&mut cache, &storage, "C");
            assert_eq!(keys(&cache), vec!["A", "C"]);
            assert!(storage.file_exists(Path::new("A")));
        }

        #[test]
        fn tail_may_be_chosen_when_rest_is_pinned() {
            let (env, storage) = env();
            let mut cache = LruCache::new(env, 2).unwrap();
            put_file(&mut cache, &storage, "A");
            put_file(&mut cache, &storage, "B");
            cache.entry_mut("A").unwrap().begin_write();

            put_file(&mut cache, &storage, "C");
            assert_eq!(keys(&cache), vec!["A", "C"]);
        }

        #[test]
        fn all_pinned_grows_past_capacity() {
            let (env, storage) = env();
            let mut cache = LruCache::new(env, 2).unwrap();
            put_file(&mut cache, &storage, "A");
            put_file(&mut cache, &storage, "B");
            cache.entry_mut("A").unwrap().lock();
            cache.entry_mut("B").unwrap().lock();

            put_file(&mut cache, &storage, "C");
            assert_eq!(cache.len(), 3);
            assert_eq!(cache.counters().eviction_failures, 1);
            assert_eq!(cache.counters().evictions, 0);
            cache.check_invariants().unwrap();
        }
    }

    mod protocol {
        use super::*;

        #[test]
        fn double_put_is_rejected_without_change() {
            let (env, storage) = env();
            let mut cache = LruCache::new(env, 2).unwrap();
            put_file(&mut cache, &storage, "A");
            let err = cache
                .put("A", CacheEntry::available("A", "A", 9))
                .unwrap_err();
            assert!(matches!(err, CacheError::ProtocolViolation { .. }));
            assert_eq!(cache.internal_lookup("A").unwrap().size, 1);
        }

        #[test]
        fn refresh_of_unknown_key_fails() {
            let (env, _storage) = env();
            let mut cache = LruCache::new(env, 2).unwrap();
            assert!(matches!(
                cache.refresh("nope"),
                Err(CacheError::ProtocolViolation { .. })
            ));
        }

        #[test]
        fn zero_capacity_is_rejected() {
            let (env, _storage) = env();
            assert!(LruCache::new(env, 0).is_err());
        }
    }
}
