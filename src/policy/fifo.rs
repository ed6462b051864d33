//! # FIFO pre-admission wrapper
//!
//! Puts a bounded FIFO buffer in front of any other policy. Files nobody has
//! asked for yet (speculative or prefetched output) wait in the buffer; the
//! first client access seen at refresh time moves them into the embedded
//! cache, where they take part in its working-set model.
//!
//! ```text
//!   put(X) ── use_count == 0 ──► FIFO   [oldest ... newest]  ── full ──► evict oldest unpinned
//!          └─ use_count  > 0 ──► embedded.put(X)
//!
//!   refresh(X in FIFO) ── use_count == 0 ──► stays, moved to newest
//!                      └─ use_count  > 0 ──► embedded.put(X)   (may evict there)
//! ```
//!
//! The buffer keeps its own eviction counter (`fifo_evictions`); evictions
//! inside the embedded cache are counted by the embedded cache.

use std::fmt;

use tracing::{debug, warn};

use crate::ds::OrderedMap;
use crate::entry::CacheEntry;
use crate::env::CacheEnv;
use crate::error::{CacheError, ConfigError, InvariantError, Result};
use crate::policy::{discard_file, report_exhausted};
use crate::stats::{CacheStats, StatusSummary};
use crate::traits::{FileCache, PolicyCore, Staging};

pub struct FifoWrapper {
    embedded: Box<dyn FileCache>,
    fifo: OrderedMap<String, CacheEntry>,
    fifo_capacity: usize,
    name: String,
    env: CacheEnv,
    staging: Staging,
}

impl FifoWrapper {
    pub fn new(
        env: CacheEnv,
        embedded: Box<dyn FileCache>,
        fifo_capacity: usize,
    ) -> std::result::Result<Self, ConfigError> {
        if fifo_capacity == 0 {
            return Err(ConfigError::new("FIFO queue size must be > 0"));
        }
        let name = format!("FIFO+{}", embedded.name());
        Ok(Self {
            embedded,
            fifo: OrderedMap::new(fifo_capacity),
            fifo_capacity,
            name,
            env,
            staging: Staging::default(),
        })
    }

    pub fn fifo_capacity(&self) -> usize {
        self.fifo_capacity
    }

    pub fn fifo_len(&self) -> usize {
        self.fifo.len()
    }

    pub fn in_fifo(&self, key: &str) -> bool {
        self.fifo.contains_key(key)
    }

    /// Buffered keys, oldest first.
    pub fn fifo_keys(&self) -> impl Iterator<Item = &str> {
        self.fifo.iter().map(|(_, key, _)| key.as_str())
    }

    pub fn embedded(&self) -> &dyn FileCache {
        self.embedded.as_ref()
    }

    fn fifo_add(&mut self, key: String, entry: CacheEntry) -> Result<()> {
        if self.fifo.len() < self.fifo_capacity {
            self.fifo.add(key, entry)?;
            return Ok(());
        }
        match self
            .fifo
            .find_first_with_predicate(CacheEntry::is_evictable, false, 0)
        {
            Some(victim) => {
                if let Some(old) = self.fifo.get(victim) {
                    discard_file(&self.env, &self.name, old);
                }
                self.staging.counters.fifo_evictions += 1;
                self.fifo.replace(victim, key, entry);
            }
            None => {
                report_exhausted(
                    &self.name,
                    "FIFO",
                    self.fifo_capacity,
                    &mut self.staging.counters,
                );
                self.fifo.add(key, entry)?;
            }
        }
        Ok(())
    }
}

impl fmt::Debug for FifoWrapper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FifoWrapper")
            .field("name", &self.name)
            .field("fifo_capacity", &self.fifo_capacity)
            .field("fifo_len", &self.fifo.len())
            .field("embedded_len", &self.embedded.len())
            .finish_non_exhaustive()
    }
}

impl PolicyCore for FifoWrapper {
    fn name(&self) -> &str {
        &self.name
    }

    fn capacity(&self) -> Option<usize> {
        self.embedded
            .capacity()
            .map(|capacity| capacity + self.fifo_capacity)
    }

    fn len(&self) -> usize {
        self.fifo.len() + self.embedded.len()
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

    fn prepare(&self, entry: &mut CacheEntry) {
        entry.cost = self.env.producer.cost(&entry.name);
    }

    fn resident(&self, key: &str) -> Option<&CacheEntry> {
        self.embedded
            .internal_lookup(key)
            .or_else(|| self.fifo.get_by_key(key))
    }

    fn resident_mut(&mut self, key: &str) -> Option<&mut CacheEntry> {
        if self.embedded.internal_lookup(key).is_some() {
            return self.embedded.entry_mut(key);
        }
        self.fifo.get_by_key_mut(key)
    }

    fn admit(&mut self, key: String, entry: CacheEntry) -> Result<()> {
        if entry.use_count() > 0 {
            debug!(cache = %self.name, key = %key, "requested entry goes to the embedded cache");
            self.embedded.put(&key, entry)
        } else {
            debug!(cache = %self.name, key = %key, "unrequested entry goes to the FIFO queue");
            self.fifo_add(key, entry)
        }
    }

    fn promote(&mut self, key: &str) -> Result<()> {
        if self.embedded.internal_lookup(key).is_some() {
            if self.fifo.contains_key(key) {
                warn!(cache = %self.name, key, "key is in the FIFO queue and the embedded cache");
                return Err(CacheError::protocol(key, "key held by FIFO queue and embedded cache"));
            }
            return self.embedded.refresh(key);
        }

        let Some(id) = self.fifo.find(key) else {
            return Err(CacheError::protocol(key, "refresh on unknown key"));
        };
        let (path, requested) = match self.fifo.get(id) {
            Some(entry) => (entry.path.clone(), entry.use_count() > 0),
            None => return Err(CacheError::protocol(key, "refresh on unknown key")),
        };
        if !self.env.storage.file_exists(&path) {
            warn!(cache = %self.name, key, path = %path.display(), "queued entry has no file");
            return Err(CacheError::storage(key, "queued entry missing from storage"));
        }

        if requested {
            let Some(entry) = self.fifo.get(id).cloned() else {
                return Err(CacheError::protocol(key, "refresh on unknown key"));
            };
            debug!(cache = %self.name, key, "moving requested entry out of the FIFO queue");
            self.embedded.put(key, entry)?;
            self.fifo.erase(id);
        } else {
            self.fifo.refresh_with_id(id);
        }
        Ok(())
    }

    fn warm_start_target(&mut self) -> Option<&mut dyn FileCache> {
        Some(self.embedded.as_mut())
    }

    fn observe_get(&mut self, key: &str) {
        self.embedded.observe_get(key);
    }

    fn resident_stats(&self) -> CacheStats {
        self.embedded.stats() + CacheStats::of_map(&self.fifo)
    }

    fn describe(&self, summary: &mut StatusSummary) {
        summary.set_int("fifo_capacity", self.fifo_capacity as u64);
        summary.set_int("fifo_size", self.fifo.len() as u64);
        summary.set_text("embedded_name", self.embedded.name());
        summary.set_int("embedded_size", self.embedded.len() as u64);
        summary.set_int("embedded_evictions", self.embedded.counters().evictions);
    }

    fn check_invariants(&self) -> std::result::Result<(), InvariantError> {
        self.fifo.check_invariants()?;
        self.embedded.check_invariants()?;
        for (_, key, entry) in self.fifo.iter() {
            if !entry.available {
                return Err(InvariantError::new(format!(
                    "unavailable entry `{key}` in the FIFO queue"
                )));
            }
            if self.embedded.internal_lookup(key).is_some() {
                return Err(InvariantError::new(format!(
                    "`{key}` held by FIFO queue and embedded cache"
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::*;
    use crate::policy::lru::LruCache;
    use crate::policy::{LirsCache, UnlimitedCache};
    use crate::policy::test_support::{env, put_file, touch};
    use crate::storage::Storage;

    fn wrapper(fifo: usize, lru: usize) -> (FifoWrapper, std::sync::Arc<crate::storage::MemoryStorage>) {
        let (env, storage) = env();
        let embedded = LruCache::new(env.clone(), lru).unwrap();
        (FifoWrapper::new(env, Box::new(embedded), fifo).unwrap(), storage)
    }

    #[test]
    fn name_and_capacity_combine_both_parts() {
        let (cache, _storage) = wrapper(2, 3);
        assert_eq!(cache.name(), "FIFO+LRU");
        assert_eq!(cache.capacity(), Some(5));

        let (env, _storage) = env();
        let unlimited = FifoWrapper::new(env.clone(), Box::new(UnlimitedCache::new(env)), 2).unwrap();
        assert_eq!(unlimited.name(), "FIFO+unlimited");
        assert_eq!(unlimited.capacity(), None);
    }

    #[test]
    fn zero_queue_is_rejected() {
        let (env, _storage) = env();
        let embedded = LruCache::new(env.clone(), 2).unwrap();
        assert!(FifoWrapper::new(env, Box::new(embedded), 0).is_err());
    }

    #[test]
    fn unrequested_files_are_buffered() {
        let (mut cache, storage) = wrapper(2, 2);
        put_file(&mut cache, &storage, "A");
        assert!(cache.in_fifo("A"));
        assert_eq!(cache.embedded().len(), 0);

        storage.insert_file("B", 1);
        let mut requested = CacheEntry::available("B", "B", 1);
        requested.record_use();
        cache.put("B", requested).unwrap();
        assert!(!cache.in_fifo("B"));
        assert!(cache.embedded().internal_lookup("B").is_some());
        cache.check_invariants().unwrap();
    }

    #[test]
    fn first_access_moves_entry_into_embedded_cache() {
        let (mut cache, storage) = wrapper(2, 2);
        put_file(&mut cache, &storage, "A");
        touch(&mut cache, "A");

        assert!(!cache.in_fifo("A"));
        assert!(cache.embedded().internal_lookup("A").is_some());
        assert_eq!(cache.len(), 1);
        cache.check_invariants().unwrap();
    }

    #[test]
    fn refresh_without_use_stays_in_queue() {
        let (mut cache, storage) = wrapper(2, 2);
        put_file(&mut cache, &storage, "A");
        put_file(&mut cache, &storage, "B");
        cache.refresh("A").unwrap();

        assert_eq!(cache.fifo_keys().collect::<Vec<_>>(), vec!["B", "A"]);
    }

    #[test]
    fn full_queue_drops_oldest_unpinned() {
        let (mut cache, storage) = wrapper(2, 2);
        put_file(&mut cache, &storage, "A");
        put_file(&mut cache, &storage, "B");
        cache.entry_mut("A").unwrap().begin_write();
        put_file(&mut cache, &storage, "C");

        assert_eq!(cache.fifo_keys().collect::<Vec<_>>(), vec!["A", "C"]);
        assert!(!storage.file_exists(Path::new("B")));
        assert_eq!(cache.counters().fifo_evictions, 1);
        assert_eq!(cache.counters().evictions, 0);
    }

    #[test]
    fn queued_entry_without_file_is_inconsistent() {
        let (mut cache, storage) = wrapper(2, 2);
        put_file(&mut cache, &storage, "A");
        storage.remove_file(Path::new("A")).unwrap();

        let err = cache.refresh("A").unwrap_err();
        assert!(matches!(err, CacheError::StorageInconsistency { .. }));
        assert!(cache.in_fifo("A"));
    }

    #[test]
    fn staged_entry_follows_its_use_count() {
        let (mut cache, storage) = wrapper(2, 2);
        cache.put("A", CacheEntry::pending("A", "A")).unwrap();
        cache.put("B", CacheEntry::pending("B", "B")).unwrap();
        cache.entry_mut("B").unwrap().lock();
        cache.entry_mut("B").unwrap().unlock().unwrap();

        for key in ["A", "B"] {
            storage.insert_file(key, 4);
            cache.mark_available(key).unwrap();
            cache.refresh(key).unwrap();
        }
        assert!(cache.in_fifo("A"));
        assert!(cache.embedded().internal_lookup("B").is_some());
        assert_eq!(cache.waiting_len(), 0);
        assert_eq!(cache.stats().bytes_all, 8);
    }

    #[test]
    fn rejected_move_leaves_entry_queued() {
        let (env, storage) = env();
        let embedded = LirsCache::new(env.clone(), 3, 2).unwrap();
        let mut cache = FifoWrapper::new(env, Box::new(embedded), 2).unwrap();
        for key in ["A", "B", "C"] {
            storage.insert_file(key, 1);
            let mut entry = CacheEntry::available(key, key, 1);
            entry.record_use();
            cache.put(key, entry).unwrap();
        }
        cache.entry_mut("C").unwrap().lock();
        put_file(&mut cache, &storage, "X");

        assert!(cache.get("X").is_some());
        cache.entry_mut("X").unwrap().record_use();
        let err = cache.refresh("X").unwrap_err();
        assert!(err.is_fatal());
        assert!(cache.in_fifo("X"));
        assert!(cache.embedded().internal_lookup("X").is_none());
        assert!(storage.file_exists(Path::new("X")));
        cache.check_invariants().unwrap();

        cache.entry_mut("C").unwrap().unlock().unwrap();
        cache.refresh("X").unwrap();
        assert!(!cache.in_fifo("X"));
        assert!(cache.embedded().internal_lookup("X").is_some());
        cache.check_invariants().unwrap();
    }

    #[test]
    fn summary_reports_both_parts() {
        let (mut cache, storage) = wrapper(2, 3);
        put_file(&mut cache, &storage, "A");
        let summary = cache.status_summary();
        assert_eq!(summary.int("fifo_size"), Some(1));
        assert_eq!(summary.int("embedded_size"), Some(0));
        assert_eq!(summary.int("cache_capacity"), Some(5));
    }
}
