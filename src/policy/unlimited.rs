//! Cache without a capacity bound.
//!
//! Every available file stays for the lifetime of the cache; `refresh` on a
//! resident entry has nothing to re-rank. Useful as a baseline and as the
//! embedded cache of a FIFO wrapper when only the queue should evict.

use rustc_hash::FxHashMap;

use crate::entry::CacheEntry;
use crate::env::CacheEnv;
use crate::error::{InvariantError, Result};
use crate::stats::{CacheStats, StatusSummary};
use crate::traits::{PolicyCore, Staging};

#[derive(Debug)]
pub struct UnlimitedCache {
    files: FxHashMap<String, CacheEntry>,
    env: CacheEnv,
    staging: Staging,
}

impl UnlimitedCache {
    pub fn new(env: CacheEnv) -> Self {
        Self {
            files: FxHashMap::default(),
            env,
            staging: Staging::default(),
        }
    }

    /// Sum of the sizes of all resident files.
    pub fn total_size(&self) -> u64 {
        self.files.values().map(|entry| entry.size).sum()
    }
}

impl PolicyCore for UnlimitedCache {
    fn name(&self) -> &str {
        "unlimited"
    }

    fn capacity(&self) -> Option<usize> {
        None
    }

    fn len(&self) -> usize {
        self.files.len()
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
        self.files.get(key)
    }

    fn resident_mut(&mut self, key: &str) -> Option<&mut CacheEntry> {
        self.files.get_mut(key)
    }

    fn admit(&mut self, key: String, entry: CacheEntry) -> Result<()> {
        self.files.insert(key, entry);
        Ok(())
    }

    fn promote(&mut self, _key: &str) -> Result<()> {
        Ok(())
    }

    // Nothing is ever evicted, so every file counts as evictable.
    fn resident_stats(&self) -> CacheStats {
        let mut stats = CacheStats::default();
        for entry in self.files.values() {
            stats.record(entry, true);
        }
        stats
    }

    fn describe(&self, summary: &mut StatusSummary) {
        summary.set_int("unlimited_total_filesize", self.total_size());
    }

    fn check_invariants(&self) -> std::result::Result<(), InvariantError> {
        match self.files.iter().find(|(key, entry)| entry.name != **key) {
            Some((key, entry)) => Err(InvariantError::new(format!(
                "entry `{}` stored under key `{key}`",
                entry.name
            ))),
            None => Ok(()),
        }
    }
}
