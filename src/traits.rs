//! # Cache Protocol Traits
//!
//! Every replacement policy speaks the same put/get/refresh protocol. The
//! protocol itself, including the double-insertion guard and the waiting-list
//! staging rule, is written once in [`FileCache`]; a policy only supplies the
//! hooks of [`PolicyCore`].
//!
//! ## Architecture
//!
//! ```text
//!   ┌──────────────────────────────────────────────────────────────────┐
//!   │                      FileCache (provided)                        │
//!   │                                                                  │
//!   │  put(key, entry)        guard ─► admit | stage                   │
//!   │  get(key)               trace ─► observe_get ─► resident|staged  │
//!   │  refresh(key)           promote | admit staged | no-op | error   │
//!   │  internal_lookup(key)   resident | staged, no side effects       │
//!   │  stats() / status_summary() / initialize_with_files()            │
//!   └───────────────────────────────┬──────────────────────────────────┘
//!                                   │ blanket impl
//!   ┌───────────────────────────────▼──────────────────────────────────┐
//!   │                    PolicyCore (per policy)                       │
//!   │                                                                  │
//!   │  resident / resident_mut     lookup in ranked structures         │
//!   │  admit(key, entry)           insert an available entry           │
//!   │  promote(key)                re-reference a resident entry       │
//!   │  prepare / on_stage / observe_get   optional hooks               │
//!   │  staging / staging_mut       waiting map, trace, counters        │
//!   └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Waiting-list staging
//!
//! ```text
//!   put(X, available=false) ──► waiting["X"]          (not ranked, not counted)
//!   get(X)                  ──► staged entry          (staged_hits += 1)
//!   mark_available(X)       ──► waiting["X"].available = true
//!   refresh(X)              ──► storage has X? ─ yes ─► admit(X)  (may evict)
//!                                              └ no ──► StorageInconsistency
//! ```
//!
//! Every error is raised before any structure changes.

use tracing::{debug, warn};

use rustc_hash::FxHashMap;

use crate::entry::CacheEntry;
use crate::env::CacheEnv;
use crate::error::{CacheError, InvariantError, Result};
use crate::stats::{CacheCounters, CacheStats, StatusSummary};

/// Protocol state shared by all policies: entries waiting for their file,
/// the access trace and the event counters.
#[derive(Debug, Default)]
pub struct Staging {
    pub waiting: FxHashMap<String, CacheEntry>,
    pub access_trace: Vec<String>,
    pub counters: CacheCounters,
}

/// Policy-specific hooks behind the shared protocol.
pub trait PolicyCore {
    fn name(&self) -> &str;

    /// Declared number of resident entries; `None` for an unbounded cache.
    fn capacity(&self) -> Option<usize>;

    /// Entries currently held in ranked structures.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn env(&self) -> &CacheEnv;

    fn staging(&self) -> &Staging;

    fn staging_mut(&mut self) -> &mut Staging;

    /// Fills policy-owned fields of a new entry (cost, partition) at put time.
    fn prepare(&self, _entry: &mut CacheEntry) {}

    fn resident(&self, key: &str) -> Option<&CacheEntry>;

    fn resident_mut(&mut self, key: &str) -> Option<&mut CacheEntry>;

    /// Inserts an available entry not yet held by any ranked structure,
    /// evicting a victim when full.
    fn admit(&mut self, key: String, entry: CacheEntry) -> Result<()>;

    /// Re-references a resident, available entry.
    fn promote(&mut self, key: &str) -> Result<()>;

    /// Called before an unavailable entry enters the waiting map.
    fn on_stage(&mut self, _key: &str) {}

    /// Called on every client `get`, before the lookup.
    fn observe_get(&mut self, _key: &str) {}

    /// Totals over the ranked structures.
    fn resident_stats(&self) -> CacheStats;

    /// Adds policy-specific fields to the status summary.
    fn describe(&self, _summary: &mut StatusSummary) {}

    /// Cache that receives warm-start files in place of this one.
    fn warm_start_target(&mut self) -> Option<&mut dyn FileCache> {
        None
    }

    fn check_invariants(&self) -> std::result::Result<(), InvariantError>;
}

/// The caller-facing put/get/refresh protocol.
pub trait FileCache: PolicyCore {
    /// Registers a file with the cache.
    ///
    /// Available entries are admitted into the ranked structures; the others
    /// wait in the staging map until [`FileCache::refresh`] confirms their
    /// file. A key already cached or waiting is rejected unchanged.
    fn put(&mut self, key: &str, mut entry: CacheEntry) -> Result<()> {
        if self.resident(key).is_some() || self.staging().waiting.contains_key(key) {
            warn!(cache = %self.name(), key, "put on a key that is already cached");
            return Err(CacheError::protocol(key, "key already present"));
        }
        if entry.name != key {
            entry.name = key.to_owned();
        }
        self.prepare(&mut entry);
        if entry.available {
            debug!(cache = %self.name(), key, cost = entry.cost, "admitting entry");
            self.admit(key.to_owned(), entry)
        } else {
            debug!(cache = %self.name(), key, "staging entry until its file exists");
            self.on_stage(key);
            self.staging_mut().waiting.insert(key.to_owned(), entry);
            Ok(())
        }
    }

    /// Looks `key` up on behalf of a client and records the access.
    fn get(&mut self, key: &str) -> Option<&CacheEntry> {
        self.staging_mut().access_trace.push(key.to_owned());
        self.observe_get(key);

        let resident = self.resident(key).is_some();
        let waiting = self.staging().waiting.contains_key(key);
        if resident && waiting {
            warn!(cache = %self.name(), key, "key is both cached and waiting");
        }
        if resident {
            self.staging_mut().counters.hits += 1;
            self.resident(key)
        } else if waiting {
            self.staging_mut().counters.staged_hits += 1;
            self.staging().waiting.get(key)
        } else {
            self.staging_mut().counters.misses += 1;
            None
        }
    }

    /// Lookup without trace recording or counter updates.
    fn internal_lookup(&self, key: &str) -> Option<&CacheEntry> {
        self.resident(key)
            .or_else(|| self.staging().waiting.get(key))
    }

    /// Mutable access to a cached or waiting entry, for pinning.
    fn entry_mut(&mut self, key: &str) -> Option<&mut CacheEntry> {
        if self.resident(key).is_some() {
            return self.resident_mut(key);
        }
        self.staging_mut().waiting.get_mut(key)
    }

    /// Flags a waiting entry as produced and records its file size.
    fn mark_available(&mut self, key: &str) -> Result<()> {
        if self.resident(key).is_some() {
            return Ok(());
        }
        let storage = self.env().storage.clone();
        let entry = self
            .staging_mut()
            .waiting
            .get_mut(key)
            .ok_or_else(|| CacheError::protocol(key, "mark_available on unknown key"))?;
        entry.available = true;
        if let Ok(size) = storage.file_size(&entry.path) {
            entry.size = size;
        }
        Ok(())
    }

    /// Re-ranks `key` after a successful client access, or promotes it out
    /// of the waiting map once its file exists.
    fn refresh(&mut self, key: &str) -> Result<()> {
        let resident = self.resident(key).map(|entry| entry.available);
        let waiting = self
            .staging()
            .waiting
            .get(key)
            .map(|entry| (entry.available, entry.path.clone()));

        match (resident, waiting) {
            (Some(_), Some(_)) => {
                warn!(cache = %self.name(), key, "refresh on a key that is both cached and waiting");
                Err(CacheError::protocol(key, "key is both cached and waiting"))
            }
            (Some(true), None) => self.promote(key),
            (Some(false), None) => {
                warn!(cache = %self.name(), key, "ranked entry is not available");
                Err(CacheError::protocol(key, "ranked entry marked unavailable"))
            }
            (None, Some((true, path))) => {
                if !self.env().storage.file_exists(&path) {
                    warn!(cache = %self.name(), key, path = %path.display(), "waiting entry has no file");
                    return Err(CacheError::storage(key, "available entry missing from storage"));
                }
                let Some(entry) = self.staging().waiting.get(key).cloned() else {
                    return Err(CacheError::protocol(key, "waiting entry vanished"));
                };
                debug!(cache = %self.name(), key, "promoting waiting entry");
                // stays staged unless the policy takes it
                self.admit(key.to_owned(), entry)?;
                self.staging_mut().waiting.remove(key);
                Ok(())
            }
            (None, Some((false, _))) => Ok(()),
            (None, None) => {
                warn!(cache = %self.name(), key, "refresh on unknown key");
                Err(CacheError::protocol(key, "refresh on unknown key"))
            }
        }
    }

    fn stats(&self) -> CacheStats {
        self.resident_stats()
    }

    fn waiting_len(&self) -> usize {
        self.staging().waiting.len()
    }

    fn status_summary(&self) -> StatusSummary {
        let mut summary = StatusSummary::standard(
            self.name(),
            self.capacity(),
            &self.stats(),
            self.waiting_len(),
        );
        self.describe(&mut summary);
        summary
    }

    /// Keys passed to [`FileCache::get`], oldest first.
    fn access_trace(&self) -> &[String] {
        &self.staging().access_trace
    }

    fn counters(&self) -> CacheCounters {
        self.staging().counters
    }

    /// Seeds the cache with the result files already present on storage.
    ///
    /// Returns the number of files admitted.
    fn initialize_with_files(&mut self) -> Result<usize> {
        if let Some(target) = self.warm_start_target() {
            return target.initialize_with_files();
        }
        let env = self.env().clone();
        let files = match env.storage.list_files() {
            Ok(files) => files,
            Err(err) => {
                warn!(cache = %self.name(), error = %err, "cannot enumerate storage");
                return Ok(0);
            }
        };

        let mut admitted = 0;
        for file in files {
            if !env.producer.is_result_file(&file.name) || self.internal_lookup(&file.name).is_some() {
                continue;
            }
            let size = env.storage.file_size(&file.path).unwrap_or_else(|err| {
                warn!(cache = %self.name(), key = %file.name, error = %err, "cannot size file");
                0
            });
            let entry = CacheEntry::available(file.name.clone(), file.path, size);
            self.put(&file.name, entry)?;
            admitted += 1;
        }
        debug!(cache = %self.name(), admitted, "warm start finished");
        Ok(admitted)
    }
}

impl<C: PolicyCore> FileCache for C {}
