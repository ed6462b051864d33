//! Collaborators a cache consults while it runs.
//!
//! [`CacheEnv`] bundles the storage backend with the [`ProducerModel`], the
//! view the cache has of the simulation that produces files: what a file
//! costs to regenerate, which partition (output batch) it belongs to and its
//! position inside that batch.

use std::sync::Arc;

use crate::entry::Cost;
use crate::storage::{MemoryStorage, Storage};

pub trait ProducerModel: Send + Sync {
    /// Regeneration cost of the file called `name`.
    fn cost(&self, name: &str) -> Cost;

    fn partition_key(&self, _name: &str) -> u64 {
        0
    }

    fn sequence_number(&self, _name: &str) -> u64 {
        0
    }

    /// Whether a file found at warm start is simulation output.
    fn is_result_file(&self, _name: &str) -> bool {
        true
    }
}

/// Producer model that charges the same cost for every file.
#[derive(Debug, Clone, Copy, Default)]
pub struct FlatProducer(pub Cost);

impl ProducerModel for FlatProducer {
    fn cost(&self, _name: &str) -> Cost {
        self.0
    }
}

#[derive(Clone)]
pub struct CacheEnv {
    pub storage: Arc<dyn Storage>,
    pub producer: Arc<dyn ProducerModel>,
}

impl CacheEnv {
    pub fn new(storage: Arc<dyn Storage>, producer: Arc<dyn ProducerModel>) -> Self {
        Self { storage, producer }
    }

    /// Environment over `storage` with a zero-cost producer.
    pub fn with_storage(storage: Arc<dyn Storage>) -> Self {
        Self::new(storage, Arc::new(FlatProducer(0)))
    }

    /// In-memory environment for tests and replay.
    pub fn in_memory() -> (Self, Arc<MemoryStorage>) {
        let storage = Arc::new(MemoryStorage::new());
        (Self::with_storage(storage.clone()), storage)
    }
}

impl std::fmt::Debug for CacheEnv {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheEnv").finish_non_exhaustive()
    }
}
