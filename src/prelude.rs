pub use crate::builder::CacheBuilder;
pub use crate::config::{CacheConfig, PolicyKind};
pub use crate::ds::{GhostList, OrderedMap, SlotId};
pub use crate::entry::{CacheEntry, Cost, UNIT_COST};
pub use crate::env::{CacheEnv, FlatProducer, ProducerModel};
pub use crate::error::{CacheError, ConfigError, InvariantError};
pub use crate::policy::{
    ArcCache, CostAwareCache, CostVariant, FifoWrapper, LirsCache, LirsState, LruCache,
    UnlimitedCache,
};
pub use crate::stats::{CacheCounters, CacheStats, StatusSummary};
pub use crate::storage::{FsStorage, MemoryStorage, Storage, StoredFile};
pub use crate::traits::{FileCache, PolicyCore};
