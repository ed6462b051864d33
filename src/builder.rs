//! Builds a cache from a [`CacheConfig`].
//!
//! Hides which concrete policy type backs the cache; callers get a
//! `Box<dyn FileCache>` and talk the put/get/refresh protocol.
//!
//! ## Example
//!
//! ```rust
//! use simcache::builder::CacheBuilder;
//! use simcache::config::{CacheConfig, PolicyKind};
//! use simcache::entry::CacheEntry;
//! use simcache::env::CacheEnv;
//! use simcache::traits::FileCache;
//!
//! let (env, storage) = CacheEnv::in_memory();
//! let mut cache = CacheBuilder::new(CacheConfig::new(PolicyKind::Arc, 100))
//!     .build(env)
//!     .unwrap();
//!
//! storage.insert_file("out_0001.nc", 4096);
//! cache.put("out_0001.nc", CacheEntry::available("out_0001.nc", "out_0001.nc", 4096)).unwrap();
//! assert!(cache.get("out_0001.nc").is_some());
//! assert_eq!(cache.name(), "ARC");
//! ```

use tracing::debug;

use crate::config::{CacheConfig, PolicyKind};
use crate::env::CacheEnv;
use crate::error::ConfigError;
use crate::policy::{ArcCache, CostAwareCache, FifoWrapper, LirsCache, LruCache, UnlimitedCache};
use crate::traits::FileCache;

/// Builder for creating cache instances.
#[derive(Debug, Clone)]
pub struct CacheBuilder {
    config: CacheConfig,
}

impl CacheBuilder {
    pub fn new(config: CacheConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Validates the configuration and builds the cache.
    ///
    /// A non-zero `fifo_queue_size` wraps the selected policy in a
    /// [`FifoWrapper`]; the policy then gets the remaining capacity.
    pub fn build(self, env: CacheEnv) -> Result<Box<dyn FileCache>, ConfigError> {
        let config = &self.config;
        config.validate()?;

        let embedded = build_policy(config, env.clone(), config.embedded_capacity())?;
        let cache: Box<dyn FileCache> = if config.fifo_queue_size > 0 {
            Box::new(FifoWrapper::new(env, embedded, config.fifo_queue_size)?)
        } else {
            embedded
        };
        debug!(
            cache = %cache.name(),
            capacity = config.capacity,
            fifo = config.fifo_queue_size,
            "built file cache"
        );
        Ok(cache)
    }
}

fn build_policy(
    config: &CacheConfig,
    env: CacheEnv,
    capacity: usize,
) -> Result<Box<dyn FileCache>, ConfigError> {
    let protected = config.protected_mrus;
    let penalty = config.penalty_factor;
    Ok(match config.policy {
        PolicyKind::Unlimited => Box::new(UnlimitedCache::new(env)),
        PolicyKind::Lru => Box::new(LruCache::new(env, capacity)?),
        PolicyKind::Arc => Box::new(ArcCache::new(env, capacity)?),
        PolicyKind::Lirs => Box::new(LirsCache::new(env, capacity, config.lir_set_size)?),
        PolicyKind::Bcl => Box::new(CostAwareCache::bcl(env, capacity, protected)?),
        PolicyKind::Dcl => Box::new(CostAwareCache::dcl(env, capacity, protected)?),
        PolicyKind::Plru => Box::new(CostAwareCache::plru(env, capacity)?),
        PolicyKind::Pbcl => Box::new(CostAwareCache::pbcl(env, capacity, protected, penalty)?),
        PolicyKind::Pdcl => Box::new(CostAwareCache::pdcl(env, capacity, protected, penalty)?),
    })
}
