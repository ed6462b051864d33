//! # Cost-Aware LRU Family (BCL, DCL, PLRU, PBCL, PDCL)
//!
//! LRU extended with a per-entry regeneration cost. Cheap files are evicted
//! ahead of expensive ones as long as they are cheaper than `a_cost`, a
//! running estimate of what the plain LRU victim would cost.
//!
//! ## Victim search
//!
//! ```text
//!   LRU                                               MRU
//!   [e0] [e1] [e2] [e3] [e4] [e5] [e6] │ protected │
//!
//!   1. first unpinned e with actual_cost == 0     scan e0..e6
//!   2. first unpinned e with actual_cost < a_cost scan e1..e6
//!   3. first unpinned e from the LRU end          all but the MRU
//!      └─► a_cost := actual cost of the new LRU
//! ```
//!
//! The fallback never evicts the MRU, so a cache holding a single entry
//! grows instead. After a cheap victim of cost `c > 0`, `a_cost` drops by
//! `2c`:
//!
//! | Variant | Depreciation                          | Partition penalty |
//! |---------|---------------------------------------|-------------------|
//! | BCL     | immediate                             | no                |
//! | DCL     | deferred until the victim is re-read  | no                |
//! | PLRU    | none, cost is ignored                 | factor 0          |
//! | PBCL    | immediate                             | configured        |
//! | PDCL    | deferred                              | configured        |
//!
//! The deferred variants remember `victim → 2c` in a bounded map of
//! `capacity − 1` names. Reading one of those names again charges `a_cost`;
//! reading the current LRU first forgets all of them.

use std::fmt;

use tracing::debug;

use crate::ds::{OrderedMap, SlotId};
use crate::entry::{CacheEntry, Cost, UNIT_COST};
use crate::env::CacheEnv;
use crate::error::{CacheError, ConfigError, InvariantError, Result};
use crate::policy::partition::PartitionIndex;
use crate::policy::{discard_file, report_exhausted};
use crate::stats::{CacheStats, StatusSummary};
use crate::traits::{PolicyCore, Staging};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CostVariant {
    Bcl,
    Dcl,
    Plru,
    Pbcl,
    Pdcl,
}

impl CostVariant {
    pub fn name(self) -> &'static str {
        match self {
            CostVariant::Bcl => "BCL",
            CostVariant::Dcl => "DCL",
            CostVariant::Plru => "PLRU",
            CostVariant::Pbcl => "PBCL",
            CostVariant::Pdcl => "PDCL",
        }
    }

    fn deferred(self) -> bool {
        matches!(self, CostVariant::Dcl | CostVariant::Pdcl)
    }

    fn partitioned(self) -> bool {
        matches!(self, CostVariant::Plru | CostVariant::Pbcl | CostVariant::Pdcl)
    }

    fn weighs_cost(self) -> bool {
        self != CostVariant::Plru
    }
}

impl fmt::Display for CostVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pick {
    Cheap,
    Lru,
}

#[derive(Debug)]
pub struct CostAwareCache {
    variant: CostVariant,
    map: OrderedMap<String, CacheEntry>,
    capacity: usize,
    protected_mrus: usize,
    a_cost: Cost,
    lru_key: Option<String>,
    deferred: Option<OrderedMap<String, Cost>>,
    partitions: Option<PartitionIndex>,
    env: CacheEnv,
    staging: Staging,
}

impl CostAwareCache {
    pub fn bcl(env: CacheEnv, capacity: usize, protected_mrus: usize) -> std::result::Result<Self, ConfigError> {
        Self::build(CostVariant::Bcl, env, capacity, protected_mrus, 0.0)
    }

    pub fn dcl(env: CacheEnv, capacity: usize, protected_mrus: usize) -> std::result::Result<Self, ConfigError> {
        Self::build(CostVariant::Dcl, env, capacity, protected_mrus, 0.0)
    }

    /// Partition-aware LRU: every file costs [`UNIT_COST`] and evicting a
    /// partition member zeroes the cost of its predecessors.
    pub fn plru(env: CacheEnv, capacity: usize) -> std::result::Result<Self, ConfigError> {
        Self::build(CostVariant::Plru, env, capacity, 0, 0.0)
    }

    pub fn pbcl(
        env: CacheEnv,
        capacity: usize,
        protected_mrus: usize,
        penalty: f64,
    ) -> std::result::Result<Self, ConfigError> {
        Self::build(CostVariant::Pbcl, env, capacity, protected_mrus, penalty)
    }

    pub fn pdcl(
        env: CacheEnv,
        capacity: usize,
        protected_mrus: usize,
        penalty: f64,
    ) -> std::result::Result<Self, ConfigError> {
        Self::build(CostVariant::Pdcl, env, capacity, protected_mrus, penalty)
    }

    fn build(
        variant: CostVariant,
        env: CacheEnv,
        capacity: usize,
        protected_mrus: usize,
        penalty: f64,
    ) -> std::result::Result<Self, ConfigError> {
        if capacity == 0 {
            return Err(ConfigError::new(format!("{variant} capacity must be > 0")));
        }
        if variant.weighs_cost() && (protected_mrus == 0 || protected_mrus > capacity) {
            return Err(ConfigError::new(format!(
                "{variant} protected MRU count must be in 1..={capacity}, got {protected_mrus}"
            )));
        }
        if !(0.0..=1.0).contains(&penalty) {
            return Err(ConfigError::new(format!(
                "{variant} penalty factor must be in [0, 1], got {penalty}"
            )));
        }
        Ok(Self {
            variant,
            map: OrderedMap::new(capacity),
            capacity,
            protected_mrus,
            a_cost: 0,
            lru_key: None,
            deferred: variant
                .deferred()
                .then(|| OrderedMap::new(capacity.saturating_sub(1))),
            partitions: variant.partitioned().then(|| PartitionIndex::new(penalty)),
            env,
            staging: Staging::default(),
        })
    }

    pub fn variant(&self) -> CostVariant {
        self.variant
    }

    /// Current cost threshold for the cheap-victim pass.
    pub fn a_cost(&self) -> Cost {
        self.a_cost
    }

    pub fn protected_mrus(&self) -> usize {
        self.protected_mrus
    }

    /// Names whose eviction cost is still pending.
    pub fn deferred_len(&self) -> usize {
        self.deferred.as_ref().map_or(0, OrderedMap::len)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.map.iter().map(|(_, key, _)| key.as_str())
    }

    fn find_victim(&self) -> Option<(SlotId, Pick)> {
        let cheap = if self.variant.weighs_cost() {
            let a_cost = self.a_cost;
            self.map
                .find_first_with_predicate(
                    |e| e.is_evictable() && e.actual_cost() == 0,
                    false,
                    self.protected_mrus,
                )
                .or_else(|| {
                    self.map.find_first_with_predicate(
                        |e| e.is_evictable() && e.actual_cost() < a_cost,
                        true,
                        self.protected_mrus,
                    )
                })
        } else {
            self.map
                .find_first_with_predicate(|e| e.is_evictable() && e.actual_cost() == 0, false, 0)
        };
        cheap.map(|id| (id, Pick::Cheap)).or_else(|| {
            self.map
                .find_first_with_predicate(CacheEntry::is_evictable, false, 1)
                .map(|id| (id, Pick::Lru))
        })
    }

    fn evict_into(&mut self, victim: SlotId, pick: Pick, key: String, entry: CacheEntry) -> Result<()> {
        let Some(old) = self.map.get(victim) else {
            return Ok(());
        };
        let evicted = old.name.clone();
        let cost = old.actual_cost();
        let (partition, sequence) = (old.partition_key, old.sequence_number);
        discard_file(&self.env, self.variant.name(), old);
        self.staging.counters.evictions += 1;

        if let Some(partitions) = &mut self.partitions {
            let penalized = partitions.invalidate(&mut self.map, &evicted, partition, sequence);
            if penalized > 0 {
                debug!(cache = %self.variant, partition, penalized, "partition members penalized");
            }
        }
        self.map.replace(victim, key, entry);

        match pick {
            Pick::Cheap if self.variant.weighs_cost() && cost > 0 => {
                if self.variant.deferred() {
                    self.defer(evicted, cost.saturating_mul(2))?;
                } else {
                    self.a_cost = self.a_cost.saturating_sub(cost.saturating_mul(2));
                }
            }
            Pick::Cheap => {}
            Pick::Lru => self.reset_a_cost(),
        }
        Ok(())
    }

    fn defer(&mut self, name: String, cost: Cost) -> Result<()> {
        let Some(etd) = &mut self.deferred else {
            return Ok(());
        };
        if etd.capacity() == 0 {
            return Ok(());
        }
        if let Some(id) = etd.find(&name) {
            etd.replace(id, name, cost);
        } else if etd.len() < etd.capacity() {
            etd.add(name, cost)?;
        } else if let Some(lru) = etd.lru_id() {
            etd.replace(lru, name, cost);
        }
        Ok(())
    }

    fn reset_a_cost(&mut self) {
        match self.map.lru_id().and_then(|id| self.map.get(id)) {
            Some(lru) => {
                self.a_cost = lru.actual_cost();
                self.lru_key = Some(lru.name.clone());
            }
            None => {
                self.a_cost = 0;
                self.lru_key = None;
            }
        }
    }
}

impl PolicyCore for CostAwareCache {
    fn name(&self) -> &str {
        self.variant.name()
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

    fn prepare(&self, entry: &mut CacheEntry) {
        let producer = &self.env.producer;
        entry.cost = if self.variant.weighs_cost() {
            producer.cost(&entry.name)
        } else {
            UNIT_COST
        };
        if self.variant.partitioned() {
            entry.partition_key = producer.partition_key(&entry.name);
            entry.sequence_number = producer.sequence_number(&entry.name);
        }
    }

    fn resident(&self, key: &str) -> Option<&CacheEntry> {
        self.map.get_by_key(key)
    }

    fn resident_mut(&mut self, key: &str) -> Option<&mut CacheEntry> {
        self.map.get_by_key_mut(key)
    }

    fn admit(&mut self, key: String, entry: CacheEntry) -> Result<()> {
        let partition = entry.partition_key;
        if self.map.len() < self.capacity {
            self.map.add(key.clone(), entry)?;
        } else {
            match self.find_victim() {
                Some((victim, pick)) => self.evict_into(victim, pick, key.clone(), entry)?,
                None => {
                    report_exhausted(
                        self.variant.name(),
                        self.variant.name(),
                        self.capacity,
                        &mut self.staging.counters,
                    );
                    self.map.add(key.clone(), entry)?;
                }
            }
        }
        if let Some(partitions) = &mut self.partitions {
            partitions.register(partition, &key);
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

    fn observe_get(&mut self, key: &str) {
        let Some(etd) = &mut self.deferred else {
            return;
        };
        if let Some(cost) = etd.get_by_key(key).copied() {
            self.a_cost = self.a_cost.saturating_sub(cost);
            debug!(cache = %self.variant, key, cost, a_cost = self.a_cost, "deferred depreciation");
        } else if self.lru_key.as_deref() == Some(key) {
            etd.clear();
        }
    }

    fn resident_stats(&self) -> CacheStats {
        CacheStats::of_map(&self.map)
    }

    fn describe(&self, summary: &mut StatusSummary) {
        summary.set_int("cost_a_cost", self.a_cost);
        summary.set_int("cost_protected_mrus", self.protected_mrus as u64);
        if self.deferred.is_some() {
            summary.set_int("cost_deferred", self.deferred_len() as u64);
        }
        if let Some(partitions) = &self.partitions {
            summary.set_int("cost_partitions", partitions.partitions() as u64);
        }
    }

    fn check_invariants(&self) -> std::result::Result<(), InvariantError> {
        self.map.check_invariants()?;
        if self.map.iter().any(|(_, _, entry)| !entry.available) {
            return Err(InvariantError::new("unavailable entry in the ranked map"));
        }
        if let Some(etd) = &self.deferred {
            etd.check_invariants()?;
            if etd.len() > self.capacity.saturating_sub(1) {
                return Err(InvariantError::new("deferred cost map exceeds capacity - 1"));
            }
        }
        if let Some(partitions) = &self.partitions {
            if let Some((_, key)) = partitions.iter().find(|(_, key)| !self.map.contains_key(*key)) {
                return Err(InvariantError::new(format!(
                    "partition index names evicted key {key}"
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;
    use std::sync::Arc;

    use super::*;
    use crate::env::ProducerModel;
    use crate::policy::test_support::{put_file, touch};
    use crate::storage::{MemoryStorage, Storage};
    use crate::traits::FileCache;

    /// Cost from a `<name>:<cost>` key; partition and sequence from
    /// `p<partition>_<seq>` prefixes.
    struct NamedCost;

    impl ProducerModel for NamedCost {
        fn cost(&self, name: &str) -> Cost {
            name.rsplit(':').next().and_then(|c| c.parse().ok()).unwrap_or(0)
        }

        fn partition_key(&self, name: &str) -> u64 {
            name.strip_prefix('p')
                .and_then(|rest| rest.split('_').next())
                .and_then(|p| p.parse().ok())
                .unwrap_or(0)
        }

        fn sequence_number(&self, name: &str) -> u64 {
            name.split('_')
                .nth(1)
                .and_then(|rest| rest.split(':').next())
                .and_then(|s| s.parse().ok())
                .unwrap_or(0)
        }
    }

    fn env() -> (CacheEnv, Arc<MemoryStorage>) {
        let storage = Arc::new(MemoryStorage::new());
        (CacheEnv::new(storage.clone(), Arc::new(NamedCost)), storage)
    }

    fn keys(cache: &CostAwareCache) -> Vec<&str> {
        cache.keys().collect()
    }

    mod construction {
        use super::*;

        #[test]
        fn rejects_bad_parameters() {
            let (env, _) = env();
            assert!(CostAwareCache::bcl(env.clone(), 0, 1).is_err());
            assert!(CostAwareCache::bcl(env.clone(), 4, 0).is_err());
            assert!(CostAwareCache::dcl(env.clone(), 4, 5).is_err());
            assert!(CostAwareCache::pbcl(env.clone(), 4, 1, 1.5).is_err());
            assert!(CostAwareCache::plru(env, 4).is_ok());
        }

        #[test]
        fn names_follow_variant() {
            let (env, _) = env();
            assert_eq!(CostAwareCache::pdcl(env.clone(), 4, 1, 0.5).unwrap().name(), "PDCL");
            assert_eq!(CostAwareCache::plru(env, 4).unwrap().name(), "PLRU");
        }
    }

    mod bcl {
        use super::*;

        #[test]
        fn zero_cost_entries_go_first() {
            let (env, storage) = env();
            let mut cache = CostAwareCache::bcl(env, 3, 1).unwrap();
            put_file(&mut cache, &storage, "a:10");
            put_file(&mut cache, &storage, "b:0");
            put_file(&mut cache, &storage, "c:10");

            put_file(&mut cache, &storage, "d:10");
            assert_eq!(keys(&cache), vec!["a:10", "c:10", "d:10"]);
            assert!(!storage.file_exists(Path::new("b:0")));
        }

        #[test]
        fn protected_mrus_are_never_cheap_victims() {
            let (env, storage) = env();
            let mut cache = CostAwareCache::bcl(env, 3, 2).unwrap();
            put_file(&mut cache, &storage, "a:10");
            put_file(&mut cache, &storage, "b:10");
            put_file(&mut cache, &storage, "c:0");

            // c is free but protected, so the plain LRU goes
            put_file(&mut cache, &storage, "d:10");
            assert_eq!(keys(&cache), vec!["b:10", "c:0", "d:10"]);
        }

        #[test]
        fn lru_fallback_resets_a_cost_to_new_lru() {
            let (env, storage) = env();
            let mut cache = CostAwareCache::bcl(env, 2, 1).unwrap();
            put_file(&mut cache, &storage, "a:10");
            put_file(&mut cache, &storage, "b:6");
            touch(&mut cache, "b:6");

            put_file(&mut cache, &storage, "c:8");
            assert_eq!(keys(&cache), vec!["b:6", "c:8"]);
            assert_eq!(cache.a_cost(), 6);
        }

        #[test]
        fn single_entry_is_never_the_lru_victim() {
            let (env, storage) = env();
            let mut cache = CostAwareCache::bcl(env, 1, 1).unwrap();
            put_file(&mut cache, &storage, "a:10");
            touch(&mut cache, "a:10");

            put_file(&mut cache, &storage, "b:10");
            assert_eq!(keys(&cache), vec!["a:10", "b:10"]);
            assert!(storage.file_exists(Path::new("a:10")));
            assert_eq!(cache.counters().eviction_failures, 1);

            put_file(&mut cache, &storage, "c:10");
            assert_eq!(keys(&cache), vec!["b:10", "c:10"]);
            assert!(!storage.file_exists(Path::new("a:10")));
        }

        #[test]
        fn cheap_eviction_depreciates_immediately() {
            let (env, storage) = env();
            let mut cache = CostAwareCache::bcl(env, 3, 1).unwrap();
            put_file(&mut cache, &storage, "a:40");
            touch(&mut cache, "a:40");
            put_file(&mut cache, &storage, "b:40");
            put_file(&mut cache, &storage, "c:40");
            // LRU fallback evicts a, a_cost becomes b's actual cost (20)
            put_file(&mut cache, &storage, "d:40");
            assert_eq!(cache.a_cost(), 20);

            // e is unused (actual cost 3) but protected until it leaves the MRU
            put_file(&mut cache, &storage, "e:6");
            put_file(&mut cache, &storage, "f:40");
            assert!(keys(&cache).contains(&"e:6"));
            assert_eq!(cache.a_cost(), 20);

            put_file(&mut cache, &storage, "g:40");
            assert_eq!(keys(&cache), vec!["d:40", "f:40", "g:40"]);
            assert_eq!(cache.a_cost(), 14);
        }
    }

    mod dcl {
        use super::*;

        #[test]
        fn depreciation_waits_for_reread() {
            let (env, storage) = env();
            let mut cache = CostAwareCache::dcl(env, 3, 1).unwrap();
            put_file(&mut cache, &storage, "a:40");
            touch(&mut cache, "a:40");
            for key in ["b:40", "c:40", "d:40", "e:6", "f:40", "g:40"] {
                put_file(&mut cache, &storage, key);
            }
            assert_eq!(keys(&cache), vec!["d:40", "f:40", "g:40"]);
            assert_eq!(cache.a_cost(), 20);
            // only the cheap victim e is remembered
            assert_eq!(cache.deferred_len(), 1);

            assert!(cache.get("e:6").is_none());
            assert_eq!(cache.a_cost(), 14);
            // the deferred cost stays until the LRU is read
            assert!(cache.get("e:6").is_none());
            assert_eq!(cache.a_cost(), 8);
        }

        #[test]
        fn reading_the_lru_forgets_deferred_costs() {
            let (env, storage) = env();
            let mut cache = CostAwareCache::dcl(env, 3, 1).unwrap();
            put_file(&mut cache, &storage, "a:40");
            touch(&mut cache, "a:40");
            for key in ["b:40", "c:40", "d:40", "e:6", "f:40", "g:40"] {
                put_file(&mut cache, &storage, key);
            }
            assert_eq!(cache.deferred_len(), 1);

            cache.get("d:40");
            assert_eq!(cache.deferred_len(), 0);
            cache.check_invariants().unwrap();
        }

        #[test]
        fn lru_fallback_victims_are_not_deferred() {
            let (env, storage) = env();
            let mut cache = CostAwareCache::dcl(env, 2, 1).unwrap();
            put_file(&mut cache, &storage, "a:10");
            touch(&mut cache, "a:10");
            put_file(&mut cache, &storage, "b:10");
            touch(&mut cache, "b:10");

            put_file(&mut cache, &storage, "c:10");
            assert_eq!(keys(&cache), vec!["b:10", "c:10"]);
            assert_eq!(cache.a_cost(), 10);
            assert_eq!(cache.deferred_len(), 0);

            assert!(cache.get("a:10").is_none());
            assert_eq!(cache.a_cost(), 10);
        }

        #[test]
        fn pdcl_defers_only_cheap_victims() {
            let (env, storage) = env();
            let mut cache = CostAwareCache::pdcl(env, 3, 1, 0.5).unwrap();
            put_file(&mut cache, &storage, "p1_0:40");
            touch(&mut cache, "p1_0:40");
            put_file(&mut cache, &storage, "p2_0:40");
            put_file(&mut cache, &storage, "p3_0:40");

            put_file(&mut cache, &storage, "p4_0:40");
            assert!(cache.internal_lookup("p1_0:40").is_none());
            assert_eq!(cache.deferred_len(), 0);
            cache.check_invariants().unwrap();
        }
    }

    mod partitioned {
        use super::*;

        #[test]
        fn pbcl_penalizes_earlier_partition_members() {
            let (env, storage) = env();
            let mut cache = CostAwareCache::pbcl(env, 4, 1, 0.5).unwrap();
            put_file(&mut cache, &storage, "p1_2:10");
            put_file(&mut cache, &storage, "p1_0:10");
            put_file(&mut cache, &storage, "p1_3:10");
            put_file(&mut cache, &storage, "p2_0:10");

            // plain LRU victim is p1_2
            put_file(&mut cache, &storage, "p3_0:10");
            assert!(cache.internal_lookup("p1_2:10").is_none());
            assert_eq!(cache.internal_lookup("p1_0:10").unwrap().cost, 5);
            assert_eq!(cache.internal_lookup("p1_3:10").unwrap().cost, 10);
            assert_eq!(cache.internal_lookup("p2_0:10").unwrap().cost, 10);
            cache.check_invariants().unwrap();
        }

        #[test]
        fn plru_evicts_partition_holes_first() {
            let (env, storage) = env();
            let mut cache = CostAwareCache::plru(env, 3).unwrap();
            put_file(&mut cache, &storage, "p1_1");
            put_file(&mut cache, &storage, "p2_0");
            put_file(&mut cache, &storage, "p1_0");
            assert_eq!(cache.internal_lookup("p2_0").unwrap().cost, UNIT_COST);

            // LRU p1_1 goes; p1_0 drops to cost 0 and is next in line
            put_file(&mut cache, &storage, "p3_0");
            assert_eq!(cache.internal_lookup("p1_0").unwrap().cost, 0);
            put_file(&mut cache, &storage, "p4_0");
            assert_eq!(keys(&cache), vec!["p2_0", "p3_0", "p4_0"]);
        }
    }
}
