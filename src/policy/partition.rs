//! Partition bookkeeping for the partition-aware cost policies.
//!
//! A simulation writes its output in batches (partitions); files of one batch
//! carry the same partition key and increasing sequence numbers. Once a
//! member is evicted the batch has a hole, and regenerating any earlier
//! member would rerun the simulation up to that point anyway, so the earlier
//! members lose value.
//!
//! ```text
//!   partition 7:   seq 0   seq 1   seq 2   seq 3
//!                  [c=8]   [c=8]   [c=8]   [c=8]
//!   evict seq 2 (factor 0.5)
//!                  [c=4]   [c=4]    --     [c=8]    seq 0, 1 leave the index
//! ```

use rustc_hash::{FxHashMap, FxHashSet};

use crate::ds::OrderedMap;
use crate::entry::CacheEntry;

#[derive(Debug, Default)]
pub struct PartitionIndex {
    members: FxHashMap<u64, FxHashSet<String>>,
    penalty: f64,
}

impl PartitionIndex {
    pub fn new(penalty: f64) -> Self {
        Self {
            members: FxHashMap::default(),
            penalty,
        }
    }

    pub fn penalty(&self) -> f64 {
        self.penalty
    }

    pub fn register(&mut self, partition: u64, key: &str) {
        self.members
            .entry(partition)
            .or_default()
            .insert(key.to_owned());
    }

    pub fn partitions(&self) -> usize {
        self.members.len()
    }

    pub fn contains(&self, partition: u64, key: &str) -> bool {
        self.members
            .get(&partition)
            .is_some_and(|members| members.contains(key))
    }

    pub fn iter(&self) -> impl Iterator<Item = (u64, &str)> {
        self.members
            .iter()
            .flat_map(|(partition, keys)| keys.iter().map(move |key| (*partition, key.as_str())))
    }

    /// Drops `evicted` from its partition and penalizes the members still in
    /// `map` whose sequence number is not after it. Penalized members leave
    /// the index. Returns how many members were penalized.
    pub fn invalidate(
        &mut self,
        map: &mut OrderedMap<String, CacheEntry>,
        evicted: &str,
        partition: u64,
        sequence: u64,
    ) -> usize {
        let Some(members) = self.members.get_mut(&partition) else {
            return 0;
        };
        members.remove(evicted);

        let factor = self.penalty;
        let mut penalized = 0;
        members.retain(|key| match map.get_by_key_mut(key.as_str()) {
            Some(entry) if entry.sequence_number <= sequence => {
                entry.apply_penalty(factor);
                penalized += 1;
                false
            }
            Some(_) => true,
            None => false,
        });
        if members.is_empty() {
            self.members.remove(&partition);
        }
        penalized
    }
}
