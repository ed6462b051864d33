//! Recency list of evicted keys.
//!
//! ARC keeps the names of recently evicted files in two ghost lists so that a
//! re-request can adapt the target split. A ghost holds no file and no cost,
//! only the key and its position, so the list is an [`OrderedMap`] with unit
//! values.
//!
//! ```text
//!   LRU ─► [a.nc] ◄──► [d.nc] ◄──► [f.nc] ◄── MRU
//!            ▲
//!            └── pop_lru() / dropped when record() hits capacity
//! ```
//!
//! `record`, `remove`, `contains` and `pop_lru` are O(1) average.

use std::borrow::Borrow;
use std::hash::Hash;

use crate::ds::ordered_map::OrderedMap;
use crate::error::{CacheError, InvariantError};

#[derive(Debug)]
pub struct GhostList<K> {
    keys: OrderedMap<K, ()>,
    capacity: usize,
}

impl<K> GhostList<K>
where
    K: Eq + Hash + Clone,
{
    /// Creates a ghost list holding at most `capacity` keys.
    pub fn new(capacity: usize) -> Self {
        Self {
            keys: OrderedMap::new(capacity),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn contains<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.keys.contains_key(key)
    }

    /// Records `key` as the most recent ghost.
    ///
    /// When the list is full the oldest ghost is dropped and returned.
    pub fn record(&mut self, key: K) -> Result<Option<K>, CacheError> {
        if self.capacity == 0 || self.keys.refresh_with_key(&key) {
            return Ok(None);
        }
        if self.keys.len() >= self.capacity
            && let Some(lru) = self.keys.lru_id()
        {
            return Ok(self.keys.replace(lru, key, ()).map(|(old, _)| old));
        }
        self.keys.add(key, ())?;
        Ok(None)
    }

    pub fn remove<Q>(&mut self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        match self.keys.find(key) {
            Some(id) => self.keys.erase(id).is_some(),
            None => false,
        }
    }

    /// Removes and returns the oldest ghost.
    pub fn pop_lru(&mut self) -> Option<K> {
        let id = self.keys.lru_id()?;
        self.keys.erase(id).map(|(key, _)| key)
    }

    /// Iterates ghosts from oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &K> {
        self.keys.iter().map(|(_, key, _)| key)
    }

    pub fn clear(&mut self) {
        self.keys.clear();
    }

    pub fn check_invariants(&self) -> Result<(), InvariantError> {
        if self.len() > self.capacity {
            return Err(InvariantError::new(format!(
                "ghost list holds {} keys over capacity {}",
                self.len(),
                self.capacity
            )));
        }
        self.keys.check_invariants()
    }
}
