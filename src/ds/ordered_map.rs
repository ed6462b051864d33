//! Intrusive ordered hash map: the ranking primitive under every policy.
//!
//! Combines an [`IntrusiveList`] of `(key, value)` pairs with a key → slot
//! index. Every operation the policies run on the hot path is O(1) except the
//! victim scan and the fold, which walk from the LRU end.
//!
//! ## Architecture
//!
//! ```text
//!   index: FxHashMap<K, SlotId>          list: IntrusiveList<(K, V)>
//!   ┌──────────┬────────┐
//!   │ "a.nc"   │ id_0   │──────►  LRU ─► [id_0] ◄─► [id_2] ◄─► [id_1] ◄─ MRU
//!   │ "b.nc"   │ id_2   │──────┘                         ▲
//!   │ "c.nc"   │ id_1   │────────────────────────────────┘
//!   └──────────┴────────┘
//!
//!   free slots are recycled by the arena before it grows
//! ```
//!
//! ## Two-phase replacement
//!
//! Policies look for a victim with [`OrderedMap::find_first_with_predicate`],
//! possibly chaining several predicates, and then hand the winning id to
//! [`OrderedMap::replace`]. The slot is reused in place and moved to the MRU
//! end, so an eviction followed by an admission costs one scan and no
//! allocation.
//!
//! ## Reserved MRU region
//!
//! `find_first_with_predicate(pred, exclude_lru, reserved)` never returns one
//! of the `reserved` entries nearest the MRU end, and skips the LRU itself
//! when `exclude_lru` is set:
//!
//! ```text
//!   LRU                                         MRU
//!   [e0] [e1] [e2] [e3] [e4] [e5] [e6] [e7]
//!    ^skipped if            └─ scanned ─┘ └ reserved=2 ┘
//!     exclude_lru
//! ```

use std::borrow::Borrow;
use std::hash::Hash;

use rustc_hash::FxHashMap;

use crate::ds::intrusive_list::IntrusiveList;
use crate::ds::slot_arena::SlotId;
use crate::error::{CacheError, InvariantError};

#[derive(Debug)]
pub struct OrderedMap<K, V> {
    list: IntrusiveList<(K, V)>,
    index: FxHashMap<K, SlotId>,
    capacity: usize,
}

impl<K, V> OrderedMap<K, V>
where
    K: Eq + Hash + Clone,
{
    /// Creates an empty map pre-sized for `capacity` entries.
    ///
    /// `capacity` is a sizing hint; the map grows past it when a policy has
    /// to admit without an evictable victim.
    pub fn new(capacity: usize) -> Self {
        Self {
            list: IntrusiveList::with_capacity(capacity),
            index: FxHashMap::default(),
            capacity,
        }
    }

    /// Creates an empty map whose slot space is bounded by `limit`.
    pub fn with_slot_limit(capacity: usize, limit: usize) -> Self {
        Self {
            list: IntrusiveList::with_limit(capacity, limit),
            index: FxHashMap::default(),
            capacity,
        }
    }

    /// Declared capacity passed at construction.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.list.len()
    }

    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }

    /// Inserts `key` at the MRU end.
    ///
    /// An existing key is overwritten in place and refreshed instead.
    pub fn add(&mut self, key: K, value: V) -> Result<SlotId, CacheError> {
        if let Some(id) = self.index.get(&key).copied() {
            self.replace(id, key, value);
            return Ok(id);
        }
        let id = self.list.try_push_mru((key.clone(), value))?;
        self.index.insert(key, id);
        Ok(id)
    }

    /// Overwrites slot `id` with `(key, value)` and moves it to the MRU end.
    ///
    /// Returns the previous pair, or `None` if `id` is not live.
    pub fn replace(&mut self, id: SlotId, key: K, value: V) -> Option<(K, V)> {
        let slot = self.list.get_mut(id)?;
        let old = std::mem::replace(slot, (key.clone(), value));
        if old.0 != key {
            self.index.remove(&old.0);
            if let Some(stale) = self.index.insert(key, id) {
                // the key lived in another slot; keep one slot per key
                if stale != id {
                    self.list.remove(stale);
                }
            }
        }
        self.list.move_to_mru(id);
        Some(old)
    }

    /// Moves slot `id` to the MRU end.
    pub fn refresh_with_id(&mut self, id: SlotId) -> bool {
        self.list.move_to_mru(id)
    }

    /// Moves the slot holding `key` to the MRU end.
    pub fn refresh_with_key<Q>(&mut self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        match self.find(key) {
            Some(id) => self.list.move_to_mru(id),
            None => false,
        }
    }

    pub fn find<Q>(&self, key: &Q) -> Option<SlotId>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.index.get(key).copied()
    }

    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.index.contains_key(key)
    }

    pub fn get(&self, id: SlotId) -> Option<&V> {
        self.list.get(id).map(|(_, value)| value)
    }

    pub fn get_mut(&mut self, id: SlotId) -> Option<&mut V> {
        self.list.get_mut(id).map(|(_, value)| value)
    }

    pub fn key(&self, id: SlotId) -> Option<&K> {
        self.list.get(id).map(|(key, _)| key)
    }

    pub fn get_by_key<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.find(key).and_then(|id| self.get(id))
    }

    pub fn get_by_key_mut<Q>(&mut self, key: &Q) -> Option<&mut V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let id = self.find(key)?;
        self.get_mut(id)
    }

    pub fn lru_id(&self) -> Option<SlotId> {
        self.list.lru_id()
    }

    pub fn mru_id(&self) -> Option<SlotId> {
        self.list.mru_id()
    }

    /// Id of the slot after `id` in LRU → MRU order.
    pub fn next_id(&self, id: SlotId) -> Option<SlotId> {
        self.list.next_id(id)
    }

    /// Scans LRU → MRU and returns the first slot whose value satisfies
    /// `predicate`.
    ///
    /// The LRU is skipped when `exclude_lru` is set and the last
    /// `reserved_mru` slots are never considered.
    pub fn find_first_with_predicate<F>(
        &self,
        mut predicate: F,
        exclude_lru: bool,
        reserved_mru: usize,
    ) -> Option<SlotId>
    where
        F: FnMut(&V) -> bool,
    {
        let scanned = self.len().saturating_sub(reserved_mru);
        self.list
            .iter_entries()
            .take(scanned)
            .skip(usize::from(exclude_lru))
            .find(|(_, (_, value))| predicate(value))
            .map(|(id, _)| id)
    }

    /// Removes slot `id` and returns its pair. Erasing the last entry
    /// resets the map to its freshly constructed state.
    pub fn erase(&mut self, id: SlotId) -> Option<(K, V)> {
        let (key, value) = self.list.remove(id)?;
        self.index.remove(&key);
        if self.list.is_empty() {
            self.index.clear();
        }
        Some((key, value))
    }

    /// Left fold over the values in LRU → MRU order. `map` receives each
    /// value with its position counted from the LRU.
    pub fn mapreduce<A, T, M, R>(&self, seed: A, mut map: M, mut reduce: R) -> A
    where
        M: FnMut(&V, usize) -> T,
        R: FnMut(A, T) -> A,
    {
        self.list
            .iter_entries()
            .enumerate()
            .fold(seed, |acc, (position, (_, (_, value)))| {
                reduce(acc, map(value, position))
            })
    }

    /// Iterates `(id, key, value)` from LRU to MRU.
    pub fn iter(&self) -> impl Iterator<Item = (SlotId, &K, &V)> {
        self.list
            .iter_entries()
            .map(|(id, (key, value))| (id, key, value))
    }

    pub fn clear(&mut self) {
        self.list.clear();
        self.index.clear();
    }

    /// Checks chain shape, index agreement and slot accounting.
    pub fn check_invariants(&self) -> Result<(), InvariantError> {
        self.list.check_invariants()?;
        if self.index.len() != self.list.len() {
            return Err(InvariantError::new(format!(
                "index holds {} keys but {} slots are live",
                self.index.len(),
                self.list.len()
            )));
        }
        for (id, key, _) in self.iter() {
            if self.index.get(key) != Some(&id) {
                return Err(InvariantError::new(format!(
                    "slot {} is not indexed under its key",
                    id.index()
                )));
            }
        }
        if self.list.allocated_slots() - self.list.free_slots() != self.len() {
            return Err(InvariantError::new(
                "size differs from allocated minus free slots",
            ));
        }
        Ok(())
    }
}
