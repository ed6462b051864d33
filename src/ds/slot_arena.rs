//! Slot storage with free-list reuse and a bounded id space.
//!
//! Slots freed by [`SlotArena::remove`] are handed out again before the
//! backing vector grows. Ids are `u32`-sized, so an arena never holds more
//! than `u32::MAX` slots; a smaller limit can be set for tests.

use crate::error::CacheError;

/// Handle to a slot. Stays valid until the slot is removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SlotId(pub(crate) u32);

impl SlotId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Largest number of slots an arena can address.
pub const MAX_SLOTS: usize = u32::MAX as usize;

#[derive(Debug)]
pub struct SlotArena<T> {
    slots: Vec<Option<T>>,
    free_list: Vec<u32>,
    len: usize,
    limit: usize,
}

impl<T> SlotArena<T> {
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity.min(MAX_SLOTS)),
            free_list: Vec::new(),
            len: 0,
            limit: MAX_SLOTS,
        }
    }

    /// Caps the number of allocated slots at `limit`.
    pub fn with_limit(capacity: usize, limit: usize) -> Self {
        let mut arena = Self::with_capacity(capacity.min(limit));
        arena.limit = limit.min(MAX_SLOTS);
        arena
    }

    /// Stores `value`, reusing a freed slot when one exists.
    ///
    /// Fails with [`CacheError::CapacityExhausted`] once every addressable
    /// slot is live.
    pub fn try_insert(&mut self, value: T) -> Result<SlotId, CacheError> {
        let idx = if let Some(idx) = self.free_list.pop() {
            self.slots[idx as usize] = Some(value);
            idx
        } else {
            if self.slots.len() >= self.limit {
                return Err(CacheError::CapacityExhausted { limit: self.limit });
            }
            self.slots.push(Some(value));
            (self.slots.len() - 1) as u32
        };
        self.len += 1;
        Ok(SlotId(idx))
    }

    pub fn remove(&mut self, id: SlotId) -> Option<T> {
        let slot = self.slots.get_mut(id.index())?;
        let value = slot.take()?;
        self.free_list.push(id.0);
        self.len -= 1;
        Some(value)
    }

    pub fn get(&self, id: SlotId) -> Option<&T> {
        self.slots.get(id.index()).and_then(|slot| slot.as_ref())
    }

    pub fn get_mut(&mut self, id: SlotId) -> Option<&mut T> {
        self.slots.get_mut(id.index()).and_then(|slot| slot.as_mut())
    }

    pub fn contains(&self, id: SlotId) -> bool {
        self.get(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of slots ever allocated, live or free.
    pub fn allocated(&self) -> usize {
        self.slots.len()
    }

    pub fn free_slots(&self) -> usize {
        self.free_list.len()
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn clear(&mut self) {
        self.slots.clear();
        self.free_list.clear();
        self.len = 0;
    }
}

impl<T> Default for SlotArena<T> {
    fn default() -> Self {
        Self::new()
    }
}
