//! Intrusive doubly linked recency list backed by `SlotArena`.
//!
//! Stores list nodes in a `SlotArena` and links them by `SlotId`, enabling
//! stable handles and O(1) relinking without pointer chasing. The head is the
//! least recently used node, the tail the most recently used one.
//!
//! ## Architecture
//!
//! ```text
//!   arena (SlotArena<Node<T>>)
//!   ┌────────┬─────────────────────────────────────────────┐
//!   │ SlotId │ Node { value, prev, next }                  │
//!   ├────────┼─────────────────────────────────────────────┤
//!   │ id_1   │ { value: A, prev: None, next: Some(id_2) }  │
//!   │ id_2   │ { value: B, prev: Some(id_1), next: id_3 }  │
//!   │ id_3   │ { value: C, prev: Some(id_2), next: None }  │
//!   └────────┴─────────────────────────────────────────────┘
//!
//!   LRU (head) ─► [id_1] ◄──► [id_2] ◄──► [id_3] ◄── MRU (tail)
//! ```
//!
//! ## Operations
//! - `try_push_mru(value)`: allocate + attach at the tail
//! - `move_to_mru(id)`: detach + attach at the tail
//! - `remove(id)`: detach + free slot in arena
//!
//! ## Performance
//! - `try_push_mru` / `remove` / `move_to_mru`: O(1)
//! - `iter_entries`: O(n)
use crate::ds::slot_arena::{SlotArena, SlotId};
use crate::error::{CacheError, InvariantError};

#[derive(Debug)]
struct Node<T> {
    value: T,
    prev: Option<SlotId>,
    next: Option<SlotId>,
}

#[derive(Debug)]
/// Intrusive list that stores nodes in a `SlotArena` and links them via `SlotId`.
pub struct IntrusiveList<T> {
    arena: SlotArena<Node<T>>,
    head: Option<SlotId>,
    tail: Option<SlotId>,
}

impl<T> IntrusiveList<T> {
    /// Creates an empty list.
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    /// Creates an empty list with reserved node capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            arena: SlotArena::with_capacity(capacity),
            head: None,
            tail: None,
        }
    }

    /// Creates an empty list that never allocates more than `limit` nodes.
    pub fn with_limit(capacity: usize, limit: usize) -> Self {
        Self {
            arena: SlotArena::with_limit(capacity, limit),
            head: None,
            tail: None,
        }
    }

    /// Returns the number of nodes in the list.
    pub fn len(&self) -> usize {
        self.arena.len()
    }

    /// Returns `true` if the list is empty.
    pub fn is_empty(&self) -> bool {
        self.arena.is_empty()
    }

    /// Returns `true` if `id` is currently a node in this list.
    pub fn contains(&self, id: SlotId) -> bool {
        self.arena.contains(id)
    }

    /// SlotId of the least recently used node.
    pub fn lru_id(&self) -> Option<SlotId> {
        self.head
    }

    /// SlotId of the most recently used node.
    pub fn mru_id(&self) -> Option<SlotId> {
        self.tail
    }

    /// SlotId of the node following `id` towards the MRU end.
    pub fn next_id(&self, id: SlotId) -> Option<SlotId> {
        self.arena.get(id).and_then(|node| node.next)
    }

    /// Returns an iterator of `(SlotId, &T)` from LRU to MRU.
    pub fn iter_entries(&self) -> IntrusiveListEntryIter<'_, T> {
        IntrusiveListEntryIter {
            list: self,
            current: self.head,
        }
    }

    /// Returns the value for a node id, if present.
    pub fn get(&self, id: SlotId) -> Option<&T> {
        self.arena.get(id).map(|node| &node.value)
    }

    /// Returns a mutable reference to a node value, if present.
    pub fn get_mut(&mut self, id: SlotId) -> Option<&mut T> {
        self.arena.get_mut(id).map(|node| &mut node.value)
    }

    /// Inserts a new node at the MRU end and returns its `SlotId`.
    pub fn try_push_mru(&mut self, value: T) -> Result<SlotId, CacheError> {
        let id = self.arena.try_insert(Node {
            value,
            prev: self.tail,
            next: None,
        })?;
        if let Some(tail) = self.tail {
            if let Some(node) = self.arena.get_mut(tail) {
                node.next = Some(id);
            }
        } else {
            self.head = Some(id);
        }
        self.tail = Some(id);
        Ok(id)
    }

    /// Removes the node `id` from the list and returns its value.
    ///
    /// Removing the last node releases the whole arena, so slot ids restart
    /// from zero afterwards.
    pub fn remove(&mut self, id: SlotId) -> Option<T> {
        self.detach(id)?;
        let value = self.arena.remove(id).map(|node| node.value);
        if self.arena.is_empty() {
            self.clear();
        }
        value
    }

    /// Moves an existing node to the MRU end; returns `false` if `id` is not present.
    pub fn move_to_mru(&mut self, id: SlotId) -> bool {
        if !self.arena.contains(id) {
            return false;
        }
        if Some(id) == self.tail {
            return true;
        }
        self.detach(id);
        self.attach_back(id);
        true
    }

    /// Clears the list and frees all nodes.
    pub fn clear(&mut self) {
        self.arena.clear();
        self.head = None;
        self.tail = None;
    }

    /// Slots ever allocated by the backing arena.
    pub fn allocated_slots(&self) -> usize {
        self.arena.allocated()
    }

    /// Freed slots waiting for reuse.
    pub fn free_slots(&self) -> usize {
        self.arena.free_slots()
    }

    fn detach(&mut self, id: SlotId) -> Option<()> {
        let (prev, next) = {
            let node = self.arena.get(id)?;
            (node.prev, node.next)
        };

        if let Some(prev_id) = prev {
            if let Some(prev_node) = self.arena.get_mut(prev_id) {
                prev_node.next = next;
            }
        } else {
            self.head = next;
        }

        if let Some(next_id) = next {
            if let Some(next_node) = self.arena.get_mut(next_id) {
                next_node.prev = prev;
            }
        } else {
            self.tail = prev;
        }

        if let Some(node) = self.arena.get_mut(id) {
            node.prev = None;
            node.next = None;
        }

        Some(())
    }

    fn attach_back(&mut self, id: SlotId) -> Option<()> {
        let old_tail = self.tail;
        if let Some(node) = self.arena.get_mut(id) {
            node.next = None;
            node.prev = old_tail;
        } else {
            return None;
        }
        if let Some(old_tail) = old_tail {
            if let Some(tail_node) = self.arena.get_mut(old_tail) {
                tail_node.next = Some(id);
            }
        } else {
            self.head = Some(id);
        }
        self.tail = Some(id);
        Some(())
    }

    /// Verifies that the links form one acyclic chain covering every live node.
    pub fn check_invariants(&self) -> Result<(), InvariantError> {
        if self.head.is_none() || self.tail.is_none() {
            if self.head.is_some() || self.tail.is_some() || !self.is_empty() {
                return Err(InvariantError::new(
                    "empty list must have neither head nor tail",
                ));
            }
            return Ok(());
        }

        let mut count = 0usize;
        let mut current = self.head;
        let mut prev = None;

        while let Some(id) = current {
            let node = self
                .arena
                .get(id)
                .ok_or_else(|| InvariantError::new(format!("dangling link to slot {}", id.index())))?;
            if node.prev != prev {
                return Err(InvariantError::new(format!(
                    "slot {} has a broken back link",
                    id.index()
                )));
            }
            if node.next.is_none() && self.tail != Some(id) {
                return Err(InvariantError::new("chain ends before the tail"));
            }

            prev = Some(id);
            current = node.next;
            count += 1;
            if count > self.len() {
                return Err(InvariantError::new("cycle in recency chain"));
            }
        }

        if count != self.len() {
            return Err(InvariantError::new(format!(
                "chain covers {count} nodes but {} are live",
                self.len()
            )));
        }
        Ok(())
    }
}

/// Iterator over `(SlotId, &T)` pairs from LRU to MRU.
pub struct IntrusiveListEntryIter<'a, T> {
    list: &'a IntrusiveList<T>,
    current: Option<SlotId>,
}

impl<'a, T> Iterator for IntrusiveListEntryIter<'a, T> {
    type Item = (SlotId, &'a T);

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.current?;
        let node = self.list.arena.get(id)?;
        self.current = node.next;
        Some((id, &node.value))
    }
}

impl<T> Default for IntrusiveList<T> {
    fn default() -> Self {
        Self::new()
    }
}
