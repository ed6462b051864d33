//! Per-file cache metadata.
//!
//! A [`CacheEntry`] describes one simulation output file: where it lives,
//! whether it exists yet, who currently holds it and what it would cost to
//! regenerate. Entries with `available == false` sit in the waiting map of a
//! policy and never in a ranked structure.
//!
//! ## Pins
//!
//! Two independent counters protect the backing file:
//!
//! | Counter        | Held by                       | API                          |
//! |----------------|-------------------------------|------------------------------|
//! | `lock_count`   | analysis clients reading      | [`lock`] / [`unlock`]        |
//! | `writer_count` | the producer still writing it | [`begin_write`] / [`end_write`] |
//!
//! While either is positive the entry is never chosen as a victim. Releasing a
//! pin that is not held is reported as a protocol violation.
//!
//! [`lock`]: CacheEntry::lock
//! [`unlock`]: CacheEntry::unlock
//! [`begin_write`]: CacheEntry::begin_write
//! [`end_write`]: CacheEntry::end_write

use std::path::{Path, PathBuf};

use crate::error::{CacheError, Result};

/// Regeneration cost in abstract units.
pub type Cost = u64;

/// Cost assigned to every file by the cost-agnostic partition policy.
pub const UNIT_COST: Cost = 100;

#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub name: String,
    pub path: PathBuf,
    pub available: bool,
    pub prefetched: bool,
    pub size: u64,
    pub cost: Cost,
    pub partition_key: u64,
    pub sequence_number: u64,
    lock_count: u32,
    writer_count: u32,
    use_count: u32,
}

impl CacheEntry {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>, size: u64, available: bool) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            available,
            prefetched: false,
            size,
            cost: 0,
            partition_key: 0,
            sequence_number: 0,
            lock_count: 0,
            writer_count: 0,
            use_count: 0,
        }
    }

    /// Entry for a file that already exists on storage.
    pub fn available(name: impl Into<String>, path: impl Into<PathBuf>, size: u64) -> Self {
        Self::new(name, path, size, true)
    }

    /// Entry for a file the producer has not written yet.
    pub fn pending(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self::new(name, path, 0, false)
    }

    pub fn with_prefetched(mut self, prefetched: bool) -> Self {
        self.prefetched = prefetched;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn lock_count(&self) -> u32 {
        self.lock_count
    }

    pub fn writer_count(&self) -> u32 {
        self.writer_count
    }

    /// Number of client reads ever seen for this entry.
    pub fn use_count(&self) -> u32 {
        self.use_count
    }

    #[inline]
    pub fn is_pinned(&self) -> bool {
        self.lock_count > 0 || self.writer_count > 0
    }

    #[inline]
    pub fn is_evictable(&self) -> bool {
        !self.is_pinned()
    }

    /// Pins the entry for a client read and counts the access.
    pub fn lock(&mut self) {
        self.lock_count += 1;
        self.use_count = self.use_count.saturating_add(1);
    }

    pub fn unlock(&mut self) -> Result<()> {
        if self.lock_count == 0 {
            return Err(CacheError::protocol(&self.name, "unlock without a held read pin"));
        }
        self.lock_count -= 1;
        Ok(())
    }

    pub fn begin_write(&mut self) {
        self.writer_count += 1;
    }

    pub fn end_write(&mut self) -> Result<()> {
        if self.writer_count == 0 {
            return Err(CacheError::protocol(&self.name, "end_write without a held write pin"));
        }
        self.writer_count -= 1;
        Ok(())
    }

    /// Counts a client access without pinning.
    pub fn record_use(&mut self) {
        self.use_count = self.use_count.saturating_add(1);
    }

    /// Cost the eviction heuristics weigh this entry by.
    ///
    /// Files no client ever asked for are worth half their declared cost,
    /// never less than one unit unless the declared cost is zero.
    pub fn actual_cost(&self) -> Cost {
        if self.use_count > 0 {
            self.cost
        } else if self.cost == 0 {
            0
        } else {
            (self.cost >> 1).max(1)
        }
    }

    /// Scales the declared cost by `factor`, rounding down.
    pub fn apply_penalty(&mut self, factor: f64) {
        let scaled = (self.cost as f64 * factor).floor();
        self.cost = if scaled <= 0.0 { 0 } else { scaled as Cost };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pins_block_eviction() {
        let mut entry = CacheEntry::available("a.nc", "/r/a.nc", 10);
        assert!(entry.is_evictable());

        entry.lock();
        assert!(!entry.is_evictable());
        entry.unlock().unwrap();
        assert!(entry.is_evictable());

        entry.begin_write();
        assert!(entry.is_pinned());
        entry.end_write().unwrap();
        assert!(!entry.is_pinned());
    }

    #[test]
    fn releasing_unheld_pins_is_a_protocol_violation() {
        let mut entry = CacheEntry::pending("b.nc", "/r/b.nc");
        assert!(matches!(entry.unlock(), Err(CacheError::ProtocolViolation { .. })));
        assert!(matches!(entry.end_write(), Err(CacheError::ProtocolViolation { .. })));
        assert_eq!(entry.lock_count(), 0);
        assert_eq!(entry.writer_count(), 0);
    }

    #[test]
    fn lock_counts_as_use() {
        let mut entry = CacheEntry::available("c.nc", "/r/c.nc", 1);
        entry.lock();
        entry.lock();
        assert_eq!(entry.use_count(), 2);
        assert_eq!(entry.lock_count(), 2);
    }

    #[test]
    fn actual_cost_halves_unused_entries() {
        let mut entry = CacheEntry::available("d.nc", "/r/d.nc", 1);
        assert_eq!(entry.actual_cost(), 0);

        entry.cost = 1;
        assert_eq!(entry.actual_cost(), 1);
        entry.cost = 9;
        assert_eq!(entry.actual_cost(), 4);

        entry.record_use();
        assert_eq!(entry.actual_cost(), 9);
    }

    #[test]
    fn penalty_rounds_down() {
        let mut entry = CacheEntry::available("e.nc", "/r/e.nc", 1);
        entry.cost = 7;
        entry.apply_penalty(0.5);
        assert_eq!(entry.cost, 3);
        entry.apply_penalty(0.0);
        assert_eq!(entry.cost, 0);
    }
}
