//! Adaptive Replacement Cache (ARC) replacement policy.
//!
//! Balances recency against frequency with two resident lists and two ghost
//! lists, steering the split through a target size `p` for T1.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────────┐
//! │                               ArcCache                                   │
//! │                                                                          │
//! │   T1: OrderedMap<String, CacheEntry>    T2: OrderedMap<String, CacheEntry>│
//! │   seen once since admission             re-referenced                    │
//! │   LRU ─► [a] [c] [f] ◄─ MRU             LRU ─► [b] [e] ◄─ MRU            │
//! │                                                                          │
//! │   B1: GhostList (names evicted from T1) B2: GhostList (evicted from T2)  │
//! │   no file, no cost, names only          no file, no cost, names only     │
//! │                                                                          │
//! │   origins: waiting name ─► FromB1 | FromB2   (ghosts staged by put)      │
//! │   p ∈ [0, capacity]: target size of T1                                   │
//! └──────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Transitions
//!
//! | Where the key is      | Action                                               |
//! |-----------------------|------------------------------------------------------|
//! | T1 (refresh)          | move to T2 MRU                                       |
//! | T2 (refresh)          | refresh in place                                     |
//! | B1 / staged from B1   | `p += max(1, |B2|/|B1|)`, REPLACE, admit to T2 MRU   |
//! | B2 / staged from B2   | `p -= max(1, |B1|/|B2|)`, REPLACE(b2), admit to T2   |
//! | nowhere               | trim ghosts, REPLACE when full, admit to T1 MRU      |
//!
//! REPLACE evicts from T1 into B1 when `|T1| > p`, or `|T1| == p` for a key
//! that came from B2, and from T2 into B2 otherwise. Pinned entries are never
//! chosen; when the preferred list has no unpinned entry the other list is
//! tried, and when neither has one the cache grows.
//!
//! A bare `get` never moves anything. Every structural change happens in
//! `put` or `refresh`.

use rustc_hash::FxHashMap;
use tracing::debug;

use crate::ds::{GhostList, OrderedMap};
use crate::entry::CacheEntry;
use crate::env::CacheEnv;
use crate::error::{CacheError, ConfigError, InvariantError, Result};
use crate::policy::{discard_file, report_exhausted};
use crate::stats::{CacheStats, StatusSummary};
use crate::traits::{PolicyCore, Staging};

/// Ghost list a waiting entry was taken from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    FromB1,
    FromB2,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum List {
    T1,
    T2,
}

impl List {
    fn label(self) -> &'static str {
        match self {
            List::T1 => "T1",
            List::T2 => "T2",
        }
    }
}

#[derive(Debug)]
pub struct ArcCache {
    t1: OrderedMap<String, CacheEntry>,
    t2: OrderedMap<String, CacheEntry>,
    b1: GhostList<String>,
    b2: GhostList<String>,
    origins: FxHashMap<String, Origin>,
    p: usize,
    capacity: usize,
    env: CacheEnv,
    staging: Staging,
}

impl ArcCache {
    pub fn new(env: CacheEnv, capacity: usize) -> std::result::Result<Self, ConfigError> {
        if capacity == 0 {
            return Err(ConfigError::new("ARC capacity must be > 0"));
        }
        Ok(Self {
            t1: OrderedMap::new(capacity),
            t2: OrderedMap::new(capacity),
            b1: GhostList::new(capacity),
            b2: GhostList::new(capacity),
            origins: FxHashMap::default(),
            p: 0,
            capacity,
            env,
            staging: Staging::default(),
        })
    }

    /// Target size of T1.
    pub fn p(&self) -> usize {
        self.p
    }

    pub fn t1_len(&self) -> usize {
        self.t1.len()
    }

    pub fn t2_len(&self) -> usize {
        self.t2.len()
    }

    pub fn b1_len(&self) -> usize {
        self.b1.len()
    }

    pub fn b2_len(&self) -> usize {
        self.b2.len()
    }

    pub fn in_t1(&self, key: &str) -> bool {
        self.t1.contains_key(key)
    }

    pub fn in_t2(&self, key: &str) -> bool {
        self.t2.contains_key(key)
    }

    pub fn in_b1(&self, key: &str) -> bool {
        self.b1.contains(key)
    }

    pub fn in_b2(&self, key: &str) -> bool {
        self.b2.contains(key)
    }

    fn staged_from(&self, origin: Origin) -> usize {
        self.origins.values().filter(|o| **o == origin).count()
    }

    /// Ghost count including waiting entries staged out of B1.
    fn total_b1(&self) -> usize {
        self.b1.len() + self.staged_from(Origin::FromB1)
    }

    fn total_b2(&self) -> usize {
        self.b2.len() + self.staged_from(Origin::FromB2)
    }

    fn is_full(&self) -> bool {
        self.t1.len() + self.t2.len() >= self.capacity
    }

    fn list_mut(&mut self, list: List) -> &mut OrderedMap<String, CacheEntry> {
        match list {
            List::T1 => &mut self.t1,
            List::T2 => &mut self.t2,
        }
    }

    /// Evicts the first unpinned entry of `list` into its ghost list.
    fn evict_from(&mut self, list: List) -> Result<bool> {
        let map = self.list_mut(list);
        let Some(victim) = map.find_first_with_predicate(CacheEntry::is_evictable, false, 0) else {
            return Ok(false);
        };
        let Some((key, entry)) = map.erase(victim) else {
            return Ok(false);
        };
        discard_file(&self.env, "ARC", &entry);
        self.staging.counters.evictions += 1;
        debug!(cache = "ARC", key = %key, from = list.label(), "entry became a ghost");
        match list {
            List::T1 => self.b1.record(key)?,
            List::T2 => self.b2.record(key)?,
        };
        Ok(true)
    }

    fn replace(&mut self, from_b2: bool) -> Result<()> {
        let t1 = self.t1.len();
        let preferred = if t1 > 0 && (t1 > self.p || (from_b2 && t1 == self.p)) {
            List::T1
        } else {
            List::T2
        };
        let fallback = match preferred {
            List::T1 => List::T2,
            List::T2 => List::T1,
        };
        if !self.evict_from(preferred)? && !self.evict_from(fallback)? {
            report_exhausted("ARC", preferred.label(), self.capacity, &mut self.staging.counters);
        }
        Ok(())
    }

    fn replace_if_full(&mut self, from_b2: bool) -> Result<()> {
        if self.is_full() {
            self.replace(from_b2)?;
        }
        Ok(())
    }

    fn admit_from_ghost(&mut self, key: String, entry: CacheEntry, origin: Origin) -> Result<()> {
        let (b1, b2) = (self.total_b1(), self.total_b2());
        match origin {
            Origin::FromB1 => {
                let delta = if b1 >= b2 { 1 } else { (b2 / b1.max(1)).max(1) };
                self.p = (self.p + delta).min(self.capacity);
                self.replace_if_full(false)?;
                self.b1.remove(&key);
                self.origins.remove(&key);
            }
            Origin::FromB2 => {
                let delta = if b2 >= b1 { 1 } else { (b1 / b2.max(1)).max(1) };
                self.p = self.p.saturating_sub(delta);
                self.replace_if_full(true)?;
                self.b2.remove(&key);
                self.origins.remove(&key);
            }
        }
        debug!(cache = "ARC", key = %key, ?origin, p = self.p, "ghost re-admitted to T2");
        self.t2.add(key, entry)?;
        Ok(())
    }

    fn admit_new(&mut self, key: String, entry: CacheEntry) -> Result<()> {
        let l1 = self.t1.len() + self.total_b1();
        if l1 >= self.capacity {
            if self.t1.len() < self.capacity && !self.b1.is_empty() {
                self.b1.pop_lru();
                self.replace_if_full(false)?;
            } else if self.is_full() && !self.evict_from(List::T1)? {
                self.replace(false)?;
            }
        } else {
            let all = l1 + self.t2.len() + self.total_b2();
            if all >= self.capacity {
                if all >= 2 * self.capacity && !self.b2.is_empty() {
                    self.b2.pop_lru();
                }
                self.replace_if_full(false)?;
            }
        }
        self.t1.add(key, entry)?;
        Ok(())
    }
}

impl PolicyCore for ArcCache {
    fn name(&self) -> &str {
        "ARC"
    }

    fn capacity(&self) -> Option<usize> {
        Some(self.capacity)
    }

    fn len(&self) -> usize {
        self.t1.len() + self.t2.len()
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

    fn resident(&self, key: &str) -> Option<&CacheEntry> {
        self.t1.get_by_key(key).or_else(|| self.t2.get_by_key(key))
    }

    fn resident_mut(&mut self, key: &str) -> Option<&mut CacheEntry> {
        if self.t1.contains_key(key) {
            self.t1.get_by_key_mut(key)
        } else {
            self.t2.get_by_key_mut(key)
        }
    }

    fn admit(&mut self, key: String, entry: CacheEntry) -> Result<()> {
        let origin = self.origins.get(&key).copied().or_else(|| {
            if self.b1.contains(&key) {
                Some(Origin::FromB1)
            } else if self.b2.contains(&key) {
                Some(Origin::FromB2)
            } else {
                None
            }
        });
        match origin {
            Some(origin) => self.admit_from_ghost(key, entry, origin),
            None => self.admit_new(key, entry),
        }
    }

    fn promote(&mut self, key: &str) -> Result<()> {
        if let Some(id) = self.t1.find(key) {
            if let Some((key, entry)) = self.t1.erase(id) {
                self.t2.add(key, entry)?;
            }
            return Ok(());
        }
        if self.t2.refresh_with_key(key) {
            return Ok(());
        }
        Err(CacheError::protocol(key, "refresh on unknown key"))
    }

    fn on_stage(&mut self, key: &str) {
        if self.b1.remove(key) {
            self.origins.insert(key.to_owned(), Origin::FromB1);
        } else if self.b2.remove(key) {
            self.origins.insert(key.to_owned(), Origin::FromB2);
        }
    }

    fn resident_stats(&self) -> CacheStats {
        CacheStats::of_map(&self.t1) + CacheStats::of_map(&self.t2)
    }

    fn describe(&self, summary: &mut StatusSummary) {
        summary.set_int("arc_p", self.p as u64);
        summary.set_int("arc_t1", self.t1.len() as u64);
        summary.set_int("arc_t2", self.t2.len() as u64);
        summary.set_int("arc_b1", self.b1.len() as u64);
        summary.set_int("arc_b2", self.b2.len() as u64);
    }

    fn check_invariants(&self) -> std::result::Result<(), InvariantError> {
        self.t1.check_invariants()?;
        self.t2.check_invariants()?;
        self.b1.check_invariants()?;
        self.b2.check_invariants()?;
        if self.p > self.capacity {
            return Err(InvariantError::new(format!(
                "p = {} outside [0, {}]",
                self.p, self.capacity
            )));
        }
        if self.staging.counters.eviction_failures == 0 && self.len() > self.capacity {
            return Err(InvariantError::new(format!(
                "|T1| + |T2| = {} exceeds capacity {}",
                self.len(),
                self.capacity
            )));
        }
        for (_, key, _) in self.t1.iter() {
            if self.t2.contains_key(key) {
                return Err(InvariantError::new(format!("{key} is in both T1 and T2")));
            }
        }
        for (_, key, _) in self.t1.iter().chain(self.t2.iter()) {
            if self.b1.contains(key) || self.b2.contains(key) {
                return Err(InvariantError::new(format!("{key} is resident and a ghost")));
            }
        }
        if let Some(key) = self.b1.iter().find(|key| self.b2.contains(key.as_str())) {
            return Err(InvariantError::new(format!("{key} is in both B1 and B2")));
        }
        Ok(())
    }
}
