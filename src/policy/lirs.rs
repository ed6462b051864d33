//! Low Inter-reference Recency Set (LIRS) replacement policy.
//!
//! Splits the resident set into LIR entries, which are never evicted, and a
//! small queue of resident HIR entries that absorbs one-off accesses. A
//! history stack S remembers recently evicted HIR names so that a quick
//! re-reference can promote them straight into the LIR set.
//!
//! ## Structures
//!
//! ```text
//!   S: OrderedMap<String, LirsMeta>            Q: OrderedMap<String, SlotId>
//!   LRU ─► [L a] [h b] [L c] [n d] [h e] ◄─ MRU    LRU ─► [b] [e] [f] ◄─ MRU
//!                                                 values point into S
//!
//!   L = Lir   h = ResidentHir   n = NonResidentHir
//!   f is ResidentHirNotInS: its S slot stays allocated but is no longer
//!   part of the stack; Pool slots are free for reuse by any new key
//! ```
//!
//! ## State machine
//!
//! ```text
//!              admit (LIR set not full)
//!   (new) ─────────────────────────────────────────────► Lir
//!     │ admit (LIR full)                                  ▲ │
//!     ▼                                                   │ │ demoted on a
//!   ResidentHir ──── refresh: swap with head-of-S LIR ────┘ │ HIR promotion
//!     │   ▲  │                                              ▼
//!     │   │  └── pruned from the head of S ──► ResidentHirNotInS
//!     │   └──────── refresh (back on top of S) ─────────┘   │
//!     │ evicted from Q                                      │ evicted from Q
//!     ▼                                                     ▼
//!   NonResidentHir ── pruned from the head of S ──────────► Pool
//!     └── re-admitted while in S ──► Lir
//! ```
//!
//! After every LIR promotion S is pruned: HIR entries at the bottom of the
//! stack leave it until a LIR entry is at the head.
//!
//! The declared capacities guarantee an unpinned victim in Q and an unpinned
//! LIR entry to demote. When a search still comes back empty the call fails
//! with [`CacheError::FatalConfiguration`] before anything is changed.

use tracing::{debug, error};

use crate::ds::{OrderedMap, SlotId};
use crate::entry::CacheEntry;
use crate::env::CacheEnv;
use crate::error::{CacheError, ConfigError, InvariantError, Result};
use crate::policy::discard_file;
use crate::stats::{CacheStats, StatusSummary};
use crate::traits::{PolicyCore, Staging};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LirsState {
    Lir,
    ResidentHir,
    ResidentHirNotInS,
    NonResidentHir,
    Pool,
}

impl LirsState {
    pub fn is_resident(self) -> bool {
        matches!(
            self,
            LirsState::Lir | LirsState::ResidentHir | LirsState::ResidentHirNotInS
        )
    }

    /// States that count as part of the stack S.
    fn in_stack(self) -> bool {
        matches!(
            self,
            LirsState::Lir | LirsState::ResidentHir | LirsState::NonResidentHir
        )
    }
}

#[derive(Debug)]
struct LirsMeta {
    entry: Option<CacheEntry>,
    state: LirsState,
    stamp: u64,
    irr: Option<u64>,
}

impl LirsMeta {
    fn new(entry: CacheEntry, state: LirsState, stamp: u64) -> Self {
        Self {
            entry: Some(entry),
            state,
            stamp,
            irr: None,
        }
    }

    fn is_unpinned(&self) -> bool {
        self.entry.as_ref().is_some_and(CacheEntry::is_evictable)
    }

    fn touch(&mut self, stamp: u64) {
        self.irr = Some(stamp.saturating_sub(self.stamp));
        self.stamp = stamp;
    }
}

#[derive(Debug)]
pub struct LirsCache {
    s: OrderedMap<String, LirsMeta>,
    q: OrderedMap<String, SlotId>,
    lir_capacity: usize,
    hir_capacity: usize,
    lir_len: usize,
    clock: u64,
    env: CacheEnv,
    staging: Staging,
}

impl LirsCache {
    /// Creates a LIRS cache holding `capacity` files, `lir_capacity` of them
    /// in the LIR set.
    pub fn new(
        env: CacheEnv,
        capacity: usize,
        lir_capacity: usize,
    ) -> std::result::Result<Self, ConfigError> {
        if lir_capacity == 0 || lir_capacity >= capacity {
            return Err(ConfigError::new(format!(
                "LIRS needs 0 < LIR capacity < capacity, got {lir_capacity} of {capacity}"
            )));
        }
        let hir_capacity = capacity - lir_capacity;
        Ok(Self {
            s: OrderedMap::new(capacity * 2),
            q: OrderedMap::new(hir_capacity),
            lir_capacity,
            hir_capacity,
            lir_len: 0,
            clock: 0,
            env,
            staging: Staging::default(),
        })
    }

    pub fn lir_capacity(&self) -> usize {
        self.lir_capacity
    }

    pub fn hir_capacity(&self) -> usize {
        self.hir_capacity
    }

    pub fn lir_len(&self) -> usize {
        self.lir_len
    }

    /// Resident HIR entries, i.e. the length of Q.
    pub fn hir_len(&self) -> usize {
        self.q.len()
    }

    /// Slots held by the history stack, including pool slots.
    pub fn history_len(&self) -> usize {
        self.s.len()
    }

    pub fn state(&self, key: &str) -> Option<LirsState> {
        self.s.get_by_key(key).map(|meta| meta.state)
    }

    pub fn in_q(&self, key: &str) -> bool {
        self.q.contains_key(key)
    }

    /// Clock ticks between the last two references to `key`.
    pub fn irr(&self, key: &str) -> Option<u64> {
        self.s.get_by_key(key).and_then(|meta| meta.irr)
    }

    /// Name of the first stack entry, skipping slots outside S.
    pub fn stack_head(&self) -> Option<&str> {
        self.s
            .iter()
            .find(|(_, _, meta)| meta.state.in_stack())
            .map(|(_, key, _)| key.as_str())
    }

    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    fn fatal(&self, reason: &str) -> CacheError {
        error!(
            cache = "LIRS",
            lir = self.lir_len,
            hir = self.q.len(),
            reason,
            "no unpinned candidate despite validated capacities"
        );
        CacheError::FatalConfiguration(format!("LIRS: {reason}"))
    }

    fn find_head_lir(&self) -> Result<SlotId> {
        self.s
            .find_first_with_predicate(
                |meta| meta.state == LirsState::Lir && meta.is_unpinned(),
                false,
                0,
            )
            .ok_or_else(|| self.fatal("no unpinned LIR entry to demote"))
    }

    /// Q slot of the resident HIR to evict, if Q is full.
    fn find_q_victim(&self) -> Result<Option<SlotId>> {
        if self.q.len() < self.hir_capacity {
            return Ok(None);
        }
        let s = &self.s;
        self.q
            .find_first_with_predicate(
                |sid| s.get(*sid).is_some_and(LirsMeta::is_unpinned),
                false,
                0,
            )
            .map(Some)
            .ok_or_else(|| self.fatal("no unpinned resident HIR entry in Q"))
    }

    /// Drops the file of the HIR held by Q slot `qid`, keeping its history
    /// when it is still in S.
    fn evict_q_slot(&mut self, qid: SlotId) {
        let Some(sid) = self.q.get(qid).copied() else {
            return;
        };
        let Some(meta) = self.s.get_mut(sid) else {
            return;
        };
        if let Some(entry) = meta.entry.take() {
            discard_file(&self.env, "LIRS", &entry);
        }
        meta.state = match meta.state {
            LirsState::ResidentHirNotInS => LirsState::Pool,
            _ => LirsState::NonResidentHir,
        };
        self.staging.counters.evictions += 1;
    }

    /// Places `key → sid` in Q, evicting `victim` first when given.
    fn enqueue(&mut self, key: String, sid: SlotId, victim: Option<SlotId>) -> Result<()> {
        match victim {
            Some(qid) => {
                self.evict_q_slot(qid);
                self.q.replace(qid, key, sid);
            }
            None => {
                self.q.add(key, sid)?;
            }
        }
        Ok(())
    }

    /// Demotes LIR slot `lir` to a resident HIR and returns its key.
    fn demote(&mut self, lir: SlotId) -> Result<String> {
        let key = self
            .s
            .key(lir)
            .cloned()
            .ok_or_else(|| self.fatal("LIR slot without a key"))?;
        if let Some(meta) = self.s.get_mut(lir) {
            meta.state = LirsState::ResidentHir;
        }
        debug!(cache = "LIRS", key = %key, "LIR entry demoted");
        Ok(key)
    }

    fn set_lir(&mut self, sid: SlotId, entry: Option<CacheEntry>) {
        let stamp = self.tick();
        if let Some(meta) = self.s.get_mut(sid) {
            if entry.is_some() {
                meta.entry = entry;
            }
            meta.state = LirsState::Lir;
            meta.touch(stamp);
        }
        self.s.refresh_with_id(sid);
    }

    /// Removes HIR entries from the bottom of S until a LIR entry is at the
    /// head.
    fn prune(&mut self) {
        let mut cursor = self.s.lru_id();
        while let Some(id) = cursor {
            let next = self.s.next_id(id);
            let Some(meta) = self.s.get_mut(id) else {
                break;
            };
            match meta.state {
                LirsState::Lir => break,
                LirsState::ResidentHir => meta.state = LirsState::ResidentHirNotInS,
                LirsState::NonResidentHir => meta.state = LirsState::Pool,
                LirsState::ResidentHirNotInS | LirsState::Pool => {}
            }
            cursor = next;
        }
    }

    /// A HIR name still remembered by S comes back: it joins the LIR set.
    fn readmit(&mut self, sid: SlotId, entry: CacheEntry) -> Result<()> {
        if self.lir_len < self.lir_capacity {
            self.lir_len += 1;
            self.set_lir(sid, Some(entry));
            return Ok(());
        }
        let lir = self.find_head_lir()?;
        let victim = self.find_q_victim()?;
        let demoted = self.demote(lir)?;
        self.enqueue(demoted, lir, victim)?;
        self.set_lir(sid, Some(entry));
        self.prune();
        Ok(())
    }

    fn admit_unknown(&mut self, key: String, entry: CacheEntry) -> Result<()> {
        let reuse = match self.s.find(&key) {
            Some(id) if self.s.get(id).is_some_and(|m| m.state == LirsState::Pool) => Some(id),
            _ => self
                .s
                .find_first_with_predicate(|m| m.state == LirsState::Pool, false, 0),
        };
        let hir = self.lir_len >= self.lir_capacity;
        let victim = if hir { self.find_q_victim()? } else { None };

        let state = if hir { LirsState::ResidentHir } else { LirsState::Lir };
        let stamp = self.tick();
        let meta = LirsMeta::new(entry, state, stamp);
        let sid = match reuse {
            Some(id) => {
                self.s.replace(id, key.clone(), meta);
                id
            }
            None => self.s.add(key.clone(), meta)?,
        };
        if hir {
            self.enqueue(key, sid, victim)?;
        } else {
            self.lir_len += 1;
        }
        Ok(())
    }

    fn promote_hir(&mut self, sid: SlotId, key: &str) -> Result<()> {
        let qid = self
            .q
            .find(key)
            .ok_or_else(|| self.fatal("resident HIR entry missing from Q"))?;
        if self.lir_len < self.lir_capacity {
            self.q.erase(qid);
            self.lir_len += 1;
            self.set_lir(sid, None);
            return Ok(());
        }
        let lir = self.find_head_lir()?;
        let demoted = self.demote(lir)?;
        self.q.replace(qid, demoted, lir);
        self.set_lir(sid, None);
        self.prune();
        Ok(())
    }
}

impl PolicyCore for LirsCache {
    fn name(&self) -> &str {
        "LIRS"
    }

    fn capacity(&self) -> Option<usize> {
        Some(self.lir_capacity + self.hir_capacity)
    }

    fn len(&self) -> usize {
        self.lir_len + self.q.len()
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
        self.s
            .get_by_key(key)
            .filter(|meta| meta.state.is_resident())
            .and_then(|meta| meta.entry.as_ref())
    }

    fn resident_mut(&mut self, key: &str) -> Option<&mut CacheEntry> {
        self.s
            .get_by_key_mut(key)
            .filter(|meta| meta.state.is_resident())
            .and_then(|meta| meta.entry.as_mut())
    }

    fn admit(&mut self, key: String, entry: CacheEntry) -> Result<()> {
        let remembered = self
            .s
            .find(&key)
            .filter(|id| self.s.get(*id).is_some_and(|m| m.state == LirsState::NonResidentHir));
        match remembered {
            Some(sid) => self.readmit(sid, entry),
            None => self.admit_unknown(key, entry),
        }
    }

    fn promote(&mut self, key: &str) -> Result<()> {
        let (sid, state) = self
            .s
            .find(key)
            .and_then(|id| self.s.get(id).map(|meta| (id, meta.state)))
            .ok_or_else(|| CacheError::protocol(key, "refresh on unknown key"))?;
        match state {
            LirsState::Lir => {
                let stamp = self.tick();
                if let Some(meta) = self.s.get_mut(sid) {
                    meta.touch(stamp);
                }
                self.s.refresh_with_id(sid);
                self.prune();
                Ok(())
            }
            LirsState::ResidentHir => self.promote_hir(sid, key),
            LirsState::ResidentHirNotInS => {
                let stamp = self.tick();
                if let Some(meta) = self.s.get_mut(sid) {
                    meta.state = LirsState::ResidentHir;
                    meta.touch(stamp);
                }
                self.s.refresh_with_id(sid);
                self.q.refresh_with_key(key);
                Ok(())
            }
            LirsState::NonResidentHir | LirsState::Pool => {
                Err(CacheError::protocol(key, "refresh on a non-resident key"))
            }
        }
    }

    fn resident_stats(&self) -> CacheStats {
        CacheStats::of_map_with(&self.s, |meta| {
            meta.state
                .is_resident()
                .then_some(meta.entry.as_ref())
                .flatten()
        })
    }

    fn describe(&self, summary: &mut StatusSummary) {
        summary.set_int("lirs_lir_capacity", self.lir_capacity as u64);
        summary.set_int("lirs_hir_capacity", self.hir_capacity as u64);
        summary.set_int("lirs_lir_size", self.lir_len as u64);
        summary.set_int("lirs_hir_size", self.q.len() as u64);
        summary.set_int("lirs_history_size", self.s.len() as u64);
    }

    fn check_invariants(&self) -> std::result::Result<(), InvariantError> {
        self.s.check_invariants()?;
        self.q.check_invariants()?;

        let lirs = self
            .s
            .iter()
            .filter(|(_, _, meta)| meta.state == LirsState::Lir)
            .count();
        if lirs != self.lir_len || lirs > self.lir_capacity {
            return Err(InvariantError::new(format!(
                "{lirs} LIR entries, counter {} and capacity {}",
                self.lir_len, self.lir_capacity
            )));
        }
        if self.q.len() > self.hir_capacity {
            return Err(InvariantError::new(format!(
                "Q holds {} entries over capacity {}",
                self.q.len(),
                self.hir_capacity
            )));
        }
        for (sid, key, meta) in self.s.iter() {
            let queued = self.q.get_by_key(key.as_str());
            match meta.state {
                LirsState::Lir if queued.is_some() => {
                    return Err(InvariantError::new(format!("LIR entry {key} is in Q")));
                }
                LirsState::ResidentHir | LirsState::ResidentHirNotInS if queued != Some(&sid) => {
                    return Err(InvariantError::new(format!(
                        "resident HIR {key} is not queued at its slot"
                    )));
                }
                LirsState::NonResidentHir | LirsState::Pool if meta.entry.is_some() => {
                    return Err(InvariantError::new(format!(
                        "non-resident {key} still owns a file"
                    )));
                }
                state if state.is_resident() && meta.entry.is_none() => {
                    return Err(InvariantError::new(format!("resident {key} has no entry")));
                }
                _ => {}
            }
        }
        if self.lir_len > 0 {
            let head = self.s.iter().find(|(_, _, meta)| meta.state.in_stack());
            if let Some((_, key, meta)) = head {
                if meta.state != LirsState::Lir {
                    return Err(InvariantError::new(format!(
                        "head of S is {key} in state {:?}",
                        meta.state
                    )));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::test_support::{env, put_file, touch};
    use crate::traits::FileCache;

    fn cache(capacity: usize, lir: usize) -> (LirsCache, std::sync::Arc<crate::storage::MemoryStorage>) {
        let (env, storage) = env();
        (LirsCache::new(env, capacity, lir).unwrap(), storage)
    }

    mod construction {
        use super::*;

        #[test]
        fn lir_capacity_must_leave_room_for_hir() {
            let (env, _) = env();
            assert!(LirsCache::new(env.clone(), 4, 0).is_err());
            assert!(LirsCache::new(env.clone(), 4, 4).is_err());
            let lirs = LirsCache::new(env, 4, 3).unwrap();
            assert_eq!(lirs.hir_capacity(), 1);
            assert_eq!(lirs.capacity(), Some(4));
        }
    }

    mod transitions {
        use super::*;

        #[test]
        fn fills_lir_set_first_then_queues_hir() {
            let (mut lirs, storage) = cache(3, 2);
            put_file(&mut lirs, &storage, "A");
            put_file(&mut lirs, &storage, "B");
            put_file(&mut lirs, &storage, "C");

            assert_eq!(lirs.state("A"), Some(LirsState::Lir));
            assert_eq!(lirs.state("B"), Some(LirsState::Lir));
            assert_eq!(lirs.state("C"), Some(LirsState::ResidentHir));
            assert!(lirs.in_q("C"));
            lirs.check_invariants().unwrap();
        }

        #[test]
        fn full_queue_evicts_into_history() {
            let (mut lirs, storage) = cache(3, 2);
            for key in ["A", "B", "C", "D"] {
                put_file(&mut lirs, &storage, key);
            }
            assert_eq!(lirs.state("C"), Some(LirsState::NonResidentHir));
            assert!(lirs.internal_lookup("C").is_none());
            assert!(lirs.in_q("D"));
            assert_eq!(lirs.len(), 3);
            assert_eq!(lirs.counters().evictions, 1);
            lirs.check_invariants().unwrap();
        }

        #[test]
        fn remembered_hir_returns_as_lir() {
            let (mut lirs, storage) = cache(3, 2);
            for key in ["A", "B", "C", "D", "C"] {
                put_file(&mut lirs, &storage, key);
            }
            assert_eq!(lirs.state("C"), Some(LirsState::Lir));
            // A was the head LIR; after pruning it is queued outside S
            assert_eq!(lirs.state("A"), Some(LirsState::ResidentHirNotInS));
            assert!(lirs.in_q("A"));
            assert_eq!(lirs.state("D"), Some(LirsState::NonResidentHir));
            assert_eq!(lirs.stack_head(), Some("B"));
            lirs.check_invariants().unwrap();
        }

        #[test]
        fn hir_refresh_swaps_with_head_lir() {
            let (mut lirs, storage) = cache(3, 2);
            for key in ["A", "B", "C", "D", "C"] {
                put_file(&mut lirs, &storage, key);
            }
            touch(&mut lirs, "A");
            assert_eq!(lirs.state("A"), Some(LirsState::ResidentHir));

            touch(&mut lirs, "A");
            assert_eq!(lirs.state("A"), Some(LirsState::Lir));
            assert_eq!(lirs.state("B"), Some(LirsState::ResidentHirNotInS));
            assert!(lirs.in_q("B"));
            // D was history below the new head and is released
            assert_eq!(lirs.state("D"), Some(LirsState::Pool));
            assert_eq!(lirs.stack_head(), Some("C"));
            assert!(lirs.irr("A").is_some());
            lirs.check_invariants().unwrap();
        }

        #[test]
        fn pool_slots_are_reused() {
            let (mut lirs, storage) = cache(3, 2);
            for key in ["A", "B", "C", "D", "C"] {
                put_file(&mut lirs, &storage, key);
            }
            touch(&mut lirs, "A");
            touch(&mut lirs, "A");
            let slots = lirs.history_len();

            put_file(&mut lirs, &storage, "E");
            assert_eq!(lirs.history_len(), slots);
            assert_eq!(lirs.state("D"), None);
            assert_eq!(lirs.state("E"), Some(LirsState::ResidentHir));
            lirs.check_invariants().unwrap();
        }

        #[test]
        fn lir_refresh_moves_to_top() {
            let (mut lirs, storage) = cache(3, 2);
            for key in ["A", "B", "C"] {
                put_file(&mut lirs, &storage, key);
            }
            touch(&mut lirs, "A");
            assert_eq!(lirs.stack_head(), Some("B"));
            assert_eq!(lirs.state("C"), Some(LirsState::ResidentHir));
            lirs.check_invariants().unwrap();
        }
    }

    mod pins {
        use super::*;
        use crate::storage::Storage;

        #[test]
        fn pinned_queue_is_fatal() {
            let (mut lirs, storage) = cache(3, 2);
            for key in ["A", "B", "C"] {
                put_file(&mut lirs, &storage, key);
            }
            lirs.entry_mut("C").unwrap().lock();

            storage.insert_file("D", 1);
            let err = lirs
                .put("D", CacheEntry::available("D", "D", 1))
                .unwrap_err();
            assert!(err.is_fatal());
            assert!(lirs.internal_lookup("D").is_none());
            assert_eq!(lirs.state("C"), Some(LirsState::ResidentHir));
            assert_eq!(lirs.state("A"), Some(LirsState::Lir));
            assert_eq!(lirs.state("B"), Some(LirsState::Lir));
            assert_eq!(lirs.len(), 3);
            assert_eq!(lirs.history_len(), 3);
            assert_eq!(lirs.counters().evictions, 0);
            assert!(storage.file_exists(std::path::Path::new("C")));
            lirs.check_invariants().unwrap();
        }

        #[test]
        fn failed_promotion_keeps_entry_staged() {
            let (mut lirs, storage) = cache(3, 2);
            for key in ["A", "B", "C"] {
                put_file(&mut lirs, &storage, key);
            }
            lirs.entry_mut("C").unwrap().lock();

            lirs.put("D", CacheEntry::pending("D", "D")).unwrap();
            storage.insert_file("D", 1);
            lirs.mark_available("D").unwrap();
            let err = lirs.refresh("D").unwrap_err();
            assert!(err.is_fatal());
            assert!(lirs.internal_lookup("D").is_some());
            assert_eq!(lirs.waiting_len(), 1);
            assert_eq!(lirs.len(), 3);

            lirs.entry_mut("C").unwrap().unlock().unwrap();
            lirs.refresh("D").unwrap();
            assert_eq!(lirs.waiting_len(), 0);
            assert_eq!(lirs.state("D"), Some(LirsState::ResidentHir));
            assert_eq!(lirs.state("C"), Some(LirsState::NonResidentHir));
            lirs.check_invariants().unwrap();
        }

        #[test]
        fn pinned_head_lir_is_skipped() {
            let (mut lirs, storage) = cache(3, 2);
            for key in ["A", "B", "C", "D"] {
                put_file(&mut lirs, &storage, key);
            }
            lirs.entry_mut("A").unwrap().lock();
            put_file(&mut lirs, &storage, "C");

            assert_eq!(lirs.state("A"), Some(LirsState::Lir));
            assert_eq!(lirs.state("B"), Some(LirsState::ResidentHir));
            assert_eq!(lirs.state("C"), Some(LirsState::Lir));
            lirs.check_invariants().unwrap();
        }
    }
}
