//! Occupancy statistics, event counters and the printable status summary.

use std::collections::BTreeMap;
use std::fmt;
use std::hash::Hash;
use std::ops::{Add, AddAssign};

use crate::ds::OrderedMap;
use crate::entry::CacheEntry;

/// Snapshot of how much a cache holds and how much of it could be evicted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub count_all: usize,
    pub count_evictable: usize,
    pub bytes_all: u64,
    pub bytes_evictable: u64,
}

impl CacheStats {
    /// Adds one entry to the totals.
    pub fn record(&mut self, entry: &CacheEntry, evictable: bool) {
        self.count_all += 1;
        self.bytes_all += entry.size;
        if evictable {
            self.count_evictable += 1;
            self.bytes_evictable += entry.size;
        }
    }

    /// Totals over a ranked map of entries.
    ///
    /// An entry counts as evictable when it is unpinned and not the MRU of
    /// the map.
    pub fn of_map<K>(map: &OrderedMap<K, CacheEntry>) -> Self
    where
        K: Eq + Hash + Clone,
    {
        Self::of_map_with(map, |entry| Some(entry))
    }

    /// Like [`CacheStats::of_map`] for maps whose values may hold no entry.
    ///
    /// The MRU is the newest value that holds an entry.
    pub fn of_map_with<K, V, F>(map: &OrderedMap<K, V>, entry_of: F) -> Self
    where
        K: Eq + Hash + Clone,
        F: Fn(&V) -> Option<&CacheEntry>,
    {
        let mru = map
            .iter()
            .enumerate()
            .filter_map(|(position, (_, _, value))| entry_of(value).map(|_| position))
            .last();
        map.mapreduce(
            Self::default(),
            |value, position| {
                let mut part = Self::default();
                if let Some(entry) = entry_of(value) {
                    part.record(entry, entry.is_evictable() && Some(position) != mru);
                }
                part
            },
            |acc, part| acc + part,
        )
    }

    pub fn count_evictable_percent(&self) -> u64 {
        percent(self.count_evictable as u64, self.count_all as u64)
    }

    pub fn bytes_evictable_percent(&self) -> u64 {
        percent(self.bytes_evictable, self.bytes_all)
    }
}

impl Add for CacheStats {
    type Output = Self;

    fn add(mut self, rhs: Self) -> Self {
        self += rhs;
        self
    }
}

impl AddAssign for CacheStats {
    fn add_assign(&mut self, rhs: Self) {
        self.count_all += rhs.count_all;
        self.count_evictable += rhs.count_evictable;
        self.bytes_all += rhs.bytes_all;
        self.bytes_evictable += rhs.bytes_evictable;
    }
}

fn percent(part: u64, whole: u64) -> u64 {
    if whole == 0 {
        0
    } else {
        part.saturating_mul(100) / whole
    }
}

/// Event counters maintained by the shared protocol and the eviction paths.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheCounters {
    pub hits: u64,
    /// `get` answered from the waiting map.
    pub staged_hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub fifo_evictions: u64,
    /// Victim searches that found nothing and let a structure grow.
    pub eviction_failures: u64,
}

impl CacheCounters {
    pub fn lookups(&self) -> u64 {
        self.hits + self.staged_hits + self.misses
    }

    /// Fraction of lookups served from a ranked structure.
    pub fn hit_rate(&self) -> f64 {
        let lookups = self.lookups();
        if lookups == 0 {
            0.0
        } else {
            self.hits as f64 / lookups as f64
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SummaryValue {
    Int(u64),
    Text(String),
}

impl fmt::Display for SummaryValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SummaryValue::Int(value) => write!(f, "{value}"),
            SummaryValue::Text(value) => f.write_str(value),
        }
    }
}

/// Key-value status report, rendered one `key: value` line per field in
/// key order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusSummary {
    fields: BTreeMap<String, SummaryValue>,
}

impl StatusSummary {
    /// Fields every cache reports.
    pub fn standard(name: &str, capacity: Option<usize>, stats: &CacheStats, waiting: usize) -> Self {
        let mut summary = Self::default();
        summary.set_text("cache_name", name);
        match capacity {
            Some(capacity) => summary.set_int("cache_capacity", capacity as u64),
            None => summary.set_text("cache_capacity", "unlimited"),
        }
        summary.set_int("cache_size", stats.count_all as u64);
        summary.set_int("cache_size_evictable", stats.count_evictable as u64);
        summary.set_int("cache_size_evictable_percent", stats.count_evictable_percent());
        summary.set_int("cache_waiting", waiting as u64);
        summary.set_int("cache_filesize_all", stats.bytes_all);
        summary.set_int("cache_filesize_evictable", stats.bytes_evictable);
        summary.set_int("cache_filesize_evictable_percent", stats.bytes_evictable_percent());
        summary
    }

    pub fn set_int(&mut self, key: &str, value: u64) {
        self.fields.insert(key.to_string(), SummaryValue::Int(value));
    }

    pub fn set_text(&mut self, key: &str, value: impl Into<String>) {
        self.fields.insert(key.to_string(), SummaryValue::Text(value.into()));
    }

    pub fn get(&self, key: &str) -> Option<&SummaryValue> {
        self.fields.get(key)
    }

    pub fn int(&self, key: &str) -> Option<u64> {
        match self.fields.get(key) {
            Some(SummaryValue::Int(value)) => Some(*value),
            _ => None,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &SummaryValue)> {
        self.fields.iter().map(|(key, value)| (key.as_str(), value))
    }
}

impl fmt::Display for StatusSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (key, value) in &self.fields {
            writeln!(f, "{key}: {value}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &str, size: u64) -> CacheEntry {
        CacheEntry::available(name, name, size)
    }

    #[test]
    fn of_map_skips_mru_and_pinned_entries() {
        let mut map = OrderedMap::new(4);
        map.add("a".to_string(), entry("a", 10)).unwrap();
        let mut pinned = entry("b", 20);
        pinned.lock();
        map.add("b".to_string(), pinned).unwrap();
        map.add("c".to_string(), entry("c", 30)).unwrap();
        map.add("d".to_string(), entry("d", 40)).unwrap();

        let stats = CacheStats::of_map(&map);
        assert_eq!(stats.count_all, 4);
        assert_eq!(stats.bytes_all, 100);
        // a and c; b is pinned and d is the MRU
        assert_eq!(stats.count_evictable, 2);
        assert_eq!(stats.bytes_evictable, 40);
        assert_eq!(stats.count_evictable_percent(), 50);
        assert_eq!(stats.bytes_evictable_percent(), 40);
    }

    #[test]
    fn of_map_with_takes_newest_entry_as_mru() {
        let mut map: OrderedMap<String, Option<CacheEntry>> = OrderedMap::new(4);
        map.add("a".to_string(), Some(entry("a", 10))).unwrap();
        map.add("b".to_string(), Some(entry("b", 20))).unwrap();
        map.add("c".to_string(), None).unwrap();

        let stats = CacheStats::of_map_with(&map, Option::as_ref);
        assert_eq!(stats.count_all, 2);
        // b is the newest entry even though c sits above it
        assert_eq!(stats.count_evictable, 1);
        assert_eq!(stats.bytes_evictable, 10);
    }

    #[test]
    fn stats_add_and_empty_percent() {
        let empty = CacheStats::default();
        assert_eq!(empty.count_evictable_percent(), 0);

        let a = CacheStats { count_all: 1, count_evictable: 1, bytes_all: 5, bytes_evictable: 5 };
        let b = CacheStats { count_all: 2, count_evictable: 0, bytes_all: 7, bytes_evictable: 0 };
        let sum = a + b;
        assert_eq!(sum.count_all, 3);
        assert_eq!(sum.bytes_all, 12);
        assert_eq!(sum.bytes_evictable, 5);
    }

    #[test]
    fn counters_hit_rate() {
        let counters = CacheCounters { hits: 3, staged_hits: 1, misses: 4, ..Default::default() };
        assert_eq!(counters.lookups(), 8);
        assert!((counters.hit_rate() - 0.375).abs() < f64::EPSILON);
        assert_eq!(CacheCounters::default().hit_rate(), 0.0);
    }

    #[test]
    fn summary_renders_sorted_lines() {
        let stats = CacheStats { count_all: 2, count_evictable: 1, bytes_all: 8, bytes_evictable: 2 };
        let mut summary = StatusSummary::standard("LRU", Some(4), &stats, 1);
        summary.set_int("extra", 9);

        assert_eq!(summary.int("cache_capacity"), Some(4));
        assert_eq!(summary.int("cache_filesize_evictable_percent"), Some(25));
        let text = summary.to_string();
        assert!(text.starts_with("cache_capacity: 4\n"));
        assert!(text.contains("cache_name: LRU\n"));
        assert!(text.ends_with("extra: 9\n"));

        let unlimited = StatusSummary::standard("unlimited", None, &stats, 0);
        assert_eq!(
            unlimited.get("cache_capacity"),
            Some(&SummaryValue::Text("unlimited".into()))
        );
    }
}
