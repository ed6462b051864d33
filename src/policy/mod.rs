//! Replacement policies.
//!
//! | Policy      | Module        | Ranked structures              |
//! |-------------|---------------|--------------------------------|
//! | unlimited   | `unlimited`   | hash map, never evicts         |
//! | LRU         | `lru`         | one ordered map                |
//! | ARC         | `arc`         | T1, T2 + ghost lists B1, B2    |
//! | LIRS        | `lirs`        | S (history) + Q (resident HIR) |
//! | BCL, DCL    | `cost`        | one ordered map + cost floor   |
//! | PLRU, PBCL, PDCL | `cost` + `partition` | as above + partition index |
//! | FIFO+X      | `fifo`        | FIFO buffer ahead of policy X  |

use tracing::{debug, warn};

use crate::entry::CacheEntry;
use crate::env::CacheEnv;
use crate::error::CacheError;
use crate::stats::CacheCounters;

pub mod arc;
pub mod cost;
pub mod fifo;
pub mod lirs;
pub mod lru;
pub mod partition;
pub mod unlimited;

pub use arc::ArcCache;
pub use cost::{CostAwareCache, CostVariant};
pub use fifo::FifoWrapper;
pub use lirs::{LirsCache, LirsState};
pub use lru::LruCache;
pub use partition::PartitionIndex;
pub use unlimited::UnlimitedCache;

/// Deletes the file behind an evicted entry. A file that is already gone is
/// only logged.
pub(crate) fn discard_file(env: &CacheEnv, cache: &str, entry: &CacheEntry) {
    match env.storage.remove_file(&entry.path) {
        Ok(()) => debug!(cache, key = %entry.name, size = entry.size, "evicted"),
        Err(err) => warn!(
            cache,
            key = %entry.name,
            error = %err,
            "evicted entry had no removable file"
        ),
    }
}

/// Logs a victim search that came back empty; the caller then grows.
pub(crate) fn report_exhausted(
    cache: &str,
    structure: &'static str,
    capacity: usize,
    counters: &mut CacheCounters,
) {
    let err = CacheError::EvictionExhausted { structure, capacity };
    warn!(cache, error = %err, "every entry is pinned, growing past capacity");
    counters.eviction_failures += 1;
}
