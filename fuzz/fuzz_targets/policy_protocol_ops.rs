#![no_main]

use libfuzzer_sys::fuzz_target;
use simcache::builder::CacheBuilder;
use simcache::config::{CacheConfig, PolicyKind};
use simcache::entry::CacheEntry;
use simcache::env::CacheEnv;
use simcache::traits::FileCache;

// Fuzz the put/get/refresh protocol across all policies
//
// First byte selects policy, capacity and FIFO queue; the rest is a stream
// of (op, key) pairs. Errors are allowed, panics and broken invariants are
// not.
fuzz_target!(|data: &[u8]| {
    if data.len() < 2 {
        return;
    }

    let policy = PolicyKind::ALL[usize::from(data[0]) % PolicyKind::ALL.len()];
    let capacity = 3 + usize::from(data[0] >> 4);
    let mut config = CacheConfig::new(policy, capacity);
    config.fifo_queue_size = usize::from(data[0] & 0x08 != 0);
    config.lir_set_size = 1;
    let (env, storage) = CacheEnv::in_memory();
    let Ok(mut cache) = CacheBuilder::new(config).build(env) else {
        return;
    };

    for pair in data[1..].chunks_exact(2) {
        let key = format!("f{}", pair[1] % 32);
        match pair[0] % 7 {
            0 => {
                storage.insert_file(key.as_str(), 1);
                let _ = cache.put(&key, CacheEntry::available(key.as_str(), key.as_str(), 1));
            }
            1 => {
                let _ = cache.put(&key, CacheEntry::pending(key.as_str(), key.as_str()));
            }
            2 => {
                if cache.get(&key).is_some() {
                    if let Some(entry) = cache.entry_mut(&key) {
                        entry.record_use();
                    }
                }
            }
            3 => {
                let _ = cache.refresh(&key);
            }
            4 => {
                storage.insert_file(key.as_str(), 2);
                let _ = cache.mark_available(&key);
            }
            5 => {
                if let Some(entry) = cache.entry_mut(&key) {
                    if entry.lock_count() > 0 {
                        entry.unlock().unwrap();
                    } else {
                        entry.lock();
                    }
                }
            }
            6 => {
                let stats = cache.stats();
                assert!(stats.count_evictable <= stats.count_all);
                assert!(stats.bytes_evictable <= stats.bytes_all);
            }
            _ => unreachable!(),
        }

        cache.check_invariants().unwrap();
    }
});
