#![no_main]

use libfuzzer_sys::fuzz_target;
use simcache::ds::OrderedMap;

// Fuzz arbitrary operation sequences on OrderedMap
//
// Mixes add, refresh, erase, victim replacement and predicate scans, and
// checks the structural invariants after every step.
fuzz_target!(|data: &[u8]| {
    let mut map: OrderedMap<u8, u8> = OrderedMap::new(16);

    for chunk in data.chunks_exact(3) {
        let (op, key, arg) = (chunk[0] % 6, chunk[1] % 64, chunk[2]);
        match op {
            0 => {
                let id = map.add(key, arg).unwrap();
                assert_eq!(map.get(id), Some(&arg));
                assert_eq!(map.mru_id(), Some(id));
            }
            1 => {
                if let Some(id) = map.find(&key) {
                    assert!(map.refresh_with_id(id));
                    assert_eq!(map.mru_id(), Some(id));
                }
            }
            2 => {
                if let Some(id) = map.find(&key) {
                    let before = map.len();
                    assert_eq!(map.erase(id).map(|(k, _)| k), Some(key));
                    assert_eq!(map.len(), before - 1);
                }
            }
            3 => {
                let reserved = usize::from(arg % 4);
                let exclude_lru = arg & 0x80 != 0;
                if let Some(victim) =
                    map.find_first_with_predicate(|v| v % 2 == 0, exclude_lru, reserved)
                {
                    if exclude_lru {
                        assert_ne!(Some(victim), map.lru_id());
                    }
                    map.replace(victim, key, arg);
                    assert_eq!(map.get_by_key(&key), Some(&arg));
                }
            }
            4 => {
                let total = map.mapreduce(0usize, |_, _| 1, |acc, one| acc + one);
                assert_eq!(total, map.len());
            }
            5 => {
                if arg == 0 {
                    map.clear();
                    assert!(map.is_empty());
                }
            }
            _ => unreachable!(),
        }

        map.check_invariants().unwrap();
    }
});
