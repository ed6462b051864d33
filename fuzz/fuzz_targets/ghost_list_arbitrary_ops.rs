#![no_main]

use libfuzzer_sys::fuzz_target;
use simcache::ds::GhostList;

// Fuzz arbitrary operation sequences on GhostList
//
// Random record, remove, pop_lru and clear operations; the list must stay
// within capacity and a freshly recorded key must be its MRU.
fuzz_target!(|data: &[u8]| {
    if data.len() < 2 {
        return;
    }

    // First byte: capacity (0-32)
    let capacity = (data[0] as usize) % 33;
    let mut ghost: GhostList<u8> = GhostList::new(capacity);

    for pair in data[1..].chunks_exact(2) {
        let key = pair[1];
        match pair[0] % 5 {
            0 => {
                let dropped = ghost.record(key).unwrap();
                if capacity > 0 {
                    assert!(ghost.contains(&key));
                    assert_eq!(ghost.iter().last(), Some(&key));
                    assert_ne!(dropped, Some(key));
                }
            }
            1 => {
                let removed = ghost.remove(&key);
                assert!(!ghost.contains(&key));
                let _ = removed;
            }
            2 => {
                let before = ghost.len();
                match ghost.pop_lru() {
                    Some(old) => {
                        assert_eq!(ghost.len(), before - 1);
                        assert!(!ghost.contains(&old));
                    }
                    None => assert_eq!(before, 0),
                }
            }
            3 => {
                let _ = ghost.contains(&key);
            }
            4 => {
                ghost.clear();
                assert!(ghost.is_empty());
            }
            _ => unreachable!(),
        }

        ghost.check_invariants().unwrap();
        assert!(ghost.len() <= ghost.capacity());
        if capacity == 0 {
            assert!(ghost.is_empty());
        }
    }
});
