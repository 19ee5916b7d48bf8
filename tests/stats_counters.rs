//! Lifetime-counter accounting. This lives in its own test binary so no
//! unrelated test holds allocations while the balance is checked.

use bucketalloc::init::{allocator, ensure_initialized};
use std::sync::{Arc, Barrier};
use std::thread;

#[test]
fn counters_balance_when_everything_is_freed() {
    ensure_initialized();
    let threads = 4;
    let rounds = 500usize;
    let barrier = Arc::new(Barrier::new(threads));

    let handles: Vec<_> = (0..threads)
        .map(|t| {
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                let a = allocator();
                barrier.wait();
                let sizes = [8usize, 40, 300, 1024, 3071, 3072, 9000];
                let mut held = Vec::new();
                for round in 0..rounds {
                    let size = sizes[(round * 13 + t) % sizes.len()];
                    unsafe {
                        let p = a.malloc(size);
                        assert!(!p.is_null());
                        held.push(p);
                    }
                    if held.len() == 25 {
                        for p in held.drain(..) {
                            unsafe { a.free(p) };
                        }
                    }
                }
                for p in held {
                    unsafe { a.free(p) };
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    let snap = bucketalloc::stats_snapshot();

    // Every allocation was freed, so the chunk counters match exactly and
    // every slab and large mapping went back to the OS.
    assert_eq!(snap.chunks_allocated, snap.chunks_freed);
    assert_eq!(snap.chunks_allocated, (threads * rounds) as u64);
    assert_eq!(snap.pages_mapped, snap.pages_unmapped);

    // With no live allocations there are no slabs, hence no free slots.
    assert_eq!(snap.free_list_length, 0);
}
