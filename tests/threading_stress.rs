//! Concurrency: many threads hammering the allocator, including frees on a
//! different thread than the matching allocation.

use bucketalloc::init::{allocator, ensure_initialized};
use std::sync::mpsc;
use std::sync::{Arc, Barrier};
use std::thread;

struct SendPtr(*mut u8);
unsafe impl Send for SendPtr {}

const SIZES: [usize; 8] = [8, 24, 100, 512, 1536, 3071, 4096, 10_000];

#[test]
fn parallel_alloc_free_cycles_keep_data_intact() {
    ensure_initialized();
    let threads = 8;
    let barrier = Arc::new(Barrier::new(threads));

    let handles: Vec<_> = (0..threads)
        .map(|t| {
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                let a = allocator();
                barrier.wait();
                let mut held: Vec<(*mut u8, usize, u8)> = Vec::new();
                for round in 0..400usize {
                    let size = SIZES[(round + t) % SIZES.len()];
                    let tag = (round ^ t) as u8;
                    unsafe {
                        let p = a.malloc(size);
                        assert!(!p.is_null());
                        std::ptr::write_bytes(p, tag, size);
                        held.push((p, size, tag));
                    }
                    // Drain every few rounds so slabs churn between empty
                    // and populated.
                    if held.len() >= 16 {
                        for (p, size, tag) in held.drain(..) {
                            unsafe {
                                for i in (0..size).step_by(61) {
                                    assert_eq!(*p.add(i), tag);
                                }
                                a.free(p);
                            }
                        }
                    }
                }
                for (p, size, tag) in held {
                    unsafe {
                        for i in (0..size).step_by(61) {
                            assert_eq!(*p.add(i), tag);
                        }
                        a.free(p);
                    }
                }
            })
        })
        .collect();

    for h in handles {
        h.join().unwrap();
    }
}

#[test]
fn frees_route_home_from_foreign_threads() {
    ensure_initialized();
    let producers = 4;
    let (tx, rx) = mpsc::channel::<(SendPtr, usize, u8)>();

    let handles: Vec<_> = (0..producers)
        .map(|t| {
            let tx = tx.clone();
            thread::spawn(move || {
                let a = allocator();
                for round in 0..300usize {
                    let size = SIZES[round % SIZES.len()];
                    let tag = (round + 7 * t) as u8;
                    unsafe {
                        let p = a.malloc(size);
                        assert!(!p.is_null());
                        std::ptr::write_bytes(p, tag, size);
                        tx.send((SendPtr(p), size, tag)).unwrap();
                    }
                }
            })
        })
        .collect();
    drop(tx);

    // This thread verifies and frees blocks it never allocated.
    let a = allocator();
    for (ptr, size, tag) in rx {
        unsafe {
            for i in (0..size).step_by(47) {
                assert_eq!(*ptr.0.add(i), tag);
            }
            a.free(ptr.0);
        }
    }

    for h in handles {
        h.join().unwrap();
    }
}

#[test]
fn concurrent_reallocs_preserve_prefixes() {
    ensure_initialized();
    let threads = 4;
    let barrier = Arc::new(Barrier::new(threads));

    let handles: Vec<_> = (0..threads)
        .map(|t| {
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                let a = allocator();
                barrier.wait();
                unsafe {
                    let mut p = a.malloc(16);
                    assert!(!p.is_null());
                    let tag = t as u8;
                    std::ptr::write_bytes(p, tag, 16);
                    // Walk the block up through the classes and into the
                    // large path, then back down.
                    for size in [40usize, 200, 1000, 2500, 5000, 20_000, 64, 8] {
                        p = a.realloc(p, size);
                        assert!(!p.is_null());
                        let check = size.min(8);
                        for i in 0..check {
                            assert_eq!(*p.add(i), tag);
                        }
                    }
                    a.free(p);
                }
            })
        })
        .collect();

    for h in handles {
        h.join().unwrap();
    }
}
