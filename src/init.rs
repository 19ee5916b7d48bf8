//! One-time initialization. Every public entry point funnels through
//! [`ensure_initialized`]; the first caller wires up the page size, the
//! config and the page map while late arrivals spin on the state flag.

use crate::allocator::BucketAllocator;
use crate::config;
use crate::util;
use core::cell::UnsafeCell;
use core::hint;
use core::sync::atomic::{AtomicU8, Ordering};

const UNINIT: u8 = 0;
const INITIALIZING: u8 = 1;
const READY: u8 = 2;
/// The page map could not be mapped. The allocator is unusable and every
/// request reports out-of-memory; the process itself keeps running.
const FAILED: u8 = 3;

static STATE: AtomicU8 = AtomicU8::new(UNINIT);

struct AllocatorHolder(UnsafeCell<BucketAllocator>);

// Interior mutation only happens single-threaded behind the INITIALIZING
// state; afterwards access is shared and the allocator synchronizes itself.
unsafe impl Sync for AllocatorHolder {}

static ALLOCATOR: AllocatorHolder = AllocatorHolder(UnsafeCell::new(BucketAllocator::new()));

/// Make the allocator usable. Idempotent and safe to race. A failed
/// bootstrap is recorded, not fatal: callers observe it through
/// [`ready`] and answer requests with out-of-memory.
pub fn ensure_initialized() {
    if STATE.load(Ordering::Acquire) == READY {
        return;
    }
    match STATE.compare_exchange(UNINIT, INITIALIZING, Ordering::AcqRel, Ordering::Acquire) {
        Ok(_) => unsafe {
            util::init_page_size();
            config::read_config();
            let outcome = if (*ALLOCATOR.0.get()).init() {
                READY
            } else {
                FAILED
            };
            STATE.store(outcome, Ordering::Release);
        },
        Err(_) => {
            // Another thread is mid-init; wait it out.
            while STATE.load(Ordering::Acquire) == INITIALIZING {
                hint::spin_loop();
            }
        }
    }
}

/// Whether the allocator can serve requests. False only after a failed
/// bootstrap.
#[inline]
pub fn ready() -> bool {
    STATE.load(Ordering::Acquire) == READY
}

/// The process-wide allocator. Callers must have passed through
/// [`ensure_initialized`] and checked [`ready`] first.
#[inline]
pub fn allocator() -> &'static BucketAllocator {
    debug_assert_eq!(STATE.load(Ordering::Acquire), READY);
    unsafe { &*ALLOCATOR.0.get() }
}
