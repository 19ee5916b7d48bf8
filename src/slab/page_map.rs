//! Side table from page-aligned addresses to owning-allocation metadata.
//!
//! Every pointer handed to `free` or `realloc` is resolved here in O(1),
//! instead of scanning backward through memory for a slab sentinel (which
//! can false-positive on coincidental bit patterns and walks an unbounded
//! number of pages).
//!
//! Two-level radix tree over page numbers. Level 1 is a single mmap'd array
//! of 2^18 atomic pointers; level 2 blocks of 2048 entries are mapped
//! lazily, so only address regions the allocator actually touches consume
//! physical memory. Each L2 entry packs a [`PageInfo`] into one AtomicU64,
//! which rules out torn reads without any locking:
//!
//!   bit  63      : large-allocation flag
//!   bits [16..63): slab header address >> 12
//!   bits [8..16) : size-class index
//!   bits [0..8)  : arena index

use crate::platform;
use crate::util::{align_up, page_size, page_shift};
use core::ptr;
use core::sync::atomic::{AtomicPtr, AtomicU64, Ordering};

/// What a registered page belongs to.
#[derive(Clone, Copy)]
pub struct PageInfo {
    /// Slab header address; null is never stored, and large allocations
    /// carry no slab.
    pub slab: *mut u8,
    pub class_index: u8,
    pub arena_index: u8,
    large: bool,
}

impl PageInfo {
    #[inline]
    pub fn is_large(&self) -> bool {
        self.large
    }
}

const LARGE_BIT: u64 = 1 << 63;

#[inline]
fn pack_slab(slab: *mut u8, class_index: u8, arena_index: u8) -> u64 {
    ((slab as u64 >> 12) << 16) | ((class_index as u64) << 8) | arena_index as u64
}

#[inline(always)]
fn unpack(packed: u64) -> Option<PageInfo> {
    if packed == 0 {
        return None;
    }
    if packed & LARGE_BIT != 0 {
        return Some(PageInfo {
            slab: ptr::null_mut(),
            class_index: 0,
            arena_index: 0,
            large: true,
        });
    }
    Some(PageInfo {
        slab: ((packed >> 16) << 12) as *mut u8,
        class_index: ((packed >> 8) & 0xFF) as u8,
        arena_index: (packed & 0xFF) as u8,
        large: false,
    })
}

/// Pages covered by one L2 block, and the L1 fan-out. Together they span
/// 2^18 * 2048 * 4 KiB = 2 TiB of address space.
const L2_SLOTS: usize = 2048;
const L2_SHIFT: usize = 11;
const L1_SLOTS: usize = 1 << 18;

#[repr(C)]
struct L2Block {
    entries: [AtomicU64; L2_SLOTS],
}

struct PageMap {
    /// L1 array of AtomicPtr<L2Block>; null while untouched.
    l1: AtomicPtr<AtomicPtr<L2Block>>,
}

unsafe impl Send for PageMap {}
unsafe impl Sync for PageMap {}

static PAGE_MAP: PageMap = PageMap {
    l1: AtomicPtr::new(ptr::null_mut()),
};

#[inline(always)]
fn indices(addr: usize) -> (usize, usize) {
    let page = addr >> page_shift();
    (
        (page >> L2_SHIFT) & (L1_SLOTS - 1),
        page & (L2_SLOTS - 1),
    )
}

/// Map the L1 array. Must run once before the first allocation.
///
/// # Safety
/// Single-threaded init context.
pub unsafe fn init() -> bool {
    let bytes = align_up(
        L1_SLOTS * core::mem::size_of::<AtomicPtr<L2Block>>(),
        page_size(),
    );
    let mem = platform::map_anonymous(bytes);
    if mem.is_null() {
        return false;
    }
    // Fresh mapping is zero-filled, and a null AtomicPtr is all-zero bits,
    // so the array needs no further initialization.
    PAGE_MAP
        .l1
        .store(mem as *mut AtomicPtr<L2Block>, Ordering::Release);
    true
}

unsafe fn l2_for(l1: *mut AtomicPtr<L2Block>, l1_idx: usize, create: bool) -> *mut L2Block {
    let slot = &*l1.add(l1_idx);
    let existing = slot.load(Ordering::Acquire);
    if !existing.is_null() || !create {
        return existing;
    }

    let bytes = align_up(core::mem::size_of::<L2Block>(), page_size());
    let mem = platform::map_anonymous(bytes);
    if mem.is_null() {
        return ptr::null_mut();
    }
    let fresh = mem as *mut L2Block;
    // Racing registration from another arena: keep the winner's block.
    match slot.compare_exchange(ptr::null_mut(), fresh, Ordering::AcqRel, Ordering::Acquire) {
        Ok(_) => fresh,
        Err(winner) => {
            platform::unmap(mem, bytes);
            winner
        }
    }
}

unsafe fn store_range(start: *mut u8, len: usize, packed: u64) {
    let l1 = PAGE_MAP.l1.load(Ordering::Acquire);
    if l1.is_null() {
        return;
    }
    let pages = len.div_ceil(page_size());
    for i in 0..pages {
        let addr = start as usize + i * page_size();
        let (l1_idx, l2_idx) = indices(addr);
        let l2 = l2_for(l1, l1_idx, packed != 0);
        if !l2.is_null() {
            (*l2).entries[l2_idx].store(packed, Ordering::Release);
        }
    }
}

/// Register the data pages of a slab.
///
/// # Safety
/// `data` and `slab` must point into a live mapping; `len` covers the data
/// region.
pub unsafe fn insert_slab(
    data: *mut u8,
    len: usize,
    slab: *mut u8,
    class_index: usize,
    arena_index: usize,
) {
    store_range(data, len, pack_slab(slab, class_index as u8, arena_index as u8));
}

/// Register the pages of a large allocation.
///
/// # Safety
/// `ptr` must be the user pointer of a live mapping of at least `len` bytes.
pub unsafe fn insert_large(ptr: *mut u8, len: usize) {
    store_range(ptr, len, LARGE_BIT);
}

/// Drop the registration of `len` bytes starting at `ptr`. Called right
/// before a slab or large mapping is unmapped.
///
/// # Safety
/// The range must have been previously registered.
pub unsafe fn remove_range(ptr: *mut u8, len: usize) {
    store_range(ptr, len, 0);
}

/// Resolve a pointer to its owning allocation, if any. Lock-free.
///
/// # Safety
/// The page map must be initialized; `ptr` may be any address.
#[inline(always)]
pub unsafe fn lookup(ptr: *mut u8) -> Option<PageInfo> {
    let l1 = PAGE_MAP.l1.load(Ordering::Acquire);
    if l1.is_null() {
        return None;
    }
    let (l1_idx, l2_idx) = indices(ptr as usize);
    let l2 = (*l1.add(l1_idx)).load(Ordering::Acquire);
    if l2.is_null() {
        return None;
    }
    unpack((*l2).entries[l2_idx].load(Ordering::Acquire))
}
