//! The allocator proper: routes each request to the slab layer or the
//! large-object path, spreads threads over arenas, and implements the
//! realloc engine on top of both.

use crate::large::LargeAllocator;
use crate::slab::arena::{Arena, Slab};
use crate::slab::{page_map, size_class};
use crate::stats::{self, StatsSnapshot};
use crate::util::{abort_with_message, page_size, splitmix64, LARGE_THRESHOLD, MAX_ARENAS, MIN_ALIGN};
use crate::platform;
use crate::config;
use core::ptr;

pub struct BucketAllocator {
    arenas: [Arena; MAX_ARENAS],
    /// Live prefix of `arenas`; fixed at init.
    num_arenas: usize,
    large: LargeAllocator,
}

impl BucketAllocator {
    pub const fn new() -> Self {
        #[allow(clippy::declare_interior_mutable_const)]
        const ARENA: Arena = Arena::new();
        BucketAllocator {
            arenas: [ARENA; MAX_ARENAS],
            num_arenas: 0,
            large: LargeAllocator::new(),
        }
    }

    /// Wire up the page map and the configured arena count. Runs once,
    /// before the first allocation.
    ///
    /// # Safety
    /// Single-threaded init context.
    pub unsafe fn init(&mut self) -> bool {
        if !page_map::init() {
            return false;
        }
        self.num_arenas = config::arena_count().clamp(1, MAX_ARENAS);
        for (index, arena) in self.arenas[..self.num_arenas].iter_mut().enumerate() {
            arena.set_index(index);
        }
        true
    }

    /// Arena this thread prefers. Hashing the thread id spreads uncoordinated
    /// threads evenly without any per-thread allocator state.
    #[inline]
    fn home_arena(&self) -> usize {
        (splitmix64(platform::thread_id() as u64) as usize) % self.num_arenas
    }

    /// One probe round over every arena starting at home, then block on
    /// home. A `Some(null)` from an arena is a real out-of-memory answer
    /// and propagates immediately; no sibling would fare better.
    unsafe fn alloc_small(&self, size: usize, class_index: usize) -> *mut u8 {
        let home = self.home_arena();
        for offset in 0..self.num_arenas {
            let arena = &self.arenas[(home + offset) % self.num_arenas];
            if let Some(ptr) = arena.try_alloc(size, class_index) {
                return ptr;
            }
        }
        self.arenas[home].alloc(size, class_index)
    }

    /// C-contract malloc: `malloc(0)` yields a minimal unique pointer,
    /// failure yields null.
    ///
    /// # Safety
    /// The allocator must be initialized.
    pub unsafe fn malloc(&self, size: usize) -> *mut u8 {
        let ptr = match size_class::class_of(size) {
            Some(class_index) => self.alloc_small(size.max(1), class_index),
            None => self.large.alloc(size),
        };
        if !ptr.is_null() {
            stats::count_alloc();
        }
        ptr
    }

    /// malloc with an explicit alignment. Alignments up to MIN_ALIGN are
    /// free; larger ones pick a block size divisible by the alignment, or
    /// fall through to the page-aligned large path. Alignments beyond a
    /// page are refused.
    ///
    /// # Safety
    /// `align` must be a power of two; allocator initialized.
    pub unsafe fn malloc_aligned(&self, size: usize, align: usize) -> *mut u8 {
        if align <= MIN_ALIGN {
            return self.malloc(size);
        }
        if align > page_size() {
            return ptr::null_mut();
        }
        let ptr = match size_class::class_of_aligned(size, align) {
            Some(class_index) => self.alloc_small(size.max(1), class_index),
            None => self.large.alloc(size),
        };
        if !ptr.is_null() {
            stats::count_alloc();
        }
        ptr
    }

    /// Zeroed allocation with overflow-checked element math.
    ///
    /// # Safety
    /// The allocator must be initialized.
    pub unsafe fn calloc(&self, count: usize, size: usize) -> *mut u8 {
        let total = match count.checked_mul(size) {
            Some(total) => total,
            None => return ptr::null_mut(),
        };
        let ptr = self.malloc(total);
        // Slab slots are recycled dirty; large mappings come back zeroed
        // from the page source.
        if !ptr.is_null() && total < LARGE_THRESHOLD {
            ptr::write_bytes(ptr, 0, total);
        }
        ptr
    }

    /// Release `ptr`. Null is a no-op. Unknown or interior pointers abort
    /// in debug builds and are ignored in release; a repeat free of a slot
    /// that has not been recycled always aborts (detected inside the
    /// arena via the per-slot freed flag).
    ///
    /// # Safety
    /// `ptr` must be null or a pointer this allocator returned that has not
    /// been freed since.
    pub unsafe fn free(&self, ptr: *mut u8) {
        if ptr.is_null() {
            return;
        }
        match page_map::lookup(ptr) {
            Some(info) if info.is_large() => {
                if self.large.free(ptr) {
                    stats::count_free();
                } else {
                    misuse("bucketalloc: free of interior large-object pointer\n");
                }
            }
            Some(info) => {
                let arena = &self.arenas[info.arena_index as usize];
                if arena.free(info.slab, ptr) {
                    stats::count_free();
                } else {
                    misuse("bucketalloc: free of invalid slab pointer\n");
                }
            }
            None => misuse("bucketalloc: free of unknown pointer\n"),
        }
    }

    /// C-contract realloc. `realloc(null, n)` allocates; `realloc(p, 0)`
    /// frees and returns null. Growth within the current block or mapping
    /// is served in place; otherwise allocate-copy-free, preserving the old
    /// block when the new allocation fails.
    ///
    /// # Safety
    /// `ptr` must be null or a live pointer from this allocator.
    pub unsafe fn realloc(&self, ptr: *mut u8, new_size: usize) -> *mut u8 {
        if ptr.is_null() {
            return self.malloc(new_size);
        }
        if new_size == 0 {
            self.free(ptr);
            return ptr::null_mut();
        }

        match page_map::lookup(ptr) {
            Some(info) if info.is_large() => {
                if self.large.resize_in_place(ptr, new_size) {
                    return ptr;
                }
                match self.large.requested_size(ptr) {
                    Some(old_size) => self.relocate(ptr, old_size, new_size),
                    None => {
                        misuse("bucketalloc: realloc of interior large-object pointer\n");
                        ptr::null_mut()
                    }
                }
            }
            Some(info) => {
                let slab = &*(info.slab as *const Slab);
                let slot = match slab.slot_index_of(ptr) {
                    Some(slot) => slot,
                    None => {
                        misuse("bucketalloc: realloc of invalid slab pointer\n");
                        return ptr::null_mut();
                    }
                };
                // The caller owns this slot, so its metadata can be read
                // and updated without the arena lock.
                let meta = slab.slot_meta(slot);
                let capacity = size_class::block_size(info.class_index as usize);
                if new_size <= capacity && new_size < LARGE_THRESHOLD {
                    meta.set_requested(new_size);
                    return ptr;
                }
                self.relocate(ptr, meta.requested(), new_size)
            }
            None => {
                misuse("bucketalloc: realloc of unknown pointer\n");
                ptr::null_mut()
            }
        }
    }

    unsafe fn relocate(&self, ptr: *mut u8, old_size: usize, new_size: usize) -> *mut u8 {
        let fresh = self.malloc(new_size);
        if fresh.is_null() {
            // The old block stays valid on failure.
            return ptr::null_mut();
        }
        ptr::copy_nonoverlapping(ptr, fresh, old_size.min(new_size));
        self.free(ptr);
        fresh
    }

    /// Writable extent behind `ptr`: the block size for slab pointers, the
    /// mapped extent for large ones, zero for anything unrecognized.
    ///
    /// # Safety
    /// `ptr` must be null or a live pointer from this allocator.
    pub unsafe fn usable_size(&self, ptr: *mut u8) -> usize {
        if ptr.is_null() {
            return 0;
        }
        match page_map::lookup(ptr) {
            Some(info) if info.is_large() => self.large.usable_size(ptr).unwrap_or(0),
            Some(info) => size_class::block_size(info.class_index as usize),
            None => 0,
        }
    }

    /// Snapshot the global counters plus the current free-slot total, the
    /// latter gathered under each arena lock in turn.
    pub fn stats_snapshot(&self) -> StatsSnapshot {
        let free_list_length: usize = self.arenas[..self.num_arenas]
            .iter()
            .map(Arena::free_slots)
            .sum();
        StatsSnapshot::from_counters(free_list_length as u64)
    }
}

/// Pointer-misuse report: loud in debug builds, silently ignored in
/// release (matching the usual C allocator posture for foreign pointers).
#[cold]
fn misuse(msg: &str) {
    if cfg!(debug_assertions) {
        abort_with_message(msg);
    }
}
