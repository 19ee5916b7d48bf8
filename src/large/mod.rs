//! Large-object path: requests at or above the slab threshold get a
//! dedicated page-multiple mapping, tracked in a fixed-capacity
//! open-addressed table keyed by the user pointer. The table lives in
//! static storage so the allocator never allocates to track allocations.

use crate::stats;
use crate::sync::RawMutex;
use crate::util::{align_up, page_size, splitmix64, LARGE_THRESHOLD};
use crate::platform;
use crate::slab::page_map;
use core::cell::UnsafeCell;
use core::ptr;

#[derive(Clone, Copy)]
struct Entry {
    /// User pointer, which is also the mapping base. Null = vacant.
    base: *mut u8,
    mapped_size: usize,
    requested_size: usize,
}

const EMPTY: Entry = Entry {
    base: ptr::null_mut(),
    mapped_size: 0,
    requested_size: 0,
};

/// Power of two, so probing can mask instead of mod. At 3/4 load the
/// process tops out at 3072 concurrent large allocations; beyond that a
/// large request reports out-of-memory rather than growing the table.
const CAPACITY: usize = 4096;
const MAX_LIVE: usize = CAPACITY / 4 * 3;

struct Table {
    entries: [Entry; CAPACITY],
    live: usize,
}

pub struct LargeAllocator {
    lock: RawMutex,
    table: UnsafeCell<Table>,
}

unsafe impl Send for LargeAllocator {}
unsafe impl Sync for LargeAllocator {}

#[inline]
fn slot_of(ptr: *mut u8) -> usize {
    (splitmix64(ptr as u64) as usize) & (CAPACITY - 1)
}

impl LargeAllocator {
    pub const fn new() -> Self {
        LargeAllocator {
            lock: RawMutex::new(),
            table: UnsafeCell::new(Table {
                entries: [EMPTY; CAPACITY],
                live: 0,
            }),
        }
    }

    /// Map a dedicated region for `size` bytes. Returns null when the page
    /// source refuses or the tracking table is full.
    ///
    /// # Safety
    /// The allocator must be initialized.
    pub unsafe fn alloc(&self, size: usize) -> *mut u8 {
        let mapped_size = align_up(size.max(1), page_size());
        let base = platform::map_anonymous(mapped_size);
        if base.is_null() {
            return ptr::null_mut();
        }

        self.lock.lock();
        let table = &mut *self.table.get();
        if table.live >= MAX_LIVE {
            self.lock.unlock();
            platform::unmap(base, mapped_size);
            return ptr::null_mut();
        }
        let mut idx = slot_of(base);
        while !table.entries[idx].base.is_null() {
            idx = (idx + 1) & (CAPACITY - 1);
        }
        table.entries[idx] = Entry {
            base,
            mapped_size,
            requested_size: size,
        };
        table.live += 1;
        self.lock.unlock();

        stats::add_pages_mapped(mapped_size / page_size());
        page_map::insert_large(base, mapped_size);
        base
    }

    /// Release the mapping that starts at `ptr`. Returns false when the
    /// pointer is not a tracked large allocation.
    ///
    /// # Safety
    /// The allocator must be initialized.
    pub unsafe fn free(&self, ptr: *mut u8) -> bool {
        self.lock.lock();
        let table = &mut *self.table.get();
        let removed = match Self::find(table, ptr) {
            Some(idx) => {
                let entry = table.entries[idx];
                Self::remove_at(table, idx);
                table.live -= 1;
                Some(entry)
            }
            None => None,
        };
        self.lock.unlock();

        match removed {
            Some(entry) => {
                page_map::remove_range(entry.base, entry.mapped_size);
                stats::add_pages_unmapped(entry.mapped_size / page_size());
                platform::unmap(entry.base, entry.mapped_size);
                true
            }
            None => false,
        }
    }

    /// Try to serve a resize inside the existing mapping. Succeeds when the
    /// new size still belongs on the large path and fits the pages already
    /// mapped; only the recorded request size changes.
    ///
    /// # Safety
    /// The allocator must be initialized.
    pub unsafe fn resize_in_place(&self, ptr: *mut u8, new_size: usize) -> bool {
        if new_size < LARGE_THRESHOLD {
            return false;
        }
        self.lock.lock();
        let table = &mut *self.table.get();
        let ok = match Self::find(table, ptr) {
            Some(idx) if align_up(new_size, page_size()) <= table.entries[idx].mapped_size => {
                table.entries[idx].requested_size = new_size;
                true
            }
            _ => false,
        };
        self.lock.unlock();
        ok
    }

    /// Bytes originally requested for `ptr`, for realloc copying.
    ///
    /// # Safety
    /// The allocator must be initialized.
    pub unsafe fn requested_size(&self, ptr: *mut u8) -> Option<usize> {
        self.lock.lock();
        let table = &*self.table.get();
        let found = Self::find(table, ptr).map(|idx| table.entries[idx].requested_size);
        self.lock.unlock();
        found
    }

    /// Full usable extent of the mapping behind `ptr`.
    ///
    /// # Safety
    /// The allocator must be initialized.
    pub unsafe fn usable_size(&self, ptr: *mut u8) -> Option<usize> {
        self.lock.lock();
        let table = &*self.table.get();
        let found = Self::find(table, ptr).map(|idx| table.entries[idx].mapped_size);
        self.lock.unlock();
        found
    }

    fn find(table: &Table, ptr: *mut u8) -> Option<usize> {
        let mut idx = slot_of(ptr);
        loop {
            let entry = &table.entries[idx];
            if entry.base.is_null() {
                return None;
            }
            if entry.base == ptr {
                return Some(idx);
            }
            idx = (idx + 1) & (CAPACITY - 1);
        }
    }

    /// Backward-shift deletion keeps probe sequences unbroken without
    /// tombstones.
    fn remove_at(table: &mut Table, mut idx: usize) {
        table.entries[idx] = EMPTY;
        let mut next = (idx + 1) & (CAPACITY - 1);
        loop {
            let entry = table.entries[next];
            if entry.base.is_null() {
                return;
            }
            // An entry stays put only if its home slot lies in the cyclic
            // range (idx, next]; otherwise the vacated slot broke its probe
            // path and it shifts back.
            let home = slot_of(entry.base);
            let home_between = if idx <= next {
                idx < home && home <= next
            } else {
                idx < home || home <= next
            };
            if !home_between {
                table.entries[idx] = entry;
                table.entries[next] = EMPTY;
                idx = next;
            }
            next = (next + 1) & (CAPACITY - 1);
        }
    }
}
