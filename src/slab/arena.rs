use crate::slab::bitmap::OccupancyBitmap;
use crate::slab::page_map;
use crate::slab::size_class;
use crate::stats;
use crate::sync::RawMutex;
use crate::util::{abort_with_message, align_up, page_size};
use crate::platform;
use core::cell::{Cell, UnsafeCell};
use core::ptr;
use core::sync::atomic::{AtomicU8, Ordering};

/// Out-of-line per-slot bookkeeping, co-located in the slab header region.
/// The occupancy bit is authoritative for slot ownership; `requested` is
/// written through `&self` only while the caller owns the slot (claimed in
/// the bitmap), so a `Cell` is sound and compiles to a plain store. The
/// freed flag is an AtomicU8 so racing double frees are caught by CAS
/// rather than silently corrupting state. It stays set for the whole freed
/// lifetime of the slot and is only cleared on reuse, so a repeat free of
/// a not-yet-recycled slot is distinguishable from a foreign pointer.
#[repr(C)]
pub struct SlotMeta {
    requested: Cell<u32>,
    flags: AtomicU8,
}

const FLAG_FREED: u8 = 0x01;

impl SlotMeta {
    /// Bytes the caller asked for; the slot's block size is the capacity.
    #[inline]
    pub fn requested(&self) -> usize {
        self.requested.get() as usize
    }

    /// Update the requested size for an in-place realloc. The caller must
    /// own the slot.
    #[inline]
    pub fn set_requested(&self, size: usize) {
        self.requested.set(size as u32);
    }

    #[inline]
    fn set_live(&self, size: usize) {
        self.requested.set(size as u32);
        self.flags.store(0, Ordering::Relaxed);
    }

    /// Returns true exactly once per live-to-freed transition; a second
    /// call means a double free.
    #[inline]
    pub fn try_mark_freed(&self) -> bool {
        self.flags.fetch_or(FLAG_FREED, Ordering::AcqRel) & FLAG_FREED == 0
    }

    #[inline]
    pub fn is_freed(&self) -> bool {
        self.flags.load(Ordering::Acquire) & FLAG_FREED != 0
    }

    /// Drop the stale request size. The freed flag persists until
    /// `set_live` recycles the slot.
    #[inline]
    fn clear_requested(&self) {
        self.requested.set(0);
    }
}

/// One slab: a page-multiple data region owned by a single size class,
/// preceded by header pages holding this struct, the occupancy bitmap and
/// the SlotMeta array. The data region (not the header) is registered in
/// the page map so any user pointer resolves back here without scanning.
#[repr(C)]
pub struct Slab {
    /// Start of the block slots.
    data: *mut u8,
    /// Whole mapping (header pages + data pages), for unmapping.
    base: *mut u8,
    total_size: usize,
    bitmap: OccupancyBitmap,
    pub class_index: usize,
    /// Next slab of the same class in this arena (null = end of chain).
    next: *mut Slab,
    meta: *mut SlotMeta,
}

impl Slab {
    /// Map and initialize a slab for `class_index`, registering its data
    /// pages. Returns null if the page source refuses the mapping.
    unsafe fn create(class_index: usize, arena_index: usize) -> *mut Slab {
        let slots = size_class::slots_per_slab(class_index);
        let data_bytes = size_class::slab_data_bytes(class_index);

        let header_bytes = align_up(
            core::mem::size_of::<Slab>()
                + OccupancyBitmap::storage_bytes(slots)
                + slots * core::mem::size_of::<SlotMeta>(),
            page_size(),
        );
        let total_size = header_bytes + data_bytes;

        let base = platform::map_anonymous(total_size);
        if base.is_null() {
            return ptr::null_mut();
        }
        stats::add_pages_mapped(total_size / page_size());

        let header = base as *mut Slab;
        let bitmap_storage = base.add(core::mem::size_of::<Slab>()) as *mut u64;
        let meta = base
            .add(core::mem::size_of::<Slab>() + OccupancyBitmap::storage_bytes(slots))
            as *mut SlotMeta;
        let data = base.add(header_bytes);

        // The mapping is zero-filled, so the SlotMeta array starts cleared.
        header.write(Slab {
            data,
            base,
            total_size,
            bitmap: OccupancyBitmap::init(bitmap_storage, slots),
            class_index,
            next: ptr::null_mut(),
            meta,
        });

        page_map::insert_slab(data, data_bytes, base, class_index, arena_index);
        header
    }

    /// Unregister and unmap. The caller has already unlinked this slab.
    unsafe fn destroy(slab: *mut Slab) {
        let data_bytes = size_class::slab_data_bytes((*slab).class_index);
        let base = (*slab).base;
        let total_size = (*slab).total_size;
        page_map::remove_range((*slab).data, data_bytes);
        stats::add_pages_unmapped(total_size / page_size());
        platform::unmap(base, total_size);
    }

    #[inline]
    unsafe fn slot_base(&self, slot: usize) -> *mut u8 {
        self.data.add(slot * size_class::block_size(self.class_index))
    }

    /// Slot index for a user pointer. Only exact slot bases are valid;
    /// anything else is a foreign or corrupted pointer.
    #[inline]
    pub fn slot_index_of(&self, ptr: *mut u8) -> Option<usize> {
        let offset = (ptr as usize).wrapping_sub(self.data as usize);
        let block = size_class::block_size(self.class_index);
        let slot = offset / block;
        if offset % block == 0 && slot < self.bitmap.num_slots() {
            Some(slot)
        } else {
            None
        }
    }

    /// # Safety
    /// `slot` must be a valid slot index within this slab.
    #[inline]
    pub unsafe fn slot_meta(&self, slot: usize) -> &SlotMeta {
        &*self.meta.add(slot)
    }
}

struct Chain {
    head: *mut Slab,
}

impl Chain {
    const fn new() -> Self {
        Chain {
            head: ptr::null_mut(),
        }
    }
}

struct ArenaInner {
    chains: [Chain; size_class::NUM_SIZE_CLASSES],
}

/// An independently lockable partition of the slab allocator: one slab
/// chain per size class. Cache-line aligned so neighboring arenas do not
/// false-share their locks.
#[repr(C, align(128))]
pub struct Arena {
    lock: RawMutex,
    inner: UnsafeCell<ArenaInner>,
    index: usize,
}

unsafe impl Send for Arena {}
unsafe impl Sync for Arena {}

impl Arena {
    #[allow(clippy::new_without_default)]
    pub const fn new() -> Self {
        const EMPTY: Chain = Chain::new();
        Arena {
            lock: RawMutex::new(),
            inner: UnsafeCell::new(ArenaInner {
                chains: [EMPTY; size_class::NUM_SIZE_CLASSES],
            }),
            index: 0,
        }
    }

    /// Set during init, before any allocation reaches this arena.
    pub fn set_index(&mut self, index: usize) {
        self.index = index;
    }

    /// Allocate without waiting: returns `None` when the arena lock is
    /// contended so the router can probe a sibling instead. A `Some(null)`
    /// means the lock was taken but the page source refused a mapping.
    ///
    /// # Safety
    /// The allocator must be initialized; `class_index` must be in range.
    pub unsafe fn try_alloc(&self, size: usize, class_index: usize) -> Option<*mut u8> {
        if !self.lock.try_lock() {
            return None;
        }
        let result = Self::alloc_locked(&mut *self.inner.get(), size, class_index, self.index);
        self.lock.unlock();
        Some(result)
    }

    /// Blocking allocate; the router falls back to this on its affinity
    /// arena after one probe round over every sibling failed.
    ///
    /// # Safety
    /// Same contract as [`Arena::try_alloc`].
    pub unsafe fn alloc(&self, size: usize, class_index: usize) -> *mut u8 {
        self.lock.lock();
        let result = Self::alloc_locked(&mut *self.inner.get(), size, class_index, self.index);
        self.lock.unlock();
        result
    }

    unsafe fn alloc_locked(
        inner: &mut ArenaInner,
        size: usize,
        class_index: usize,
        arena_index: usize,
    ) -> *mut u8 {
        let chain = &mut inner.chains[class_index];

        // First fit over the chain: lowest free slot of the first slab
        // with room.
        let mut slab_ptr = chain.head;
        while !slab_ptr.is_null() {
            let slab = &mut *slab_ptr;
            if let Some(slot) = slab.bitmap.claim_first_free() {
                slab.slot_meta(slot).set_live(size);
                return slab.slot_base(slot);
            }
            slab_ptr = slab.next;
        }

        // Every slab is full (or the chain is empty): map a fresh one and
        // link it at the head so the next allocation finds it first.
        let fresh = Slab::create(class_index, arena_index);
        if fresh.is_null() {
            return ptr::null_mut();
        }
        (*fresh).next = chain.head;
        chain.head = fresh;

        let slab = &mut *fresh;
        match slab.bitmap.claim_first_free() {
            Some(slot) => {
                slab.slot_meta(slot).set_live(size);
                slab.slot_base(slot)
            }
            None => ptr::null_mut(),
        }
    }

    /// Release `ptr`, previously resolved by the page map to `slab_raw` in
    /// this arena. Returns false when the pointer does not name a live
    /// slot (foreign or misaligned); the caller decides how loudly to
    /// fail. A repeat free of a not-yet-recycled slot aborts here.
    ///
    /// # Safety
    /// `slab_raw` must be a slab header owned by this arena.
    pub unsafe fn free(&self, slab_raw: *mut u8, ptr: *mut u8) -> bool {
        self.lock.lock();
        let result = Self::free_locked(&mut *self.inner.get(), slab_raw as *mut Slab, ptr);
        self.lock.unlock();
        result
    }

    unsafe fn free_locked(inner: &mut ArenaInner, slab_ptr: *mut Slab, ptr: *mut u8) -> bool {
        let slab = &mut *slab_ptr;
        let slot = match slab.slot_index_of(ptr) {
            Some(slot) => slot,
            None => return false,
        };
        if !slab.bitmap.is_allocated(slot) {
            // A clear bit with the freed flag still up is the same pointer
            // coming back a second time, not a foreign pointer.
            if slab.slot_meta(slot).is_freed() {
                abort_with_message("bucketalloc: double free detected\n");
            }
            return false;
        }
        if !slab.slot_meta(slot).try_mark_freed() {
            abort_with_message("bucketalloc: double free detected\n");
        }

        slab.slot_meta(slot).clear_requested();
        slab.bitmap.release(slot);

        // Fully free slab: hand the pages back so a quiescent process ends
        // with pages_mapped == pages_unmapped.
        if slab.bitmap.is_empty() {
            Self::unlink(&mut inner.chains[slab.class_index], slab_ptr);
            Slab::destroy(slab_ptr);
        }
        true
    }

    unsafe fn unlink(chain: &mut Chain, slab: *mut Slab) {
        if chain.head == slab {
            chain.head = (*slab).next;
            return;
        }
        let mut cursor = chain.head;
        while !cursor.is_null() {
            if (*cursor).next == slab {
                (*cursor).next = (*slab).next;
                return;
            }
            cursor = (*cursor).next;
        }
    }

    /// Total free slots across this arena's slabs, for the stats snapshot.
    /// Taken under the arena lock so it is consistent with mutations.
    pub fn free_slots(&self) -> usize {
        self.lock.lock();
        let inner = unsafe { &*self.inner.get() };
        let mut total = 0;
        for chain in &inner.chains {
            let mut slab_ptr = chain.head;
            while !slab_ptr.is_null() {
                let slab = unsafe { &*slab_ptr };
                total += slab.bitmap.free_slots();
                slab_ptr = slab.next;
            }
        }
        self.lock.unlock();
        total
    }
}
