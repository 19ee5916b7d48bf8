/// Occupancy bitmap for one slab: one bit per block slot, 0 = free,
/// 1 = allocated. Stored as u64 words in the slab header region.
pub struct OccupancyBitmap {
    words: *mut u64,
    num_words: usize,
    num_slots: usize,
    /// Live (allocated) slots. The number of set bits always equals this.
    live: usize,
}

impl OccupancyBitmap {
    /// Build a bitmap over zeroed storage with every slot free.
    ///
    /// # Safety
    /// `storage` must point to `words_for(num_slots)` writable u64s.
    pub unsafe fn init(storage: *mut u64, num_slots: usize) -> Self {
        let num_words = Self::words_for(num_slots);
        for i in 0..num_words {
            storage.add(i).write(0);
        }

        // Mark padding bits past num_slots as occupied so the first-fit
        // scan can never hand them out.
        let excess = num_words * 64 - num_slots;
        if excess > 0 {
            let mask = u64::MAX << (64 - excess);
            storage.add(num_words - 1).write(mask);
        }

        OccupancyBitmap {
            words: storage,
            num_words,
            num_slots,
            live: 0,
        }
    }

    pub const fn words_for(num_slots: usize) -> usize {
        num_slots.div_ceil(64)
    }

    pub const fn storage_bytes(num_slots: usize) -> usize {
        Self::words_for(num_slots) * 8
    }

    #[inline]
    pub fn num_slots(&self) -> usize {
        self.num_slots
    }

    #[inline]
    pub fn live(&self) -> usize {
        self.live
    }

    #[inline]
    pub fn free_slots(&self) -> usize {
        self.num_slots - self.live
    }

    /// Every slot free: the slab can go back to the page source.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Claim the lowest free slot (first-fit by bit position, which keeps
    /// placement deterministic and packs slabs from the front).
    pub fn claim_first_free(&mut self) -> Option<usize> {
        for i in 0..self.num_words {
            let word = unsafe { self.words.add(i).read() };
            if word != u64::MAX {
                let bit = (!word).trailing_zeros() as usize;
                let slot = i * 64 + bit;
                debug_assert!(slot < self.num_slots);
                unsafe {
                    self.words.add(i).write(word | (1u64 << bit));
                }
                self.live += 1;
                return Some(slot);
            }
        }
        None
    }

    /// Release a slot.
    ///
    /// # Safety
    /// `slot` must be a valid index that is currently allocated.
    pub unsafe fn release(&mut self, slot: usize) {
        debug_assert!(slot < self.num_slots);
        let word_idx = slot / 64;
        let bit = 1u64 << (slot % 64);
        let word = self.words.add(word_idx).read();
        debug_assert!(word & bit != 0, "releasing a free slot {}", slot);
        self.words.add(word_idx).write(word & !bit);
        self.live -= 1;
    }

    #[inline]
    pub fn is_allocated(&self, slot: usize) -> bool {
        debug_assert!(slot < self.num_slots);
        let word = unsafe { self.words.add(slot / 64).read() };
        word & (1u64 << (slot % 64)) != 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::alloc::{alloc_zeroed, dealloc, Layout};

    fn with_bitmap(num_slots: usize, f: impl FnOnce(&mut OccupancyBitmap)) {
        let layout = Layout::array::<u64>(OccupancyBitmap::words_for(num_slots)).unwrap();
        let storage = unsafe { alloc_zeroed(layout) as *mut u64 };
        let mut bm = unsafe { OccupancyBitmap::init(storage, num_slots) };
        f(&mut bm);
        unsafe { dealloc(storage as *mut u8, layout) };
    }

    #[test]
    fn claim_and_release() {
        with_bitmap(128, |bm| {
            assert_eq!(bm.free_slots(), 128);
            let s = bm.claim_first_free().unwrap();
            assert_eq!(s, 0, "first-fit must take the lowest slot");
            assert!(bm.is_allocated(s));
            assert_eq!(bm.live(), 1);

            unsafe { bm.release(s) };
            assert!(!bm.is_allocated(s));
            assert!(bm.is_empty());
        });
    }

    #[test]
    fn set_bits_track_live_count() {
        with_bitmap(100, |bm| {
            let mut held = Vec::new();
            for _ in 0..60 {
                held.push(bm.claim_first_free().unwrap());
            }
            // Free every other one, then re-claim some.
            for (i, &s) in held.iter().enumerate() {
                if i % 2 == 0 {
                    unsafe { bm.release(s) };
                }
            }
            for _ in 0..10 {
                bm.claim_first_free().unwrap();
            }
            let set_bits = (0..100).filter(|&s| bm.is_allocated(s)).count();
            assert_eq!(set_bits, bm.live());
            assert_eq!(bm.live(), 60 - 30 + 10);
        });
    }

    #[test]
    fn exhaustion_with_padding_word() {
        // 65 slots spill into a second word with 63 padding bits.
        with_bitmap(65, |bm| {
            for expect in 0..65 {
                assert_eq!(bm.claim_first_free(), Some(expect));
            }
            assert_eq!(bm.claim_first_free(), None);
            assert_eq!(bm.free_slots(), 0);
        });
    }

    #[test]
    fn lowest_slot_reused_after_release() {
        with_bitmap(64, |bm| {
            for _ in 0..8 {
                bm.claim_first_free().unwrap();
            }
            unsafe { bm.release(3) };
            assert_eq!(bm.claim_first_free(), Some(3));
        });
    }
}
