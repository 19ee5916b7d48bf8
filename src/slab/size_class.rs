use crate::util::{page_size, LARGE_THRESHOLD, MIN_ALIGN};

/// Fixed size-class table, sorted ascending. Every class is a multiple of
/// MIN_ALIGN so that slot offsets inside a page-aligned slab keep natural
/// word alignment. The largest class equals LARGE_THRESHOLD; a request of
/// exactly that size is already a large allocation, so the top class only
/// serves sizes strictly below it.
pub const NUM_SIZE_CLASSES: usize = 17;

pub static SIZE_CLASSES: [usize; NUM_SIZE_CLASSES] = [
    8, 16, 24, 32, 48, 64, 96, 128, 192, 256, 384, 512, 768, 1024, 1536, 2048, 3072,
];

/// Smallest class that can hold `size` bytes, or `None` when the request
/// must route to the large-object path. Never panics on oversized input.
#[inline]
pub fn class_of(size: usize) -> Option<usize> {
    let size = if size == 0 { 1 } else { size };
    if size >= LARGE_THRESHOLD {
        return None;
    }

    // Binary search for the first class >= size.
    let mut lo = 0usize;
    let mut hi = NUM_SIZE_CLASSES;
    while lo < hi {
        let mid = lo + (hi - lo) / 2;
        if SIZE_CLASSES[mid] < size {
            lo = mid + 1;
        } else {
            hi = mid;
        }
    }
    Some(lo)
}

/// Smallest class that can hold `size` bytes at `align` alignment.
/// Slot addresses are `data + i * block_size` with page-aligned data, so a
/// class guarantees `align` exactly when its block size is a multiple of it.
#[inline]
pub fn class_of_aligned(size: usize, align: usize) -> Option<usize> {
    let size = if size == 0 { 1 } else { size };
    if size >= LARGE_THRESHOLD || align > page_size() {
        return None;
    }
    (0..NUM_SIZE_CLASSES)
        .find(|&idx| SIZE_CLASSES[idx] >= size && SIZE_CLASSES[idx] % align == 0)
}

/// Block size for a class index.
#[inline]
pub fn block_size(class_index: usize) -> usize {
    SIZE_CLASSES[class_index]
}

/// Pages in the data region of one slab of this class. Grown until the
/// unusable tail (`data_bytes mod block_size`) stays under 1/8 of the
/// region, so no class wastes more than 12.5% of its slab to rounding.
pub fn slab_pages(class_index: usize) -> usize {
    let block = SIZE_CLASSES[class_index];
    let page = page_size();
    let mut pages = 1usize;
    loop {
        let data_bytes = pages * page;
        if data_bytes % block <= data_bytes / 8 {
            return pages;
        }
        pages += 1;
    }
}

/// Bytes in the data region of one slab of this class.
pub fn slab_data_bytes(class_index: usize) -> usize {
    slab_pages(class_index) * page_size()
}

/// Block slots per slab of this class.
pub fn slots_per_slab(class_index: usize) -> usize {
    slab_data_bytes(class_index) / SIZE_CLASSES[class_index]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classes_sorted_and_word_aligned() {
        for i in 0..NUM_SIZE_CLASSES {
            assert_eq!(SIZE_CLASSES[i] % MIN_ALIGN, 0, "class {} misaligned", i);
            if i > 0 {
                assert!(SIZE_CLASSES[i] > SIZE_CLASSES[i - 1]);
            }
        }
        assert_eq!(SIZE_CLASSES[NUM_SIZE_CLASSES - 1], LARGE_THRESHOLD);
    }

    #[test]
    fn lookup_boundaries() {
        assert_eq!(class_of(0), Some(0));
        assert_eq!(class_of(1), Some(0));
        assert_eq!(class_of(8), Some(0));
        assert_eq!(class_of(9), Some(1));
        assert_eq!(class_of(2048), Some(15));
        assert_eq!(class_of(2049), Some(16));
        // One byte below the threshold is still a slab request...
        assert_eq!(class_of(LARGE_THRESHOLD - 1), Some(NUM_SIZE_CLASSES - 1));
        // ...the threshold itself routes large.
        assert_eq!(class_of(LARGE_THRESHOLD), None);
        assert_eq!(class_of(usize::MAX), None);
    }

    #[test]
    fn aligned_lookup_skips_odd_multiples() {
        // 24 is not a multiple of 16, so an align-16 request of 17..24
        // bytes lands in the 32 class instead.
        assert_eq!(class_of_aligned(20, 16), Some(3));
        assert_eq!(class_of_aligned(20, 8), Some(2));
        // Page-or-less alignments always find a class for small sizes.
        assert_eq!(class_of_aligned(100, 64), Some(7)); // 128 % 64 == 0
        // Beyond a page there is no slab answer.
        assert_eq!(class_of_aligned(100, 2 * page_size()), None);
    }

    #[test]
    fn slab_waste_stays_under_bound() {
        for idx in 0..NUM_SIZE_CLASSES {
            let data = slab_data_bytes(idx);
            assert!(
                data % block_size(idx) <= data / 8,
                "class {} wastes {} of {}",
                idx,
                data % block_size(idx),
                data
            );
            assert!(slots_per_slab(idx) >= 1);
        }
    }
}
