/// Align `value` up to the next multiple of `align`.
/// `align` must be a power of two.
#[inline(always)]
pub const fn align_up(value: usize, align: usize) -> usize {
    debug_assert!(align.is_power_of_two());
    (value + align - 1) & !(align - 1)
}

/// Align `value` down to the previous multiple of `align`.
/// `align` must be a power of two.
#[inline(always)]
pub const fn align_down(value: usize, align: usize) -> usize {
    debug_assert!(align.is_power_of_two());
    value & !(align - 1)
}

/// Minimum alignment of every returned pointer (natural word alignment).
pub const MIN_ALIGN: usize = 8;

/// Requests at or above this size bypass the slab layer and get their own
/// page-multiple mapping. Equal to the largest size class: a request of
/// exactly this size is a large allocation, one byte below is a slab one.
pub const LARGE_THRESHOLD: usize = 3072;

/// Upper bound on the arena array; the live count is CPU-derived at init.
pub const MAX_ARENAS: usize = 32;

/// Runtime page size, read from sysconf at init. Seeded with 4096 (the
/// universal default) so page_size() never observes zero before init.
static PAGE_SIZE_CACHED: core::sync::atomic::AtomicUsize =
    core::sync::atomic::AtomicUsize::new(4096);

/// Cached log2(page_size) so page-number computation is a shift, not a div.
static PAGE_SHIFT_CACHED: core::sync::atomic::AtomicU32 = core::sync::atomic::AtomicU32::new(12);

/// Read the real page size from the OS.
///
/// # Safety
/// Must be called from a single-threaded context (init).
pub unsafe fn init_page_size() {
    let ps = libc::sysconf(libc::_SC_PAGESIZE);
    let ps = if ps > 0 { ps as usize } else { 4096 };
    PAGE_SIZE_CACHED.store(ps, core::sync::atomic::Ordering::Release);
    PAGE_SHIFT_CACHED.store(ps.trailing_zeros(), core::sync::atomic::Ordering::Release);
}

#[inline(always)]
pub fn page_size() -> usize {
    PAGE_SIZE_CACHED.load(core::sync::atomic::Ordering::Relaxed)
}

#[inline(always)]
pub fn page_shift() -> u32 {
    PAGE_SHIFT_CACHED.load(core::sync::atomic::Ordering::Relaxed)
}

/// Number of whole pages needed to hold `bytes`.
#[inline(always)]
pub fn pages_for(bytes: usize) -> usize {
    align_up(bytes, page_size()) >> page_shift()
}

/// splitmix64 finalizer. Used to hash thread ids onto arenas and pointers
/// into the large-allocation table.
#[inline]
pub fn splitmix64(key: u64) -> u64 {
    let mut x = key;
    x ^= x >> 30;
    x = x.wrapping_mul(0xbf58476d1ce4e5b9);
    x ^= x >> 27;
    x = x.wrapping_mul(0x94d049bb133111eb);
    x ^= x >> 31;
    x
}

/// Abort with a diagnostic on stderr. Used when heap corruption or pointer
/// misuse is detected; continuing would compound the damage.
#[cold]
#[inline(never)]
pub fn abort_with_message(msg: &str) -> ! {
    unsafe {
        // Raw write to fd 2 -- the allocator must not allocate here.
        libc::write(2, msg.as_ptr() as *const libc::c_void, msg.len());
        libc::abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn align_round_trips() {
        assert_eq!(align_up(0, 8), 0);
        assert_eq!(align_up(1, 8), 8);
        assert_eq!(align_up(8, 8), 8);
        assert_eq!(align_up(4097, 4096), 8192);
        assert_eq!(align_down(4097, 4096), 4096);
        assert_eq!(align_down(4095, 4096), 0);
    }

    #[test]
    fn pages_for_rounds_up() {
        let ps = page_size();
        assert_eq!(pages_for(1), 1);
        assert_eq!(pages_for(ps), 1);
        assert_eq!(pages_for(ps + 1), 2);
        assert_eq!(pages_for(3 * ps), 3);
    }
}
