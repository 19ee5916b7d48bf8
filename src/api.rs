//! Safe Rust surface over the raw allocator. These entry points carry the
//! C-contract edge cases into `Result` space: a failed mapping is an error
//! value instead of a null pointer, and the zero-size realloc footgun is
//! rejected outright.

use crate::error::AllocError;
use crate::init;
use crate::stats::StatsSnapshot;
use core::ptr::NonNull;

/// Allocate `size` bytes, at least word-aligned. A zero size yields a
/// minimal unique allocation.
pub fn try_alloc(size: usize) -> Result<NonNull<u8>, AllocError> {
    init::ensure_initialized();
    if !init::ready() {
        return Err(AllocError::OutOfMemory);
    }
    let ptr = unsafe { init::allocator().malloc(size) };
    NonNull::new(ptr).ok_or(AllocError::OutOfMemory)
}

/// Allocate `size` zeroed bytes.
pub fn try_alloc_zeroed(size: usize) -> Result<NonNull<u8>, AllocError> {
    init::ensure_initialized();
    if !init::ready() {
        return Err(AllocError::OutOfMemory);
    }
    let ptr = unsafe { init::allocator().calloc(size, 1) };
    NonNull::new(ptr).ok_or(AllocError::OutOfMemory)
}

/// Grow or shrink an allocation, preserving its prefix. Unlike C realloc,
/// a zero `new_size` is refused rather than treated as a free. On any
/// error the original allocation stays live.
///
/// # Safety
/// `ptr` must have come from this crate and not been released since.
pub unsafe fn resize(ptr: NonNull<u8>, new_size: usize) -> Result<NonNull<u8>, AllocError> {
    if new_size == 0 {
        return Err(AllocError::InvalidArgument);
    }
    NonNull::new(init::allocator().realloc(ptr.as_ptr(), new_size)).ok_or(AllocError::OutOfMemory)
}

/// Release an allocation.
///
/// # Safety
/// `ptr` must have come from this crate and not been released since.
pub unsafe fn release(ptr: NonNull<u8>) {
    init::allocator().free(ptr.as_ptr());
}

/// Writable bytes behind a live allocation; at least what was requested.
///
/// # Safety
/// `ptr` must have come from this crate and not been released since.
pub unsafe fn usable_size(ptr: NonNull<u8>) -> usize {
    init::allocator().usable_size(ptr.as_ptr())
}

/// Consistent snapshot of the lifetime counters and current free-slot
/// total.
pub fn stats_snapshot() -> StatsSnapshot {
    init::ensure_initialized();
    if !init::ready() {
        return StatsSnapshot::from_counters(0);
    }
    init::allocator().stats_snapshot()
}

/// Dump the snapshot to stderr.
pub fn print_stats() {
    eprintln!("{}", stats_snapshot());
}
