//! The page source: the only interface between the allocator and the OS.
//! Mappings come back readable, writable, zero-filled and page-aligned;
//! a refused mapping is reported as null and surfaces to the caller of
//! `malloc` as out-of-memory.

#[cfg(target_os = "linux")]
pub mod linux;
#[cfg(target_os = "linux")]
pub use linux as sys;

#[cfg(target_os = "macos")]
pub mod macos;
#[cfg(target_os = "macos")]
pub use macos as sys;

/// Map `size` bytes of anonymous memory. Returns null on failure.
///
/// # Safety
/// `size` must be page-aligned and non-zero.
#[inline]
pub unsafe fn map_anonymous(size: usize) -> *mut u8 {
    sys::map_anonymous(size)
}

/// Return a mapping to the OS.
///
/// # Safety
/// `ptr` must have been returned by `map_anonymous` and `size` must be the
/// exact original extent.
#[inline]
pub unsafe fn unmap(ptr: *mut u8, size: usize) {
    sys::unmap(ptr, size);
}

/// Number of online CPUs, used to pick the arena count.
pub fn num_cpus() -> usize {
    sys::num_cpus()
}

/// Cheap per-thread identifier for arena affinity.
#[inline]
pub fn thread_id() -> usize {
    sys::thread_id()
}
