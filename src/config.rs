//! Runtime configuration, read once during init from the environment.
//! Parsing uses libc::getenv directly and never allocates, since this runs
//! before the allocator is usable.

use crate::platform;
use crate::util::MAX_ARENAS;
use core::ffi::CStr;
use core::sync::atomic::{AtomicUsize, Ordering};

/// Number of live arenas. Zero until `read_config` runs.
static ARENA_COUNT: AtomicUsize = AtomicUsize::new(0);

/// Parse a decimal environment variable without allocating. Returns None
/// for unset, empty, non-numeric or absurdly long values.
unsafe fn getenv_usize(name: &CStr) -> Option<usize> {
    let raw = libc::getenv(name.as_ptr());
    if raw.is_null() {
        return None;
    }
    let mut value = 0usize;
    let mut len = 0usize;
    let mut cursor = raw as *const u8;
    while *cursor != 0 {
        let digit = *cursor;
        if !digit.is_ascii_digit() || len >= 10 {
            return None;
        }
        value = value * 10 + (digit - b'0') as usize;
        len += 1;
        cursor = cursor.add(1);
    }
    if len == 0 {
        None
    } else {
        Some(value)
    }
}

/// Decide the arena count: BUCKETALLOC_ARENAS when set and sane, otherwise
/// one arena per online CPU, clamped to the static arena array.
///
/// # Safety
/// Single-threaded init context.
pub unsafe fn read_config() {
    let count = match getenv_usize(c"BUCKETALLOC_ARENAS") {
        Some(n) if n >= 1 => n.min(MAX_ARENAS),
        _ => platform::num_cpus().clamp(1, MAX_ARENAS),
    };
    ARENA_COUNT.store(count, Ordering::Release);
}

#[inline]
pub fn arena_count() -> usize {
    ARENA_COUNT.load(Ordering::Acquire)
}
