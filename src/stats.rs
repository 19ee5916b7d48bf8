//! Process-wide allocation counters.
//!
//! All four counters are monotonic: they start at zero, are bumped with
//! relaxed atomics from the allocation paths, and are never reset. The
//! reporting collaborator reads them through [`StatsSnapshot`], which the
//! allocator assembles under its normal lock discipline so the free-slot
//! count is not a torn read.

use core::fmt;
use core::sync::atomic::{AtomicU64, Ordering};

static PAGES_MAPPED: AtomicU64 = AtomicU64::new(0);
static PAGES_UNMAPPED: AtomicU64 = AtomicU64::new(0);
static CHUNKS_ALLOCATED: AtomicU64 = AtomicU64::new(0);
static CHUNKS_FREED: AtomicU64 = AtomicU64::new(0);

#[inline]
pub fn add_pages_mapped(pages: usize) {
    PAGES_MAPPED.fetch_add(pages as u64, Ordering::Relaxed);
}

#[inline]
pub fn add_pages_unmapped(pages: usize) {
    PAGES_UNMAPPED.fetch_add(pages as u64, Ordering::Relaxed);
}

#[inline]
pub fn count_alloc() {
    CHUNKS_ALLOCATED.fetch_add(1, Ordering::Relaxed);
}

#[inline]
pub fn count_free() {
    CHUNKS_FREED.fetch_add(1, Ordering::Relaxed);
}

/// A read-only view of the counters plus the current number of free slab
/// slots (the segregated-design analogue of a free-list length).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub pages_mapped: u64,
    pub pages_unmapped: u64,
    pub chunks_allocated: u64,
    pub chunks_freed: u64,
    pub free_list_length: u64,
}

impl StatsSnapshot {
    /// Read the monotonic counters; the caller fills in `free_list_length`
    /// from the arenas it has locked.
    pub(crate) fn from_counters(free_list_length: u64) -> Self {
        StatsSnapshot {
            pages_mapped: PAGES_MAPPED.load(Ordering::Relaxed),
            pages_unmapped: PAGES_UNMAPPED.load(Ordering::Relaxed),
            chunks_allocated: CHUNKS_ALLOCATED.load(Ordering::Relaxed),
            chunks_freed: CHUNKS_FREED.load(Ordering::Relaxed),
            free_list_length,
        }
    }
}

impl fmt::Display for StatsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "== bucketalloc stats ==")?;
        writeln!(f, "Mapped:   {}", self.pages_mapped)?;
        writeln!(f, "Unmapped: {}", self.pages_unmapped)?;
        writeln!(f, "Allocs:   {}", self.chunks_allocated)?;
        writeln!(f, "Frees:    {}", self.chunks_freed)?;
        writeln!(f, "Freelen:  {}", self.free_list_length)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_renders_every_counter() {
        let snap = StatsSnapshot {
            pages_mapped: 7,
            pages_unmapped: 3,
            chunks_allocated: 42,
            chunks_freed: 40,
            free_list_length: 5,
        };
        let text = snap.to_string();
        assert!(text.contains("Mapped:   7"));
        assert!(text.contains("Unmapped: 3"));
        assert!(text.contains("Allocs:   42"));
        assert!(text.contains("Frees:    40"));
        assert!(text.contains("Freelen:  5"));
    }

    #[test]
    fn counters_are_monotonic() {
        let before = StatsSnapshot::from_counters(0);
        count_alloc();
        count_free();
        add_pages_mapped(2);
        add_pages_unmapped(2);
        let after = StatsSnapshot::from_counters(0);
        assert!(after.chunks_allocated > before.chunks_allocated);
        assert!(after.chunks_freed > before.chunks_freed);
        assert!(after.pages_mapped >= before.pages_mapped + 2);
        assert!(after.pages_unmapped >= before.pages_unmapped + 2);
    }
}
