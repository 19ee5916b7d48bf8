//! `GlobalAlloc` adapter so a Rust program can route its heap through this
//! allocator with one `#[global_allocator]` line.

use crate::init;
use crate::util::MIN_ALIGN;
use core::alloc::{GlobalAlloc, Layout};
use core::ptr;

/// ```no_run
/// use bucketalloc::BucketAlloc;
///
/// #[global_allocator]
/// static ALLOC: BucketAlloc = BucketAlloc;
/// ```
pub struct BucketAlloc;

unsafe impl GlobalAlloc for BucketAlloc {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        init::ensure_initialized();
        if !init::ready() {
            return ptr::null_mut();
        }
        init::allocator().malloc_aligned(layout.size(), layout.align())
    }

    unsafe fn alloc_zeroed(&self, layout: Layout) -> *mut u8 {
        let ptr = self.alloc(layout);
        if !ptr.is_null() {
            ptr::write_bytes(ptr, 0, layout.size());
        }
        ptr
    }

    unsafe fn dealloc(&self, ptr: *mut u8, _layout: Layout) {
        init::allocator().free(ptr);
    }

    unsafe fn realloc(&self, ptr: *mut u8, layout: Layout, new_size: usize) -> *mut u8 {
        // The native realloc only guarantees word alignment, which is all
        // the common case needs. Over-aligned layouts relocate explicitly
        // so the guarantee holds for the new block too.
        if layout.align() <= MIN_ALIGN {
            return init::allocator().realloc(ptr, new_size);
        }
        let fresh = self.alloc(Layout::from_size_align_unchecked(new_size, layout.align()));
        if !fresh.is_null() {
            ptr::copy_nonoverlapping(ptr, fresh, layout.size().min(new_size));
            init::allocator().free(ptr);
        }
        fresh
    }
}
