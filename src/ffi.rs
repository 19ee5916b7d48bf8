//! `extern "C"` exports matching the libc allocation ABI, for
//! LD_PRELOAD-style interposition. Behind the `ffi` cargo feature so the
//! symbols only clash with libc when a build opts in.

use crate::init;
use libc::{c_void, size_t};

// Run init before main so the first interposed call never races the state
// machine from inside a constructor of some other library.
extern "C" fn early_init() {
    init::ensure_initialized();
}

#[cfg(target_os = "linux")]
#[used]
#[link_section = ".init_array"]
static EARLY_INIT: extern "C" fn() = early_init;

#[cfg(target_os = "macos")]
#[used]
#[link_section = "__DATA,__mod_init_func"]
static EARLY_INIT: extern "C" fn() = early_init;

/// # Safety
/// C malloc contract.
#[no_mangle]
pub unsafe extern "C" fn malloc(size: size_t) -> *mut c_void {
    init::ensure_initialized();
    if !init::ready() {
        return core::ptr::null_mut();
    }
    init::allocator().malloc(size) as *mut c_void
}

/// # Safety
/// C free contract.
#[no_mangle]
pub unsafe extern "C" fn free(ptr: *mut c_void) {
    if ptr.is_null() {
        return;
    }
    init::ensure_initialized();
    if !init::ready() {
        return;
    }
    init::allocator().free(ptr as *mut u8);
}

/// # Safety
/// C calloc contract.
#[no_mangle]
pub unsafe extern "C" fn calloc(count: size_t, size: size_t) -> *mut c_void {
    init::ensure_initialized();
    if !init::ready() {
        return core::ptr::null_mut();
    }
    init::allocator().calloc(count, size) as *mut c_void
}

/// # Safety
/// C realloc contract.
#[no_mangle]
pub unsafe extern "C" fn realloc(ptr: *mut c_void, new_size: size_t) -> *mut c_void {
    init::ensure_initialized();
    if !init::ready() {
        return core::ptr::null_mut();
    }
    init::allocator().realloc(ptr as *mut u8, new_size) as *mut c_void
}

/// # Safety
/// `ptr` must be null or a live allocation from this allocator.
#[no_mangle]
pub unsafe extern "C" fn malloc_usable_size(ptr: *mut c_void) -> size_t {
    init::ensure_initialized();
    if !init::ready() {
        return 0;
    }
    init::allocator().usable_size(ptr as *mut u8)
}
