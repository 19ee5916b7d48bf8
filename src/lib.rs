//! A general-purpose memory allocator built from segregated size-class
//! slabs with per-slot occupancy bitmaps, multiple independently locked
//! arenas for thread scalability, and a dedicated mmap path for large
//! objects. Pointers are resolved back to their owner through a page-map
//! side table, never by scanning memory.
//!
//! Three surfaces share the one allocator: a safe Rust API ([`api`]), a
//! [`GlobalAlloc`](core::alloc::GlobalAlloc) adapter ([`BucketAlloc`]),
//! and optional `extern "C"` exports behind the `ffi` feature.

extern crate libc;

pub mod allocator;
pub mod api;
pub mod config;
pub mod error;
#[cfg(feature = "ffi")]
pub mod ffi;
pub mod global_alloc;
pub mod init;
pub mod large;
pub mod platform;
pub mod slab;
pub mod stats;
pub mod sync;
pub mod util;

pub use api::{print_stats, release, resize, stats_snapshot, try_alloc, try_alloc_zeroed, usable_size};
pub use error::AllocError;
pub use global_alloc::BucketAlloc;
pub use stats::StatsSnapshot;
