//! The small-object layer: segregated size classes, per-arena slab chains,
//! occupancy bitmaps and the page-map side table that resolves user
//! pointers back to their owning slab.

pub mod arena;
pub mod bitmap;
pub mod page_map;
pub mod size_class;

pub use arena::{Arena, Slab, SlotMeta};
pub use bitmap::OccupancyBitmap;
pub use page_map::PageInfo;
