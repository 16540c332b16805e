//! Dyld shared cache handling.
//!
//! A shared cache is one file holding many prelinked dylibs. Its header points
//! at two tables:
//! - Mappings that describe how regions of the file map to virtual memory
//! - Image entries giving the address and path of each dylib
//!
//! Images are located by translating their address through the mappings and
//! then parsed like a thin Mach-O, except that symbol table and section
//! offsets are relative to the start of the cache.

pub mod cache;
pub mod image;
pub mod structs;

pub use cache::{ImageInfo, MappingInfo, SharedCacheInfo};
pub use image::{iterate_shared_cache_images, parse_shared_cache_image, read_image_path};
pub use structs::*;
