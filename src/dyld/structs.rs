//! Dyld shared cache binary structures.
//!
//! These structures match the on-disk format of Apple's dyld shared cache.
//! Caches are always little-endian.

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::util::impl_byte_swap;

/// Magic prefix of every cache this crate accepts. The next 8 bytes name the
/// architecture, padded with spaces.
pub const DYLD_CACHE_MAGIC: &[u8; 8] = b"dyld_v1 ";

/// Header offset of the newer image table location.
pub const NEW_IMAGES_FIELD_OFFSET: u64 = 0x1C0;

// =============================================================================
// Header Structures
// =============================================================================

/// The leading, fixed part of the cache header.
///
/// The full header is variable-length; `mapping_offset` marks where it ends.
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct DyldCacheHeader {
    /// Magic identifier, e.g. `"dyld_v1   arm64e"`
    pub magic: [u8; 16],
    /// File offset to the first `DyldCacheMappingInfo`
    pub mapping_offset: u32,
    /// Number of mapping entries
    pub mapping_count: u32,
    /// Legacy: file offset to the `DyldCacheImageInfo` array
    pub images_offset_old: u32,
    /// Legacy: number of images
    pub images_count_old: u32,
}

impl DyldCacheHeader {
    /// Size of the fixed header part.
    pub const SIZE: usize = 32;

    /// Returns the architecture name from the magic, without padding.
    pub fn arch_name(&self) -> String {
        let name = &self.magic[DYLD_CACHE_MAGIC.len()..];
        String::from_utf8_lossy(name)
            .trim_matches(|c: char| c == ' ' || c == '\0')
            .to_string()
    }

    /// Returns true if the magic has the expected prefix.
    pub fn is_valid(&self) -> bool {
        self.magic.starts_with(DYLD_CACHE_MAGIC)
    }

    /// Checks if a header field exists based on `mapping_offset`.
    pub fn contains_field(&self, field_offset: u64, field_size: u64) -> bool {
        field_offset + field_size <= self.mapping_offset as u64
    }

    /// Returns true if the image table must be read from the newer location.
    pub fn uses_new_images_offset(&self) -> bool {
        self.images_count_old == 0
            && self.contains_field(NEW_IMAGES_FIELD_OFFSET, DyldCacheImagesLocation::SIZE as u64)
    }
}

impl_byte_swap!(DyldCacheHeader { mapping_offset, mapping_count, images_offset_old, images_count_old });

/// The newer image table location (`imagesOffset`, `imagesCount`).
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct DyldCacheImagesLocation {
    /// File offset to the `DyldCacheImageInfo` array
    pub images_offset: u32,
    /// Number of images
    pub images_count: u32,
}

impl DyldCacheImagesLocation {
    /// Size of the two fields.
    pub const SIZE: usize = 8;
}

impl_byte_swap!(DyldCacheImagesLocation { images_offset, images_count });

// =============================================================================
// Mapping Structures
// =============================================================================

/// Mapping entry.
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct DyldCacheMappingInfo {
    /// Virtual memory address
    pub address: u64,
    /// Size in bytes
    pub size: u64,
    /// File offset
    pub file_offset: u64,
    /// Maximum memory protection
    pub max_prot: u32,
    /// Initial memory protection
    pub init_prot: u32,
}

impl DyldCacheMappingInfo {
    /// Size of the entry.
    pub const SIZE: usize = 32;
}

impl_byte_swap!(DyldCacheMappingInfo { address, size, file_offset, max_prot, init_prot });

// =============================================================================
// Image Structures
// =============================================================================

/// Information about a dylib in the cache.
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct DyldCacheImageInfo {
    /// Address of the Mach-O header
    pub address: u64,
    /// Modification time
    pub mod_time: u64,
    /// Inode
    pub inode: u64,
    /// File offset of the path string
    pub path_file_offset: u32,
    /// Padding
    pub pad: u32,
}

impl DyldCacheImageInfo {
    /// Size of the entry.
    pub const SIZE: usize = 32;
}

impl_byte_swap!(DyldCacheImageInfo { address, mod_time, inode, path_file_offset, pad });
