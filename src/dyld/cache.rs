//! Shared cache header, mapping and image table parsing.

use tracing::debug;
use zerocopy::FromBytes;

use super::structs::*;
use crate::arch::Arch;
use crate::error::{Error, Result};
use crate::source::{read_array_at, read_vec_at, source_len, Source};
use crate::util::{find_overlap, read_struct, ByteSwap, Endian, Range};

// =============================================================================
// Mapping Info
// =============================================================================

/// One cache mapping: a run of file bytes loaded at a virtual address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MappingInfo {
    /// Virtual memory address
    pub address: u64,
    /// Size in bytes
    pub size: u64,
    /// File offset
    pub file_offset: u64,
    /// Maximum protection
    pub max_prot: u32,
    /// Initial protection
    pub init_prot: u32,
}

impl MappingInfo {
    /// Returns true if this mapping contains the given virtual address.
    #[inline]
    pub fn contains_addr(&self, addr: u64) -> bool {
        addr >= self.address && addr - self.address < self.size
    }

    /// Converts a contained virtual address to a file offset.
    #[inline]
    pub fn addr_to_offset(&self, addr: u64) -> u64 {
        self.file_offset + (addr - self.address)
    }

    /// Returns the file range this mapping covers.
    #[inline]
    pub fn file_range(&self) -> Option<Range> {
        Range::from_offset_size(self.file_offset, self.size)
    }
}

impl From<DyldCacheMappingInfo> for MappingInfo {
    fn from(info: DyldCacheMappingInfo) -> Self {
        Self {
            address: info.address,
            size: info.size,
            file_offset: info.file_offset,
            max_prot: info.max_prot,
            init_prot: info.init_prot,
        }
    }
}

// =============================================================================
// Image Info
// =============================================================================

/// One image table entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageInfo {
    /// Address of the Mach-O header
    pub address: u64,
    /// Modification time
    pub mod_time: u64,
    /// Inode
    pub inode: u64,
    /// File offset of the NUL-terminated path
    pub path_file_offset: u32,
}

impl From<DyldCacheImageInfo> for ImageInfo {
    fn from(info: DyldCacheImageInfo) -> Self {
        Self {
            address: info.address,
            mod_time: info.mod_time,
            inode: info.inode,
            path_file_offset: info.path_file_offset,
        }
    }
}

// =============================================================================
// Shared Cache Info
// =============================================================================

/// A validated shared cache header with its mapping and image tables.
#[derive(Debug, Clone)]
pub struct SharedCacheInfo {
    /// Image table
    pub images: Vec<ImageInfo>,
    /// Mappings, mutually non-overlapping in file-offset space
    pub mappings: Vec<MappingInfo>,
    /// Cache architecture
    pub arch: Arch,
    /// `arch.bit()`
    pub arch_bit: u64,
    /// Size of the cache file
    pub size: u64,
}

/// Validates a table at `offset` holding `count` entries of `entry_size` bytes.
///
/// Returns its file range.
fn table_range(offset: u32, count: u32, entry_size: usize, cache_size: u64, err: fn() -> Error) -> Result<Range> {
    let offset = offset as u64;
    if offset < DyldCacheHeader::SIZE as u64 || offset >= cache_size {
        return Err(err());
    }
    let table_size = (count as u64)
        .checked_mul(entry_size as u64)
        .ok_or_else(err)?;
    let range = Range::from_offset_size(offset, table_size).ok_or_else(err)?;
    if range.end > cache_size {
        return Err(err());
    }
    Ok(range)
}

fn decode_table<T, U>(bytes: &[u8], count: usize, entry_size: usize, err: fn() -> Error) -> Result<Vec<U>>
where
    T: FromBytes + ByteSwap,
    U: From<T>,
{
    let mut entries = Vec::new();
    entries.try_reserve_exact(count).map_err(|_| Error::AllocFail(count * entry_size))?;
    for index in 0..count {
        let entry: T = read_struct(bytes, index * entry_size, Endian::Little).ok_or_else(err)?;
        entries.push(entry.into());
    }
    Ok(entries)
}

impl SharedCacheInfo {
    /// Parses and validates the cache header and its tables.
    ///
    /// # Errors
    ///
    /// - [`Error::NotASharedCache`] if the magic does not match
    /// - [`Error::UnsupportedCacheArch`] if the architecture is unknown
    /// - [`Error::InvalidMappings`] / [`Error::OverlappingMappings`] for a bad mapping table
    /// - [`Error::InvalidImages`] for a bad image table
    pub fn parse<S: Source + ?Sized>(source: &mut S) -> Result<Self> {
        let size = source_len(source)?;
        if size < DYLD_CACHE_MAGIC.len() as u64 {
            return Err(Error::NotASharedCache);
        }
        let magic = read_array_at::<S, 8>(source, 0)?;
        if &magic != DYLD_CACHE_MAGIC {
            return Err(Error::NotASharedCache);
        }
        if size < DyldCacheHeader::SIZE as u64 {
            return Err(Error::SizeTooSmall {
                needed: DyldCacheHeader::SIZE as u64,
                available: size,
            });
        }

        let header_bytes = read_array_at::<S, { DyldCacheHeader::SIZE }>(source, 0)?;
        let header: DyldCacheHeader =
            read_struct(&header_bytes, 0, Endian::Little).ok_or(Error::NotASharedCache)?;

        let arch_name = header.arch_name();
        let arch = Arch::for_name(&arch_name).ok_or(Error::UnsupportedCacheArch(arch_name))?;

        if header.mapping_count == 0 {
            return Err(Error::InvalidMappings);
        }
        let mappings_range = table_range(
            header.mapping_offset,
            header.mapping_count,
            DyldCacheMappingInfo::SIZE,
            size,
            || Error::InvalidMappings,
        )?;

        // The header ends at `mapping_offset`, now known to lie inside the file.
        let (images_offset, images_count) = if header.uses_new_images_offset() {
            let bytes = read_array_at::<S, { DyldCacheImagesLocation::SIZE }>(
                source,
                NEW_IMAGES_FIELD_OFFSET,
            )?;
            let location: DyldCacheImagesLocation =
                read_struct(&bytes, 0, Endian::Little).ok_or(Error::InvalidImages)?;
            (location.images_offset, location.images_count)
        } else {
            (header.images_offset_old, header.images_count_old)
        };

        let images_range = if images_count == 0 {
            None
        } else {
            let range = table_range(
                images_offset,
                images_count,
                DyldCacheImageInfo::SIZE,
                size,
                || Error::InvalidImages,
            )?;
            if mappings_range.overlaps(&range) {
                return Err(Error::InvalidImages);
            }
            Some(range)
        };

        let mapping_bytes =
            read_vec_at(source, mappings_range.begin, mappings_range.len() as usize)?;
        let mappings: Vec<MappingInfo> = decode_table::<DyldCacheMappingInfo, _>(
            &mapping_bytes,
            header.mapping_count as usize,
            DyldCacheMappingInfo::SIZE,
            || Error::InvalidMappings,
        )?;

        let mut file_ranges = Vec::with_capacity(mappings.len());
        for mapping in &mappings {
            let range = mapping.file_range().ok_or(Error::InvalidMappings)?;
            if range.end > size || mapping.address.checked_add(mapping.size).is_none() {
                return Err(Error::InvalidMappings);
            }
            file_ranges.push(range);
        }
        if find_overlap(&file_ranges).is_some() {
            return Err(Error::OverlappingMappings);
        }

        let images: Vec<ImageInfo> = match images_range {
            Some(range) => {
                let image_bytes = read_vec_at(source, range.begin, range.len() as usize)?;
                decode_table::<DyldCacheImageInfo, _>(
                    &image_bytes,
                    images_count as usize,
                    DyldCacheImageInfo::SIZE,
                    || Error::InvalidImages,
                )?
            }
            None => Vec::new(),
        };

        debug!(
            "shared cache: {arch}, {} mappings, {} images, {size:#x} bytes",
            mappings.len(),
            images.len()
        );

        Ok(Self {
            images,
            mappings,
            arch,
            arch_bit: arch.bit(),
            size,
        })
    }

    /// Translates a virtual address to `(file_offset, bytes left in its mapping)`.
    ///
    /// # Errors
    ///
    /// [`Error::NoCorrespondingMapping`] if no mapping contains `address`.
    pub fn resolve_image_offset(&self, address: u64) -> Result<(u64, u64)> {
        self.mapping_for_addr(address)
            .map(|mapping| {
                let offset = mapping.addr_to_offset(address);
                (offset, mapping.size - (address - mapping.address))
            })
            .ok_or(Error::NoCorrespondingMapping { address })
    }

    /// Returns the mapping containing a virtual address.
    pub fn mapping_for_addr(&self, address: u64) -> Option<&MappingInfo> {
        self.mappings.iter().find(|mapping| mapping.contains_addr(address))
    }

    /// Returns the number of images.
    pub fn image_count(&self) -> usize {
        self.images.len()
    }
}
