//! Container classification from the leading magic.

use super::constants::*;
use crate::error::Result;
use crate::source::{read_array_at, Source};
use crate::util::Endian;

/// What kind of container starts at a given offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Magic {
    /// 32-bit Mach-O, little-endian
    Thin32,
    /// 32-bit Mach-O, big-endian
    Thin32Be,
    /// 64-bit Mach-O, little-endian
    Thin64,
    /// 64-bit Mach-O, big-endian
    Thin64Be,
    /// Fat file with 32-bit arch entries, little-endian
    Fat32,
    /// Fat file with 32-bit arch entries, big-endian (the usual layout)
    Fat32Be,
    /// Fat file with 64-bit arch entries, little-endian
    Fat64,
    /// Fat file with 64-bit arch entries, big-endian
    Fat64Be,
    /// Anything else
    NotAMachO,
}

impl Magic {
    /// Classifies the first four bytes of a container.
    pub fn from_bytes(bytes: [u8; 4]) -> Self {
        match u32::from_le_bytes(bytes) {
            MH_MAGIC => Magic::Thin32,
            MH_CIGAM => Magic::Thin32Be,
            MH_MAGIC_64 => Magic::Thin64,
            MH_CIGAM_64 => Magic::Thin64Be,
            FAT_MAGIC => Magic::Fat32,
            FAT_CIGAM => Magic::Fat32Be,
            FAT_MAGIC_64 => Magic::Fat64,
            FAT_CIGAM_64 => Magic::Fat64Be,
            _ => Magic::NotAMachO,
        }
    }

    /// Reads and classifies the magic at `offset`.
    ///
    /// Only four bytes are read. The only failures are I/O errors.
    pub fn read<S: Source + ?Sized>(source: &mut S, offset: u64) -> Result<Self> {
        let bytes = read_array_at::<S, 4>(source, offset)?;
        Ok(Self::from_bytes(bytes))
    }

    /// Returns true for a single-architecture Mach-O.
    #[inline]
    pub fn is_thin(self) -> bool {
        matches!(self, Magic::Thin32 | Magic::Thin32Be | Magic::Thin64 | Magic::Thin64Be)
    }

    /// Returns true for a fat container.
    #[inline]
    pub fn is_fat(self) -> bool {
        matches!(self, Magic::Fat32 | Magic::Fat32Be | Magic::Fat64 | Magic::Fat64Be)
    }

    /// Returns true if the container uses 64-bit structures.
    #[inline]
    pub fn is_64(self) -> bool {
        matches!(self, Magic::Thin64 | Magic::Thin64Be | Magic::Fat64 | Magic::Fat64Be)
    }

    /// Returns the byte order of the container's fields.
    #[inline]
    pub fn endian(self) -> Endian {
        match self {
            Magic::Thin32Be | Magic::Thin64Be | Magic::Fat32Be | Magic::Fat64Be => Endian::Big,
            _ => Endian::Little,
        }
    }
}
