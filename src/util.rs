//! Primitives for validating and decoding untrusted binary data.
//!
//! This module provides:
//! - Half-open byte ranges with overflow-checked construction
//! - Byte order handling for structures read from disk
//! - Bounded C-string extraction (via memchr)
//!
//! Every offset and size that comes out of a file is checked with these helpers
//! before it is used to index a buffer or to seek.

use byteorder::{BigEndian, ByteOrder, LittleEndian};
use zerocopy::FromBytes;

// =============================================================================
// Ranges
// =============================================================================

/// A half-open byte range `[begin, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Range {
    /// First byte in the range
    pub begin: u64,
    /// One past the last byte in the range
    pub end: u64,
}

impl Range {
    /// Creates a range. `end` is clamped so the range is never inverted.
    #[inline]
    pub const fn new(begin: u64, end: u64) -> Self {
        let end = if end < begin { begin } else { end };
        Self { begin, end }
    }

    /// Creates the range `[offset, offset + size)`, or `None` if the end overflows.
    #[inline]
    pub fn from_offset_size(offset: u64, size: u64) -> Option<Self> {
        offset.checked_add(size).map(|end| Self { begin: offset, end })
    }

    /// Returns the number of bytes in the range.
    #[inline]
    pub const fn len(&self) -> u64 {
        self.end - self.begin
    }

    /// Returns true if the range holds no bytes.
    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.begin == self.end
    }

    /// Returns true if `location` lies inside the range.
    #[inline]
    pub const fn contains_location(&self, location: u64) -> bool {
        location >= self.begin && location < self.end
    }

    /// Returns true if `other` lies entirely inside this range.
    #[inline]
    pub const fn contains_range(&self, other: &Range) -> bool {
        other.begin >= self.begin && other.end <= self.end
    }

    /// Returns true if the two ranges share at least one byte.
    ///
    /// Empty ranges hold no bytes and never overlap anything.
    #[inline]
    pub const fn overlaps(&self, other: &Range) -> bool {
        !self.is_empty() && !other.is_empty() && self.begin < other.end && other.begin < self.end
    }
}

/// Returns true if `a` and `b` share at least one byte offset.
#[inline]
pub fn ranges_overlap(a: &Range, b: &Range) -> bool {
    a.overlaps(b)
}

/// Returns the index pair of the first two overlapping ranges, if any.
///
/// Quadratic, which is fine for the small, count-bounded tables it is used on
/// (fat architectures and cache mappings).
pub fn find_overlap(ranges: &[Range]) -> Option<(usize, usize)> {
    for (i, range) in ranges.iter().enumerate() {
        for (j, prior) in ranges[..i].iter().enumerate() {
            if range.overlaps(prior) {
                return Some((j, i));
            }
        }
    }
    None
}

/// Computes `count * elem_size` in 32 bits, the width Mach-O uses for table sizes.
#[inline]
pub fn checked_table_size(count: u32, elem_size: usize) -> Option<u32> {
    u32::try_from(elem_size).ok()?.checked_mul(count)
}

// =============================================================================
// Byte Order
// =============================================================================

/// Byte order of a file or container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endian {
    /// Little-endian
    Little,
    /// Big-endian
    Big,
}

impl Endian {
    /// Byte order of the host.
    #[cfg(target_endian = "little")]
    pub const NATIVE: Endian = Endian::Little;
    /// Byte order of the host.
    #[cfg(target_endian = "big")]
    pub const NATIVE: Endian = Endian::Big;

    /// Returns true if values in this byte order must be swapped on the host.
    #[inline]
    pub fn needs_swap(self) -> bool {
        self != Self::NATIVE
    }

    /// Returns true for big-endian.
    #[inline]
    pub fn is_big(self) -> bool {
        self == Endian::Big
    }

    /// Reads a u32 in this byte order from the start of `data`.
    #[inline]
    pub fn read_u32(self, data: &[u8]) -> Option<u32> {
        let bytes = data.get(..4)?;
        Some(match self {
            Endian::Little => LittleEndian::read_u32(bytes),
            Endian::Big => BigEndian::read_u32(bytes),
        })
    }
}

/// On-disk structures whose integer fields may need a byte swap after reading.
pub trait ByteSwap {
    /// Swaps every multi-byte integer field in place.
    fn byte_swap(&mut self);
}

/// Implements [`ByteSwap`] by swapping the listed integer fields.
macro_rules! impl_byte_swap {
    ($ty:ident { $($field:ident),* $(,)? }) => {
        impl $crate::util::ByteSwap for $ty {
            #[inline]
            fn byte_swap(&mut self) {
                $(self.$field = self.$field.swap_bytes();)*
            }
        }
    };
}

pub(crate) use impl_byte_swap;

/// Decodes a `T` at `offset` in `data`, normalizing it to host byte order.
///
/// Returns `None` if fewer than `size_of::<T>()` bytes are available.
#[inline]
pub fn read_struct<T: FromBytes + ByteSwap>(data: &[u8], offset: usize, endian: Endian) -> Option<T> {
    let bytes = data.get(offset..)?;
    let (mut value, _) = T::read_from_prefix(bytes).ok()?;
    if endian.needs_swap() {
        value.byte_swap();
    }
    Some(value)
}

// =============================================================================
// Strings
// =============================================================================

/// Returns `data` up to (not including) its first NUL byte.
#[inline]
pub fn until_nul(data: &[u8]) -> &[u8] {
    match memchr::memchr(0, data) {
        Some(end) => &data[..end],
        None => data,
    }
}

/// Returns the NUL-padded fixed-size name (segment or section) as bytes.
#[inline]
pub fn fixed_name(name: &[u8; 16]) -> &[u8] {
    until_nul(name)
}

/// Returns true if the string is empty or contains only whitespace.
#[inline]
pub fn is_blank(data: &[u8]) -> bool {
    data.iter().all(|b| b.is_ascii_whitespace())
}

/// Formats a UUID as an uppercase hex string.
pub fn uuid_to_string(uuid: &[u8; 16]) -> String {
    format!(
        "{:02X}{:02X}{:02X}{:02X}-{:02X}{:02X}-{:02X}{:02X}-{:02X}{:02X}-{:02X}{:02X}{:02X}{:02X}{:02X}{:02X}",
        uuid[0], uuid[1], uuid[2], uuid[3],
        uuid[4], uuid[5],
        uuid[6], uuid[7],
        uuid[8], uuid[9],
        uuid[10], uuid[11], uuid[12], uuid[13], uuid[14], uuid[15]
    )
}
