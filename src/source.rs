//! Reading from seekable byte sources.
//!
//! The parsers accept any `Read + Seek` value. These helpers map I/O failures
//! onto [`Error::SeekFail`] and [`Error::ReadFail`] and reserve buffers
//! fallibly, so a hostile size field surfaces as [`Error::AllocFail`] instead
//! of aborting the process.

use std::io::{Read, Seek, SeekFrom};

use crate::error::{Error, Result};

/// A byte source the parsers can read from.
pub trait Source: Read + Seek {}

impl<T: Read + Seek + ?Sized> Source for T {}

/// A region of a source the parser is allowed to read.
///
/// `size == None` means the bound is unknown and in-file sizes are trusted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    /// Absolute offset of the first byte
    pub start: u64,
    /// Number of bytes, if known
    pub size: Option<u64>,
}

impl Window {
    /// Creates a window with a known size.
    pub const fn new(start: u64, size: u64) -> Self {
        Self { start, size: Some(size) }
    }

    /// Creates a window that extends to the end of the source.
    pub const fn unbounded(start: u64) -> Self {
        Self { start, size: None }
    }

    /// Returns true if `[offset, offset + len)` (relative to `start`) lies inside.
    ///
    /// Always true for unbounded windows unless the end overflows.
    pub fn contains(&self, offset: u64, len: u64) -> bool {
        match offset.checked_add(len) {
            Some(end) => self.size.map_or(true, |size| end <= size),
            None => false,
        }
    }

    /// Converts a window-relative offset to an absolute one.
    pub fn absolute(&self, offset: u64) -> Option<u64> {
        self.start.checked_add(offset)
    }
}

/// Seeks to an absolute offset.
pub fn seek_to<S: Source + ?Sized>(source: &mut S, offset: u64) -> Result<()> {
    source
        .seek(SeekFrom::Start(offset))
        .map_err(|e| Error::seek_fail(offset, e))?;
    Ok(())
}

/// Returns the total length of the source, leaving the position at the end.
pub fn source_len<S: Source + ?Sized>(source: &mut S) -> Result<u64> {
    source
        .seek(SeekFrom::End(0))
        .map_err(|e| Error::seek_fail(u64::MAX, e))
}

/// Fills `buf` from the current position.
pub fn read_exact<S: Source + ?Sized>(source: &mut S, buf: &mut [u8]) -> Result<()> {
    source
        .read_exact(buf)
        .map_err(|e| Error::read_fail(buf.len(), e))
}

/// Reads `len` bytes at `offset` into a freshly reserved buffer.
pub fn read_vec_at<S: Source + ?Sized>(source: &mut S, offset: u64, len: usize) -> Result<Vec<u8>> {
    let mut buf = alloc_buffer(len)?;
    seek_to(source, offset)?;
    read_exact(source, &mut buf)?;
    Ok(buf)
}

/// Reads a fixed-size array at `offset`.
pub fn read_array_at<S: Source + ?Sized, const N: usize>(
    source: &mut S,
    offset: u64,
) -> Result<[u8; N]> {
    let mut buf = [0u8; N];
    seek_to(source, offset)?;
    read_exact(source, &mut buf)?;
    Ok(buf)
}

/// Allocates a zeroed buffer, reporting failure instead of aborting.
pub fn alloc_buffer(len: usize) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(len).map_err(|_| Error::AllocFail(len))?;
    buf.resize(len, 0);
    Ok(buf)
}
