//! Parsing images embedded in a shared cache.
//!
//! Inside a cache, load-command string offsets stay relative to their
//! command, but `LC_SYMTAB` and section file offsets are relative to the
//! cache file. The image is therefore parsed with its symbol table deferred,
//! and the table is decoded here against a window spanning the whole cache.

use tracing::debug;

use super::cache::{ImageInfo, SharedCacheInfo};
use crate::arch::Arch;
use crate::error::{Error, Result};
use crate::macho::{parse_symbol_table, parse_thin, read_header, Magic, SymtabMode, ThinImage};
use crate::options::ParseOptions;
use crate::source::{read_exact, seek_to, Source, Window};
use crate::tbd::CreateInfo;
use crate::util::until_nul;

/// Bytes read per step while looking for the end of an image path.
const PATH_CHUNK: usize = 256;

/// Parses one cache image into `info`.
///
/// # Errors
///
/// - [`Error::NoCorrespondingMapping`] if the image address is not mapped
/// - [`Error::FatNotSupported`] / [`Error::NotAMachO`] for a bad image magic
/// - [`Error::ConflictingArchInfo`] if the image is not built for the cache's architecture
/// - Any error of the thin and symbol table parsers
pub fn parse_shared_cache_image<S: Source + ?Sized>(
    info: &mut CreateInfo,
    cache: &SharedCacheInfo,
    source: &mut S,
    image: &ImageInfo,
    options: &ParseOptions,
) -> Result<()> {
    let (offset, remaining) = cache.resolve_image_offset(image.address)?;
    debug!("cache image {:#x} at file offset {offset:#x}", image.address);

    let magic = Magic::read(source, offset)?;
    if magic.is_fat() {
        return Err(Error::FatNotSupported);
    }
    if !magic.is_thin() {
        return Err(Error::NotAMachO);
    }

    let header = read_header(source, offset, magic)?;
    match Arch::for_cputype(header.cputype, header.cpusubtype) {
        Some(arch) if arch == cache.arch => {}
        _ => return Err(Error::ConflictingArchInfo),
    }

    let thin = ThinImage::new(cache.arch, header, magic, Window::new(offset, remaining))
        .with_data_window(Window::new(0, cache.size));

    if let Some(symtab) = parse_thin(info, source, &thin, options, SymtabMode::Defer)? {
        parse_symbol_table(info, source, &thin, &symtab, options)?;
        if info.exports.is_empty() {
            return Err(Error::NoExports);
        }
    }

    Ok(())
}

/// Reads the NUL-terminated path of an image.
///
/// The path is read in fixed-size chunks and may not run past the end of the
/// cache.
pub fn read_image_path<S: Source + ?Sized>(
    cache: &SharedCacheInfo,
    source: &mut S,
    image: &ImageInfo,
) -> Result<String> {
    let offset = image.path_file_offset as u64;
    let invalid = Error::InvalidImagePath { offset };
    if offset >= cache.size {
        return Err(invalid);
    }

    let mut left = cache.size - offset;
    let mut path = Vec::new();
    let mut chunk = [0u8; PATH_CHUNK];
    seek_to(source, offset)?;

    loop {
        if left == 0 {
            return Err(invalid);
        }
        let len = (left as usize).min(PATH_CHUNK);
        read_exact(source, &mut chunk[..len])?;

        let part = until_nul(&chunk[..len]);
        path.extend_from_slice(part);
        if part.len() < len {
            break;
        }
        left -= len as u64;
    }

    if path.is_empty() {
        return Err(invalid);
    }
    String::from_utf8(path).map_err(|_| invalid)
}

/// Calls `callback` with every image and its path, in table order.
///
/// Iteration stops early when the callback returns `false`.
pub fn iterate_shared_cache_images<S, F>(
    cache: &SharedCacheInfo,
    source: &mut S,
    mut callback: F,
) -> Result<()>
where
    S: Source + ?Sized,
    F: FnMut(&ImageInfo, &str) -> bool,
{
    for image in &cache.images {
        let path = read_image_path(cache, source, image)?;
        if !callback(image, &path) {
            break;
        }
    }
    Ok(())
}
