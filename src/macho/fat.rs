//! Fat (universal) container parsing.

use tracing::debug;

use super::magic::Magic;
use super::structs::{FatArch, FatArch64, FatHeader, MachHeader};
use super::thin::{parse_thin, read_header, SymtabMode, ThinImage};
use crate::arch::Arch;
use crate::error::{Error, Result};
use crate::options::ParseOptions;
use crate::source::{read_array_at, read_vec_at, Source, Window};
use crate::tbd::CreateInfo;
use crate::util::{checked_table_size, find_overlap, read_struct, Range};

/// Reads and validates the arch descriptor table of a fat container.
///
/// Every descriptor is checked before any slice is parsed: slices must lie
/// after the headers, hold at least a Mach-O header, stay inside the
/// container (when its size is known) and not overlap each other.
pub fn read_fat_archs<S: Source + ?Sized>(
    source: &mut S,
    magic: Magic,
    container: Window,
) -> Result<Vec<FatArch64>> {
    let endian = magic.endian();
    let header_bytes = read_array_at::<S, { FatHeader::SIZE }>(source, container.start)?;
    let header: FatHeader = read_struct(&header_bytes, 0, endian).ok_or(Error::NotAMachO)?;

    let nfat_arch = header.nfat_arch;
    if nfat_arch == 0 {
        return Err(Error::NoArchitectures);
    }

    let entry_size = if magic.is_64() { FatArch64::SIZE } else { FatArch::SIZE };
    let archs_size =
        checked_table_size(nfat_arch, entry_size).ok_or(Error::TooManyArchitectures(nfat_arch))?;
    let headers_size = FatHeader::SIZE as u64 + archs_size as u64;

    if let Some(size) = container.size {
        if headers_size > size {
            return Err(Error::SizeTooSmall {
                needed: headers_size,
                available: size,
            });
        }
    }

    let table = read_vec_at(source, container.start + FatHeader::SIZE as u64, archs_size as usize)?;
    let mut archs = Vec::new();
    archs
        .try_reserve_exact(nfat_arch as usize)
        .map_err(|_| Error::AllocFail(nfat_arch as usize * entry_size))?;

    for index in 0..nfat_arch as usize {
        let position = index * entry_size;
        let arch: FatArch64 = if magic.is_64() {
            read_struct::<FatArch64>(&table, position, endian)
        } else {
            read_struct::<FatArch>(&table, position, endian).map(Into::into)
        }
        .ok_or(Error::TooManyArchitectures(nfat_arch))?;
        archs.push(arch);
    }

    let mut ranges = Vec::with_capacity(archs.len());
    for arch in &archs {
        let invalid = Error::InvalidArchitecture {
            cputype: arch.cputype,
            cpusubtype: arch.cpusubtype,
        };
        if arch.offset < headers_size || arch.size < MachHeader::SIZE as u64 {
            return Err(invalid);
        }
        let range = Range::from_offset_size(arch.offset, arch.size).ok_or(invalid)?;
        if let Some(size) = container.size {
            if range.end > size {
                return Err(Error::InvalidArchitecture {
                    cputype: arch.cputype,
                    cpusubtype: arch.cpusubtype,
                });
            }
        }
        ranges.push(range);
    }

    if find_overlap(&ranges).is_some() {
        return Err(Error::OverlappingArchitectures);
    }

    Ok(archs)
}

/// Parses every slice of a fat container into `info`.
///
/// Slices are parsed in descriptor order; the first failure aborts the parse.
pub fn parse_fat<S: Source + ?Sized>(
    info: &mut CreateInfo,
    source: &mut S,
    magic: Magic,
    container: Window,
    options: &ParseOptions,
) -> Result<()> {
    let archs = read_fat_archs(source, magic, container)?;
    debug!("fat container at {:#x} with {} slices", container.start, archs.len());

    for fat_arch in &archs {
        let invalid = || Error::InvalidArchitecture {
            cputype: fat_arch.cputype,
            cpusubtype: fat_arch.cpusubtype,
        };

        let arch = Arch::for_cputype(fat_arch.cputype, fat_arch.cpusubtype).ok_or_else(invalid)?;
        let start = container.start.checked_add(fat_arch.offset).ok_or_else(invalid)?;

        let slice_magic = Magic::read(source, start)?;
        if !slice_magic.is_thin() {
            return Err(Error::NotAMachO);
        }

        let header = read_header(source, start, slice_magic)?;
        if header.cputype != fat_arch.cputype || header.cpusubtype != fat_arch.cpusubtype {
            return Err(invalid());
        }

        debug!("slice {arch} at {start:#x} ({:#x} bytes)", fat_arch.size);

        let image = ThinImage::new(arch, header, slice_magic, Window::new(start, fat_arch.size));
        parse_thin(info, source, &image, options, SymtabMode::Parse)?;
    }

    Ok(())
}
