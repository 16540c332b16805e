//! Mach-O parsing.
//!
//! [`parse_macho`] classifies the file by its magic and either parses a single
//! image or walks every slice of a fat container, merging all of them into
//! one [`CreateInfo`].

pub mod constants;
pub mod fat;
pub mod magic;
pub mod structs;
pub mod symbols;
pub mod thin;

pub use fat::{parse_fat, read_fat_archs};
pub use magic::Magic;
pub use structs::*;
pub use symbols::parse_symbol_table;
pub use thin::{parse_thin, read_header, LoadCommandScan, SymtabMode, ThinImage};

use tracing::debug;

use crate::arch::Arch;
use crate::error::{Error, Result};
use crate::options::ParseOptions;
use crate::source::{source_len, Source, Window};
use crate::tbd::CreateInfo;

/// Parses a thin or fat Mach-O file into `info`.
///
/// The whole source is the container; its length bounds every offset.
pub fn parse_macho<S: Source + ?Sized>(
    info: &mut CreateInfo,
    source: &mut S,
    options: &ParseOptions,
) -> Result<()> {
    let size = source_len(source)?;
    let container = Window::new(0, size);

    let magic = Magic::read(source, 0)?;
    debug!("container magic {magic:?}, {size:#x} bytes");

    if magic.is_fat() {
        return parse_fat(info, source, magic, container, options);
    }
    if !magic.is_thin() {
        return Err(Error::NotAMachO);
    }

    let header_size = MachHeader::size_for(magic.is_64()) as u64;
    if size < header_size {
        return Err(Error::SizeTooSmall {
            needed: header_size,
            available: size,
        });
    }

    let header = read_header(source, 0, magic)?;
    let arch = Arch::for_cputype(header.cputype, header.cpusubtype).ok_or(
        Error::InvalidArchitecture {
            cputype: header.cputype,
            cpusubtype: header.cpusubtype,
        },
    )?;

    let image = ThinImage::new(arch, header, magic, container);
    parse_thin(info, source, &image, options, SymtabMode::Parse)?;
    Ok(())
}
