//! Symbol table decoding.
//!
//! Turns `nlist` entries plus the string table into typed export records.
//! Only external symbols are exported by default; [`PrivateSymbols`] admits
//! private ones per kind.

use tracing::{debug, warn};

use super::constants::*;
use super::structs::{Nlist, Nlist64, SymtabCommand};
use super::thin::ThinImage;
use crate::error::{Error, Result};
use crate::options::{Leniency, ParseOptions, PrivateSymbols};
use crate::source::{read_vec_at, Source};
use crate::tbd::{CreateInfo, ExportKind};
use crate::util::{checked_table_size, read_struct, until_nul, Range};

/// Number of `nlist` entries read per batch.
const NLIST_BATCH: usize = 512;

/// ObjC class symbol prefixes. The legacy prefix keeps its underscore so
/// every spelling of a class yields the same `_Name`.
const OBJC_CLASS_PREFIXES: [&str; 3] = ["_OBJC_CLASS_$", "_OBJC_METACLASS_$", ".objc_class_name"];
const OBJC_IVAR_PREFIX: &str = "_OBJC_IVAR_$";

/// The fields of an `nlist` entry the decoder uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SymbolEntry {
    /// String table index
    pub n_strx: u32,
    /// Type bits
    pub n_type: u8,
    /// Description bits
    pub n_desc: u16,
}

impl From<Nlist> for SymbolEntry {
    fn from(nlist: Nlist) -> Self {
        Self { n_strx: nlist.n_strx, n_type: nlist.n_type, n_desc: nlist.n_desc }
    }
}

impl From<Nlist64> for SymbolEntry {
    fn from(nlist: Nlist64) -> Self {
        Self { n_strx: nlist.n_strx, n_type: nlist.n_type, n_desc: nlist.n_desc }
    }
}

impl SymbolEntry {
    /// Returns true for debugger entries and undefined references.
    #[inline]
    pub fn is_skipped(&self) -> bool {
        if self.n_type & N_STAB != 0 {
            return true;
        }
        matches!(self.n_type & N_TYPE, N_UNDF | N_PBUD)
    }

    /// Returns true if the symbol is visible outside its linkage unit.
    #[inline]
    pub fn is_external(&self) -> bool {
        self.n_type & N_EXT != 0 && self.n_type & N_PEXT == 0
    }
}

/// Classifies a symbol name, stripping ObjC prefixes.
pub fn classify_symbol(name: &str, n_desc: u16) -> (ExportKind, &str) {
    for prefix in OBJC_CLASS_PREFIXES {
        if let Some(rest) = name.strip_prefix(prefix) {
            return (ExportKind::ObjcClassSymbol, rest);
        }
    }
    if let Some(rest) = name.strip_prefix(OBJC_IVAR_PREFIX) {
        return (ExportKind::ObjcIvarSymbol, rest);
    }
    if n_desc & N_WEAK_DEF != 0 {
        return (ExportKind::WeakDefSymbol, name);
    }
    (ExportKind::NormalSymbol, name)
}

fn private_admitted(kind: ExportKind, private: PrivateSymbols) -> bool {
    let needed = match kind {
        ExportKind::NormalSymbol => PrivateSymbols::NORMAL,
        ExportKind::WeakDefSymbol => PrivateSymbols::WEAK_DEF,
        ExportKind::ObjcClassSymbol => PrivateSymbols::OBJC_CLASS,
        ExportKind::ObjcIvarSymbol => PrivateSymbols::OBJC_IVAR,
        ExportKind::Client | ExportKind::Reexport => return false,
    };
    private.contains(needed)
}

/// Looks up a symbol name in the string table.
fn symbol_name(strtab: &[u8], n_strx: u32) -> Option<&str> {
    let index = n_strx as usize;
    if index >= strtab.len() {
        return None;
    }
    std::str::from_utf8(until_nul(&strtab[index..])).ok()
}

/// Validates the table locations in `symtab` against the image's data window.
///
/// Returns the symbol table size in bytes.
fn validate_symtab(image: &ThinImage, symtab: &SymtabCommand) -> Result<u32> {
    let entry_size = if image.is_64 { Nlist64::SIZE } else { Nlist::SIZE };
    let table_size =
        checked_table_size(symtab.nsyms, entry_size).ok_or(Error::InvalidSymbolTable)?;

    let symbols = Range::from_offset_size(symtab.symoff as u64, table_size as u64)
        .ok_or(Error::InvalidSymbolTable)?;
    let strings = Range::from_offset_size(symtab.stroff as u64, symtab.strsize as u64)
        .ok_or(Error::InvalidSymbolTable)?;

    if !image.data.contains(symbols.begin, symbols.len())
        || !image.data.contains(strings.begin, strings.len())
    {
        return Err(Error::InvalidSymbolTable);
    }
    if symbols.overlaps(&strings) {
        return Err(Error::InvalidSymbolTable);
    }

    Ok(table_size)
}

/// Decodes the symbol table of `image` into `info.exports`.
///
/// Offsets in `symtab` are relative to `image.data`.
pub fn parse_symbol_table<S: Source + ?Sized>(
    info: &mut CreateInfo,
    source: &mut S,
    image: &ThinImage,
    symtab: &SymtabCommand,
    options: &ParseOptions,
) -> Result<()> {
    if symtab.nsyms == 0 {
        return Ok(());
    }
    let table_size = validate_symtab(image, symtab)?;

    let strings_offset = image
        .data
        .absolute(symtab.stroff as u64)
        .ok_or(Error::InvalidSymbolTable)?;
    let strtab = read_vec_at(source, strings_offset, symtab.strsize as usize)?;

    let symbols_offset = image
        .data
        .absolute(symtab.symoff as u64)
        .ok_or(Error::InvalidSymbolTable)?;

    debug!(
        "decoding {} symbols ({table_size:#x} bytes at {symbols_offset:#x}) for {}",
        symtab.nsyms, image.arch
    );

    let entry_size = if image.is_64 { Nlist64::SIZE } else { Nlist::SIZE };
    let arch_bit = image.arch.bit();
    let lenient = options.allows(Leniency::INVALID_FIELDS);
    let mut remaining = symtab.nsyms as usize;
    let mut batch_offset = symbols_offset;

    while remaining > 0 {
        let count = remaining.min(NLIST_BATCH);
        let batch = read_vec_at(source, batch_offset, count * entry_size)?;

        for index in 0..count {
            let position = index * entry_size;
            let entry: SymbolEntry = if image.is_64 {
                read_struct::<Nlist64>(&batch, position, image.endian).map(Into::into)
            } else {
                read_struct::<Nlist>(&batch, position, image.endian).map(Into::into)
            }
            .ok_or(Error::InvalidSymbolTable)?;

            if entry.is_skipped() {
                continue;
            }

            let name = match symbol_name(&strtab, entry.n_strx) {
                Some(name) => name,
                None if lenient => {
                    warn!("dropping symbol with invalid string index {:#x}", entry.n_strx);
                    continue;
                }
                None => return Err(Error::InvalidSymbolTable),
            };
            if name.is_empty() {
                continue;
            }

            let (kind, name) = classify_symbol(name, entry.n_desc);
            if name.is_empty() {
                continue;
            }
            if !entry.is_external() && !private_admitted(kind, options.private_symbols) {
                continue;
            }

            info.add_export(arch_bit, kind, name)?;
        }

        remaining -= count;
        batch_offset += (count * entry_size) as u64;
    }

    Ok(())
}
