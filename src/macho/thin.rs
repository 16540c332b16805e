//! Single-architecture Mach-O parsing.
//!
//! Parsing an image happens in three phases:
//!
//! 1. The load-command area is read in one piece and scanned into a
//!    [`LoadCommandScan`]. The scan touches nothing but the buffer.
//! 2. Payloads the scan only located (the ObjC image info sections) are read
//!    from the source.
//! 3. The results are merged into the caller's [`CreateInfo`], followed by the
//!    symbol table unless the caller asked to decode it itself.

use tracing::{debug, trace, warn};

use super::constants::*;
use super::magic::Magic;
use super::structs::*;
use super::symbols::parse_symbol_table;
use crate::arch::Arch;
use crate::error::{Error, Result};
use crate::options::{IgnoreFields, Leniency, ParseOptions};
use crate::source::{read_array_at, read_vec_at, Source, Window};
use crate::tbd::{CreateInfo, ExportKind, ObjcConstraint, PackedVersion, Platform};
use crate::util::{checked_table_size, fixed_name, is_blank, read_struct, until_nul, Endian};

/// One Mach-O image and where its pieces live.
#[derive(Debug, Clone, Copy)]
pub struct ThinImage {
    /// Architecture of the image
    pub arch: Arch,
    /// Decoded header
    pub header: MachHeader,
    /// Whether the image uses 64-bit structures
    pub is_64: bool,
    /// Byte order of the image
    pub endian: Endian,
    /// The image itself, starting at its header
    pub image: Window,
    /// The region symbol table and section file offsets are relative to
    pub data: Window,
}

impl ThinImage {
    /// Describes a standalone image (thin file or fat slice).
    ///
    /// File offsets inside the image are relative to its header.
    pub fn new(arch: Arch, header: MachHeader, magic: Magic, image: Window) -> Self {
        Self {
            arch,
            header,
            is_64: magic.is_64(),
            endian: magic.endian(),
            image,
            data: image,
        }
    }

    /// Overrides the region file offsets are relative to.
    pub fn with_data_window(mut self, data: Window) -> Self {
        self.data = data;
        self
    }

    /// Size of the Mach-O header.
    #[inline]
    pub fn header_size(&self) -> usize {
        MachHeader::size_for(self.is_64)
    }
}

/// What to do with the symbol table once the load commands are merged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymtabMode {
    /// Decode it immediately against the image's data window
    Parse,
    /// Hand it back to the caller undecoded
    Defer,
}

/// Reads and decodes the Mach-O header at `offset`.
pub fn read_header<S: Source + ?Sized>(source: &mut S, offset: u64, magic: Magic) -> Result<MachHeader> {
    let bytes = read_array_at::<S, { MachHeader::SIZE }>(source, offset)?;
    read_struct(&bytes, 0, magic.endian()).ok_or(Error::NotAMachO)
}

// =============================================================================
// Load Command Scan
// =============================================================================

/// Identification from `LC_ID_DYLIB`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identification {
    /// Install name, if it was collected and valid
    pub install_name: Option<String>,
    /// Current version
    pub current_version: PackedVersion,
    /// Compatibility version
    pub compatibility_version: PackedVersion,
}

/// Everything the load commands of one image declare.
#[derive(Debug, Clone, Default)]
pub struct LoadCommandScan {
    /// `LC_ID_DYLIB`
    pub identification: Option<Identification>,
    /// `LC_SUB_FRAMEWORK`
    pub parent_umbrella: Option<String>,
    /// `LC_BUILD_VERSION` / `LC_VERSION_MIN_*`
    pub platform: Option<Platform>,
    /// `LC_UUID`
    pub uuid: Option<[u8; 16]>,
    /// `LC_SYMTAB`
    pub symtab: Option<SymtabCommand>,
    /// Located ObjC image info sections
    pub objc_sections: Vec<SectionHeader>,
    /// `LC_SUB_CLIENT`
    pub clients: Vec<String>,
    /// `LC_REEXPORT_DYLIB`
    pub reexports: Vec<String>,
}

/// Turns a recoverable error into a warning when lenient parsing allows it.
fn recover(options: &ParseOptions, offset: usize, result: Result<()>) -> Result<()> {
    match result {
        Err(err) if err.is_recoverable() && options.allows(Leniency::INVALID_FIELDS) => {
            warn!("skipping load command at {offset:#x}: {err}");
            Ok(())
        }
        other => other,
    }
}

/// Extracts the string stored at `offset` inside a load command.
///
/// The string must start after the fixed part of the command, end at the
/// first NUL (or the end of the command), be non-blank and valid UTF-8.
fn command_string(cmd: &[u8], offset: u32, fixed_size: usize) -> Option<&str> {
    let offset = offset as usize;
    if offset < fixed_size || offset >= cmd.len() {
        return None;
    }
    let bytes = until_nul(&cmd[offset..]);
    if bytes.is_empty() || is_blank(bytes) {
        return None;
    }
    std::str::from_utf8(bytes).ok()
}

impl LoadCommandScan {
    /// Walks `ncmds` load commands in `buf`.
    ///
    /// # Errors
    ///
    /// Structural problems ([`Error::InvalidLoadCommand`],
    /// [`Error::TooManySections`]) and contradictions inside the image are
    /// always fatal. Malformed fields are fatal unless
    /// [`Leniency::INVALID_FIELDS`] is set.
    pub fn scan(
        buf: &[u8],
        ncmds: u32,
        endian: Endian,
        options: &ParseOptions,
    ) -> Result<Self> {
        let mut scan = Self::default();
        let mut offset = 0usize;
        let mut size_left = buf.len();

        for _ in 0..ncmds {
            if size_left < LoadCommand::SIZE {
                return Err(Error::InvalidLoadCommand { offset });
            }
            let lc: LoadCommand =
                read_struct(buf, offset, endian).ok_or(Error::InvalidLoadCommand { offset })?;

            let cmdsize = lc.cmdsize as usize;
            if cmdsize < LoadCommand::SIZE || cmdsize > size_left {
                return Err(Error::InvalidLoadCommand { offset });
            }

            trace!("load command {:#x} at {offset:#x} ({cmdsize} bytes)", lc.cmd);

            let cmd = &buf[offset..offset + cmdsize];
            let result = scan.command(lc.cmd, cmd, offset, endian, options);
            recover(options, offset, result)?;

            offset += cmdsize;
            size_left -= cmdsize;
        }

        Ok(scan)
    }

    fn command(
        &mut self,
        kind: u32,
        cmd: &[u8],
        offset: usize,
        endian: Endian,
        options: &ParseOptions,
    ) -> Result<()> {
        match kind {
            LC_ID_DYLIB => self.id_dylib(cmd, endian, options),
            LC_REEXPORT_DYLIB if options.wants(IgnoreFields::REEXPORTS) => {
                let dylib: DylibCommand =
                    read_struct(cmd, 0, endian).ok_or(Error::InvalidReexport)?;
                let name = command_string(cmd, dylib.name_offset, DylibCommand::SIZE)
                    .ok_or(Error::InvalidReexport)?;
                self.reexports.push(name.to_owned());
                Ok(())
            }
            LC_SUB_CLIENT if options.wants(IgnoreFields::CLIENTS) => {
                let sub: SubCommand = read_struct(cmd, 0, endian).ok_or(Error::InvalidClient)?;
                let name =
                    command_string(cmd, sub.offset, SubCommand::SIZE).ok_or(Error::InvalidClient)?;
                self.clients.push(name.to_owned());
                Ok(())
            }
            LC_SUB_FRAMEWORK if options.wants(IgnoreFields::PARENT_UMBRELLA) => {
                let sub: SubCommand =
                    read_struct(cmd, 0, endian).ok_or(Error::InvalidParentUmbrella)?;
                let name = command_string(cmd, sub.offset, SubCommand::SIZE)
                    .ok_or(Error::InvalidParentUmbrella)?;
                match &self.parent_umbrella {
                    Some(existing) if existing != name => Err(Error::ConflictingParentUmbrella),
                    Some(_) => Ok(()),
                    None => {
                        self.parent_umbrella = Some(name.to_owned());
                        Ok(())
                    }
                }
            }
            LC_SEGMENT | LC_SEGMENT_64 if options.wants_objc_image_info() => {
                self.segment(cmd, offset, kind == LC_SEGMENT_64, endian)
            }
            LC_SYMTAB if options.wants(IgnoreFields::SYMBOLS) => {
                let symtab: SymtabCommand =
                    read_struct(cmd, 0, endian).ok_or(Error::InvalidSymbolTable)?;
                match self.symtab {
                    Some(existing) if existing != symtab => Err(Error::InvalidSymbolTable),
                    _ => {
                        self.symtab = Some(symtab);
                        Ok(())
                    }
                }
            }
            LC_UUID if options.wants(IgnoreFields::UUID) => {
                let uuid: UuidCommand = read_struct(cmd, 0, endian).ok_or(Error::InvalidUuid)?;
                match self.uuid {
                    Some(existing) if existing != uuid.uuid => Err(Error::ConflictingUuid),
                    _ => {
                        self.uuid = Some(uuid.uuid);
                        Ok(())
                    }
                }
            }
            LC_BUILD_VERSION if options.wants(IgnoreFields::PLATFORM) => {
                let build: BuildVersionCommand =
                    read_struct(cmd, 0, endian).ok_or(Error::InvalidPlatform)?;
                let platform =
                    Platform::from_build_version(build.platform).ok_or(Error::InvalidPlatform)?;
                self.add_platform(platform)
            }
            LC_VERSION_MIN_MACOSX | LC_VERSION_MIN_IPHONEOS | LC_VERSION_MIN_TVOS
            | LC_VERSION_MIN_WATCHOS
                if options.wants(IgnoreFields::PLATFORM) =>
            {
                let _: VersionMinCommand =
                    read_struct(cmd, 0, endian).ok_or(Error::InvalidPlatform)?;
                let platform = Platform::from_version_min(kind).ok_or(Error::InvalidPlatform)?;
                self.add_platform(platform)
            }
            _ => Ok(()),
        }
    }

    fn id_dylib(&mut self, cmd: &[u8], endian: Endian, options: &ParseOptions) -> Result<()> {
        let dylib: DylibCommand = read_struct(cmd, 0, endian).ok_or(Error::InvalidInstallName)?;

        let install_name = if options.wants(IgnoreFields::INSTALL_NAME) {
            let name = command_string(cmd, dylib.name_offset, DylibCommand::SIZE)
                .ok_or(Error::InvalidInstallName)?;
            Some(name.to_owned())
        } else {
            None
        };

        let identification = Identification {
            install_name,
            current_version: PackedVersion(dylib.current_version),
            compatibility_version: PackedVersion(dylib.compatibility_version),
        };

        match &self.identification {
            Some(existing) if *existing != identification => Err(Error::ConflictingIdentification),
            Some(_) => Ok(()),
            None => {
                self.identification = Some(identification);
                Ok(())
            }
        }
    }

    fn add_platform(&mut self, platform: Platform) -> Result<()> {
        let combined = match self.platform {
            Some(existing) => existing.combine(platform).ok_or(Error::ConflictingPlatform)?,
            None => platform,
        };
        self.platform = Some(combined);
        Ok(())
    }

    /// Records the ObjC image info sections of an ObjC data segment.
    fn segment(&mut self, cmd: &[u8], offset: usize, is_64: bool, endian: Endian) -> Result<()> {
        let (segname, nsects, header_size, section_size) = if is_64 {
            let segment: SegmentCommand64 =
                read_struct(cmd, 0, endian).ok_or(Error::InvalidLoadCommand { offset })?;
            (segment.segname, segment.nsects, SegmentCommand64::SIZE, Section64::SIZE)
        } else {
            let segment: SegmentCommand =
                read_struct(cmd, 0, endian).ok_or(Error::InvalidLoadCommand { offset })?;
            (segment.segname, segment.nsects, SegmentCommand::SIZE, Section::SIZE)
        };

        if !OBJC_SEGMENTS.contains(&fixed_name(&segname)) {
            return Ok(());
        }

        let sections_size =
            checked_table_size(nsects, section_size).ok_or(Error::TooManySections(nsects))?;
        if sections_size as usize > cmd.len() - header_size {
            return Err(Error::TooManySections(nsects));
        }

        for index in 0..nsects as usize {
            let position = header_size + index * section_size;
            let section: SectionHeader = if is_64 {
                read_struct::<Section64>(cmd, position, endian).map(Into::into)
            } else {
                read_struct::<Section>(cmd, position, endian).map(Into::into)
            }
            .ok_or(Error::TooManySections(nsects))?;

            if !OBJC_IMAGE_INFO_SECTIONS.contains(&section.name()) {
                continue;
            }
            if section.size != ObjcImageInfo::SIZE as u64 {
                return Err(Error::InvalidSection);
            }
            self.objc_sections.push(section);
        }

        Ok(())
    }
}

// =============================================================================
// Image Parsing
// =============================================================================

/// ObjC facts read from an image info section.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ObjcFacts {
    constraint: ObjcConstraint,
    swift_version: u8,
}

fn read_objc_facts<S: Source + ?Sized>(
    source: &mut S,
    image: &ThinImage,
    section: &SectionHeader,
) -> Result<ObjcFacts> {
    let offset = section.offset as u64;
    if !image.data.contains(offset, ObjcImageInfo::SIZE as u64) {
        return Err(Error::InvalidSection);
    }
    let absolute = image.data.absolute(offset).ok_or(Error::InvalidSection)?;
    let bytes = read_array_at::<S, { ObjcImageInfo::SIZE }>(source, absolute)?;
    let info: ObjcImageInfo = read_struct(&bytes, 0, image.endian).ok_or(Error::InvalidSection)?;

    let flags = ObjcImageFlags::from_bits_retain(info.flags);
    Ok(ObjcFacts {
        constraint: ObjcConstraint::from_image_flags(flags),
        swift_version: flags.swift_version(),
    })
}

/// Reads every located ObjC image info section, requiring them to agree.
fn collect_objc_facts<S: Source + ?Sized>(
    source: &mut S,
    image: &ThinImage,
    sections: &[SectionHeader],
    options: &ParseOptions,
) -> Result<Option<ObjcFacts>> {
    let mut facts: Option<ObjcFacts> = None;

    for section in sections {
        let found = match read_objc_facts(source, image, section) {
            Ok(found) => found,
            Err(err) => {
                recover(options, section.offset as usize, Err(err))?;
                continue;
            }
        };

        if let Some(existing) = facts {
            if existing.constraint != found.constraint {
                return Err(Error::ConflictingObjcConstraint);
            }
            if existing.swift_version != found.swift_version {
                return Err(Error::ConflictingSwiftVersion);
            }
        }
        facts = Some(found);
    }

    Ok(facts)
}

/// Parses one image into `info`.
///
/// Returns the `LC_SYMTAB` command when `mode` is [`SymtabMode::Defer`] and
/// symbols are wanted; the caller is then responsible for decoding it (and
/// for the "no exports" check).
pub fn parse_thin<S: Source + ?Sized>(
    info: &mut CreateInfo,
    source: &mut S,
    image: &ThinImage,
    options: &ParseOptions,
    mode: SymtabMode,
) -> Result<Option<SymtabCommand>> {
    let header = &image.header;
    let header_size = image.header_size();
    debug!("parsing {} image at {:#x}: {header}", image.arch, image.image.start);

    if header.ncmds == 0 {
        return Err(Error::NoLoadCommands);
    }
    if header.sizeofcmds < LoadCommand::SIZE as u32 {
        return Err(Error::LoadCommandsAreaTooSmall(header.sizeofcmds));
    }

    let too_many = Error::TooManyLoadCommands {
        ncmds: header.ncmds,
        sizeofcmds: header.sizeofcmds,
    };
    match checked_table_size(header.ncmds, LoadCommand::SIZE) {
        Some(minimum) if minimum <= header.sizeofcmds => {}
        _ => return Err(too_many),
    }
    if let Some(size) = image.image.size {
        let available = size.checked_sub(header_size as u64).ok_or(Error::SizeTooSmall {
            needed: header_size as u64,
            available: size,
        })?;
        if header.sizeofcmds as u64 > available {
            return Err(too_many);
        }
    }

    let commands_offset = image
        .image
        .absolute(header_size as u64)
        .ok_or(Error::InvalidLoadCommand { offset: 0 })?;
    let commands = read_vec_at(source, commands_offset, header.sizeofcmds as usize)?;
    let scan = LoadCommandScan::scan(&commands, header.ncmds, image.endian, options)?;
    drop(commands);

    if scan.identification.is_none() && !options.allows(Leniency::MISSING_IDENTIFICATION) {
        return Err(Error::NoIdentification);
    }
    if options.wants(IgnoreFields::SYMBOLS)
        && scan.symtab.is_none()
        && !options.allows(Leniency::MISSING_SYMBOL_TABLE)
    {
        return Err(Error::NoSymbolTable);
    }
    if options.wants(IgnoreFields::UUID)
        && scan.uuid.is_none()
        && !options.allows(Leniency::MISSING_UUID)
    {
        return Err(Error::NoUuid);
    }

    let objc = collect_objc_facts(source, image, &scan.objc_sections, options)?;

    merge_scan(info, image, &scan, objc, options)?;

    let symtab = match scan.symtab {
        Some(symtab) if options.wants(IgnoreFields::SYMBOLS) => symtab,
        _ => return Ok(None),
    };

    match mode {
        SymtabMode::Defer => Ok(Some(symtab)),
        SymtabMode::Parse => {
            parse_symbol_table(info, source, image, &symtab, options)?;
            if info.exports.is_empty() {
                return Err(Error::NoExports);
            }
            Ok(None)
        }
    }
}

/// Applies the reconciliation rules to fold one image's scan into `info`.
fn merge_scan(
    info: &mut CreateInfo,
    image: &ThinImage,
    scan: &LoadCommandScan,
    objc: Option<ObjcFacts>,
    options: &ParseOptions,
) -> Result<()> {
    let arch = image.arch;
    info.add_arch(arch)?;

    if options.wants(IgnoreFields::FLAGS) {
        info.merge_header_flags(image.header.flags)?;
    }

    if let Some(identification) = &scan.identification {
        if let Some(name) = &identification.install_name {
            info.set_install_name(name)?;
        }
        if options.wants(IgnoreFields::CURRENT_VERSION) {
            info.set_current_version(identification.current_version)?;
        }
        if options.wants(IgnoreFields::COMPATIBILITY_VERSION) {
            info.set_compatibility_version(identification.compatibility_version)?;
        }
    }

    if let Some(umbrella) = &scan.parent_umbrella {
        info.set_parent_umbrella(umbrella)?;
    }

    if let Some(platform) = scan.platform {
        info.set_platform(platform)?;
    }

    if let Some(facts) = objc {
        if options.wants(IgnoreFields::OBJC_CONSTRAINT) {
            info.set_objc_constraint(facts.constraint)?;
        }
        if options.wants(IgnoreFields::SWIFT_VERSION) {
            info.set_swift_version(facts.swift_version)?;
        }
    }

    if let Some(uuid) = scan.uuid {
        info.add_uuid(arch, uuid, options.allows(Leniency::NON_UNIQUE_UUIDS))?;
    }

    for client in &scan.clients {
        info.add_export(arch.bit(), ExportKind::Client, client)?;
    }
    for reexport in &scan.reexports {
        info.add_export(arch.bit(), ExportKind::Reexport, reexport)?;
    }

    Ok(())
}
