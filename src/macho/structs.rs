//! Mach-O and fat binary structures.
//!
//! These structures match the on-disk format of Mach-O files. Each is decoded
//! with [`read_struct`](crate::util::read_struct), which copies it out of a
//! validated buffer and swaps it to host byte order when needed.

use std::fmt;

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::util::{fixed_name, impl_byte_swap};

// =============================================================================
// Header Structures
// =============================================================================

/// Mach-O header.
///
/// The 64-bit header is this structure followed by a reserved `u32`, so the
/// same type serves both word sizes; use [`MachHeader::size_for`] to find
/// where the load commands begin.
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct MachHeader {
    /// Magic number
    pub magic: u32,
    /// CPU type
    pub cputype: u32,
    /// CPU subtype
    pub cpusubtype: u32,
    /// File type
    pub filetype: u32,
    /// Number of load commands
    pub ncmds: u32,
    /// Size of load commands
    pub sizeofcmds: u32,
    /// Flags
    pub flags: u32,
}

impl MachHeader {
    /// Size of the 32-bit header in bytes.
    pub const SIZE: usize = 28;
    /// Size of the 64-bit header in bytes.
    pub const SIZE_64: usize = 32;

    /// Returns the header size for the word size.
    #[inline]
    pub const fn size_for(is_64: bool) -> usize {
        if is_64 {
            Self::SIZE_64
        } else {
            Self::SIZE
        }
    }
}

impl_byte_swap!(MachHeader { magic, cputype, cpusubtype, filetype, ncmds, sizeofcmds, flags });

/// Fat header. Always followed by `nfat_arch` arch descriptors.
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct FatHeader {
    /// FAT_MAGIC or FAT_MAGIC_64
    pub magic: u32,
    /// Number of arch descriptors that follow
    pub nfat_arch: u32,
}

impl FatHeader {
    /// Size of the fat header.
    pub const SIZE: usize = 8;
}

impl_byte_swap!(FatHeader { magic, nfat_arch });

/// Fat arch descriptor with 32-bit offsets.
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct FatArch {
    /// CPU type
    pub cputype: u32,
    /// CPU subtype
    pub cpusubtype: u32,
    /// File offset of the slice
    pub offset: u32,
    /// Size of the slice
    pub size: u32,
    /// Alignment as a power of 2
    pub align: u32,
}

impl FatArch {
    /// Size of the descriptor.
    pub const SIZE: usize = 20;
}

impl_byte_swap!(FatArch { cputype, cpusubtype, offset, size, align });

/// Fat arch descriptor with 64-bit offsets.
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct FatArch64 {
    /// CPU type
    pub cputype: u32,
    /// CPU subtype
    pub cpusubtype: u32,
    /// File offset of the slice
    pub offset: u64,
    /// Size of the slice
    pub size: u64,
    /// Alignment as a power of 2
    pub align: u32,
    /// Reserved
    pub reserved: u32,
}

impl FatArch64 {
    /// Size of the descriptor.
    pub const SIZE: usize = 32;
}

impl_byte_swap!(FatArch64 { cputype, cpusubtype, offset, size, align, reserved });

impl From<FatArch> for FatArch64 {
    fn from(arch: FatArch) -> Self {
        Self {
            cputype: arch.cputype,
            cpusubtype: arch.cpusubtype,
            offset: arch.offset as u64,
            size: arch.size as u64,
            align: arch.align,
            reserved: 0,
        }
    }
}

// =============================================================================
// Load Command Header
// =============================================================================

/// Generic load command header.
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct LoadCommand {
    /// Type of load command
    pub cmd: u32,
    /// Size of load command
    pub cmdsize: u32,
}

impl LoadCommand {
    /// Size of the load command header.
    pub const SIZE: usize = 8;
}

impl_byte_swap!(LoadCommand { cmd, cmdsize });

// =============================================================================
// Segment Commands
// =============================================================================

/// 32-bit segment command.
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct SegmentCommand {
    /// LC_SEGMENT
    pub cmd: u32,
    /// Size of this load command including sections
    pub cmdsize: u32,
    /// Segment name (16 bytes, null-padded)
    pub segname: [u8; 16],
    /// Virtual memory address
    pub vmaddr: u32,
    /// Virtual memory size
    pub vmsize: u32,
    /// File offset
    pub fileoff: u32,
    /// Amount of file to map
    pub filesize: u32,
    /// Maximum VM protection
    pub maxprot: u32,
    /// Initial VM protection
    pub initprot: u32,
    /// Number of sections
    pub nsects: u32,
    /// Flags
    pub flags: u32,
}

impl SegmentCommand {
    /// Size of the segment command (without sections).
    pub const SIZE: usize = 56;
}

impl_byte_swap!(SegmentCommand {
    cmd, cmdsize, vmaddr, vmsize, fileoff, filesize, maxprot, initprot, nsects, flags
});

/// 64-bit segment command.
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct SegmentCommand64 {
    /// LC_SEGMENT_64
    pub cmd: u32,
    /// Size of this load command including sections
    pub cmdsize: u32,
    /// Segment name (16 bytes, null-padded)
    pub segname: [u8; 16],
    /// Virtual memory address
    pub vmaddr: u64,
    /// Virtual memory size
    pub vmsize: u64,
    /// File offset
    pub fileoff: u64,
    /// Amount of file to map
    pub filesize: u64,
    /// Maximum VM protection
    pub maxprot: u32,
    /// Initial VM protection
    pub initprot: u32,
    /// Number of sections
    pub nsects: u32,
    /// Flags
    pub flags: u32,
}

impl SegmentCommand64 {
    /// Size of the segment command (without sections).
    pub const SIZE: usize = 72;
}

impl_byte_swap!(SegmentCommand64 {
    cmd, cmdsize, vmaddr, vmsize, fileoff, filesize, maxprot, initprot, nsects, flags
});

/// 32-bit section header.
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct Section {
    /// Section name
    pub sectname: [u8; 16],
    /// Segment name
    pub segname: [u8; 16],
    /// Virtual memory address
    pub addr: u32,
    /// Size in bytes
    pub size: u32,
    /// File offset
    pub offset: u32,
    /// Alignment as a power of 2
    pub align: u32,
    /// File offset of relocation entries
    pub reloff: u32,
    /// Number of relocation entries
    pub nreloc: u32,
    /// Flags (section type and attributes)
    pub flags: u32,
    /// Reserved
    pub reserved1: u32,
    /// Reserved
    pub reserved2: u32,
}

impl Section {
    /// Size of the section header.
    pub const SIZE: usize = 68;
}

impl_byte_swap!(Section { addr, size, offset, align, reloff, nreloc, flags, reserved1, reserved2 });

/// 64-bit section header.
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct Section64 {
    /// Section name
    pub sectname: [u8; 16],
    /// Segment name
    pub segname: [u8; 16],
    /// Virtual memory address
    pub addr: u64,
    /// Size in bytes
    pub size: u64,
    /// File offset
    pub offset: u32,
    /// Alignment as a power of 2
    pub align: u32,
    /// File offset of relocation entries
    pub reloff: u32,
    /// Number of relocation entries
    pub nreloc: u32,
    /// Flags (section type and attributes)
    pub flags: u32,
    /// Reserved
    pub reserved1: u32,
    /// Reserved
    pub reserved2: u32,
    /// Reserved
    pub reserved3: u32,
}

impl Section64 {
    /// Size of the section header.
    pub const SIZE: usize = 80;
}

impl_byte_swap!(Section64 {
    addr, size, offset, align, reloff, nreloc, flags, reserved1, reserved2, reserved3
});

/// The word-size independent parts of a section header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SectionHeader {
    /// Section name
    pub sectname: [u8; 16],
    /// Segment name
    pub segname: [u8; 16],
    /// File offset
    pub offset: u32,
    /// Size in bytes
    pub size: u64,
}

impl SectionHeader {
    /// Returns the section name bytes without padding.
    pub fn name(&self) -> &[u8] {
        fixed_name(&self.sectname)
    }
}

impl From<Section> for SectionHeader {
    fn from(section: Section) -> Self {
        Self {
            sectname: section.sectname,
            segname: section.segname,
            offset: section.offset,
            size: section.size as u64,
        }
    }
}

impl From<Section64> for SectionHeader {
    fn from(section: Section64) -> Self {
        Self {
            sectname: section.sectname,
            segname: section.segname,
            offset: section.offset,
            size: section.size,
        }
    }
}

// =============================================================================
// Symbol Table
// =============================================================================

/// Symbol table command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromBytes, IntoBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct SymtabCommand {
    /// LC_SYMTAB
    pub cmd: u32,
    /// sizeof(SymtabCommand)
    pub cmdsize: u32,
    /// Symbol table offset
    pub symoff: u32,
    /// Number of symbol table entries
    pub nsyms: u32,
    /// String table offset
    pub stroff: u32,
    /// String table size in bytes
    pub strsize: u32,
}

impl SymtabCommand {
    /// Size of the command.
    pub const SIZE: usize = 24;
}

impl_byte_swap!(SymtabCommand { cmd, cmdsize, symoff, nsyms, stroff, strsize });

/// 32-bit symbol table entry.
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct Nlist {
    /// Index into the string table
    pub n_strx: u32,
    /// Type flag
    pub n_type: u8,
    /// Section number or NO_SECT
    pub n_sect: u8,
    /// Description
    pub n_desc: u16,
    /// Value of this symbol
    pub n_value: u32,
}

impl Nlist {
    /// Size of the entry.
    pub const SIZE: usize = 12;
}

impl_byte_swap!(Nlist { n_strx, n_desc, n_value });

/// 64-bit symbol table entry.
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct Nlist64 {
    /// Index into the string table
    pub n_strx: u32,
    /// Type flag
    pub n_type: u8,
    /// Section number or NO_SECT
    pub n_sect: u8,
    /// Description
    pub n_desc: u16,
    /// Value of this symbol
    pub n_value: u64,
}

impl Nlist64 {
    /// Size of the entry.
    pub const SIZE: usize = 16;
}

impl_byte_swap!(Nlist64 { n_strx, n_desc, n_value });

// =============================================================================
// Dylib Commands
// =============================================================================

/// Dylib command (`LC_ID_DYLIB`, `LC_REEXPORT_DYLIB`, ...).
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct DylibCommand {
    /// Command type
    pub cmd: u32,
    /// Command size including the name
    pub cmdsize: u32,
    /// Offset of the name from the start of the command
    pub name_offset: u32,
    /// Timestamp
    pub timestamp: u32,
    /// Current version (packed xxxx.yy.zz)
    pub current_version: u32,
    /// Compatibility version (packed xxxx.yy.zz)
    pub compatibility_version: u32,
}

impl DylibCommand {
    /// Size of the command without the name.
    pub const SIZE: usize = 24;
}

impl_byte_swap!(DylibCommand {
    cmd, cmdsize, name_offset, timestamp, current_version, compatibility_version
});

/// Command carrying a single string (`LC_SUB_CLIENT`, `LC_SUB_FRAMEWORK`).
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct SubCommand {
    /// Command type
    pub cmd: u32,
    /// Command size including the string
    pub cmdsize: u32,
    /// Offset of the string from the start of the command
    pub offset: u32,
}

impl SubCommand {
    /// Size of the command without the string.
    pub const SIZE: usize = 12;
}

impl_byte_swap!(SubCommand { cmd, cmdsize, offset });

// =============================================================================
// Identification Commands
// =============================================================================

/// UUID command.
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct UuidCommand {
    /// LC_UUID
    pub cmd: u32,
    /// sizeof(UuidCommand)
    pub cmdsize: u32,
    /// 128-bit UUID
    pub uuid: [u8; 16],
}

impl UuidCommand {
    /// Size of the command.
    pub const SIZE: usize = 24;
}

impl_byte_swap!(UuidCommand { cmd, cmdsize });

/// Minimum OS version command (`LC_VERSION_MIN_*`).
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct VersionMinCommand {
    /// Command type
    pub cmd: u32,
    /// sizeof(VersionMinCommand)
    pub cmdsize: u32,
    /// Minimum OS version
    pub version: u32,
    /// SDK version
    pub sdk: u32,
}

impl VersionMinCommand {
    /// Size of the command.
    pub const SIZE: usize = 16;
}

impl_byte_swap!(VersionMinCommand { cmd, cmdsize, version, sdk });

/// Build version command.
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct BuildVersionCommand {
    /// LC_BUILD_VERSION
    pub cmd: u32,
    /// Size including tool entries
    pub cmdsize: u32,
    /// Platform
    pub platform: u32,
    /// Minimum OS version
    pub minos: u32,
    /// SDK version
    pub sdk: u32,
    /// Number of tool entries that follow
    pub ntools: u32,
}

impl BuildVersionCommand {
    /// Size of the command without tool entries.
    pub const SIZE: usize = 24;
}

impl_byte_swap!(BuildVersionCommand { cmd, cmdsize, platform, minos, sdk, ntools });

// =============================================================================
// Objective-C
// =============================================================================

/// Contents of the `__objc_imageinfo` section.
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct ObjcImageInfo {
    /// Version (always 0)
    pub version: u32,
    /// Flags, including the Swift ABI version
    pub flags: u32,
}

impl ObjcImageInfo {
    /// Size of the section payload.
    pub const SIZE: usize = 8;
}

impl_byte_swap!(ObjcImageInfo { version, flags });

// =============================================================================
// Display Implementations
// =============================================================================

impl fmt::Display for MachHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "MachHeader {{ cputype: {:#x}, cpusubtype: {:#x}, ncmds: {}, sizeofcmds: {:#x}, flags: {:#x} }}",
            self.cputype, self.cpusubtype, self.ncmds, self.sizeofcmds, self.flags
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::{read_struct, Endian};

    #[test]
    fn test_struct_sizes() {
        assert_eq!(std::mem::size_of::<MachHeader>(), MachHeader::SIZE);
        assert_eq!(std::mem::size_of::<FatArch>(), FatArch::SIZE);
        assert_eq!(std::mem::size_of::<FatArch64>(), FatArch64::SIZE);
        assert_eq!(std::mem::size_of::<SegmentCommand>(), SegmentCommand::SIZE);
        assert_eq!(std::mem::size_of::<SegmentCommand64>(), SegmentCommand64::SIZE);
        assert_eq!(std::mem::size_of::<Section>(), Section::SIZE);
        assert_eq!(std::mem::size_of::<Section64>(), Section64::SIZE);
        assert_eq!(std::mem::size_of::<SymtabCommand>(), SymtabCommand::SIZE);
        assert_eq!(std::mem::size_of::<Nlist>(), Nlist::SIZE);
        assert_eq!(std::mem::size_of::<Nlist64>(), Nlist64::SIZE);
        assert_eq!(std::mem::size_of::<DylibCommand>(), DylibCommand::SIZE);
        assert_eq!(std::mem::size_of::<SubCommand>(), SubCommand::SIZE);
        assert_eq!(std::mem::size_of::<UuidCommand>(), UuidCommand::SIZE);
        assert_eq!(std::mem::size_of::<VersionMinCommand>(), VersionMinCommand::SIZE);
        assert_eq!(std::mem::size_of::<BuildVersionCommand>(), BuildVersionCommand::SIZE);
        assert_eq!(std::mem::size_of::<ObjcImageInfo>(), ObjcImageInfo::SIZE);
    }

    #[test]
    fn test_big_endian_decode() {
        let bytes = [
            0x00, 0x00, 0x00, 0x0C, // cputype
            0x00, 0x00, 0x00, 0x09, // cpusubtype
            0x00, 0x00, 0x10, 0x00, // offset
            0x00, 0x00, 0x20, 0x00, // size
            0x00, 0x00, 0x00, 0x0E, // align
        ];
        let arch: FatArch = read_struct(&bytes, 0, Endian::Big).unwrap();
        assert_eq!(arch.cputype, 12);
        assert_eq!(arch.cpusubtype, 9);
        assert_eq!(arch.offset, 0x1000);
        assert_eq!(arch.size, 0x2000);
        assert!(read_struct::<FatArch>(&bytes[1..], 0, Endian::Big).is_none());
    }

    #[test]
    fn test_nlist_swap_keeps_single_bytes() {
        let mut bytes = [0u8; 12];
        bytes[..4].copy_from_slice(&7u32.to_be_bytes());
        bytes[4] = 0x0F;
        bytes[5] = 1;
        bytes[6..8].copy_from_slice(&0x0080u16.to_be_bytes());
        let nlist: Nlist = read_struct(&bytes, 0, Endian::Big).unwrap();
        assert_eq!(nlist.n_strx, 7);
        assert_eq!(nlist.n_type, 0x0F);
        assert_eq!(nlist.n_sect, 1);
        assert_eq!(nlist.n_desc, 0x0080);
    }
}
