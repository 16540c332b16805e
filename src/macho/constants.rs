//! Mach-O constants and flags.

use bitflags::bitflags;

// =============================================================================
// Magic Numbers
// =============================================================================

/// 32-bit Mach-O magic (native byte order)
pub const MH_MAGIC: u32 = 0xFEEDFACE;
/// 32-bit Mach-O magic (swapped)
pub const MH_CIGAM: u32 = 0xCEFAEDFE;
/// 64-bit Mach-O magic (native byte order)
pub const MH_MAGIC_64: u32 = 0xFEEDFACF;
/// 64-bit Mach-O magic (swapped)
pub const MH_CIGAM_64: u32 = 0xCFFAEDFE;

/// Fat magic with 32-bit arch entries (native byte order)
pub const FAT_MAGIC: u32 = 0xCAFEBABE;
/// Fat magic with 32-bit arch entries (swapped; how it reads on little-endian hosts)
pub const FAT_CIGAM: u32 = 0xBEBAFECA;
/// Fat magic with 64-bit arch entries (native byte order)
pub const FAT_MAGIC_64: u32 = 0xCAFEBABF;
/// Fat magic with 64-bit arch entries (swapped)
pub const FAT_CIGAM_64: u32 = 0xBFBAFECA;

// =============================================================================
// CPU Types
// =============================================================================

/// 64-bit architecture flag
pub const CPU_ARCH_ABI64: u32 = 0x0100_0000;
/// ILP32 on 64-bit hardware flag
pub const CPU_ARCH_ABI64_32: u32 = 0x0200_0000;

/// Matches any CPU type
pub const CPU_TYPE_ANY: u32 = u32::MAX;
/// Motorola 68k
pub const CPU_TYPE_MC680X0: u32 = 6;
/// x86 CPU type
pub const CPU_TYPE_X86: u32 = 7;
/// x86_64 CPU type
pub const CPU_TYPE_X86_64: u32 = CPU_TYPE_X86 | CPU_ARCH_ABI64;
/// HP PA-RISC
pub const CPU_TYPE_HPPA: u32 = 11;
/// ARM CPU type
pub const CPU_TYPE_ARM: u32 = 12;
/// ARM64 CPU type
pub const CPU_TYPE_ARM64: u32 = CPU_TYPE_ARM | CPU_ARCH_ABI64;
/// ARM64 with 32-bit pointers
pub const CPU_TYPE_ARM64_32: u32 = CPU_TYPE_ARM | CPU_ARCH_ABI64_32;
/// Motorola 88k
pub const CPU_TYPE_MC88000: u32 = 13;
/// SPARC
pub const CPU_TYPE_SPARC: u32 = 14;
/// Intel i860
pub const CPU_TYPE_I860: u32 = 15;
/// PowerPC
pub const CPU_TYPE_POWERPC: u32 = 18;
/// 64-bit PowerPC
pub const CPU_TYPE_POWERPC64: u32 = CPU_TYPE_POWERPC | CPU_ARCH_ABI64;
/// VEO
pub const CPU_TYPE_VEO: u32 = 255;

// =============================================================================
// CPU Subtypes
// =============================================================================

/// Capability bits in the upper byte of a subtype
pub const CPU_SUBTYPE_MASK: u32 = 0xFF00_0000;
/// 64-bit libraries capability bit
pub const CPU_SUBTYPE_LIB64: u32 = 0x8000_0000;

/// Any subtype
pub const CPU_SUBTYPE_MULTIPLE: u32 = u32::MAX;
/// Little-endian (with `CPU_TYPE_ANY`)
pub const CPU_SUBTYPE_LITTLE_ENDIAN: u32 = 0;
/// Big-endian (with `CPU_TYPE_ANY`)
pub const CPU_SUBTYPE_BIG_ENDIAN: u32 = 1;

/// ARMv7
pub const CPU_SUBTYPE_ARM_V7: u32 = 9;
/// x86_64 all
pub const CPU_SUBTYPE_X86_64_ALL: u32 = 3;
/// x86_64 Haswell
pub const CPU_SUBTYPE_X86_64_H: u32 = 8;
/// ARM64 all
pub const CPU_SUBTYPE_ARM64_ALL: u32 = 0;
/// ARM64e (pointer authentication)
pub const CPU_SUBTYPE_ARM64E: u32 = 2;

// =============================================================================
// Load Commands
// =============================================================================

/// Load command requiring dynamic linker
pub const LC_REQ_DYLD: u32 = 0x8000_0000;

/// Segment of this file
pub const LC_SEGMENT: u32 = 0x1;
/// Link-edit symbol table info
pub const LC_SYMTAB: u32 = 0x2;
/// Dynamically linked shared lib identification
pub const LC_ID_DYLIB: u32 = 0xD;
/// Sub framework
pub const LC_SUB_FRAMEWORK: u32 = 0x12;
/// Sub client
pub const LC_SUB_CLIENT: u32 = 0x14;
/// 64-bit segment
pub const LC_SEGMENT_64: u32 = 0x19;
/// UUID
pub const LC_UUID: u32 = 0x1B;
/// Load and re-export dylib
pub const LC_REEXPORT_DYLIB: u32 = 0x1F | LC_REQ_DYLD;
/// Build for macOS min version
pub const LC_VERSION_MIN_MACOSX: u32 = 0x24;
/// Build for iOS min version
pub const LC_VERSION_MIN_IPHONEOS: u32 = 0x25;
/// Build for tvOS min version
pub const LC_VERSION_MIN_TVOS: u32 = 0x2F;
/// Build for watchOS min version
pub const LC_VERSION_MIN_WATCHOS: u32 = 0x30;
/// Build for platform min version
pub const LC_BUILD_VERSION: u32 = 0x32;

// =============================================================================
// Build Version Platforms
// =============================================================================

/// macOS
pub const PLATFORM_MACOS: u32 = 1;
/// Mac Catalyst
pub const PLATFORM_MACCATALYST: u32 = 6;
/// DriverKit (highest value accepted)
pub const PLATFORM_DRIVERKIT: u32 = 10;

// =============================================================================
// Symbol Types
// =============================================================================

/// If any of these bits set, a symbolic debugging entry
pub const N_STAB: u8 = 0xE0;
/// Private external symbol bit
pub const N_PEXT: u8 = 0x10;
/// Mask for the type bits
pub const N_TYPE: u8 = 0x0E;
/// External symbol bit
pub const N_EXT: u8 = 0x01;

/// Undefined symbol
pub const N_UNDF: u8 = 0x0;
/// Prebound undefined
pub const N_PBUD: u8 = 0xC;

/// Weak definition (n_desc)
pub const N_WEAK_DEF: u16 = 0x0080;

// =============================================================================
// Objective-C
// =============================================================================

/// Segments that may hold the ObjC image info section
pub const OBJC_SEGMENTS: [&[u8]; 4] = [b"__DATA", b"__DATA_DIRTY", b"__DATA_CONST", b"__OBJC"];
/// Sections that hold the ObjC image info
pub const OBJC_IMAGE_INFO_SECTIONS: [&[u8]; 2] = [b"__objc_imageinfo", b"__image_info"];

bitflags! {
    /// Flags word of `objc_image_info`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ObjcImageFlags: u32 {
        /// Image supports garbage collection
        const SUPPORTS_GC = 1 << 1;
        /// Image requires garbage collection
        const REQUIRES_GC = 1 << 2;
        /// Image was built for a simulator
        const IS_SIMULATED = 1 << 5;

        const _ = !0;
    }
}

impl ObjcImageFlags {
    /// Returns the Swift ABI version packed into bits 8..16.
    #[inline]
    pub fn swift_version(self) -> u8 {
        ((self.bits() >> 8) & 0xFF) as u8
    }
}

// =============================================================================
// Header Flags
// =============================================================================

bitflags! {
    /// Mach-O header flags consulted when building a `.tbd`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct MachOFlags: u32 {
        /// The image is using two-level name space bindings
        const TWOLEVEL = 0x80;
        /// The code was linked for use in an application extension
        const APP_EXTENSION_SAFE = 0x2000000;

        const _ = !0;
    }
}
