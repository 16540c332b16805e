//! The static architecture table.
//!
//! Every Mach-O slice is identified by a `(cputype, cpusubtype)` pair. The
//! position of that pair in [`ARCH_INFO_TABLE`] is its *arch bit*: a
//! [`CreateInfo`](crate::tbd::CreateInfo) records the architectures it covers
//! as a `u64` with bit `index` set for each one.

use std::fmt;

use crate::macho::constants::*;

/// Static description of one architecture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArchInfo {
    /// Mach-O CPU type
    pub cputype: u32,
    /// Mach-O CPU subtype (capability bits cleared)
    pub cpusubtype: u32,
    /// Name used in `.tbd` files and on the command line
    pub name: &'static str,
}

const fn arch(cputype: u32, cpusubtype: u32, name: &'static str) -> ArchInfo {
    ArchInfo { cputype, cpusubtype, name }
}

/// All known architectures, in arch-bit order.
///
/// The order is part of the output format: reordering entries changes every
/// `archs` bitmask this crate produces.
pub static ARCH_INFO_TABLE: [ArchInfo; 59] = [
    arch(CPU_TYPE_ANY, CPU_SUBTYPE_MULTIPLE, "any"),
    arch(CPU_TYPE_ANY, CPU_SUBTYPE_LITTLE_ENDIAN, "little"),
    arch(CPU_TYPE_ANY, CPU_SUBTYPE_BIG_ENDIAN, "big"),
    // Motorola
    arch(CPU_TYPE_MC680X0, 1, "m68k"),
    arch(CPU_TYPE_MC680X0, 2, "m68040"),
    arch(CPU_TYPE_MC680X0, 3, "m68030"),
    // 32-bit Intel
    arch(CPU_TYPE_X86, 3, "i386"),
    arch(CPU_TYPE_X86, 4, "i486"),
    arch(CPU_TYPE_X86, 0x84, "i486SX"),
    arch(CPU_TYPE_X86, 5, "pentium"),
    arch(CPU_TYPE_X86, 0x16, "pentpro"),
    arch(CPU_TYPE_X86, 0x36, "pentIIm3"),
    arch(CPU_TYPE_X86, 0x56, "pentIIm5"),
    arch(CPU_TYPE_X86, 0x08, "pentium3"),
    arch(CPU_TYPE_X86, 0x09, "pentium-m"),
    arch(CPU_TYPE_X86, 0x0A, "pentium4"),
    arch(CPU_TYPE_X86, 0x0C, "xeon"),
    // HP-PA
    arch(CPU_TYPE_HPPA, 0, "hppa"),
    arch(CPU_TYPE_HPPA, 1, "hppa7100LC"),
    // 32-bit ARM
    arch(CPU_TYPE_ARM, 0, "arm"),
    arch(CPU_TYPE_ARM, 5, "armv4t"),
    arch(CPU_TYPE_ARM, 6, "armv6"),
    arch(CPU_TYPE_ARM, 7, "armv5"),
    arch(CPU_TYPE_ARM, 8, "xscale"),
    arch(CPU_TYPE_ARM, CPU_SUBTYPE_ARM_V7, "armv7"),
    arch(CPU_TYPE_ARM, 10, "armv7f"),
    arch(CPU_TYPE_ARM, 11, "armv7s"),
    arch(CPU_TYPE_ARM, 12, "armv7k"),
    arch(CPU_TYPE_ARM, 13, "armv8"),
    arch(CPU_TYPE_ARM, 14, "armv6m"),
    arch(CPU_TYPE_ARM, 15, "armv7m"),
    arch(CPU_TYPE_ARM, 16, "armv7em"),
    // Others
    arch(CPU_TYPE_MC88000, 0, "m88k"),
    arch(CPU_TYPE_SPARC, 0, "sparc"),
    arch(CPU_TYPE_I860, 0, "i860"),
    // 32-bit PowerPC
    arch(CPU_TYPE_POWERPC, 0, "ppc"),
    arch(CPU_TYPE_POWERPC, 1, "ppc601"),
    arch(CPU_TYPE_POWERPC, 2, "ppc602"),
    arch(CPU_TYPE_POWERPC, 3, "ppc603"),
    arch(CPU_TYPE_POWERPC, 4, "ppc603e"),
    arch(CPU_TYPE_POWERPC, 5, "ppc603ev"),
    arch(CPU_TYPE_POWERPC, 6, "ppc604"),
    arch(CPU_TYPE_POWERPC, 7, "ppc604e"),
    arch(CPU_TYPE_POWERPC, 8, "ppc620"),
    arch(CPU_TYPE_POWERPC, 9, "ppc750"),
    arch(CPU_TYPE_POWERPC, 10, "ppc7400"),
    arch(CPU_TYPE_POWERPC, 11, "ppc7450"),
    arch(CPU_TYPE_POWERPC, 100, "ppc970"),
    arch(CPU_TYPE_VEO, 1, "veo1"),
    arch(CPU_TYPE_VEO, 2, "veo2"),
    arch(CPU_TYPE_VEO, 3, "veo3"),
    arch(CPU_TYPE_VEO, 4, "veo4"),
    // 64-bit
    arch(CPU_TYPE_X86_64, CPU_SUBTYPE_X86_64_ALL, "x86_64"),
    arch(CPU_TYPE_X86_64, CPU_SUBTYPE_X86_64_H, "x86_64h"),
    arch(CPU_TYPE_ARM64, CPU_SUBTYPE_ARM64_ALL, "arm64"),
    arch(CPU_TYPE_ARM64, CPU_SUBTYPE_ARM64E, "arm64e"),
    arch(CPU_TYPE_POWERPC64, 0, "ppc64"),
    arch(CPU_TYPE_POWERPC64, 100, "ppc970-64"),
    arch(CPU_TYPE_ARM64_32, 1, "arm64_32"),
];

/// A handle to one entry of [`ARCH_INFO_TABLE`].
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Arch(u8);

impl Arch {
    /// Returns the arch for a table index, if it exists.
    #[inline]
    pub fn from_index(index: usize) -> Option<Self> {
        (index < ARCH_INFO_TABLE.len()).then(|| Self(index as u8))
    }

    /// Looks up a `(cputype, cpusubtype)` pair as found in a Mach-O or fat header.
    ///
    /// Capability bits in the upper byte of `cpusubtype` are ignored.
    pub fn for_cputype(cputype: u32, cpusubtype: u32) -> Option<Self> {
        // CPU_SUBTYPE_MULTIPLE is all ones, so the unmasked value is tried too.
        let masked = cpusubtype & !CPU_SUBTYPE_MASK;
        ARCH_INFO_TABLE
            .iter()
            .position(|info| {
                info.cputype == cputype
                    && (info.cpusubtype == cpusubtype || info.cpusubtype == masked)
            })
            .map(|index| Self(index as u8))
    }

    /// Looks up an architecture by its name (`x86_64`, `armv7s`, ...).
    pub fn for_name(name: &str) -> Option<Self> {
        ARCH_INFO_TABLE
            .iter()
            .position(|info| info.name == name)
            .map(|index| Self(index as u8))
    }

    /// Returns the table index.
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }

    /// Returns the static entry.
    #[inline]
    pub fn info(self) -> &'static ArchInfo {
        &ARCH_INFO_TABLE[self.index()]
    }

    /// Returns the architecture name.
    #[inline]
    pub fn name(self) -> &'static str {
        self.info().name
    }

    /// Returns the arch bit (`1 << index`).
    #[inline]
    pub fn bit(self) -> u64 {
        1u64 << self.0
    }

    /// Returns the CPU type.
    #[inline]
    pub fn cputype(self) -> u32 {
        self.info().cputype
    }

    /// Returns the CPU subtype.
    #[inline]
    pub fn cpusubtype(self) -> u32 {
        self.info().cpusubtype
    }
}

impl fmt::Debug for Arch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Arch({})", self.name())
    }
}

impl fmt::Display for Arch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Looks up the table entry for a `(cputype, cpusubtype)` pair.
pub fn arch_info_for_cputype(cputype: u32, cpusubtype: u32) -> Option<&'static ArchInfo> {
    Arch::for_cputype(cputype, cpusubtype).map(Arch::info)
}

/// Looks up the table entry for an architecture name.
pub fn arch_info_for_name(name: &str) -> Option<&'static ArchInfo> {
    Arch::for_name(name).map(Arch::info)
}

/// Iterates the architectures whose bits are set in `archs`, in table order.
pub fn archs_in(archs: u64) -> impl Iterator<Item = Arch> {
    (0..ARCH_INFO_TABLE.len())
        .filter(move |&index| archs & (1u64 << index) != 0)
        .map(|index| Arch(index as u8))
}
