//! The `.tbd` data model.
//!
//! Parsing produces a [`CreateInfo`]: one logical stub descriptor gathered
//! from every slice of a file (or one shared-cache image). Its fields map
//! one-to-one onto the keys a `.tbd` writer emits.

mod create_info;
mod exports;

pub use create_info::{CreateInfo, UuidInfo};
pub use exports::{ExportFlags, ExportInfo, ExportKind, Exports};

use std::fmt;

use bitflags::bitflags;

use crate::macho::constants::*;

// =============================================================================
// Versions
// =============================================================================

/// Version of the `.tbd` format to produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum TbdVersion {
    /// `--- !tapi-tbd-v1` (no header tag in practice)
    V1,
    /// `--- !tapi-tbd-v2`
    #[default]
    V2,
    /// `--- !tapi-tbd-v3`
    V3,
}

impl TbdVersion {
    /// Parses `v1`, `v2` or `v3`.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "v1" => Some(TbdVersion::V1),
            "v2" => Some(TbdVersion::V2),
            "v3" => Some(TbdVersion::V3),
            _ => None,
        }
    }
}

impl fmt::Display for TbdVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TbdVersion::V1 => "v1",
            TbdVersion::V2 => "v2",
            TbdVersion::V3 => "v3",
        })
    }
}

/// A version packed as `xxxx.yy.zz` in a `u32`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PackedVersion(pub u32);

impl PackedVersion {
    /// Major component.
    #[inline]
    pub fn major(self) -> u32 {
        self.0 >> 16
    }

    /// Minor component.
    #[inline]
    pub fn minor(self) -> u32 {
        (self.0 >> 8) & 0xFF
    }

    /// Patch component.
    #[inline]
    pub fn patch(self) -> u32 {
        self.0 & 0xFF
    }
}

impl fmt::Display for PackedVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.major())?;
        if self.minor() != 0 || self.patch() != 0 {
            write!(f, ".{}", self.minor())?;
        }
        if self.patch() != 0 {
            write!(f, ".{}", self.patch())?;
        }
        Ok(())
    }
}

// =============================================================================
// Platform
// =============================================================================

/// Platform an image was built for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Platform {
    /// macOS
    MacOs,
    /// iOS
    Ios,
    /// tvOS
    TvOs,
    /// watchOS
    WatchOs,
    /// bridgeOS
    BridgeOs,
    /// Mac Catalyst
    MacCatalyst,
    /// iOS simulator
    IosSimulator,
    /// tvOS simulator
    TvOsSimulator,
    /// watchOS simulator
    WatchOsSimulator,
    /// DriverKit
    DriverKit,
    /// macOS and Mac Catalyst in one image
    Zippered,
}

impl Platform {
    /// Maps an `LC_BUILD_VERSION` platform value.
    pub fn from_build_version(platform: u32) -> Option<Self> {
        Some(match platform {
            1 => Platform::MacOs,
            2 => Platform::Ios,
            3 => Platform::TvOs,
            4 => Platform::WatchOs,
            5 => Platform::BridgeOs,
            6 => Platform::MacCatalyst,
            7 => Platform::IosSimulator,
            8 => Platform::TvOsSimulator,
            9 => Platform::WatchOsSimulator,
            10 => Platform::DriverKit,
            _ => return None,
        })
    }

    /// Maps an `LC_VERSION_MIN_*` command type.
    pub fn from_version_min(cmd: u32) -> Option<Self> {
        match cmd {
            LC_VERSION_MIN_MACOSX => Some(Platform::MacOs),
            LC_VERSION_MIN_IPHONEOS => Some(Platform::Ios),
            LC_VERSION_MIN_TVOS => Some(Platform::TvOs),
            LC_VERSION_MIN_WATCHOS => Some(Platform::WatchOs),
            _ => None,
        }
    }

    /// Combines two platform commands seen in the same image.
    ///
    /// Returns `None` if they contradict each other.
    pub fn combine(self, other: Platform) -> Option<Platform> {
        use Platform::*;
        match (self, other) {
            (a, b) if a == b => Some(a),
            (MacOs, MacCatalyst) | (MacCatalyst, MacOs) => Some(Zippered),
            (Zippered, MacOs | MacCatalyst) | (MacOs | MacCatalyst, Zippered) => Some(Zippered),
            _ => None,
        }
    }

    /// Returns the name used in `.tbd` files.
    pub fn name(self) -> &'static str {
        match self {
            Platform::MacOs => "macosx",
            Platform::Ios => "ios",
            Platform::TvOs => "tvos",
            Platform::WatchOs => "watchos",
            Platform::BridgeOs => "bridgeos",
            Platform::MacCatalyst => "maccatalyst",
            Platform::IosSimulator => "ios-simulator",
            Platform::TvOsSimulator => "tvos-simulator",
            Platform::WatchOsSimulator => "watchos-simulator",
            Platform::DriverKit => "driverkit",
            Platform::Zippered => "zippered",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// =============================================================================
// ObjC Constraint
// =============================================================================

/// Objective-C memory management model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjcConstraint {
    /// Manual or automatic reference counting
    RetainRelease,
    /// Reference counting or garbage collection
    RetainReleaseOrGc,
    /// Reference counting, built for a simulator
    RetainReleaseForSimulator,
    /// Garbage collection only
    Gc,
}

impl ObjcConstraint {
    /// Derives the constraint from `objc_image_info.flags`.
    pub fn from_image_flags(flags: ObjcImageFlags) -> Self {
        if flags.contains(ObjcImageFlags::SUPPORTS_GC) {
            if flags.contains(ObjcImageFlags::REQUIRES_GC) {
                ObjcConstraint::Gc
            } else {
                ObjcConstraint::RetainReleaseOrGc
            }
        } else if flags.contains(ObjcImageFlags::IS_SIMULATED) {
            ObjcConstraint::RetainReleaseForSimulator
        } else {
            ObjcConstraint::RetainRelease
        }
    }

    /// Returns the name used in `.tbd` files.
    pub fn name(self) -> &'static str {
        match self {
            ObjcConstraint::RetainRelease => "retain_release",
            ObjcConstraint::RetainReleaseOrGc => "retain_release_or_gc",
            ObjcConstraint::RetainReleaseForSimulator => "retain_release_for_simulator",
            ObjcConstraint::Gc => "gc",
        }
    }
}

impl fmt::Display for ObjcConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// =============================================================================
// Flags
// =============================================================================

bitflags! {
    /// Flags written to the `flags` key of a `.tbd`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct TbdFlags: u32 {
        /// The image uses a flat namespace
        const FLAT_NAMESPACE = 1 << 0;
        /// The image is not safe for use in app extensions
        const NOT_APP_EXTENSION_SAFE = 1 << 1;
    }
}

impl TbdFlags {
    /// Derives the flags from a Mach-O header's `flags` field.
    pub fn from_header_flags(flags: u32) -> Self {
        let flags = MachOFlags::from_bits_retain(flags);
        let mut result = TbdFlags::empty();
        if !flags.contains(MachOFlags::TWOLEVEL) {
            result |= TbdFlags::FLAT_NAMESPACE;
        }
        if !flags.contains(MachOFlags::APP_EXTENSION_SAFE) {
            result |= TbdFlags::NOT_APP_EXTENSION_SAFE;
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_packed_version_display() {
        assert_eq!(PackedVersion(0x0001_0203).to_string(), "1.2.3");
        assert_eq!(PackedVersion(0x0001_0200).to_string(), "1.2");
        assert_eq!(PackedVersion(0x0001_0000).to_string(), "1");
        assert_eq!(PackedVersion(0x04D2_0003).to_string(), "1234.0.3");
    }

    #[test]
    fn test_platform_range() {
        assert_eq!(Platform::from_build_version(1), Some(Platform::MacOs));
        assert_eq!(Platform::from_build_version(10), Some(Platform::DriverKit));
        assert_eq!(Platform::from_build_version(0), None);
        assert_eq!(Platform::from_build_version(11), None);
    }

    #[test]
    fn test_platform_combine() {
        assert_eq!(Platform::Ios.combine(Platform::Ios), Some(Platform::Ios));
        assert_eq!(Platform::MacOs.combine(Platform::MacCatalyst), Some(Platform::Zippered));
        assert_eq!(Platform::Zippered.combine(Platform::MacOs), Some(Platform::Zippered));
        assert_eq!(Platform::Ios.combine(Platform::MacOs), None);
    }

    #[test]
    fn test_objc_constraint() {
        let from = |bits| ObjcConstraint::from_image_flags(ObjcImageFlags::from_bits_retain(bits));
        assert_eq!(from(0), ObjcConstraint::RetainRelease);
        assert_eq!(from(1 << 1), ObjcConstraint::RetainReleaseOrGc);
        assert_eq!(from((1 << 1) | (1 << 2)), ObjcConstraint::Gc);
        assert_eq!(from(1 << 5), ObjcConstraint::RetainReleaseForSimulator);
        assert_eq!(from((1 << 5) | (1 << 1)), ObjcConstraint::RetainReleaseOrGc);
    }

    #[test]
    fn test_tbd_flags() {
        assert_eq!(
            TbdFlags::from_header_flags(0),
            TbdFlags::FLAT_NAMESPACE | TbdFlags::NOT_APP_EXTENSION_SAFE
        );
        assert_eq!(TbdFlags::from_header_flags(0x0200_0080), TbdFlags::empty());
    }
}
