//! The per-output aggregate and its reconciliation rules.
//!
//! Scalars are first-writer-wins: the first slice to report a value sets it,
//! and every later slice must report the same value. Collections merge by
//! OR-ing arch bits.

use tracing::trace;

use super::{ExportKind, Exports, ObjcConstraint, PackedVersion, Platform, TbdFlags, TbdVersion};
use crate::arch::{archs_in, Arch};
use crate::error::{Error, Result};

/// The UUID of one slice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UuidInfo {
    /// Slice architecture
    pub arch: Arch,
    /// 128-bit UUID
    pub uuid: [u8; 16],
}

/// Everything collected for one `.tbd` file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CreateInfo {
    /// Target format version
    pub version: TbdVersion,
    /// Arch bits of every parsed slice
    pub archs: u64,
    /// Build platform
    pub platform: Option<Platform>,
    /// ObjC memory model
    pub objc_constraint: Option<ObjcConstraint>,
    /// Install name from `LC_ID_DYLIB`
    pub install_name: Option<String>,
    /// Umbrella framework from `LC_SUB_FRAMEWORK`
    pub parent_umbrella: Option<String>,
    /// Current version from `LC_ID_DYLIB`
    pub current_version: Option<PackedVersion>,
    /// Compatibility version from `LC_ID_DYLIB`
    pub compatibility_version: Option<PackedVersion>,
    /// Swift ABI version from the ObjC image info
    pub swift_version: Option<u8>,
    /// Header flags of the first slice
    pub flags_field: Option<u32>,
    /// Flags derived from the header
    pub flags: TbdFlags,
    /// Clients, re-exports and symbols
    pub exports: Exports,
    /// One UUID per slice
    pub uuids: Vec<UuidInfo>,
}

/// Sets `slot` to `value` if unset, otherwise requires equality.
pub(crate) fn set_or_check<T: PartialEq>(slot: &mut Option<T>, value: T, conflict: Error) -> Result<()> {
    match slot {
        Some(existing) if *existing != value => Err(conflict),
        Some(_) => Ok(()),
        None => {
            *slot = Some(value);
            Ok(())
        }
    }
}

impl CreateInfo {
    /// Creates an empty aggregate for the given format version.
    pub fn new(version: TbdVersion) -> Self {
        Self {
            version,
            ..Self::default()
        }
    }

    /// Returns true if `arch` has already contributed.
    #[inline]
    pub fn has_arch(&self, arch: Arch) -> bool {
        self.archs & arch.bit() != 0
    }

    /// Iterates the architectures that contributed, in table order.
    pub fn arch_list(&self) -> impl Iterator<Item = Arch> {
        archs_in(self.archs)
    }

    /// Records a new slice architecture.
    ///
    /// # Errors
    ///
    /// [`Error::MultipleArchsForCputype`] if the architecture was already added.
    pub fn add_arch(&mut self, arch: Arch) -> Result<()> {
        if self.has_arch(arch) {
            return Err(Error::MultipleArchsForCputype(arch.name()));
        }
        self.archs |= arch.bit();
        Ok(())
    }

    /// Records the header flags of a slice.
    pub fn merge_header_flags(&mut self, header_flags: u32) -> Result<()> {
        let derived = TbdFlags::from_header_flags(header_flags);
        match self.flags_field {
            None => {
                self.flags_field = Some(header_flags);
                self.flags = derived;
                Ok(())
            }
            Some(_) if self.flags != derived => Err(Error::ConflictingFlags),
            Some(_) => Ok(()),
        }
    }

    /// Records the UUID of a slice.
    ///
    /// # Errors
    ///
    /// [`Error::ConflictingUuid`] if another slice already has this UUID and
    /// `allow_duplicates` is false.
    pub fn add_uuid(&mut self, arch: Arch, uuid: [u8; 16], allow_duplicates: bool) -> Result<()> {
        if !allow_duplicates && self.uuids.iter().any(|info| info.uuid == uuid) {
            return Err(Error::ConflictingUuid);
        }
        self.uuids.try_reserve(1).map_err(|_| Error::ArrayFail)?;
        self.uuids.push(UuidInfo { arch, uuid });
        Ok(())
    }

    /// Records the platform of a slice.
    pub fn set_platform(&mut self, platform: Platform) -> Result<()> {
        set_or_check(&mut self.platform, platform, Error::ConflictingPlatform)
    }

    /// Records the install name of a slice.
    pub fn set_install_name(&mut self, name: &str) -> Result<()> {
        match &self.install_name {
            Some(existing) if existing != name => Err(Error::ConflictingIdentification),
            Some(_) => Ok(()),
            None => {
                self.install_name = Some(name.to_owned());
                Ok(())
            }
        }
    }

    /// Records the current version of a slice.
    pub fn set_current_version(&mut self, version: PackedVersion) -> Result<()> {
        set_or_check(&mut self.current_version, version, Error::ConflictingIdentification)
    }

    /// Records the compatibility version of a slice.
    pub fn set_compatibility_version(&mut self, version: PackedVersion) -> Result<()> {
        set_or_check(&mut self.compatibility_version, version, Error::ConflictingIdentification)
    }

    /// Records the parent umbrella of a slice.
    pub fn set_parent_umbrella(&mut self, umbrella: &str) -> Result<()> {
        match &self.parent_umbrella {
            Some(existing) if existing != umbrella => Err(Error::ConflictingParentUmbrella),
            Some(_) => Ok(()),
            None => {
                self.parent_umbrella = Some(umbrella.to_owned());
                Ok(())
            }
        }
    }

    /// Records the ObjC constraint of a slice.
    pub fn set_objc_constraint(&mut self, constraint: ObjcConstraint) -> Result<()> {
        set_or_check(&mut self.objc_constraint, constraint, Error::ConflictingObjcConstraint)
    }

    /// Records the Swift version of a slice. Zero means "no Swift" and is ignored.
    pub fn set_swift_version(&mut self, version: u8) -> Result<()> {
        if version == 0 {
            return Ok(());
        }
        set_or_check(&mut self.swift_version, version, Error::ConflictingSwiftVersion)
    }

    /// Adds an export for the given arch bits.
    pub fn add_export(&mut self, archs: u64, kind: ExportKind, string: &str) -> Result<()> {
        trace!("export {kind} {string:?} archs={archs:#x}");
        self.exports.insert(archs, kind, string)
    }
}
