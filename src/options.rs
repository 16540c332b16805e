//! Parse configuration.
//!
//! A [`ParseOptions`] value is passed by reference into every parser entry
//! point. There is no global state.

use bitflags::bitflags;

use crate::tbd::TbdVersion;

bitflags! {
    /// Fields the parser should not collect.
    ///
    /// An ignored field is neither read nor validated, so a malformed or
    /// contradictory value in it cannot fail the parse.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct IgnoreFields: u32 {
        /// `LC_SUB_CLIENT` commands
        const CLIENTS = 1 << 0;
        /// Compatibility version from `LC_ID_DYLIB`
        const COMPATIBILITY_VERSION = 1 << 1;
        /// Current version from `LC_ID_DYLIB`
        const CURRENT_VERSION = 1 << 2;
        /// Header flags
        const FLAGS = 1 << 3;
        /// Install name from `LC_ID_DYLIB`
        const INSTALL_NAME = 1 << 4;
        /// ObjC constraint from the image info section
        const OBJC_CONSTRAINT = 1 << 5;
        /// `LC_SUB_FRAMEWORK`
        const PARENT_UMBRELLA = 1 << 6;
        /// `LC_BUILD_VERSION` and `LC_VERSION_MIN_*`
        const PLATFORM = 1 << 7;
        /// `LC_REEXPORT_DYLIB`
        const REEXPORTS = 1 << 8;
        /// Swift version from the image info section
        const SWIFT_VERSION = 1 << 9;
        /// The symbol table
        const SYMBOLS = 1 << 10;
        /// `LC_UUID`
        const UUID = 1 << 11;
    }
}

bitflags! {
    /// Non-external symbol kinds admitted into the exports.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct PrivateSymbols: u32 {
        /// Plain symbols
        const NORMAL = 1 << 0;
        /// Weak definitions
        const WEAK_DEF = 1 << 1;
        /// ObjC classes
        const OBJC_CLASS = 1 << 2;
        /// ObjC instance variables
        const OBJC_IVAR = 1 << 3;
    }
}

bitflags! {
    /// Conditions downgraded from errors to warnings.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Leniency: u32 {
        /// Skip load commands with malformed fields instead of failing
        const INVALID_FIELDS = 1 << 0;
        /// Accept images without `LC_ID_DYLIB`
        const MISSING_IDENTIFICATION = 1 << 1;
        /// Accept images without `LC_SYMTAB`
        const MISSING_SYMBOL_TABLE = 1 << 2;
        /// Accept images without `LC_UUID`
        const MISSING_UUID = 1 << 3;
        /// Accept slices that share a UUID
        const NON_UNIQUE_UUIDS = 1 << 4;
    }
}

/// Options controlling a parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ParseOptions {
    /// Fields to skip
    pub ignore: IgnoreFields,
    /// Private symbol kinds to admit
    pub private_symbols: PrivateSymbols,
    /// Tolerated defects
    pub leniency: Leniency,
    /// Target `.tbd` version recorded in the result
    pub version: TbdVersion,
}

impl ParseOptions {
    /// Creates the default options: collect everything, external symbols only, strict.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the ignored fields.
    pub fn with_ignore(mut self, ignore: IgnoreFields) -> Self {
        self.ignore = ignore;
        self
    }

    /// Sets the admitted private symbol kinds.
    pub fn with_private_symbols(mut self, private_symbols: PrivateSymbols) -> Self {
        self.private_symbols = private_symbols;
        self
    }

    /// Sets the leniency flags.
    pub fn with_leniency(mut self, leniency: Leniency) -> Self {
        self.leniency = leniency;
        self
    }

    /// Sets the `.tbd` version.
    pub fn with_version(mut self, version: TbdVersion) -> Self {
        self.version = version;
        self
    }

    /// Returns true if `field` should be collected.
    #[inline]
    pub fn wants(&self, field: IgnoreFields) -> bool {
        !self.ignore.intersects(field)
    }

    /// Returns true if `leniency` is enabled.
    #[inline]
    pub fn allows(&self, leniency: Leniency) -> bool {
        self.leniency.contains(leniency)
    }

    /// Returns true if the segment walk for the ObjC image info is needed.
    #[inline]
    pub fn wants_objc_image_info(&self) -> bool {
        self.wants(IgnoreFields::OBJC_CONSTRAINT) || self.wants(IgnoreFields::SWIFT_VERSION)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_collects_everything() {
        let options = ParseOptions::default();
        assert!(options.wants(IgnoreFields::SYMBOLS));
        assert!(options.wants_objc_image_info());
        assert!(!options.allows(Leniency::INVALID_FIELDS));
        assert!(options.private_symbols.is_empty());
        assert_eq!(options.version, TbdVersion::V2);
    }

    #[test]
    fn test_builders() {
        let options = ParseOptions::new()
            .with_ignore(IgnoreFields::OBJC_CONSTRAINT | IgnoreFields::SWIFT_VERSION)
            .with_leniency(Leniency::MISSING_UUID)
            .with_private_symbols(PrivateSymbols::WEAK_DEF)
            .with_version(TbdVersion::V3);

        assert!(!options.wants_objc_image_info());
        assert!(options.allows(Leniency::MISSING_UUID));
        assert!(!options.allows(Leniency::MISSING_UUID | Leniency::INVALID_FIELDS));
        assert_eq!(options.version, TbdVersion::V3);
    }
}
