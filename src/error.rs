//! Error types for Mach-O, fat and shared cache parsing.
//!
//! Every layer (magic sniffing, fat containers, load commands, symbol tables
//! and the dyld shared cache) reports failures through the single [`Error`]
//! enum below, so a caller can map each kind to its own diagnostic without
//! translation tables in between.

use thiserror::Error;

/// The main error type for parsing operations.
#[derive(Error, Debug)]
pub enum Error {
    // ==================== I/O Errors ====================
    #[error("failed to seek to offset {offset:#x}: {source}")]
    SeekFail {
        offset: u64,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read {len} bytes: {source}")]
    ReadFail {
        len: usize,
        #[source]
        source: std::io::Error,
    },

    // ==================== Structural Errors ====================
    #[error("file is not a Mach-O")]
    NotAMachO,

    #[error("fat files are not supported here")]
    FatNotSupported,

    #[error("file is too small (need {needed} bytes, have {available})")]
    SizeTooSmall { needed: u64, available: u64 },

    #[error("fat file has no architectures")]
    NoArchitectures,

    #[error("fat file declares too many architectures ({0})")]
    TooManyArchitectures(u32),

    #[error("fat file has overlapping architectures")]
    OverlappingArchitectures,

    #[error("invalid architecture (cputype {cputype:#x}, cpusubtype {cpusubtype:#x})")]
    InvalidArchitecture { cputype: u32, cpusubtype: u32 },

    #[error("Mach-O has no load commands")]
    NoLoadCommands,

    #[error("Mach-O declares too many load commands ({ncmds} in {sizeofcmds} bytes)")]
    TooManyLoadCommands { ncmds: u32, sizeofcmds: u32 },

    #[error("load command area is too small ({0} bytes)")]
    LoadCommandsAreaTooSmall(u32),

    #[error("invalid load command at offset {offset:#x}")]
    InvalidLoadCommand { offset: usize },

    #[error("segment declares too many sections ({0})")]
    TooManySections(u32),

    #[error("invalid section")]
    InvalidSection,

    // ==================== Semantic Field Errors ====================
    #[error("invalid sub-client")]
    InvalidClient,

    #[error("invalid install name")]
    InvalidInstallName,

    #[error("invalid parent umbrella")]
    InvalidParentUmbrella,

    #[error("invalid platform")]
    InvalidPlatform,

    #[error("invalid re-export")]
    InvalidReexport,

    #[error("invalid symbol table")]
    InvalidSymbolTable,

    #[error("invalid uuid")]
    InvalidUuid,

    // ==================== Contradiction Errors ====================
    #[error("Mach-O architecture conflicts with its container")]
    ConflictingArchInfo,

    #[error("header flags conflict between architectures")]
    ConflictingFlags,

    #[error("identification (install name or versions) conflicts between architectures")]
    ConflictingIdentification,

    #[error("objc constraint conflicts between architectures")]
    ConflictingObjcConstraint,

    #[error("parent umbrella conflicts between architectures")]
    ConflictingParentUmbrella,

    #[error("platform conflicts between architectures")]
    ConflictingPlatform,

    #[error("swift version conflicts between architectures")]
    ConflictingSwiftVersion,

    #[error("uuid is not unique")]
    ConflictingUuid,

    #[error("architecture '{0}' appears more than once")]
    MultipleArchsForCputype(&'static str),

    // ==================== Completeness Errors ====================
    #[error("Mach-O has no identification (LC_ID_DYLIB)")]
    NoIdentification,

    #[error("Mach-O has no symbol table")]
    NoSymbolTable,

    #[error("Mach-O has no uuid")]
    NoUuid,

    #[error("Mach-O has no exports")]
    NoExports,

    // ==================== Resource Errors ====================
    #[error("failed to allocate {0} bytes")]
    AllocFail(usize),

    #[error("failed to grow export list")]
    ArrayFail,

    // ==================== Shared Cache Errors ====================
    #[error("file is not a dyld shared cache")]
    NotASharedCache,

    #[error("unsupported shared cache architecture {0:?}")]
    UnsupportedCacheArch(String),

    #[error("invalid shared cache mappings")]
    InvalidMappings,

    #[error("shared cache has overlapping mappings")]
    OverlappingMappings,

    #[error("invalid shared cache image table")]
    InvalidImages,

    #[error("address {address:#x} has no corresponding mapping")]
    NoCorrespondingMapping { address: u64 },

    #[error("invalid image path at offset {offset:#x}")]
    InvalidImagePath { offset: u64 },
}

/// A specialized Result type for parsing operations.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Returns true if this error describes a single malformed field that the
    /// "ignore invalid fields" option may skip over.
    ///
    /// Structural, I/O and contradiction errors are never recoverable.
    #[inline]
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::InvalidClient
                | Error::InvalidInstallName
                | Error::InvalidParentUmbrella
                | Error::InvalidPlatform
                | Error::InvalidReexport
                | Error::InvalidSymbolTable
                | Error::InvalidUuid
                | Error::InvalidSection
        )
    }

    /// Creates a read error.
    #[inline]
    pub fn read_fail(len: usize, source: std::io::Error) -> Self {
        Error::ReadFail { len, source }
    }

    /// Creates a seek error.
    #[inline]
    pub fn seek_fail(offset: u64, source: std::io::Error) -> Self {
        Error::SeekFail { offset, source }
    }
}
