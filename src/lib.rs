//! tbdex - Mach-O and dyld shared cache parsing for `.tbd` stub generation.
//!
//! This library reads thin Mach-O files, fat (universal) containers and
//! images inside a dyld shared cache, and collects everything a text-based
//! stub needs into a single [`CreateInfo`]: architectures, platform,
//! identification, ObjC and Swift facts, UUIDs, clients, re-exports and
//! exported symbols.
//!
//! All parsers work on any `Read + Seek` source and never trust a size or
//! offset field before bounds-checking it.
//!
//! # Example
//!
//! ```no_run
//! use std::fs::File;
//! use tbdex::{parse_macho, CreateInfo, ParseOptions};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut file = File::open("/usr/lib/libSystem.B.dylib")?;
//!     let options = ParseOptions::default();
//!
//!     let mut info = CreateInfo::new(options.version);
//!     parse_macho(&mut info, &mut file, &options)?;
//!
//!     println!("{:?} exports {} symbols", info.install_name, info.exports.len());
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod arch;
pub mod dyld;
pub mod error;
pub mod macho;
pub mod options;
pub mod source;
pub mod tbd;
pub mod util;

// Re-export main types
pub use arch::Arch;
pub use dyld::{iterate_shared_cache_images, parse_shared_cache_image, ImageInfo, SharedCacheInfo};
pub use error::{Error, Result};
pub use macho::parse_macho;
pub use options::{IgnoreFields, Leniency, ParseOptions, PrivateSymbols};
pub use tbd::{CreateInfo, ExportKind, PackedVersion, Platform, TbdVersion};
