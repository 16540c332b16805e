//! tbdex - Inspect the `.tbd` information of Mach-O files and shared caches.

use std::fs::File;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{anyhow, bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use memmap2::Mmap;
use tracing::{error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use tbdex::arch::archs_in;
use tbdex::util::uuid_to_string;
use tbdex::{
    iterate_shared_cache_images, parse_macho, parse_shared_cache_image, CreateInfo, ExportKind,
    IgnoreFields, ImageInfo, Leniency, ParseOptions, PrivateSymbols, SharedCacheInfo, TbdVersion,
};

/// Collects `.tbd` stub information from Mach-O files and dyld shared caches.
#[derive(Parser, Debug)]
#[command(name = "tbdex")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Verbosity level (0=errors, 1=warnings, 2=info, 3=debug)
    #[arg(short, long, default_value = "1", global = true)]
    verbosity: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Parse a thin or fat Mach-O file
    Parse {
        /// Path to the Mach-O file
        file: PathBuf,

        /// Print every export instead of a count per kind
        #[arg(short, long)]
        exports: bool,

        #[command(flatten)]
        options: OptionArgs,
    },

    /// List the images of a shared cache
    List {
        /// Filter images by path substring
        #[arg(short, long)]
        filter: Option<String>,

        /// Show image addresses
        #[arg(short = 'A', long)]
        addresses: bool,

        /// Path to the dyld shared cache
        cache: PathBuf,
    },

    /// Parse every (matching) image of a shared cache
    Cache {
        /// Filter images by path substring
        #[arg(short, long)]
        filter: Option<String>,

        /// Print every export instead of a count per kind
        #[arg(short, long)]
        exports: bool,

        #[command(flatten)]
        options: OptionArgs,

        /// Path to the dyld shared cache
        cache: PathBuf,
    },
}

/// Flags shared by the parsing commands.
#[derive(Args, Debug, Clone)]
struct OptionArgs {
    /// Don't collect clients
    #[arg(long)]
    ignore_clients: bool,

    /// Don't collect the compatibility version
    #[arg(long)]
    ignore_compatibility_version: bool,

    /// Don't collect the current version
    #[arg(long)]
    ignore_current_version: bool,

    /// Don't collect header flags
    #[arg(long)]
    ignore_flags: bool,

    /// Don't collect the install name
    #[arg(long)]
    ignore_install_name: bool,

    /// Don't collect the ObjC constraint
    #[arg(long)]
    ignore_objc_constraint: bool,

    /// Don't collect the parent umbrella
    #[arg(long)]
    ignore_parent_umbrella: bool,

    /// Don't collect the platform
    #[arg(long)]
    ignore_platform: bool,

    /// Don't collect re-exports
    #[arg(long)]
    ignore_reexports: bool,

    /// Don't collect the Swift version
    #[arg(long)]
    ignore_swift_version: bool,

    /// Don't collect symbols
    #[arg(long)]
    ignore_symbols: bool,

    /// Don't collect UUIDs
    #[arg(long)]
    ignore_uuids: bool,

    /// Admit private normal symbols
    #[arg(long)]
    allow_private_normal_symbols: bool,

    /// Admit private weak definitions
    #[arg(long)]
    allow_private_weak_symbols: bool,

    /// Admit private ObjC classes
    #[arg(long)]
    allow_private_objc_classes: bool,

    /// Admit private ObjC ivars
    #[arg(long)]
    allow_private_objc_ivars: bool,

    /// Warn about and skip malformed fields
    #[arg(long)]
    ignore_invalid_fields: bool,

    /// Accept images without LC_ID_DYLIB
    #[arg(long)]
    ignore_missing_identification: bool,

    /// Accept images without LC_SYMTAB
    #[arg(long)]
    ignore_missing_symbol_table: bool,

    /// Accept images without LC_UUID
    #[arg(long)]
    ignore_missing_uuid: bool,

    /// Accept the same UUID on several slices
    #[arg(long)]
    ignore_non_unique_uuids: bool,

    /// Version of the .tbd format (v1, v2, v3)
    #[arg(long, default_value = "v2")]
    tbd_version: String,
}

impl OptionArgs {
    fn to_options(&self) -> Result<ParseOptions> {
        let version = TbdVersion::from_name(&self.tbd_version)
            .ok_or_else(|| anyhow!("Unknown .tbd version: {}", self.tbd_version))?;

        let mut ignore = IgnoreFields::empty();
        ignore.set(IgnoreFields::CLIENTS, self.ignore_clients);
        ignore.set(IgnoreFields::COMPATIBILITY_VERSION, self.ignore_compatibility_version);
        ignore.set(IgnoreFields::CURRENT_VERSION, self.ignore_current_version);
        ignore.set(IgnoreFields::FLAGS, self.ignore_flags);
        ignore.set(IgnoreFields::INSTALL_NAME, self.ignore_install_name);
        ignore.set(IgnoreFields::OBJC_CONSTRAINT, self.ignore_objc_constraint);
        ignore.set(IgnoreFields::PARENT_UMBRELLA, self.ignore_parent_umbrella);
        ignore.set(IgnoreFields::PLATFORM, self.ignore_platform);
        ignore.set(IgnoreFields::REEXPORTS, self.ignore_reexports);
        ignore.set(IgnoreFields::SWIFT_VERSION, self.ignore_swift_version);
        ignore.set(IgnoreFields::SYMBOLS, self.ignore_symbols);
        ignore.set(IgnoreFields::UUID, self.ignore_uuids);

        let mut private_symbols = PrivateSymbols::empty();
        private_symbols.set(PrivateSymbols::NORMAL, self.allow_private_normal_symbols);
        private_symbols.set(PrivateSymbols::WEAK_DEF, self.allow_private_weak_symbols);
        private_symbols.set(PrivateSymbols::OBJC_CLASS, self.allow_private_objc_classes);
        private_symbols.set(PrivateSymbols::OBJC_IVAR, self.allow_private_objc_ivars);

        let mut leniency = Leniency::empty();
        leniency.set(Leniency::INVALID_FIELDS, self.ignore_invalid_fields);
        leniency.set(Leniency::MISSING_IDENTIFICATION, self.ignore_missing_identification);
        leniency.set(Leniency::MISSING_SYMBOL_TABLE, self.ignore_missing_symbol_table);
        leniency.set(Leniency::MISSING_UUID, self.ignore_missing_uuid);
        leniency.set(Leniency::NON_UNIQUE_UUIDS, self.ignore_non_unique_uuids);

        Ok(ParseOptions::new()
            .with_ignore(ignore)
            .with_private_symbols(private_symbols)
            .with_leniency(leniency)
            .with_version(version))
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbosity);

    match cli.command {
        Commands::Parse {
            file,
            exports,
            options,
        } => cmd_parse(&file, exports, &options.to_options()?),
        Commands::List {
            cache,
            filter,
            addresses,
        } => cmd_list(&cache, filter.as_deref(), addresses),
        Commands::Cache {
            cache,
            filter,
            exports,
            options,
        } => cmd_cache(&cache, filter.as_deref(), exports, &options.to_options()?),
    }
}

fn setup_logging(verbosity: u8) {
    let level = match verbosity {
        0 => Level::ERROR,
        1 => Level::WARN,
        2 => Level::INFO,
        _ => Level::DEBUG,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .without_time()
        .finish();

    tracing::subscriber::set_global_default(subscriber).ok();
}

/// Memory-maps a file for reading.
fn map_file(path: &Path) -> Result<Mmap> {
    let file =
        File::open(path).with_context(|| format!("Failed to open: {}", path.display()))?;
    unsafe { Mmap::map(&file) }.with_context(|| format!("Failed to map: {}", path.display()))
}

fn open_cache(path: &Path) -> Result<(Mmap, SharedCacheInfo)> {
    let mmap = map_file(path)?;
    let cache = SharedCacheInfo::parse(&mut Cursor::new(&mmap[..]))
        .with_context(|| format!("Failed to parse cache: {}", path.display()))?;
    Ok((mmap, cache))
}

/// Collects the cache images whose path contains `filter`.
fn matching_images(
    mmap: &Mmap,
    cache: &SharedCacheInfo,
    filter: Option<&str>,
) -> Result<Vec<(ImageInfo, String)>> {
    let mut images = Vec::new();
    iterate_shared_cache_images(cache, &mut Cursor::new(&mmap[..]), |image, path| {
        if filter.map_or(true, |f| path.contains(f)) {
            images.push((*image, path.to_string()));
        }
        true
    })?;
    Ok(images)
}

fn cmd_parse(path: &Path, exports: bool, options: &ParseOptions) -> Result<()> {
    let mmap = map_file(path)?;
    let mut info = CreateInfo::new(options.version);

    parse_macho(&mut info, &mut Cursor::new(&mmap[..]), options)
        .with_context(|| format!("Failed to parse: {}", path.display()))?;

    print_summary(&path.display().to_string(), &info, exports);
    Ok(())
}

fn cmd_list(path: &Path, filter: Option<&str>, addresses: bool) -> Result<()> {
    let (mmap, cache) = open_cache(path)?;

    for (image, image_path) in matching_images(&mmap, &cache, filter)? {
        if addresses {
            println!("{:#018x}  {}", image.address, image_path);
        } else {
            println!("{}", image_path);
        }
    }

    Ok(())
}

fn cmd_cache(path: &Path, filter: Option<&str>, exports: bool, options: &ParseOptions) -> Result<()> {
    let start = Instant::now();
    let (mmap, cache) = open_cache(path)?;

    let images = matching_images(&mmap, &cache, filter)?;
    if images.is_empty() {
        warn!("No images match the criteria");
        return Ok(());
    }

    info!("Parsing {} images of {} cache", images.len(), cache.arch);

    let progress = if images.len() > 1 {
        let bar = ProgressBar::new(images.len() as u64);
        bar.set_style(
            ProgressStyle::default_bar()
                .template(
                    "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})",
                )?
                .progress_chars("#>-"),
        );
        bar
    } else {
        ProgressBar::hidden()
    };

    let mut source = Cursor::new(&mmap[..]);
    let mut errors = Vec::new();

    for (image, image_path) in &images {
        let mut info = CreateInfo::new(options.version);
        match parse_shared_cache_image(&mut info, &cache, &mut source, image, options) {
            Ok(()) => progress.suspend(|| print_summary(image_path, &info, exports)),
            Err(e) => errors.push((image_path.as_str(), e)),
        }
        progress.inc(1);
    }

    progress.finish_and_clear();

    if !errors.is_empty() {
        warn!("{} images failed to parse:", errors.len());
        for (image_path, err) in &errors {
            error!("  {}: {}", image_path, err);
        }
    }

    info!(
        "Parsed {}/{} images in {:.2}s",
        images.len() - errors.len(),
        images.len(),
        start.elapsed().as_secs_f64()
    );

    if errors.len() == images.len() {
        bail!("No image could be parsed");
    }
    Ok(())
}

fn print_summary(name: &str, info: &CreateInfo, exports: bool) {
    let archs: Vec<_> = info.arch_list().map(|arch| arch.name()).collect();

    println!("--- {} ({})", name, info.version);
    println!("archs:                 [ {} ]", archs.join(", "));
    if let Some(platform) = info.platform {
        println!("platform:              {}", platform);
    }
    if !info.flags.is_empty() {
        println!("flags:                 {:?}", info.flags);
    }
    if let Some(install_name) = &info.install_name {
        println!("install-name:          {}", install_name);
    }
    if let Some(version) = info.current_version {
        println!("current-version:       {}", version);
    }
    if let Some(version) = info.compatibility_version {
        println!("compatibility-version: {}", version);
    }
    if let Some(version) = info.swift_version {
        println!("swift-version:         {}", version);
    }
    if let Some(constraint) = info.objc_constraint {
        println!("objc-constraint:       {}", constraint.name());
    }
    if let Some(umbrella) = &info.parent_umbrella {
        println!("parent-umbrella:       {}", umbrella);
    }
    for uuid in &info.uuids {
        println!("uuid:                  {}: {}", uuid.arch, uuid_to_string(&uuid.uuid));
    }

    if exports {
        for export in &info.exports {
            let archs: Vec<_> = archs_in(export.archs).map(|arch| arch.name()).collect();
            println!("  {:<16} {} [ {} ]", export.kind.to_string(), export.string, archs.join(", "));
        }
        return;
    }

    for kind in [
        ExportKind::Client,
        ExportKind::Reexport,
        ExportKind::NormalSymbol,
        ExportKind::ObjcClassSymbol,
        ExportKind::ObjcIvarSymbol,
        ExportKind::WeakDefSymbol,
    ] {
        let count = info.exports.of_kind(kind).count();
        if count > 0 {
            println!("  {:<16} {}", kind.to_string(), count);
        }
    }
}
