//! Builders for synthetic Mach-O files and shared caches.

#![allow(dead_code)]

pub const CPU_TYPE_ARM: u32 = 12;
pub const CPU_TYPE_ARM64: u32 = 0x0100_000C;
pub const CPU_TYPE_X86_64: u32 = 0x0100_0007;
pub const CPU_TYPE_POWERPC: u32 = 18;

pub const N_EXT: u8 = 0x01;
pub const N_SECT: u8 = 0x0E;
pub const N_PEXT: u8 = 0x10;
pub const N_UNDF: u8 = 0x00;
pub const N_WEAK_DEF: u16 = 0x0080;

const LC_SEGMENT: u32 = 0x1;
const LC_SYMTAB: u32 = 0x2;
const LC_ID_DYLIB: u32 = 0xD;
const LC_SUB_CLIENT: u32 = 0x14;
const LC_UUID: u32 = 0x1B;
const LC_REEXPORT_DYLIB: u32 = 0x8000_001F;
const LC_SEGMENT_64: u32 = 0x19;
const LC_BUILD_VERSION: u32 = 0x32;

/// Swift 5 ABI, no GC, not simulated.
pub const OBJC_FLAGS_SWIFT5: u32 = 0x500;
/// Swift 5 ABI with GC support.
pub const OBJC_FLAGS_SWIFT5_GC: u32 = 0x502;
/// Swift 6 ABI, no GC, not simulated.
pub const OBJC_FLAGS_SWIFT6: u32 = 0x600;

/// Byte writer in a fixed byte order.
struct Writer {
    buf: Vec<u8>,
    big_endian: bool,
}

impl Writer {
    fn new(big_endian: bool) -> Self {
        Self { buf: Vec::new(), big_endian }
    }

    fn u16(&mut self, value: u16) {
        let bytes = if self.big_endian { value.to_be_bytes() } else { value.to_le_bytes() };
        self.buf.extend_from_slice(&bytes);
    }

    fn u32(&mut self, value: u32) {
        let bytes = if self.big_endian { value.to_be_bytes() } else { value.to_le_bytes() };
        self.buf.extend_from_slice(&bytes);
    }

    fn u64(&mut self, value: u64) {
        let bytes = if self.big_endian { value.to_be_bytes() } else { value.to_le_bytes() };
        self.buf.extend_from_slice(&bytes);
    }

    fn bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    fn pad_to(&mut self, len: usize) {
        self.buf.resize(len, 0);
    }
}

fn align8(value: usize) -> usize {
    (value + 7) & !7
}

/// Copies `name` into a NUL-padded 16-byte field.
fn fixed16(name: &str) -> [u8; 16] {
    let mut field = [0u8; 16];
    field[..name.len()].copy_from_slice(name.as_bytes());
    field
}

/// Overwrites a little- or big-endian `u32` at `offset`.
pub fn patch_u32(bytes: &mut [u8], offset: usize, value: u32, big_endian: bool) {
    let raw = if big_endian { value.to_be_bytes() } else { value.to_le_bytes() };
    bytes[offset..offset + 4].copy_from_slice(&raw);
}

/// A symbol table entry.
#[derive(Debug, Clone)]
pub struct Symbol {
    pub name: String,
    pub n_type: u8,
    pub n_desc: u16,
    /// Written instead of the real string table index when set
    pub strx: Option<u32>,
}

impl Symbol {
    pub fn external(name: &str) -> Self {
        Self { name: name.to_string(), n_type: N_SECT | N_EXT, n_desc: 0, strx: None }
    }

    pub fn private(name: &str) -> Self {
        Self { name: name.to_string(), n_type: N_SECT, n_desc: 0, strx: None }
    }

    pub fn weak(name: &str) -> Self {
        Self { name: name.to_string(), n_type: N_SECT | N_EXT, n_desc: N_WEAK_DEF, strx: None }
    }

    pub fn undefined(name: &str) -> Self {
        Self { name: name.to_string(), n_type: N_UNDF | N_EXT, n_desc: 0, strx: None }
    }

    pub fn with_strx(mut self, strx: u32) -> Self {
        self.strx = Some(strx);
        self
    }
}

/// An `__objc_imageinfo` section in the image's `__DATA` segment.
#[derive(Debug, Clone, Copy)]
pub struct ObjcImageInfo {
    pub flags: u32,
    /// Section size; a well-formed section is 8 bytes
    pub size: u64,
    /// File offset written instead of the payload's real one when set
    pub offset: Option<u32>,
}

impl ObjcImageInfo {
    pub fn new(flags: u32) -> Self {
        Self { flags, size: 8, offset: None }
    }
}

/// Describes a dylib image to synthesize.
#[derive(Debug, Clone)]
pub struct ImageBuilder {
    pub cputype: u32,
    pub cpusubtype: u32,
    pub is_64: bool,
    pub big_endian: bool,
    pub flags: u32,
    pub install_name: Option<String>,
    pub current_version: u32,
    pub compatibility_version: u32,
    pub uuid: Option<[u8; 16]>,
    pub platform: Option<u32>,
    pub clients: Vec<String>,
    pub reexports: Vec<String>,
    pub symtab: bool,
    pub symbols: Vec<Symbol>,
    pub objc_image_info: Vec<ObjcImageInfo>,
}

impl ImageBuilder {
    pub fn new(cputype: u32, cpusubtype: u32, is_64: bool) -> Self {
        Self {
            cputype,
            cpusubtype,
            is_64,
            big_endian: false,
            flags: 0x80,
            install_name: Some("/usr/lib/libfoo.dylib".to_string()),
            current_version: 0x0001_0203,
            compatibility_version: 0x0001_0000,
            uuid: Some([0x11; 16]),
            platform: None,
            clients: Vec::new(),
            reexports: Vec::new(),
            symtab: true,
            symbols: Vec::new(),
            objc_image_info: Vec::new(),
        }
    }

    pub fn x86_64() -> Self {
        Self::new(CPU_TYPE_X86_64, 3, true)
    }

    pub fn arm64() -> Self {
        Self::new(CPU_TYPE_ARM64, 0, true)
    }

    pub fn armv7() -> Self {
        Self::new(CPU_TYPE_ARM, 9, false)
    }

    pub fn ppc() -> Self {
        let mut builder = Self::new(CPU_TYPE_POWERPC, 0, false);
        builder.big_endian = true;
        builder
    }

    pub fn install_name(mut self, name: &str) -> Self {
        self.install_name = Some(name.to_string());
        self
    }

    pub fn uuid(mut self, uuid: [u8; 16]) -> Self {
        self.uuid = Some(uuid);
        self
    }

    pub fn platform(mut self, platform: u32) -> Self {
        self.platform = Some(platform);
        self
    }

    pub fn client(mut self, name: &str) -> Self {
        self.clients.push(name.to_string());
        self
    }

    pub fn reexport(mut self, name: &str) -> Self {
        self.reexports.push(name.to_string());
        self
    }

    pub fn symbol(mut self, symbol: Symbol) -> Self {
        self.symbols.push(symbol);
        self
    }

    pub fn objc(mut self, section: ObjcImageInfo) -> Self {
        self.objc_image_info.push(section);
        self
    }

    /// `LC_SEGMENT(_64)` for `__DATA` holding one section per ObjC image
    /// info; payloads start at `payload_offset` and are 8 bytes apart.
    fn objc_segment(&self, payload_offset: u64) -> Vec<u8> {
        let (header_size, section_size) = if self.is_64 { (72, 80) } else { (56, 68) };
        let nsects = self.objc_image_info.len();
        let cmdsize = header_size + nsects * section_size;
        let vmsize = (nsects * 8) as u64;

        let mut w = Writer::new(self.big_endian);
        w.u32(if self.is_64 { LC_SEGMENT_64 } else { LC_SEGMENT });
        w.u32(cmdsize as u32);
        w.bytes(&fixed16("__DATA"));
        if self.is_64 {
            for value in [0x8000, vmsize, payload_offset, vmsize] {
                w.u64(value);
            }
        } else {
            for value in [0x8000, vmsize, payload_offset, vmsize] {
                w.u32(value as u32);
            }
        }
        for value in [3, 3, nsects as u32, 0] {
            w.u32(value);
        }

        for (index, section) in self.objc_image_info.iter().enumerate() {
            let offset = section.offset.unwrap_or((payload_offset + index as u64 * 8) as u32);
            w.bytes(&fixed16("__objc_imageinfo"));
            w.bytes(&fixed16("__DATA"));
            if self.is_64 {
                w.u64(0x8000 + index as u64 * 8);
                w.u64(section.size);
            } else {
                w.u32(0x8000 + index as u32 * 8);
                w.u32(section.size as u32);
            }
            for value in [offset, 2, 0, 0, 0, 0, 0] {
                w.u32(value);
            }
            if self.is_64 {
                w.u32(0);
            }
        }
        w.buf
    }

    fn string_command(&self, cmd: u32, fixed: &[u32], string: &str) -> Vec<u8> {
        let fixed_size = 8 + fixed.len() * 4;
        let cmdsize = align8(fixed_size + string.len() + 1);
        let mut w = Writer::new(self.big_endian);
        w.u32(cmd);
        w.u32(cmdsize as u32);
        for value in fixed {
            w.u32(*value);
        }
        w.bytes(string.as_bytes());
        w.pad_to(cmdsize);
        w.buf
    }

    /// Builds the image.
    ///
    /// `data_base` is added to the symbol and string table offsets; it is 0
    /// for standalone files and the image's file offset inside a cache.
    pub fn build(&self, data_base: u64) -> Vec<u8> {
        let mut strtab = vec![0u8];
        let mut name_offsets = Vec::new();
        for symbol in &self.symbols {
            name_offsets.push(strtab.len() as u32);
            strtab.extend_from_slice(symbol.name.as_bytes());
            strtab.push(0);
        }
        strtab.resize(align8(strtab.len()), 0);

        let mut commands: Vec<Vec<u8>> = Vec::new();
        if let Some(name) = &self.install_name {
            commands.push(self.string_command(
                LC_ID_DYLIB,
                &[24, 2, self.current_version, self.compatibility_version],
                name,
            ));
        }
        if let Some(uuid) = self.uuid {
            let mut w = Writer::new(self.big_endian);
            w.u32(LC_UUID);
            w.u32(24);
            w.bytes(&uuid);
            commands.push(w.buf);
        }
        if let Some(platform) = self.platform {
            let mut w = Writer::new(self.big_endian);
            for value in [LC_BUILD_VERSION, 24, platform, 0x000A_0F00, 0x000A_0F00, 0] {
                w.u32(value);
            }
            commands.push(w.buf);
        }
        for client in &self.clients {
            commands.push(self.string_command(LC_SUB_CLIENT, &[12], client));
        }
        for reexport in &self.reexports {
            commands.push(self.string_command(LC_REEXPORT_DYLIB, &[24, 2, 0x10000, 0x10000], reexport));
        }

        let header_size = if self.is_64 { 32 } else { 28 };
        let nlist_size = if self.is_64 { 16 } else { 12 };
        let symtab_size = 24;
        let segment_size = if self.objc_image_info.is_empty() {
            0
        } else if self.is_64 {
            72 + self.objc_image_info.len() * 80
        } else {
            56 + self.objc_image_info.len() * 68
        };
        let sizeofcmds: usize = commands.iter().map(Vec::len).sum::<usize>()
            + segment_size
            + if self.symtab { symtab_size } else { 0 };

        let symoff = align8(header_size + sizeofcmds);
        let stroff = symoff + self.symbols.len() * nlist_size;
        let objc_off = stroff + strtab.len();

        if !self.objc_image_info.is_empty() {
            commands.push(self.objc_segment(data_base + objc_off as u64));
        }

        if self.symtab {
            let mut w = Writer::new(self.big_endian);
            w.u32(LC_SYMTAB);
            w.u32(symtab_size as u32);
            w.u32((data_base + symoff as u64) as u32);
            w.u32(self.symbols.len() as u32);
            w.u32((data_base + stroff as u64) as u32);
            w.u32(strtab.len() as u32);
            commands.push(w.buf);
        }

        let mut w = Writer::new(self.big_endian);
        w.u32(if self.is_64 { 0xFEED_FACF } else { 0xFEED_FACE });
        w.u32(self.cputype);
        w.u32(self.cpusubtype);
        w.u32(6); // MH_DYLIB
        w.u32(commands.len() as u32);
        w.u32(sizeofcmds as u32);
        w.u32(self.flags);
        if self.is_64 {
            w.u32(0);
        }
        for command in &commands {
            w.bytes(command);
        }
        w.pad_to(symoff);

        for (symbol, strx) in self.symbols.iter().zip(&name_offsets) {
            w.u32(symbol.strx.unwrap_or(*strx));
            w.bytes(&[symbol.n_type, 1]);
            w.u16(symbol.n_desc);
            if self.is_64 {
                w.u64(0x1000);
            } else {
                w.u32(0x1000);
            }
        }
        w.bytes(&strtab);
        for section in &self.objc_image_info {
            w.u32(0);
            w.u32(section.flags);
        }
        w.buf
    }
}

/// Builds a 32-bit fat file. Slices are placed at 4 KiB boundaries.
pub fn build_fat(slices: &[ImageBuilder]) -> Vec<u8> {
    let mut images = Vec::new();
    let mut offset = 0x1000usize;
    for slice in slices {
        let bytes = slice.build(0);
        let len = bytes.len();
        images.push((slice, offset, bytes));
        offset += (len + 0xFFF) & !0xFFF;
    }

    let mut w = Writer::new(true);
    w.u32(0xCAFE_BABE);
    w.u32(slices.len() as u32);
    for (slice, offset, bytes) in &images {
        w.u32(slice.cputype);
        w.u32(slice.cpusubtype);
        w.u32(*offset as u32);
        w.u32(bytes.len() as u32);
        w.u32(12);
    }
    for (_, offset, bytes) in &images {
        w.pad_to(*offset);
        w.bytes(bytes);
    }
    w.buf
}

/// A fat header claiming `nfat_arch` architectures and nothing else.
pub fn build_fat_header_only(nfat_arch: u32) -> Vec<u8> {
    let mut w = Writer::new(true);
    w.u32(0xCAFE_BABE);
    w.u32(nfat_arch);
    w.buf
}

/// Cache layout constants.
pub const CACHE_MAPPING_ADDRESS: u64 = 0x1000;
pub const CACHE_MAPPING_SIZE: u64 = 0x2000;
pub const CACHE_MAPPING_OFFSET: u64 = 0x4000;
const CACHE_MAPPINGS_AT: usize = 0x20;
const CACHE_IMAGES_AT: usize = 0x80;
const CACHE_PATHS_AT: usize = 0x200;

/// One image of a synthetic cache.
pub struct CacheImage {
    pub address: u64,
    pub path: String,
    pub image: ImageBuilder,
}

/// Builds a little-endian shared cache with a single mapping of
/// `CACHE_MAPPING_SIZE` bytes at `CACHE_MAPPING_ADDRESS`, backed by file
/// offset `CACHE_MAPPING_OFFSET`.
pub fn build_cache(arch: &str, images: &[CacheImage]) -> Vec<u8> {
    build_cache_with_mappings(arch, &[], images)
}

/// Like [`build_cache`], with up to two more `(address, size, file_offset)`
/// mappings after the first.
pub fn build_cache_with_mappings(arch: &str, extra: &[(u64, u64, u64)], images: &[CacheImage]) -> Vec<u8> {
    assert!(extra.len() <= 2);

    let mut magic = [b' '; 16];
    magic[..8].copy_from_slice(b"dyld_v1 ");
    magic[15 - arch.len()..15].copy_from_slice(arch.as_bytes());
    magic[15] = 0;

    let mut w = Writer::new(false);
    w.bytes(&magic);
    w.u32(CACHE_MAPPINGS_AT as u32);
    w.u32(1 + extra.len() as u32);
    w.u32(CACHE_IMAGES_AT as u32);
    w.u32(images.len() as u32);

    w.pad_to(CACHE_MAPPINGS_AT);
    w.u64(CACHE_MAPPING_ADDRESS);
    w.u64(CACHE_MAPPING_SIZE);
    w.u64(CACHE_MAPPING_OFFSET);
    w.u32(5);
    w.u32(5);
    for (address, size, file_offset) in extra {
        w.u64(*address);
        w.u64(*size);
        w.u64(*file_offset);
        w.u32(3);
        w.u32(3);
    }

    let mut path_offset = CACHE_PATHS_AT;
    let mut path_offsets = Vec::new();
    for image in images {
        path_offsets.push(path_offset);
        path_offset += image.path.len() + 1;
    }

    w.pad_to(CACHE_IMAGES_AT);
    for (image, path_offset) in images.iter().zip(&path_offsets) {
        w.u64(image.address);
        w.u64(0);
        w.u64(0);
        w.u32(*path_offset as u32);
        w.u32(0);
    }

    for (image, path_offset) in images.iter().zip(&path_offsets) {
        w.pad_to(*path_offset);
        w.bytes(image.path.as_bytes());
        w.bytes(&[0]);
    }

    let end = (CACHE_MAPPING_OFFSET + CACHE_MAPPING_SIZE) as usize;
    w.pad_to(end);
    for image in images {
        let file_offset = (CACHE_MAPPING_OFFSET + (image.address - CACHE_MAPPING_ADDRESS)) as usize;
        let bytes = image.image.build(file_offset as u64);
        w.buf[file_offset..file_offset + bytes.len()].copy_from_slice(&bytes);
    }
    w.buf
}
