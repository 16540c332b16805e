mod common;

use std::io::Cursor;

use common::*;
use tbdex::{
    iterate_shared_cache_images, parse_shared_cache_image, Arch, CreateInfo, Error, ImageInfo,
    ParseOptions, SharedCacheInfo,
};

fn two_image_cache() -> Vec<u8> {
    build_cache(
        "x86_64",
        &[
            CacheImage {
                address: 0x1500,
                path: "/usr/lib/libfoo.dylib".to_string(),
                image: ImageBuilder::x86_64()
                    .symbol(Symbol::external("_foo"))
                    .symbol(Symbol::external("_foo_helper")),
            },
            CacheImage {
                address: 0x1A00,
                path: "/usr/lib/libbar.dylib".to_string(),
                image: ImageBuilder::x86_64()
                    .install_name("/usr/lib/libbar.dylib")
                    .uuid([0x22; 16])
                    .symbol(Symbol::external("_bar")),
            },
        ],
    )
}

#[test]
fn cache_header_and_tables() {
    let bytes = two_image_cache();
    let cache = SharedCacheInfo::parse(&mut Cursor::new(&bytes)).unwrap();

    let x86_64 = Arch::for_name("x86_64").unwrap();
    assert_eq!(cache.arch, x86_64);
    assert_eq!(cache.arch_bit, x86_64.bit());
    assert_eq!(cache.size, bytes.len() as u64);
    assert_eq!(cache.mappings.len(), 1);
    assert_eq!(cache.image_count(), 2);
    assert_eq!(cache.images[0].address, 0x1500);
}

#[test]
fn image_address_translates_through_mapping() {
    let bytes = two_image_cache();
    let cache = SharedCacheInfo::parse(&mut Cursor::new(&bytes)).unwrap();

    assert_eq!(cache.resolve_image_offset(0x1500).unwrap(), (0x4500, 0x1B00));
    assert!(matches!(
        cache.resolve_image_offset(0x3000),
        Err(Error::NoCorrespondingMapping { address: 0x3000 })
    ));
}

#[test]
fn cache_images_use_cache_relative_symbol_offsets() {
    let bytes = two_image_cache();
    let mut source = Cursor::new(&bytes);
    let cache = SharedCacheInfo::parse(&mut source).unwrap();
    let options = ParseOptions::default();

    let mut info = CreateInfo::new(options.version);
    parse_shared_cache_image(&mut info, &cache, &mut source, &cache.images[0], &options).unwrap();
    assert_eq!(info.archs, cache.arch_bit);
    assert_eq!(info.install_name.as_deref(), Some("/usr/lib/libfoo.dylib"));
    let names: Vec<_> = info.exports.iter().map(|export| export.string.as_str()).collect();
    assert_eq!(names, ["_foo", "_foo_helper"]);

    let mut info = CreateInfo::new(options.version);
    parse_shared_cache_image(&mut info, &cache, &mut source, &cache.images[1], &options).unwrap();
    assert_eq!(info.install_name.as_deref(), Some("/usr/lib/libbar.dylib"));
    assert_eq!(info.exports.len(), 1);
}

#[test]
fn iterate_images_in_order() {
    let bytes = two_image_cache();
    let mut source = Cursor::new(&bytes);
    let cache = SharedCacheInfo::parse(&mut source).unwrap();

    let mut seen = Vec::new();
    iterate_shared_cache_images(&cache, &mut source, |image, path| {
        seen.push((image.address, path.to_string()));
        true
    })
    .unwrap();
    assert_eq!(
        seen,
        [
            (0x1500, "/usr/lib/libfoo.dylib".to_string()),
            (0x1A00, "/usr/lib/libbar.dylib".to_string()),
        ]
    );

    let mut count = 0;
    iterate_shared_cache_images(&cache, &mut source, |_, _| {
        count += 1;
        false
    })
    .unwrap();
    assert_eq!(count, 1);
}

#[test]
fn image_path_must_lie_inside_cache() {
    let bytes = two_image_cache();
    let mut source = Cursor::new(&bytes);
    let mut cache = SharedCacheInfo::parse(&mut source).unwrap();
    cache.images[1].path_file_offset = bytes.len() as u32;

    let result = iterate_shared_cache_images(&cache, &mut source, |_, _| true);
    assert!(matches!(result, Err(Error::InvalidImagePath { .. })));
}

#[test]
fn image_arch_must_match_cache() {
    let bytes = build_cache(
        "x86_64",
        &[CacheImage {
            address: 0x1500,
            path: "/usr/lib/libarm.dylib".to_string(),
            image: ImageBuilder::arm64().symbol(Symbol::external("_arm")),
        }],
    );
    let mut source = Cursor::new(&bytes);
    let cache = SharedCacheInfo::parse(&mut source).unwrap();

    let mut info = CreateInfo::default();
    let result =
        parse_shared_cache_image(&mut info, &cache, &mut source, &cache.images[0], &ParseOptions::default());
    assert!(matches!(result, Err(Error::ConflictingArchInfo)));
}

#[test]
fn unmapped_image_address() {
    let bytes = two_image_cache();
    let mut source = Cursor::new(&bytes);
    let cache = SharedCacheInfo::parse(&mut source).unwrap();

    let image = ImageInfo {
        address: 0x9000,
        mod_time: 0,
        inode: 0,
        path_file_offset: 0,
    };
    let mut info = CreateInfo::default();
    let result = parse_shared_cache_image(&mut info, &cache, &mut source, &image, &ParseOptions::default());
    assert!(matches!(result, Err(Error::NoCorrespondingMapping { address: 0x9000 })));
}

#[test]
fn rejects_non_cache_and_unknown_arch() {
    let mut source = Cursor::new(vec![0u8; 64]);
    assert!(matches!(SharedCacheInfo::parse(&mut source), Err(Error::NotASharedCache)));

    let bytes = build_cache("bogus", &[]);
    assert!(matches!(
        SharedCacheInfo::parse(&mut Cursor::new(&bytes)),
        Err(Error::UnsupportedCacheArch(name)) if name == "bogus"
    ));
}

#[test]
fn cache_without_images() {
    let bytes = build_cache("arm64", &[]);
    let cache = SharedCacheInfo::parse(&mut Cursor::new(&bytes)).unwrap();
    assert_eq!(cache.image_count(), 0);
    assert_eq!(cache.arch, Arch::for_name("arm64").unwrap());
}

/// Offsets of `mapping_offset` and `mapping_count` in the cache header.
const MAPPING_OFFSET_AT: usize = 16;
const MAPPING_COUNT_AT: usize = 20;

#[test]
fn empty_mapping_overlaps_nothing() {
    let extra = [(0x8000, 0, CACHE_MAPPING_OFFSET + 0x100)];
    let bytes = build_cache_with_mappings(
        "x86_64",
        &extra,
        &[CacheImage {
            address: 0x1500,
            path: "/usr/lib/libfoo.dylib".to_string(),
            image: ImageBuilder::x86_64().symbol(Symbol::external("_foo")),
        }],
    );
    let mut source = Cursor::new(&bytes);
    let cache = SharedCacheInfo::parse(&mut source).unwrap();
    assert_eq!(cache.mappings.len(), 2);
    assert!(cache.mapping_for_addr(0x8000).is_none());

    let mut info = CreateInfo::default();
    parse_shared_cache_image(&mut info, &cache, &mut source, &cache.images[0], &ParseOptions::default())
        .unwrap();
    assert_eq!(info.exports.len(), 1);
}

#[test]
fn mapping_table_is_validated() {
    let extra = [(0x8000, 0x100, CACHE_MAPPING_OFFSET + 0x800)];
    let bytes = build_cache_with_mappings("x86_64", &extra, &[]);
    assert!(matches!(
        SharedCacheInfo::parse(&mut Cursor::new(&bytes)),
        Err(Error::OverlappingMappings)
    ));

    let extra = [(0x8000, 0x100, CACHE_MAPPING_OFFSET + CACHE_MAPPING_SIZE)];
    let bytes = build_cache_with_mappings("x86_64", &extra, &[]);
    assert!(matches!(
        SharedCacheInfo::parse(&mut Cursor::new(&bytes)),
        Err(Error::InvalidMappings)
    ));

    let mut bytes = build_cache("x86_64", &[]);
    patch_u32(&mut bytes, MAPPING_COUNT_AT, 0, false);
    assert!(matches!(
        SharedCacheInfo::parse(&mut Cursor::new(&bytes)),
        Err(Error::InvalidMappings)
    ));
}

#[test]
fn truncated_cache_with_distant_mapping_table() {
    // The header now claims the newer images location at 0x1C0, past the end.
    let mut bytes = build_cache("x86_64", &[]);
    patch_u32(&mut bytes, MAPPING_OFFSET_AT, 0x1000, false);
    bytes.truncate(0x100);
    assert!(matches!(
        SharedCacheInfo::parse(&mut Cursor::new(&bytes)),
        Err(Error::InvalidMappings)
    ));
}

#[test]
fn fat_image_inside_cache() {
    let mut bytes = two_image_cache();
    let file_offset = (CACHE_MAPPING_OFFSET + (0x1500 - CACHE_MAPPING_ADDRESS)) as usize;
    patch_u32(&mut bytes, file_offset, 0xCAFE_BABE, true);

    let mut source = Cursor::new(&bytes);
    let cache = SharedCacheInfo::parse(&mut source).unwrap();
    let mut info = CreateInfo::default();
    let result =
        parse_shared_cache_image(&mut info, &cache, &mut source, &cache.images[0], &ParseOptions::default());
    assert!(matches!(result, Err(Error::FatNotSupported)));
}
