//! Integration tests for address translation and overlay arithmetic.
//!
//! The properties under test are the ones analysts lean on when they carve data out
//! of a sample: translating an address twice gives the same answer, translation
//! round-trips over bytes the file actually backs, and the overlay boundary only
//! moves forward when bytes are appended.

mod common;

use common::PeImage;
use pescope::PeFile;

#[test]
fn rva_resolution_is_stable() {
    let pe = PeFile::from_mem(PeImage::minimal().build()).unwrap();
    for rva in [0u64, 0x3C, 0x1000, 0x1100, 0x11FF] {
        assert_eq!(pe.resolve_rva(rva), pe.resolve_rva(rva), "rva {rva:#X}");
    }
}

#[test]
fn header_region_maps_to_itself() {
    let pe = PeFile::from_mem(PeImage::minimal().build()).unwrap();

    // SizeOfHeaders is 0x400; below it RVA and file offset are the same number.
    assert_eq!(pe.resolve_rva(0), Some(0));
    assert_eq!(pe.resolve_rva(0x3FF), Some(0x3FF));

    // Between the headers and the first section nothing is mapped.
    assert_eq!(pe.resolve_rva(0x400), None);
    assert_eq!(pe.resolve_rva(0xFFF), None);
}

#[test]
fn section_rvas_translate_through_raw_data() {
    let pe = PeFile::from_mem(PeImage::minimal().build()).unwrap();

    assert_eq!(pe.resolve_rva(0x1000), Some(0x400));
    assert_eq!(pe.resolve_rva(0x1123), Some(0x523));

    // Forward translation covers the whole mapped page, even past the 0x200 bytes
    // the file backs; the read-size cap belongs to the inverse direction.
    assert_eq!(pe.resolve_rva(0x1200), Some(0x600));
    assert_eq!(pe.resolve_rva(0x1FFF), Some(0x13FF));
    assert_eq!(pe.resolve_file_offset(0x600), None);

    // Past the mapped range the translation ends.
    assert_eq!(pe.resolve_rva(0x2000), None);
}

#[test]
fn translation_round_trips_over_backed_bytes() {
    let image = PeImage::minimal()
        .section(".data", 0x800, 0x2000, 0x200, 0x600, 0x4000_0040)
        .build();
    let pe = PeFile::from_mem(image).unwrap();

    for rva in [0u64, 0x200, 0x1000, 0x1080, 0x11FF, 0x2000, 0x21FF] {
        let offset = pe.resolve_rva(rva).unwrap();
        assert_eq!(pe.resolve_file_offset(offset), Some(rva), "rva {rva:#X}");
    }
}

/// The last section's virtual size equals its raw size, so its readable range ends
/// exactly at 0x800 and anything appended past that is overlay.
fn bounded_image() -> PeImage {
    PeImage::minimal().section(".data", 0x200, 0x2000, 0x200, 0x600, 0x4000_0040)
}

#[test]
fn offsets_nothing_maps_translate_to_nothing() {
    let image = bounded_image().overlay(0x100).build();
    let pe = PeFile::from_mem(image).unwrap();

    // Overlay bytes belong to no section and are not header bytes.
    assert_eq!(pe.resolve_file_offset(0x800), None);
    assert_eq!(pe.resolve_file_offset(0x8FF), None);
}

#[test]
fn overlay_grows_with_appended_bytes() {
    let base = PeFile::from_mem(bounded_image().build()).unwrap();
    assert!(!base.overlay_exists());
    assert_eq!(base.overlay_offset(), 0x800);
    assert_eq!(base.overlay_size(), 0);

    let padded = PeFile::from_mem(bounded_image().overlay(0x1234).build()).unwrap();
    assert!(padded.overlay_exists());
    assert_eq!(padded.overlay_offset(), base.overlay_offset());
    assert_eq!(padded.overlay_size(), 0x1234);
}

#[test]
fn section_ownership_matches_translation() {
    let image = PeImage::minimal()
        .section(".data", 0x800, 0x2000, 0x200, 0x600, 0x4000_0040)
        .build();
    let pe = PeFile::from_mem(image).unwrap();
    let sections = pe.sections();

    assert_eq!(sections.section_containing_rva(0x1000), Some(1));
    assert_eq!(sections.section_containing_rva(0x2000), Some(2));
    assert_eq!(sections.section_containing_offset(0x500), Some(1));
    assert_eq!(sections.section_containing_offset(0x700), Some(2));
    assert_eq!(sections.section_containing_rva(0x5000), None);
}

#[test]
fn alignment_is_idempotent_on_aligned_values() {
    let pe = PeFile::from_mem(PeImage::minimal().build()).unwrap();
    let record = pe.sections().get(1).unwrap();
    let low = pe.sections().is_low_alignment();

    let pointer = record.aligned_pointer_to_raw(low);
    let size = record.aligned_size_of_raw(low);

    // Already aligned values come back unchanged: rounding down to 512 and up to
    // 4096 are both fixed points here.
    assert_eq!(pointer, 0x400);
    assert_eq!(size, 0x1000);
    assert_eq!(pointer & !0x1FF, pointer);
    assert_eq!(size.div_ceil(0x1000) * 0x1000, size);
}
