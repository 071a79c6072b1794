//! Optional header decoding for PE32 and PE32+ images.
//!
//! The optional header is where hostile files concentrate their creativity: collapsed
//! declared sizes, unknown magic values, alignment pairs that switch the loader into
//! low-alignment mode, and data directory counts that run past the end of the file.
//! Decoding is therefore tolerant by construction. Every field that physically fits in
//! the file is read; everything beyond the file boundary stays zero. The only hard
//! failure is a magic value that cannot be read at all, which callers treat as the
//! header being absent.
//!
//! Field access goes through the [`StandardField`] and [`WindowsField`] keys from
//! [`crate::pe::layout`], so width and offset differences between the two formats are
//! resolved in one place.

use bitflags::bitflags;

use crate::{
    pe::directories::{DataDirEntry, DataDirKey},
    pe::layout::{read_field, FieldSpec, OptionalMagic, StandardField, WindowsField},
    Result,
};
use strum::{EnumCount, IntoEnumIterator};

/// Number of data directory slots a well-formed image declares.
pub const DATA_DIR_COUNT: usize = 16;

/// Size in bytes of a single data directory entry.
pub const DATA_DIR_ENTRY_SIZE: usize = 8;

bitflags! {
    /// DLL attribute flags from the optional header `DllCharacteristics` field.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct DllCharacteristics: u16 {
        /// Reserved, must be zero
        const RESERVED_0001 = 0x0001;
        /// Reserved, must be zero
        const RESERVED_0002 = 0x0002;
        /// Reserved, must be zero
        const RESERVED_0004 = 0x0004;
        /// Reserved, must be zero
        const RESERVED_0008 = 0x0008;
        /// Image can handle a high entropy 64-bit virtual address space
        const HIGH_ENTROPY_VA = 0x0020;
        /// DLL can be relocated at load time
        const DYNAMIC_BASE = 0x0040;
        /// Code integrity checks are enforced
        const FORCE_INTEGRITY = 0x0080;
        /// Image is NX compatible
        const NX_COMPAT = 0x0100;
        /// Isolation aware, but do not isolate the image
        const NO_ISOLATION = 0x0200;
        /// Does not use structured exception handling
        const NO_SEH = 0x0400;
        /// Do not bind the image
        const NO_BIND = 0x0800;
        /// Image must execute in an AppContainer
        const APPCONTAINER = 0x1000;
        /// A WDM driver
        const WDM_DRIVER = 0x2000;
        /// Image supports Control Flow Guard
        const GUARD_CF = 0x4000;
        /// Terminal Server aware
        const TERMINAL_SERVER_AWARE = 0x8000;
    }
}

impl DllCharacteristics {
    /// Flags reserved by the PE specification; set bits are reported as anomalies.
    pub const RESERVED: DllCharacteristics = DllCharacteristics::RESERVED_0001
        .union(DllCharacteristics::RESERVED_0002)
        .union(DllCharacteristics::RESERVED_0004)
        .union(DllCharacteristics::RESERVED_0008);
}

/// Decoded optional header with its data directory table.
///
/// The struct always exists in one of the two known layouts. An unknown or ROM magic
/// keeps its raw value available through [`OptionalHeader::raw_magic`] but decodes the
/// fields with the PE32 layout, which is what the Windows loader families this library
/// models fall back to in practice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptionalHeader {
    /// Magic exactly as stored in the file
    raw_magic: u16,
    /// Layout actually used for decoding
    magic: OptionalMagic,
    /// `SizeOfOptionalHeader` as declared by the COFF header
    declared_size: u64,
    /// Bytes of the optional header physically backed by the file
    file_backed: usize,
    /// Standard field values indexed by [`StandardField`] declaration order
    standard: [u64; StandardField::COUNT],
    /// Windows specific field values indexed by [`WindowsField`] declaration order
    windows: [u64; WindowsField::COUNT],
    /// Data directory entries actually present in the file, at most sixteen
    data_directories: Vec<DataDirEntry>,
}

impl OptionalHeader {
    /// Decode the optional header at `offset` within `data`.
    ///
    /// The declared size from the COFF header does not bound the read; decoding is
    /// limited by the file end alone so that images lying about their header size still
    /// produce usable field values. The declared size is retained for the structural
    /// checks built on top.
    ///
    /// # Arguments
    /// * `data` - The complete file image
    /// * `offset` - File offset of the optional header (COFF header end)
    /// * `declared_size` - `SizeOfOptionalHeader` from the COFF header
    ///
    /// # Errors
    /// Returns [`crate::Error::NotPeFile`] if not even the two magic bytes are inside
    /// the file. Callers model that case as the optional header being absent.
    pub fn read(data: &[u8], offset: usize, declared_size: u64) -> Result<OptionalHeader> {
        let Some(magic_end) = offset.checked_add(2) else {
            return Err(not_pe_error!("optional header offset {:#X} overflows", offset));
        };
        if magic_end > data.len() {
            return Err(not_pe_error!(
                "optional header magic at {:#X} is outside the {} byte file",
                offset,
                data.len()
            ));
        }

        let header = &data[offset..];
        let raw_magic = u16::from_le_bytes([header[0], header[1]]);
        let magic = OptionalMagic::from_raw(raw_magic).unwrap_or(OptionalMagic::Pe32);

        let mut standard = [0_u64; StandardField::COUNT];
        for field in StandardField::iter() {
            if let Some(spec) = field.spec(magic) {
                if let Some(value) = read_field(header, spec) {
                    standard[field as usize] = value;
                }
            }
        }

        let mut windows = [0_u64; WindowsField::COUNT];
        for field in WindowsField::iter() {
            if let Some(value) = read_field(header, field.spec(magic)) {
                windows[field as usize] = value;
            }
        }

        let declared_dirs = windows[WindowsField::NumberOfRvaAndSizes as usize];
        let data_directories = read_directory_table(header, magic, declared_dirs);

        let layout_len = layout_size(magic, declared_dirs);
        let file_backed = header.len().min(layout_len);

        Ok(OptionalHeader {
            raw_magic,
            magic,
            declared_size,
            file_backed,
            standard,
            windows,
            data_directories,
        })
    }

    /// Magic value exactly as stored in the file.
    #[must_use]
    pub fn raw_magic(&self) -> u16 {
        self.raw_magic
    }

    /// Layout used for decoding. Unknown magic values fall back to [`OptionalMagic::Pe32`].
    #[must_use]
    pub fn magic(&self) -> OptionalMagic {
        self.magic
    }

    /// Whether the image declared one of the two known magic values.
    #[must_use]
    pub fn has_known_magic(&self) -> bool {
        OptionalMagic::from_raw(self.raw_magic).is_some()
    }

    /// Whether the image uses the 64-bit layout.
    #[must_use]
    pub fn is_pe32_plus(&self) -> bool {
        self.magic == OptionalMagic::Pe32Plus
    }

    /// `SizeOfOptionalHeader` as declared by the COFF header.
    #[must_use]
    pub fn declared_size(&self) -> u64 {
        self.declared_size
    }

    /// Size in bytes the decoded layout occupies, including the declared directory table
    /// capped at sixteen entries.
    #[must_use]
    pub fn layout_size(&self) -> usize {
        layout_size(self.magic, self.windows_value(WindowsField::NumberOfRvaAndSizes))
    }

    /// Bytes of the decoded layout physically backed by the file. Smaller than
    /// [`OptionalHeader::layout_size`] exactly when the file ends inside the header.
    #[must_use]
    pub fn file_backed(&self) -> usize {
        self.file_backed
    }

    /// Value of a standard field, widened to `u64`.
    ///
    /// Returns `None` only for [`StandardField::BaseOfData`] on PE32+, where the field
    /// does not exist.
    #[must_use]
    pub fn standard_value(&self, field: StandardField) -> Option<u64> {
        field.spec(self.magic).map(|_| self.standard[field as usize])
    }

    /// Value of a Windows specific field, widened to `u64`.
    #[must_use]
    pub fn windows_value(&self, field: WindowsField) -> u64 {
        self.windows[field as usize]
    }

    /// RVA of the entry point.
    #[must_use]
    pub fn address_of_entry_point(&self) -> u64 {
        self.standard[StandardField::AddressOfEntryPoint as usize]
    }

    /// Preferred load address.
    #[must_use]
    pub fn image_base(&self) -> u64 {
        self.windows_value(WindowsField::ImageBase)
    }

    /// Section alignment in memory.
    #[must_use]
    pub fn section_alignment(&self) -> u64 {
        self.windows_value(WindowsField::SectionAlignment)
    }

    /// Raw data alignment in the file.
    #[must_use]
    pub fn file_alignment(&self) -> u64 {
        self.windows_value(WindowsField::FileAlignment)
    }

    /// Declared size of the loaded image.
    #[must_use]
    pub fn size_of_image(&self) -> u64 {
        self.windows_value(WindowsField::SizeOfImage)
    }

    /// Declared combined size of all headers.
    #[must_use]
    pub fn size_of_headers(&self) -> u64 {
        self.windows_value(WindowsField::SizeOfHeaders)
    }

    /// Declared number of data directory entries.
    #[must_use]
    pub fn number_of_rva_and_sizes(&self) -> u64 {
        self.windows_value(WindowsField::NumberOfRvaAndSizes)
    }

    /// DLL characteristics as typed flags. Unknown bits are dropped by the type; the raw
    /// value remains available through [`OptionalHeader::windows_value`].
    #[must_use]
    pub fn dll_characteristics(&self) -> DllCharacteristics {
        DllCharacteristics::from_bits_truncate(
            self.windows_value(WindowsField::DllCharacteristics) as u16
        )
    }

    /// Whether the alignment pair switches the loader into low alignment mode, where
    /// file offsets equal RVAs and the usual rounding rules are suspended.
    #[must_use]
    pub fn is_low_alignment_mode(&self) -> bool {
        let file_align = self.file_alignment();
        let sec_align = self.section_alignment();
        file_align == sec_align && file_align > 0 && file_align < 0x1000
    }

    /// Data directory entries actually present in the file.
    ///
    /// The slice holds at most [`DATA_DIR_COUNT`] entries and may be shorter than the
    /// declared count when the file ends inside the table.
    #[must_use]
    pub fn data_directories(&self) -> &[DataDirEntry] {
        &self.data_directories
    }

    /// Entry for `key`, if the file physically contains that slot.
    #[must_use]
    pub fn data_directory(&self, key: DataDirKey) -> Option<&DataDirEntry> {
        self.data_directories.get(key as usize)
    }
}

/// Size in bytes of the layout for `magic` with `declared_dirs` directory entries,
/// capping the table at sixteen.
fn layout_size(magic: OptionalMagic, declared_dirs: u64) -> usize {
    let dirs = (declared_dirs as usize).min(DATA_DIR_COUNT);
    magic.data_directory_offset() + dirs * DATA_DIR_ENTRY_SIZE
}

/// Read up to sixteen data directory entries, stopping at the first entry the file
/// cannot fully back.
fn read_directory_table(
    header: &[u8],
    magic: OptionalMagic,
    declared_dirs: u64,
) -> Vec<DataDirEntry> {
    let count = (declared_dirs as usize).min(DATA_DIR_COUNT);
    let base = magic.data_directory_offset();

    let mut entries = Vec::with_capacity(count);
    for index in 0..count {
        let offset = base + index * DATA_DIR_ENTRY_SIZE;
        let Some(va) = read_field(header, FieldSpec::new(offset, 4)) else {
            break;
        };
        let Some(size) = read_field(header, FieldSpec::new(offset + 4, 4)) else {
            break;
        };
        // Index is below sixteen, so the key always exists
        let Some(key) = DataDirKey::from_repr(index) else {
            break;
        };
        entries.push(DataDirEntry {
            key,
            virtual_address: va as u32,
            size: size as u32,
        });
    }
    entries
}

#[cfg(test)]
mod tests {
    use super::*;

    fn put(buffer: &mut [u8], offset: usize, width: usize, value: u64) {
        buffer[offset..offset + width].copy_from_slice(&value.to_le_bytes()[..width]);
    }

    fn pe32_header() -> Vec<u8> {
        let mut h = vec![0_u8; 0xE0];
        put(&mut h, 0, 2, 0x10B); // Magic
        put(&mut h, 16, 4, 0x1000); // AddressOfEntryPoint
        put(&mut h, 24, 4, 0x2000); // BaseOfData
        put(&mut h, 28, 4, 0x0040_0000); // ImageBase
        put(&mut h, 32, 4, 0x1000); // SectionAlignment
        put(&mut h, 36, 4, 0x200); // FileAlignment
        put(&mut h, 56, 4, 0x5000); // SizeOfImage
        put(&mut h, 60, 4, 0x400); // SizeOfHeaders
        put(&mut h, 70, 2, 0x8140); // DllCharacteristics
        put(&mut h, 92, 4, 16); // NumberOfRvaAndSizes
        put(&mut h, 96 + 8, 4, 0x3000); // Import directory RVA
        put(&mut h, 96 + 12, 4, 0x80); // Import directory size
        h
    }

    #[test]
    fn decodes_pe32() {
        let header = pe32_header();
        let opt = OptionalHeader::read(&header, 0, 0xE0).unwrap();

        assert_eq!(opt.magic(), OptionalMagic::Pe32);
        assert!(opt.has_known_magic());
        assert!(!opt.is_pe32_plus());
        assert_eq!(opt.address_of_entry_point(), 0x1000);
        assert_eq!(opt.standard_value(StandardField::BaseOfData), Some(0x2000));
        assert_eq!(opt.image_base(), 0x0040_0000);
        assert_eq!(opt.section_alignment(), 0x1000);
        assert_eq!(opt.file_alignment(), 0x200);
        assert_eq!(opt.size_of_image(), 0x5000);
        assert_eq!(opt.number_of_rva_and_sizes(), 16);
        assert_eq!(opt.data_directories().len(), 16);

        let import = opt.data_directory(DataDirKey::Import).unwrap();
        assert_eq!(import.virtual_address, 0x3000);
        assert_eq!(import.size, 0x80);
        assert!(opt
            .dll_characteristics()
            .contains(DllCharacteristics::DYNAMIC_BASE | DllCharacteristics::NX_COMPAT));
    }

    #[test]
    fn decodes_pe32_plus() {
        let mut h = vec![0_u8; 0xF0];
        put(&mut h, 0, 2, 0x20B); // Magic
        put(&mut h, 16, 4, 0x1000); // AddressOfEntryPoint
        put(&mut h, 24, 8, 0x1_4000_0000); // ImageBase, 64-bit
        put(&mut h, 32, 4, 0x1000); // SectionAlignment
        put(&mut h, 36, 4, 0x200); // FileAlignment
        put(&mut h, 108, 4, 16); // NumberOfRvaAndSizes

        let opt = OptionalHeader::read(&h, 0, 0xF0).unwrap();
        assert!(opt.is_pe32_plus());
        assert_eq!(opt.image_base(), 0x1_4000_0000);
        // BaseOfData does not exist in the 64-bit layout
        assert_eq!(opt.standard_value(StandardField::BaseOfData), None);
        assert_eq!(opt.data_directories().len(), 16);
    }

    #[test]
    fn unknown_magic_falls_back_to_pe32() {
        let mut h = pe32_header();
        put(&mut h, 0, 2, 0x107); // ROM magic

        let opt = OptionalHeader::read(&h, 0, 0xE0).unwrap();
        assert_eq!(opt.raw_magic(), 0x107);
        assert!(!opt.has_known_magic());
        assert_eq!(opt.magic(), OptionalMagic::Pe32);
        assert_eq!(opt.address_of_entry_point(), 0x1000);
    }

    #[test]
    fn truncated_header_reads_what_fits() {
        let header = pe32_header();
        // Cut the file in the middle of the Windows fields
        let opt = OptionalHeader::read(&header[..40], 0, 0xE0).unwrap();

        assert_eq!(opt.section_alignment(), 0x1000);
        assert_eq!(opt.file_alignment(), 0x200);
        // Beyond the cut everything stays zero
        assert_eq!(opt.size_of_image(), 0);
        assert_eq!(opt.number_of_rva_and_sizes(), 0);
        assert!(opt.data_directories().is_empty());
        assert!(opt.file_backed() < opt.layout_size());
    }

    #[test]
    fn truncated_directory_table_stops_at_file_end() {
        let header = pe32_header();
        // Keep the first two directory entries and four bytes of the third
        let opt = OptionalHeader::read(&header[..96 + 20], 0, 0xE0).unwrap();
        assert_eq!(opt.data_directories().len(), 2);
    }

    #[test]
    fn directory_count_capped_at_sixteen() {
        let mut h = pe32_header();
        put(&mut h, 92, 4, 0x80); // NumberOfRvaAndSizes: 128
        h.resize(0x400, 0);

        let opt = OptionalHeader::read(&h, 0, 0xE0).unwrap();
        assert_eq!(opt.number_of_rva_and_sizes(), 0x80);
        assert_eq!(opt.data_directories().len(), 16);
    }

    #[test]
    fn missing_magic_is_an_error() {
        assert!(OptionalHeader::read(&[0x0B], 0, 0xE0).is_err());
        assert!(OptionalHeader::read(&[], 0, 0).is_err());
    }

    #[test]
    fn low_alignment_mode_requires_equal_small_alignments() {
        let mut h = pe32_header();
        put(&mut h, 32, 4, 0x200); // SectionAlignment
        put(&mut h, 36, 4, 0x200); // FileAlignment
        let opt = OptionalHeader::read(&h, 0, 0xE0).unwrap();
        assert!(opt.is_low_alignment_mode());

        let normal = OptionalHeader::read(&pe32_header(), 0, 0xE0).unwrap();
        assert!(!normal.is_low_alignment_mode());
    }
}
