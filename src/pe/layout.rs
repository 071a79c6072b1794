//! Static field layout tables for the COFF and optional headers.
//!
//! PE header fields live at fixed offsets that depend only on the optional-header magic
//! (PE32 vs PE32+). This module encodes those offsets as compile-time tables keyed by typed
//! field enums, so no other module hard-codes a header offset. Decoders iterate the field
//! enums, look up each [`FieldSpec`] and read the declared width; checks reference fields
//! through the same keys, which keeps anomaly output and decoding in agreement.
//!
//! # Key Components
//!
//! - [`crate::pe::layout::CoffField`] - COFF file header fields (magic independent)
//! - [`crate::pe::layout::StandardField`] - Optional header standard fields
//! - [`crate::pe::layout::WindowsField`] - Optional header windows-specific fields
//! - [`crate::pe::layout::OptionalMagic`] - The two decodable optional-header layouts

use strum::{Display, EnumCount, EnumIter};

/// Optional header magic value for PE32 images.
pub const PE32_MAGIC: u16 = 0x10B;
/// Optional header magic value for PE32+ images.
pub const PE32_PLUS_MAGIC: u16 = 0x20B;
/// Optional header magic value for ROM images. Not decodable here; reported as unusual.
pub const ROM_MAGIC: u16 = 0x107;

/// Size in bytes of the formatted MSDOS header.
pub const MSDOS_HEADER_SIZE: usize = 0x40;
/// File offset of the `e_lfanew` field holding the PE signature offset.
pub const LFANEW_OFFSET: usize = 0x3C;
/// Size in bytes of the `PE\0\0` signature.
pub const PE_SIGNATURE_SIZE: usize = 4;
/// Size in bytes of the COFF file header.
pub const COFF_HEADER_SIZE: usize = 20;
/// Size in bytes of one section table entry.
pub const SECTION_ENTRY_SIZE: usize = 40;

/// Location of a header field relative to the start of its structure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    /// Byte offset from the structure start
    pub offset: usize,
    /// Width of the on-disk field in bytes (1, 2, 4 or 8)
    pub width: usize,
}

impl FieldSpec {
    pub(crate) const fn new(offset: usize, width: usize) -> FieldSpec {
        FieldSpec { offset, width }
    }
}

/// The two optional-header layouts this crate can decode.
///
/// Files carrying any other magic (including the ROM magic 0x107) are decoded with the
/// [`OptionalMagic::Pe32`] table and flagged by the anomaly battery instead of rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum OptionalMagic {
    /// 32-bit layout, magic 0x10B
    Pe32,
    /// 64-bit layout, magic 0x20B
    Pe32Plus,
}

impl OptionalMagic {
    /// Map a raw magic value to a decodable layout, if it is one of the two known ones.
    #[must_use]
    pub fn from_raw(raw: u16) -> Option<OptionalMagic> {
        match raw {
            PE32_MAGIC => Some(OptionalMagic::Pe32),
            PE32_PLUS_MAGIC => Some(OptionalMagic::Pe32Plus),
            _ => None,
        }
    }

    /// Offset of the data directory table relative to the optional header start.
    #[must_use]
    pub fn data_directory_offset(self) -> usize {
        match self {
            OptionalMagic::Pe32 => 96,
            OptionalMagic::Pe32Plus => 112,
        }
    }
}

/// Fields of the COFF file header, in on-disk order.
///
/// The COFF header layout does not depend on the optional-header magic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter, EnumCount)]
pub enum CoffField {
    /// Target machine type
    Machine,
    /// Number of entries in the section table
    NumberOfSections,
    /// Link time as a Unix timestamp
    TimeDateStamp,
    /// File offset of the COFF symbol table, deprecated for images
    PointerToSymbolTable,
    /// Number of COFF symbol table entries, deprecated for images
    NumberOfSymbols,
    /// Declared size of the optional header, positions the section table
    SizeOfOptionalHeader,
    /// Image attribute flags
    Characteristics,
}

impl CoffField {
    /// Offset and width of this field within the COFF header.
    #[must_use]
    pub fn spec(self) -> FieldSpec {
        match self {
            CoffField::Machine => FieldSpec::new(0, 2),
            CoffField::NumberOfSections => FieldSpec::new(2, 2),
            CoffField::TimeDateStamp => FieldSpec::new(4, 4),
            CoffField::PointerToSymbolTable => FieldSpec::new(8, 4),
            CoffField::NumberOfSymbols => FieldSpec::new(12, 4),
            CoffField::SizeOfOptionalHeader => FieldSpec::new(16, 2),
            CoffField::Characteristics => FieldSpec::new(18, 2),
        }
    }
}

/// Standard fields of the optional header, in on-disk order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter, EnumCount)]
pub enum StandardField {
    /// Layout selector, 0x10B for PE32 and 0x20B for PE32+
    Magic,
    /// Linker major version
    MajorLinkerVersion,
    /// Linker minor version
    MinorLinkerVersion,
    /// Combined size of all code sections
    SizeOfCode,
    /// Combined size of all initialized data sections
    SizeOfInitializedData,
    /// Combined size of all uninitialized data sections
    SizeOfUninitializedData,
    /// RVA of the entry point, zero for resource-only images
    AddressOfEntryPoint,
    /// RVA of the beginning of the code section
    BaseOfCode,
    /// RVA of the beginning of the data section, PE32 only
    BaseOfData,
}

impl StandardField {
    /// Offset and width of this field for the given layout.
    ///
    /// Returns `None` for [`StandardField::BaseOfData`] under PE32+, where the field does
    /// not exist and its bytes belong to the widened image base.
    #[must_use]
    pub fn spec(self, magic: OptionalMagic) -> Option<FieldSpec> {
        let spec = match self {
            StandardField::Magic => FieldSpec::new(0, 2),
            StandardField::MajorLinkerVersion => FieldSpec::new(2, 1),
            StandardField::MinorLinkerVersion => FieldSpec::new(3, 1),
            StandardField::SizeOfCode => FieldSpec::new(4, 4),
            StandardField::SizeOfInitializedData => FieldSpec::new(8, 4),
            StandardField::SizeOfUninitializedData => FieldSpec::new(12, 4),
            StandardField::AddressOfEntryPoint => FieldSpec::new(16, 4),
            StandardField::BaseOfCode => FieldSpec::new(20, 4),
            StandardField::BaseOfData => {
                if magic == OptionalMagic::Pe32Plus {
                    return None;
                }
                FieldSpec::new(24, 4)
            }
        };
        Some(spec)
    }
}

/// Windows-specific fields of the optional header, in on-disk order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter, EnumCount)]
pub enum WindowsField {
    /// Preferred load address, must be a multiple of 64K
    ImageBase,
    /// In-memory section alignment, defaults to the page size
    SectionAlignment,
    /// On-disk section alignment, defaults to 512
    FileAlignment,
    /// Required operating system major version
    MajorOperatingSystemVersion,
    /// Required operating system minor version
    MinorOperatingSystemVersion,
    /// Image major version
    MajorImageVersion,
    /// Image minor version
    MinorImageVersion,
    /// Subsystem major version
    MajorSubsystemVersion,
    /// Subsystem minor version
    MinorSubsystemVersion,
    /// Reserved, must be zero
    Win32VersionValue,
    /// Size of the mapped image, multiple of SectionAlignment
    SizeOfImage,
    /// Combined size of all headers rounded to FileAlignment
    SizeOfHeaders,
    /// Image checksum, validated only for drivers and critical DLLs
    CheckSum,
    /// Required subsystem (GUI, console, driver, ...)
    Subsystem,
    /// DLL characteristics flags (ASLR, DEP, ...)
    DllCharacteristics,
    /// Reserved stack size
    SizeOfStackReserve,
    /// Committed stack size
    SizeOfStackCommit,
    /// Reserved heap size
    SizeOfHeapReserve,
    /// Committed heap size
    SizeOfHeapCommit,
    /// Reserved, must be zero
    LoaderFlags,
    /// Number of data directory entries that follow
    NumberOfRvaAndSizes,
}

impl WindowsField {
    /// Offset and width of this field for the given layout.
    #[must_use]
    pub fn spec(self, magic: OptionalMagic) -> FieldSpec {
        let pe32 = magic == OptionalMagic::Pe32;
        match self {
            WindowsField::ImageBase => {
                if pe32 {
                    FieldSpec::new(28, 4)
                } else {
                    FieldSpec::new(24, 8)
                }
            }
            WindowsField::SectionAlignment => FieldSpec::new(32, 4),
            WindowsField::FileAlignment => FieldSpec::new(36, 4),
            WindowsField::MajorOperatingSystemVersion => FieldSpec::new(40, 2),
            WindowsField::MinorOperatingSystemVersion => FieldSpec::new(42, 2),
            WindowsField::MajorImageVersion => FieldSpec::new(44, 2),
            WindowsField::MinorImageVersion => FieldSpec::new(46, 2),
            WindowsField::MajorSubsystemVersion => FieldSpec::new(48, 2),
            WindowsField::MinorSubsystemVersion => FieldSpec::new(50, 2),
            WindowsField::Win32VersionValue => FieldSpec::new(52, 4),
            WindowsField::SizeOfImage => FieldSpec::new(56, 4),
            WindowsField::SizeOfHeaders => FieldSpec::new(60, 4),
            WindowsField::CheckSum => FieldSpec::new(64, 4),
            WindowsField::Subsystem => FieldSpec::new(68, 2),
            WindowsField::DllCharacteristics => FieldSpec::new(70, 2),
            WindowsField::SizeOfStackReserve => {
                if pe32 {
                    FieldSpec::new(72, 4)
                } else {
                    FieldSpec::new(72, 8)
                }
            }
            WindowsField::SizeOfStackCommit => {
                if pe32 {
                    FieldSpec::new(76, 4)
                } else {
                    FieldSpec::new(80, 8)
                }
            }
            WindowsField::SizeOfHeapReserve => {
                if pe32 {
                    FieldSpec::new(80, 4)
                } else {
                    FieldSpec::new(88, 8)
                }
            }
            WindowsField::SizeOfHeapCommit => {
                if pe32 {
                    FieldSpec::new(84, 4)
                } else {
                    FieldSpec::new(96, 8)
                }
            }
            WindowsField::LoaderFlags => {
                if pe32 {
                    FieldSpec::new(88, 4)
                } else {
                    FieldSpec::new(104, 4)
                }
            }
            WindowsField::NumberOfRvaAndSizes => {
                if pe32 {
                    FieldSpec::new(92, 4)
                } else {
                    FieldSpec::new(108, 4)
                }
            }
        }
    }
}

/// Read a field described by `spec` from `data`, little-endian, widened to `u64`.
///
/// Returns `None` when the field does not fit inside `data`; tolerant decoding maps that
/// to a zero-valued field plus an anomaly, never an error.
#[must_use]
pub fn read_field(data: &[u8], spec: FieldSpec) -> Option<u64> {
    let end = spec.offset.checked_add(spec.width)?;
    if end > data.len() {
        return None;
    }
    let bytes = &data[spec.offset..end];
    let value = match spec.width {
        1 => u64::from(bytes[0]),
        2 => u64::from(u16::from_le_bytes([bytes[0], bytes[1]])),
        4 => u64::from(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])),
        8 => u64::from_le_bytes([
            bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5], bytes[6], bytes[7],
        ]),
        _ => return None,
    };
    Some(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn coff_fields_cover_the_header() {
        let mut end = 0;
        for field in CoffField::iter() {
            let spec = field.spec();
            assert_eq!(spec.offset, end, "{field} not contiguous");
            end = spec.offset + spec.width;
        }
        assert_eq!(end, COFF_HEADER_SIZE);
    }

    #[test]
    fn pe32_standard_fields_are_contiguous() {
        let mut end = 0;
        for field in StandardField::iter() {
            let spec = field.spec(OptionalMagic::Pe32).unwrap();
            assert_eq!(spec.offset, end, "{field} not contiguous");
            end = spec.offset + spec.width;
        }
        // PE32 windows fields start right after BaseOfData
        assert_eq!(end, 28);
    }

    #[test]
    fn pe32_plus_has_no_base_of_data() {
        assert!(StandardField::BaseOfData
            .spec(OptionalMagic::Pe32Plus)
            .is_none());
        assert_eq!(
            WindowsField::ImageBase.spec(OptionalMagic::Pe32Plus),
            FieldSpec::new(24, 8)
        );
    }

    #[test]
    fn windows_fields_end_at_directory_table() {
        for magic in [OptionalMagic::Pe32, OptionalMagic::Pe32Plus] {
            let spec = WindowsField::NumberOfRvaAndSizes.spec(magic);
            assert_eq!(spec.offset + spec.width, magic.data_directory_offset());
        }
    }

    #[test]
    fn magic_mapping() {
        assert_eq!(OptionalMagic::from_raw(0x10B), Some(OptionalMagic::Pe32));
        assert_eq!(
            OptionalMagic::from_raw(0x20B),
            Some(OptionalMagic::Pe32Plus)
        );
        assert_eq!(OptionalMagic::from_raw(ROM_MAGIC), None);
        assert_eq!(OptionalMagic::from_raw(0), None);
    }

    #[test]
    fn read_field_widths_and_bounds() {
        let data = [0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77, 0x88, 0x99];

        assert_eq!(read_field(&data, FieldSpec::new(0, 1)), Some(0x11));
        assert_eq!(read_field(&data, FieldSpec::new(0, 2)), Some(0x2211));
        assert_eq!(read_field(&data, FieldSpec::new(1, 4)), Some(0x5544_3322));
        assert_eq!(
            read_field(&data, FieldSpec::new(0, 8)),
            Some(0x8877_6655_4433_2211)
        );
        assert_eq!(read_field(&data, FieldSpec::new(8, 2)), None);
        assert_eq!(read_field(&data, FieldSpec::new(usize::MAX, 2)), None);
    }
}
