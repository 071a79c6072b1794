//! COFF file header decoding.
//!
//! The COFF header follows the `PE\0\0` signature and anchors everything else: the section
//! count, the optional-header size (which positions the section table), and the image
//! characteristics. Its twenty bytes are the last structure whose absence is fatal; from
//! here on every malformation degrades into anomalies.

use bitflags::bitflags;

use crate::{
    pe::layout::{read_field, CoffField, COFF_HEADER_SIZE},
    Result,
};
use strum::{EnumCount, IntoEnumIterator};

bitflags! {
    /// Image attribute flags from the COFF header `Characteristics` field.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct FileCharacteristics: u16 {
        /// Relocation information was stripped from the file
        const RELOCS_STRIPPED = 0x0001;
        /// The file is executable (no unresolved external references)
        const EXECUTABLE_IMAGE = 0x0002;
        /// COFF line numbers were stripped, deprecated and expected zero
        const LINE_NUMS_STRIPPED = 0x0004;
        /// COFF local symbols were stripped, deprecated and expected zero
        const LOCAL_SYMS_STRIPPED = 0x0008;
        /// Aggressively trim the working set, deprecated since Windows 2000
        const AGGRESSIVE_WS_TRIM = 0x0010;
        /// The image can handle addresses beyond 2 GB
        const LARGE_ADDRESS_AWARE = 0x0020;
        /// Reserved, must be zero
        const RESERVED_0040 = 0x0040;
        /// Little endian byte order, deprecated and expected zero
        const BYTES_REVERSED_LO = 0x0080;
        /// The target machine is 32-bit
        const MACHINE_32BIT = 0x0100;
        /// Debugging information was removed
        const DEBUG_STRIPPED = 0x0200;
        /// Copy to swap when run from removable media
        const REMOVABLE_RUN_FROM_SWAP = 0x0400;
        /// Copy to swap when run from the network
        const NET_RUN_FROM_SWAP = 0x0800;
        /// System file, not a user program
        const SYSTEM = 0x1000;
        /// The image is a DLL
        const DLL = 0x2000;
        /// Run only on a uniprocessor machine
        const UP_SYSTEM_ONLY = 0x4000;
        /// Big endian byte order, deprecated and expected zero
        const BYTES_REVERSED_HI = 0x8000;
    }
}

impl FileCharacteristics {
    /// Flags deprecated by the PE specification; set bits are reported as anomalies.
    pub const DEPRECATED: FileCharacteristics = FileCharacteristics::LINE_NUMS_STRIPPED
        .union(FileCharacteristics::LOCAL_SYMS_STRIPPED)
        .union(FileCharacteristics::AGGRESSIVE_WS_TRIM)
        .union(FileCharacteristics::BYTES_REVERSED_LO)
        .union(FileCharacteristics::BYTES_REVERSED_HI);

    /// Flags reserved by the PE specification; set bits are reported as anomalies.
    pub const RESERVED: FileCharacteristics = FileCharacteristics::RESERVED_0040;
}

/// Decoded COFF file header.
///
/// Field values are stored widened to `u64` and accessed through [`CoffField`] keys, so
/// checks and callers never hard-code offsets or widths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoffHeader {
    /// Decoded field values indexed by [`CoffField`] declaration order
    values: [u64; CoffField::COUNT],
}

impl CoffHeader {
    /// Decode the COFF header at `offset` within `data`.
    ///
    /// # Arguments
    /// * `data` - The complete file image
    /// * `offset` - File offset of the COFF header (PE signature offset + 4)
    ///
    /// # Errors
    /// Returns [`crate::Error::NotPeFile`] if the twenty header bytes do not fit inside
    /// the file. Without them there is no section count and no optional-header size, so
    /// not even a degraded model can be built.
    pub fn read(data: &[u8], offset: usize) -> Result<CoffHeader> {
        let Some(end) = offset.checked_add(COFF_HEADER_SIZE) else {
            return Err(not_pe_error!("COFF header offset {:#X} overflows", offset));
        };
        if end > data.len() {
            return Err(not_pe_error!(
                "COFF header at {:#X} is truncated by the {} byte file",
                offset,
                data.len()
            ));
        }

        let header = &data[offset..end];
        let mut values = [0_u64; CoffField::COUNT];
        for field in CoffField::iter() {
            // The bounds above guarantee every spec fits
            if let Some(value) = read_field(header, field.spec()) {
                values[field as usize] = value;
            }
        }

        Ok(CoffHeader { values })
    }

    /// Value of `field`, widened to `u64`.
    #[must_use]
    pub fn value(&self, field: CoffField) -> u64 {
        self.values[field as usize]
    }

    /// Target machine type.
    #[must_use]
    pub fn machine(&self) -> u64 {
        self.value(CoffField::Machine)
    }

    /// Declared number of section table entries.
    #[must_use]
    pub fn number_of_sections(&self) -> u64 {
        self.value(CoffField::NumberOfSections)
    }

    /// Declared size of the optional header in bytes.
    #[must_use]
    pub fn size_of_optional_header(&self) -> u64 {
        self.value(CoffField::SizeOfOptionalHeader)
    }

    /// File offset of the COFF symbol table. Deprecated for images, expected zero.
    #[must_use]
    pub fn pointer_to_symbol_table(&self) -> u64 {
        self.value(CoffField::PointerToSymbolTable)
    }

    /// Number of COFF symbols. Deprecated for images, expected zero.
    #[must_use]
    pub fn number_of_symbols(&self) -> u64 {
        self.value(CoffField::NumberOfSymbols)
    }

    /// Image characteristics as typed flags. Unknown bits are dropped by the type; the
    /// raw value remains available through [`CoffHeader::value`].
    #[must_use]
    pub fn characteristics(&self) -> FileCharacteristics {
        FileCharacteristics::from_bits_truncate(self.value(CoffField::Characteristics) as u16)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_all_fields() {
        #[rustfmt::skip]
        let header = [
            0x4C, 0x01,             // Machine: 0x14C (i386)
            0x03, 0x00,             // NumberOfSections: 3
            0x78, 0x56, 0x34, 0x12, // TimeDateStamp
            0x00, 0x00, 0x00, 0x00, // PointerToSymbolTable
            0x00, 0x00, 0x00, 0x00, // NumberOfSymbols
            0xE0, 0x00,             // SizeOfOptionalHeader: 0xE0
            0x02, 0x01,             // Characteristics: EXECUTABLE | MACHINE_32BIT
        ];

        let coff = CoffHeader::read(&header, 0).unwrap();
        assert_eq!(coff.machine(), 0x14C);
        assert_eq!(coff.number_of_sections(), 3);
        assert_eq!(coff.value(CoffField::TimeDateStamp), 0x1234_5678);
        assert_eq!(coff.size_of_optional_header(), 0xE0);
        assert!(coff
            .characteristics()
            .contains(FileCharacteristics::EXECUTABLE_IMAGE | FileCharacteristics::MACHINE_32BIT));
    }

    #[test]
    fn decodes_at_offset() {
        let mut data = vec![0xCC_u8; 0x40];
        data.extend_from_slice(&[0_u8; COFF_HEADER_SIZE]);
        data[0x40] = 0x64;
        data[0x41] = 0x86; // Machine: 0x8664 (x64)
        data[0x42] = 0x01; // NumberOfSections: 1

        let coff = CoffHeader::read(&data, 0x40).unwrap();
        assert_eq!(coff.machine(), 0x8664);
        assert_eq!(coff.number_of_sections(), 1);
    }

    #[test]
    fn rejects_truncated_header() {
        let data = vec![0_u8; COFF_HEADER_SIZE - 1];
        assert!(CoffHeader::read(&data, 0).is_err());
        assert!(CoffHeader::read(&data, usize::MAX).is_err());
    }

    #[test]
    fn deprecated_and_reserved_masks_are_disjoint() {
        assert!(FileCharacteristics::DEPRECATED
            .intersection(FileCharacteristics::RESERVED)
            .is_empty());
        assert!(FileCharacteristics::DEPRECATED.contains(FileCharacteristics::BYTES_REVERSED_HI));
        assert!(FileCharacteristics::RESERVED.contains(FileCharacteristics::RESERVED_0040));
    }
}
