//! Section table decoding.
//!
//! The section table drives address translation, overlay detection and a large share of
//! the structural checks, so it has to survive everything an adversarial file can throw
//! at it: counts in the tens of thousands, tables that start beyond the file end, rows
//! cut in half by truncation. Loading never fails. Rows the file cannot fully back are
//! simply absent from the model, and the declared count is kept alongside the loaded
//! rows so the gap itself becomes an observable fact.

use bitflags::bitflags;

use crate::pe::layout::{read_field, FieldSpec, SECTION_ENTRY_SIZE};

/// Hard ceiling on section rows read from a file, regardless of the declared count.
///
/// The Windows loader refuses images beyond 96 sections; files declaring tens of
/// thousands are using the count as a resource exhaustion primitive. Reading stops here
/// and the declared count is reported as is.
pub const SECTION_READ_CEILING: usize = 4096;

bitflags! {
    /// Section attribute flags from the section header `Characteristics` field.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct SectionFlags: u32 {
        /// Do not pad to the next boundary, replaced by alignment flags
        const TYPE_NO_PAD = 0x0000_0008;
        /// Section contains executable code
        const CNT_CODE = 0x0000_0020;
        /// Section contains initialized data
        const CNT_INITIALIZED_DATA = 0x0000_0040;
        /// Section contains uninitialized data
        const CNT_UNINITIALIZED_DATA = 0x0000_0080;
        /// Reserved for future use
        const LNK_OTHER = 0x0000_0100;
        /// Section contains comments, object files only
        const LNK_INFO = 0x0000_0200;
        /// Section will not become part of the image, object files only
        const LNK_REMOVE = 0x0000_0800;
        /// Section contains COMDAT data, object files only
        const LNK_COMDAT = 0x0000_1000;
        /// Section contains data referenced through the global pointer
        const GPREL = 0x0000_8000;
        /// Reserved for future use
        const MEM_PURGEABLE = 0x0002_0000;
        /// Reserved for future use
        const MEM_LOCKED = 0x0004_0000;
        /// Reserved for future use
        const MEM_PRELOAD = 0x0008_0000;
        /// Section contains extended relocations
        const LNK_NRELOC_OVFL = 0x0100_0000;
        /// Section can be discarded as needed
        const MEM_DISCARDABLE = 0x0200_0000;
        /// Section cannot be cached
        const MEM_NOT_CACHED = 0x0400_0000;
        /// Section cannot be paged
        const MEM_NOT_PAGED = 0x0800_0000;
        /// Section can be shared in memory
        const MEM_SHARED = 0x1000_0000;
        /// Section can be executed
        const MEM_EXECUTE = 0x2000_0000;
        /// Section can be read
        const MEM_READ = 0x4000_0000;
        /// Section can be written to
        const MEM_WRITE = 0x8000_0000;
    }
}

impl SectionFlags {
    /// Flags that only carry meaning in object files; set bits in an image are reported
    /// as anomalies.
    pub const DEPRECATED: SectionFlags = SectionFlags::TYPE_NO_PAD
        .union(SectionFlags::LNK_INFO)
        .union(SectionFlags::LNK_REMOVE)
        .union(SectionFlags::LNK_COMDAT);

    /// Raw mask of all bits the PE specification reserves, including the unnamed low
    /// bits that have no flag constant.
    pub const RESERVED_MASK: u32 = 0x0000_0417
        | SectionFlags::MEM_PURGEABLE.bits()
        | SectionFlags::MEM_LOCKED.bits()
        | SectionFlags::MEM_PRELOAD.bits();
}

/// One fully decoded section table row.
///
/// Ordinals are 1-based to match the convention of PE tooling and loader error messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionRecord {
    /// 1-based position in the section table
    pub ordinal: u32,
    /// Name exactly as stored, including padding bytes
    pub name_bytes: [u8; 8],
    /// Size of the section when loaded, unrounded
    pub virtual_size: u32,
    /// RVA where the section is mapped
    pub virtual_address: u32,
    /// Declared size of the raw data on disk
    pub size_of_raw_data: u32,
    /// Declared file offset of the raw data
    pub pointer_to_raw_data: u32,
    /// File offset of COFF relocations, images have none
    pub pointer_to_relocations: u32,
    /// File offset of COFF line numbers, deprecated
    pub pointer_to_linenumbers: u32,
    /// Number of COFF relocations, images have none
    pub number_of_relocations: u16,
    /// Number of COFF line numbers, deprecated
    pub number_of_linenumbers: u16,
    /// Raw characteristics bits
    pub characteristics: u32,
}

impl SectionRecord {
    fn decode(ordinal: u32, row: &[u8]) -> SectionRecord {
        let mut name_bytes = [0_u8; 8];
        name_bytes.copy_from_slice(&row[..8]);

        let field = |offset, width| read_field(row, FieldSpec::new(offset, width)).unwrap_or(0);

        SectionRecord {
            ordinal,
            name_bytes,
            virtual_size: field(8, 4) as u32,
            virtual_address: field(12, 4) as u32,
            size_of_raw_data: field(16, 4) as u32,
            pointer_to_raw_data: field(20, 4) as u32,
            pointer_to_relocations: field(24, 4) as u32,
            pointer_to_linenumbers: field(28, 4) as u32,
            number_of_relocations: field(32, 2) as u16,
            number_of_linenumbers: field(34, 2) as u16,
            characteristics: field(36, 4) as u32,
        }
    }

    /// Name with the NUL padding removed, decoded as UTF-8 with replacement characters
    /// for invalid bytes.
    #[must_use]
    pub fn name(&self) -> String {
        let end = self
            .name_bytes
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(self.name_bytes.len());
        String::from_utf8_lossy(&self.name_bytes[..end]).into_owned()
    }

    /// Name safe for log lines and reports, with control characters replaced by `.`.
    #[must_use]
    pub fn name_display(&self) -> String {
        self.name()
            .chars()
            .map(|c| if c.is_control() { '.' } else { c })
            .collect()
    }

    /// Whether the name is empty after NUL trimming.
    #[must_use]
    pub fn has_empty_name(&self) -> bool {
        self.name_bytes[0] == 0
    }

    /// Characteristics as typed flags. Reserved unnamed bits are dropped by the type;
    /// check them against [`SectionFlags::RESERVED_MASK`] on the raw value.
    #[must_use]
    pub fn flags(&self) -> SectionFlags {
        SectionFlags::from_bits_truncate(self.characteristics)
    }

    /// Raw data start rounded the way the loader rounds it: down to the nearest 512
    /// byte boundary, except in low alignment mode where the stored value is used as is.
    #[must_use]
    pub fn aligned_pointer_to_raw(&self, low_alignment: bool) -> u64 {
        let raw = u64::from(self.pointer_to_raw_data);
        if low_alignment {
            raw
        } else {
            raw & !0x1FF
        }
    }

    /// Raw data size rounded the way the loader rounds it: up to the next 4096 byte
    /// boundary, except in low alignment mode where the stored value is used as is.
    #[must_use]
    pub fn aligned_size_of_raw(&self, low_alignment: bool) -> u64 {
        let raw = u64::from(self.size_of_raw_data);
        if low_alignment {
            return raw;
        }
        if raw % 4096 == 0 {
            raw
        } else {
            (raw / 4096 + 1) * 4096
        }
    }

    /// Virtual address rounded down to the nearest 4096 byte boundary, except in low
    /// alignment mode where the stored value is used as is.
    #[must_use]
    pub fn aligned_virtual_address(&self, low_alignment: bool) -> u64 {
        let va = u64::from(self.virtual_address);
        if low_alignment {
            va
        } else {
            va & !0xFFF
        }
    }

    /// Virtual size rounded up to the next 4096 byte boundary, except in low alignment
    /// mode where the stored value is used as is.
    #[must_use]
    pub fn aligned_virtual_size(&self, low_alignment: bool) -> u64 {
        let vs = u64::from(self.virtual_size);
        if low_alignment {
            return vs;
        }
        if vs % 4096 == 0 {
            vs
        } else {
            (vs / 4096 + 1) * 4096
        }
    }
}

/// The section table together with the header context address translation needs.
///
/// Built once per file and shared by the resolver, the structural checks and the
/// reversing hint scanner. The model keeps what the file declares next to what the file
/// delivers; consumers decide what the difference means.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionModel {
    records: Vec<SectionRecord>,
    declared_count: u64,
    table_offset: u64,
    low_alignment: bool,
    file_size: u64,
    size_of_headers: u64,
}

impl SectionModel {
    /// Decode the section table at `table_offset` within `data`.
    ///
    /// Rows are read in file order until the declared count, the read ceiling or the
    /// file end is reached, whichever comes first. A row the file cannot fully back is
    /// not decoded.
    ///
    /// # Arguments
    /// * `data` - The complete file image
    /// * `table_offset` - File offset of the first section table row
    /// * `declared_count` - `NumberOfSections` from the COFF header
    /// * `low_alignment` - Whether the image runs in low alignment mode
    /// * `size_of_headers` - `SizeOfHeaders` from the optional header, zero if absent
    #[must_use]
    pub fn read(
        data: &[u8],
        table_offset: usize,
        declared_count: u64,
        low_alignment: bool,
        size_of_headers: u64,
    ) -> SectionModel {
        let to_read = (declared_count as usize).min(SECTION_READ_CEILING);

        let mut records = Vec::with_capacity(to_read.min(256));
        for index in 0..to_read {
            let Some(start) = (index * SECTION_ENTRY_SIZE).checked_add(table_offset) else {
                break;
            };
            let Some(end) = start.checked_add(SECTION_ENTRY_SIZE) else {
                break;
            };
            if end > data.len() {
                break;
            }
            records.push(SectionRecord::decode(index as u32 + 1, &data[start..end]));
        }

        SectionModel {
            records,
            declared_count,
            table_offset: table_offset as u64,
            low_alignment,
            file_size: data.len() as u64,
            size_of_headers,
        }
    }

    /// All fully decoded rows in file order.
    #[must_use]
    pub fn records(&self) -> &[SectionRecord] {
        &self.records
    }

    /// Row with the given 1-based ordinal.
    #[must_use]
    pub fn get(&self, ordinal: u32) -> Option<&SectionRecord> {
        if ordinal == 0 {
            return None;
        }
        self.records.get(ordinal as usize - 1)
    }

    /// `NumberOfSections` exactly as declared by the COFF header.
    #[must_use]
    pub fn declared_count(&self) -> u64 {
        self.declared_count
    }

    /// Number of rows the file actually backed.
    #[must_use]
    pub fn loaded_count(&self) -> usize {
        self.records.len()
    }

    /// Number of rows that should have been readable: the declared count capped at the
    /// read ceiling.
    #[must_use]
    pub fn expected_count(&self) -> usize {
        (self.declared_count as usize).min(SECTION_READ_CEILING)
    }

    /// Whether the file ends before the declared table does.
    #[must_use]
    pub fn is_truncated(&self) -> bool {
        self.loaded_count() < self.expected_count()
    }

    /// File offset of the first section table row.
    #[must_use]
    pub fn table_offset(&self) -> u64 {
        self.table_offset
    }

    /// Whether the image runs in low alignment mode.
    #[must_use]
    pub fn is_low_alignment(&self) -> bool {
        self.low_alignment
    }

    /// Total size of the underlying file in bytes.
    #[must_use]
    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    /// `SizeOfHeaders` from the optional header, zero if the header was absent.
    #[must_use]
    pub fn size_of_headers(&self) -> u64 {
        self.size_of_headers
    }
}
