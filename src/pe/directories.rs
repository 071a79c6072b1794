//! Data directory table entries and their physical resolution.
//!
//! The sixteen directory slots at the end of the optional header point at the export,
//! import, resource and other well known structures. All slots but one hold RVAs; the
//! certificate table is the historical oddity that stores a plain file offset instead.
//! Resolution turns each declared entry into the file offset and owning section the
//! loader would use, without ever touching the pointed-to bytes.

use strum::{Display, EnumCount, EnumIter, FromRepr};

use crate::pe::sections::SectionModel;

/// Well known data directory slots, in table order.
#[repr(usize)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumCount, EnumIter, FromRepr)]
pub enum DataDirKey {
    /// Export table
    Export = 0,
    /// Import table
    Import = 1,
    /// Resource table
    Resource = 2,
    /// Exception table
    Exception = 3,
    /// Attribute certificate table, stored as a file offset rather than an RVA
    Certificate = 4,
    /// Base relocation table
    BaseRelocation = 5,
    /// Debug data
    Debug = 6,
    /// Architecture specific data, reserved and expected zero
    Architecture = 7,
    /// Global pointer register value
    GlobalPtr = 8,
    /// Thread local storage table
    TlsTable = 9,
    /// Load configuration table
    LoadConfig = 10,
    /// Bound import table
    BoundImport = 11,
    /// Import address table
    ImportAddressTable = 12,
    /// Delay load import descriptors
    DelayImport = 13,
    /// CLR runtime header for managed images
    ClrRuntimeHeader = 14,
    /// Reserved slot, must be zero
    Reserved = 15,
}

impl DataDirKey {
    /// Whether this slot stores a file offset instead of an RVA.
    #[must_use]
    pub fn is_file_offset_based(self) -> bool {
        self == DataDirKey::Certificate
    }
}

/// One data directory entry as declared in the optional header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataDirEntry {
    /// Slot this entry occupies
    pub key: DataDirKey,
    /// Declared RVA, or file offset for the certificate slot
    pub virtual_address: u32,
    /// Declared size in bytes
    pub size: u32,
}

impl DataDirEntry {
    /// Whether the entry declares anything at all. A slot with both fields zero is
    /// simply unused.
    #[must_use]
    pub fn is_present(&self) -> bool {
        self.virtual_address != 0 || self.size != 0
    }

    /// Resolve the declared address to a physical location.
    ///
    /// RVA based entries are translated through the section model; the certificate
    /// entry's address is taken as a file offset directly. The owning section is the
    /// one whose mapped range contains the start address, when any does.
    #[must_use]
    pub fn resolve(&self, sections: &SectionModel) -> ResolvedDataDir {
        // A zero address declares nothing to point at, even when a size is present;
        // feeding it to the resolver would hit the header identity mapping.
        if self.virtual_address == 0 {
            return ResolvedDataDir {
                entry: *self,
                file_offset: None,
                section: None,
            };
        }

        let address = u64::from(self.virtual_address);
        let (file_offset, section) = if self.key.is_file_offset_based() {
            (Some(address), sections.section_containing_offset(address))
        } else {
            (
                sections.rva_to_file_offset(address),
                sections.section_containing_rva(address),
            )
        };

        ResolvedDataDir {
            entry: *self,
            file_offset,
            section,
        }
    }
}

/// A data directory entry with its physical location resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedDataDir {
    /// The entry as declared
    pub entry: DataDirEntry,
    /// File offset of the start address, `None` when nothing maps it
    pub file_offset: Option<u64>,
    /// 1-based ordinal of the section containing the start address
    pub section: Option<u32>,
}

impl ResolvedDataDir {
    /// Whether the declared start lies inside the physical file.
    #[must_use]
    pub fn is_in_file(&self, file_size: u64) -> bool {
        self.file_offset.is_some_and(|offset| offset < file_size)
    }
}
