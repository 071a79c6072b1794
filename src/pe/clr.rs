//! Shallow probe of the CLR runtime header and metadata root.
//!
//! Managed images carry a COR20 header pointed at by the fifteenth data directory and a
//! metadata root it references in turn. This probe goes exactly two pointers deep: it
//! decodes the COR20 fields and the metadata root's version string region, because
//! obfuscators love to corrupt that string while leaving everything the runtime checks
//! intact. No streams, no tables, no managed structure beyond the root.

use crate::pe::{
    directories::DataDirEntry,
    layout::{read_field, FieldSpec},
    sections::SectionModel,
};

/// Signature of the metadata root, `BSJB` in little endian.
pub const METADATA_SIGNATURE: u32 = 0x424A_5342;

/// Longest version string a sane metadata root declares.
const MAX_VERSION_LENGTH: u64 = 255;

/// Decoded COR20 header with the metadata root it points at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClrProbe {
    /// File offset of the COR20 header
    pub cor20_offset: u64,
    /// Declared size of the COR20 header
    pub header_size: u32,
    /// Major and minor runtime version
    pub runtime_version: (u16, u16),
    /// RVA of the metadata root
    pub metadata_rva: u32,
    /// Declared size of the metadata
    pub metadata_size: u32,
    /// COR20 flags, raw
    pub flags: u32,
    /// The metadata root, when its header bytes are inside the file
    pub metadata: Option<MetadataRoot>,
}

/// The metadata root header, decoded just far enough to judge the version string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataRoot {
    /// File offset of the root
    pub offset: u64,
    /// Whether the `BSJB` signature is in place
    pub signature_valid: bool,
    /// Declared length of the version string region
    pub version_length: u32,
    /// The version string, `None` when the region is malformed
    pub version: Option<String>,
}

impl MetadataRoot {
    /// Whether the root looks genuine but its version string region is corrupt. This is
    /// the combination obfuscators produce; a wrong signature is a different problem.
    #[must_use]
    pub fn has_broken_version(&self) -> bool {
        self.signature_valid && self.version.is_none()
    }
}

impl ClrProbe {
    /// Probe the CLR structures referenced by `entry`.
    ///
    /// Returns `None` when the directory declares nothing, nothing maps its RVA, or the
    /// first sixteen COR20 bytes are not inside the file. Every deeper malformation is
    /// captured in the returned fields instead.
    #[must_use]
    pub fn read(data: &[u8], sections: &SectionModel, entry: &DataDirEntry) -> Option<ClrProbe> {
        if entry.virtual_address == 0 {
            return None;
        }
        let cor20_offset = sections.rva_to_file_offset(u64::from(entry.virtual_address))?;
        let base = usize::try_from(cor20_offset).ok()?;
        let header = data.get(base..)?;

        let header_size = read_field(header, FieldSpec::new(0, 4))? as u32;
        let major = read_field(header, FieldSpec::new(4, 2))? as u16;
        let minor = read_field(header, FieldSpec::new(6, 2))? as u16;
        let metadata_rva = read_field(header, FieldSpec::new(8, 4))? as u32;
        let metadata_size = read_field(header, FieldSpec::new(12, 4))? as u32;
        let flags = read_field(header, FieldSpec::new(16, 4)).unwrap_or(0) as u32;

        let metadata = read_metadata_root(data, sections, metadata_rva);

        Some(ClrProbe {
            cor20_offset,
            header_size,
            runtime_version: (major, minor),
            metadata_rva,
            metadata_size,
            flags,
            metadata,
        })
    }
}

fn read_metadata_root(
    data: &[u8],
    sections: &SectionModel,
    metadata_rva: u32,
) -> Option<MetadataRoot> {
    if metadata_rva == 0 {
        return None;
    }
    let offset = sections.rva_to_file_offset(u64::from(metadata_rva))?;
    let base = usize::try_from(offset).ok()?;
    let root = data.get(base..)?;

    let signature = read_field(root, FieldSpec::new(0, 4))? as u32;
    let version_length = read_field(root, FieldSpec::new(12, 4))? as u32;
    let signature_valid = signature == METADATA_SIGNATURE;

    let version = if signature_valid {
        read_version_string(root, version_length)
    } else {
        None
    };

    Some(MetadataRoot {
        offset,
        signature_valid,
        version_length,
        version,
    })
}

/// Decode the version string region, returning `None` for every way it can be broken:
/// zero or oversized length, region outside the file, missing NUL terminator, empty
/// string, or bytes outside printable ASCII.
fn read_version_string(root: &[u8], version_length: u32) -> Option<String> {
    let length = u64::from(version_length);
    if length == 0 || length > MAX_VERSION_LENGTH {
        return None;
    }
    let region = root.get(16..16 + length as usize)?;
    let terminator = region.iter().position(|&b| b == 0)?;
    if terminator == 0 {
        return None;
    }
    let bytes = &region[..terminator];
    if bytes.iter().any(|&b| !(0x20..=0x7E).contains(&b)) {
        return None;
    }
    Some(String::from_utf8_lossy(bytes).into_owned())
}
