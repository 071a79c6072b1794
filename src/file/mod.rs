//! PE file abstraction and structural decoding.
//!
//! This module provides the loading pipeline that turns raw bytes into a queryable
//! [`crate::PeFile`]. It abstracts over different data sources (files, memory) and
//! drives the header chain decode: MS-DOS header, PE signature, COFF header, optional
//! header, section table, data directories, and the CLR probe for managed images.
//!
//! # Architecture
//!
//! Loading is deliberately forgiving. Adversarial samples truncate, collapse, and
//! cross-link their headers on purpose, so only four conditions abort a load:
//!
//! - The input is shorter than a complete MS-DOS header
//! - The `MZ` signature is missing
//! - `e_lfanew` points outside the file
//! - The `PE\0\0` signature or the 20 byte COFF header cannot be read
//!
//! Everything past the COFF header degrades instead of failing: a missing optional
//! header, a truncated section table, or unresolvable data directories produce a
//! loaded file whose anomaly scan reports the damage.
//!
//! # Key Components
//!
//! ## Core Types
//! - [`crate::PeFile`] - Loaded file with decoded headers and scan entry points
//! - [`crate::file::Backend`] - Trait for data sources (disk files, memory buffers)
//!
//! ## Parsing Infrastructure
//! - [`crate::file::parser::Parser`] - Bounds-checked cursor over raw bytes
//! - [`crate::file::io`] - Little-endian primitive reads
//!
//! ## Backend Implementations
//! - [`crate::file::physical::Physical`] - Memory-mapped file backend for disk access
//! - [`crate::file::memory::Memory`] - In-memory buffer backend
//!
//! # Examples
//!
//! ## Loading from File
//!
//! ```rust,no_run
//! use pescope::PeFile;
//!
//! let pe = PeFile::from_file("sample.exe")?;
//! println!("loaded {} bytes, {} sections", pe.len(), pe.sections().loaded_count());
//!
//! for anomaly in pe.scan_anomalies() {
//!     println!("{anomaly}");
//! }
//! # Ok::<(), pescope::Error>(())
//! ```
//!
//! ## Loading from Memory
//!
//! ```rust,no_run
//! use pescope::PeFile;
//!
//! let data = std::fs::read("sample.exe")?;
//! let pe = PeFile::from_mem(data)?;
//!
//! if let Some(offset) = pe.resolve_rva(0x1000) {
//!     println!("RVA 0x1000 is at file offset {offset:#X}");
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! # Integration
//!
//! The decoded structures come from [`crate::pe`]; the scan entry points delegate to
//! [`crate::anomalies`] and [`crate::rehints`]. For scanning whole directories of
//! samples see [`crate::batch`].

pub mod io;
pub mod parser;

pub mod memory;
pub mod physical;

pub use memory::Memory;
pub use physical::Physical;

use std::{fmt, path::Path};

use crate::{
    anomalies::{run_checks, Anomaly, CheckContext},
    pe::{
        layout::{COFF_HEADER_SIZE, PE_SIGNATURE_SIZE},
        ClrProbe, CoffHeader, DataDirKey, MsdosHeader, OptionalHeader, ResolvedDataDir,
        SectionModel,
    },
    rehints::{run_hints, HintContext, ReHint, Signals},
    Error::Empty,
    Result,
};

/// The `PE\0\0` signature preceding the COFF header.
const PE_SIGNATURE: &[u8; 4] = b"PE\0\0";

/// Backend trait for file data sources.
///
/// This trait abstracts over the source of PE data, allowing for both in-memory and
/// on-disk representations. All implementations must be thread-safe.
pub trait Backend: Send + Sync {
    /// Returns a slice of the data at the given offset and length.
    ///
    /// # Arguments
    ///
    /// * `offset` - The starting offset within the data.
    /// * `len` - The length of the slice in bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the requested range is out of bounds.
    fn data_slice(&self, offset: usize, len: usize) -> Result<&[u8]>;

    /// Returns the entire data buffer.
    fn data(&self) -> &[u8];

    /// Returns the total length of the data buffer.
    fn len(&self) -> usize;
}

/// A loaded PE file with decoded headers.
///
/// `PeFile` is the main entry point of this crate. Loading decodes the complete header
/// chain once; afterwards every header is available as an owned structure, addresses
/// translate through the section model, and the scan entry points
/// ([`PeFile::scan_anomalies`], [`PeFile::scan_re_hints`]) walk the decoded state
/// without touching the file again.
///
/// Structural damage does not prevent loading. A file with a collapsed optional header
/// or a truncated section table still loads; the damage shows up as anomalies.
///
/// # Examples
///
/// ```rust,no_run
/// use pescope::{AnomalyClass, PeFile};
///
/// let pe = PeFile::from_file("sample.exe")?;
///
/// let anomalies = pe.scan_anomalies();
/// let broken = anomalies
///     .iter()
///     .filter(|a| a.class() == AnomalyClass::Structure)
///     .count();
/// println!("{broken} structural findings");
/// # Ok::<(), pescope::Error>(())
/// ```
pub struct PeFile {
    /// The underlying data source (memory or file)
    data: Box<dyn Backend>,
    /// Decoded MS-DOS header
    dos: MsdosHeader,
    /// File offset of the PE signature
    pe_offset: u64,
    /// Decoded COFF header
    coff: CoffHeader,
    /// Decoded optional header, absent when even its magic was unreadable
    optional: Option<OptionalHeader>,
    /// The loaded section table
    sections: SectionModel,
    /// Data directory entries with their physical resolution
    directories: Vec<ResolvedDataDir>,
    /// CLR structures, present only for managed images with reachable headers
    clr: Option<ClrProbe>,
    /// First file offset past all section data
    overlay_offset: u64,
}

// The backend is a trait object, so Debug is written by hand and shows the
// backing length instead of the bytes.
impl fmt::Debug for PeFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PeFile")
            .field("len", &self.data.len())
            .field("dos", &self.dos)
            .field("pe_offset", &self.pe_offset)
            .field("coff", &self.coff)
            .field("optional", &self.optional)
            .field("sections", &self.sections)
            .field("directories", &self.directories)
            .field("clr", &self.clr)
            .field("overlay_offset", &self.overlay_offset)
            .finish()
    }
}

impl PeFile {
    /// Loads a PE file from the given path.
    ///
    /// The file is memory-mapped for efficient access.
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the PE file on disk.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::FileError`] if the file cannot be opened,
    /// [`crate::Error::Empty`] for a zero byte file, or [`crate::Error::NotPeFile`]
    /// if not even the outermost header chain can be decoded.
    ///
    /// # Examples
    ///
    /// ```rust,no_run
    /// use pescope::PeFile;
    ///
    /// let pe = PeFile::from_file("sample.exe")?;
    /// println!("{} findings", pe.scan_anomalies().len());
    /// # Ok::<(), pescope::Error>(())
    /// ```
    pub fn from_file(path: impl AsRef<Path>) -> Result<PeFile> {
        let input = Physical::new(path)?;

        Self::load(input)
    }

    /// Loads a PE file from a memory buffer.
    ///
    /// # Arguments
    ///
    /// * `data` - The bytes of the PE file.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Empty`] for an empty buffer or
    /// [`crate::Error::NotPeFile`] if not even the outermost header chain can be
    /// decoded.
    pub fn from_mem(data: Vec<u8>) -> Result<PeFile> {
        let input = Memory::new(data);

        Self::load(input)
    }

    /// Internal loader for any backend.
    fn load<T: Backend + 'static>(backend: T) -> Result<PeFile> {
        if backend.len() == 0 {
            return Err(Empty);
        }

        let data = backend.data();

        let dos = MsdosHeader::read(data)?;
        let pe_offset = dos.pe_header_offset();

        let signature = backend
            .data_slice(pe_offset as usize, PE_SIGNATURE_SIZE)
            .map_err(|_| not_pe_error!("file ends inside the PE signature at {:#X}", pe_offset))?;
        if signature != PE_SIGNATURE {
            return Err(not_pe_error!(
                "PE signature at {:#X} is {:02X?}, expected PE\\0\\0",
                pe_offset,
                signature
            ));
        }

        let coff_offset = pe_offset as usize + PE_SIGNATURE_SIZE;
        let coff = CoffHeader::read(data, coff_offset)?;

        // Fatal conditions end here. From this point on, damage degrades into
        // anomaly findings instead of load errors.
        let opt_offset = coff_offset + COFF_HEADER_SIZE;
        let declared_opt_size = coff.size_of_optional_header();
        let optional = if declared_opt_size == 0 {
            None
        } else {
            OptionalHeader::read(data, opt_offset, declared_opt_size).ok()
        };

        let low_alignment = optional.as_ref().is_some_and(OptionalHeader::is_low_alignment_mode);
        let size_of_headers = optional.as_ref().map_or(0, OptionalHeader::size_of_headers);

        let table_offset = opt_offset.saturating_add(declared_opt_size as usize);
        let sections = SectionModel::read(
            data,
            table_offset,
            coff.number_of_sections(),
            low_alignment,
            size_of_headers,
        );

        let directories: Vec<ResolvedDataDir> = optional
            .as_ref()
            .map_or_else(Vec::new, |opt| {
                opt.data_directories()
                    .iter()
                    .map(|entry| entry.resolve(&sections))
                    .collect()
            });

        let clr = optional
            .as_ref()
            .and_then(|opt| opt.data_directory(DataDirKey::ClrRuntimeHeader))
            .and_then(|entry| ClrProbe::read(data, &sections, entry));

        let overlay_offset = sections.overlay_offset();

        Ok(PeFile {
            data: Box::new(backend),
            dos,
            pe_offset,
            coff,
            optional,
            sections,
            directories,
            clr,
            overlay_offset,
        })
    }

    /// Returns the total size of the loaded file in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns `true` if the file has a length of zero. Loaded files never are.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the raw data of the loaded file.
    #[must_use]
    pub fn data(&self) -> &[u8] {
        self.data.data()
    }

    /// Returns a slice of the file data at the given offset and length.
    ///
    /// # Arguments
    ///
    /// * `offset` - The offset to start the slice from.
    /// * `len` - The length of the slice.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::OutOfBounds`] if the requested range leaves the file.
    pub fn data_slice(&self, offset: usize, len: usize) -> Result<&[u8]> {
        self.data.data_slice(offset, len)
    }

    /// The decoded MS-DOS header.
    #[must_use]
    pub fn msdos_header(&self) -> &MsdosHeader {
        &self.dos
    }

    /// File offset of the `PE\0\0` signature, from `e_lfanew`.
    #[must_use]
    pub fn pe_signature_offset(&self) -> u64 {
        self.pe_offset
    }

    /// The decoded COFF header.
    #[must_use]
    pub fn coff_header(&self) -> &CoffHeader {
        &self.coff
    }

    /// The decoded optional header.
    ///
    /// `None` when the COFF header declares a zero size optional header or the file
    /// ends before the magic field. Such files still load; the absence is reported as
    /// an anomaly.
    #[must_use]
    pub fn optional_header(&self) -> Option<&OptionalHeader> {
        self.optional.as_ref()
    }

    /// The loaded section table with its address translation model.
    #[must_use]
    pub fn sections(&self) -> &SectionModel {
        &self.sections
    }

    /// All declared data directory entries with their physical resolution.
    ///
    /// Empty when the optional header is absent.
    #[must_use]
    pub fn data_directories(&self) -> &[ResolvedDataDir] {
        &self.directories
    }

    /// The resolved entry for one data directory slot, if the header declares it.
    #[must_use]
    pub fn data_directory(&self, key: DataDirKey) -> Option<&ResolvedDataDir> {
        self.directories.iter().find(|dir| dir.entry.key == key)
    }

    /// CLR structures for managed images.
    ///
    /// `None` for native images and for managed images whose CLR header is declared
    /// but physically unreachable.
    #[must_use]
    pub fn clr(&self) -> Option<&ClrProbe> {
        self.clr.as_ref()
    }

    /// Converts a relative virtual address to a file offset.
    ///
    /// Returns `None` when the RVA maps to no byte of the file, which in a damaged
    /// image is common rather than exceptional.
    #[must_use]
    pub fn resolve_rva(&self, rva: u64) -> Option<u64> {
        self.sections.rva_to_file_offset(rva)
    }

    /// Converts a file offset to a relative virtual address.
    ///
    /// This is the inverse of [`PeFile::resolve_rva`] over the file ranges sections
    /// actually read.
    #[must_use]
    pub fn resolve_file_offset(&self, offset: u64) -> Option<u64> {
        self.sections.file_offset_to_rva(offset)
    }

    /// First file offset past all section data.
    ///
    /// Equals the file length when nothing trails the sections.
    #[must_use]
    pub fn overlay_offset(&self) -> u64 {
        self.overlay_offset
    }

    /// Whether bytes trail the last section.
    #[must_use]
    pub fn overlay_exists(&self) -> bool {
        self.overlay_offset < self.len() as u64
    }

    /// Number of bytes trailing the last section.
    #[must_use]
    pub fn overlay_size(&self) -> u64 {
        (self.len() as u64).saturating_sub(self.overlay_offset)
    }

    /// Runs the full anomaly battery over the decoded structures.
    ///
    /// The result is deterministic for a given input: same findings, same order, on
    /// every run and every machine.
    #[must_use]
    pub fn scan_anomalies(&self) -> Vec<Anomaly> {
        let ctx = CheckContext {
            pe_offset: self.pe_offset,
            dos: &self.dos,
            coff: &self.coff,
            optional: self.optional.as_ref(),
            sections: &self.sections,
            directories: &self.directories,
            clr: self.clr.as_ref(),
            overlay_offset: self.overlay_offset,
        };
        run_checks(&ctx)
    }

    /// Derives reverse engineering hints from the file structure, the anomaly scan,
    /// and caller supplied evidence.
    ///
    /// Pass [`Signals::new()`](crate::Signals::new) when no external scanning output
    /// is available; structure-only hints still fire.
    #[must_use]
    pub fn scan_re_hints(&self, signals: &Signals) -> Vec<ReHint> {
        let anomalies = self.scan_anomalies();
        let ctx = HintContext {
            sections: &self.sections,
            anomalies: &anomalies,
            signals,
        };
        run_hints(&ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{test::PeImage, AnomalyKind, Error};

    /// Verifies the invariants of a loaded minimal image, however it was loaded.
    fn verify_file(pe: &PeFile) {
        assert_eq!(&pe.data()[0..2], b"MZ");
        assert_eq!(pe.len(), 0x600);
        assert!(!pe.is_empty());

        assert_eq!(pe.pe_signature_offset(), 0x40);
        assert_eq!(pe.coff_header().machine(), 0x14C);
        assert_eq!(pe.sections().loaded_count(), 1);

        let opt = pe.optional_header().unwrap();
        assert!(!opt.is_pe32_plus());
        assert_eq!(opt.address_of_entry_point(), 0x1000);

        assert_eq!(pe.resolve_rva(0x1000), Some(0x400));
        assert_eq!(pe.resolve_rva(0x1010), Some(0x410));
        assert_eq!(pe.resolve_file_offset(0x410), Some(0x1010));

        assert_eq!(pe.overlay_offset(), 0x600);
        assert!(!pe.overlay_exists());
        assert_eq!(pe.overlay_size(), 0);

        assert!(pe.clr().is_none());
        assert_eq!(pe.data_directories().len(), 16);
    }

    #[test]
    fn load_buffer() {
        let pe = PeFile::from_mem(PeImage::minimal().build()).unwrap();
        verify_file(&pe);
    }

    #[test]
    fn load_file() {
        let path = std::env::temp_dir().join("pescope_facade_load.bin");
        std::fs::write(&path, PeImage::minimal().build()).unwrap();

        let pe = PeFile::from_file(&path).unwrap();
        verify_file(&pe);

        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn debug_output_summarizes_without_dumping_bytes() {
        let pe = PeFile::from_mem(PeImage::minimal().build()).unwrap();

        let rendered = format!("{pe:?}");
        assert!(rendered.starts_with("PeFile"));
        assert!(rendered.contains("len: 1536"));
        assert!(!rendered.contains("MZ"));
    }

    #[test]
    fn empty_input_is_rejected() {
        assert!(matches!(PeFile::from_mem(Vec::new()).unwrap_err(), Error::Empty));
    }

    #[test]
    fn garbage_is_not_a_pe_file() {
        let result = PeFile::from_mem(vec![0_u8; 64]);
        assert!(matches!(result.unwrap_err(), Error::NotPeFile { .. }));
    }

    #[test]
    fn truncated_coff_header_is_fatal() {
        let mut image = PeImage::minimal().build();
        image.truncate(0x40 + 4 + 10);

        let result = PeFile::from_mem(image);
        assert!(matches!(result.unwrap_err(), Error::NotPeFile { .. }));
    }

    #[test]
    fn bad_pe_signature_is_fatal() {
        let mut image = PeImage::minimal().build();
        image[0x40] = b'X';

        let result = PeFile::from_mem(image);
        assert!(matches!(result.unwrap_err(), Error::NotPeFile { .. }));
    }

    #[test]
    fn zero_optional_header_size_degrades() {
        let mut image = PeImage::minimal().build();
        // SizeOfOptionalHeader lives 16 bytes into the COFF header
        image[0x54] = 0;
        image[0x55] = 0;

        let pe = PeFile::from_mem(image).unwrap();
        assert!(pe.optional_header().is_none());
        assert!(pe.data_directories().is_empty());

        let findings = pe.scan_anomalies();
        assert!(findings
            .iter()
            .any(|a| a.kind() == AnomalyKind::CollapsedOptionalHeader));
    }

    #[test]
    fn overlay_is_reported() {
        // The .text read ends at 0x1400: the raw size aligns up to one page and the
        // virtual extent caps it there. Bytes past that line are overlay.
        let mut image = PeImage::minimal().build();
        image.resize(0x1800, 0xAA);

        let pe = PeFile::from_mem(image).unwrap();
        assert!(pe.overlay_exists());
        assert_eq!(pe.overlay_offset(), 0x1400);
        assert_eq!(pe.overlay_size(), 0x400);
    }
}
