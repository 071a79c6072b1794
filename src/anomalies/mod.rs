//! Structural anomaly catalog and detection engine.
//!
//! # Architecture
//!
//! Every way a PE file can deviate from the format specification without stopping the
//! loader is a named [`AnomalyKind`], grouped into six broad [`AnomalyClass`] buckets
//! ranging from hard structural damage to merely unusual defaults. Detection runs as a
//! fixed battery of check passes over the decoded headers; the battery order and the
//! iteration order inside each pass are deterministic, so two scans of the same bytes
//! always produce the same report in the same order.
//!
//! # Key Components
//!
//! - [`AnomalyKind`] - The full catalog of detectable deviations
//! - [`AnomalyClass`] - Severity-free grouping by what kind of rule is broken
//! - [`Anomaly`] - One finding: kind, the header location it concerns, and a
//!   human readable description
//! - [`AnomalyKey`] - Typed reference to the field, section or data directory a
//!   finding points at
//!
//! # Usage
//!
//! ```rust,no_run
//! use pescope::{AnomalyClass, PeFile};
//!
//! let pe = PeFile::from_file("suspicious.exe")?;
//! for anomaly in pe.scan_anomalies() {
//!     if anomaly.class() == AnomalyClass::Structure {
//!         println!("{anomaly}");
//!     }
//! }
//! # Ok::<(), pescope::Error>(())
//! ```

mod checks;
mod engine;

pub(crate) use engine::{run_checks, CheckContext};

use std::fmt;

use strum::{Display, EnumCount, EnumIter};

use crate::pe::{CoffField, DataDirKey, StandardField, WindowsField};

/// Broad grouping of anomalies by the kind of rule they break.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumCount, EnumIter)]
pub enum AnomalyClass {
    /// The physical layout deviates from the format: truncated tables, overlapping
    /// ranges, structures located where nothing should be
    Structure,
    /// A field value contradicts the format specification
    Wrong,
    /// A field or flag the specification reserves carries a non-zero value
    Reserved,
    /// A field or flag the specification has deprecated is still in use
    Deprecated,
    /// Valid but unusual: values and layouts regular toolchains do not produce
    NonDefault,
    /// Primarily interesting as a reverse engineering lead
    ReHint,
}

/// Every deviation the scanner can name.
///
/// The catalog is flat; use [`AnomalyKind::class`] for grouping. Variant names follow
/// the affected structure, not the tool that popularized detecting it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumCount, EnumIter)]
#[non_exhaustive]
pub enum AnomalyKind {
    // Structure

    /// The PE header offset points inside the MS-DOS header
    CollapsedMsdosHeader,
    /// The declared optional header size is too small for the header's own layout
    CollapsedOptionalHeader,
    /// The image declares no sections at all
    Sectionless,
    /// More sections declared than the loader accepts
    TooManySections,
    /// The section table lies in the overlay
    SecTableInOverlay,
    /// The PE header lies in the overlay
    PeHeaderInOverlay,
    /// The file ends inside the declared section table
    TruncatedSecTable,
    /// The file ends inside the optional header
    TruncatedOptionalHeader,
    /// Two sections read overlapping ranges of the file
    PhysicallyOverlappingSec,
    /// Two sections read exactly the same range of the file
    PhysicallyDuplicatedSec,
    /// Two sections occupy overlapping virtual ranges
    VirtuallyOverlappingSec,
    /// Two sections occupy exactly the same virtual range
    VirtuallyDuplicatedSec,
    /// Section virtual addresses are not in ascending order
    NotAscendingSecVa,
    /// A data directory starts in one section and ends in another
    FractionatedDatadir,
    /// A section's raw data range intrudes into the header region
    SecOverlapsHeaders,
    /// The file ends inside the declared data directory table
    TruncatedDataDirTable,
    /// A section's virtual or raw range arithmetic overflows
    OverflowingSecRange,

    // Wrong

    /// A data directory address that nothing in the file backs
    InvalidDataDir,
    /// A data directory with an address but zero size
    ZeroSizeDataDir,
    /// Zero entry point in an image that is not a DLL
    ZeroEp,
    /// The entry point maps to no file data
    VirtualEp,
    /// `SizeOfImage` is not a multiple of the section alignment
    NotSecAlignedSizeOfImage,
    /// `FileAlignment` is not a power of two
    NotPowOfTwoFileAlign,
    /// `FileAlignment` below the specified minimum of 512
    TooSmallFileAlign,
    /// `FileAlignment` above the specified maximum of 64 KiB
    TooLargeFileAlign,
    /// `SectionAlignment` is smaller than `FileAlignment`
    SectionAlignSmallerThanFileAlign,
    /// `SizeOfHeaders` is not a multiple of `FileAlignment`
    NotFileAlignedSizeOfHeaders,
    /// `SizeOfHeaders` does not cover the headers it claims to cover
    TooSmallSizeOfHeaders,
    /// `SizeOfHeaders` is larger than the file
    TooLargeSizeOfHeaders,
    /// `ImageBase` is zero
    ZeroImageBase,
    /// `ImageBase` is not a multiple of 64 KiB
    UnalignedImageBase,
    /// The optional header magic is neither PE32 nor PE32+
    UnusualOptHeaderMagic,
    /// A section's raw data pointer is not file aligned
    NotFileAlignedSecPointer,
    /// A section's raw data size is not file aligned
    NotFileAlignedSecSize,
    /// A section's virtual range extends beyond `SizeOfImage`
    SecExceedsImage,
    /// A section's raw data lies entirely beyond the file end
    SecDataBeyondFile,
    /// `SizeOfImage` is zero
    ZeroSizeOfImage,
    /// `SizeOfImage` is smaller than the headers alone
    TooSmallSizeOfImage,
    /// A section with a zero virtual address
    ZeroVaSec,
    /// A section's virtual address is not section aligned
    NotAlignedSecVa,

    // Reserved

    /// Reserved bits set in the COFF characteristics
    ReservedFileCharacteristics,
    /// Reserved bits set in the DLL characteristics
    ReservedDllCharacteristics,
    /// Reserved bits set in a section's characteristics
    ReservedSecCharacteristics,
    /// The reserved sixteenth data directory slot is in use
    ReservedDataDir,
    /// The reserved `Win32VersionValue` field is non-zero
    ReservedWin32Version,
    /// The reserved `LoaderFlags` field is non-zero
    ReservedLoaderFlags,

    // Deprecated

    /// A COFF symbol table pointer in an image file
    DeprecatedCoffSymbolTable,
    /// A COFF symbol count in an image file
    DeprecatedNrOfCoffSymbols,
    /// A deprecated COFF characteristics flag is set
    DeprecatedFileCharacteristics,
    /// A deprecated or object-only section characteristics flag is set
    DeprecatedSecCharacteristics,

    // NonDefault

    /// More than sixteen data directories declared
    UnusualDataDirNr,
    /// The entry point lies in a writeable section
    EpInWriteableSec,
    /// The entry point lies in the last section
    EpInLastSection,
    /// The entry point lies in the header region
    EpInHeader,
    /// `FileAlignment` differs from the usual 512
    NonDefaultFileAlign,
    /// `SectionAlignment` differs from the usual 4096
    NonDefaultSectionAlign,
    /// Equal, small alignments put the image in low alignment mode
    LowAlignmentMode,
    /// `ImageBase` differs from the linker defaults
    NonDefaultImageBase,
    /// A section name regular toolchains do not produce
    UnusualSecName,
    /// Control characters inside a section name
    CtrlSymbInSecName,
    /// A section with an empty name
    EmptySecName,
    /// Two sections share a name
    DuplicatedSecName,
    /// A section marked uninitialized that carries raw data
    UninitializedSecWithRawData,
    /// A section both writeable and executable
    WriteableExecutableSec,
    /// A section marked shareable between processes
    SharedSec,
    /// A section with no raw data behind it
    ZeroRawSizeSec,
    /// An MS-DOS stub far larger than the default
    LargeMsdosStub,
    /// The image declares no data directories
    NoDataDirs,

    // ReHint

    /// The CLR metadata version string region is corrupt
    BrokenClrVersionString,
}

impl AnomalyKind {
    /// The class this kind belongs to.
    #[must_use]
    pub fn class(self) -> AnomalyClass {
        use AnomalyKind::*;
        match self {
            CollapsedMsdosHeader | CollapsedOptionalHeader | Sectionless | TooManySections
            | SecTableInOverlay | PeHeaderInOverlay | TruncatedSecTable
            | TruncatedOptionalHeader | PhysicallyOverlappingSec | PhysicallyDuplicatedSec
            | VirtuallyOverlappingSec | VirtuallyDuplicatedSec | NotAscendingSecVa
            | FractionatedDatadir | SecOverlapsHeaders | TruncatedDataDirTable
            | OverflowingSecRange => AnomalyClass::Structure,

            InvalidDataDir | ZeroSizeDataDir | ZeroEp | VirtualEp | NotSecAlignedSizeOfImage
            | NotPowOfTwoFileAlign | TooSmallFileAlign | TooLargeFileAlign
            | SectionAlignSmallerThanFileAlign | NotFileAlignedSizeOfHeaders
            | TooSmallSizeOfHeaders | TooLargeSizeOfHeaders | ZeroImageBase
            | UnalignedImageBase | UnusualOptHeaderMagic | NotFileAlignedSecPointer
            | NotFileAlignedSecSize | SecExceedsImage | SecDataBeyondFile | ZeroSizeOfImage
            | TooSmallSizeOfImage | ZeroVaSec | NotAlignedSecVa => AnomalyClass::Wrong,

            ReservedFileCharacteristics | ReservedDllCharacteristics
            | ReservedSecCharacteristics | ReservedDataDir | ReservedWin32Version
            | ReservedLoaderFlags => AnomalyClass::Reserved,

            DeprecatedCoffSymbolTable | DeprecatedNrOfCoffSymbols
            | DeprecatedFileCharacteristics | DeprecatedSecCharacteristics => {
                AnomalyClass::Deprecated
            }

            UnusualDataDirNr | EpInWriteableSec | EpInLastSection | EpInHeader
            | NonDefaultFileAlign | NonDefaultSectionAlign | LowAlignmentMode
            | NonDefaultImageBase | UnusualSecName | CtrlSymbInSecName | EmptySecName
            | DuplicatedSecName | UninitializedSecWithRawData | WriteableExecutableSec
            | SharedSec | ZeroRawSizeSec | LargeMsdosStub | NoDataDirs => {
                AnomalyClass::NonDefault
            }

            BrokenClrVersionString => AnomalyClass::ReHint,
        }
    }
}

/// A header field an anomaly points at, across the three header structures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HeaderField {
    /// A COFF header field
    Coff(CoffField),
    /// An optional header standard field
    Standard(StandardField),
    /// An optional header Windows specific field
    Windows(WindowsField),
}

impl fmt::Display for HeaderField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HeaderField::Coff(field) => write!(f, "{field}"),
            HeaderField::Standard(field) => write!(f, "{field}"),
            HeaderField::Windows(field) => write!(f, "{field}"),
        }
    }
}

/// Typed reference to the location a finding concerns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AnomalyKey {
    /// A specific header field
    Field(HeaderField),
    /// A section, by 1-based table ordinal
    Section(u32),
    /// A data directory slot
    DataDirectory(DataDirKey),
}

impl fmt::Display for AnomalyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnomalyKey::Field(field) => write!(f, "field {field}"),
            AnomalyKey::Section(ordinal) => write!(f, "section {ordinal}"),
            AnomalyKey::DataDirectory(key) => write!(f, "data directory {key}"),
        }
    }
}

/// One structural finding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Anomaly {
    kind: AnomalyKind,
    key: Option<AnomalyKey>,
    description: String,
}

impl Anomaly {
    /// A finding always carries a non-empty description.
    pub(crate) fn new(
        kind: AnomalyKind,
        key: Option<AnomalyKey>,
        description: impl Into<String>,
    ) -> Anomaly {
        let description = description.into();
        assert!(!description.is_empty(), "anomaly description must not be empty");
        Anomaly {
            kind,
            key,
            description,
        }
    }

    /// The specific deviation found.
    #[must_use]
    pub fn kind(&self) -> AnomalyKind {
        self.kind
    }

    /// The class of the deviation, derived from the kind.
    #[must_use]
    pub fn class(&self) -> AnomalyClass {
        self.kind.class()
    }

    /// The field, section or data directory the finding concerns, when it concerns one
    /// location in particular.
    #[must_use]
    pub fn key(&self) -> Option<AnomalyKey> {
        self.key
    }

    /// Human readable description with the concrete values that triggered the finding.
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }
}

impl fmt::Display for Anomaly {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.class(), self.description)
    }
}
