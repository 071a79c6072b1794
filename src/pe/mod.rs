//! PE structure decoding and address translation.
//!
//! # Architecture
//!
//! Decoding is layered the way the format is: the MS-DOS header yields the PE offset,
//! the COFF header yields the section count and optional header size, the optional
//! header yields alignments and the data directory table, and the section table yields
//! the model everything else navigates with. Each layer reads as much as the file
//! physically provides and degrades field by field rather than failing, because the
//! input is assumed adversarial.
//!
//! # Key Components
//!
//! - [`MsdosHeader`] - Signature and PE offset, the only hard prerequisites
//! - [`CoffHeader`] / [`OptionalHeader`] - Field access keyed by the
//!   [`layout`] enums instead of hard coded offsets
//! - [`SectionModel`] - The loaded section table plus translation context
//! - [`resolver`] - RVA and file offset translation, overlay arithmetic
//! - [`DataDirEntry`] - Directory declarations and their physical resolution
//! - [`ClrProbe`] - Two-pointer probe into managed images
//!
//! # Usage
//!
//! The [`crate::PeFile`] facade wires these together; the types remain public for
//! callers that need to work below it.

pub mod clr;
pub mod coff;
pub mod directories;
pub mod dos;
pub mod layout;
pub mod optional;
pub mod resolver;
pub mod sections;

pub use clr::{ClrProbe, MetadataRoot};
pub use coff::{CoffHeader, FileCharacteristics};
pub use directories::{DataDirEntry, DataDirKey, ResolvedDataDir};
pub use dos::MsdosHeader;
pub use layout::{CoffField, OptionalMagic, StandardField, WindowsField};
pub use optional::{DllCharacteristics, OptionalHeader};
pub use sections::{SectionFlags, SectionModel, SectionRecord};
