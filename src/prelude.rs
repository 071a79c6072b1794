//! # pescope Prelude
//!
//! This module provides a convenient prelude for the most commonly used types and traits
//! from the pescope library. Import this module to get quick access to the essential
//! types for PE structural analysis and triage.

// ================================================================================================
// Core Types and Error Handling
// ================================================================================================

/// The main error type for all pescope operations
pub use crate::Error;

/// The result type used throughout pescope
pub use crate::Result;

// ================================================================================================
// Main Entry Points
// ================================================================================================

/// Main entry point for PE file analysis
pub use crate::PeFile;

/// Low-level file parsing utilities
pub use crate::{Backend, Parser};

/// Parallel triage of whole sample sets
pub use crate::batch::scan_paths;

// ================================================================================================
// Decoded Headers and Address Resolution
// ================================================================================================

/// Header chain types, decoded tolerantly from hostile input
pub use crate::pe::{CoffHeader, MsdosHeader, OptionalHeader};

/// Header characteristic flags
pub use crate::pe::{DllCharacteristics, FileCharacteristics, SectionFlags};

/// Field identifiers for the fixed header layouts
pub use crate::pe::{CoffField, OptionalMagic, StandardField, WindowsField};

/// Section table model with RVA ⇄ file offset translation
pub use crate::pe::{SectionModel, SectionRecord};

/// Data directory table and its per-entry resolution
pub use crate::pe::{DataDirEntry, DataDirKey, ResolvedDataDir};

/// Shallow CLR probe for managed images
pub use crate::pe::{ClrProbe, MetadataRoot};

// ================================================================================================
// Anomaly Catalog
// ================================================================================================

/// One structural finding with its location and description
pub use crate::anomalies::Anomaly;

/// Finding classification and addressing
pub use crate::anomalies::{AnomalyClass, AnomalyKey, AnomalyKind, HeaderField};

// ================================================================================================
// Reverse Engineering Hints
// ================================================================================================

/// Leads derived from structure and external evidence
pub use crate::rehints::{ReHint, ReHintKind};

/// External evidence supplied by signature, import and resource scanners
pub use crate::rehints::{ScanLocation, SignatureMatch, Signals};
