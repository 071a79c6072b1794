// Copyright 2025 Johann Kempter
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![deny(missing_docs)]
#![allow(dead_code)]
#![allow(clippy::too_many_arguments)]
//#![deny(unsafe_code)]
// - 'file/physical.rs' uses mmap to map a file into memory

//! # pescope
//!
//! [![Crates.io](https://img.shields.io/crates/v/pescope.svg)](https://crates.io/crates/pescope)
//! [![Documentation](https://docs.rs/pescope/badge.svg)](https://docs.rs/pescope)
//! [![License](https://img.shields.io/badge/license-Apache--2.0-blue.svg)](https://github.com/BinFlip/pescope/blob/main/LICENSE-APACHE)
//!
//! A cross-platform library for structural integrity analysis and triage of Windows PE
//! executables. Built in pure Rust, `pescope` decodes the PE header chain as tolerantly
//! as a loader under attack, reports structural damage through a typed anomaly catalog,
//! and turns structure plus external evidence into reverse engineering leads, without
//! requiring Windows or executing the sample.
//!
//! ## Features
//!
//! - **📦 Efficient memory access** - Memory-mapped file access with minimal allocations
//! - **🛡️ Tolerant decoding** - Only four conditions abort a load; all other damage degrades into findings
//! - **🔍 Typed anomaly catalog** - Dozens of distinct findings across six severity classes
//! - **📐 Address resolution** - RVA ⇄ file offset translation faithful to loader alignment rules
//! - **🧭 Reverse engineering hints** - Packer, installer and injection leads from structure and signals
//! - **⚡ Batch scanning** - Parallel directory triage built on `rayon`
//! - **🦀 Pure Rust** - Memory-safe parsing of hostile input, no OS loader involved
//!
//! ## Quick Start
//!
//! Add to your `Cargo.toml`:
//!
//! ```toml
//! [dependencies]
//! pescope = "0.2.1"
//! ```
//!
//! ### Basic Usage
//!
//! ```rust,no_run
//! use pescope::PeFile;
//!
//! fn main() -> pescope::Result<()> {
//!     // Load and decode a PE file
//!     let pe = PeFile::from_file("sample.exe")?;
//!
//!     println!("Machine: {:#06X}", pe.coff_header().machine());
//!     println!("Sections: {}", pe.sections().loaded_count());
//!
//!     // Translate addresses the way the loader would
//!     if let Some(offset) = pe.resolve_rva(0x1000) {
//!         println!("RVA 0x1000 lives at file offset {offset:#X}");
//!     }
//!
//!     // Report structural damage
//!     for anomaly in pe.scan_anomalies() {
//!         println!("{anomaly}");
//!     }
//!
//!     Ok(())
//! }
//! ```
//!
//! ### Triage with External Evidence
//!
//! ```rust,no_run
//! use pescope::{PeFile, ScanLocation, Signals};
//!
//! let pe = PeFile::from_file("dropper.exe")?;
//!
//! // Feed in what signature and import scanners already found
//! let signals = Signals::new()
//!     .with_signature("UPX packer stub", ScanLocation::EntryPoint)
//!     .with_import("CreateRemoteThread");
//!
//! for hint in pe.scan_re_hints(&signals) {
//!     println!("{hint}");
//! }
//! # Ok::<(), pescope::Error>(())
//! ```
//!
//! ### Memory-based Analysis
//!
//! ```rust,no_run
//! use pescope::PeFile;
//!
//! // Analyze from memory buffer
//! let binary_data: Vec<u8> = std::fs::read("sample.exe")?;
//! let pe = PeFile::from_mem(binary_data)?;
//!
//! // Same API as file-based analysis
//! println!("Overlay present: {}", pe.overlay_exists());
//!
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Standards Compliance
//!
//! `pescope` follows the **Microsoft PE/COFF specification** for all header layouts,
//! alignment rules, and data directory semantics, while deliberately accepting files
//! the specification forbids: malware routinely violates the format on purpose, and
//! every violation this library recognizes becomes a typed finding instead of an error.
//!
//! ### References
//!
//! - [PE Format](https://learn.microsoft.com/windows/win32/debug/pe-format) - Official PE/COFF documentation
//! - [ECMA-335 Standard](https://ecma-international.org/wp-content/uploads/ECMA-335_6th_edition_june_2012.pdf) - CLR header and metadata root layout
//!
//! ## Performance
//!
//! `pescope` is designed for high-throughput triage:
//!
//! - **Memory-mapped files** with reference-based parsing where possible
//! - **Single-pass decoding** of the full header chain at load time
//! - **Parallel processing** of whole sample directories via [`batch`]
//! - **Minimal allocations** through careful memory management
//!
//! Loading and scanning a typical executable takes well under a millisecond.
//!
//! ## Error Handling
//!
//! All operations return [`Result<T, Error>`](Result). Structural damage is *not* an
//! error; only unreadable input is:
//!
//! ```rust,no_run
//! use pescope::{Error, PeFile};
//!
//! match PeFile::from_file("sample.exe") {
//!     Ok(pe) => println!("loaded, {} findings", pe.scan_anomalies().len()),
//!     Err(Error::NotPeFile { message, .. }) => println!("not a PE file: {}", message),
//!     Err(e) => println!("other error: {}", e),
//! }
//! ```
//!
//! ## Development and Testing
//!
//! The crate includes comprehensive fuzzing support for security and robustness:
//!
//! ### Fuzzing
//!
//! ```bash
//! # Install fuzzing tools
//! cargo install cargo-fuzz
//!
//! # Run fuzzer
//! cargo +nightly fuzz run pefile --release
//!
//! # Multi-core fuzzing
//! cargo +nightly fuzz run pefile --release -- -jobs=4 -fork=1
//! ```
//!
//! ### Testing
//!
//! The test suite builds synthetic images byte by byte so every finding is pinned to
//! a known cause:
//!
//! ```bash
//! cargo test
//! cargo test --release  # For performance tests
//! ```

#[macro_use]
pub(crate) mod error;

/// Shared functionality which is used in unit- and integration-tests
#[cfg(test)]
pub(crate) mod test;

/// Convenient re-exports of the most commonly used types and traits.
///
/// This module provides a curated selection of the most frequently used types
/// from across the pescope library, allowing for convenient glob imports.
///
/// # Example
///
/// ```rust,no_run
/// use pescope::prelude::*;
///
/// // Now you have access to the most common types
/// let pe = PeFile::from_file("sample.exe")?;
/// let findings = pe.scan_anomalies();
/// # Ok::<(), pescope::Error>(())
/// ```
pub mod prelude;

/// Structural anomaly catalog and scan battery.
///
/// Everything the loader decode tolerated is reported here as a typed finding: a
/// [`AnomalyKind`] naming what is wrong, an [`AnomalyClass`] grading how wrong it is,
/// and an [`AnomalyKey`] pinning it to a header field, section ordinal, or data
/// directory. Findings come back in a deterministic order so two scans of the same
/// bytes always agree.
///
/// # Example
///
/// ```rust,no_run
/// use pescope::{AnomalyClass, PeFile};
///
/// let pe = PeFile::from_file("sample.exe")?;
/// for anomaly in pe.scan_anomalies() {
///     if anomaly.kind().class() == AnomalyClass::Structure {
///         println!("structural damage: {anomaly}");
///     }
/// }
/// # Ok::<(), pescope::Error>(())
/// ```
pub mod anomalies;

/// Parallel scanning of many samples.
///
/// Triage rarely means one file. [`batch::scan_paths`] drives the loader and the
/// anomaly battery across a set of paths on a `rayon` thread pool, keeping per-file
/// failures isolated from the rest of the run.
pub mod batch;

/// File loading and backend abstraction.
///
/// The [`PeFile`] entry point and its [`file::Backend`] data sources (memory-mapped
/// disk files, in-memory buffers), plus the bounds-checked [`Parser`] cursor every
/// header decode goes through.
pub mod file;

/// Decoded PE structures.
///
/// Header types for each stage of the chain: [`pe::MsdosHeader`], [`pe::CoffHeader`],
/// [`pe::OptionalHeader`], the [`pe::SectionModel`] with its address resolution, the
/// data directory table, and the shallow CLR probe for managed images.
pub mod pe;

/// Reverse engineering hints from structure and external signals.
///
/// Combines the section model, the anomaly findings, and caller supplied [`Signals`]
/// into [`ReHint`]s naming packers, installers, and injection techniques.
pub mod rehints;

/// `pescope` Result type
///
/// A type alias for [`std::result::Result<T, Error>`] where the error type is always [`Error`].
/// This is used consistently throughout the crate for all fallible operations.
///
/// # Examples
///
/// ```rust,no_run
/// use pescope::{PeFile, Result};
///
/// fn load_sample(path: &str) -> Result<PeFile> {
///     PeFile::from_file(path)
/// }
/// ```
pub type Result<T> = std::result::Result<T, Error>;

/// `pescope` Error type
///
/// The main error type for all operations in this crate. Structural damage in a
/// sample never surfaces here; it is reported through the anomaly catalog instead.
///
/// # Examples
///
/// ```rust,no_run
/// use pescope::{Error, PeFile};
///
/// match PeFile::from_file("sample.exe") {
///     Ok(pe) => println!("Loaded successfully"),
///     Err(Error::NotPeFile { message, .. }) => println!("Not a PE file: {}", message),
///     Err(e) => println!("Error: {}", e),
/// }
/// ```
pub use error::Error;

/// Main entry point for working with PE files.
///
/// See [`file::PeFile`] for the loading pipeline and the full accessor surface.
///
/// # Example
///
/// ```rust,no_run
/// use pescope::PeFile;
/// let pe = PeFile::from_file("sample.exe")?;
/// println!("Found {} sections", pe.sections().loaded_count());
/// # Ok::<(), pescope::Error>(())
/// ```
pub use file::{parser::Parser, Backend, PeFile};

/// Anomaly findings and their classification.
///
/// These types describe everything the tolerant decode flagged:
/// - [`Anomaly`] - One finding with its location and description
/// - [`AnomalyKind`] - The closed catalog of recognized findings
/// - [`AnomalyClass`] - Severity grading from structural damage to style notes
/// - [`AnomalyKey`] / [`HeaderField`] - Where in the file a finding is pinned
pub use anomalies::{Anomaly, AnomalyClass, AnomalyKey, AnomalyKind, HeaderField};

/// Reverse engineering hints and the evidence feeding them.
///
/// - [`ReHint`] / [`ReHintKind`] - A lead and what it points at
/// - [`Signals`] / [`SignatureMatch`] / [`ScanLocation`] - External scanner output
pub use rehints::{ReHint, ReHintKind, ScanLocation, SignatureMatch, Signals};
