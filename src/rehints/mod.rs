//! Reverse engineering hints derived from structural evidence.
//!
//! # Architecture
//!
//! A hint names a tool, packer or technique the file's structure points at: UPX section
//! names, an installer's data section, imports that only make sense together. Hints are
//! built from three evidence sources: the section model, the anomaly findings, and
//! caller supplied [`Signals`]. The library deliberately does not scan bytes for
//! signatures or decode import and resource tables itself; analysts already run
//! dedicated tooling for that, and its output plugs in as signals.
//!
//! # Key Components
//!
//! - [`ReHintKind`] - The closed set of recognized leads
//! - [`ReHint`] - One lead with every reason it triggered
//! - [`Signals`] / [`SignatureMatch`] / [`ScanLocation`] - External evidence
//!
//! # Usage
//!
//! ```rust,no_run
//! use pescope::{PeFile, ScanLocation, Signals};
//!
//! let pe = PeFile::from_file("dropper.exe")?;
//! let signals = Signals::new()
//!     .with_signature("UPX packer stub", ScanLocation::EntryPoint)
//!     .with_import("CreateRemoteThread");
//! for hint in pe.scan_re_hints(&signals) {
//!     println!("{hint}");
//! }
//! # Ok::<(), pescope::Error>(())
//! ```

mod engine;

pub(crate) use engine::{run_hints, HintContext};

use std::fmt;

use strum::{Display, EnumCount, EnumIter};

/// Tools, packers and techniques the scanner can point at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumCount, EnumIter)]
#[non_exhaustive]
pub enum ReHintKind {
    /// The UPX packer or one of its derivatives
    UpxPacker,
    /// A Nullsoft Scriptable Install System package
    NullsoftInstaller,
    /// A PyInstaller bundled Python application
    PyInstaller,
    /// An Electron application package
    ElectronPackage,
    /// An archive appended to the executable
    Archive,
    /// Another executable embedded in the overlay
    EmbeddedExe,
    /// A script interpreter wrapped into an executable
    ScriptToExeWrapped,
    /// A self extracting archive
    SelfExtractingArchive,
    /// Imports that enable thread name injection
    ThreadNameInjection,
    /// Imports that enable process doppelgaenging
    ProcessDoppelgaenging,
    /// An AutoHotkey script compiled to an executable
    AutoHotkey,
    /// An Inno Setup installer
    InnoSetup,
    /// Obfuscated .NET metadata
    DotNetObfuscation,
}

/// One reverse engineering lead with the evidence that produced it.
///
/// A kind appears at most once per scan; every additional trigger appends its reason.
/// Reasons keep insertion order and are de-duplicated by exact text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReHint {
    kind: ReHintKind,
    reasons: Vec<String>,
}

impl ReHint {
    pub(crate) fn new(kind: ReHintKind) -> ReHint {
        ReHint {
            kind,
            reasons: Vec::new(),
        }
    }

    pub(crate) fn add_reason(&mut self, reason: String) {
        if !self.reasons.contains(&reason) {
            self.reasons.push(reason);
        }
    }

    /// What the evidence points at.
    #[must_use]
    pub fn kind(&self) -> ReHintKind {
        self.kind
    }

    /// Every observed justification, in the order the rules found them.
    #[must_use]
    pub fn reasons(&self) -> &[String] {
        &self.reasons
    }
}

impl fmt::Display for ReHint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.reasons.join("; "))
    }
}

/// Where a byte signature matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum ScanLocation {
    /// At the entry point
    EntryPoint,
    /// In the overlay
    Overlay,
    /// In the MS-DOS stub
    MsdosStub,
}

/// A named byte signature match reported by external scanning tooling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureMatch {
    /// Signature name as the scanning tool reports it
    pub name: String,
    /// Where the match was found
    pub location: ScanLocation,
}

/// External evidence feeding the hint rules.
///
/// All collections default to empty; hints that only need the section model or the
/// anomaly findings fire without any signals at all.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Signals {
    /// Byte signature matches with their scan locations
    pub signature_matches: Vec<SignatureMatch>,
    /// Resource entry names, as found in the resource tree
    pub resource_names: Vec<String>,
    /// Imported symbol names, flattened across all import descriptors
    pub import_names: Vec<String>,
}

impl Signals {
    /// No external evidence.
    #[must_use]
    pub fn new() -> Signals {
        Signals::default()
    }

    /// Add a signature match.
    #[must_use]
    pub fn with_signature(mut self, name: impl Into<String>, location: ScanLocation) -> Signals {
        self.signature_matches.push(SignatureMatch {
            name: name.into(),
            location,
        });
        self
    }

    /// Add a resource entry name.
    #[must_use]
    pub fn with_resource(mut self, name: impl Into<String>) -> Signals {
        self.resource_names.push(name.into());
        self
    }

    /// Add an imported symbol name.
    #[must_use]
    pub fn with_import(mut self, name: impl Into<String>) -> Signals {
        self.import_names.push(name.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reasons_are_deduplicated_in_order() {
        let mut hint = ReHint::new(ReHintKind::UpxPacker);
        hint.add_reason("section 1 is named \"UPX0\"".into());
        hint.add_reason("section 2 is named \"UPX1\"".into());
        hint.add_reason("section 1 is named \"UPX0\"".into());

        assert_eq!(hint.reasons().len(), 2);
        assert!(hint.reasons()[0].contains("UPX0"));
        assert!(hint.reasons()[1].contains("UPX1"));
    }

    #[test]
    fn signals_builder_accumulates() {
        let signals = Signals::new()
            .with_signature("UPX!", ScanLocation::EntryPoint)
            .with_resource("PYTHONSCRIPT")
            .with_import("CreateRemoteThread");

        assert_eq!(signals.signature_matches.len(), 1);
        assert_eq!(signals.resource_names, vec!["PYTHONSCRIPT"]);
        assert_eq!(signals.import_names, vec!["CreateRemoteThread"]);
    }

    #[test]
    fn hint_display_joins_reasons() {
        let mut hint = ReHint::new(ReHintKind::Archive);
        hint.add_reason("a".into());
        hint.add_reason("b".into());
        assert_eq!(hint.to_string(), "Archive: a; b");
    }
}
