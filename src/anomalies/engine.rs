//! Check battery execution.
//!
//! The battery runs the individual check passes in a fixed order over one shared view
//! of the decoded file. Ordering is part of the contract: reports diff cleanly across
//! runs and across machines, so the passes execute sequentially rather than in
//! parallel, and each pass iterates its subject in file order.

use crate::{
    anomalies::{
        checks::{
            clr::ClrChecks, coff::CoffChecks, directories::DirectoryChecks, msdos::MsdosChecks,
            optional::OptionalChecks, sections::SectionChecks,
        },
        Anomaly,
    },
    pe::{ClrProbe, CoffHeader, MsdosHeader, OptionalHeader, ResolvedDataDir, SectionModel},
};

/// Everything a check pass may look at, decoded once and borrowed everywhere.
///
/// Derived values that are expensive to recompute, the overlay offset in particular,
/// are calculated once by the caller and carried here.
pub(crate) struct CheckContext<'a> {
    /// File offset of the PE signature
    pub pe_offset: u64,
    /// The MS-DOS header, always present in a scannable file
    pub dos: &'a MsdosHeader,
    /// The COFF header, always present in a scannable file
    pub coff: &'a CoffHeader,
    /// The optional header, absent when not even its magic was readable
    pub optional: Option<&'a OptionalHeader>,
    /// The loaded section table
    pub sections: &'a SectionModel,
    /// Data directory entries with their physical resolution
    pub directories: &'a [ResolvedDataDir],
    /// The CLR probe, present only for managed images with reachable structures
    pub clr: Option<&'a ClrProbe>,
    /// Precomputed overlay start
    pub overlay_offset: u64,
}

type Check = fn(&CheckContext<'_>, &mut Vec<Anomaly>);

/// The passes in execution order: outermost structure first, pointed-to structures
/// last, matching the order an analyst walks the file.
const BATTERY: &[Check] = &[
    MsdosChecks::run,
    CoffChecks::run,
    OptionalChecks::run,
    DirectoryChecks::run,
    SectionChecks::run,
    ClrChecks::run,
];

/// Run the full battery and collect every finding.
pub(crate) fn run_checks(ctx: &CheckContext<'_>) -> Vec<Anomaly> {
    let mut findings = Vec::new();
    for check in BATTERY {
        check(ctx, &mut findings);
    }
    findings
}
