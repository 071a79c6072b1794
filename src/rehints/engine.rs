//! Rule battery turning structural evidence into [`ReHint`]s.
//!
//! Rules run in a fixed registration order and feed a [`HintAccumulator`] that keeps
//! one hint per kind. The output order is therefore stable across runs of the same
//! file with the same signals, which matters when hint lists are diffed between
//! analysis sessions.

use std::collections::HashMap;

use crate::{
    anomalies::{Anomaly, AnomalyKind},
    pe::SectionModel,
    rehints::{ReHint, ReHintKind, ScanLocation, SignatureMatch, Signals},
};

impl ScanLocation {
    fn phrase(self) -> &'static str {
        match self {
            ScanLocation::EntryPoint => "at the entry point",
            ScanLocation::Overlay => "in the overlay",
            ScanLocation::MsdosStub => "in the MS-DOS stub",
        }
    }
}

/// Everything the rules may look at for one file.
pub(crate) struct HintContext<'a> {
    pub sections: &'a SectionModel,
    pub anomalies: &'a [Anomaly],
    pub signals: &'a Signals,
}

/// Collects hints while guaranteeing one entry per kind.
struct HintAccumulator {
    hints: Vec<ReHint>,
    index: HashMap<ReHintKind, usize>,
}

impl HintAccumulator {
    fn new() -> HintAccumulator {
        HintAccumulator {
            hints: Vec::new(),
            index: HashMap::new(),
        }
    }

    fn add(&mut self, kind: ReHintKind, reason: String) {
        let slot = match self.index.get(&kind) {
            Some(&slot) => slot,
            None => {
                let slot = self.hints.len();
                self.hints.push(ReHint::new(kind));
                self.index.insert(kind, slot);
                slot
            }
        };
        self.hints[slot].add_reason(reason);
    }

    fn into_hints(self) -> Vec<ReHint> {
        self.hints
    }
}

/// Case-normalized views over the evidence, computed once per scan.
///
/// Section and signature names compare case-insensitively via lowercase, resource
/// names via uppercase to match how the resource tree stores them.
struct ScanInputs<'a> {
    /// Ordinal, lowercased name, display name per section row
    sections: Vec<(u32, String, String)>,
    /// Lowercased signature name plus the original match
    signatures: Vec<(String, &'a SignatureMatch)>,
    /// Lowercased import name plus the original spelling
    imports: Vec<(String, &'a str)>,
    /// Uppercased resource name plus the original spelling
    resources: Vec<(String, &'a str)>,
}

impl<'a> ScanInputs<'a> {
    fn prepare(ctx: &HintContext<'a>) -> ScanInputs<'a> {
        let sections = ctx
            .sections
            .records()
            .iter()
            .map(|record| {
                let display = record.name_display();
                (record.ordinal, display.to_lowercase(), display)
            })
            .collect();
        let signatures = ctx
            .signals
            .signature_matches
            .iter()
            .map(|m| (m.name.to_lowercase(), m))
            .collect();
        let imports = ctx
            .signals
            .import_names
            .iter()
            .map(|name| (name.to_lowercase(), name.as_str()))
            .collect();
        let resources = ctx
            .signals
            .resource_names
            .iter()
            .map(|name| (name.to_uppercase(), name.as_str()))
            .collect();
        ScanInputs {
            sections,
            signatures,
            imports,
            resources,
        }
    }

    fn sections_named<'s>(&'s self, lower: &'s str) -> impl Iterator<Item = (u32, &'s str)> + 's {
        self.sections
            .iter()
            .filter(move |(_, name, _)| name == lower)
            .map(|(ordinal, _, display)| (*ordinal, display.as_str()))
    }

    fn sections_prefixed<'s>(
        &'s self,
        prefix: &'s str,
    ) -> impl Iterator<Item = (u32, &'s str)> + 's {
        self.sections
            .iter()
            .filter(move |(_, name, _)| name.starts_with(prefix))
            .map(|(ordinal, _, display)| (*ordinal, display.as_str()))
    }

    fn signatures_containing<'s>(
        &'s self,
        needle: &'s str,
    ) -> impl Iterator<Item = &'s SignatureMatch> + 's {
        self.signatures
            .iter()
            .filter(move |(lower, _)| lower.contains(needle))
            .map(|(_, m)| *m)
    }

    fn overlay_signatures_containing<'s>(
        &'s self,
        needle: &'s str,
    ) -> impl Iterator<Item = &'s SignatureMatch> + 's {
        self.signatures_containing(needle)
            .filter(|m| m.location == ScanLocation::Overlay)
    }

    fn import(&self, lower: &str) -> Option<&'a str> {
        self.imports
            .iter()
            .find(|(name, _)| name == lower)
            .map(|(_, original)| *original)
    }

    fn resource(&self, upper: &str) -> Option<&'a str> {
        self.resources
            .iter()
            .find(|(name, _)| name == upper)
            .map(|(_, original)| *original)
    }
}

type Rule = fn(&ScanInputs<'_>, &HintContext<'_>, &mut HintAccumulator);

/// Registration order doubles as output order.
const RULES: [Rule; 13] = [
    upx_packer,
    nullsoft_installer,
    pyinstaller,
    electron_package,
    appended_archive,
    embedded_executable,
    script_wrapper,
    self_extracting_archive,
    thread_name_injection,
    process_doppelgaenging,
    autohotkey,
    inno_setup,
    dotnet_obfuscation,
];

pub(crate) fn run_hints(ctx: &HintContext<'_>) -> Vec<ReHint> {
    let inputs = ScanInputs::prepare(ctx);
    let mut acc = HintAccumulator::new();
    for rule in RULES {
        rule(&inputs, ctx, &mut acc);
    }
    acc.into_hints()
}

fn signature_reason(m: &SignatureMatch) -> String {
    format!("signature \"{}\" matched {}", m.name, m.location.phrase())
}

fn upx_packer(inputs: &ScanInputs<'_>, _ctx: &HintContext<'_>, acc: &mut HintAccumulator) {
    for (ordinal, display) in inputs.sections_prefixed("upx") {
        acc.add(
            ReHintKind::UpxPacker,
            format!("section {ordinal} is named \"{display}\""),
        );
    }
    for m in inputs.signatures_containing("upx") {
        acc.add(ReHintKind::UpxPacker, signature_reason(m));
    }
}

fn nullsoft_installer(inputs: &ScanInputs<'_>, _ctx: &HintContext<'_>, acc: &mut HintAccumulator) {
    for (ordinal, _) in inputs.sections_named(".ndata") {
        acc.add(
            ReHintKind::NullsoftInstaller,
            format!("section {ordinal} is named \".ndata\", the NSIS data section"),
        );
    }
    for m in inputs.signatures_containing("nullsoft") {
        acc.add(ReHintKind::NullsoftInstaller, signature_reason(m));
    }
}

fn pyinstaller(inputs: &ScanInputs<'_>, _ctx: &HintContext<'_>, acc: &mut HintAccumulator) {
    for m in inputs.signatures_containing("pyinstaller") {
        acc.add(ReHintKind::PyInstaller, signature_reason(m));
    }
}

fn electron_package(inputs: &ScanInputs<'_>, _ctx: &HintContext<'_>, acc: &mut HintAccumulator) {
    for m in inputs.signatures_containing("electron") {
        acc.add(ReHintKind::ElectronPackage, signature_reason(m));
    }
    if let Some(original) = inputs.resource("ELECTRON") {
        acc.add(
            ReHintKind::ElectronPackage,
            format!("resource directory contains an \"{original}\" entry"),
        );
    }
}

fn appended_archive(inputs: &ScanInputs<'_>, _ctx: &HintContext<'_>, acc: &mut HintAccumulator) {
    for m in inputs.overlay_signatures_containing("archive") {
        acc.add(ReHintKind::Archive, signature_reason(m));
    }
}

fn embedded_executable(inputs: &ScanInputs<'_>, _ctx: &HintContext<'_>, acc: &mut HintAccumulator) {
    for m in inputs.overlay_signatures_containing("executable") {
        acc.add(ReHintKind::EmbeddedExe, signature_reason(m));
    }
}

fn script_wrapper(inputs: &ScanInputs<'_>, _ctx: &HintContext<'_>, acc: &mut HintAccumulator) {
    for name in ["PYTHONSCRIPT", "SCRIPT"] {
        if let Some(original) = inputs.resource(name) {
            acc.add(
                ReHintKind::ScriptToExeWrapped,
                format!("resource directory contains a \"{original}\" entry"),
            );
        }
    }
    for m in inputs.signatures_containing("py2exe") {
        acc.add(ReHintKind::ScriptToExeWrapped, signature_reason(m));
    }
}

fn self_extracting_archive(
    inputs: &ScanInputs<'_>,
    _ctx: &HintContext<'_>,
    acc: &mut HintAccumulator,
) {
    for m in inputs.signatures_containing("sfx") {
        acc.add(ReHintKind::SelfExtractingArchive, signature_reason(m));
    }
    // Installer dialog resources alone are not enough; they only count together
    // with an archive actually sitting in the overlay.
    let dialog = ["STARTDIALOG", "LICENSEDLG"]
        .iter()
        .find_map(|name| inputs.resource(name));
    let Some(dialog) = dialog else { return };
    for m in inputs.overlay_signatures_containing("archive") {
        acc.add(
            ReHintKind::SelfExtractingArchive,
            format!(
                "resource \"{dialog}\" together with archive signature \"{}\" in the overlay",
                m.name
            ),
        );
    }
}

fn thread_name_injection(
    inputs: &ScanInputs<'_>,
    _ctx: &HintContext<'_>,
    acc: &mut HintAccumulator,
) {
    let (Some(set), Some(get)) = (
        inputs.import("setthreaddescription"),
        inputs.import("getthreaddescription"),
    ) else {
        return;
    };
    for delivery in ["queueuserapc", "ntqueueapcthread", "createremotethread"] {
        if let Some(original) = inputs.import(delivery) {
            acc.add(
                ReHintKind::ThreadNameInjection,
                format!("imports {set} and {get} together with {original}"),
            );
        }
    }
}

fn process_doppelgaenging(
    inputs: &ScanInputs<'_>,
    _ctx: &HintContext<'_>,
    acc: &mut HintAccumulator,
) {
    let Some(transaction) = inputs.import("createtransaction") else {
        return;
    };
    let transacted_file = inputs
        .import("createfiletransactedw")
        .or_else(|| inputs.import("createfiletransacteda"));
    let Some(transacted_file) = transacted_file else {
        return;
    };
    let section = inputs
        .import("ntcreatesection")
        .or_else(|| inputs.import("zwcreatesection"));
    let Some(section) = section else { return };
    acc.add(
        ReHintKind::ProcessDoppelgaenging,
        format!("imports {transaction}, {transacted_file} and {section}"),
    );
}

fn autohotkey(inputs: &ScanInputs<'_>, _ctx: &HintContext<'_>, acc: &mut HintAccumulator) {
    if let Some(original) = inputs.resource(">AUTOHOTKEY SCRIPT<") {
        acc.add(
            ReHintKind::AutoHotkey,
            format!("resource directory contains a \"{original}\" entry"),
        );
    }
    for m in inputs.signatures_containing("autohotkey") {
        acc.add(ReHintKind::AutoHotkey, signature_reason(m));
    }
}

fn inno_setup(inputs: &ScanInputs<'_>, _ctx: &HintContext<'_>, acc: &mut HintAccumulator) {
    let mut matched = false;
    for m in inputs.signatures_containing("inno") {
        acc.add(ReHintKind::InnoSetup, signature_reason(m));
        matched = true;
    }
    // ".itext" also shows up in plain Delphi builds, so on its own it proves
    // nothing; it only corroborates a signature match.
    if matched {
        for (ordinal, _) in inputs.sections_named(".itext") {
            acc.add(
                ReHintKind::InnoSetup,
                format!("section {ordinal} is named \".itext\""),
            );
        }
    }
}

fn dotnet_obfuscation(_inputs: &ScanInputs<'_>, ctx: &HintContext<'_>, acc: &mut HintAccumulator) {
    if ctx
        .anomalies
        .iter()
        .any(|a| a.kind() == AnomalyKind::BrokenClrVersionString)
    {
        acc.add(
            ReHintKind::DotNetObfuscation,
            "the CLR metadata version string is broken".to_string(),
        );
    }
}
