//! Checks on the section table: placement, geometry, names, characteristics, and
//! pairwise range conflicts.

use crate::{
    anomalies::{Anomaly, AnomalyKey, AnomalyKind, CheckContext},
    pe::{SectionFlags, SectionRecord},
};

/// Names the mainstream toolchains emit. Anything else is worth a second look.
const KNOWN_SECTION_NAMES: &[&str] = &[
    ".text", ".code", "CODE", ".data", "DATA", ".rdata", ".idata", ".edata", ".pdata", ".rsrc",
    ".reloc", ".bss", "BSS", ".tls", ".debug", ".drectve", ".sdata", ".srdata", ".sbss", ".xdata",
    ".cormeta", ".sxdata", ".00cfg", ".CRT", ".gfids", ".giats", ".gljmp", ".textbss", ".didat",
    ".itext", ".ndata", "INIT", "PAGE", ".apiset", ".mrdata", ".msvcjmc",
];

pub(crate) struct SectionChecks;

impl SectionChecks {
    pub(crate) fn run(ctx: &CheckContext<'_>, findings: &mut Vec<Anomaly>) {
        Self::check_table_placement(ctx, findings);

        // Read sizes are O(section count) each; computed once for the quadratic passes
        let read_sizes: Vec<u64> = ctx
            .sections
            .records()
            .iter()
            .map(|section| ctx.sections.read_size(section))
            .collect();
        let names: Vec<String> =
            ctx.sections.records().iter().map(SectionRecord::name).collect();

        for (index, section) in ctx.sections.records().iter().enumerate() {
            Self::check_geometry(ctx, section, read_sizes[index], findings);
            Self::check_name(section, &names[index], findings);
            Self::check_characteristics(section, findings);
        }

        Self::check_ordering(ctx, findings);
        Self::check_pairs(ctx, &read_sizes, &names, findings);
    }

    fn check_table_placement(ctx: &CheckContext<'_>, findings: &mut Vec<Anomaly>) {
        if ctx.sections.is_truncated() {
            findings.push(Anomaly::new(
                AnomalyKind::TruncatedSecTable,
                None,
                format!(
                    "{} of {} section rows are inside the file",
                    ctx.sections.loaded_count(),
                    ctx.sections.expected_count()
                ),
            ));
        }

        if ctx.overlay_offset < ctx.sections.file_size()
            && ctx.sections.table_offset() >= ctx.overlay_offset
        {
            findings.push(Anomaly::new(
                AnomalyKind::SecTableInOverlay,
                None,
                format!(
                    "section table at {:#X} lies in the overlay starting at {:#X}",
                    ctx.sections.table_offset(),
                    ctx.overlay_offset
                ),
            ));
        }
    }

    fn check_geometry(
        ctx: &CheckContext<'_>,
        section: &SectionRecord,
        read_size: u64,
        findings: &mut Vec<Anomaly>,
    ) {
        let key = Some(AnomalyKey::Section(section.ordinal));
        let name = section.name_display();
        let low = ctx.sections.is_low_alignment();

        let virtual_wraps = section
            .virtual_address
            .checked_add(section.virtual_size)
            .is_none();
        let raw_wraps = section
            .pointer_to_raw_data
            .checked_add(section.size_of_raw_data)
            .is_none();
        if virtual_wraps || raw_wraps {
            let what = match (virtual_wraps, raw_wraps) {
                (true, true) => "virtual and raw ranges wrap around the address space",
                (true, false) => "virtual range wraps around the address space",
                _ => "raw range wraps around the address space",
            };
            findings.push(Anomaly::new(
                AnomalyKind::OverflowingSecRange,
                key,
                format!("section {} ({name}): {what}", section.ordinal),
            ));
        }

        if section.virtual_address == 0 {
            findings.push(Anomaly::new(
                AnomalyKind::ZeroVaSec,
                key,
                format!("section {} ({name}) has virtual address zero", section.ordinal),
            ));
        }

        if let Some(opt) = ctx.optional {
            let sec_align = opt.section_alignment();
            let file_align = opt.file_alignment();
            if !low {
                if sec_align > 0 && u64::from(section.virtual_address) % sec_align != 0 {
                    findings.push(Anomaly::new(
                        AnomalyKind::NotAlignedSecVa,
                        key,
                        format!(
                            "section {} ({name}) virtual address {:#X} is not section aligned",
                            section.ordinal, section.virtual_address
                        ),
                    ));
                }
                if file_align > 0 {
                    if section.pointer_to_raw_data != 0
                        && u64::from(section.pointer_to_raw_data) % file_align != 0
                    {
                        findings.push(Anomaly::new(
                            AnomalyKind::NotFileAlignedSecPointer,
                            key,
                            format!(
                                "section {} ({name}) raw pointer {:#X} is not file aligned",
                                section.ordinal, section.pointer_to_raw_data
                            ),
                        ));
                    }
                    if section.size_of_raw_data != 0
                        && u64::from(section.size_of_raw_data) % file_align != 0
                    {
                        findings.push(Anomaly::new(
                            AnomalyKind::NotFileAlignedSecSize,
                            key,
                            format!(
                                "section {} ({name}) raw size {:#X} is not file aligned",
                                section.ordinal, section.size_of_raw_data
                            ),
                        ));
                    }
                }
            }

            let image_size = opt.size_of_image();
            let virtual_end =
                u64::from(section.virtual_address) + u64::from(section.virtual_size);
            if image_size > 0 && virtual_end > image_size {
                findings.push(Anomaly::new(
                    AnomalyKind::SecExceedsImage,
                    key,
                    format!(
                        "section {} ({name}) ends at RVA {virtual_end:#X}, beyond the {image_size:#X} byte image",
                        section.ordinal
                    ),
                ));
            }
        }

        if section.pointer_to_raw_data != 0
            && section.size_of_raw_data != 0
            && section.aligned_pointer_to_raw(low) >= ctx.sections.file_size()
        {
            findings.push(Anomaly::new(
                AnomalyKind::SecDataBeyondFile,
                key,
                format!(
                    "raw data of section {} ({name}) at {:#X} lies beyond the {} byte file",
                    section.ordinal,
                    section.pointer_to_raw_data,
                    ctx.sections.file_size()
                ),
            ));
        }

        if section.size_of_raw_data == 0 || section.pointer_to_raw_data == 0 {
            let what = if section.size_of_raw_data == 0 {
                "declares no raw data"
            } else {
                "has a zero raw data pointer"
            };
            findings.push(Anomaly::new(
                AnomalyKind::ZeroRawSizeSec,
                key,
                format!("section {} ({name}) {what}", section.ordinal),
            ));
        }

        let headers = ctx.sections.size_of_headers();
        if headers > 0 && read_size > 0 && section.aligned_pointer_to_raw(low) < headers {
            findings.push(Anomaly::new(
                AnomalyKind::SecOverlapsHeaders,
                key,
                format!(
                    "section {} ({name}) reads from {:#X}, inside the {headers:#X} byte header region",
                    section.ordinal,
                    section.aligned_pointer_to_raw(low)
                ),
            ));
        }
    }

    fn check_name(section: &SectionRecord, name: &str, findings: &mut Vec<Anomaly>) {
        let key = Some(AnomalyKey::Section(section.ordinal));

        if section.has_empty_name() {
            findings.push(Anomaly::new(
                AnomalyKind::EmptySecName,
                key,
                format!("section {} has an empty name", section.ordinal),
            ));
            return;
        }

        if name.chars().any(char::is_control) {
            findings.push(Anomaly::new(
                AnomalyKind::CtrlSymbInSecName,
                key,
                format!(
                    "section {} name \"{}\" contains control characters",
                    section.ordinal,
                    section.name_display()
                ),
            ));
        } else if !KNOWN_SECTION_NAMES.contains(&name) {
            findings.push(Anomaly::new(
                AnomalyKind::UnusualSecName,
                key,
                format!("section {} has unusual name \"{name}\"", section.ordinal),
            ));
        }
    }

    fn check_characteristics(section: &SectionRecord, findings: &mut Vec<Anomaly>) {
        let key = Some(AnomalyKey::Section(section.ordinal));
        let name = section.name_display();
        let flags = section.flags();

        if flags.contains(SectionFlags::MEM_WRITE | SectionFlags::MEM_EXECUTE) {
            findings.push(Anomaly::new(
                AnomalyKind::WriteableExecutableSec,
                key,
                format!("section {} ({name}) is both writeable and executable", section.ordinal),
            ));
        }

        if flags.contains(SectionFlags::MEM_SHARED) {
            findings.push(Anomaly::new(
                AnomalyKind::SharedSec,
                key,
                format!("section {} ({name}) is marked shareable", section.ordinal),
            ));
        }

        if flags.contains(SectionFlags::CNT_UNINITIALIZED_DATA)
            && section.size_of_raw_data != 0
            && section.pointer_to_raw_data != 0
        {
            findings.push(Anomaly::new(
                AnomalyKind::UninitializedSecWithRawData,
                key,
                format!(
                    "section {} ({name}) is marked uninitialized but carries {:#X} bytes of raw data",
                    section.ordinal, section.size_of_raw_data
                ),
            ));
        }

        let reserved = section.characteristics & SectionFlags::RESERVED_MASK;
        if reserved != 0 {
            findings.push(Anomaly::new(
                AnomalyKind::ReservedSecCharacteristics,
                key,
                format!(
                    "reserved characteristics bits {reserved:#010X} set on section {} ({name})",
                    section.ordinal
                ),
            ));
        }

        let deprecated = flags.intersection(SectionFlags::DEPRECATED);
        if !deprecated.is_empty() {
            let flag_names: Vec<&str> =
                deprecated.iter_names().map(|(flag_name, _)| flag_name).collect();
            findings.push(Anomaly::new(
                AnomalyKind::DeprecatedSecCharacteristics,
                key,
                format!(
                    "deprecated characteristics {} set on section {} ({name})",
                    flag_names.join(", "),
                    section.ordinal
                ),
            ));
        }
    }

    fn check_ordering(ctx: &CheckContext<'_>, findings: &mut Vec<Anomaly>) {
        let mut previous: Option<&SectionRecord> = None;
        for section in ctx.sections.records() {
            if let Some(prev) = previous {
                if section.virtual_address < prev.virtual_address {
                    findings.push(Anomaly::new(
                        AnomalyKind::NotAscendingSecVa,
                        Some(AnomalyKey::Section(section.ordinal)),
                        format!(
                            "virtual addresses are not ascending: section {} at {:#X} follows {:#X}",
                            section.ordinal, section.virtual_address, prev.virtual_address
                        ),
                    ));
                    return;
                }
            }
            previous = Some(section);
        }
    }

    /// Pairwise range conflicts, reported once per later section so a table of
    /// thousands of identical rows yields a linear number of findings.
    fn check_pairs(
        ctx: &CheckContext<'_>,
        read_sizes: &[u64],
        names: &[String],
        findings: &mut Vec<Anomaly>,
    ) {
        let records = ctx.sections.records();
        let low = ctx.sections.is_low_alignment();

        for j in 1..records.len() {
            let mut physical_reported = false;
            let mut virtual_reported = false;
            let mut name_reported = false;

            for i in 0..j {
                let (a, b) = (&records[i], &records[j]);

                if !physical_reported {
                    let a_start = a.aligned_pointer_to_raw(low);
                    let b_start = b.aligned_pointer_to_raw(low);
                    let (a_end, b_end) = (a_start + read_sizes[i], b_start + read_sizes[j]);
                    if read_sizes[i] > 0 && read_sizes[j] > 0 {
                        if a_start == b_start && a_end == b_end {
                            findings.push(Anomaly::new(
                                AnomalyKind::PhysicallyDuplicatedSec,
                                Some(AnomalyKey::Section(b.ordinal)),
                                format!(
                                    "sections {} and {} read the identical range {a_start:#X}..{a_end:#X}",
                                    a.ordinal, b.ordinal
                                ),
                            ));
                            physical_reported = true;
                        } else if a_start < b_end && b_start < a_end {
                            findings.push(Anomaly::new(
                                AnomalyKind::PhysicallyOverlappingSec,
                                Some(AnomalyKey::Section(b.ordinal)),
                                format!(
                                    "sections {} and {} read overlapping ranges {a_start:#X}..{a_end:#X} and {b_start:#X}..{b_end:#X}",
                                    a.ordinal, b.ordinal
                                ),
                            ));
                            physical_reported = true;
                        }
                    }
                }

                if !virtual_reported {
                    let a_start = a.aligned_virtual_address(low);
                    let b_start = b.aligned_virtual_address(low);
                    let a_end = a_start + a.aligned_virtual_size(low);
                    let b_end = b_start + b.aligned_virtual_size(low);
                    if a_end > a_start && b_end > b_start {
                        if a_start == b_start && a_end == b_end {
                            findings.push(Anomaly::new(
                                AnomalyKind::VirtuallyDuplicatedSec,
                                Some(AnomalyKey::Section(b.ordinal)),
                                format!(
                                    "sections {} and {} occupy the identical virtual range {a_start:#X}..{a_end:#X}",
                                    a.ordinal, b.ordinal
                                ),
                            ));
                            virtual_reported = true;
                        } else if a_start < b_end && b_start < a_end {
                            findings.push(Anomaly::new(
                                AnomalyKind::VirtuallyOverlappingSec,
                                Some(AnomalyKey::Section(b.ordinal)),
                                format!(
                                    "sections {} and {} occupy overlapping virtual ranges {a_start:#X}..{a_end:#X} and {b_start:#X}..{b_end:#X}",
                                    a.ordinal, b.ordinal
                                ),
                            ));
                            virtual_reported = true;
                        }
                    }
                }

                if !name_reported && !a.has_empty_name() && names[i] == names[j] {
                    findings.push(Anomaly::new(
                        AnomalyKind::DuplicatedSecName,
                        Some(AnomalyKey::Section(b.ordinal)),
                        format!(
                            "sections {} and {} share the name \"{}\"",
                            a.ordinal,
                            b.ordinal,
                            b.name_display()
                        ),
                    ));
                    name_reported = true;
                }

                if physical_reported && virtual_reported && name_reported {
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::test::{has_kind, PeImage};
    use crate::{AnomalyKind, PeFile};

    #[test]
    fn sane_sections_are_clean() {
        let pe = PeFile::from_mem(PeImage::minimal().build()).unwrap();
        let findings = pe.scan_anomalies();
        for kind in [
            AnomalyKind::UnusualSecName,
            AnomalyKind::ZeroVaSec,
            AnomalyKind::NotAlignedSecVa,
            AnomalyKind::NotFileAlignedSecPointer,
            AnomalyKind::SecExceedsImage,
            AnomalyKind::PhysicallyOverlappingSec,
            AnomalyKind::SecOverlapsHeaders,
        ] {
            assert!(!has_kind(&findings, kind), "unexpected {kind}");
        }
    }

    #[test]
    fn unusual_and_control_names() {
        let image = PeImage::minimal()
            .section("UPX0", 0x1000, 0x2000, 0x200, 0x600, 0x6000_0020)
            .build();
        let pe = PeFile::from_mem(image).unwrap();
        assert!(has_kind(&pe.scan_anomalies(), AnomalyKind::UnusualSecName));

        let image = PeImage::minimal()
            .section("\u{1}bad", 0x1000, 0x2000, 0x200, 0x600, 0x6000_0020)
            .build();
        let pe = PeFile::from_mem(image).unwrap();
        let findings = pe.scan_anomalies();
        assert!(has_kind(&findings, AnomalyKind::CtrlSymbInSecName));
        assert!(!has_kind(&findings, AnomalyKind::UnusualSecName));
    }

    #[test]
    fn duplicated_sections_are_not_also_overlapping() {
        let image = PeImage::minimal()
            .section(".text", 0x1000, 0x1000, 0x200, 0x400, 0x6000_0020)
            .build();
        let pe = PeFile::from_mem(image).unwrap();
        let findings = pe.scan_anomalies();
        assert!(has_kind(&findings, AnomalyKind::PhysicallyDuplicatedSec));
        assert!(has_kind(&findings, AnomalyKind::VirtuallyDuplicatedSec));
        assert!(has_kind(&findings, AnomalyKind::DuplicatedSecName));
        assert!(!has_kind(&findings, AnomalyKind::PhysicallyOverlappingSec));
        assert!(!has_kind(&findings, AnomalyKind::VirtuallyOverlappingSec));
    }

    #[test]
    fn writeable_executable_section_is_flagged() {
        let image = PeImage::minimal()
            .section(".wx", 0x1000, 0x2000, 0x200, 0x600, 0xE000_0020)
            .build();
        let pe = PeFile::from_mem(image).unwrap();
        assert!(has_kind(&pe.scan_anomalies(), AnomalyKind::WriteableExecutableSec));
    }

    #[test]
    fn descending_virtual_addresses_are_flagged() {
        let image = PeImage::minimal()
            .section(".low", 0x1000, 0x800, 0x200, 0x600, 0x4000_0040)
            .build();
        let pe = PeFile::from_mem(image).unwrap();
        assert!(has_kind(&pe.scan_anomalies(), AnomalyKind::NotAscendingSecVa));
    }
}
