//! Checks on the optional header: sizes, entry point, alignments, reserved fields.

use crate::{
    anomalies::{Anomaly, AnomalyKey, AnomalyKind, CheckContext, HeaderField},
    pe::{
        layout::{CoffField, StandardField, WindowsField},
        optional::DATA_DIR_COUNT,
        DllCharacteristics, FileCharacteristics, OptionalHeader, SectionFlags,
    },
};

/// Image bases the common linkers emit by default.
const DEFAULT_IMAGE_BASES: [u64; 4] = [0x40_0000, 0x1000_0000, 0x1_4000_0000, 0x1_8000_0000];

fn field_key(field: WindowsField) -> Option<AnomalyKey> {
    Some(AnomalyKey::Field(HeaderField::Windows(field)))
}

pub(crate) struct OptionalChecks;

impl OptionalChecks {
    pub(crate) fn run(ctx: &CheckContext<'_>, findings: &mut Vec<Anomaly>) {
        let Some(opt) = ctx.optional else {
            findings.push(Anomaly::new(
                AnomalyKind::CollapsedOptionalHeader,
                Some(AnomalyKey::Field(HeaderField::Coff(CoffField::SizeOfOptionalHeader))),
                format!(
                    "declared optional header size {} leaves no readable header",
                    ctx.coff.size_of_optional_header()
                ),
            ));
            return;
        };

        Self::check_extent(opt, findings);
        Self::check_magic(opt, findings);
        Self::check_entry_point(ctx, opt, findings);
        Self::check_alignments(opt, findings);
        Self::check_image_base(opt, findings);
        Self::check_size_of_image(opt, findings);
        Self::check_size_of_headers(ctx, opt, findings);
        Self::check_reserved_fields(opt, findings);
        Self::check_directory_count(opt, findings);
    }

    fn check_extent(opt: &OptionalHeader, findings: &mut Vec<Anomaly>) {
        let layout = opt.layout_size() as u64;
        if opt.declared_size() < layout {
            findings.push(Anomaly::new(
                AnomalyKind::CollapsedOptionalHeader,
                Some(AnomalyKey::Field(HeaderField::Coff(CoffField::SizeOfOptionalHeader))),
                format!(
                    "declared optional header size {} is smaller than its {} byte layout",
                    opt.declared_size(),
                    layout
                ),
            ));
        }

        if (opt.file_backed() as u64) < layout {
            findings.push(Anomaly::new(
                AnomalyKind::TruncatedOptionalHeader,
                None,
                format!(
                    "file ends inside the optional header, {} of {} bytes present",
                    opt.file_backed(),
                    layout
                ),
            ));
        }
    }

    fn check_magic(opt: &OptionalHeader, findings: &mut Vec<Anomaly>) {
        if !opt.has_known_magic() {
            let raw = opt.raw_magic();
            let mut description =
                format!("optional header magic {raw:#X} is neither PE32 nor PE32+");
            if raw == crate::pe::layout::ROM_MAGIC {
                description.push_str(", matching the obsolete ROM image format");
            }
            findings.push(Anomaly::new(
                AnomalyKind::UnusualOptHeaderMagic,
                Some(AnomalyKey::Field(HeaderField::Standard(StandardField::Magic))),
                description,
            ));
        }
    }

    fn check_entry_point(ctx: &CheckContext<'_>, opt: &OptionalHeader, findings: &mut Vec<Anomaly>) {
        let ep = opt.address_of_entry_point();
        let ep_key = Some(AnomalyKey::Field(HeaderField::Standard(
            StandardField::AddressOfEntryPoint,
        )));

        if ep == 0 {
            if !ctx.coff.characteristics().contains(FileCharacteristics::DLL) {
                findings.push(Anomaly::new(
                    AnomalyKind::ZeroEp,
                    ep_key,
                    "zero entry point in an image not marked as a DLL",
                ));
            }
            return;
        }

        match ctx.sections.section_containing_rva(ep) {
            Some(ordinal) => {
                let Some(section) = ctx.sections.get(ordinal) else {
                    return;
                };

                if ctx.sections.read_size(section) == 0 {
                    findings.push(Anomaly::new(
                        AnomalyKind::VirtualEp,
                        ep_key,
                        format!(
                            "entry point {:#X} lies in section {} ({}) which reads no file data",
                            ep,
                            ordinal,
                            section.name_display()
                        ),
                    ));
                }

                if section.flags().contains(SectionFlags::MEM_WRITE) {
                    findings.push(Anomaly::new(
                        AnomalyKind::EpInWriteableSec,
                        Some(AnomalyKey::Section(ordinal)),
                        format!(
                            "entry point {:#X} lies in writeable section {} ({})",
                            ep,
                            ordinal,
                            section.name_display()
                        ),
                    ));
                }

                if ctx.sections.loaded_count() > 1 && ordinal as usize == ctx.sections.loaded_count()
                {
                    findings.push(Anomaly::new(
                        AnomalyKind::EpInLastSection,
                        Some(AnomalyKey::Section(ordinal)),
                        format!(
                            "entry point {:#X} lies in the last section {} ({})",
                            ep,
                            ordinal,
                            section.name_display()
                        ),
                    ));
                }
            }
            None => {
                if ep < ctx.sections.size_of_headers() {
                    findings.push(Anomaly::new(
                        AnomalyKind::EpInHeader,
                        ep_key,
                        format!("entry point {ep:#X} lies in the header region"),
                    ));
                } else {
                    findings.push(Anomaly::new(
                        AnomalyKind::VirtualEp,
                        ep_key,
                        format!("entry point RVA {ep:#X} maps to no file data"),
                    ));
                }
            }
        }
    }

    fn check_alignments(opt: &OptionalHeader, findings: &mut Vec<Anomaly>) {
        let file_align = opt.file_alignment();
        let sec_align = opt.section_alignment();
        let low = opt.is_low_alignment_mode();

        if !file_align.is_power_of_two() {
            findings.push(Anomaly::new(
                AnomalyKind::NotPowOfTwoFileAlign,
                field_key(WindowsField::FileAlignment),
                format!("file alignment {file_align:#X} is not a power of two"),
            ));
        }
        if !low && file_align < 512 {
            findings.push(Anomaly::new(
                AnomalyKind::TooSmallFileAlign,
                field_key(WindowsField::FileAlignment),
                format!("file alignment {file_align} is below the minimum of 512"),
            ));
        }
        if file_align > 0x10000 {
            findings.push(Anomaly::new(
                AnomalyKind::TooLargeFileAlign,
                field_key(WindowsField::FileAlignment),
                format!("file alignment {file_align:#X} is above the maximum of 64 KiB"),
            ));
        }
        if file_align != 512 {
            findings.push(Anomaly::new(
                AnomalyKind::NonDefaultFileAlign,
                field_key(WindowsField::FileAlignment),
                format!("file alignment {file_align:#X} differs from the default 512"),
            ));
        }

        if sec_align < file_align {
            findings.push(Anomaly::new(
                AnomalyKind::SectionAlignSmallerThanFileAlign,
                field_key(WindowsField::SectionAlignment),
                format!(
                    "section alignment {sec_align:#X} is smaller than the file alignment {file_align:#X}"
                ),
            ));
        }
        if sec_align != 0x1000 {
            findings.push(Anomaly::new(
                AnomalyKind::NonDefaultSectionAlign,
                field_key(WindowsField::SectionAlignment),
                format!("section alignment {sec_align:#X} differs from the default 4096"),
            ));
        }

        if low {
            findings.push(Anomaly::new(
                AnomalyKind::LowAlignmentMode,
                field_key(WindowsField::FileAlignment),
                format!(
                    "file and section alignment are both {file_align:#X}, the image runs in low alignment mode"
                ),
            ));
        }
    }

    fn check_image_base(opt: &OptionalHeader, findings: &mut Vec<Anomaly>) {
        let base = opt.image_base();
        let key = field_key(WindowsField::ImageBase);

        if base == 0 {
            findings.push(Anomaly::new(AnomalyKind::ZeroImageBase, key, "image base is zero"));
        } else if base % 0x10000 != 0 {
            findings.push(Anomaly::new(
                AnomalyKind::UnalignedImageBase,
                key,
                format!("image base {base:#X} is not a multiple of 64 KiB"),
            ));
        } else if !DEFAULT_IMAGE_BASES.contains(&base) {
            findings.push(Anomaly::new(
                AnomalyKind::NonDefaultImageBase,
                key,
                format!("image base {base:#X} differs from the linker defaults"),
            ));
        }
    }

    fn check_size_of_image(opt: &OptionalHeader, findings: &mut Vec<Anomaly>) {
        let size = opt.size_of_image();
        let key = field_key(WindowsField::SizeOfImage);

        if size == 0 {
            findings.push(Anomaly::new(AnomalyKind::ZeroSizeOfImage, key, "size of image is zero"));
            return;
        }

        let sec_align = opt.section_alignment();
        if sec_align > 0 && size % sec_align != 0 {
            findings.push(Anomaly::new(
                AnomalyKind::NotSecAlignedSizeOfImage,
                key,
                format!(
                    "size of image {:#X} is not a multiple of the section alignment {:#X}",
                    size, sec_align
                ),
            ));
        }
        if size < opt.size_of_headers() {
            findings.push(Anomaly::new(
                AnomalyKind::TooSmallSizeOfImage,
                key,
                format!(
                    "size of image {:#X} is smaller than the declared header size {:#X}",
                    size,
                    opt.size_of_headers()
                ),
            ));
        }
    }

    fn check_size_of_headers(
        ctx: &CheckContext<'_>,
        opt: &OptionalHeader,
        findings: &mut Vec<Anomaly>,
    ) {
        let soh = opt.size_of_headers();
        let key = field_key(WindowsField::SizeOfHeaders);
        let file_align = opt.file_alignment();

        if !opt.is_low_alignment_mode() && file_align > 0 && soh % file_align != 0 {
            findings.push(Anomaly::new(
                AnomalyKind::NotFileAlignedSizeOfHeaders,
                key,
                format!("size of headers {soh:#X} is not a multiple of the file alignment"),
            ));
        }

        let table_end = ctx.sections.table_offset()
            + ctx.sections.declared_count() * crate::pe::layout::SECTION_ENTRY_SIZE as u64;
        if soh < table_end {
            findings.push(Anomaly::new(
                AnomalyKind::TooSmallSizeOfHeaders,
                key,
                format!(
                    "size of headers {soh:#X} ends before the section table does at {table_end:#X}"
                ),
            ));
        }

        if soh > ctx.sections.file_size() {
            findings.push(Anomaly::new(
                AnomalyKind::TooLargeSizeOfHeaders,
                key,
                format!(
                    "size of headers {:#X} exceeds the {} byte file",
                    soh,
                    ctx.sections.file_size()
                ),
            ));
        }
    }

    fn check_reserved_fields(opt: &OptionalHeader, findings: &mut Vec<Anomaly>) {
        let win32_version = opt.windows_value(WindowsField::Win32VersionValue);
        if win32_version != 0 {
            findings.push(Anomaly::new(
                AnomalyKind::ReservedWin32Version,
                field_key(WindowsField::Win32VersionValue),
                format!("reserved Win32VersionValue field is {win32_version:#X}"),
            ));
        }

        let loader_flags = opt.windows_value(WindowsField::LoaderFlags);
        if loader_flags != 0 {
            findings.push(Anomaly::new(
                AnomalyKind::ReservedLoaderFlags,
                field_key(WindowsField::LoaderFlags),
                format!("reserved LoaderFlags field is {loader_flags:#X}"),
            ));
        }

        let reserved = opt.dll_characteristics().intersection(DllCharacteristics::RESERVED);
        if !reserved.is_empty() {
            findings.push(Anomaly::new(
                AnomalyKind::ReservedDllCharacteristics,
                field_key(WindowsField::DllCharacteristics),
                format!("reserved DLL characteristics bits {:#06X} are set", reserved.bits()),
            ));
        }
    }

    fn check_directory_count(opt: &OptionalHeader, findings: &mut Vec<Anomaly>) {
        let declared = opt.number_of_rva_and_sizes();
        let key = field_key(WindowsField::NumberOfRvaAndSizes);

        if declared == 0 {
            findings.push(Anomaly::new(
                AnomalyKind::NoDataDirs,
                key,
                "the image declares no data directories",
            ));
        } else if declared > DATA_DIR_COUNT as u64 {
            findings.push(Anomaly::new(
                AnomalyKind::UnusualDataDirNr,
                key,
                format!("{declared} data directories declared, the format defines sixteen"),
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::test::{has_kind, PeImage};
    use crate::{AnomalyKind, PeFile};

    #[test]
    fn sane_image_has_no_alignment_findings() {
        let pe = PeFile::from_mem(PeImage::minimal().build()).unwrap();
        let findings = pe.scan_anomalies();
        for kind in [
            AnomalyKind::NotPowOfTwoFileAlign,
            AnomalyKind::TooSmallFileAlign,
            AnomalyKind::NonDefaultFileAlign,
            AnomalyKind::NonDefaultSectionAlign,
            AnomalyKind::LowAlignmentMode,
            AnomalyKind::ZeroImageBase,
            AnomalyKind::ZeroSizeOfImage,
            AnomalyKind::CollapsedOptionalHeader,
        ] {
            assert!(!has_kind(&findings, kind), "unexpected {kind}");
        }
    }

    #[test]
    fn odd_file_alignment_triggers_the_full_set() {
        let image = PeImage::minimal().file_alignment(0x180).build();
        let pe = PeFile::from_mem(image).unwrap();
        let findings = pe.scan_anomalies();
        assert!(has_kind(&findings, AnomalyKind::NotPowOfTwoFileAlign));
        assert!(has_kind(&findings, AnomalyKind::TooSmallFileAlign));
        assert!(has_kind(&findings, AnomalyKind::NonDefaultFileAlign));
    }

    #[test]
    fn low_alignment_mode_suppresses_the_minimum() {
        let image = PeImage::minimal()
            .file_alignment(0x80)
            .section_alignment(0x80)
            .build();
        let pe = PeFile::from_mem(image).unwrap();
        let findings = pe.scan_anomalies();
        assert!(has_kind(&findings, AnomalyKind::LowAlignmentMode));
        assert!(!has_kind(&findings, AnomalyKind::TooSmallFileAlign));
    }

    #[test]
    fn zero_entry_point_depends_on_dll_flag() {
        let exe = PeImage::minimal().entry_point(0).build();
        let pe = PeFile::from_mem(exe).unwrap();
        assert!(has_kind(&pe.scan_anomalies(), AnomalyKind::ZeroEp));

        // DLL | EXECUTABLE_IMAGE
        let dll = PeImage::minimal().entry_point(0).coff_characteristics(0x2102).build();
        let pe = PeFile::from_mem(dll).unwrap();
        assert!(!has_kind(&pe.scan_anomalies(), AnomalyKind::ZeroEp));
    }

    #[test]
    fn unmapped_entry_point_is_virtual() {
        let image = PeImage::minimal().entry_point(0x00BA_D000).build();
        let pe = PeFile::from_mem(image).unwrap();
        assert!(has_kind(&pe.scan_anomalies(), AnomalyKind::VirtualEp));
    }
}
