//! Shared fixtures for exercising the parser against synthetic images.
//!
//! Real world samples are too large and too varied to pin individual findings on, so
//! the tests assemble images byte by byte instead. [`PeImage`] produces a structurally
//! sound PE32 executable that scans clean, and each builder method breaks exactly one
//! aspect of it.

use crate::anomalies::{Anomaly, AnomalyKind};

/// True when at least one finding of the given kind is present.
pub(crate) fn has_kind(findings: &[Anomaly], kind: AnomalyKind) -> bool {
    findings.iter().any(|a| a.kind() == kind)
}

/// Number of findings of the given kind.
pub(crate) fn count_kind(findings: &[Anomaly], kind: AnomalyKind) -> usize {
    findings.iter().filter(|a| a.kind() == kind).count()
}

fn put(buf: &mut [u8], offset: usize, width: usize, value: u64) {
    for i in 0..width {
        buf[offset + i] = (value >> (8 * i)) as u8;
    }
}

struct SectionSpec {
    name: Vec<u8>,
    virtual_size: u32,
    virtual_address: u32,
    size_of_raw_data: u32,
    pointer_to_raw_data: u32,
    characteristics: u32,
}

/// Builder for synthetic PE32 images.
///
/// The defaults describe a one section console executable: headers declared at 0x400
/// bytes, a `.text` section mapped at RVA 0x1000 reading 0x200 bytes from file offset
/// 0x400, entry point at the section start, and a file padded to exactly 0x600 bytes
/// so nothing trails as overlay.
pub(crate) struct PeImage {
    lfanew: u32,
    coff_characteristics: u16,
    entry_point: u32,
    file_alignment: u32,
    section_alignment: u32,
    directories: [(u32, u32); 16],
    sections: Vec<SectionSpec>,
    clr_version: Option<Vec<u8>>,
}

impl PeImage {
    pub(crate) fn minimal() -> PeImage {
        PeImage {
            lfanew: 0x40,
            // EXECUTABLE_IMAGE | 32BIT_MACHINE
            coff_characteristics: 0x0102,
            entry_point: 0x1000,
            file_alignment: 0x200,
            section_alignment: 0x1000,
            directories: [(0, 0); 16],
            sections: vec![SectionSpec {
                name: b".text".to_vec(),
                virtual_size: 0x1000,
                virtual_address: 0x1000,
                size_of_raw_data: 0x200,
                pointer_to_raw_data: 0x400,
                characteristics: 0x6000_0020,
            }],
            clr_version: None,
        }
    }

    /// Move the PE signature, growing the MS-DOS stub.
    pub(crate) fn lfanew(mut self, offset: u32) -> PeImage {
        self.lfanew = offset;
        self
    }

    pub(crate) fn no_sections(mut self) -> PeImage {
        self.sections.clear();
        self
    }

    pub(crate) fn coff_characteristics(mut self, value: u16) -> PeImage {
        self.coff_characteristics = value;
        self
    }

    pub(crate) fn entry_point(mut self, rva: u32) -> PeImage {
        self.entry_point = rva;
        self
    }

    pub(crate) fn file_alignment(mut self, value: u32) -> PeImage {
        self.file_alignment = value;
        self
    }

    pub(crate) fn section_alignment(mut self, value: u32) -> PeImage {
        self.section_alignment = value;
        self
    }

    pub(crate) fn data_directory(mut self, index: usize, va: u32, size: u32) -> PeImage {
        self.directories[index] = (va, size);
        self
    }

    /// Append a section row after the default `.text` one.
    pub(crate) fn section(
        mut self,
        name: &str,
        virtual_size: u32,
        virtual_address: u32,
        size_of_raw_data: u32,
        pointer_to_raw_data: u32,
        characteristics: u32,
    ) -> PeImage {
        self.sections.push(SectionSpec {
            name: name.as_bytes().to_vec(),
            virtual_size,
            virtual_address,
            size_of_raw_data,
            pointer_to_raw_data,
            characteristics,
        });
        self
    }

    /// Attach a CLR header whose metadata root carries the given version region.
    ///
    /// The COR20 header lands at file offset 0x480 (RVA 0x1080) and the metadata root
    /// at 0x500 (RVA 0x1100), both inside the default `.text` raw data. The version
    /// length field is set to the region's length, so a region without a terminating
    /// NUL or with unprintable bytes models a deliberately damaged version string.
    pub(crate) fn managed(mut self, version_region: &[u8]) -> PeImage {
        self.clr_version = Some(version_region.to_vec());
        self.directories[14] = (0x1080, 72);
        self
    }

    fn size_of_image(&self) -> u64 {
        let align = u64::from(self.section_alignment.max(1));
        let mut end: u64 = 0x1000;
        for s in &self.sections {
            end = end.max(u64::from(s.virtual_address) + u64::from(s.virtual_size));
        }
        end.div_ceil(align) * align
    }

    pub(crate) fn build(self) -> Vec<u8> {
        let lfanew = self.lfanew as usize;
        let opt_offset = lfanew + 24;
        let table_offset = opt_offset + 0xE0;
        let header_end = table_offset + self.sections.len() * 40;

        let mut len = header_end.max(0x600);
        for s in &self.sections {
            if s.pointer_to_raw_data != 0 {
                len = len.max(s.pointer_to_raw_data as usize + s.size_of_raw_data as usize);
            }
        }
        let mut image = vec![0u8; len];

        image[0] = b'M';
        image[1] = b'Z';
        put(&mut image, 0x3C, 4, u64::from(self.lfanew));

        image[lfanew..lfanew + 4].copy_from_slice(b"PE\0\0");

        let coff = lfanew + 4;
        put(&mut image, coff, 2, 0x14C); // i386
        put(&mut image, coff + 2, 2, self.sections.len() as u64);
        put(&mut image, coff + 16, 2, 0xE0);
        put(&mut image, coff + 18, 2, u64::from(self.coff_characteristics));

        let opt = opt_offset;
        put(&mut image, opt, 2, 0x10B); // PE32
        image[opt + 2] = 14; // linker version
        put(&mut image, opt + 4, 4, 0x200); // SizeOfCode
        put(&mut image, opt + 8, 4, 0x200); // SizeOfInitializedData
        put(&mut image, opt + 16, 4, u64::from(self.entry_point));
        put(&mut image, opt + 20, 4, 0x1000); // BaseOfCode
        put(&mut image, opt + 24, 4, 0x2000); // BaseOfData
        put(&mut image, opt + 28, 4, 0x0040_0000); // ImageBase
        put(&mut image, opt + 32, 4, u64::from(self.section_alignment));
        put(&mut image, opt + 36, 4, u64::from(self.file_alignment));
        put(&mut image, opt + 40, 2, 6); // MajorOperatingSystemVersion
        put(&mut image, opt + 48, 2, 6); // MajorSubsystemVersion
        put(&mut image, opt + 56, 4, self.size_of_image());
        put(&mut image, opt + 60, 4, 0x400); // SizeOfHeaders
        put(&mut image, opt + 68, 2, 3); // console subsystem
        put(&mut image, opt + 70, 2, 0x8140); // DYNAMIC_BASE | NX_COMPAT | TS_AWARE
        put(&mut image, opt + 72, 4, 0x0010_0000); // SizeOfStackReserve
        put(&mut image, opt + 76, 4, 0x1000); // SizeOfStackCommit
        put(&mut image, opt + 80, 4, 0x0010_0000); // SizeOfHeapReserve
        put(&mut image, opt + 84, 4, 0x1000); // SizeOfHeapCommit
        put(&mut image, opt + 92, 4, 16); // NumberOfRvaAndSizes
        for (index, (va, size)) in self.directories.iter().enumerate() {
            put(&mut image, opt + 96 + index * 8, 4, u64::from(*va));
            put(&mut image, opt + 96 + index * 8 + 4, 4, u64::from(*size));
        }

        for (index, s) in self.sections.iter().enumerate() {
            let row = table_offset + index * 40;
            let name_len = s.name.len().min(8);
            image[row..row + name_len].copy_from_slice(&s.name[..name_len]);
            put(&mut image, row + 8, 4, u64::from(s.virtual_size));
            put(&mut image, row + 12, 4, u64::from(s.virtual_address));
            put(&mut image, row + 16, 4, u64::from(s.size_of_raw_data));
            put(&mut image, row + 20, 4, u64::from(s.pointer_to_raw_data));
            put(&mut image, row + 36, 4, u64::from(s.characteristics));
        }

        if let Some(version) = &self.clr_version {
            put(&mut image, 0x480, 4, 72); // cb
            put(&mut image, 0x484, 2, 2); // runtime version 2.5
            put(&mut image, 0x486, 2, 5);
            put(&mut image, 0x488, 4, 0x1100); // metadata RVA
            put(&mut image, 0x48C, 4, (16 + version.len()) as u64);
            put(&mut image, 0x490, 4, 1); // ILONLY

            put(&mut image, 0x500, 4, 0x424A_5342); // BSJB
            put(&mut image, 0x504, 2, 1);
            put(&mut image, 0x506, 2, 1);
            put(&mut image, 0x50C, 4, version.len() as u64);
            image[0x510..0x510 + version.len()].copy_from_slice(version);
        }

        image
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PeFile;

    #[test]
    fn minimal_image_scans_clean() {
        let pe = PeFile::from_mem(PeImage::minimal().build()).unwrap();
        let findings = pe.scan_anomalies();
        assert!(findings.is_empty(), "unexpected findings: {findings:?}");
    }

    #[test]
    fn minimal_image_has_no_overlay() {
        let image = PeImage::minimal().build();
        assert_eq!(image.len(), 0x600);
        let pe = PeFile::from_mem(image).unwrap();
        assert!(!pe.overlay_exists());
    }

    #[test]
    fn managed_image_parses_its_version() {
        let pe = PeFile::from_mem(PeImage::minimal().managed(b"v4.0.30319\0\0").build()).unwrap();
        let clr = pe.clr().unwrap();
        let root = clr.metadata.as_ref().unwrap();
        assert_eq!(root.version.as_deref(), Some("v4.0.30319"));
    }
}
