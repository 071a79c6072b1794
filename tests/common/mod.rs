//! Shared builder for synthetic PE images used by the integration tests.
//!
//! Real world samples are too varied to pin individual findings on, so each test
//! assembles an image byte by byte. [`PeImage::minimal`] produces a structurally sound
//! PE32 executable that scans clean; every builder method breaks exactly one aspect.

use pescope::{Anomaly, AnomalyKind};

/// True when at least one finding of the given kind is present.
#[allow(dead_code)]
pub fn has_kind(findings: &[Anomaly], kind: AnomalyKind) -> bool {
    findings.iter().any(|a| a.kind() == kind)
}

/// Number of findings of the given kind.
#[allow(dead_code)]
pub fn count_kind(findings: &[Anomaly], kind: AnomalyKind) -> usize {
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
pub struct PeImage {
    lfanew: u32,
    coff_characteristics: u16,
    entry_point: u32,
    file_alignment: u32,
    section_alignment: u32,
    directories: [(u32, u32); 16],
    sections: Vec<SectionSpec>,
    trailing: usize,
}

#[allow(dead_code)]
impl PeImage {
    pub fn minimal() -> PeImage {
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
            trailing: 0,
        }
    }

    pub fn no_sections(mut self) -> PeImage {
        self.sections.clear();
        self
    }

    pub fn entry_point(mut self, rva: u32) -> PeImage {
        self.entry_point = rva;
        self
    }

    pub fn file_alignment(mut self, value: u32) -> PeImage {
        self.file_alignment = value;
        self
    }

    pub fn section_alignment(mut self, value: u32) -> PeImage {
        self.section_alignment = value;
        self
    }

    pub fn data_directory(mut self, index: usize, va: u32, size: u32) -> PeImage {
        self.directories[index] = (va, size);
        self
    }

    /// Pad the file with this many bytes past all section data.
    pub fn overlay(mut self, bytes: usize) -> PeImage {
        self.trailing = bytes;
        self
    }

    /// Append a section row after the default `.text` one.
    pub fn section(
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

    fn size_of_image(&self) -> u64 {
        let align = u64::from(self.section_alignment.max(1));
        let mut end: u64 = 0x1000;
        for s in &self.sections {
            end = end.max(u64::from(s.virtual_address) + u64::from(s.virtual_size));
        }
        end.div_ceil(align) * align
    }

    pub fn build(self) -> Vec<u8> {
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
        len += self.trailing;
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

        image
    }
}
