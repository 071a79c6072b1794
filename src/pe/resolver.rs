//! Address translation between RVAs and file offsets.
//!
//! # Architecture
//!
//! Translation follows the loader, not the declarations. Section rows lie freely about
//! their raw pointers and sizes; the Windows loader quietly rounds the pointer down to
//! 512 bytes, rounds the size up to 4096, caps the readable range by the virtual size
//! and by the next section's start, and never reads past the file end. The functions
//! here reproduce exactly that arithmetic, so an RVA resolves to the bytes the loader
//! would actually map there, even for files the declarations describe incorrectly.
//!
//! # Key Components
//!
//! The whole API lives on [`SectionModel`]:
//!
//! - [`SectionModel::read_size`] - Bytes the loader reads for a section
//! - [`SectionModel::rva_to_file_offset`] / [`SectionModel::file_offset_to_rva`] -
//!   Translation in both directions, including the identity mapped header range
//! - [`SectionModel::overlay_offset`] / [`SectionModel::has_overlay`] - Where section
//!   backed data ends and appended data begins
//!
//! Results are `Option` rather than `Result`: an address that no section maps is a
//! normal outcome when walking hostile files, not an error.

use crate::pe::sections::{SectionModel, SectionRecord};

impl SectionModel {
    /// Number of bytes the loader actually reads from the file for `section`.
    ///
    /// Starts from the aligned raw pointer, extends by the aligned raw size, then caps
    /// the end by the declared virtual extent, by the start of the nearest section
    /// behind this one, and by the file end. A section whose raw range lies entirely
    /// outside the file reads zero bytes.
    #[must_use]
    pub fn read_size(&self, section: &SectionRecord) -> u64 {
        let low = self.is_low_alignment();
        let start = section.aligned_pointer_to_raw(low);
        let mut end = start.saturating_add(section.aligned_size_of_raw(low));

        if section.virtual_size != 0 {
            let virtual_end = u64::from(section.pointer_to_raw_data)
                .saturating_add(u64::from(section.virtual_size));
            end = end.min(virtual_end);
        }

        // A later section's start bounds this one's readable range
        for other in self.records() {
            if other.ordinal == section.ordinal {
                continue;
            }
            let other_start = other.aligned_pointer_to_raw(low);
            if other_start > start {
                end = end.min(other_start);
            }
        }

        end = end.min(self.file_size());
        end.saturating_sub(start)
    }

    /// Translate a relative virtual address to a file offset.
    ///
    /// Sections are scanned in file order; the first one whose aligned virtual range
    /// contains `rva` wins, and the offset is measured from the aligned page start,
    /// because that is where the loader maps the section regardless of what the row
    /// declares. Addresses below `SizeOfHeaders` that no section claims map to
    /// themselves, mirroring how the loader maps the header page.
    ///
    /// Returns `None` when nothing maps the address.
    ///
    /// # Examples
    ///
    /// ```rust,no_run
    /// use pescope::PeFile;
    ///
    /// let pe = PeFile::from_file("sample.exe")?;
    /// if let Some(offset) = pe.resolve_rva(0x1000) {
    ///     println!("RVA 0x1000 is at file offset {offset:#X}");
    /// }
    /// # Ok::<(), pescope::Error>(())
    /// ```
    #[must_use]
    pub fn rva_to_file_offset(&self, rva: u64) -> Option<u64> {
        let low = self.is_low_alignment();
        for section in self.records() {
            let va = section.aligned_virtual_address(low);
            let size = section.aligned_virtual_size(low);
            if size > 0 && rva >= va && rva < va + size {
                return Some(section.aligned_pointer_to_raw(low) + (rva - va));
            }
        }
        if rva < self.size_of_headers() {
            return Some(rva);
        }
        None
    }

    /// Translate a file offset to a relative virtual address.
    ///
    /// The inverse of [`SectionModel::rva_to_file_offset`]: sections are scanned in
    /// file order over their readable ranges, and offsets inside the header range that
    /// no section claims map to themselves.
    ///
    /// Returns `None` when the offset belongs to no section and lies beyond the
    /// headers, which is exactly the overlay case.
    #[must_use]
    pub fn file_offset_to_rva(&self, offset: u64) -> Option<u64> {
        let low = self.is_low_alignment();
        for section in self.records() {
            let start = section.aligned_pointer_to_raw(low);
            let size = self.read_size(section);
            if size > 0 && offset >= start && offset < start + size {
                return Some(section.aligned_virtual_address(low) + (offset - start));
            }
        }
        if offset < self.size_of_headers() {
            return Some(offset);
        }
        None
    }

    /// 1-based ordinal of the first section whose aligned virtual range contains `rva`.
    #[must_use]
    pub fn section_containing_rva(&self, rva: u64) -> Option<u32> {
        let low = self.is_low_alignment();
        for section in self.records() {
            let va = section.aligned_virtual_address(low);
            let size = section.aligned_virtual_size(low);
            if size > 0 && rva >= va && rva < va + size {
                return Some(section.ordinal);
            }
        }
        None
    }

    /// 1-based ordinal of the first section whose readable raw range contains `offset`.
    #[must_use]
    pub fn section_containing_offset(&self, offset: u64) -> Option<u32> {
        let low = self.is_low_alignment();
        for section in self.records() {
            let start = section.aligned_pointer_to_raw(low);
            let size = self.read_size(section);
            if size > 0 && offset >= start && offset < start + size {
                return Some(section.ordinal);
            }
        }
        None
    }

    /// File offset where the overlay begins: the end of the last byte any section
    /// reads. Sections with a zero raw pointer contribute nothing. When no section
    /// reads data, or the computed end lies beyond the file, the offset equals the
    /// file size and no overlay exists.
    #[must_use]
    pub fn overlay_offset(&self) -> u64 {
        let low = self.is_low_alignment();
        let mut end = 0_u64;
        for section in self.records() {
            if section.pointer_to_raw_data == 0 {
                continue;
            }
            let size = self.read_size(section);
            if size > 0 {
                end = end.max(section.aligned_pointer_to_raw(low) + size);
            }
        }
        if end == 0 || end > self.file_size() {
            self.file_size()
        } else {
            end
        }
    }

    /// Whether bytes exist past the last section backed byte.
    #[must_use]
    pub fn has_overlay(&self) -> bool {
        self.overlay_offset() < self.file_size()
    }

    /// Size of the overlay in bytes, zero when none exists.
    #[must_use]
    pub fn overlay_size(&self) -> u64 {
        self.file_size() - self.overlay_offset()
    }
}
