//! MSDOS header decoding.
//!
//! Every PE file opens with the 64-byte MSDOS header. Only two of its fields matter for
//! structural analysis: the `MZ` signature and `e_lfanew`, the file offset of the PE
//! signature. The bytes between the formatted header and `e_lfanew` are the MSDOS stub,
//! which packers and wrappers sometimes inflate to hide payloads; its extent is derived
//! here so the anomaly battery can reason about it.
//!
//! Failing to decode this header is one of the few fatal conditions in this crate: without
//! an `MZ` signature and an in-file `e_lfanew` there is no PE structure to degrade into.

use crate::{
    pe::layout::{LFANEW_OFFSET, MSDOS_HEADER_SIZE},
    Parser, Result,
};

/// The MSDOS signature, `MZ`.
pub const MSDOS_SIGNATURE: u16 = 0x5A4D;

/// Decoded MSDOS header.
///
/// # Examples
///
/// ```rust,no_run
/// use pescope::pe::MsdosHeader;
///
/// let mut image = vec![0_u8; 0x80];
/// image[0] = b'M';
/// image[1] = b'Z';
/// image[0x3C] = 0x40;
///
/// let dos = MsdosHeader::read(&image)?;
/// assert_eq!(dos.pe_header_offset(), 0x40);
/// # Ok::<(), pescope::Error>(())
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MsdosHeader {
    /// The `MZ` signature value
    signature: u16,
    /// File offset of the `PE\0\0` signature, from `e_lfanew`
    e_lfanew: u64,
}

impl MsdosHeader {
    /// Decode the MSDOS header from the start of `data`.
    ///
    /// # Arguments
    /// * `data` - The complete file image
    ///
    /// # Errors
    /// Returns [`crate::Error::NotPeFile`] if `data` is shorter than the formatted header,
    /// the `MZ` signature is missing, or `e_lfanew` points outside the file. These are the
    /// unrecoverable cases; everything downstream degrades instead.
    pub fn read(data: &[u8]) -> Result<MsdosHeader> {
        if data.len() < MSDOS_HEADER_SIZE {
            return Err(not_pe_error!(
                "file of {} bytes is smaller than the MSDOS header",
                data.len()
            ));
        }

        let mut parser = Parser::new(data);
        let signature = parser.read_le::<u16>()?;
        if signature != MSDOS_SIGNATURE {
            return Err(not_pe_error!(
                "MSDOS signature is {:#06X}, expected MZ",
                signature
            ));
        }

        parser.seek(LFANEW_OFFSET)?;
        let e_lfanew = u64::from(parser.read_le::<u32>()?);
        if e_lfanew >= data.len() as u64 {
            return Err(not_pe_error!(
                "PE header offset {:#X} lies outside the {} byte file",
                e_lfanew,
                data.len()
            ));
        }

        Ok(MsdosHeader {
            signature,
            e_lfanew,
        })
    }

    /// The `MZ` signature value.
    #[must_use]
    pub fn signature(&self) -> u16 {
        self.signature
    }

    /// File offset of the PE signature (`e_lfanew`).
    #[must_use]
    pub fn pe_header_offset(&self) -> u64 {
        self.e_lfanew
    }

    /// Length of the MSDOS stub between the formatted header and the PE signature.
    ///
    /// Zero when `e_lfanew` points at or into the formatted header itself (the collapsed
    /// case, reported by the anomaly battery).
    #[must_use]
    pub fn stub_size(&self) -> u64 {
        self.e_lfanew.saturating_sub(MSDOS_HEADER_SIZE as u64)
    }

    /// Whether the PE signature offset falls inside the formatted MSDOS header.
    #[must_use]
    pub fn is_collapsed(&self) -> bool {
        self.e_lfanew < MSDOS_HEADER_SIZE as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    fn minimal_image(lfanew: u32) -> Vec<u8> {
        let mut data = vec![0_u8; 0x100];
        data[0] = b'M';
        data[1] = b'Z';
        data[LFANEW_OFFSET..LFANEW_OFFSET + 4].copy_from_slice(&lfanew.to_le_bytes());
        data
    }

    #[test]
    fn decodes_well_formed_header() {
        let data = minimal_image(0x80);
        let dos = MsdosHeader::read(&data).unwrap();

        assert_eq!(dos.signature(), MSDOS_SIGNATURE);
        assert_eq!(dos.pe_header_offset(), 0x80);
        assert_eq!(dos.stub_size(), 0x40);
        assert!(!dos.is_collapsed());
    }

    #[test]
    fn rejects_short_input() {
        let result = MsdosHeader::read(&[0x4D, 0x5A, 0x00]);
        assert!(matches!(result.unwrap_err(), Error::NotPeFile { .. }));
    }

    #[test]
    fn rejects_missing_signature() {
        let mut data = minimal_image(0x80);
        data[0] = b'Z';
        data[1] = b'M';

        let result = MsdosHeader::read(&data);
        assert!(matches!(result.unwrap_err(), Error::NotPeFile { .. }));
    }

    #[test]
    fn rejects_lfanew_outside_file() {
        let data = minimal_image(0x200);
        let result = MsdosHeader::read(&data);
        assert!(matches!(result.unwrap_err(), Error::NotPeFile { .. }));
    }

    #[test]
    fn collapsed_header_detected() {
        let data = minimal_image(0x10);
        let dos = MsdosHeader::read(&data).unwrap();

        assert!(dos.is_collapsed());
        assert_eq!(dos.stub_size(), 0);
    }
}
