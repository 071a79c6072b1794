//! In-memory buffer backend.
//!
//! [`crate::file::memory::Memory`] implements [`crate::file::Backend`] over an owned
//! `Vec<u8>`, for samples that were already read, carved out of another file, or
//! received over the network. All access operations are bounds checked.

use super::Backend;
use crate::{Error::OutOfBounds, Result};

/// Input file backed by Memory
#[derive(Debug)]
pub struct Memory {
    data: Vec<u8>,
}

impl Memory {
    /// Create a new memory backend
    ///
    /// ## Arguments
    /// * 'data' - The data buffer to consume
    pub fn new(data: Vec<u8>) -> Memory {
        Memory { data }
    }
}

impl Backend for Memory {
    fn data_slice(&self, offset: usize, len: usize) -> Result<&[u8]> {
        let Some(offset_end) = offset.checked_add(len) else {
            return Err(OutOfBounds);
        };

        if offset_end > self.data.len() {
            return Err(OutOfBounds);
        }

        Ok(&self.data[offset..offset_end])
    }

    fn data(&self) -> &[u8] {
        self.data.as_slice()
    }

    fn len(&self) -> usize {
        self.data.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory() {
        let mut data = vec![0x00_u8; 512];
        data[0] = 0x4D;
        data[1] = 0x5A;
        data[0x3C] = 0x80;

        let memory = Memory::new(data);

        assert_eq!(memory.len(), 512);
        assert_eq!(memory.data_slice(0, 2).unwrap(), b"MZ");
        assert_eq!(memory.data_slice(0x3C, 4).unwrap(), &[0x80, 0, 0, 0]);

        assert!(memory.data_slice(usize::MAX, 16).is_err());
        assert!(memory.data_slice(0, 1024).is_err());
        assert!(memory.data_slice(512, 1).is_err());
    }

    #[test]
    fn memory_empty_buffer() {
        let memory = Memory::new(vec![]);

        assert_eq!(memory.len(), 0);
        assert!(memory.data_slice(0, 1).is_err());
        assert!(memory.data_slice(1, 0).is_err());
        let empty_slice: &[u8] = &[];
        assert_eq!(memory.data_slice(0, 0).unwrap(), empty_slice);
    }

    #[test]
    fn memory_offset_overflow() {
        let memory = Memory::new(vec![0x00; 64]);

        let result = memory.data_slice(usize::MAX, 1);
        assert!(result.is_err());
        assert!(matches!(result.unwrap_err(), OutOfBounds));

        // Offset exactly at length, and one past
        assert!(memory.data_slice(64, 1).is_err());
        assert!(memory.data_slice(63, 2).is_err());
        assert_eq!(memory.data_slice(63, 1).unwrap(), &[0x00]);
    }
}
