//! Physical file backend for memory-mapped I/O.
//!
//! This module provides the [`crate::file::physical::Physical`] backend that implements the
//! [`crate::file::Backend`] trait for accessing files from disk using memory-mapped I/O.
//! This approach provides efficient access to large files without loading the entire content
//! into memory upfront, while still allowing fast random access to any part of the file.
//!
//! # Architecture
//!
//! The physical backend maps files directly into the process's virtual address space:
//!
//! - **Efficient memory usage** - Only requested portions are loaded into physical memory
//! - **Operating system optimization** - Leverages OS-level caching and paging
//! - **Lazy loading** - Pages are loaded on-demand as they are accessed
//!
//! # Key Components
//!
//! - [`crate::file::physical::Physical`] - Main backend struct implementing [`crate::file::Backend`]
//! - [`crate::file::physical::Physical::new`] - Creates backend from file path with memory mapping
//!
//! # Usage Examples
//!
//! ```rust,ignore
//! use pescope::file::{Physical, Backend};
//! use std::path::Path;
//!
//! let physical = Physical::new(Path::new("sample.exe"))?;
//! println!("File size: {} bytes", physical.len());
//!
//! // Read the MSDOS signature
//! let header = physical.data_slice(0, 2)?;
//! assert_eq!(header, b"MZ");
//! # Ok::<(), pescope::Error>(())
//! ```
//!
//! # Integration
//!
//! This module integrates with:
//! - [`crate::file`] - Provides the [`crate::file::Backend`] trait implementation
//! - [`crate::PeFile`] - Uses the physical backend for file-based analysis
//!
//! The physical backend is ideal when samples are accessed from disk and memory efficiency
//! matters, complementing the memory backend for data already loaded into memory.

use super::Backend;
use crate::{
    Error::{Error, FileError},
    Result,
};

use memmap2::Mmap;
use std::{fs, path::Path};

/// A file backend that uses memory-mapped I/O for efficient access to files on disk.
///
/// [`crate::file::physical::Physical`] maps a file directly into the process's virtual
/// address space. This eliminates the need to read the entire file into memory upfront and
/// lets the operating system manage memory through demand paging.
///
/// Malware samples are accessed in a non-sequential pattern during structural analysis
/// (header chain first, then section data and overlay), which suits a mapping well. All
/// access operations include bounds checking to ensure memory safety.
///
/// # Examples
///
/// ```rust,ignore
/// use pescope::file::{Physical, Backend};
/// use std::path::Path;
///
/// let physical = Physical::new(Path::new("sample.exe"))?;
///
/// let dos_header = physical.data_slice(0, 2)?;
/// assert_eq!(dos_header, b"MZ");
///
/// println!("Sample size: {} bytes", physical.len());
/// # Ok::<(), pescope::Error>(())
/// ```
#[derive(Debug)]
pub struct Physical {
    /// Memory-mapped file data
    data: Mmap,
}

impl Physical {
    /// Create a new physical file backend by memory-mapping the specified file.
    ///
    /// This method opens the file at the given path and creates a read-only memory
    /// mapping for it.
    ///
    /// # Arguments
    /// * `path` - Path to the PE file on disk. Accepts `&Path`, `&str`, `String`, or `PathBuf`.
    ///
    /// # Errors
    /// Returns [`crate::Error::FileError`] if the file cannot be opened or
    /// [`crate::Error::Error`] if memory mapping fails.
    pub fn new(path: impl AsRef<Path>) -> Result<Physical> {
        let file = match fs::File::open(path) {
            Ok(file) => file,
            Err(error) => return Err(FileError(error)),
        };

        let mmap = match unsafe { Mmap::map(&file) } {
            Ok(mmap) => mmap,
            Err(error) => return Err(Error(error.to_string())),
        };

        Ok(Physical { data: mmap })
    }

    /// Creates a new physical file backend from an opened [`std::fs::File`].
    ///
    /// This is useful when the file must be opened with specific permissions or flags
    /// before creating the backend.
    ///
    /// # Arguments
    /// * `file` - An opened file handle
    ///
    /// # Errors
    /// Returns [`crate::Error::Error`] if memory mapping fails.
    #[allow(clippy::needless_pass_by_value)]
    pub fn from_std_file(file: fs::File) -> Result<Physical> {
        // Note: We take ownership of `file` even though we only borrow it for Mmap::map().
        // This is intentional - the file handle must remain alive for the duration of the mmap,
        // and Mmap internally keeps the file alive. Taking by value matches std library conventions.
        let mmap = unsafe { Mmap::map(&file) }.map_err(|error| Error(error.to_string()))?;

        Ok(Physical { data: mmap })
    }
}

impl Backend for Physical {
    fn data_slice(&self, offset: usize, len: usize) -> Result<&[u8]> {
        let Some(offset_end) = offset.checked_add(len) else {
            return Err(out_of_bounds_error!());
        };

        if offset_end > self.data.len() {
            return Err(out_of_bounds_error!());
        }

        Ok(&self.data[offset..offset_end])
    }

    fn data(&self) -> &[u8] {
        self.data.as_ref()
    }

    fn len(&self) -> usize {
        self.data.len()
    }
}
