//! Low-level byte order and safe reading utilities for PE parsing.
//!
//! This module provides bounds-checked, little-endian reading of primitive types from byte
//! buffers. PE structures are little-endian throughout, so no big-endian counterparts exist
//! here. All functions return [`crate::Result`] and fail with [`crate::Error::OutOfBounds`]
//! instead of slicing past the end of hostile input.
//!
//! # Key Components
//!
//! - [`crate::file::io::PeIO`] - Trait defining the byte-array conversion for primitive types
//! - [`crate::file::io::read_le`] - Read a value from the start of a buffer
//! - [`crate::file::io::read_le_at`] - Read a value at an offset, advancing the offset
//!
//! # Thread Safety
//!
//! All functions are pure and thread-safe; the offset parameter of
//! [`crate::file::io::read_le_at`] is caller-owned state.

use crate::{Error::OutOfBounds, Result};

/// Trait for implementing type-specific safe binary data reading operations.
///
/// Abstracts the conversion from a fixed-size byte array to a typed value in little-endian
/// order. Implemented for the unsigned integer types that occur in PE headers.
pub trait PeIO: Sized {
    /// Associated type representing the byte array type for this numeric type.
    type Bytes: Sized + for<'a> TryFrom<&'a [u8]>;

    /// Read T from a byte buffer in little-endian
    fn from_le_bytes(bytes: Self::Bytes) -> Self;
}

// Implement PeIO support for u64
impl PeIO for u64 {
    type Bytes = [u8; 8];

    fn from_le_bytes(bytes: Self::Bytes) -> Self {
        u64::from_le_bytes(bytes)
    }
}

// Implement PeIO support for u32
impl PeIO for u32 {
    type Bytes = [u8; 4];

    fn from_le_bytes(bytes: Self::Bytes) -> Self {
        u32::from_le_bytes(bytes)
    }
}

// Implement PeIO support for u16
impl PeIO for u16 {
    type Bytes = [u8; 2];

    fn from_le_bytes(bytes: Self::Bytes) -> Self {
        u16::from_le_bytes(bytes)
    }
}

// Implement PeIO support for u8
impl PeIO for u8 {
    type Bytes = [u8; 1];

    fn from_le_bytes(bytes: Self::Bytes) -> Self {
        bytes[0]
    }
}

/// Safely reads a value of type `T` in little-endian byte order from a data buffer.
///
/// Reads from the beginning of the buffer. Supports all types that implement the
/// [`crate::file::io::PeIO`] trait.
///
/// # Arguments
///
/// * `data` - The byte buffer to read from
///
/// # Errors
///
/// Returns [`crate::Error::OutOfBounds`] if there are insufficient bytes.
pub fn read_le<T: PeIO>(data: &[u8]) -> Result<T> {
    let mut offset = 0_usize;
    read_le_at(data, &mut offset)
}

/// Safely reads a value of type `T` in little-endian byte order at a specific offset.
///
/// Reads from the specified offset and advances the offset by the number of bytes read.
///
/// # Arguments
///
/// * `data` - The byte buffer to read from
/// * `offset` - Mutable reference to the offset position (will be advanced after reading)
///
/// # Errors
///
/// Returns [`crate::Error::OutOfBounds`] if there are insufficient bytes.
pub fn read_le_at<T: PeIO>(data: &[u8], offset: &mut usize) -> Result<T> {
    let type_len = std::mem::size_of::<T>();
    if (type_len + *offset) > data.len() {
        return Err(OutOfBounds);
    }

    let Ok(read) = data[*offset..*offset + type_len].try_into() else {
        return Err(OutOfBounds);
    };

    *offset += type_len;

    Ok(T::from_le_bytes(read))
}
