use thiserror::Error;

macro_rules! not_pe_error {
    // Single string version
    ($msg:expr) => {
        crate::Error::NotPeFile {
            message: $msg.to_string(),
            file: file!(),
            line: line!(),
        }
    };

    // Format string with arguments version
    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::NotPeFile {
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

macro_rules! out_of_bounds_error {
    () => {
        crate::Error::OutOfBounds
    };
}

/// The generic Error type, which provides coverage for all errors this library can potentially
/// return.
///
/// The taxonomy is deliberately small. Structural damage in a PE file is *not* an error for
/// this library: damaged files are loaded as far as possible and the damage is reported through
/// the anomaly catalog. An `Error` is only produced when even the coarsest structural decode is
/// impossible ([`Error::NotPeFile`]), when a read would leave the backing buffer
/// ([`Error::OutOfBounds`]), or when the operating system refuses the file
/// ([`Error::FileError`]).
///
/// # Examples
///
/// ```rust,no_run
/// use pescope::{Error, PeFile};
/// use std::path::Path;
///
/// match PeFile::from_file(Path::new("sample.exe")) {
///     Ok(pe) => {
///         println!("loaded, {} anomalies", pe.scan_anomalies().len());
///     }
///     Err(Error::NotPeFile { message, file, line }) => {
///         eprintln!("not a PE file: {} ({}:{})", message, file, line);
///     }
///     Err(Error::FileError(io_err)) => {
///         eprintln!("I/O error: {}", io_err);
///     }
///     Err(e) => {
///         eprintln!("other error: {}", e);
///     }
/// }
/// ```
#[derive(Error, Debug)]
pub enum Error {
    // File parsing Errors
    /// The input cannot be decoded as a PE file at all.
    ///
    /// Raised only for the three unrecoverable cases: the input is shorter than a minimal
    /// MSDOS header, the `MZ` or `PE\0\0` signature is missing, or the declared PE header
    /// offset points outside the file. Every other malformation degrades into anomalies
    /// instead. The error includes the source location where the rejection was decided.
    ///
    /// # Fields
    ///
    /// * `message` - Detailed description of why the input was rejected
    /// * `file` - Source file where the rejection was detected
    /// * `line` - Source line where the rejection was detected
    #[error("Not a PE file - {file}:{line}: {message}")]
    NotPeFile {
        /// The message to be printed for the rejection
        message: String,
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// An out of bound access was attempted while reading the file.
    ///
    /// This error occurs when trying to read data beyond the end of the backing buffer.
    /// It's a safety check to prevent buffer overruns during parsing.
    #[error("Out of Bound read would have occurred!")]
    OutOfBounds,

    /// Provided input was empty.
    ///
    /// This error occurs when an empty file or buffer is provided where actual
    /// executable data was expected.
    #[error("Provided input was empty")]
    Empty,

    // I/O and external Errors
    /// File I/O error.
    ///
    /// Wraps standard I/O errors that can occur during file operations such as reading
    /// from disk, permission issues, or filesystem errors.
    #[error("{0}")]
    FileError(#[from] std::io::Error),

    /// Generic error with a custom message.
    ///
    /// Catch-all for error conditions that don't fit the other categories.
    #[error("{0}")]
    Error(String),
}
