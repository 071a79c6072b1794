//! Individual check passes, one module per structure they examine.
//!
//! Each pass is a unit struct with a `run` entry point that fans out to focused
//! helpers. Passes only read the shared [`crate::anomalies::CheckContext`] and push
//! findings; they never fail and never allocate beyond the findings themselves.

pub(crate) mod clr;
pub(crate) mod coff;
pub(crate) mod directories;
pub(crate) mod msdos;
pub(crate) mod optional;
pub(crate) mod sections;
