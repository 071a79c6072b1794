//! Parallel triage of many samples at once.
//!
//! Loading and scanning one file is independent of every other file, which makes a
//! sample directory an embarrassingly parallel workload. [`scan_paths`] fans the work
//! out over rayon's global thread pool and collects one [`ScanReport`] per input, in
//! input order. Failures stay per-file: an unreadable or non-PE path yields a report
//! carrying the [`Error`](crate::Error), never a panic or an aborted run.
//!
//! # Example
//!
//! ```rust,no_run
//! use pescope::batch::scan_paths;
//!
//! let paths: Vec<_> = std::fs::read_dir("samples/")?
//!     .filter_map(|entry| entry.ok().map(|e| e.path()))
//!     .collect();
//!
//! for report in scan_paths(&paths) {
//!     match report.findings() {
//!         Ok(findings) => println!("{}: {} findings", report.path().display(), findings.len()),
//!         Err(error) => println!("{}: skipped ({error})", report.path().display()),
//!     }
//! }
//! # Ok::<(), std::io::Error>(())
//! ```

use std::path::{Path, PathBuf};

use rayon::prelude::*;

use crate::{Anomaly, PeFile, Result};

/// The outcome of scanning one path.
///
/// Carries either the anomaly findings of a successfully loaded file or the error
/// that prevented loading it. Reports come back in the same order the paths went in,
/// regardless of which worker finished first.
#[derive(Debug)]
pub struct ScanReport {
    path: PathBuf,
    findings: Result<Vec<Anomaly>>,
}

impl ScanReport {
    /// The path this report describes.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The findings, or the error that kept the file from loading.
    pub fn findings(&self) -> std::result::Result<&[Anomaly], &crate::Error> {
        match &self.findings {
            Ok(findings) => Ok(findings.as_slice()),
            Err(error) => Err(error),
        }
    }

    /// Consume the report, yielding the path and its outcome.
    #[must_use]
    pub fn into_parts(self) -> (PathBuf, Result<Vec<Anomaly>>) {
        (self.path, self.findings)
    }
}

/// Load and scan every path in parallel.
///
/// Each file runs the full pipeline: tolerant header decode followed by the anomaly
/// battery. One report is produced per input path, in input order.
///
/// # Example
///
/// ```rust,no_run
/// use pescope::batch::scan_paths;
/// use std::path::PathBuf;
///
/// let paths = vec![PathBuf::from("a.exe"), PathBuf::from("b.dll")];
/// let reports = scan_paths(&paths);
/// assert_eq!(reports.len(), 2);
/// ```
#[must_use]
pub fn scan_paths(paths: &[PathBuf]) -> Vec<ScanReport> {
    paths
        .par_iter()
        .map(|path| ScanReport {
            path: path.clone(),
            findings: PeFile::from_file(path).map(|pe| pe.scan_anomalies()),
        })
        .collect()
}
