//! Parsers for survey logs, quality reports and interchange tables.
//!
//! Every line-oriented parser is tolerant: a line that cannot be parsed is
//! skipped with a warning and recorded in the [`ParseReport`] returned with
//! the rows, never aborting the file.
//!
//! # Parsers
//!
//! - [`dqc_parser`]: CASU data-quality fixed-width reports
//! - [`seeing_log_parser`]: nightly `seeing_YYYYMMDD.log` files
//! - [`int_log_parser`]: INT observing logs (night header and WFC runs)
//! - [`csv_parser`]: CSV interchange of exposure, aggregate and coordinate tables
//! - [`field_list`]: plain-text field identifier lists
//!
//! # Example
//!
//! ```no_run
//! use uvex_qc::parsing::dqc_parser::parse_dqc_file;
//! use std::path::Path;
//!
//! let outcome = parse_dqc_file(Path::new("uvex-casu-dqc.txt"))
//!     .expect("Failed to parse report");
//! println!("{} exposures, {} skipped", outcome.rows.len(), outcome.report.skipped);
//! ```

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

pub mod csv_parser;
pub mod dqc_parser;
pub mod field_list;
pub mod fixed_width;
pub mod int_log_parser;
pub mod seeing_log_parser;

#[cfg(test)]
mod dqc_parser_tests;

/// A line that was dropped by a parser.
#[derive(Debug, Clone, PartialEq)]
pub struct SkippedLine {
    pub line_number: usize,
    pub reason: String,
}

/// Counters collected while parsing one or more files.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParseReport {
    pub lines_read: usize,
    pub parsed: usize,
    pub skipped: usize,
    pub skipped_lines: Vec<SkippedLine>,
}

impl ParseReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_parsed(&mut self) {
        self.parsed += 1;
    }

    /// Records a skipped line and logs it.
    pub fn record_skipped(&mut self, line_number: usize, reason: impl Into<String>) {
        let reason = reason.into();
        log::warn!("Skipping line {}: {}", line_number, reason);
        self.skipped += 1;
        self.skipped_lines.push(SkippedLine {
            line_number,
            reason,
        });
    }

    /// Folds the counters of another report into this one.
    pub fn merge(&mut self, other: ParseReport) {
        self.lines_read += other.lines_read;
        self.parsed += other.parsed;
        self.skipped += other.skipped;
        self.skipped_lines.extend(other.skipped_lines);
    }
}

/// Files directly inside `dir`, following symlinks, sorted by file name.
pub(crate) fn list_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .follow_links(true)
        .sort_by_file_name()
    {
        let entry = entry.with_context(|| format!("Failed to list directory: {}", dir.display()))?;
        if entry.file_type().is_file() {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}

/// Parsed rows together with the report of what was skipped.
#[derive(Debug, Clone)]
pub struct ParseOutcome<T> {
    pub rows: Vec<T>,
    pub report: ParseReport,
}

impl<T> ParseOutcome<T> {
    pub fn new(rows: Vec<T>, report: ParseReport) -> Self {
        Self { rows, report }
    }
}
