//! Parser for the CASU data-quality (DQC) fixed-width report.
//!
//! The report is the concatenation of the nightly summary files: one header
//! line followed by one line per exposure. Two historical layouts exist; the
//! second one is exactly two characters wider inside the seeing column and is
//! brought in line with the first by [`repair_legacy_line`].

use anyhow::{Context, Result};
use std::path::Path;

use super::fixed_width::{non_empty, parse_opt_f64, slice_inclusive};
use super::{ParseOutcome, ParseReport};
use crate::core::domain::{ExposureRecord, RunNumber};

/// Byte length (newline excluded) of a line in the legacy layout.
pub const LEGACY_LINE_LENGTH: usize = 174;

/// Byte range removed from a legacy line.
const LEGACY_CUT: std::ops::Range<usize> = 127..129;

/// A named column with inclusive start and end byte offsets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnSpec {
    pub name: &'static str,
    pub first: usize,
    pub last: usize,
}

const fn column(name: &'static str, first: usize, last: usize) -> ColumnSpec {
    ColumnSpec { name, first, last }
}

/// Column layout of the report.
pub const DQC_COLUMNS: [ColumnSpec; 16] = [
    column("dir", 0, 14),
    column("run", 16, 30),
    column("name", 32, 48),
    column("ra_hms", 50, 60),
    column("dec_dms", 62, 72),
    column("airmass", 80, 84),
    column("posang", 86, 90),
    column("time", 92, 112),
    column("exptime", 114, 120),
    column("filter", 123, 125),
    column("seeing", 127, 130),
    column("sky", 132, 138),
    column("noise", 140, 144),
    column("ellipt", 146, 150),
    column("apcor", 152, 156),
    column("comments", 158, 173),
];

/// Brings a line of the legacy layout in line with the current one.
///
/// Lines of any other length are returned unchanged.
pub fn repair_legacy_line(line: &str) -> String {
    let bytes = line.as_bytes();
    if bytes.len() != LEGACY_LINE_LENGTH {
        return line.to_string();
    }
    let mut repaired = Vec::with_capacity(bytes.len() - LEGACY_CUT.len());
    repaired.extend_from_slice(&bytes[..LEGACY_CUT.start]);
    repaired.extend_from_slice(&bytes[LEGACY_CUT.end..]);
    String::from_utf8_lossy(&repaired).into_owned()
}

fn cell(line: &str, name: &str) -> String {
    DQC_COLUMNS
        .iter()
        .find(|c| c.name == name)
        .map(|c| slice_inclusive(line, c.first, c.last))
        .unwrap_or_default()
}

fn number(line: &str, name: &str) -> Result<Option<f64>, String> {
    parse_opt_f64(&cell(line, name)).map_err(|e| format!("column '{}': {}", name, e))
}

/// Parses one data line of the report (legacy repair included).
pub fn parse_dqc_line(line: &str) -> Result<ExposureRecord, String> {
    let line = repair_legacy_line(line);

    let run_text = cell(&line, "run");
    if run_text.is_empty() {
        return Err("missing run number".to_string());
    }
    let run: RunNumber = run_text.parse()?;

    let name = cell(&line, "name");
    if name.is_empty() {
        return Err(format!("run {} has no object name", run));
    }

    Ok(ExposureRecord {
        run,
        name,
        filter: cell(&line, "filter"),
        time: non_empty(cell(&line, "time")),
        night: None,
        dir: non_empty(cell(&line, "dir")),
        ra_hms: non_empty(cell(&line, "ra_hms")),
        dec_dms: non_empty(cell(&line, "dec_dms")),
        airmass: number(&line, "airmass")?,
        posang: number(&line, "posang")?,
        exptime: number(&line, "exptime")?,
        seeing: number(&line, "seeing")?,
        sky: number(&line, "sky")?,
        noise: number(&line, "noise")?,
        ellipticity: number(&line, "ellipt")?,
        apcor: number(&line, "apcor")?,
        sources: None,
        comments: non_empty(cell(&line, "comments")),
    })
}

/// Parses the full text of a report. The first line is the header.
pub fn parse_dqc_str(content: &str) -> ParseOutcome<ExposureRecord> {
    let mut report = ParseReport::new();
    let mut rows = Vec::new();

    for (idx, line) in content.lines().enumerate().skip(1) {
        let line_number = idx + 1;
        if line.trim().is_empty() {
            continue;
        }
        report.lines_read += 1;

        match parse_dqc_line(line) {
            Ok(record) => {
                rows.push(record);
                report.record_parsed();
            }
            Err(reason) => report.record_skipped(line_number, reason),
        }
    }

    ParseOutcome::new(rows, report)
}

/// Parses a report file.
pub fn parse_dqc_file(path: &Path) -> Result<ParseOutcome<ExposureRecord>> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("Failed to read DQC report: {}", path.display()))?;
    let content = String::from_utf8_lossy(&bytes);

    let outcome = parse_dqc_str(&content);
    log::info!(
        "Parsed {} exposures from {} ({} lines skipped)",
        outcome.rows.len(),
        path.display(),
        outcome.report.skipped
    );
    Ok(outcome)
}
