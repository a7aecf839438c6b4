//! Parser for the nightly seeing logs written at the telescope.
//!
//! Each `seeing_YYYYMMDD.log` file holds one whitespace-separated line per
//! reduced exposure. Only lines whose eighth token is `sources` carry
//! measurements; everything else is chatter from the reduction script.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use std::path::Path;

use super::fixed_width::{parse_opt_f64, parse_opt_u32};
use super::{ParseOutcome, ParseReport};
use crate::core::domain::{ExposureRecord, RunNumber};

const MARKER_TOKEN: usize = 7;
const MARKER: &str = "sources";
const MIN_TOKENS: usize = 11;

/// Extracts the night (`YYYYMMDD`) from a `seeing_YYYYMMDD.log` file name.
pub fn night_from_filename(filename: &str) -> Result<String, String> {
    let stem = filename
        .strip_prefix("seeing_")
        .and_then(|rest| rest.strip_suffix(".log"))
        .ok_or_else(|| format!("Unexpected seeing log name: '{}'", filename))?;

    if stem.len() < 8 || !stem.chars().all(|c| c.is_ascii_digit()) {
        return Err(format!("Unexpected seeing log name: '{}'", filename));
    }

    let night = &stem[..8];
    NaiveDate::parse_from_str(night, "%Y%m%d")
        .map_err(|e| format!("Invalid night '{}' in '{}': {}", night, filename, e))?;
    Ok(night.to_string())
}

/// Parses one measurement line. Returns `Ok(None)` for lines that are not
/// measurements.
pub fn parse_seeing_line(line: &str, night: &str) -> Result<Option<ExposureRecord>, String> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    if tokens.len() <= MARKER_TOKEN || tokens[MARKER_TOKEN] != MARKER {
        return Ok(None);
    }
    if tokens.len() < MIN_TOKENS {
        return Err(format!(
            "expected {} tokens, found {}",
            MIN_TOKENS,
            tokens.len()
        ));
    }

    let run_token = tokens[0].split('.').next().unwrap_or_default();
    let run: RunNumber = run_token.parse()?;

    let mut record = ExposureRecord::new(run, tokens[9], tokens[10]);
    record.night = Some(night.to_string());
    record.seeing = parse_opt_f64(tokens[2])?;
    record.ellipticity = parse_opt_f64(tokens[3])?;
    record.sky = parse_opt_f64(tokens[4])?;
    record.sources = parse_opt_u32(tokens[6])?;
    Ok(Some(record))
}

/// Parses the contents of one seeing log.
pub fn parse_seeing_log_str(content: &str, night: &str) -> ParseOutcome<ExposureRecord> {
    let mut report = ParseReport::new();
    let mut rows = Vec::new();

    for (idx, line) in content.lines().enumerate() {
        report.lines_read += 1;
        match parse_seeing_line(line, night) {
            Ok(Some(record)) => {
                rows.push(record);
                report.record_parsed();
            }
            Ok(None) => {}
            Err(reason) => report.record_skipped(idx + 1, reason),
        }
    }

    ParseOutcome::new(rows, report)
}

/// Parses one seeing log file; the night comes from the file name.
pub fn parse_seeing_log_file(path: &Path) -> Result<ParseOutcome<ExposureRecord>> {
    let filename = path
        .file_name()
        .and_then(|n| n.to_str())
        .with_context(|| format!("Invalid seeing log path: {}", path.display()))?;
    let night = night_from_filename(filename).map_err(anyhow::Error::msg)?;

    let bytes = std::fs::read(path)
        .with_context(|| format!("Failed to read seeing log: {}", path.display()))?;
    Ok(parse_seeing_log_str(&String::from_utf8_lossy(&bytes), &night))
}

/// Parses every seeing log of a directory in file-name order.
///
/// Files whose names do not follow the `seeing_YYYYMMDD.log` pattern are
/// skipped with a warning.
pub fn parse_seeing_log_dir(dir: &Path) -> Result<ParseOutcome<ExposureRecord>> {
    let paths = super::list_files(dir)
        .with_context(|| format!("Failed to list seeing log directory: {}", dir.display()))?;

    let mut rows = Vec::new();
    let mut report = ParseReport::new();
    let mut files = 0usize;

    for path in paths {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_string();
        if let Err(reason) = night_from_filename(&name) {
            log::warn!("Ignoring {}: {}", path.display(), reason);
            continue;
        }

        let outcome = parse_seeing_log_file(&path)?;
        rows.extend(outcome.rows);
        report.merge(outcome.report);
        files += 1;
    }

    log::info!(
        "Parsed {} exposures from {} seeing logs in {}",
        rows.len(),
        files,
        dir.display()
    );
    Ok(ParseOutcome::new(rows, report))
}
