//! Parser for the INT observing logs (`intlog_NNN.txt`).
//!
//! A log starts with a header block describing the night (date, observers,
//! hourly weather readings, time lost and free-text comments) followed by one
//! fixed-width line per exposure. Only Wide Field Camera exposures are kept.

use anyhow::{Context, Result};
use std::collections::BTreeSet;
use std::path::Path;

use super::fixed_width::{non_empty, parse_opt_f64, slice, slice_from};
use super::{ParseOutcome, ParseReport};
use crate::core::domain::{ExposureRecord, FieldId, RunNumber};

/// Lines scanned for header keys.
const HEADER_LINES: usize = 70;

/// Exposure lines start after the header block.
const FIRST_DATA_LINE: usize = 20;

const INSTRUMENT: &str = "WFC";

/// Conditions of one observing night.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NightLog {
    pub night: Option<String>,
    pub observer: Option<String>,
    pub temp_avg: Option<f64>,
    pub hum_avg: Option<f64>,
    pub lost_weather: Option<String>,
    pub lost_technical: Option<String>,
    pub lost_other: Option<String>,
    pub comments_weather: Option<String>,
    pub comments_night: Option<String>,
}

/// One WFC exposure line of an observing log.
#[derive(Debug, Clone, PartialEq)]
pub struct IntLogRun {
    pub run: RunNumber,
    pub name: String,
    pub filter: String,
    pub ra_hms: Option<String>,
    pub dec_dms: Option<String>,
    pub exptime: Option<f64>,
    pub comments: Option<String>,
}

/// A parsed log: the night header and its exposures.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IntLog {
    pub night: NightLog,
    pub runs: Vec<IntLogRun>,
}

impl IntLog {
    /// Converts the runs into exposure records tagged with the night.
    pub fn exposures(&self) -> Vec<ExposureRecord> {
        self.runs
            .iter()
            .map(|run| {
                let mut record = ExposureRecord::new(run.run, run.name.clone(), run.filter.clone());
                record.night = self.night.night.clone();
                record.ra_hms = run.ra_hms.clone();
                record.dec_dms = run.dec_dms.clone();
                record.exptime = run.exptime;
                record.comments = run.comments.clone();
                record
            })
            .collect()
    }
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

/// `HH:00 temp hum` weather reading.
fn parse_hourly_reading(line: &str) -> Option<(f64, f64)> {
    let bytes = line.as_bytes();
    if bytes.len() < 5
        || !bytes[0].is_ascii_digit()
        || !bytes[1].is_ascii_digit()
        || &bytes[2..5] != b":00"
    {
        return None;
    }
    let mut tokens = line[5..].split_whitespace();
    let temp = tokens.next()?.parse().ok()?;
    let hum = tokens.next()?.parse().ok()?;
    Some((temp, hum))
}

/// `hh:mm` value following a `TIME LOST <kind>` key.
fn parse_time_lost(line: &str, kind: &str) -> Option<String> {
    let rest = line.strip_prefix("TIME LOST ")?.strip_prefix(kind)?;
    let value = rest.split_whitespace().next()?;
    let (h, m) = value.split_once(':')?;
    let valid = !h.is_empty()
        && !m.is_empty()
        && h.chars().all(|c| c.is_ascii_digit())
        && m.chars().all(|c| c.is_ascii_digit());
    valid.then(|| value.to_string())
}

fn parse_header(lines: &[&str]) -> NightLog {
    let mut night = NightLog::default();
    let mut temps = Vec::new();
    let mut hums = Vec::new();

    for (i, line) in lines.iter().take(HEADER_LINES).enumerate() {
        let next_line = || lines.get(i + 1).map(|l| l.trim().to_string());

        if let Some(rest) = line.strip_prefix("DATE") {
            let digits: String = rest
                .trim_start()
                .chars()
                .take_while(|c| c.is_ascii_digit())
                .collect();
            if !digits.is_empty() {
                night.night = Some(digits);
            }
        } else if let Some(rest) = line.strip_prefix("OBSERVER/S") {
            night.observer = non_empty(rest.trim().to_string());
        } else if let Some((temp, hum)) = parse_hourly_reading(line) {
            temps.push(temp);
            hums.push(hum);
        } else if let Some(value) = parse_time_lost(line, "weather") {
            night.lost_weather = Some(value);
        } else if let Some(value) = parse_time_lost(line, "Technical") {
            night.lost_technical = Some(value);
        } else if let Some(value) = parse_time_lost(line, "Other") {
            night.lost_other = Some(value);
        } else if line.starts_with("WEATHER CONDITIONS") {
            night.comments_weather = next_line().and_then(non_empty);
        } else if line.starts_with("COMMENTS") {
            night.comments_night = next_line().and_then(non_empty);
        }
    }

    night.temp_avg = mean(&temps);
    night.hum_avg = mean(&hums);
    night
}

/// Leading run number of an exposure line (at least five digits).
fn leading_run(line: &str) -> Option<&str> {
    let trimmed = line.trim_start();
    let end = trimmed
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(trimmed.len());
    (end >= 5).then(|| &trimmed[..end])
}

/// Parses one exposure line. `Ok(None)` means the line is not a WFC exposure.
pub fn parse_run_line(line: &str) -> Result<Option<IntLogRun>, String> {
    let Some(run_text) = leading_run(line) else {
        return Ok(None);
    };
    if !line.contains(INSTRUMENT) {
        return Ok(None);
    }

    let run: RunNumber = run_text.parse()?;
    let name = slice(line, 8, 25).to_lowercase();
    if name.is_empty() {
        return Err(format!("run {} has no object name", run));
    }

    // Filter sits between the declination and the exposure time.
    let filter = slice(line, 48, 75)
        .split_whitespace()
        .last()
        .unwrap_or_default()
        .to_string();

    Ok(Some(IntLogRun {
        run,
        name,
        filter,
        ra_hms: non_empty(slice(line, 25, 36)),
        dec_dms: non_empty(slice(line, 37, 48)),
        exptime: parse_opt_f64(&slice(line, 75, 82))?,
        comments: non_empty(slice_from(line, 121)),
    }))
}

/// Parses the full text of one observing log.
pub fn parse_int_log_str(content: &str) -> ParseOutcome<IntLog> {
    let lines: Vec<&str> = content.lines().collect();
    let mut report = ParseReport::new();

    let night = parse_header(&lines);
    if night.night.is_none() {
        log::warn!("Observing log has no DATE header");
    }

    let mut runs = Vec::new();
    for (idx, line) in lines.iter().enumerate().skip(FIRST_DATA_LINE) {
        report.lines_read += 1;
        match parse_run_line(line) {
            Ok(Some(run)) => {
                runs.push(run);
                report.record_parsed();
            }
            Ok(None) => {}
            Err(reason) => report.record_skipped(idx + 1, reason),
        }
    }

    ParseOutcome::new(vec![IntLog { night, runs }], report)
}

fn is_int_log_name(name: &str) -> bool {
    name.strip_prefix("intlog_")
        .and_then(|rest| rest.strip_suffix(".txt"))
        .map(|digits| !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit()))
        .unwrap_or(false)
}

/// Parses every `intlog_NNN.txt` file of a directory in file-name order.
pub fn parse_int_log_dir(dir: &Path) -> Result<ParseOutcome<IntLog>> {
    let paths: Vec<_> = super::list_files(dir)
        .with_context(|| format!("Failed to list observing log directory: {}", dir.display()))?
        .into_iter()
        .filter(|path| {
            path.file_name()
                .and_then(|n| n.to_str())
                .map(is_int_log_name)
                .unwrap_or(false)
        })
        .collect();

    let mut logs = Vec::new();
    let mut report = ParseReport::new();
    for path in &paths {
        let bytes = std::fs::read(path)
            .with_context(|| format!("Failed to read observing log: {}", path.display()))?;
        let outcome = parse_int_log_str(&String::from_utf8_lossy(&bytes));
        logs.extend(outcome.rows);
        report.merge(outcome.report);
    }

    log::info!(
        "Parsed {} observing logs with {} WFC exposures from {}",
        logs.len(),
        report.parsed,
        dir.display()
    );
    Ok(ParseOutcome::new(logs, report))
}

/// Distinct field identifiers named by the exposures, sorted.
///
/// Exposures whose object name is not a survey field are ignored.
pub fn attempted_fields(exposures: &[ExposureRecord], name_prefix: Option<&str>) -> Vec<FieldId> {
    let fields: BTreeSet<FieldId> = exposures
        .iter()
        .filter(|e| {
            name_prefix
                .map(|p| e.name.trim().to_lowercase().starts_with(&p.to_lowercase()))
                .unwrap_or(true)
        })
        .filter_map(|e| e.field_id())
        .collect();
    fields.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run_line(run: &str, name: &str, filter: &str, comments: &str) -> String {
        let mut buf = vec![b' '; 121];
        let mut put = |at: usize, text: &str| {
            buf[at..at + text.len()].copy_from_slice(text.as_bytes());
        };
        put(1, run);
        put(8, name);
        put(25, "18:12:31.8");
        put(37, "-18:29:59.1");
        put(50, "J2000");
        put(62, filter);
        put(75, "120.0");
        put(90, "WFC");
        let mut line = String::from_utf8(buf).unwrap();
        line.push_str(comments);
        line
    }

    fn sample_log() -> String {
        let mut lines = vec![
            "INT OBSERVING LOG".to_string(),
            "DATE 20130714".to_string(),
            "OBSERVER/S  A. Observer, B. Observer ".to_string(),
            "20:00  10.0  40.0".to_string(),
            "22:00  12.0  60.0".to_string(),
            "TIME LOST weather   1:30".to_string(),
            "TIME LOST Technical 0:00".to_string(),
            "TIME LOST Other     0:15".to_string(),
            "WEATHER CONDITIONS".to_string(),
            "  Clear, some dust  ".to_string(),
            "COMMENTS".to_string(),
            "Dome stuck at dusk".to_string(),
        ];
        while lines.len() < FIRST_DATA_LINE {
            lines.push(String::new());
        }
        lines.push(run_line("1234567", "UVEX_0009O JUL13", "U", "slight cloud"));
        lines.push(run_line("1234568", "uvex_0009o jul13", "g", ""));
        lines.push("   99 short run number WFC".to_string());
        lines.push(run_line("1234569", "bias", "r", "").replace("WFC", "IDS"));
        lines.join("\n")
    }

    #[test]
    fn test_header_fields() {
        let outcome = parse_int_log_str(&sample_log());
        let night = &outcome.rows[0].night;

        assert_eq!(night.night.as_deref(), Some("20130714"));
        assert_eq!(night.observer.as_deref(), Some("A. Observer, B. Observer"));
        assert_eq!(night.temp_avg, Some(11.0));
        assert_eq!(night.hum_avg, Some(50.0));
        assert_eq!(night.lost_weather.as_deref(), Some("1:30"));
        assert_eq!(night.lost_technical.as_deref(), Some("0:00"));
        assert_eq!(night.lost_other.as_deref(), Some("0:15"));
        assert_eq!(night.comments_weather.as_deref(), Some("Clear, some dust"));
        assert_eq!(night.comments_night.as_deref(), Some("Dome stuck at dusk"));
    }

    #[test]
    fn test_only_wfc_runs_kept() {
        let outcome = parse_int_log_str(&sample_log());
        let log = &outcome.rows[0];

        assert_eq!(log.runs.len(), 2);
        assert_eq!(log.runs[0].run, RunNumber(1234567));
        assert_eq!(log.runs[0].name, "uvex_0009o jul13");
        assert_eq!(log.runs[0].filter, "U");
        assert_eq!(log.runs[0].ra_hms.as_deref(), Some("18:12:31.8"));
        assert_eq!(log.runs[0].dec_dms.as_deref(), Some("-18:29:59.1"));
        assert_eq!(log.runs[0].exptime, Some(120.0));
        assert_eq!(log.runs[0].comments.as_deref(), Some("slight cloud"));
        assert_eq!(log.runs[1].comments, None);
    }

    #[test]
    fn test_exposures_carry_night() {
        let outcome = parse_int_log_str(&sample_log());
        let exposures = outcome.rows[0].exposures();

        assert_eq!(exposures.len(), 2);
        assert!(exposures
            .iter()
            .all(|e| e.night.as_deref() == Some("20130714")));
        assert_eq!(attempted_fields(&exposures, Some("uvex")), vec![FieldId::offset(9)]);
        assert!(attempted_fields(&exposures, Some("intphas")).is_empty());
    }

    #[test]
    fn test_log_file_names() {
        assert!(is_int_log_name("intlog_001.txt"));
        assert!(!is_int_log_name("intlog_.txt"));
        assert!(!is_int_log_name("intlog_001.html"));
    }
}
