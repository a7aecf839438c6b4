//! Exposure table validation with detailed error and warning reporting.
//!
//! This module checks parsed exposure data for completeness and
//! consistency before it is aggregated: duplicate run numbers, exposures
//! that cannot be attributed to a field or band, and physically implausible
//! quality metrics.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::core::domain::ExposureRecord;

/// Maximum number of individual messages reported per kind of issue.
const MAX_REPORTED: usize = 5;

/// Validation result with categorized issues and statistics.
///
/// Errors make `is_valid` false, while warnings are informational and don't
/// fail validation.
///
/// # Examples
///
/// ```
/// use uvex_qc::preprocessing::validator::ValidationResult;
///
/// let mut result = ValidationResult::new();
/// assert!(result.is_valid);
///
/// result.add_error("Duplicate run 583191".to_string());
/// assert!(!result.is_valid);
/// assert_eq!(result.errors.len(), 1);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationResult {
    pub is_valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub stats: ValidationStats,
}

/// Summary statistics computed during validation.
///
/// # Fields
///
/// * `total_exposures` - Number of exposures validated
/// * `duplicate_runs` - Exposures whose run number was already seen
/// * `unknown_bands` - Exposures taken through a filter outside the survey bands
/// * `missing_fields` - Exposures whose object name carries no field identifier
/// * `missing_seeing` - Exposures without a seeing measurement
/// * `suspicious_metrics` - Exposures with out-of-range seeing, ellipticity, sky or airmass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationStats {
    pub total_exposures: usize,
    pub duplicate_runs: usize,
    pub unknown_bands: usize,
    pub missing_fields: usize,
    pub missing_seeing: usize,
    pub suspicious_metrics: usize,
}

impl ValidationResult {
    pub fn new() -> Self {
        Self {
            is_valid: true,
            errors: Vec::new(),
            warnings: Vec::new(),
            stats: ValidationStats::default(),
        }
    }

    /// Adds a critical error and marks the result as invalid.
    pub fn add_error(&mut self, error: String) {
        self.is_valid = false;
        self.errors.push(error);
    }

    /// Adds a non-critical warning without invalidating the result.
    pub fn add_warning(&mut self, warning: String) {
        self.warnings.push(warning);
    }
}

impl Default for ValidationResult {
    fn default() -> Self {
        Self::new()
    }
}

/// Validator for parsed exposure data.
///
/// # Examples
///
/// ```
/// use uvex_qc::core::domain::{ExposureRecord, RunNumber};
/// use uvex_qc::preprocessing::validator::ExposureValidator;
///
/// let records = vec![
///     ExposureRecord::new(RunNumber(1), "uvex_0001", "r"),
///     ExposureRecord::new(RunNumber(1), "uvex_0001", "g"),
/// ];
///
/// let result = ExposureValidator::validate_exposures(&records);
/// assert!(!result.is_valid);
/// assert_eq!(result.stats.duplicate_runs, 1);
/// ```
pub struct ExposureValidator;

impl ExposureValidator {
    /// Validates a collection of exposure records.
    ///
    /// Duplicate run numbers are errors; unknown bands, missing field
    /// identifiers and implausible metrics are warnings.
    pub fn validate_exposures(records: &[ExposureRecord]) -> ValidationResult {
        let mut result = ValidationResult::new();
        result.stats.total_exposures = records.len();

        let mut seen = HashSet::with_capacity(records.len());
        for record in records {
            if !seen.insert(record.run) {
                result.stats.duplicate_runs += 1;
                if result.stats.duplicate_runs <= MAX_REPORTED {
                    result.add_error(format!("Duplicate run number: {}", record.run));
                }
            }
            Self::validate_exposure(record, &mut result);
        }

        if result.stats.duplicate_runs > MAX_REPORTED {
            result.add_error(format!(
                "Total duplicate runs: {} (showing first {})",
                result.stats.duplicate_runs, MAX_REPORTED
            ));
        }
        if result.stats.suspicious_metrics > MAX_REPORTED {
            result.add_warning(format!(
                "Total exposures with suspicious metrics: {} (showing first {})",
                result.stats.suspicious_metrics, MAX_REPORTED
            ));
        }

        result
    }

    fn validate_exposure(record: &ExposureRecord, result: &mut ValidationResult) {
        if record.band().is_none() {
            result.stats.unknown_bands += 1;
            result.add_warning(format!(
                "Run {} used filter '{}' outside the survey bands",
                record.run, record.filter
            ));
        }

        if record.field_id().is_none() {
            result.stats.missing_fields += 1;
            result.add_warning(format!(
                "Run {} object name '{}' has no field identifier",
                record.run, record.name
            ));
        }

        if record.seeing.is_none() {
            result.stats.missing_seeing += 1;
        }

        let mut problems = Vec::new();
        if let Some(seeing) = record.seeing {
            if seeing <= 0.0 {
                problems.push(format!("seeing {}", seeing));
            }
        }
        if let Some(ellipticity) = record.ellipticity {
            if !(0.0..=1.0).contains(&ellipticity) {
                problems.push(format!("ellipticity {}", ellipticity));
            }
        }
        if let Some(sky) = record.sky {
            if sky < 0.0 {
                problems.push(format!("sky {}", sky));
            }
        }
        if let Some(airmass) = record.airmass {
            if airmass < 1.0 {
                problems.push(format!("airmass {}", airmass));
            }
        }

        if !problems.is_empty() {
            result.stats.suspicious_metrics += 1;
            if result.stats.suspicious_metrics <= MAX_REPORTED {
                result.add_warning(format!(
                    "Run {} has suspicious metrics: {}",
                    record.run,
                    problems.join(", ")
                ));
            }
        }
    }
}
