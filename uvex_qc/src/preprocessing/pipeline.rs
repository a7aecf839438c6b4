use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::core::domain::{ExposureRecord, FieldAggregate};
use crate::parsing::{csv_parser, dqc_parser, int_log_parser, seeing_log_parser, ParseReport};
use crate::preprocessing::aggregator::{AggregationStats, AggregatorConfig, FieldAggregator};
use crate::preprocessing::enricher::{EnrichmentStats, FieldEnricher};
use crate::preprocessing::validator::{ExposureValidator, ValidationResult};

/// Where the exposures of a pipeline run come from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExposureSource {
    /// CASU data-quality fixed-width report (one file)
    DqcReport,
    /// Directory of `seeing_YYYYMMDD.log` files
    SeeingLogs,
    /// Directory of `intlog_NNN.txt` observing logs
    IntLogs,
    /// Exposure table previously written by this crate
    ExposureCsv,
}

/// Result of a pipeline run
pub struct PipelineResult {
    pub exposures: Vec<ExposureRecord>,
    pub fields: Vec<FieldAggregate>,
    pub parse_report: ParseReport,
    pub validation: ValidationResult,
    pub aggregation: AggregationStats,
    pub enrichment: Option<EnrichmentStats>,
}

/// Configuration for the field pipeline
pub struct PipelineConfig {
    pub source: ExposureSource,
    pub validate: bool,
    pub name_prefix: Option<String>,
    pub coordinates: Option<PathBuf>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            source: ExposureSource::DqcReport,
            validate: true,
            name_prefix: Some("uvex".to_string()),
            coordinates: None,
        }
    }
}

/// Exposure source to per-field table pipeline
pub struct FieldPipeline {
    config: PipelineConfig,
}

impl Default for FieldPipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl FieldPipeline {
    /// Create a new pipeline with default configuration
    pub fn new() -> Self {
        Self {
            config: PipelineConfig::default(),
        }
    }

    /// Create a pipeline with custom configuration
    pub fn with_config(config: PipelineConfig) -> Self {
        Self { config }
    }

    /// Process an exposure source into validated, enriched field aggregates
    ///
    /// # Arguments
    /// * `input` - Report file, log directory or exposure table, per the configured source
    pub fn process(&self, input: &Path) -> Result<PipelineResult> {
        // Step 1: Load exposures
        let (exposures, parse_report) = self.load_exposures(input)?;

        // Step 2: Validate (if requested)
        let validation = if self.config.validate {
            ExposureValidator::validate_exposures(&exposures)
        } else {
            ValidationResult::new()
        };
        for warning in validation.warnings.iter().take(20) {
            log::debug!("{}", warning);
        }
        if !validation.is_valid {
            log::warn!(
                "Exposure validation found {} errors",
                validation.errors.len()
            );
        }

        // Step 3: Aggregate per field
        let aggregator = FieldAggregator::with_config(AggregatorConfig {
            name_prefix: self.config.name_prefix.clone(),
        });
        let aggregated = aggregator.aggregate(&exposures);
        let mut fields = aggregated.fields;

        // Step 4: Enrich with coordinates (if configured)
        let enrichment = match &self.config.coordinates {
            Some(path) => {
                let enricher = FieldEnricher::with_coordinates_file(path)?;
                Some(enricher.enrich(&mut fields))
            }
            None => None,
        };

        Ok(PipelineResult {
            exposures,
            fields,
            parse_report,
            validation,
            aggregation: aggregated.stats,
            enrichment,
        })
    }

    /// Load exposures from the configured source
    fn load_exposures(&self, input: &Path) -> Result<(Vec<ExposureRecord>, ParseReport)> {
        match self.config.source {
            ExposureSource::DqcReport => {
                let outcome = dqc_parser::parse_dqc_file(input)?;
                Ok((outcome.rows, outcome.report))
            }
            ExposureSource::SeeingLogs => {
                let outcome = seeing_log_parser::parse_seeing_log_dir(input)?;
                Ok((outcome.rows, outcome.report))
            }
            ExposureSource::IntLogs => {
                let outcome = int_log_parser::parse_int_log_dir(input)?;
                let exposures = outcome.rows.iter().flat_map(|log| log.exposures()).collect();
                Ok((exposures, outcome.report))
            }
            ExposureSource::ExposureCsv => {
                let exposures = csv_parser::read_exposures_csv(input)
                    .with_context(|| format!("Failed to load exposures: {}", input.display()))?;
                let report = ParseReport {
                    lines_read: exposures.len(),
                    parsed: exposures.len(),
                    ..Default::default()
                };
                Ok((exposures, report))
            }
        }
    }
}

/// Convenience function: run the pipeline and write the field table
pub fn build_field_table(
    input: &Path,
    output: &Path,
    config: PipelineConfig,
) -> Result<PipelineResult> {
    let result = FieldPipeline::with_config(config).process(input)?;
    csv_parser::write_aggregates_csv(&result.fields, output)
        .with_context(|| format!("Failed to write field table: {}", output.display()))?;
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn seeing_line(run: u32, field: &str, filter: &str, seeing: f64) -> String {
        format!(
            "r{}.fit 4.0 {} 0.10 2000.0 14.0 500 sources in {} {}",
            run, seeing, field, filter
        )
    }

    #[test]
    fn test_seeing_logs_to_field_table() {
        let dir = TempDir::new().unwrap();
        let logs = dir.path().join("logs");
        fs::create_dir(&logs).unwrap();
        let content = [
            seeing_line(10, "uvex_0100", "U", 1.5),
            seeing_line(11, "uvex_0100", "g", 1.4),
            seeing_line(12, "uvex_0100", "r", 1.3),
            seeing_line(13, "intphas_0100", "Ha", 1.3),
            seeing_line(14, "uvex_0100o", "r", 1.2),
        ]
        .join("\n");
        fs::write(logs.join("seeing_20150712.log"), content).unwrap();

        let output = dir.path().join("fields.csv");
        let config = PipelineConfig {
            source: ExposureSource::SeeingLogs,
            ..Default::default()
        };
        let result = build_field_table(&logs, &output, config).unwrap();

        assert_eq!(result.exposures.len(), 5);
        assert_eq!(result.fields.len(), 2);
        assert_eq!(result.aggregation.skipped_prefix, 1);
        assert!(result.enrichment.is_none());

        let written = csv_parser::read_aggregates_csv(&output).unwrap();
        assert_eq!(written, result.fields);
        assert_eq!(written[0].night.as_deref(), Some("20150712"));
    }

    #[test]
    fn test_missing_input_is_error() {
        let pipeline = FieldPipeline::new();
        assert!(pipeline.process(Path::new("/nonexistent/report.txt")).is_err());
    }
}
