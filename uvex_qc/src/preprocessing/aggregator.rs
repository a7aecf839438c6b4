//! Aggregation of per-exposure rows into one record per survey field.
//!
//! Every field is observed as a short sequence of exposures, one per band,
//! taken back to back. The aggregator walks the exposures in run order and
//! folds each group of consecutive exposures of the same field into a
//! [`FieldAggregate`] holding one [`BandMetrics`] sub-record per band.

use std::collections::HashMap;

use crate::core::domain::{Band, BandMetrics, ExposureRecord, FieldAggregate, FieldId};

/// Configuration of the field aggregator.
#[derive(Debug, Clone, Default)]
pub struct AggregatorConfig {
    /// Only object names starting with this prefix (case-insensitive) are
    /// aggregated, e.g. `uvex` to leave out exposures of sister surveys.
    pub name_prefix: Option<String>,
}

/// Counters describing one aggregation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AggregationStats {
    pub records_in: usize,
    pub aggregated: usize,
    pub skipped_prefix: usize,
    pub skipped_no_field: usize,
    pub skipped_unknown_band: usize,
    pub overwritten: usize,
    pub fields: usize,
}

impl AggregationStats {
    pub fn skipped(&self) -> usize {
        self.skipped_prefix + self.skipped_no_field + self.skipped_unknown_band
    }
}

/// Aggregates in first-seen order plus counters.
#[derive(Debug, Clone, Default)]
pub struct AggregationResult {
    pub fields: Vec<FieldAggregate>,
    pub stats: AggregationStats,
}

/// Groups exposures by field identifier and band.
///
/// # Examples
///
/// ```
/// use uvex_qc::core::domain::{Band, ExposureRecord, RunNumber};
/// use uvex_qc::preprocessing::aggregator::FieldAggregator;
///
/// let records = vec![
///     ExposureRecord::new(RunNumber(3), "uvex_0001 Jul13", "U"),
///     ExposureRecord::new(RunNumber(1), "uvex_0001 Jul13", "r"),
///     ExposureRecord::new(RunNumber(2), "uvex_0001 Jul13", "g"),
///     ExposureRecord::new(RunNumber(4), "uvex_0001 Jul13", "i"),
/// ];
///
/// let result = FieldAggregator::new().aggregate(&records);
/// assert_eq!(result.fields.len(), 1);
/// assert!(result.fields[0].has_all(&[Band::U, Band::G, Band::R]));
/// assert_eq!(result.stats.skipped_unknown_band, 1);
/// ```
#[derive(Debug, Clone, Default)]
pub struct FieldAggregator {
    config: AggregatorConfig,
}

impl FieldAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: AggregatorConfig) -> Self {
        Self { config }
    }

    /// Restricts aggregation to object names with the given prefix.
    pub fn with_name_prefix(prefix: impl Into<String>) -> Self {
        Self::with_config(AggregatorConfig {
            name_prefix: Some(prefix.into()),
        })
    }

    /// Aggregates exposures given in any order.
    ///
    /// Records are sorted by run number, then the records of each field are
    /// gathered in the order the field is first seen. A field revisited on
    /// a later night therefore still yields a single aggregate.
    pub fn aggregate(&self, records: &[ExposureRecord]) -> AggregationResult {
        let mut ordered: Vec<&ExposureRecord> = records.iter().collect();
        ordered.sort_by_key(|r| r.run);

        let mut stats = AggregationStats {
            records_in: records.len(),
            ..Default::default()
        };

        let mut groups: Vec<Vec<(FieldId, Band, &ExposureRecord)>> = Vec::new();
        let mut index: HashMap<FieldId, usize> = HashMap::new();
        for record in ordered {
            if let Some((field, band)) = self.classify(record, &mut stats) {
                let slot = *index.entry(field).or_insert_with(|| {
                    groups.push(Vec::new());
                    groups.len() - 1
                });
                groups[slot].push((field, band, record));
            }
        }

        let fields = fold_groups(groups.into_iter().flatten(), &mut stats);
        log_summary(&stats);
        AggregationResult { fields, stats }
    }

    /// Aggregates exposures that are already grouped by field.
    ///
    /// A new aggregate starts whenever the field identifier changes, so the
    /// records of one field must be adjacent; a field that reappears later
    /// starts a second aggregate.
    pub fn aggregate_sorted(&self, records: &[ExposureRecord]) -> AggregationResult {
        let mut stats = AggregationStats {
            records_in: records.len(),
            ..Default::default()
        };

        let mut valid = Vec::with_capacity(records.len());
        for record in records {
            if let Some((field, band)) = self.classify(record, &mut stats) {
                valid.push((field, band, record));
            }
        }

        let fields = fold_groups(valid.into_iter(), &mut stats);
        log_summary(&stats);
        AggregationResult { fields, stats }
    }

    fn classify(
        &self,
        record: &ExposureRecord,
        stats: &mut AggregationStats,
    ) -> Option<(FieldId, Band)> {
        if let Some(prefix) = &self.config.name_prefix {
            if !record
                .name
                .trim()
                .to_lowercase()
                .starts_with(&prefix.to_lowercase())
            {
                stats.skipped_prefix += 1;
                return None;
            }
        }

        let Some(field) = record.field_id() else {
            log::warn!(
                "Run {} has no field identifier in name '{}'",
                record.run,
                record.name
            );
            stats.skipped_no_field += 1;
            return None;
        };

        let Some(band) = record.band() else {
            log::warn!("Run {} used filter {}", record.run, record.filter);
            stats.skipped_unknown_band += 1;
            return None;
        };

        Some((field, band))
    }
}

fn fold_groups<'a, I>(records: I, stats: &mut AggregationStats) -> Vec<FieldAggregate>
where
    I: Iterator<Item = (FieldId, Band, &'a ExposureRecord)>,
{
    let mut fields = Vec::new();
    let mut current: Option<FieldAggregate> = None;

    for (field, band, record) in records {
        let aggregate = match current.take() {
            Some(open) if open.field == field => open,
            previous => {
                if let Some(done) = previous {
                    fields.push(done);
                }
                FieldAggregate::from_first_exposure(field, record)
            }
        };
        let aggregate = current.insert(aggregate);

        if let Some(earlier) = aggregate.band(band) {
            log::debug!(
                "Field {}: run {} replaces run {} in band {}",
                field,
                record.run,
                earlier.run,
                band
            );
            stats.overwritten += 1;
        }
        aggregate.set_band(band, BandMetrics::from_exposure(record));
        stats.aggregated += 1;
    }

    if let Some(done) = current {
        fields.push(done);
    }

    stats.fields = fields.len();
    fields
}

fn log_summary(stats: &AggregationStats) {
    log::info!(
        "Aggregated {} of {} exposures into {} fields ({} skipped)",
        stats.aggregated,
        stats.records_in,
        stats.fields,
        stats.skipped()
    );
}
