use std::collections::BTreeSet;
use std::fmt;

use crate::core::domain::{Band, BandMetrics, FieldAggregate, FieldId};
use crate::qc::policy::{Limits, QualityPolicy, Threshold};

/// Metric checked by a policy limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Metric {
    Seeing,
    Ellipticity,
    Airmass,
    Sky,
    Sources,
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Metric::Seeing => "seeing",
            Metric::Ellipticity => "ellipticity",
            Metric::Airmass => "airmass",
            Metric::Sky => "sky",
            Metric::Sources => "sources",
        };
        f.write_str(name)
    }
}

/// Why a field was rejected.
#[derive(Debug, Clone, PartialEq)]
pub enum RejectReason {
    MissingBand(Band),
    ExcludedNight(String),
    MetricMissing {
        band: Band,
        metric: Metric,
    },
    MetricOutOfRange {
        band: Band,
        metric: Metric,
        value: f64,
        limit: Threshold,
    },
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::MissingBand(band) => write!(f, "no {} exposure", band),
            RejectReason::ExcludedNight(night) => write!(f, "observed on excluded night {}", night),
            RejectReason::MetricMissing { band, metric } => {
                write!(f, "{} {} not measured", band, metric)
            }
            RejectReason::MetricOutOfRange {
                band,
                metric,
                value,
                limit,
            } => {
                let op = match (metric, limit.is_inclusive()) {
                    (Metric::Sources, true) => ">=",
                    (Metric::Sources, false) => ">",
                    (_, true) => "<=",
                    (_, false) => "<",
                };
                write!(
                    f,
                    "{} {} {} fails {} {}",
                    band,
                    metric,
                    value,
                    op,
                    limit.value()
                )
            }
        }
    }
}

/// Outcome of evaluating one field.
#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    Accepted,
    AcceptedByOverride,
    Rejected(RejectReason),
}

impl Verdict {
    pub fn is_accepted(&self) -> bool {
        !matches!(self, Verdict::Rejected(_))
    }
}

/// Accept/reject counts and the resulting field lists.
#[derive(Debug, Clone, Default)]
pub struct QcSummary {
    /// Accepted fields, sorted and unique.
    pub accepted: BTreeSet<FieldId>,
    pub accepted_by_override: usize,
    /// Rejected aggregates with their reason, in input order.
    pub rejected: Vec<(FieldId, RejectReason)>,
}

impl QcSummary {
    pub fn accepted_count(&self) -> usize {
        self.accepted.len()
    }

    /// Distinct rejected fields that have no accepted aggregate.
    pub fn rejected_fields(&self) -> BTreeSet<FieldId> {
        self.rejected
            .iter()
            .map(|(field, _)| *field)
            .filter(|field| !self.accepted.contains(field))
            .collect()
    }
}

/// Applies one policy to field aggregates.
///
/// # Examples
///
/// ```
/// use uvex_qc::core::domain::{Band, BandMetrics, FieldAggregate, FieldId, RunNumber};
/// use uvex_qc::qc::filter::{QualityFilter, Verdict, RejectReason};
/// use uvex_qc::qc::policy::PolicySet;
///
/// let policies = PolicySet::builtin();
/// let filter = QualityFilter::new(policies.get("dqc").unwrap().clone());
///
/// let mut field = FieldAggregate::new(FieldId::plain(9));
/// field.set_band(Band::G, BandMetrics { run: RunNumber(1), ..Default::default() });
/// field.set_band(Band::R, BandMetrics { run: RunNumber(2), ..Default::default() });
///
/// assert_eq!(filter.evaluate(&field), Verdict::Rejected(RejectReason::MissingBand(Band::U)));
/// ```
#[derive(Debug, Clone)]
pub struct QualityFilter {
    policy: QualityPolicy,
}

impl QualityFilter {
    pub fn new(policy: QualityPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &QualityPolicy {
        &self.policy
    }

    pub fn evaluate(&self, aggregate: &FieldAggregate) -> Verdict {
        let missing_band = self
            .policy
            .required_bands
            .iter()
            .copied()
            .find(|band| !aggregate.has_band(*band));

        if let Some(accept_override) = &self.policy.accept_override {
            let bands_ok = missing_band.is_none() || !self.policy.override_requires_bands;
            if bands_ok && accept_override.matches(aggregate) {
                return Verdict::AcceptedByOverride;
            }
        }

        if let Some(band) = missing_band {
            return Verdict::Rejected(RejectReason::MissingBand(band));
        }

        if let Some(night) = &aggregate.night {
            if self.policy.is_excluded_night(night) {
                return Verdict::Rejected(RejectReason::ExcludedNight(night.clone()));
            }
        }

        for band in &self.policy.required_bands {
            if let Some(metrics) = aggregate.band(*band) {
                if let Err(reason) = check_limits(*band, metrics, self.policy.limits_for(*band)) {
                    return Verdict::Rejected(reason);
                }
            }
        }

        Verdict::Accepted
    }

    pub fn is_acceptable(&self, aggregate: &FieldAggregate) -> bool {
        self.evaluate(aggregate).is_accepted()
    }

    pub fn filter_fields(&self, aggregates: &[FieldAggregate]) -> QcSummary {
        let mut summary = QcSummary::default();

        for aggregate in aggregates {
            match self.evaluate(aggregate) {
                Verdict::Accepted => {
                    summary.accepted.insert(aggregate.field);
                }
                Verdict::AcceptedByOverride => {
                    summary.accepted.insert(aggregate.field);
                    summary.accepted_by_override += 1;
                }
                Verdict::Rejected(reason) => {
                    log::debug!("Field {} rejected: {}", aggregate.field, reason);
                    summary.rejected.push((aggregate.field, reason));
                }
            }
        }

        log::info!(
            "Accepted {} fields ({} by override), rejected {} aggregates",
            summary.accepted.len(),
            summary.accepted_by_override,
            summary.rejected.len()
        );
        summary
    }
}

fn check_upper(
    band: Band,
    metric: Metric,
    value: Option<f64>,
    limit: Option<Threshold>,
) -> Result<(), RejectReason> {
    let Some(limit) = limit else {
        return Ok(());
    };
    match value {
        Some(v) if limit.allows_upper(v) => Ok(()),
        Some(v) => Err(RejectReason::MetricOutOfRange {
            band,
            metric,
            value: v,
            limit,
        }),
        None => Err(RejectReason::MetricMissing { band, metric }),
    }
}

fn check_limits(band: Band, metrics: &BandMetrics, limits: &Limits) -> Result<(), RejectReason> {
    check_upper(band, Metric::Seeing, metrics.seeing, limits.seeing)?;
    check_upper(band, Metric::Ellipticity, metrics.ellipticity, limits.ellipticity)?;
    check_upper(band, Metric::Airmass, metrics.airmass, limits.airmass)?;
    check_upper(band, Metric::Sky, metrics.sky, limits.sky)?;

    if let Some(limit) = limits.sources {
        let sources = metrics
            .sources
            .map(f64::from)
            .ok_or(RejectReason::MetricMissing {
                band,
                metric: Metric::Sources,
            })?;
        if !limit.allows_lower(sources) {
            return Err(RejectReason::MetricOutOfRange {
                band,
                metric: Metric::Sources,
                value: sources,
                limit,
            });
        }
    }

    Ok(())
}
