//! Named quality-control policies.
//!
//! A policy lists the bands a field must have been observed in, the limits
//! the metrics of those bands must satisfy and, optionally, an override that
//! accepts fields regardless of their metrics. Policies are plain data so the
//! configuration file can define new ones next to the built-ins.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::config::error::{ConfigError, ConfigResult};
use crate::core::domain::{Band, FieldAggregate};

/// A numeric limit. A bare number is strict; the table form can make the
/// comparison inclusive.
///
/// ```
/// use uvex_qc::qc::policy::Threshold;
///
/// let strict = Threshold::Strict(1.7);
/// assert!(strict.allows_upper(1.69));
/// assert!(!strict.allows_upper(1.7));
///
/// let inclusive = Threshold::Bound { value: 1.7, inclusive: true };
/// assert!(inclusive.allows_upper(1.7));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Threshold {
    Strict(f64),
    Bound {
        value: f64,
        #[serde(default)]
        inclusive: bool,
    },
}

impl Threshold {
    pub fn value(&self) -> f64 {
        match *self {
            Threshold::Strict(value) => value,
            Threshold::Bound { value, .. } => value,
        }
    }

    pub fn is_inclusive(&self) -> bool {
        matches!(self, Threshold::Bound { inclusive: true, .. })
    }

    /// `x < value`, or `x <= value` when inclusive.
    pub fn allows_upper(&self, x: f64) -> bool {
        if self.is_inclusive() {
            x <= self.value()
        } else {
            x < self.value()
        }
    }

    /// `x > value`, or `x >= value` when inclusive.
    pub fn allows_lower(&self, x: f64) -> bool {
        if self.is_inclusive() {
            x >= self.value()
        } else {
            x > self.value()
        }
    }

    /// Same comparison against a different value.
    pub fn with_value(&self, value: f64) -> Threshold {
        match *self {
            Threshold::Strict(_) => Threshold::Strict(value),
            Threshold::Bound { inclusive, .. } => Threshold::Bound { value, inclusive },
        }
    }
}

/// Metric limits applied to one band.
///
/// `seeing`, `ellipticity`, `airmass` and `sky` are upper limits, `sources`
/// is a lower limit. An absent limit is not checked.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Limits {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seeing: Option<Threshold>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ellipticity: Option<Threshold>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub airmass: Option<Threshold>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sky: Option<Threshold>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sources: Option<Threshold>,
}

impl Limits {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.seeing.is_none()
            && self.ellipticity.is_none()
            && self.airmass.is_none()
            && self.sky.is_none()
            && self.sources.is_none()
    }
}

/// Force-accepts fields regardless of their metrics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum AcceptOverride {
    /// `min_hours < ra / 15 < max_hours`. Fields without coordinates never match.
    RaWindow { min_hours: f64, max_hours: f64 },
    /// `first <= number <= last` on the catalog number of the field.
    FieldNumbers { first: u32, last: u32 },
}

impl AcceptOverride {
    pub fn matches(&self, aggregate: &FieldAggregate) -> bool {
        match *self {
            AcceptOverride::RaWindow {
                min_hours,
                max_hours,
            } => aggregate
                .ra_hours()
                .map(|h| min_hours < h && h < max_hours)
                .unwrap_or(false),
            AcceptOverride::FieldNumbers { first, last } => {
                (first..=last).contains(&aggregate.field.number())
            }
        }
    }
}

/// A named acceptance policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct QualityPolicy {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub required_bands: Vec<Band>,
    #[serde(default)]
    pub limits: Limits,
    /// Replaces `limits` entirely for the listed bands.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub band_limits: BTreeMap<Band, Limits>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accept_override: Option<AcceptOverride>,
    /// Only let the override accept fields that have every required band.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub override_requires_bands: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub excluded_nights: Vec<String>,
}

impl QualityPolicy {
    pub fn new(required_bands: Vec<Band>, limits: Limits) -> Self {
        Self {
            description: None,
            required_bands,
            limits,
            band_limits: BTreeMap::new(),
            accept_override: None,
            override_requires_bands: false,
            excluded_nights: Vec::new(),
        }
    }

    pub fn with_band_limits(mut self, band: Band, limits: Limits) -> Self {
        self.band_limits.insert(band, limits);
        self
    }

    pub fn with_override(mut self, accept_override: AcceptOverride) -> Self {
        self.accept_override = Some(accept_override);
        self
    }

    /// Like [`with_override`](Self::with_override), but the override only
    /// applies once every required band has been observed.
    pub fn with_override_after_bands(mut self, accept_override: AcceptOverride) -> Self {
        self.accept_override = Some(accept_override);
        self.override_requires_bands = true;
        self
    }

    pub fn with_excluded_nights<I, S>(mut self, nights: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.excluded_nights = nights.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Limits that apply to a band.
    pub fn limits_for(&self, band: Band) -> &Limits {
        self.band_limits.get(&band).unwrap_or(&self.limits)
    }

    pub fn is_excluded_night(&self, night: &str) -> bool {
        self.excluded_nights.iter().any(|n| n.trim() == night.trim())
    }

    /// Checks the policy is usable.
    pub fn validate(&self, name: &str) -> ConfigResult<()> {
        let invalid = |reason: String| ConfigError::InvalidPolicy {
            name: name.to_string(),
            reason,
        };

        if self.required_bands.is_empty() && self.accept_override.is_none() {
            return Err(invalid("no required bands and no override".to_string()));
        }
        if let Some(AcceptOverride::RaWindow {
            min_hours,
            max_hours,
        }) = self.accept_override
        {
            if min_hours >= max_hours {
                return Err(invalid(format!(
                    "empty RA window {}h..{}h",
                    min_hours, max_hours
                )));
            }
        }
        if let Some(AcceptOverride::FieldNumbers { first, last }) = self.accept_override {
            if first > last {
                return Err(invalid(format!("empty field range {}..={}", first, last)));
            }
        }
        Ok(())
    }
}

/// Nights judged hopeless from the observing logs.
pub const HORRENDOUS_NIGHTS: [&str; 5] = [
    "20060722", "20101103", "20110729", "20111124", "20111125",
];

fn dqc_limits() -> Limits {
    Limits {
        seeing: Some(Threshold::Strict(1.7)),
        ellipticity: Some(Threshold::Strict(0.3)),
        airmass: Some(Threshold::Strict(2.0)),
        ..Limits::none()
    }
}

fn seeing_log_limits() -> Limits {
    Limits {
        seeing: Some(Threshold::Strict(2.5)),
        ellipticity: Some(Threshold::Strict(0.3)),
        sky: Some(Threshold::Strict(10000.0)),
        sources: Some(Threshold::Strict(2.0)),
        ..Limits::none()
    }
}

/// The policies in use, by name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PolicySet {
    policies: BTreeMap<String, QualityPolicy>,
}

impl PolicySet {
    pub fn new() -> Self {
        Self::default()
    }

    /// The built-in policies.
    ///
    /// - `dqc`: reduced data; U, g and r required, g and r within seeing 1.7,
    ///   ellipticity 0.3 and airmass 2.0; U metrics unchecked.
    /// - `dqc-late-ra`: `dqc`, plus every field with `5h < RA < 12h` accepted.
    /// - `dqc-hei`: `dqc` with He I required and checked like g and r.
    /// - `seeing-log`: telescope seeing logs; seeing 2.5, ellipticity 0.3,
    ///   sky 10000 and more than 2 sources in each of U, g and r.
    /// - `seeing-log-late-plane`: `seeing-log`, plus fields 2070 to 4083 with
    ///   U, g and r accepted whatever their metrics.
    /// - `unreduced`: U, g and r observed on a night not known to be hopeless.
    pub fn builtin() -> Self {
        let ugr = vec![Band::U, Band::G, Band::R];

        let dqc = QualityPolicy::new(ugr.clone(), dqc_limits())
            .with_band_limits(Band::U, Limits::none())
            .with_description("Reduced fields: g and r seeing, ellipticity and airmass");

        let dqc_late_ra = dqc
            .clone()
            .with_override(AcceptOverride::RaWindow {
                min_hours: 5.0,
                max_hours: 12.0,
            })
            .with_description("Reduced fields, accepting every field between 5h and 12h RA");

        let dqc_hei = QualityPolicy::new(vec![Band::U, Band::G, Band::R, Band::HeI], dqc_limits())
            .with_band_limits(Band::U, Limits::none())
            .with_description("Reduced fields including He I");

        let seeing_log = QualityPolicy::new(ugr.clone(), seeing_log_limits())
            .with_description("Seeing-log fields: seeing, ellipticity, sky and source count");

        let seeing_log_late_plane = seeing_log
            .clone()
            .with_override_after_bands(AcceptOverride::FieldNumbers {
                first: 2070,
                last: 4083,
            })
            .with_description("Seeing-log fields, accepting fields 2070 to 4083");

        let unreduced = QualityPolicy::new(ugr, Limits::none())
            .with_excluded_nights(HORRENDOUS_NIGHTS)
            .with_description("Unreduced fields with U, g and r on a usable night");

        let mut set = Self::new();
        set.insert("dqc", dqc);
        set.insert("dqc-late-ra", dqc_late_ra);
        set.insert("dqc-hei", dqc_hei);
        set.insert("seeing-log", seeing_log);
        set.insert("seeing-log-late-plane", seeing_log_late_plane);
        set.insert("unreduced", unreduced);
        set
    }

    pub fn insert(&mut self, name: impl Into<String>, policy: QualityPolicy) {
        self.policies.insert(name.into(), policy);
    }

    /// Adds or replaces policies by name.
    pub fn merge(&mut self, other: BTreeMap<String, QualityPolicy>) {
        for (name, policy) in other {
            if self.policies.contains_key(&name) {
                log::info!("Configuration replaces policy '{}'", name);
            }
            self.policies.insert(name, policy);
        }
    }

    pub fn get(&self, name: &str) -> ConfigResult<&QualityPolicy> {
        self.policies
            .get(name)
            .ok_or_else(|| ConfigError::UnknownPolicy {
                name: name.to_string(),
                available: self.names().join(", "),
            })
    }

    pub fn names(&self) -> Vec<&str> {
        self.policies.keys().map(String::as_str).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &QualityPolicy)> {
        self.policies.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn validate(&self) -> ConfigResult<()> {
        for (name, policy) in &self.policies {
            policy.validate(name)?;
        }
        Ok(())
    }
}
