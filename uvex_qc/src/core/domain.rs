//! Domain models for survey exposures and per-field aggregates.
//!
//! This module provides the core data structures shared by the parsers, the
//! field aggregator, the quality filter and the quicklook driver: photometric
//! bands, run numbers, field identifiers, exposure records and field
//! aggregates.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Photometric filter band used by the survey.
///
/// The survey observes through the Sloan-like `g` and `r` filters, the RGO
/// `U` filter and the narrow-band He I filter. Logs and reports spell the
/// labels inconsistently (`U`/`u`, `hei`/`he1`/`He I`), so parsing is
/// case-insensitive and ignores embedded whitespace.
///
/// # Examples
///
/// ```
/// use uvex_qc::core::domain::Band;
///
/// assert_eq!(Band::from_filter("He I"), Some(Band::HeI));
/// assert_eq!(Band::from_filter("he1"), Some(Band::HeI));
/// assert_eq!(Band::from_filter("U"), Some(Band::U));
/// assert_eq!(Band::from_filter("Ha"), None);
/// assert_eq!(Band::HeI.suffix(), "hei");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Band {
    U,
    G,
    R,
    HeI,
}

impl Band {
    /// Every band, in column order.
    pub const ALL: [Band; 4] = [Band::U, Band::G, Band::R, Band::HeI];

    /// Number of bands.
    pub const COUNT: usize = 4;

    /// Position of the band in [`Band::ALL`].
    pub fn index(self) -> usize {
        match self {
            Band::U => 0,
            Band::G => 1,
            Band::R => 2,
            Band::HeI => 3,
        }
    }

    /// Lower-case label used as a column suffix and lookup key.
    pub fn suffix(self) -> &'static str {
        match self {
            Band::U => "u",
            Band::G => "g",
            Band::R => "r",
            Band::HeI => "hei",
        }
    }

    /// Maps a filter label from a log or report onto a band.
    ///
    /// Returns `None` for filters outside the survey's band set.
    pub fn from_filter(label: &str) -> Option<Band> {
        let normalized: String = label
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect::<String>()
            .to_lowercase();

        match normalized.as_str() {
            "u" => Some(Band::U),
            "g" => Some(Band::G),
            "r" => Some(Band::R),
            "hei" | "he1" => Some(Band::HeI),
            _ => None,
        }
    }
}

impl fmt::Display for Band {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Band::U => "U",
            Band::G => "g",
            Band::R => "r",
            Band::HeI => "HeI",
        };
        f.write_str(label)
    }
}

impl FromStr for Band {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Band::from_filter(s).ok_or_else(|| format!("Unknown band: '{}'", s))
    }
}

impl TryFrom<String> for Band {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Band> for String {
    fn from(band: Band) -> Self {
        band.suffix().to_string()
    }
}

/// Telescope exposure number.
///
/// Reports write run numbers either bare (`583191`) or with the raw-frame
/// prefix (`r583191`); both parse to the same value.
///
/// ```
/// use uvex_qc::core::domain::RunNumber;
///
/// assert_eq!("r583191".parse::<RunNumber>().unwrap(), RunNumber(583191));
/// assert_eq!(RunNumber(583191).to_string(), "583191");
/// ```
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct RunNumber(pub u32);

impl fmt::Display for RunNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RunNumber {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let digits = trimmed
            .strip_prefix('r')
            .or_else(|| trimmed.strip_prefix('R'))
            .unwrap_or(trimmed);

        digits
            .parse::<u32>()
            .map(RunNumber)
            .map_err(|e| format!("Invalid run number '{}': {}", s, e))
    }
}

/// Identifier of a survey field: a catalog number plus the offset flag.
///
/// Each catalog position is observed twice, once at the nominal pointing and
/// once offset by a few arcminutes; the offset pointing carries an `o`
/// suffix. Identifiers render as four zero-padded digits.
///
/// # Examples
///
/// ```
/// use uvex_qc::core::domain::FieldId;
///
/// let field: FieldId = "0009o".parse().unwrap();
/// assert_eq!(field.number(), 9);
/// assert!(field.is_offset());
/// assert_eq!(field.to_string(), "0009o");
///
/// let from_log = FieldId::from_object_name("uvex_0009o Aug2010").unwrap();
/// assert_eq!(from_log, field);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FieldId {
    number: u32,
    offset: bool,
}

impl FieldId {
    pub fn new(number: u32, offset: bool) -> Self {
        Self { number, offset }
    }

    pub fn plain(number: u32) -> Self {
        Self::new(number, false)
    }

    pub fn offset(number: u32) -> Self {
        Self::new(number, true)
    }

    pub fn number(&self) -> u32 {
        self.number
    }

    pub fn is_offset(&self) -> bool {
        self.offset
    }

    /// Extracts the field identifier from a telescope object name.
    ///
    /// Object names look like `uvex_0009o Aug2010` or
    /// `intphas_0009o_aug2010`: the identifier is the token after the first
    /// underscore, cut at the next underscore or whitespace.
    pub fn from_object_name(name: &str) -> Option<FieldId> {
        let (_, rest) = name.trim().split_once('_')?;
        let token = rest
            .split(|c: char| c == '_' || c.is_whitespace())
            .next()?;
        token.to_lowercase().parse().ok()
    }
}

impl fmt::Display for FieldId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.offset {
            write!(f, "{:04}o", self.number)
        } else {
            write!(f, "{:04}", self.number)
        }
    }
}

impl FromStr for FieldId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let (digits, offset) = match trimmed.strip_suffix('o') {
            Some(digits) => (digits, true),
            None => (trimmed, false),
        };

        if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
            return Err(format!("Invalid field identifier: '{}'", s));
        }

        let number = digits
            .parse::<u32>()
            .map_err(|e| format!("Invalid field identifier '{}': {}", s, e))?;
        Ok(FieldId::new(number, offset))
    }
}

impl Serialize for FieldId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for FieldId {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// One telescope exposure as read from a log or quality report.
///
/// Only the run number, object name and filter label are present in every
/// source. The remaining columns depend on the source format: the CASU
/// quality report carries airmass, noise and the data directory, the seeing
/// logs carry source counts and the night.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExposureRecord {
    pub run: RunNumber,
    pub name: String,
    pub filter: String,
    pub time: Option<String>,
    pub night: Option<String>,
    pub dir: Option<String>,
    pub ra_hms: Option<String>,
    pub dec_dms: Option<String>,
    pub airmass: Option<f64>,
    pub posang: Option<f64>,
    pub exptime: Option<f64>,
    pub seeing: Option<f64>,
    pub sky: Option<f64>,
    pub noise: Option<f64>,
    pub ellipticity: Option<f64>,
    pub apcor: Option<f64>,
    pub sources: Option<u32>,
    pub comments: Option<String>,
}

impl ExposureRecord {
    pub fn new(run: RunNumber, name: impl Into<String>, filter: impl Into<String>) -> Self {
        Self {
            run,
            name: name.into(),
            filter: filter.into(),
            ..Default::default()
        }
    }

    /// Band of the exposure, `None` when the filter is not a survey band.
    pub fn band(&self) -> Option<Band> {
        Band::from_filter(&self.filter)
    }

    /// Field identifier parsed from the object name.
    pub fn field_id(&self) -> Option<FieldId> {
        FieldId::from_object_name(&self.name)
    }
}

/// Quality metrics of the exposure that represents one band of a field.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BandMetrics {
    pub run: RunNumber,
    pub time: Option<String>,
    pub exptime: Option<f64>,
    pub seeing: Option<f64>,
    pub ellipticity: Option<f64>,
    pub sky: Option<f64>,
    pub noise: Option<f64>,
    pub airmass: Option<f64>,
    pub sources: Option<u32>,
}

impl BandMetrics {
    pub fn from_exposure(record: &ExposureRecord) -> Self {
        Self {
            run: record.run,
            time: record.time.clone(),
            exptime: record.exptime,
            seeing: record.seeing,
            ellipticity: record.ellipticity,
            sky: record.sky,
            noise: record.noise,
            airmass: record.airmass,
            sources: record.sources,
        }
    }
}

/// One survey field with a sub-record per band.
///
/// A band that was never observed holds `None`, the explicit empty marker;
/// it is written as empty cells in the interchange tables so that the band
/// columns are always present.
///
/// # Examples
///
/// ```
/// use uvex_qc::core::domain::{Band, BandMetrics, FieldAggregate, FieldId, RunNumber};
///
/// let mut field = FieldAggregate::new(FieldId::plain(9));
/// field.set_band(Band::R, BandMetrics { run: RunNumber(583191), ..Default::default() });
///
/// assert!(field.has_band(Band::R));
/// assert!(!field.has_band(Band::U));
/// assert!(!field.has_all(&[Band::U, Band::G, Band::R]));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct FieldAggregate {
    pub field: FieldId,
    pub dir: Option<String>,
    pub night: Option<String>,
    pub comments: Option<String>,
    pub ra: Option<f64>,
    pub dec: Option<f64>,
    pub l: Option<f64>,
    pub b: Option<f64>,
    bands: [Option<BandMetrics>; Band::COUNT],
}

impl FieldAggregate {
    pub fn new(field: FieldId) -> Self {
        Self {
            field,
            dir: None,
            night: None,
            comments: None,
            ra: None,
            dec: None,
            l: None,
            b: None,
            bands: Default::default(),
        }
    }

    /// Starts an aggregate from the first exposure of its group, copying the
    /// per-field columns.
    pub fn from_first_exposure(field: FieldId, record: &ExposureRecord) -> Self {
        Self {
            dir: record.dir.clone(),
            night: record.night.clone(),
            comments: record.comments.clone(),
            ..Self::new(field)
        }
    }

    pub fn band(&self, band: Band) -> Option<&BandMetrics> {
        self.bands[band.index()].as_ref()
    }

    pub fn set_band(&mut self, band: Band, metrics: BandMetrics) {
        self.bands[band.index()] = Some(metrics);
    }

    pub fn clear_band(&mut self, band: Band) {
        self.bands[band.index()] = None;
    }

    pub fn has_band(&self, band: Band) -> bool {
        self.bands[band.index()].is_some()
    }

    /// True when every listed band has been observed.
    pub fn has_all(&self, bands: &[Band]) -> bool {
        bands.iter().all(|b| self.has_band(*b))
    }

    /// Bands with a sub-record, in column order.
    pub fn observed_bands(&self) -> Vec<Band> {
        Band::ALL
            .iter()
            .copied()
            .filter(|b| self.has_band(*b))
            .collect()
    }

    /// Right ascension in hours, when coordinates are known.
    pub fn ra_hours(&self) -> Option<f64> {
        self.ra.map(|ra| ra / 15.0)
    }
}

/// Equatorial and galactic position of a field pointing, in degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldCoordinates {
    pub field: FieldId,
    pub ra: f64,
    pub dec: f64,
    pub l: f64,
    pub b: f64,
}
