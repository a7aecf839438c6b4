use anyhow::{Context, Result};
use std::collections::HashMap;
use std::path::Path;

use crate::core::domain::{FieldAggregate, FieldCoordinates, FieldId};
use crate::parsing::csv_parser;

/// Offset between a field and its offset pointing, in degrees.
pub const OFFSET_DEG: f64 = 5.0 / 60.0;

/// Rotation from J2000 equatorial to galactic unit vectors.
const EQUATORIAL_TO_GALACTIC: [[f64; 3]; 3] = [
    [-0.0548755604162154, -0.8734370902348850, -0.4838350155487132],
    [0.4941094278755837, -0.4448296299600112, 0.7469822444972189],
    [-0.8676661490190047, -0.1980763734312015, 0.4559837761750669],
];

/// Converts J2000 equatorial coordinates to galactic `(l, b)`, all in degrees.
///
/// ```
/// use uvex_qc::preprocessing::enricher::equatorial_to_galactic;
///
/// let (_, b) = equatorial_to_galactic(192.85948, 27.12825);
/// assert!((b - 90.0).abs() < 1e-3);
/// ```
pub fn equatorial_to_galactic(ra_deg: f64, dec_deg: f64) -> (f64, f64) {
    let (ra, dec) = (ra_deg.to_radians(), dec_deg.to_radians());
    let v = [dec.cos() * ra.cos(), dec.cos() * ra.sin(), dec.sin()];

    let g: Vec<f64> = EQUATORIAL_TO_GALACTIC
        .iter()
        .map(|row| row[0] * v[0] + row[1] * v[1] + row[2] * v[2])
        .collect();

    let l = g[1].atan2(g[0]).to_degrees().rem_euclid(360.0);
    let b = g[2].clamp(-1.0, 1.0).asin().to_degrees();
    (l, b)
}

/// Position of the offset pointing belonging to a field at `(ra, dec)`.
pub fn offset_position(ra_deg: f64, dec_deg: f64) -> (f64, f64) {
    let ra = ra_deg + OFFSET_DEG / dec_deg.to_radians().cos();
    (ra.rem_euclid(360.0), dec_deg + OFFSET_DEG)
}

/// A nominal pointing of the survey planner.
#[derive(Debug, Clone, PartialEq)]
pub struct PlannerPointing {
    pub name: String,
    pub ra: f64,
    pub dec: f64,
}

impl PlannerPointing {
    /// Field number of the pointing; planner names look like `intphas_0001`
    /// but a bare number is accepted too.
    pub fn field_number(&self) -> Option<u32> {
        FieldId::from_object_name(&self.name)
            .or_else(|| self.name.trim().parse().ok())
            .filter(|f| !f.is_offset())
            .map(|f| f.number())
    }
}

/// Reads planner pointings from a CSV file with `name`, `ra` and `dec` columns.
pub fn read_planner_csv(path: &Path) -> Result<Vec<PlannerPointing>> {
    let df = csv_parser::read_csv_as_text(path)?;
    let names = df.column("name")?.str()?;
    let ras = df.column("ra")?.str()?;
    let decs = df.column("dec")?.str()?;

    let mut pointings = Vec::with_capacity(df.height());
    for i in 0..df.height() {
        let name = names
            .get(i)
            .with_context(|| format!("Missing name at row {}", i))?;
        let ra: f64 = ras
            .get(i)
            .with_context(|| format!("Missing ra at row {}", i))?
            .trim()
            .parse()
            .with_context(|| format!("Invalid ra at row {}", i))?;
        let dec: f64 = decs
            .get(i)
            .with_context(|| format!("Missing dec at row {}", i))?
            .trim()
            .parse()
            .with_context(|| format!("Invalid dec at row {}", i))?;

        pointings.push(PlannerPointing {
            name: name.trim().to_string(),
            ra,
            dec,
        });
    }

    Ok(pointings)
}

/// Coordinates of every field pointing, plain and offset.
#[derive(Debug, Clone, Default)]
pub struct CoordinateCatalog {
    rows: Vec<FieldCoordinates>,
    index: HashMap<FieldId, usize>,
}

impl CoordinateCatalog {
    pub fn from_rows(rows: Vec<FieldCoordinates>) -> Self {
        let index = rows
            .iter()
            .enumerate()
            .map(|(i, row)| (row.field, i))
            .collect();
        Self { rows, index }
    }

    /// Builds the catalog from planner pointings: each pointing yields the
    /// plain field and its offset companion.
    pub fn from_planner(pointings: &[PlannerPointing]) -> Self {
        let mut rows = Vec::with_capacity(pointings.len() * 2);
        for pointing in pointings {
            let Some(number) = pointing.field_number() else {
                log::warn!("Planner entry '{}' is not a field", pointing.name);
                continue;
            };

            let (l, b) = equatorial_to_galactic(pointing.ra, pointing.dec);
            rows.push(FieldCoordinates {
                field: FieldId::plain(number),
                ra: pointing.ra,
                dec: pointing.dec,
                l,
                b,
            });

            let (ra, dec) = offset_position(pointing.ra, pointing.dec);
            let (l, b) = equatorial_to_galactic(ra, dec);
            rows.push(FieldCoordinates {
                field: FieldId::offset(number),
                ra,
                dec,
                l,
                b,
            });
        }
        Self::from_rows(rows)
    }

    pub fn from_csv(path: &Path) -> Result<Self> {
        let rows = csv_parser::read_coordinates_csv(path)?;
        log::info!("Loaded {} field coordinates from {}", rows.len(), path.display());
        Ok(Self::from_rows(rows))
    }

    pub fn get(&self, field: FieldId) -> Option<&FieldCoordinates> {
        self.index.get(&field).map(|&i| &self.rows[i])
    }

    pub fn rows(&self) -> &[FieldCoordinates] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Counters of one enrichment pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnrichmentStats {
    pub enriched: usize,
    pub missing: usize,
}

/// Enricher adding catalog coordinates to field aggregates
pub struct FieldEnricher {
    catalog: CoordinateCatalog,
}

impl FieldEnricher {
    pub fn new(catalog: CoordinateCatalog) -> Self {
        Self { catalog }
    }

    /// Create an enricher from a coordinate table
    pub fn with_coordinates_file(path: &Path) -> Result<Self> {
        let catalog = CoordinateCatalog::from_csv(path)
            .with_context(|| format!("Failed to load coordinates: {}", path.display()))?;
        Ok(Self::new(catalog))
    }

    pub fn catalog(&self) -> &CoordinateCatalog {
        &self.catalog
    }

    /// Sets `ra`, `dec`, `l` and `b` on every aggregate found in the catalog.
    pub fn enrich(&self, aggregates: &mut [FieldAggregate]) -> EnrichmentStats {
        let mut stats = EnrichmentStats::default();
        for aggregate in aggregates.iter_mut() {
            match self.catalog.get(aggregate.field) {
                Some(coords) => {
                    aggregate.ra = Some(coords.ra);
                    aggregate.dec = Some(coords.dec);
                    aggregate.l = Some(coords.l);
                    aggregate.b = Some(coords.b);
                    stats.enriched += 1;
                }
                None => {
                    log::debug!("Field {} not in coordinate catalog", aggregate.field);
                    stats.missing += 1;
                }
            }
        }

        if stats.missing > 0 {
            log::warn!("{} fields have no catalog coordinates", stats.missing);
        }
        stats
    }
}
