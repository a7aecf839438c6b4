//! Todo files split by right-ascension hour.
//!
//! The telescope queue takes one file per RA hour, `fields.todo.HHh`, plus
//! `fields.done` listing every field that must not be observed. The two
//! pointings of a catalog position always land in the same file so they are
//! observed back to back.

use anyhow::{bail, Context, Result};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};

use crate::core::domain::FieldId;
use crate::parsing::field_list;
use crate::planning::catalog::FieldCatalog;
use crate::preprocessing::enricher::CoordinateCatalog;

/// Default RA hours of the observing season, in queue order.
pub const DEFAULT_RA_BINS: [u32; 14] = [18, 19, 20, 21, 22, 23, 0, 1, 2, 3, 4, 5, 6, 7];

pub const DONE_FILE: &str = "fields.done";

/// Name of the todo file for an RA hour.
pub fn todo_file_name(hour: u32) -> String {
    format!("fields.todo.{:02}h", hour)
}

/// RA hour bin of a right ascension in degrees.
pub fn ra_bin(ra_deg: f64) -> u32 {
    ((ra_deg.rem_euclid(360.0) / 15.0).floor() as u32) % 24
}

/// Fields assigned to RA bins, plus the ones that could not be placed.
#[derive(Debug, Clone, Default)]
pub struct RaBinPlan {
    order: Vec<u32>,
    bins: BTreeMap<u32, Vec<FieldId>>,
    /// Todo fields whose bin is not among the configured ones.
    pub unbinned: Vec<FieldId>,
    /// Todo fields absent from the coordinate catalog.
    pub missing_coordinates: Vec<FieldId>,
    /// Todo fields skipped because they were observed recently.
    pub skipped_recent: usize,
    planned: HashSet<FieldId>,
}

impl RaBinPlan {
    /// Fields of one bin in insertion order.
    pub fn bin(&self, hour: u32) -> &[FieldId] {
        self.bins.get(&hour).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Configured bins in queue order with their fields.
    pub fn bins(&self) -> impl Iterator<Item = (u32, &[FieldId])> {
        self.order.iter().map(move |hour| (*hour, self.bin(*hour)))
    }

    pub fn binned_count(&self) -> usize {
        self.bins.values().map(Vec::len).sum()
    }

    /// Fields that need observing but are in no todo file.
    pub fn unplaced_count(&self) -> usize {
        self.unbinned.len() + self.missing_coordinates.len()
    }

    fn is_planned(&self, field: &FieldId) -> bool {
        self.planned.contains(field)
    }
}

/// Counts of a written set of RA-binned files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RaBinReport {
    pub todo: usize,
    pub done: usize,
    pub unplaced: usize,
    pub files: Vec<PathBuf>,
}

/// Assigns todo fields to RA bins.
///
/// # Examples
///
/// ```
/// use uvex_qc::core::domain::{FieldCoordinates, FieldId};
/// use uvex_qc::planning::ra_bins::RaBinPlanner;
/// use uvex_qc::preprocessing::enricher::CoordinateCatalog;
///
/// let coords = CoordinateCatalog::from_rows(vec![FieldCoordinates {
///     field: FieldId::plain(1), ra: 280.0, dec: 0.0, l: 0.0, b: 0.0,
/// }]);
/// let mut planner = RaBinPlanner::new(&coords);
/// planner.add_fields(&[FieldId::plain(1)]);
///
/// assert_eq!(planner.plan().bin(18), &[FieldId::plain(1)]);
/// ```
pub struct RaBinPlanner<'a> {
    coordinates: &'a CoordinateCatalog,
    recently_observed: HashSet<FieldId>,
    assignments: HashMap<u32, u32>,
    plan: RaBinPlan,
}

impl<'a> RaBinPlanner<'a> {
    pub fn new(coordinates: &'a CoordinateCatalog) -> Self {
        Self::with_bins(coordinates, &DEFAULT_RA_BINS)
    }

    pub fn with_bins(coordinates: &'a CoordinateCatalog, bins: &[u32]) -> Self {
        let mut order = Vec::with_capacity(bins.len());
        for hour in bins {
            if !order.contains(hour) {
                order.push(*hour);
            }
        }
        let plan = RaBinPlan {
            bins: order.iter().map(|h| (*h, Vec::new())).collect(),
            order,
            ..Default::default()
        };

        Self {
            coordinates,
            recently_observed: HashSet::new(),
            assignments: HashMap::new(),
            plan,
        }
    }

    /// Fields observed after the quality data was compiled; never queued.
    pub fn with_recently_observed(mut self, fields: &[FieldId]) -> Self {
        self.recently_observed = fields.iter().copied().collect();
        self
    }

    pub fn add_fields(&mut self, fields: &[FieldId]) {
        for field in fields {
            self.add_field(*field);
        }
    }

    /// Queues one field in the bin of its catalog position.
    pub fn add_field(&mut self, field: FieldId) {
        if self.plan.is_planned(&field) {
            return;
        }

        let hour = match self.assignments.get(&field.number()) {
            Some(hour) => *hour,
            None => match self.coordinates.get(field) {
                Some(coords) => {
                    let hour = ra_bin(coords.ra);
                    self.assignments.insert(field.number(), hour);
                    hour
                }
                None => {
                    log::warn!("Field {} has no coordinates; not queued", field);
                    self.plan.missing_coordinates.push(field);
                    self.plan.planned.insert(field);
                    return;
                }
            },
        };

        if self.recently_observed.contains(&field) {
            self.plan.skipped_recent += 1;
            return;
        }

        match self.plan.bins.get_mut(&hour) {
            Some(bin) => bin.push(field),
            None => {
                log::warn!("Field {} falls in unscheduled RA bin {:02}h", field, hour);
                self.plan.unbinned.push(field);
            }
        }
        self.plan.planned.insert(field);
    }

    pub fn plan(&self) -> &RaBinPlan {
        &self.plan
    }

    /// Writes one todo file per configured bin and `fields.done`, then
    /// re-reads them to check every catalog field is accounted for.
    pub fn write_files(&self, catalog: &FieldCatalog, directory: &Path) -> Result<RaBinReport> {
        std::fs::create_dir_all(directory)
            .with_context(|| format!("Failed to create directory: {}", directory.display()))?;

        let mut files = Vec::new();
        for (hour, fields) in self.plan.bins() {
            let path = directory.join(todo_file_name(hour));
            field_list::write_field_list(fields, &path)?;
            log::info!("{:02}h: {} fields", hour, fields.len());
            files.push(path);
        }

        let done: Vec<FieldId> = catalog
            .iter()
            .filter(|field| !self.plan.is_planned(field))
            .collect();
        let done_path = directory.join(DONE_FILE);
        field_list::write_field_list(&done, &done_path)?;
        files.push(done_path.clone());

        let report = RaBinReport {
            todo: self.plan.binned_count(),
            done: done.len(),
            unplaced: self.plan.unplaced_count(),
            files,
        };
        self.check_written(catalog, directory, &report)?;
        Ok(report)
    }

    fn check_written(
        &self,
        catalog: &FieldCatalog,
        directory: &Path,
        report: &RaBinReport,
    ) -> Result<()> {
        let mut n_todo = 0;
        for (hour, _) in self.plan.bins() {
            n_todo += field_list::read_field_list(&directory.join(todo_file_name(hour)))?.len();
        }
        let n_done = field_list::read_field_list(&directory.join(DONE_FILE))?.len();

        let total = n_todo + n_done + report.unplaced;
        if total != catalog.len() {
            bail!(
                "Todo files cover {} fields ({} todo, {} done, {} unplaced), expected {}",
                total,
                n_todo,
                n_done,
                report.unplaced,
                catalog.len()
            );
        }
        if report.unplaced > 0 {
            log::warn!(
                "{} todo fields are in no RA bin file",
                report.unplaced
            );
        }
        Ok(())
    }
}
