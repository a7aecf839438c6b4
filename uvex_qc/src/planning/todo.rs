//! Todo lists for the next observing season.
//!
//! Every catalog field that is not yet acceptable needs observing: either it
//! was never attempted, or it was attempted and failed quality control.

use anyhow::Result;
use std::collections::HashSet;
use std::path::Path;

use crate::core::domain::FieldId;
use crate::parsing::field_list;
use crate::planning::catalog::FieldCatalog;

/// Classification of the catalog against attempted and acceptable fields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TodoLists {
    /// Catalog fields without any exposure, in catalog order.
    pub never_attempted: Vec<FieldId>,
    /// Catalog fields attempted but not acceptable, in catalog order.
    pub failed: Vec<FieldId>,
    /// Catalog fields attempted and acceptable.
    pub completed: usize,
}

impl TodoLists {
    pub fn todo_count(&self) -> usize {
        self.never_attempted.len() + self.failed.len()
    }

    /// Both lists, never-attempted first.
    pub fn all(&self) -> impl Iterator<Item = &FieldId> {
        self.never_attempted.iter().chain(self.failed.iter())
    }

    /// Writes the two lists, one identifier per line.
    pub fn write(&self, never_attempted: &Path, failed: &Path) -> Result<()> {
        field_list::write_field_list(&self.never_attempted, never_attempted)?;
        field_list::write_field_list(&self.failed, failed)?;
        Ok(())
    }
}

/// Builds [`TodoLists`] for a field catalog.
///
/// # Examples
///
/// ```
/// use uvex_qc::core::domain::FieldId;
/// use uvex_qc::planning::catalog::FieldCatalog;
/// use uvex_qc::planning::todo::TodoBuilder;
///
/// let builder = TodoBuilder::new(FieldCatalog::new(3, false));
/// let lists = builder.build(&[FieldId::plain(1)], &[]);
///
/// assert_eq!(lists.never_attempted, vec![FieldId::plain(2), FieldId::plain(3)]);
/// assert_eq!(lists.failed, vec![FieldId::plain(1)]);
/// ```
#[derive(Debug, Clone, Copy)]
pub struct TodoBuilder {
    catalog: FieldCatalog,
}

impl TodoBuilder {
    pub fn new(catalog: FieldCatalog) -> Self {
        Self { catalog }
    }

    pub fn catalog(&self) -> &FieldCatalog {
        &self.catalog
    }

    /// Classifies every catalog field. Identifiers outside the catalog are
    /// ignored.
    pub fn build(&self, attempted: &[FieldId], acceptable: &[FieldId]) -> TodoLists {
        let attempted: HashSet<FieldId> = attempted.iter().copied().collect();
        let acceptable: HashSet<FieldId> = acceptable.iter().copied().collect();

        let outside = attempted
            .iter()
            .chain(acceptable.iter())
            .filter(|f| !self.catalog.contains(**f))
            .count();
        if outside > 0 {
            log::warn!("Ignoring {} identifiers outside the field catalog", outside);
        }

        let mut lists = TodoLists::default();
        for field in self.catalog.iter() {
            if !attempted.contains(&field) {
                lists.never_attempted.push(field);
            } else if !acceptable.contains(&field) {
                lists.failed.push(field);
            } else {
                lists.completed += 1;
            }
        }

        log::info!(
            "{} fields left to do: {} never attempted, {} failed ({} completed)",
            lists.todo_count(),
            lists.never_attempted.len(),
            lists.failed.len(),
            lists.completed
        );
        lists
    }
}
