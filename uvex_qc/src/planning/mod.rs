//! Observation planning: which catalog fields still need observing, and in
//! which RA hour they should be queued.

pub mod catalog;
pub mod ra_bins;
pub mod todo;

pub use catalog::FieldCatalog;
pub use ra_bins::{RaBinPlan, RaBinPlanner, RaBinReport};
pub use todo::{TodoBuilder, TodoLists};
