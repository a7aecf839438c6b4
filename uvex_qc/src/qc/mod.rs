//! Quality control: named threshold policies and the filter applying them.
//!
//! - [`policy`]: threshold, limit and policy definitions plus the built-in set
//! - [`filter`]: per-field evaluation into accepted or rejected with a reason

pub mod filter;
pub mod policy;

#[cfg(test)]
mod filter_tests;

pub use filter::{QcSummary, QualityFilter, RejectReason, Verdict};
pub use policy::{AcceptOverride, Limits, PolicySet, QualityPolicy, Threshold};
