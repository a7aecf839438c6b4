//! Core domain models for survey quality control.
//!
//! This module defines the fundamental data structures used throughout the crate,
//! representing filter bands, exposures and per-field aggregates.

pub mod domain;

pub use domain::{
    Band, BandMetrics, ExposureRecord, FieldAggregate, FieldCoordinates, FieldId, RunNumber,
};
