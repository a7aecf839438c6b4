//! uvex-qc: quality control and observation planning for the UVEX/IPHAS
//! photometric surveys of the Galactic plane.
//!
//! Data flows one way:
//!
//! 1. [`parsing`] turns CASU quality reports, seeing logs and INT observing
//!    logs into exposure records.
//! 2. [`preprocessing`] aggregates exposures into one record per field and
//!    joins field coordinates.
//! 3. [`qc`] applies a named threshold policy to decide which fields are
//!    acceptable.
//! 4. [`planning`] derives the todo lists for the next season.
//! 5. [`quicklook`] renders colour JPEGs of observed fields with external
//!    tools.

pub mod config;
pub mod core;
pub mod parsing;
pub mod planning;
pub mod preprocessing;
pub mod qc;
pub mod quicklook;
