//! TOML configuration: catalog, pipeline, policies, planning, quicklook and
//! image index settings.

pub mod error;
pub mod file;

pub use error::{ConfigError, ConfigResult};
pub use file::{
    CatalogSettings, IndexSettings, PipelineSettings, PlanningSettings, QcConfig, QuicklookSection,
    CONFIG_FILE_NAME,
};
