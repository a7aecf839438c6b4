pub mod aggregator;
pub mod enricher;
pub mod pipeline;
pub mod validator;

pub use aggregator::{AggregationResult, AggregationStats, AggregatorConfig, FieldAggregator};
pub use enricher::{CoordinateCatalog, FieldEnricher};
pub use pipeline::{build_field_table, ExposureSource, FieldPipeline, PipelineConfig, PipelineResult};
pub use validator::{ExposureValidator, ValidationResult, ValidationStats};
