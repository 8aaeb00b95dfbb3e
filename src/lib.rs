// Library interface for readyrs
// The binary and the integration tests both build on these modules

pub mod anomaly;
pub mod baseline;
pub mod config;
pub mod error;
pub mod export;
pub mod features;
pub mod flatten;
pub mod forecast;
pub mod logging;
pub mod merge;
pub mod models;
pub mod pipeline;
pub mod source;

// Re-export commonly used types for convenience
pub use anomaly::{AnomalyConfig, AnomalyDetector};
pub use baseline::{BaselineCalculator, BaselineSet};
pub use config::AppConfig;
pub use error::{PipelineStage, ReadyRsError, Result};
pub use features::{FeatureConfig, FeatureEngineer};
pub use flatten::{FlattenBatch, Flattener};
pub use forecast::{
    ForecastConfig, ForecastMetrics, ForecastResult, Forecaster, RandomForestRegressor, Regressor,
};
pub use logging::{LogConfig, LogFormat, LogLevel, RunDiagnostics};
pub use merge::{merge_families, Merger};
pub use models::*;
pub use pipeline::{AnalyticsReport, Pipeline, PipelineConfig};
pub use source::{JsonDirSource, RecordSource, SyntheticSource};
