//! Unified error hierarchy for readyrs
//!
//! Provides structured error information for every pipeline stage, with
//! severity classification and user-facing messages for the CLI.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for all readyrs operations
#[derive(Debug, Error)]
pub enum ReadyRsError {
    /// Record source errors
    #[error("Source error: {0}")]
    Source(#[from] SourceError),

    /// Malformed input records
    #[error("Ingest error: {0}")]
    Ingest(#[from] IngestError),

    /// Analytics calculation errors
    #[error("Calculation error: {0}")]
    Calculation(#[from] CalculationError),

    /// Table persistence errors
    #[error("Import/Export error: {0}")]
    ImportExport(#[from] ImportExportError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A pipeline stage failed
    #[error("{stage} {}", .source.detail())]
    Stage {
        stage: PipelineStage,
        #[source]
        source: Box<ReadyRsError>,
    },
}

/// Pipeline stages, used to report where a run failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    Ingest,
    Merge,
    Features,
    Baseline,
    Anomaly,
    Forecast,
    Export,
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineStage::Ingest => "ingest",
            PipelineStage::Merge => "merge",
            PipelineStage::Features => "features",
            PipelineStage::Baseline => "baseline",
            PipelineStage::Anomaly => "anomaly",
            PipelineStage::Forecast => "forecast",
            PipelineStage::Export => "export",
        };
        write!(f, "{}", name)
    }
}

/// Errors raised while reading records from a source
#[derive(Debug, Error)]
pub enum SourceError {
    /// Source directory does not exist
    #[error("Source directory not found: {path}")]
    DirectoryNotFound { path: PathBuf },

    /// File could not be decoded as JSON
    #[error("Invalid JSON in {path}: {reason}")]
    InvalidJson { path: PathBuf, reason: String },

    /// JSON document had an unexpected top-level shape
    #[error("Unexpected shape for {family} records: {reason}")]
    UnexpectedShape { family: String, reason: String },

    /// Synthetic generator parameters were rejected
    #[error("Synthetic generator error: {reason}")]
    Generator { reason: String },
}

/// Per-record ingest errors
#[derive(Debug, Clone, PartialEq, Error)]
pub enum IngestError {
    /// Record carries no date field
    #[error("record has no date field")]
    MissingDate,

    /// Date field could not be parsed
    #[error("invalid date value {value:?} in field {field}")]
    InvalidDate { field: String, value: String },

    /// Record is not a JSON object
    #[error("record is not an object")]
    NotAnObject,
}

/// Analytics calculation errors
#[derive(Debug, Error)]
pub enum CalculationError {
    /// Not enough usable rows to fit a model
    #[error("training aborted: only {usable} usable rows, minimum is {minimum}")]
    InsufficientTrainingData { usable: usize, minimum: usize },

    /// Chronological split left nothing to evaluate on
    #[error("evaluation aborted: held-out partition is empty ({usable} usable rows)")]
    EmptyHoldout { usable: usize },

    /// Referenced column is absent from the table
    #[error("unknown column: {column}")]
    UnknownColumn { column: String },

    /// Invalid parameter
    #[error("invalid parameter for {calculation}: {parameter}={value}")]
    InvalidParameter {
        calculation: String,
        parameter: String,
        value: String,
    },
}

/// Table import and export errors
#[derive(Debug, Error)]
pub enum ImportExportError {
    /// CSV reader or writer failure
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Serialization failure
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Persisted table is missing a required column
    #[error("Missing required column: {column}")]
    MissingColumn { column: String },

    /// Cell could not be parsed
    #[error("Parse error at row {row}: {reason}")]
    ParseError { row: usize, reason: String },
}

/// Result type alias for readyrs operations
pub type Result<T> = std::result::Result<T, ReadyRsError>;

impl ReadyRsError {
    /// Wrap an error with the stage it occurred in
    pub fn in_stage(self, stage: PipelineStage) -> Self {
        match self {
            already @ ReadyRsError::Stage { .. } => already,
            other => ReadyRsError::Stage {
                stage,
                source: Box::new(other),
            },
        }
    }

    /// Message without the category prefix
    pub fn detail(&self) -> String {
        match self {
            ReadyRsError::Source(e) => e.to_string(),
            ReadyRsError::Ingest(e) => e.to_string(),
            ReadyRsError::Calculation(e) => e.to_string(),
            ReadyRsError::ImportExport(e) => e.to_string(),
            ReadyRsError::Configuration(msg) => msg.clone(),
            ReadyRsError::Io(e) => e.to_string(),
            ReadyRsError::Stage { .. } => self.to_string(),
        }
    }

    /// Stage that failed, if known
    pub fn stage(&self) -> Option<PipelineStage> {
        match self {
            ReadyRsError::Stage { stage, .. } => Some(*stage),
            _ => None,
        }
    }

    /// Get error severity level
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            ReadyRsError::Stage { source, .. } => source.severity(),
            ReadyRsError::Ingest(_) => ErrorSeverity::Warning,
            ReadyRsError::Source(SourceError::DirectoryNotFound { .. }) => ErrorSeverity::Warning,
            ReadyRsError::Calculation(CalculationError::InsufficientTrainingData { .. })
            | ReadyRsError::Calculation(CalculationError::EmptyHoldout { .. }) => {
                ErrorSeverity::Error
            }
            ReadyRsError::Configuration(_) => ErrorSeverity::Error,
            ReadyRsError::Io(_) => ErrorSeverity::Critical,
            _ => ErrorSeverity::Error,
        }
    }

    /// Get user-friendly error message
    pub fn user_message(&self) -> String {
        match self {
            ReadyRsError::Stage { stage, source } => match source.as_ref() {
                ReadyRsError::Calculation(
                    CalculationError::InsufficientTrainingData { usable, minimum },
                ) => format!(
                    "{} training aborted: only {} usable rows, minimum is {}. Collect more days of data or lower min_training_rows.",
                    stage, usable, minimum
                ),
                inner => format!("{} stage failed: {}", stage, inner.user_message()),
            },
            ReadyRsError::Source(SourceError::DirectoryNotFound { path }) => {
                format!(
                    "Could not find raw data directory: {}. Run `readyrs generate` to create synthetic data.",
                    path.display()
                )
            }
            _ => self.to_string(),
        }
    }
}

/// Error severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    /// Critical system error requiring immediate attention
    Critical,
    /// Error that prevents operation but system can continue
    Error,
    /// Warning that doesn't prevent operation
    Warning,
}

impl ErrorSeverity {
    /// Convert to tracing level
    pub fn to_tracing_level(&self) -> tracing::Level {
        match self {
            ErrorSeverity::Critical => tracing::Level::ERROR,
            ErrorSeverity::Error => tracing::Level::ERROR,
            ErrorSeverity::Warning => tracing::Level::WARN,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_message_names_stage_and_reason() {
        let err = ReadyRsError::from(CalculationError::InsufficientTrainingData {
            usable: 6,
            minimum: 10,
        })
        .in_stage(PipelineStage::Forecast);

        assert_eq!(
            err.to_string(),
            "forecast training aborted: only 6 usable rows, minimum is 10"
        );
        assert_eq!(err.stage(), Some(PipelineStage::Forecast));
    }

    #[test]
    fn test_in_stage_does_not_double_wrap() {
        let err = ReadyRsError::Configuration("bad".to_string())
            .in_stage(PipelineStage::Features)
            .in_stage(PipelineStage::Forecast);
        assert_eq!(err.stage(), Some(PipelineStage::Features));
    }

    #[test]
    fn test_error_severity() {
        let err = ReadyRsError::Ingest(IngestError::MissingDate);
        assert_eq!(err.severity(), ErrorSeverity::Warning);

        let err = ReadyRsError::Io(std::io::Error::new(std::io::ErrorKind::Other, "disk"));
        assert_eq!(err.severity(), ErrorSeverity::Critical);
        assert_eq!(err.severity().to_tracing_level(), tracing::Level::ERROR);

        let err = ReadyRsError::Source(SourceError::DirectoryNotFound {
            path: PathBuf::from("data/raw"),
        })
        .in_stage(PipelineStage::Ingest);
        assert_eq!(err.severity().to_tracing_level(), tracing::Level::WARN);
    }

    #[test]
    fn test_user_messages() {
        let err = ReadyRsError::Source(SourceError::DirectoryNotFound {
            path: PathBuf::from("data/raw"),
        });
        assert!(err.user_message().contains("Could not find"));

        let err = ReadyRsError::from(CalculationError::InsufficientTrainingData {
            usable: 3,
            minimum: 10,
        })
        .in_stage(PipelineStage::Forecast);
        assert!(err.user_message().contains("only 3 usable rows"));
    }
}
