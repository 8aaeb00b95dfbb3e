//! Structured logging and run diagnostics
//!
//! Console output goes to stderr so tables and JSON written to stdout stay
//! machine-readable. An optional file layer always writes JSON lines.

use crate::error::{PipelineStage, ReadyRsError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Log level (error, warn, info, debug, trace)
    pub level: LogLevel,

    /// Console format (pretty, json, compact)
    pub format: LogFormat,

    /// Log file path; console only when unset
    pub file_path: Option<PathBuf>,

    /// Roll the log file daily
    pub rotation: bool,

    /// Include span information
    pub include_spans: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            format: LogFormat::Pretty,
            file_path: None,
            rotation: true,
            include_spans: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn to_filter(&self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }

    /// Level selected by repeated `-v` flags on top of `self`
    pub fn raised_by(self, verbosity: u8) -> Self {
        match (self, verbosity) {
            (level, 0) => level,
            (LogLevel::Error | LogLevel::Warn | LogLevel::Info, 1) => LogLevel::Debug,
            (LogLevel::Debug, 1) => LogLevel::Debug,
            _ => LogLevel::Trace,
        }
    }
}

impl std::str::FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "error" => Ok(LogLevel::Error),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "info" => Ok(LogLevel::Info),
            "debug" => Ok(LogLevel::Debug),
            "trace" => Ok(LogLevel::Trace),
            _ => Err(format!("Invalid log level: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable output with colors
    Pretty,
    /// One JSON object per event
    Json,
    Compact,
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pretty" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            "compact" => Ok(LogFormat::Compact),
            _ => Err(format!("Invalid log format: {}", s)),
        }
    }
}

/// Install the global subscriber.
///
/// `RUST_LOG` overrides the configured level when set.
pub fn init_logging(config: &LogConfig) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("readyrs={}", config.level.to_filter())));

    let console_layer = match config.format {
        LogFormat::Pretty => fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_line_number(true)
            .with_span_events(if config.include_spans {
                FmtSpan::ENTER | FmtSpan::CLOSE
            } else {
                FmtSpan::NONE
            })
            .boxed(),
        LogFormat::Json => fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_current_span(config.include_spans)
            .with_span_list(config.include_spans)
            .boxed(),
        LogFormat::Compact => fmt::layer()
            .compact()
            .with_writer(std::io::stderr)
            .with_target(true)
            .boxed(),
    };

    let file_layer = match &config.file_path {
        Some(file_path) => {
            let dir = file_path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            fs::create_dir_all(dir)?;

            let layer = fmt::layer()
                .json()
                .with_ansi(false)
                .with_target(true)
                .with_current_span(config.include_spans)
                .with_span_list(config.include_spans);

            if config.rotation {
                let file_name = file_path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .unwrap_or("readyrs.log");
                let appender = tracing_appender::rolling::daily(dir, file_name);
                Some(layer.with_writer(appender).boxed())
            } else {
                let file = fs::OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(file_path)?;
                Some(layer.with_writer(std::sync::Mutex::new(file)).boxed())
            }
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to install log subscriber: {e}"))?;

    tracing::debug!(
        level = ?config.level,
        format = ?config.format,
        file = ?config.file_path,
        "Logging initialized"
    );

    Ok(())
}

/// Timing and size of one completed pipeline stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageRecord {
    pub stage: PipelineStage,

    pub success: bool,

    #[serde(with = "duration_serde")]
    pub duration: Duration,

    /// Rows (or records) the stage produced
    pub rows: usize,

    /// Free-form detail, e.g. rejected record counts or the failure reason
    pub detail: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub message: String,
    pub stage: Option<PipelineStage>,
    pub severity: String,
    pub timestamp: DateTime<Utc>,
}

/// Report of one pipeline run, written next to the outputs on request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunDiagnostics {
    pub started_at: DateTime<Utc>,

    /// Record source the run read from
    pub source: String,

    pub success: bool,

    #[serde(with = "duration_serde")]
    pub duration: Duration,

    pub stages: Vec<StageRecord>,
    pub errors: Vec<ErrorDetail>,
    pub warnings: Vec<String>,
    pub context: Vec<(String, String)>,
    pub version: String,
}

impl RunDiagnostics {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            started_at: Utc::now(),
            source: source.into(),
            success: false,
            duration: Duration::from_secs(0),
            stages: Vec::new(),
            errors: Vec::new(),
            warnings: Vec::new(),
            context: Vec::new(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    pub fn record_stage(
        &mut self,
        stage: PipelineStage,
        duration: Duration,
        rows: usize,
        detail: Option<String>,
    ) {
        tracing::debug!(
            stage = %stage,
            rows,
            elapsed_ms = duration.as_millis() as u64,
            "Stage complete"
        );
        self.stages.push(StageRecord {
            stage,
            success: true,
            duration,
            rows,
            detail,
        });
    }

    /// Record a failed stage together with its error
    pub fn record_failure(&mut self, stage: PipelineStage, duration: Duration, error: &ReadyRsError) {
        self.stages.push(StageRecord {
            stage,
            success: false,
            duration,
            rows: 0,
            detail: Some(error.detail()),
        });
        self.add_error(error);
    }

    pub fn add_error(&mut self, error: &ReadyRsError) {
        self.errors.push(ErrorDetail {
            message: error.to_string(),
            stage: error.stage(),
            severity: format!("{:?}", error.severity()),
            timestamp: Utc::now(),
        });
    }

    pub fn add_warning(&mut self, warning: impl Into<String>) {
        self.warnings.push(warning.into());
    }

    pub fn add_context(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.context.push((key.into(), value.into()));
    }

    /// Close the report with the overall outcome
    pub fn finish(&mut self, success: bool, duration: Duration) {
        self.success = success;
        self.duration = duration;
    }

    pub fn stage(&self, stage: PipelineStage) -> Option<&StageRecord> {
        self.stages.iter().find(|s| s.stage == stage)
    }

    pub fn save_to_file(&self, path: &Path) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        let mut file = fs::File::create(path)?;
        file.write_all(json.as_bytes())?;
        tracing::info!("Run diagnostics saved to {}", path.display());
        Ok(())
    }

    /// Save under the local data directory
    pub fn save_default(&self) -> anyhow::Result<PathBuf> {
        let filename = format!(
            "readyrs_run_{}.json",
            self.started_at.format("%Y%m%d_%H%M%S")
        );

        let dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("readyrs")
            .join("diagnostics");

        fs::create_dir_all(&dir)?;
        let path = dir.join(filename);
        self.save_to_file(&path)?;
        Ok(path)
    }
}

mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
