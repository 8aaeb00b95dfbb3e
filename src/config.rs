use anyhow::{bail, Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::logging::LogConfig;
use crate::pipeline::PipelineConfig;

/// Main application configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Configuration metadata
    pub metadata: ConfigMetadata,

    /// Where raw dumps, tables and reports live
    pub data: DataSettings,

    /// Record source selection
    pub source: SourceSettings,

    /// Analytics stage options
    pub pipeline: PipelineConfig,

    /// Logging options
    pub logging: LogConfig,
}

/// Configuration metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigMetadata {
    /// Configuration format version
    pub version: String,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last modification timestamp
    pub updated_at: DateTime<Utc>,
}

/// Data directory layout
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataSettings {
    /// Raw per-family JSON dumps
    pub raw_dir: PathBuf,

    /// Merged table CSV
    pub processed_dir: PathBuf,

    /// Feature table, analytics report and run diagnostics
    pub output_dir: PathBuf,
}

/// Which record source to read from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// Generate deterministic synthetic records
    Synthetic,
    /// Read JSON dumps from `data.raw_dir`
    JsonDir,
}

impl std::str::FromStr for SourceKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "synthetic" => Ok(SourceKind::Synthetic),
            "json_dir" | "json" => Ok(SourceKind::JsonDir),
            _ => Err(format!("Invalid source kind: {}", s)),
        }
    }
}

/// Record source settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceSettings {
    pub kind: SourceKind,

    /// Days of synthetic history
    pub days: u32,

    /// Synthetic generator seed
    pub seed: u64,

    /// Last synthetic day; today when unset
    pub end_date: Option<NaiveDate>,
}

impl Default for AppConfig {
    fn default() -> Self {
        let now = Utc::now();

        AppConfig {
            metadata: ConfigMetadata {
                version: "1.0".to_string(),
                created_at: now,
                updated_at: now,
            },
            data: DataSettings::default(),
            source: SourceSettings::default(),
            pipeline: PipelineConfig::default(),
            logging: LogConfig::default(),
        }
    }
}

impl Default for DataSettings {
    fn default() -> Self {
        DataSettings {
            raw_dir: PathBuf::from("./data/raw"),
            processed_dir: PathBuf::from("./data/processed"),
            output_dir: PathBuf::from("./outputs"),
        }
    }
}

impl Default for SourceSettings {
    fn default() -> Self {
        SourceSettings {
            kind: SourceKind::JsonDir,
            days: 90,
            seed: 42,
            end_date: None,
        }
    }
}

impl SourceSettings {
    /// Configured end date, or today
    pub fn resolved_end_date(&self) -> NaiveDate {
        self.end_date.unwrap_or_else(|| Utc::now().date_naive())
    }
}

/// Configuration management implementation
impl AppConfig {
    /// Load configuration from TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config: AppConfig =
            toml::from_str(&content).with_context(|| "Failed to parse TOML configuration")?;

        Ok(config)
    }

    /// Save configuration to TOML file
    pub fn save_to_file<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        self.metadata.updated_at = Utc::now();

        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let toml_content = toml::to_string_pretty(self)
            .with_context(|| "Failed to serialize configuration to TOML")?;

        fs::write(&path, toml_content)
            .with_context(|| format!("Failed to write config file: {}", path.as_ref().display()))?;

        Ok(())
    }

    /// Get default configuration file path
    pub fn default_config_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".readyrs")
            .join("config.toml")
    }

    /// Load configuration with fallback to defaults
    pub fn load_or_default() -> Self {
        let config_path = Self::default_config_path();

        if !config_path.exists() {
            tracing::debug!(
                path = %config_path.display(),
                "Config file not found, using defaults"
            );
            return Self::default();
        }

        match Self::load_from_file(&config_path) {
            Ok(config) => config,
            Err(err) => {
                tracing::warn!(
                    path = %config_path.display(),
                    error = %err,
                    "Invalid config file, using defaults"
                );
                Self::default()
            }
        }
    }

    /// Save configuration to default location
    pub fn save_default(&mut self) -> Result<()> {
        let config_path = Self::default_config_path();
        self.save_to_file(config_path)
    }

    /// Check every pipeline option and the source settings
    pub fn validate(&self) -> Result<()> {
        self.pipeline
            .validate()
            .map_err(|e| anyhow::anyhow!("invalid pipeline settings: {}", e.detail()))?;
        if self.source.days == 0 {
            bail!("source.days must be at least 1");
        }
        Ok(())
    }

    /// Read a value by dotted path, e.g. `pipeline.anomaly.threshold_std`
    pub fn get_value(&self, key: &str) -> Result<toml::Value> {
        let root = toml::Value::try_from(self).context("Failed to serialize configuration")?;
        let mut current = &root;
        for part in key.split('.') {
            current = current
                .get(part)
                .with_context(|| format!("Unknown configuration key: {}", key))?;
        }
        Ok(current.clone())
    }

    /// Set a value by dotted path. The raw string is parsed as a TOML value
    /// first (numbers, booleans, arrays) and kept as a string otherwise.
    pub fn set_value(&mut self, key: &str, raw: &str) -> Result<()> {
        let mut root = toml::Value::try_from(&*self).context("Failed to serialize configuration")?;

        let parts: Vec<&str> = key.split('.').collect();
        let Some((last, parents)) = parts.split_last() else {
            bail!("Empty configuration key");
        };

        let mut table = root
            .as_table_mut()
            .context("Configuration root is not a table")?;
        for part in parents {
            table = table
                .get_mut(*part)
                .and_then(toml::Value::as_table_mut)
                .with_context(|| format!("Unknown configuration key: {}", key))?;
        }
        if !table.contains_key(*last) && !is_optional_key(key) {
            bail!("Unknown configuration key: {}", key);
        }
        table.insert(last.to_string(), parse_toml_scalar(raw));

        let updated: AppConfig = root
            .try_into()
            .with_context(|| format!("Invalid value for {}: {}", key, raw))?;
        updated.validate()?;
        *self = updated;
        Ok(())
    }
}

/// Keys whose value is omitted from TOML while unset
fn is_optional_key(key: &str) -> bool {
    matches!(
        key,
        "source.end_date" | "logging.file_path" | "pipeline.anomaly.metrics"
    )
}

fn parse_toml_scalar(raw: &str) -> toml::Value {
    let wrapped = format!("v = {}", raw);
    match toml::from_str::<toml::Table>(&wrapped) {
        // dates are stored as strings
        Ok(mut table) => match table.remove("v") {
            Some(toml::Value::Datetime(dt)) => toml::Value::String(dt.to_string()),
            Some(value) => value,
            None => toml::Value::String(raw.to_string()),
        },
        Err(_) => toml::Value::String(raw.to_string()),
    }
}
