//! JSON dump directory source
//!
//! Each family lives in `<dir>/<family>.json`, either as a bare array of
//! records or wrapped in the vendor's `{"data": [...]}` envelope.

use super::{heart_rate, RecordSource};
use crate::error::{Result, SourceError};
use crate::models::MetricFamily;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};

/// Reads raw per-family JSON dumps from a directory
#[derive(Debug, Clone)]
pub struct JsonDirSource {
    dir: PathBuf,
    name: String,
}

impl JsonDirSource {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        if !dir.is_dir() {
            return Err(SourceError::DirectoryNotFound { path: dir }.into());
        }
        let name = format!("json:{}", dir.display());
        Ok(Self { dir, name })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn family_path(&self, family: MetricFamily) -> PathBuf {
        family_path(&self.dir, family)
    }
}

fn family_path(dir: &Path, family: MetricFamily) -> PathBuf {
    dir.join(format!("{}.json", family.name()))
}

/// Unwrap a bare array or a `{"data": [...]}` envelope
fn unwrap_records(family: MetricFamily, document: Value) -> Result<Vec<Value>> {
    match document {
        Value::Array(records) => Ok(records),
        Value::Object(mut map) => match map.remove("data") {
            Some(Value::Array(records)) => Ok(records),
            Some(_) => Err(SourceError::UnexpectedShape {
                family: family.to_string(),
                reason: "\"data\" is not an array".to_string(),
            }
            .into()),
            None => Err(SourceError::UnexpectedShape {
                family: family.to_string(),
                reason: "object without a \"data\" array".to_string(),
            }
            .into()),
        },
        _ => Err(SourceError::UnexpectedShape {
            family: family.to_string(),
            reason: "expected an array or an object".to_string(),
        }
        .into()),
    }
}

impl RecordSource for JsonDirSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn fetch(&self, family: MetricFamily) -> Result<Vec<Value>> {
        let path = self.family_path(family);
        if !path.exists() {
            tracing::warn!(family = %family, path = %path.display(), "No dump for family, treating as empty");
            return Ok(Vec::new());
        }

        let content = fs::read_to_string(&path)?;
        let document: Value =
            serde_json::from_str(&content).map_err(|e| SourceError::InvalidJson {
                path: path.clone(),
                reason: e.to_string(),
            })?;

        let records = unwrap_records(family, document)?;
        let records = match family {
            MetricFamily::HeartRate => heart_rate::daily_summaries(records),
            _ => records,
        };

        tracing::info!(family = %family, records = records.len(), "Loaded JSON dump");
        Ok(records)
    }
}

/// Write a family's raw records as `<dir>/<family>.json`
pub fn write_family(dir: &Path, family: MetricFamily, records: &[Value]) -> Result<PathBuf> {
    fs::create_dir_all(dir)?;
    let path = family_path(dir, family);
    let content = serde_json::to_string_pretty(records).map_err(|e| SourceError::InvalidJson {
        path: path.clone(),
        reason: e.to_string(),
    })?;
    fs::write(&path, content)?;
    tracing::debug!(family = %family, path = %path.display(), "Wrote raw dump");
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ReadyRsError;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_missing_directory_rejected() {
        let err = JsonDirSource::new("/definitely/not/here").unwrap_err();
        assert!(matches!(
            err,
            ReadyRsError::Source(SourceError::DirectoryNotFound { .. })
        ));
    }

    #[test]
    fn test_missing_family_is_empty() {
        let dir = TempDir::new().unwrap();
        let source = JsonDirSource::new(dir.path()).unwrap();
        assert!(source.fetch(MetricFamily::Sleep).unwrap().is_empty());
    }

    #[test]
    fn test_envelope_and_bare_array() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("sleep.json"),
            json!({ "data": [{ "day": "2024-01-01", "score": 80 }], "next_token": null }).to_string(),
        )
        .unwrap();
        write_family(
            dir.path(),
            MetricFamily::Activity,
            &[json!({ "day": "2024-01-01", "steps": 9000 })],
        )
        .unwrap();

        let source = JsonDirSource::new(dir.path()).unwrap();
        let sleep = source.fetch(MetricFamily::Sleep).unwrap();
        let activity = source.fetch(MetricFamily::Activity).unwrap();

        assert_eq!(sleep.len(), 1);
        assert_eq!(sleep[0]["score"], 80);
        assert_eq!(activity[0]["steps"], 9000);
    }

    #[test]
    fn test_heart_rate_samples_aggregated_on_read() {
        let dir = TempDir::new().unwrap();
        write_family(
            dir.path(),
            MetricFamily::HeartRate,
            &[
                json!({ "bpm": 60, "source": "awake", "timestamp": "2024-01-01T08:00:00+00:00" }),
                json!({ "bpm": 80, "source": "awake", "timestamp": "2024-01-01T20:00:00+00:00" }),
            ],
        )
        .unwrap();

        let source = JsonDirSource::new(dir.path()).unwrap();
        let records = source.fetch(MetricFamily::HeartRate).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0]["bpm_mean"], 70.0);
    }

    #[test]
    fn test_malformed_json_reported() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("readiness.json"), "{ not json").unwrap();
        let source = JsonDirSource::new(dir.path()).unwrap();
        let err = source.fetch(MetricFamily::Readiness).unwrap_err();
        assert!(err.to_string().contains("Invalid JSON"));
    }

    #[test]
    fn test_scalar_document_rejected() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("sleep.json"), "42").unwrap();
        let source = JsonDirSource::new(dir.path()).unwrap();
        assert!(source.fetch(MetricFamily::Sleep).is_err());
    }
}
