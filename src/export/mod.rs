//! Persistence of tables and analytics outputs

use crate::error::{ImportExportError, PipelineStage, Result};
use crate::pipeline::Analysis;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub mod csv;
pub mod json;
pub mod text;

/// Analytics report format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    /// `report.json`
    Json,
    /// `baselines.csv` and `anomalies.csv`
    Csv,
    /// `report.txt`
    Text,
}

impl std::str::FromStr for ExportFormat {
    type Err = ImportExportError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(ExportFormat::Json),
            "csv" => Ok(ExportFormat::Csv),
            "text" | "txt" => Ok(ExportFormat::Text),
            other => Err(ImportExportError::ParseError {
                row: 0,
                reason: format!("unsupported export format: {}", other),
            }),
        }
    }
}

pub const FEATURES_FILE: &str = "features.csv";
pub const REPORT_JSON_FILE: &str = "report.json";
pub const REPORT_TEXT_FILE: &str = "report.txt";
pub const BASELINES_FILE: &str = "baselines.csv";
pub const ANOMALIES_FILE: &str = "anomalies.csv";

/// Write the feature table and the report to `dir`; returns the files written
pub fn write_analysis(dir: &Path, analysis: &Analysis, format: ExportFormat) -> Result<Vec<PathBuf>> {
    write_outputs(dir, analysis, format).map_err(|e| e.in_stage(PipelineStage::Export))
}

fn write_outputs(dir: &Path, analysis: &Analysis, format: ExportFormat) -> Result<Vec<PathBuf>> {
    std::fs::create_dir_all(dir)?;
    let mut written = Vec::new();

    let features_path = dir.join(FEATURES_FILE);
    csv::write_table(&analysis.features.table, &features_path)?;
    written.push(features_path);

    let report = &analysis.report;
    match format {
        ExportFormat::Json => {
            let path = dir.join(REPORT_JSON_FILE);
            json::export_json(report, &path)?;
            written.push(path);
        }
        ExportFormat::Csv => {
            let baselines: Vec<_> = report.baselines.values().cloned().collect();
            let path = dir.join(BASELINES_FILE);
            csv::write_records(&baselines, &path)?;
            written.push(path);

            let path = dir.join(ANOMALIES_FILE);
            csv::write_records(&report.anomalies, &path)?;
            written.push(path);
        }
        ExportFormat::Text => {
            let path = dir.join(REPORT_TEXT_FILE);
            std::fs::write(&path, text::render_report(report))?;
            written.push(path);
        }
    }

    tracing::info!(files = written.len(), dir = %dir.display(), "Analytics outputs written");
    Ok(written)
}
