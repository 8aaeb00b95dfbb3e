use crate::error::{ImportExportError, Result};
use crate::pipeline::AnalyticsReport;
use std::io::Write;
use std::path::Path;

/// Export any serializable data structure to pretty JSON
pub fn export_json<T, P>(data: &T, output_path: P) -> Result<()>
where
    T: serde::Serialize,
    P: AsRef<Path>,
{
    let json_data = serde_json::to_string_pretty(data).map_err(ImportExportError::from)?;

    if let Some(parent) = output_path.as_ref().parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut file = std::fs::File::create(output_path)?;
    file.write_all(json_data.as_bytes())?;

    Ok(())
}

/// Load a report written by [`export_json`]
pub fn load_report<P: AsRef<Path>>(input_path: P) -> Result<AnalyticsReport> {
    let content = std::fs::read_to_string(input_path)?;
    let report = serde_json::from_str(&content).map_err(ImportExportError::from)?;
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::baseline::BaselineSet;
    use crate::models::Baseline;
    use chrono::Utc;
    use tempfile::NamedTempFile;

    #[test]
    fn test_report_round_trips() {
        let mut baselines = BaselineSet::new();
        baselines.insert(
            "readiness_score".to_string(),
            Baseline {
                metric: "readiness_score".to_string(),
                mean: 74.5,
                median: 75.0,
                std_dev: 6.2,
                count: 90,
            },
        );
        let report = AnalyticsReport {
            generated_at: Utc::now(),
            rows: 90,
            date_range: None,
            baselines,
            anomalies: Vec::new(),
            forecast: None,
        };

        let temp_file = NamedTempFile::new().unwrap();
        export_json(&report, temp_file.path()).unwrap();

        let content = std::fs::read_to_string(temp_file.path()).unwrap();
        assert!(content.contains("\"readiness_score\""));
        assert!(content.contains("\"forecast\": null"));

        let loaded = load_report(temp_file.path()).unwrap();
        assert_eq!(loaded, report);
    }

    #[test]
    fn test_load_rejects_garbage() {
        let temp_file = NamedTempFile::new().unwrap();
        std::fs::write(temp_file.path(), "[1, 2").unwrap();
        assert!(load_report(temp_file.path()).is_err());
    }
}
