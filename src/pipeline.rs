//! End-to-end pipeline orchestration
//!
//! Stages run in a fixed order: ingest, merge, features, baselines,
//! anomalies, forecast. Every stage failure is wrapped with the stage name
//! and recorded in the run diagnostics before it is returned.

use crate::anomaly::{AnomalyConfig, AnomalyDetector};
use crate::baseline::{BaselineCalculator, BaselineSet};
use crate::error::{PipelineStage, ReadyRsError, Result};
use crate::features::{FeatureConfig, FeatureEngineer};
use crate::flatten::{FlattenBatch, Flattener};
use crate::forecast::{
    ForecastConfig, ForecastMetrics, ForecastResult, Forecaster, Prediction,
};
use crate::logging::RunDiagnostics;
use crate::merge::Merger;
use crate::models::{AnomalyFlag, FeatureTable, MetricFamily, UnifiedTable};
use crate::source::RecordSource;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Instant;

/// Every tunable of the analytics stages
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub features: FeatureConfig,
    pub anomaly: AnomalyConfig,
    pub forecast: ForecastConfig,
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<()> {
        self.features.validate()?;
        self.anomaly.validate()?;
        self.forecast.validate()?;
        Ok(())
    }
}

/// Inclusive date span of a table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

/// Forecast outcome without the fitted model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastSummary {
    pub target: Option<String>,
    pub metrics: ForecastMetrics,
    pub train_rows: usize,
    pub test_rows: usize,
    pub split_date: NaiveDate,
    pub training_window: (NaiveDate, NaiveDate),
    /// Feature name and normalized importance, most important first
    pub feature_importances: Vec<(String, f64)>,
    pub predictions: Vec<Prediction>,
}

impl ForecastSummary {
    pub fn from_result<M>(result: &ForecastResult<M>, target: Option<String>) -> Self {
        let mut feature_importances: Vec<(String, f64)> = result
            .feature_columns
            .iter()
            .cloned()
            .zip(result.feature_importances.iter().copied())
            .collect();
        feature_importances.sort_by(|a, b| b.1.total_cmp(&a.1));

        Self {
            target,
            metrics: result.metrics,
            train_rows: result.train_rows,
            test_rows: result.test_rows,
            split_date: result.split_date,
            training_window: result.training_window,
            feature_importances,
            predictions: result.predictions.clone(),
        }
    }
}

/// Serializable analytics outputs of one run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyticsReport {
    pub generated_at: DateTime<Utc>,
    pub rows: usize,
    pub date_range: Option<DateRange>,
    pub baselines: BaselineSet,
    pub anomalies: Vec<AnomalyFlag>,
    pub forecast: Option<ForecastSummary>,
}

/// Merged table plus per-family ingest counts
#[derive(Debug, Clone)]
pub struct ProcessedData {
    pub table: UnifiedTable,
    pub records: BTreeMap<MetricFamily, usize>,
    pub rejected: BTreeMap<MetricFamily, usize>,
    pub duplicates: usize,
}

/// Everything the analytics stages produce
#[derive(Debug, Clone)]
pub struct Analysis {
    pub features: FeatureTable,
    pub forecast: Option<ForecastResult>,
    pub report: AnalyticsReport,
}

/// Runs the stages with one configuration and collects diagnostics
pub struct Pipeline {
    config: PipelineConfig,
    diagnostics: RunDiagnostics,
    started: Instant,
}

fn run_stage<T>(
    diagnostics: &mut RunDiagnostics,
    stage: PipelineStage,
    work: impl FnOnce() -> Result<T>,
    summarize: impl FnOnce(&T) -> (usize, Option<String>),
) -> Result<T> {
    let started = Instant::now();
    match work() {
        Ok(output) => {
            let (rows, detail) = summarize(&output);
            diagnostics.record_stage(stage, started.elapsed(), rows, detail);
            Ok(output)
        }
        Err(err) => {
            let err = err.in_stage(stage);
            tracing::error!(stage = %stage, error = %err, "Stage failed");
            diagnostics.record_failure(stage, started.elapsed(), &err);
            Err(err)
        }
    }
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            diagnostics: RunDiagnostics::new("unknown"),
            started: Instant::now(),
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn diagnostics(&self) -> &RunDiagnostics {
        &self.diagnostics
    }

    /// Close and hand over the run report
    pub fn into_diagnostics(mut self, success: bool) -> RunDiagnostics {
        self.diagnostics.finish(success, self.started.elapsed());
        self.diagnostics
    }

    /// Fetch and flatten every family from `source`
    pub fn ingest(&mut self, source: &dyn RecordSource) -> Result<Vec<(MetricFamily, FlattenBatch)>> {
        self.diagnostics.source = source.name().to_string();
        let flattener = Flattener::new();

        let batches = run_stage(
            &mut self.diagnostics,
            PipelineStage::Ingest,
            || {
                MetricFamily::ALL
                    .into_iter()
                    .map(|family| {
                        let raw = source.fetch(family)?;
                        let batch = flattener.flatten_all(family, &raw);
                        tracing::info!(
                            family = %family,
                            records = batch.records.len(),
                            rejected = batch.rejected,
                            "Family ingested"
                        );
                        Ok((family, batch))
                    })
                    .collect::<Result<Vec<_>>>()
            },
            |batches| {
                let kept = batches.iter().map(|(_, b)| b.records.len()).sum();
                let rejected: usize = batches.iter().map(|(_, b)| b.rejected).sum();
                (kept, Some(format!("{rejected} rejected")))
            },
        )?;

        for (family, batch) in &batches {
            if batch.rejected > 0 {
                self.diagnostics.add_warning(format!(
                    "{} {} records rejected",
                    batch.rejected, family
                ));
            }
        }
        Ok(batches)
    }

    /// Outer-join flattened families into one table
    pub fn merge(&mut self, batches: Vec<(MetricFamily, FlattenBatch)>) -> Result<ProcessedData> {
        let processed = run_stage(
            &mut self.diagnostics,
            PipelineStage::Merge,
            || {
                let mut records = BTreeMap::new();
                let mut rejected = BTreeMap::new();
                let mut merger = Merger::new();
                for (family, batch) in batches {
                    records.insert(family, batch.records.len());
                    rejected.insert(family, batch.rejected);
                    merger.add_family(family, batch.records);
                }
                let duplicates = merger.duplicates();
                let table = merger.finish();

                tracing::info!(
                    rows = table.len(),
                    columns = table.columns.len(),
                    duplicates,
                    "Families merged"
                );
                Ok(ProcessedData {
                    table,
                    records,
                    rejected,
                    duplicates,
                })
            },
            |p| (p.table.len(), Some(format!("{} duplicates", p.duplicates))),
        )?;

        if processed.duplicates > 0 {
            self.diagnostics
                .add_warning(format!("{} duplicate family/date records replaced", processed.duplicates));
        }
        Ok(processed)
    }

    /// Ingest and merge
    pub fn process(&mut self, source: &dyn RecordSource) -> Result<ProcessedData> {
        let batches = self.ingest(source)?;
        self.merge(batches)
    }

    /// Features, baselines, anomalies and, when enabled, the forecast
    pub fn analyze(&mut self, table: &UnifiedTable) -> Result<Analysis> {
        self.config
            .validate()
            .map_err(|e| ReadyRsError::Configuration(e.detail()))?;
        let config = &self.config;

        let features = run_stage(
            &mut self.diagnostics,
            PipelineStage::Features,
            || FeatureEngineer::with_config(config.features.clone()).engineer(table),
            |f| (f.table.len(), Some(format!("{} feature columns", f.feature_columns.len()))),
        )?;

        let baselines = run_stage(
            &mut self.diagnostics,
            PipelineStage::Baseline,
            || {
                let baselines = BaselineCalculator::new().calculate(table);
                tracing::info!(metrics = baselines.len(), "Baselines calculated");
                Ok(baselines)
            },
            |b| (b.len(), None),
        )?;

        let anomalies = run_stage(
            &mut self.diagnostics,
            PipelineStage::Anomaly,
            || AnomalyDetector::with_config(config.anomaly.clone()).detect(table, &baselines),
            |a| (a.len(), None),
        )?;

        let forecast = if config.forecast.enabled {
            Some(run_stage(
                &mut self.diagnostics,
                PipelineStage::Forecast,
                || Forecaster::with_config(config.forecast.clone()).forecast(&features),
                |r| (r.train_rows + r.test_rows, Some(format!("r2={:.3}", r.metrics.r2))),
            )?)
        } else {
            tracing::info!("Forecasting disabled, skipping");
            None
        };

        let report = AnalyticsReport {
            generated_at: Utc::now(),
            rows: table.len(),
            date_range: table
                .date_range()
                .map(|(start, end)| DateRange { start, end }),
            baselines,
            anomalies,
            forecast: forecast
                .as_ref()
                .map(|r| ForecastSummary::from_result(r, features.target_column.clone())),
        };

        Ok(Analysis {
            features,
            forecast,
            report,
        })
    }

    /// Full run from a record source
    pub fn run(&mut self, source: &dyn RecordSource) -> Result<(ProcessedData, Analysis)> {
        let processed = self.process(source)?;
        let analysis = self.analyze(&processed.table)?;
        Ok((processed, analysis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CalculationError;
    use crate::source::SyntheticSource;

    fn source(days: u32) -> SyntheticSource {
        SyntheticSource::ending_on(NaiveDate::from_ymd_opt(2024, 3, 31).unwrap(), days, 42).unwrap()
    }

    fn quick_config() -> PipelineConfig {
        let mut config = PipelineConfig::default();
        config.forecast.forest.n_trees = 10;
        config
    }

    #[test]
    fn test_process_merges_all_families() {
        let mut pipeline = Pipeline::new(quick_config());
        let processed = pipeline.process(&source(30)).unwrap();

        assert_eq!(processed.table.len(), 30);
        assert!(processed.table.has_column("readiness_score"));
        assert!(processed.table.has_column("sleep_contributors_deep_sleep"));
        assert!(processed.table.has_column("heart_rate_bpm_mean"));
        assert_eq!(processed.records[&MetricFamily::HeartRate], 7);
        assert_eq!(processed.duplicates, 0);
        assert_eq!(pipeline.diagnostics().source, "synthetic");
    }

    #[test]
    fn test_full_run_produces_report() {
        let mut pipeline = Pipeline::new(quick_config());
        let (processed, analysis) = pipeline.run(&source(90)).unwrap();

        let report = &analysis.report;
        assert_eq!(report.rows, 90);
        assert!(report.baselines.contains_key("readiness_score"));
        let forecast = report.forecast.as_ref().unwrap();
        assert_eq!(forecast.target.as_deref(), Some("target_readiness_score"));
        assert!(forecast.train_rows >= 10);
        assert!(forecast.training_window.1 < forecast.split_date);
        assert!(report
            .anomalies
            .windows(2)
            .all(|w| w[0].date <= w[1].date));
        assert_eq!(analysis.features.table.len(), processed.table.len());

        let diagnostics = pipeline.into_diagnostics(true);
        assert_eq!(diagnostics.stages.len(), 6);
        assert!(diagnostics.stages.iter().all(|s| s.success));
    }

    #[test]
    fn test_short_history_fails_in_forecast_stage() {
        let mut pipeline = Pipeline::new(quick_config());
        let err = pipeline.run(&source(12)).unwrap_err();

        assert_eq!(err.stage(), Some(PipelineStage::Forecast));
        match err {
            ReadyRsError::Stage { source, .. } => assert!(matches!(
                *source,
                ReadyRsError::Calculation(CalculationError::InsufficientTrainingData { .. })
            )),
            other => panic!("unexpected error: {other}"),
        }
        let failed = pipeline.diagnostics().stage(PipelineStage::Forecast).unwrap();
        assert!(!failed.success);
    }

    #[test]
    fn test_disabled_forecast_is_skipped() {
        let mut config = quick_config();
        config.forecast.enabled = false;
        let mut pipeline = Pipeline::new(config);
        let (_, analysis) = pipeline.run(&source(12)).unwrap();

        assert!(analysis.forecast.is_none());
        assert!(analysis.report.forecast.is_none());
    }

    #[test]
    fn test_invalid_config_rejected_before_stages() {
        let mut config = quick_config();
        config.anomaly.threshold_std = -1.0;
        let mut pipeline = Pipeline::new(config);
        let err = pipeline.analyze(&UnifiedTable::default()).unwrap_err();
        assert!(matches!(err, ReadyRsError::Configuration(_)));
    }

    #[test]
    fn test_report_serializes_without_model() {
        let mut pipeline = Pipeline::new(quick_config());
        let (_, analysis) = pipeline.run(&source(60)).unwrap();
        let json = serde_json::to_value(&analysis.report).unwrap();

        assert!(json["forecast"]["metrics"]["rmse"].is_number());
        assert!(json["forecast"].get("model").is_none());
        assert!(json["date_range"]["start"].is_string());
    }
}
