//! Threshold anomaly detection against personal baselines

use crate::baseline::BaselineSet;
use crate::error::{CalculationError, Result};
use crate::models::{AnomalyFlag, UnifiedTable};
use serde::{Deserialize, Serialize};

/// Anomaly detection configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnomalyConfig {
    /// Absolute deviation, in standard deviations, above which a day is flagged
    pub threshold_std: f64,

    /// Metrics to check; every metric with a baseline when `None`
    pub metrics: Option<Vec<String>>,
}

impl Default for AnomalyConfig {
    fn default() -> Self {
        Self {
            threshold_std: 2.0,
            metrics: None,
        }
    }
}

impl AnomalyConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.threshold_std.is_finite() && self.threshold_std > 0.0) {
            return Err(CalculationError::InvalidParameter {
                calculation: "anomaly".to_string(),
                parameter: "threshold_std".to_string(),
                value: self.threshold_std.to_string(),
            }
            .into());
        }
        Ok(())
    }
}

/// Flags days whose metric values deviate from the personal baseline
pub struct AnomalyDetector {
    config: AnomalyConfig,
}

impl AnomalyDetector {
    pub fn new() -> Self {
        Self::with_config(AnomalyConfig::default())
    }

    pub fn with_config(config: AnomalyConfig) -> Self {
        Self { config }
    }

    /// Emit one flag per (date, metric) outside the threshold, ordered by date.
    ///
    /// Metrics with a zero standard deviation are skipped.
    pub fn detect(&self, table: &UnifiedTable, baselines: &BaselineSet) -> Result<Vec<AnomalyFlag>> {
        self.config.validate()?;

        let metrics: Vec<&str> = match &self.config.metrics {
            Some(list) => list.iter().map(String::as_str).collect(),
            None => baselines.keys().map(String::as_str).collect(),
        };

        let mut checked = Vec::new();
        for metric in metrics {
            let Some(baseline) = baselines.get(metric) else {
                tracing::debug!(metric, "No baseline, skipping anomaly check");
                continue;
            };
            if baseline.std_dev == 0.0 || !baseline.std_dev.is_finite() {
                tracing::debug!(metric, "Constant metric, skipping anomaly check");
                continue;
            }
            let Some(idx) = table.column_index(metric) else {
                continue;
            };
            checked.push((idx, baseline));
        }

        let mut flags = Vec::new();
        for row in &table.rows {
            for (idx, baseline) in &checked {
                let Some(value) = row.values[*idx]
                    .as_ref()
                    .and_then(|v| v.as_f64())
                    .filter(|v| v.is_finite())
                else {
                    continue;
                };
                let deviation = (value - baseline.mean) / baseline.std_dev;
                if deviation.abs() > self.config.threshold_std {
                    flags.push(AnomalyFlag {
                        date: row.date,
                        metric: baseline.metric.clone(),
                        value,
                        baseline_mean: baseline.mean,
                        baseline_std: baseline.std_dev,
                        deviation,
                    });
                }
            }
        }

        tracing::info!(
            flags = flags.len(),
            threshold = self.config.threshold_std,
            "Anomaly detection complete"
        );
        Ok(flags)
    }
}

impl Default for AnomalyDetector {
    fn default() -> Self {
        Self::new()
    }
}
