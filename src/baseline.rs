//! Personal baselines: mean, median and sample standard deviation per metric

use crate::models::{Baseline, UnifiedTable};
use statrs::statistics::{Data, Median, Statistics};
use std::collections::BTreeMap;

/// Immutable set of baselines keyed by metric name
pub type BaselineSet = BTreeMap<String, Baseline>;

/// Computes baselines over the full history of a table
pub struct BaselineCalculator {
    /// Restrict to these metrics; all numeric columns when `None`
    metrics: Option<Vec<String>>,
}

impl BaselineCalculator {
    pub fn new() -> Self {
        Self { metrics: None }
    }

    pub fn for_metrics(metrics: Vec<String>) -> Self {
        Self {
            metrics: Some(metrics),
        }
    }

    /// Baseline for a single series; `None` when no value is finite
    pub fn baseline_of(metric: &str, values: &[Option<f64>]) -> Option<Baseline> {
        let observed: Vec<f64> = values
            .iter()
            .flatten()
            .copied()
            .filter(|v| v.is_finite())
            .collect();
        let first = *observed.first()?;

        let count = observed.len();
        let mean = observed.iter().mean();
        // constant series are exactly zero, not rounding noise
        let std_dev = if count > 1 && observed.iter().any(|&v| v != first) {
            observed.iter().std_dev()
        } else {
            0.0
        };
        let median = Data::new(observed).median();

        Some(Baseline {
            metric: metric.to_string(),
            mean,
            median,
            std_dev,
            count,
        })
    }

    /// Compute baselines for every selected numeric column
    pub fn calculate(&self, table: &UnifiedTable) -> BaselineSet {
        let metrics: Vec<&str> = match &self.metrics {
            Some(list) => list.iter().map(String::as_str).collect(),
            None => table.numeric_columns(),
        };

        let mut baselines = BaselineSet::new();
        for metric in metrics {
            let Some(values) = table.numeric_column(metric) else {
                tracing::warn!(metric, "Baseline metric not in table");
                continue;
            };
            match Self::baseline_of(metric, &values) {
                Some(baseline) => {
                    baselines.insert(metric.to_string(), baseline);
                }
                None => tracing::debug!(metric, "Metric entirely null, no baseline"),
            }
        }

        tracing::info!(metrics = baselines.len(), "Calculated personal baselines");
        baselines
    }
}

impl Default for BaselineCalculator {
    fn default() -> Self {
        Self::new()
    }
}
