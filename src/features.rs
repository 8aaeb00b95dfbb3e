//! Lag and rolling-window feature engineering
//!
//! Shifts are by row position, not by calendar day: a date missing from the
//! table does not count as a day. Windows that lack history yield null.

use crate::error::{CalculationError, Result};
use crate::models::{FeatureTable, UnifiedTable};
use serde::{Deserialize, Serialize};

/// Feature engineering configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureConfig {
    /// Source columns that receive lag and rolling features
    pub columns: Vec<String>,

    /// Lag offsets in rows (default: 1, 2, 3, 7)
    pub lag_windows: Vec<usize>,

    /// Trailing mean window sizes in rows (default: 7)
    pub rolling_windows: Vec<usize>,

    /// Column whose next-day value is the label
    pub target_column: String,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            columns: vec![
                "readiness_score".to_string(),
                "sleep_score".to_string(),
                "activity_score".to_string(),
            ],
            lag_windows: vec![1, 2, 3, 7],
            rolling_windows: vec![7],
            target_column: "readiness_score".to_string(),
        }
    }
}

impl FeatureConfig {
    pub fn validate(&self) -> Result<()> {
        if let Some(zero) = self.lag_windows.iter().find(|&&l| l == 0) {
            return Err(invalid("lag_windows", zero));
        }
        if let Some(zero) = self.rolling_windows.iter().find(|&&w| w == 0) {
            return Err(invalid("rolling_windows", zero));
        }
        Ok(())
    }
}

fn invalid(parameter: &str, value: &usize) -> crate::error::ReadyRsError {
    CalculationError::InvalidParameter {
        calculation: "features".to_string(),
        parameter: parameter.to_string(),
        value: value.to_string(),
    }
    .into()
}

/// Name of the lag column for `column` shifted by `lag` rows
pub fn lag_column_name(column: &str, lag: usize) -> String {
    format!("{}_lag{}", column, lag)
}

/// Name of the rolling mean column for `column` over `window` rows
pub fn rolling_column_name(column: &str, window: usize) -> String {
    format!("{}_roll{}", column, window)
}

/// Name of the next-day label column for `column`
pub fn target_column_name(column: &str) -> String {
    format!("target_{}", column)
}

/// Value at `i - lag`, null for the first `lag` rows
pub fn lag(values: &[Option<f64>], lag: usize) -> Vec<Option<f64>> {
    (0..values.len())
        .map(|i| if i >= lag { values[i - lag] } else { None })
        .collect()
}

/// Value at `i + lead`, null for the last `lead` rows
pub fn lead(values: &[Option<f64>], lead: usize) -> Vec<Option<f64>> {
    (0..values.len())
        .map(|i| values.get(i + lead).copied().flatten())
        .collect()
}

/// Trailing mean over rows `[i - window + 1, i]`.
///
/// Null when fewer than `window` rows precede and include `i`, or when any
/// value inside the window is null.
pub fn rolling_mean(values: &[Option<f64>], window: usize) -> Vec<Option<f64>> {
    if window == 0 {
        return vec![None; values.len()];
    }

    (0..values.len())
        .map(|i| {
            if i + 1 < window {
                return None;
            }
            let slice = &values[i + 1 - window..=i];
            let sum = slice.iter().copied().try_fold(0.0, |acc, v| v.map(|x| acc + x))?;
            Some(sum / window as f64)
        })
        .collect()
}

/// Derives lag, rolling and target columns from a merged table
pub struct FeatureEngineer {
    config: FeatureConfig,
}

impl FeatureEngineer {
    pub fn new() -> Self {
        Self::with_config(FeatureConfig::default())
    }

    pub fn with_config(config: FeatureConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &FeatureConfig {
        &self.config
    }

    /// Build the feature table. The input must be sorted ascending by date.
    pub fn engineer(&self, table: &UnifiedTable) -> Result<FeatureTable> {
        self.config.validate()?;

        let mut output = table.clone();
        let mut feature_columns = Vec::new();

        for column in &self.config.columns {
            let Some(values) = table.numeric_column(column) else {
                tracing::warn!(column = %column, "Feature source column missing, skipping");
                continue;
            };

            feature_columns.push(column.clone());

            for &l in &self.config.lag_windows {
                let name = lag_column_name(column, l);
                output.push_column(name.clone(), lag(&values, l));
                feature_columns.push(name);
            }

            for &w in &self.config.rolling_windows {
                let name = rolling_column_name(column, w);
                output.push_column(name.clone(), rolling_mean(&values, w));
                feature_columns.push(name);
            }
        }

        let target_column = match table.numeric_column(&self.config.target_column) {
            Some(values) => {
                let name = target_column_name(&self.config.target_column);
                output.push_column(name.clone(), lead(&values, 1));
                Some(name)
            }
            None => {
                tracing::warn!(
                    column = %self.config.target_column,
                    "Target column missing, feature table has no label"
                );
                None
            }
        };

        tracing::info!(
            rows = output.len(),
            features = feature_columns.len(),
            "Engineered features"
        );

        Ok(FeatureTable {
            table: output,
            feature_columns,
            target_column,
        })
    }
}

impl Default for FeatureEngineer {
    fn default() -> Self {
        Self::new()
    }
}
