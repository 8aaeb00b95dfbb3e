//! Next-day score forecasting
//!
//! Builds supervised samples from a feature table, splits them
//! chronologically, fits a regressor on the older portion and evaluates on
//! the most recent one. Training never sees a label dated on or after the
//! first held-out day.

pub mod forest;

use crate::error::{CalculationError, Result};
use crate::models::FeatureTable;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

pub use forest::{ForestConfig, RandomForestRegressor, RegressionTree};

/// Regression model seam used by the forecaster
pub trait Regressor {
    /// Fit on feature rows `x` and labels `y`
    fn fit(&mut self, x: &[Vec<f64>], y: &[f64]) -> Result<()>;

    /// Predict one row
    fn predict(&self, features: &[f64]) -> f64;

    /// Relative importance per feature, summing to 1 when available
    fn feature_importances(&self) -> Vec<f64> {
        Vec::new()
    }
}

/// Forecast configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForecastConfig {
    /// Run the forecaster as part of the pipeline
    pub enabled: bool,

    /// Fraction of usable samples used for training (default: 0.8)
    pub train_fraction: f64,

    /// Minimum training samples after exclusions (default: 10)
    pub min_training_rows: usize,

    /// Random forest hyper-parameters
    pub forest: ForestConfig,
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            train_fraction: 0.8,
            min_training_rows: 10,
            forest: ForestConfig::default(),
        }
    }
}

impl ForecastConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.train_fraction > 0.0 && self.train_fraction < 1.0) {
            return Err(CalculationError::InvalidParameter {
                calculation: "forecast".to_string(),
                parameter: "train_fraction".to_string(),
                value: self.train_fraction.to_string(),
            }
            .into());
        }
        if self.min_training_rows == 0 {
            return Err(CalculationError::InvalidParameter {
                calculation: "forecast".to_string(),
                parameter: "min_training_rows".to_string(),
                value: "0".to_string(),
            }
            .into());
        }
        Ok(())
    }
}

/// Held-out evaluation metrics
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ForecastMetrics {
    pub r2: f64,
    pub mae: f64,
    pub rmse: f64,
}

impl ForecastMetrics {
    /// Compute R², MAE and RMSE. When the actual values have zero variance
    /// R² is 1.0 for a perfect fit and 0.0 otherwise.
    pub fn evaluate(actual: &[f64], predicted: &[f64]) -> Self {
        let n = actual.len().min(predicted.len());
        if n == 0 {
            return Self {
                r2: 0.0,
                mae: 0.0,
                rmse: 0.0,
            };
        }

        let mean = actual[..n].iter().sum::<f64>() / n as f64;
        let mut abs_sum = 0.0;
        let mut ss_res = 0.0;
        let mut ss_tot = 0.0;
        for (a, p) in actual.iter().zip(predicted).take(n) {
            let err = a - p;
            abs_sum += err.abs();
            ss_res += err * err;
            ss_tot += (a - mean).powi(2);
        }

        let r2 = if ss_tot > 0.0 {
            1.0 - ss_res / ss_tot
        } else if ss_res == 0.0 {
            1.0
        } else {
            0.0
        };

        Self {
            r2,
            mae: abs_sum / n as f64,
            rmse: (ss_res / n as f64).sqrt(),
        }
    }
}

/// One held-out prediction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    /// Day being predicted
    pub date: NaiveDate,
    pub predicted: f64,
    pub actual: f64,
}

/// Trained model plus its evaluation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForecastResult<M = RandomForestRegressor> {
    pub model: M,
    pub metrics: ForecastMetrics,
    pub predictions: Vec<Prediction>,
    pub feature_columns: Vec<String>,
    pub feature_importances: Vec<f64>,
    pub train_rows: usize,
    pub test_rows: usize,
    /// First held-out feature date; every training label precedes it
    pub split_date: NaiveDate,
    /// Earliest feature date and latest label date used for fitting
    pub training_window: (NaiveDate, NaiveDate),
}

/// A supervised sample: features observed on `date`, label from `label_date`
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub date: NaiveDate,
    pub label_date: NaiveDate,
    pub features: Vec<f64>,
    pub label: f64,
}

/// Trains and evaluates next-day forecasts
pub struct Forecaster {
    config: ForecastConfig,
}

impl Forecaster {
    pub fn new() -> Self {
        Self::with_config(ForecastConfig::default())
    }

    pub fn with_config(config: ForecastConfig) -> Self {
        Self { config }
    }

    /// Rows with every feature and the label present, in date order
    pub fn usable_samples(features: &FeatureTable) -> Result<Vec<Sample>> {
        let table = &features.table;
        let target = features.target_column.as_deref().ok_or_else(|| {
            CalculationError::UnknownColumn {
                column: "target".to_string(),
            }
        })?;

        let label_idx = table
            .column_index(target)
            .ok_or_else(|| CalculationError::UnknownColumn {
                column: target.to_string(),
            })?;
        let feature_idx = features
            .feature_columns
            .iter()
            .map(|c| {
                table.column_index(c).ok_or_else(|| {
                    CalculationError::UnknownColumn { column: c.clone() }.into()
                })
            })
            .collect::<Result<Vec<usize>>>()?;

        let mut samples = Vec::new();
        for (i, row) in table.rows.iter().enumerate() {
            let Some(label) = row.values[label_idx].as_ref().and_then(|v| v.as_f64()) else {
                continue;
            };
            let Some(next) = table.rows.get(i + 1) else {
                continue;
            };
            let values: Option<Vec<f64>> = feature_idx
                .iter()
                .map(|&idx| row.values[idx].as_ref().and_then(|v| v.as_f64()))
                .collect();
            if let Some(values) = values {
                samples.push(Sample {
                    date: row.date,
                    label_date: next.date,
                    features: values,
                    label,
                });
            }
        }
        Ok(samples)
    }

    /// Chronological split: the most recent samples are held out, and
    /// training keeps only samples whose label precedes the held-out period
    pub fn split<'a>(&self, samples: &'a [Sample]) -> Result<(Vec<&'a Sample>, &'a [Sample])> {
        let usable = samples.len();
        let boundary = ((usable as f64) * self.config.train_fraction).floor() as usize;
        let (head, test) = samples.split_at(boundary.min(usable));

        let Some(first_test) = test.first() else {
            if usable < self.config.min_training_rows {
                return Err(CalculationError::InsufficientTrainingData {
                    usable,
                    minimum: self.config.min_training_rows,
                }
                .into());
            }
            return Err(CalculationError::EmptyHoldout { usable }.into());
        };

        let train: Vec<&Sample> = head
            .iter()
            .filter(|s| s.label_date < first_test.date)
            .collect();

        if train.len() < self.config.min_training_rows {
            return Err(CalculationError::InsufficientTrainingData {
                usable: train.len(),
                minimum: self.config.min_training_rows,
            }
            .into());
        }

        Ok((train, test))
    }

    /// Train the default random forest and evaluate it
    pub fn forecast(&self, features: &FeatureTable) -> Result<ForecastResult> {
        let model = RandomForestRegressor::new(self.config.forest.clone());
        self.forecast_with(features, model)
    }

    /// Train `model` and evaluate it on the held-out portion
    pub fn forecast_with<M: Regressor>(
        &self,
        features: &FeatureTable,
        mut model: M,
    ) -> Result<ForecastResult<M>> {
        self.config.validate()?;

        let samples = Self::usable_samples(features)?;
        let (train, test) = self.split(&samples)?;

        let x: Vec<Vec<f64>> = train.iter().map(|s| s.features.clone()).collect();
        let y: Vec<f64> = train.iter().map(|s| s.label).collect();
        model.fit(&x, &y)?;

        let predictions: Vec<Prediction> = test
            .iter()
            .map(|s| Prediction {
                date: s.label_date,
                predicted: model.predict(&s.features),
                actual: s.label,
            })
            .collect();

        let actual: Vec<f64> = predictions.iter().map(|p| p.actual).collect();
        let predicted: Vec<f64> = predictions.iter().map(|p| p.predicted).collect();
        let metrics = ForecastMetrics::evaluate(&actual, &predicted);

        // `split` guarantees both partitions are non-empty
        let training_window = (train[0].date, train[train.len() - 1].label_date);
        let split_date = test[0].date;

        tracing::info!(
            train_rows = train.len(),
            test_rows = test.len(),
            r2 = metrics.r2,
            mae = metrics.mae,
            rmse = metrics.rmse,
            "Forecast model evaluated"
        );

        Ok(ForecastResult {
            feature_importances: model.feature_importances(),
            model,
            metrics,
            predictions,
            feature_columns: features.feature_columns.clone(),
            train_rows: train.len(),
            test_rows: test.len(),
            split_date,
            training_window,
        })
    }
}

impl Default for Forecaster {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::FeatureEngineer;
    use crate::models::{FieldValue, UnifiedRow, UnifiedTable};

    fn readiness_table(days: usize) -> UnifiedTable {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        UnifiedTable {
            columns: vec!["readiness_score".to_string()],
            rows: (0..days)
                .map(|i| UnifiedRow {
                    date: start + chrono::Duration::days(i as i64),
                    values: vec![Some(FieldValue::Number(70.0 + (i % 7) as f64))],
                })
                .collect(),
        }
    }

    fn small_forest() -> ForecastConfig {
        ForecastConfig {
            forest: ForestConfig {
                n_trees: 10,
                ..ForestConfig::default()
            },
            ..ForecastConfig::default()
        }
    }

    /// Records the labels it was fitted on
    struct Recorder {
        seen: Vec<f64>,
    }

    impl Regressor for Recorder {
        fn fit(&mut self, _x: &[Vec<f64>], y: &[f64]) -> Result<()> {
            self.seen = y.to_vec();
            Ok(())
        }

        fn predict(&self, _features: &[f64]) -> f64 {
            0.0
        }
    }

    #[test]
    fn test_metrics() {
        let m = ForecastMetrics::evaluate(&[1.0, 2.0, 3.0], &[1.0, 2.0, 3.0]);
        assert_eq!(m.r2, 1.0);
        assert_eq!(m.mae, 0.0);

        let m = ForecastMetrics::evaluate(&[1.0, 3.0], &[2.0, 2.0]);
        assert_eq!(m.r2, 0.0);
        assert_eq!(m.mae, 1.0);
        assert_eq!(m.rmse, 1.0);

        let m = ForecastMetrics::evaluate(&[5.0, 5.0], &[4.0, 6.0]);
        assert_eq!(m.r2, 0.0);
    }

    #[test]
    fn test_usable_samples_skip_warmup_and_last_row() {
        let features = FeatureEngineer::new().engineer(&readiness_table(30)).unwrap();
        let samples = Forecaster::usable_samples(&features).unwrap();

        // lag7/roll7 need 7 prior rows; the last row has no label
        assert_eq!(samples.len(), 30 - 7 - 1);
        assert!(samples.windows(2).all(|w| w[0].date < w[1].date));
        assert!(samples.iter().all(|s| s.label_date > s.date));
    }

    #[test]
    fn test_training_labels_precede_split() {
        let features = FeatureEngineer::new().engineer(&readiness_table(60)).unwrap();
        let forecaster = Forecaster::with_config(small_forest());

        let result = forecaster.forecast(&features).unwrap();

        assert!(result.training_window.1 < result.split_date);
        assert!(result.predictions.iter().all(|p| p.date > result.split_date));
        assert_eq!(result.test_rows, result.predictions.len());
        assert_eq!(result.feature_importances.len(), result.feature_columns.len());
    }

    #[test]
    fn test_regressor_never_sees_held_out_labels() {
        let features = FeatureEngineer::new().engineer(&readiness_table(60)).unwrap();
        let samples = Forecaster::usable_samples(&features).unwrap();
        let forecaster = Forecaster::with_config(small_forest());
        let (_, test) = forecaster.split(&samples).unwrap();

        let result = forecaster
            .forecast_with(&features, Recorder { seen: Vec::new() })
            .unwrap();

        assert_eq!(result.model.seen.len(), result.train_rows);
        // the sample whose label is the first held-out day is dropped
        assert_eq!(result.train_rows, samples.len() - test.len() - 1);
    }

    #[test]
    fn test_insufficient_rows_fail_explicitly() {
        let features = FeatureEngineer::new().engineer(&readiness_table(18)).unwrap();
        let err = Forecaster::new().forecast(&features).unwrap_err();

        assert!(matches!(
            err,
            crate::error::ReadyRsError::Calculation(CalculationError::InsufficientTrainingData {
                minimum: 10,
                ..
            })
        ));
        assert!(err.to_string().contains("minimum is 10"));
    }

    #[test]
    fn test_forecast_is_deterministic() {
        let features = FeatureEngineer::new().engineer(&readiness_table(60)).unwrap();
        let forecaster = Forecaster::with_config(small_forest());

        let a = forecaster.forecast(&features).unwrap();
        let b = forecaster.forecast(&features).unwrap();
        assert_eq!(a.predictions, b.predictions);
        assert_eq!(a.metrics, b.metrics);
    }

    #[test]
    fn test_invalid_fraction_rejected() {
        let features = FeatureEngineer::new().engineer(&readiness_table(60)).unwrap();
        let forecaster = Forecaster::with_config(ForecastConfig {
            train_fraction: 1.0,
            ..ForecastConfig::default()
        });
        assert!(forecaster.forecast(&features).is_err());
    }
}
