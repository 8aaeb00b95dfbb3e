//! Terminal tables for the CLI and the plain-text report

use crate::baseline::BaselineSet;
use crate::models::AnomalyFlag;
use crate::pipeline::{AnalyticsReport, ForecastSummary};
use std::fmt::Write as _;
use tabled::settings::Style;
use tabled::{Table, Tabled};

#[derive(Tabled)]
struct BaselineRow {
    #[tabled(rename = "Metric")]
    metric: String,
    #[tabled(rename = "Mean")]
    mean: String,
    #[tabled(rename = "Median")]
    median: String,
    #[tabled(rename = "Std Dev")]
    std_dev: String,
    #[tabled(rename = "N")]
    count: usize,
}

#[derive(Tabled)]
struct AnomalyRow {
    #[tabled(rename = "Date")]
    date: String,
    #[tabled(rename = "Metric")]
    metric: String,
    #[tabled(rename = "Value")]
    value: String,
    #[tabled(rename = "Baseline")]
    baseline: String,
    #[tabled(rename = "Deviation (σ)")]
    deviation: String,
}

#[derive(Tabled)]
struct ImportanceRow {
    #[tabled(rename = "Feature")]
    feature: String,
    #[tabled(rename = "Importance")]
    importance: String,
}

/// Baselines, optionally restricted to metrics whose name contains `filter`
pub fn render_baselines(baselines: &BaselineSet, filter: Option<&str>) -> String {
    let rows: Vec<BaselineRow> = baselines
        .values()
        .filter(|b| filter.map_or(true, |f| b.metric.contains(f)))
        .map(|b| BaselineRow {
            metric: b.metric.clone(),
            mean: format!("{:.2}", b.mean),
            median: format!("{:.2}", b.median),
            std_dev: format!("{:.2}", b.std_dev),
            count: b.count,
        })
        .collect();
    Table::new(rows).with(Style::rounded()).to_string()
}

pub fn render_anomalies(anomalies: &[AnomalyFlag]) -> String {
    if anomalies.is_empty() {
        return "No anomalies detected".to_string();
    }
    let rows: Vec<AnomalyRow> = anomalies
        .iter()
        .map(|a| AnomalyRow {
            date: a.date.format("%Y-%m-%d").to_string(),
            metric: a.metric.clone(),
            value: format!("{:.2}", a.value),
            baseline: format!("{:.2} ± {:.2}", a.baseline_mean, a.baseline_std),
            deviation: format!("{:+.2}", a.deviation),
        })
        .collect();
    Table::new(rows).with(Style::rounded()).to_string()
}

/// Metrics summary plus the `top` most important features
pub fn render_forecast(forecast: &ForecastSummary, top: usize) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "Target: {}",
        forecast.target.as_deref().unwrap_or("-")
    );
    let _ = writeln!(
        out,
        "Train rows: {}  Test rows: {}  Held out from: {}",
        forecast.train_rows, forecast.test_rows, forecast.split_date
    );
    let _ = writeln!(
        out,
        "R²: {:.3}  MAE: {:.3}  RMSE: {:.3}",
        forecast.metrics.r2, forecast.metrics.mae, forecast.metrics.rmse
    );

    let rows: Vec<ImportanceRow> = forecast
        .feature_importances
        .iter()
        .take(top)
        .map(|(feature, importance)| ImportanceRow {
            feature: feature.clone(),
            importance: format!("{:.3}", importance),
        })
        .collect();
    if !rows.is_empty() {
        out.push_str(&Table::new(rows).with(Style::rounded()).to_string());
    }
    out
}

/// Full plain-text report
pub fn render_report(report: &AnalyticsReport) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "READINESS ANALYTICS REPORT");
    let _ = writeln!(
        out,
        "Generated: {}",
        report.generated_at.format("%Y-%m-%d %H:%M:%S UTC")
    );
    match &report.date_range {
        Some(range) => {
            let _ = writeln!(out, "Period: {} to {} ({} days)", range.start, range.end, report.rows);
        }
        None => {
            let _ = writeln!(out, "Period: no data");
        }
    }

    let _ = writeln!(out, "\nBASELINES");
    let _ = writeln!(out, "{}", render_baselines(&report.baselines, None));

    let _ = writeln!(out, "\nANOMALIES ({})", report.anomalies.len());
    let _ = writeln!(out, "{}", render_anomalies(&report.anomalies));

    if let Some(forecast) = &report.forecast {
        let _ = writeln!(out, "\nFORECAST");
        let _ = writeln!(out, "{}", render_forecast(forecast, 10));
    }
    out
}
