//! Daily aggregation of intraday heart-rate samples
//!
//! The vendor reports heart rate as timestamped samples rather than one
//! record per day. Samples are folded into a daily summary record so the
//! family joins the table like every other.

use chrono::{DateTime, NaiveDate};
use serde_json::{json, Value};
use std::collections::BTreeMap;

#[derive(Debug, Default)]
struct DayAccumulator {
    sum: f64,
    min: f64,
    max: f64,
    count: usize,
    rest_sum: f64,
    rest_count: usize,
}

impl DayAccumulator {
    fn add(&mut self, bpm: f64, resting: bool) {
        if self.count == 0 {
            self.min = bpm;
            self.max = bpm;
        } else {
            self.min = self.min.min(bpm);
            self.max = self.max.max(bpm);
        }
        self.sum += bpm;
        self.count += 1;
        if resting {
            self.rest_sum += bpm;
            self.rest_count += 1;
        }
    }

    fn into_record(self, day: NaiveDate) -> Value {
        let mut record = json!({
            "day": day.format("%Y-%m-%d").to_string(),
            "bpm_mean": round2(self.sum / self.count as f64),
            "bpm_min": self.min,
            "bpm_max": self.max,
            "sample_count": self.count,
        });
        if self.rest_count > 0 {
            record["rest_bpm_mean"] = json!(round2(self.rest_sum / self.rest_count as f64));
        }
        record
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn is_sample(record: &Value) -> bool {
    record.get("bpm").is_some() && record.get("day").is_none()
}

/// Fold intraday samples into one record per day.
///
/// Records that already carry a `day` pass through unchanged. Samples
/// without a usable timestamp or bpm are kept as-is so the flattener can
/// report them.
pub fn daily_summaries(records: Vec<Value>) -> Vec<Value> {
    let mut days: BTreeMap<NaiveDate, DayAccumulator> = BTreeMap::new();
    let mut passthrough = Vec::new();

    for record in records {
        if !is_sample(&record) {
            passthrough.push(record);
            continue;
        }

        let day = record
            .get("timestamp")
            .and_then(Value::as_str)
            .and_then(|ts| DateTime::parse_from_rfc3339(ts).ok())
            .map(|ts| ts.date_naive());
        let bpm = record.get("bpm").and_then(Value::as_f64);

        match (day, bpm) {
            (Some(day), Some(bpm)) => {
                let resting = matches!(
                    record.get("source").and_then(Value::as_str),
                    Some("rest") | Some("sleep")
                );
                days.entry(day).or_default().add(bpm, resting);
            }
            _ => passthrough.push(record),
        }
    }

    let aggregated = days.len();
    let mut out: Vec<Value> = days
        .into_iter()
        .map(|(day, acc)| acc.into_record(day))
        .collect();
    out.extend(passthrough);

    tracing::debug!(days = aggregated, total = out.len(), "Aggregated heart-rate samples");
    out
}
