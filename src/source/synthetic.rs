//! Synthetic record generator
//!
//! Produces records shaped like the vendor's daily sleep, activity and
//! readiness documents plus intraday heart-rate samples. Every family draws
//! from its own seeded generator, so output depends only on the seed and
//! the window.

use super::{heart_rate, DateWindow, RecordSource};
use crate::error::{Result, SourceError};
use crate::models::MetricFamily;
use chrono::{Datelike, NaiveDate, Weekday};
use rand::distributions::Distribution;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde_json::{json, Map, Value};
use statrs::distribution::Normal;

/// Heart-rate samples are only produced for the most recent days
const HEART_RATE_DAYS: usize = 7;

/// Deterministic generator of vendor-shaped records
#[derive(Debug, Clone)]
pub struct SyntheticSource {
    window: DateWindow,
    seed: u64,
}

impl SyntheticSource {
    pub fn new(window: DateWindow, seed: u64) -> Self {
        Self { window, seed }
    }

    /// `days` days ending on `end`
    pub fn ending_on(end: NaiveDate, days: u32, seed: u64) -> Result<Self> {
        Ok(Self::new(DateWindow::ending_on(end, days)?, seed))
    }

    pub fn window(&self) -> DateWindow {
        self.window
    }

    fn rng_for(&self, family: MetricFamily) -> ChaCha8Rng {
        let offset = match family {
            MetricFamily::Sleep => 0x51ee_9000,
            MetricFamily::Activity => 0xac71_0000,
            MetricFamily::Readiness => 0x4ead_1000,
            MetricFamily::HeartRate => 0x4ea4_7000,
        };
        ChaCha8Rng::seed_from_u64(self.seed ^ offset)
    }

    fn sleep(&self, rng: &mut ChaCha8Rng) -> Result<Vec<Value>> {
        let base = normal(75.0, 10.0)?;
        let weekend_bonus = normal(5.0, 3.0)?;
        let contributors = [
            ("deep_sleep", normal(80.0, 15.0)?),
            ("efficiency", normal(85.0, 10.0)?),
            ("latency", normal(75.0, 20.0)?),
            ("rem_sleep", normal(70.0, 15.0)?),
            ("restfulness", normal(65.0, 20.0)?),
            ("timing", normal(60.0, 25.0)?),
            ("total_sleep", normal(75.0, 15.0)?),
        ];

        Ok(self
            .window
            .days()
            .enumerate()
            .map(|(i, day)| {
                let mut score = base.sample(rng);
                if is_weekend(day) {
                    score += weekend_bonus.sample(rng);
                }
                json!({
                    "id": format!("synthetic_sleep_{i}"),
                    "day": day_string(day),
                    "score": bounded(score, 40.0),
                    "timestamp": midnight(day),
                    "contributors": sample_contributors(&contributors, rng),
                })
            })
            .collect())
    }

    fn activity(&self, rng: &mut ChaCha8Rng) -> Result<Vec<Value>> {
        let steps_dist = normal(8000.0, 2000.0)?;
        let active_noise = normal(200.0, 50.0)?;
        let total_noise = normal(0.0, 100.0)?;
        let score_dist = normal(75.0, 12.0)?;
        let contributors = [
            ("meet_daily_targets", normal(70.0, 20.0)?),
            ("move_every_hour", normal(65.0, 25.0)?),
            ("recovery_time", normal(80.0, 15.0)?),
            ("stay_active", normal(75.0, 15.0)?),
            ("training_frequency", normal(60.0, 25.0)?),
            ("training_volume", normal(70.0, 20.0)?),
        ];

        Ok(self
            .window
            .days()
            .enumerate()
            .map(|(i, day)| {
                let mut steps = steps_dist.sample(rng);
                if is_weekend(day) {
                    steps *= rng.gen_range(0.7..1.2);
                }
                let steps = steps.max(0.0).trunc() as i64;
                let active_calories =
                    (steps as f64 * 0.04 + active_noise.sample(rng)).trunc() as i64;
                let total_calories =
                    (active_calories as f64 + 1500.0 + total_noise.sample(rng)).trunc() as i64;

                json!({
                    "id": format!("synthetic_activity_{i}"),
                    "day": day_string(day),
                    "score": bounded(score_dist.sample(rng), 40.0),
                    "steps": steps,
                    "active_calories": active_calories,
                    "total_calories": total_calories,
                    "timestamp": midnight(day),
                    "contributors": sample_contributors(&contributors, rng),
                })
            })
            .collect())
    }

    fn readiness(&self, rng: &mut ChaCha8Rng) -> Result<Vec<Value>> {
        let score_dist = normal(75.0, 12.0)?;
        let temp_dev = normal(0.0, 0.2)?;
        let temp_trend = normal(0.0, 0.15)?;
        let contributors = [
            ("activity_balance", normal(70.0, 20.0)?),
            ("body_temperature", normal(95.0, 10.0)?),
            ("hrv_balance", normal(75.0, 15.0)?),
            ("previous_night", normal(70.0, 15.0)?),
            ("recovery_index", normal(80.0, 15.0)?),
            ("resting_heart_rate", normal(90.0, 10.0)?),
            ("sleep_balance", normal(75.0, 15.0)?),
        ];

        Ok(self
            .window
            .days()
            .enumerate()
            .map(|(i, day)| {
                let score = bounded(score_dist.sample(rng), 40.0);
                let deviation = round2(temp_dev.sample(rng));
                let trend = round2(temp_trend.sample(rng));
                let mut contributors = sample_contributors(&contributors, rng);
                // never populated by the vendor either
                contributors.insert("previous_day_activity".to_string(), Value::Null);

                json!({
                    "id": format!("synthetic_readiness_{i}"),
                    "day": day_string(day),
                    "score": score,
                    "temperature_deviation": deviation,
                    "temperature_trend_deviation": trend,
                    "timestamp": midnight(day),
                    "contributors": contributors,
                })
            })
            .collect())
    }

    fn heart_rate_samples(&self, rng: &mut ChaCha8Rng) -> Result<Vec<Value>> {
        let rest = normal(54.0, 4.0)?;
        let awake = normal(72.0, 8.0)?;
        let workout = normal(135.0, 15.0)?;

        let days: Vec<NaiveDate> = self.window.days().collect();
        let recent = &days[days.len().saturating_sub(HEART_RATE_DAYS)..];

        let mut samples = Vec::with_capacity(recent.len() * 24);
        for day in recent {
            let workout_hour = rng.gen_range(16..20);
            for hour in 0..24u32 {
                let (source, dist) = match hour {
                    0..=5 => ("rest", &rest),
                    h if h == workout_hour => ("workout", &workout),
                    _ => ("awake", &awake),
                };
                let bpm = dist.sample(rng).round().max(30.0) as i64;
                samples.push(json!({
                    "bpm": bpm,
                    "source": source,
                    "timestamp": format!("{}T{:02}:00:00+00:00", day_string(*day), hour),
                }));
            }
        }
        Ok(samples)
    }
}

impl RecordSource for SyntheticSource {
    fn name(&self) -> &str {
        "synthetic"
    }

    fn fetch(&self, family: MetricFamily) -> Result<Vec<Value>> {
        let mut rng = self.rng_for(family);
        let records = match family {
            MetricFamily::Sleep => self.sleep(&mut rng)?,
            MetricFamily::Activity => self.activity(&mut rng)?,
            MetricFamily::Readiness => self.readiness(&mut rng)?,
            MetricFamily::HeartRate => heart_rate::daily_summaries(self.heart_rate_samples(&mut rng)?),
        };
        tracing::debug!(family = %family, records = records.len(), seed = self.seed, "Generated synthetic records");
        Ok(records)
    }
}

fn normal(mean: f64, std_dev: f64) -> Result<Normal> {
    Normal::new(mean, std_dev).map_err(|e| {
        SourceError::Generator {
            reason: format!("normal({mean}, {std_dev}): {e}"),
        }
        .into()
    })
}

/// Truncate to an integer score within `[floor, 100]`
fn bounded(value: f64, floor: f64) -> i64 {
    value.trunc().clamp(floor, 100.0) as i64
}

fn sample_contributors(
    contributors: &[(&str, Normal)],
    rng: &mut ChaCha8Rng,
) -> Map<String, Value> {
    contributors
        .iter()
        .map(|(name, dist)| (name.to_string(), json!(bounded(dist.sample(rng), 0.0))))
        .collect()
}

fn is_weekend(day: NaiveDate) -> bool {
    matches!(day.weekday(), Weekday::Sat | Weekday::Sun)
}

fn day_string(day: NaiveDate) -> String {
    day.format("%Y-%m-%d").to_string()
}

fn midnight(day: NaiveDate) -> String {
    format!("{}T00:00:00+00:00", day_string(day))
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source() -> SyntheticSource {
        SyntheticSource::ending_on(NaiveDate::from_ymd_opt(2024, 6, 30).unwrap(), 30, 42).unwrap()
    }

    #[test]
    fn test_one_record_per_day() {
        let src = source();
        for family in [MetricFamily::Sleep, MetricFamily::Activity, MetricFamily::Readiness] {
            let records = src.fetch(family).unwrap();
            assert_eq!(records.len(), 30, "{family}");
            assert_eq!(records[0]["day"], "2024-06-01");
            assert_eq!(records[29]["day"], "2024-06-30");
        }
    }

    #[test]
    fn test_same_seed_same_records() {
        let a = source().fetch(MetricFamily::Readiness).unwrap();
        let b = source().fetch(MetricFamily::Readiness).unwrap();
        assert_eq!(a, b);

        let other = SyntheticSource::new(source().window(), 7)
            .fetch(MetricFamily::Readiness)
            .unwrap();
        assert_ne!(a, other);
    }

    #[test]
    fn test_scores_stay_in_range() {
        let src = source();
        for family in [MetricFamily::Sleep, MetricFamily::Activity, MetricFamily::Readiness] {
            for record in src.fetch(family).unwrap() {
                let score = record["score"].as_i64().unwrap();
                assert!((40..=100).contains(&score));
                for (_, value) in record["contributors"].as_object().unwrap() {
                    if let Some(v) = value.as_i64() {
                        assert!((0..=100).contains(&v));
                    }
                }
            }
        }
    }

    #[test]
    fn test_readiness_shape() {
        let records = source().fetch(MetricFamily::Readiness).unwrap();
        let first = &records[0];
        assert!(first["contributors"]["previous_day_activity"].is_null());
        assert_eq!(first["contributors"].as_object().unwrap().len(), 8);
        let dev = first["temperature_deviation"].as_f64().unwrap();
        assert_eq!(dev, (dev * 100.0).round() / 100.0);
    }

    #[test]
    fn test_heart_rate_covers_last_week() {
        let records = source().fetch(MetricFamily::HeartRate).unwrap();
        assert_eq!(records.len(), HEART_RATE_DAYS);
        assert_eq!(records[0]["day"], "2024-06-24");
        assert_eq!(records[6]["sample_count"], 24);
        assert!(records[0]["rest_bpm_mean"].as_f64().unwrap() < records[0]["bpm_max"].as_f64().unwrap());
    }
}
