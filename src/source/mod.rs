//! Record sources
//!
//! The pipeline depends only on [`RecordSource`]: anything that can hand
//! over per-day JSON records for a metric family. Live vendor exports land
//! on disk and are read by [`JsonDirSource`]; [`SyntheticSource`] produces
//! records of the same shape when no device data is available.

pub mod heart_rate;
pub mod json;
pub mod synthetic;

use crate::error::{Result, SourceError};
use crate::models::MetricFamily;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use json::{write_family, JsonDirSource};
pub use synthetic::SyntheticSource;

/// Supplier of per-day records for each metric family
pub trait RecordSource {
    /// Human-readable source name for logs
    fn name(&self) -> &str;

    /// Records for one family; an unavailable family yields an empty list
    fn fetch(&self, family: MetricFamily) -> Result<Vec<Value>>;
}

/// Inclusive calendar window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateWindow {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    /// The `days` days ending on `end`
    pub fn ending_on(end: NaiveDate, days: u32) -> Result<Self> {
        let span = chrono::Duration::days(i64::from(days.max(1)) - 1);
        let start = end
            .checked_sub_signed(span)
            .ok_or_else(|| SourceError::Generator {
                reason: format!("{} days before {} is out of the calendar range", days, end),
            })?;
        Ok(Self { start, end })
    }

    pub fn days(&self) -> impl Iterator<Item = NaiveDate> {
        let end = self.end;
        self.start.iter_days().take_while(move |d| *d <= end)
    }

    pub fn len(&self) -> usize {
        if self.end < self.start {
            0
        } else {
            (self.end - self.start).num_days() as usize + 1
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_ending_on() {
        let end = NaiveDate::from_ymd_opt(2024, 3, 31).unwrap();
        let window = DateWindow::ending_on(end, 90).unwrap();

        assert_eq!(window.len(), 90);
        assert_eq!(window.days().count(), 90);
        assert_eq!(window.days().last(), Some(end));
        assert_eq!(window.start, NaiveDate::from_ymd_opt(2024, 1, 2).unwrap());
    }

    #[test]
    fn test_window_past_calendar_range_rejected() {
        let end = NaiveDate::from_ymd_opt(2024, 3, 31).unwrap();
        let err = DateWindow::ending_on(end, u32::MAX).unwrap_err();
        assert!(err.to_string().contains("out of the calendar range"));
    }

    #[test]
    fn test_inverted_window_is_empty() {
        let a = NaiveDate::from_ymd_opt(2024, 3, 2).unwrap();
        let b = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        assert!(DateWindow::new(a, b).is_empty());
        assert_eq!(DateWindow::new(a, b).days().count(), 0);
    }
}
