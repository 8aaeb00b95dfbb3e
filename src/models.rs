use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Metric families reported by the wearable
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricFamily {
    Sleep,
    Activity,
    Readiness,
    HeartRate,
}

impl MetricFamily {
    /// All families in canonical merge order
    pub const ALL: [MetricFamily; 4] = [
        MetricFamily::Sleep,
        MetricFamily::Activity,
        MetricFamily::Readiness,
        MetricFamily::HeartRate,
    ];

    /// Name used for file names and column prefixes
    pub fn name(&self) -> &'static str {
        match self {
            MetricFamily::Sleep => "sleep",
            MetricFamily::Activity => "activity",
            MetricFamily::Readiness => "readiness",
            MetricFamily::HeartRate => "heart_rate",
        }
    }

    /// Prefix a field with this family's name
    pub fn column_name(&self, field: &str) -> String {
        format!("{}_{}", self.name(), field)
    }
}

impl fmt::Display for MetricFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for MetricFamily {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "sleep" => Ok(MetricFamily::Sleep),
            "activity" => Ok(MetricFamily::Activity),
            "readiness" => Ok(MetricFamily::Readiness),
            "heart_rate" | "heartrate" | "hr" => Ok(MetricFamily::HeartRate),
            _ => Err(format!("Unknown metric family: {}", s)),
        }
    }
}

/// A scalar cell value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Number(f64),
    Text(String),
}

impl FieldValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Number(n) => Some(*n),
            FieldValue::Text(_) => None,
        }
    }

    pub fn is_number(&self) -> bool {
        matches!(self, FieldValue::Number(_))
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Number(n) => write!(f, "{}", n),
            FieldValue::Text(s) => write!(f, "{}", s),
        }
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        FieldValue::Number(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}

/// One flattened record of a single family
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlatRecord {
    pub date: NaiveDate,
    pub fields: BTreeMap<String, FieldValue>,
}

/// All families' flat fields for one calendar date
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyRecord {
    pub date: NaiveDate,
    pub families: BTreeMap<MetricFamily, BTreeMap<String, FieldValue>>,
}

impl DailyRecord {
    pub fn new(date: NaiveDate) -> Self {
        Self {
            date,
            families: BTreeMap::new(),
        }
    }
}

/// One row of the unified table; `values` is aligned with the table's columns
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnifiedRow {
    pub date: NaiveDate,
    pub values: Vec<Option<FieldValue>>,
}

/// Row-per-date table, sorted ascending by date
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct UnifiedTable {
    pub columns: Vec<String>,
    pub rows: Vec<UnifiedRow>,
}

impl UnifiedTable {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    pub fn dates(&self) -> Vec<NaiveDate> {
        self.rows.iter().map(|r| r.date).collect()
    }

    /// Cell lookup by row index and column name
    pub fn value(&self, row: usize, column: &str) -> Option<&FieldValue> {
        let idx = self.column_index(column)?;
        self.rows.get(row)?.values.get(idx)?.as_ref()
    }

    /// Numeric view of a column; text cells read as null
    pub fn numeric_column(&self, name: &str) -> Option<Vec<Option<f64>>> {
        let idx = self.column_index(name)?;
        Some(
            self.rows
                .iter()
                .map(|row| row.values[idx].as_ref().and_then(FieldValue::as_f64))
                .collect(),
        )
    }

    /// Columns whose non-null cells are all numbers and that hold at least one value
    pub fn numeric_columns(&self) -> Vec<&str> {
        self.columns
            .iter()
            .enumerate()
            .filter(|(idx, _)| {
                let mut seen = false;
                for row in &self.rows {
                    match &row.values[*idx] {
                        Some(FieldValue::Number(_)) => seen = true,
                        Some(FieldValue::Text(_)) => return false,
                        None => {}
                    }
                }
                seen
            })
            .map(|(_, name)| name.as_str())
            .collect()
    }

    /// Append a column; `values` must have one entry per row
    pub fn push_column(&mut self, name: impl Into<String>, values: Vec<Option<f64>>) {
        debug_assert_eq!(values.len(), self.rows.len());
        self.columns.push(name.into());
        for (row, value) in self.rows.iter_mut().zip(values) {
            row.values.push(value.map(FieldValue::Number));
        }
    }

    /// First and last date covered
    pub fn date_range(&self) -> Option<(NaiveDate, NaiveDate)> {
        Some((self.rows.first()?.date, self.rows.last()?.date))
    }
}

/// Merged table extended with engineered columns
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureTable {
    pub table: UnifiedTable,
    /// Columns a model may train on, in a stable order
    pub feature_columns: Vec<String>,
    /// Next-day label column, when the target exists
    pub target_column: Option<String>,
}

/// Personal baseline of one metric
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Baseline {
    pub metric: String,
    pub mean: f64,
    pub median: f64,
    pub std_dev: f64,
    pub count: usize,
}

/// A single day on which a metric left its personal range
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyFlag {
    pub date: NaiveDate,
    pub metric: String,
    pub value: f64,
    pub baseline_mean: f64,
    pub baseline_std: f64,
    /// Signed deviation in standard deviations
    pub deviation: f64,
}

impl AnomalyFlag {
    pub fn direction(&self) -> &'static str {
        if self.deviation >= 0.0 {
            "above"
        } else {
            "below"
        }
    }
}
