//! Flattening of nested per-day records
//!
//! Vendor records embed sub-objects such as `contributors`. The flattener
//! turns one record into a single map of scalar fields, naming nested keys
//! `parent_child`, and extracts the calendar date that keys the record.

use crate::error::IngestError;
use crate::models::{FieldValue, FlatRecord, MetricFamily};
use chrono::{DateTime, NaiveDate};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Outcome of flattening a batch of records
#[derive(Debug, Clone, Default)]
pub struct FlattenBatch {
    pub records: Vec<FlatRecord>,
    pub rejected: usize,
}

/// Record flattener with configurable date fields
#[derive(Debug, Clone)]
pub struct Flattener {
    /// Fields holding an ISO calendar date, tried in order
    date_fields: Vec<String>,
    /// Fields holding an RFC 3339 timestamp, tried after `date_fields`
    timestamp_fields: Vec<String>,
}

impl Default for Flattener {
    fn default() -> Self {
        Self::new()
    }
}

impl Flattener {
    pub fn new() -> Self {
        Self {
            date_fields: vec!["day".to_string(), "date".to_string()],
            timestamp_fields: vec!["timestamp".to_string()],
        }
    }

    /// Flatten one record
    pub fn flatten(&self, record: &Value) -> Result<FlatRecord, IngestError> {
        let object = record.as_object().ok_or(IngestError::NotAnObject)?;
        let (date, key_field) = self.extract_date(object)?;

        let mut fields = BTreeMap::new();
        // nested objects first so a top-level `a_b` wins over `a.b`
        let (nested, scalars): (Vec<_>, Vec<_>) = object
            .iter()
            .filter(|(key, _)| Some(key.as_str()) != key_field)
            .partition(|(_, value)| value.is_object());
        for (key, value) in nested.into_iter().chain(scalars) {
            flatten_value(key, value, &mut fields);
        }

        Ok(FlatRecord { date, fields })
    }

    /// Flatten a batch, dropping malformed records with a warning
    pub fn flatten_all(&self, family: MetricFamily, records: &[Value]) -> FlattenBatch {
        let mut batch = FlattenBatch::default();

        for (index, record) in records.iter().enumerate() {
            match self.flatten(record) {
                Ok(flat) => batch.records.push(flat),
                Err(err) => {
                    tracing::warn!(
                        family = %family,
                        index,
                        reason = %err,
                        "Dropping malformed record"
                    );
                    batch.rejected += 1;
                }
            }
        }

        tracing::debug!(
            family = %family,
            kept = batch.records.len(),
            rejected = batch.rejected,
            "Flattened records"
        );
        batch
    }

    /// Locate the record date; returns the date and, for calendar-date
    /// fields, the key to leave out of the flat output
    fn extract_date<'a>(
        &'a self,
        object: &Map<String, Value>,
    ) -> Result<(NaiveDate, Option<&'a str>), IngestError> {
        for field in &self.date_fields {
            match object.get(field) {
                Some(Value::String(raw)) => {
                    let date = parse_calendar_date(raw).ok_or_else(|| IngestError::InvalidDate {
                        field: field.clone(),
                        value: raw.clone(),
                    })?;
                    return Ok((date, Some(field.as_str())));
                }
                Some(Value::Null) | None => continue,
                Some(other) => {
                    return Err(IngestError::InvalidDate {
                        field: field.clone(),
                        value: other.to_string(),
                    })
                }
            }
        }

        for field in &self.timestamp_fields {
            if let Some(Value::String(raw)) = object.get(field) {
                let stamp =
                    DateTime::parse_from_rfc3339(raw).map_err(|_| IngestError::InvalidDate {
                        field: field.clone(),
                        value: raw.clone(),
                    })?;
                return Ok((stamp.date_naive(), None));
            }
        }

        Err(IngestError::MissingDate)
    }
}

fn parse_calendar_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").ok()
}

fn insert_field(out: &mut BTreeMap<String, FieldValue>, key: &str, value: FieldValue) {
    if let Some(previous) = out.insert(key.to_string(), value) {
        tracing::warn!(field = key, replaced = %previous, "Flattened field name collision");
    }
}

fn flatten_value(key: &str, value: &Value, out: &mut BTreeMap<String, FieldValue>) {
    match value {
        Value::Null => {}
        Value::Bool(flag) => {
            insert_field(out, key, FieldValue::Number(if *flag { 1.0 } else { 0.0 }));
        }
        Value::Number(number) => {
            if let Some(n) = number.as_f64() {
                insert_field(out, key, FieldValue::Number(n));
            }
        }
        Value::String(text) => {
            insert_field(out, key, FieldValue::Text(text.clone()));
        }
        Value::Object(children) => {
            for (child_key, child) in children {
                flatten_value(&format!("{}_{}", key, child_key), child, out);
            }
        }
        Value::Array(_) => {
            tracing::debug!(field = key, "Skipping array field");
        }
    }
}
