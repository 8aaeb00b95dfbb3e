//! Outer join of flattened family tables on calendar date

use crate::flatten::FlattenBatch;
use crate::models::{DailyRecord, FlatRecord, MetricFamily, UnifiedRow, UnifiedTable};
use chrono::NaiveDate;
use std::collections::{BTreeMap, BTreeSet};

/// Joins per-family records into one row per date
#[derive(Debug, Default)]
pub struct Merger {
    days: BTreeMap<NaiveDate, DailyRecord>,
    /// Family-prefixed columns in first-seen family order
    columns: Vec<(MetricFamily, BTreeSet<String>)>,
    duplicates: usize,
}

impl Merger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one family's records. Within a family a later record for the
    /// same date replaces the earlier one.
    pub fn add_family(&mut self, family: MetricFamily, records: Vec<FlatRecord>) {
        let slot = match self.columns.iter().position(|(f, _)| *f == family) {
            Some(idx) => idx,
            None => {
                self.columns.push((family, BTreeSet::new()));
                self.columns.len() - 1
            }
        };

        for record in records {
            let day = self
                .days
                .entry(record.date)
                .or_insert_with(|| DailyRecord::new(record.date));

            if day.families.contains_key(&family) {
                tracing::warn!(
                    family = %family,
                    date = %record.date,
                    "Duplicate record for date, keeping the later one"
                );
                self.duplicates += 1;
            }

            self.columns[slot].1.extend(record.fields.keys().cloned());
            day.families.insert(family, record.fields);
        }
    }

    /// Number of same-family, same-date records that were replaced
    pub fn duplicates(&self) -> usize {
        self.duplicates
    }

    /// Produce the unified table, one row per distinct date, ascending
    pub fn finish(self) -> UnifiedTable {
        let layout: Vec<(MetricFamily, Vec<String>)> = self
            .columns
            .into_iter()
            .map(|(family, fields)| (family, fields.into_iter().collect()))
            .collect();

        let columns: Vec<String> = layout
            .iter()
            .flat_map(|(family, fields)| fields.iter().map(|f| family.column_name(f)))
            .collect();

        let rows = self
            .days
            .into_values()
            .map(|mut day| {
                let mut values = Vec::with_capacity(columns.len());
                for (family, fields) in &layout {
                    let mut family_fields = day.families.remove(family);
                    for field in fields {
                        values.push(family_fields.as_mut().and_then(|m| m.remove(field)));
                    }
                }
                UnifiedRow {
                    date: day.date,
                    values,
                }
            })
            .collect();

        let table = UnifiedTable { columns, rows };
        tracing::info!(
            rows = table.len(),
            columns = table.columns.len(),
            "Merged family tables"
        );
        table
    }
}

/// Merge flattened batches in the given family order
pub fn merge_families(batches: Vec<(MetricFamily, FlattenBatch)>) -> UnifiedTable {
    let mut merger = Merger::new();
    for (family, batch) in batches {
        merger.add_family(family, batch.records);
    }
    merger.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FieldValue;

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, day).unwrap()
    }

    fn record(day: u32, score: f64) -> FlatRecord {
        let mut fields = BTreeMap::new();
        fields.insert("score".to_string(), FieldValue::Number(score));
        FlatRecord {
            date: date(day),
            fields,
        }
    }

    #[test]
    fn test_outer_join_keeps_union_of_dates() {
        let mut merger = Merger::new();
        merger.add_family(MetricFamily::Sleep, vec![record(1, 70.0), record(2, 71.0)]);
        merger.add_family(MetricFamily::Readiness, vec![record(2, 80.0), record(3, 81.0)]);

        let table = merger.finish();

        assert_eq!(table.len(), 3);
        assert_eq!(table.columns, vec!["sleep_score", "readiness_score"]);
        assert_eq!(table.dates(), vec![date(1), date(2), date(3)]);
        assert_eq!(table.value(0, "readiness_score"), None);
        assert_eq!(table.value(1, "readiness_score"), Some(&FieldValue::Number(80.0)));
        assert_eq!(table.value(2, "sleep_score"), None);
    }

    #[test]
    fn test_later_duplicate_wins() {
        let mut merger = Merger::new();
        merger.add_family(MetricFamily::Sleep, vec![record(1, 60.0), record(1, 65.0)]);
        assert_eq!(merger.duplicates(), 1);

        let table = merger.finish();
        assert_eq!(table.len(), 1);
        assert_eq!(table.value(0, "sleep_score"), Some(&FieldValue::Number(65.0)));
    }

    #[test]
    fn test_rows_sorted_regardless_of_input_order() {
        let mut merger = Merger::new();
        merger.add_family(MetricFamily::Activity, vec![record(9, 1.0), record(3, 2.0), record(5, 3.0)]);
        let table = merger.finish();
        assert_eq!(table.dates(), vec![date(3), date(5), date(9)]);
    }

    #[test]
    fn test_same_field_in_two_families_disambiguated() {
        let table = merge_families(vec![
            (
                MetricFamily::Sleep,
                FlattenBatch {
                    records: vec![record(1, 70.0)],
                    rejected: 0,
                },
            ),
            (
                MetricFamily::Activity,
                FlattenBatch {
                    records: vec![record(1, 90.0)],
                    rejected: 0,
                },
            ),
        ]);

        assert_eq!(table.value(0, "sleep_score"), Some(&FieldValue::Number(70.0)));
        assert_eq!(table.value(0, "activity_score"), Some(&FieldValue::Number(90.0)));
    }
}
