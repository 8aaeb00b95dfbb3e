//! Property-based tests for the table transformations

use chrono::{Duration, NaiveDate};
use proptest::prelude::*;
use readyrs::features::{lag, rolling_mean};
use readyrs::{merge_families, FieldValue, FlatRecord, FlattenBatch, Flattener, MetricFamily};
use serde_json::{json, Map, Value};
use std::collections::{BTreeMap, BTreeSet};

fn series() -> impl Strategy<Value = Vec<Option<f64>>> {
    prop::collection::vec(prop::option::weighted(0.85, -500.0f64..500.0), 0..60)
}

fn nested_value() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        (-10_000i64..10_000).prop_map(|n| json!(n)),
        "[a-z]{1,8}".prop_map(Value::String),
    ];
    leaf.prop_recursive(4, 32, 4, |inner| {
        prop::collection::btree_map("[a-z]{1,5}", inner, 0..4)
            .prop_map(|m| Value::Object(m.into_iter().collect::<Map<String, Value>>()))
    })
}

fn scalar_leaves(value: &Value) -> usize {
    match value {
        Value::Null | Value::Array(_) => 0,
        Value::Object(children) => children.values().map(scalar_leaves).sum(),
        _ => 1,
    }
}

fn day(offset: u16) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, 1).unwrap() + Duration::days(i64::from(offset))
}

fn batch(days: &[u16]) -> FlattenBatch {
    FlattenBatch {
        records: days
            .iter()
            .map(|&d| FlatRecord {
                date: day(d),
                fields: BTreeMap::from([("score".to_string(), FieldValue::Number(f64::from(d)))]),
            })
            .collect(),
        rejected: 0,
    }
}

proptest! {
    #[test]
    fn test_lag_is_a_row_shift(values in series(), l in 1usize..10) {
        let shifted = lag(&values, l);

        prop_assert_eq!(shifted.len(), values.len());
        for (i, v) in shifted.iter().enumerate() {
            if i < l {
                prop_assert!(v.is_none());
            } else {
                prop_assert_eq!(*v, values[i - l]);
            }
        }
    }

    #[test]
    fn test_rolling_mean_never_uses_partial_windows(values in series(), w in 1usize..10) {
        let rolled = rolling_mean(&values, w);

        prop_assert_eq!(rolled.len(), values.len());
        for (i, v) in rolled.iter().enumerate() {
            if i + 1 < w {
                prop_assert!(v.is_none());
                continue;
            }
            let window = &values[i + 1 - w..=i];
            if window.iter().any(Option::is_none) {
                prop_assert!(v.is_none());
            } else {
                let expected = window.iter().flatten().sum::<f64>() / w as f64;
                let got = v.unwrap();
                prop_assert!((got - expected).abs() < 1e-9);
            }
        }
    }

    #[test]
    fn test_flattened_records_hold_only_scalars(payload in nested_value()) {
        let record = json!({ "day": "2024-03-01", "payload": payload });
        let flat = Flattener::new().flatten(&record).unwrap();

        prop_assert_eq!(flat.date, NaiveDate::from_ymd_opt(2024, 3, 1).unwrap());
        prop_assert_eq!(flat.fields.len(), scalar_leaves(&record["payload"]));
        prop_assert!(flat.fields.keys().all(|k| k.starts_with("payload")));
        prop_assert!(!flat.fields.contains_key("day"));
    }

    #[test]
    fn test_merge_rows_are_union_of_dates(
        sleep in prop::collection::vec(0u16..120, 0..40),
        activity in prop::collection::vec(0u16..120, 0..40),
    ) {
        let table = merge_families(vec![
            (MetricFamily::Sleep, batch(&sleep)),
            (MetricFamily::Activity, batch(&activity)),
        ]);

        let union: BTreeSet<NaiveDate> = sleep.iter().chain(activity.iter()).map(|&d| day(d)).collect();
        prop_assert_eq!(table.len(), union.len());
        prop_assert_eq!(table.dates(), union.into_iter().collect::<Vec<_>>());

        let sleep_days: BTreeSet<NaiveDate> = sleep.iter().map(|&d| day(d)).collect();
        if let Some(scores) = table.numeric_column("sleep_score") {
            for (date, value) in table.dates().iter().zip(scores) {
                prop_assert_eq!(value.is_some(), sleep_days.contains(date));
            }
        }
    }
}
