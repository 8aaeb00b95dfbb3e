use chrono::NaiveDate;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use readyrs::forecast::ForestConfig;
use readyrs::pipeline::{Pipeline, PipelineConfig};
use readyrs::source::RecordSource;
use readyrs::{
    AnomalyDetector, BaselineCalculator, FeatureEngineer, Flattener, MetricFamily,
    RandomForestRegressor, Regressor, SyntheticSource, UnifiedTable,
};

/// Performance benchmarks for the analytics pipeline
///
/// Dataset sizes cover a month, a quarter and a year of daily records.

fn end_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 12, 31).unwrap()
}

fn merged_table(days: u32) -> UnifiedTable {
    let source = SyntheticSource::ending_on(end_date(), days, 42).unwrap();
    let flattener = Flattener::new();
    let batches = MetricFamily::ALL
        .into_iter()
        .map(|family| {
            let records = source.fetch(family).unwrap();
            (family, flattener.flatten_all(family, &records))
        })
        .collect();
    readyrs::merge_families(batches)
}

fn bench_merge(c: &mut Criterion) {
    let mut group = c.benchmark_group("Flatten and Merge");

    for &days in &[30u32, 90, 365] {
        let source = SyntheticSource::ending_on(end_date(), days, 42).unwrap();
        let raw: Vec<_> = MetricFamily::ALL
            .into_iter()
            .map(|family| (family, source.fetch(family).unwrap()))
            .collect();

        group.throughput(Throughput::Elements(days as u64));
        group.bench_with_input(BenchmarkId::new("merge_families", days), &raw, |b, raw| {
            b.iter(|| {
                let flattener = Flattener::new();
                let batches = raw
                    .iter()
                    .map(|(family, records)| (*family, flattener.flatten_all(*family, records)))
                    .collect();
                black_box(readyrs::merge_families(batches))
            });
        });
    }

    group.finish();
}

fn bench_feature_engineering(c: &mut Criterion) {
    let mut group = c.benchmark_group("Feature Engineering");
    let engineer = FeatureEngineer::new();

    for &days in &[30u32, 90, 365] {
        let table = merged_table(days);

        group.throughput(Throughput::Elements(days as u64));
        group.bench_with_input(BenchmarkId::new("engineer", days), &table, |b, table| {
            b.iter(|| black_box(engineer.engineer(table).unwrap()));
        });
    }

    group.finish();
}

fn bench_baselines_and_anomalies(c: &mut Criterion) {
    let mut group = c.benchmark_group("Baselines and Anomalies");

    for &days in &[30u32, 90, 365] {
        let table = merged_table(days);

        group.throughput(Throughput::Elements(days as u64));
        group.bench_with_input(BenchmarkId::new("detect", days), &table, |b, table| {
            b.iter(|| {
                let baselines = BaselineCalculator::new().calculate(table);
                black_box(AnomalyDetector::new().detect(table, &baselines).unwrap())
            });
        });
    }

    group.finish();
}

fn bench_forest_training(c: &mut Criterion) {
    let mut group = c.benchmark_group("Random Forest");
    group.sample_size(20);

    for &rows in &[50usize, 200, 500] {
        let x: Vec<Vec<f64>> = (0..rows)
            .map(|i| {
                let t = i as f64;
                vec![(t * 0.3).sin() * 10.0 + 70.0, (t * 0.7).cos() * 5.0 + 80.0, t % 7.0]
            })
            .collect();
        let y: Vec<f64> = x.iter().map(|f| 0.6 * f[0] + 0.3 * f[1] - f[2]).collect();

        group.throughput(Throughput::Elements(rows as u64));
        group.bench_with_input(BenchmarkId::new("fit", rows), &(x, y), |b, (x, y)| {
            b.iter(|| {
                let mut forest = RandomForestRegressor::new(ForestConfig {
                    n_trees: 50,
                    ..ForestConfig::default()
                });
                forest.fit(x, y).unwrap();
                black_box(forest)
            });
        });
    }

    group.finish();
}

fn bench_full_pipeline(c: &mut Criterion) {
    let mut group = c.benchmark_group("Full Pipeline");
    group.sample_size(10);

    let mut config = PipelineConfig::default();
    config.forecast.forest.n_trees = 50;

    for &days in &[90u32, 365] {
        let source = SyntheticSource::ending_on(end_date(), days, 42).unwrap();

        group.throughput(Throughput::Elements(days as u64));
        group.bench_with_input(BenchmarkId::new("run", days), &source, |b, source| {
            b.iter(|| black_box(Pipeline::new(config.clone()).run(source).unwrap()));
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_merge,
    bench_feature_engineering,
    bench_baselines_and_anomalies,
    bench_forest_training,
    bench_full_pipeline
);
criterion_main!(benches);
