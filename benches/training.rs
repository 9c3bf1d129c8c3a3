use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use churnpipe::data::{DataIngestor, Dataset, Record, RecordId, Value};
use churnpipe::preprocessing::{PreprocessingConfig, Preprocessor};
use churnpipe::training::{BackendConfig, ModelTrainer};
use churnpipe::validation::{FeatureSchema, FeatureSpec};
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;

const CONTRACTS: [&str; 3] = ["Month-to-month", "One year", "Two year"];

fn create_churn_data(n_rows: usize) -> Dataset {
    let mut rng = ChaCha8Rng::seed_from_u64(42);

    let records = (0..n_rows)
        .map(|i| {
            let churned = rng.gen_bool(0.25);
            let tenure: f64 = if churned { rng.gen_range(0.0..30.0) } else { rng.gen_range(4.0..72.0) };
            let monthly: f64 = if churned { rng.gen_range(65.0..118.0) } else { rng.gen_range(18.0..95.0) };
            let total = if rng.gen_bool(0.01) { Value::Missing } else { Value::Numeric(tenure * monthly) };
            Record {
                id: RecordId(i),
                values: vec![
                    Value::Numeric(tenure.round()),
                    Value::Numeric(monthly),
                    total,
                    Value::Categorical(CONTRACTS[rng.gen_range(0..CONTRACTS.len())].to_string()),
                ],
                label: u8::from(churned),
            }
        })
        .collect();

    let names = ["tenure", "MonthlyCharges", "TotalCharges", "Contract"].map(String::from).to_vec();
    Dataset::new(names, "Churn", records).unwrap()
}

fn schema() -> FeatureSchema {
    FeatureSchema::new(vec![
        FeatureSpec::numeric("tenure"),
        FeatureSpec::numeric("MonthlyCharges"),
        FeatureSpec::numeric("TotalCharges"),
        FeatureSpec::categorical("Contract"),
    ])
    .unwrap()
}

fn bench_split(c: &mut Criterion) {
    let mut group = c.benchmark_group("split");
    let ingestor = DataIngestor::new("Churn");

    for n_rows in [1000, 10000].iter() {
        let dataset = create_churn_data(*n_rows);
        group.bench_with_input(BenchmarkId::new("stratified", n_rows), &dataset, |b, ds| {
            b.iter(|| ingestor.split(black_box(ds), 0.8, None).unwrap())
        });
    }

    group.finish();
}

fn bench_preprocessing(c: &mut Criterion) {
    let mut group = c.benchmark_group("preprocessing");
    let pre = Preprocessor::new(schema(), PreprocessingConfig::default());

    for n_rows in [1000, 10000].iter() {
        let dataset = create_churn_data(*n_rows);
        group.bench_with_input(BenchmarkId::new("fit", n_rows), &dataset, |b, ds| {
            b.iter(|| pre.fit(black_box(ds)).unwrap())
        });

        let artifact = pre.fit(&dataset).unwrap();
        group.bench_with_input(BenchmarkId::new("transform", n_rows), &dataset, |b, ds| {
            b.iter(|| artifact.transform(black_box(ds)).unwrap())
        });
    }

    group.finish();
}

fn bench_training(c: &mut Criterion) {
    let mut group = c.benchmark_group("training");
    group.sample_size(10); // Fewer samples for training benchmarks

    let pre = Preprocessor::new(schema(), PreprocessingConfig::default());
    let dataset = create_churn_data(5000);
    let artifact = pre.fit(&dataset).unwrap();
    let matrix = artifact.transform(&dataset).unwrap();

    for config in BackendConfig::defaults() {
        let trainer = ModelTrainer::from_configs(std::slice::from_ref(&config));
        group.bench_with_input(BenchmarkId::new("fit", config.name()), &matrix, |b, m| {
            b.iter(|| trainer.train_all(black_box(m)).unwrap())
        });
    }

    let all = ModelTrainer::from_configs(&BackendConfig::defaults());
    group.bench_with_input(BenchmarkId::new("fit", "all_backends"), &matrix, |b, m| {
        b.iter(|| all.train_all(black_box(m)).unwrap())
    });

    group.finish();
}

criterion_group!(benches, bench_split, bench_preprocessing, bench_training);
criterion_main!(benches);
