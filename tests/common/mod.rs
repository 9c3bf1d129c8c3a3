//! Shared helpers for integration tests: seeded synthetic churn data and a
//! matching pipeline configuration.

#![allow(dead_code)]

use churnpipe::config::PipelineConfig;
use churnpipe::data::{Dataset, TargetParser};
use churnpipe::training::{
    BackendConfig, LightGBMConfig, LogisticRegressionConfig, RandomForestConfig, XGBoostConfig,
};
use churnpipe::validation::FeatureSpec;
use polars::prelude::*;
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use std::path::Path;

pub const TARGET: &str = "Churn";

pub const CONTRACTS: [&str; 3] = ["Month-to-month", "One year", "Two year"];
pub const PAYMENTS: [&str; 4] = ["Electronic check", "Mailed check", "Bank transfer", "Credit card"];

/// Telco-style churn frame with exactly `round(n * positive_rate)` churners.
///
/// Churners skew toward short tenure, high charges and monthly contracts, so
/// every backend can learn a useful signal. About 1% of `total_charges` is null.
pub fn churn_frame(n: usize, positive_rate: f64, seed: u64) -> DataFrame {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);

    let n_pos = (n as f64 * positive_rate).round() as usize;
    let mut labels: Vec<bool> = (0..n).map(|i| i < n_pos).collect();
    labels.shuffle(&mut rng);

    let mut ids = Vec::with_capacity(n);
    let mut tenure = Vec::with_capacity(n);
    let mut monthly = Vec::with_capacity(n);
    let mut total = Vec::with_capacity(n);
    let mut contract = Vec::with_capacity(n);
    let mut payment = Vec::with_capacity(n);
    let mut churn = Vec::with_capacity(n);

    for (i, &churned) in labels.iter().enumerate() {
        let (t, m): (f64, f64) = if churned {
            (rng.gen_range(0.0..30.0), rng.gen_range(65.0..118.0))
        } else {
            (rng.gen_range(4.0..72.0), rng.gen_range(18.0..95.0))
        };
        let c = if churned {
            if rng.gen_bool(0.8) { 0 } else { rng.gen_range(1..3) }
        } else {
            rng.gen_range(0..3)
        };

        ids.push(format!("C{:05}", i));
        tenure.push(t.round());
        monthly.push(m);
        total.push(if rng.gen_bool(0.01) { None } else { Some(t * m) });
        contract.push(CONTRACTS[c]);
        payment.push(PAYMENTS[rng.gen_range(0..PAYMENTS.len())]);
        churn.push(if churned { "Yes" } else { "No" });
    }

    df!(
        "customerID" => &ids,
        "tenure" => &tenure,
        "MonthlyCharges" => &monthly,
        "TotalCharges" => &total,
        "Contract" => &contract,
        "PaymentMethod" => &payment,
        TARGET => &churn
    )
    .unwrap()
}

pub fn churn_dataset(n: usize, positive_rate: f64, seed: u64) -> Dataset {
    Dataset::from_dataframe(
        &churn_frame(n, positive_rate, seed),
        TARGET,
        &["customerID".to_string()],
        &TargetParser::with_positive_label("Yes"),
    )
    .unwrap()
}

/// Feature declarations matching [`churn_frame`]
pub fn churn_features() -> Vec<FeatureSpec> {
    vec![
        FeatureSpec::numeric("tenure").with_range(0.0, 72.0).not_null(),
        FeatureSpec::numeric("MonthlyCharges").with_range(0.0, 150.0),
        FeatureSpec::numeric("TotalCharges").with_range(0.0, 10_000.0),
        FeatureSpec::categorical("Contract").with_categories(CONTRACTS),
        FeatureSpec::categorical("PaymentMethod").with_categories(PAYMENTS),
    ]
}

/// Small, fast hyperparameters for all four backends
pub fn fast_backends() -> Vec<BackendConfig> {
    vec![
        BackendConfig::LogisticRegression(LogisticRegressionConfig {
            max_iter: 300,
            ..Default::default()
        }),
        BackendConfig::RandomForest(RandomForestConfig {
            n_estimators: 15,
            max_depth: Some(6),
            ..Default::default()
        }),
        BackendConfig::XGBoost(XGBoostConfig {
            n_estimators: 20,
            max_depth: 3,
            ..Default::default()
        }),
        BackendConfig::LightGBM(LightGBMConfig {
            n_estimators: 20,
            max_leaves: 8,
            ..Default::default()
        }),
    ]
}

/// Complete configuration for the synthetic data, writing under `output_dir`
pub fn churn_config(data_path: &Path, output_dir: &Path) -> PipelineConfig {
    let mut config = PipelineConfig::default()
        .with_data_path(data_path)
        .with_output_dir(output_dir);
    config.data.target = TARGET.to_string();
    config.data.positive_label = Some("Yes".to_string());
    config.data.drop_columns = vec!["customerID".to_string()];
    config.schema.features = churn_features();
    config.backends = fast_backends();
    config
}

pub fn write_csv(df: &DataFrame, path: &Path) {
    let mut file = std::fs::File::create(path).unwrap();
    CsvWriter::new(&mut file).finish(&mut df.clone()).unwrap();
}
