//! Integration tests for ingestion: loading, target parsing and stratified splitting

mod common;

use churnpipe::data::{DataIngestor, DataSource, RecordId, TargetParser};
use churnpipe::error::PipelineError;
use common::{churn_dataset, churn_frame, write_csv, TARGET};
use polars::prelude::*;
use proptest::prelude::*;
use std::collections::HashSet;
use tempfile::tempdir;

fn ingestor() -> DataIngestor {
    DataIngestor::new(TARGET)
        .with_drop_columns(vec!["customerID".to_string()])
        .with_target_parser(TargetParser::with_positive_label("Yes"))
}

#[test]
fn test_end_to_end_split_sizes() {
    let split = ingestor()
        .ingest(&DataSource::Frame(churn_frame(1000, 0.2, 7)), 0.8, None)
        .unwrap();

    assert_eq!(split.train.len(), 800);
    assert_eq!(split.test.len(), 200);
    assert!((split.source_positive_rate - 0.2).abs() < 1e-12);
    assert!((split.train.positive_rate() - 0.2).abs() <= 0.01);
    assert!((split.test.positive_rate() - 0.2).abs() <= 0.01);
    assert!(!split.train.feature_names().contains(&"customerID".to_string()));
}

#[test]
fn test_split_is_reproducible() {
    let dataset = churn_dataset(300, 0.3, 1);
    let a = ingestor().with_seed(9).split(&dataset, 0.7, None).unwrap();
    let b = ingestor().with_seed(9).split(&dataset, 0.7, None).unwrap();
    let c = ingestor().with_seed(10).split(&dataset, 0.7, None).unwrap();

    assert_eq!(a, b);
    assert_ne!(a.train.records(), c.train.records());
}

#[test]
fn test_stratify_on_feature_column() {
    let dataset = churn_dataset(600, 0.2, 3);
    let split = ingestor().split(&dataset, 0.5, Some("Contract")).unwrap();
    assert_eq!(split.train.len() + split.test.len(), 600);

    let bad = ingestor().split(&dataset, 0.5, Some("Region"));
    assert!(matches!(bad, Err(PipelineError::Ingestion(_))));
}

#[test]
fn test_csv_source() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("churn.csv");
    write_csv(&churn_frame(200, 0.25, 5), &path);

    let split = ingestor().ingest(&DataSource::path(&path), 0.8, None).unwrap();
    assert_eq!(split.train.len() + split.test.len(), 200);
    assert_eq!(split.train.class_counts().1 + split.test.class_counts().1, 50);
}

#[test]
fn test_unreadable_source() {
    let err = ingestor()
        .ingest(&DataSource::path("/nonexistent/churn.csv"), 0.8, None)
        .unwrap_err();
    assert!(matches!(err, PipelineError::Ingestion(_)));
    assert_eq!(err.exit_code(), 3);
}

#[test]
fn test_missing_target_column() {
    let df = churn_frame(50, 0.2, 1).drop(TARGET).unwrap();
    let err = ingestor().ingest(&DataSource::Frame(df), 0.8, None).unwrap_err();
    assert!(matches!(err, PipelineError::Ingestion(_)));
}

#[test]
fn test_empty_source() {
    let df = churn_frame(50, 0.2, 1).head(Some(0));
    assert!(matches!(
        ingestor().ingest(&DataSource::Frame(df), 0.8, None),
        Err(PipelineError::Ingestion(_))
    ));
}

#[test]
fn test_invalid_ratio() {
    let frame = DataSource::Frame(churn_frame(50, 0.2, 1));
    for ratio in [0.0, 1.0, -0.5, 1.5] {
        assert!(ingestor().ingest(&frame, ratio, None).is_err(), "ratio {}", ratio);
    }
}

#[test]
fn test_unparseable_target() {
    let df = df!(
        "x" => &[1.0, 2.0, 3.0],
        "Churn" => &["yes", "maybe", "no"]
    )
    .unwrap();
    let err = DataIngestor::new("Churn")
        .ingest(&DataSource::Frame(df), 0.5, None)
        .unwrap_err();
    assert!(err.to_string().contains("maybe"));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn prop_split_preserves_class_ratio(
        n in 500usize..1500,
        positive_rate in 0.1f64..0.5,
        ratio in 0.5f64..0.85,
        seed in any::<u64>(),
    ) {
        let dataset = churn_dataset(n, positive_rate, 11);
        let split = ingestor().with_seed(seed).split(&dataset, ratio, None).unwrap();
        let source = dataset.positive_rate();

        prop_assert!((split.train.positive_rate() - source).abs() <= 0.01);
        prop_assert!((split.test.positive_rate() - source).abs() <= 0.01);
    }

    #[test]
    fn prop_split_is_a_partition(
        n in 20usize..400,
        ratio in 0.1f64..0.9,
        seed in any::<u64>(),
    ) {
        let dataset = churn_dataset(n, 0.3, 13);
        let split = match ingestor().with_seed(seed).split(&dataset, ratio, None) {
            Ok(split) => split,
            // tiny inputs may legitimately leave one side empty
            Err(PipelineError::Ingestion(_)) => return Ok(()),
            Err(other) => return Err(TestCaseError::fail(other.to_string())),
        };

        let train: HashSet<RecordId> = split.train.records().iter().map(|r| r.id).collect();
        let test: HashSet<RecordId> = split.test.records().iter().map(|r| r.id).collect();

        prop_assert_eq!(train.len(), split.train.len());
        prop_assert_eq!(test.len(), split.test.len());
        prop_assert!(train.is_disjoint(&test));

        let union: HashSet<RecordId> = train.union(&test).copied().collect();
        let source: HashSet<RecordId> = dataset.records().iter().map(|r| r.id).collect();
        prop_assert_eq!(union, source);
    }
}
