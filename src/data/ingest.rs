//! Ingestion: load raw records and split them into stratified train/test sets

use super::{DataSource, Dataset, Record, Value};
use crate::error::{PipelineError, Result};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Interprets raw target values as binary labels
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TargetParser {
    /// When set, a value equal to this (case-insensitive) is positive and every
    /// other non-missing value is negative
    pub positive_label: Option<String>,
}

impl TargetParser {
    pub fn with_positive_label(label: impl Into<String>) -> Self {
        Self {
            positive_label: Some(label.into()),
        }
    }

    /// Parse one raw target value into `0` / `1`
    pub fn parse(&self, value: &Value) -> Option<u8> {
        let key = value.category_key()?;
        if let Some(positive) = &self.positive_label {
            return Some(u8::from(key.eq_ignore_ascii_case(positive)));
        }
        match key.to_ascii_lowercase().as_str() {
            "1" | "yes" | "true" | "churned" => Some(1),
            "0" | "no" | "false" | "stayed" => Some(0),
            _ => None,
        }
    }
}

/// Disjoint train/test partition of an ingested dataset
#[derive(Debug, Clone, PartialEq)]
pub struct Split {
    pub train: Dataset,
    pub test: Dataset,
    /// Positive rate of the full ingested dataset
    pub source_positive_rate: f64,
}

/// Loads a source and produces a seeded, stratified split
#[derive(Debug, Clone)]
pub struct DataIngestor {
    target: String,
    drop_columns: Vec<String>,
    parser: TargetParser,
    seed: u64,
    tolerance: f64,
}

impl DataIngestor {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            drop_columns: Vec::new(),
            parser: TargetParser::default(),
            seed: 42,
            tolerance: 0.01,
        }
    }

    pub fn with_drop_columns(mut self, columns: Vec<String>) -> Self {
        self.drop_columns = columns;
        self
    }

    pub fn with_target_parser(mut self, parser: TargetParser) -> Self {
        self.parser = parser;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Maximum allowed deviation of a split's class ratio from the source ratio
    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    /// Load `source` and split it.
    ///
    /// `split_ratio` is the train fraction and must lie in (0, 1). `stratify_on`
    /// names the grouping column; `None` or the target name stratifies on the label.
    pub fn ingest(&self, source: &DataSource, split_ratio: f64, stratify_on: Option<&str>) -> Result<Split> {
        let df = source.load()?;
        if df.height() == 0 {
            return Err(PipelineError::Ingestion("source contains no records".to_string()));
        }
        let dataset = Dataset::from_dataframe(&df, &self.target, &self.drop_columns, &self.parser)?;
        info!(
            records = dataset.len(),
            features = dataset.feature_names().len(),
            positive_rate = dataset.positive_rate(),
            "Ingested source"
        );
        self.split(&dataset, split_ratio, stratify_on)
    }

    /// Stratified split of an already ingested dataset.
    ///
    /// Records are grouped by the stratification key, each group is shuffled and
    /// cut at `round(len * split_ratio)`, then both halves are shuffled again.
    pub fn split(&self, dataset: &Dataset, split_ratio: f64, stratify_on: Option<&str>) -> Result<Split> {
        if !(split_ratio > 0.0 && split_ratio < 1.0) {
            return Err(PipelineError::Ingestion(format!(
                "split ratio must be in (0, 1), got {}",
                split_ratio
            )));
        }
        if dataset.is_empty() {
            return Err(PipelineError::Ingestion("source contains no records".to_string()));
        }

        let groups = match stratify_on {
            None => dataset.group_by_key(label_key),
            Some(col) if col == self.target => dataset.group_by_key(label_key),
            Some(col) => {
                let idx = dataset.column_index(col).ok_or_else(|| {
                    PipelineError::Ingestion(format!("stratification column '{}' not found", col))
                })?;
                dataset.group_by_key(|r| r.values[idx].to_string())
            }
        };

        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
        let mut train_idx = Vec::with_capacity(dataset.len());
        let mut test_idx = Vec::with_capacity(dataset.len());

        for (_key, mut indices) in groups {
            indices.shuffle(&mut rng);
            let cut = ((indices.len() as f64) * split_ratio).round() as usize;
            let cut = cut.min(indices.len());
            train_idx.extend_from_slice(&indices[..cut]);
            test_idx.extend_from_slice(&indices[cut..]);
        }

        if train_idx.is_empty() || test_idx.is_empty() {
            return Err(PipelineError::Ingestion(format!(
                "split ratio {} leaves an empty train or test set for {} records",
                split_ratio,
                dataset.len()
            )));
        }

        train_idx.shuffle(&mut rng);
        test_idx.shuffle(&mut rng);

        let split = Split {
            train: dataset.subset(&train_idx),
            test: dataset.subset(&test_idx),
            source_positive_rate: dataset.positive_rate(),
        };

        for (name, part) in [("train", &split.train), ("test", &split.test)] {
            let drift = (part.positive_rate() - split.source_positive_rate).abs();
            if drift > self.tolerance {
                warn!(
                    split = name,
                    positive_rate = part.positive_rate(),
                    source_rate = split.source_positive_rate,
                    tolerance = self.tolerance,
                    "Split class ratio deviates from source beyond tolerance"
                );
            }
        }

        info!(
            train = split.train.len(),
            test = split.test.len(),
            train_positive_rate = split.train.positive_rate(),
            test_positive_rate = split.test.positive_rate(),
            "Stratified split complete"
        );

        Ok(split)
    }
}

fn label_key(record: &Record) -> String {
    record.label.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::RecordId;
    use std::collections::HashSet;

    fn dataset(n: usize, positive_every: usize) -> Dataset {
        let records = (0..n)
            .map(|i| Record {
                id: RecordId(i),
                values: vec![Value::Numeric(i as f64)],
                label: u8::from(i % positive_every == 0),
            })
            .collect();
        Dataset::new(vec!["x".to_string()], "y", records).unwrap()
    }

    #[test]
    fn test_target_parser() {
        let parser = TargetParser::default();
        assert_eq!(parser.parse(&Value::Categorical("Yes".into())), Some(1));
        assert_eq!(parser.parse(&Value::Categorical("no".into())), Some(0));
        assert_eq!(parser.parse(&Value::Numeric(1.0)), Some(1));
        assert_eq!(parser.parse(&Value::Numeric(2.0)), None);
        assert_eq!(parser.parse(&Value::Missing), None);

        let custom = TargetParser::with_positive_label("Left");
        assert_eq!(custom.parse(&Value::Categorical("left".into())), Some(1));
        assert_eq!(custom.parse(&Value::Categorical("Stayed".into())), Some(0));
    }

    #[test]
    fn test_split_sizes_and_disjointness() {
        let ds = dataset(1000, 5);
        let split = DataIngestor::new("y").split(&ds, 0.8, None).unwrap();

        assert_eq!(split.train.len(), 800);
        assert_eq!(split.test.len(), 200);

        let train: HashSet<_> = split.train.records().iter().map(|r| r.id).collect();
        let test: HashSet<_> = split.test.records().iter().map(|r| r.id).collect();
        assert!(train.is_disjoint(&test));
        assert_eq!(train.len() + test.len(), 1000);
    }

    #[test]
    fn test_split_is_reproducible() {
        let ds = dataset(200, 4);
        let ingestor = DataIngestor::new("y").with_seed(7);
        let a = ingestor.split(&ds, 0.7, None).unwrap();
        let b = ingestor.split(&ds, 0.7, None).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_invalid_ratio() {
        let ds = dataset(10, 2);
        let ingestor = DataIngestor::new("y");
        assert!(matches!(ingestor.split(&ds, 0.0, None), Err(PipelineError::Ingestion(_))));
        assert!(matches!(ingestor.split(&ds, 1.0, None), Err(PipelineError::Ingestion(_))));
    }

    #[test]
    fn test_stratify_on_unknown_column() {
        let ds = dataset(10, 2);
        let err = DataIngestor::new("y").split(&ds, 0.5, Some("region")).unwrap_err();
        assert!(err.to_string().contains("region"));
    }
}
