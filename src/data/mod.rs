//! Dataset representation, loading and ingestion
//!
//! Provides:
//! - Typed record values (numeric, categorical, missing)
//! - Polars-backed loading of CSV / Parquet / JSON sources
//! - Stratified, seeded train/test splitting

mod loader;
mod ingest;

pub use loader::{DataLoader, DataSource};
pub use ingest::{DataIngestor, Split, TargetParser};

use crate::error::{PipelineError, Result};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A single typed cell value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Numeric(f64),
    Categorical(String),
    Missing,
}

impl Value {
    pub fn is_missing(&self) -> bool {
        matches!(self, Value::Missing)
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Numeric(v) => Some(*v),
            _ => None,
        }
    }

    /// Canonical text form used for category matching.
    ///
    /// Integral numbers drop their fractional part so `1.0` matches the category `"1"`.
    pub fn category_key(&self) -> Option<String> {
        match self {
            Value::Categorical(s) => Some(s.clone()),
            Value::Numeric(v) if v.fract() == 0.0 && v.is_finite() => Some(format!("{}", *v as i64)),
            Value::Numeric(v) => Some(v.to_string()),
            Value::Missing => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Numeric(v) => write!(f, "{}", v),
            Value::Categorical(s) => write!(f, "{}", s),
            Value::Missing => write!(f, "<missing>"),
        }
    }
}

/// Stable identity of a record: its row index in the ingested source
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RecordId(pub usize);

/// One row: feature values aligned with [`Dataset::feature_names`] plus a binary label
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: RecordId,
    pub values: Vec<Value>,
    pub label: u8,
}

/// Ordered collection of labelled records
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    feature_names: Vec<String>,
    target: String,
    records: Vec<Record>,
}

impl Dataset {
    /// Create a dataset, checking that every record is aligned with the columns
    /// and carries a binary label.
    pub fn new(feature_names: Vec<String>, target: impl Into<String>, records: Vec<Record>) -> Result<Self> {
        let width = feature_names.len();
        for record in &records {
            if record.values.len() != width {
                return Err(PipelineError::Data(format!(
                    "record {} has {} values, expected {}",
                    record.id.0,
                    record.values.len(),
                    width
                )));
            }
            if record.label > 1 {
                return Err(PipelineError::Data(format!(
                    "record {} has non-binary label {}",
                    record.id.0, record.label
                )));
            }
        }
        Ok(Self {
            feature_names,
            target: target.into(),
            records,
        })
    }

    /// Build a dataset from a polars frame.
    ///
    /// Every column except `target` and `drop_columns` becomes a feature column.
    pub fn from_dataframe(
        df: &DataFrame,
        target: &str,
        drop_columns: &[String],
        parser: &TargetParser,
    ) -> Result<Self> {
        let target_column = df
            .column(target)
            .map_err(|_| PipelineError::Ingestion(format!("target column '{}' not found", target)))?;
        let labels = column_values(target_column.as_materialized_series())?
            .into_iter()
            .enumerate()
            .map(|(row, value)| {
                parser.parse(&value).ok_or_else(|| {
                    PipelineError::Ingestion(format!(
                        "row {}: target '{}' has non-binary value {}",
                        row, target, value
                    ))
                })
            })
            .collect::<Result<Vec<u8>>>()?;

        let feature_names: Vec<String> = df
            .get_column_names()
            .into_iter()
            .map(|name| name.to_string())
            .filter(|name| name != target && !drop_columns.contains(name))
            .collect();

        let columns: Vec<Vec<Value>> = feature_names
            .iter()
            .map(|name| {
                let column = df
                    .column(name)
                    .map_err(|e| PipelineError::Ingestion(format!("column '{}': {}", name, e)))?;
                column_values(column.as_materialized_series())
            })
            .collect::<Result<_>>()?;

        let records = labels
            .into_iter()
            .enumerate()
            .map(|(row, label)| Record {
                id: RecordId(row),
                values: columns.iter().map(|col| col[row].clone()).collect(),
                label,
            })
            .collect();

        Self::new(feature_names, target, records)
    }

    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.feature_names.iter().position(|n| n == name)
    }

    /// Iterate over one column's values, in record order
    pub fn column<'a>(&'a self, idx: usize) -> impl Iterator<Item = &'a Value> + 'a {
        self.records.iter().map(move |r| &r.values[idx])
    }

    /// `(negatives, positives)`
    pub fn class_counts(&self) -> (usize, usize) {
        let positives = self.records.iter().filter(|r| r.label == 1).count();
        (self.records.len() - positives, positives)
    }

    /// Fraction of positive labels; 0.0 for an empty dataset
    pub fn positive_rate(&self) -> f64 {
        if self.records.is_empty() {
            return 0.0;
        }
        self.class_counts().1 as f64 / self.records.len() as f64
    }

    /// Record indices grouped by a key, groups ordered by key
    pub fn group_by_key<F>(&self, key: F) -> BTreeMap<String, Vec<usize>>
    where
        F: Fn(&Record) -> String,
    {
        let mut groups: BTreeMap<String, Vec<usize>> = BTreeMap::new();
        for (i, record) in self.records.iter().enumerate() {
            groups.entry(key(record)).or_default().push(i);
        }
        groups
    }

    /// New dataset holding clones of the records at `indices`, in that order
    pub fn subset(&self, indices: &[usize]) -> Self {
        Self {
            feature_names: self.feature_names.clone(),
            target: self.target.clone(),
            records: indices.iter().map(|&i| self.records[i].clone()).collect(),
        }
    }
}

/// Convert a polars series into typed values.
///
/// Numeric dtypes become [`Value::Numeric`], strings become [`Value::Categorical`]
/// (blank strings are missing), booleans become `"true"` / `"false"` categories.
/// Nested columns and failed conversions are ingestion errors.
fn column_values(series: &Series) -> Result<Vec<Value>> {
    let unreadable = |e: PolarsError| {
        PipelineError::Ingestion(format!("column '{}' cannot be read: {}", series.name(), e))
    };

    let values = match series.dtype() {
        DataType::Int8 | DataType::Int16 | DataType::Int32 | DataType::Int64 |
        DataType::UInt8 | DataType::UInt16 | DataType::UInt32 | DataType::UInt64 |
        DataType::Float32 | DataType::Float64 => {
            let casted = series.cast(&DataType::Float64).map_err(unreadable)?;
            casted
                .f64()
                .map_err(unreadable)?
                .into_iter()
                .map(|v| match v {
                    Some(x) if x.is_finite() => Value::Numeric(x),
                    _ => Value::Missing,
                })
                .collect()
        }
        DataType::Boolean => series
            .bool()
            .map_err(unreadable)?
            .into_iter()
            .map(|v| match v {
                Some(b) => Value::Categorical(b.to_string()),
                None => Value::Missing,
            })
            .collect(),
        DataType::String => series.str().map_err(unreadable)?.into_iter().map(text_value).collect(),
        dtype if dtype.is_nested() => {
            return Err(PipelineError::Ingestion(format!(
                "column '{}' has unsupported type {}",
                series.name(),
                dtype
            )));
        }
        _ => {
            let casted = series.cast(&DataType::String).map_err(unreadable)?;
            casted.str().map_err(unreadable)?.into_iter().map(text_value).collect()
        }
    };
    Ok(values)
}

fn text_value(v: Option<&str>) -> Value {
    match v.map(str::trim) {
        Some(s) if !s.is_empty() => Value::Categorical(s.to_string()),
        _ => Value::Missing,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame() -> DataFrame {
        df!(
            "customer_id" => &["a", "b", "c", "d"],
            "tenure" => &[1.0, 24.0, 60.0, 3.0],
            "contract" => &["Month-to-month", "One year", " ", "Two year"],
            "churn" => &["Yes", "No", "No", "yes"]
        )
        .unwrap()
    }

    #[test]
    fn test_from_dataframe() {
        let df = frame();
        let ds = Dataset::from_dataframe(&df, "churn", &["customer_id".to_string()], &TargetParser::default()).unwrap();

        assert_eq!(ds.feature_names(), &["tenure".to_string(), "contract".to_string()]);
        assert_eq!(ds.len(), 4);
        assert_eq!(ds.class_counts(), (2, 2));
        assert_eq!(ds.records()[0].values[0], Value::Numeric(1.0));
        assert_eq!(ds.records()[2].values[1], Value::Missing);
        assert_eq!(ds.records()[3].id, RecordId(3));
    }

    #[test]
    fn test_missing_target() {
        let df = frame();
        let err = Dataset::from_dataframe(&df, "label", &[], &TargetParser::default()).unwrap_err();
        assert!(matches!(err, PipelineError::Ingestion(_)));
    }

    #[test]
    fn test_nested_column_is_ingestion_error() {
        let tags = Series::new(
            "tags".into(),
            &[
                Series::new("".into(), &[1i32, 2]),
                Series::new("".into(), &[3i32]),
                Series::new("".into(), &[4i32]),
                Series::new("".into(), &[5i32, 6]),
            ],
        );
        let mut df = frame();
        df.with_column(tags).unwrap();

        let err = Dataset::from_dataframe(&df, "churn", &[], &TargetParser::default()).unwrap_err();
        assert!(matches!(err, PipelineError::Ingestion(_)));
        assert_eq!(err.exit_code(), 3);
        assert!(err.to_string().contains("tags"));
    }

    #[test]
    fn test_category_key() {
        assert_eq!(Value::Numeric(1.0).category_key().as_deref(), Some("1"));
        assert_eq!(Value::Numeric(1.5).category_key().as_deref(), Some("1.5"));
        assert_eq!(Value::Categorical("x".into()).category_key().as_deref(), Some("x"));
        assert_eq!(Value::Missing.category_key(), None);
    }

    #[test]
    fn test_misaligned_record_rejected() {
        let records = vec![Record { id: RecordId(0), values: vec![Value::Missing], label: 0 }];
        assert!(Dataset::new(vec!["a".into(), "b".into()], "y", records).is_err());
    }
}
