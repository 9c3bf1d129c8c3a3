//! Fit-on-train preprocessing pipeline

use super::{
    config::PreprocessingConfig,
    encoder::CategoryEncoder,
    scaler::{impute_value, ImputeStrategy, Scaler, ScalerParams, ScalerType},
};
use crate::data::{Dataset, RecordId, Value};
use crate::error::{PipelineError, Result};
use crate::validation::{FeatureSchema, FeatureSpec, FeatureType};
use ndarray::{Array1, Array2};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// Fitted transform for one declared feature
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FeatureTransform {
    Numeric {
        feature: String,
        /// Replacement for missing values, applied before scaling
        fill_value: f64,
        scaler: ScalerParams,
    },
    Categorical {
        feature: String,
        encoder: CategoryEncoder,
    },
}

impl FeatureTransform {
    pub fn feature(&self) -> &str {
        match self {
            FeatureTransform::Numeric { feature, .. } | FeatureTransform::Categorical { feature, .. } => feature,
        }
    }

    /// Number of output columns produced by this transform
    pub fn width(&self) -> usize {
        match self {
            FeatureTransform::Numeric { .. } => 1,
            FeatureTransform::Categorical { encoder, .. } => encoder.width(),
        }
    }

    fn write(&self, value: Option<&Value>, out: &mut [f64]) {
        match self {
            FeatureTransform::Numeric { fill_value, scaler, .. } => {
                let x = match value {
                    Some(Value::Numeric(x)) => *x,
                    _ => *fill_value,
                };
                out[0] = scaler.apply(x);
            }
            FeatureTransform::Categorical { encoder, .. } => {
                let key = value.and_then(Value::category_key);
                encoder.encode_into(key.as_deref(), out);
            }
        }
    }
}

/// Model-ready matrix produced by applying a [`PreprocessingArtifact`]
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureMatrix {
    pub columns: Vec<String>,
    pub x: Array2<f64>,
    pub y: Array1<f64>,
    pub ids: Vec<RecordId>,
}

impl FeatureMatrix {
    pub fn n_rows(&self) -> usize {
        self.x.nrows()
    }

    pub fn n_features(&self) -> usize {
        self.x.ncols()
    }
}

/// Serializable fitted state of every feature transform.
///
/// Immutable once fit; downstream stages share it through `Arc`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreprocessingArtifact {
    pub scaler_type: ScalerType,
    pub imputation: ImputeStrategy,
    /// One entry per declared feature, in schema order
    pub transforms: Vec<FeatureTransform>,
    pub output_columns: Vec<String>,
    /// Rows of the training split the artifact was fit on
    pub n_train_rows: usize,
}

impl PreprocessingArtifact {
    pub fn n_outputs(&self) -> usize {
        self.output_columns.len()
    }

    pub fn scaler_for(&self, feature: &str) -> Option<&ScalerParams> {
        self.transforms.iter().find_map(|t| match t {
            FeatureTransform::Numeric { feature: f, scaler, .. } if f == feature => Some(scaler),
            _ => None,
        })
    }

    pub fn encoder_for(&self, feature: &str) -> Option<&CategoryEncoder> {
        self.transforms.iter().find_map(|t| match t {
            FeatureTransform::Categorical { feature: f, encoder } if f == feature => Some(encoder),
            _ => None,
        })
    }

    pub fn scaler_count(&self) -> usize {
        self.transforms.iter().filter(|t| matches!(t, FeatureTransform::Numeric { .. })).count()
    }

    pub fn encoder_count(&self) -> usize {
        self.transforms.iter().filter(|t| matches!(t, FeatureTransform::Categorical { .. })).count()
    }

    /// Apply the artifact to a dataset. Pure: never refits.
    pub fn transform(&self, dataset: &Dataset) -> Result<FeatureMatrix> {
        let start = Instant::now();
        let columns: Vec<usize> = self
            .transforms
            .iter()
            .map(|t| {
                dataset.column_index(t.feature()).ok_or_else(|| {
                    PipelineError::Preprocessing(format!("column '{}' missing from dataset", t.feature()))
                })
            })
            .collect::<Result<_>>()?;

        let rows: Vec<Vec<f64>> = dataset
            .records()
            .par_iter()
            .map(|record| self.encode(|i| Some(&record.values[columns[i]])))
            .collect();

        let n = rows.len();
        let flat: Vec<f64> = rows.into_iter().flatten().collect();
        let x = Array2::from_shape_vec((n, self.n_outputs()), flat)?;
        let y = dataset.records().iter().map(|r| f64::from(r.label)).collect::<Array1<f64>>();
        let ids = dataset.records().iter().map(|r| r.id).collect();

        debug!(rows = n, columns = self.n_outputs(), elapsed_ms = start.elapsed().as_millis() as u64, "Transformed dataset");

        Ok(FeatureMatrix {
            columns: self.output_columns.clone(),
            x,
            y,
            ids,
        })
    }

    /// Apply the artifact to one record keyed by feature name.
    ///
    /// Absent features are treated as missing, so the result is always defined.
    pub fn transform_record(&self, values: &HashMap<String, Value>) -> Array1<f64> {
        Array1::from(self.encode(|i| values.get(self.transforms[i].feature())))
    }

    fn encode<'a, F>(&self, value_of: F) -> Vec<f64>
    where
        F: Fn(usize) -> Option<&'a Value>,
    {
        let mut out = vec![0.0; self.n_outputs()];
        let mut offset = 0;
        for (i, transform) in self.transforms.iter().enumerate() {
            let width = transform.width();
            transform.write(value_of(i), &mut out[offset..offset + width]);
            offset += width;
        }
        out
    }
}

/// Fits a [`PreprocessingArtifact`] on the training split
#[derive(Debug, Clone)]
pub struct Preprocessor {
    config: PreprocessingConfig,
    schema: FeatureSchema,
}

impl Preprocessor {
    pub fn new(schema: FeatureSchema, config: PreprocessingConfig) -> Self {
        Self { config, schema }
    }

    pub fn config(&self) -> &PreprocessingConfig {
        &self.config
    }

    /// Fit every declared feature from `train` only
    pub fn fit(&self, train: &Dataset) -> Result<Arc<PreprocessingArtifact>> {
        let start = Instant::now();

        if train.is_empty() {
            return Err(PipelineError::Preprocessing("training split is empty".to_string()));
        }

        let transforms = self
            .schema
            .features()
            .par_iter()
            .map(|spec| self.fit_feature(train, spec))
            .collect::<Result<Vec<_>>>()?;

        let output_columns = transforms
            .iter()
            .flat_map(|t| match t {
                FeatureTransform::Numeric { feature, .. } => vec![feature.clone()],
                FeatureTransform::Categorical { feature, encoder } => encoder.column_names(feature),
            })
            .collect::<Vec<_>>();

        let artifact = PreprocessingArtifact {
            scaler_type: self.config.scaler,
            imputation: self.config.numeric_imputation,
            transforms,
            output_columns,
            n_train_rows: train.len(),
        };

        info!(
            features = artifact.transforms.len(),
            outputs = artifact.n_outputs(),
            elapsed_secs = start.elapsed().as_secs_f64(),
            "Fitted preprocessing artifact"
        );

        Ok(Arc::new(artifact))
    }

    /// Apply a fitted artifact
    pub fn transform(&self, dataset: &Dataset, artifact: &PreprocessingArtifact) -> Result<FeatureMatrix> {
        artifact.transform(dataset)
    }

    fn fit_feature(&self, train: &Dataset, spec: &FeatureSpec) -> Result<FeatureTransform> {
        let idx = train.column_index(&spec.name).ok_or_else(|| {
            PipelineError::Preprocessing(format!("column '{}' missing from training split", spec.name))
        })?;

        match spec.feature_type {
            FeatureType::Numeric => {
                let observed: Vec<f64> = train.column(idx).filter_map(Value::as_f64).collect();
                let fill_value = impute_value(&spec.name, &observed, self.config.numeric_imputation)?;
                let imputed: Vec<f64> = train
                    .column(idx)
                    .map(|v| v.as_f64().unwrap_or(fill_value))
                    .collect();
                let scaler = Scaler::new(self.config.scaler).fit(&spec.name, &imputed)?;
                Ok(FeatureTransform::Numeric {
                    feature: spec.name.clone(),
                    fill_value,
                    scaler,
                })
            }
            FeatureType::Categorical => {
                let keys: Vec<String> = train.column(idx).filter_map(Value::category_key).collect();
                if keys.is_empty() {
                    return Err(PipelineError::Preprocessing(format!(
                        "feature '{}' has no usable rows in the training split",
                        spec.name
                    )));
                }
                Ok(FeatureTransform::Categorical {
                    feature: spec.name.clone(),
                    encoder: CategoryEncoder::fit(keys.iter().map(String::as_str)),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Record;

    fn dataset(rows: &[(Value, Value, u8)]) -> Dataset {
        let records = rows
            .iter()
            .enumerate()
            .map(|(i, (a, b, y))| Record {
                id: RecordId(i),
                values: vec![a.clone(), b.clone()],
                label: *y,
            })
            .collect();
        Dataset::new(vec!["tenure".into(), "contract".into()], "churn", records).unwrap()
    }

    fn schema() -> FeatureSchema {
        FeatureSchema::new(vec![FeatureSpec::numeric("tenure"), FeatureSpec::categorical("contract")]).unwrap()
    }

    fn train() -> Dataset {
        dataset(&[
            (Value::Numeric(1.0), Value::Categorical("monthly".into()), 1),
            (Value::Numeric(3.0), Value::Categorical("yearly".into()), 0),
            (Value::Missing, Value::Categorical("monthly".into()), 0),
        ])
    }

    #[test]
    fn test_fit_artifact_shape() {
        let artifact = Preprocessor::new(schema(), PreprocessingConfig::default()).fit(&train()).unwrap();

        assert_eq!(artifact.scaler_count(), 1);
        assert_eq!(artifact.encoder_count(), 1);
        assert_eq!(
            artifact.output_columns,
            vec!["tenure", "contract=monthly", "contract=yearly", "contract=__unknown__"]
        );
        assert_eq!(artifact.scaler_for("tenure").unwrap().center, 2.0);
        assert_eq!(artifact.encoder_for("contract").unwrap().categories(), ["monthly", "yearly"]);
        assert!(artifact.encoder_for("tenure").is_none());
    }

    #[test]
    fn test_transform_imputes_and_encodes() {
        let artifact = Preprocessor::new(schema(), PreprocessingConfig::default()).fit(&train()).unwrap();
        let test = dataset(&[(Value::Missing, Value::Categorical("weekly".into()), 1)]);
        let matrix = artifact.transform(&test).unwrap();

        assert_eq!(matrix.n_rows(), 1);
        assert_eq!(matrix.x.row(0).to_vec(), vec![0.0, 0.0, 0.0, 1.0]);
        assert_eq!(matrix.y[0], 1.0);
    }

    #[test]
    fn test_transform_record_matches_dataset_transform() {
        let artifact = Preprocessor::new(schema(), PreprocessingConfig::default()).fit(&train()).unwrap();
        let matrix = artifact.transform(&train()).unwrap();

        let mut values = HashMap::new();
        values.insert("tenure".to_string(), Value::Numeric(1.0));
        values.insert("contract".to_string(), Value::Categorical("monthly".into()));
        assert_eq!(artifact.transform_record(&values), matrix.x.row(0).to_owned());
    }

    #[test]
    fn test_all_missing_numeric_feature_fails() {
        let ds = dataset(&[
            (Value::Missing, Value::Categorical("a".into()), 1),
            (Value::Missing, Value::Categorical("b".into()), 0),
        ]);
        let err = Preprocessor::new(schema(), PreprocessingConfig::default()).fit(&ds).unwrap_err();
        assert!(matches!(err, PipelineError::Preprocessing(_)));
    }

    #[test]
    fn test_artifact_json_roundtrip() {
        let artifact = Preprocessor::new(schema(), PreprocessingConfig::default()).fit(&train()).unwrap();
        let json = serde_json::to_string(artifact.as_ref()).unwrap();
        let restored: PreprocessingArtifact = serde_json::from_str(&json).unwrap();
        assert_eq!(&restored, artifact.as_ref());
    }
}
