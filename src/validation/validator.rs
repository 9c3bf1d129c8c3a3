//! Rule-based dataset validation against a declared schema

use super::schema::{FeatureSchema, FeatureSpec, FeatureType};
use crate::data::{Dataset, Value};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{debug, warn};

/// Kind of validation rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleKind {
    RequiredColumn,
    TypeConformance,
    NullRate,
    CategorySet,
    NumericRange,
    ClassImbalance,
}

/// Outcome of a single rule evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleOutcome {
    Passed,
    Failed,
    /// The rule could not be evaluated (its column is missing)
    Skipped,
}

/// How a failed rule affects the overall verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Error,
    Warning,
}

/// Severity assigned to each rule kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuleSeverities {
    pub required_column: Severity,
    pub type_conformance: Severity,
    pub null_rate: Severity,
    pub category_set: Severity,
    pub numeric_range: Severity,
    pub class_imbalance: Severity,
}

impl Default for RuleSeverities {
    fn default() -> Self {
        Self {
            required_column: Severity::Error,
            type_conformance: Severity::Error,
            null_rate: Severity::Error,
            category_set: Severity::Error,
            numeric_range: Severity::Error,
            class_imbalance: Severity::Error,
        }
    }
}

impl RuleSeverities {
    pub fn for_rule(&self, rule: RuleKind) -> Severity {
        match rule {
            RuleKind::RequiredColumn => self.required_column,
            RuleKind::TypeConformance => self.type_conformance,
            RuleKind::NullRate => self.null_rate,
            RuleKind::CategorySet => self.category_set,
            RuleKind::NumericRange => self.numeric_range,
            RuleKind::ClassImbalance => self.class_imbalance,
        }
    }
}

/// Thresholds and severities used by the validator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationPolicy {
    /// Null-rate threshold for columns without their own override
    pub max_null_rate: f64,
    /// Lower bound on the positive-class rate
    pub min_positive_rate: f64,
    /// Upper bound on the positive-class rate
    pub max_positive_rate: f64,
    pub severity: RuleSeverities,
}

impl Default for ValidationPolicy {
    fn default() -> Self {
        Self {
            max_null_rate: 0.05,
            min_positive_rate: 0.05,
            max_positive_rate: 0.95,
            severity: RuleSeverities::default(),
        }
    }
}

/// Result of one rule, for one column or for the whole dataset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleResult {
    pub rule: RuleKind,
    pub column: Option<String>,
    pub outcome: RuleOutcome,
    pub severity: Severity,
    /// Rule-specific measurement (null rate, positive rate, violating count)
    pub observed: Option<f64>,
    pub message: String,
}

impl RuleResult {
    pub fn is_failure(&self) -> bool {
        self.outcome == RuleOutcome::Failed
    }

    pub fn is_blocking(&self) -> bool {
        self.is_failure() && self.severity == Severity::Error
    }
}

/// Validation result for one dataset; never mutated after creation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub dataset: String,
    pub n_rows: usize,
    pub positive_rate: f64,
    pub rules: Vec<RuleResult>,
    pub passed: bool,
}

impl ValidationReport {
    pub fn failures(&self) -> impl Iterator<Item = &RuleResult> {
        self.rules.iter().filter(|r| r.is_failure())
    }

    pub fn blocking_failures(&self) -> usize {
        self.rules.iter().filter(|r| r.is_blocking()).count()
    }

    /// Failed rules of `kind`
    pub fn failures_of(&self, kind: RuleKind) -> Vec<&RuleResult> {
        self.failures().filter(|r| r.rule == kind).collect()
    }
}

/// Validation of both splits of a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunValidation {
    pub train: ValidationReport,
    pub test: ValidationReport,
    pub passed: bool,
}

impl RunValidation {
    pub fn new(train: ValidationReport, test: ValidationReport) -> Self {
        let passed = train.passed && test.passed;
        Self { train, test, passed }
    }
}

/// Read-only checker of a dataset against a [`FeatureSchema`]
#[derive(Debug, Clone, Default)]
pub struct SchemaValidator {
    policy: ValidationPolicy,
}

impl SchemaValidator {
    pub fn new(policy: ValidationPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &ValidationPolicy {
        &self.policy
    }

    /// Evaluate every rule and build the report.
    ///
    /// Rules run in a fixed order (per column in schema order, then dataset-level)
    /// and independently, so one report lists every violation.
    pub fn validate(&self, dataset: &Dataset, schema: &FeatureSchema, label: &str) -> ValidationReport {
        let mut rules = Vec::new();

        for spec in schema.features() {
            match dataset.column_index(&spec.name) {
                Some(idx) => {
                    rules.push(self.result(
                        RuleKind::RequiredColumn,
                        Some(&spec.name),
                        true,
                        None,
                        "column present".to_string(),
                    ));
                    let values: Vec<&Value> = dataset.column(idx).collect();
                    rules.push(self.check_type(spec, &values));
                    rules.push(self.check_null_rate(spec, &values));
                    match spec.feature_type {
                        FeatureType::Categorical => rules.push(self.check_categories(spec, &values)),
                        FeatureType::Numeric => rules.push(self.check_range(spec, &values)),
                    }
                }
                None => {
                    rules.push(self.result(
                        RuleKind::RequiredColumn,
                        Some(&spec.name),
                        false,
                        None,
                        format!("required column '{}' is missing", spec.name),
                    ));
                    let dependent = match spec.feature_type {
                        FeatureType::Categorical => RuleKind::CategorySet,
                        FeatureType::Numeric => RuleKind::NumericRange,
                    };
                    for rule in [RuleKind::TypeConformance, RuleKind::NullRate, dependent] {
                        rules.push(self.skipped(rule, &spec.name));
                    }
                }
            }
        }

        rules.push(self.check_class_balance(dataset));

        let passed = !rules.iter().any(RuleResult::is_blocking);
        let report = ValidationReport {
            dataset: label.to_string(),
            n_rows: dataset.len(),
            positive_rate: dataset.positive_rate(),
            rules,
            passed,
        };

        for failure in report.failures() {
            warn!(
                dataset = label,
                rule = ?failure.rule,
                column = failure.column.as_deref().unwrap_or("-"),
                severity = ?failure.severity,
                "{}",
                failure.message
            );
        }
        debug!(dataset = label, passed = report.passed, rules = report.rules.len(), "Validation complete");

        report
    }

    fn check_type(&self, spec: &FeatureSpec, values: &[&Value]) -> RuleResult {
        let mismatches = match spec.feature_type {
            FeatureType::Numeric => values.iter().filter(|v| matches!(v, Value::Categorical(_))).count(),
            // numeric raw values are accepted through their canonical text form
            FeatureType::Categorical => 0,
        };
        self.result(
            RuleKind::TypeConformance,
            Some(&spec.name),
            mismatches == 0,
            Some(mismatches as f64),
            if mismatches == 0 {
                format!("all values conform to {:?}", spec.feature_type)
            } else {
                format!("{} value(s) are not {:?}", mismatches, spec.feature_type)
            },
        )
    }

    fn check_null_rate(&self, spec: &FeatureSpec, values: &[&Value]) -> RuleResult {
        let missing = values.iter().filter(|v| v.is_missing()).count();
        let rate = if values.is_empty() { 0.0 } else { missing as f64 / values.len() as f64 };
        let threshold = spec.null_rate_threshold(self.policy.max_null_rate);
        self.result(
            RuleKind::NullRate,
            Some(&spec.name),
            rate <= threshold,
            Some(rate),
            format!("null rate {:.4} (threshold {:.4})", rate, threshold),
        )
    }

    fn check_categories(&self, spec: &FeatureSpec, values: &[&Value]) -> RuleResult {
        let Some(allowed) = &spec.categories else {
            return self.result(
                RuleKind::CategorySet,
                Some(&spec.name),
                true,
                Some(0.0),
                "no declared category set".to_string(),
            );
        };
        let allowed: HashSet<&str> = allowed.iter().map(String::as_str).collect();
        let mut unknown: Vec<String> = values
            .iter()
            .filter_map(|v| v.category_key())
            .filter(|k| !allowed.contains(k.as_str()))
            .collect();
        let count = unknown.len();
        unknown.sort();
        unknown.dedup();
        self.result(
            RuleKind::CategorySet,
            Some(&spec.name),
            count == 0,
            Some(count as f64),
            if count == 0 {
                "all categories declared".to_string()
            } else {
                format!("{} value(s) outside the declared set: {:?}", count, unknown)
            },
        )
    }

    fn check_range(&self, spec: &FeatureSpec, values: &[&Value]) -> RuleResult {
        let min = spec.min.unwrap_or(f64::NEG_INFINITY);
        let max = spec.max.unwrap_or(f64::INFINITY);
        let out_of_range = values
            .iter()
            .filter_map(|v| v.as_f64())
            .filter(|x| *x < min || *x > max)
            .count();
        self.result(
            RuleKind::NumericRange,
            Some(&spec.name),
            out_of_range == 0,
            Some(out_of_range as f64),
            format!("{} value(s) outside [{}, {}]", out_of_range, min, max),
        )
    }

    fn check_class_balance(&self, dataset: &Dataset) -> RuleResult {
        let rate = dataset.positive_rate();
        let (neg, pos) = dataset.class_counts();
        let ok = neg > 0
            && pos > 0
            && rate >= self.policy.min_positive_rate
            && rate <= self.policy.max_positive_rate;
        self.result(
            RuleKind::ClassImbalance,
            None,
            ok,
            Some(rate),
            format!(
                "positive rate {:.4} ({} positive / {} negative), bounds [{}, {}]",
                rate, pos, neg, self.policy.min_positive_rate, self.policy.max_positive_rate
            ),
        )
    }

    fn result(&self, rule: RuleKind, column: Option<&str>, ok: bool, observed: Option<f64>, message: String) -> RuleResult {
        RuleResult {
            rule,
            column: column.map(str::to_string),
            outcome: if ok { RuleOutcome::Passed } else { RuleOutcome::Failed },
            severity: self.policy.severity.for_rule(rule),
            observed,
            message,
        }
    }

    fn skipped(&self, rule: RuleKind, column: &str) -> RuleResult {
        RuleResult {
            rule,
            column: Some(column.to_string()),
            outcome: RuleOutcome::Skipped,
            severity: self.policy.severity.for_rule(rule),
            observed: None,
            message: "column missing".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{Record, RecordId};

    fn dataset(rows: Vec<(f64, &str, u8)>) -> Dataset {
        let records = rows
            .into_iter()
            .enumerate()
            .map(|(i, (x, c, y))| Record {
                id: RecordId(i),
                values: vec![Value::Numeric(x), Value::Categorical(c.to_string())],
                label: y,
            })
            .collect();
        Dataset::new(vec!["tenure".into(), "contract".into()], "churn", records).unwrap()
    }

    fn schema() -> FeatureSchema {
        FeatureSchema::new(vec![
            FeatureSpec::numeric("tenure").with_range(0.0, 72.0),
            FeatureSpec::categorical("contract").with_categories(["monthly", "yearly"]),
        ])
        .unwrap()
    }

    #[test]
    fn test_clean_dataset_passes() {
        let ds = dataset(vec![(1.0, "monthly", 1), (30.0, "yearly", 0), (5.0, "monthly", 0)]);
        let report = SchemaValidator::new(ValidationPolicy {
            min_positive_rate: 0.1,
            max_positive_rate: 0.9,
            ..Default::default()
        })
        .validate(&ds, &schema(), "train");
        assert!(report.passed, "{:?}", report.failures().collect::<Vec<_>>());
    }

    #[test]
    fn test_warning_severity_does_not_block() {
        let ds = dataset(vec![(100.0, "monthly", 1), (30.0, "yearly", 0)]);
        let mut policy = ValidationPolicy::default();
        policy.severity.numeric_range = Severity::Warning;
        let report = SchemaValidator::new(policy).validate(&ds, &schema(), "train");

        assert_eq!(report.failures_of(RuleKind::NumericRange).len(), 1);
        assert!(report.passed);
    }

    #[test]
    fn test_single_class_fails_imbalance_rule() {
        let ds = dataset(vec![(1.0, "monthly", 0), (2.0, "yearly", 0)]);
        let report = SchemaValidator::default().validate(&ds, &schema(), "train");
        assert!(!report.passed);
        assert_eq!(report.failures_of(RuleKind::ClassImbalance).len(), 1);
    }

    #[test]
    fn test_numeric_type_mismatch() {
        let records = vec![
            Record { id: RecordId(0), values: vec![Value::Categorical("n/a".into()), Value::Categorical("monthly".into())], label: 1 },
            Record { id: RecordId(1), values: vec![Value::Numeric(3.0), Value::Categorical("yearly".into())], label: 0 },
        ];
        let ds = Dataset::new(vec!["tenure".into(), "contract".into()], "churn", records).unwrap();
        let report = SchemaValidator::default().validate(&ds, &schema(), "train");
        let mismatches = report.failures_of(RuleKind::TypeConformance);
        assert_eq!(mismatches.len(), 1);
        assert_eq!(mismatches[0].observed, Some(1.0));
    }
}
