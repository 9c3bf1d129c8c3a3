//! Schema validation module
//!
//! Provides:
//! - Declared feature schema (types, ranges, category sets, nullability)
//! - Rule-based validation producing a complete, immutable report
//! - Configurable per-rule severity

mod schema;
mod validator;

pub use schema::{FeatureSchema, FeatureSpec, FeatureType};
pub use validator::{
    RuleKind, RuleOutcome, RuleResult, RuleSeverities, RunValidation, SchemaValidator, Severity,
    ValidationPolicy, ValidationReport,
};
