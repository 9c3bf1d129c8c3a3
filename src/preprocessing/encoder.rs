//! One-hot categorical encoding with an unknown bucket

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Label used for the trailing bucket that receives unseen and missing values
pub const UNKNOWN_CATEGORY: &str = "__unknown__";

/// Fitted encoding map for one categorical feature.
///
/// Categories are kept sorted; category `i` maps to output column `i` and the
/// unknown bucket is always the last column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryEncoder {
    categories: Vec<String>,
}

impl CategoryEncoder {
    /// Fit from the categories observed in the training split
    pub fn fit<'a, I>(observed: I) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        let categories: BTreeSet<&str> = observed.into_iter().collect();
        Self {
            categories: categories.into_iter().map(str::to_string).collect(),
        }
    }

    pub fn categories(&self) -> &[String] {
        &self.categories
    }

    /// Number of output columns, including the unknown bucket
    pub fn width(&self) -> usize {
        self.categories.len() + 1
    }

    /// Output column index for a category key; `None` keys go to the unknown bucket
    pub fn index_of(&self, key: Option<&str>) -> usize {
        key.and_then(|k| self.categories.binary_search_by(|c| c.as_str().cmp(k)).ok())
            .unwrap_or(self.categories.len())
    }

    /// Output column names `<feature>=<category>`
    pub fn column_names(&self, feature: &str) -> Vec<String> {
        self.categories
            .iter()
            .map(String::as_str)
            .chain(std::iter::once(UNKNOWN_CATEGORY))
            .map(|c| format!("{}={}", feature, c))
            .collect()
    }

    /// Write the one-hot encoding of `key` into `out` (length [`Self::width`])
    pub fn encode_into(&self, key: Option<&str>, out: &mut [f64]) {
        out.iter_mut().for_each(|v| *v = 0.0);
        out[self.index_of(key)] = 1.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_categories_sorted_and_deduplicated() {
        let enc = CategoryEncoder::fit(["yearly", "monthly", "yearly"]);
        assert_eq!(enc.categories(), &["monthly".to_string(), "yearly".to_string()]);
        assert_eq!(enc.width(), 3);
        assert_eq!(
            enc.column_names("contract"),
            vec!["contract=monthly", "contract=yearly", "contract=__unknown__"]
        );
    }

    #[test]
    fn test_unseen_and_missing_go_to_unknown() {
        let enc = CategoryEncoder::fit(["a", "b"]);
        let mut out = vec![0.0; enc.width()];

        enc.encode_into(Some("b"), &mut out);
        assert_eq!(out, vec![0.0, 1.0, 0.0]);

        enc.encode_into(Some("zzz"), &mut out);
        assert_eq!(out, vec![0.0, 0.0, 1.0]);

        enc.encode_into(None, &mut out);
        assert_eq!(out, vec![0.0, 0.0, 1.0]);
    }
}
