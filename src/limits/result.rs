//! Collection results
//!
//! `ProductLimits` holds one product's limits and current values. Values can
//! only be recorded against a title that already has a limit, so every
//! finished result satisfies `values ⊆ limits`.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResultError {
    #[error("used value for '{title}' has no matching limit in {product}")]
    UsedWithoutLimit { product: String, title: String },
}

/// Limits and used values for a single product, keyed by limit title
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductLimits {
    pub limits: BTreeMap<String, i64>,
    pub values: BTreeMap<String, i64>,
}

impl ProductLimits {
    pub fn is_empty(&self) -> bool {
        self.limits.is_empty() && self.values.is_empty()
    }

    /// Titles present in `values` but missing from `limits`
    pub fn orphan_values(&self) -> Vec<&str> {
        self.values
            .keys()
            .filter(|title| !self.limits.contains_key(*title))
            .map(String::as_str)
            .collect()
    }
}

/// `product db_name -> ProductLimits`, the shape stored in the query log
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CollectionResult(pub BTreeMap<String, ProductLimits>);

impl CollectionResult {
    pub fn product(&self, db_name: &str) -> Option<&ProductLimits> {
        self.0.get(db_name)
    }
}

/// Accumulates one product's figures during a collection pass
#[derive(Debug, Clone)]
pub struct ResultBuilder {
    product: String,
    limits: ProductLimits,
}

impl ResultBuilder {
    pub fn new(product: &str) -> Self {
        Self {
            product: product.to_string(),
            limits: ProductLimits::default(),
        }
    }

    pub fn product(&self) -> &str {
        &self.product
    }

    pub fn set_limit(&mut self, title: &str, limit: i64) {
        self.limits.limits.insert(title.to_string(), limit);
    }

    pub fn limit(&self, title: &str) -> Option<i64> {
        self.limits.limits.get(title).copied()
    }

    pub fn has_limit(&self, title: &str) -> bool {
        self.limits.limits.contains_key(title)
    }

    /// Record a used value. Fails when the title has no limit.
    pub fn record_used(&mut self, title: &str, used: i64) -> Result<(), ResultError> {
        if !self.has_limit(title) {
            return Err(ResultError::UsedWithoutLimit {
                product: self.product.clone(),
                title: title.to_string(),
            });
        }
        self.limits.values.insert(title.to_string(), used);
        Ok(())
    }

    /// Record a supplementary usage figure, skipping it (with a warning) when
    /// the limit it belongs to could not be collected.
    pub fn record_usage(&mut self, title: &str, used: i64) {
        if let Err(e) = self.record_used(title, used) {
            tracing::warn!("Dropping usage figure: {}", e);
        }
    }

    pub fn finish(self) -> ProductLimits {
        self.limits
    }

    /// Wrap the product's figures into a result keyed by its db_name
    pub fn build(self) -> CollectionResult {
        let mut result = BTreeMap::new();
        result.insert(self.product, self.limits);
        CollectionResult(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_used_requires_limit() {
        let mut builder = ResultBuilder::new("dns");
        assert_eq!(
            builder.record_used("Domains", 1),
            Err(ResultError::UsedWithoutLimit {
                product: "dns".to_string(),
                title: "Domains".to_string()
            })
        );
        builder.set_limit("Domains", 500);
        builder.record_used("Domains", 1).unwrap();

        let limits = builder.finish();
        assert_eq!(limits.limits["Domains"], 500);
        assert_eq!(limits.values["Domains"], 1);
        assert!(limits.orphan_values().is_empty());
    }

    #[test]
    fn test_record_usage_is_soft() {
        let mut builder = ResultBuilder::new("servers");
        builder.record_usage("Servers", 3);
        assert!(builder.finish().values.is_empty());
    }

    #[test]
    fn test_result_serializes_flat() {
        let mut builder = ResultBuilder::new("dns");
        builder.set_limit("Domains", 500);
        builder.record_used("Domains", 1).unwrap();
        let value = serde_json::to_value(builder.build()).unwrap();
        assert_eq!(
            value,
            serde_json::json!({"dns": {"limits": {"Domains": 500}, "values": {"Domains": 1}}})
        );
    }

    #[test]
    fn test_orphan_values_detected() {
        let mut limits = ProductLimits::default();
        limits.values.insert("Servers".to_string(), 2);
        assert_eq!(limits.orphan_values(), vec!["Servers"]);
    }
}
