//! Limit Descriptor Store - products and the descriptors that map their
//! upstream responses to named limit/used pairs.
//!
//! The built-in set is embedded from `resources/products.json`; a file given
//! in the configuration replaces it. Collection jobs only ever read a snapshot
//! of the active descriptors taken when the job starts.

use super::extract::LimitPath;
use crate::cloud::client::render_template;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::sync::OnceLock;
use thiserror::Error;

/// Embedded product/descriptor definitions (compiled into the binary)
const EMBEDDED_PRODUCTS: &str = include_str!("../resources/products.json");

/// Regions served from the UK endpoint of a product
const UK_REGIONS: &[&str] = &["uk", "lon"];

#[derive(Error, Debug, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Product already exists: {0}")]
    DuplicateProduct(String),

    #[error("Product not found: {0}")]
    ProductNotFound(String),

    #[error("Limit not found: {product}/{slug}")]
    LimitNotFound { product: String, slug: String },

    #[error("Limit '{slug}' already defined for product {product}")]
    DuplicateLimit { product: String, slug: String },

    #[error("An active limit already reads {limit_key} at {absolute_path} from {uri}")]
    DuplicateActiveLimit {
        uri: String,
        absolute_path: String,
        limit_key: String,
    },

    #[error("Invalid absolute path '{0}'")]
    InvalidPath(String),

    #[error("Title must not be empty")]
    EmptyTitle,
}

/// Collapse internal whitespace and trim
pub fn normalize(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Lower-case, collapse spaces, and replace spaces with underscores
pub fn slug(s: &str) -> String {
    s.trim()
        .to_lowercase()
        .split(' ')
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("_")
}

/// How a product's `value_key` figure relates to consumption
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UsedPolicy {
    /// Upstream reports the amount in use; stored unchanged
    #[default]
    Reported,
    /// Upstream reports the amount left; stored as `limit - remaining`
    Remaining,
}

/// Product definition
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Product {
    /// Record id from an external product store. Lookups go by `db_name`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub title: String,
    /// Stable identifier, derived from the title on creation
    #[serde(default)]
    pub db_name: String,
    pub us_url: String,
    pub uk_url: String,
    #[serde(default)]
    pub doc_url: Option<String>,
    #[serde(default)]
    pub require_region: bool,
    #[serde(default)]
    pub active: bool,
    #[serde(default)]
    pub used_policy: UsedPolicy,
}

impl Product {
    pub fn new(title: &str, us_url: &str, uk_url: &str) -> Self {
        let title = normalize(title);
        Self {
            id: None,
            db_name: slug(&title),
            title,
            us_url: us_url.to_string(),
            uk_url: uk_url.to_string(),
            doc_url: None,
            require_region: true,
            active: true,
            used_policy: UsedPolicy::Reported,
        }
    }

    /// Base URL for a region, with `{region}` filled in
    pub fn base_url(&self, region: &str) -> String {
        let template = if UK_REGIONS.contains(&region.to_lowercase().as_str()) {
            &self.uk_url
        } else {
            &self.us_url
        };
        render_template(template, region, "")
    }

    /// Full URL of a descriptor URI for this product
    pub fn limit_url(&self, uri: &str, region: &str, ddi: &str) -> String {
        format!(
            "{}{}",
            self.base_url(region).trim_end_matches('/'),
            render_template(uri, region, ddi)
        )
    }
}

/// Shape of the substructure an absolute path resolves to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AbsoluteType {
    /// Key/value map read by key
    Dict,
    /// Sequence of `{name, value}` records
    List,
}

/// Declarative rule mapping an upstream response to a named limit/used pair
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LimitDescriptor {
    pub product: String,
    pub title: String,
    pub uri: String,
    pub absolute_path: String,
    pub absolute_type: AbsoluteType,
    pub limit_key: String,
    #[serde(default)]
    pub value_key: Option<String>,
    #[serde(default)]
    pub active: bool,
}

impl LimitDescriptor {
    pub fn slug(&self) -> String {
        slug(&self.title)
    }

    /// The used-value key, if one is configured
    pub fn value_key(&self) -> Option<&str> {
        self.value_key.as_deref().filter(|k| !k.is_empty())
    }

    fn triple(&self) -> (&str, &str, &str) {
        (&self.uri, &self.absolute_path, &self.limit_key)
    }
}

/// On-disk layout of a product/descriptor set
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DescriptorConfig {
    #[serde(default)]
    pub products: Vec<Product>,
    #[serde(default)]
    pub limits: Vec<LimitDescriptor>,
}

/// Validated set of products and limit descriptors
#[derive(Debug, Clone, Default)]
pub struct DescriptorStore {
    products: Vec<Product>,
    limits: Vec<LimitDescriptor>,
}

static EMBEDDED: OnceLock<DescriptorStore> = OnceLock::new();

impl DescriptorStore {
    /// Get the built-in store (parsed from embedded JSON on first access)
    pub fn embedded() -> &'static DescriptorStore {
        EMBEDDED.get_or_init(|| {
            Self::from_json(EMBEDDED_PRODUCTS)
                .unwrap_or_else(|e| panic!("Failed to load embedded product definitions: {:#}", e))
        })
    }

    /// Build a store, normalising titles and checking every invariant
    pub fn from_config(config: DescriptorConfig) -> Result<Self, RegistryError> {
        let mut store = Self::default();
        for mut product in config.products {
            product.title = normalize(&product.title);
            if product.db_name.is_empty() {
                product.db_name = slug(&product.title);
            }
            store.add_product(product)?;
        }
        for limit in config.limits {
            store.add_limit(limit)?;
        }
        Ok(store)
    }

    pub fn from_json(content: &str) -> Result<Self> {
        let config: DescriptorConfig =
            serde_json::from_str(content).context("Failed to parse product definitions")?;
        Ok(Self::from_config(config)?)
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        let config: DescriptorConfig =
            serde_yaml::from_str(content).context("Failed to parse product definitions")?;
        Ok(Self::from_config(config)?)
    }

    /// Load from a `.json`, `.yaml` or `.yml` file
    pub fn load_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;

        match path.extension().and_then(|e| e.to_str()) {
            Some("yaml") | Some("yml") => Self::from_yaml(&content),
            _ => Self::from_json(&content),
        }
        .with_context(|| format!("Invalid product definitions in {}", path.display()))
    }

    /// Write the store back out as JSON
    pub fn save_file(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(&self.to_config())?;
        std::fs::write(path, content).with_context(|| format!("Failed to write {}", path.display()))
    }

    pub fn to_config(&self) -> DescriptorConfig {
        DescriptorConfig {
            products: self.products.clone(),
            limits: self.limits.clone(),
        }
    }

    pub fn products(&self) -> &[Product] {
        &self.products
    }

    pub fn limits(&self) -> &[LimitDescriptor] {
        &self.limits
    }

    pub fn product(&self, db_name: &str) -> Option<&Product> {
        self.products.iter().find(|p| p.db_name == db_name)
    }

    /// Snapshot of the active descriptors for a product
    pub fn active_limits(&self, db_name: &str) -> Vec<LimitDescriptor> {
        self.limits
            .iter()
            .filter(|l| l.product == db_name && l.active)
            .cloned()
            .collect()
    }

    // =========================================================================
    // Products
    // =========================================================================

    pub fn add_product(&mut self, product: Product) -> Result<(), RegistryError> {
        if product.title.is_empty() || product.db_name.is_empty() {
            return Err(RegistryError::EmptyTitle);
        }
        if self.product(&product.db_name).is_some() {
            return Err(RegistryError::DuplicateProduct(product.db_name));
        }
        self.products.push(product);
        Ok(())
    }

    /// Change a product's display title. `db_name` is left untouched.
    pub fn retitle_product(&mut self, db_name: &str, title: &str) -> Result<(), RegistryError> {
        let title = normalize(title);
        if title.is_empty() {
            return Err(RegistryError::EmptyTitle);
        }
        let product = self
            .products
            .iter_mut()
            .find(|p| p.db_name == db_name)
            .ok_or_else(|| RegistryError::ProductNotFound(db_name.to_string()))?;
        product.title = title;
        Ok(())
    }

    pub fn set_product_active(&mut self, db_name: &str, active: bool) -> Result<(), RegistryError> {
        let product = self
            .products
            .iter_mut()
            .find(|p| p.db_name == db_name)
            .ok_or_else(|| RegistryError::ProductNotFound(db_name.to_string()))?;
        product.active = active;
        Ok(())
    }

    // =========================================================================
    // Limit descriptors
    // =========================================================================

    fn position(&self, product: &str, slug: &str) -> Option<usize> {
        self.limits
            .iter()
            .position(|l| l.product == product && l.slug() == slug)
    }

    fn check_limit(&self, limit: &LimitDescriptor, skip: Option<usize>) -> Result<(), RegistryError> {
        if limit.title.is_empty() {
            return Err(RegistryError::EmptyTitle);
        }
        if self.product(&limit.product).is_none() {
            return Err(RegistryError::ProductNotFound(limit.product.clone()));
        }
        if LimitPath::parse(&limit.absolute_path).is_none() {
            return Err(RegistryError::InvalidPath(limit.absolute_path.clone()));
        }

        let slug = limit.slug();
        for (idx, existing) in self.limits.iter().enumerate() {
            if Some(idx) == skip {
                continue;
            }
            if existing.product == limit.product && existing.slug() == slug {
                return Err(RegistryError::DuplicateLimit {
                    product: limit.product.clone(),
                    slug,
                });
            }
            if limit.active && existing.active && existing.triple() == limit.triple() {
                return Err(RegistryError::DuplicateActiveLimit {
                    uri: limit.uri.clone(),
                    absolute_path: limit.absolute_path.clone(),
                    limit_key: limit.limit_key.clone(),
                });
            }
        }
        Ok(())
    }

    pub fn add_limit(&mut self, mut limit: LimitDescriptor) -> Result<(), RegistryError> {
        limit.title = normalize(&limit.title);
        self.check_limit(&limit, None)?;
        self.limits.push(limit);
        Ok(())
    }

    /// Replace the descriptor identified by `(product, slug)`
    pub fn update_limit(
        &mut self,
        product: &str,
        slug: &str,
        mut limit: LimitDescriptor,
    ) -> Result<(), RegistryError> {
        let idx = self
            .position(product, slug)
            .ok_or_else(|| RegistryError::LimitNotFound {
                product: product.to_string(),
                slug: slug.to_string(),
            })?;
        limit.title = normalize(&limit.title);
        self.check_limit(&limit, Some(idx))?;
        self.limits[idx] = limit;
        Ok(())
    }

    pub fn set_limit_active(&mut self, product: &str, slug: &str, active: bool) -> Result<(), RegistryError> {
        let idx = self
            .position(product, slug)
            .ok_or_else(|| RegistryError::LimitNotFound {
                product: product.to_string(),
                slug: slug.to_string(),
            })?;
        let mut limit = self.limits[idx].clone();
        limit.active = active;
        self.check_limit(&limit, Some(idx))?;
        self.limits[idx] = limit;
        Ok(())
    }

    pub fn remove_limit(&mut self, product: &str, slug: &str) -> Result<LimitDescriptor, RegistryError> {
        let idx = self
            .position(product, slug)
            .ok_or_else(|| RegistryError::LimitNotFound {
                product: product.to_string(),
                slug: slug.to_string(),
            })?;
        Ok(self.limits.remove(idx))
    }

    /// Products whose db_names are listed but unknown to this store
    pub fn unknown_products<'a>(&self, requested: &'a [String]) -> Vec<&'a str> {
        let known: HashSet<&str> = self
            .products
            .iter()
            .filter(|p| p.active)
            .map(|p| p.db_name.as_str())
            .collect();
        requested
            .iter()
            .map(String::as_str)
            .filter(|r| !known.contains(r))
            .collect()
    }
}
