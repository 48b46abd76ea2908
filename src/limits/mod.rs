//! Limit definitions and the extraction engine
//!
//! This module provides the data-driven half of limit collection. Products
//! and their limit descriptors are loaded from JSON at startup, allowing new
//! limits to be tracked without code changes.
//!
//! # Architecture
//!
//! - [`registry`] - Products, limit descriptors and their invariants
//! - [`extract`] - Path interpreter and `dict`/`list` readers
//! - [`result`] - Per-product accumulator and the consolidated result shape

pub mod extract;
pub mod registry;
pub mod result;

pub use extract::{extract, ExtractError, Extracted, LimitPath};
pub use registry::{
    AbsoluteType, DescriptorConfig, DescriptorStore, LimitDescriptor, Product, RegistryError,
    UsedPolicy,
};
pub use result::{CollectionResult, ProductLimits, ResultBuilder, ResultError};
