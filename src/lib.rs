//! cap - cloud account limits aggregator
//!
//! Collects quota limits and current usage for a tenant across several cloud
//! products and flattens them into one `limits` vs `values` report per
//! product.

pub mod cloud;
pub mod collector;
pub mod config;
pub mod jobs;
pub mod limits;
pub mod query_log;
