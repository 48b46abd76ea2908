//! Shared fixtures for integration tests

#![allow(dead_code)]

use cap::cloud::client::CloudClient;
use cap::cloud::http::CloudHttpClient;
use cap::collector::CollectionContext;
use cap::config::Endpoints;
use cap::limits::DescriptorStore;
use std::time::Duration;

pub const DDI: &str = "123456";
pub const TOKEN: &str = "test-token";

/// Built-in products with every base URL pointed at a mock server
pub fn mock_store(base: &str) -> DescriptorStore {
    let mut config = DescriptorStore::embedded().to_config();
    for product in &mut config.products {
        product.us_url = base.to_string();
        product.uk_url = base.to_string();
    }
    DescriptorStore::from_config(config).expect("built-in products should validate")
}

pub fn http() -> CloudHttpClient {
    CloudHttpClient::new(Duration::from_secs(5)).expect("client should build")
}

pub fn client(base: &str) -> CloudClient {
    CloudClient::new(http(), Endpoints::all_at(base), DDI, "DFW", TOKEN).expect("client should build")
}

/// Collection context for one built-in product against a mock server
pub fn context(base: &str, db_name: &str) -> CollectionContext {
    let store = mock_store(base);
    CollectionContext {
        client: client(base),
        product: store.product(db_name).cloned().expect("product should exist"),
        descriptors: store.active_limits(db_name),
        page_size: 100,
    }
}
