//! Upstream cloud API interaction module
//!
//! This module provides the plumbing for talking to the cloud product APIs
//! limits are collected from.
//!
//! # Module Structure
//!
//! - [`auth`] - One-shot token verification against the identity service
//! - [`client`] - Tenant/region/token scoped client and URL builders
//! - [`http`] - Soft-failing HTTP utilities for REST API calls
//! - [`paginate`] - Offset and next-link pagination
//!
//! # Example
//!
//! ```ignore
//! use cap::cloud::{client::CloudClient, http::CloudHttpClient, paginate};
//!
//! async fn count_servers(client: &CloudClient) -> usize {
//!     let list = paginate::ListRequest::next_link(
//!         client.servers_url("servers/detail"),
//!         "servers",
//!         "servers_links",
//!     );
//!     paginate::fetch_paginated(client, &list, 100).await.len()
//! }
//! ```

pub mod auth;
pub mod client;
pub mod http;
pub mod paginate;
