//! Cloud Servers collector
//!
//! Usage comes from three lookups on top of the absolute limits: the
//! instance listing, the private network listing, and one flavor lookup per
//! distinct flavor to total up provisioned RAM.

use super::{gather_limits, CollectionContext, Collector};
use crate::cloud::client::CloudClient;
use crate::cloud::paginate::{fetch_paginated, ListRequest};
use crate::limits::extract::as_integer;
use crate::limits::ProductLimits;
use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;

pub const SERVERS: &str = "Servers";
pub const PRIVATE_NETWORKS: &str = "Private Networks";
pub const RAM_MB: &str = "Ram - MB";

pub struct ServersCollector;

#[async_trait]
impl Collector for ServersCollector {
    fn name(&self) -> &str {
        "servers"
    }

    async fn collect(&self, ctx: &CollectionContext) -> Result<ProductLimits> {
        let mut builder = gather_limits(ctx).await?;

        let servers = list_servers(&ctx.client, ctx.page_size).await;
        let networks = list_networks(&ctx.client, ctx.page_size).await;
        let total_ram = total_server_ram(&ctx.client, &servers).await;

        builder.record_usage(SERVERS, servers.len() as i64);
        builder.record_usage(PRIVATE_NETWORKS, networks.len() as i64);
        builder.record_usage(RAM_MB, total_ram);

        Ok(builder.finish())
    }
}

/// All instances of the tenant in the client's region
pub async fn list_servers(client: &CloudClient, page_size: usize) -> Vec<Value> {
    let list = ListRequest::next_link(client.servers_url("servers/detail"), "servers", "servers_links");
    fetch_paginated(client, &list, page_size).await
}

/// All networks visible to the tenant in the client's region
pub async fn list_networks(client: &CloudClient, page_size: usize) -> Vec<Value> {
    let list = ListRequest::next_link(client.networks_url("networks"), "networks", "networks_links");
    fetch_paginated(client, &list, page_size).await
}

/// Flavor id of an instance. Some deployments report numeric ids.
fn flavor_id(server: &Value) -> Option<String> {
    match server.get("flavor")?.get("id")? {
        Value::String(id) => Some(id.clone()),
        Value::Number(id) => Some(id.to_string()),
        _ => None,
    }
}

async fn flavor_ram(client: &CloudClient, flavor_id: &str) -> Option<i64> {
    let url = client.servers_url(&format!("flavors/{}", urlencoding::encode(flavor_id)));
    let content = client.get(&url).await?;
    content.get("flavor")?.get("ram").and_then(as_integer)
}

/// Sum provisioned RAM (MB) across instances.
///
/// Flavor lookups are memoised for the duration of the call. Failed lookups
/// are not cached and contribute nothing.
pub async fn total_server_ram(client: &CloudClient, servers: &[Value]) -> i64 {
    let mut flavors: HashMap<String, i64> = HashMap::new();
    let mut total = 0;

    for server in servers {
        let Some(id) = flavor_id(server) else {
            tracing::debug!("Server without flavor id skipped in RAM total");
            continue;
        };

        if let Some(ram) = flavors.get(&id) {
            total += ram;
            continue;
        }

        match flavor_ram(client, &id).await {
            Some(ram) => {
                flavors.insert(id.clone(), ram);
                total += ram;
            }
            None => tracing::warn!("No RAM figure for flavor {}", id),
        }
    }

    total
}
