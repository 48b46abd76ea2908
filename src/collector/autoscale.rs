//! Autoscale collector

use super::{gather_limits, CollectionContext, Collector};
use crate::cloud::client::CloudClient;
use crate::limits::ProductLimits;
use anyhow::Result;
use async_trait::async_trait;

pub const MAX_GROUPS: &str = "Max Groups";

pub struct AutoscaleCollector;

#[async_trait]
impl Collector for AutoscaleCollector {
    fn name(&self) -> &str {
        "autoscale"
    }

    async fn collect(&self, ctx: &CollectionContext) -> Result<ProductLimits> {
        let mut builder = gather_limits(ctx).await?;
        if let Some(groups) = count_groups(&ctx.client).await {
            builder.record_usage(MAX_GROUPS, groups as i64);
        }
        Ok(builder.finish())
    }
}

/// Number of scaling groups, or `None` if the listing failed
pub async fn count_groups(client: &CloudClient) -> Option<usize> {
    let content = client.get(&client.autoscale_url("groups")).await?;
    match content.get("groups").and_then(|g| g.as_array()) {
        Some(groups) => Some(groups.len()),
        None => {
            tracing::warn!("Autoscale group listing has no 'groups' array");
            None
        }
    }
}
