//! Cloud Load Balancers collector

use super::{gather_limits, CollectionContext, Collector};
use crate::cloud::client::CloudClient;
use crate::cloud::paginate::{fetch_paginated, ListRequest};
use crate::limits::ProductLimits;
use anyhow::Result;
use async_trait::async_trait;

pub const TOTAL_LOAD_BALANCERS: &str = "Total Load Balancers";

pub struct LoadBalancersCollector;

#[async_trait]
impl Collector for LoadBalancersCollector {
    fn name(&self) -> &str {
        "load_balancers"
    }

    async fn collect(&self, ctx: &CollectionContext) -> Result<ProductLimits> {
        let mut builder = gather_limits(ctx).await?;
        let total = count_load_balancers(&ctx.client, ctx.page_size).await;
        builder.record_usage(TOTAL_LOAD_BALANCERS, total as i64);
        Ok(builder.finish())
    }
}

/// Count load balancers using offset pagination
pub async fn count_load_balancers(client: &CloudClient, page_size: usize) -> usize {
    let list = ListRequest::offset(client.load_balancers_url("loadbalancers"), "loadBalancers");
    fetch_paginated(client, &list, page_size).await.len()
}
