//! Cloud DNS collector
//!
//! The domain listing reports `totalEntries`, so a single one-item page is
//! enough to count domains.

use super::{gather_limits, CollectionContext, Collector};
use crate::cloud::client::CloudClient;
use crate::cloud::paginate::with_query;
use crate::limits::extract::as_integer;
use crate::limits::ProductLimits;
use anyhow::Result;
use async_trait::async_trait;

pub const DOMAINS: &str = "Domains";

pub struct DnsCollector;

#[async_trait]
impl Collector for DnsCollector {
    fn name(&self) -> &str {
        "dns"
    }

    async fn collect(&self, ctx: &CollectionContext) -> Result<ProductLimits> {
        let mut builder = gather_limits(ctx).await?;
        if let Some(domains) = count_domains(&ctx.client).await {
            builder.record_usage(DOMAINS, domains);
        }
        Ok(builder.finish())
    }
}

/// Total domain count, or `None` if the lookup failed
pub async fn count_domains(client: &CloudClient) -> Option<i64> {
    let url = with_query(&client.dns_url("domains"), &[("limit", "1".to_string())]);
    let content = client.get(&url).await?;
    content.get("totalEntries").and_then(as_integer)
}
