//! Per-product collectors
//!
//! Every collector first runs the product's limit descriptors through the
//! extraction engine, then layers on the usage figures that cannot be read
//! declaratively (instance counts, RAM totals, group counts...).
//!
//! Collectors fail soft: an upstream that returns nothing just leaves its
//! entries out of the result. An `Err` from [`Collector::collect`] is reserved
//! for real defects and fails the job.

pub mod autoscale;
pub mod dns;
pub mod load_balancers;
pub mod servers;

use crate::cloud::client::CloudClient;
use crate::limits::{extract, Extracted, LimitDescriptor, Product, ProductLimits, ResultBuilder, UsedPolicy};
use anyhow::Result;
use async_trait::async_trait;

/// Everything a collector needs for one run, passed in explicitly
#[derive(Clone)]
pub struct CollectionContext {
    pub client: CloudClient,
    pub product: Product,
    /// Active descriptors, snapshotted when the job started
    pub descriptors: Vec<LimitDescriptor>,
    pub page_size: usize,
}

/// Trait for all product collectors
#[async_trait]
pub trait Collector: Send + Sync {
    /// Product db_name this collector handles
    fn name(&self) -> &str;

    /// Collect limits and current usage for the context's product
    async fn collect(&self, ctx: &CollectionContext) -> Result<ProductLimits>;
}

/// Collector for products whose descriptors already report usage
/// (block storage, big data, and anything configured without bespoke lookups)
pub struct DescriptorCollector {
    name: String,
}

impl DescriptorCollector {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
        }
    }
}

#[async_trait]
impl Collector for DescriptorCollector {
    fn name(&self) -> &str {
        &self.name
    }

    async fn collect(&self, ctx: &CollectionContext) -> Result<ProductLimits> {
        Ok(gather_limits(ctx).await?.finish())
    }
}

/// Pick the collector for a product
pub fn collector_for(db_name: &str) -> Box<dyn Collector> {
    match db_name {
        "servers" => Box::new(servers::ServersCollector),
        "load_balancers" => Box::new(load_balancers::LoadBalancersCollector),
        "autoscale" => Box::new(autoscale::AutoscaleCollector),
        "dns" => Box::new(dns::DnsCollector),
        other => Box::new(DescriptorCollector::new(other)),
    }
}

/// Fold one extraction into the builder, applying the product's used policy.
/// This is the only place `limit - remaining` is computed.
fn apply_extracted(builder: &mut ResultBuilder, extracted: Extracted, policy: UsedPolicy) -> Result<()> {
    builder.set_limit(&extracted.title, extracted.limit);

    if let Some(raw) = extracted.used {
        let used = match policy {
            UsedPolicy::Reported => raw,
            UsedPolicy::Remaining => {
                let limit = builder.limit(&extracted.title).ok_or_else(|| {
                    anyhow::anyhow!("no limit for '{}' to reconcile against", extracted.title)
                })?;
                // Negative limits mean unlimited; there is nothing to subtract from
                if limit < 0 {
                    tracing::debug!("'{}' is unlimited, no used value derived", extracted.title);
                    return Ok(());
                }
                match limit.checked_sub(raw) {
                    Some(used) => used,
                    None => {
                        tracing::warn!(
                            "'{}': remaining {} does not fit limit {}, used value skipped",
                            extracted.title,
                            raw,
                            limit
                        );
                        return Ok(());
                    }
                }
            }
        };
        builder.record_used(&extracted.title, used)?;
    }

    Ok(())
}

/// Run every descriptor of the context's product.
///
/// Descriptors sharing a URI share one fetch. A URI that returns no data, or a
/// descriptor that misses against its payload, contributes nothing.
pub async fn gather_limits(ctx: &CollectionContext) -> Result<ResultBuilder> {
    let mut builder = ResultBuilder::new(&ctx.product.db_name);

    let mut by_uri: Vec<(&str, Vec<&LimitDescriptor>)> = Vec::new();
    for descriptor in &ctx.descriptors {
        match by_uri.iter_mut().find(|(uri, _)| *uri == descriptor.uri) {
            Some((_, group)) => group.push(descriptor),
            None => by_uri.push((descriptor.uri.as_str(), vec![descriptor])),
        }
    }

    for (uri, descriptors) in by_uri {
        let url = ctx
            .product
            .limit_url(uri, &ctx.client.region, &ctx.client.ddi);

        let Some(payload) = ctx.client.get(&url).await else {
            tracing::warn!(
                "{}: no data from {}, skipping {} limit(s)",
                ctx.product.db_name,
                uri,
                descriptors.len()
            );
            continue;
        };

        for descriptor in descriptors {
            match extract(&payload, descriptor) {
                Ok(extracted) => apply_extracted(&mut builder, extracted, ctx.product.used_policy)?,
                Err(e) => tracing::debug!(
                    "{}: limit '{}' skipped: {}",
                    ctx.product.db_name,
                    descriptor.title,
                    e
                ),
            }
        }
    }

    Ok(builder)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extracted(title: &str, limit: i64, used: Option<i64>) -> Extracted {
        Extracted {
            title: title.to_string(),
            limit,
            used,
        }
    }

    #[test]
    fn test_reported_policy_keeps_value() {
        let mut builder = ResultBuilder::new("cbs");
        apply_extracted(&mut builder, extracted("SATA - GB", 10240, Some(325)), UsedPolicy::Reported).unwrap();
        let limits = builder.finish();
        assert_eq!(limits.limits["SATA - GB"], 10240);
        assert_eq!(limits.values["SATA - GB"], 325);
    }

    #[test]
    fn test_remaining_policy_subtracts() {
        let mut builder = ResultBuilder::new("big_data");
        apply_extracted(&mut builder, extracted("Node Count", 15, Some(8)), UsedPolicy::Remaining).unwrap();
        apply_extracted(&mut builder, extracted("Disk - MB", 50000, Some(25000)), UsedPolicy::Remaining)
            .unwrap();
        let limits = builder.finish();
        assert_eq!(limits.values["Node Count"], 7);
        assert_eq!(limits.values["Disk - MB"], 25000);
    }

    #[test]
    fn test_remaining_against_unlimited_records_no_value() {
        let mut builder = ResultBuilder::new("big_data");
        apply_extracted(&mut builder, extracted("Node Count", -1, Some(i64::MAX)), UsedPolicy::Remaining)
            .unwrap();
        apply_extracted(&mut builder, extracted("vCPUs", 10, Some(i64::MIN)), UsedPolicy::Remaining).unwrap();
        let limits = builder.finish();
        assert_eq!(limits.limits["Node Count"], -1);
        assert_eq!(limits.limits["vCPUs"], 10);
        assert!(limits.values.is_empty());
    }

    #[test]
    fn test_limit_only_records_no_value() {
        let mut builder = ResultBuilder::new("dns");
        apply_extracted(&mut builder, extracted("Domains", 500, None), UsedPolicy::Remaining).unwrap();
        let limits = builder.finish();
        assert_eq!(limits.limits["Domains"], 500);
        assert!(limits.values.is_empty());
    }

    #[test]
    fn test_collector_dispatch() {
        assert_eq!(collector_for("servers").name(), "servers");
        assert_eq!(collector_for("load_balancers").name(), "load_balancers");
        assert_eq!(collector_for("autoscale").name(), "autoscale");
        assert_eq!(collector_for("dns").name(), "dns");
        assert_eq!(collector_for("cbs").name(), "cbs");
        assert_eq!(collector_for("big_data").name(), "big_data");
    }
}
