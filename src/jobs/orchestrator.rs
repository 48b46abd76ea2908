//! Orchestrator
//!
//! Accepts a batch of products for one tenant, verifies the token once, opens
//! a query log and spawns one independent collection job per product. The
//! caller gets job ids back immediately and polls for status.

use super::state::{JobStatus, JobsState};
use crate::cloud::auth::{check_authorized, AUTH_FAILURE_MESSAGE};
use crate::cloud::client::CloudClient;
use crate::cloud::http::CloudHttpClient;
use crate::collector::{collector_for, CollectionContext, Collector};
use crate::config::{Config, Endpoints};
use crate::limits::{CollectionResult, DescriptorStore};
use crate::query_log::{NewQueryLog, QueryLogSink};
use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Semaphore;
use uuid::Uuid;

/// A request to collect limits for one tenant
#[derive(Debug, Clone)]
pub struct SubmitRequest {
    pub ddi: String,
    pub token: String,
    pub region: String,
    /// Product db_names; duplicates are collapsed
    pub products: Vec<String>,
    pub submitted_by: Option<String>,
}

/// Accepted submission
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Submission {
    pub log_id: Uuid,
    /// product db_name -> job id
    pub tasks: BTreeMap<String, Uuid>,
}

#[derive(Error, Debug)]
pub enum SubmitError {
    #[error("{}", AUTH_FAILURE_MESSAGE)]
    AuthRejected,

    #[error("No products requested")]
    NoProducts,

    #[error("Unknown or inactive product(s): {}", .0.join(", "))]
    UnknownProducts(Vec<String>),

    #[error("Product {0} requires a region")]
    RegionRequired(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Tunables for the orchestrator
#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub endpoints: Endpoints,
    pub request_timeout: Duration,
    pub page_size: usize,
    pub max_concurrent_jobs: usize,
}

impl From<&Config> for OrchestratorSettings {
    fn from(config: &Config) -> Self {
        Self {
            endpoints: config.endpoints.clone(),
            request_timeout: config.request_timeout(),
            page_size: config.page_size,
            max_concurrent_jobs: config.max_concurrent_jobs,
        }
    }
}

pub struct Orchestrator {
    http: CloudHttpClient,
    endpoints: Endpoints,
    page_size: usize,
    store: Arc<DescriptorStore>,
    sink: Arc<dyn QueryLogSink>,
    jobs: JobsState,
    permits: Arc<Semaphore>,
}

impl Orchestrator {
    pub fn new(
        settings: OrchestratorSettings,
        store: Arc<DescriptorStore>,
        sink: Arc<dyn QueryLogSink>,
    ) -> Result<Self> {
        Ok(Self {
            http: CloudHttpClient::new(settings.request_timeout)?,
            endpoints: settings.endpoints,
            page_size: settings.page_size,
            store,
            sink,
            jobs: JobsState::new(),
            permits: Arc::new(Semaphore::new(settings.max_concurrent_jobs.max(1))),
        })
    }

    pub fn sink(&self) -> &Arc<dyn QueryLogSink> {
        &self.sink
    }

    fn validate(&self, request: &SubmitRequest) -> Result<Vec<String>, SubmitError> {
        let mut products: Vec<String> = Vec::new();
        for product in &request.products {
            let product = product.trim().to_string();
            if !product.is_empty() && !products.contains(&product) {
                products.push(product);
            }
        }

        if products.is_empty() {
            return Err(SubmitError::NoProducts);
        }

        let unknown = self.store.unknown_products(&products);
        if !unknown.is_empty() {
            return Err(SubmitError::UnknownProducts(
                unknown.into_iter().map(str::to_string).collect(),
            ));
        }

        if request.region.trim().is_empty() {
            if let Some(product) = products
                .iter()
                .filter_map(|p| self.store.product(p))
                .find(|p| p.require_region)
            {
                return Err(SubmitError::RegionRequired(product.db_name.clone()));
            }
        }

        Ok(products)
    }

    /// Validate, authenticate and dispatch one job per product
    pub async fn submit(&self, request: SubmitRequest) -> Result<Submission, SubmitError> {
        let products = self.validate(&request)?;

        tracing::info!(
            "Authenticating submission for {} ({} product(s))",
            request.ddi,
            products.len()
        );
        if !check_authorized(&self.http, &self.endpoints, &request.token).await {
            tracing::warn!("Submission for {} rejected: authentication failed", request.ddi);
            return Err(SubmitError::AuthRejected);
        }

        let client = CloudClient::new(
            self.http.clone(),
            self.endpoints.clone(),
            &request.ddi,
            &request.region,
            &request.token,
        )?;

        let log_id = self
            .sink
            .create(NewQueryLog {
                ddi: request.ddi.clone(),
                region: request.region.clone(),
                queried: products.clone(),
                queried_by: request.submitted_by.clone(),
            })
            .await
            .context("Failed to create query log")?;

        let mut tasks = BTreeMap::new();
        for db_name in products {
            let Some(product) = self.store.product(&db_name).cloned() else {
                continue;
            };

            let ctx = CollectionContext {
                client: client.clone(),
                descriptors: self.store.active_limits(&db_name),
                product,
                page_size: self.page_size,
            };

            let job_id = Uuid::new_v4();
            self.jobs.set(job_id, JobStatus::Pending).await;
            self.spawn_job(job_id, log_id, collector_for(&db_name), ctx);
            tasks.insert(db_name, job_id);
        }

        tracing::info!("Dispatched {} job(s) for query log {}", tasks.len(), log_id);
        Ok(Submission { log_id, tasks })
    }

    fn spawn_job(&self, job_id: Uuid, log_id: Uuid, collector: Box<dyn Collector>, ctx: CollectionContext) {
        let jobs = self.jobs.clone();
        let sink = self.sink.clone();
        let permits = self.permits.clone();

        let worker = {
            let jobs = jobs.clone();
            tokio::spawn(async move {
                let _permit = permits
                    .acquire_owned()
                    .await
                    .context("Job pool closed")?;
                jobs.set(job_id, JobStatus::Running).await;
                run_job(collector.as_ref(), &ctx, sink.as_ref(), log_id).await
            })
        };

        tokio::spawn(async move {
            let status = match worker.await {
                Ok(Ok(result)) => JobStatus::Success { result },
                Ok(Err(e)) => {
                    tracing::error!("Job {} failed: {:#}", job_id, e);
                    JobStatus::Failure {
                        status: format!("{:#}", e),
                    }
                }
                Err(e) => {
                    tracing::error!("Job {} aborted: {}", job_id, e);
                    JobStatus::Failure {
                        status: format!("Collector aborted: {}", e),
                    }
                }
            };
            jobs.set(job_id, status).await;
        });
    }

    /// Current status of a job. Repeated polls of a finished job return the
    /// same terminal status.
    pub async fn status(&self, job_id: Uuid) -> JobStatus {
        if !self.jobs.contains(job_id).await {
            tracing::debug!("Status requested for unknown job {}", job_id);
        }
        self.jobs.get(job_id).await
    }

    /// Poll until every job is terminal. Ids this orchestrator never
    /// dispatched are rejected up front, since they would poll `Pending`
    /// forever.
    pub async fn wait_all(&self, job_ids: &[Uuid], poll_interval: Duration) -> Result<HashMap<Uuid, JobStatus>> {
        for id in job_ids {
            if !self.jobs.contains(*id).await {
                anyhow::bail!("Unknown job id: {}", id);
            }
        }

        loop {
            let statuses = futures::future::join_all(job_ids.iter().map(|id| self.status(*id))).await;
            if statuses.iter().all(JobStatus::is_terminal) {
                return Ok(job_ids.iter().copied().zip(statuses).collect());
            }
            tokio::time::sleep(poll_interval).await;
        }
    }
}

/// Run one collector, check its output and record it in the query log
pub async fn run_job(
    collector: &dyn Collector,
    ctx: &CollectionContext,
    sink: &dyn QueryLogSink,
    log_id: Uuid,
) -> Result<CollectionResult> {
    tracing::info!("Collecting {} for {}", collector.name(), ctx.client.ddi);

    let limits = collector
        .collect(ctx)
        .await
        .with_context(|| format!("{} collection failed", collector.name()))?;

    let orphans = limits.orphan_values();
    if !orphans.is_empty() {
        anyhow::bail!(
            "{}: used values without limits: {}",
            collector.name(),
            orphans.join(", ")
        );
    }

    let mut result = BTreeMap::new();
    result.insert(ctx.product.db_name.clone(), limits);
    let result = CollectionResult(result);

    sink.push_result(log_id, result.clone())
        .await
        .context("Failed to record result in query log")?;

    Ok(result)
}
