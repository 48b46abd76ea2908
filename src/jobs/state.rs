//! Shared state of product collection jobs.
//!
//! `JobsState` is cloned into every spawned job; each job writes its own
//! entry and pollers read entries by id.

use crate::limits::CollectionResult;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Lifecycle of a single product job, as reported to pollers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Pending,
    Running,
    Success { result: CollectionResult },
    Failure { status: String },
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Success { .. } | JobStatus::Failure { .. })
    }

    pub fn label(&self) -> &'static str {
        match self {
            JobStatus::Pending => "PENDING",
            JobStatus::Running => "RUNNING",
            JobStatus::Success { .. } => "SUCCESS",
            JobStatus::Failure { .. } => "FAILURE",
        }
    }
}

/// A thread-safe, shareable map from job id to status
#[derive(Clone, Default)]
pub struct JobsState {
    jobs: Arc<RwLock<HashMap<Uuid, JobStatus>>>,
}

impl JobsState {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set(&self, job_id: Uuid, status: JobStatus) {
        tracing::debug!("job {} -> {}", job_id, status.label());
        self.jobs.write().await.insert(job_id, status);
    }

    /// Current status. Ids not seen yet read as `Pending`.
    pub async fn get(&self, job_id: Uuid) -> JobStatus {
        self.jobs
            .read()
            .await
            .get(&job_id)
            .cloned()
            .unwrap_or(JobStatus::Pending)
    }

    pub async fn contains(&self, job_id: Uuid) -> bool {
        self.jobs.read().await.contains_key(&job_id)
    }
}
