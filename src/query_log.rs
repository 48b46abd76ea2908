//! Query log - the result sink
//!
//! A log record is created once per accepted submission. Each finished job
//! pushes its result onto the record's `query_results`; nothing else about a
//! record ever changes. Pushes from concurrent jobs never overwrite each
//! other: the in-memory sink pushes under a lock, and the file sink appends a
//! standalone line per result instead of rewriting the record.

use crate::limits::CollectionResult;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use uuid::Uuid;

/// One submission and the results gathered for it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryLog {
    pub id: Uuid,
    pub ddi: String,
    pub region: String,
    /// Requested products, in request order
    pub queried: Vec<String>,
    pub query_results: Vec<CollectionResult>,
    pub queried_at: DateTime<Utc>,
    #[serde(default)]
    pub queried_by: Option<String>,
}

/// Fields supplied when a log is opened
#[derive(Debug, Clone)]
pub struct NewQueryLog {
    pub ddi: String,
    pub region: String,
    pub queried: Vec<String>,
    pub queried_by: Option<String>,
}

impl NewQueryLog {
    fn into_log(self) -> QueryLog {
        QueryLog {
            id: Uuid::new_v4(),
            ddi: self.ddi,
            region: self.region,
            queried: self.queried,
            query_results: Vec::new(),
            queried_at: Utc::now(),
            queried_by: self.queried_by,
        }
    }
}

/// Storage for query logs
#[async_trait]
pub trait QueryLogSink: Send + Sync {
    /// Open a new log and return its id
    async fn create(&self, entry: NewQueryLog) -> Result<Uuid>;

    /// Atomically append one job's result
    async fn push_result(&self, log_id: Uuid, result: CollectionResult) -> Result<()>;

    async fn get(&self, log_id: Uuid) -> Result<Option<QueryLog>>;

    async fn list(&self) -> Result<Vec<QueryLog>>;
}

/// Process-local sink
#[derive(Default)]
pub struct MemoryQueryLog {
    logs: Mutex<HashMap<Uuid, QueryLog>>,
}

impl MemoryQueryLog {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl QueryLogSink for MemoryQueryLog {
    async fn create(&self, entry: NewQueryLog) -> Result<Uuid> {
        let log = entry.into_log();
        let id = log.id;
        self.logs.lock().await.insert(id, log);
        Ok(id)
    }

    async fn push_result(&self, log_id: Uuid, result: CollectionResult) -> Result<()> {
        let mut logs = self.logs.lock().await;
        let log = logs
            .get_mut(&log_id)
            .ok_or_else(|| anyhow::anyhow!("Query log not found: {}", log_id))?;
        log.query_results.push(result);
        Ok(())
    }

    async fn get(&self, log_id: Uuid) -> Result<Option<QueryLog>> {
        Ok(self.logs.lock().await.get(&log_id).cloned())
    }

    async fn list(&self) -> Result<Vec<QueryLog>> {
        let mut logs: Vec<QueryLog> = self.logs.lock().await.values().cloned().collect();
        logs.sort_by_key(|l| l.queried_at);
        Ok(logs)
    }
}

/// One line of the JSON lines file
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
enum LogRecord {
    Created { log: QueryLog },
    Result { log_id: Uuid, result: CollectionResult },
}

/// Append-only JSON lines sink
pub struct JsonlQueryLog {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonlQueryLog {
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn append(&self, record: &LogRecord) -> Result<()> {
        let mut line = serde_json::to_string(record).context("Failed to serialize query log record")?;
        line.push('\n');

        let _guard = self.write_lock.lock().await;
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .with_context(|| format!("Failed to open query log {}", self.path.display()))?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }

    /// Replay the file into complete records, in creation order
    async fn replay(&self) -> Result<Vec<QueryLog>> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read query log {}", self.path.display()))
            }
        };

        let mut order = Vec::new();
        let mut logs: HashMap<Uuid, QueryLog> = HashMap::new();

        for (line_number, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<LogRecord>(line) {
                Ok(LogRecord::Created { log }) => {
                    order.push(log.id);
                    logs.insert(log.id, log);
                }
                Ok(LogRecord::Result { log_id, result }) => match logs.get_mut(&log_id) {
                    Some(log) => log.query_results.push(result),
                    None => tracing::warn!("Result for unknown query log {} ignored", log_id),
                },
                Err(e) => tracing::warn!(
                    "Skipping malformed query log line {}: {}",
                    line_number + 1,
                    e
                ),
            }
        }

        Ok(order.into_iter().filter_map(|id| logs.remove(&id)).collect())
    }
}

#[async_trait]
impl QueryLogSink for JsonlQueryLog {
    async fn create(&self, entry: NewQueryLog) -> Result<Uuid> {
        let log = entry.into_log();
        let id = log.id;
        self.append(&LogRecord::Created { log }).await?;
        Ok(id)
    }

    async fn push_result(&self, log_id: Uuid, result: CollectionResult) -> Result<()> {
        self.append(&LogRecord::Result { log_id, result }).await
    }

    async fn get(&self, log_id: Uuid) -> Result<Option<QueryLog>> {
        Ok(self.replay().await?.into_iter().find(|l| l.id == log_id))
    }

    async fn list(&self) -> Result<Vec<QueryLog>> {
        self.replay().await
    }
}
