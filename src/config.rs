//! Configuration Management
//!
//! Handles persistent configuration storage for cap.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Upstream base URL templates for the usage lookups that are not described
/// by limit descriptors. `{region}` is replaced with the lower-cased region.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Endpoints {
    pub servers: String,
    pub networks: String,
    pub load_balancers: String,
    pub autoscale: String,
    pub dns: String,
    pub identity: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            servers: "https://{region}.servers.api.rackspacecloud.com".to_string(),
            networks: "https://{region}.networks.api.rackspacecloud.com".to_string(),
            load_balancers: "https://{region}.loadbalancers.api.rackspacecloud.com".to_string(),
            autoscale: "https://{region}.autoscale.api.rackspacecloud.com".to_string(),
            dns: "https://dns.api.rackspacecloud.com".to_string(),
            identity: "https://identity.api.rackspacecloud.com".to_string(),
        }
    }
}

impl Endpoints {
    /// Point every endpoint at the same base URL (mock servers, proxies)
    pub fn all_at(base: &str) -> Self {
        let base = base.trim_end_matches('/').to_string();
        Self {
            servers: base.clone(),
            networks: base.clone(),
            load_balancers: base.clone(),
            autoscale: base.clone(),
            dns: base.clone(),
            identity: base,
        }
    }
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_page_size() -> usize {
    100
}

fn default_max_concurrent_jobs() -> usize {
    8
}

/// User configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Last used region
    #[serde(default)]
    pub region: Option<String>,
    /// Per-request upstream timeout
    #[serde(default = "default_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Items requested per page on paginated listings
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    /// Upper bound on product jobs running at once
    #[serde(default = "default_max_concurrent_jobs")]
    pub max_concurrent_jobs: usize,
    /// Product/descriptor file replacing the built-in set (JSON or YAML)
    #[serde(default)]
    pub descriptor_file: Option<PathBuf>,
    /// Query log location (JSON lines)
    #[serde(default)]
    pub query_log_path: Option<PathBuf>,
    #[serde(default)]
    pub endpoints: Endpoints,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            region: None,
            request_timeout_secs: default_timeout_secs(),
            page_size: default_page_size(),
            max_concurrent_jobs: default_max_concurrent_jobs(),
            descriptor_file: None,
            query_log_path: None,
            endpoints: Endpoints::default(),
        }
    }
}

impl Config {
    /// Get the config directory
    fn config_dir() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("cap"))
    }

    /// Get the config file path
    fn config_path() -> Option<PathBuf> {
        Self::config_dir().map(|p| p.join("config.json"))
    }

    /// Load configuration from disk
    pub fn load() -> Self {
        let Some(path) = Self::config_path() else {
            return Self::default();
        };

        if !path.exists() {
            return Self::default();
        }

        match std::fs::read_to_string(&path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
                tracing::warn!("Ignoring invalid config file {:?}: {}", path, e);
                Self::default()
            }),
            Err(_) => Self::default(),
        }
    }

    /// Save configuration to disk
    pub fn save(&self) -> Result<()> {
        let Some(path) = Self::config_path() else {
            return Ok(());
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(&path, content)?;

        Ok(())
    }

    /// Get effective region (CLI > config > DFW)
    pub fn effective_region(&self, cli: Option<&str>) -> String {
        cli.map(str::to_string)
            .or_else(|| self.region.clone())
            .unwrap_or_else(|| "DFW".to_string())
    }

    /// Get effective query log path (config > config dir > cwd)
    pub fn effective_query_log_path(&self) -> PathBuf {
        self.query_log_path
            .clone()
            .or_else(|| Self::config_dir().map(|p| p.join("query_log.jsonl")))
            .unwrap_or_else(|| PathBuf::from("cap_query_log.jsonl"))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    /// Set region and save
    pub fn set_region(&mut self, region: &str) -> Result<()> {
        self.region = Some(region.to_uppercase());
        self.save()
    }
}
