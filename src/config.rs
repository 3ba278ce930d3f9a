use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::event_sourcing::query::{PageRequest, PaginationError, DEFAULT_PAGE_SIZE};

// ============================================================================
// Store Configuration
// ============================================================================

pub const ENV_DATABASE_URL: &str = "MAINTENANCE_DATABASE_URL";
pub const ENV_MAX_PAGE_SIZE: &str = "MAINTENANCE_MAX_PAGE_SIZE";
pub const ENV_LOCK_TIMEOUT_MS: &str = "MAINTENANCE_LOCK_TIMEOUT_MS";
pub const ENV_METRICS_PORT: &str = "MAINTENANCE_METRICS_PORT";
pub const ENV_LOG: &str = "MAINTENANCE_LOG";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// PostgreSQL URL; the in-memory backend is used when absent
    pub database_url: Option<String>,

    /// Ceiling for caller-supplied page sizes (larger ones are rejected)
    pub max_page_size: u32,

    pub default_page_size: u32,

    /// Longest wait for an exclusive stream lease
    pub lock_timeout: Duration,

    /// Port of the Prometheus endpoint; no server when absent
    pub metrics_port: Option<u16>,

    /// Default tracing filter when RUST_LOG is not set
    pub log_filter: String,

    pub max_connections: u32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            max_page_size: 100,
            default_page_size: DEFAULT_PAGE_SIZE,
            lock_timeout: Duration::from_secs(5),
            metrics_port: None,
            log_filter: "info,maintenance_store=debug".to_string(),
            max_connections: 10,
        }
    }
}

impl StoreConfig {
    /// Defaults overridden by whatever `MAINTENANCE_*` variables are set
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as `from_env` over an arbitrary variable source
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(url) = lookup(ENV_DATABASE_URL).filter(|v| !v.trim().is_empty()) {
            config.database_url = Some(url);
        }
        if let Some(raw) = lookup(ENV_MAX_PAGE_SIZE) {
            let max: u32 = raw
                .trim()
                .parse()
                .with_context(|| format!("{} must be a positive integer, got '{}'", ENV_MAX_PAGE_SIZE, raw))?;
            anyhow::ensure!(max >= 1, "{} must be at least 1", ENV_MAX_PAGE_SIZE);
            config.max_page_size = max;
        }
        if let Some(raw) = lookup(ENV_LOCK_TIMEOUT_MS) {
            let millis: u64 = raw
                .trim()
                .parse()
                .with_context(|| format!("{} must be a number of milliseconds, got '{}'", ENV_LOCK_TIMEOUT_MS, raw))?;
            config.lock_timeout = Duration::from_millis(millis);
        }
        if let Some(raw) = lookup(ENV_METRICS_PORT) {
            let port: u16 = raw
                .trim()
                .parse()
                .with_context(|| format!("{} must be a port number, got '{}'", ENV_METRICS_PORT, raw))?;
            config.metrics_port = Some(port);
        }
        if let Some(filter) = lookup(ENV_LOG) {
            config.log_filter = filter;
        }

        config.default_page_size = config.default_page_size.min(config.max_page_size);
        Ok(config)
    }

    pub fn with_database_url(mut self, url: impl Into<String>) -> Self {
        self.database_url = Some(url.into());
        self
    }

    pub fn with_max_page_size(mut self, max: u32) -> Self {
        self.max_page_size = max;
        self.default_page_size = self.default_page_size.min(max);
        self
    }

    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    pub fn with_metrics_port(mut self, port: u16) -> Self {
        self.metrics_port = Some(port);
        self
    }

    /// Validate caller pagination input against this configuration
    pub fn page_request(&self, page: Option<u32>, page_size: Option<u32>) -> Result<PageRequest, PaginationError> {
        PageRequest::validated(page, Some(page_size.unwrap_or(self.default_page_size)), self.max_page_size)
    }
}
