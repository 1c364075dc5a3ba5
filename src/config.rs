//! Monitor Configuration
//!
//! Loaded from an optional TOML file, then overridden by `VALWATCH_*`
//! environment variables.

use serde::{Deserialize, Serialize};
use std::{env, path::Path, time::Duration};

use crate::error::{MonitorError, MonitorResult};

/// Main configuration for the validator monitor
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Consensus node RPC address (serves `/dump_consensus_state`)
    pub rpc_addr: String,

    /// Chain REST (LCD) address serving the validator registry
    pub rest_addr: String,

    /// Registry route appended to `rest_addr`
    pub validators_route: String,

    /// Validators requested per registry page
    pub registry_page_limit: u32,

    /// Upper bound on registry pages followed per run
    pub registry_max_pages: u32,

    /// Per-request timeout
    pub request_timeout_secs: u64,

    /// Interval between pipeline runs
    pub poll_interval_secs: u64,

    /// SQLite database path
    pub db_path: String,

    /// Operator's own consensus address, highlighted in presentation rows
    pub operator_cons_addr: Option<String>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            rpc_addr: "http://localhost:26657".into(),
            rest_addr: "http://localhost:1317".into(),
            validators_route: "/cosmos/staking/v1beta1/validators".into(),
            registry_page_limit: 300,
            registry_max_pages: 10,
            request_timeout_secs: 10,
            poll_interval_secs: 15,
            db_path: "valwatch.db".into(),
            operator_cons_addr: None,
        }
    }
}

impl MonitorConfig {
    /// Read a TOML file; missing keys fall back to defaults.
    pub fn from_toml_file(path: impl AsRef<Path>) -> MonitorResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| MonitorError::Config(format!("read {}: {e}", path.display())))?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> MonitorResult<Self> {
        toml::from_str(content).map_err(|e| MonitorError::Config(e.to_string()))
    }

    /// Apply `VALWATCH_*` overrides from the process environment.
    pub fn apply_env(&mut self) -> MonitorResult<()> {
        self.apply_overrides(|key| env::var(key).ok())
    }

    fn apply_overrides<F>(&mut self, lookup: F) -> MonitorResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("VALWATCH_RPC_ADDR") {
            self.rpc_addr = v;
        }
        if let Some(v) = get("VALWATCH_REST_ADDR") {
            self.rest_addr = v;
        }
        if let Some(v) = get("VALWATCH_DB_PATH") {
            self.db_path = v;
        }
        if let Some(v) = get("VALWATCH_POLL_INTERVAL_SECS") {
            self.poll_interval_secs = v
                .trim()
                .parse()
                .map_err(|_| MonitorError::Config(format!("invalid poll interval: {v}")))?;
        }
        if let Some(v) = get("VALWATCH_OPERATOR_CONS_ADDR") {
            self.operator_cons_addr = Some(v);
        }
        Ok(())
    }

    pub fn validate(&self) -> MonitorResult<()> {
        if self.rpc_addr.trim().is_empty() {
            return Err(MonitorError::Config("rpc_addr is empty".into()));
        }
        if self.rest_addr.trim().is_empty() {
            return Err(MonitorError::Config("rest_addr is empty".into()));
        }
        if self.registry_page_limit == 0 {
            return Err(MonitorError::Config("registry_page_limit must be > 0".into()));
        }
        if self.registry_max_pages == 0 {
            return Err(MonitorError::Config("registry_max_pages must be > 0".into()));
        }
        if self.request_timeout_secs == 0 {
            return Err(MonitorError::Config("request_timeout_secs must be > 0".into()));
        }
        if self.poll_interval_secs == 0 {
            return Err(MonitorError::Config("poll_interval_secs must be > 0".into()));
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn registry_url(&self) -> String {
        format!(
            "{}{}",
            self.rest_addr.trim_end_matches('/'),
            self.validators_route
        )
    }
}
