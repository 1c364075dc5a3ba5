//! Upstream data sources
//!
//! Both sources are reached through [`EndpointQuery`], the "GET a URL,
//! get bytes back" capability. [`HttpQuery`] is the reqwest-backed
//! implementation; tests plug in canned responses.

pub mod consensus_dump; // SnapshotFetcher: /dump_consensus_state
pub mod validator_registry; // IdentityResolver: bonded validators -> monikers

pub use consensus_dump::SnapshotFetcher;
pub use validator_registry::IdentityResolver;

use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;

use crate::error::{MonitorError, MonitorResult};

#[async_trait]
pub trait EndpointQuery: Send + Sync {
    /// Fetch `url` and return the raw body. Non-2xx, unreachable and timed
    /// out requests all fail with [`MonitorError::Transport`].
    async fn get(&self, url: &str) -> MonitorResult<Vec<u8>>;
}

#[derive(Clone)]
pub struct HttpQuery {
    client: Client,
    timeout: Duration,
}

impl HttpQuery {
    pub fn new(timeout: Duration) -> MonitorResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .pool_max_idle_per_host(4)
            .tcp_keepalive(Duration::from_secs(60))
            .user_agent("valwatch/0.1")
            .build()
            .map_err(|e| MonitorError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { client, timeout })
    }

    async fn fetch(&self, url: &str) -> MonitorResult<Vec<u8>> {
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| MonitorError::transport(url, e))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(MonitorError::transport(
                url,
                format!(
                    "{}: {}",
                    status,
                    text.chars().take(200).collect::<String>()
                ),
            ));
        }

        let body = resp
            .bytes()
            .await
            .map_err(|e| MonitorError::transport(url, e))?;
        Ok(body.to_vec())
    }
}

#[async_trait]
impl EndpointQuery for HttpQuery {
    async fn get(&self, url: &str) -> MonitorResult<Vec<u8>> {
        // Covers connect, headers and body read as one bound.
        match tokio::time::timeout(self.timeout, self.fetch(url)).await {
            Ok(result) => result,
            Err(_) => Err(MonitorError::transport(
                url,
                format!("timed out after {:?}", self.timeout),
            )),
        }
    }
}
