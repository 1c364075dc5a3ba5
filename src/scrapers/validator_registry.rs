//! Validator registry client
//!
//! Builds the per-run [`MonikerIndex`] from the chain REST API's bonded
//! validator listing. The registry can answer 200 with an error body, so
//! every page is sniffed for error markers before it is trusted.

use reqwest::Url;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, warn};

use super::EndpointQuery;
use crate::config::MonitorConfig;
use crate::error::{MonitorError, MonitorResult};
use crate::models::MonikerIndex;

const BONDED_STATUS: &str = "BOND_STATUS_BONDED";

#[derive(Debug, Deserialize)]
struct RegistryPage {
    #[serde(default)]
    validators: Vec<RegistryValidator>,
    #[serde(default)]
    pagination: Option<RegistryPagination>,
}

#[derive(Debug, Deserialize)]
struct RegistryValidator {
    consensus_pubkey: ConsensusPubkey,
    #[serde(default)]
    description: Description,
}

#[derive(Debug, Deserialize)]
struct ConsensusPubkey {
    key: String,
}

#[derive(Debug, Default, Deserialize)]
struct Description {
    #[serde(default)]
    moniker: String,
}

#[derive(Debug, Deserialize)]
struct RegistryPagination {
    #[serde(default)]
    next_key: Option<String>,
}

/// Error markers the registry embeds in otherwise-successful responses.
fn embedded_error(body: &str) -> Option<&'static str> {
    if body.contains("not found") {
        Some("not found")
    } else if body.contains("error:") || body.contains("error\\\":") {
        Some("error:")
    } else {
        None
    }
}

pub struct IdentityResolver {
    query: Arc<dyn EndpointQuery>,
    base_url: String,
    page_limit: u32,
    max_pages: u32,
}

impl IdentityResolver {
    pub fn new(
        query: Arc<dyn EndpointQuery>,
        registry_url: impl Into<String>,
        page_limit: u32,
        max_pages: u32,
    ) -> Self {
        Self {
            query,
            base_url: registry_url.into(),
            page_limit: page_limit.max(1),
            max_pages: max_pages.max(1),
        }
    }

    pub fn from_config(query: Arc<dyn EndpointQuery>, cfg: &MonitorConfig) -> Self {
        Self::new(
            query,
            cfg.registry_url(),
            cfg.registry_page_limit,
            cfg.registry_max_pages,
        )
    }

    fn page_url(&self, page_key: Option<&str>) -> MonitorResult<String> {
        let limit = self.page_limit.to_string();
        let mut params: Vec<(&str, &str)> = vec![
            ("status", BONDED_STATUS),
            ("pagination.limit", limit.as_str()),
        ];
        if let Some(key) = page_key {
            params.push(("pagination.key", key));
        }
        Url::parse_with_params(&self.base_url, &params)
            .map(String::from)
            .map_err(|e| MonitorError::transport(&self.base_url, format!("invalid url: {e}")))
    }

    async fn fetch_page(&self, page_key: Option<&str>) -> MonitorResult<RegistryPage> {
        let url = self.page_url(page_key)?;
        let body = self.query.get(&url).await?;
        let text = String::from_utf8_lossy(&body);

        if let Some(marker) = embedded_error(&text) {
            return Err(MonitorError::Registry(format!(
                "{marker} in response from {url}: {}",
                text.chars().take(300).collect::<String>()
            )));
        }

        serde_json::from_str(&text).map_err(|e| MonitorError::parse("validator registry", e))
    }

    /// Resolve every bonded validator's moniker.
    ///
    /// Any failing page fails the whole resolve; a partial index is never
    /// returned because of an error.
    pub async fn resolve(&self) -> MonitorResult<MonikerIndex> {
        let mut index = MonikerIndex::new();
        let mut page_key: Option<String> = None;
        let mut pages = 0u32;

        loop {
            let page = self.fetch_page(page_key.as_deref()).await?;
            pages += 1;

            for v in page.validators {
                index.insert(v.consensus_pubkey.key, v.description.moniker);
            }

            let next = page
                .pagination
                .and_then(|p| p.next_key)
                .filter(|k| !k.is_empty());

            match next {
                None => break,
                Some(_) if pages >= self.max_pages => {
                    warn!(
                        pages,
                        monikers = index.len(),
                        "validator registry has more pages than registry_max_pages; monikers beyond this point stay unresolved"
                    );
                    break;
                }
                Some(key) => page_key = Some(key),
            }
        }

        debug!(pages, monikers = index.len(), "validator registry resolved");
        Ok(index)
    }
}
