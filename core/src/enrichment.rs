//! Optional external enrichment source.
//!
//! The aggregator can merge construction data from a community API on top of
//! locally observed journal data. Only the data contract lives here; the
//! merge rules (never downgrade local data, no phantom in-progress sites)
//! belong to the aggregator. Calls are one-shot with a request timeout and
//! are never retried — a failed fetch degrades the read to local-only.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EnrichmentError {
    #[error("enrichment request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("enrichment responded with status {0}")]
    Status(reqwest::StatusCode),
}

/// One commodity line as reported by the enrichment API.
#[derive(Debug, Clone, Deserialize)]
pub struct EnrichedCommodity {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub name_localised: String,
    #[serde(default)]
    pub required: u64,
    #[serde(default)]
    pub provided: u64,
    #[serde(default)]
    pub payment: u64,
}

/// One site record as reported by the enrichment API.
///
/// Market ids are not part of the contract; sites are matched to local data
/// by station identity.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrichedSite {
    #[serde(default)]
    pub station_name: String,
    #[serde(default)]
    pub station_type: String,
    #[serde(default)]
    pub system_name: String,
    #[serde(default)]
    pub progress: f64,
    #[serde(default)]
    pub is_completed: bool,
    #[serde(default)]
    pub is_failed: bool,
    #[serde(default)]
    pub commodities: Vec<EnrichedCommodity>,
}

/// Abstraction over the enrichment API so aggregation can be tested with a
/// stub source.
#[async_trait]
pub trait EnrichmentSource: Send + Sync {
    async fn system_sites(&self, system: &str) -> Result<Vec<EnrichedSite>, EnrichmentError>;
}

/// HTTP-backed enrichment source.
pub struct HttpEnrichmentSource {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    commander_name: String,
}

impl HttpEnrichmentSource {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        commander_name: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, EnrichmentError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into(),
            api_key: api_key.into(),
            commander_name: commander_name.into(),
        })
    }
}

#[async_trait]
impl EnrichmentSource for HttpEnrichmentSource {
    async fn system_sites(&self, system: &str) -> Result<Vec<EnrichedSite>, EnrichmentError> {
        let url = format!("{}/colonisation/sites", self.base_url.trim_end_matches('/'));
        let response = self
            .client
            .get(url)
            .query(&[("system", system)])
            .header("X-Api-Key", &self.api_key)
            .header("X-Commander", &self.commander_name)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(EnrichmentError::Status(response.status()));
        }

        Ok(response.json().await?)
    }
}
