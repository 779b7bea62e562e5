//! Catalog retrieval.
//!
//! [`CatalogFetcher`] is the seam between the pipeline and the network.
//! [`HttpFetcher`] issues `GET <catalog URL>` with `Accept: application/json`
//! and the configured `User-Agent`. Any transport failure or non-2xx status
//! is a [`SourceError::Fetch`]; an unparseable body is a
//! [`SourceError::Parse`].

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::{ACCEPT, USER_AGENT};
use serde_json::Value;

use catalog_harvester_core::models::Source;

use crate::config::HarvestConfig;
use crate::error::SourceError;

const COMPONENT: &str = "fetch";

const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

/// Retrieves a source's raw catalog document.
#[async_trait]
pub trait CatalogFetcher: Send + Sync {
    async fn fetch(&self, source: &Source) -> Result<Value, SourceError>;
}

/// HTTP implementation of [`CatalogFetcher`] backed by `reqwest`.
pub struct HttpFetcher {
    client: reqwest::Client,
    user_agent: String,
}

impl HttpFetcher {
    pub fn new(config: &HarvestConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            user_agent: config.user_agent.clone(),
        })
    }
}

#[async_trait]
impl CatalogFetcher for HttpFetcher {
    async fn fetch(&self, source: &Source) -> Result<Value, SourceError> {
        let url = &source.catalog_url;
        tracing::debug!(component = COMPONENT, source = %source.acronym, %url, "fetching catalog");

        let response = self
            .client
            .get(url)
            .header(ACCEPT, "application/json")
            .header(USER_AGENT, &self.user_agent)
            .send()
            .await
            .map_err(|e| SourceError::Fetch(format!("GET {}: {}", url, e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::Fetch(format!("GET {} returned {}", url, status)));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| SourceError::Fetch(format!("GET {}: reading body: {}", url, e)))?;

        parse_catalog(&body)
    }
}

/// Parse a catalog body, ignoring a leading UTF-8 byte-order mark.
pub fn parse_catalog(body: &[u8]) -> Result<Value, SourceError> {
    let body = body.strip_prefix(UTF8_BOM).unwrap_or(body);
    serde_json::from_slice(body).map_err(|e| SourceError::Parse(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_strips_bom() {
        let mut body = UTF8_BOM.to_vec();
        body.extend_from_slice(br#"{"agency": "AA", "releases": []}"#);
        let value = parse_catalog(&body).unwrap();
        assert_eq!(value["agency"], "AA");
    }

    #[test]
    fn test_parse_without_bom() {
        let value = parse_catalog(br#"{"version": "2.0.0"}"#).unwrap();
        assert_eq!(value["version"], "2.0.0");
    }

    #[test]
    fn test_parse_error_is_recoverable_parse_error() {
        let err = parse_catalog(b"<html>not json</html>").unwrap_err();
        assert!(matches!(err, SourceError::Parse(_)));
        assert_eq!(err.status(), Some("PARSE_ERROR"));
    }
}
