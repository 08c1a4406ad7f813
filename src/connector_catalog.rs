//! Upstream catalog connector (the page fetcher).
//!
//! Talks to a Strapi-style paginated JSON API:
//!
//! ```text
//! GET <base_url>?pagination[page]=<p>&pagination[pageSize]=<n>
//! 200 { "data": [ { "id": .., "attributes": { .. } }, .. ],
//!       "meta": { "pagination": { "pageCount": .. } } }
//! ```
//!
//! Every request carries a bounded timeout so a run can never stall on one
//! page. Failures are classified into [`FetchError`]; what to do about them
//! is the driver's decision.

use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;

use crate::config::UpstreamConfig;
use crate::error::FetchError;
use crate::traits::{Page, PageSource};

/// HTTP client for the upstream catalog. Built once per run.
pub struct CatalogSource {
    client: reqwest::Client,
    base_url: String,
    timeout_secs: u64,
}

impl CatalogSource {
    pub fn new(config: &UpstreamConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(config.user_agent.clone())
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.clone(),
            timeout_secs: config.timeout_secs,
        })
    }

    fn classify(&self, err: reqwest::Error) -> FetchError {
        if err.is_timeout() {
            FetchError::Timeout(self.timeout_secs)
        } else if err.is_decode() {
            FetchError::Decode(err.to_string())
        } else {
            FetchError::Transport {
                message: err.to_string(),
                connect: err.is_connect(),
            }
        }
    }
}

#[async_trait]
impl PageSource for CatalogSource {
    async fn fetch_page(&self, page: u32, page_size: u32) -> Result<Page, FetchError> {
        let response = self
            .client
            .get(&self.base_url)
            .query(&[
                ("pagination[page]", page),
                ("pagination[pageSize]", page_size),
            ])
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        let json: Value = response.json().await.map_err(|e| self.classify(e))?;
        parse_page(&json)
    }
}

/// Extract the record list and the optional `pageCount` hint.
pub fn parse_page(json: &Value) -> Result<Page, FetchError> {
    let records = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| FetchError::Decode("response has no data array".to_string()))?
        .clone();

    let page_count = json
        .pointer("/meta/pagination/pageCount")
        .and_then(|v| v.as_u64())
        .and_then(|v| u32::try_from(v).ok());

    Ok(Page {
        records,
        page_count,
    })
}
