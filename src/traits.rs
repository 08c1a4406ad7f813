//! Seams between the ingestion driver and its external collaborators.
//!
//! ```text
//! ┌──────────────┐   ┌────────────┐   ┌──────────────┐
//! │  PageSource  │──▶│ Normalizer │──▶│  RecordSink  │
//! │ (catalog API)│   │            │   │  (SQLite)    │
//! └──────────────┘   └─────┬──────┘   └──────────────┘
//!                          │ optional
//!                          ▼
//!                    ┌────────────┐
//!                    │ AssetHost  │
//!                    │ (re-host)  │
//!                    └────────────┘
//! ```
//!
//! The built-in implementations are [`CatalogSource`](crate::connector_catalog::CatalogSource),
//! [`SqliteSink`](crate::sqlite_store::SqliteSink) and
//! [`StrapiAssetHost`](crate::rehost::StrapiAssetHost). Tests and custom
//! binaries can supply their own, e.g. an in-memory page source.

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

use crate::error::{AssetUploadError, FetchError};
use crate::models::{NormalizedRecord, WriteOutcome};

/// One page of upstream records plus any total-page hint the source gave.
#[derive(Debug, Clone, Default)]
pub struct Page {
    /// Raw records in upstream order. Each is decoded individually so one
    /// unreadable record cannot sink its siblings.
    pub records: Vec<Value>,
    pub page_count: Option<u32>,
}

/// A paginated upstream catalog.
#[async_trait]
pub trait PageSource: Send + Sync {
    /// Fetch page `page` (1-based) of `page_size` records.
    ///
    /// An empty [`Page::records`] means the source is exhausted.
    async fn fetch_page(&self, page: u32, page_size: u32) -> Result<Page, FetchError>;
}

/// Destination for normalized records.
#[async_trait]
pub trait RecordSink: Send + Sync {
    /// Attempt exactly one insert.
    async fn write(&self, record: &NormalizedRecord) -> Result<WriteOutcome>;
}

/// A hosted copy of an upstream image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostedAsset {
    pub id: String,
    pub url: Option<String>,
}

/// Re-hosts upstream images so stored records do not point at upstream URLs.
#[async_trait]
pub trait AssetHost: Send + Sync {
    async fn upload(&self, image_url: &str) -> Result<HostedAsset, AssetUploadError>;
}
