//! Core data models used throughout sneakr.
//!
//! These types represent the records that flow through the ingestion
//! pipeline: what the upstream catalog sends, what the store receives, and
//! the counters a run reports.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// A record exactly as the upstream catalog returns it.
///
/// Every attribute is optional here; presence and validity are checked by
/// the normalizer, not by serde.
#[derive(Debug, Clone, Deserialize)]
pub struct UpstreamRecord {
    #[serde(default)]
    pub id: Option<Value>,
    #[serde(default)]
    pub attributes: UpstreamAttributes,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpstreamAttributes {
    #[serde(default)]
    pub brand: Option<String>,
    #[serde(default)]
    pub colorway: Option<String>,
    #[serde(default)]
    pub estimated_market_value: Option<Value>,
    #[serde(default)]
    pub gender: Option<Value>,
    /// Image block; only `original` is read, alternate angles are ignored.
    #[serde(default)]
    pub image: Option<Value>,
    #[serde(default)]
    pub links: Option<Value>,
}

impl UpstreamRecord {
    /// Upstream id rendered as text (`42` and `"42"` both give `"42"`).
    pub fn id_string(&self) -> Option<String> {
        match &self.id {
            Some(Value::String(s)) => Some(s.clone()),
            Some(Value::Number(n)) => Some(n.to_string()),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Men,
    Women,
    Unisex,
}

impl Gender {
    pub fn as_str(&self) -> &'static str {
        match self {
            Gender::Men => "men",
            Gender::Women => "women",
            Gender::Unisex => "unisex",
        }
    }

    /// Strict parse: `None` for anything outside the three known values.
    pub fn parse(raw: &str) -> Option<Gender> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "men" => Some(Gender::Men),
            "women" => Some(Gender::Women),
            "unisex" => Some(Gender::Unisex),
            _ => None,
        }
    }
}

impl fmt::Display for Gender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A validated, defaulted record ready to be written to the store.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalizedRecord {
    pub upstream_id: Option<String>,
    pub brand: String,
    pub colorway: String,
    pub estimated_market_value: Option<f64>,
    pub gender: Gender,
    pub image_url: Option<String>,
    /// Reference returned by the asset re-hoster, when re-hosting is on.
    pub image_asset_id: Option<String>,
    /// Upstream `links` mapping, serialized as JSON text.
    pub links: String,
}

/// Result of a single insert attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Inserted,
    /// The natural key already exists (only possible with dedup enabled).
    Duplicate,
}

/// Counters for one page.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PageReport {
    pub page: u32,
    pub fetched: u64,
    pub written: u64,
    pub rejected: u64,
    pub failed: u64,
    pub duplicates: u64,
}

/// Counters for a whole run, printed as the final summary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    /// Number of page fetches issued, including the terminating one.
    pub pages: u64,
    pub written: u64,
    pub rejected: u64,
    /// Failed page fetches plus failed record writes.
    pub failed: u64,
    pub duplicates: u64,
    pub cancelled: bool,
}

impl RunSummary {
    pub fn absorb(&mut self, page: &PageReport) {
        self.written += page.written;
        self.rejected += page.rejected;
        self.failed += page.failed;
        self.duplicates += page.duplicates;
    }

    pub fn status(&self) -> &'static str {
        if self.cancelled {
            "cancelled"
        } else {
            "done"
        }
    }
}
