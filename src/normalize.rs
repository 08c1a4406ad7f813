//! Record normalization.
//!
//! Maps one upstream record onto the local schema, or rejects it:
//!
//! | Field | Rule |
//! |-------|------|
//! | `brand`, `colorway` | required, non-empty after trimming |
//! | `estimatedMarketValue` | number → kept (including `0`); absent/null → `None` |
//! | `gender` | `men`/`women`/`unisex` (case-insensitive); anything else → `unisex` |
//! | `image.original` | primary image URL when a non-empty string; alternate angles are dropped |
//! | `links` | passed through as JSON text (`{}` when absent) |
//!
//! With an [`AssetHost`] configured, uploading the primary image is a hard
//! prerequisite: a record without an image, or whose upload fails, is
//! rejected rather than stored with a dangling reference.

use serde_json::Value;
use std::sync::Arc;

use crate::error::Rejection;
use crate::models::{Gender, NormalizedRecord, UpstreamRecord};
use crate::traits::AssetHost;

#[derive(Clone, Default)]
pub struct Normalizer {
    assets: Option<Arc<dyn AssetHost>>,
    /// Apply re-host validation without uploading anything.
    preview: bool,
}

impl Normalizer {
    pub fn new() -> Self {
        Self {
            assets: None,
            preview: false,
        }
    }

    /// Normalizer that re-hosts every primary image through `assets`.
    pub fn with_asset_host(assets: Arc<dyn AssetHost>) -> Self {
        Self {
            assets: Some(assets),
            preview: false,
        }
    }

    /// Same rules as `self`, but images are never uploaded. Records that
    /// would be re-hosted keep their upstream URL and get no asset id.
    pub fn preview(&self) -> Self {
        Self {
            assets: self.assets.clone(),
            preview: true,
        }
    }

    pub fn rehosting(&self) -> bool {
        self.assets.is_some()
    }

    pub async fn normalize(&self, raw: &Value) -> Result<NormalizedRecord, Rejection> {
        let record: UpstreamRecord = serde_json::from_value(raw.clone())
            .map_err(|e| Rejection::Malformed(e.to_string()))?;
        let upstream_id = record.id_string();
        let attrs = record.attributes;

        let brand = required(attrs.brand).ok_or(Rejection::MissingBrand)?;
        let colorway = required(attrs.colorway).ok_or(Rejection::MissingColorway)?;

        let estimated_market_value = match attrs.estimated_market_value {
            None | Some(Value::Null) => None,
            Some(Value::Number(n)) => n.as_f64(),
            Some(other) => {
                tracing::warn!(
                    upstream_id = upstream_id.as_deref().unwrap_or("-"),
                    value = %other,
                    "estimatedMarketValue is not a number; storing null"
                );
                None
            }
        };

        let gender = match &attrs.gender {
            None | Some(Value::Null) => Gender::Unisex,
            Some(raw_gender) => raw_gender
                .as_str()
                .and_then(Gender::parse)
                .unwrap_or_else(|| {
                    tracing::warn!(
                        upstream_id = upstream_id.as_deref().unwrap_or("-"),
                        gender = %raw_gender,
                        "invalid gender; defaulting to unisex"
                    );
                    Gender::Unisex
                }),
        };

        let original_image = attrs.image.as_ref().and_then(primary_image);

        let (image_url, image_asset_id) = match &self.assets {
            None => (original_image, None),
            Some(_) if self.preview => {
                let source_url = original_image.ok_or(Rejection::MissingImage)?;
                (Some(source_url), None)
            }
            Some(host) => {
                let source_url = original_image.ok_or(Rejection::MissingImage)?;
                let asset = host
                    .upload(&source_url)
                    .await
                    .map_err(|e| Rejection::AssetUpload(e.to_string()))?;
                (Some(asset.url.unwrap_or(source_url)), Some(asset.id))
            }
        };

        let links = match attrs.links {
            None | Some(Value::Null) => "{}".to_string(),
            Some(v) => v.to_string(),
        };

        Ok(NormalizedRecord {
            upstream_id,
            brand,
            colorway,
            estimated_market_value,
            gender,
            image_url,
            image_asset_id,
            links,
        })
    }
}

/// `image.original` when it is a non-empty string.
fn primary_image(image: &Value) -> Option<String> {
    image
        .get("original")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|url| !url.is_empty())
        .map(str::to_string)
}

fn required(value: Option<String>) -> Option<String> {
    value
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}
