//! Image re-hosting through a Strapi-style upload endpoint.
//!
//! When `[rehost]` is configured, each record's primary image is downloaded
//! from upstream and uploaded to `rehost.upload_url` as a multipart `files`
//! field with a bearer token. The endpoint answers with `{ id, url }` or a
//! list of such objects (Strapi returns a list).
//!
//! # Authentication
//!
//! The token is resolved once, before the first page is fetched:
//!
//! 1. `SNEAKR_REHOST_TOKEN` if set.
//! 2. Otherwise `POST rehost.auth_url` with
//!    `{ "identifier": rehost.identifier, "password": $SNEAKR_REHOST_PASSWORD }`
//!    and take `jwt` from the response.
//!
//! Failing to obtain a token is a fatal precondition: re-hosting mode cannot
//! store a single record without it.

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde_json::Value;
use std::time::Duration;

use crate::config::RehostConfig;
use crate::error::{AssetUploadError, IngestError};
use crate::traits::{AssetHost, HostedAsset};

pub const TOKEN_ENV: &str = "SNEAKR_REHOST_TOKEN";
pub const PASSWORD_ENV: &str = "SNEAKR_REHOST_PASSWORD";

pub struct StrapiAssetHost {
    client: reqwest::Client,
    upload_url: String,
    token: String,
}

impl StrapiAssetHost {
    /// Build the client and resolve a bearer token (env token, else login).
    pub async fn connect(config: &RehostConfig) -> Result<Self, IngestError> {
        let client = build_client(config)?;

        if let Ok(token) = std::env::var(TOKEN_ENV) {
            if !token.trim().is_empty() {
                return Ok(Self::with_client(client, config, token));
            }
        }

        let (auth_url, identifier) = match (&config.auth_url, &config.identifier) {
            (Some(url), Some(id)) => (url, id),
            _ => {
                return Err(IngestError::FatalPrecondition(format!(
                    "re-hosting needs {} or rehost.auth_url + rehost.identifier",
                    TOKEN_ENV
                )))
            }
        };
        let password = std::env::var(PASSWORD_ENV).map_err(|_| {
            IngestError::FatalPrecondition(format!("{} environment variable not set", PASSWORD_ENV))
        })?;

        let token = login(&client, auth_url, identifier, &password)
            .await
            .map_err(|e| IngestError::FatalPrecondition(format!("re-host login failed: {}", e)))?;

        Ok(Self::with_client(client, config, token))
    }

    /// Use an already-known bearer token.
    pub fn with_token(config: &RehostConfig, token: String) -> Result<Self, IngestError> {
        Ok(Self::with_client(build_client(config)?, config, token))
    }

    fn with_client(client: reqwest::Client, config: &RehostConfig, token: String) -> Self {
        Self {
            client,
            upload_url: config.upload_url.clone(),
            token,
        }
    }
}

fn build_client(config: &RehostConfig) -> Result<reqwest::Client, IngestError> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()
        .map_err(|e| IngestError::FatalPrecondition(format!("cannot build HTTP client: {}", e)))
}

async fn login(
    client: &reqwest::Client,
    auth_url: &str,
    identifier: &str,
    password: &str,
) -> anyhow::Result<String> {
    let resp = client
        .post(auth_url)
        .json(&serde_json::json!({
            "identifier": identifier,
            "password": password,
        }))
        .send()
        .await?;

    let status = resp.status();
    if !status.is_success() {
        anyhow::bail!("auth endpoint returned HTTP {}", status.as_u16());
    }

    let json: Value = resp.json().await?;
    json.get("jwt")
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| anyhow::anyhow!("auth response has no jwt"))
}

#[async_trait]
impl AssetHost for StrapiAssetHost {
    async fn upload(&self, image_url: &str) -> Result<HostedAsset, AssetUploadError> {
        if !image_url.starts_with("http://") && !image_url.starts_with("https://") {
            return Err(AssetUploadError(format!(
                "image URL must be absolute: {}",
                image_url
            )));
        }

        let download = self
            .client
            .get(image_url)
            .send()
            .await
            .map_err(|e| AssetUploadError(format!("download failed: {}", e)))?;
        if !download.status().is_success() {
            return Err(AssetUploadError(format!(
                "download returned HTTP {}",
                download.status().as_u16()
            )));
        }
        let bytes = download
            .bytes()
            .await
            .map_err(|e| AssetUploadError(format!("download failed: {}", e)))?;

        let form = Form::new().part(
            "files",
            Part::bytes(bytes.to_vec()).file_name(file_name_for(image_url)),
        );

        let resp = self
            .client
            .post(&self.upload_url)
            .bearer_auth(&self.token)
            .multipart(form)
            .send()
            .await
            .map_err(|e| AssetUploadError(format!("upload failed: {}", e)))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(AssetUploadError(format!(
                "upload returned HTTP {}: {}",
                status.as_u16(),
                body
            )));
        }

        let json: Value = resp
            .json()
            .await
            .map_err(|e| AssetUploadError(format!("unreadable upload response: {}", e)))?;
        parse_upload_response(&json)
    }
}

/// Accepts `{id, url}` or `[{id, url}, ..]` (first element wins).
pub fn parse_upload_response(json: &Value) -> Result<HostedAsset, AssetUploadError> {
    let entry = match json {
        Value::Array(items) => items.first(),
        other => Some(other),
    }
    .ok_or_else(|| AssetUploadError("upload response is empty".to_string()))?;

    let id = match entry.get("id") {
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::String(s)) if !s.is_empty() => s.clone(),
        _ => return Err(AssetUploadError("upload response has no id".to_string())),
    };

    let url = entry
        .get("url")
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string());

    Ok(HostedAsset { id, url })
}

fn file_name_for(image_url: &str) -> String {
    image_url
        .split(['?', '#'])
        .next()
        .and_then(|path| path.rsplit('/').next())
        .filter(|name| !name.is_empty() && name.contains('.'))
        .unwrap_or("image.jpg")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_list_and_object_responses() {
        let asset = parse_upload_response(&json!([
            { "id": 12, "url": "/uploads/dunk_12.png" },
            { "id": 13, "url": "/uploads/other.png" }
        ]))
        .unwrap();
        assert_eq!(asset.id, "12");
        assert_eq!(asset.url.as_deref(), Some("/uploads/dunk_12.png"));

        let asset = parse_upload_response(&json!({ "id": "abc" })).unwrap();
        assert_eq!(asset.id, "abc");
        assert_eq!(asset.url, None);
    }

    #[test]
    fn rejects_responses_without_id() {
        assert!(parse_upload_response(&json!([])).is_err());
        assert!(parse_upload_response(&json!({ "url": "/x.png" })).is_err());
    }

    #[test]
    fn file_name_from_url() {
        assert_eq!(
            file_name_for("https://img.example.com/a/b/dunk-low.png?w=700"),
            "dunk-low.png"
        );
        assert_eq!(file_name_for("https://img.example.com/a/b/"), "image.jpg");
    }

    #[tokio::test]
    async fn relative_image_url_fails_without_network() {
        let cfg = RehostConfig {
            upload_url: "http://127.0.0.1:9/api/upload".to_string(),
            auth_url: None,
            identifier: None,
            timeout_secs: 1,
        };
        let host = StrapiAssetHost::with_token(&cfg, "t".to_string()).unwrap();
        let err = host.upload("/images/dunk.png").await.unwrap_err();
        assert!(err.0.contains("absolute"));
    }
}
