//! Configuration parsing and validation.
//!
//! sneakr is configured via a TOML file (default: `config/sneakr.toml`).
//! Every command receives the parsed [`Config`] explicitly; nothing is read
//! from module-level constants.
//!
//! # Example
//!
//! ```toml
//! [db]
//! path = "./data/sneakr.sqlite"
//!
//! [upstream]
//! base_url = "http://catalog.example.com/api/sneakers"
//! page_size = 100
//! # page_ceiling = 1969
//! timeout_secs = 30
//!
//! [ingest]
//! on_page_error = "stop"   # or "continue" (requires upstream.page_ceiling)
//! dedup = false
//!
//! # Presence of this section enables image re-hosting.
//! [rehost]
//! upload_url = "http://localhost:1337/api/upload"
//! auth_url = "http://localhost:1337/api/auth/local"
//! identifier = "ingest@example.com"
//! ```
//!
//! Secrets never live in the file. The re-hoster reads
//! `SNEAKR_REHOST_TOKEN`, or `SNEAKR_REHOST_PASSWORD` together with
//! `rehost.identifier` to log in at `rehost.auth_url`.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Largest page the upstream catalog accepts.
pub const MAX_PAGE_SIZE: u32 = 100;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub rehost: Option<RehostConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct UpstreamConfig {
    /// Catalog endpoint; pagination parameters are appended as query pairs.
    pub base_url: String,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    /// Optional upper bound on the page number. Not the primary stop signal.
    #[serde(default)]
    pub page_ceiling: Option<u32>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_page_size() -> u32 {
    MAX_PAGE_SIZE
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_user_agent() -> String {
    format!("sneakr/{}", env!("CARGO_PKG_VERSION"))
}

/// What the driver does after a page fetch fails.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum PageErrorPolicy {
    /// Treat the failed page as the end of data.
    #[default]
    Stop,
    /// Count the failure and move on to the next page.
    Continue,
}

impl PageErrorPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            PageErrorPolicy::Stop => "stop",
            PageErrorPolicy::Continue => "continue",
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct IngestConfig {
    #[serde(default)]
    pub on_page_error: PageErrorPolicy,
    /// Opt-in natural-key uniqueness (brand + colorway + links).
    #[serde(default)]
    pub dedup: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RehostConfig {
    pub upload_url: String,
    #[serde(default)]
    pub auth_url: Option<String>,
    #[serde(default)]
    pub identifier: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Config {
    /// Apply `sync` command-line overrides and re-validate.
    pub fn with_overrides(mut self, page_size: Option<u32>, page_ceiling: Option<u32>) -> Result<Self> {
        if let Some(size) = page_size {
            self.upstream.page_size = size;
        }
        if page_ceiling.is_some() {
            self.upstream.page_ceiling = page_ceiling;
        }
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<()> {
        let upstream = &self.upstream;

        if upstream.base_url.trim().is_empty() {
            bail!("upstream.base_url must not be empty");
        }
        reqwest::Url::parse(&upstream.base_url)
            .with_context(|| format!("upstream.base_url is not a valid URL: {}", upstream.base_url))?;

        if upstream.page_size == 0 || upstream.page_size > MAX_PAGE_SIZE {
            bail!("upstream.page_size must be in [1, {}]", MAX_PAGE_SIZE);
        }

        if upstream.page_ceiling == Some(0) {
            bail!("upstream.page_ceiling must be >= 1");
        }

        if upstream.timeout_secs == 0 {
            bail!("upstream.timeout_secs must be > 0");
        }

        // A failing page never yields an empty page under "continue", so the
        // ceiling is the only thing that ends a run against a dead upstream.
        if self.ingest.on_page_error == PageErrorPolicy::Continue && upstream.page_ceiling.is_none()
        {
            bail!("ingest.on_page_error = \"continue\" requires upstream.page_ceiling");
        }

        if let Some(rehost) = &self.rehost {
            reqwest::Url::parse(&rehost.upload_url).with_context(|| {
                format!("rehost.upload_url is not a valid URL: {}", rehost.upload_url)
            })?;
            if rehost.timeout_secs == 0 {
                bail!("rehost.timeout_secs must be > 0");
            }
            if rehost.auth_url.is_some() && rehost.identifier.is_none() {
                bail!("rehost.identifier must be set when rehost.auth_url is set");
            }
        }

        Ok(())
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    config.validate()?;

    Ok(config)
}
