//! Configuration loading from TOML files

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use cloudlist_aws::{Endpoint, HttpSettings};
use cloudlist_core::{ListingConfig, RateConfig, RetryPolicy};
use serde::Deserialize;

/// Global configuration for cloudlist
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub listing: ListingConfig,
    /// Minimum call spacing per operation kind; `[listing.rate]` is accepted
    /// too, but not both
    pub rate: Option<RateConfig>,
    pub endpoint: EndpointConfig,
    pub http: HttpConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EndpointConfig {
    pub base_url: String,
    pub region: String,
    pub account_id: String,
    #[serde(deserialize_with = "deserialize_env_var")]
    pub token: Option<String>,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:4566/".to_string(),
            region: "us-east-1".to_string(),
            account_id: "000000000000".to_string(),
            token: std::env::var("CLOUDLIST_TOKEN").ok(),
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Request timeout in seconds
    pub timeout: u64,
    pub max_retries: u32,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout: 30,
            max_retries: 3,
        }
    }
}

/// Deserialize a string that may contain environment variable reference like ${VAR}
fn deserialize_env_var<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let opt: Option<String> = Option::deserialize(deserializer)?;
    Ok(opt.and_then(|s| expand_env_var(&s)))
}

/// Expand ${VAR} to environment variable value
fn expand_env_var(s: &str) -> Option<String> {
    if let Some(var_name) = s.strip_prefix("${").and_then(|s| s.strip_suffix('}')) {
        std::env::var(var_name).ok()
    } else {
        Some(s.to_string())
    }
}

impl Config {
    /// Load configuration from default locations
    ///
    /// Search order:
    /// 1. ./cloudlist.toml (current directory)
    /// 2. ~/.config/cloudlist/config.toml
    ///
    /// If no config file found, returns default config.
    pub fn load() -> Result<Self> {
        let local_config = PathBuf::from("cloudlist.toml");
        if local_config.exists() {
            return Self::from_file(&local_config);
        }

        if let Some(config_dir) = directories::ProjectDirs::from("", "", "cloudlist") {
            let user_config = config_dir.config_dir().join("config.toml");
            if user_config.exists() {
                return Self::from_file(&user_config);
            }
        }

        log::debug!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Load configuration from a specific file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config = Self::parse(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        log::info!("Loaded config from {}", path.display());
        Ok(config)
    }

    fn parse(content: &str) -> Result<Self> {
        let table: toml::Table = toml::from_str(content)?;
        let nested_rate = table
            .get("listing")
            .and_then(|listing| listing.get("rate"))
            .is_some();
        if nested_rate && table.contains_key("rate") {
            anyhow::bail!("rate limits are set in both [rate] and [listing.rate]");
        }
        Ok(toml::from_str(content)?)
    }

    /// Listing tunables with the `[rate]` section applied
    pub fn listing(&self) -> ListingConfig {
        ListingConfig {
            rate: self.rate.unwrap_or(self.listing.rate),
            ..self.listing.clone()
        }
    }

    pub fn endpoint(&self) -> Endpoint {
        Endpoint {
            base_url: self.endpoint.base_url.clone(),
            region: self.endpoint.region.clone(),
            account_id: self.endpoint.account_id.clone(),
            token: self.endpoint.token.clone(),
        }
    }

    pub fn http_settings(&self) -> HttpSettings {
        HttpSettings {
            timeout: Duration::from_secs(self.http.timeout),
            retry: RetryPolicy {
                max_retries: self.http.max_retries,
                ..RetryPolicy::default()
            },
        }
    }
}
