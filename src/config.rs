//! Console configuration, read from the environment.

use anyhow::{Context, Result};
use std::time::Duration;

use crate::scoring::SchemeVersion;

pub const ENV_API_BASE_URL: &str = "RISK_API_BASE_URL";
pub const ENV_REFRESH_INTERVAL_MS: &str = "RISK_REFRESH_INTERVAL_MS";
pub const ENV_REQUEST_TIMEOUT_MS: &str = "RISK_REQUEST_TIMEOUT_MS";
pub const ENV_MAX_POINTS_VERSION: &str = "RISK_MAX_POINTS_VERSION";

#[derive(Debug, Clone, PartialEq)]
pub struct ConsoleConfig {
    /// Base URL of the risk API, without trailing slash
    pub api_base_url: String,
    /// Auto-refresh period of the score feeds
    pub refresh_interval: Duration,
    pub request_timeout: Duration,
    /// Points table version used for component maxima
    pub scheme_version: SchemeVersion,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            api_base_url: "http://127.0.0.1:8000/api".to_string(),
            refresh_interval: Duration::from_millis(300_000),
            request_timeout: Duration::from_millis(30_000),
            scheme_version: SchemeVersion::Enhanced,
        }
    }
}

fn millis(key: &str, raw: &str) -> Result<Duration> {
    let ms: u64 = raw
        .trim()
        .parse()
        .with_context(|| format!("{} must be a whole number of milliseconds, got '{}'", key, raw))?;
    if ms == 0 {
        anyhow::bail!("{} must be greater than zero", key);
    }
    Ok(Duration::from_millis(ms))
}

impl ConsoleConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; unset keys keep their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(url) = lookup(ENV_API_BASE_URL) {
            let url = url.trim().trim_end_matches('/');
            if url.is_empty() {
                anyhow::bail!("{} must not be empty", ENV_API_BASE_URL);
            }
            config.api_base_url = url.to_string();
        }
        if let Some(raw) = lookup(ENV_REFRESH_INTERVAL_MS) {
            config.refresh_interval = millis(ENV_REFRESH_INTERVAL_MS, &raw)?;
        }
        if let Some(raw) = lookup(ENV_REQUEST_TIMEOUT_MS) {
            config.request_timeout = millis(ENV_REQUEST_TIMEOUT_MS, &raw)?;
        }
        if let Some(raw) = lookup(ENV_MAX_POINTS_VERSION) {
            config.scheme_version = raw
                .parse()
                .map_err(|e: String| anyhow::anyhow!(e))
                .with_context(|| format!("Invalid {}", ENV_MAX_POINTS_VERSION))?;
        }
        Ok(config)
    }
}
