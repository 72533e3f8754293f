use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, info};

use super::{FeedError, FeedKey, ManualInputStore, ScoreFeed, UpdatePayload};
use crate::config::ConsoleConfig;
use crate::manual::field::ManualInputsResponse;
use crate::manual::UpdateError;
use crate::scoring::{CmdsSnapshot, FrsSnapshot, VpSnapshot};

/// JSON client for the risk API
pub struct HttpRiskApi {
    client: Client,
    base_url: String,
}

impl HttpRiskApi {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn from_config(config: &ConsoleConfig) -> Result<Self> {
        Self::new(&config.api_base_url, config.request_timeout)
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    async fn get_json<T: DeserializeOwned>(&self, feed: FeedKey, path: &str) -> Result<T, FeedError> {
        let unavailable = |reason: String| FeedError::Unavailable { feed, reason };

        debug!("GET {}", self.url(path));
        let res = self
            .client
            .get(self.url(path))
            .send()
            .await
            .map_err(|e| unavailable(e.to_string()))?;

        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            return Err(unavailable(rejection_reason(status, &body)));
        }

        let body = res.text().await.map_err(|e| unavailable(e.to_string()))?;
        serde_json::from_str(&body).map_err(|e| FeedError::Malformed {
            feed,
            reason: e.to_string(),
        })
    }
}

/// Server-provided reason for a failed request: the `detail` field when the
/// body carries one, the raw body otherwise, the status line as a last resort.
pub fn rejection_reason(status: StatusCode, body: &str) -> String {
    let detail = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|json| match &json["detail"] {
            serde_json::Value::String(s) => Some(s.clone()),
            serde_json::Value::Null => None,
            other => Some(other.to_string()),
        });

    match detail {
        Some(d) => d,
        None if !body.trim().is_empty() => body.trim().to_string(),
        None => status.to_string(),
    }
}

#[async_trait]
impl ScoreFeed for HttpRiskApi {
    async fn fetch_cmds(&self) -> Result<CmdsSnapshot, FeedError> {
        self.get_json(FeedKey::Cmds, "cmds").await
    }

    async fn fetch_frs(&self) -> Result<FrsSnapshot, FeedError> {
        self.get_json(FeedKey::Frs, "frs").await
    }

    async fn fetch_vp(&self) -> Result<VpSnapshot, FeedError> {
        self.get_json(FeedKey::Vp, "volatility").await
    }
}

#[async_trait]
impl ManualInputStore for HttpRiskApi {
    async fn fetch(&self) -> Result<ManualInputsResponse, FeedError> {
        self.get_json(FeedKey::ManualInputs, "manual-inputs").await
    }

    async fn patch(&self, payload: &UpdatePayload) -> Result<ManualInputsResponse, UpdateError> {
        info!("PATCH manual-inputs with {} entries", payload.len());
        let res = self
            .client
            .patch(self.url("manual-inputs"))
            .json(payload)
            .send()
            .await
            .map_err(|e| FeedError::Unavailable {
                feed: FeedKey::ManualInputs,
                reason: e.to_string(),
            })?;

        let status = res.status();
        let body = res.text().await.unwrap_or_default();
        if status == StatusCode::CONFLICT {
            return Err(UpdateError::Conflict(rejection_reason(status, &body)));
        }
        if !status.is_success() {
            return Err(UpdateError::Rejected(rejection_reason(status, &body)));
        }

        // The echo may be partial; callers refetch rather than trust it.
        Ok(serde_json::from_str(&body).unwrap_or_default())
    }
}
