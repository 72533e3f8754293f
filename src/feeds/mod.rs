//! Feed Collaborators
//!
//! Traits for the upstream score feeds and the manual-input store, the HTTP
//! client implementing them, and the request sequencing and refresh
//! scheduling built on top.

pub mod http;
pub mod scheduler;
pub mod sequencer;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

use crate::manual::field::{as_of_key, ManualInputField, ManualInputsResponse};
use crate::manual::UpdateError;
use crate::scoring::{CmdsSnapshot, ContractViolation, FrsSnapshot, VpSnapshot};

pub use http::HttpRiskApi;
pub use scheduler::{refresh_once, RefreshScheduler};
pub use sequencer::{RequestSequencer, RequestTicket};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedKey {
    Cmds,
    Frs,
    Vp,
    ManualInputs,
}

impl FeedKey {
    pub const ALL: [FeedKey; 4] = [FeedKey::Cmds, FeedKey::Frs, FeedKey::Vp, FeedKey::ManualInputs];

    /// Feeds refreshed on the periodic timer
    pub const SCORE_FEEDS: [FeedKey; 3] = [FeedKey::Cmds, FeedKey::Frs, FeedKey::Vp];

    pub fn as_str(&self) -> &'static str {
        match self {
            FeedKey::Cmds => "cmds",
            FeedKey::Frs => "frs",
            FeedKey::Vp => "vp",
            FeedKey::ManualInputs => "manual_inputs",
        }
    }

    pub fn index(&self) -> usize {
        match self {
            FeedKey::Cmds => 0,
            FeedKey::Frs => 1,
            FeedKey::Vp => 2,
            FeedKey::ManualInputs => 3,
        }
    }
}

impl fmt::Display for FeedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure of one feed. Contained to that feed's section of the view.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FeedError {
    #[error("{feed} feed unavailable: {reason}")]
    Unavailable { feed: FeedKey, reason: String },

    #[error("{feed} feed returned malformed data: {reason}")]
    Malformed { feed: FeedKey, reason: String },

    #[error("{feed} feed broke its data contract: {violation}")]
    ContractViolation {
        feed: FeedKey,
        violation: ContractViolation,
    },
}

impl FeedError {
    pub fn feed(&self) -> FeedKey {
        match self {
            FeedError::Unavailable { feed, .. }
            | FeedError::Malformed { feed, .. }
            | FeedError::ContractViolation { feed, .. } => *feed,
        }
    }
}

/// Read-only source of the three score snapshots
#[async_trait]
pub trait ScoreFeed: Send + Sync {
    async fn fetch_cmds(&self) -> Result<CmdsSnapshot, FeedError>;
    async fn fetch_frs(&self) -> Result<FrsSnapshot, FeedError>;
    async fn fetch_vp(&self) -> Result<VpSnapshot, FeedError>;
}

/// Backend persistence of manual inputs
#[async_trait]
pub trait ManualInputStore: Send + Sync {
    async fn fetch(&self) -> Result<ManualInputsResponse, FeedError>;

    /// Apply a partial update; the response may be only part of the new state.
    async fn patch(&self, payload: &UpdatePayload) -> Result<ManualInputsResponse, UpdateError>;
}

/// Partial manual-input update: changed fields plus their `_as_of` companions
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UpdatePayload(BTreeMap<String, Value>);

impl UpdatePayload {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, field: &ManualInputField, value: f64, as_of: Option<NaiveDate>) {
        self.0.insert(field.name.clone(), field.wire_value(value));
        if let Some(date) = as_of {
            self.0
                .insert(as_of_key(&field.name), Value::String(date.format("%Y-%m-%d").to_string()));
        }
    }

    /// Field names carried, without the `_as_of` companions
    pub fn fields(&self) -> Vec<String> {
        self.0
            .keys()
            .filter(|k| !k.ends_with("_as_of"))
            .cloned()
            .collect()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn entries(&self) -> &BTreeMap<String, Value> {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
