//! Manual Input Update Coordinator
//!
//! Stages validated edits, submits them as one partial update and refetches
//! the authoritative state afterwards. Submits are serialized; validation
//! is not.

use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use super::catalog::FieldCatalog;
use super::field::{ManualInputField, ManualInputsState};
use super::validator::{validate, ValidatedEntry, ValidationError};
use crate::dashboard::Dashboard;
use crate::events::ConsoleEvent;
use crate::feeds::{FeedError, FeedKey, ManualInputStore, UpdatePayload};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum UpdateError {
    #[error("{field}: {source}")]
    Validation {
        field: String,
        #[source]
        source: ValidationError,
    },

    #[error("unknown manual input field '{0}'")]
    UnknownField(String),

    #[error("update rejected: {0}")]
    Rejected(String),

    #[error("version conflict: {0}")]
    Conflict(String),

    #[error(transparent)]
    Feed(#[from] FeedError),
}

impl UpdateError {
    /// Reason as shown at the field: server text verbatim when there is one
    pub fn reason(&self) -> String {
        match self {
            UpdateError::Rejected(reason) | UpdateError::Conflict(reason) => reason.clone(),
            UpdateError::Validation { source, .. } => source.to_string(),
            other => other.to_string(),
        }
    }
}

pub struct UpdateCoordinator {
    store: Arc<dyn ManualInputStore>,
    dashboard: Arc<Dashboard>,
    catalog: FieldCatalog,
    /// Last state confirmed by the backend
    confirmed: RwLock<Option<ManualInputsState>>,
    pending: Mutex<BTreeMap<String, ValidatedEntry>>,
    field_errors: Mutex<BTreeMap<String, String>>,
    submit_lock: Mutex<()>,
}

impl UpdateCoordinator {
    pub fn new(store: Arc<dyn ManualInputStore>, dashboard: Arc<Dashboard>) -> Self {
        Self {
            store,
            dashboard,
            catalog: FieldCatalog::standard(),
            confirmed: RwLock::new(None),
            pending: Mutex::new(BTreeMap::new()),
            field_errors: Mutex::new(BTreeMap::new()),
            submit_lock: Mutex::new(()),
        }
    }

    pub fn with_catalog(mut self, catalog: FieldCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    pub async fn state(&self) -> Option<ManualInputsState> {
        self.confirmed.read().await.clone()
    }

    /// Field schema and current value; the built-in catalog answers until the
    /// first fetch completes.
    pub async fn field(&self, name: &str) -> Option<ManualInputField> {
        match self.confirmed.read().await.as_ref() {
            Some(state) => state.field(name).or_else(|| self.catalog.field(name)),
            None => self.catalog.field(name),
        }
    }

    pub async fn fields(&self) -> Vec<ManualInputField> {
        match self.confirmed.read().await.as_ref() {
            Some(state) => state.fields(),
            None => self.catalog.default_state().fields(),
        }
    }

    /// Validate a candidate edit and stage it. A rejected candidate is recorded
    /// against the field and never leaves this process.
    pub async fn stage(&self, name: &str, value: &str, as_of: Option<&str>) -> Result<ValidatedEntry, UpdateError> {
        let field = self
            .field(name)
            .await
            .ok_or_else(|| UpdateError::UnknownField(name.to_string()))?;

        match validate(&field, value, as_of) {
            Ok(entry) => {
                self.pending.lock().await.insert(name.to_string(), entry);
                self.field_errors.lock().await.remove(name);
                Ok(entry)
            }
            Err(source) => {
                debug!("Rejected edit for {}: {}", name, source);
                self.field_errors.lock().await.insert(name.to_string(), source.to_string());
                Err(UpdateError::Validation {
                    field: name.to_string(),
                    source,
                })
            }
        }
    }

    pub async fn discard(&self, name: &str) {
        self.pending.lock().await.remove(name);
        self.field_errors.lock().await.remove(name);
    }

    pub async fn pending(&self) -> BTreeMap<String, ValidatedEntry> {
        self.pending.lock().await.clone()
    }

    pub async fn field_error(&self, name: &str) -> Option<String> {
        self.field_errors.lock().await.get(name).cloned()
    }

    /// Value to show at the field: the staged edit, else the confirmed value
    pub async fn display_value(&self, name: &str) -> Option<f64> {
        if let Some(entry) = self.pending.lock().await.get(name) {
            return Some(entry.value);
        }
        self.field(name).await.map(|f| f.value)
    }

    pub async fn apply_pending(&self) -> Result<ManualInputsState, UpdateError> {
        let pending = self.pending().await;
        self.apply(pending).await
    }

    /// Submit changed fields as one partial update, then refetch.
    ///
    /// Entries equal to the confirmed state are left out, so re-applying an
    /// accepted update sends nothing and returns the state unchanged.
    pub async fn apply(&self, pending: BTreeMap<String, ValidatedEntry>) -> Result<ManualInputsState, UpdateError> {
        let _submit = self.submit_lock.lock().await;

        let baseline = match self.state().await {
            Some(state) => state,
            None => self.refresh().await?,
        };

        let payload = match self.build_payload(&baseline, &pending) {
            Ok(payload) => payload,
            Err((name, err)) => {
                self.settle(&pending, Some((name.as_str(), err.reason()))).await;
                return Err(err);
            }
        };

        if payload.is_empty() {
            debug!("Manual inputs already match; nothing to submit");
            self.settle(&pending, None).await;
            return Ok(baseline);
        }

        let fields = payload.fields();
        info!("Submitting manual input update: {}", fields.join(", "));

        if let Err(err) = self.store.patch(&payload).await {
            let reason = err.reason();
            warn!("Manual input update rejected: {}", reason);
            self.settle(&pending, None).await;
            let mut errors = self.field_errors.lock().await;
            for name in &fields {
                errors.insert(name.clone(), reason.clone());
            }
            drop(errors);
            self.dashboard
                .events()
                .publish(ConsoleEvent::ManualInputRejected { fields, reason });
            return Err(err);
        }

        self.settle(&pending, None).await;
        self.dashboard.invalidate_derived().await;
        let refreshed = self.refresh().await;
        self.dashboard.events().publish(ConsoleEvent::ManualInputsSaved { fields });
        refreshed
    }

    fn build_payload(
        &self,
        baseline: &ManualInputsState,
        pending: &BTreeMap<String, ValidatedEntry>,
    ) -> Result<UpdatePayload, (String, UpdateError)> {
        let mut payload = UpdatePayload::new();
        for (name, entry) in pending {
            let field = baseline
                .field(name)
                .or_else(|| self.catalog.field(name))
                .ok_or_else(|| (name.clone(), UpdateError::UnknownField(name.clone())))?;

            if !field.contains(entry.value) {
                let source = ValidationError::OutOfRange {
                    min: field.min,
                    max: field.max,
                };
                return Err((name.clone(), UpdateError::Validation { field: name.clone(), source }));
            }

            let value_changed = baseline.value(name) != Some(entry.value);
            let date_changed = entry.as_of.is_some() && entry.as_of != baseline.as_of(name);
            if value_changed || date_changed {
                payload.set(&field, entry.value, entry.as_of);
            }
        }
        Ok(payload)
    }

    /// Drop staged entries that were part of this submit, and record a field
    /// error if one is given. Edits staged meanwhile are kept.
    async fn settle(&self, submitted: &BTreeMap<String, ValidatedEntry>, error: Option<(&str, String)>) {
        self.pending
            .lock()
            .await
            .retain(|name, entry| submitted.get(name) != Some(entry));

        let mut errors = self.field_errors.lock().await;
        for name in submitted.keys() {
            errors.remove(name);
        }
        if let Some((name, reason)) = error {
            errors.insert(name.to_string(), reason);
        }
    }

    /// Refetch the authoritative manual inputs
    pub async fn refresh(&self) -> Result<ManualInputsState, UpdateError> {
        let ticket = self.dashboard.begin(FeedKey::ManualInputs);
        match self.store.fetch().await {
            Ok(response) => {
                let state = ManualInputsState::from_response(response, &self.catalog);
                let mut confirmed = self.confirmed.write().await;
                if self.dashboard.complete_manual(ticket, Ok(state.clone())).await {
                    *confirmed = Some(state.clone());
                }
                Ok(state)
            }
            Err(err) => {
                self.dashboard.complete_manual(ticket, Err(err.clone())).await;
                Err(err.into())
            }
        }
    }
}
