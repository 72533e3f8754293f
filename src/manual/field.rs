//! Manual Input Field Model
//!
//! Field schema, the wire shape of the manual-inputs feed and the cached
//! state built from it.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::{debug, warn};

use super::catalog::FieldCatalog;
use crate::freshness::parse_timestamp;

/// Key under which a field's as-of date is stored
pub fn as_of_key(name: &str) -> String {
    format!("{}_as_of", name)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    #[default]
    Number,
    /// Coded 0/1, entered as true/false
    Boolean,
}

/// Field schema as published with the manual-inputs feed
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FieldMetadata {
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub min: Option<f64>,
    #[serde(default)]
    pub max: Option<f64>,
    #[serde(default)]
    pub step: Option<f64>,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default, rename = "type")]
    pub value_type: Option<String>,
    #[serde(default)]
    pub data_source: Option<String>,
    #[serde(default)]
    pub frequency: Option<String>,
    #[serde(default)]
    pub instructions: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
}

impl FieldMetadata {
    pub fn kind(&self) -> FieldKind {
        match self.value_type.as_deref().map(str::to_ascii_lowercase).as_deref() {
            Some("boolean") | Some("bool") => FieldKind::Boolean,
            _ => FieldKind::Number,
        }
    }
}

/// One editable field: current value with provenance plus its constraints
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ManualInputField {
    pub name: String,
    pub label: String,
    pub value: f64,
    pub as_of: Option<NaiveDate>,
    pub min: f64,
    pub max: f64,
    pub step: Option<f64>,
    pub kind: FieldKind,
    pub category: String,
    pub metadata: FieldMetadata,
}

impl ManualInputField {
    /// Build a field from its schema. Boolean fields are always `[0, 1]` with
    /// step 1; numeric fields without published bounds are unbounded.
    pub fn from_metadata(name: &str, metadata: &FieldMetadata, category: &str) -> Self {
        let kind = metadata.kind();
        let (min, max, step) = match kind {
            FieldKind::Boolean => (0.0, 1.0, Some(1.0)),
            FieldKind::Number => (
                metadata.min.unwrap_or(f64::NEG_INFINITY),
                metadata.max.unwrap_or(f64::INFINITY),
                metadata.step,
            ),
        };
        let label = if metadata.label.is_empty() {
            name.to_string()
        } else {
            metadata.label.clone()
        };

        Self {
            name: name.to_string(),
            label,
            value: min.max(0.0).min(max),
            as_of: None,
            min,
            max,
            step,
            kind,
            category: category.to_string(),
            metadata: metadata.clone(),
        }
    }

    pub fn with_value(mut self, value: f64, as_of: Option<NaiveDate>) -> Self {
        self.value = value;
        self.as_of = as_of;
        self
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }

    /// Value as sent on the wire: booleans as JSON booleans
    pub fn wire_value(&self, value: f64) -> Value {
        match self.kind {
            FieldKind::Boolean => Value::Bool(value != 0.0),
            FieldKind::Number => serde_json::json!(value),
        }
    }
}

/// `GET manual-inputs` / `PATCH manual-inputs` response
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ManualInputsResponse {
    #[serde(default)]
    pub values: BTreeMap<String, Value>,
    #[serde(default)]
    pub metadata: BTreeMap<String, FieldMetadata>,
    #[serde(default)]
    pub categories: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub last_updated: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
}

/// Read-through copy of the backend's manual inputs
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct ManualInputsState {
    pub values: BTreeMap<String, f64>,
    /// As-of dates keyed by `<name>_as_of`
    pub dates: BTreeMap<String, NaiveDate>,
    pub metadata: BTreeMap<String, FieldMetadata>,
    pub categories: BTreeMap<String, Vec<String>>,
    pub version: String,
    pub last_updated: Option<String>,
}

impl ManualInputsState {
    /// Normalize a feed response. Server metadata wins; the catalog fills
    /// fields the server did not describe.
    pub fn from_response(response: ManualInputsResponse, catalog: &FieldCatalog) -> Self {
        let mut values = BTreeMap::new();
        let mut dates = BTreeMap::new();

        for (key, raw) in response.values {
            if key.ends_with("_as_of") {
                match raw.as_str().and_then(parse_timestamp) {
                    Some(ts) => {
                        dates.insert(key, ts.date_naive());
                    }
                    None => debug!("Ignoring unparseable {} = {}", key, raw),
                }
                continue;
            }
            let value = match raw {
                Value::Number(n) => n.as_f64(),
                Value::Bool(b) => Some(if b { 1.0 } else { 0.0 }),
                _ => None,
            };
            if let Some(v) = value {
                values.insert(key, v);
            }
        }

        let mut metadata = catalog.metadata().clone();
        metadata.extend(response.metadata);

        let categories = if response.categories.is_empty() {
            catalog.groups().iter().cloned().collect()
        } else {
            response.categories
        };

        let state = Self {
            values,
            dates,
            metadata,
            categories,
            version: response.version.unwrap_or_else(|| "unknown".to_string()),
            last_updated: response.last_updated,
        };

        for field in state.fields() {
            if !field.contains(field.value) {
                warn!(
                    "Persisted {} = {} is outside [{}, {}]",
                    field.name, field.value, field.min, field.max
                );
            }
        }
        state
    }

    pub fn value(&self, name: &str) -> Option<f64> {
        self.values.get(name).copied()
    }

    pub fn as_of(&self, name: &str) -> Option<NaiveDate> {
        self.dates.get(&as_of_key(name)).copied()
    }

    fn category_of(&self, name: &str) -> Option<&str> {
        self.categories
            .iter()
            .find(|(_, names)| names.iter().any(|n| n == name))
            .map(|(category, _)| category.as_str())
    }

    /// A field with its current value, if the field is described or has a value
    pub fn field(&self, name: &str) -> Option<ManualInputField> {
        let metadata = self.metadata.get(name);
        if metadata.is_none() && !self.values.contains_key(name) {
            return None;
        }
        let metadata = metadata.cloned().unwrap_or_default();
        let category = self
            .category_of(name)
            .or(metadata.category.as_deref())
            .unwrap_or("Uncategorized")
            .to_string();

        let field = ManualInputField::from_metadata(name, &metadata, &category);
        let value = self.value(name).unwrap_or(field.value);
        Some(field.with_value(value, self.as_of(name)))
    }

    /// Every field, grouped fields first in group order
    pub fn fields(&self) -> Vec<ManualInputField> {
        let mut seen = std::collections::BTreeSet::new();
        let mut fields = Vec::new();
        for names in self.categories.values() {
            for name in names {
                if seen.insert(name.clone()) {
                    fields.extend(self.field(name));
                }
            }
        }
        for name in self.metadata.keys() {
            if seen.insert(name.clone()) {
                fields.extend(self.field(name));
            }
        }
        fields
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn response() -> ManualInputsResponse {
        serde_json::from_value(json!({
            "values": {
                "cre_delinquency_rate": 5.0,
                "cre_delinquency_rate_as_of": "2025-11-15",
                "hedge_fund_basis_trade_concern": true,
                "hedge_fund_leverage_percentile_as_of": "2025-11-01T08:15:00.123456",
                "last_full_update": "2025-11-20T10:00:00"
            },
            "metadata": {
                "cre_delinquency_rate": {"label": "CRE Delinquency Rate", "category": "CRE Stress", "min": 0, "max": 20}
            },
            "categories": {"CRE Delinquency": ["cre_delinquency_rate"]},
            "version": "2.0"
        }))
        .unwrap()
    }

    #[test]
    fn test_state_from_response() {
        let state = ManualInputsState::from_response(response(), &FieldCatalog::standard());
        assert_eq!(state.value("cre_delinquency_rate"), Some(5.0));
        assert_eq!(state.value("hedge_fund_basis_trade_concern"), Some(1.0));
        assert_eq!(state.as_of("cre_delinquency_rate"), NaiveDate::from_ymd_opt(2025, 11, 15));
        assert_eq!(
            state.as_of("hedge_fund_leverage_percentile"),
            NaiveDate::from_ymd_opt(2025, 11, 1)
        );
        assert!(state.value("last_full_update").is_none());
        assert_eq!(state.version, "2.0");
    }

    #[test]
    fn test_group_category_wins() {
        let state = ManualInputsState::from_response(response(), &FieldCatalog::standard());
        let field = state.field("cre_delinquency_rate").unwrap();
        assert_eq!(field.category, "CRE Delinquency");
        assert_eq!((field.min, field.max), (0.0, 20.0));
    }

    #[test]
    fn test_catalog_fills_metadata_gaps() {
        let state = ManualInputsState::from_response(response(), &FieldCatalog::standard());
        let vacancy = state.field("cre_office_vacancy").unwrap();
        assert_eq!((vacancy.min, vacancy.max), (5.0, 30.0));
        assert!(state.field("no_such_field").is_none());
    }

    #[test]
    fn test_boolean_field_shape() {
        let state = ManualInputsState::from_response(response(), &FieldCatalog::standard());
        let flag = state.field("hedge_fund_basis_trade_concern").unwrap();
        assert_eq!(flag.kind, FieldKind::Boolean);
        assert_eq!((flag.min, flag.max, flag.step), (0.0, 1.0, Some(1.0)));
        assert_eq!(flag.wire_value(1.0), Value::Bool(true));
    }

    #[test]
    fn test_as_of_key() {
        assert_eq!(as_of_key("cre_delinquency_rate"), "cre_delinquency_rate_as_of");
    }
}
