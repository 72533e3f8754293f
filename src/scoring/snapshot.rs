//! Score feed snapshots
//!
//! Wire shapes of the CMDS, FRS and VP feeds, plus the data contract checks
//! each snapshot must pass before it is shown.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use thiserror::Error;

use super::allocation::Allocation;
use super::max_points::{MaxPointsTable, PointsAllocation, SchemeVersion};

/// The three upstream indicators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Indicator {
    Cmds,
    Frs,
    Vp,
}

impl Indicator {
    /// Declared score bounds, inclusive
    pub fn bounds(&self) -> (f64, f64) {
        match self {
            Indicator::Cmds => (0.0, 100.0),
            Indicator::Frs => (0.0, 90.0),
            Indicator::Vp => (0.0, 100.0),
        }
    }

    fn check(&self, score: f64) -> Result<(), ContractViolation> {
        let (min, max) = self.bounds();
        if score.is_finite() && score >= min && score <= max {
            Ok(())
        } else {
            Err(ContractViolation::ScoreOutOfBounds {
                indicator: *self,
                score,
                min,
                max,
            })
        }
    }
}

impl fmt::Display for Indicator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Indicator::Cmds => write!(f, "CMDS"),
            Indicator::Frs => write!(f, "FRS"),
            Indicator::Vp => write!(f, "VP"),
        }
    }
}

/// Upstream data that breaks the feed contract. Not user-correctable.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ContractViolation {
    #[error("{indicator} score {score} outside [{min}, {max}]")]
    ScoreOutOfBounds {
        indicator: Indicator,
        score: f64,
        min: f64,
        max: f64,
    },

    #[error("{indicator} snapshot has no score: {reason}")]
    MissingScore { indicator: Indicator, reason: String },

    #[error("{field} = {value} outside [{min}, {max}]")]
    FieldOutOfRange {
        field: String,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("component '{component}' score {score} outside [{min}, {max}]")]
    ComponentOutOfRange {
        component: String,
        score: f64,
        min: f64,
        max: f64,
    },
}

fn check_range(field: &str, value: f64, min: f64, max: f64) -> Result<(), ContractViolation> {
    if value.is_finite() && value >= min && value <= max {
        Ok(())
    } else {
        Err(ContractViolation::FieldOutOfRange {
            field: field.to_string(),
            value,
            min,
            max,
        })
    }
}

/// Raw reading behind a component: one number or a few named sub-readings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ComponentValue {
    Scalar(f64),
    Composite(BTreeMap<String, f64>),
}

impl ComponentValue {
    /// Lenient conversion; shapes that are neither a number nor an object of
    /// numbers carry no displayable reading and become `None`.
    pub fn from_json(raw: Value) -> Option<Self> {
        match raw {
            Value::Number(n) => n.as_f64().map(ComponentValue::Scalar),
            Value::Object(map) => {
                let readings: BTreeMap<String, f64> = map
                    .into_iter()
                    .filter_map(|(k, v)| v.as_f64().map(|f| (k, f)))
                    .collect();
                if readings.is_empty() {
                    None
                } else {
                    Some(ComponentValue::Composite(readings))
                }
            }
            _ => None,
        }
    }
}

fn lenient_value<'de, D>(deserializer: D) -> Result<Option<ComponentValue>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<Value>::deserialize(deserializer)?;
    Ok(raw.and_then(ComponentValue::from_json))
}

/// One scored component. Sub-components arrive nested under `components`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ComponentScore {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub score: Option<f64>,
    #[serde(default, deserialize_with = "lenient_value")]
    pub value: Option<ComponentValue>,
    #[serde(default)]
    pub is_manual: bool,
    #[serde(default)]
    pub next_update: Option<String>,
    #[serde(default)]
    pub last_updated: Option<String>,
    #[serde(default)]
    pub interpretation: Option<String>,
    #[serde(default)]
    pub data_source: Option<String>,
    #[serde(default, rename = "components")]
    pub sub_components: BTreeMap<String, ComponentScore>,
}

impl ComponentScore {
    /// Points the weighted sub-components add up to, per the versioned table.
    /// `None` when there are no sub-components or any of them is unknown.
    pub fn weighted_sub_total(&self, table: &MaxPointsTable, version: SchemeVersion) -> Option<f64> {
        if self.sub_components.is_empty() {
            return None;
        }
        self.sub_components.iter().try_fold(0.0, |acc, (key, sub)| {
            let alloc = table.lookup(version, key)?;
            Some(acc + alloc.contribution(sub.score.unwrap_or(0.0)))
        })
    }

    fn check(&self, key: &str, alloc: Option<PointsAllocation>) -> Result<(), ContractViolation> {
        let (Some(score), Some(alloc)) = (self.score, alloc) else {
            return Ok(());
        };
        if alloc.contains(score) {
            Ok(())
        } else {
            Err(ContractViolation::ComponentOutOfRange {
                component: key.to_string(),
                score,
                min: alloc.min,
                max: alloc.max,
            })
        }
    }

    fn validate(&self, key: &str, table: &MaxPointsTable, version: SchemeVersion) -> Result<(), ContractViolation> {
        self.check(key, table.lookup(version, key))?;
        for (sub_key, sub) in &self.sub_components {
            sub.validate(sub_key, table, version)?;
        }
        Ok(())
    }

    fn fill_names(&mut self, key: &str) {
        if self.name.is_empty() {
            self.name = key.to_string();
        }
        for (sub_key, sub) in self.sub_components.iter_mut() {
            sub.fill_names(sub_key);
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CategoryMetadata {
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub update_frequency: String,
    #[serde(default)]
    pub data_sources: BTreeSet<String>,
    #[serde(default)]
    pub next_update: Option<String>,
}

/// One FRS category with its component breakdown
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryDetail {
    pub score: f64,
    #[serde(alias = "max_points")]
    pub max: f64,
    #[serde(default)]
    pub components: BTreeMap<String, ComponentScore>,
    #[serde(default, alias = "systemic_risk_level")]
    pub risk_level: Option<String>,
    #[serde(default)]
    pub risk_narrative: Option<String>,
    #[serde(default)]
    pub contagion_multiplier: Option<f64>,
    #[serde(default)]
    pub metadata: CategoryMetadata,
}

impl CategoryDetail {
    pub fn component_sum(&self) -> f64 {
        self.components.values().filter_map(|c| c.score).sum()
    }

    /// Whether every component reported a score
    pub fn is_complete(&self) -> bool {
        self.components.values().all(|c| c.score.is_some())
    }

    /// Score implied by the components: the sum, scaled by the contagion
    /// multiplier when one is reported, capped at the category maximum.
    pub fn expected_score(&self) -> f64 {
        let sum = self.component_sum();
        match self.contagion_multiplier {
            Some(mult) => (sum * mult).min(self.max),
            None => sum,
        }
    }

    /// Sum check; only meaningful when all components are present.
    pub fn is_consistent(&self, tolerance: f64) -> bool {
        !self.is_complete() || (self.expected_score() - self.score).abs() <= tolerance
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct CmdsComponents {
    pub frs: f64,
    pub vp: f64,
    #[serde(default)]
    pub frs_contribution: f64,
    #[serde(default)]
    pub vp_contribution: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CmdsWeights {
    pub frs_weight: f64,
    pub vp_weight: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CmdsSnapshot {
    pub cmds: f64,
    #[serde(default)]
    pub zone: Option<String>,
    #[serde(default)]
    pub components: CmdsComponents,
    #[serde(default)]
    pub allocation: Option<Allocation>,
    #[serde(default)]
    pub interpretation: Option<String>,
    #[serde(default)]
    pub divergence: Option<f64>,
    #[serde(default)]
    pub weights: Option<CmdsWeights>,
    #[serde(default)]
    pub last_updated: Option<String>,
}

impl CmdsSnapshot {
    /// Only the composite score gates the section. The engine clamps its
    /// inputs on its own scale, so component readings are reported through
    /// [`CmdsSnapshot::component_breaches`] instead.
    pub fn validate(&self) -> Result<(), ContractViolation> {
        Indicator::Cmds.check(self.cmds)
    }

    pub fn component_breaches(&self) -> Vec<ContractViolation> {
        [(Indicator::Frs, self.components.frs), (Indicator::Vp, self.components.vp)]
            .into_iter()
            .filter_map(|(indicator, score)| indicator.check(score).err())
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct FrsBreakdown {
    #[serde(rename = "macro")]
    pub macro_cycle: f64,
    pub valuation: f64,
    pub leverage: f64,
    pub earnings: f64,
    pub sentiment: f64,
}

impl FrsBreakdown {
    pub fn entries(&self) -> [(&'static str, f64); 5] {
        [
            ("macro", self.macro_cycle),
            ("valuation", self.valuation),
            ("leverage", self.leverage),
            ("earnings", self.earnings),
            ("sentiment", self.sentiment),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrsSnapshot {
    #[serde(default)]
    pub frs_score: Option<f64>,
    #[serde(default)]
    pub zone: Option<String>,
    #[serde(default)]
    pub correction_probability: Option<f64>,
    #[serde(default)]
    pub breakdown: FrsBreakdown,
    #[serde(default)]
    pub categories: Option<BTreeMap<String, CategoryDetail>>,
    /// Flat component scores, reported alongside or instead of `categories`
    #[serde(default)]
    pub component_details: Option<BTreeMap<String, f64>>,
    #[serde(default)]
    pub data_sources: Vec<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub last_updated: Option<String>,
}

impl FrsSnapshot {
    /// Give every component its map key as name when the feed left it out.
    pub fn normalize(&mut self) {
        for category in self.categories.iter_mut().flat_map(|c| c.values_mut()) {
            for (key, component) in category.components.iter_mut() {
                component.fill_names(key);
            }
        }
    }

    pub fn validate(&self) -> Result<(), ContractViolation> {
        self.validate_with(&MaxPointsTable::standard(), SchemeVersion::default())
    }

    pub fn validate_with(&self, table: &MaxPointsTable, version: SchemeVersion) -> Result<(), ContractViolation> {
        let score = self.frs_score.ok_or_else(|| ContractViolation::MissingScore {
            indicator: Indicator::Frs,
            reason: self.error.clone().unwrap_or_else(|| "frs_score is null".to_string()),
        })?;
        Indicator::Frs.check(score)?;

        if let Some(p) = self.correction_probability {
            check_range("correction_probability", p, 0.0, 1.0)?;
        }

        for (name, points) in self.breakdown.entries() {
            if let Some(alloc) = table.lookup(version, name) {
                check_range(&format!("breakdown.{}", name), points, alloc.min, alloc.max)?;
            }
        }

        for (name, category) in self.categories.iter().flat_map(|c| c.iter()) {
            let (min, max) = table
                .lookup(version, name)
                .map(|alloc| (alloc.min, alloc.max))
                .unwrap_or((f64::NEG_INFINITY, category.max));
            check_range(&format!("categories.{}.score", name), category.score, min, max)?;
            for (key, component) in &category.components {
                component.validate(key, table, version)?;
            }
        }

        for (key, score) in self.component_details.iter().flat_map(|d| d.iter()) {
            if let Some(alloc) = table.lookup(version, key) {
                if !alloc.contains(*score) {
                    return Err(ContractViolation::ComponentOutOfRange {
                        component: key.clone(),
                        score: *score,
                        min: alloc.min,
                        max: alloc.max,
                    });
                }
            }
        }
        Ok(())
    }
}

/// VP prediction horizon: a day count, or a range such as `"2-5"`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PredictionWindow {
    Days(u32),
    Range(String),
}

impl fmt::Display for PredictionWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PredictionWindow::Days(n) => write!(f, "{} days", n),
            PredictionWindow::Range(r) => write!(f, "{} days", r),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct VpComponents {
    #[serde(default)]
    pub fear_composite: Option<i64>,
    #[serde(default)]
    pub search_volatility: Option<i64>,
    #[serde(default)]
    pub cross_asset_stress: Option<i64>,
}

impl VpComponents {
    pub fn entries(&self) -> [(&'static str, Option<i64>); 3] {
        [
            ("fear_composite", self.fear_composite),
            ("search_volatility", self.search_volatility),
            ("cross_asset_stress", self.cross_asset_stress),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VpSnapshot {
    pub vp_score: f64,
    pub spike_probability: f64,
    pub signal_strength: i64,
    pub confidence: i64,
    #[serde(default)]
    pub components: VpComponents,
    #[serde(default)]
    pub prediction_window_days: Option<PredictionWindow>,
    #[serde(default)]
    pub last_updated: Option<String>,
}

impl VpSnapshot {
    pub fn validate(&self) -> Result<(), ContractViolation> {
        Indicator::Vp.check(self.vp_score)?;
        check_range("spike_probability", self.spike_probability, 0.0, 1.0)?;
        check_range("signal_strength", self.signal_strength as f64, 0.0, 100.0)?;
        check_range("confidence", self.confidence as f64, 0.0, 100.0)?;
        for (name, reading) in self.components.entries() {
            if let Some(v) = reading {
                check_range(&format!("components.{}", name), v as f64, 0.0, 100.0)?;
            }
        }
        Ok(())
    }
}
