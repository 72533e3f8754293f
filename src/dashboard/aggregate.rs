//! Snapshot Aggregation
//!
//! Composes the independent feed states into one view-ready value. Each
//! section carries its own pending/ready/failed state; one feed never
//! blocks another.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::warn;

use crate::feeds::{FeedError, FeedKey};
use crate::freshness::{evaluate, evaluate_raw, Freshness};
use crate::manual::{ManualInputField, ManualInputsState};
use crate::scoring::snapshot::{CmdsComponents, CmdsWeights, FrsBreakdown, VpComponents};
use crate::scoring::{
    allocation_for, interpret_divergence, reconcile, Allocation, CategoryDetail, CategoryMetadata, CmdsSnapshot,
    ComponentScore, ComponentValue, FrsSnapshot, MaxPointsTable, PredictionWindow, Scheme, SchemeVersion, VpSnapshot,
    ZoneCheck,
};

/// Upstream values are rounded to one decimal, so sums drift by that much.
const CATEGORY_SUM_TOLERANCE: f64 = 0.1;

const CATEGORY_ORDER: [&str; 5] = ["macro", "valuation", "leverage", "earnings", "sentiment"];

pub(crate) fn category_rank(name: &str) -> usize {
    CATEGORY_ORDER
        .iter()
        .position(|c| *c == name)
        .unwrap_or(CATEGORY_ORDER.len())
}

/// State of one feed as seen by the view
#[derive(Debug, Clone, PartialEq)]
pub enum FeedState<T> {
    Pending,
    Ready(T),
    Failed(FeedError),
}

impl<T> Default for FeedState<T> {
    fn default() -> Self {
        FeedState::Pending
    }
}

impl<T> From<Result<T, FeedError>> for FeedState<T> {
    fn from(result: Result<T, FeedError>) -> Self {
        match result {
            Ok(value) => FeedState::Ready(value),
            Err(err) => FeedState::Failed(err),
        }
    }
}

impl<T> FeedState<T> {
    pub fn is_pending(&self) -> bool {
        matches!(self, FeedState::Pending)
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, FeedState::Ready(_))
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, FeedState::Failed(_))
    }

    pub fn ready(&self) -> Option<&T> {
        match self {
            FeedState::Ready(value) => Some(value),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&FeedError> {
        match self {
            FeedState::Failed(err) => Some(err),
            _ => None,
        }
    }

    /// Derive a view; a derivation error turns the section into `Failed`.
    fn derive<U>(&self, f: impl FnOnce(&T) -> Result<U, FeedError>) -> FeedState<U> {
        match self {
            FeedState::Pending => FeedState::Pending,
            FeedState::Failed(err) => FeedState::Failed(err.clone()),
            FeedState::Ready(value) => match f(value) {
                Ok(view) => FeedState::Ready(view),
                Err(err) => {
                    warn!("{}", err);
                    FeedState::Failed(err)
                }
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComponentView {
    pub name: String,
    pub score: Option<f64>,
    /// From the versioned points table; `None` for components it does not know
    pub max: Option<f64>,
    pub ratio: Option<f64>,
    pub weight: Option<f64>,
    pub value: Option<ComponentValue>,
    pub is_manual: bool,
    pub next_update: Option<String>,
    pub interpretation: Option<String>,
    pub data_source: Option<String>,
    pub last_updated: Option<String>,
    pub sub_components: Vec<ComponentView>,
}

impl ComponentView {
    pub fn freshness(&self, now: DateTime<Utc>) -> Freshness {
        evaluate_raw(self.last_updated.as_deref(), now)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryView {
    pub name: String,
    pub score: f64,
    pub max: f64,
    pub ratio: f64,
    pub risk_level: Option<ZoneCheck>,
    pub narrative: Option<String>,
    /// Component scores add up to the category score
    pub consistent: bool,
    pub components: Vec<ComponentView>,
    pub metadata: CategoryMetadata,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CmdsView {
    pub score: f64,
    pub zone: ZoneCheck,
    pub allocation: Option<Allocation>,
    pub interpretation: String,
    pub divergence: f64,
    pub components: CmdsComponents,
    pub weights: Option<CmdsWeights>,
    pub freshness: Freshness,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FrsView {
    pub score: f64,
    pub zone: ZoneCheck,
    pub correction_probability: Option<f64>,
    pub breakdown: FrsBreakdown,
    pub categories: Vec<CategoryView>,
    pub freshness: Freshness,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VpView {
    pub score: f64,
    pub spike_probability: f64,
    pub signal_strength: i64,
    pub confidence: i64,
    pub components: VpComponents,
    pub window: Option<PredictionWindow>,
    pub freshness: Freshness,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ManualFieldView {
    pub field: ManualInputField,
    pub freshness: Freshness,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ManualGroupView {
    pub category: String,
    pub fields: Vec<ManualFieldView>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ManualView {
    pub version: String,
    pub freshness: Freshness,
    pub groups: Vec<ManualGroupView>,
}

/// Everything the presentation layer needs, one state per section
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateView {
    pub cmds: FeedState<CmdsView>,
    pub frs: FeedState<FrsView>,
    pub vp: FeedState<VpView>,
    pub manual: FeedState<ManualView>,
    /// First load: every feed still absent and none errored
    pub is_loading: bool,
    pub composed_at: DateTime<Utc>,
}

/// Builds views against a versioned points table
#[derive(Debug, Clone)]
pub struct Composer {
    table: MaxPointsTable,
    version: SchemeVersion,
}

impl Composer {
    pub fn new(table: MaxPointsTable, version: SchemeVersion) -> Self {
        Self { table, version }
    }

    pub fn version(&self) -> SchemeVersion {
        self.version
    }

    pub fn compose(
        &self,
        cmds: &FeedState<CmdsSnapshot>,
        frs: &FeedState<FrsSnapshot>,
        vp: &FeedState<VpSnapshot>,
        manual: &FeedState<ManualInputsState>,
        now: DateTime<Utc>,
    ) -> AggregateView {
        self.compose_with(cmds, frs, vp, manual, None, now)
    }

    /// Compose reusing already derived category views for the FRS section.
    pub fn compose_with(
        &self,
        cmds: &FeedState<CmdsSnapshot>,
        frs: &FeedState<FrsSnapshot>,
        vp: &FeedState<VpSnapshot>,
        manual: &FeedState<ManualInputsState>,
        categories: Option<Vec<CategoryView>>,
        now: DateTime<Utc>,
    ) -> AggregateView {
        let is_loading = cmds.is_pending() && frs.is_pending() && vp.is_pending() && manual.is_pending();

        AggregateView {
            cmds: cmds.derive(|snap| self.cmds_view(snap, now)),
            frs: frs.derive(|snap| self.frs_view(snap, categories, now)),
            vp: vp.derive(|snap| self.vp_view(snap, now)),
            manual: manual.derive(|state| Ok(manual_view(state, now))),
            is_loading,
            composed_at: now,
        }
    }

    fn cmds_view(&self, snap: &CmdsSnapshot, now: DateTime<Utc>) -> Result<CmdsView, FeedError> {
        snap.validate().map_err(|violation| FeedError::ContractViolation {
            feed: FeedKey::Cmds,
            violation,
        })?;
        for breach in snap.component_breaches() {
            warn!("CMDS input out of contract: {}", breach);
        }

        let zone = reconcile(Scheme::Cmds, snap.cmds, snap.zone.as_deref());
        let (frs, vp) = (snap.components.frs, snap.components.vp);

        Ok(CmdsView {
            score: snap.cmds,
            allocation: snap.allocation.or_else(|| allocation_for(&zone.display())),
            zone,
            interpretation: snap
                .interpretation
                .clone()
                .unwrap_or_else(|| interpret_divergence(frs, vp).describe().to_string()),
            divergence: snap.divergence.unwrap_or((frs - vp).abs()),
            components: snap.components,
            weights: snap.weights,
            freshness: evaluate_raw(snap.last_updated.as_deref(), now),
        })
    }

    fn frs_view(
        &self,
        snap: &FrsSnapshot,
        categories: Option<Vec<CategoryView>>,
        now: DateTime<Utc>,
    ) -> Result<FrsView, FeedError> {
        snap.validate_with(&self.table, self.version)
            .map_err(|violation| FeedError::ContractViolation {
                feed: FeedKey::Frs,
                violation,
            })?;
        let score = snap.frs_score.ok_or_else(|| FeedError::Malformed {
            feed: FeedKey::Frs,
            reason: "frs_score missing".to_string(),
        })?;

        Ok(FrsView {
            score,
            zone: reconcile(Scheme::Frs, score, snap.zone.as_deref()),
            correction_probability: snap.correction_probability,
            breakdown: snap.breakdown,
            categories: categories.unwrap_or_else(|| self.category_views(snap)),
            freshness: evaluate_raw(snap.last_updated.as_deref(), now),
        })
    }

    fn vp_view(&self, snap: &VpSnapshot, now: DateTime<Utc>) -> Result<VpView, FeedError> {
        snap.validate().map_err(|violation| FeedError::ContractViolation {
            feed: FeedKey::Vp,
            violation,
        })?;

        Ok(VpView {
            score: snap.vp_score,
            spike_probability: snap.spike_probability,
            signal_strength: snap.signal_strength,
            confidence: snap.confidence,
            components: snap.components,
            window: snap.prediction_window_days.clone(),
            freshness: evaluate_raw(snap.last_updated.as_deref(), now),
        })
    }

    /// Category views in canonical order (macro, valuation, leverage,
    /// earnings, sentiment, then anything else by name).
    pub fn category_views(&self, snap: &FrsSnapshot) -> Vec<CategoryView> {
        let mut views: Vec<CategoryView> = snap
            .categories
            .iter()
            .flat_map(|c| c.iter())
            .map(|(name, detail)| self.category_view(name, detail))
            .collect();
        views.sort_by_key(|v| category_rank(&v.name));
        views
    }

    fn category_view(&self, name: &str, detail: &CategoryDetail) -> CategoryView {
        let alloc = self.table.lookup(self.version, name);
        let max = alloc.map(|a| a.max).unwrap_or(detail.max);
        let ratio = match alloc {
            Some(a) => a.ratio(detail.score),
            None if max > 0.0 => (detail.score / max).clamp(0.0, 1.0),
            None => 0.0,
        };

        let consistent = detail.is_consistent(CATEGORY_SUM_TOLERANCE);
        if !consistent {
            warn!(
                "Category {} score {} does not match its components ({:.2})",
                name,
                detail.score,
                detail.expected_score()
            );
        }

        CategoryView {
            name: name.to_string(),
            score: detail.score,
            max,
            ratio,
            risk_level: detail
                .risk_level
                .as_deref()
                .map(|raw| reconcile(Scheme::CategoryRisk, detail.score, Some(raw))),
            narrative: detail.risk_narrative.clone(),
            consistent,
            components: detail
                .components
                .iter()
                .map(|(key, component)| self.component_view(key, component))
                .collect(),
            metadata: detail.metadata.clone(),
        }
    }

    fn component_view(&self, key: &str, component: &ComponentScore) -> ComponentView {
        let alloc = self.table.lookup(self.version, key);
        let name = if component.name.is_empty() {
            key.to_string()
        } else {
            component.name.clone()
        };

        ComponentView {
            name,
            score: component.score,
            max: alloc.map(|a| a.max),
            ratio: component.score.zip(alloc).map(|(score, a)| a.ratio(score)),
            weight: alloc.map(|a| a.weight),
            value: component.value.clone(),
            is_manual: component.is_manual,
            next_update: component.next_update.clone(),
            interpretation: component.interpretation.clone(),
            data_source: component.data_source.clone(),
            last_updated: component.last_updated.clone(),
            sub_components: component
                .sub_components
                .iter()
                .map(|(k, sub)| self.component_view(k, sub))
                .collect(),
        }
    }
}

impl Default for Composer {
    fn default() -> Self {
        Self::new(MaxPointsTable::standard(), SchemeVersion::default())
    }
}

fn manual_view(state: &ManualInputsState, now: DateTime<Utc>) -> ManualView {
    let mut groups: Vec<ManualGroupView> = Vec::new();
    for field in state.fields() {
        let as_of = field.as_of.and_then(|d| d.and_hms_opt(0, 0, 0)).map(|n| n.and_utc());
        let view = ManualFieldView {
            freshness: evaluate(as_of, now),
            field,
        };
        match groups.iter_mut().find(|g| g.category == view.field.category) {
            Some(group) => group.fields.push(view),
            None => groups.push(ManualGroupView {
                category: view.field.category.clone(),
                fields: vec![view],
            }),
        }
    }

    ManualView {
        version: state.version.clone(),
        freshness: evaluate_raw(state.last_updated.as_deref(), now),
        groups,
    }
}

/// Compose with the standard points table and the default scheme version.
pub fn compose(
    cmds: &FeedState<CmdsSnapshot>,
    frs: &FeedState<FrsSnapshot>,
    vp: &FeedState<VpSnapshot>,
    manual: &FeedState<ManualInputsState>,
    now: DateTime<Utc>,
) -> AggregateView {
    Composer::default().compose(cmds, frs, vp, manual, now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::freshness::Staleness;
    use chrono::TimeZone;
    use serde_json::json;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 15, 12, 0, 0).unwrap()
    }

    fn cmds() -> CmdsSnapshot {
        serde_json::from_value(json!({
            "cmds": 48.3,
            "zone": "ELEVATED",
            "components": {"frs": 46.4, "vp": 52.0, "frs_contribution": 30.2, "vp_contribution": 18.2},
            "last_updated": "2025-06-15T08:00:00"
        }))
        .unwrap()
    }

    fn unavailable(feed: FeedKey) -> FeedError {
        FeedError::Unavailable {
            feed,
            reason: "connection refused".into(),
        }
    }

    #[test]
    fn test_first_load_is_loading() {
        let view = compose(
            &FeedState::Pending,
            &FeedState::Pending,
            &FeedState::Pending,
            &FeedState::Pending,
            now(),
        );
        assert!(view.is_loading);
    }

    #[test]
    fn test_error_ends_first_load() {
        let view = compose(
            &FeedState::Pending,
            &FeedState::Failed(unavailable(FeedKey::Frs)),
            &FeedState::Pending,
            &FeedState::Pending,
            now(),
        );
        assert!(!view.is_loading);
        assert!(view.frs.is_failed());
    }

    #[test]
    fn test_partial_availability() {
        let view = compose(
            &FeedState::Ready(cmds()),
            &FeedState::Failed(unavailable(FeedKey::Frs)),
            &FeedState::Pending,
            &FeedState::Pending,
            now(),
        );
        assert!(!view.is_loading);
        let cmds = view.cmds.ready().unwrap();
        assert_eq!(cmds.zone.display().label, "ELEVATED");
        assert!(view.frs.error().is_some());
        assert!(view.vp.is_pending());
    }

    #[test]
    fn test_cmds_fallbacks() {
        let view = compose(
            &FeedState::Ready(cmds()),
            &FeedState::Pending,
            &FeedState::Pending,
            &FeedState::Pending,
            now(),
        );
        let cmds = view.cmds.ready().unwrap();
        assert_eq!(cmds.allocation.unwrap().equity_pct, [50.0, 70.0]);
        assert!(cmds.interpretation.starts_with("MIXED"));
        assert!((cmds.divergence - 5.6).abs() < 1e-9);
        assert_eq!(cmds.freshness.staleness, Staleness::Fresh);
    }

    #[test]
    fn test_contract_violation_fails_only_that_section() {
        let mut bad = cmds();
        bad.cmds = 140.0;
        let view = compose(
            &FeedState::Ready(bad),
            &FeedState::Pending,
            &FeedState::Pending,
            &FeedState::Pending,
            now(),
        );
        assert!(matches!(
            view.cmds.error(),
            Some(FeedError::ContractViolation { feed: FeedKey::Cmds, .. })
        ));
    }

    #[test]
    fn test_cmds_component_breach_keeps_section() {
        let mut snap = cmds();
        snap.components.frs = 95.0;
        snap.weights = Some(CmdsWeights {
            frs_weight: 0.65,
            vp_weight: 0.35,
        });
        let view = compose(
            &FeedState::Ready(snap),
            &FeedState::Pending,
            &FeedState::Pending,
            &FeedState::Pending,
            now(),
        );
        let cmds = view.cmds.ready().unwrap();
        assert_eq!(cmds.components.frs, 95.0);
        assert_eq!(cmds.weights.map(|w| w.frs_weight), Some(0.65));
    }

    #[test]
    fn test_unrecognized_frs_zone() {
        let frs: FrsSnapshot = serde_json::from_value(json!({"frs_score": 12.0, "zone": "PURPLE"})).unwrap();
        let view = compose(
            &FeedState::Pending,
            &FeedState::Ready(frs),
            &FeedState::Pending,
            &FeedState::Pending,
            now(),
        );
        let zone = view.frs.ready().unwrap().zone.display();
        assert_eq!(zone.label, "ORANGE");
    }

    #[test]
    fn test_component_max_from_table() {
        let frs: FrsSnapshot = serde_json::from_value(json!({
            "frs_score": 14.2,
            "categories": {
                "leverage": {
                    "score": 9.2, "max_points": 25.0,
                    "systemic_risk_level": "MODERATE - Some stress",
                    "components": {
                        "corporate_credit": {"score": 4.2, "components": {"hy_spreads": {"score": 5.0}}},
                        "cre_stress": {"score": 5.0, "last_updated": "2025-05-30"},
                        "experimental": {"score": 0.0}
                    }
                }
            }
        }))
        .unwrap();

        let enhanced = Composer::default().category_views(&frs);
        let leverage = &enhanced[0];
        assert_eq!(leverage.risk_level.as_ref().unwrap().display().label, "MODERATE");
        let credit = leverage.components.iter().find(|c| c.name == "corporate_credit").unwrap();
        assert_eq!(credit.max, Some(10.0));
        assert_eq!(credit.sub_components[0].weight, Some(0.5));
        let experimental = leverage.components.iter().find(|c| c.name == "experimental").unwrap();
        assert_eq!(experimental.max, None);
        let cre = leverage.components.iter().find(|c| c.name == "cre_stress").unwrap();
        assert_eq!(cre.freshness(now()).staleness, Staleness::Stale);

        let legacy = Composer::new(MaxPointsTable::standard(), SchemeVersion::Legacy).category_views(&frs);
        assert_eq!(legacy[0].components[0].sub_components[0].max, None);
    }

    #[test]
    fn test_manual_view_groups() {
        let state = crate::manual::FieldCatalog::standard().default_state();
        let view = compose(
            &FeedState::Pending,
            &FeedState::Pending,
            &FeedState::Pending,
            &FeedState::Ready(state),
            now(),
        );
        let manual = view.manual.ready().unwrap();
        assert_eq!(manual.groups.len(), 5);
        assert_eq!(manual.groups[0].fields[0].freshness.staleness, Staleness::Unknown);
    }
}
