//! Zone Classification
//!
//! Maps a continuous score onto a scheme's ordered severity vocabulary.
//! CMDS and FRS boundary values belong to the lower zone (inclusive upper
//! bounds); category risk levels use exclusive upper bounds, as the scoring
//! engine assigns them.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use tracing::warn;

/// A named scoring scheme with its own threshold table and vocabulary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scheme {
    /// Combined Market Danger Score, 0-100
    Cmds,
    /// Fundamental Risk Score, thresholds from the scoring engine
    Frs,
    /// Systemic risk level of the leverage/stability category (points out of 25)
    CategoryRisk,
}

const CMDS_LABELS: [&str; 5] = ["SAFE", "CAUTIOUS", "ELEVATED", "HIGH", "EXTREME"];
const CMDS_THRESHOLDS: [f64; 4] = [25.0, 45.0, 65.0, 80.0];

const FRS_LABELS: [&str; 5] = ["GREEN", "YELLOW", "ORANGE", "RED", "BLACK"];
const FRS_THRESHOLDS: [f64; 4] = [30.0, 50.0, 70.0, 85.0];

const CATEGORY_LABELS: [&str; 4] = ["LOW", "MODERATE", "ELEVATED", "SEVERE"];
const CATEGORY_THRESHOLDS: [f64; 3] = [5.0, 10.0, 15.0];

impl Scheme {
    /// Ordered vocabulary, least severe first
    pub fn labels(&self) -> &'static [&'static str] {
        match self {
            Scheme::Cmds => &CMDS_LABELS,
            Scheme::Frs => &FRS_LABELS,
            Scheme::CategoryRisk => &CATEGORY_LABELS,
        }
    }

    /// Upper bounds; one fewer than labels, the last label is open-ended
    fn thresholds(&self) -> &'static [f64] {
        match self {
            Scheme::Cmds => &CMDS_THRESHOLDS,
            Scheme::Frs => &FRS_THRESHOLDS,
            Scheme::CategoryRisk => &CATEGORY_THRESHOLDS,
        }
    }

    /// Whether a score equal to a threshold stays in the lower zone
    pub fn inclusive_bounds(&self) -> bool {
        !matches!(self, Scheme::CategoryRisk)
    }

    pub fn levels(&self) -> u8 {
        self.labels().len() as u8
    }

    /// Mid-severity zone used when an upstream label is not recognized.
    pub fn fallback(&self) -> ZoneClassification {
        self.zone_at(self.levels() / 2)
    }

    fn zone_at(&self, ordinal: u8) -> ZoneClassification {
        ZoneClassification {
            scheme: *self,
            ordinal,
            label: self.labels()[ordinal as usize],
        }
    }

    /// Parse a label received verbatim from upstream.
    ///
    /// Category risk levels arrive as prose ("ELEVATED - Multiple vulnerabilities");
    /// only the leading word is significant, and the engine's HIGH and CRITICAL
    /// levels both fold into SEVERE.
    pub fn parse_label(&self, raw: &str) -> Result<ZoneClassification, UnrecognizedZoneLabel> {
        let head = raw
            .trim()
            .split(|c: char| !c.is_ascii_alphabetic() && c != '_')
            .find(|part| !part.is_empty())
            .unwrap_or("")
            .to_ascii_uppercase();

        let head = if *self == Scheme::CategoryRisk && (head == "HIGH" || head == "CRITICAL") {
            "SEVERE".to_string()
        } else {
            head
        };

        self.labels()
            .iter()
            .position(|label| *label == head)
            .map(|idx| self.zone_at(idx as u8))
            .ok_or_else(|| UnrecognizedZoneLabel {
                scheme: *self,
                raw: raw.to_string(),
            })
    }

    /// Parse an upstream label, degrading to the mid-severity fallback.
    pub fn resolve_label(&self, raw: &str) -> ZoneClassification {
        self.parse_label(raw).unwrap_or_else(|err| {
            warn!("{}; falling back to {}", err, self.fallback().label);
            self.fallback()
        })
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scheme::Cmds => write!(f, "CMDS"),
            Scheme::Frs => write!(f, "FRS"),
            Scheme::CategoryRisk => write!(f, "category risk"),
        }
    }
}

/// A discrete severity zone.
///
/// `ordinal` drives severity comparisons and color-ramp selection; `label`
/// is the canonical display text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct ZoneClassification {
    pub scheme: Scheme,
    pub ordinal: u8,
    pub label: &'static str,
}

impl ZoneClassification {
    /// Position on the scheme's severity ramp, 0.0 (least) to 1.0 (most severe)
    pub fn ramp_position(&self) -> f64 {
        let top = self.scheme.levels().saturating_sub(1).max(1);
        f64::from(self.ordinal) / f64::from(top)
    }

    pub fn is_more_severe_than(&self, other: &ZoneClassification) -> bool {
        self.ordinal > other.ordinal
    }
}

impl fmt::Display for ZoneClassification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unrecognized {scheme} zone label '{raw}'")]
pub struct UnrecognizedZoneLabel {
    pub scheme: Scheme,
    pub raw: String,
}

/// Classify a score under a scheme.
///
/// A NaN score cannot be placed on the ramp and classifies as the scheme's
/// mid-severity fallback rather than as the safest zone.
pub fn classify(scheme: Scheme, score: f64) -> ZoneClassification {
    if score.is_nan() {
        return scheme.fallback();
    }
    let inclusive = scheme.inclusive_bounds();
    let ordinal = scheme
        .thresholds()
        .iter()
        .position(|upper| if inclusive { score <= *upper } else { score < *upper })
        .unwrap_or(scheme.thresholds().len());
    scheme.zone_at(ordinal as u8)
}

/// Classification of an absent score: `None` is a distinct state, never SAFE.
pub fn classify_opt(scheme: Scheme, score: Option<f64>) -> Option<ZoneClassification> {
    score.map(|s| classify(scheme, s))
}

/// Outcome of re-validating a server-provided zone against the local table
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ZoneCheck {
    /// Server label and local classification agree
    Agrees { zone: ZoneClassification },
    /// Server sent no label; the local classification is shown
    LocalOnly { zone: ZoneClassification },
    /// Both known but different; the server label is shown
    Mismatch {
        upstream: ZoneClassification,
        local: ZoneClassification,
    },
    /// Server label outside the vocabulary; the fallback is shown
    Unrecognized {
        raw: String,
        fallback: ZoneClassification,
        local: ZoneClassification,
    },
}

impl ZoneCheck {
    /// Zone to present
    pub fn display(&self) -> ZoneClassification {
        match self {
            ZoneCheck::Agrees { zone } | ZoneCheck::LocalOnly { zone } => *zone,
            ZoneCheck::Mismatch { upstream, .. } => *upstream,
            ZoneCheck::Unrecognized { fallback, .. } => *fallback,
        }
    }

    pub fn is_consistent(&self) -> bool {
        matches!(self, ZoneCheck::Agrees { .. } | ZoneCheck::LocalOnly { .. })
    }

    /// The shown upstream label is milder than the local table's
    pub fn understates_risk(&self) -> bool {
        match self {
            ZoneCheck::Mismatch { upstream, local } => local.is_more_severe_than(upstream),
            _ => false,
        }
    }
}

/// Re-validate an upstream zone label against the locally computed zone.
pub fn reconcile(scheme: Scheme, score: f64, upstream: Option<&str>) -> ZoneCheck {
    let local = classify(scheme, score);
    let Some(raw) = upstream else {
        return ZoneCheck::LocalOnly { zone: local };
    };

    match scheme.parse_label(raw) {
        Ok(upstream) if upstream == local => ZoneCheck::Agrees { zone: local },
        Ok(upstream) => {
            let direction = if local.is_more_severe_than(&upstream) { "milder" } else { "more severe" };
            warn!(
                "{} zone mismatch: upstream {} is {} than local {} for score {:.1}",
                scheme, upstream.label, direction, local.label, score
            );
            ZoneCheck::Mismatch { upstream, local }
        }
        Err(err) => {
            warn!("{}; showing {}", err, scheme.fallback().label);
            ZoneCheck::Unrecognized {
                raw: raw.to_string(),
                fallback: scheme.fallback(),
                local,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_cmds_boundaries_belong_to_lower_zone() {
        assert_eq!(classify(Scheme::Cmds, 0.0).label, "SAFE");
        assert_eq!(classify(Scheme::Cmds, 25.0).label, "SAFE");
        assert_eq!(classify(Scheme::Cmds, 25.01).label, "CAUTIOUS");
        assert_eq!(classify(Scheme::Cmds, 45.0).label, "CAUTIOUS");
        assert_eq!(classify(Scheme::Cmds, 65.0).label, "ELEVATED");
        assert_eq!(classify(Scheme::Cmds, 80.0).label, "HIGH");
        assert_eq!(classify(Scheme::Cmds, 80.01).label, "EXTREME");
        assert_eq!(classify(Scheme::Cmds, 100.0).label, "EXTREME");
    }

    #[test]
    fn test_frs_thresholds() {
        assert_eq!(classify(Scheme::Frs, 30.0).label, "GREEN");
        assert_eq!(classify(Scheme::Frs, 46.4).label, "YELLOW");
        assert_eq!(classify(Scheme::Frs, 70.0).label, "ORANGE");
        assert_eq!(classify(Scheme::Frs, 85.0).label, "RED");
        assert_eq!(classify(Scheme::Frs, 85.1).label, "BLACK");
    }

    #[test]
    fn test_category_risk_levels() {
        assert_eq!(classify(Scheme::CategoryRisk, 4.99).label, "LOW");
        assert_eq!(classify(Scheme::CategoryRisk, 5.0).label, "MODERATE");
        assert_eq!(classify(Scheme::CategoryRisk, 10.0).label, "ELEVATED");
        assert_eq!(classify(Scheme::CategoryRisk, 14.2).label, "ELEVATED");
        assert_eq!(classify(Scheme::CategoryRisk, 15.0).label, "SEVERE");
        assert_eq!(classify(Scheme::CategoryRisk, 25.0).label, "SEVERE");
    }

    #[test]
    fn test_category_engine_labels_agree_at_boundaries() {
        let cases = [
            (4.9, "LOW - Isolated pockets only"),
            (5.0, "MODERATE - Watchlist conditions"),
            (10.0, "ELEVATED - Multiple vulnerabilities"),
            (15.0, "HIGH - Systemic stress building"),
            (20.0, "CRITICAL - Crisis-level systemic risk"),
        ];
        for (score, label) in cases {
            let check = reconcile(Scheme::CategoryRisk, score, Some(label));
            assert!(check.is_consistent(), "{} at {} gave {:?}", label, score, check);
        }
    }

    #[test]
    fn test_absent_score_is_not_safe() {
        assert!(classify_opt(Scheme::Cmds, None).is_none());
        assert_eq!(classify(Scheme::Cmds, f64::NAN).label, "ELEVATED");
    }

    #[test]
    fn test_unrecognized_label_falls_back_to_mid_severity() {
        let zone = Scheme::Frs.resolve_label("PURPLE");
        assert_eq!(zone.label, "ORANGE");
        assert_ne!(zone.label, "GREEN");
        assert_eq!(Scheme::Cmds.resolve_label("???").label, "ELEVATED");
        assert_eq!(Scheme::CategoryRisk.resolve_label("").label, "ELEVATED");
    }

    #[test]
    fn test_category_prose_labels() {
        let cr = Scheme::CategoryRisk;
        assert_eq!(cr.parse_label("LOW - Isolated pockets only").unwrap().label, "LOW");
        assert_eq!(cr.parse_label("HIGH - Systemic stress building").unwrap().label, "SEVERE");
        assert_eq!(cr.parse_label("critical").unwrap().label, "SEVERE");
        assert!(cr.parse_label("PURPLE - unknown").is_err());
    }

    #[test]
    fn test_reconcile_outcomes() {
        assert!(matches!(reconcile(Scheme::Frs, 46.4, Some("YELLOW")), ZoneCheck::Agrees { .. }));
        assert!(matches!(reconcile(Scheme::Frs, 46.4, None), ZoneCheck::LocalOnly { .. }));

        let mismatch = reconcile(Scheme::Frs, 46.4, Some("RED"));
        assert_eq!(mismatch.display().label, "RED");
        assert!(!mismatch.is_consistent());
        assert!(!mismatch.understates_risk());

        let milder = reconcile(Scheme::Frs, 80.0, Some("GREEN"));
        assert_eq!(milder.display().label, "GREEN");
        assert!(milder.understates_risk());
        assert!(classify(Scheme::Frs, 80.0).is_more_severe_than(&milder.display()));

        let purple = reconcile(Scheme::Frs, 10.0, Some("PURPLE"));
        assert_eq!(purple.display().label, "ORANGE");
    }

    #[test]
    fn test_ramp_position() {
        assert_eq!(classify(Scheme::Cmds, 0.0).ramp_position(), 0.0);
        assert_eq!(classify(Scheme::Cmds, 99.0).ramp_position(), 1.0);
        assert_eq!(classify(Scheme::CategoryRisk, 12.0).ordinal, 2);
    }

    proptest! {
        #[test]
        fn classification_is_monotonic(a in 0.0f64..120.0, b in 0.0f64..120.0) {
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            for scheme in [Scheme::Cmds, Scheme::Frs, Scheme::CategoryRisk] {
                prop_assert!(classify(scheme, lo).ordinal <= classify(scheme, hi).ordinal);
            }
        }
    }
}
