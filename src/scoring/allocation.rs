//! Allocation bands and FRS/VP divergence reading for the CMDS view.

use serde::{Deserialize, Serialize};

use super::zones::{Scheme, ZoneClassification};

/// Recommended portfolio ranges, each `[low, high]` in percent
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Allocation {
    pub equity_pct: [f64; 2],
    pub hedge_pct: [f64; 2],
    pub cash_pct: [f64; 2],
}

const BANDS: [Allocation; 5] = [
    // SAFE
    Allocation { equity_pct: [90.0, 100.0], hedge_pct: [0.0, 2.0], cash_pct: [0.0, 10.0] },
    // CAUTIOUS
    Allocation { equity_pct: [70.0, 90.0], hedge_pct: [2.0, 5.0], cash_pct: [10.0, 20.0] },
    // ELEVATED
    Allocation { equity_pct: [50.0, 70.0], hedge_pct: [5.0, 10.0], cash_pct: [20.0, 35.0] },
    // HIGH
    Allocation { equity_pct: [30.0, 50.0], hedge_pct: [10.0, 15.0], cash_pct: [35.0, 50.0] },
    // EXTREME
    Allocation { equity_pct: [10.0, 30.0], hedge_pct: [15.0, 25.0], cash_pct: [50.0, 75.0] },
];

/// Allocation band for a CMDS zone; other schemes have no allocation table.
pub fn allocation_for(zone: &ZoneClassification) -> Option<Allocation> {
    if zone.scheme != Scheme::Cmds {
        return None;
    }
    BANDS.get(zone.ordinal as usize).copied()
}

/// How the structural (FRS) and short-horizon (VP) signals relate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Divergence {
    CoiledSpring,
    FalseAlarm,
    AlignedDanger,
    AllClear,
    Mixed,
}

impl Divergence {
    pub fn describe(&self) -> &'static str {
        match self {
            Divergence::CoiledSpring => "COILED_SPRING: Structural risk high, catalyst not yet present",
            Divergence::FalseAlarm => "FALSE_ALARM: Short-term panic in stable environment",
            Divergence::AlignedDanger => "ALIGNED_DANGER: Both signals confirm high risk",
            Divergence::AllClear => "ALL_CLEAR: Healthy environment",
            Divergence::Mixed => "MIXED: Monitor for clarity",
        }
    }
}

pub fn interpret_divergence(frs: f64, vp: f64) -> Divergence {
    if (frs - vp).abs() > 40.0 {
        if frs > vp {
            Divergence::CoiledSpring
        } else {
            Divergence::FalseAlarm
        }
    } else if frs > 70.0 && vp > 70.0 {
        Divergence::AlignedDanger
    } else if frs < 40.0 && vp < 40.0 {
        Divergence::AllClear
    } else {
        Divergence::Mixed
    }
}
