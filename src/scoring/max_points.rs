//! Versioned points table
//!
//! Component and category point allocations differ between scoring scheme
//! versions, so they are looked up by `(version, name)` and never assumed.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchemeVersion {
    /// Single-factor leverage scoring (manual inputs v1)
    Legacy,
    /// Multi-factor leverage scoring with weighted sub-components (manual inputs v2.0)
    #[default]
    Enhanced,
}

impl FromStr for SchemeVersion {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "legacy" | "1" | "1.0" => Ok(SchemeVersion::Legacy),
            "enhanced" | "2" | "2.0" => Ok(SchemeVersion::Enhanced),
            other => Err(format!("unknown scheme version '{}'", other)),
        }
    }
}

impl fmt::Display for SchemeVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchemeVersion::Legacy => write!(f, "legacy"),
            SchemeVersion::Enhanced => write!(f, "enhanced"),
        }
    }
}

/// Points range of one component or category, and its weight inside its parent
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PointsAllocation {
    pub min: f64,
    pub max: f64,
    pub weight: f64,
}

impl PointsAllocation {
    pub const fn new(max: f64) -> Self {
        Self { min: 0.0, max, weight: 1.0 }
    }

    pub const fn weighted(max: f64, weight: f64) -> Self {
        Self { min: 0.0, max, weight }
    }

    pub const fn with_floor(mut self, min: f64) -> Self {
        self.min = min;
        self
    }

    pub fn contains(&self, score: f64) -> bool {
        score >= self.min && score <= self.max
    }

    /// Points this entry contributes to its parent
    pub fn contribution(&self, score: f64) -> f64 {
        score.clamp(self.min, self.max) * self.weight
    }

    /// Fraction of the range reached, 0.0..=1.0
    pub fn ratio(&self, score: f64) -> f64 {
        let span = self.max - self.min;
        if span <= 0.0 {
            return 0.0;
        }
        ((score - self.min) / span).clamp(0.0, 1.0)
    }
}

const CATEGORIES: [(&str, PointsAllocation); 5] = [
    ("macro", PointsAllocation::new(30.0)),
    ("valuation", PointsAllocation::new(25.0)),
    ("leverage", PointsAllocation::new(25.0)),
    ("earnings", PointsAllocation::new(10.0)),
    ("sentiment", PointsAllocation::new(10.0).with_floor(-10.0)),
];

const COMPONENTS: [&str; 10] = [
    "unemployment",
    "yield_curve",
    "gdp",
    "forward_pe",
    "buffett_indicator",
    "equity_yield",
    "hedge_fund_leverage",
    "corporate_credit",
    "cre_stress",
    "earnings_breadth",
];

const ENHANCED_SUB_COMPONENTS: [(&str, f64); 8] = [
    ("hy_spreads", 0.50),
    ("interest_coverage", 0.20),
    ("default_momentum", 0.20),
    ("recovery_rate", 0.10),
    ("delinquency", 0.25),
    ("bank_stress", 0.25),
    ("refinancing_cliff", 0.25),
    ("vacancy_structural", 0.25),
];

/// Lookup table keyed by `(version, component-or-category name)`
#[derive(Debug, Clone, Default)]
pub struct MaxPointsTable {
    entries: HashMap<(SchemeVersion, String), PointsAllocation>,
}

impl MaxPointsTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// The allocations published by the scoring engine for both versions
    pub fn standard() -> Self {
        let mut table = Self::new();
        for version in [SchemeVersion::Legacy, SchemeVersion::Enhanced] {
            for (name, alloc) in CATEGORIES {
                table.insert(version, name, alloc);
            }
            for name in COMPONENTS {
                table.insert(version, name, PointsAllocation::new(10.0));
            }
            // The sentiment category has a single component of the same name and range.
            table.insert(version, "sentiment", PointsAllocation::new(10.0).with_floor(-10.0));
        }
        for (name, weight) in ENHANCED_SUB_COMPONENTS {
            table.insert(SchemeVersion::Enhanced, name, PointsAllocation::weighted(10.0, weight));
        }
        table
    }

    pub fn with_entry(mut self, version: SchemeVersion, name: &str, alloc: PointsAllocation) -> Self {
        self.insert(version, name, alloc);
        self
    }

    pub fn insert(&mut self, version: SchemeVersion, name: &str, alloc: PointsAllocation) {
        self.entries.insert((version, name.to_string()), alloc);
    }

    pub fn lookup(&self, version: SchemeVersion, name: &str) -> Option<PointsAllocation> {
        self.entries.get(&(version, name.to_string())).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
