//! Scoring model
//!
//! Zone classification, allocation bands, versioned max points and the
//! score feed snapshot shapes.

pub mod allocation;
pub mod max_points;
pub mod snapshot;
pub mod zones;

pub use allocation::{allocation_for, interpret_divergence, Allocation, Divergence};
pub use max_points::{MaxPointsTable, PointsAllocation, SchemeVersion};
pub use snapshot::{
    CategoryDetail, CategoryMetadata, CmdsSnapshot, ComponentScore, ComponentValue, ContractViolation, FrsSnapshot,
    Indicator, PredictionWindow, VpSnapshot,
};
pub use zones::{classify, classify_opt, reconcile, Scheme, UnrecognizedZoneLabel, ZoneCheck, ZoneClassification};
