//! Risk Console
//!
//! Classification and governance layer over pre-computed market-risk indicators:
//! - Zone classification for CMDS, FRS and category risk levels
//! - Data freshness evaluation
//! - Manual input validation and update coordination
//! - Snapshot aggregation over independent, periodically refreshed feeds

pub mod config;
pub mod console;
pub mod dashboard;
pub mod events;
pub mod feeds;
pub mod freshness;
pub mod manual;
pub mod scoring;
pub mod telemetry;

// Re-exports for convenience
pub use dashboard::{AggregateView, Dashboard, FeedState};
pub use feeds::{FeedError, FeedKey, ManualInputStore, ScoreFeed};
pub use freshness::{evaluate, Freshness, Staleness};
pub use manual::{UpdateCoordinator, UpdateError, ValidationError};
pub use scoring::{classify, Scheme, ZoneClassification};
