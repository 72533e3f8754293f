//! Data Freshness
//!
//! Turns a timestamp into an age label and a staleness bucket. Never fails:
//! missing or unparseable timestamps evaluate to `Unknown`.

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Staleness {
    Fresh,
    Aging,
    Stale,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Freshness {
    pub age_label: String,
    pub staleness: Staleness,
}

impl Freshness {
    fn unknown(label: impl Into<String>) -> Self {
        Self {
            age_label: label.into(),
            staleness: Staleness::Unknown,
        }
    }
}

pub fn evaluate(timestamp: Option<DateTime<Utc>>, now: DateTime<Utc>) -> Freshness {
    let Some(ts) = timestamp else {
        return Freshness::unknown("Unknown");
    };

    let age = now.signed_duration_since(ts);
    let staleness = if age <= Duration::days(1) {
        Staleness::Fresh
    } else if age <= Duration::days(7) {
        Staleness::Aging
    } else {
        Staleness::Stale
    };

    let days = age.num_days();
    let age_label = match days {
        i64::MIN..=0 => "Today".to_string(),
        1 => "Yesterday".to_string(),
        2..=6 => format!("{} days ago", days),
        7..=29 => format!("{} weeks ago", days / 7),
        _ => ts.format("%-m/%-d/%Y").to_string(),
    };

    Freshness { age_label, staleness }
}

/// Parse the timestamp shapes the feeds emit: RFC 3339, naive ISO date-times
/// (taken as UTC) and bare dates (UTC midnight).
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Evaluate a raw upstream timestamp; a malformed one shows verbatim as `Unknown`.
pub fn evaluate_raw(raw: Option<&str>, now: DateTime<Utc>) -> Freshness {
    match raw {
        None => evaluate(None, now),
        Some(s) => match parse_timestamp(s) {
            Some(ts) => evaluate(Some(ts), now),
            None => {
                debug!("Malformed timestamp '{}', showing it verbatim", s);
                Freshness::unknown(s)
            }
        },
    }
}
