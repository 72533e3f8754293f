//! Manual Input Validator
//!
//! Schema-driven accept/reject for one candidate edit. Validation is atomic
//! per field: a bad date rejects the value with it.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::field::{FieldKind, ManualInputField};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("'{input}' is not a number")]
    NotANumber { input: String },

    #[error("Value must be between {min} and {max}")]
    OutOfRange { min: f64, max: f64 },

    #[error("'{input}' is not a valid date (expected YYYY-MM-DD)")]
    InvalidDate { input: String },
}

/// A candidate that passed validation, ready to be staged
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ValidatedEntry {
    pub value: f64,
    pub as_of: Option<NaiveDate>,
}

fn parse_value(kind: FieldKind, input: &str) -> Result<f64, ValidationError> {
    if kind == FieldKind::Boolean {
        match input.to_ascii_lowercase().as_str() {
            "true" => return Ok(1.0),
            "false" => return Ok(0.0),
            _ => {}
        }
    }
    input
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| ValidationError::NotANumber {
            input: input.to_string(),
        })
}

fn parse_date(input: Option<&str>) -> Result<Option<NaiveDate>, ValidationError> {
    let Some(raw) = input.map(str::trim).filter(|s| !s.is_empty()) else {
        return Ok(None);
    };
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map(Some)
        .map_err(|_| ValidationError::InvalidDate {
            input: raw.to_string(),
        })
}

pub fn validate(
    field: &ManualInputField,
    candidate_value: &str,
    candidate_as_of: Option<&str>,
) -> Result<ValidatedEntry, ValidationError> {
    let value = parse_value(field.kind, candidate_value.trim())?;

    let out_of_range = ValidationError::OutOfRange {
        min: field.min,
        max: field.max,
    };
    if !field.contains(value) {
        return Err(out_of_range);
    }
    if field.kind == FieldKind::Boolean && value.fract() != 0.0 {
        return Err(out_of_range);
    }

    let as_of = parse_date(candidate_as_of)?;
    Ok(ValidatedEntry { value, as_of })
}
