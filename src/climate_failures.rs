// Failure modes for the emissions inference pipeline
// Every anomalous input degrades to a documented outcome; nothing here is fatal to a batch

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ---
// Failure modes
// ---

#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
pub enum EmissionsFailure {
    #[error("Missing signal: detection {detection_id} lacks {missing} needed for conversion")]
    MissingSignal { detection_id: String, missing: String },

    #[error("Invalid record {record}: {reason}")]
    InvalidRecord { record: String, reason: String },

    #[error("Value out of range: {field} = {value}, allowed: [{min}, {max}]")]
    OutOfRange { field: String, value: f64, min: f64, max: f64 },

    #[error("Duplicate facility id {facility_id}")]
    DuplicateFacility { facility_id: u64 },
}

impl EmissionsFailure {
    pub fn missing_signal(detection_id: &str, missing: &str) -> Self {
        Self::MissingSignal {
            detection_id: detection_id.to_string(),
            missing: missing.to_string(),
        }
    }

    pub fn invalid_record(record: &str, reason: impl Into<String>) -> Self {
        Self::InvalidRecord {
            record: record.to_string(),
            reason: reason.into(),
        }
    }

    /// True for the "no estimate" outcome, as opposed to a malformed input.
    pub fn is_missing_signal(&self) -> bool {
        matches!(self, Self::MissingSignal { .. })
    }
}

/// Check a value against inclusive bounds.
pub(crate) fn check_range(field: &str, value: f64, min: f64, max: f64) -> Result<f64, EmissionsFailure> {
    if !value.is_finite() || value < min || value > max {
        return Err(EmissionsFailure::OutOfRange {
            field: field.to_string(),
            value,
            min,
            max,
        });
    }
    Ok(value)
}

/// A record that was dropped before analysis, with the reason.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RejectedRecord {
    pub record_id: String,
    pub failure: EmissionsFailure,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_range_check() {
        assert_eq!(check_range("lat", 22.35, -90.0, 90.0).unwrap(), 22.35);
        assert!(check_range("lat", 91.0, -90.0, 90.0).is_err());
        assert!(check_range("lat", f64::NAN, -90.0, 90.0).is_err());
    }

    #[test]
    fn test_missing_signal_message() {
        let failure = EmissionsFailure::missing_signal("plume-7", "background column");
        assert!(failure.is_missing_signal());
        assert_eq!(
            failure.to_string(),
            "Missing signal: detection plume-7 lacks background column needed for conversion"
        );
    }
}
