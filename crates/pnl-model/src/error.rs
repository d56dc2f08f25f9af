//! Error types for the panel model

use crate::field::FieldKey;

/// Validation failures raised while constructing model values
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ModelError {
    /// Circuit count must be even
    #[error("number_of_circuits must be even, got {0}")]
    OddCircuitCount(i64),

    /// Circuit count outside template bounds
    #[error("number_of_circuits {value} outside [{min}, {max}]")]
    CircuitCountOutOfRange {
        /// Rejected count
        value: i64,
        /// Lower bound (inclusive)
        min: u8,
        /// Upper bound (inclusive)
        max: u8,
    },

    /// Circuit number outside the addressable panel range
    #[error("circuit {circuit} outside panel range 1..={max}")]
    CircuitOutOfRange {
        /// Offending circuit number
        circuit: i64,
        /// Largest valid circuit number
        max: u8,
    },

    /// Unrecognized load type designator
    #[error("invalid load type: {0}")]
    InvalidLoadType(String),

    /// Pole count outside 1..=3
    #[error("pole count must be 1..=3, got {0}")]
    InvalidPoleCount(String),

    /// Confidence outside [0, 1] or not finite
    #[error("confidence must be within [0, 1], got {0}")]
    InvalidConfidence(f64),

    /// Unknown field key or template label
    #[error("unknown field: {0}")]
    UnknownField(String),

    /// Empty or whitespace-only value
    #[error("empty value for {0}")]
    EmptyValue(FieldKey),

    /// Value present but not acceptable for the field
    #[error("invalid value for {field}: {reason}")]
    InvalidValue {
        /// Field the value was reported for
        field: FieldKey,
        /// Why it was refused
        reason: String,
    },

    /// Session key empty after sanitizing
    #[error("invalid session id: {0:?}")]
    InvalidSessionId(String),

    /// Task id is not a ULID
    #[error("invalid task id: {0}")]
    InvalidTaskId(String),

    /// Unknown extraction method name
    #[error("unknown extraction method: {0}")]
    UnknownMethod(String),

    /// Template descriptor is internally inconsistent
    #[error("invalid template: {0}")]
    InvalidTemplate(String),
}

impl ModelError {
    /// Whether this is the soft "nothing to record" case rather than bad data
    #[inline]
    #[must_use]
    pub fn is_empty_value(&self) -> bool {
        matches!(self, Self::EmptyValue(_))
    }

    /// Create an invalid value error
    #[inline]
    pub fn invalid(field: FieldKey, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            field,
            reason: reason.into(),
        }
    }
}
