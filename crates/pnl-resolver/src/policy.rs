//! Resolution policy
//!
//! Provides the [`ResolutionPolicy`] trait that decides whether a candidate
//! replaces a stored record.

use chrono::{DateTime, Utc};
use pnl_model::{Confidence, FieldValue, ParameterRecord};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Normalized candidate as seen by a policy
#[derive(Debug, Clone, Copy)]
pub struct Candidate<'a> {
    /// Normalized value
    pub value: &'a FieldValue,
    /// Effective confidence
    pub confidence: Confidence,
    /// Source timestamp
    pub timestamp: DateTime<Utc>,
}

/// Why a candidate was accepted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AcceptKind {
    /// Field was absent
    Insert,
    /// Strictly higher confidence
    Upgrade,
    /// Same tier, newer, different value
    Correction,
}

/// Why a candidate was rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    /// Stored value is at least as trustworthy
    LowerOrEqualConfidence,
    /// Candidate carried no value
    EmptyValue,
}

impl RejectReason {
    /// Stable identifier
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::LowerOrEqualConfidence => "lower_or_equal_confidence",
            Self::EmptyValue => "empty_value",
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Policy verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Replace (or create) the record
    Accept(AcceptKind),
    /// Leave the record untouched
    Reject(RejectReason),
}

/// Decides whether a candidate replaces the stored record
///
/// Implementations must be deterministic: the same record and candidate
/// always produce the same decision.
pub trait ResolutionPolicy: Send + Sync + fmt::Debug {
    /// Judge a candidate against the current record, if any
    fn decide(&self, current: Option<&ParameterRecord>, candidate: &Candidate<'_>) -> Decision;

    /// Policy name (for logging)
    fn name(&self) -> &'static str;
}

/// Confidence never decreases; equal-tier corrections need a newer, different value
///
/// A tie on confidence and timestamp keeps the earlier arrival.
#[derive(Debug, Clone, Copy, Default)]
pub struct MonotonicConfidence;

impl MonotonicConfidence {
    /// Create the policy
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl ResolutionPolicy for MonotonicConfidence {
    fn decide(&self, current: Option<&ParameterRecord>, candidate: &Candidate<'_>) -> Decision {
        let Some(stored) = current else {
            return Decision::Accept(AcceptKind::Insert);
        };
        match candidate.confidence.partial_cmp(&stored.current_confidence) {
            Some(Ordering::Greater) => Decision::Accept(AcceptKind::Upgrade),
            Some(Ordering::Equal)
                if candidate.timestamp > stored.last_modified
                    && *candidate.value != stored.current_value =>
            {
                Decision::Accept(AcceptKind::Correction)
            }
            _ => Decision::Reject(RejectReason::LowerOrEqualConfidence),
        }
    }

    fn name(&self) -> &'static str {
        "monotonic_confidence"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use pnl_model::{ExtractionMethod, FieldKey, HeaderField};

    fn record(value: &str, confidence: f64, at: DateTime<Utc>) -> ParameterRecord {
        ParameterRecord {
            field_key: FieldKey::header(HeaderField::Voltage),
            current_value: value.into(),
            current_confidence: Confidence::new(confidence).unwrap(),
            current_method: ExtractionMethod::Manual,
            last_modified: at,
            sequence: 0,
            source: None,
        }
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 8, 0, 0).unwrap()
    }

    fn decide(current: Option<&ParameterRecord>, value: &str, c: f64, at: DateTime<Utc>) -> Decision {
        let value = FieldValue::from(value);
        MonotonicConfidence.decide(
            current,
            &Candidate {
                value: &value,
                confidence: Confidence::new(c).unwrap(),
                timestamp: at,
            },
        )
    }

    #[test]
    fn absent_field_is_inserted() {
        assert_eq!(decide(None, "480V", 0.1, t0()), Decision::Accept(AcceptKind::Insert));
    }

    #[test]
    fn higher_confidence_upgrades_even_when_older() {
        let stored = record("480V", 0.7, t0());
        assert_eq!(
            decide(Some(&stored), "208V", 0.85, t0() - Duration::hours(1)),
            Decision::Accept(AcceptKind::Upgrade)
        );
    }

    #[test]
    fn lower_confidence_never_wins() {
        let stored = record("480V", 0.85, t0());
        assert_eq!(
            decide(Some(&stored), "208V", 0.7, t0() + Duration::hours(5)),
            Decision::Reject(RejectReason::LowerOrEqualConfidence)
        );
    }

    #[test]
    fn equal_tier_correction_needs_newer_and_different() {
        let stored = record("480V", 0.7, t0());
        let later = t0() + Duration::seconds(1);
        assert_eq!(
            decide(Some(&stored), "208V", 0.7, later),
            Decision::Accept(AcceptKind::Correction)
        );
        assert_eq!(
            decide(Some(&stored), "480V", 0.7, later),
            Decision::Reject(RejectReason::LowerOrEqualConfidence)
        );
        assert_eq!(
            decide(Some(&stored), "208V", 0.7, t0()),
            Decision::Reject(RejectReason::LowerOrEqualConfidence)
        );
    }
}
