//! Audit trail and conflict flagging
//!
//! Every resolved observation leaves an entry here, accepted or not. The trail
//! is bounded; the oldest entries fall off first. Rejected entries that still
//! carry meaningful weight against the stored value mark the field as needing
//! review without ever touching the stored record.

use crate::policy::{AcceptKind, RejectReason};
use crate::store::ParameterStore;
use chrono::{DateTime, Utc};
use pnl_model::{Confidence, ExtractionMethod, FieldKey, FieldValue};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};

/// Minimum confidence a rejected reading needs to count as a conflict
pub const CONFLICT_FLOOR: f64 = 0.30;

/// Minimum share of the stored confidence a rejected reading needs
pub const CONFLICT_RATIO: f64 = 0.50;

/// Result recorded for one observation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "detail", rename_all = "snake_case")]
pub enum AuditOutcome {
    /// Observation became the stored value
    Accepted(AcceptKind),
    /// Observation was dropped
    Rejected(RejectReason),
}

/// One resolved observation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Arrival number within the session
    pub sequence: u64,
    /// Field reported
    pub field_key: FieldKey,
    /// Normalized value (raw value for empty rejections)
    pub value: FieldValue,
    /// Source method
    pub method: ExtractionMethod,
    /// Effective confidence
    pub confidence: Confidence,
    /// Source timestamp
    pub timestamp: DateTime<Utc>,
    /// Upload or document the reading came from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    /// What happened
    pub outcome: AuditOutcome,
}

/// Disagreement on one field worth a human look
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conflict {
    /// Field in question
    pub field_key: FieldKey,
    /// Value currently stored
    pub retained: FieldValue,
    /// Confidence of the stored value
    pub retained_confidence: Confidence,
    /// Distinct rejected readings that qualify as competing
    pub competing: Vec<(FieldValue, Confidence, ExtractionMethod)>,
}

/// Bounded, per-session log of resolution outcomes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditTrail {
    capacity: usize,
    entries: VecDeque<AuditEntry>,
}

impl AuditTrail {
    /// Trail holding at most `capacity` entries
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity,
            entries: VecDeque::with_capacity(capacity.min(1024)),
        }
    }

    /// Append, evicting the oldest entry when full
    pub fn record(&mut self, entry: AuditEntry) {
        if self.capacity == 0 {
            return;
        }
        while self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    /// Entries oldest first
    pub fn entries(&self) -> impl Iterator<Item = &AuditEntry> {
        self.entries.iter()
    }

    /// Rejected entries oldest first
    pub fn rejections(&self) -> impl Iterator<Item = &AuditEntry> {
        self.entries
            .iter()
            .filter(|e| matches!(e.outcome, AuditOutcome::Rejected(_)))
    }

    /// Number of entries held
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is held
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Maximum entries held
    #[inline]
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Drop every entry
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Fields whose stored value has a credible competing reading
    ///
    /// A rejected reading competes when its value differs from the stored one
    /// and its confidence is at least [`CONFLICT_FLOOR`] and at least
    /// [`CONFLICT_RATIO`] of the stored confidence.
    #[must_use]
    pub fn conflicts(&self, store: &ParameterStore) -> Vec<Conflict> {
        let mut by_field: BTreeMap<FieldKey, Conflict> = BTreeMap::new();

        for entry in self.rejections() {
            if entry.outcome != AuditOutcome::Rejected(RejectReason::LowerOrEqualConfidence) {
                continue;
            }
            let Some(stored) = store.get(&entry.field_key) else {
                continue;
            };
            if entry.value == stored.current_value {
                continue;
            }
            let c = entry.confidence.value();
            if c < CONFLICT_FLOOR || c < CONFLICT_RATIO * stored.current_confidence.value() {
                continue;
            }

            let conflict = by_field.entry(entry.field_key).or_insert_with(|| Conflict {
                field_key: entry.field_key,
                retained: stored.current_value.clone(),
                retained_confidence: stored.current_confidence,
                competing: Vec::new(),
            });
            if !conflict.competing.iter().any(|(v, _, _)| *v == entry.value) {
                conflict
                    .competing
                    .push((entry.value.clone(), entry.confidence, entry.method));
            }
        }

        by_field.into_values().collect()
    }

    /// Keys of [`Self::conflicts`]
    #[must_use]
    pub fn needs_review(&self, store: &ParameterStore) -> Vec<FieldKey> {
        self.conflicts(store).into_iter().map(|c| c.field_key).collect()
    }
}

impl Default for AuditTrail {
    fn default() -> Self {
        Self::with_capacity(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pnl_model::HeaderField;

    fn entry(sequence: u64, value: &str, confidence: f64, outcome: AuditOutcome) -> AuditEntry {
        AuditEntry {
            sequence,
            field_key: FieldKey::header(HeaderField::Voltage),
            value: value.into(),
            method: ExtractionMethod::TextOcr,
            confidence: Confidence::new(confidence).unwrap(),
            timestamp: Utc::now(),
            source: None,
            outcome,
        }
    }

    #[test]
    fn bounded_capacity_evicts_oldest() {
        let mut trail = AuditTrail::with_capacity(2);
        for seq in 0..5 {
            trail.record(entry(seq, "x", 0.5, AuditOutcome::Accepted(AcceptKind::Insert)));
        }
        let seqs: Vec<u64> = trail.entries().map(|e| e.sequence).collect();
        assert_eq!(seqs, [3, 4]);
    }

    #[test]
    fn zero_capacity_records_nothing() {
        let mut trail = AuditTrail::with_capacity(0);
        trail.record(entry(0, "x", 0.5, AuditOutcome::Rejected(RejectReason::EmptyValue)));
        assert!(trail.is_empty());
    }

    #[test]
    fn empty_store_has_no_conflicts() {
        let mut trail = AuditTrail::default();
        trail.record(entry(
            0,
            "480V",
            0.6,
            AuditOutcome::Rejected(RejectReason::LowerOrEqualConfidence),
        ));
        assert!(trail.needs_review(&ParameterStore::new()).is_empty());
    }
}
