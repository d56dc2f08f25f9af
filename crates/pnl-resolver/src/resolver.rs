//! Confidence resolver

use crate::audit::{AuditEntry, AuditOutcome, AuditTrail};
use crate::error::ResolveError;
use crate::policy::{AcceptKind, Candidate, Decision, MonotonicConfidence, RejectReason, ResolutionPolicy};
use crate::store::ParameterStore;
use crate::weights::MethodWeights;
use pnl_model::{normalize_value, FieldObservation, ParameterRecord, TemplateDescriptor};
use serde::Serialize;
use tracing::debug;

/// Result of resolving one observation
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum Outcome {
    /// Observation is now the stored value
    Accepted {
        /// Why it won
        kind: AcceptKind,
        /// Record as stored
        record: ParameterRecord,
    },
    /// Observation was dropped; the store is unchanged
    Rejected {
        /// Why it lost
        reason: RejectReason,
    },
}

impl Outcome {
    /// Whether the store changed
    #[inline]
    #[must_use]
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted { .. })
    }

    /// Rejection reason, if rejected
    #[inline]
    #[must_use]
    pub fn reject_reason(&self) -> Option<RejectReason> {
        match self {
            Self::Rejected { reason } => Some(*reason),
            Self::Accepted { .. } => None,
        }
    }
}

/// Applies observations to a store under a weight table and policy
///
/// Holds no per-session state: the caller owns the store and audit trail and
/// must serialize calls per session.
#[derive(Debug)]
pub struct ConfidenceResolver {
    weights: MethodWeights,
    policy: Box<dyn ResolutionPolicy>,
}

impl ConfidenceResolver {
    /// Resolver with built-in weights and [`MonotonicConfidence`]
    #[must_use]
    pub fn new() -> Self {
        Self {
            weights: MethodWeights::new(),
            policy: Box::new(MonotonicConfidence),
        }
    }

    /// With a weight table
    #[inline]
    #[must_use]
    pub fn with_weights(mut self, weights: MethodWeights) -> Self {
        self.weights = weights;
        self
    }

    /// With a different policy
    #[inline]
    #[must_use]
    pub fn with_policy(mut self, policy: impl ResolutionPolicy + 'static) -> Self {
        self.policy = Box::new(policy);
        self
    }

    /// Weight table in use
    #[inline]
    #[must_use]
    pub fn weights(&self) -> &MethodWeights {
        &self.weights
    }

    /// Resolve one observation against `store`
    ///
    /// # Returns
    /// - `Ok(Outcome::Accepted)` when the store changed
    /// - `Ok(Outcome::Rejected)` for empty or out-ranked readings (audit only)
    /// - `Err(ResolveError::Validation)` when the value is invalid for its field
    pub fn observe(
        &self,
        store: &mut ParameterStore,
        audit: &mut AuditTrail,
        template: &TemplateDescriptor,
        observation: &FieldObservation,
    ) -> Result<Outcome, ResolveError> {
        let key = observation.field_key();
        let method = observation.method();
        let confidence = self.weights.effective(method, observation.confidence());

        let value = match normalize_value(key, observation.value(), template) {
            Ok(value) => value,
            Err(e) if e.is_empty_value() => {
                let sequence = store.next_sequence();
                debug!(field = %key, %method, sequence, "empty value ignored");
                audit.record(AuditEntry {
                    sequence,
                    field_key: key,
                    value: observation.value().clone(),
                    method,
                    confidence,
                    timestamp: observation.timestamp(),
                    source: observation.source().map(str::to_owned),
                    outcome: AuditOutcome::Rejected(RejectReason::EmptyValue),
                });
                return Ok(Outcome::Rejected {
                    reason: RejectReason::EmptyValue,
                });
            }
            Err(e) => return Err(e.into()),
        };

        let sequence = store.next_sequence();
        let candidate = Candidate {
            value: &value,
            confidence,
            timestamp: observation.timestamp(),
        };
        let decision = self.policy.decide(store.get(&key), &candidate);

        let outcome = match decision {
            Decision::Accept(kind) => {
                let record = ParameterRecord {
                    field_key: key,
                    current_value: value.clone(),
                    current_confidence: confidence,
                    current_method: method,
                    last_modified: observation.timestamp(),
                    sequence,
                    source: observation.source().map(str::to_owned),
                };
                debug!(
                    field = %key,
                    %method,
                    %confidence,
                    value = %value,
                    ?kind,
                    sequence,
                    source = observation.source().unwrap_or("-"),
                    "observation accepted"
                );
                store.put(record.clone());
                audit.record(audit_entry(
                    sequence,
                    observation,
                    &value,
                    confidence,
                    AuditOutcome::Accepted(kind),
                ));
                Outcome::Accepted { kind, record }
            }
            Decision::Reject(reason) => {
                debug!(
                    field = %key,
                    %method,
                    %confidence,
                    %reason,
                    sequence,
                    policy = self.policy.name(),
                    "observation rejected"
                );
                audit.record(audit_entry(
                    sequence,
                    observation,
                    &value,
                    confidence,
                    AuditOutcome::Rejected(reason),
                ));
                Outcome::Rejected { reason }
            }
        };

        Ok(outcome)
    }

    /// Resolve observations strictly in order, one outcome per observation
    ///
    /// A validation failure on one observation does not stop the rest.
    pub fn observe_batch<'a>(
        &self,
        store: &mut ParameterStore,
        audit: &mut AuditTrail,
        template: &TemplateDescriptor,
        observations: impl IntoIterator<Item = &'a FieldObservation>,
    ) -> Vec<Result<Outcome, ResolveError>> {
        observations
            .into_iter()
            .map(|obs| self.observe(store, audit, template, obs))
            .collect()
    }
}

impl Default for ConfidenceResolver {
    fn default() -> Self {
        Self::new()
    }
}

fn audit_entry(
    sequence: u64,
    observation: &FieldObservation,
    value: &pnl_model::FieldValue,
    confidence: pnl_model::Confidence,
    outcome: AuditOutcome,
) -> AuditEntry {
    AuditEntry {
        sequence,
        field_key: observation.field_key(),
        value: value.clone(),
        method: observation.method(),
        confidence,
        timestamp: observation.timestamp(),
        source: observation.source().map(str::to_owned),
        outcome,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use pnl_model::{
        CircuitAttr, Confidence, ExtractionMethod, FieldKey, FieldValue, HeaderField, ModelError,
        SessionId,
    };

    struct Fixture {
        resolver: ConfidenceResolver,
        template: TemplateDescriptor,
        store: ParameterStore,
        audit: AuditTrail,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                resolver: ConfidenceResolver::new(),
                template: TemplateDescriptor::three_phase(),
                store: ParameterStore::new(),
                audit: AuditTrail::with_capacity(32),
            }
        }

        fn observe(
            &mut self,
            key: FieldKey,
            value: impl Into<FieldValue>,
            method: ExtractionMethod,
            at: DateTime<Utc>,
        ) -> Result<Outcome, ResolveError> {
            let obs = FieldObservation::with_default_weight(
                SessionId::new("s1").unwrap(),
                key,
                value,
                method,
                at,
            );
            self.resolver
                .observe(&mut self.store, &mut self.audit, &self.template, &obs)
        }
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 4, 9, 0, 0).unwrap()
    }

    const VOLTAGE: FieldKey = FieldKey::Header(HeaderField::Voltage);

    #[test]
    fn vision_over_manual_in_either_order() {
        let mut a = Fixture::new();
        a.observe(VOLTAGE, "480Y/277V", ExtractionMethod::Manual, t0()).unwrap();
        let out = a
            .observe(VOLTAGE, "208Y/120V", ExtractionMethod::AiVision, t0() + Duration::seconds(1))
            .unwrap();
        assert!(out.is_accepted());

        let mut b = Fixture::new();
        b.observe(VOLTAGE, "208Y/120V", ExtractionMethod::AiVision, t0()).unwrap();
        let out = b
            .observe(VOLTAGE, "480Y/277V", ExtractionMethod::Manual, t0() + Duration::seconds(1))
            .unwrap();
        assert_eq!(out.reject_reason(), Some(RejectReason::LowerOrEqualConfidence));

        assert_eq!(a.store.value(&VOLTAGE), b.store.value(&VOLTAGE));
        assert_eq!(a.store.value(&VOLTAGE), Some(&FieldValue::Text("208Y/120V".into())));
    }

    #[test]
    fn same_tier_correction_replaces_value() {
        let mut f = Fixture::new();
        f.observe(VOLTAGE, "480V", ExtractionMethod::Manual, t0()).unwrap();
        let out = f
            .observe(VOLTAGE, "208V", ExtractionMethod::Manual, t0() + Duration::minutes(2))
            .unwrap();
        assert!(matches!(out, Outcome::Accepted { kind: AcceptKind::Correction, .. }));
        assert_eq!(f.store.get(&VOLTAGE).unwrap().last_modified, t0() + Duration::minutes(2));
    }

    #[test]
    fn identical_timestamp_tie_keeps_first_arrival() {
        let mut f = Fixture::new();
        f.observe(VOLTAGE, "480V", ExtractionMethod::Manual, t0()).unwrap();
        let out = f.observe(VOLTAGE, "208V", ExtractionMethod::Manual, t0()).unwrap();
        assert!(!out.is_accepted());
        assert_eq!(f.store.value(&VOLTAGE), Some(&FieldValue::Text("480V".into())));
        assert_eq!(f.store.get(&VOLTAGE).unwrap().sequence, 0);
    }

    #[test]
    fn normalized_equal_values_are_not_corrections() {
        let mut f = Fixture::new();
        let amps = FieldKey::circuit(3, CircuitAttr::BreakerAmps);
        f.observe(amps, FieldValue::Number(20.0), ExtractionMethod::Manual, t0()).unwrap();
        let out = f
            .observe(amps, "20A", ExtractionMethod::Manual, t0() + Duration::seconds(30))
            .unwrap();
        assert!(!out.is_accepted());
        assert_eq!(f.store.get(&amps).unwrap().last_modified, t0());
    }

    #[test]
    fn empty_value_is_silently_rejected() {
        let mut f = Fixture::new();
        let out = f.observe(VOLTAGE, "  ", ExtractionMethod::AiVision, t0()).unwrap();
        assert_eq!(out.reject_reason(), Some(RejectReason::EmptyValue));
        assert!(f.store.is_empty());
        assert_eq!(f.audit.len(), 1);
    }

    #[test]
    fn invalid_value_is_a_validation_error() {
        let mut f = Fixture::new();
        let count = FieldKey::header(HeaderField::NumberOfCircuits);
        let err = f.observe(count, FieldValue::Number(41.0), ExtractionMethod::Manual, t0()).unwrap_err();
        assert_eq!(err, ResolveError::Validation(ModelError::OddCircuitCount(41)));
        assert!(f.store.is_empty());
        assert!(f.audit.is_empty());
    }

    #[test]
    fn credible_rejection_flags_review() {
        let mut f = Fixture::new();
        f.observe(VOLTAGE, "208Y/120V", ExtractionMethod::AiVision, t0()).unwrap();
        f.observe(VOLTAGE, "480Y/277V", ExtractionMethod::TextOcr, t0()).unwrap();
        assert_eq!(f.audit.needs_review(&f.store), [VOLTAGE]);

        let conflicts = f.audit.conflicts(&f.store);
        assert_eq!(conflicts[0].competing.len(), 1);
        assert_eq!(conflicts[0].retained, FieldValue::Text("208Y/120V".into()));
    }

    #[test]
    fn weak_rejection_does_not_flag_review() {
        let mut f = Fixture::new();
        f.observe(VOLTAGE, "208Y/120V", ExtractionMethod::AiVision, t0()).unwrap();
        let weak = FieldObservation::new(
            SessionId::new("s1").unwrap(),
            VOLTAGE,
            "480Y/277V",
            ExtractionMethod::TextOcr,
            Confidence::new(0.2).unwrap(),
            t0(),
        );
        f.resolver
            .observe(&mut f.store, &mut f.audit, &f.template, &weak)
            .unwrap();
        assert!(f.audit.needs_review(&f.store).is_empty());
    }

    #[test]
    fn batch_applies_in_order_and_continues_past_errors() {
        let mut f = Fixture::new();
        let sid = SessionId::new("s1").unwrap();
        let count = FieldKey::header(HeaderField::NumberOfCircuits);
        let batch = vec![
            FieldObservation::with_default_weight(sid.clone(), count, FieldValue::Number(41.0), ExtractionMethod::Manual, t0()),
            FieldObservation::with_default_weight(sid.clone(), count, FieldValue::Number(42.0), ExtractionMethod::Manual, t0()),
            FieldObservation::with_default_weight(sid, count, FieldValue::Number(30.0), ExtractionMethod::TextOcr, t0()),
        ];
        let results = f
            .resolver
            .observe_batch(&mut f.store, &mut f.audit, &f.template, &batch);
        assert!(results[0].is_err());
        assert!(results[1].as_ref().unwrap().is_accepted());
        assert!(!results[2].as_ref().unwrap().is_accepted());
        assert_eq!(f.store.number_of_circuits(), Some(42));
    }
}
