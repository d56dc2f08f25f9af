//! Observations and stored records

use crate::field::FieldKey;
use crate::ids::SessionId;
use crate::method::{Confidence, ExtractionMethod};
use crate::value::FieldValue;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One candidate value reported by one extraction source
///
/// Immutable once built: fields are only readable through accessors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldObservation {
    field_key: FieldKey,
    value: FieldValue,
    method: ExtractionMethod,
    confidence: Confidence,
    timestamp: DateTime<Utc>,
    session_id: SessionId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    source: Option<String>,
}

impl FieldObservation {
    /// Create an observation
    #[must_use]
    pub fn new(
        session_id: SessionId,
        field_key: FieldKey,
        value: impl Into<FieldValue>,
        method: ExtractionMethod,
        confidence: Confidence,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            field_key,
            value: value.into(),
            method,
            confidence,
            timestamp,
            session_id,
            source: None,
        }
    }

    /// Tag with the upload or document the value was read from
    #[inline]
    #[must_use]
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Create an observation carrying the method's built-in weight
    #[must_use]
    pub fn with_default_weight(
        session_id: SessionId,
        field_key: FieldKey,
        value: impl Into<FieldValue>,
        method: ExtractionMethod,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self::new(
            session_id,
            field_key,
            value,
            method,
            method.default_weight(),
            timestamp,
        )
    }

    /// Field this observation reports
    #[inline]
    #[must_use]
    pub fn field_key(&self) -> FieldKey {
        self.field_key
    }

    /// Reported value, as produced by the source
    #[inline]
    #[must_use]
    pub fn value(&self) -> &FieldValue {
        &self.value
    }

    /// Source method
    #[inline]
    #[must_use]
    pub fn method(&self) -> ExtractionMethod {
        self.method
    }

    /// Source-reported confidence
    #[inline]
    #[must_use]
    pub fn confidence(&self) -> Confidence {
        self.confidence
    }

    /// When the source produced the value
    #[inline]
    #[must_use]
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Conversation the observation was produced in
    #[inline]
    #[must_use]
    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    /// Upload or document the value was read from, if known
    #[inline]
    #[must_use]
    pub fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }
}

/// Currently retained value for a field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterRecord {
    /// Field
    pub field_key: FieldKey,
    /// Normalized value
    pub current_value: FieldValue,
    /// Effective confidence of the accepted observation
    pub current_confidence: Confidence,
    /// Method of the accepted observation
    pub current_method: ExtractionMethod,
    /// Timestamp of the accepted observation
    pub last_modified: DateTime<Utc>,
    /// Arrival number of the accepted observation within its session
    pub sequence: u64,
    /// Upload or document the accepted value was read from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::HeaderField;
    use chrono::TimeZone;

    #[test]
    fn default_weight_follows_method() {
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let obs = FieldObservation::with_default_weight(
            SessionId::new("tab-1").unwrap(),
            FieldKey::header(HeaderField::Voltage),
            "208Y/120V",
            ExtractionMethod::AiVision,
            at,
        );
        assert_eq!(obs.confidence(), ExtractionMethod::AiVision.default_weight());
        assert_eq!(obs.timestamp(), at);
        assert_eq!(obs.value(), &FieldValue::Text("208Y/120V".into()));
        assert_eq!(obs.source(), None);
    }

    #[test]
    fn source_survives_serialization() {
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let obs = FieldObservation::with_default_weight(
            SessionId::new("tab-1").unwrap(),
            FieldKey::header(HeaderField::PanelName),
            "LP-1",
            ExtractionMethod::AiVision,
            at,
        )
        .with_source("IMG_0412.jpg");
        assert_eq!(obs.source(), Some("IMG_0412.jpg"));

        let json = serde_json::to_value(&obs).unwrap();
        assert_eq!(json["source"], "IMG_0412.jpg");
        let back: FieldObservation = serde_json::from_value(json).unwrap();
        assert_eq!(back, obs);
    }
}
