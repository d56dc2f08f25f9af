//! Parameter store
//!
//! One per session. Holds the current best record for every field that has
//! received an accepted observation, plus the session's arrival counter.

use pnl_model::{CircuitAttr, FieldKey, FieldValue, HeaderField, ParameterRecord};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Field → current best record
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParameterStore {
    records: BTreeMap<FieldKey, ParameterRecord>,
    next_sequence: u64,
}

impl ParameterStore {
    /// Create an empty store
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record for a field
    #[inline]
    #[must_use]
    pub fn get(&self, key: &FieldKey) -> Option<&ParameterRecord> {
        self.records.get(key)
    }

    /// Current value of a field
    #[inline]
    #[must_use]
    pub fn value(&self, key: &FieldKey) -> Option<&FieldValue> {
        self.records.get(key).map(|r| &r.current_value)
    }

    /// Current value of a header field
    #[inline]
    #[must_use]
    pub fn header(&self, field: HeaderField) -> Option<&FieldValue> {
        self.value(&FieldKey::Header(field))
    }

    /// Current value of one circuit attribute
    #[inline]
    #[must_use]
    pub fn circuit(&self, circuit: u8, attr: CircuitAttr) -> Option<&FieldValue> {
        self.value(&FieldKey::circuit(circuit, attr))
    }

    /// Accepted `number_of_circuits`, if any
    #[must_use]
    pub fn number_of_circuits(&self) -> Option<u8> {
        self.header(HeaderField::NumberOfCircuits)
            .and_then(FieldValue::as_number)
            .and_then(|n| {
                #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                let n = n as u8;
                (n > 0).then_some(n)
            })
    }

    /// Whether a field holds a value
    #[inline]
    #[must_use]
    pub fn contains(&self, key: &FieldKey) -> bool {
        self.records.contains_key(key)
    }

    /// Keys from `required` that hold no value, in the given order
    #[must_use]
    pub fn missing<'a>(&self, required: impl IntoIterator<Item = &'a FieldKey>) -> Vec<FieldKey> {
        required
            .into_iter()
            .filter(|k| !self.records.contains_key(k))
            .copied()
            .collect()
    }

    /// Records in field order
    pub fn iter(&self) -> impl Iterator<Item = &ParameterRecord> {
        self.records.values()
    }

    /// Circuit records in row order
    pub fn circuit_records(&self) -> impl Iterator<Item = &ParameterRecord> {
        self.records
            .values()
            .filter(|r| r.field_key.circuit_number().is_some())
    }

    /// Fields whose current value came from a known upload, with that upload
    pub fn sources(&self) -> impl Iterator<Item = (FieldKey, &str)> {
        self.records
            .values()
            .filter_map(|r| r.source.as_deref().map(|s| (r.field_key, s)))
    }

    /// Number of fields held
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether nothing has been accepted
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Drop every record
    pub fn clear(&mut self) {
        self.records.clear();
    }

    /// Arrival number of the next observation
    pub(crate) fn next_sequence(&mut self) -> u64 {
        let seq = self.next_sequence;
        self.next_sequence += 1;
        seq
    }

    pub(crate) fn put(&mut self, record: ParameterRecord) {
        self.records.insert(record.field_key, record);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use pnl_model::{Confidence, ExtractionMethod};

    fn put(store: &mut ParameterStore, key: FieldKey, value: FieldValue) {
        let sequence = store.next_sequence();
        store.put(ParameterRecord {
            field_key: key,
            current_value: value,
            current_confidence: Confidence::ONE,
            current_method: ExtractionMethod::Manual,
            last_modified: Utc::now(),
            sequence,
            source: None,
        });
    }

    #[test]
    fn missing_preserves_requested_order() {
        let mut store = ParameterStore::new();
        put(&mut store, FieldKey::header(HeaderField::Phase), "3PH".into());
        let required = [
            FieldKey::header(HeaderField::Voltage),
            FieldKey::header(HeaderField::Phase),
            FieldKey::header(HeaderField::NumberOfCircuits),
        ];
        assert_eq!(
            store.missing(&required),
            [required[0], required[2]]
        );
    }

    #[test]
    fn number_of_circuits_reads_numeric_header() {
        let mut store = ParameterStore::new();
        assert_eq!(store.number_of_circuits(), None);
        put(&mut store, FieldKey::header(HeaderField::NumberOfCircuits), FieldValue::Number(42.0));
        assert_eq!(store.number_of_circuits(), Some(42));
    }

    #[test]
    fn sequence_survives_clear() {
        let mut store = ParameterStore::new();
        put(&mut store, FieldKey::header(HeaderField::Wire), "4".into());
        store.clear();
        assert!(store.is_empty());
        assert_eq!(store.next_sequence(), 1);
    }

    #[test]
    fn serializes_with_dotted_keys() {
        let mut store = ParameterStore::new();
        put(&mut store, FieldKey::circuit(5, CircuitAttr::LoadAmps), FieldValue::Number(12.0));
        let json = serde_json::to_value(&store).unwrap();
        assert!(json["records"].get("circuit.5.load_amps").is_some());
        let back: ParameterStore = serde_json::from_value(json).unwrap();
        assert_eq!(back, store);
    }
}
