//! Template descriptor
//!
//! A template says which header fields a form requires, how many rows it may
//! carry, and which phase column each row's load is entered under. The
//! column layout repeats every `phase_layout.len()` rows, so a three-phase
//! panel with two rows per bus bar is `[A, A, B, B, C, C]`.
//!
//! The layout places single-pole rows. A multi-pole breaker energizes one
//! distinct phase per pole: its head row takes the layout column and each
//! further row takes the next phase of the layout's rotation.

use crate::circuit::PhaseColumn;
use crate::error::ModelError;
use crate::field::{CircuitAttr, FieldKey, HeaderField};
use crate::schedule::{CircuitBounds, CircuitCount};
use serde::{Deserialize, Serialize};

/// Form layout consumed when a session starts collecting
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TemplateDescriptor {
    /// Template name
    pub name: String,
    /// Fields that must hold a value before the session is ready
    pub mandatory_fields: Vec<FieldKey>,
    /// Row attributes every occupied row must carry
    pub mandatory_row_fields: Vec<CircuitAttr>,
    /// Allowed `number_of_circuits`
    pub circuit_bounds: CircuitBounds,
    /// Repeating phase column pattern, starting at row 1
    pub phase_layout: Vec<PhaseColumn>,
}

impl TemplateDescriptor {
    /// Standard three-phase panelboard form
    #[must_use]
    pub fn three_phase() -> Self {
        Self {
            name: "panelboard-3ph".to_string(),
            mandatory_fields: Self::base_mandatory(),
            mandatory_row_fields: Vec::new(),
            circuit_bounds: CircuitBounds::default(),
            phase_layout: vec![
                PhaseColumn::A,
                PhaseColumn::A,
                PhaseColumn::B,
                PhaseColumn::B,
                PhaseColumn::C,
                PhaseColumn::C,
            ],
        }
    }

    /// Single-phase panelboard form
    #[must_use]
    pub fn single_phase() -> Self {
        Self {
            name: "panelboard-1ph".to_string(),
            phase_layout: vec![
                PhaseColumn::A,
                PhaseColumn::A,
                PhaseColumn::B,
                PhaseColumn::B,
            ],
            ..Self::three_phase()
        }
    }

    /// Build from printed form labels (`"VOLTAGE"`, `"MAIN BUS AMPS"`, ...)
    pub fn from_labels<'a>(
        name: impl Into<String>,
        labels: impl IntoIterator<Item = &'a str>,
    ) -> Result<Self, ModelError> {
        let mandatory_fields = labels
            .into_iter()
            .map(|label| {
                HeaderField::from_label(label)
                    .map(FieldKey::Header)
                    .ok_or_else(|| ModelError::UnknownField(label.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        let template = Self {
            name: name.into(),
            mandatory_fields,
            ..Self::three_phase()
        };
        template.validate()?;
        Ok(template)
    }

    fn base_mandatory() -> Vec<FieldKey> {
        [
            HeaderField::PanelName,
            HeaderField::Voltage,
            HeaderField::Phase,
            HeaderField::Wire,
            HeaderField::NumberOfCircuits,
        ]
        .into_iter()
        .map(FieldKey::Header)
        .collect()
    }

    /// With a different mandatory field list
    #[inline]
    #[must_use]
    pub fn with_mandatory_fields(mut self, fields: Vec<FieldKey>) -> Self {
        self.mandatory_fields = fields;
        self
    }

    /// With required per-row attributes
    #[inline]
    #[must_use]
    pub fn with_mandatory_row_fields(mut self, attrs: Vec<CircuitAttr>) -> Self {
        self.mandatory_row_fields = attrs;
        self
    }

    /// With different circuit bounds
    #[inline]
    #[must_use]
    pub fn with_circuit_bounds(mut self, bounds: CircuitBounds) -> Self {
        self.circuit_bounds = bounds;
        self
    }

    /// Check internal consistency
    pub fn validate(&self) -> Result<(), ModelError> {
        let CircuitBounds { min, max } = self.circuit_bounds;
        if min == 0 || min > max {
            return Err(ModelError::InvalidTemplate(format!(
                "circuit bounds [{min}, {max}] are empty"
            )));
        }
        if min % 2 != 0 || max % 2 != 0 {
            return Err(ModelError::InvalidTemplate(format!(
                "circuit bounds [{min}, {max}] must be even"
            )));
        }
        if self.phase_layout.is_empty() {
            return Err(ModelError::InvalidTemplate(
                "phase layout must name at least one column".to_string(),
            ));
        }
        Ok(())
    }

    /// Mandatory keys, always including `number_of_circuits`, without duplicates
    #[must_use]
    pub fn mandatory_keys(&self) -> Vec<FieldKey> {
        let mut keys: Vec<FieldKey> = Vec::with_capacity(self.mandatory_fields.len() + 1);
        let count = FieldKey::Header(HeaderField::NumberOfCircuits);
        for key in self.mandatory_fields.iter().copied().chain(std::iter::once(count)) {
            if !keys.contains(&key) {
                keys.push(key);
            }
        }
        keys
    }

    /// Phase column of a row
    #[must_use]
    pub fn phase_column_for(&self, circuit: u8) -> PhaseColumn {
        if self.phase_layout.is_empty() {
            return PhaseColumn::A;
        }
        let index = usize::from(circuit.saturating_sub(1)) % self.phase_layout.len();
        self.phase_layout[index]
    }

    /// Distinct phases of the layout, in order of first appearance
    #[must_use]
    pub fn phase_rotation(&self) -> Vec<PhaseColumn> {
        let mut rotation = Vec::with_capacity(3);
        for column in &self.phase_layout {
            if !rotation.contains(column) {
                rotation.push(*column);
            }
        }
        if rotation.is_empty() {
            rotation.push(PhaseColumn::A);
        }
        rotation
    }

    /// Phase column of each row of a group of `pole_count` rows at `start`
    ///
    /// Rows cycle through [`Self::phase_rotation`] from the head row's
    /// column, so a group never puts two poles on one phase unless it has
    /// more poles than the layout has phases.
    #[must_use]
    pub fn group_phase_columns(&self, start: u8, pole_count: u8) -> Vec<PhaseColumn> {
        let rotation = self.phase_rotation();
        let head = self.phase_column_for(start);
        let offset = rotation.iter().position(|c| *c == head).unwrap_or(0);
        (0..usize::from(pole_count))
            .map(|i| rotation[(offset + i) % rotation.len()])
            .collect()
    }

    /// Validate a row count against this template's bounds
    pub fn circuit_count(&self, n: i64) -> Result<CircuitCount, ModelError> {
        CircuitCount::with_bounds(n, self.circuit_bounds)
    }
}

impl Default for TemplateDescriptor {
    fn default() -> Self {
        Self::three_phase()
    }
}
