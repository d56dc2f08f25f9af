//! Panel schedule and circuit count

use crate::circuit::{Circuit, PolePosition};
use crate::error::ModelError;
use crate::field::HeaderField;
use crate::value::FieldValue;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Inclusive bounds on the number of circuit rows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircuitBounds {
    /// Smallest panel
    pub min: u8,
    /// Largest panel
    pub max: u8,
}

impl CircuitBounds {
    /// Create bounds
    #[inline]
    #[must_use]
    pub const fn new(min: u8, max: u8) -> Self {
        Self { min, max }
    }
}

impl Default for CircuitBounds {
    fn default() -> Self {
        Self { min: 18, max: 84 }
    }
}

/// Validated number of circuit rows: even and within bounds
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CircuitCount(u8);

impl CircuitCount {
    /// Validate against the default `[18, 84]` bounds
    pub fn new(n: i64) -> Result<Self, ModelError> {
        Self::with_bounds(n, CircuitBounds::default())
    }

    /// Validate against explicit bounds
    pub fn with_bounds(n: i64, bounds: CircuitBounds) -> Result<Self, ModelError> {
        if n < i64::from(bounds.min) || n > i64::from(bounds.max) {
            return Err(ModelError::CircuitCountOutOfRange {
                value: n,
                min: bounds.min,
                max: bounds.max,
            });
        }
        if n % 2 != 0 {
            return Err(ModelError::OddCircuitCount(n));
        }
        u8::try_from(n)
            .map(Self)
            .map_err(|_| ModelError::CircuitCountOutOfRange {
                value: n,
                min: bounds.min,
                max: bounds.max,
            })
    }

    /// Row count
    #[inline]
    #[must_use]
    pub const fn get(self) -> u8 {
        self.0
    }
}

impl fmt::Display for CircuitCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Fully assembled schedule, frozen for export
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PanelSchedule {
    /// Panel designation
    pub panel_name: String,
    /// System voltage
    pub voltage: String,
    /// `1PH` / `3PH`
    pub phase: String,
    /// Wire count
    pub wire: String,
    /// Row count
    pub number_of_circuits: CircuitCount,
    /// Remaining header parameters that were captured
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub header: BTreeMap<HeaderField, FieldValue>,
    /// Breaker groups in row order
    pub circuits: Vec<Circuit>,
}

impl PanelSchedule {
    /// Breaker group covering a row
    #[must_use]
    pub fn circuit_at(&self, row: u8) -> Option<&Circuit> {
        self.circuits.iter().find(|c| c.rows().contains(&row))
    }

    /// Pole position of a row
    #[must_use]
    pub fn row(&self, row: u8) -> Option<&PolePosition> {
        self.circuit_at(row)
            .and_then(|c| c.poles.iter().find(|p| p.circuit_number == row))
    }

    /// Connected load across all rows
    #[must_use]
    pub fn total_load_amps(&self) -> f64 {
        self.circuits.iter().map(Circuit::total_load_amps).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn circuit_count_accepts_bounds() {
        assert_eq!(CircuitCount::new(18).unwrap().get(), 18);
        assert_eq!(CircuitCount::new(84).unwrap().get(), 84);
        assert_eq!(CircuitCount::new(42).unwrap().get(), 42);
    }

    #[test]
    fn circuit_count_rejects_odd() {
        assert_eq!(CircuitCount::new(41), Err(ModelError::OddCircuitCount(41)));
    }

    #[test]
    fn circuit_count_rejects_out_of_range() {
        for n in [17, 85, 0, -2, 300] {
            assert!(
                matches!(CircuitCount::new(n), Err(ModelError::CircuitCountOutOfRange { .. })),
                "{n} should be out of range"
            );
        }
    }

    #[test]
    fn custom_bounds() {
        let bounds = CircuitBounds::new(2, 12);
        assert!(CircuitCount::with_bounds(12, bounds).is_ok());
        assert!(CircuitCount::with_bounds(14, bounds).is_err());
    }
}
