//! Circuits and pole positions

use crate::error::ModelError;
use crate::value::{FieldValue, LoadType};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::RangeInclusive;

/// Largest breaker a single group may span
pub const MAX_POLES: u8 = 3;

/// Physical phase column a row's load is entered under
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PhaseColumn {
    /// Phase A
    A,
    /// Phase B
    B,
    /// Phase C
    C,
}

impl fmt::Display for PhaseColumn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::A => "A",
            Self::B => "B",
            Self::C => "C",
        };
        f.write_str(s)
    }
}

/// One row of a pole group
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolePosition {
    /// Row number
    pub circuit_number: u8,
    /// Column the row's load lands in
    pub phase_column: PhaseColumn,
    /// Load on this row
    pub load_amps: Option<f64>,
    /// Classification; [`LoadType::NotApplicable`] when no load
    pub load_type: LoadType,
}

/// One breaker and the rows it occupies
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Circuit {
    /// First row of the group
    pub circuit_number: u8,
    /// Rows spanned
    pub pole_count: u8,
    /// Load description
    pub description: Option<String>,
    /// Breaker trip rating
    pub breaker_amps: Option<f64>,
    /// Rows in order, one per pole
    pub poles: Vec<PolePosition>,
}

impl Circuit {
    /// Rows covered by this breaker
    #[inline]
    #[must_use]
    pub fn rows(&self) -> RangeInclusive<u8> {
        self.circuit_number..=self.circuit_number + self.pole_count.saturating_sub(1)
    }

    /// Sum of per-row loads
    #[must_use]
    pub fn total_load_amps(&self) -> f64 {
        self.poles.iter().filter_map(|p| p.load_amps).sum()
    }

    /// Whether the group holds nothing beyond its layout
    #[must_use]
    pub fn is_spare(&self) -> bool {
        self.description.is_none()
            && self.breaker_amps.is_none()
            && self.poles.iter().all(|p| p.load_amps.is_none())
    }
}

/// Interpret a value as a pole count in `1..=MAX_POLES`
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn validate_pole_count(value: &FieldValue) -> Result<u8, ModelError> {
    let raw = match value {
        FieldValue::Number(n) => *n,
        FieldValue::Text(s) => s
            .trim()
            .trim_end_matches(|c: char| c.is_ascii_alphabetic())
            .trim()
            .parse::<f64>()
            .map_err(|_| ModelError::InvalidPoleCount(s.clone()))?,
    };
    if raw.fract() != 0.0 || !(1.0..=f64::from(MAX_POLES)).contains(&raw) {
        return Err(ModelError::InvalidPoleCount(value.to_string()));
    }
    Ok(raw as u8)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn group(start: u8, poles: u8) -> Circuit {
        Circuit {
            circuit_number: start,
            pole_count: poles,
            description: None,
            breaker_amps: None,
            poles: (start..start + poles)
                .map(|row| PolePosition {
                    circuit_number: row,
                    phase_column: PhaseColumn::A,
                    load_amps: None,
                    load_type: LoadType::NotApplicable,
                })
                .collect(),
        }
    }

    #[test]
    fn rows_span_pole_count() {
        assert_eq!(group(5, 2).rows(), 5..=6);
        assert_eq!(group(1, 1).rows(), 1..=1);
    }

    #[test]
    fn spare_until_loaded() {
        let mut c = group(3, 2);
        assert!(c.is_spare());
        c.poles[1].load_amps = Some(8.0);
        assert!(!c.is_spare());
        assert!((c.total_load_amps() - 8.0).abs() < f64::EPSILON);
    }

    #[test]
    fn pole_count_bounds() {
        assert_eq!(validate_pole_count(&FieldValue::Number(2.0)).unwrap(), 2);
        assert_eq!(validate_pole_count(&"3P".into()).unwrap(), 3);
        assert!(validate_pole_count(&FieldValue::Number(0.0)).is_err());
        assert!(validate_pole_count(&FieldValue::Number(4.0)).is_err());
        assert!(validate_pole_count(&FieldValue::Number(1.5)).is_err());
        assert!(validate_pole_count(&"two".into()).is_err());
    }
}
