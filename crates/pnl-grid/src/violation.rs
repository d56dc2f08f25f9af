//! Structural violations

use pnl_model::CircuitAttr;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Structural problem found in a grid
///
/// Violations are reported, never fixed: the grid keeps whatever the store
/// says and lets the caller decide.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Violation {
    /// Occupied row lacks a field the template requires
    UnfilledRow {
        /// Row
        circuit: u8,
        /// Missing attribute
        attr: CircuitAttr,
    },
    /// Two circuits claim the same row
    DuplicateCircuit {
        /// Row claimed twice
        circuit: u8,
    },
    /// Declared pole count disagrees with the rows actually available
    PoleCountMismatch {
        /// First row of the group
        circuit: u8,
        /// Declared poles
        declared: u8,
        /// Rows the group could occupy
        occupied: u8,
    },
    /// Row has a load but no load type
    MissingLoadType {
        /// Row
        circuit: u8,
    },
    /// Row has a load type but no load
    LoadTypeWithoutLoad {
        /// Row
        circuit: u8,
    },
    /// Data captured for a row past the last circuit
    CircuitOutOfRange {
        /// Row
        circuit: u8,
        /// Rows in the panel
        number_of_circuits: u8,
    },
    /// Breaker-level field found on a non-first row of a group
    HeadFieldOnContinuation {
        /// Row carrying the field
        circuit: u8,
        /// Misplaced attribute
        attr: CircuitAttr,
        /// First row of the group
        group_start: u8,
    },
}

impl Violation {
    /// Row the violation is reported on
    #[must_use]
    pub const fn circuit(&self) -> u8 {
        match self {
            Self::UnfilledRow { circuit, .. }
            | Self::DuplicateCircuit { circuit }
            | Self::PoleCountMismatch { circuit, .. }
            | Self::MissingLoadType { circuit }
            | Self::LoadTypeWithoutLoad { circuit }
            | Self::CircuitOutOfRange { circuit, .. }
            | Self::HeadFieldOnContinuation { circuit, .. } => *circuit,
        }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnfilledRow { circuit, attr } => {
                write!(f, "circuit {circuit}: missing {attr}")
            }
            Self::DuplicateCircuit { circuit } => {
                write!(f, "circuit {circuit}: claimed more than once")
            }
            Self::PoleCountMismatch {
                circuit,
                declared,
                occupied,
            } => write!(
                f,
                "circuit {circuit}: {declared}-pole breaker but only {occupied} row(s) available"
            ),
            Self::MissingLoadType { circuit } => {
                write!(f, "circuit {circuit}: load_amps without load_type")
            }
            Self::LoadTypeWithoutLoad { circuit } => {
                write!(f, "circuit {circuit}: load_type without load_amps")
            }
            Self::CircuitOutOfRange {
                circuit,
                number_of_circuits,
            } => write!(f, "circuit {circuit}: beyond {number_of_circuits} circuits"),
            Self::HeadFieldOnContinuation {
                circuit,
                attr,
                group_start,
            } => write!(
                f,
                "circuit {circuit}: {attr} belongs on circuit {group_start}, the first pole"
            ),
        }
    }
}
