//! Grid errors

use pnl_model::ModelError;

/// Placement failures
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GridError {
    /// Group would run past the last row
    #[error("{pole_count}-pole group at circuit {start} exceeds {number_of_circuits} circuits")]
    InvalidPoleSpan {
        /// First row requested
        start: u8,
        /// Rows requested
        pole_count: u8,
        /// Rows in the panel
        number_of_circuits: u8,
    },

    /// Group would claim a row another group holds
    #[error("group at circuit {start} overlaps group at circuit {existing_start}")]
    Overlap {
        /// First row requested
        start: u8,
        /// First row of the group already holding the row
        existing_start: u8,
    },

    /// Pole count outside 1..=3
    #[error("pole count must be 1..=3, got {0}")]
    InvalidPoleCount(u8),

    /// Row outside the panel
    #[error("circuit {circuit} outside 1..={number_of_circuits}")]
    RowOutOfRange {
        /// Requested row
        circuit: u8,
        /// Rows in the panel
        number_of_circuits: u8,
    },

    /// Grid needs `number_of_circuits` before it can exist
    #[error("number_of_circuits has not been captured")]
    MissingCircuitCount,

    /// Underlying model validation failed
    #[error(transparent)]
    Model(#[from] ModelError),
}
