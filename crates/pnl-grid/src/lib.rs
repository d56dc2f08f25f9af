//! PNL Grid
//!
//! Circuit grid model for a panel schedule.
//!
//! A panel has `number_of_circuits` rows. A breaker occupies one to three
//! contiguous rows (a pole group). Breaker-level fields (description, pole
//! count, trip rating) live on the first row of the group only; load fields
//! live on every row, each under the phase column the template assigns to
//! that row.
//!
//! - [`CircuitGrid::place_group`]: claim rows for a breaker
//! - [`CircuitGrid::from_store`]: derive the grid from a session's store
//! - [`CircuitGrid::validate`]: structural [`Violation`]s
//! - [`CircuitGrid::circuits`]: project to [`pnl_model::Circuit`] records

#![warn(unreachable_pub)]

mod error;
mod grid;
mod violation;

pub use error::GridError;
pub use grid::{CircuitGrid, GroupFields, PoleGroup, RowLoad};
pub use violation::Violation;
