//! PNL Model
//!
//! Typed vocabulary for panel schedule extraction.
//!
//! # Core Concepts
//!
//! - [`FieldKey`]: Canonical identifier of one schedule parameter (header or per-circuit)
//! - [`FieldObservation`]: Immutable value report from one extraction source
//! - [`ParameterRecord`]: The currently retained value for a field
//! - [`Circuit`] / [`PolePosition`]: Breaker groups and the rows they occupy
//! - [`TemplateDescriptor`]: Mandatory fields, circuit bounds and phase rotation of a form
//! - [`PanelSchedule`]: Frozen, fully assembled schedule handed to export
//!
//! # Example
//!
//! ```rust
//! use pnl_model::{CircuitAttr, FieldKey, HeaderField, TemplateDescriptor};
//!
//! let key: FieldKey = "circuit.5.load_amps".parse().unwrap();
//! assert_eq!(key, FieldKey::circuit(5, CircuitAttr::LoadAmps));
//! assert_eq!(FieldKey::header(HeaderField::Voltage).to_string(), "voltage");
//!
//! let template = TemplateDescriptor::three_phase();
//! assert!(template.circuit_count(42).is_ok());
//! assert!(template.circuit_count(41).is_err());
//! ```

#![warn(unreachable_pub)]

mod circuit;
mod error;
mod field;
mod ids;
mod method;
mod normalize;
mod observation;
mod schedule;
mod template;
mod value;

pub use circuit::{validate_pole_count, Circuit, PhaseColumn, PolePosition, MAX_POLES};
pub use error::ModelError;
pub use field::{CircuitAttr, FieldKey, HeaderField};
pub use ids::{SessionId, TaskId};
pub use method::{Confidence, ExtractionMethod};
pub use normalize::{
    normalize_main_breaker, normalize_phase, normalize_value, parse_amps, DESCRIPTION_MAX_LEN,
};
pub use observation::{FieldObservation, ParameterRecord};
pub use schedule::{CircuitBounds, CircuitCount, PanelSchedule};
pub use template::TemplateDescriptor;
pub use value::{FieldValue, LoadType};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
