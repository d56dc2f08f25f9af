//! PNL Resolver
//!
//! Merges field observations from several extraction sources into one
//! per-session [`ParameterStore`].
//!
//! # Resolution Rule
//!
//! A candidate replaces the stored value when the field is absent, when its
//! confidence is strictly higher, or when it ties on confidence but is newer
//! and carries a different value (a same-tier correction). Everything else is
//! rejected with [`RejectReason::LowerOrEqualConfidence`] and only recorded in
//! the [`AuditTrail`].
//!
//! The rule is a [`ResolutionPolicy`]; [`MonotonicConfidence`] is the default.
//!
//! # Example
//!
//! ```rust
//! use chrono::Utc;
//! use pnl_model::{ExtractionMethod, FieldKey, FieldObservation, HeaderField, SessionId, TemplateDescriptor};
//! use pnl_resolver::{AuditTrail, ConfidenceResolver, ParameterStore};
//!
//! let resolver = ConfidenceResolver::new();
//! let template = TemplateDescriptor::three_phase();
//! let mut store = ParameterStore::new();
//! let mut audit = AuditTrail::with_capacity(64);
//!
//! let obs = FieldObservation::with_default_weight(
//!     SessionId::new("tab-1").unwrap(),
//!     FieldKey::header(HeaderField::Voltage),
//!     "208y/120v",
//!     ExtractionMethod::Manual,
//!     Utc::now(),
//! );
//! let outcome = resolver.observe(&mut store, &mut audit, &template, &obs).unwrap();
//! assert!(outcome.is_accepted());
//! ```

#![warn(unreachable_pub)]

mod audit;
mod error;
mod policy;
mod resolver;
mod store;
mod weights;

pub use audit::{AuditEntry, AuditOutcome, AuditTrail, Conflict, CONFLICT_FLOOR, CONFLICT_RATIO};
pub use error::ResolveError;
pub use policy::{AcceptKind, Candidate, Decision, MonotonicConfidence, RejectReason, ResolutionPolicy};
pub use resolver::{ConfidenceResolver, Outcome};
pub use store::ParameterStore;
pub use weights::MethodWeights;

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
