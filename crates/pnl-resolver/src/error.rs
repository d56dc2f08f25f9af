//! Resolver errors

use pnl_model::ModelError;

/// Failures the resolver surfaces to the caller
///
/// Low-confidence and empty observations are not errors; they come back as
/// [`crate::Outcome::Rejected`].
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ResolveError {
    /// Value failed field validation
    #[error("validation failed: {0}")]
    Validation(#[from] ModelError),

    /// Configured weight is unusable
    #[error("invalid weight for {method}: {value}")]
    InvalidWeight {
        /// Method name
        method: String,
        /// Rejected weight
        value: f64,
    },
}

impl ResolveError {
    /// Whether the value itself was refused
    #[inline]
    #[must_use]
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}
