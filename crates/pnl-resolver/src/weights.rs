//! Method weight table

use crate::error::ResolveError;
use pnl_model::{Confidence, ExtractionMethod};
use std::collections::HashMap;

/// Reliability ceiling per extraction method
///
/// Methods without an explicit entry fall back to their built-in weight.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MethodWeights {
    overrides: HashMap<ExtractionMethod, Confidence>,
}

impl MethodWeights {
    /// Table with built-in weights only
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Override one method's weight
    #[inline]
    #[must_use]
    pub fn with_weight(mut self, method: ExtractionMethod, weight: Confidence) -> Self {
        self.overrides.insert(method, weight);
        self
    }

    /// Override from a raw score, validating it
    pub fn try_with_weight(self, method: ExtractionMethod, weight: f64) -> Result<Self, ResolveError> {
        let weight = Confidence::new(weight).map_err(|_| ResolveError::InvalidWeight {
            method: method.to_string(),
            value: weight,
        })?;
        Ok(self.with_weight(method, weight))
    }

    /// Effective weight of a method
    #[inline]
    #[must_use]
    pub fn weight(&self, method: ExtractionMethod) -> Confidence {
        self.overrides
            .get(&method)
            .copied()
            .unwrap_or_else(|| method.default_weight())
    }

    /// Confidence an observation is credited with: its own score, capped at its method's weight
    ///
    /// A reading reported below its method's weight competes at that lower
    /// score, so it can lose to a lower-tier method at full weight.
    #[inline]
    #[must_use]
    pub fn effective(&self, method: ExtractionMethod, reported: Confidence) -> Confidence {
        let ceiling = self.weight(method);
        if reported < ceiling {
            reported
        } else {
            ceiling
        }
    }

    /// All methods with their effective weights
    #[must_use]
    pub fn table(&self) -> Vec<(ExtractionMethod, Confidence)> {
        ExtractionMethod::ALL
            .into_iter()
            .map(|m| (m, self.weight(m)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_method_table() {
        let w = MethodWeights::new();
        assert!((w.weight(ExtractionMethod::AiVision).value() - 0.85).abs() < f64::EPSILON);
        assert!((w.weight(ExtractionMethod::Manual).value() - 0.70).abs() < f64::EPSILON);
        assert!((w.weight(ExtractionMethod::TextOcr).value() - 0.60).abs() < f64::EPSILON);
    }

    #[test]
    fn override_replaces_single_method() {
        let w = MethodWeights::new().try_with_weight(ExtractionMethod::Manual, 0.95).unwrap();
        assert!((w.weight(ExtractionMethod::Manual).value() - 0.95).abs() < f64::EPSILON);
        assert_eq!(
            w.weight(ExtractionMethod::AiVision),
            ExtractionMethod::AiVision.default_weight()
        );
    }

    #[test]
    fn override_rejects_out_of_range() {
        assert!(matches!(
            MethodWeights::new().try_with_weight(ExtractionMethod::TextOcr, 1.2),
            Err(ResolveError::InvalidWeight { .. })
        ));
    }

    #[test]
    fn reported_confidence_is_capped() {
        let w = MethodWeights::new();
        let high = Confidence::new(0.99).unwrap();
        let low = Confidence::new(0.40).unwrap();
        assert_eq!(w.effective(ExtractionMethod::TextOcr, high), w.weight(ExtractionMethod::TextOcr));
        assert_eq!(w.effective(ExtractionMethod::AiVision, low), low);
    }
}
