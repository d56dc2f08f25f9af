//! Extraction methods and confidence values

use crate::error::ModelError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Provenance of an observation
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionMethod {
    /// Vision model reading an uploaded image
    AiVision,
    /// Value typed or dictated by the user
    Manual,
    /// Vision model falling back to OCR text
    AiOcrFallback,
    /// Plain OCR text scan
    TextOcr,
}

impl ExtractionMethod {
    /// All methods, highest default weight first
    pub const ALL: [Self; 4] = [Self::AiVision, Self::Manual, Self::AiOcrFallback, Self::TextOcr];

    /// Stable identifier
    #[inline]
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AiVision => "ai_vision",
            Self::Manual => "manual",
            Self::AiOcrFallback => "ai_ocr_fallback",
            Self::TextOcr => "text_ocr",
        }
    }

    /// Built-in reliability weight for this method
    #[inline]
    #[must_use]
    pub const fn default_weight(self) -> Confidence {
        match self {
            Self::AiVision => Confidence(0.85),
            Self::Manual | Self::AiOcrFallback => Confidence(0.70),
            Self::TextOcr => Confidence(0.60),
        }
    }
}

impl fmt::Display for ExtractionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExtractionMethod {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "ai_vision" | "vision" => Ok(Self::AiVision),
            "manual" | "user" => Ok(Self::Manual),
            "ai_ocr_fallback" | "ocr_fallback" => Ok(Self::AiOcrFallback),
            "text_ocr" | "ocr" => Ok(Self::TextOcr),
            _ => Err(ModelError::UnknownMethod(s.to_string())),
        }
    }
}

/// Confidence score in `[0, 1]`
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct Confidence(f64);

impl Confidence {
    /// No confidence
    pub const ZERO: Self = Self(0.0);
    /// Full confidence
    pub const ONE: Self = Self(1.0);

    /// Validate a raw score
    pub fn new(value: f64) -> Result<Self, ModelError> {
        if value.is_finite() && (0.0..=1.0).contains(&value) {
            // folds -0.0 into 0.0
            Ok(Self(value + 0.0))
        } else {
            Err(ModelError::InvalidConfidence(value))
        }
    }

    /// Raw score
    #[inline]
    #[must_use]
    pub const fn value(self) -> f64 {
        self.0
    }

    /// Scale by a factor, clamped back into range
    #[inline]
    #[must_use]
    pub fn scaled(self, factor: f64) -> Self {
        Self((self.0 * factor).clamp(0.0, 1.0))
    }
}

impl TryFrom<f64> for Confidence {
    type Error = ModelError;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Confidence> for f64 {
    fn from(c: Confidence) -> Self {
        c.0
    }
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}
