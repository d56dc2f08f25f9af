//! Field values and load classifications

use crate::error::ModelError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Load classification of one circuit row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LoadType {
    /// Lighting
    #[serde(rename = "LTG")]
    Lighting,
    /// Receptacle
    #[serde(rename = "RCP")]
    Receptacle,
    /// Motor
    #[serde(rename = "MTR")]
    Motor,
    /// Continuous
    #[serde(rename = "C")]
    Continuous,
    /// Non-continuous
    #[serde(rename = "NC")]
    NonContinuous,
    /// Sentinel for rows without a load
    #[serde(rename = "NA")]
    NotApplicable,
}

impl LoadType {
    /// Types a row with a load may carry
    pub const ASSIGNABLE: [Self; 5] = [
        Self::Lighting,
        Self::Receptacle,
        Self::Motor,
        Self::Continuous,
        Self::NonContinuous,
    ];

    /// Form designator
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Lighting => "LTG",
            Self::Receptacle => "RCP",
            Self::Motor => "MTR",
            Self::Continuous => "C",
            Self::NonContinuous => "NC",
            Self::NotApplicable => "NA",
        }
    }

    /// Whether this is a real classification rather than the sentinel
    #[inline]
    #[must_use]
    pub const fn is_assigned(self) -> bool {
        !matches!(self, Self::NotApplicable)
    }
}

impl fmt::Display for LoadType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LoadType {
    type Err = ModelError;

    /// Parses the five assignable designators; the `NA` sentinel is not an input.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_uppercase();
        Self::ASSIGNABLE
            .into_iter()
            .find(|t| t.as_str() == wanted)
            .ok_or_else(|| ModelError::InvalidLoadType(s.to_string()))
    }
}

/// Value carried by an observation or stored record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    /// Numeric quantity (amps, counts, poles)
    Number(f64),
    /// Free or designator text
    Text(String),
}

impl FieldValue {
    /// Text content, if textual
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            Self::Number(_) => None,
        }
    }

    /// Numeric content, if numeric
    #[must_use]
    pub const fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            Self::Text(_) => None,
        }
    }

    /// Whether the value is blank text
    #[must_use]
    pub fn is_blank(&self) -> bool {
        matches!(self, Self::Text(s) if s.trim().is_empty())
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => write!(f, "{n:.0}"),
            Self::Number(n) => write!(f, "{n}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<f64> for FieldValue {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<u32> for FieldValue {
    fn from(n: u32) -> Self {
        Self::Number(f64::from(n))
    }
}

impl From<LoadType> for FieldValue {
    fn from(t: LoadType) -> Self {
        Self::Text(t.as_str().to_string())
    }
}
