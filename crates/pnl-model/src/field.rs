//! Field keys
//!
//! Every tracked schedule parameter has one canonical key. Header fields are
//! addressed by a short snake-case name (`voltage`), circuit fields by row and
//! attribute (`circuit.5.load_amps`). Keys order header-first, then by circuit
//! number, so a `BTreeMap<FieldKey, _>` lists a schedule top to bottom.

use crate::error::ModelError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Panel header parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HeaderField {
    /// Panel designation
    PanelName,
    /// System voltage (e.g. `208Y/120V`)
    Voltage,
    /// `1PH` or `3PH`
    Phase,
    /// Number of wires
    Wire,
    /// Bus rating
    MainBusAmps,
    /// Main breaker rating or `MLO`
    MainBreaker,
    /// Surface / flush
    Mounting,
    /// Top / bottom feed
    Feed,
    /// Feed-through lugs present
    FeedThruLugs,
    /// Installed location
    Location,
    /// Upstream source
    FedFrom,
    /// Listed equipment short-circuit rating
    ShortCircuitRating,
    /// Maximum available fault current
    MaxAvailableFaultCurrent,
    /// Phase conductor size
    PhaseConductor,
    /// Neutral conductor size
    NeutralConductor,
    /// Ground conductor size
    GroundConductor,
    /// Number of circuit rows
    NumberOfCircuits,
}

impl HeaderField {
    /// Every header field in form order
    pub const ALL: [Self; 17] = [
        Self::PanelName,
        Self::Voltage,
        Self::Phase,
        Self::Wire,
        Self::MainBusAmps,
        Self::MainBreaker,
        Self::Mounting,
        Self::Feed,
        Self::FeedThruLugs,
        Self::Location,
        Self::FedFrom,
        Self::ShortCircuitRating,
        Self::MaxAvailableFaultCurrent,
        Self::PhaseConductor,
        Self::NeutralConductor,
        Self::GroundConductor,
        Self::NumberOfCircuits,
    ];

    /// Canonical key
    #[must_use]
    pub const fn key(self) -> &'static str {
        match self {
            Self::PanelName => "panel_name",
            Self::Voltage => "voltage",
            Self::Phase => "phase",
            Self::Wire => "wire",
            Self::MainBusAmps => "main_bus_amps",
            Self::MainBreaker => "main_breaker",
            Self::Mounting => "mounting",
            Self::Feed => "feed",
            Self::FeedThruLugs => "feed_thru_lugs",
            Self::Location => "location",
            Self::FedFrom => "fed_from",
            Self::ShortCircuitRating => "short_circuit_rating",
            Self::MaxAvailableFaultCurrent => "max_available_fault_current",
            Self::PhaseConductor => "phase_conductor",
            Self::NeutralConductor => "neutral_conductor",
            Self::GroundConductor => "ground_conductor",
            Self::NumberOfCircuits => "number_of_circuits",
        }
    }

    /// Label printed on the schedule form
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::PanelName => "PANEL",
            Self::Voltage => "VOLTAGE",
            Self::Phase => "PHASE",
            Self::Wire => "WIRE",
            Self::MainBusAmps => "MAIN BUS AMPS",
            Self::MainBreaker => "MAIN CIRCUIT BREAKER",
            Self::Mounting => "MOUNTING",
            Self::Feed => "FEED",
            Self::FeedThruLugs => "FEED-THRU LUGS",
            Self::Location => "LOCATION",
            Self::FedFrom => "FED FROM",
            Self::ShortCircuitRating => "UL LISTED EQUIPMENT SHORT CIRCUIT RATING",
            Self::MaxAvailableFaultCurrent => "MAXIMUM AVAILABLE SHORT CIRCUIT CURRENT",
            Self::PhaseConductor => "PHASE CONDUCTOR",
            Self::NeutralConductor => "NEUTRAL CONDUCTOR",
            Self::GroundConductor => "GROUND CONDUCTOR",
            Self::NumberOfCircuits => "NUMBER OF CIRCUITS",
        }
    }

    /// Whether the value is a numeric quantity rather than free text
    #[must_use]
    pub const fn is_numeric(self) -> bool {
        matches!(self, Self::MainBusAmps | Self::NumberOfCircuits)
    }

    /// Look up by canonical key
    #[must_use]
    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|h| h.key() == key)
    }

    /// Look up by form label, ignoring case, surrounding space and a trailing colon
    #[must_use]
    pub fn from_label(label: &str) -> Option<Self> {
        let wanted = label.trim().trim_end_matches(':').trim().to_uppercase();
        Self::ALL.into_iter().find(|h| h.label() == wanted)
    }
}

impl fmt::Display for HeaderField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Per-circuit attributes
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitAttr {
    /// Load description
    Description,
    /// Breaker pole count (1..=3)
    BreakerPoles,
    /// Breaker trip rating
    BreakerAmps,
    /// Load on this row's phase
    LoadAmps,
    /// Load classification for this row
    LoadType,
}

impl CircuitAttr {
    /// Every attribute
    pub const ALL: [Self; 5] = [
        Self::Description,
        Self::BreakerPoles,
        Self::BreakerAmps,
        Self::LoadAmps,
        Self::LoadType,
    ];

    /// Canonical key fragment
    #[must_use]
    pub const fn key(self) -> &'static str {
        match self {
            Self::Description => "description",
            Self::BreakerPoles => "breaker_poles",
            Self::BreakerAmps => "breaker_amps",
            Self::LoadAmps => "load_amps",
            Self::LoadType => "load_type",
        }
    }

    /// Attributes that belong to the whole breaker and live on its first row only
    #[must_use]
    pub const fn is_group_head(self) -> bool {
        matches!(self, Self::Description | Self::BreakerPoles | Self::BreakerAmps)
    }

    /// Look up by key fragment
    #[must_use]
    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|a| a.key() == key)
    }
}

impl fmt::Display for CircuitAttr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Canonical identifier of one schedule parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum FieldKey {
    /// Panel header parameter
    Header(HeaderField),
    /// Attribute of one circuit row
    Circuit {
        /// Row number, 1-based
        circuit: u8,
        /// Attribute on that row
        attr: CircuitAttr,
    },
}

impl FieldKey {
    /// Header field key
    #[inline]
    #[must_use]
    pub const fn header(field: HeaderField) -> Self {
        Self::Header(field)
    }

    /// Circuit field key
    #[inline]
    #[must_use]
    pub const fn circuit(circuit: u8, attr: CircuitAttr) -> Self {
        Self::Circuit { circuit, attr }
    }

    /// Circuit row this key addresses, if any
    #[inline]
    #[must_use]
    pub const fn circuit_number(&self) -> Option<u8> {
        match self {
            Self::Circuit { circuit, .. } => Some(*circuit),
            Self::Header(_) => None,
        }
    }

    /// Header field this key addresses, if any
    #[inline]
    #[must_use]
    pub const fn header_field(&self) -> Option<HeaderField> {
        match self {
            Self::Header(h) => Some(*h),
            Self::Circuit { .. } => None,
        }
    }
}

impl From<HeaderField> for FieldKey {
    fn from(field: HeaderField) -> Self {
        Self::Header(field)
    }
}

impl fmt::Display for FieldKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Header(h) => f.write_str(h.key()),
            Self::Circuit { circuit, attr } => write!(f, "circuit.{circuit}.{attr}"),
        }
    }
}

impl FromStr for FieldKey {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let unknown = || ModelError::UnknownField(s.to_string());

        if let Some(rest) = trimmed.strip_prefix("circuit.") {
            let (number, attr) = rest.split_once('.').ok_or_else(unknown)?;
            let circuit: u8 = number.parse().map_err(|_| unknown())?;
            if circuit == 0 {
                return Err(unknown());
            }
            let attr = CircuitAttr::from_key(attr).ok_or_else(unknown)?;
            return Ok(Self::circuit(circuit, attr));
        }

        HeaderField::from_key(trimmed)
            .or_else(|| HeaderField::from_label(trimmed))
            .map(Self::Header)
            .ok_or_else(unknown)
    }
}

impl TryFrom<String> for FieldKey {
    type Error = ModelError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<FieldKey> for String {
    fn from(key: FieldKey) -> Self {
        key.to_string()
    }
}
