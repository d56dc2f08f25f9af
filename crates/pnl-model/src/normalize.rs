//! Value normalization
//!
//! Raw adapter output is noisy: mixed case, unit suffixes, phrasing like
//! "main lugs only". Each field has one canonical form, and observations are
//! normalized before they are compared against the stored value so that
//! `"20A"` and `20` count as the same reading.

use crate::circuit::validate_pole_count;
use crate::error::ModelError;
use crate::field::{CircuitAttr, FieldKey, HeaderField};
use crate::template::TemplateDescriptor;
use crate::value::{FieldValue, LoadType};
use regex::Regex;
use std::sync::OnceLock;

/// Widest description the schedule form can print
pub const DESCRIPTION_MAX_LEN: usize = 39;

const MLO_HINTS: [&str; 7] = [
    "MLO",
    "M.L.O",
    "MAIN LUG",
    "MAIN LUGS",
    "LUGS ONLY",
    "LUG ONLY",
    "NO MAIN",
];

fn amps_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(\d+(?:\.\d+)?)\s*A?\b").expect("amperage pattern is a valid regex")
    })
}

/// Canonical phase designator: `1PH`, `3PH`, or the upper-cased input
#[must_use]
pub fn normalize_phase(raw: &str) -> String {
    let upper = raw.trim().to_uppercase();
    if upper.contains("SINGLE") {
        return "1PH".to_string();
    }
    if upper.contains("THREE") {
        return "3PH".to_string();
    }
    let digits: String = upper
        .replace('Ø', "")
        .replace("PHASE", "")
        .replace("PH", "")
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '-')
        .collect();
    match digits.as_str() {
        "1" => "1PH".to_string(),
        "3" => "3PH".to_string(),
        _ => upper,
    }
}

/// Canonical main breaker: `MLO` or `<n>A`
#[must_use]
pub fn normalize_main_breaker(raw: &str) -> String {
    let upper = raw.trim().to_uppercase();
    if MLO_HINTS.iter().any(|hint| upper.contains(hint)) {
        return "MLO".to_string();
    }
    if upper.contains("NOT")
        && (upper.contains("MCB") || upper.contains("MAIN") || upper.contains("BREAKER"))
    {
        return "MLO".to_string();
    }
    amps_pattern()
        .captures(&upper)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse::<f64>().ok())
        .map_or_else(|| "MLO".to_string(), |n| format!("{}A", FieldValue::Number(n)))
}

/// Read an amperage from a number or text like `"20A"` / `"20 AMPS"`
#[must_use]
pub fn parse_amps(value: &FieldValue) -> Option<f64> {
    match value {
        FieldValue::Number(n) => Some(*n),
        FieldValue::Text(s) => s
            .trim()
            .trim_end_matches(|c: char| c.is_ascii_alphabetic())
            .trim()
            .parse::<f64>()
            .ok(),
    }
}

fn non_negative(key: FieldKey, value: &FieldValue) -> Result<FieldValue, ModelError> {
    match parse_amps(value) {
        Some(n) if n.is_finite() && n >= 0.0 => Ok(FieldValue::Number(n)),
        Some(n) => Err(ModelError::invalid(key, format!("{n} is not a non-negative amperage"))),
        None => Err(ModelError::invalid(key, format!("{value} is not a number"))),
    }
}

fn upper_text(value: &FieldValue) -> String {
    value.to_string().trim().to_uppercase()
}

fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect::<String>().trim_end().to_string()
}

/// Normalize a raw value for `key` under `template`
///
/// Blank text yields [`ModelError::EmptyValue`]; every other failure is a
/// validation error the caller should surface.
pub fn normalize_value(
    key: FieldKey,
    value: &FieldValue,
    template: &TemplateDescriptor,
) -> Result<FieldValue, ModelError> {
    if value.is_blank() {
        return Err(ModelError::EmptyValue(key));
    }
    if let FieldValue::Number(n) = value {
        if !n.is_finite() {
            return Err(ModelError::invalid(key, "not a finite number"));
        }
    }

    match key {
        FieldKey::Header(field) => normalize_header(key, field, value, template),
        FieldKey::Circuit { circuit, attr } => {
            let max = template.circuit_bounds.max;
            if circuit == 0 || circuit > max {
                return Err(ModelError::CircuitOutOfRange {
                    circuit: i64::from(circuit),
                    max,
                });
            }
            normalize_circuit(key, attr, value)
        }
    }
}

fn normalize_header(
    key: FieldKey,
    field: HeaderField,
    value: &FieldValue,
    template: &TemplateDescriptor,
) -> Result<FieldValue, ModelError> {
    match field {
        HeaderField::Phase => Ok(FieldValue::Text(normalize_phase(&value.to_string()))),
        HeaderField::MainBreaker => Ok(FieldValue::Text(normalize_main_breaker(&value.to_string()))),
        HeaderField::MainBusAmps => non_negative(key, value),
        HeaderField::NumberOfCircuits => {
            let n = parse_amps(value)
                .filter(|n| n.fract() == 0.0)
                .ok_or_else(|| ModelError::invalid(key, format!("{value} is not a whole number")))?;
            #[allow(clippy::cast_possible_truncation)]
            let count = template.circuit_count(n as i64)?;
            Ok(FieldValue::Number(f64::from(count.get())))
        }
        _ => Ok(FieldValue::Text(upper_text(value))),
    }
}

fn normalize_circuit(
    key: FieldKey,
    attr: CircuitAttr,
    value: &FieldValue,
) -> Result<FieldValue, ModelError> {
    match attr {
        CircuitAttr::Description => Ok(FieldValue::Text(truncate_chars(
            &upper_text(value),
            DESCRIPTION_MAX_LEN,
        ))),
        CircuitAttr::BreakerPoles => {
            validate_pole_count(value).map(|k| FieldValue::Number(f64::from(k)))
        }
        CircuitAttr::BreakerAmps | CircuitAttr::LoadAmps => non_negative(key, value),
        CircuitAttr::LoadType => {
            let load_type: LoadType = value.to_string().parse()?;
            Ok(FieldValue::from(load_type))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn template() -> TemplateDescriptor {
        TemplateDescriptor::three_phase()
    }

    fn count(v: impl Into<FieldValue>) -> Result<FieldValue, ModelError> {
        normalize_value(
            FieldKey::header(HeaderField::NumberOfCircuits),
            &v.into(),
            &template(),
        )
    }

    #[test]
    fn phase_variants() {
        assert_eq!(normalize_phase("3Ø"), "3PH");
        assert_eq!(normalize_phase("three phase"), "3PH");
        assert_eq!(normalize_phase("1 PHASE"), "1PH");
        assert_eq!(normalize_phase("Single"), "1PH");
        assert_eq!(normalize_phase("3-ph"), "3PH");
        assert_eq!(normalize_phase("delta"), "DELTA");
    }

    #[test]
    fn main_breaker_variants() {
        assert_eq!(normalize_main_breaker("main lugs only"), "MLO");
        assert_eq!(normalize_main_breaker("not a main breaker"), "MLO");
        assert_eq!(normalize_main_breaker("225A"), "225A");
        assert_eq!(normalize_main_breaker("100 amp main"), "100A");
        assert_eq!(normalize_main_breaker("unknown"), "MLO");
    }

    #[test]
    fn circuit_count_rules() {
        assert_eq!(count(42.0).unwrap(), FieldValue::Number(42.0));
        assert_eq!(count("18").unwrap(), FieldValue::Number(18.0));
        assert_eq!(count(84u32).unwrap(), FieldValue::Number(84.0));
        assert_eq!(count(41.0), Err(ModelError::OddCircuitCount(41)));
        assert!(matches!(count(17.0), Err(ModelError::CircuitCountOutOfRange { .. })));
        assert!(matches!(count(85.0), Err(ModelError::CircuitCountOutOfRange { .. })));
        assert!(count(42.5).is_err());
    }

    #[test]
    fn blank_is_empty_value() {
        let key = FieldKey::header(HeaderField::Voltage);
        let err = normalize_value(key, &"   ".into(), &template()).unwrap_err();
        assert!(err.is_empty_value());
    }

    #[test]
    fn description_is_upper_and_truncated() {
        let key = FieldKey::circuit(1, CircuitAttr::Description);
        let long = "receptacles in the north conference room and lobby";
        let out = normalize_value(key, &long.into(), &template()).unwrap();
        let text = out.as_text().unwrap();
        assert!(text.chars().count() <= DESCRIPTION_MAX_LEN);
        assert!(text.starts_with("RECEPTACLES IN THE NORTH"));
    }

    #[test]
    fn amps_accept_suffix_and_reject_negative() {
        let key = FieldKey::circuit(3, CircuitAttr::BreakerAmps);
        assert_eq!(
            normalize_value(key, &"20A".into(), &template()).unwrap(),
            FieldValue::Number(20.0)
        );
        assert!(normalize_value(key, &FieldValue::Number(-5.0), &template()).is_err());
        assert!(normalize_value(key, &"lots".into(), &template()).is_err());
    }

    #[test]
    fn load_type_is_validated() {
        let key = FieldKey::circuit(3, CircuitAttr::LoadType);
        assert_eq!(
            normalize_value(key, &"rcp".into(), &template()).unwrap(),
            FieldValue::Text("RCP".into())
        );
        assert!(matches!(
            normalize_value(key, &"HVAC".into(), &template()),
            Err(ModelError::InvalidLoadType(_))
        ));
    }

    #[test]
    fn circuit_beyond_template_max_is_rejected() {
        let key = FieldKey::circuit(85, CircuitAttr::LoadAmps);
        assert!(matches!(
            normalize_value(key, &FieldValue::Number(1.0), &template()),
            Err(ModelError::CircuitOutOfRange { circuit: 85, max: 84 })
        ));
    }
}
