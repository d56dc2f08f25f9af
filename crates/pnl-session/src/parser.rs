//! Offline rule-based language adapter
//!
//! Keyword intent classification plus regex extraction of the panel header
//! values people usually say out loud. Everything it reports is tagged
//! [`ExtractionMethod::Manual`].

use crate::adapter::{LanguageParser, ParsedUtterance, UserCommand};
use crate::error::AdapterError;
use crate::types::TaskIntent;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pnl_model::{ExtractionMethod, FieldKey, FieldObservation, FieldValue, HeaderField, SessionId};
use regex::Regex;
use std::sync::OnceLock;

const INTENT_KEYWORDS: &[(&str, TaskIntent)] = &[
    ("one line", TaskIntent::OneLine),
    ("one-line", TaskIntent::OneLine),
    ("single line", TaskIntent::OneLine),
    ("riser", TaskIntent::OneLine),
    ("panel schedule", TaskIntent::PanelSchedule),
    ("panelboard", TaskIntent::PanelSchedule),
    ("schedule", TaskIntent::PanelSchedule),
    ("power plan", TaskIntent::PowerPlan),
    ("receptacle plan", TaskIntent::PowerPlan),
    ("lighting", TaskIntent::LightingPlan),
    ("site plan", TaskIntent::SitePlan),
    ("detail", TaskIntent::Details),
];

const NAME_STOP_WORDS: &[&str] = &[
    "schedule", "name", "is", "with", "for", "has", "the", "a", "an", "called", "named",
];

struct Patterns {
    panel_name: Regex,
    circuits: Regex,
    voltage: Regex,
    phase: Regex,
    wire: Regex,
    bus: Regex,
    main_breaker: Regex,
    mlo: Regex,
    finish: Regex,
    cancel: Regex,
    confirm: Regex,
}

fn patterns() -> &'static Patterns {
    static PATTERNS: OnceLock<Patterns> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        let re = |p: &str| Regex::new(p).expect("utterance patterns are valid regexes");
        Patterns {
            panel_name: re(r"(?i)\bpanel(?:board)?\s+([A-Za-z0-9][A-Za-z0-9-]*)"),
            circuits: re(r"(?i)\b(\d{1,3})[\s-]*(?:circuits?|ckts?|spaces?)\b"),
            voltage: re(
                r"(?i)\b(\d{3}\s*Y?\s*/\s*\d{3})\s*(?:v\b|volts?\b)?|\b(\d{3})\s*(?:v\b|volts?\b)",
            ),
            phase: re(r"(?i)\b(single|three|1|3)\s*-?\s*(?:phase\b|ph\b|Ø)"),
            wire: re(r"(?i)\b([2-4])\s*-?\s*(?:wire|w)\b"),
            bus: re(
                r"(?i)\b(\d{2,4})\s*(?:a|amps?)?\s+(?:main\s+)?bus\b|\bbus\s+(?:rating\s+)?(?:of\s+|is\s+|at\s+)?(\d{2,4})",
            ),
            main_breaker: re(r"(?i)\b(\d{2,4})\s*(?:a|amps?)?\s+(?:main\s+(?:circuit\s+)?breaker|mcb)\b"),
            mlo: re(r"(?i)\b(?:mlo|main\s+lugs?(?:\s+only)?|no\s+main)\b"),
            finish: re(r"(?i)\b(?:finished|done|that'?s\s+all|stop)\b"),
            cancel: re(r"(?i)\b(?:cancel|abort|never\s*mind)\b"),
            confirm: re(r"(?i)^\s*(?:yes|yep|confirm|go\s+ahead|build(?:\s+it)?)\b"),
        }
    })
}

/// Keyword and regex parser needing no external service
#[derive(Debug, Default, Clone, Copy)]
pub struct RuleBasedParser;

impl RuleBasedParser {
    /// Create parser
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Classify the requested deliverable
    #[must_use]
    pub fn classify_intent(text: &str) -> TaskIntent {
        let lower = text.to_lowercase();
        INTENT_KEYWORDS
            .iter()
            .find(|(keyword, _)| lower.contains(keyword))
            .map_or(TaskIntent::None, |(_, intent)| *intent)
    }

    /// Detect an explicit command; cancel outranks finish, finish outranks confirm
    #[must_use]
    pub fn detect_command(text: &str) -> Option<UserCommand> {
        let p = patterns();
        if p.cancel.is_match(text) {
            Some(UserCommand::Cancel)
        } else if p.finish.is_match(text) {
            Some(UserCommand::Finish)
        } else if p.confirm.is_match(text) {
            Some(UserCommand::Confirm)
        } else {
            None
        }
    }

    /// Header values stated in `text`
    #[must_use]
    pub fn extract_fields(text: &str) -> Vec<(HeaderField, FieldValue)> {
        let p = patterns();
        let mut found = Vec::new();

        if let Some(name) = p
            .panel_name
            .captures_iter(text)
            .filter_map(|c| c.get(1))
            .map(|m| m.as_str())
            .find(|word| !NAME_STOP_WORDS.contains(&word.to_lowercase().as_str()))
        {
            found.push((HeaderField::PanelName, FieldValue::from(name)));
        }

        if let Some(n) = first_number(&p.circuits, text) {
            found.push((HeaderField::NumberOfCircuits, FieldValue::Number(n)));
        }

        if let Some(caps) = p.voltage.captures(text) {
            if let Some(m) = caps.get(1).or_else(|| caps.get(2)) {
                let compact: String = m.as_str().chars().filter(|c| !c.is_whitespace()).collect();
                found.push((HeaderField::Voltage, FieldValue::Text(format!("{}V", compact.to_uppercase()))));
            }
        }

        if let Some(m) = p.phase.captures(text).and_then(|c| c.get(1)) {
            let phase = match m.as_str().to_lowercase().as_str() {
                "single" | "1" => "1PH",
                _ => "3PH",
            };
            found.push((HeaderField::Phase, FieldValue::from(phase)));
        }

        if let Some(n) = first_number(&p.wire, text) {
            found.push((HeaderField::Wire, FieldValue::Number(n)));
        }

        if let Some(n) = first_number(&p.bus, text) {
            found.push((HeaderField::MainBusAmps, FieldValue::Number(n)));
        }

        if p.mlo.is_match(text) {
            found.push((HeaderField::MainBreaker, FieldValue::from("MLO")));
        } else if let Some(n) = first_number(&p.main_breaker, text) {
            found.push((HeaderField::MainBreaker, FieldValue::Text(format!("{}A", FieldValue::Number(n)))));
        }

        found
    }

    /// Parse without suspending
    #[must_use]
    pub fn parse_now(&self, text: &str, session_id: &SessionId, at: DateTime<Utc>) -> ParsedUtterance {
        let observations = Self::extract_fields(text)
            .into_iter()
            .map(|(field, value)| {
                FieldObservation::with_default_weight(
                    session_id.clone(),
                    FieldKey::header(field),
                    value,
                    ExtractionMethod::Manual,
                    at,
                )
            })
            .collect();
        ParsedUtterance {
            intent: Self::classify_intent(text),
            command: Self::detect_command(text),
            observations,
        }
    }
}

/// First numeric capture group that matched
fn first_number(pattern: &Regex, text: &str) -> Option<f64> {
    let caps = pattern.captures(text)?;
    caps.iter()
        .skip(1)
        .flatten()
        .find_map(|m| m.as_str().parse::<f64>().ok())
}

#[async_trait]
impl LanguageParser for RuleBasedParser {
    async fn parse(
        &self,
        text: &str,
        session_id: &SessionId,
        at: DateTime<Utc>,
    ) -> Result<ParsedUtterance, AdapterError> {
        Ok(self.parse_now(text, session_id, at))
    }
}
