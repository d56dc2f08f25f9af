//! Schedule assembly for export

use crate::error::SessionError;
use crate::types::TaskSession;
use pnl_grid::CircuitGrid;
use pnl_model::{HeaderField, PanelSchedule};
use std::collections::BTreeMap;

const PROMOTED: [HeaderField; 5] = [
    HeaderField::PanelName,
    HeaderField::Voltage,
    HeaderField::Phase,
    HeaderField::Wire,
    HeaderField::NumberOfCircuits,
];

/// Freeze a session's current values into a [`PanelSchedule`]
///
/// # Errors
/// Returns [`SessionError::Grid`] if `number_of_circuits` is missing or invalid.
pub fn build_schedule(session: &TaskSession) -> Result<PanelSchedule, SessionError> {
    let store = &session.parameter_store;
    let grid = CircuitGrid::from_store(store, &session.template)?;
    let number_of_circuits = session
        .template
        .circuit_count(i64::from(grid.number_of_circuits()))?;

    let text = |field: HeaderField| store.header(field).map(ToString::to_string).unwrap_or_default();

    let header: BTreeMap<_, _> = HeaderField::ALL
        .into_iter()
        .filter(|field| !PROMOTED.contains(field))
        .filter_map(|field| store.header(field).map(|v| (field, v.clone())))
        .collect();

    Ok(PanelSchedule {
        panel_name: text(HeaderField::PanelName),
        voltage: text(HeaderField::Voltage),
        phase: text(HeaderField::Phase),
        wire: text(HeaderField::Wire),
        number_of_circuits,
        header,
        circuits: grid.circuits(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{LifecycleProfile, TaskIntent};
    use chrono::Utc;
    use pnl_model::{ExtractionMethod, FieldKey, FieldObservation, FieldValue, SessionId, TemplateDescriptor};
    use pnl_resolver::ConfidenceResolver;

    fn session_with(values: &[(HeaderField, FieldValue)]) -> TaskSession {
        let sid = SessionId::new("tab").unwrap();
        let mut s = TaskSession::new(
            sid.clone(),
            TaskIntent::PanelSchedule,
            LifecycleProfile::Ephemeral,
            TemplateDescriptor::three_phase(),
            8,
            Utc::now(),
        );
        let resolver = ConfidenceResolver::new();
        for (field, value) in values {
            let obs = FieldObservation::with_default_weight(
                sid.clone(),
                FieldKey::header(*field),
                value.clone(),
                ExtractionMethod::Manual,
                Utc::now(),
            );
            resolver
                .observe(&mut s.parameter_store, &mut s.audit, &s.template, &obs)
                .unwrap();
        }
        s
    }

    #[test]
    fn promotes_core_header_fields() {
        let s = session_with(&[
            (HeaderField::PanelName, "lp-1".into()),
            (HeaderField::Voltage, "208y/120v".into()),
            (HeaderField::NumberOfCircuits, 42u32.into()),
            (HeaderField::Mounting, "surface".into()),
        ]);
        let schedule = build_schedule(&s).unwrap();
        assert_eq!(schedule.panel_name, "LP-1");
        assert_eq!(schedule.voltage, "208Y/120V");
        assert_eq!(schedule.phase, "");
        assert_eq!(schedule.number_of_circuits.get(), 42);
        assert_eq!(schedule.circuits.len(), 42);
        assert_eq!(schedule.header.len(), 1);
        assert_eq!(schedule.header.get(&HeaderField::Mounting), Some(&FieldValue::from("SURFACE")));
    }

    #[test]
    fn needs_circuit_count() {
        let s = session_with(&[(HeaderField::PanelName, "lp-1".into())]);
        assert!(matches!(build_schedule(&s), Err(SessionError::Grid(_))));
    }
}
