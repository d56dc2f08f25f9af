//! Testing utilities for PNL workspace
//!
//! Shared fixtures, observation builders and scripted adapters.

#![allow(missing_docs)]

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use parking_lot::Mutex;
use pnl_model::{
    CircuitAttr, ExtractionMethod, FieldKey, FieldObservation, FieldValue, HeaderField,
    PanelSchedule, SessionId, TaskId, TemplateDescriptor,
};
use pnl_session::{
    AdapterError, ExportBoundary, ImageExtractor, LanguageParser, OutputRef, ParsedUtterance,
    SessionConfig, SessionManager, SessionStore, StoreError, TaskIntent, TaskSession,
    TemplateProvider, UploadRef,
};
use std::time::Duration;

pub fn fixed_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 15, 12, 0, 0).unwrap()
}

pub fn session_id(key: &str) -> SessionId {
    SessionId::new(key).unwrap()
}

pub fn create_manager() -> SessionManager {
    SessionManager::new(SessionConfig::default()).unwrap()
}

pub fn header_obs(
    session: &SessionId,
    field: HeaderField,
    value: impl Into<FieldValue>,
    method: ExtractionMethod,
    at: DateTime<Utc>,
) -> FieldObservation {
    FieldObservation::with_default_weight(session.clone(), FieldKey::header(field), value, method, at)
}

pub fn circuit_obs(
    session: &SessionId,
    circuit: u8,
    attr: CircuitAttr,
    value: impl Into<FieldValue>,
    method: ExtractionMethod,
    at: DateTime<Utc>,
) -> FieldObservation {
    FieldObservation::with_default_weight(
        session.clone(),
        FieldKey::circuit(circuit, attr),
        value,
        method,
        at,
    )
}

/// Every field the three-phase template requires, typed in by the user
pub fn mandatory_observations(session: &SessionId, at: DateTime<Utc>) -> Vec<FieldObservation> {
    [
        (HeaderField::PanelName, FieldValue::from("LP-1")),
        (HeaderField::Voltage, FieldValue::from("208Y/120V")),
        (HeaderField::Phase, FieldValue::from("3")),
        (HeaderField::Wire, FieldValue::from("4")),
        (HeaderField::NumberOfCircuits, FieldValue::from(42u32)),
    ]
    .into_iter()
    .map(|(field, value)| header_obs(session, field, value, ExtractionMethod::Manual, at))
    .collect()
}

/// A few consistent circuits: 1-pole lighting at 1, 2-pole motor at 3-4
pub fn circuit_observations(session: &SessionId, at: DateTime<Utc>) -> Vec<FieldObservation> {
    let m = ExtractionMethod::AiVision;
    vec![
        circuit_obs(session, 1, CircuitAttr::Description, "lobby lights", m, at),
        circuit_obs(session, 1, CircuitAttr::BreakerPoles, 1u32, m, at),
        circuit_obs(session, 1, CircuitAttr::BreakerAmps, 20u32, m, at),
        circuit_obs(session, 1, CircuitAttr::LoadAmps, 8.5, m, at),
        circuit_obs(session, 1, CircuitAttr::LoadType, "ltg", m, at),
        circuit_obs(session, 3, CircuitAttr::Description, "rtu-1", m, at),
        circuit_obs(session, 3, CircuitAttr::BreakerPoles, 2u32, m, at),
        circuit_obs(session, 3, CircuitAttr::BreakerAmps, 30u32, m, at),
        circuit_obs(session, 3, CircuitAttr::LoadAmps, 14u32, m, at),
        circuit_obs(session, 3, CircuitAttr::LoadType, "mtr", m, at),
        circuit_obs(session, 4, CircuitAttr::LoadAmps, 14u32, m, at),
        circuit_obs(session, 4, CircuitAttr::LoadType, "mtr", m, at),
    ]
}

/// Start a panel schedule task and fill it until `Ready`
pub fn create_ready_task(manager: &SessionManager, session: &SessionId, at: DateTime<Utc>) -> TaskId {
    let task = manager
        .start_task_at(session.clone(), TaskIntent::PanelSchedule, at)
        .unwrap();
    for obs in mandatory_observations(session, at)
        .iter()
        .chain(circuit_observations(session, at).iter())
    {
        manager.observe_task_at(task, obs, at).unwrap();
    }
    task
}

// -- scripted adapters ----------------------------------------------------

/// Extractor returning the same readings for every image
#[derive(Debug)]
pub struct FixedExtractor {
    pub method: ExtractionMethod,
    pub readings: Vec<(FieldKey, FieldValue)>,
    pub delay: Duration,
}

impl FixedExtractor {
    pub fn vision(readings: Vec<(FieldKey, FieldValue)>) -> Self {
        Self {
            method: ExtractionMethod::AiVision,
            readings,
            delay: Duration::ZERO,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[async_trait]
impl ImageExtractor for FixedExtractor {
    fn method(&self) -> ExtractionMethod {
        self.method
    }

    async fn extract(
        &self,
        _image: &UploadRef,
        session_id: &SessionId,
    ) -> Result<Vec<FieldObservation>, AdapterError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        Ok(self
            .readings
            .iter()
            .map(|(key, value)| {
                FieldObservation::with_default_weight(
                    session_id.clone(),
                    *key,
                    value.clone(),
                    self.method,
                    Utc::now(),
                )
            })
            .collect())
    }
}

/// Extractor that always fails
#[derive(Debug)]
pub struct FailingExtractor(pub AdapterError);

#[async_trait]
impl ImageExtractor for FailingExtractor {
    fn method(&self) -> ExtractionMethod {
        ExtractionMethod::TextOcr
    }

    async fn extract(
        &self,
        _image: &UploadRef,
        _session_id: &SessionId,
    ) -> Result<Vec<FieldObservation>, AdapterError> {
        Err(self.0.clone())
    }
}

/// Parser that always fails
#[derive(Debug)]
pub struct FailingParser;

#[async_trait]
impl LanguageParser for FailingParser {
    async fn parse(
        &self,
        _text: &str,
        _session_id: &SessionId,
        _at: DateTime<Utc>,
    ) -> Result<ParsedUtterance, AdapterError> {
        Err(AdapterError::Unavailable("language service down".into()))
    }
}

/// Template provider that always fails
#[derive(Debug)]
pub struct FailingTemplates;

impl TemplateProvider for FailingTemplates {
    fn template_for(&self, _intent: TaskIntent) -> Result<TemplateDescriptor, AdapterError> {
        Err(AdapterError::Unavailable("template service down".into()))
    }
}

/// Export boundary that records what it was asked to render
#[derive(Debug, Default)]
pub struct RecordingExport {
    pub exported: Mutex<Vec<(TaskId, PanelSchedule)>>,
    pub delay: Duration,
}

impl RecordingExport {
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            exported: Mutex::new(Vec::new()),
            delay,
        }
    }

    pub fn count(&self) -> usize {
        self.exported.lock().len()
    }
}

#[async_trait]
impl ExportBoundary for RecordingExport {
    async fn export(
        &self,
        task_id: TaskId,
        schedule: &PanelSchedule,
    ) -> Result<Vec<OutputRef>, AdapterError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.exported.lock().push((task_id, schedule.clone()));
        Ok(vec![OutputRef::new(
            format!("{}.xlsx", schedule.panel_name),
            format!("memory://{task_id}"),
        )])
    }
}

/// Export boundary that always fails
#[derive(Debug)]
pub struct FailingExport;

#[async_trait]
impl ExportBoundary for FailingExport {
    async fn export(
        &self,
        _task_id: TaskId,
        _schedule: &PanelSchedule,
    ) -> Result<Vec<OutputRef>, AdapterError> {
        Err(AdapterError::Timeout { secs: 30 })
    }
}

/// Store whose every write fails
#[derive(Debug, Default)]
pub struct FailingStore;

impl SessionStore for FailingStore {
    fn save(&self, _session: &TaskSession) -> Result<(), StoreError> {
        Err(std::io::Error::other("disk full").into())
    }

    fn remove(&self, _task_id: TaskId) -> Result<(), StoreError> {
        Err(std::io::Error::other("disk full").into())
    }

    fn load(&self, _task_id: TaskId) -> Result<Option<TaskSession>, StoreError> {
        Ok(None)
    }

    fn load_all(&self) -> Result<Vec<TaskSession>, StoreError> {
        Ok(Vec::new())
    }
}
