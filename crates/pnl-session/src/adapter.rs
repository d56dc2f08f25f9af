//! Boundaries to external collaborators
//!
//! Vision/OCR extraction, language parsing, template lookup and document
//! export all sit behind these traits. The manager never holds a session
//! lock across any of their calls, and their failures never terminate a
//! session.

use crate::error::AdapterError;
use crate::types::{OutputRef, TaskIntent, UploadRef};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pnl_model::{ExtractionMethod, FieldObservation, PanelSchedule, SessionId, TaskId, TemplateDescriptor};
use std::fmt::Debug;

/// Turns an uploaded image into field observations
#[async_trait]
pub trait ImageExtractor: Send + Sync + Debug {
    /// Method every observation from this extractor is tagged with
    fn method(&self) -> ExtractionMethod;

    /// Read fields from `image` on behalf of `session_id`
    async fn extract(
        &self,
        image: &UploadRef,
        session_id: &SessionId,
    ) -> Result<Vec<FieldObservation>, AdapterError>;
}

/// Explicit user command recognized in an utterance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserCommand {
    /// Finish the task
    Finish,
    /// Cancel: abandon a build, or end a task that is still collecting
    Cancel,
    /// Go ahead and build
    Confirm,
}

/// What a language parser found in one utterance
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedUtterance {
    /// Task the user asked for, if any
    pub intent: TaskIntent,
    /// Command the user gave, if any
    pub command: Option<UserCommand>,
    /// Field values the user stated
    pub observations: Vec<FieldObservation>,
}

impl ParsedUtterance {
    /// Nothing recognized
    #[must_use]
    pub fn empty() -> Self {
        Self {
            intent: TaskIntent::None,
            command: None,
            observations: Vec::new(),
        }
    }
}

/// Interprets free text from the user
#[async_trait]
pub trait LanguageParser: Send + Sync + Debug {
    /// Parse one utterance; observations are stamped with `session_id` and `at`
    async fn parse(
        &self,
        text: &str,
        session_id: &SessionId,
        at: DateTime<Utc>,
    ) -> Result<ParsedUtterance, AdapterError>;
}

/// Supplies the form a task collects against
pub trait TemplateProvider: Send + Sync + Debug {
    /// Template for a task intent
    ///
    /// # Errors
    /// Returns an [`AdapterError`] when no template can be produced.
    fn template_for(&self, intent: TaskIntent) -> Result<TemplateDescriptor, AdapterError>;
}

/// Always hands out the same template
#[derive(Debug, Clone)]
pub struct StaticTemplateProvider {
    template: TemplateDescriptor,
}

impl StaticTemplateProvider {
    /// Create provider
    #[must_use]
    pub fn new(template: TemplateDescriptor) -> Self {
        Self { template }
    }
}

impl TemplateProvider for StaticTemplateProvider {
    fn template_for(&self, _intent: TaskIntent) -> Result<TemplateDescriptor, AdapterError> {
        Ok(self.template.clone())
    }
}

/// Renders a confirmed schedule into deliverables
#[async_trait]
pub trait ExportBoundary: Send + Sync + Debug {
    /// Produce output documents for `schedule`
    async fn export(
        &self,
        task_id: TaskId,
        schedule: &PanelSchedule,
    ) -> Result<Vec<OutputRef>, AdapterError>;
}
