//! Task session manager
//!
//! Owns every live task session. Each session sits behind its own
//! `parking_lot::Mutex`, so observations for one task apply one at a time in
//! arrival order while different tasks never contend. No session lock is
//! held across an `.await`: adapters run unlocked and their results are
//! applied afterwards, re-checking the session state.
//!
//! Lock order is `by_session` shard, then a session mutex. Registry cleanup
//! after a terminal transition runs only once the session mutex is released.

use crate::adapter::{ExportBoundary, ImageExtractor, LanguageParser, StaticTemplateProvider, TemplateProvider, UserCommand};
use crate::config::SessionConfig;
use crate::error::{AdapterError, Result, SessionError};
use crate::snapshot::build_schedule;
use crate::state_machine::validate_transition;
use crate::store::SessionStore;
use crate::types::{LifecycleProfile, OutputRef, SessionState, SessionStatus, TaskIntent, TaskSession, UploadRef};
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use pnl_model::{FieldObservation, PanelSchedule, SessionId, TaskId, TemplateDescriptor};
use pnl_resolver::{ConfidenceResolver, Outcome};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

type SessionSlot = Arc<Mutex<TaskSession>>;

/// Data-free marker left after a task ends
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Tombstone {
    /// Ended task
    pub task_id: TaskId,
    /// Conversation it belonged to
    pub session_id: SessionId,
    /// Terminal state reached
    pub state: SessionState,
    /// When it ended
    pub ended_at: DateTime<Utc>,
    /// Last command or observation before it ended
    pub last_activity_at: DateTime<Utc>,
}

impl Tombstone {
    /// Status with no field data
    #[must_use]
    pub fn status(&self) -> SessionStatus {
        SessionStatus {
            task_id: self.task_id,
            session_id: self.session_id.clone(),
            state: self.state,
            missing_fields: Vec::new(),
            violations: Vec::new(),
            needs_review: Vec::new(),
            value_sources: BTreeMap::new(),
            last_activity_at: self.last_activity_at,
        }
    }
}

/// Result of one expiry sweep
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// Tasks moved to `Expired`
    pub expired: Vec<TaskId>,
    /// Tombstones dropped after their retention window
    pub pruned_tombstones: usize,
}

impl SweepReport {
    /// Check if the sweep changed anything
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.expired.is_empty() && self.pruned_tombstones == 0
    }
}

/// Result of feeding an image through an extractor
#[derive(Debug)]
pub struct IngestReport {
    /// Task the image was attached to
    pub task_id: TaskId,
    /// One result per applied observation, in order
    pub outcomes: Vec<Result<Outcome>>,
    /// Extractor failure, absorbed
    pub adapter_failure: Option<AdapterError>,
}

/// Result of handling one user utterance
#[derive(Debug)]
pub struct UtteranceReport {
    /// Task the utterance applied to, if any
    pub task_id: Option<TaskId>,
    /// Whether this utterance started the task
    pub started: bool,
    /// Intent the parser recognized
    pub intent: TaskIntent,
    /// Command the parser recognized
    pub command: Option<UserCommand>,
    /// One result per stated value, in order
    pub outcomes: Vec<Result<Outcome>>,
    /// Task state after the utterance
    pub state: SessionState,
    /// Parser failure, absorbed
    pub adapter_failure: Option<AdapterError>,
}

/// What registry cleanup needs once a session mutex is released
#[derive(Debug)]
struct Retired {
    task_id: TaskId,
    session_id: SessionId,
    profile: LifecycleProfile,
    state: SessionState,
    ended_at: DateTime<Utc>,
    last_activity_at: DateTime<Utc>,
}

/// Registry and lifecycle driver for task sessions
#[derive(Debug)]
pub struct SessionManager {
    config: SessionConfig,
    resolver: ConfidenceResolver,
    templates: Arc<dyn TemplateProvider>,
    store: Arc<dyn SessionStore>,
    sessions: DashMap<TaskId, SessionSlot>,
    by_session: DashMap<SessionId, TaskId>,
    tombstones: DashMap<TaskId, Tombstone>,
}

impl SessionManager {
    /// Create manager from validated configuration
    ///
    /// # Errors
    /// Returns [`SessionError::Config`] for invalid configuration and
    /// [`SessionError::Store`] if the durable store cannot be opened.
    pub fn new(config: SessionConfig) -> Result<Self> {
        config.validate()?;
        let resolver = config.resolver()?;
        let store = config.open_store()?;
        let templates = Arc::new(StaticTemplateProvider::new(config.template.clone()));
        Ok(Self {
            config,
            resolver,
            templates,
            store,
            sessions: DashMap::new(),
            by_session: DashMap::new(),
            tombstones: DashMap::new(),
        })
    }

    /// Replace the durable store
    #[must_use]
    pub fn with_store(mut self, store: Arc<dyn SessionStore>) -> Self {
        self.store = store;
        self
    }

    /// Replace the template provider
    #[must_use]
    pub fn with_template_provider(mut self, templates: Arc<dyn TemplateProvider>) -> Self {
        self.templates = templates;
        self
    }

    /// Replace the resolver
    #[must_use]
    pub fn with_resolver(mut self, resolver: ConfidenceResolver) -> Self {
        self.resolver = resolver;
        self
    }

    /// Active configuration
    #[inline]
    #[must_use]
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Task currently linked to a conversation
    #[must_use]
    pub fn task_for(&self, session_id: &SessionId) -> Option<TaskId> {
        self.by_session.get(session_id).map(|r| *r.value())
    }

    /// Lifecycle state of a conversation; `Idle` when no task is linked
    #[must_use]
    pub fn session_state(&self, session_id: &SessionId) -> SessionState {
        self.task_for(session_id)
            .and_then(|task_id| self.live_slot(task_id))
            .map_or(SessionState::Idle, |slot| slot.lock().state)
    }

    /// Number of conversations with a running task
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.by_session.len()
    }

    /// Read a session record without changing it
    ///
    /// # Errors
    /// Returns [`SessionError::NotFound`] if the task is not in the registry.
    pub fn inspect<T>(&self, task_id: TaskId, f: impl FnOnce(&TaskSession) -> T) -> Result<T> {
        let slot = self
            .live_slot(task_id)
            .ok_or_else(|| SessionError::NotFound(format!("task {task_id}")))?;
        let session = slot.lock();
        Ok(f(&session))
    }

    // -- lifecycle commands ------------------------------------------------

    /// Start a task for a conversation
    ///
    /// # Errors
    /// - [`SessionError::NoTaskIntent`] for [`TaskIntent::None`]
    /// - [`SessionError::TaskAlreadyActive`] if the conversation already runs
    ///   a non-terminal, non-expired task
    pub fn start_task(&self, session_id: SessionId, intent: TaskIntent) -> Result<TaskId> {
        self.start_task_at(session_id, intent, Utc::now())
    }

    /// [`Self::start_task`] at an explicit time
    ///
    /// # Errors
    /// See [`Self::start_task`].
    pub fn start_task_at(
        &self,
        session_id: SessionId,
        intent: TaskIntent,
        now: DateTime<Utc>,
    ) -> Result<TaskId> {
        if !intent.starts_task() {
            return Err(SessionError::NoTaskIntent);
        }
        let template = self.templates.template_for(intent).unwrap_or_else(|e| {
            warn!(%session_id, %intent, error = %e, "Template provider failed, using configured template");
            self.config.template.clone()
        });

        let mut stale = None;
        let task_id = match self.by_session.entry(session_id.clone()) {
            Entry::Occupied(mut entry) => {
                let existing = *entry.get();
                let existing_slot = self.live_slot(existing);
                if let Some(slot) = existing_slot {
                    let mut current = slot.lock();
                    if current.is_idle_expired(now, self.config.idle_timeout()) {
                        stale = Some(end_session(&mut current, SessionState::Expired, now)?);
                    } else if !current.state.is_terminal() {
                        return Err(SessionError::TaskAlreadyActive {
                            session_id,
                            task_id: existing,
                        });
                    }
                }
                let task_id = self.register(session_id.clone(), intent, template, now);
                entry.insert(task_id);
                task_id
            }
            Entry::Vacant(entry) => {
                let task_id = self.register(session_id.clone(), intent, template, now);
                entry.insert(task_id);
                task_id
            }
        };

        if let Some(retired) = stale {
            self.retire(retired, false);
        }
        info!(%task_id, %session_id, %intent, "Task session started");
        Ok(task_id)
    }

    /// Finish a task from any live state
    ///
    /// # Errors
    /// Returns [`SessionError::SessionNotActive`] if the task already ended.
    pub fn finish(&self, task_id: TaskId) -> Result<()> {
        self.finish_at(task_id, Utc::now())
    }

    /// [`Self::finish`] at an explicit time
    ///
    /// # Errors
    /// See [`Self::finish`].
    pub fn finish_at(&self, task_id: TaskId, now: DateTime<Utc>) -> Result<()> {
        let slot = self.slot(task_id)?;
        self.expire_if_idle(&slot, now);
        let retired = {
            let mut session = slot.lock();
            ensure_live(&session)?;
            session.touch(now);
            let retired = end_session(&mut session, SessionState::Finished, now)?;
            self.persist(&session);
            retired
        };
        self.retire(retired, true);
        Ok(())
    }

    /// Cancel: back to `Ready` from a pending build, otherwise end the task
    ///
    /// # Errors
    /// Returns [`SessionError::SessionNotActive`] if the task already ended.
    pub fn cancel(&self, task_id: TaskId) -> Result<SessionState> {
        self.cancel_at(task_id, Utc::now())
    }

    /// [`Self::cancel`] at an explicit time
    ///
    /// # Errors
    /// See [`Self::cancel`].
    pub fn cancel_at(&self, task_id: TaskId, now: DateTime<Utc>) -> Result<SessionState> {
        let slot = self.slot(task_id)?;
        self.expire_if_idle(&slot, now);
        let retired = {
            let mut session = slot.lock();
            ensure_live(&session)?;
            session.touch(now);
            if matches!(session.state, SessionState::Confirming | SessionState::Building) {
                transition(&mut session, SessionState::Ready)?;
                self.persist(&session);
                return Ok(SessionState::Ready);
            }
            let retired = end_session(&mut session, SessionState::Finished, now)?;
            self.persist(&session);
            retired
        };
        self.retire(retired, true);
        Ok(SessionState::Finished)
    }

    /// Close whatever task the conversation runs
    ///
    /// # Errors
    /// Returns [`SessionError::NotFound`] or [`SessionError::SessionNotActive`]
    /// when the conversation has no running task.
    pub fn close_session(&self, session_id: &SessionId) -> Result<TaskId> {
        self.close_session_at(session_id, Utc::now())
    }

    /// [`Self::close_session`] at an explicit time
    ///
    /// # Errors
    /// See [`Self::close_session`].
    pub fn close_session_at(&self, session_id: &SessionId, now: DateTime<Utc>) -> Result<TaskId> {
        let task_id = self
            .task_for(session_id)
            .ok_or_else(|| self.no_task_error(session_id))?;
        self.finish_at(task_id, now)?;
        Ok(task_id)
    }

    /// Move `Ready -> Confirming`
    ///
    /// # Errors
    /// - [`SessionError::IllegalTransition`] unless the task is `Ready`
    /// - [`SessionError::NotBuildable`] while the grid reports violations
    pub fn confirm_build(&self, task_id: TaskId) -> Result<()> {
        self.confirm_build_at(task_id, Utc::now())
    }

    /// [`Self::confirm_build`] at an explicit time
    ///
    /// # Errors
    /// See [`Self::confirm_build`].
    pub fn confirm_build_at(&self, task_id: TaskId, now: DateTime<Utc>) -> Result<()> {
        let slot = self.slot(task_id)?;
        self.expire_if_idle(&slot, now);
        let mut session = slot.lock();
        ensure_live(&session)?;
        validate_transition(session.state, SessionState::Confirming)?;
        let violations = session.violations();
        if !violations.is_empty() {
            debug!(%task_id, count = violations.len(), "Build refused on structural violations");
            return Err(SessionError::NotBuildable { violations });
        }
        session.touch(now);
        transition(&mut session, SessionState::Confirming)?;
        self.persist(&session);
        Ok(())
    }

    /// Run the export boundary for a confirmed task
    ///
    /// On success the task finishes and the produced outputs are returned.
    /// On export failure the task returns to `Ready` and the failure is
    /// reported.
    ///
    /// # Errors
    /// - [`SessionError::IllegalTransition`] unless the task is `Confirming`
    /// - [`SessionError::BuildInterrupted`] if the task was cancelled meanwhile
    /// - [`SessionError::ExternalAdapterFailure`] if the export failed
    pub async fn run_build(&self, task_id: TaskId, exporter: &dyn ExportBoundary) -> Result<Vec<OutputRef>> {
        self.run_build_at(task_id, exporter, Utc::now()).await
    }

    /// [`Self::run_build`] at an explicit time
    ///
    /// # Errors
    /// See [`Self::run_build`].
    pub async fn run_build_at(
        &self,
        task_id: TaskId,
        exporter: &dyn ExportBoundary,
        now: DateTime<Utc>,
    ) -> Result<Vec<OutputRef>> {
        let slot = self.slot(task_id)?;
        self.expire_if_idle(&slot, now);
        let schedule = {
            let mut session = slot.lock();
            ensure_live(&session)?;
            validate_transition(session.state, SessionState::Building)?;
            let schedule = build_schedule(&session)?;
            session.touch(now);
            transition(&mut session, SessionState::Building)?;
            self.persist(&session);
            schedule
        };

        let exported = exporter.export(task_id, &schedule).await;

        let slot = self.slot(task_id)?;
        let (retired, outputs) = {
            let mut session = slot.lock();
            if session.state != SessionState::Building {
                return Err(SessionError::BuildInterrupted { state: session.state });
            }
            match exported {
                Ok(outputs) => {
                    session.output_refs.extend(outputs.iter().cloned());
                    let retired = end_session(&mut session, SessionState::Finished, now)?;
                    self.persist(&session);
                    (retired, outputs)
                }
                Err(e) => {
                    warn!(%task_id, error = %e, "Export failed, task back to ready");
                    transition(&mut session, SessionState::Ready)?;
                    self.persist(&session);
                    return Err(e.into());
                }
            }
        };
        self.retire(retired, true);
        Ok(outputs)
    }

    // -- observations ------------------------------------------------------

    /// Apply an observation to the task its session runs
    ///
    /// # Errors
    /// - [`SessionError::Validation`] for invalid values (session unchanged)
    /// - [`SessionError::SessionNotActive`] if the session's task ended
    /// - [`SessionError::SessionBusy`] while a build is pending
    pub fn observe(&self, observation: &FieldObservation) -> Result<Outcome> {
        self.observe_at(observation, Utc::now())
    }

    /// [`Self::observe`] at an explicit time
    ///
    /// # Errors
    /// See [`Self::observe`].
    pub fn observe_at(&self, observation: &FieldObservation, now: DateTime<Utc>) -> Result<Outcome> {
        let session_id = observation.session_id();
        let task_id = self
            .task_for(session_id)
            .ok_or_else(|| self.no_task_error(session_id))?;
        self.observe_task_at(task_id, observation, now)
    }

    /// Apply an observation to a specific task
    ///
    /// # Errors
    /// See [`Self::observe`]; also [`SessionError::ForeignObservation`] if
    /// the observation names another conversation.
    pub fn observe_task(&self, task_id: TaskId, observation: &FieldObservation) -> Result<Outcome> {
        self.observe_task_at(task_id, observation, Utc::now())
    }

    /// [`Self::observe_task`] at an explicit time
    ///
    /// # Errors
    /// See [`Self::observe_task`].
    pub fn observe_task_at(
        &self,
        task_id: TaskId,
        observation: &FieldObservation,
        now: DateTime<Utc>,
    ) -> Result<Outcome> {
        let slot = self.slot(task_id)?;
        self.expire_if_idle(&slot, now);
        let mut session = slot.lock();
        let outcome = self.apply_locked(&mut session, observation, now);
        self.persist(&session);
        outcome
    }

    /// Apply observations strictly in order under one lock
    ///
    /// # Errors
    /// Fails as a whole only if the task cannot be found; per-observation
    /// failures are returned in the vector.
    pub fn observe_batch_at(
        &self,
        task_id: TaskId,
        observations: &[FieldObservation],
        now: DateTime<Utc>,
    ) -> Result<Vec<Result<Outcome>>> {
        let slot = self.slot(task_id)?;
        self.expire_if_idle(&slot, now);
        let mut session = slot.lock();
        ensure_live(&session)?;
        let outcomes = observations
            .iter()
            .map(|obs| self.apply_locked(&mut session, obs, now))
            .collect();
        self.persist(&session);
        Ok(outcomes)
    }

    /// Record an upload against a task
    ///
    /// # Errors
    /// Returns [`SessionError::SessionNotActive`] if the task ended.
    pub fn add_upload_at(&self, task_id: TaskId, upload: UploadRef, now: DateTime<Utc>) -> Result<()> {
        let slot = self.slot(task_id)?;
        self.expire_if_idle(&slot, now);
        let mut session = slot.lock();
        ensure_live(&session)?;
        session.touch(now);
        session.upload_refs.push(upload);
        self.persist(&session);
        Ok(())
    }

    /// Run an image through an extractor and apply what it reads
    ///
    /// Extractor failure is absorbed into the report; the session stays as
    /// it was.
    ///
    /// # Errors
    /// Returns [`SessionError::SessionNotActive`] if the task ended before
    /// or during extraction.
    pub async fn ingest_image(
        &self,
        task_id: TaskId,
        extractor: &dyn ImageExtractor,
        image: UploadRef,
    ) -> Result<IngestReport> {
        self.ingest_image_at(task_id, extractor, image, Utc::now()).await
    }

    /// [`Self::ingest_image`] at an explicit time
    ///
    /// # Errors
    /// See [`Self::ingest_image`].
    pub async fn ingest_image_at(
        &self,
        task_id: TaskId,
        extractor: &dyn ImageExtractor,
        image: UploadRef,
        now: DateTime<Utc>,
    ) -> Result<IngestReport> {
        let session_id = {
            let slot = self.slot(task_id)?;
            self.expire_if_idle(&slot, now);
            let mut session = slot.lock();
            ensure_accepting(&session)?;
            session.touch(now);
            session.upload_refs.push(image.clone());
            self.persist(&session);
            session.session_id.clone()
        };

        let observations = match extractor.extract(&image, &session_id).await {
            Ok(observations) => observations,
            Err(e) => {
                warn!(%task_id, image = %image.name, error = %e, "Image extraction failed");
                return Ok(IngestReport {
                    task_id,
                    outcomes: Vec::new(),
                    adapter_failure: Some(e),
                });
            }
        };

        let method = extractor.method();
        let (tagged, mistagged): (Vec<_>, Vec<_>) = observations
            .into_iter()
            .map(|obs| obs.with_source(image.name.as_str()))
            .partition(|obs| obs.method() == method);
        if !mistagged.is_empty() {
            warn!(%task_id, %method, dropped = mistagged.len(), "Dropping observations tagged with another method");
        }

        let outcomes = self.observe_batch_at(task_id, &tagged, now)?;
        Ok(IngestReport {
            task_id,
            outcomes,
            adapter_failure: None,
        })
    }

    /// Interpret one user utterance
    ///
    /// Starts a task when the conversation has none and an intent is
    /// recognized, applies stated values, then executes any command.
    ///
    /// # Errors
    /// - [`SessionError::NoTaskIntent`] if there is no task and none was asked for
    /// - command errors, e.g. [`SessionError::NotBuildable`] on "build it"
    pub async fn handle_utterance(
        &self,
        session_id: &SessionId,
        text: &str,
        parser: &dyn LanguageParser,
    ) -> Result<UtteranceReport> {
        self.handle_utterance_at(session_id, text, parser, Utc::now()).await
    }

    /// [`Self::handle_utterance`] at an explicit time
    ///
    /// # Errors
    /// See [`Self::handle_utterance`].
    pub async fn handle_utterance_at(
        &self,
        session_id: &SessionId,
        text: &str,
        parser: &dyn LanguageParser,
        now: DateTime<Utc>,
    ) -> Result<UtteranceReport> {
        let parsed = match parser.parse(text, session_id, now).await {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!(%session_id, error = %e, "Language parser failed");
                let task_id = self.task_for(session_id);
                return Ok(UtteranceReport {
                    task_id,
                    started: false,
                    intent: TaskIntent::None,
                    command: None,
                    outcomes: Vec::new(),
                    state: self.session_state(session_id),
                    adapter_failure: Some(e),
                });
            }
        };

        let mut task_id = self.task_for(session_id);
        if let Some(slot) = task_id.and_then(|id| self.live_slot(id)) {
            if self.expire_if_idle(&slot, now).is_some() {
                task_id = None;
            }
        }

        let mut started = false;
        let task_id = match task_id {
            Some(id) => id,
            None if parsed.intent.starts_task() => {
                started = true;
                self.start_task_at(session_id.clone(), parsed.intent, now)?
            }
            None => return Err(SessionError::NoTaskIntent),
        };

        let outcomes = if parsed.observations.is_empty() {
            Vec::new()
        } else {
            self.observe_batch_at(task_id, &parsed.observations, now)?
        };

        match parsed.command {
            Some(UserCommand::Finish) => self.finish_at(task_id, now)?,
            Some(UserCommand::Cancel) => {
                self.cancel_at(task_id, now)?;
            }
            Some(UserCommand::Confirm) => self.confirm_build_at(task_id, now)?,
            None => {}
        }

        Ok(UtteranceReport {
            task_id: Some(task_id),
            started,
            intent: parsed.intent,
            command: parsed.command,
            outcomes,
            state: self.task_state(task_id),
            adapter_failure: None,
        })
    }

    // -- queries -----------------------------------------------------------

    /// Frozen schedule for a task in `Ready`, `Confirming` or `Building`
    ///
    /// # Errors
    /// Returns [`SessionError::NotFound`] in any other state or for unknown tasks.
    pub fn get_snapshot(&self, task_id: TaskId) -> Result<PanelSchedule> {
        self.get_snapshot_at(task_id, Utc::now())
    }

    /// [`Self::get_snapshot`] at an explicit time
    ///
    /// # Errors
    /// See [`Self::get_snapshot`].
    pub fn get_snapshot_at(&self, task_id: TaskId, now: DateTime<Utc>) -> Result<PanelSchedule> {
        let slot = self
            .live_slot(task_id)
            .ok_or_else(|| SessionError::NotFound(format!("no snapshot for task {task_id}")))?;
        self.expire_if_idle(&slot, now);
        let session = slot.lock();
        if !session.state.exposes_snapshot() {
            return Err(SessionError::NotFound(format!(
                "no snapshot for task {task_id} while {}",
                session.state
            )));
        }
        build_schedule(&session)
    }

    /// Status of a task; polling does not count as activity
    ///
    /// # Errors
    /// Returns [`SessionError::NotFound`] for unknown or long-gone tasks.
    pub fn get_status(&self, task_id: TaskId) -> Result<SessionStatus> {
        self.get_status_at(task_id, Utc::now())
    }

    /// [`Self::get_status`] at an explicit time
    ///
    /// # Errors
    /// See [`Self::get_status`].
    pub fn get_status_at(&self, task_id: TaskId, now: DateTime<Utc>) -> Result<SessionStatus> {
        if let Some(slot) = self.live_slot(task_id) {
            self.expire_if_idle(&slot, now);
            let session = slot.lock();
            if !(session.state.is_terminal() && session.profile == LifecycleProfile::Ephemeral) {
                return Ok(session.status());
            }
        }
        self.tombstones
            .get(&task_id)
            .map(|t| t.status())
            .ok_or_else(|| SessionError::NotFound(format!("task {task_id}")))
    }

    // -- expiry and restore ------------------------------------------------

    /// Expire idle tasks and prune old tombstones
    pub fn sweep_expired(&self) -> SweepReport {
        self.sweep_expired_at(Utc::now())
    }

    /// [`Self::sweep_expired`] at an explicit time
    pub fn sweep_expired_at(&self, now: DateTime<Utc>) -> SweepReport {
        let slots: Vec<SessionSlot> = self.sessions.iter().map(|r| Arc::clone(r.value())).collect();
        let expired: Vec<TaskId> = slots
            .iter()
            .filter_map(|slot| self.expire_if_idle(slot, now))
            .collect();

        let retention = self.config.tombstone_retention();
        let before = self.tombstones.len();
        self.tombstones.retain(|_, t| now - t.ended_at <= retention);
        let pruned_tombstones = before.saturating_sub(self.tombstones.len());

        let report = SweepReport {
            expired,
            pruned_tombstones,
        };
        if !report.is_empty() {
            info!(
                expired = report.expired.len(),
                pruned = report.pruned_tombstones,
                "Expiry sweep"
            );
        }
        report
    }

    /// Reload records from the durable store
    ///
    /// Ephemeral records that ended or went idle are purged instead of
    /// loaded. Builds interrupted by the restart return to `Ready`.
    ///
    /// # Errors
    /// Returns [`SessionError::Store`] if the store cannot be listed.
    pub fn restore(&self) -> Result<usize> {
        self.restore_at(Utc::now())
    }

    /// [`Self::restore`] at an explicit time
    ///
    /// # Errors
    /// See [`Self::restore`].
    pub fn restore_at(&self, now: DateTime<Utc>) -> Result<usize> {
        let mut restored = 0;
        for mut session in self.store.load_all()? {
            let task_id = session.task_id;
            if session.profile == LifecycleProfile::Ephemeral
                && (session.state.is_terminal() || session.is_idle_expired(now, self.config.idle_timeout()))
            {
                if let Err(e) = self.store.remove(task_id) {
                    warn!(%task_id, error = %e, "Failed to purge stale session record");
                }
                info!(%task_id, "Purged stale session record");
                continue;
            }

            if matches!(session.state, SessionState::Confirming | SessionState::Building) {
                session.state = SessionState::Ready;
                self.persist(&session);
            }

            if !session.state.is_terminal() {
                match self.by_session.entry(session.session_id.clone()) {
                    Entry::Occupied(entry) => {
                        warn!(%task_id, other = %entry.get(), "Conversation already has a task, skipping record");
                        continue;
                    }
                    Entry::Vacant(entry) => {
                        entry.insert(task_id);
                    }
                }
            }
            self.sessions.insert(task_id, Arc::new(Mutex::new(session)));
            restored += 1;
        }
        info!(restored, "Session records restored");
        Ok(restored)
    }

    /// Drop the in-memory registry; durable records are left in place
    pub fn shutdown(&self) {
        let count = self.sessions.len();
        self.by_session.clear();
        self.sessions.clear();
        self.tombstones.clear();
        info!(sessions = count, "Session manager shut down");
    }

    // -- internals ---------------------------------------------------------

    fn register(
        &self,
        session_id: SessionId,
        intent: TaskIntent,
        template: TemplateDescriptor,
        now: DateTime<Utc>,
    ) -> TaskId {
        let session = TaskSession::new(
            session_id,
            intent,
            self.config.profile,
            template,
            self.config.audit_capacity,
            now,
        );
        let task_id = session.task_id;
        self.persist(&session);
        self.sessions.insert(task_id, Arc::new(Mutex::new(session)));
        task_id
    }

    fn live_slot(&self, task_id: TaskId) -> Option<SessionSlot> {
        self.sessions.get(&task_id).map(|r| Arc::clone(r.value()))
    }

    fn slot(&self, task_id: TaskId) -> Result<SessionSlot> {
        if let Some(slot) = self.live_slot(task_id) {
            return Ok(slot);
        }
        Err(self.tombstones.get(&task_id).map_or_else(
            || SessionError::NotFound(format!("task {task_id}")),
            |t| SessionError::SessionNotActive {
                task_id,
                state: t.state,
            },
        ))
    }

    fn task_state(&self, task_id: TaskId) -> SessionState {
        if let Some(slot) = self.live_slot(task_id) {
            return slot.lock().state;
        }
        self.tombstones
            .get(&task_id)
            .map_or(SessionState::Idle, |t| t.state)
    }

    fn no_task_error(&self, session_id: &SessionId) -> SessionError {
        self.tombstones
            .iter()
            .filter(|t| &t.session_id == session_id)
            .max_by_key(|t| t.ended_at)
            .map_or_else(
                || SessionError::NotFound(format!("no task for session {session_id}")),
                |t| SessionError::SessionNotActive {
                    task_id: t.task_id,
                    state: t.state,
                },
            )
    }

    fn apply_locked(
        &self,
        session: &mut TaskSession,
        observation: &FieldObservation,
        now: DateTime<Utc>,
    ) -> Result<Outcome> {
        ensure_accepting(session)?;
        if observation.session_id() != &session.session_id {
            return Err(SessionError::ForeignObservation {
                expected: session.session_id.clone(),
                got: observation.session_id().clone(),
            });
        }
        session.touch(now);

        let outcome = self
            .resolver
            .observe(
                &mut session.parameter_store,
                &mut session.audit,
                &session.template,
                observation,
            )
            .map_err(SessionError::from)?;

        if outcome.is_accepted() && session.state == SessionState::Collecting && session.has_all_mandatory() {
            transition(session, SessionState::Ready)?;
        }
        Ok(outcome)
    }

    fn retire(&self, retired: Retired, unlink: bool) {
        let task_id = retired.task_id;
        // Tombstone before unlinking: a lookup that misses the live entry
        // must find the ended state.
        self.tombstones.insert(
            task_id,
            Tombstone {
                task_id,
                session_id: retired.session_id.clone(),
                state: retired.state,
                ended_at: retired.ended_at,
                last_activity_at: retired.last_activity_at,
            },
        );
        if unlink {
            self.by_session
                .remove_if(&retired.session_id, |_, linked| *linked == task_id);
        }
        if retired.profile == LifecycleProfile::Ephemeral {
            self.sessions.remove(&task_id);
            if let Err(e) = self.store.remove(task_id) {
                warn!(%task_id, error = %e, "Failed to remove session record");
            }
        }
    }

    fn expire_if_idle(&self, slot: &SessionSlot, now: DateTime<Utc>) -> Option<TaskId> {
        let retired = {
            let mut session = slot.lock();
            if !session.is_idle_expired(now, self.config.idle_timeout()) {
                return None;
            }
            match end_session(&mut session, SessionState::Expired, now) {
                Ok(retired) => retired,
                Err(e) => {
                    error!(task_id = %session.task_id, error = %e, "Expiry refused by state machine");
                    return None;
                }
            }
        };
        let task_id = retired.task_id;
        self.retire(retired, true);
        Some(task_id)
    }

    fn persist(&self, session: &TaskSession) {
        if session.state.is_terminal() && session.profile == LifecycleProfile::Ephemeral {
            return;
        }
        if let Err(e) = self.store.save(session) {
            warn!(task_id = %session.task_id, error = %e, "Failed to persist session record");
        }
    }
}

fn transition(session: &mut TaskSession, to: SessionState) -> Result<()> {
    let from = session.state;
    validate_transition(from, to)?;
    session.state = to;
    debug!(task_id = %session.task_id, %from, %to, "Task session transition");
    if to == SessionState::Ready && from == SessionState::Collecting {
        info!(task_id = %session.task_id, "Task session ready");
    }
    Ok(())
}

fn end_session(
    session: &mut TaskSession,
    to: SessionState,
    now: DateTime<Utc>,
) -> Result<Retired> {
    let from = session.state;
    validate_transition(from, to)?;
    session.state = to;
    if session.profile == LifecycleProfile::Ephemeral {
        session.purge();
    }
    info!(
        task_id = %session.task_id,
        session_id = %session.session_id,
        %from,
        %to,
        "Task session ended"
    );
    Ok(Retired {
        task_id: session.task_id,
        session_id: session.session_id.clone(),
        profile: session.profile,
        state: to,
        ended_at: now,
        last_activity_at: session.last_activity_at,
    })
}

fn ensure_live(session: &TaskSession) -> Result<()> {
    if session.state.is_terminal() {
        return Err(SessionError::SessionNotActive {
            task_id: session.task_id,
            state: session.state,
        });
    }
    Ok(())
}

fn ensure_accepting(session: &TaskSession) -> Result<()> {
    ensure_live(session)?;
    if !session.state.accepts_observations() {
        return Err(SessionError::SessionBusy {
            task_id: session.task_id,
            state: session.state,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use pnl_model::{ExtractionMethod, FieldKey, HeaderField, ModelError};
    use pnl_resolver::RejectReason;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 9, 0, 0).unwrap()
    }

    fn manager() -> SessionManager {
        SessionManager::new(SessionConfig::default()).unwrap()
    }

    fn sid() -> SessionId {
        SessionId::new("tab-1").unwrap()
    }

    fn obs(field: HeaderField, value: &str, method: ExtractionMethod) -> FieldObservation {
        FieldObservation::with_default_weight(sid(), FieldKey::header(field), value, method, t0())
    }

    fn fill_mandatory(m: &SessionManager, task: TaskId) {
        for (field, value) in [
            (HeaderField::PanelName, "LP-1"),
            (HeaderField::Voltage, "208Y/120V"),
            (HeaderField::Phase, "3"),
            (HeaderField::Wire, "4"),
            (HeaderField::NumberOfCircuits, "42"),
        ] {
            m.observe_task_at(task, &obs(field, value, ExtractionMethod::Manual), t0())
                .unwrap();
        }
    }

    #[test]
    fn start_refuses_second_task() {
        let m = manager();
        let task = m.start_task_at(sid(), TaskIntent::PanelSchedule, t0()).unwrap();
        let err = m.start_task_at(sid(), TaskIntent::OneLine, t0()).unwrap_err();
        assert!(matches!(err, SessionError::TaskAlreadyActive { task_id, .. } if task_id == task));
    }

    #[test]
    fn start_without_intent_is_refused() {
        let err = manager().start_task_at(sid(), TaskIntent::None, t0()).unwrap_err();
        assert!(matches!(err, SessionError::NoTaskIntent));
    }

    #[test]
    fn ready_after_all_mandatory_fields() {
        let m = manager();
        let task = m.start_task_at(sid(), TaskIntent::PanelSchedule, t0()).unwrap();
        assert_eq!(m.get_status_at(task, t0()).unwrap().missing_fields.len(), 5);
        fill_mandatory(&m, task);
        let status = m.get_status_at(task, t0()).unwrap();
        assert_eq!(status.state, SessionState::Ready);
        assert!(status.missing_fields.is_empty());
    }

    #[test]
    fn validation_error_leaves_session_collecting() {
        let m = manager();
        let task = m.start_task_at(sid(), TaskIntent::PanelSchedule, t0()).unwrap();
        let err = m
            .observe_task_at(task, &obs(HeaderField::NumberOfCircuits, "41", ExtractionMethod::Manual), t0())
            .unwrap_err();
        assert!(matches!(err, SessionError::Validation(ModelError::OddCircuitCount(41))));
        assert_eq!(m.get_status_at(task, t0()).unwrap().state, SessionState::Collecting);
    }

    #[test]
    fn lower_tier_is_rejected_silently() {
        let m = manager();
        let task = m.start_task_at(sid(), TaskIntent::PanelSchedule, t0()).unwrap();
        m.observe_task_at(task, &obs(HeaderField::Voltage, "208Y/120V", ExtractionMethod::AiVision), t0())
            .unwrap();
        let outcome = m
            .observe_task_at(task, &obs(HeaderField::Voltage, "480Y/277V", ExtractionMethod::Manual), t0())
            .unwrap();
        assert_eq!(outcome.reject_reason(), Some(RejectReason::LowerOrEqualConfidence));
    }

    #[test]
    fn finished_task_rejects_late_observation_and_frees_session() {
        let m = manager();
        let task = m.start_task_at(sid(), TaskIntent::PanelSchedule, t0()).unwrap();
        m.finish_at(task, t0()).unwrap();
        let err = m
            .observe_at(&obs(HeaderField::Voltage, "208Y/120V", ExtractionMethod::Manual), t0())
            .unwrap_err();
        assert!(matches!(err, SessionError::SessionNotActive { state: SessionState::Finished, .. }));
        assert_eq!(m.session_state(&sid()), SessionState::Idle);
        assert!(m.start_task_at(sid(), TaskIntent::PanelSchedule, t0()).is_ok());
    }

    #[test]
    fn confirm_from_collecting_is_illegal() {
        let m = manager();
        let task = m.start_task_at(sid(), TaskIntent::PanelSchedule, t0()).unwrap();
        let err = m.confirm_build_at(task, t0()).unwrap_err();
        assert!(matches!(
            err,
            SessionError::IllegalTransition {
                from: SessionState::Collecting,
                to: SessionState::Confirming
            }
        ));
    }

    #[test]
    fn confirming_refuses_observations_and_cancel_returns_to_ready() {
        let m = manager();
        let task = m.start_task_at(sid(), TaskIntent::PanelSchedule, t0()).unwrap();
        fill_mandatory(&m, task);
        m.confirm_build_at(task, t0()).unwrap();
        let err = m
            .observe_task_at(task, &obs(HeaderField::Mounting, "surface", ExtractionMethod::Manual), t0())
            .unwrap_err();
        assert!(matches!(err, SessionError::SessionBusy { state: SessionState::Confirming, .. }));
        assert_eq!(m.cancel_at(task, t0()).unwrap(), SessionState::Ready);
        assert!(m.get_snapshot_at(task, t0()).is_ok());
    }

    #[test]
    fn snapshot_not_found_while_collecting() {
        let m = manager();
        let task = m.start_task_at(sid(), TaskIntent::PanelSchedule, t0()).unwrap();
        assert!(matches!(m.get_snapshot_at(task, t0()), Err(SessionError::NotFound(_))));
    }

    #[test]
    fn status_poll_is_not_activity() {
        let m = manager();
        let task = m.start_task_at(sid(), TaskIntent::PanelSchedule, t0()).unwrap();
        let later = t0() + Duration::hours(3);
        assert_eq!(m.get_status_at(task, later).unwrap().last_activity_at, t0());
    }

    #[test]
    fn idle_task_expires_on_status_check() {
        let m = manager();
        let task = m.start_task_at(sid(), TaskIntent::PanelSchedule, t0()).unwrap();
        let late = t0() + Duration::hours(24) + Duration::seconds(1);
        let status = m.get_status_at(task, late).unwrap();
        assert_eq!(status.state, SessionState::Expired);
        assert!(status.missing_fields.is_empty());
    }

    #[test]
    fn expired_task_does_not_block_new_start() {
        let m = manager();
        let old = m.start_task_at(sid(), TaskIntent::PanelSchedule, t0()).unwrap();
        let late = t0() + Duration::days(2);
        let new = m.start_task_at(sid(), TaskIntent::PanelSchedule, late).unwrap();
        assert_ne!(old, new);
        assert_eq!(m.get_status_at(old, late).unwrap().state, SessionState::Expired);
        assert_eq!(m.task_for(&sid()), Some(new));
    }

    #[test]
    fn sweep_prunes_tombstones_after_retention() {
        let m = manager();
        let task = m.start_task_at(sid(), TaskIntent::PanelSchedule, t0()).unwrap();
        m.finish_at(task, t0()).unwrap();
        let report = m.sweep_expired_at(t0() + Duration::days(2));
        assert_eq!(report.pruned_tombstones, 1);
        assert!(matches!(m.get_status_at(task, t0()), Err(SessionError::NotFound(_))));
    }

    #[test]
    fn foreign_observation_is_refused() {
        let m = manager();
        let task = m.start_task_at(sid(), TaskIntent::PanelSchedule, t0()).unwrap();
        let other = FieldObservation::with_default_weight(
            SessionId::new("tab-2").unwrap(),
            FieldKey::header(HeaderField::Voltage),
            "480V",
            ExtractionMethod::Manual,
            t0(),
        );
        assert!(matches!(
            m.observe_task_at(task, &other, t0()),
            Err(SessionError::ForeignObservation { .. })
        ));
    }
}
