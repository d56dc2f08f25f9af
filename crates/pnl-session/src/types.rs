//! Core session types
//!
//! Defines the session record and the values exchanged with callers:
//! - Lifecycle states and profiles
//! - Task intents
//! - Upload and output references
//! - Status reports

use chrono::{DateTime, Duration, Utc};
use pnl_grid::{CircuitGrid, Violation};
use pnl_model::{FieldKey, SessionId, TaskId, TemplateDescriptor};
use pnl_resolver::{AuditTrail, ParameterStore};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Lifecycle state of a task session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// No task running for the conversation
    Idle,
    /// Gathering mandatory fields
    Collecting,
    /// All mandatory fields present
    Ready,
    /// User asked to build; awaiting export
    Confirming,
    /// Export boundary running
    Building,
    /// Completed, cancelled or closed (terminal)
    Finished,
    /// Idle past the timeout (terminal)
    Expired,
}

impl SessionState {
    /// Every state
    pub const ALL: [Self; 7] = [
        Self::Idle,
        Self::Collecting,
        Self::Ready,
        Self::Confirming,
        Self::Building,
        Self::Finished,
        Self::Expired,
    ];

    /// Check if state is terminal
    #[inline]
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Finished | Self::Expired)
    }

    /// Whether observations may be applied in this state
    #[inline]
    #[must_use]
    pub const fn accepts_observations(self) -> bool {
        matches!(self, Self::Collecting | Self::Ready)
    }

    /// Whether a snapshot may be exported in this state
    #[inline]
    #[must_use]
    pub const fn exposes_snapshot(self) -> bool {
        matches!(self, Self::Ready | Self::Confirming | Self::Building)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Collecting => "collecting",
            Self::Ready => "ready",
            Self::Confirming => "confirming",
            Self::Building => "building",
            Self::Finished => "finished",
            Self::Expired => "expired",
        };
        f.write_str(s)
    }
}

/// Retention behavior sharing the one state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleProfile {
    /// Purged on terminal state, expires when idle
    #[default]
    Ephemeral,
    /// Kept after terminal state and across restarts, never expires
    Persistent,
}

/// Deliverable the user asked for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskIntent {
    /// Panel schedule
    PanelSchedule,
    /// One-line diagram
    OneLine,
    /// Power plan
    PowerPlan,
    /// Lighting plan
    LightingPlan,
    /// Site plan
    SitePlan,
    /// Detail sheets
    Details,
    /// No task detected
    None,
}

impl TaskIntent {
    /// Whether the intent opens a task session
    #[inline]
    #[must_use]
    pub const fn starts_task(self) -> bool {
        !matches!(self, Self::None)
    }
}

impl fmt::Display for TaskIntent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::PanelSchedule => "panel_schedule",
            Self::OneLine => "one_line",
            Self::PowerPlan => "power_plan",
            Self::LightingPlan => "lighting_plan",
            Self::SitePlan => "site_plan",
            Self::Details => "details",
            Self::None => "none",
        };
        f.write_str(s)
    }
}

/// Kind of material handed in by the surface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadKind {
    /// Photo of a panelboard or existing schedule
    Image,
    /// Blank form template
    Template,
    /// Any other document
    Document,
}

/// Reference to uploaded material (the bytes live elsewhere)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadRef {
    /// Display name
    pub name: String,
    /// What it is
    pub kind: UploadKind,
    /// Where the surface stored it
    pub location: String,
}

impl UploadRef {
    /// Image upload
    #[must_use]
    pub fn image(name: impl Into<String>, location: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: UploadKind::Image,
            location: location.into(),
        }
    }
}

/// Reference to a deliverable produced by the export boundary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputRef {
    /// Display name
    pub name: String,
    /// Where the export boundary put it
    pub location: String,
}

impl OutputRef {
    /// Create output reference
    #[must_use]
    pub fn new(name: impl Into<String>, location: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            location: location.into(),
        }
    }
}

/// Status report for polling surfaces
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionStatus {
    /// Task
    pub task_id: TaskId,
    /// Conversation
    pub session_id: SessionId,
    /// Current state
    pub state: SessionState,
    /// Mandatory fields still without a value
    pub missing_fields: Vec<FieldKey>,
    /// Structural grid problems
    pub violations: Vec<Violation>,
    /// Fields with a credible competing reading
    pub needs_review: Vec<FieldKey>,
    /// Upload each current value was read from, where known
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub value_sources: BTreeMap<FieldKey, String>,
    /// Last command or observation
    pub last_activity_at: DateTime<Utc>,
}

/// Record of one task session
///
/// This is also the persisted form: one record per task id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSession {
    /// Task
    pub task_id: TaskId,
    /// Conversation
    pub session_id: SessionId,
    /// Deliverable requested
    pub intent: TaskIntent,
    /// Retention behavior
    pub profile: LifecycleProfile,
    /// Lifecycle state
    pub state: SessionState,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last command or observation
    pub last_activity_at: DateTime<Utc>,
    /// Template read when collection began
    pub template: TemplateDescriptor,
    /// Current best values
    pub parameter_store: ParameterStore,
    /// Resolution history
    pub audit: AuditTrail,
    /// Uploaded material
    pub upload_refs: Vec<UploadRef>,
    /// Delivered outputs
    pub output_refs: Vec<OutputRef>,
}

impl TaskSession {
    /// Fresh session in `Collecting`
    #[must_use]
    pub fn new(
        session_id: SessionId,
        intent: TaskIntent,
        profile: LifecycleProfile,
        template: TemplateDescriptor,
        audit_capacity: usize,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            task_id: TaskId::new(),
            session_id,
            intent,
            profile,
            state: SessionState::Collecting,
            created_at: now,
            last_activity_at: now,
            template,
            parameter_store: ParameterStore::new(),
            audit: AuditTrail::with_capacity(audit_capacity),
            upload_refs: Vec::new(),
            output_refs: Vec::new(),
        }
    }

    /// Mandatory fields still without a value
    #[must_use]
    pub fn missing_fields(&self) -> Vec<FieldKey> {
        self.parameter_store
            .missing(&self.template.mandatory_keys())
    }

    /// Whether every mandatory field holds a value
    #[must_use]
    pub fn has_all_mandatory(&self) -> bool {
        self.missing_fields().is_empty()
    }

    /// Structural violations; empty until the circuit count is known
    #[must_use]
    pub fn violations(&self) -> Vec<Violation> {
        CircuitGrid::from_store(&self.parameter_store, &self.template)
            .map(|grid| grid.validate())
            .unwrap_or_default()
    }

    /// Whether the idle timeout has elapsed; persistent sessions never expire
    #[must_use]
    pub fn is_idle_expired(&self, now: DateTime<Utc>, timeout: Duration) -> bool {
        self.profile == LifecycleProfile::Ephemeral
            && !self.state.is_terminal()
            && now - self.last_activity_at > timeout
    }

    /// Refresh the activity clock
    #[inline]
    pub fn touch(&mut self, now: DateTime<Utc>) {
        if now > self.last_activity_at {
            self.last_activity_at = now;
        }
    }

    /// Destroy every field, reference and audit entry
    pub fn purge(&mut self) {
        self.parameter_store.clear();
        self.audit.clear();
        self.upload_refs.clear();
        self.output_refs.clear();
    }

    /// Status report
    #[must_use]
    pub fn status(&self) -> SessionStatus {
        let live = !self.state.is_terminal() || self.profile == LifecycleProfile::Persistent;
        SessionStatus {
            task_id: self.task_id,
            session_id: self.session_id.clone(),
            state: self.state,
            missing_fields: if live { self.missing_fields() } else { Vec::new() },
            violations: if live { self.violations() } else { Vec::new() },
            needs_review: if live {
                self.audit.needs_review(&self.parameter_store)
            } else {
                Vec::new()
            },
            value_sources: if live {
                self.parameter_store
                    .sources()
                    .map(|(key, source)| (key, source.to_owned()))
                    .collect()
            } else {
                BTreeMap::new()
            },
            last_activity_at: self.last_activity_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn session(profile: LifecycleProfile) -> TaskSession {
        TaskSession::new(
            SessionId::new("tab").unwrap(),
            TaskIntent::PanelSchedule,
            profile,
            TemplateDescriptor::three_phase(),
            16,
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        )
    }

    #[test]
    fn fresh_session_misses_every_mandatory_field() {
        let s = session(LifecycleProfile::Ephemeral);
        assert_eq!(s.state, SessionState::Collecting);
        assert_eq!(s.missing_fields(), s.template.mandatory_keys());
        assert!(s.violations().is_empty());
    }

    #[test]
    fn idle_expiry_is_strictly_after_timeout() {
        let s = session(LifecycleProfile::Ephemeral);
        let day = Duration::hours(24);
        assert!(!s.is_idle_expired(s.last_activity_at + day, day));
        assert!(s.is_idle_expired(s.last_activity_at + day + Duration::seconds(1), day));
    }

    #[test]
    fn persistent_sessions_do_not_expire() {
        let s = session(LifecycleProfile::Persistent);
        assert!(!s.is_idle_expired(s.last_activity_at + Duration::days(30), Duration::hours(24)));
    }

    #[test]
    fn touch_never_moves_backwards() {
        let mut s = session(LifecycleProfile::Ephemeral);
        let before = s.last_activity_at;
        s.touch(before - Duration::minutes(5));
        assert_eq!(s.last_activity_at, before);
    }

    #[test]
    fn intent_none_does_not_start_tasks() {
        assert!(!TaskIntent::None.starts_task());
        assert!(TaskIntent::OneLine.starts_task());
    }
}
