//! Scripted replay of session commands
//!
//! A script is JSON lines, one command per line, tagged by `cmd`:
//!
//! ```text
//! {"cmd":"start","session":"tab-1","intent":"panel_schedule"}
//! {"cmd":"observe","session":"tab-1","field":"voltage","value":"208Y/120V","method":"manual"}
//! {"cmd":"advance","secs":3600}
//! {"cmd":"status","session":"tab-1"}
//! ```
//!
//! Blank lines and lines starting with `#` are skipped. Commands run on a
//! virtual clock that only `advance` moves, so a script replays the same way
//! every time.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use pnl_model::{
    Confidence, ExtractionMethod, FieldKey, FieldObservation, FieldValue, PanelSchedule, SessionId,
    TaskId,
};
use pnl_session::{AdapterError, ExportBoundary, OutputRef, SessionError, SessionManager, TaskIntent};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::io::{BufRead, Write};
use tracing::{debug, info, warn};

/// One script line
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum ScriptCommand {
    /// Open a task for a conversation
    Start {
        /// Conversation key
        session: String,
        /// Deliverable requested
        intent: TaskIntent,
    },
    /// Report a field value
    Observe {
        /// Conversation key
        session: String,
        /// Dotted field key, e.g. `circuit.5.load_amps`
        field: FieldKey,
        /// Raw value
        value: FieldValue,
        /// Extraction method
        method: ExtractionMethod,
        /// Reported confidence; the method weight when absent
        #[serde(default)]
        confidence: Option<f64>,
    },
    /// Finish the conversation's task
    Finish {
        /// Conversation key
        session: String,
    },
    /// Cancel the conversation's task or its pending build
    Cancel {
        /// Conversation key
        session: String,
    },
    /// Close the conversation
    Close {
        /// Conversation key
        session: String,
    },
    /// Confirm a build
    Confirm {
        /// Conversation key
        session: String,
    },
    /// Run the export for a confirmed build
    Build {
        /// Conversation key
        session: String,
    },
    /// Report status
    Status {
        /// Conversation key
        session: String,
    },
    /// Export the frozen schedule
    Snapshot {
        /// Conversation key
        session: String,
    },
    /// Move the virtual clock forward
    Advance {
        /// Seconds to add
        secs: u64,
    },
    /// Run one expiry sweep
    Sweep,
}

impl ScriptCommand {
    /// Command name as written in scripts
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Start { .. } => "start",
            Self::Observe { .. } => "observe",
            Self::Finish { .. } => "finish",
            Self::Cancel { .. } => "cancel",
            Self::Close { .. } => "close",
            Self::Confirm { .. } => "confirm",
            Self::Build { .. } => "build",
            Self::Status { .. } => "status",
            Self::Snapshot { .. } => "snapshot",
            Self::Advance { .. } => "advance",
            Self::Sweep => "sweep",
        }
    }

    /// Parse one line; `None` for blank and comment lines
    ///
    /// # Errors
    /// Returns the JSON error for malformed lines.
    pub fn parse_line(line: &str) -> serde_json::Result<Option<Self>> {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            return Ok(None);
        }
        serde_json::from_str(line).map(Some)
    }
}

/// Printed result of one script line
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScriptResult {
    /// 1-based line number
    pub line: usize,
    /// Command name, or `invalid` for unparsable lines
    pub cmd: String,
    /// Whether the command succeeded
    pub ok: bool,
    /// Command output
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Failure message
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Totals for one replay
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReplaySummary {
    /// Commands executed
    pub commands: usize,
    /// Commands that returned an error
    pub failed: usize,
    /// Lines that were not valid commands
    pub invalid: usize,
}

/// Export boundary that renders nothing and names one JSON output per build
#[derive(Debug, Default, Clone, Copy)]
pub struct ReplayExport;

#[async_trait]
impl ExportBoundary for ReplayExport {
    async fn export(
        &self,
        task_id: TaskId,
        schedule: &PanelSchedule,
    ) -> Result<Vec<OutputRef>, AdapterError> {
        info!(%task_id, panel = %schedule.panel_name, circuits = schedule.circuits.len(), "Replay export");
        Ok(vec![OutputRef::new(
            format!("{}.json", schedule.panel_name),
            format!("replay://{task_id}"),
        )])
    }
}

/// Runs script commands against one manager
#[derive(Debug)]
pub struct Replayer {
    manager: SessionManager,
    exporter: ReplayExport,
    clock: DateTime<Utc>,
    last_task: HashMap<SessionId, TaskId>,
}

impl Replayer {
    /// Create replayer with the virtual clock at `start`
    #[must_use]
    pub fn new(manager: SessionManager, start: DateTime<Utc>) -> Self {
        Self {
            manager,
            exporter: ReplayExport,
            clock: start,
            last_task: HashMap::new(),
        }
    }

    /// Current virtual time
    #[inline]
    #[must_use]
    pub fn clock(&self) -> DateTime<Utc> {
        self.clock
    }

    /// Manager the script runs against
    #[inline]
    #[must_use]
    pub fn manager(&self) -> &SessionManager {
        &self.manager
    }

    /// Execute one command
    ///
    /// # Errors
    /// Returns the session error, with the command name as context.
    pub async fn execute(&mut self, command: ScriptCommand) -> Result<Value> {
        let name = command.name();
        self.dispatch(command)
            .await
            .with_context(|| format!("{name} failed"))
    }

    /// Run a whole script, writing one JSON result per command to `out`
    ///
    /// # Errors
    /// Fails only on I/O errors; command failures are reported inline.
    pub async fn run<R: BufRead, W: Write>(&mut self, reader: R, mut out: W) -> Result<ReplaySummary> {
        let mut summary = ReplaySummary::default();
        for (index, line) in reader.lines().enumerate() {
            let line = line.context("reading script")?;
            let number = index + 1;
            let result = match ScriptCommand::parse_line(&line) {
                Ok(None) => continue,
                Ok(Some(command)) => {
                    summary.commands += 1;
                    let cmd = command.name().to_string();
                    match self.execute(command).await {
                        Ok(value) => ScriptResult {
                            line: number,
                            cmd,
                            ok: true,
                            result: Some(value),
                            error: None,
                        },
                        Err(e) => {
                            summary.failed += 1;
                            debug!(line = number, error = %e, "Script command failed");
                            ScriptResult {
                                line: number,
                                cmd,
                                ok: false,
                                result: None,
                                error: Some(format!("{e:#}")),
                            }
                        }
                    }
                }
                Err(e) => {
                    summary.invalid += 1;
                    warn!(line = number, error = %e, "Invalid script line");
                    ScriptResult {
                        line: number,
                        cmd: "invalid".to_string(),
                        ok: false,
                        result: None,
                        error: Some(e.to_string()),
                    }
                }
            };
            serde_json::to_writer(&mut out, &result).context("writing result")?;
            writeln!(out).context("writing result")?;
        }
        out.flush().context("writing result")?;
        Ok(summary)
    }

    async fn dispatch(&mut self, command: ScriptCommand) -> Result<Value> {
        let now = self.clock;
        match command {
            ScriptCommand::Start { session, intent } => {
                let session_id = SessionId::new(&session)?;
                let task_id = self.manager.start_task_at(session_id.clone(), intent, now)?;
                self.last_task.insert(session_id, task_id);
                Ok(json!({ "task_id": task_id }))
            }
            ScriptCommand::Observe {
                session,
                field,
                value,
                method,
                confidence,
            } => {
                let session_id = SessionId::new(&session)?;
                let observation = match confidence {
                    Some(c) => FieldObservation::new(
                        session_id.clone(),
                        field,
                        value,
                        method,
                        Confidence::new(c)?,
                        now,
                    ),
                    None => FieldObservation::with_default_weight(session_id.clone(), field, value, method, now),
                };
                let outcome = self.manager.observe_at(&observation, now)?;
                Ok(json!({
                    "outcome": outcome,
                    "state": self.manager.session_state(&session_id),
                }))
            }
            ScriptCommand::Finish { session } => {
                let task_id = self.task(&session)?;
                self.manager.finish_at(task_id, now)?;
                Ok(json!({ "task_id": task_id, "state": "finished" }))
            }
            ScriptCommand::Cancel { session } => {
                let task_id = self.task(&session)?;
                let state = self.manager.cancel_at(task_id, now)?;
                Ok(json!({ "task_id": task_id, "state": state }))
            }
            ScriptCommand::Close { session } => {
                let session_id = SessionId::new(&session)?;
                let task_id = self.manager.close_session_at(&session_id, now)?;
                Ok(json!({ "task_id": task_id, "state": "finished" }))
            }
            ScriptCommand::Confirm { session } => {
                let task_id = self.task(&session)?;
                self.manager.confirm_build_at(task_id, now)?;
                Ok(json!({ "task_id": task_id, "state": "confirming" }))
            }
            ScriptCommand::Build { session } => {
                let task_id = self.task(&session)?;
                let outputs = self.manager.run_build_at(task_id, &self.exporter, now).await?;
                Ok(json!({ "task_id": task_id, "outputs": outputs }))
            }
            ScriptCommand::Status { session } => {
                let task_id = self.task(&session)?;
                Ok(serde_json::to_value(self.manager.get_status_at(task_id, now)?)?)
            }
            ScriptCommand::Snapshot { session } => {
                let task_id = self.task(&session)?;
                Ok(serde_json::to_value(self.manager.get_snapshot_at(task_id, now)?)?)
            }
            ScriptCommand::Advance { secs } => {
                let step = i64::try_from(secs)
                    .ok()
                    .and_then(Duration::try_seconds)
                    .ok_or_else(|| anyhow!("cannot advance by {secs} seconds"))?;
                self.clock = self
                    .clock
                    .checked_add_signed(step)
                    .ok_or_else(|| anyhow!("clock overflow"))?;
                Ok(json!({ "clock": self.clock }))
            }
            ScriptCommand::Sweep => Ok(serde_json::to_value(self.manager.sweep_expired_at(now))?),
        }
    }

    /// Task linked to a conversation, or the last one it ran
    fn task(&self, session: &str) -> Result<TaskId, SessionError> {
        let session_id = SessionId::new(session)?;
        self.manager
            .task_for(&session_id)
            .or_else(|| self.last_task.get(&session_id).copied())
            .ok_or_else(|| SessionError::NotFound(format!("no task for session {session_id}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pnl_model::HeaderField;

    #[test]
    fn parses_observe_line() {
        let line = r#"{"cmd":"observe","session":"tab-1","field":"circuit.5.load_amps","value":12.5,"method":"ai_vision"}"#;
        let command = ScriptCommand::parse_line(line).unwrap().unwrap();
        assert_eq!(
            command,
            ScriptCommand::Observe {
                session: "tab-1".into(),
                field: FieldKey::circuit(5, pnl_model::CircuitAttr::LoadAmps),
                value: FieldValue::Number(12.5),
                method: ExtractionMethod::AiVision,
                confidence: None,
            }
        );
    }

    #[test]
    fn parses_header_field_and_text_value() {
        let line = r#"{"cmd":"observe","session":"t","field":"voltage","value":"480V","method":"manual","confidence":0.5}"#;
        let Some(ScriptCommand::Observe { field, value, confidence, .. }) =
            ScriptCommand::parse_line(line).unwrap()
        else {
            panic!("not an observe command");
        };
        assert_eq!(field, FieldKey::header(HeaderField::Voltage));
        assert_eq!(value, FieldValue::from("480V"));
        assert_eq!(confidence, Some(0.5));
    }

    #[test]
    fn skips_blank_and_comment_lines() {
        assert_eq!(ScriptCommand::parse_line("   ").unwrap(), None);
        assert_eq!(ScriptCommand::parse_line("# setup").unwrap(), None);
    }

    #[test]
    fn unit_command_parses() {
        assert_eq!(
            ScriptCommand::parse_line(r#"{"cmd":"sweep"}"#).unwrap(),
            Some(ScriptCommand::Sweep)
        );
    }

    #[test]
    fn unknown_command_is_an_error() {
        assert!(ScriptCommand::parse_line(r#"{"cmd":"explode"}"#).is_err());
    }
}
