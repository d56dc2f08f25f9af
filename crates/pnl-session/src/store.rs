//! Durable session records
//!
//! The manager writes a task's full record after every mutation and removes
//! it when an ephemeral task is purged. Write failures are the caller's to
//! log; they never change session behavior.

use crate::error::StoreError;
use crate::types::TaskSession;
use dashmap::DashMap;
use pnl_model::TaskId;
use std::fmt::Debug;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Persistence backend for task session records
pub trait SessionStore: Send + Sync + Debug {
    /// Insert or replace the record for `session.task_id`
    ///
    /// # Errors
    /// Returns [`StoreError`] if the record cannot be written.
    fn save(&self, session: &TaskSession) -> Result<(), StoreError>;

    /// Delete a record; deleting a missing record is not an error
    ///
    /// # Errors
    /// Returns [`StoreError`] if the record exists but cannot be removed.
    fn remove(&self, task_id: TaskId) -> Result<(), StoreError>;

    /// Load one record
    ///
    /// # Errors
    /// Returns [`StoreError`] if the record exists but cannot be read.
    fn load(&self, task_id: TaskId) -> Result<Option<TaskSession>, StoreError>;

    /// Load every readable record
    ///
    /// # Errors
    /// Returns [`StoreError`] if the backend itself cannot be listed.
    fn load_all(&self) -> Result<Vec<TaskSession>, StoreError>;
}

/// Records kept in process memory
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: DashMap<TaskId, TaskSession>,
}

impl MemoryStore {
    /// Create empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Check if empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl SessionStore for MemoryStore {
    fn save(&self, session: &TaskSession) -> Result<(), StoreError> {
        self.records.insert(session.task_id, session.clone());
        Ok(())
    }

    fn remove(&self, task_id: TaskId) -> Result<(), StoreError> {
        self.records.remove(&task_id);
        Ok(())
    }

    fn load(&self, task_id: TaskId) -> Result<Option<TaskSession>, StoreError> {
        Ok(self.records.get(&task_id).map(|r| r.value().clone()))
    }

    fn load_all(&self) -> Result<Vec<TaskSession>, StoreError> {
        Ok(self.records.iter().map(|r| r.value().clone()).collect())
    }
}

/// One JSON document per task under a directory
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    /// Open (and create if needed) the record directory
    ///
    /// # Errors
    /// Returns [`StoreError::Io`] if the directory cannot be created.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    /// Record directory
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, task_id: TaskId) -> PathBuf {
        self.dir.join(format!("{task_id}.json"))
    }

    fn read(path: &Path) -> Result<TaskSession, StoreError> {
        let raw = fs::read(path)?;
        Ok(serde_json::from_slice(&raw)?)
    }
}

impl SessionStore for JsonFileStore {
    fn save(&self, session: &TaskSession) -> Result<(), StoreError> {
        let path = self.path_for(session.task_id);
        let tmp = path.with_extension("json.tmp");
        let bytes = serde_json::to_vec_pretty(session)?;
        fs::write(&tmp, bytes)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn remove(&self, task_id: TaskId) -> Result<(), StoreError> {
        match fs::remove_file(self.path_for(task_id)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn load(&self, task_id: TaskId) -> Result<Option<TaskSession>, StoreError> {
        let path = self.path_for(task_id);
        if !path.exists() {
            return Ok(None);
        }
        Self::read(&path).map(Some)
    }

    fn load_all(&self) -> Result<Vec<TaskSession>, StoreError> {
        let mut sessions = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match Self::read(&path) {
                Ok(session) => sessions.push(session),
                Err(e) => warn!(path = %path.display(), error = %e, "Skipping unreadable session record"),
            }
        }
        sessions.sort_by_key(|s| s.task_id);
        Ok(sessions)
    }
}
