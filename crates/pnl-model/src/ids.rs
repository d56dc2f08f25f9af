//! Task and session identifiers

use crate::error::ModelError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use ulid::Ulid;

/// Maximum length of a sanitized session key
const SESSION_ID_MAX_LEN: usize = 40;

/// Unique task identifier (ULID for sortability)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TaskId(pub Ulid);

impl TaskId {
    /// Generate new task ID
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TaskId {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ulid::from_string(s.trim())
            .map(Self)
            .map_err(|_| ModelError::InvalidTaskId(s.to_string()))
    }
}

/// Caller-supplied conversation key
///
/// Keys come from outside (browser tabs, chat threads), so they are
/// reduced to `[A-Za-z0-9_-]` and capped at 40 characters.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SessionId(String);

impl SessionId {
    /// Sanitize and wrap a raw session key
    pub fn new(raw: impl AsRef<str>) -> Result<Self, ModelError> {
        let raw = raw.as_ref();
        let cleaned: String = raw
            .chars()
            .filter(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
            .take(SESSION_ID_MAX_LEN)
            .collect();
        if cleaned.is_empty() {
            return Err(ModelError::InvalidSessionId(raw.to_string()));
        }
        Ok(Self(cleaned))
    }

    /// Generate a random session key
    #[inline]
    #[must_use]
    pub fn generate() -> Self {
        Self(Ulid::new().to_string())
    }

    /// Borrow the key
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for SessionId {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for SessionId {
    type Error = ModelError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<SessionId> for String {
    fn from(id: SessionId) -> Self {
        id.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_id_roundtrips_through_display() {
        let id = TaskId::new();
        let parsed: TaskId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn task_id_rejects_garbage() {
        assert!(matches!(
            "not-a-ulid".parse::<TaskId>(),
            Err(ModelError::InvalidTaskId(_))
        ));
    }

    #[test]
    fn session_id_is_sanitized() {
        let id = SessionId::new("tab 42/../etc").unwrap();
        assert_eq!(id.as_str(), "tab42etc");
    }

    #[test]
    fn session_id_is_capped() {
        let id = SessionId::new("x".repeat(100)).unwrap();
        assert_eq!(id.as_str().len(), 40);
    }

    #[test]
    fn session_id_rejects_empty_after_cleaning() {
        assert!(SessionId::new("  ///  ").is_err());
    }
}
