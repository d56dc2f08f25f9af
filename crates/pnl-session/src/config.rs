//! Session manager configuration
//!
//! Loaded from TOML. Every key is optional:
//!
//! ```toml
//! idle_timeout_secs = 86400
//! sweep_interval_secs = 300
//! profile = "ephemeral"
//! store = { json_dir = "/var/lib/pnl/sessions" }
//!
//! [method_weights]
//! text_ocr = 0.55
//! ```

use crate::error::{Result, SessionError};
use crate::store::{JsonFileStore, MemoryStore, SessionStore};
use crate::types::LifecycleProfile;
use pnl_model::{ExtractionMethod, TemplateDescriptor};
use pnl_resolver::{ConfidenceResolver, MethodWeights};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Per-method weight overrides; absent entries keep the built-in weight
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MethodWeightOverrides {
    /// Vision model reading an image
    pub ai_vision: Option<f64>,
    /// User typed or spoke the value
    pub manual: Option<f64>,
    /// Vision model after an OCR failure
    pub ai_ocr_fallback: Option<f64>,
    /// Plain text OCR
    pub text_ocr: Option<f64>,
}

impl MethodWeightOverrides {
    /// Build the resolver's weight table
    ///
    /// # Errors
    /// Returns [`SessionError::Config`] for weights outside `[0, 1]`.
    pub fn to_weights(&self) -> Result<MethodWeights> {
        let entries = [
            (ExtractionMethod::AiVision, self.ai_vision),
            (ExtractionMethod::Manual, self.manual),
            (ExtractionMethod::AiOcrFallback, self.ai_ocr_fallback),
            (ExtractionMethod::TextOcr, self.text_ocr),
        ];
        entries
            .into_iter()
            .try_fold(MethodWeights::new(), |weights, (method, value)| match value {
                Some(v) => weights.try_with_weight(method, v).map_err(SessionError::from),
                None => Ok(weights),
            })
    }
}

/// Where session records are written
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreConfig {
    /// In-process only; nothing survives a restart
    #[default]
    Memory,
    /// One JSON document per task under a directory
    JsonDir(PathBuf),
}

/// Session manager configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Seconds without activity before an ephemeral task expires
    pub idle_timeout_secs: u64,
    /// Seconds between background expiry sweeps
    pub sweep_interval_secs: u64,
    /// Seconds a terminal task's tombstone is kept for status queries
    pub tombstone_retention_secs: u64,
    /// Audit entries kept per task
    pub audit_capacity: usize,
    /// Retention profile for new tasks
    pub profile: LifecycleProfile,
    /// Durable store
    pub store: StoreConfig,
    /// Method weight overrides
    pub method_weights: MethodWeightOverrides,
    /// Template used when the template provider fails
    pub template: TemplateDescriptor,
}

impl SessionConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse and validate TOML
    ///
    /// # Errors
    /// Returns [`SessionError::Config`] on malformed TOML or invalid values.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw).map_err(|e| SessionError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file
    ///
    /// # Errors
    /// Returns [`SessionError::Config`] if the file cannot be read or is invalid.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| SessionError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&raw)
    }

    /// Render as TOML
    ///
    /// # Errors
    /// Returns [`SessionError::Config`] if serialization fails.
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| SessionError::Config(e.to_string()))
    }

    /// Check values
    ///
    /// # Errors
    /// Returns [`SessionError::Config`] naming the first bad value.
    pub fn validate(&self) -> Result<()> {
        if self.idle_timeout_secs == 0 {
            return Err(SessionError::Config("idle_timeout_secs must be positive".into()));
        }
        if self.sweep_interval_secs == 0 {
            return Err(SessionError::Config("sweep_interval_secs must be positive".into()));
        }
        if seconds(self.idle_timeout_secs).is_none() || seconds(self.tombstone_retention_secs).is_none() {
            return Err(SessionError::Config("timeouts must fit in i64 seconds".into()));
        }
        self.template
            .validate()
            .map_err(|e| SessionError::Config(format!("template: {e}")))?;
        self.method_weights.to_weights()?;
        Ok(())
    }

    /// Idle timeout as a signed duration
    #[must_use]
    pub fn idle_timeout(&self) -> chrono::Duration {
        seconds(self.idle_timeout_secs).unwrap_or(chrono::Duration::MAX)
    }

    /// Tombstone retention as a signed duration
    #[must_use]
    pub fn tombstone_retention(&self) -> chrono::Duration {
        seconds(self.tombstone_retention_secs).unwrap_or(chrono::Duration::MAX)
    }

    /// Sweep period
    #[must_use]
    pub fn sweep_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.sweep_interval_secs)
    }

    /// Resolver configured with this weight table
    ///
    /// # Errors
    /// Returns [`SessionError::Config`] for invalid weights.
    pub fn resolver(&self) -> Result<ConfidenceResolver> {
        Ok(ConfidenceResolver::new().with_weights(self.method_weights.to_weights()?))
    }

    /// Open the configured durable store
    ///
    /// # Errors
    /// Returns [`SessionError::Store`] if the directory cannot be created.
    pub fn open_store(&self) -> Result<Arc<dyn SessionStore>> {
        Ok(match &self.store {
            StoreConfig::Memory => Arc::new(MemoryStore::new()),
            StoreConfig::JsonDir(dir) => Arc::new(JsonFileStore::open(dir)?),
        })
    }

    /// With idle timeout
    #[inline]
    #[must_use]
    pub fn with_idle_timeout_secs(mut self, secs: u64) -> Self {
        self.idle_timeout_secs = secs;
        self
    }

    /// With sweep interval
    #[inline]
    #[must_use]
    pub fn with_sweep_interval_secs(mut self, secs: u64) -> Self {
        self.sweep_interval_secs = secs;
        self
    }

    /// With tombstone retention
    #[inline]
    #[must_use]
    pub fn with_tombstone_retention_secs(mut self, secs: u64) -> Self {
        self.tombstone_retention_secs = secs;
        self
    }

    /// With lifecycle profile
    #[inline]
    #[must_use]
    pub fn with_profile(mut self, profile: LifecycleProfile) -> Self {
        self.profile = profile;
        self
    }

    /// With fallback template
    #[inline]
    #[must_use]
    pub fn with_template(mut self, template: TemplateDescriptor) -> Self {
        self.template = template;
        self
    }

    /// With durable store
    #[inline]
    #[must_use]
    pub fn with_store(mut self, store: StoreConfig) -> Self {
        self.store = store;
        self
    }

    /// With audit capacity
    #[inline]
    #[must_use]
    pub fn with_audit_capacity(mut self, capacity: usize) -> Self {
        self.audit_capacity = capacity;
        self
    }
}

fn seconds(secs: u64) -> Option<chrono::Duration> {
    i64::try_from(secs).ok().and_then(chrono::Duration::try_seconds)
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            idle_timeout_secs: 24 * 60 * 60,
            sweep_interval_secs: 300,
            tombstone_retention_secs: 24 * 60 * 60,
            audit_capacity: 256,
            profile: LifecycleProfile::Ephemeral,
            store: StoreConfig::Memory,
            method_weights: MethodWeightOverrides::default(),
            template: TemplateDescriptor::three_phase(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_gives_defaults() {
        let config = SessionConfig::from_toml_str("").unwrap();
        assert_eq!(config, SessionConfig::default());
        assert_eq!(config.idle_timeout(), chrono::Duration::hours(24));
    }

    #[test]
    fn parses_overrides() {
        let config = SessionConfig::from_toml_str(
            r#"
            idle_timeout_secs = 600
            profile = "persistent"
            store = { json_dir = "/tmp/pnl" }

            [method_weights]
            text_ocr = 0.5
            "#,
        )
        .unwrap();
        assert_eq!(config.idle_timeout_secs, 600);
        assert_eq!(config.profile, LifecycleProfile::Persistent);
        assert_eq!(config.store, StoreConfig::JsonDir(PathBuf::from("/tmp/pnl")));
        let weights = config.method_weights.to_weights().unwrap();
        assert!((weights.weight(ExtractionMethod::TextOcr).value() - 0.5).abs() < f64::EPSILON);
        assert!((weights.weight(ExtractionMethod::AiVision).value() - 0.85).abs() < f64::EPSILON);
    }

    #[test]
    fn rejects_out_of_range_weight() {
        let err = SessionConfig::from_toml_str("[method_weights]\nmanual = 1.5\n").unwrap_err();
        assert!(matches!(err, SessionError::Config(_)));
    }

    #[test]
    fn rejects_zero_timeout() {
        let err = SessionConfig::from_toml_str("idle_timeout_secs = 0").unwrap_err();
        assert!(matches!(err, SessionError::Config(_)));
    }

    #[test]
    fn rejects_unknown_method() {
        assert!(SessionConfig::from_toml_str("[method_weights]\nsonar = 0.9\n").is_err());
    }

    #[test]
    fn default_renders_and_reparses() {
        let rendered = SessionConfig::default().to_toml_string().unwrap();
        assert_eq!(SessionConfig::from_toml_str(&rendered).unwrap(), SessionConfig::default());
    }
}
