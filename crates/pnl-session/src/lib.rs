//! PNL Session
//!
//! Per-task session lifecycle for panel schedule collection.
//!
//! # Core Concepts
//!
//! - **Task session**: one deliverable being gathered for one conversation,
//!   with its own parameter store and audit trail
//! - **Lifecycle**: `Idle -> Collecting -> Ready -> Confirming -> Building ->
//!   Finished`, plus `Expired` after 24 hours without activity
//! - **Adapters**: vision/OCR extraction, language parsing, template lookup
//!   and export sit behind traits; their failures never end a session
//! - **Profiles**: ephemeral sessions are purged when they end, persistent
//!   ones are kept
//!
//! # Example
//!
//! ```rust
//! use pnl_model::{ExtractionMethod, FieldKey, FieldObservation, HeaderField, SessionId};
//! use pnl_session::{SessionConfig, SessionManager, SessionState, TaskIntent};
//!
//! let manager = SessionManager::new(SessionConfig::default()).unwrap();
//! let tab = SessionId::new("tab-1").unwrap();
//! let task = manager.start_task(tab.clone(), TaskIntent::PanelSchedule).unwrap();
//!
//! let obs = FieldObservation::with_default_weight(
//!     tab,
//!     FieldKey::header(HeaderField::NumberOfCircuits),
//!     42u32,
//!     ExtractionMethod::Manual,
//!     chrono::Utc::now(),
//! );
//! manager.observe(&obs).unwrap();
//! assert_eq!(manager.get_status(task).unwrap().state, SessionState::Collecting);
//! ```

#![warn(unreachable_pub)]

pub mod adapter;
pub mod config;
pub mod error;
pub mod manager;
pub mod parser;
pub mod snapshot;
pub mod state_machine;
pub mod store;
pub mod sweeper;
pub mod types;

pub use adapter::{
    ExportBoundary, ImageExtractor, LanguageParser, ParsedUtterance, StaticTemplateProvider,
    TemplateProvider, UserCommand,
};
pub use config::{MethodWeightOverrides, SessionConfig, StoreConfig};
pub use error::{AdapterError, Result, SessionError, StoreError};
pub use manager::{IngestReport, SessionManager, SweepReport, Tombstone, UtteranceReport};
pub use parser::RuleBasedParser;
pub use snapshot::build_schedule;
pub use state_machine::{allowed_transitions, is_terminal, validate_transition};
pub use store::{JsonFileStore, MemoryStore, SessionStore};
pub use sweeper::{SweeperHandle, MIN_SWEEP_PERIOD};
pub use types::{
    LifecycleProfile, OutputRef, SessionState, SessionStatus, TaskIntent, TaskSession, UploadKind,
    UploadRef,
};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
