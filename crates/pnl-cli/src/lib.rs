//! PNL CLI
//!
//! Library half of the `panelctl` binary.
//!
//! # Core Concepts
//!
//! - **Replay**: a JSON-lines script of session commands runs against an
//!   in-process [`pnl_session::SessionManager`] on a virtual clock, one JSON
//!   result per command
//! - **Logging**: `tracing-subscriber` on stderr, so stdout stays
//!   machine-readable
//!
//! # Example
//!
//! ```rust
//! use pnl_cli::Replayer;
//! use pnl_session::{SessionConfig, SessionManager};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let manager = SessionManager::new(SessionConfig::default()).unwrap();
//! let mut replayer = Replayer::new(manager, chrono::Utc::now());
//! let script = r#"{"cmd":"start","session":"tab-1","intent":"panel_schedule"}"#;
//! let mut out = Vec::new();
//! let summary = replayer.run(script.as_bytes(), &mut out).await.unwrap();
//! assert_eq!(summary.failed, 0);
//! # }
//! ```

pub mod logging;
pub mod replay;

pub use logging::{init_logging, LogFormat, DEFAULT_FILTER};
pub use replay::{ReplayExport, ReplaySummary, Replayer, ScriptCommand, ScriptResult};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
