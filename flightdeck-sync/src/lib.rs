//! Flightdeck sync engine.
//!
//! Keeps lifecycle phase records in the store and plan-file front matter
//! consistent in both directions. [`SyncEngine`] is the single entry point:
//! start it over a plan directory and it reacts to filesystem edits
//! (debounced, echo-suppressed, conflict-checked); call
//! [`SyncEngine::write_to_file`] to push dashboard-side changes out to the
//! files.

pub mod config;
pub mod conflict;
pub mod engine;
pub mod error;

pub use config::{SyncConfig, DEBOUNCE_WINDOW, SUPPRESSION_WINDOW};
pub use conflict::{ActiveConflict, Resolution};
pub use engine::{EngineStatus, SyncEngine, SyncStatus};
pub use error::SyncError;
