//! Flightdeck core library — domain types, SQLite store, errors.
//!
//! Public API surface:
//! - [`types`] — newtypes, enums, and domain structs
//! - [`error`] — [`StoreError`]
//! - [`store`] — [`Store`]: projects, lifecycle phases, append-only sync log

pub mod error;
pub mod store;
pub mod types;

pub use error::StoreError;
pub use store::Store;
pub use types::{
    PhaseId, PhaseKind, PhaseRecord, PhaseStatus, PhaseUpdate, Project, ProjectId, SyncLogEntry,
    SyncSource,
};
