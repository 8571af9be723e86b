pub mod conflicts;
pub mod daemon;
pub mod init;
pub mod lifecycle;
pub mod log;
pub mod phases;
pub mod projects;
pub mod status;
pub mod write;

use std::path::PathBuf;

use anyhow::{Context, Result};

use flightdeck_core::types::{Project, ProjectId};
use flightdeck_core::Store;

pub(crate) fn home() -> Result<PathBuf> {
    dirs::home_dir().context("could not determine home directory")
}

/// Look a project up by name first, falling back to treating the argument
/// as an id.
pub(crate) fn resolve_project(store: &Store, name_or_id: &str) -> Result<Project> {
    if let Some(project) = store.project_by_name(name_or_id)? {
        return Ok(project);
    }
    store
        .project(&ProjectId::from(name_or_id))
        .with_context(|| format!("no project named '{name_or_id}' — run `flightdeck init` first"))
}
