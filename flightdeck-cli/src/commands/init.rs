//! `flightdeck init <name> [--plan-dir <dir>]`

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use flightdeck_codec::scan_plan_dir;
use flightdeck_core::types::PhaseUpdate;
use flightdeck_core::Store;

/// Create a project with its seven-stage pipeline, optionally linking the
/// plan files found in `--plan-dir`.
#[derive(Args, Debug)]
pub struct InitArgs {
    /// Project name (e.g. "apollo").
    pub name: String,

    /// Directory holding `plan.md` and `phase-NN-*.md` files.
    #[arg(long)]
    pub plan_dir: Option<PathBuf>,
}

impl InitArgs {
    pub fn run(self) -> Result<()> {
        let plan_dir = match self.plan_dir {
            Some(dir) => Some(dir.canonicalize().with_context(|| {
                format!("cannot resolve plan directory '{}'", dir.display())
            })?),
            None => None,
        };

        let store = Store::open_default().context("failed to open the flightdeck store")?;
        if store.project_by_name(&self.name)?.is_some() {
            anyhow::bail!("project '{}' already exists", self.name);
        }

        let project = store
            .create_project(&self.name, plan_dir.as_deref())
            .with_context(|| format!("failed to create project '{}'", self.name))?;

        println!("✓ Created project '{}' ({})", project.name, project.id);

        let Some(dir) = plan_dir else {
            return Ok(());
        };

        let plan = scan_plan_dir(&dir);
        let mut linked = 0usize;
        for file in &plan.phases {
            let Some(phase) = store.phase_by_kind(&project.id, file.kind)? else {
                continue;
            };
            let update = PhaseUpdate {
                status: Some(file.status),
                plan_file_path: Some(file.path.clone()),
                ..Default::default()
            };
            store.update_phase(phase.id, &update).with_context(|| {
                format!("failed to link '{}' to phase '{}'", file.file_name, file.kind)
            })?;
            linked += 1;
        }

        if let Some(title) = &plan.title {
            println!("  Plan: {title}");
        }
        println!("  Linked {linked} phase file(s) from {}", dir.display());
        Ok(())
    }
}
