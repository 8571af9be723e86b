//! `flightdeck advance` and `flightdeck rollback`

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use clap::Args;

use flightdeck_core::types::{PhaseKind, PhaseStatus};
use flightdeck_core::Store;

use super::resolve_project;

#[derive(Debug, Clone, Copy)]
pub enum Direction {
    Forward,
    Back,
}

/// Move one phase of a project through the pipeline.
#[derive(Args, Debug)]
pub struct TransitionArgs {
    /// Project name or id.
    pub project: String,

    /// Phase: requirements | planning | research | implementation |
    /// testing | review | deploy.
    pub phase: PhaseKind,
}

pub fn run(args: TransitionArgs, direction: Direction) -> Result<()> {
    let store = Store::open_default().context("failed to open the flightdeck store")?;
    let project = resolve_project(&store, &args.project)?;
    let phase = store
        .phase_by_kind(&project.id, args.phase)?
        .with_context(|| format!("project '{}' has no '{}' phase", project.name, args.phase))?;

    let new_status = match direction {
        Direction::Forward => store.advance_phase(phase.id)?,
        Direction::Back => store.rollback_phase(phase.id)?,
    };
    println!("✓ {} is now {}", args.phase, new_status);

    // Mirror the transition into the backing plan file. The daemon's
    // watcher will see matching states on both sides, so this never
    // manufactures a conflict.
    if let Some(path) = &phase.plan_file_path {
        let mut updates = BTreeMap::new();
        updates.insert(
            "status".to_string(),
            serde_yaml::Value::String(new_status.to_string()),
        );
        flightdeck_codec::write(path, &updates)
            .with_context(|| format!("failed to update '{}'", path.display()))?;
        println!("  Updated {}", path.display());
    }

    // A completed phase ticks its checklist entry in the plan overview.
    if new_status == PhaseStatus::Complete {
        if let Some(plan_dir) = &project.plan_dir {
            let overview = plan_dir.join("plan.md");
            if overview.exists() {
                let ticked = flightdeck_codec::check_items(
                    &overview,
                    &[args.phase.as_str().to_string()],
                )
                .with_context(|| format!("failed to update '{}'", overview.display()))?;
                if ticked {
                    println!("  Checked off '{}' in plan.md", args.phase);
                }
            }
        }
    }

    Ok(())
}
