//! `flightdeck projects`

use anyhow::{Context, Result};

use flightdeck_core::Store;

pub fn run() -> Result<()> {
    let store = Store::open_default().context("failed to open the flightdeck store")?;
    let projects = store.projects()?;

    if projects.is_empty() {
        println!("No projects yet.");
        println!("Run: flightdeck init <name> [--plan-dir <dir>]");
        return Ok(());
    }

    for project in projects {
        println!("{} ({})", project.name, project.id);
        match &project.plan_dir {
            Some(dir) => println!("  plan dir: {}", dir.display()),
            None => println!("  plan dir: (none)"),
        }
        let phases = store.phases(&project.id)?;
        let complete = phases
            .iter()
            .filter(|p| matches!(p.status, flightdeck_core::types::PhaseStatus::Complete))
            .count();
        println!("  phases: {}/{} complete", complete, phases.len());
    }

    Ok(())
}
