//! `flightdeck phases <project> [--json]`

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use tabled::{settings::Style, Table, Tabled};

use flightdeck_core::types::{PhaseRecord, PhaseStatus};
use flightdeck_core::Store;

use super::resolve_project;

/// Show the seven lifecycle phases of a project.
#[derive(Args, Debug)]
pub struct PhasesArgs {
    /// Project name or id.
    pub project: String,

    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Tabled)]
struct PhaseRow {
    #[tabled(rename = "phase")]
    phase: String,
    #[tabled(rename = "status")]
    status: String,
    #[tabled(rename = "agent")]
    agent: String,
    #[tabled(rename = "plan file")]
    plan_file: String,
}

impl PhasesArgs {
    pub fn run(self) -> Result<()> {
        let store = Store::open_default().context("failed to open the flightdeck store")?;
        let project = resolve_project(&store, &self.project)?;
        let phases = store.phases(&project.id)?;

        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&phases).context("failed to serialize phases")?
            );
            return Ok(());
        }

        println!("{}", project.name.to_uppercase().bold());
        let rows: Vec<PhaseRow> = phases.iter().map(phase_row).collect();
        let mut table = Table::new(rows);
        table.with(Style::rounded());
        println!("{table}");
        Ok(())
    }
}

fn phase_row(phase: &PhaseRecord) -> PhaseRow {
    PhaseRow {
        phase: phase.kind.to_string(),
        status: status_label(phase.status),
        agent: phase.agent_id.clone().unwrap_or_else(|| "-".to_string()),
        plan_file: phase
            .plan_file_path
            .as_ref()
            .and_then(|p| p.file_name())
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "-".to_string()),
    }
}

fn status_label(status: PhaseStatus) -> String {
    match status {
        PhaseStatus::Pending => "pending".bright_black().to_string(),
        PhaseStatus::Active => "active".cyan().bold().to_string(),
        PhaseStatus::Blocked => "blocked".red().bold().to_string(),
        PhaseStatus::Complete => "complete".green().to_string(),
        PhaseStatus::Skipped => "skipped".yellow().to_string(),
    }
}
