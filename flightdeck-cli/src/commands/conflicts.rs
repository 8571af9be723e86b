//! `flightdeck conflicts` and `flightdeck resolve`

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use tabled::{settings::Style, Table, Tabled};

use flightdeck_daemon::{request_conflicts, request_resolve, DaemonError};
use flightdeck_sync::{ActiveConflict, Resolution};

use super::home;

/// List the sync conflicts waiting for a decision.
#[derive(Args, Debug)]
pub struct ConflictsArgs {
    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Tabled)]
struct ConflictRow {
    #[tabled(rename = "id")]
    id: u64,
    #[tabled(rename = "field")]
    field: String,
    #[tabled(rename = "dashboard")]
    dashboard: String,
    #[tabled(rename = "file")]
    file: String,
    #[tabled(rename = "plan file")]
    plan_file: String,
    #[tabled(rename = "detected")]
    detected: String,
}

impl ConflictsArgs {
    pub fn run(self) -> Result<()> {
        let home = home()?;
        let data = match request_conflicts(&home) {
            Ok(data) => data,
            Err(DaemonError::DaemonNotRunning { .. }) => {
                anyhow::bail!("daemon is not running — run `flightdeck daemon start`")
            }
            Err(err) => return Err(err).context("failed to fetch conflicts"),
        };

        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&data).context("failed to render conflicts JSON")?
            );
            return Ok(());
        }

        let conflicts: Vec<ActiveConflict> = serde_json::from_value(data["conflicts"].clone())
            .context("unexpected conflicts payload from daemon")?;

        if conflicts.is_empty() {
            println!("No conflicts. Everything is {}.", "synced".green());
            return Ok(());
        }

        let rows: Vec<ConflictRow> = conflicts
            .iter()
            .map(|c| ConflictRow {
                id: c.id,
                field: c.field.field.clone(),
                dashboard: c.field.db_value.clone(),
                file: c.field.file_value.clone(),
                plan_file: c
                    .path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| c.path.display().to_string()),
                detected: c.detected_at.format("%Y-%m-%d %H:%M:%S").to_string(),
            })
            .collect();

        let mut table = Table::new(rows);
        table.with(Style::rounded());
        println!("{table}");
        println!("Resolve with: flightdeck resolve <id> <use_dashboard|use_file>");
        Ok(())
    }
}

/// Settle one conflict: keep the dashboard's value or the file's.
#[derive(Args, Debug)]
pub struct ResolveArgs {
    /// Conflict id from `flightdeck conflicts`.
    pub conflict_id: u64,

    /// Which side wins: use_dashboard | use_file.
    pub resolution: Resolution,
}

impl ResolveArgs {
    pub fn run(self) -> Result<()> {
        let home = home()?;
        match request_resolve(&home, self.conflict_id, self.resolution.as_str()) {
            Ok(_) => {
                println!(
                    "✓ Conflict {} resolved ({})",
                    self.conflict_id, self.resolution
                );
                Ok(())
            }
            Err(DaemonError::DaemonNotRunning { .. }) => {
                anyhow::bail!("daemon is not running — run `flightdeck daemon start`")
            }
            Err(err) => Err(err).context("failed to resolve conflict"),
        }
    }
}
