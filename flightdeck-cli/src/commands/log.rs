//! `flightdeck log` — the sync audit trail, newest first.

use anyhow::{Context, Result};
use clap::Args;
use tabled::{settings::Style, Table, Tabled};

use flightdeck_core::types::SyncLogEntry;
use flightdeck_core::Store;
use flightdeck_daemon::request_log;

use super::home;

/// Show recent sync log entries.
#[derive(Args, Debug)]
pub struct LogArgs {
    /// How many entries to show.
    #[arg(long, default_value_t = 20)]
    pub limit: usize,

    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Tabled)]
struct LogRow {
    #[tabled(rename = "when")]
    when: String,
    #[tabled(rename = "source")]
    source: String,
    #[tabled(rename = "phase")]
    phase: String,
    #[tabled(rename = "change")]
    change: String,
    #[tabled(rename = "resolution")]
    resolution: String,
}

impl LogArgs {
    pub fn run(self) -> Result<()> {
        let entries = self.load()?;

        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&entries).context("failed to serialize log")?
            );
            return Ok(());
        }

        if entries.is_empty() {
            println!("No sync activity recorded yet.");
            return Ok(());
        }

        let rows: Vec<LogRow> = entries.iter().map(log_row).collect();
        let mut table = Table::new(rows);
        table.with(Style::rounded());
        println!("{table}");
        Ok(())
    }

    /// Ask the running daemon first; fall back to reading the store
    /// directly when it is down.
    fn load(&self) -> Result<Vec<SyncLogEntry>> {
        if let Ok(data) = request_log(&home()?, self.limit) {
            return serde_json::from_value(data["entries"].clone())
                .context("unexpected log payload from daemon");
        }
        let store = Store::open_default().context("failed to open the flightdeck store")?;
        Ok(store.sync_log(self.limit)?)
    }
}

fn log_row(entry: &SyncLogEntry) -> LogRow {
    let mut change = entry.change.to_string();
    if change.len() > 60 {
        change.truncate(57);
        change.push_str("...");
    }
    LogRow {
        when: entry.timestamp.format("%Y-%m-%d %H:%M:%S").to_string(),
        source: entry.source.to_string(),
        phase: entry.entity_id.clone(),
        change,
        resolution: entry.resolution.clone().unwrap_or_else(|| "-".to_string()),
    }
}
