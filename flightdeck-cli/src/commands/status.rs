//! `flightdeck status` — daemon and sync visibility.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use serde_json::Value;

use flightdeck_daemon::paths::socket_path;
use flightdeck_daemon::{request_status, DaemonError};

use super::home;

/// Show whether the daemon is running and what the sync engine is doing.
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

impl StatusArgs {
    pub fn run(self) -> Result<()> {
        let home = home()?;

        let payload = match request_status(&home) {
            Ok(status) => status,
            Err(DaemonError::DaemonNotRunning { .. }) => serde_json::json!({
                "running": false,
                "socket": socket_path(&home).display().to_string(),
            }),
            Err(err) => return Err(err).context("failed to query daemon status"),
        };

        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&payload)
                    .context("failed to render status JSON")?
            );
            return Ok(());
        }

        print_human(&payload);
        Ok(())
    }
}

fn print_human(payload: &Value) {
    let running = payload["running"].as_bool().unwrap_or(false);
    if !running {
        println!("daemon: {}", "not running".red());
        println!("Run: flightdeck daemon start");
        return;
    }

    println!("daemon: {}", "running".green());
    if let Some(dir) = payload["plan_dir"].as_str() {
        let watching = payload["watching"].as_bool().unwrap_or(false);
        let marker = if watching {
            "watching".green().to_string()
        } else {
            "not watching".yellow().to_string()
        };
        println!("plan dir: {dir} ({marker})");
    }

    let sync = &payload["sync"];
    let status = sync["status"].as_str().unwrap_or("unknown");
    let colored_status = match status {
        "synced" => status.green().to_string(),
        "syncing" => status.cyan().to_string(),
        "conflict" => status.red().bold().to_string(),
        other => other.to_string(),
    };
    println!("sync: {colored_status}");

    let conflict_count = sync["conflict_count"].as_u64().unwrap_or(0);
    if conflict_count > 0 {
        println!(
            "conflicts: {} — run `flightdeck conflicts`",
            conflict_count.to_string().red().bold()
        );
    }
    match sync["last_sync"].as_str() {
        Some(stamp) => println!("last sync: {stamp}"),
        None => println!("last sync: never"),
    }
}
