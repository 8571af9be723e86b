//! `flightdeck write <project> <phase> --set key=value ...`

use anyhow::{Context, Result};
use clap::Args;
use serde_json::{Map, Value};

use flightdeck_core::types::PhaseKind;
use flightdeck_daemon::{request_write, DaemonError};

use super::home;

/// Push dashboard-side field updates into a phase's plan file. Goes through
/// the daemon so its watcher treats the write as its own.
#[derive(Args, Debug)]
pub struct WriteArgs {
    /// Project name or id.
    pub project: String,

    /// Phase whose plan file to update.
    pub phase: PhaseKind,

    /// Front-matter updates, e.g. `--set status=active --set agent_id=a-7`.
    #[arg(long = "set", value_name = "KEY=VALUE", required = true)]
    pub set: Vec<String>,
}

impl WriteArgs {
    pub fn run(self) -> Result<()> {
        let mut updates = Map::new();
        for pair in &self.set {
            let (key, value) = pair
                .split_once('=')
                .with_context(|| format!("'{pair}' is not KEY=VALUE"))?;
            updates.insert(key.trim().to_string(), Value::String(value.to_string()));
        }

        let home = home()?;
        match request_write(
            &home,
            &self.project,
            self.phase.as_str(),
            Value::Object(updates),
        ) {
            Ok(_) => {
                println!("✓ Wrote updates to the '{}' plan file", self.phase);
                Ok(())
            }
            Err(DaemonError::DaemonNotRunning { .. }) => {
                anyhow::bail!("daemon is not running — run `flightdeck daemon start`")
            }
            Err(err) => Err(err).context("write failed"),
        }
    }
}
