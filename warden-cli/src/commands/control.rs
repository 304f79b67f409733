//! `warden stop|pause|continue|status` — control socket client commands.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::Args;
use colored::Colorize;
use serde_json::Value;

use warden_daemon::paths::socket_path;
use warden_daemon::{
    request_continue, request_pause, request_status, request_stop, DaemonError,
};

#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

impl StatusArgs {
    pub fn run(self) -> Result<()> {
        let home = dirs::home_dir().context("could not determine home directory")?;

        match request_status(&home) {
            Ok(payload) => {
                if self.json {
                    print_json(&payload)?;
                } else {
                    print_human(&payload);
                }
                Ok(())
            }
            Err(DaemonError::NotRunning { .. }) => {
                let payload = serde_json::json!({
                    "state": "stopped",
                    "socket": socket_path(&home).display().to_string(),
                });
                if self.json {
                    print_json(&payload)?;
                } else {
                    println!("state:  {}", state_indicator("stopped"));
                    println!("socket: {}", socket_path(&home).display());
                    println!("Run 'warden start' (or 'warden run' in the foreground) to begin enforcement.");
                }
                Ok(())
            }
            Err(err) => Err(err).context("failed to query agent status"),
        }
    }
}

pub fn stop() -> Result<()> {
    let home = dirs::home_dir().context("could not determine home directory")?;
    match request_stop(&home) {
        Ok(data) => {
            println!("agent stopping (state: {})", state_of(&data));
            Ok(())
        }
        Err(DaemonError::NotRunning { .. }) => {
            println!("agent is not running");
            Ok(())
        }
        Err(err) => Err(err).context("failed to stop agent"),
    }
}

pub fn pause() -> Result<()> {
    let home = dirs::home_dir().context("could not determine home directory")?;
    match request_pause(&home) {
        Ok(data) => {
            println!("enforcement paused (state: {})", state_of(&data));
            Ok(())
        }
        Err(DaemonError::NotRunning { .. }) => {
            println!("agent is not running");
            Ok(())
        }
        Err(err) => Err(err).context("failed to pause agent"),
    }
}

pub fn resume() -> Result<()> {
    let home = dirs::home_dir().context("could not determine home directory")?;
    match request_continue(&home) {
        Ok(data) => {
            println!("enforcement resumed (state: {})", state_of(&data));
            Ok(())
        }
        Err(DaemonError::NotRunning { .. }) => {
            println!("agent is not running");
            Ok(())
        }
        Err(err) => Err(err).context("failed to resume agent"),
    }
}

fn state_of(data: &Value) -> &str {
    data["state"].as_str().unwrap_or("unknown")
}

fn print_json(payload: &Value) -> Result<()> {
    println!(
        "{}",
        serde_json::to_string_pretty(payload).context("failed to render agent status JSON")?
    );
    Ok(())
}

fn print_human(payload: &Value) {
    println!(
        "Warden v{} | {}",
        env!("CARGO_PKG_VERSION"),
        payload["label"].as_str().unwrap_or("dev.warden.agent"),
    );
    println!(
        "state:            {}",
        state_indicator(payload["state"].as_str().unwrap_or("unknown"))
    );
    println!(
        "watched:          {}",
        payload["watched"].as_str().unwrap_or("unknown")
    );
    match payload["guard_value"].as_str() {
        Some(guard) => println!("guard value:      {guard}"),
        None => println!(
            "guard value:      {}",
            "(none, enforcement suspended)".bright_black()
        ),
    }
    println!(
        "store root:       {}",
        payload["store_root"].as_str().unwrap_or("unknown")
    );
    println!(
        "changes detected: {}",
        payload["changes_detected"].as_u64().unwrap_or(0)
    );
    println!(
        "reverts applied:  {}",
        payload["reverts_applied"].as_u64().unwrap_or(0)
    );
    println!(
        "last change:      {}",
        format_unix(payload["last_change_at_unix"].as_u64().unwrap_or(0))
    );
    println!(
        "started:          {}",
        format_unix(payload["started_at_unix"].as_u64().unwrap_or(0))
    );
    println!(
        "socket:           {}",
        payload["socket"].as_str().unwrap_or("unknown")
    );
}

fn state_indicator(state: &str) -> String {
    match state {
        "running" => state.green().bold().to_string(),
        "paused" => state.yellow().bold().to_string(),
        "stopped" => state.bright_black().bold().to_string(),
        other => other.bold().to_string(),
    }
}

fn format_unix(secs: u64) -> String {
    if secs == 0 {
        return "never".to_string();
    }
    match DateTime::<Utc>::from_timestamp(secs as i64, 0) {
        Some(at) => format!("{} ({})", at.to_rfc3339(), format_age(at)),
        None => format!("{secs} (unix)"),
    }
}

fn format_age(at: DateTime<Utc>) -> String {
    let secs = Utc::now().signed_duration_since(at).num_seconds().max(0);
    if secs < 60 {
        format!("{secs}s ago")
    } else if secs < 3600 {
        format!("{}m ago", secs / 60)
    } else if secs < 86_400 {
        format!("{}h ago", secs / 3600)
    } else {
        format!("{}d ago", secs / 86_400)
    }
}
