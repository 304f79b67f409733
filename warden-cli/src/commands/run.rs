//! `warden run` — the agent itself, in the foreground.
//!
//! launchd invokes this subcommand via the installed plist; running it by
//! hand gives the same agent with logs on the terminal.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;

use warden_core::WatchedValue;
use warden_daemon::paths::{DEFAULT_GRACE_DELAY, DEFAULT_POLICY_DOC, DEFAULT_VALUE_NAME};
use warden_daemon::{start_blocking, RuntimeConfig};

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Policy store root (defaults to ~/.warden/policies).
    #[arg(long)]
    pub store_root: Option<PathBuf>,

    /// Policy document, relative to the store root.
    #[arg(long, default_value = DEFAULT_POLICY_DOC)]
    pub doc: PathBuf,

    /// Value name inside the document.
    #[arg(long, default_value = DEFAULT_VALUE_NAME)]
    pub name: String,

    /// Seconds between detecting a change and reverting it.
    #[arg(long, default_value_t = DEFAULT_GRACE_DELAY.as_secs())]
    pub grace_secs: u64,
}

impl RunArgs {
    pub fn run(self) -> Result<()> {
        let home = dirs::home_dir().context("could not determine home directory")?;

        let mut config = RuntimeConfig::defaults_at(home);
        if let Some(store_root) = self.store_root {
            config.store_root = store_root;
        }
        config.value = WatchedValue::new(self.doc, self.name);
        config.grace = Duration::from_secs(self.grace_secs);

        start_blocking(config).context("agent exited with error")
    }
}
