//! `warden install|remove|start` — launchd agent management.

use anyhow::{Context, Result};

use warden_daemon::{install_launchd, kickstart_launchd, uninstall_launchd};

pub fn install() -> Result<()> {
    let home = dirs::home_dir().context("could not determine home directory")?;
    let plist = install_launchd(&home).context("failed to install launchd agent")?;
    println!("installed launchd agent: {}", plist.display());
    Ok(())
}

pub fn remove() -> Result<()> {
    let home = dirs::home_dir().context("could not determine home directory")?;
    uninstall_launchd(&home).context("failed to remove launchd agent")?;
    println!("removed launchd agent");
    Ok(())
}

pub fn start() -> Result<()> {
    let home = dirs::home_dir().context("could not determine home directory")?;
    kickstart_launchd(&home).context("failed to start launchd agent")?;
    println!("agent start requested");
    Ok(())
}
