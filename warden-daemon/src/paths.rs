use std::path::{Path, PathBuf};
use std::time::Duration;

pub const SERVICE_LABEL: &str = "dev.warden.agent";

pub const DEFAULT_POLICY_DOC: &str = "personalization.yaml";
pub const DEFAULT_VALUE_NAME: &str = "lock_screen_image";
pub const DEFAULT_GRACE_DELAY: Duration = Duration::from_secs(5);

pub const CONTROL_ACK_TIMEOUT: Duration = Duration::from_secs(10);

pub const AGENT_STDOUT_LOG: &str = "warden.log";
pub const AGENT_STDERR_LOG: &str = "warden-err.log";
pub const CONTROL_SOCKET: &str = "control.sock";

pub fn warden_root(home: &Path) -> PathBuf {
    home.join(".warden")
}

pub fn policies_root(home: &Path) -> PathBuf {
    warden_root(home).join("policies")
}

pub fn run_dir(home: &Path) -> PathBuf {
    warden_root(home).join("run")
}

pub fn socket_path(home: &Path) -> PathBuf {
    run_dir(home).join(CONTROL_SOCKET)
}

pub fn logs_dir(home: &Path) -> PathBuf {
    warden_root(home).join("logs")
}

pub fn stdout_log_path(home: &Path) -> PathBuf {
    logs_dir(home).join(AGENT_STDOUT_LOG)
}

pub fn stderr_log_path(home: &Path) -> PathBuf {
    logs_dir(home).join(AGENT_STDERR_LOG)
}

pub fn launch_agents_dir(home: &Path) -> PathBuf {
    home.join("Library").join("LaunchAgents")
}

pub fn launchd_plist_path(home: &Path) -> PathBuf {
    launch_agents_dir(home).join(format!("{SERVICE_LABEL}.plist"))
}
