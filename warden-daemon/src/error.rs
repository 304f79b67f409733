use std::path::PathBuf;

use thiserror::Error;

/// Error surface for the agent runtime, control protocol, and launchd
/// management.
#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("store error: {0}")]
    Store(#[from] warden_core::StoreError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("channel closed: {0}")]
    ChannelClosed(&'static str),

    #[error("control protocol error: {0}")]
    Protocol(String),

    #[error("agent is not running (socket missing: {socket})")]
    NotRunning { socket: PathBuf },

    #[error("launchd error: {0}")]
    Launchd(String),

    #[error("change monitor failed: {0}")]
    MonitorFailed(String),
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> DaemonError {
    DaemonError::Io {
        path: path.into(),
        source,
    }
}
