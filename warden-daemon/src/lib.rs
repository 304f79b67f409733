//! Warden agent runtime: change monitor + watchdog + control socket.

pub mod cancel;
mod error;
pub mod launchd;
pub mod log_rotation;
pub mod monitor;
pub mod paths;
pub mod protocol;
mod runtime;
pub mod store;
pub mod watchdog;

pub use error::DaemonError;
pub use launchd::{
    generate_plist, install as install_launchd, kickstart as kickstart_launchd,
    uninstall as uninstall_launchd,
};
pub use protocol::{
    request_continue, request_pause, request_status, request_stop, send_request, ControlRequest,
    ControlResponse,
};
pub use runtime::{run, run_with_store, start_blocking, RuntimeConfig};
pub use store::{FileStore, MemoryStore, ValueStore};
pub use watchdog::{WatchStats, Watchdog};
