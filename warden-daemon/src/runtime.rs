//! Agent runtime: task fan-out, lifecycle controller, and control socket.
//!
//! The controller owns the watchdog and is the only task that touches it;
//! every lifecycle transition (pause, continue, stop) and every status
//! snapshot is a [`ControlJob`] on its queue, answered over a oneshot. The
//! socket server and the signal handler are thin producers on that queue.

use std::fs;
use std::io::ErrorKind;
use std::os::unix::net::UnixStream as StdUnixStream;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::unix::OwnedWriteHalf;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{broadcast, mpsc, oneshot};

use warden_core::{ServiceState, WatchedValue};

use crate::error::{io_err, DaemonError};
use crate::paths::{
    logs_dir, policies_root, run_dir, socket_path, DEFAULT_GRACE_DELAY, DEFAULT_POLICY_DOC,
    DEFAULT_VALUE_NAME, SERVICE_LABEL,
};
use crate::protocol::{ControlRequest, ControlResponse};
use crate::store::{FileStore, ValueStore};
use crate::watchdog::{unix_seconds_now, Watchdog};

/// Everything the agent needs to run.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub home: PathBuf,
    pub store_root: PathBuf,
    pub value: WatchedValue,
    pub grace: Duration,
}

impl RuntimeConfig {
    /// Production defaults rooted at `home`: the lock screen image in the
    /// personalization document under `~/.warden/policies`.
    pub fn defaults_at(home: impl Into<PathBuf>) -> Self {
        let home = home.into();
        Self {
            store_root: policies_root(&home),
            value: WatchedValue::new(DEFAULT_POLICY_DOC, DEFAULT_VALUE_NAME),
            grace: DEFAULT_GRACE_DELAY,
            home,
        }
    }
}

/// One control command in flight to the controller.
struct ControlJob {
    cmd: String,
    respond_to: oneshot::Sender<Result<Value, String>>,
}

/// Start the agent runtime and block the current thread until it exits.
pub fn start_blocking(config: RuntimeConfig) -> Result<(), DaemonError> {
    init_tracing();
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| io_err("tokio-runtime", e))?;
    runtime.block_on(run(config))
}

/// Run the agent runtime over the on-disk policy store.
pub async fn run(config: RuntimeConfig) -> Result<(), DaemonError> {
    let store: Arc<dyn ValueStore> = Arc::new(FileStore::new(config.store_root.clone()));
    run_with_store(config, store).await
}

/// Run the agent runtime against an arbitrary store implementation.
pub async fn run_with_store(
    config: RuntimeConfig,
    store: Arc<dyn ValueStore>,
) -> Result<(), DaemonError> {
    ensure_runtime_dirs(&config)?;
    let started_at_unix = unix_seconds_now();

    let (control_tx, control_rx) = mpsc::channel::<ControlJob>(16);
    let (shutdown_tx, _) = broadcast::channel::<()>(16);

    let controller_handle = {
        let shutdown = shutdown_tx.clone();
        let config = config.clone();
        tokio::spawn(async move {
            let result = controller_task(
                config,
                store,
                control_rx,
                shutdown.clone(),
                shutdown.subscribe(),
                started_at_unix,
            )
            .await;
            let _ = shutdown.send(());
            result
        })
    };

    let socket_handle = {
        let shutdown = shutdown_tx.clone();
        let home = config.home.clone();
        let control_tx = control_tx.clone();
        tokio::spawn(async move {
            let result = socket_server_task(home, control_tx, shutdown.subscribe()).await;
            let _ = shutdown.send(());
            result
        })
    };

    let rotation_handle = {
        let shutdown = shutdown_tx.clone();
        let home = config.home.clone();
        tokio::spawn(async move {
            let result = log_rotation_task(home, shutdown.subscribe()).await;
            let _ = shutdown.send(());
            result
        })
    };

    let signal_handle = {
        let shutdown = shutdown_tx.clone();
        tokio::spawn(async move {
            let result = signal_task(control_tx, shutdown.clone(), shutdown.subscribe()).await;
            let _ = shutdown.send(());
            result
        })
    };

    let (controller_result, socket_result, rotation_result, signal_result) = tokio::join!(
        controller_handle,
        socket_handle,
        rotation_handle,
        signal_handle
    );

    handle_join("controller", controller_result)?;
    handle_join("socket_server", socket_result)?;
    handle_join("log_rotation", rotation_result)?;
    handle_join("signal_handler", signal_result)?;
    Ok(())
}

async fn controller_task(
    config: RuntimeConfig,
    store: Arc<dyn ValueStore>,
    mut control_rx: mpsc::Receiver<ControlJob>,
    shutdown_tx: broadcast::Sender<()>,
    mut shutdown_rx: broadcast::Receiver<()>,
    started_at_unix: u64,
) -> Result<(), DaemonError> {
    let mut state = ServiceState::StartPending;
    tracing::info!(
        state = %state,
        watched = %config.value,
        store_root = %config.store_root.display(),
        grace_secs = config.grace.as_secs(),
        "agent starting",
    );

    let mut watchdog = Watchdog::new(store, config.value.clone(), config.grace);
    let mut events = match watchdog.start() {
        Ok(events) => events,
        Err(err) => {
            tracing::error!(error = %err, "cannot pin guard value at startup");
            return Err(err.into());
        }
    };
    state = ServiceState::Running;
    tracing::info!(state = %state, "agent running");

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => {
                watchdog.cancel();
                return Ok(());
            }
            maybe_job = control_rx.recv() => {
                let Some(job) = maybe_job else {
                    watchdog.cancel();
                    return Ok(());
                };
                match job.cmd.as_str() {
                    "status" => {
                        let payload =
                            build_status_payload(&config, &watchdog, state, started_at_unix);
                        let _ = job.respond_to.send(Ok(payload));
                    }
                    "pause" => {
                        if state == ServiceState::Running {
                            watchdog.cancel();
                            state = ServiceState::Paused;
                            tracing::info!(state = %state, "enforcement paused");
                        }
                        let _ = job.respond_to.send(Ok(state_payload(state)));
                    }
                    "continue" => {
                        if state == ServiceState::Paused {
                            // A fresh monitor re-baselines on whatever the
                            // value is now; tampering during the pause is
                            // adopted as the new guard, not reverted.
                            match watchdog.start() {
                                Ok(fresh) => {
                                    events = fresh;
                                    state = ServiceState::Running;
                                    tracing::info!(state = %state, "enforcement resumed");
                                    let _ = job.respond_to.send(Ok(state_payload(state)));
                                }
                                Err(err) => {
                                    tracing::error!(error = %err, "cannot re-pin guard value on resume");
                                    let _ = job
                                        .respond_to
                                        .send(Err(format!("cannot resume: {err}")));
                                }
                            }
                        } else {
                            let _ = job.respond_to.send(Ok(state_payload(state)));
                        }
                    }
                    "stop" => {
                        state = ServiceState::StopPending;
                        tracing::info!(state = %state, "stop requested, shutting down agent");
                        let _ = job.respond_to.send(Ok(state_payload(state)));
                        watchdog.cancel();
                        let _ = shutdown_tx.send(());
                        return Ok(());
                    }
                    other => {
                        tracing::error!(cmd = other, "unrecognized control command");
                        let _ = job
                            .respond_to
                            .send(Err(format!("unknown command '{other}'")));
                    }
                }
            }
            maybe_event = events.recv(), if state == ServiceState::Running => {
                match maybe_event {
                    Some(event) => watchdog.observe(event),
                    None => {
                        tracing::error!("change monitor ended unexpectedly");
                        return Err(DaemonError::MonitorFailed(
                            "change monitor ended unexpectedly".to_string(),
                        ));
                    }
                }
            }
        }
    }
}

async fn socket_server_task(
    home: PathBuf,
    control_tx: mpsc::Sender<ControlJob>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    let run = run_dir(&home);
    if !run.exists() {
        fs::create_dir_all(&run).map_err(|e| io_err(&run, e))?;
    }

    let socket = socket_path(&home);
    prepare_socket_for_bind(&socket)?;

    let listener = UnixListener::bind(&socket).map_err(|e| io_err(&socket, e))?;
    set_socket_permissions(&socket)?;
    tracing::info!(socket = %socket.display(), "control socket listening");

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            accepted = listener.accept() => {
                let (stream, _) = accepted.map_err(|e| io_err(&socket, e))?;
                let control_tx = control_tx.clone();
                tokio::spawn(async move {
                    if let Err(err) = handle_control_client(stream, control_tx).await {
                        tracing::error!(error = %err, "control client error");
                    }
                });
            }
        }
    }

    if socket.exists() {
        let _ = fs::remove_file(&socket);
    }
    Ok(())
}

async fn handle_control_client(
    stream: UnixStream,
    control_tx: mpsc::Sender<ControlJob>,
) -> Result<(), DaemonError> {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    while let Some(line) = lines
        .next_line()
        .await
        .map_err(|e| io_err("control socket read", e))?
    {
        if line.trim().is_empty() {
            continue;
        }

        let request: Result<ControlRequest, _> = serde_json::from_str(&line);
        let request = match request {
            Ok(request) => request,
            Err(err) => {
                write_response(
                    &mut writer,
                    &ControlResponse::error(format!("invalid request JSON: {err}")),
                )
                .await?;
                continue;
            }
        };

        let cmd = request.cmd.clone();
        let response = match enqueue_control(&control_tx, &cmd).await {
            Ok(data) => ControlResponse::ok(data),
            Err(err) => ControlResponse::error(err.to_string()),
        };

        write_response(&mut writer, &response).await?;
        if cmd == "stop" {
            break;
        }
    }

    Ok(())
}

async fn signal_task(
    control_tx: mpsc::Sender<ControlJob>,
    shutdown_tx: broadcast::Sender<()>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    use tokio::signal::unix::{signal, SignalKind};

    // launchd stops the agent with SIGTERM; ctrl-c covers foreground runs.
    let mut terminate = signal(SignalKind::terminate()).map_err(|e| io_err("sigterm handler", e))?;

    let received = tokio::select! {
        _ = shutdown_rx.recv() => return Ok(()),
        result = tokio::signal::ctrl_c() => match result {
            Ok(()) => "SIGINT",
            Err(err) => {
                return Err(DaemonError::Protocol(format!("ctrl-c handler failed: {err}")));
            }
        },
        _ = terminate.recv() => "SIGTERM",
    };

    tracing::info!(signal = received, "termination signal received, stopping agent");
    if let Err(err) = enqueue_control(&control_tx, "stop").await {
        tracing::warn!(error = %err, "stop via control queue failed, forcing shutdown");
        let _ = shutdown_tx.send(());
    }
    Ok(())
}

async fn log_rotation_task(
    home: PathBuf,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    let mut interval = tokio::time::interval(Duration::from_secs(60));
    // Skip the first (immediate) tick to avoid rotating on startup.
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    interval.tick().await; // consume the first immediate tick

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            _ = interval.tick() => {
                let home = home.clone();
                tokio::task::spawn_blocking(move || {
                    crate::log_rotation::rotate_logs(&home);
                })
                .await
                .ok(); // rotation errors are logged inside rotate_logs; never crash the agent
            }
        }
    }
    Ok(())
}

async fn enqueue_control(
    control_tx: &mpsc::Sender<ControlJob>,
    cmd: &str,
) -> Result<Value, DaemonError> {
    let (tx, rx) = oneshot::channel();
    control_tx
        .send(ControlJob {
            cmd: cmd.to_string(),
            respond_to: tx,
        })
        .await
        .map_err(|_| DaemonError::ChannelClosed("control queue"))?;

    let outcome = rx
        .await
        .map_err(|_| DaemonError::ChannelClosed("control response"))?;
    outcome.map_err(DaemonError::Protocol)
}

fn build_status_payload(
    config: &RuntimeConfig,
    watchdog: &Watchdog,
    state: ServiceState,
    started_at_unix: u64,
) -> Value {
    let stats = watchdog.stats();
    json!({
        "state": state,
        "label": SERVICE_LABEL,
        "watched": config.value.to_string(),
        "store_root": config.store_root.display().to_string(),
        "guard_value": watchdog.guard_value(),
        "started_at_unix": started_at_unix,
        "last_change_at_unix": stats.last_change_at(),
        "changes_detected": stats.changes_detected(),
        "reverts_applied": stats.reverts_applied(),
        "socket": socket_path(&config.home).display().to_string(),
    })
}

fn state_payload(state: ServiceState) -> Value {
    json!({ "state": state })
}

fn ensure_runtime_dirs(config: &RuntimeConfig) -> Result<(), DaemonError> {
    let run = run_dir(&config.home);
    if !run.exists() {
        fs::create_dir_all(&run).map_err(|e| io_err(&run, e))?;
    }
    let logs = logs_dir(&config.home);
    if !logs.exists() {
        fs::create_dir_all(&logs).map_err(|e| io_err(&logs, e))?;
    }
    if !config.store_root.exists() {
        fs::create_dir_all(&config.store_root).map_err(|e| io_err(&config.store_root, e))?;
    }
    Ok(())
}

fn prepare_socket_for_bind(socket: &Path) -> Result<(), DaemonError> {
    if !socket.exists() {
        return Ok(());
    }

    match StdUnixStream::connect(socket) {
        Ok(_) => {
            return Err(DaemonError::Protocol(format!(
                "control socket already in use: {}",
                socket.display()
            )));
        }
        Err(err) => {
            tracing::warn!(
                socket = %socket.display(),
                error = %err,
                "removing stale control socket before bind",
            );
        }
    }

    match fs::remove_file(socket) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
        Err(err) => Err(io_err(socket, err)),
    }
}

async fn write_response(
    writer: &mut OwnedWriteHalf,
    response: &ControlResponse,
) -> Result<(), DaemonError> {
    let payload = serde_json::to_string(response)?;
    writer
        .write_all(payload.as_bytes())
        .await
        .map_err(|e| io_err("control socket write", e))?;
    writer
        .write_all(b"\n")
        .await
        .map_err(|e| io_err("control socket write", e))?;
    writer
        .flush()
        .await
        .map_err(|e| io_err("control socket flush", e))?;
    Ok(())
}

fn handle_join(
    task: &str,
    result: Result<Result<(), DaemonError>, tokio::task::JoinError>,
) -> Result<(), DaemonError> {
    match result {
        Ok(inner) => inner,
        Err(err) => Err(DaemonError::Protocol(format!(
            "{task} task join failure: {err}"
        ))),
    }
}

fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).with_target(false).try_init();
}

#[cfg(unix)]
fn set_socket_permissions(path: &Path) -> Result<(), DaemonError> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600)).map_err(|e| io_err(path, e))
}

#[cfg(not(unix))]
fn set_socket_permissions(_path: &Path) -> Result<(), DaemonError> {
    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
