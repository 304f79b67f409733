use std::io::{BufRead, BufReader, Write};
use std::os::unix::net::UnixStream;
use std::path::Path;
use std::thread::sleep;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{io_err, DaemonError};
use crate::paths::{socket_path, CONTROL_ACK_TIMEOUT};

/// JSON newline-delimited control request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlRequest {
    pub cmd: String,
}

impl ControlRequest {
    pub fn new(cmd: impl Into<String>) -> Self {
        Self { cmd: cmd.into() }
    }
}

/// JSON newline-delimited control response.
///
/// `data.state` carries the acknowledged service state for lifecycle
/// commands; `status` responses carry the full status payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlResponse {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ControlResponse {
    pub fn ok(data: Value) -> Self {
        Self {
            ok: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

/// Send one JSON request to the control socket and return one response.
///
/// The read side is bounded by [`CONTROL_ACK_TIMEOUT`]; an agent that does
/// not acknowledge within it is reported as a protocol error, not waited on.
pub fn send_request(home: &Path, request: &ControlRequest) -> Result<ControlResponse, DaemonError> {
    let socket = socket_path(home);
    if !socket.exists() {
        return Err(DaemonError::NotRunning { socket });
    }

    let mut stream = UnixStream::connect(&socket).map_err(|err| {
        if matches!(
            err.kind(),
            std::io::ErrorKind::NotFound
                | std::io::ErrorKind::ConnectionRefused
                | std::io::ErrorKind::ConnectionReset
        ) {
            DaemonError::NotRunning {
                socket: socket.clone(),
            }
        } else {
            io_err(&socket, err)
        }
    })?;
    stream
        .set_read_timeout(Some(CONTROL_ACK_TIMEOUT))
        .map_err(|e| io_err(&socket, e))?;

    let payload = serde_json::to_string(request)?;
    stream
        .write_all(payload.as_bytes())
        .map_err(|e| io_err(&socket, e))?;
    stream.write_all(b"\n").map_err(|e| io_err(&socket, e))?;
    stream.flush().map_err(|e| io_err(&socket, e))?;

    let mut reader = BufReader::new(stream);
    let mut line = String::new();
    let read = reader.read_line(&mut line).map_err(|err| {
        if matches!(
            err.kind(),
            std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
        ) {
            DaemonError::Protocol(format!(
                "agent did not acknowledge within {}s",
                CONTROL_ACK_TIMEOUT.as_secs()
            ))
        } else {
            io_err(&socket, err)
        }
    })?;
    if read == 0 {
        return Err(DaemonError::Protocol(
            "agent closed connection before responding".to_string(),
        ));
    }

    let response: ControlResponse = serde_json::from_str(line.trim_end())?;
    Ok(response)
}

/// `status` with a short retry: right after launch the socket may not be
/// bound yet.
pub fn request_status(home: &Path) -> Result<Value, DaemonError> {
    let request = ControlRequest::new("status");

    let mut last_not_running: Option<DaemonError> = None;
    for attempt in 0..5 {
        match send_request(home, &request) {
            Ok(response) => return response_into_data(response),
            Err(err @ DaemonError::NotRunning { .. }) => {
                last_not_running = Some(err);
                if attempt < 4 {
                    sleep(Duration::from_millis(100));
                    continue;
                }
            }
            Err(err) => return Err(err),
        }
    }

    Err(last_not_running.unwrap_or_else(|| {
        DaemonError::Protocol("status retry loop exited unexpectedly".to_string())
    }))
}

pub fn request_stop(home: &Path) -> Result<Value, DaemonError> {
    lifecycle_request(home, "stop")
}

pub fn request_pause(home: &Path) -> Result<Value, DaemonError> {
    lifecycle_request(home, "pause")
}

pub fn request_continue(home: &Path) -> Result<Value, DaemonError> {
    lifecycle_request(home, "continue")
}

fn lifecycle_request(home: &Path, cmd: &str) -> Result<Value, DaemonError> {
    let response = send_request(home, &ControlRequest::new(cmd))?;
    response_into_data(response)
}

fn response_into_data(response: ControlResponse) -> Result<Value, DaemonError> {
    if response.ok {
        Ok(response.data.unwrap_or(Value::Null))
    } else {
        Err(DaemonError::Protocol(
            response
                .error
                .unwrap_or_else(|| "unknown agent error".to_string()),
        ))
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
