//! Error types for warden-core.

use std::path::PathBuf;

use thiserror::Error;

/// All errors that can arise from reading, writing, or waiting on the store.
///
/// The four variants are the full taxonomy the watchdog reacts to: anything
/// that keeps a document from being opened or parsed is `Unavailable`; an
/// absent (or non-string) value under the watched name is `ValueMissing`;
/// a rejected write is `PermissionDenied`; a broken change-notification
/// facility is `WaitAborted`.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The document cannot be opened, read, or parsed.
    #[error("store document {path} unavailable: {reason}")]
    Unavailable { path: PathBuf, reason: String },

    /// The watched name is absent from the document, or holds a non-string.
    #[error("value '{name}' missing from {doc}")]
    ValueMissing { doc: PathBuf, name: String },

    /// The store rejected a write.
    #[error("permission denied writing {path}")]
    PermissionDenied { path: PathBuf },

    /// The change-wait primitive failed outside of cancellation.
    #[error("change wait aborted: {0}")]
    WaitAborted(String),
}

impl StoreError {
    /// Build an `Unavailable` from any displayable cause.
    pub fn unavailable(path: impl Into<PathBuf>, cause: impl std::fmt::Display) -> Self {
        StoreError::Unavailable {
            path: path.into(),
            reason: cause.to_string(),
        }
    }

    /// True for the failures a steady-state re-read recovers from by
    /// emitting the sentinel event instead of stopping the monitor.
    pub fn is_read_failure(&self) -> bool {
        matches!(
            self,
            StoreError::Unavailable { .. } | StoreError::ValueMissing { .. }
        )
    }
}
