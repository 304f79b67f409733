//! Domain types shared by the daemon and the CLI.
//!
//! All document locations use `PathBuf` relative to a store root; the store
//! root itself is runtime configuration and never baked into a type.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// A strongly-typed name of one value inside a policy document.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ValueName(pub String);

impl fmt::Display for ValueName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for ValueName {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ValueName {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

// ---------------------------------------------------------------------------
// Watched value
// ---------------------------------------------------------------------------

/// The single (document, name) pair one watchdog protects.
///
/// Together with a store root this addresses exactly one string value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchedValue {
    /// Path of the policy document, relative to the store root.
    pub doc: PathBuf,
    pub name: ValueName,
}

impl WatchedValue {
    pub fn new(doc: impl Into<PathBuf>, name: impl Into<ValueName>) -> Self {
        Self {
            doc: doc.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for WatchedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.doc.display(), self.name)
    }
}

// ---------------------------------------------------------------------------
// Change event
// ---------------------------------------------------------------------------

/// One detected transition of the watched value.
///
/// `new_value: None` signals that the re-read after a wake-up failed; it is
/// never a legitimate observation (an empty string is `Some("")`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    /// Baseline value immediately before this event.
    pub old_value: String,
    /// Freshly observed value, or `None` if the re-read failed.
    pub new_value: Option<String>,
}

impl ChangeEvent {
    pub fn changed(old_value: impl Into<String>, new_value: impl Into<String>) -> Self {
        Self {
            old_value: old_value.into(),
            new_value: Some(new_value.into()),
        }
    }

    pub fn read_failed(old_value: impl Into<String>) -> Self {
        Self {
            old_value: old_value.into(),
            new_value: None,
        }
    }

    pub fn is_read_failure(&self) -> bool {
        self.new_value.is_none()
    }
}

// ---------------------------------------------------------------------------
// Service state
// ---------------------------------------------------------------------------

/// Host-visible lifecycle state of the agent.
///
/// Owned exclusively by the lifecycle controller; transitions are strictly
/// sequential because control requests arrive over a single-consumer queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceState {
    Stopped,
    StartPending,
    Running,
    Paused,
    StopPending,
}

impl fmt::Display for ServiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceState::Stopped => write!(f, "stopped"),
            ServiceState::StartPending => write!(f, "start_pending"),
            ServiceState::Running => write!(f, "running"),
            ServiceState::Paused => write!(f, "paused"),
            ServiceState::StopPending => write!(f, "stop_pending"),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn newtype_display() {
        assert_eq!(ValueName::from("lock_screen_image").to_string(), "lock_screen_image");
    }

    #[test]
    fn watched_value_display_joins_doc_and_name() {
        let watched = WatchedValue::new("personalization.yaml", "lock_screen_image");
        assert_eq!(watched.to_string(), "personalization.yaml:lock_screen_image");
    }

    #[test]
    fn sentinel_event_is_distinguishable_from_empty_value() {
        let failed = ChangeEvent::read_failed("old");
        let legit_empty = ChangeEvent::changed("old", "");
        assert!(failed.is_read_failure());
        assert!(!legit_empty.is_read_failure());
        assert_ne!(failed, legit_empty);
    }

    #[test]
    fn service_state_serializes_snake_case() {
        let json = serde_json::to_string(&ServiceState::StartPending).expect("serialize");
        assert_eq!(json, "\"start_pending\"");
        let back: ServiceState = serde_json::from_str("\"stop_pending\"").expect("deserialize");
        assert_eq!(back, ServiceState::StopPending);
    }

    #[test]
    fn service_state_display_matches_wire_form() {
        assert_eq!(ServiceState::Running.to_string(), "running");
        assert_eq!(ServiceState::Paused.to_string(), "paused");
    }
}
