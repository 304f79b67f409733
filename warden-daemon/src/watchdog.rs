//! Watchdog: reacts to monitor events by scheduling grace-delayed reverts.
//!
//! The guard value is pinned at monitor start and every revert targets it.
//! An event whose new value equals the guard is a restoration (our own
//! revert echoing back through the monitor, or a manual fix) and schedules
//! nothing; that is what lets enforcement converge instead of reverting its
//! own reverts. A newer schedule aborts the outstanding one, so at most one
//! revert is pending at a time.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use warden_core::{ChangeEvent, StoreError, WatchedValue};

use crate::cancel::{cancel_pair, CancelHandle};
use crate::monitor::{self, MonitorHandle};
use crate::store::ValueStore;

/// Counters surfaced through the status payload. Cheap to clone; the revert
/// task bumps them after the watchdog has moved on.
#[derive(Clone, Default)]
pub struct WatchStats {
    changes_detected: Arc<AtomicU64>,
    reverts_applied: Arc<AtomicU64>,
    last_change_at: Arc<AtomicU64>,
}

impl WatchStats {
    pub fn changes_detected(&self) -> u64 {
        self.changes_detected.load(Ordering::Relaxed)
    }

    pub fn reverts_applied(&self) -> u64 {
        self.reverts_applied.load(Ordering::Relaxed)
    }

    /// Unix seconds of the most recent detected change; 0 before the first.
    pub fn last_change_at(&self) -> u64 {
        self.last_change_at.load(Ordering::Relaxed)
    }

    fn record_change(&self, now: u64) {
        self.changes_detected.fetch_add(1, Ordering::Relaxed);
        self.last_change_at.store(now, Ordering::Relaxed);
    }

    fn record_revert(&self) {
        self.reverts_applied.fetch_add(1, Ordering::Relaxed);
    }
}

struct ActiveRun {
    cancel: CancelHandle,
    guard: String,
    _monitor: JoinHandle<()>,
}

/// Owns one change monitor at a time.
pub struct Watchdog {
    store: Arc<dyn ValueStore>,
    value: WatchedValue,
    grace: Duration,
    stats: WatchStats,
    active: Option<ActiveRun>,
    pending_revert: Option<JoinHandle<()>>,
}

impl Watchdog {
    pub fn new(store: Arc<dyn ValueStore>, value: WatchedValue, grace: Duration) -> Self {
        Self {
            store,
            value,
            grace,
            stats: WatchStats::default(),
            active: None,
            pending_revert: None,
        }
    }

    /// Enter a Running span: mint a fresh cancel pair, spawn a monitor with a
    /// fresh baseline read, and pin that baseline as the guard value.
    ///
    /// Returns the monitor's event receiver; the caller feeds events back
    /// through [`Watchdog::observe`].
    pub fn start(&mut self) -> Result<mpsc::Receiver<ChangeEvent>, StoreError> {
        let (handle, token) = cancel_pair();
        let MonitorHandle {
            baseline,
            events,
            task,
        } = monitor::spawn(self.store.clone(), self.value.clone(), token)?;
        tracing::info!(watched = %self.value, guard = %baseline, "change monitor started");
        self.active = Some(ActiveRun {
            cancel: handle,
            guard: baseline,
            _monitor: task,
        });
        Ok(events)
    }

    /// Leave the Running span: cancel the token and forget the monitor.
    ///
    /// An outstanding scheduled revert is left alone; it may still fire.
    pub fn cancel(&mut self) {
        if let Some(run) = self.active.take() {
            run.cancel.cancel();
            tracing::info!(watched = %self.value, "change monitor cancelled");
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    /// Guard value of the current Running span, if any.
    pub fn guard_value(&self) -> Option<&str> {
        self.active.as_ref().map(|run| run.guard.as_str())
    }

    pub fn stats(&self) -> &WatchStats {
        &self.stats
    }

    /// React to one monitor event.
    pub fn observe(&mut self, event: ChangeEvent) {
        let Some(guard) = self.active.as_ref().map(|run| run.guard.clone()) else {
            tracing::debug!(watched = %self.value, "event after cancel ignored");
            return;
        };

        match event.new_value {
            None => {
                tracing::warn!(
                    watched = %self.value,
                    last_good = %event.old_value,
                    "value re-read failed, holding off enforcement",
                );
            }
            Some(new) if new == guard => {
                self.stats.record_change(unix_seconds_now());
                tracing::info!(watched = %self.value, value = %new, "value restored to guard value");
            }
            Some(new) => {
                self.stats.record_change(unix_seconds_now());
                tracing::warn!(
                    watched = %self.value,
                    from = %event.old_value,
                    to = %new,
                    grace_secs = self.grace.as_secs(),
                    "unauthorized change detected, revert scheduled",
                );
                self.schedule_revert(guard);
            }
        }
    }

    fn schedule_revert(&mut self, target: String) {
        if let Some(previous) = self.pending_revert.take() {
            // Superseded: the newer schedule carries the same target with
            // fresher timing.
            previous.abort();
        }

        let store = self.store.clone();
        let value = self.value.clone();
        let grace = self.grace;
        let stats = self.stats.clone();
        self.pending_revert = Some(tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            match store.write(&value.doc, &value.name, &target) {
                Ok(()) => {
                    stats.record_revert();
                    tracing::info!(watched = %value, value = %target, "unauthorized change reverted");
                }
                Err(err) => {
                    tracing::error!(watched = %value, error = %err, "revert write failed");
                }
            }
        }));
    }
}

pub(crate) fn unix_seconds_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
