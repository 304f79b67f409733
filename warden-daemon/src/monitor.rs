//! Change monitor: one task per Running span.
//!
//! The monitor owns the baseline. It arms the store's change wait, re-reads
//! on every wake, and emits a [`ChangeEvent`] only when the value actually
//! differs (false wakes from attribute churn are swallowed). A new Running
//! span always means a new monitor with a fresh baseline read.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use warden_core::{ChangeEvent, StoreError, WatchedValue};

use crate::cancel::CancelToken;
use crate::store::ValueStore;

const EVENT_CHANNEL_CAPACITY: usize = 16;

/// Handle to a spawned monitor.
#[derive(Debug)]
pub struct MonitorHandle {
    /// Value read at start; the watchdog pins this as its guard value.
    pub baseline: String,
    pub events: mpsc::Receiver<ChangeEvent>,
    pub task: JoinHandle<()>,
}

/// Read the baseline and spawn the monitor task.
///
/// The baseline read happens before spawning: a store that cannot produce
/// the current value fails the whole Running transition, it does not produce
/// a half-started monitor.
pub fn spawn(
    store: Arc<dyn ValueStore>,
    value: WatchedValue,
    token: CancelToken,
) -> Result<MonitorHandle, StoreError> {
    let baseline = store.read(&value.doc, &value.name)?;
    let (events_tx, events) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
    let task = tokio::spawn(monitor_loop(store, value, token, baseline.clone(), events_tx));
    Ok(MonitorHandle {
        baseline,
        events,
        task,
    })
}

async fn monitor_loop(
    store: Arc<dyn ValueStore>,
    value: WatchedValue,
    token: CancelToken,
    mut baseline: String,
    events: mpsc::Sender<ChangeEvent>,
) {
    loop {
        if token.is_cancelled() {
            tracing::debug!(watched = %value, "change monitor cancelled");
            return;
        }

        tokio::select! {
            _ = token.cancelled() => {
                tracing::debug!(watched = %value, "change monitor cancelled during wait");
                return;
            }
            waited = store.await_change(&value.doc) => {
                if let Err(err) = waited {
                    tracing::error!(watched = %value, error = %err, "change wait failed, monitor stopping");
                    return;
                }
            }
        }

        // A cancellation can race with the wake; do not emit for a span the
        // watchdog has already abandoned.
        if token.is_cancelled() {
            tracing::debug!(watched = %value, "change monitor cancelled after wake");
            return;
        }

        match store.read(&value.doc, &value.name) {
            Ok(current) => {
                if current == baseline {
                    continue;
                }
                let event = ChangeEvent::changed(baseline.clone(), current.clone());
                if events.send(event).await.is_err() {
                    return;
                }
                baseline = current;
            }
            Err(err) => {
                tracing::warn!(watched = %value, error = %err, "re-read failed after change wake");
                if events.send(ChangeEvent::read_failed(baseline.clone())).await.is_err() {
                    return;
                }
                // Baseline is only updated on a successful read.
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use tokio::time::timeout;

    use crate::cancel::cancel_pair;
    use crate::store::MemoryStore;

    const DOC: &str = "personalization.yaml";
    const NAME: &str = "lock_screen_image";

    fn watched() -> WatchedValue {
        WatchedValue::new(DOC, NAME)
    }

    fn seeded_store(value: &str) -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        store.seed(DOC, NAME, value);
        store
    }

    async fn next_event(rx: &mut mpsc::Receiver<ChangeEvent>) -> ChangeEvent {
        timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("event within deadline")
            .expect("event channel open")
    }

    #[tokio::test]
    async fn baseline_read_failure_fails_spawn() {
        let store = Arc::new(MemoryStore::new());
        let (_handle, token) = cancel_pair();
        let err = spawn(store, watched(), token).unwrap_err();
        assert!(matches!(err, StoreError::ValueMissing { .. }), "got: {err}");
    }

    #[tokio::test]
    async fn change_emits_event_and_updates_baseline() {
        let store = seeded_store("corp.png");
        let (_handle, token) = cancel_pair();
        let mut handle = spawn(store.clone(), watched(), token).expect("spawn");
        assert_eq!(handle.baseline, "corp.png");

        store.set(DOC, NAME, "evil.png");
        let first = next_event(&mut handle.events).await;
        assert_eq!(first, ChangeEvent::changed("corp.png", "evil.png"));

        // Baseline moved with the change: the next event's old value is the
        // previously observed one.
        store.set(DOC, NAME, "worse.png");
        let second = next_event(&mut handle.events).await;
        assert_eq!(second, ChangeEvent::changed("evil.png", "worse.png"));
    }

    #[tokio::test]
    async fn false_wake_emits_nothing() {
        let store = seeded_store("corp.png");
        let (_handle, token) = cancel_pair();
        let mut handle = spawn(store.clone(), watched(), token).expect("spawn");

        // Same value re-written: waiters wake, the compare says unchanged.
        store.set(DOC, NAME, "corp.png");
        store.set(DOC, NAME, "evil.png");

        let event = next_event(&mut handle.events).await;
        assert_eq!(
            event,
            ChangeEvent::changed("corp.png", "evil.png"),
            "the only event must be the real change, with the original old value"
        );
    }

    #[tokio::test]
    async fn read_failure_emits_sentinel_and_keeps_baseline() {
        let store = seeded_store("corp.png");
        let (_handle, token) = cancel_pair();
        let mut handle = spawn(store.clone(), watched(), token).expect("spawn");

        store.fail_reads(true);
        store.set(DOC, NAME, "evil.png");
        let sentinel = next_event(&mut handle.events).await;
        assert!(sentinel.is_read_failure());
        assert_eq!(sentinel.old_value, "corp.png");

        // Once reads recover the old value in the next event is still the
        // original baseline.
        store.fail_reads(false);
        store.set(DOC, NAME, "worse.png");
        let event = next_event(&mut handle.events).await;
        assert_eq!(event, ChangeEvent::changed("corp.png", "worse.png"));
    }

    #[tokio::test]
    async fn deleted_value_emits_sentinel() {
        let store = seeded_store("corp.png");
        let (_handle, token) = cancel_pair();
        let mut handle = spawn(store.clone(), watched(), token).expect("spawn");

        store.remove(DOC, NAME);
        let sentinel = next_event(&mut handle.events).await;
        assert!(sentinel.is_read_failure());
        assert_eq!(sentinel.old_value, "corp.png");
    }

    #[tokio::test]
    async fn cancellation_ends_the_sequence_without_an_event() {
        let store = seeded_store("corp.png");
        let (handle, token) = cancel_pair();
        let mut monitor = spawn(store.clone(), watched(), token).expect("spawn");

        handle.cancel();
        let closed = timeout(Duration::from_secs(1), monitor.events.recv())
            .await
            .expect("channel must close promptly after cancel");
        assert!(closed.is_none(), "cancellation must not emit an event");

        timeout(Duration::from_secs(1), monitor.task)
            .await
            .expect("monitor task must end")
            .expect("monitor task join");
    }

    #[tokio::test]
    async fn wait_abort_is_fatal_to_the_monitor() {
        let store = seeded_store("corp.png");
        let (_handle, token) = cancel_pair();
        // Spawn succeeds (baseline read works), the first wait then aborts.
        store.fail_waits(true);
        let mut monitor = spawn(store.clone(), watched(), token).expect("spawn");

        let closed = timeout(Duration::from_secs(1), monitor.events.recv())
            .await
            .expect("channel must close after wait abort");
        assert!(closed.is_none());
    }

    #[tokio::test]
    async fn dropping_the_receiver_ends_the_task() {
        let store = seeded_store("corp.png");
        let (_handle, token) = cancel_pair();
        let monitor = spawn(store.clone(), watched(), token).expect("spawn");

        drop(monitor.events);
        store.set(DOC, NAME, "evil.png");

        timeout(Duration::from_secs(1), monitor.task)
            .await
            .expect("monitor must end when the consumer goes away")
            .expect("monitor task join");
    }
}
