//! Cancellation pair for one monitor run.
//!
//! A fresh pair is minted every time the watchdog enters Running (initial
//! start and each continue); a token is never reused after cancellation.

use tokio::sync::watch;

/// Observe-and-set side. Held by the watchdog.
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

/// Observation side. Cloned into the monitor task.
#[derive(Debug, Clone)]
pub struct CancelToken {
    rx: watch::Receiver<bool>,
}

/// Mint a fresh handle/token pair.
pub fn cancel_pair() -> (CancelHandle, CancelToken) {
    let (tx, rx) = watch::channel(false);
    (CancelHandle { tx }, CancelToken { rx })
}

impl CancelHandle {
    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }
}

impl CancelToken {
    /// True once `cancel()` has been called or the handle was dropped.
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow() || self.rx.has_changed().is_err()
    }

    /// Resolves when the token is cancelled; immediately if it already is.
    ///
    /// Takes `&self` (clones the receiver internally) so it can sit in a
    /// `select!` arm next to other borrows of the holder.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        // Err means the handle is gone, which counts as cancellation.
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }
}
