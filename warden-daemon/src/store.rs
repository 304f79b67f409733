//! Store adapter: the watchdog's only view of the configuration store.
//!
//! [`FileStore`] is the production implementation over a directory of YAML
//! policy documents; [`MemoryStore`] backs tests and embedding. Both expose
//! the same coarse change-wait contract: `await_change` completes when
//! *something* about the document changed, the caller re-reads and compares,
//! and must call again to re-arm.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use notify::{recommended_watcher, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::{mpsc, watch};

use warden_core::{policy, StoreError, ValueName};

/// One named string value per (document, name) pair.
///
/// `await_change` is cancelled by dropping its future (`tokio::select!`),
/// which tears down the armed watcher with it.
#[async_trait]
pub trait ValueStore: Send + Sync {
    fn read(&self, doc: &Path, name: &ValueName) -> Result<String, StoreError>;

    /// Creates the document if it no longer exists.
    fn write(&self, doc: &Path, name: &ValueName, value: &str) -> Result<(), StoreError>;

    /// Completes on the next change touching `doc` (content, attributes,
    /// creation, removal). One-shot per call. `WaitAborted` means the
    /// notification facility itself failed, not that nothing changed.
    async fn await_change(&self, doc: &Path) -> Result<(), StoreError>;
}

// ---------------------------------------------------------------------------
// FileStore
// ---------------------------------------------------------------------------

/// Policy documents under a store root on disk (`~/.warden/policies` in
/// production). Reads and writes delegate to `warden_core::policy`.
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[async_trait]
impl ValueStore for FileStore {
    fn read(&self, doc: &Path, name: &ValueName) -> Result<String, StoreError> {
        policy::read_value(&self.root, doc, name)
    }

    fn write(&self, doc: &Path, name: &ValueName, value: &str) -> Result<(), StoreError> {
        policy::write_value(&self.root, doc, name, value)
    }

    async fn await_change(&self, doc: &Path) -> Result<(), StoreError> {
        let path = policy::document_path(&self.root, doc);
        let dir = path
            .parent()
            .map(Path::to_path_buf)
            .ok_or_else(|| StoreError::WaitAborted("document path has no parent".to_string()))?;
        let file_name = path
            .file_name()
            .map(std::ffi::OsStr::to_os_string)
            .ok_or_else(|| StoreError::WaitAborted("document path has no file name".to_string()))?;

        // The watch is directory-based so removal and re-creation of the
        // document itself still produce events.
        if !dir.exists() {
            std::fs::create_dir_all(&dir)
                .map_err(|e| StoreError::WaitAborted(e.to_string()))?;
        }
        // Canonicalize so backend paths (e.g. /private/var on macOS) match.
        let dir = std::fs::canonicalize(&dir).unwrap_or(dir);
        let watched = dir.join(&file_name);

        let (event_tx, mut event_rx) = mpsc::unbounded_channel::<notify::Result<Event>>();
        let mut _watcher: RecommendedWatcher = recommended_watcher(move |event| {
            let _ = event_tx.send(event);
        })
        .map_err(|e| StoreError::WaitAborted(e.to_string()))?;
        _watcher
            .watch(&dir, RecursiveMode::NonRecursive)
            .map_err(|e| StoreError::WaitAborted(e.to_string()))?;

        loop {
            let Some(event) = event_rx.recv().await else {
                return Err(StoreError::WaitAborted("watcher channel closed".to_string()));
            };
            let event = event.map_err(|e| StoreError::WaitAborted(e.to_string()))?;
            if matches!(event.kind, EventKind::Access(_)) {
                continue;
            }
            // Pathless events are treated as a potential change; the caller
            // re-reads and compares anyway.
            if event.paths.is_empty() || event.paths.iter().any(|p| p == &watched) {
                return Ok(());
            }
        }
    }
}

// ---------------------------------------------------------------------------
// MemoryStore
// ---------------------------------------------------------------------------

/// In-process store with failure injection.
///
/// Wake-ups ride a `watch` channel version counter, and the store latches
/// undelivered versions: a write that lands before `await_change` arms is
/// still delivered by the next call, never silently lost.
pub struct MemoryStore {
    values: Mutex<HashMap<(PathBuf, String), String>>,
    version: watch::Sender<u64>,
    delivered: Mutex<u64>,
    writes: AtomicU64,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
    fail_waits: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        let (version, _) = watch::channel(0);
        Self {
            values: Mutex::new(HashMap::new()),
            version,
            delivered: Mutex::new(0),
            writes: AtomicU64::new(0),
            fail_reads: AtomicBool::new(false),
            fail_writes: AtomicBool::new(false),
            fail_waits: AtomicBool::new(false),
        }
    }

    /// Insert without waking waiters. Setup only.
    pub fn seed(&self, doc: impl Into<PathBuf>, name: impl Into<String>, value: impl Into<String>) {
        self.values_mut().insert((doc.into(), name.into()), value.into());
    }

    /// Insert as an external writer would: waiters wake.
    pub fn set(&self, doc: impl Into<PathBuf>, name: impl Into<String>, value: impl Into<String>) {
        self.values_mut().insert((doc.into(), name.into()), value.into());
        self.bump();
    }

    /// Delete a value as an external writer would: waiters wake.
    pub fn remove(&self, doc: impl Into<PathBuf>, name: impl Into<String>) {
        self.values_mut().remove(&(doc.into(), name.into()));
        self.bump();
    }

    pub fn get(&self, doc: impl Into<PathBuf>, name: impl Into<String>) -> Option<String> {
        self.values_mut().get(&(doc.into(), name.into())).cloned()
    }

    /// Number of successful `ValueStore::write` calls.
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }

    pub fn fail_reads(&self, on: bool) {
        self.fail_reads.store(on, Ordering::Relaxed);
    }

    pub fn fail_writes(&self, on: bool) {
        self.fail_writes.store(on, Ordering::Relaxed);
    }

    pub fn fail_waits(&self, on: bool) {
        self.fail_waits.store(on, Ordering::Relaxed);
    }

    fn values_mut(&self) -> std::sync::MutexGuard<'_, HashMap<(PathBuf, String), String>> {
        // A poisoned plain map is still usable; recover instead of panicking.
        self.values.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn bump(&self) {
        self.version.send_modify(|v| *v += 1);
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ValueStore for MemoryStore {
    fn read(&self, doc: &Path, name: &ValueName) -> Result<String, StoreError> {
        if self.fail_reads.load(Ordering::Relaxed) {
            return Err(StoreError::unavailable(doc, "injected read failure"));
        }
        self.values_mut()
            .get(&(doc.to_path_buf(), name.0.clone()))
            .cloned()
            .ok_or_else(|| StoreError::ValueMissing {
                doc: doc.to_path_buf(),
                name: name.0.clone(),
            })
    }

    fn write(&self, doc: &Path, name: &ValueName, value: &str) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::Relaxed) {
            return Err(StoreError::PermissionDenied {
                path: doc.to_path_buf(),
            });
        }
        self.values_mut()
            .insert((doc.to_path_buf(), name.0.clone()), value.to_owned());
        self.writes.fetch_add(1, Ordering::Relaxed);
        self.bump();
        Ok(())
    }

    async fn await_change(&self, _doc: &Path) -> Result<(), StoreError> {
        if self.fail_waits.load(Ordering::Relaxed) {
            return Err(StoreError::WaitAborted("injected wait failure".to_string()));
        }
        let mut rx = self.version.subscribe();
        loop {
            let current = *rx.borrow();
            {
                let mut delivered = self
                    .delivered
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner());
                if current > *delivered {
                    *delivered = current;
                    return Ok(());
                }
            }
            rx.changed()
                .await
                .map_err(|_| StoreError::WaitAborted("version channel closed".to_string()))?;
        }
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
