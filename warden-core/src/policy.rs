//! Policy-document store.
//!
//! # Storage layout
//!
//! ```text
//! <store_root>/                (mode 0700, created on first write)
//!   personalization.yaml       (YAML mapping, name -> string — mode 0600)
//!   <doc>.yaml                 (any other policy document)
//! ```
//!
//! The production root is `~/.warden/policies`; every function takes the
//! root explicitly so tests can point at a `TempDir`.

use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::error::StoreError;
use crate::types::ValueName;

type Document = BTreeMap<String, serde_yaml::Value>;

// ---------------------------------------------------------------------------
// 1. Path helpers
// ---------------------------------------------------------------------------

/// `<root>/<doc>` — pure, no I/O.
pub fn document_path(root: &Path, doc: &Path) -> PathBuf {
    root.join(doc)
}

// ---------------------------------------------------------------------------
// 2. Read
// ---------------------------------------------------------------------------

/// Read the string value stored under `name` in `<root>/<doc>`.
///
/// Returns `StoreError::Unavailable` if the document is missing, unreadable,
/// or not a YAML mapping; `StoreError::ValueMissing` if `name` is absent or
/// holds a non-string.
pub fn read_value(root: &Path, doc: &Path, name: &ValueName) -> Result<String, StoreError> {
    let path = document_path(root, doc);
    let map = load_document(&path)?;
    match map.get(&name.0) {
        Some(serde_yaml::Value::String(s)) => Ok(s.clone()),
        Some(_) | None => Err(StoreError::ValueMissing {
            doc: path,
            name: name.0.clone(),
        }),
    }
}

// ---------------------------------------------------------------------------
// 3. Write (atomic)
// ---------------------------------------------------------------------------

/// Atomically set `name` to `value` in `<root>/<doc>`.
///
/// Creates the document (and any missing parent directories, mode `0700`) if
/// it does not exist; a document that no longer parses is replaced by a fresh
/// mapping so enforcement keeps working against corruption. Other names in a
/// healthy document are preserved.
///
/// Write flow: serialize → `.tmp` sibling → `chmod 0600` → `rename`.
/// The `.tmp` lives in the target's directory, so the rename never crosses a
/// filesystem boundary.
pub fn write_value(
    root: &Path,
    doc: &Path,
    name: &ValueName,
    value: &str,
) -> Result<(), StoreError> {
    let path = document_path(root, doc);
    let dir = path
        .parent()
        .ok_or_else(|| StoreError::unavailable(&path, "document path has no parent directory"))?;
    if !dir.exists() {
        std::fs::create_dir_all(dir).map_err(|e| map_write_err(dir, e))?;
        set_dir_permissions(dir)?;
    }

    let mut map = load_document(&path).unwrap_or_default();
    map.insert(
        name.0.clone(),
        serde_yaml::Value::String(value.to_owned()),
    );

    let file_name = path
        .file_name()
        .ok_or_else(|| StoreError::unavailable(&path, "document path has no file name"))?
        .to_string_lossy()
        .into_owned();
    let tmp = path.with_file_name(format!("{file_name}.tmp"));

    let yaml = serde_yaml::to_string(&map).map_err(|e| StoreError::unavailable(&path, e))?;
    std::fs::write(&tmp, yaml).map_err(|e| map_write_err(&path, e))?;
    set_file_permissions(&tmp)?;
    std::fs::rename(&tmp, &path).map_err(|e| map_write_err(&path, e))?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Private helpers
// ---------------------------------------------------------------------------

fn load_document(path: &Path) -> Result<Document, StoreError> {
    let contents =
        std::fs::read_to_string(path).map_err(|e| StoreError::unavailable(path, e))?;
    if contents.trim().is_empty() {
        return Ok(Document::new());
    }
    serde_yaml::from_str(&contents).map_err(|e| StoreError::unavailable(path, e))
}

fn map_write_err(path: &Path, e: std::io::Error) -> StoreError {
    if e.kind() == ErrorKind::PermissionDenied {
        StoreError::PermissionDenied {
            path: path.to_path_buf(),
        }
    } else {
        StoreError::unavailable(path, e)
    }
}

#[cfg(unix)]
fn set_dir_permissions(path: &Path) -> Result<(), StoreError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o700))
        .map_err(|e| map_write_err(path, e))
}
#[cfg(not(unix))]
fn set_dir_permissions(_path: &Path) -> Result<(), StoreError> {
    Ok(())
}

#[cfg(unix)]
fn set_file_permissions(path: &Path) -> Result<(), StoreError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
        .map_err(|e| map_write_err(path, e))
}
#[cfg(not(unix))]
fn set_file_permissions(_path: &Path) -> Result<(), StoreError> {
    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn make_root() -> TempDir {
        TempDir::new().expect("tempdir")
    }

    fn doc() -> PathBuf {
        PathBuf::from("personalization.yaml")
    }
    fn name() -> ValueName {
        ValueName::from("lock_screen_image")
    }

    #[test]
    fn document_path_joins_root_and_doc() {
        let path = document_path(Path::new("/tmp/store"), &doc());
        assert_eq!(path, Path::new("/tmp/store/personalization.yaml"));
    }

    #[test]
    fn write_creates_document_with_perms() {
        let root = make_root();
        write_value(root.path(), &doc(), &name(), "corp.png").expect("write");
        let path = document_path(root.path(), &doc());
        assert!(path.exists());
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&path).unwrap().permissions().mode() & 0o777;
            assert_eq!(mode, 0o600);
        }
    }

    #[test]
    fn atomic_write_cleans_up_tmp() {
        let root = make_root();
        write_value(root.path(), &doc(), &name(), "corp.png").expect("write");
        let tmp = document_path(root.path(), &doc())
            .with_file_name("personalization.yaml.tmp");
        assert!(!tmp.exists(), ".tmp must be gone after successful write");
    }

    #[test]
    fn write_preserves_other_names() {
        let root = make_root();
        write_value(root.path(), &doc(), &ValueName::from("wallpaper"), "a.png").expect("write");
        write_value(root.path(), &doc(), &name(), "corp.png").expect("write");
        let other = read_value(root.path(), &doc(), &ValueName::from("wallpaper")).expect("read");
        assert_eq!(other, "a.png");
    }

    #[test]
    fn write_replaces_unparseable_document() {
        let root = make_root();
        let path = document_path(root.path(), &doc());
        std::fs::write(&path, "{{{ not yaml").expect("seed corrupt doc");
        assert!(matches!(
            read_value(root.path(), &doc(), &name()),
            Err(StoreError::Unavailable { .. })
        ));
        write_value(root.path(), &doc(), &name(), "corp.png").expect("write over corrupt");
        assert_eq!(read_value(root.path(), &doc(), &name()).expect("read"), "corp.png");
    }

    #[test]
    fn empty_document_reads_as_missing_value() {
        let root = make_root();
        let path = document_path(root.path(), &doc());
        std::fs::write(&path, "").expect("seed empty doc");
        assert!(matches!(
            read_value(root.path(), &doc(), &name()),
            Err(StoreError::ValueMissing { .. })
        ));
    }
}
