//! Crash-safe JSON file helpers.
//!
//! Writes land in a sibling temp file which is synced and then renamed over
//! the target, so readers only ever see the old or the new document.

use std::fs;
use std::io::{ErrorKind, Write};
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{PersistenceError, Result};

/// Replace the contents of `path` with `bytes` in one rename.
///
/// Missing parent directories are created.
pub fn replace_file(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir).map_err(|source| PersistenceError::Directory {
        path: dir.to_path_buf(),
        source,
    })?;

    let write_err = |source| PersistenceError::Write {
        path: path.to_path_buf(),
        source,
    };

    // Same directory so the rename never crosses filesystems.
    let mut staged = tempfile::NamedTempFile::new_in(dir).map_err(write_err)?;
    staged.write_all(bytes).map_err(write_err)?;
    staged.as_file().sync_all().map_err(write_err)?;
    staged.persist(path).map_err(|e| write_err(e.error))?;
    Ok(())
}

/// Serialize `value` as pretty JSON and replace `path` with it.
pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let mut json = serde_json::to_vec_pretty(value)?;
    json.push(b'\n');
    replace_file(path, &json)
}

/// Load JSON from `path`; a missing file yields `None`.
pub fn load_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    let data = match fs::read(path) {
        Ok(data) => data,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(PersistenceError::Read {
                path: path.to_path_buf(),
                source,
            })
        }
    };
    // Blank files count as missing.
    if data.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }
    Ok(Some(serde_json::from_slice(&data)?))
}
