//! Atomic whole-file replacement.

use crate::io::error::StoreError;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

fn tmp_path_for(path: &Path) -> PathBuf {
    let mut os = path.as_os_str().to_os_string();
    os.push(".tmp");
    PathBuf::from(os)
}

/// Replace `path` with `bytes` by writing a sibling temp file, fsyncing it,
/// and renaming it into place. Readers never observe a partial file.
///
/// # Errors
///
/// Returns `StoreError::Io` on any filesystem failure; the temp file is
/// cleaned up best-effort.
pub fn atomic_replace(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    let tmp = tmp_path_for(path);

    {
        let mut file = fs::File::create(&tmp).map_err(|e| StoreError::io(&tmp, e))?;
        file.write_all(bytes).map_err(|e| StoreError::io(&tmp, e))?;
        file.sync_all().map_err(|e| StoreError::io(&tmp, e))?;
    }

    if let Err(e) = fs::rename(&tmp, path) {
        let _ = fs::remove_file(&tmp);
        return Err(StoreError::io(path, e));
    }
    Ok(())
}

/// Serialize `value` as pretty-printed JSON and atomically replace `path`.
///
/// # Errors
///
/// Returns `StoreError::Json` on serialization failure, `StoreError::Io` on
/// filesystem failure.
pub fn atomic_replace_json<T: serde::Serialize>(path: &Path, value: &T) -> Result<(), StoreError> {
    let bytes = serde_json::to_vec_pretty(value).map_err(|e| StoreError::Json {
        path: path.to_path_buf(),
        source: e,
    })?;
    atomic_replace(path, &bytes)
}
