//! # Storage
//!
//! Human-readable JSON documents that are re-read and fully rewritten on
//! every mutation. Callers serialize access themselves; the helpers here
//! only do the file I/O.

pub mod balances;
pub mod stats;

use crate::error::StorageError;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io::ErrorKind;
use std::path::Path;

/// Read a JSON document. A missing or empty file yields `T::default()`;
/// unparsable content is an error rather than a silent reset.
pub(crate) async fn read_document<T>(path: &Path) -> Result<T, StorageError>
where
    T: DeserializeOwned + Default,
{
    let raw = match tokio::fs::read_to_string(path).await {
        Ok(raw) => raw,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(T::default()),
        Err(source) => {
            return Err(StorageError::Io {
                path: path.display().to_string(),
                source,
            })
        }
    };

    if raw.trim().is_empty() {
        return Ok(T::default());
    }

    serde_json::from_str(&raw).map_err(|source| StorageError::Corrupt {
        path: path.display().to_string(),
        source,
    })
}

/// Pretty-print `value` to a sibling temp file, then rename it over `path`.
pub(crate) async fn write_document<T: Serialize>(path: &Path, value: &T) -> Result<(), StorageError> {
    let io_err = |source| StorageError::Io {
        path: path.display().to_string(),
        source,
    };

    if let Some(dir) = path.parent() {
        if !dir.as_os_str().is_empty() {
            tokio::fs::create_dir_all(dir).await.map_err(io_err)?;
        }
    }

    let body = serde_json::to_string_pretty(value)?;
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");

    tokio::fs::write(&tmp, body).await.map_err(io_err)?;
    tokio::fs::rename(&tmp, path).await.map_err(io_err)?;
    Ok(())
}
