//! Atomic JSON persistence for run records and other small documents.

use std::io;
use std::path::Path;

/// Serialize `data` as pretty JSON and atomically replace `path` with it.
///
/// The bytes go to a `.tmp` sibling first and are then renamed over the
/// target, so readers never observe a half-written run record. Parent
/// directories are created as needed.
pub fn atomic_write_json<T: serde::Serialize>(path: &Path, data: &T) -> io::Result<()> {
    let json = serde_json::to_vec_pretty(data).map_err(io::Error::other)?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, json)?;
    std::fs::rename(&tmp, path)
}

/// Load and deserialize JSON from `path`; `Ok(None)` when it does not exist.
pub fn load_json<T: serde::de::DeserializeOwned>(path: &Path) -> io::Result<Option<T>> {
    if !path.exists() {
        return Ok(None);
    }
    let data = std::fs::read(path)?;
    serde_json::from_slice(&data)
        .map(Some)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}
