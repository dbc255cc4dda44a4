//! Durable JSON map shared by the cache and the pending queue
//!
//! The whole map is rewritten on every mutation: serialized to a sibling
//! temp file, synced, then renamed over the target path.

use std::collections::{BTreeMap, HashMap};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::version::error::StoreError;

/// Read a map from `path`.
///
/// A missing file is an empty map. An unreadable or undecodable file is
/// also treated as empty and logged.
pub(crate) fn load_map<T: DeserializeOwned>(path: &Path) -> HashMap<String, T> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!("No store at {:?}, starting empty", path);
            return HashMap::new();
        }
        Err(e) => {
            warn!("Failed to read store {:?}, starting empty: {}", path, e);
            return HashMap::new();
        }
    };

    if bytes.iter().all(u8::is_ascii_whitespace) {
        return HashMap::new();
    }

    serde_json::from_slice(&bytes).unwrap_or_else(|e| {
        warn!("Store {:?} is corrupt, starting empty: {}", path, e);
        HashMap::new()
    })
}

/// Atomically replace `path` with the JSON encoding of `entries`.
pub(crate) fn persist_map<T: Serialize>(
    path: &Path,
    entries: &HashMap<String, T>,
) -> Result<(), StoreError> {
    let io_err = |source: std::io::Error| StoreError::Io {
        path: path.to_path_buf(),
        source,
    };

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir).map_err(io_err)?;

    // Sorted keys keep the file stable across writes
    let sorted: BTreeMap<&String, &T> = entries.iter().collect();
    let json = serde_json::to_vec_pretty(&sorted)?;

    let mut tmp = NamedTempFile::new_in(dir).map_err(io_err)?;
    tmp.write_all(&json).map_err(io_err)?;
    tmp.as_file().sync_all().map_err(io_err)?;
    tmp.persist(path).map_err(|e| io_err(e.error))?;

    debug!("Persisted {} entries to {:?}", entries.len(), path);
    Ok(())
}

/// In-memory map guarded by a read/write lock and mirrored to disk
pub(crate) struct JsonStore<T> {
    path: PathBuf,
    entries: RwLock<HashMap<String, T>>,
}

impl<T> JsonStore<T>
where
    T: Clone + Serialize + DeserializeOwned,
{
    pub(crate) fn open(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            entries: RwLock::new(load_map(path)),
        }
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    pub(crate) fn read<R>(
        &self,
        f: impl FnOnce(&HashMap<String, T>) -> R,
    ) -> Result<R, StoreError> {
        let entries = self.entries.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(f(&entries))
    }

    /// Apply `f` to a copy of the map, persist the copy, then publish it.
    ///
    /// If `f` or the write fails the in-memory map is left unchanged.
    pub(crate) fn update<R>(
        &self,
        f: impl FnOnce(&mut HashMap<String, T>) -> Result<R, StoreError>,
    ) -> Result<R, StoreError> {
        let mut entries = self.entries.write().map_err(|_| StoreError::LockPoisoned)?;
        let mut next = entries.clone();
        let result = f(&mut next)?;
        persist_map(&self.path, &next)?;
        *entries = next;
        Ok(result)
    }
}
