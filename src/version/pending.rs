//! Queue of detected updates awaiting application

use std::fmt;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::version::error::StoreError;
use crate::version::store::JsonStore;

/// Lifecycle of a pending update
///
/// `Pending` is set on detection; `Validated`, `Failed` and `Applied` are
/// set by whatever applies updates to the overlay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum PendingStatus {
    #[default]
    Pending,
    Validated,
    Failed,
    Applied,
}

impl PendingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PendingStatus::Pending => "pending",
            PendingStatus::Validated => "validated",
            PendingStatus::Failed => "failed",
            PendingStatus::Applied => "applied",
        }
    }

    /// Parse a recognized status name
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(PendingStatus::Pending),
            "validated" => Some(PendingStatus::Validated),
            "failed" => Some(PendingStatus::Failed),
            "applied" => Some(PendingStatus::Applied),
            _ => None,
        }
    }
}

/// Unrecognized names become `Pending`
impl From<&str> for PendingStatus {
    fn from(s: &str) -> Self {
        Self::parse(s).unwrap_or_else(|| {
            warn!("Unknown pending status {:?}, using \"pending\"", s);
            PendingStatus::Pending
        })
    }
}

impl From<String> for PendingStatus {
    fn from(s: String) -> Self {
        Self::from(s.as_str())
    }
}

impl From<PendingStatus> for String {
    fn from(status: PendingStatus) -> Self {
        status.as_str().to_string()
    }
}

impl fmt::Display for PendingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingUpdate {
    pub package: String,
    pub current_version: String,
    pub new_version: String,
    #[serde(default)]
    pub status: PendingStatus,
    #[serde(default = "epoch")]
    pub detected_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

fn epoch() -> DateTime<Utc> {
    DateTime::<Utc>::UNIX_EPOCH
}

impl PendingUpdate {
    /// A freshly detected update; `detected_at` is filled in by [`PendingQueue::add`]
    pub fn new(package: &str, current_version: &str, new_version: &str) -> Self {
        Self {
            package: package.to_string(),
            current_version: current_version.to_string(),
            new_version: new_version.to_string(),
            status: PendingStatus::Pending,
            detected_at: epoch(),
            error: None,
        }
    }
}

pub struct PendingQueue {
    store: JsonStore<PendingUpdate>,
}

impl PendingQueue {
    pub fn new(path: &Path) -> Self {
        info!("Opening pending queue at {:?}", path);
        Self {
            store: JsonStore::open(path),
        }
    }

    pub fn path(&self) -> &Path {
        self.store.path()
    }

    /// Insert or replace the entry for `update.package`.
    ///
    /// An epoch `detected_at` is replaced with the current time. An error
    /// message is kept only on `Failed` entries.
    pub fn add(&self, mut update: PendingUpdate) -> Result<(), StoreError> {
        if update.detected_at == epoch() {
            update.detected_at = Utc::now();
        }
        if update.status != PendingStatus::Failed {
            update.error = None;
        }
        self.store.update(|entries| {
            entries.insert(update.package.clone(), update);
            Ok(())
        })
    }

    /// Move `key` to `status`, recording `error` only for `failed`
    pub fn set_status(
        &self,
        key: &str,
        status: &str,
        error: Option<&str>,
    ) -> Result<(), StoreError> {
        let status = PendingStatus::parse(status)
            .ok_or_else(|| StoreError::InvalidTransition(status.to_string()))?;
        self.store.update(|entries| {
            let entry = entries
                .get_mut(key)
                .ok_or_else(|| StoreError::NotFound(key.to_string()))?;
            entry.status = status;
            entry.error = match status {
                PendingStatus::Failed => error.map(str::to_string),
                _ => None,
            };
            Ok(())
        })
    }

    /// Snapshot of all entries sorted by package id
    pub fn list(&self) -> Result<Vec<PendingUpdate>, StoreError> {
        let mut updates = self
            .store
            .read(|entries| entries.values().cloned().collect::<Vec<_>>())?;
        updates.sort_by(|a, b| a.package.cmp(&b.package));
        Ok(updates)
    }

    pub fn list_by_status(&self, status: PendingStatus) -> Result<Vec<PendingUpdate>, StoreError> {
        let mut updates = self.list()?;
        updates.retain(|u| u.status == status);
        Ok(updates)
    }

    pub fn has(&self, key: &str) -> Result<bool, StoreError> {
        self.store.read(|entries| entries.contains_key(key))
    }

    pub fn get(&self, key: &str) -> Result<Option<PendingUpdate>, StoreError> {
        self.store.read(|entries| entries.get(key).cloned())
    }

    pub fn delete(&self, key: &str) -> Result<bool, StoreError> {
        self.store
            .update(|entries| Ok(entries.remove(key).is_some()))
    }

    pub fn clear(&self) -> Result<(), StoreError> {
        self.store.update(|entries| {
            entries.clear();
            Ok(())
        })
    }

    pub fn len(&self) -> Result<usize, StoreError> {
        self.store.read(|entries| entries.len())
    }

    pub fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.len()? == 0)
    }
}
