use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;

use crate::root::{DirectoryHandle, PermissionState, RootProvider, StorageRoot};
use crate::store::{DirectoryPermissionRecord, HandleStore, StorageError};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum PermissionStatus {
    Unsupported,
    NotSelected,
    #[serde(rename_all = "camelCase")]
    Granted {
        name: String,
        created_at: DateTime<Utc>,
    },
    /// Stored but no longer granted; the user has to pick the folder again.
    Expired { name: String },
}

#[derive(Debug, Clone, PartialEq)]
pub enum GrantOutcome {
    Granted(DirectoryPermissionRecord),
    Denied(PermissionState),
    Unsupported,
}

/// Decides whether downloaded reports can be picked up automatically.
///
/// Nothing here is cached: permission can be revoked or expire outside this
/// process at any moment, so every question goes back to the store and the
/// live handle.
#[derive(Clone)]
pub struct PermissionGate {
    store: HandleStore,
    provider: Arc<dyn RootProvider>,
    origin: String,
}

impl PermissionGate {
    pub fn new(store: HandleStore, provider: Arc<dyn RootProvider>, origin: impl Into<String>) -> Self {
        Self {
            store,
            provider,
            origin: origin.into(),
        }
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    pub async fn is_auto_capable(&self) -> bool {
        self.granted_root().await.is_some()
    }

    /// The permitted root, if every check passes. Fail-closed.
    pub async fn granted_root(&self) -> Option<Arc<dyn StorageRoot>> {
        if !self.provider.supports_directory_access() {
            tracing::debug!("directory access unsupported; manual flow only");
            return None;
        }
        let record = match self.store.get(&self.origin).await {
            Ok(Some(r)) => r,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!(error = %e, "handle store lookup failed");
                return None;
            }
        };
        let root = self.provider.open(&record.handle);
        match root.check_access().await {
            Ok(PermissionState::Granted) => Some(root),
            Ok(state) => {
                tracing::info!(folder = %record.name, ?state, "download folder permission not granted");
                None
            }
            Err(e) => {
                tracing::warn!(error = %e, folder = %record.name, "permission query failed");
                None
            }
        }
    }

    pub async fn status(&self) -> PermissionStatus {
        if !self.provider.supports_directory_access() {
            return PermissionStatus::Unsupported;
        }
        let record = match self.store.get(&self.origin).await {
            Ok(Some(r)) => r,
            Ok(None) => return PermissionStatus::NotSelected,
            Err(e) => {
                tracing::warn!(error = %e, "handle store lookup failed");
                return PermissionStatus::NotSelected;
            }
        };
        match self.provider.open(&record.handle).check_access().await {
            Ok(PermissionState::Granted) => PermissionStatus::Granted {
                name: record.name,
                created_at: record.created_at,
            },
            Ok(_) => PermissionStatus::Expired { name: record.name },
            Err(e) => {
                tracing::warn!(error = %e, "permission query failed");
                PermissionStatus::Expired { name: record.name }
            }
        }
    }

    /// Requests access to `dir` and persists the grant for this origin.
    pub async fn grant(&self, dir: &Path) -> Result<GrantOutcome, StorageError> {
        if !self.provider.supports_directory_access() {
            return Ok(GrantOutcome::Unsupported);
        }
        let handle = DirectoryHandle::fs(dir);
        let state = match self.provider.request_access(&handle).await {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!(error = %e, dir = %dir.to_string_lossy(), "permission request failed");
                PermissionState::Denied
            }
        };
        if state != PermissionState::Granted {
            tracing::info!(?state, "permission for download folder denied");
            return Ok(GrantOutcome::Denied(state));
        }
        let record = DirectoryPermissionRecord::new(handle, &self.origin);
        self.store.put(&self.origin, &record).await?;
        tracing::info!(folder = %record.name, origin = %self.origin, "download folder granted");
        Ok(GrantOutcome::Granted(record))
    }
}
