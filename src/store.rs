use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tokio_rusqlite::Connection;

use crate::root::DirectoryHandle;

const KEY_PREFIX: &str = "downloadFolder_";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectoryPermissionRecord {
    pub handle: DirectoryHandle,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub origin: String,
}

impl DirectoryPermissionRecord {
    pub fn new(handle: DirectoryHandle, origin: impl Into<String>) -> Self {
        Self {
            name: handle.name(),
            handle,
            created_at: Utc::now(),
            origin: origin.into(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("failed to open handle store: {0}")]
    Open(String),
    #[error("handle store query failed: {0}")]
    Query(String),
    #[error("stored handle record is corrupt: {0}")]
    Decode(#[from] serde_json::Error),
}

pub fn store_key(origin: &str) -> String {
    format!("{KEY_PREFIX}{origin}")
}

/// Durable, origin-keyed store for directory permission records.
#[derive(Clone)]
pub struct HandleStore {
    conn: Arc<Connection>,
}

impl HandleStore {
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| StorageError::Open(e.to_string()))?;
            }
        }
        let conn = Connection::open(path)
            .await
            .map_err(|e| StorageError::Open(e.to_string()))?;
        Self::init(conn).await
    }

    pub async fn in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()
            .await
            .map_err(|e| StorageError::Open(e.to_string()))?;
        Self::init(conn).await
    }

    async fn init(conn: Connection) -> Result<Self, StorageError> {
        conn.call(|conn| {
            conn.execute(
                "CREATE TABLE IF NOT EXISTS handles(
                    key TEXT PRIMARY KEY,
                    value TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                )",
                [],
            )?;
            Ok(())
        })
        .await
        .map_err(|e| StorageError::Open(e.to_string()))?;
        Ok(Self {
            conn: Arc::new(conn),
        })
    }

    /// Stores `record` for `origin`, replacing any earlier grant.
    pub async fn put(
        &self,
        origin: &str,
        record: &DirectoryPermissionRecord,
    ) -> Result<(), StorageError> {
        let key = store_key(origin);
        let value = serde_json::to_string(record)?;
        let now = Utc::now().to_rfc3339();
        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO handles(key, value, updated_at) VALUES(?1, ?2, ?3)
                     ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
                    params![key, value, now],
                )?;
                Ok(())
            })
            .await
            .map_err(|e| StorageError::Query(e.to_string()))
    }

    /// Absence is `Ok(None)`, never an error.
    pub async fn get(&self, origin: &str) -> Result<Option<DirectoryPermissionRecord>, StorageError> {
        let key = store_key(origin);
        let raw: Option<String> = self
            .conn
            .call(move |conn| {
                let v = conn
                    .query_row("SELECT value FROM handles WHERE key = ?1", [&key], |r| {
                        r.get(0)
                    })
                    .optional()?;
                Ok(v)
            })
            .await
            .map_err(|e| StorageError::Query(e.to_string()))?;
        match raw {
            Some(text) => Ok(Some(serde_json::from_str(&text)?)),
            None => Ok(None),
        }
    }
}
