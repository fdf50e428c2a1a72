//! Scoped storage roots: a directory the user granted access to, reduced to
//! the two things the pipeline needs from it (`check_access` and `resolve`).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Live permission state of a stored directory handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionState {
    Granted,
    Prompt,
    Denied,
}

/// Serialisable capability for a directory. Only the filesystem kind exists today.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum DirectoryHandle {
    Fs { path: PathBuf },
}

impl DirectoryHandle {
    pub fn fs(path: impl Into<PathBuf>) -> Self {
        DirectoryHandle::Fs { path: path.into() }
    }

    /// Display name of the directory (last path component).
    pub fn name(&self) -> String {
        match self {
            DirectoryHandle::Fs { path } => path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| path.to_string_lossy().to_string()),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AcquireError {
    #[error("the extension did not report a file name")]
    MissingName,
    #[error("file {0} not found in the download folder")]
    NotFound(String),
    #[error("file {0} is not an HTML report (.html or .htm expected)")]
    UnsupportedType(String),
    #[error("no access to the download folder")]
    AccessDenied,
    #[error("failed to read {name}: {source}")]
    Read {
        name: String,
        #[source]
        source: std::io::Error,
    },
}

impl AcquireError {
    pub fn code(&self) -> &'static str {
        match self {
            AcquireError::MissingName => "missing_name",
            AcquireError::NotFound(_) => "not_found",
            AcquireError::UnsupportedType(_) => "unsupported_type",
            AcquireError::AccessDenied => "access_denied",
            AcquireError::Read { .. } => "read_failed",
        }
    }
}

#[async_trait]
pub trait StorageRoot: Send + Sync {
    fn name(&self) -> String;

    /// Re-queries read-write access. Never cached.
    async fn check_access(&self) -> anyhow::Result<PermissionState>;

    /// Reads the file with exactly this name directly inside the root.
    async fn resolve(&self, file_name: &str) -> Result<Vec<u8>, AcquireError>;
}

/// The runtime side of directory access: whether it exists at all, and how
/// a stored handle turns back into a usable root.
#[async_trait]
pub trait RootProvider: Send + Sync {
    fn supports_directory_access(&self) -> bool;

    fn open(&self, handle: &DirectoryHandle) -> Arc<dyn StorageRoot>;

    /// Asks for read-write access on a freshly chosen directory.
    async fn request_access(&self, handle: &DirectoryHandle) -> anyhow::Result<PermissionState> {
        self.open(handle).check_access().await
    }
}

/// Plain directories on the local filesystem.
#[derive(Debug, Clone)]
pub struct FsRootProvider {
    enabled: bool,
}

impl FsRootProvider {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }
}

#[async_trait]
impl RootProvider for FsRootProvider {
    fn supports_directory_access(&self) -> bool {
        self.enabled
    }

    fn open(&self, handle: &DirectoryHandle) -> Arc<dyn StorageRoot> {
        match handle {
            DirectoryHandle::Fs { path } => Arc::new(FsRoot::new(path)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FsRoot {
    path: PathBuf,
}

impl FsRoot {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

#[async_trait]
impl StorageRoot for FsRoot {
    fn name(&self) -> String {
        DirectoryHandle::fs(&self.path).name()
    }

    async fn check_access(&self) -> anyhow::Result<PermissionState> {
        let meta = match tokio::fs::metadata(&self.path).await {
            Ok(m) => m,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(PermissionState::Denied)
            }
            Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
                return Ok(PermissionState::Denied)
            }
            Err(e) => return Err(e.into()),
        };
        if !meta.is_dir() {
            return Ok(PermissionState::Denied);
        }
        if meta.permissions().readonly() {
            return Ok(PermissionState::Prompt);
        }
        Ok(PermissionState::Granted)
    }

    async fn resolve(&self, file_name: &str) -> Result<Vec<u8>, AcquireError> {
        let read_err = |source| AcquireError::Read {
            name: file_name.to_string(),
            source,
        };
        let mut entries = match tokio::fs::read_dir(&self.path).await {
            Ok(v) => v,
            Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
                return Err(AcquireError::AccessDenied)
            }
            Err(e) => return Err(read_err(e)),
        };

        // Exact name match on directory entries; the name is never joined onto
        // the root path, so `..` and separators cannot escape it.
        let mut found: Option<PathBuf> = None;
        while let Some(ent) = entries.next_entry().await.map_err(read_err)? {
            if ent.file_name().to_str() == Some(file_name) {
                found = Some(ent.path());
                break;
            }
        }
        let Some(path) = found else {
            return Err(AcquireError::NotFound(file_name.to_string()));
        };
        if !tokio::fs::metadata(&path).await.map_err(read_err)?.is_file() {
            return Err(AcquireError::NotFound(file_name.to_string()));
        }
        tokio::fs::read(&path).await.map_err(read_err)
    }
}

/// Reduces whatever the extension reported (a full path, sometimes with a
/// query or fragment) to a bare file name.
pub fn normalize_file_name(reported: &str) -> String {
    let cut = reported
        .find(|c| c == '?' || c == '#')
        .map(|i| &reported[..i])
        .unwrap_or(reported);
    let base = cut.rsplit(|c| c == '/' || c == '\\').next().unwrap_or(cut);
    base.trim().to_string()
}

pub fn is_html_name(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    lower.ends_with(".html") || lower.ends_with(".htm")
}

/// Normalizes the reported name, validates it and reads it from `root`.
pub async fn acquire(
    root: &dyn StorageRoot,
    reported: Option<&str>,
) -> Result<(String, Vec<u8>), AcquireError> {
    let name = reported.map(normalize_file_name).unwrap_or_default();
    if name.is_empty() {
        return Err(AcquireError::MissingName);
    }
    if !is_html_name(&name) {
        return Err(AcquireError::UnsupportedType(name));
    }
    let bytes = root.resolve(&name).await?;
    Ok((name, bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_strips_directories_query_and_fragment() {
        assert_eq!(normalize_file_name("report.html"), "report.html");
        assert_eq!(
            normalize_file_name("C:\\Users\\me\\Downloads\\9.1.06.html"),
            "9.1.06.html"
        );
        assert_eq!(
            normalize_file_name("/home/me/Downloads/rapport.htm?x=1#top"),
            "rapport.htm"
        );
        assert_eq!(normalize_file_name("dir/"), "");
    }

    #[test]
    fn html_extension_check_is_case_insensitive() {
        assert!(is_html_name("A.HTML"));
        assert!(is_html_name("a.htm"));
        assert!(!is_html_name("a.xlsx"));
        assert!(!is_html_name("html"));
    }
}
