use anyhow::Context;
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Revocable reference to the produced spreadsheet, like a blob URL.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct ArtifactRef(String);

impl ArtifactRef {
    fn fresh() -> Self {
        ArtifactRef(format!("artifact:{}", uuid::Uuid::new_v4()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ArtifactRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone)]
pub struct Artifact {
    pub file_name: String,
    pub mime: &'static str,
    pub bytes: Arc<Vec<u8>>,
}

impl Artifact {
    pub fn new(file_name: impl Into<String>, mime: &'static str, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            mime,
            bytes: Arc::new(bytes),
        }
    }

    /// Writes the artifact into `dir` under its fixed file name.
    pub async fn save_to(&self, dir: &Path) -> anyhow::Result<PathBuf> {
        tokio::fs::create_dir_all(dir)
            .await
            .with_context(|| format!("failed to create directory {}", dir.to_string_lossy()))?;
        let path = dir.join(&self.file_name);
        tokio::fs::write(&path, self.bytes.as_slice())
            .await
            .with_context(|| format!("failed to write {}", path.to_string_lossy()))?;
        Ok(path)
    }
}

/// Holds at most one live artifact. Replacing it revokes the old reference.
#[derive(Debug, Default)]
pub struct ArtifactSlot {
    live: Option<(ArtifactRef, Artifact)>,
}

impl ArtifactSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn replace(&mut self, artifact: Artifact) -> ArtifactRef {
        if let Some(old) = self.release() {
            tracing::debug!(artifact = %old, "revoked previous artifact");
        }
        let r = ArtifactRef::fresh();
        self.live = Some((r.clone(), artifact));
        r
    }

    /// Only the live reference resolves; revoked ones return `None`.
    pub fn get(&self, r: &ArtifactRef) -> Option<&Artifact> {
        match &self.live {
            Some((live, a)) if live == r => Some(a),
            _ => None,
        }
    }

    pub fn current(&self) -> Option<(&ArtifactRef, &Artifact)> {
        self.live.as_ref().map(|(r, a)| (r, a))
    }

    pub fn release(&mut self) -> Option<ArtifactRef> {
        self.live.take().map(|(r, _)| r)
    }

    pub fn live_count(&self) -> usize {
        usize::from(self.live.is_some())
    }
}
