//! Directory-tree local store: blobs live in real nested folders.

use super::{join_path, LocalStore};
use crate::error::Result;
use crate::model::{migrate, MasterDocument, MASTER_FILENAME};
use async_trait::async_trait;
use std::path::{Path, PathBuf};

/// Local store backed by a hierarchical directory rooted at `base`.
/// Intermediate folders are created on demand.
pub struct DirStore {
    base: PathBuf,
}

impl DirStore {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    /// Resolve a slash-joined relative path against the base directory.
    fn resolve(&self, path: &str) -> PathBuf {
        let mut full = self.base.clone();
        for part in path.split('/').filter(|p| !p.is_empty()) {
            full.push(part);
        }
        full
    }
}

#[async_trait]
impl LocalStore for DirStore {
    async fn exists(&self, path: &str) -> bool {
        tokio::fs::try_exists(self.resolve(path)).await.unwrap_or(false)
    }

    async fn read_blob(&self, path: &str) -> Result<Option<Vec<u8>>> {
        match tokio::fs::read(self.resolve(path)).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn write_blob(
        &self,
        folder_parts: &[&str],
        filename: &str,
        bytes: &[u8],
    ) -> Result<String> {
        let rel = join_path(folder_parts, filename);
        let full = self.resolve(&rel);
        if let Some(parent) = full.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&full, bytes).await?;
        Ok(rel)
    }

    async fn read_master(&self) -> Result<Option<MasterDocument>> {
        match self.read_blob(MASTER_FILENAME).await? {
            Some(bytes) => Ok(Some(migrate::parse_master_bytes(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn write_master(&self, doc: &MasterDocument) -> Result<()> {
        let bytes = migrate::master_to_bytes(doc)?;
        self.write_blob(&[], MASTER_FILENAME, &bytes).await?;
        Ok(())
    }
}
