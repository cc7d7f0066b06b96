//! Flat key-value local store: the slash-joined relative path is the key.

use super::{join_path, LocalStore};
use crate::error::Result;
use crate::model::{migrate, MasterDocument};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Local store over a flat namespace. Folder creation is a no-op; the
/// relative path is used verbatim as the key. The master record lives in
/// its own slot, not in the blob namespace.
pub struct MemStore {
    blobs: RwLock<HashMap<String, Vec<u8>>>,
    master: RwLock<Option<Vec<u8>>>,
}

impl MemStore {
    pub fn new() -> Self {
        Self {
            blobs: RwLock::new(HashMap::new()),
            master: RwLock::new(None),
        }
    }
}

impl Default for MemStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LocalStore for MemStore {
    async fn exists(&self, path: &str) -> bool {
        self.blobs.read().await.contains_key(path)
    }

    async fn read_blob(&self, path: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.blobs.read().await.get(path).cloned())
    }

    async fn write_blob(
        &self,
        folder_parts: &[&str],
        filename: &str,
        bytes: &[u8],
    ) -> Result<String> {
        let rel = join_path(folder_parts, filename);
        self.blobs.write().await.insert(rel.clone(), bytes.to_vec());
        Ok(rel)
    }

    async fn read_master(&self) -> Result<Option<MasterDocument>> {
        match self.master.read().await.as_deref() {
            Some(bytes) => Ok(Some(migrate::parse_master_bytes(bytes)?)),
            None => Ok(None),
        }
    }

    async fn write_master(&self, doc: &MasterDocument) -> Result<()> {
        let bytes = migrate::master_to_bytes(doc)?;
        *self.master.write().await = Some(bytes);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_flat_namespace_round_trip() {
        let store = MemStore::new();
        let path = store
            .write_blob(&["proj_abc", "audio"], "r.m4a", b"pcm")
            .await
            .unwrap();
        assert_eq!(path, "proj_abc/audio/r.m4a");
        assert!(store.exists(&path).await);
        assert_eq!(store.read_blob(&path).await.unwrap().unwrap(), b"pcm");
    }

    #[tokio::test]
    async fn test_master_slot_is_separate_from_blobs() {
        let store = MemStore::new();
        let doc = MasterDocument::new();
        store.write_master(&doc).await.unwrap();

        assert!(store.read_master().await.unwrap().is_some());
        assert!(!store.exists("master.json").await);
    }
}
