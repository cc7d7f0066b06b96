//! Local storage backend contract.
//!
//! A uniform key/path-addressed blob store with a distinguished master
//! record slot. Two interchangeable backends implement the same contract:
//! [`DirStore`] over a real directory tree and [`MemStore`] over a flat
//! namespace keyed by the full relative path. The engine selects one at
//! construction and never looks behind the trait again.

pub mod dir_store;
pub mod mem_store;

pub use dir_store::DirStore;
pub use mem_store::MemStore;

use crate::error::Result;
use crate::model::MasterDocument;
use async_trait::async_trait;

/// Path for a new blob: the folder parts and filename joined with `/`.
/// The same string addresses the blob in both backends and in the remote
/// store's relative-path metadata.
pub fn join_path(folder_parts: &[&str], filename: &str) -> String {
    let mut parts: Vec<&str> = folder_parts.to_vec();
    parts.push(filename);
    parts.join("/")
}

#[async_trait]
pub trait LocalStore: Send + Sync {
    /// Whether a blob exists at the given relative path.
    async fn exists(&self, path: &str) -> bool;

    /// Read a blob; `None` when absent. Absence is a normal negative
    /// result, not an error.
    async fn read_blob(&self, path: &str) -> Result<Option<Vec<u8>>>;

    /// Write a blob under `folder_parts/filename`, creating intermediate
    /// folders as the backend requires. Returns the joined relative path.
    async fn write_blob(
        &self,
        folder_parts: &[&str],
        filename: &str,
        bytes: &[u8],
    ) -> Result<String>;

    /// Read the master record slot; `None` on a fresh install.
    async fn read_master(&self) -> Result<Option<MasterDocument>>;

    /// Overwrite the master record slot.
    async fn write_master(&self, doc: &MasterDocument) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_path() {
        assert_eq!(join_path(&["proj_abc", "images"], "a.jpg"), "proj_abc/images/a.jpg");
        assert_eq!(join_path(&[], "master.json"), "master.json");
    }
}
