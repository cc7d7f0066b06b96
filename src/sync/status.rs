//! Global sync status: one cheap strict check per project.

use super::report::remote_map_for_folder;
use crate::engine::SyncEngine;
use crate::error::{EngineError, Result};
use std::collections::HashMap;
use tracing::debug;

impl SyncEngine {
    /// Strict two-way presence check across all projects.
    ///
    /// A project is synced iff every expected file exists both locally and
    /// remotely, and no remote file tagged under that project's folder is
    /// missing from the expected set. One remote listing serves every
    /// project; an empty listing (or being offline) means nothing is
    /// synced, not an error.
    pub async fn all_projects_sync_status(&self) -> Result<HashMap<String, bool>> {
        let doc = self.doc.read().await.clone();

        let remote_files = match self.remote.list_all_files().await {
            Ok(files) => files,
            Err(EngineError::Auth) => {
                debug!("offline, reporting nothing as synced");
                Vec::new()
            }
            Err(e) => return Err(e),
        };

        let mut status = HashMap::new();
        for project in &doc.projects {
            let remote_map = remote_map_for_folder(&remote_files, &project.folder_name);
            let expected = project.expected_files();

            let mut synced = true;
            for path in &expected {
                if !remote_map.contains_key(path.as_str()) || !self.store.exists(path).await {
                    synced = false;
                    break;
                }
            }
            if synced {
                synced = remote_map
                    .keys()
                    .all(|path| expected.iter().any(|e| e.as_str() == *path));
            }
            status.insert(project.id.clone(), synced);
        }
        Ok(status)
    }
}
