//! Batch sync executor: sequential push/pull of a list of divergences.

use super::report::FileSyncRecord;
use crate::engine::{push_master_bytes, SyncEngine};
use crate::error::{EngineError, Result};
use crate::events::EngineEvent;
use crate::model::{migrate, MASTER_FILENAME};
use std::sync::atomic::Ordering;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Push,
    Pull,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Push => write!(f, "push"),
            Direction::Pull => write!(f, "pull"),
        }
    }
}

/// Totals reported when a batch finishes.
#[derive(Debug, Clone, Copy)]
pub struct BatchSummary {
    pub direction: Direction,
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
}

impl SyncEngine {
    /// Run one batch over the given divergence records, strictly in input
    /// order, one item at a time.
    ///
    /// Only one batch may run at a time; a second invocation while one is
    /// active fails immediately with `Busy`. Per-item failures are
    /// counted and never abort the batch. A `SyncProgress` event fires
    /// after every item and a `SyncBatchComplete` event after the last,
    /// at which point the guard is released.
    pub async fn run_sync_batch(
        &self,
        items: Vec<FileSyncRecord>,
        direction: Direction,
    ) -> Result<BatchSummary> {
        if self
            .batch_running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(EngineError::Busy);
        }

        let result = self.run_batch_inner(&items, direction).await;
        self.batch_running.store(false, Ordering::SeqCst);
        result
    }

    async fn run_batch_inner(
        &self,
        items: &[FileSyncRecord],
        direction: Direction,
    ) -> Result<BatchSummary> {
        if !self.remote.is_signed_in() {
            return Err(EngineError::Auth);
        }

        let total = items.len();
        let mut succeeded = 0usize;
        let mut failed = 0usize;

        for (i, item) in items.iter().enumerate() {
            let outcome = match direction {
                Direction::Push => self.push_item(item).await,
                Direction::Pull => self.pull_item(item).await,
            };
            match outcome {
                Ok(()) => succeeded += 1,
                Err(e) => {
                    failed += 1;
                    warn!(item = %item.name, error = %e, "batch item failed");
                }
            }
            self.events.emit(EngineEvent::SyncProgress {
                index: i + 1,
                total,
                percent: ((i + 1) * 100 / total) as u8,
                current: item.name.clone(),
                succeeded,
                failed,
            });
        }

        info!(%direction, succeeded, failed, "sync batch complete");
        self.events.emit(EngineEvent::SyncBatchComplete {
            direction,
            succeeded,
            failed,
        });
        Ok(BatchSummary {
            direction,
            total,
            succeeded,
            failed,
        })
    }

    /// Upload one item. The master document updates in place; other files
    /// update by id when known, otherwise create-then-tag under their
    /// folder path.
    async fn push_item(&self, item: &FileSyncRecord) -> Result<()> {
        if item.name == MASTER_FILENAME {
            let doc = self.doc.read().await.clone();
            let bytes = migrate::master_to_bytes(&doc)?;
            return push_master_bytes(&self.remote, bytes).await;
        }

        let bytes = self
            .store
            .read_blob(&item.name)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("local file {}", item.name)))?;

        if let Some(ref drive_id) = item.drive_id {
            self.remote.update_file(drive_id, bytes).await?;
            return Ok(());
        }

        let mut parts: Vec<&str> = item.name.split('/').collect();
        let filename = parts.pop().unwrap_or(&item.name);
        let root_id = self.remote.find_or_create_root_folder().await?;
        let folder_id = self.remote.ensure_remote_path(&parts, &root_id).await?;
        self.remote
            .upload_file(bytes, filename, mime_for(filename), &folder_id, Some(&item.name))
            .await?;
        Ok(())
    }

    /// Download one item into the local store. The master document is
    /// deserialized, migrated, and re-persisted through the engine rather
    /// than written as an opaque blob.
    async fn pull_item(&self, item: &FileSyncRecord) -> Result<()> {
        if item.name == MASTER_FILENAME {
            let text = match item.drive_id {
                Some(ref id) => self.remote.read_text_file(id).await?,
                None => {
                    let root_id = self.remote.find_or_create_root_folder().await?;
                    let file = self
                        .remote
                        .find_file_by_name(MASTER_FILENAME, &root_id)
                        .await?
                        .ok_or_else(|| {
                            EngineError::NotFound("remote master document".into())
                        })?;
                    self.remote.read_text_file(&file.id).await?
                }
            };
            let remote_doc = migrate::parse_master(serde_json::from_str(&text)?)?;
            {
                let mut doc = self.doc.write().await;
                *doc = remote_doc;
                self.store.write_master(&doc).await?;
            }
            self.events.emit(EngineEvent::DataUpdated);
            return Ok(());
        }

        let drive_id = item
            .drive_id
            .as_ref()
            .ok_or_else(|| EngineError::NotFound(format!("remote file {}", item.name)))?;
        let bytes = self.remote.download_blob(drive_id).await?;

        let mut parts: Vec<&str> = item.name.split('/').collect();
        let filename = parts.pop().unwrap_or(&item.name);
        self.store.write_blob(&parts, filename, &bytes).await?;
        Ok(())
    }
}

/// MIME type for an uploaded file, from its extension.
fn mime_for(filename: &str) -> &'static str {
    match filename.rsplit('.').next().map(|e| e.to_ascii_lowercase()) {
        Some(ext) if ext == "jpg" || ext == "jpeg" => "image/jpeg",
        Some(ext) if ext == "png" => "image/png",
        Some(ext) if ext == "m4a" || ext == "mp4" => "audio/mp4",
        Some(ext) if ext == "mp3" => "audio/mpeg",
        Some(ext) if ext == "kml" => "application/vnd.google-earth.kml+xml",
        Some(ext) if ext == "json" => "application/json",
        Some(ext) if ext == "txt" => "text/plain",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mime_for() {
        assert_eq!(mime_for("a.JPG"), "image/jpeg");
        assert_eq!(mime_for("b.kml"), "application/vnd.google-earth.kml+xml");
        assert_eq!(mime_for("noext"), "application/octet-stream");
    }

    #[test]
    fn test_direction_display() {
        assert_eq!(Direction::Push.to_string(), "push");
        assert_eq!(Direction::Pull.to_string(), "pull");
    }
}
