//! Master document conflict detection and reconciliation.
//!
//! Detection compares content signatures, never literal JSON text. On
//! divergence the fetched remote document is cached alongside its remote
//! file id; resolution consumes the cache with one of three mutually
//! exclusive actions.

use crate::engine::{push_master_bytes, SyncEngine};
use crate::error::{EngineError, Result};
use crate::events::EngineEvent;
use crate::model::signature::{content_signature, entity_counts, EntityCounts};
use crate::model::{migrate, now_iso, Entity, MasterDocument, Metadata, Project, MASTER_FILENAME};
use std::collections::{HashMap, HashSet};
use tracing::info;

/// Remote master fetched during detection, held until resolution.
#[derive(Debug, Clone)]
pub struct CachedRemoteMaster {
    pub doc: MasterDocument,
    pub file_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Adopt the cached remote document, persist locally.
    Pull,
    /// Overwrite the remote file with the local document bytes.
    Push,
    /// Deterministic per-entity reconciliation, persisted and pushed.
    Merge,
}

/// Comparable counts handed to the caller when a conflict fires.
#[derive(Debug, Clone, Copy)]
pub struct ConflictInfo {
    pub local: EntityCounts,
    pub remote: EntityCounts,
}

impl SyncEngine {
    /// Fetch the remote master document and compare signatures.
    ///
    /// Returns `None` when there is no remote master or the documents
    /// agree. On divergence the remote document is cached, a
    /// `MasterSyncConflict` event fires, and the counts are returned.
    pub async fn check_master_conflict(&self) -> Result<Option<ConflictInfo>> {
        let root_id = self.remote.find_or_create_root_folder().await?;
        let remote_file = match self.remote.find_file_by_name(MASTER_FILENAME, &root_id).await? {
            Some(file) => file,
            None => {
                *self.conflict_cache.write().await = None;
                return Ok(None);
            }
        };

        let text = self.remote.read_text_file(&remote_file.id).await?;
        let remote_doc = migrate::parse_master(serde_json::from_str(&text)?)?;

        let local_doc = self.doc.read().await.clone();
        if content_signature(&local_doc) == content_signature(&remote_doc) {
            *self.conflict_cache.write().await = None;
            return Ok(None);
        }

        let info = ConflictInfo {
            local: entity_counts(&local_doc),
            remote: entity_counts(&remote_doc),
        };
        *self.conflict_cache.write().await = Some(CachedRemoteMaster {
            doc: remote_doc,
            file_id: remote_file.id,
        });
        self.events.emit(EngineEvent::MasterSyncConflict {
            local: info.local,
            remote: info.remote,
        });
        info!(
            local_spots = info.local.spots,
            remote_spots = info.remote.spots,
            "master documents diverged"
        );
        Ok(Some(info))
    }

    /// Apply one resolution to the cached conflict. The cache is cleared
    /// whichever action runs.
    pub async fn resolve_conflict(&self, resolution: Resolution) -> Result<()> {
        let cached = self
            .conflict_cache
            .write()
            .await
            .take()
            .ok_or_else(|| EngineError::NotFound("pending master conflict".into()))?;

        match resolution {
            Resolution::Pull => {
                let mut doc = self.doc.write().await;
                *doc = cached.doc;
                self.store.write_master(&doc).await?;
            }
            Resolution::Push => {
                let doc = self.doc.read().await;
                let bytes = migrate::master_to_bytes(&doc)?;
                self.remote.update_file(&cached.file_id, bytes).await?;
            }
            Resolution::Merge => {
                let mut doc = self.doc.write().await;
                let merged = merge_documents(&doc, &cached.doc);
                *doc = merged;
                self.store.write_master(&doc).await?;
                let bytes = migrate::master_to_bytes(&doc)?;
                push_master_bytes(&self.remote, bytes).await?;
            }
        }

        self.events.emit(EngineEvent::DataUpdated);
        Ok(())
    }
}

/// Merge two master documents.
///
/// Projects on one side only are kept as-is. Projects on both sides merge
/// each entity array independently by id, larger timestamp winning a
/// conflicting id. `current_project_id` is always the local side's.
pub fn merge_documents(local: &MasterDocument, remote: &MasterDocument) -> MasterDocument {
    let mut projects: Vec<Project> = Vec::new();
    for lp in &local.projects {
        match remote.project(&lp.id) {
            Some(rp) => projects.push(merge_project(lp, rp)),
            None => projects.push(lp.clone()),
        }
    }
    for rp in &remote.projects {
        if local.project(&rp.id).is_none() {
            projects.push(rp.clone());
        }
    }

    let mut merged = MasterDocument {
        current_project_id: local.current_project_id.clone(),
        projects,
        metadata: Metadata {
            created_at: local.metadata.created_at.clone(),
            schema_version: local.metadata.schema_version,
            last_merged: Some(now_iso()),
        },
    };
    migrate::normalize(&mut merged);
    merged
}

fn merge_project(local: &Project, remote: &Project) -> Project {
    Project {
        id: local.id.clone(),
        name: local.name.clone(),
        // Paths are anchored here; it never changes across devices.
        folder_name: local.folder_name.clone(),
        spots: merge_entities(&local.spots, &remote.spots),
        routes: merge_entities(&local.routes, &remote.routes),
        sites: merge_entities(&local.sites, &remote.sites),
        external_files: merge_entities(&local.external_files, &remote.external_files),
        created_at: local.created_at.clone(),
    }
}

/// Merge one entity array by id: local order preserved, remote-only
/// entries appended, conflicting ids resolved by larger timestamp (local
/// wins ties).
fn merge_entities<E: Entity + Clone>(local: &[E], remote: &[E]) -> Vec<E> {
    let remote_by_id: HashMap<&str, &E> =
        remote.iter().map(|e| (e.entity_id(), e)).collect();

    let mut merged = Vec::with_capacity(local.len());
    let mut seen: HashSet<&str> = HashSet::new();

    for entity in local {
        match remote_by_id.get(entity.entity_id()) {
            Some(other) if is_newer(other.timestamp(), entity.timestamp()) => {
                merged.push((*other).clone());
            }
            _ => merged.push(entity.clone()),
        }
        seen.insert(entity.entity_id());
    }
    for entity in remote {
        if !seen.contains(entity.entity_id()) {
            merged.push(entity.clone());
        }
    }
    merged
}

/// Whether timestamp `a` is strictly later than `b`. Falls back to string
/// order when either side is not valid ISO-8601.
fn is_newer(a: &str, b: &str) -> bool {
    match (
        chrono::DateTime::parse_from_rfc3339(a),
        chrono::DateTime::parse_from_rfc3339(b),
    ) {
        (Ok(ta), Ok(tb)) => ta > tb,
        _ => a > b,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::signature::content_signature;
    use crate::model::Spot;

    fn spot(id: &str, ts: &str) -> Spot {
        Spot {
            spot_id: id.to_string(),
            project_id: "p".to_string(),
            name: format!("spot {}", id),
            description: String::new(),
            birds: vec![],
            latitude: 0.0,
            longitude: 0.0,
            timestamp: ts.to_string(),
            image_local_filename: None,
            audio_local_filename: None,
        }
    }

    #[test]
    fn test_merge_is_idempotent_on_identical_inputs() {
        let mut doc = MasterDocument::new();
        doc.projects[0]
            .spots
            .push(spot("s1", "2024-03-01T10:00:00Z"));
        let merged = merge_documents(&doc, &doc.clone());
        assert_eq!(content_signature(&merged), content_signature(&doc));
    }

    #[test]
    fn test_merge_commutes_on_disjoint_projects() {
        let mut a = MasterDocument::new();
        a.projects[0].spots.push(spot("s1", "2024-03-01T10:00:00Z"));
        let mut b = MasterDocument::new();
        b.projects[0].spots.push(spot("s2", "2024-03-02T10:00:00Z"));

        let ab = merge_documents(&a, &b);
        let ba = merge_documents(&b, &a);
        assert_eq!(content_signature(&ab), content_signature(&ba));
        assert_eq!(ab.projects.len(), 2);
        // The local side keeps the active project
        assert_eq!(ab.current_project_id, a.current_project_id);
        assert_eq!(ba.current_project_id, b.current_project_id);
    }

    #[test]
    fn test_larger_timestamp_wins() {
        let mut local = MasterDocument::new();
        let mut remote = local.clone();
        local.projects[0]
            .spots
            .push(spot("x", "2024-01-01T00:00:00Z"));
        let mut newer = spot("x", "2024-06-01T00:00:00Z");
        newer.name = "edited elsewhere".to_string();
        remote.projects[0].spots.push(newer);

        let merged = merge_documents(&local, &remote);
        assert_eq!(merged.projects[0].spots.len(), 1);
        assert_eq!(merged.projects[0].spots[0].name, "edited elsewhere");
    }

    #[test]
    fn test_local_wins_timestamp_tie() {
        let mut local = MasterDocument::new();
        let mut remote = local.clone();
        let mut ours = spot("x", "2024-01-01T00:00:00Z");
        ours.name = "ours".to_string();
        local.projects[0].spots.push(ours);
        let mut theirs = spot("x", "2024-01-01T00:00:00Z");
        theirs.name = "theirs".to_string();
        remote.projects[0].spots.push(theirs);

        let merged = merge_documents(&local, &remote);
        assert_eq!(merged.projects[0].spots[0].name, "ours");
    }

    #[test]
    fn test_merge_stamps_last_merged() {
        let doc = MasterDocument::new();
        let merged = merge_documents(&doc, &doc.clone());
        assert!(merged.metadata.last_merged.is_some());
    }
}
