//! The dataset engine: owns the master document and drives every mutation.
//!
//! All state flows through one explicit context object. A mutation updates
//! the in-memory document, persists it synchronously to the local store,
//! then schedules a best-effort push of the whole document to the remote
//! store. Errors from that push are logged and swallowed so local
//! durability is never blocked by connectivity.

use crate::error::{EngineError, Result};
use crate::events::{EngineEvent, EventBus};
use crate::model::{
    migrate, now_iso, ExternalFile, MasterDocument, Project, Route, Site, Spot, SyncStatus,
    TrackPoint, MASTER_FILENAME,
};
use crate::remote::RemoteClient;
use crate::storage::LocalStore;
use crate::sync::conflict::CachedRemoteMaster;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Captured media handed to a save operation: the capture's original
/// filename (used for its extension) and the raw bytes.
pub struct MediaCapture {
    pub filename: String,
    pub bytes: Vec<u8>,
}

/// Input to [`SyncEngine::save_spot`]. `spot_id: None` creates a spot in
/// the active project; `Some` updates an existing one.
pub struct SpotDraft {
    pub spot_id: Option<String>,
    pub name: String,
    pub description: String,
    pub birds: Vec<String>,
    pub latitude: f64,
    pub longitude: f64,
    pub image: Option<MediaCapture>,
    pub audio: Option<MediaCapture>,
}

pub struct SyncEngine {
    pub(crate) doc: RwLock<MasterDocument>,
    pub(crate) store: Arc<dyn LocalStore>,
    pub(crate) remote: Arc<RemoteClient>,
    pub(crate) events: EventBus,
    pub(crate) conflict_cache: RwLock<Option<CachedRemoteMaster>>,
    pub(crate) batch_running: AtomicBool,
}

impl SyncEngine {
    /// Load the master document from the local store, migrating legacy
    /// layouts, or initialize a fresh installation.
    pub async fn load(store: Arc<dyn LocalStore>, remote: Arc<RemoteClient>) -> Result<Self> {
        let doc = match store.read_master().await? {
            Some(doc) => doc,
            None => {
                info!("no master document found, initializing fresh install");
                let doc = MasterDocument::new();
                store.write_master(&doc).await?;
                doc
            }
        };

        Ok(Self {
            doc: RwLock::new(doc),
            store,
            remote,
            events: EventBus::new(),
            conflict_cache: RwLock::new(None),
            batch_running: AtomicBool::new(false),
        })
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }

    /// Snapshot of the current master document.
    pub async fn document(&self) -> MasterDocument {
        self.doc.read().await.clone()
    }

    pub async fn current_project(&self) -> Project {
        let doc = self.doc.read().await;
        doc.current_project()
            .cloned()
            .expect("normalized document always has a current project")
    }

    pub async fn project(&self, project_id: &str) -> Result<Project> {
        let doc = self.doc.read().await;
        doc.project(project_id)
            .cloned()
            .ok_or_else(|| EngineError::NotFound(format!("project {}", project_id)))
    }

    // --- Project CRUD ---

    pub async fn create_project(&self, name: &str) -> Result<Project> {
        if name.trim().is_empty() {
            return Err(EngineError::Validation("project name is empty".into()));
        }
        let project = Project::new(name);
        let created = project.clone();
        {
            let mut doc = self.doc.write().await;
            doc.current_project_id = project.id.clone();
            doc.projects.push(project);
            self.persist(&doc).await?;
        }
        self.events.emit(EngineEvent::ProjectChanged {
            project_id: created.id.clone(),
        });
        self.events.emit(EngineEvent::DataUpdated);
        Ok(created)
    }

    /// Rename a project. The derived folder name is part of every stored
    /// path and never changes.
    pub async fn rename_project(&self, project_id: &str, new_name: &str) -> Result<()> {
        if new_name.trim().is_empty() {
            return Err(EngineError::Validation("project name is empty".into()));
        }
        {
            let mut doc = self.doc.write().await;
            let project = doc
                .project_mut(project_id)
                .ok_or_else(|| EngineError::NotFound(format!("project {}", project_id)))?;
            project.name = new_name.to_string();
            self.persist(&doc).await?;
        }
        self.events.emit(EngineEvent::ProjectChanged {
            project_id: project_id.to_string(),
        });
        self.events.emit(EngineEvent::DataUpdated);
        Ok(())
    }

    /// Delete a project. Deleting the last remaining project is forbidden.
    pub async fn delete_project(&self, project_id: &str) -> Result<()> {
        let current;
        {
            let mut doc = self.doc.write().await;
            if doc.project(project_id).is_none() {
                return Err(EngineError::NotFound(format!("project {}", project_id)));
            }
            if doc.projects.len() == 1 {
                return Err(EngineError::Validation(
                    "cannot delete the only project".into(),
                ));
            }
            doc.projects.retain(|p| p.id != project_id);
            if doc.current_project_id == project_id {
                doc.current_project_id = doc.projects[0].id.clone();
            }
            current = doc.current_project_id.clone();
            self.persist(&doc).await?;
        }
        self.events.emit(EngineEvent::ProjectChanged {
            project_id: current,
        });
        self.events.emit(EngineEvent::DataUpdated);
        Ok(())
    }

    pub async fn switch_project(&self, project_id: &str) -> Result<()> {
        {
            let mut doc = self.doc.write().await;
            if doc.project(project_id).is_none() {
                return Err(EngineError::NotFound(format!("project {}", project_id)));
            }
            doc.current_project_id = project_id.to_string();
            self.persist(&doc).await?;
        }
        self.events.emit(EngineEvent::ProjectChanged {
            project_id: project_id.to_string(),
        });
        Ok(())
    }

    // --- Entity save operations (active project) ---

    /// Create or update a spot, writing any captured media into the local
    /// store. Media paths are assigned once and reused on later saves.
    pub async fn save_spot(&self, draft: SpotDraft) -> Result<Spot> {
        let saved;
        {
            let mut doc = self.doc.write().await;
            let project_id = doc.current_project_id.clone();
            let folder = doc
                .current_project()
                .map(|p| p.folder_name.clone())
                .ok_or_else(|| EngineError::NotFound("current project".into()))?;

            let spot_id = draft
                .spot_id
                .clone()
                .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

            let image_path = match &draft.image {
                Some(capture) => Some(
                    self.write_media(&doc, &folder, "images", &spot_id, capture)
                        .await?,
                ),
                None => None,
            };
            let audio_path = match &draft.audio {
                Some(capture) => Some(
                    self.write_media(&doc, &folder, "audio", &spot_id, capture)
                        .await?,
                ),
                None => None,
            };

            let project = doc
                .project_mut(&project_id)
                .ok_or_else(|| EngineError::NotFound("current project".into()))?;

            match project.spots.iter_mut().find(|s| s.spot_id == spot_id) {
                Some(existing) => {
                    existing.name = draft.name;
                    existing.description = draft.description;
                    existing.birds = draft.birds;
                    existing.latitude = draft.latitude;
                    existing.longitude = draft.longitude;
                    existing.timestamp = now_iso();
                    if existing.image_local_filename.is_none() {
                        existing.image_local_filename = image_path;
                    }
                    if existing.audio_local_filename.is_none() {
                        existing.audio_local_filename = audio_path;
                    }
                    saved = existing.clone();
                }
                None => {
                    let spot = Spot {
                        spot_id,
                        project_id: project.id.clone(),
                        name: draft.name,
                        description: draft.description,
                        birds: draft.birds,
                        latitude: draft.latitude,
                        longitude: draft.longitude,
                        timestamp: now_iso(),
                        image_local_filename: image_path,
                        audio_local_filename: audio_path,
                    };
                    saved = spot.clone();
                    project.spots.push(spot);
                }
            }
            self.persist(&doc).await?;
        }
        self.events.emit(EngineEvent::DataUpdated);
        Ok(saved)
    }

    /// Write one media capture. If the spot already owns a path of this
    /// kind, the blob is overwritten in place so the path stays stable.
    async fn write_media(
        &self,
        doc: &MasterDocument,
        folder: &str,
        kind: &str,
        spot_id: &str,
        capture: &MediaCapture,
    ) -> Result<String> {
        let existing = doc
            .current_project()
            .and_then(|p| p.spots.iter().find(|s| s.spot_id == spot_id))
            .and_then(|s| match kind {
                "images" => s.image_local_filename.clone(),
                _ => s.audio_local_filename.clone(),
            });

        if let Some(path) = existing {
            let (parts, filename) = split_path(&path);
            let parts: Vec<&str> = parts.iter().map(String::as_str).collect();
            return self.store.write_blob(&parts, filename, &capture.bytes).await;
        }

        let filename = match extension(&capture.filename) {
            Some(ext) => format!("{}.{}", spot_id, ext),
            None => spot_id.to_string(),
        };
        self.store
            .write_blob(&[folder, kind], &filename, &capture.bytes)
            .await
    }

    /// Create a site from an uploaded boundary file.
    pub async fn save_site(&self, name: &str, kml_bytes: &[u8]) -> Result<Site> {
        let saved;
        {
            let mut doc = self.doc.write().await;
            let folder = doc
                .current_project()
                .map(|p| p.folder_name.clone())
                .ok_or_else(|| EngineError::NotFound("current project".into()))?;

            let id = uuid::Uuid::new_v4().to_string();
            let kml_filename = self
                .store
                .write_blob(&[&folder, "sites"], &format!("{}.kml", id), kml_bytes)
                .await?;

            let project_id = doc.current_project_id.clone();
            let project = doc
                .project_mut(&project_id)
                .ok_or_else(|| EngineError::NotFound("current project".into()))?;
            let site = Site {
                id,
                project_id: project.id.clone(),
                name: name.to_string(),
                kml_filename,
                timestamp: now_iso(),
            };
            saved = site.clone();
            project.sites.push(site);
            self.persist(&doc).await?;
        }
        self.events.emit(EngineEvent::DataUpdated);
        Ok(saved)
    }

    /// Create a route. Pure structured data, no attached files.
    pub async fn save_route(&self, name: &str, points: Vec<TrackPoint>) -> Result<Route> {
        let saved;
        {
            let mut doc = self.doc.write().await;
            let project_id = doc.current_project_id.clone();
            let project = doc
                .project_mut(&project_id)
                .ok_or_else(|| EngineError::NotFound("current project".into()))?;
            let route = Route {
                id: uuid::Uuid::new_v4().to_string(),
                project_id: project.id.clone(),
                name: name.to_string(),
                points,
                timestamp: now_iso(),
            };
            saved = route.clone();
            project.routes.push(route);
            self.persist(&doc).await?;
        }
        self.events.emit(EngineEvent::DataUpdated);
        Ok(saved)
    }

    /// Import an external file and link it to one or more spots. The first
    /// linked spot chooses the storage folder scope.
    pub async fn save_external_file(
        &self,
        name: &str,
        file_type: &str,
        bytes: &[u8],
        linked_spots: Vec<String>,
    ) -> Result<ExternalFile> {
        let first_spot = linked_spots
            .first()
            .cloned()
            .ok_or_else(|| EngineError::Validation("external file has no linked spots".into()))?;

        let saved;
        {
            let mut doc = self.doc.write().await;
            let project = doc
                .current_project()
                .ok_or_else(|| EngineError::NotFound("current project".into()))?;
            if !project.spots.iter().any(|s| s.spot_id == first_spot) {
                return Err(EngineError::NotFound(format!("spot {}", first_spot)));
            }
            let folder = project.folder_name.clone();

            let local_path = self
                .store
                .write_blob(&[&folder, "files", &first_spot], name, bytes)
                .await?;

            let project_id = doc.current_project_id.clone();
            let project = doc
                .project_mut(&project_id)
                .ok_or_else(|| EngineError::NotFound("current project".into()))?;
            let file = ExternalFile {
                id: uuid::Uuid::new_v4().to_string(),
                name: name.to_string(),
                file_type: file_type.to_string(),
                linked_spots,
                project_id: project.id.clone(),
                timestamp: now_iso(),
                sync_status: SyncStatus::Pending,
                local_path,
            };
            saved = file.clone();
            project.external_files.push(file);
            self.persist(&doc).await?;
        }
        self.events.emit(EngineEvent::DataUpdated);
        Ok(saved)
    }

    /// Link an existing external file to another spot.
    pub async fn link_external_file(&self, file_id: &str, spot_id: &str) -> Result<()> {
        {
            let mut doc = self.doc.write().await;
            let project_id = doc.current_project_id.clone();
            let project = doc
                .project_mut(&project_id)
                .ok_or_else(|| EngineError::NotFound("current project".into()))?;
            if !project.spots.iter().any(|s| s.spot_id == spot_id) {
                return Err(EngineError::NotFound(format!("spot {}", spot_id)));
            }
            let file = project
                .external_files
                .iter_mut()
                .find(|f| f.id == file_id)
                .ok_or_else(|| EngineError::NotFound(format!("external file {}", file_id)))?;
            if !file.linked_spots.iter().any(|s| s == spot_id) {
                file.linked_spots.push(spot_id.to_string());
                file.timestamp = now_iso();
            }
            self.persist(&doc).await?;
        }
        self.events.emit(EngineEvent::DataUpdated);
        Ok(())
    }

    /// Remove an entity from the active project. Stored blobs are left in
    /// place; paths are stable for the life of the entity only.
    pub async fn delete_spot(&self, spot_id: &str) -> Result<()> {
        self.delete_entity(&format!("spot {}", spot_id), |p| {
            let before = p.spots.len();
            p.spots.retain(|s| s.spot_id != spot_id);
            p.external_files
                .iter_mut()
                .for_each(|f| f.linked_spots.retain(|s| s != spot_id));
            before != p.spots.len()
        })
        .await
    }

    pub async fn delete_site(&self, site_id: &str) -> Result<()> {
        self.delete_entity(&format!("site {}", site_id), |p| {
            let before = p.sites.len();
            p.sites.retain(|s| s.id != site_id);
            before != p.sites.len()
        })
        .await
    }

    pub async fn delete_route(&self, route_id: &str) -> Result<()> {
        self.delete_entity(&format!("route {}", route_id), |p| {
            let before = p.routes.len();
            p.routes.retain(|r| r.id != route_id);
            before != p.routes.len()
        })
        .await
    }

    pub async fn delete_external_file(&self, file_id: &str) -> Result<()> {
        self.delete_entity(&format!("external file {}", file_id), |p| {
            let before = p.external_files.len();
            p.external_files.retain(|f| f.id != file_id);
            before != p.external_files.len()
        })
        .await
    }

    async fn delete_entity<F>(&self, what: &str, remove: F) -> Result<()>
    where
        F: FnOnce(&mut Project) -> bool,
    {
        {
            let mut doc = self.doc.write().await;
            let project_id = doc.current_project_id.clone();
            let project = doc
                .project_mut(&project_id)
                .ok_or_else(|| EngineError::NotFound("current project".into()))?;
            if !remove(project) {
                return Err(EngineError::NotFound(what.to_string()));
            }
            self.persist(&doc).await?;
        }
        self.events.emit(EngineEvent::DataUpdated);
        Ok(())
    }

    // --- Persistence ---

    /// Synchronous local write plus detached best-effort remote push.
    pub(crate) async fn persist(&self, doc: &MasterDocument) -> Result<()> {
        self.store.write_master(doc).await?;
        self.schedule_master_push(doc);
        Ok(())
    }

    /// Fire-and-forget push of the whole master document. Skipped silently
    /// when offline; failures are logged, never surfaced.
    fn schedule_master_push(&self, doc: &MasterDocument) {
        if !self.remote.is_signed_in() {
            debug!("offline, skipping master push");
            return;
        }
        let bytes = match migrate::master_to_bytes(doc) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(error = %e, "could not serialize master document for push");
                return;
            }
        };
        let remote = self.remote.clone();
        tokio::spawn(async move {
            if let Err(e) = push_master_bytes(&remote, bytes).await {
                warn!(error = %e, "best-effort master push failed");
            }
        });
    }
}

/// Upload or update the remote master document in the application root
/// folder. Shared by the mutation path, conflict resolution, and the batch
/// executor.
pub(crate) async fn push_master_bytes(remote: &RemoteClient, bytes: Vec<u8>) -> Result<()> {
    let root_id = remote.find_or_create_root_folder().await?;
    match remote.find_file_by_name(MASTER_FILENAME, &root_id).await? {
        Some(existing) => {
            remote.update_file(&existing.id, bytes).await?;
        }
        None => {
            remote
                .upload_file(
                    bytes,
                    MASTER_FILENAME,
                    "application/json",
                    &root_id,
                    Some(MASTER_FILENAME),
                )
                .await?;
        }
    }
    Ok(())
}

fn extension(filename: &str) -> Option<&str> {
    std::path::Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
}

/// Split a relative path into folder parts and filename. Paths always have
/// at least a filename component.
fn split_path(path: &str) -> (Vec<String>, &str) {
    let mut parts: Vec<&str> = path.split('/').collect();
    let filename = parts.pop().unwrap_or(path);
    (parts.into_iter().map(String::from).collect(), filename)
}
