//! The master dataset model: projects and the entities they track.
//!
//! One `MasterDocument` exists per installation. It is the unit of truth,
//! the unit persisted into the local store's master slot, and the unit
//! pushed to the remote store as a single JSON document.

pub mod migrate;
pub mod signature;

use serde::{Deserialize, Serialize};

/// Current master document schema version (project-partitioned layout).
pub const SCHEMA_VERSION: u32 = 2;

/// Filename of the master document in both namespaces.
pub const MASTER_FILENAME: &str = "master.json";

/// Current UTC time as an ISO-8601 string.
pub fn now_iso() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

/// Root persisted object holding all projects and bookkeeping metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MasterDocument {
    pub current_project_id: String,
    pub projects: Vec<Project>,
    pub metadata: Metadata,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Metadata {
    pub created_at: String,
    pub schema_version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_merged: Option<String>,
}

impl MasterDocument {
    /// Create a fresh document with a single default project.
    pub fn new() -> Self {
        let project = Project::new("My Project");
        Self {
            current_project_id: project.id.clone(),
            projects: vec![project],
            metadata: Metadata {
                created_at: now_iso(),
                schema_version: SCHEMA_VERSION,
                last_merged: None,
            },
        }
    }

    pub fn project(&self, id: &str) -> Option<&Project> {
        self.projects.iter().find(|p| p.id == id)
    }

    pub fn project_mut(&mut self, id: &str) -> Option<&mut Project> {
        self.projects.iter_mut().find(|p| p.id == id)
    }

    /// The active project. Only valid after `migrate::normalize` has run,
    /// which guarantees `current_project_id` references a member.
    pub fn current_project(&self) -> Option<&Project> {
        self.project(&self.current_project_id)
    }
}

impl Default for MasterDocument {
    fn default() -> Self {
        Self::new()
    }
}

/// A named, isolated partition of the dataset with its own folder namespace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    pub name: String,
    /// Derived once at creation from the name and id; every stored path is
    /// anchored to it, so renaming the project never changes it.
    #[serde(default)]
    pub folder_name: String,
    #[serde(default)]
    pub spots: Vec<Spot>,
    #[serde(default)]
    pub routes: Vec<Route>,
    #[serde(default)]
    pub sites: Vec<Site>,
    #[serde(default)]
    pub external_files: Vec<ExternalFile>,
    pub created_at: String,
}

impl Project {
    pub fn new(name: &str) -> Self {
        let id = uuid::Uuid::new_v4().to_string();
        let folder_name = derive_folder_name(name, &id);
        Self {
            id,
            name: name.to_string(),
            folder_name,
            spots: Vec::new(),
            routes: Vec::new(),
            sites: Vec::new(),
            external_files: Vec::new(),
            created_at: now_iso(),
        }
    }

    /// Every relative path this project's entities reference, in entity
    /// enumeration order: spot images and audio, site boundaries, external
    /// files. Routes carry no files.
    pub fn expected_files(&self) -> Vec<String> {
        let mut paths = Vec::new();
        for spot in &self.spots {
            if let Some(ref image) = spot.image_local_filename {
                paths.push(image.clone());
            }
            if let Some(ref audio) = spot.audio_local_filename {
                paths.push(audio.clone());
            }
        }
        for site in &self.sites {
            paths.push(site.kml_filename.clone());
        }
        for file in &self.external_files {
            paths.push(file.local_path.clone());
        }
        paths
    }
}

/// Folder name for a project: sanitized name plus the first six characters
/// of the id. Computed exactly once, at creation.
pub fn derive_folder_name(name: &str, id: &str) -> String {
    let short = &id[..id.len().min(6)];
    format!("{}_{}", sanitize_name(name), short)
}

/// Replace anything outside `[A-Za-z0-9_-]` with an underscore.
fn sanitize_name(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// A single field observation, optionally with captured media.
///
/// The filename fields are relative paths into the local/remote namespace,
/// not raw blobs; they are `None` when no media was captured and are never
/// rewritten once set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Spot {
    pub spot_id: String,
    pub project_id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub birds: Vec<String>,
    pub latitude: f64,
    pub longitude: f64,
    pub timestamp: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_local_filename: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_local_filename: Option<String>,
}

/// A geographic boundary, one file per entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Site {
    pub id: String,
    pub project_id: String,
    pub name: String,
    pub kml_filename: String,
    pub timestamp: String,
}

/// A recorded track. Pure structured data, no attached files.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Route {
    pub id: String,
    pub project_id: String,
    pub name: String,
    #[serde(default)]
    pub points: Vec<TrackPoint>,
    pub timestamp: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TrackPoint {
    pub lat: f64,
    pub lng: f64,
}

/// A file imported from outside the app, linked to one or more spots.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExternalFile {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub file_type: String,
    /// Non-empty; the first linked spot chose the storage folder scope at
    /// creation time.
    pub linked_spots: Vec<String>,
    pub project_id: String,
    pub timestamp: String,
    #[serde(default)]
    pub sync_status: SyncStatus,
    pub local_path: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    #[default]
    Pending,
    Synced,
}

/// Common identity/recency view over the four entity kinds, used by the
/// merge and signature code.
pub trait Entity {
    fn entity_id(&self) -> &str;
    fn timestamp(&self) -> &str;
}

impl Entity for Spot {
    fn entity_id(&self) -> &str {
        &self.spot_id
    }
    fn timestamp(&self) -> &str {
        &self.timestamp
    }
}

impl Entity for Site {
    fn entity_id(&self) -> &str {
        &self.id
    }
    fn timestamp(&self) -> &str {
        &self.timestamp
    }
}

impl Entity for Route {
    fn entity_id(&self) -> &str {
        &self.id
    }
    fn timestamp(&self) -> &str {
        &self.timestamp
    }
}

impl Entity for ExternalFile {
    fn entity_id(&self) -> &str {
        &self.id
    }
    fn timestamp(&self) -> &str {
        &self.timestamp
    }
}
