//! Master document schema migration and repair.
//!
//! Version 1 documents are flat: the entity arrays sit at the top level
//! with no project partition. Loading migrates them into a single default
//! project before any other operation sees the document.

use super::{
    derive_folder_name, now_iso, ExternalFile, MasterDocument, Metadata, Project, Route, Site,
    Spot, SCHEMA_VERSION,
};
use crate::error::{EngineError, Result};
use serde::Deserialize;

/// The flat v1 layout. Anything it does not carry is defaulted.
#[derive(Debug, Deserialize)]
struct FlatDocument {
    #[serde(default)]
    spots: Vec<Spot>,
    #[serde(default)]
    routes: Vec<Route>,
    #[serde(default)]
    sites: Vec<Site>,
    #[serde(default)]
    external_files: Vec<ExternalFile>,
    #[serde(default)]
    metadata: Option<Metadata>,
}

/// Parse a raw JSON value into a normalized, current-schema document.
///
/// A value lacking `projects` is a v1 document and is migrated; a value
/// carrying it is deserialized directly. Either way `normalize` runs before
/// the document is returned, so migration is idempotent.
pub fn parse_master(value: serde_json::Value) -> Result<MasterDocument> {
    let mut doc = if value.get("projects").is_some() {
        serde_json::from_value::<MasterDocument>(value)?
    } else {
        migrate_flat(serde_json::from_value::<FlatDocument>(value)?)
    };
    normalize(&mut doc);
    Ok(doc)
}

fn migrate_flat(flat: FlatDocument) -> MasterDocument {
    let mut project = Project::new("My Project");
    // Entities keep their ids and timestamps; only the partition changes.
    for spot in flat.spots {
        project.spots.push(Spot {
            project_id: project.id.clone(),
            ..spot
        });
    }
    for route in flat.routes {
        project.routes.push(Route {
            project_id: project.id.clone(),
            ..route
        });
    }
    for site in flat.sites {
        project.sites.push(Site {
            project_id: project.id.clone(),
            ..site
        });
    }
    for file in flat.external_files {
        project.external_files.push(ExternalFile {
            project_id: project.id.clone(),
            ..file
        });
    }

    let metadata = flat.metadata.unwrap_or(Metadata {
        created_at: now_iso(),
        schema_version: 1,
        last_merged: None,
    });

    tracing::info!(
        spots = project.spots.len(),
        sites = project.sites.len(),
        routes = project.routes.len(),
        "migrated flat v1 document into default project"
    );

    MasterDocument {
        current_project_id: project.id.clone(),
        projects: vec![project],
        metadata: Metadata {
            schema_version: SCHEMA_VERSION,
            ..metadata
        },
    }
}

/// Repair pass run after every load and before every merge:
/// guarantees at least one project, a valid `current_project_id`, a
/// `folder_name` on every project, and the current schema version.
pub fn normalize(doc: &mut MasterDocument) {
    if doc.projects.is_empty() {
        let project = Project::new("My Project");
        doc.current_project_id = project.id.clone();
        doc.projects.push(project);
    }

    for project in &mut doc.projects {
        if project.folder_name.is_empty() {
            project.folder_name = derive_folder_name(&project.name, &project.id);
        }
    }

    if doc.project(&doc.current_project_id).is_none() {
        doc.current_project_id = doc.projects[0].id.clone();
    }

    doc.metadata.schema_version = SCHEMA_VERSION;
}

/// Parse master document bytes (the on-disk / on-wire representation).
pub fn parse_master_bytes(bytes: &[u8]) -> Result<MasterDocument> {
    let value: serde_json::Value = serde_json::from_slice(bytes)?;
    parse_master(value)
}

/// Serialize a master document the way both stores persist it.
pub fn master_to_bytes(doc: &MasterDocument) -> Result<Vec<u8>> {
    serde_json::to_vec_pretty(doc).map_err(EngineError::from)
}
