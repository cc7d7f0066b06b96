//! Content signatures for divergence detection.
//!
//! Two master documents are considered identical when their signatures
//! match, regardless of literal JSON text: key order and serializer
//! differences make byte comparison unreliable. The signature digests the
//! entity identities and timestamps only.

use super::{Entity, MasterDocument, Project};
use sha2::{Digest, Sha256};

/// Deterministic content signature of a master document.
///
/// Per project: the sorted `"id_timestamp"` tokens of each entity array
/// joined with `,`, the four arrays joined with `|`. Project strings are
/// sorted and joined with `;`, and the whole canonical string is hashed.
pub fn content_signature(doc: &MasterDocument) -> String {
    let mut project_strings: Vec<String> = doc.projects.iter().map(project_string).collect();
    project_strings.sort();
    let canonical = project_strings.join(";");

    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    hex::encode(hasher.finalize())
}

fn project_string(project: &Project) -> String {
    [
        tokens(&project.spots),
        tokens(&project.sites),
        tokens(&project.routes),
        tokens(&project.external_files),
    ]
    .join("|")
}

fn tokens<E: Entity>(entities: &[E]) -> String {
    let mut tokens: Vec<String> = entities
        .iter()
        .map(|e| format!("{}_{}", e.entity_id(), e.timestamp()))
        .collect();
    tokens.sort();
    tokens.join(",")
}

/// Comparable entity totals, carried by the conflict event so the caller
/// can present both sides to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntityCounts {
    pub spots: usize,
    pub sites: usize,
    pub routes: usize,
    pub external_files: usize,
}

pub fn entity_counts(doc: &MasterDocument) -> EntityCounts {
    EntityCounts {
        spots: doc.projects.iter().map(|p| p.spots.len()).sum(),
        sites: doc.projects.iter().map(|p| p.sites.len()).sum(),
        routes: doc.projects.iter().map(|p| p.routes.len()).sum(),
        external_files: doc.projects.iter().map(|p| p.external_files.len()).sum(),
    }
}
