//! Remote object store client.
//!
//! Talks JSON REST to a cloud object store with folders, per-file custom
//! properties, and multipart uploads. Credentials come from an opaque
//! [`CredentialProvider`]; an absent token means offline.

pub mod client;

pub use client::RemoteClient;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// MIME type marking folder objects in the remote store.
pub const FOLDER_MIME: &str = "application/vnd.google-apps.folder";

/// Custom property key carrying a file's intended relative path.
pub const RELATIVE_PATH_PROP: &str = "relativePath";

/// Supplies the bearer token for remote calls. `None` means offline; the
/// engine short-circuits best-effort pushes and surfaces `Auth` only from
/// explicit sync actions.
pub trait CredentialProvider: Send + Sync {
    fn get_token(&self) -> Option<String>;
}

/// A fixed token (or fixed absence of one). Used by the CLI, which reads
/// the token from a credentials file, and by tests.
pub struct StaticToken(pub Option<String>);

impl CredentialProvider for StaticToken {
    fn get_token(&self) -> Option<String> {
        self.0.clone()
    }
}

/// A file or folder object as the remote store represents it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteFile {
    pub id: String,
    pub name: String,
    #[serde(rename = "mimeType", default)]
    pub mime_type: String,
    #[serde(default)]
    pub parents: Vec<String>,
    #[serde(rename = "appProperties", default)]
    pub app_properties: HashMap<String, String>,
}

impl RemoteFile {
    /// The stored relative-path tag, if this file carries one.
    pub fn relative_path(&self) -> Option<&str> {
        self.app_properties.get(RELATIVE_PATH_PROP).map(String::as_str)
    }

    pub fn is_folder(&self) -> bool {
        self.mime_type == FOLDER_MIME
    }
}

/// Shape of the list endpoint's response body.
#[derive(Debug, Deserialize)]
pub(crate) struct FileList {
    #[serde(default)]
    pub files: Vec<RemoteFile>,
}
