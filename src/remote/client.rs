//! HTTP client for the remote object store.

use super::{CredentialProvider, FileList, RemoteFile, FOLDER_MIME, RELATIVE_PATH_PROP};
use crate::config::RemoteConfig;
use crate::error::{EngineError, Result};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OnceCell};
use tracing::debug;

/// Client for the remote store's JSON REST interface.
///
/// Folder-path resolution is memoized per `(parent_id, folder_name)` with a
/// single-flight cell: concurrent callers for the same segment collapse
/// onto one in-flight resolution, and a failed resolution is evicted so a
/// retry can attempt it again.
pub struct RemoteClient {
    http: reqwest::Client,
    api_base: String,
    upload_base: String,
    root_folder_name: String,
    credentials: Arc<dyn CredentialProvider>,
    folder_cache: Mutex<HashMap<(String, String), Arc<OnceCell<String>>>>,
}

impl RemoteClient {
    pub fn new(config: &RemoteConfig, credentials: Arc<dyn CredentialProvider>) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_base: config.api_base.trim_end_matches('/').to_string(),
            upload_base: config.upload_base.trim_end_matches('/').to_string(),
            root_folder_name: config.root_folder_name.clone(),
            credentials,
            folder_cache: Mutex::new(HashMap::new()),
        }
    }

    /// Whether a credential is currently available.
    pub fn is_signed_in(&self) -> bool {
        self.credentials.get_token().is_some()
    }

    fn token(&self) -> Result<String> {
        self.credentials.get_token().ok_or(EngineError::Auth)
    }

    async fn check(resp: reqwest::Response) -> Result<reqwest::Response> {
        if resp.status().is_success() {
            Ok(resp)
        } else {
            Err(EngineError::RemoteApi(resp.status().to_string()))
        }
    }

    /// Look up the well-known application folder at the store root,
    /// creating it if absent. Idempotent.
    pub async fn find_or_create_root_folder(&self) -> Result<String> {
        self.resolve_folder("root", &self.root_folder_name).await
    }

    /// Resolve (creating as needed) a chain of nested folders under
    /// `root_id`. Returns the id of the innermost folder.
    pub async fn ensure_remote_path(&self, path_parts: &[&str], root_id: &str) -> Result<String> {
        let mut parent = root_id.to_string();
        for part in path_parts {
            parent = self.resolve_folder(&parent, part).await?;
        }
        Ok(parent)
    }

    /// Single-flight folder resolution for one path segment.
    async fn resolve_folder(&self, parent_id: &str, name: &str) -> Result<String> {
        let key = (parent_id.to_string(), name.to_string());
        let cell = {
            let mut cache = self.folder_cache.lock().await;
            cache
                .entry(key.clone())
                .or_insert_with(|| Arc::new(OnceCell::new()))
                .clone()
        };

        let result = cell
            .get_or_try_init(|| self.find_or_create_folder(parent_id, name))
            .await;

        match result {
            Ok(id) => Ok(id.clone()),
            Err(e) => {
                // Evict the failed segment so a later call can retry it.
                let mut cache = self.folder_cache.lock().await;
                if let Some(existing) = cache.get(&key) {
                    if Arc::ptr_eq(existing, &cell) {
                        cache.remove(&key);
                    }
                }
                Err(e)
            }
        }
    }

    async fn find_or_create_folder(&self, parent_id: &str, name: &str) -> Result<String> {
        let token = self.token()?;
        let q = format!(
            "mimeType = '{}' and name = '{}' and trashed = false and '{}' in parents",
            FOLDER_MIME, name, parent_id
        );
        let resp = self
            .http
            .get(format!("{}/files", self.api_base))
            .bearer_auth(&token)
            .query(&[("q", q.as_str()), ("fields", "files(id, name)")])
            .send()
            .await?;
        let list: FileList = Self::check(resp).await?.json().await?;

        if let Some(found) = list.files.first() {
            debug!(folder = name, id = %found.id, "resolved existing remote folder");
            return Ok(found.id.clone());
        }

        let metadata = serde_json::json!({
            "name": name,
            "mimeType": FOLDER_MIME,
            "parents": [parent_id],
        });
        let resp = self
            .http
            .post(format!("{}/files", self.api_base))
            .bearer_auth(&token)
            .json(&metadata)
            .send()
            .await?;
        let created: RemoteFile = Self::check(resp).await?.json().await?;
        debug!(folder = name, id = %created.id, "created remote folder");
        Ok(created.id)
    }

    /// Full listing of non-trashed files, including the relative-path
    /// property used to tag each file's intended location.
    pub async fn list_all_files(&self) -> Result<Vec<RemoteFile>> {
        let token = self.token()?;
        let resp = self
            .http
            .get(format!("{}/files", self.api_base))
            .bearer_auth(&token)
            .query(&[
                ("q", "trashed = false"),
                ("fields", "files(id, name, mimeType, parents, appProperties)"),
                ("pageSize", "1000"),
            ])
            .send()
            .await?;
        let list: FileList = Self::check(resp).await?.json().await?;
        Ok(list.files)
    }

    /// Upload a new file: two-part multipart body, JSON metadata plus raw
    /// bytes. Stamps the relative-path property when given.
    pub async fn upload_file(
        &self,
        bytes: Vec<u8>,
        filename: &str,
        mime_type: &str,
        parent_folder_id: &str,
        relative_path: Option<&str>,
    ) -> Result<RemoteFile> {
        let token = self.token()?;

        let mut metadata = serde_json::json!({
            "name": filename,
            "mimeType": mime_type,
            "parents": [parent_folder_id],
        });
        if let Some(path) = relative_path {
            metadata["appProperties"] = serde_json::json!({ RELATIVE_PATH_PROP: path });
        }

        let form = reqwest::multipart::Form::new()
            .part(
                "metadata",
                reqwest::multipart::Part::text(metadata.to_string())
                    .mime_str("application/json")
                    .expect("static mime"),
            )
            .part(
                "file",
                reqwest::multipart::Part::bytes(bytes)
                    .file_name(filename.to_string())
                    .mime_str(mime_type)
                    .map_err(|e| EngineError::RemoteApi(format!("invalid mime type: {}", e)))?,
            );

        let resp = self
            .http
            .post(format!("{}/files", self.upload_base))
            .bearer_auth(&token)
            .query(&[("uploadType", "multipart")])
            .multipart(form)
            .send()
            .await?;
        let file: RemoteFile = Self::check(resp).await?.json().await?;
        Ok(file)
    }

    /// Overwrite an existing file's content in place.
    pub async fn update_file(&self, file_id: &str, bytes: Vec<u8>) -> Result<RemoteFile> {
        let token = self.token()?;
        let resp = self
            .http
            .patch(format!("{}/files/{}", self.upload_base, file_id))
            .bearer_auth(&token)
            .query(&[("uploadType", "media")])
            .body(bytes)
            .send()
            .await?;
        let file: RemoteFile = Self::check(resp).await?.json().await?;
        Ok(file)
    }

    /// Download a file's raw bytes.
    pub async fn download_blob(&self, file_id: &str) -> Result<Vec<u8>> {
        let token = self.token()?;
        let resp = self
            .http
            .get(format!("{}/files/{}", self.api_base, file_id))
            .bearer_auth(&token)
            .query(&[("alt", "media")])
            .send()
            .await?;
        let bytes = Self::check(resp).await?.bytes().await?;
        Ok(bytes.to_vec())
    }

    /// Download a file and decode it as UTF-8 text.
    pub async fn read_text_file(&self, file_id: &str) -> Result<String> {
        let bytes = self.download_blob(file_id).await?;
        String::from_utf8(bytes)
            .map_err(|e| EngineError::RemoteApi(format!("remote file is not UTF-8: {}", e)))
    }

    /// Find a file by exact name directly under a parent folder.
    pub async fn find_file_by_name(
        &self,
        name: &str,
        parent_id: &str,
    ) -> Result<Option<RemoteFile>> {
        let token = self.token()?;
        let q = format!(
            "name = '{}' and trashed = false and '{}' in parents",
            name, parent_id
        );
        let resp = self
            .http
            .get(format!("{}/files", self.api_base))
            .bearer_auth(&token)
            .query(&[
                ("q", q.as_str()),
                ("fields", "files(id, name, mimeType, parents, appProperties)"),
            ])
            .send()
            .await?;
        let list: FileList = Self::check(resp).await?.json().await?;
        Ok(list.files.into_iter().next())
    }
}
