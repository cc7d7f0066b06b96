//! In-process stand-in for the remote object store, shared by the
//! integration tests. Speaks just enough of the wire protocol for the
//! client under test: folder/file listing with `q` filters, metadata-only
//! creation, multipart upload, media download, and in-place update.

#![allow(dead_code)]

use axum::extract::{Multipart, Path, Query, State};
use axum::routing::{get, patch, post};
use axum::{Json, Router};
use fieldlog::config::RemoteConfig;
use fieldlog::remote::CredentialProvider;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, Default)]
pub struct FakeFile {
    pub id: String,
    pub name: String,
    pub mime_type: String,
    pub parents: Vec<String>,
    pub app_properties: HashMap<String, String>,
    pub bytes: Vec<u8>,
}

#[derive(Default)]
pub struct DriveState {
    pub files: Mutex<Vec<FakeFile>>,
    next_id: AtomicUsize,
    /// Successful folder creations, for single-flight assertions.
    pub folder_creates: AtomicUsize,
    /// When set, the next metadata-only create fails with a 500 once.
    pub fail_next_create: AtomicBool,
}

impl DriveState {
    fn fresh_id(&self) -> String {
        format!("id{}", self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    pub fn folder_count(&self) -> usize {
        self.folder_creates.load(Ordering::SeqCst)
    }
}

/// Credential provider whose token can be switched on and off mid-test.
#[derive(Clone)]
pub struct ToggleToken(pub Arc<AtomicBool>);

impl ToggleToken {
    pub fn new(signed_in: bool) -> Self {
        Self(Arc::new(AtomicBool::new(signed_in)))
    }

    pub fn set(&self, signed_in: bool) {
        self.0.store(signed_in, Ordering::SeqCst);
    }
}

impl CredentialProvider for ToggleToken {
    fn get_token(&self) -> Option<String> {
        if self.0.load(Ordering::SeqCst) {
            Some("test-token".to_string())
        } else {
            None
        }
    }
}

/// Start the fake store on a loopback port. Returns the remote config
/// pointing at it plus the shared state for assertions.
pub async fn spawn_drive() -> (RemoteConfig, Arc<DriveState>) {
    let state = Arc::new(DriveState::default());
    let app = Router::new()
        .route("/files", get(list_files).post(create_file))
        .route("/files/:id", get(download_file))
        .route("/upload/files", post(upload_file))
        .route("/upload/files/:id", patch(update_file))
        .with_state(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let config = RemoteConfig {
        api_base: format!("http://{}", addr),
        upload_base: format!("http://{}/upload", addr),
        root_folder_name: "FieldLog".to_string(),
    };
    (config, state)
}

fn file_json(file: &FakeFile) -> Value {
    json!({
        "id": file.id,
        "name": file.name,
        "mimeType": file.mime_type,
        "parents": file.parents,
        "appProperties": file.app_properties,
    })
}

/// Pull `prefix'value'` constraints out of a `q` expression.
fn quoted_after(q: &str, prefix: &str) -> Option<String> {
    let start = q.find(prefix)? + prefix.len();
    let rest = &q[start..];
    let end = rest.find('\'')?;
    Some(rest[..end].to_string())
}

fn parent_constraint(q: &str) -> Option<String> {
    let pos = q.find("' in parents")?;
    let head = &q[..pos];
    let start = head.rfind('\'')? + 1;
    Some(head[start..].to_string())
}

fn matches_query(q: &str, file: &FakeFile) -> bool {
    if let Some(name) = quoted_after(q, "name = '") {
        if file.name != name {
            return false;
        }
    }
    if let Some(mime) = quoted_after(q, "mimeType = '") {
        if file.mime_type != mime {
            return false;
        }
    }
    if let Some(parent) = parent_constraint(q) {
        if !file.parents.contains(&parent) {
            return false;
        }
    }
    true
}

async fn list_files(
    State(state): State<Arc<DriveState>>,
    Query(params): Query<HashMap<String, String>>,
) -> Json<Value> {
    let q = params.get("q").cloned().unwrap_or_default();
    let files = state.files.lock().unwrap();
    let matched: Vec<Value> = files
        .iter()
        .filter(|f| matches_query(&q, f))
        .map(file_json)
        .collect();
    Json(json!({ "files": matched }))
}

async fn create_file(
    State(state): State<Arc<DriveState>>,
    Json(metadata): Json<Value>,
) -> Result<Json<Value>, axum::http::StatusCode> {
    if state.fail_next_create.swap(false, Ordering::SeqCst) {
        return Err(axum::http::StatusCode::INTERNAL_SERVER_ERROR);
    }

    let file = FakeFile {
        id: state.fresh_id(),
        name: metadata["name"].as_str().unwrap_or_default().to_string(),
        mime_type: metadata["mimeType"].as_str().unwrap_or_default().to_string(),
        parents: string_vec(&metadata["parents"]),
        app_properties: string_map(&metadata["appProperties"]),
        bytes: Vec::new(),
    };
    if file.mime_type == "application/vnd.google-apps.folder" {
        state.folder_creates.fetch_add(1, Ordering::SeqCst);
    }
    let body = file_json(&file);
    state.files.lock().unwrap().push(file);
    Ok(Json(body))
}

async fn upload_file(
    State(state): State<Arc<DriveState>>,
    mut multipart: Multipart,
) -> Json<Value> {
    let mut metadata = json!({});
    let mut bytes = Vec::new();
    while let Some(field) = multipart.next_field().await.unwrap() {
        match field.name() {
            Some("metadata") => {
                metadata = serde_json::from_str(&field.text().await.unwrap()).unwrap()
            }
            Some("file") => bytes = field.bytes().await.unwrap().to_vec(),
            _ => {}
        }
    }

    let file = FakeFile {
        id: state.fresh_id(),
        name: metadata["name"].as_str().unwrap_or_default().to_string(),
        mime_type: metadata["mimeType"].as_str().unwrap_or_default().to_string(),
        parents: string_vec(&metadata["parents"]),
        app_properties: string_map(&metadata["appProperties"]),
        bytes,
    };
    let body = file_json(&file);
    state.files.lock().unwrap().push(file);
    Json(body)
}

async fn update_file(
    State(state): State<Arc<DriveState>>,
    Path(id): Path<String>,
    body: axum::body::Bytes,
) -> Result<Json<Value>, axum::http::StatusCode> {
    let mut files = state.files.lock().unwrap();
    match files.iter_mut().find(|f| f.id == id) {
        Some(file) => {
            file.bytes = body.to_vec();
            Ok(Json(file_json(file)))
        }
        None => Err(axum::http::StatusCode::NOT_FOUND),
    }
}

async fn download_file(
    State(state): State<Arc<DriveState>>,
    Path(id): Path<String>,
) -> Result<Vec<u8>, axum::http::StatusCode> {
    let files = state.files.lock().unwrap();
    match files.iter().find(|f| f.id == id) {
        Some(file) => Ok(file.bytes.clone()),
        None => Err(axum::http::StatusCode::NOT_FOUND),
    }
}

fn string_vec(value: &Value) -> Vec<String> {
    value
        .as_array()
        .map(|a| {
            a.iter()
                .filter_map(|v| v.as_str().map(String::from))
                .collect()
        })
        .unwrap_or_default()
}

fn string_map(value: &Value) -> HashMap<String, String> {
    value
        .as_object()
        .map(|o| {
            o.iter()
                .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                .collect()
        })
        .unwrap_or_default()
}
