//! Integration tests for the remote object store client, against the
//! in-process stand-in server.

mod support;

use fieldlog::remote::{RemoteClient, StaticToken};
use fieldlog::EngineError;
use std::sync::Arc;
use support::{spawn_drive, ToggleToken};

fn signed_in_client(config: &fieldlog::config::RemoteConfig) -> Arc<RemoteClient> {
    Arc::new(RemoteClient::new(
        config,
        Arc::new(StaticToken(Some("test-token".into()))),
    ))
}

#[tokio::test]
async fn test_root_folder_is_idempotent() {
    let (config, state) = spawn_drive().await;
    let client = signed_in_client(&config);

    let first = client.find_or_create_root_folder().await.unwrap();
    let second = client.find_or_create_root_folder().await.unwrap();
    assert_eq!(first, second);
    assert_eq!(state.folder_count(), 1);
}

#[tokio::test]
async fn test_root_folder_found_across_clients() {
    let (config, state) = spawn_drive().await;

    let a = signed_in_client(&config);
    let b = signed_in_client(&config);
    let id_a = a.find_or_create_root_folder().await.unwrap();
    // The second client has a cold cache and must find, not re-create
    let id_b = b.find_or_create_root_folder().await.unwrap();
    assert_eq!(id_a, id_b);
    assert_eq!(state.folder_count(), 1);
}

#[tokio::test]
async fn test_concurrent_path_resolution_is_single_flight() {
    let (config, state) = spawn_drive().await;
    let client = signed_in_client(&config);
    let root = client.find_or_create_root_folder().await.unwrap();

    let calls = (0..8).map(|_| {
        let client = client.clone();
        let root = root.clone();
        async move {
            client
                .ensure_remote_path(&["proj_a", "images"], &root)
                .await
                .unwrap()
        }
    });

    let mut ids = futures::future::join_all(calls).await;
    ids.dedup();
    assert_eq!(ids.len(), 1, "every caller resolved the same folder");
    // root + proj_a + images, each created exactly once
    assert_eq!(state.folder_count(), 3);
}

#[tokio::test]
async fn test_failed_resolution_is_evicted_for_retry() {
    let (config, state) = spawn_drive().await;
    let client = signed_in_client(&config);
    let root = client.find_or_create_root_folder().await.unwrap();

    state
        .fail_next_create
        .store(true, std::sync::atomic::Ordering::SeqCst);
    let err = client
        .ensure_remote_path(&["proj_b"], &root)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::RemoteApi(_)));

    // The failed segment was evicted, so a retry goes through
    let id = client.ensure_remote_path(&["proj_b"], &root).await.unwrap();
    assert!(!id.is_empty());
    assert_eq!(state.folder_count(), 2);
}

#[tokio::test]
async fn test_no_credential_surfaces_auth_error() {
    let (config, _) = spawn_drive().await;
    let offline = ToggleToken::new(false);
    let client = RemoteClient::new(&config, Arc::new(offline));

    assert!(!client.is_signed_in());
    let err = client.list_all_files().await.unwrap_err();
    assert!(matches!(err, EngineError::Auth));
    let err = client.find_or_create_root_folder().await.unwrap_err();
    assert!(matches!(err, EngineError::Auth));
}

#[tokio::test]
async fn test_upload_tags_relative_path() {
    let (config, _) = spawn_drive().await;
    let client = signed_in_client(&config);
    let root = client.find_or_create_root_folder().await.unwrap();
    let folder = client
        .ensure_remote_path(&["proj_c", "images"], &root)
        .await
        .unwrap();

    let uploaded = client
        .upload_file(
            b"jpeg".to_vec(),
            "s1.jpg",
            "image/jpeg",
            &folder,
            Some("proj_c/images/s1.jpg"),
        )
        .await
        .unwrap();
    assert_eq!(uploaded.name, "s1.jpg");

    let listed = client.list_all_files().await.unwrap();
    let found = listed.iter().find(|f| f.id == uploaded.id).unwrap();
    assert_eq!(found.relative_path(), Some("proj_c/images/s1.jpg"));
    assert_eq!(found.parents, vec![folder]);
}

#[tokio::test]
async fn test_download_update_and_find_by_name() {
    let (config, _) = spawn_drive().await;
    let client = signed_in_client(&config);
    let root = client.find_or_create_root_folder().await.unwrap();

    let uploaded = client
        .upload_file(b"v1".to_vec(), "doc.json", "application/json", &root, None)
        .await
        .unwrap();
    assert_eq!(client.download_blob(&uploaded.id).await.unwrap(), b"v1");

    client.update_file(&uploaded.id, b"v2".to_vec()).await.unwrap();
    assert_eq!(client.read_text_file(&uploaded.id).await.unwrap(), "v2");

    let found = client
        .find_file_by_name("doc.json", &root)
        .await
        .unwrap()
        .expect("file should be found by name");
    assert_eq!(found.id, uploaded.id);

    assert!(client
        .find_file_by_name("absent.json", &root)
        .await
        .unwrap()
        .is_none());
}
