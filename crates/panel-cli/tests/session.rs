//! Session loop tests: scripted stdin against real and in-memory adapters.

use panel_cli::session::{self, SessionCommand};
use panel_cli::{FileLocalStore, run_session};
use panel_sync::{
    Document, InMemoryLocal, InMemoryRemote, LocalStore, StorageMode, SyncConfig, SyncController,
};
use serde_json::json;
use std::time::Duration;
use tempfile::TempDir;

#[tokio::test]
async fn test_local_session_writes_file() {
    let dir = TempDir::new().unwrap();
    let mut ctrl = SyncController::local_only(FileLocalStore::new(dir.path()));
    ctrl.initialize().await.unwrap();
    assert_eq!(ctrl.mode(), StorageMode::Local);

    let script: &[u8] = b"set albums {\"data\": [{\"title\": \"Pascua\"}]}\nstatus\nquit\n";
    run_session(&mut ctrl, script).await.unwrap();

    let stored = FileLocalStore::new(dir.path()).get().unwrap().unwrap();
    assert_eq!(
        stored.get("albums").and_then(|v| v.get("data")),
        Some(&json!([{"title": "Pascua"}]))
    );
}

#[tokio::test]
async fn test_remote_session_flushes_on_exit() {
    let remote = InMemoryRemote::new();
    let mut ctrl = SyncController::new(
        InMemoryLocal::new(),
        Some(remote.clone()),
        SyncConfig {
            autosave_interval: Duration::from_secs(3600),
        },
    );
    ctrl.initialize().await.unwrap();
    assert_eq!(ctrl.mode(), StorageMode::Remote);

    // Input ends without `quit`
    let script: &[u8] = b"set songs {\"data\": [\"Pescador\"]}\n\nbogus\n";
    run_session(&mut ctrl, script).await.unwrap();

    assert_eq!(remote.value_at("/songs/data"), Some(json!(["Pescador"])));
    assert!(!ctrl.is_dirty());
    assert_eq!(remote.subscriber_count(), 0);
}

#[tokio::test]
async fn test_export_command_writes_backup() {
    let dir = TempDir::new().unwrap();
    let mut ctrl = SyncController::local_only(InMemoryLocal::new());
    ctrl.initialize().await.unwrap();
    ctrl.update_section("wordle", json!({"daily-words": ["sol"]}))
        .unwrap();

    let out = dir.path().join("backup.json");
    let reply = session::execute(&mut ctrl, SessionCommand::Export(Some(out.clone())))
        .await
        .unwrap();
    assert!(reply.contains("backup.json"));

    let exported = Document::from_json_bytes(&std::fs::read(&out).unwrap()).unwrap();
    assert_eq!(&exported, ctrl.document());
}

#[tokio::test]
async fn test_save_command_reports_offline() {
    let remote = InMemoryRemote::new();
    remote.set_connect_error(Some("no network"));
    let mut ctrl = SyncController::new(InMemoryLocal::new(), Some(remote), SyncConfig::default());
    ctrl.initialize().await.unwrap();
    assert_eq!(ctrl.mode(), StorageMode::Offline);

    let reply = session::execute(
        &mut ctrl,
        SessionCommand::Set {
            section: "albums".into(),
            value: json!({"data": []}),
        },
    )
    .await
    .unwrap();
    assert!(reply.contains("offline"));

    let err = session::execute(&mut ctrl, SessionCommand::Save)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("offline"));
}
