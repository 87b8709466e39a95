mod common;

use common::{credential, playing_observation, RecordingScheduler};
use playback_history_agent::api::mock::MockApi;
use playback_history_agent::api::ApiError;
use playback_history_agent::credentials::CredentialStore;
use playback_history_agent::db;
use playback_history_agent::models::{PlaybackObservation, PollOutcome};
use playback_history_agent::poller::StatePoller;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

fn setup() -> (tempfile::TempDir, PathBuf) {
    let td = tempfile::tempdir().unwrap();
    let db_path = td.path().join("history.db");
    db::open_or_create(&db_path).unwrap();
    (td, db_path)
}

fn poller(api: Arc<MockApi>, store: Arc<CredentialStore>, scheduler: Arc<RecordingScheduler>, db_path: &Path) -> StatePoller {
    StatePoller::new(api, store, scheduler, Duration::from_secs(60), db_path.to_path_buf())
}

fn row_count(db_path: &Path) -> i64 {
    let conn = rusqlite::Connection::open(db_path).unwrap();
    db::count_events(&conn).unwrap()
}

fn authorized_store() -> Arc<CredentialStore> {
    Arc::new(CredentialStore::with_credential(credential("a0", "r0", 3600)))
}

#[tokio::test]
async fn absent_and_not_playing_never_append() {
    let (_td, db_path) = setup();
    let api = Arc::new(MockApi::new());
    api.push_playback(Ok(None));
    api.push_playback(Ok(Some(PlaybackObservation { is_playing: false, ..playing_observation() })));
    api.push_playback(Ok(Some(PlaybackObservation { item_uri: None, ..playing_observation() })));
    let p = poller(api.clone(), authorized_store(), Arc::new(RecordingScheduler::unbounded()), &db_path);

    assert_eq!(p.poll_once().await.unwrap(), PollOutcome::NoChange);
    assert_eq!(p.poll_once().await.unwrap(), PollOutcome::NotPlaying);
    assert_eq!(p.poll_once().await.unwrap(), PollOutcome::NotPlaying);
    assert_eq!(row_count(&db_path), 0);
    assert_eq!(api.seen_access_tokens(), vec!["a0"; 3]);
}

#[tokio::test]
async fn playing_appends_exactly_one_row_with_copied_fields() {
    let (_td, db_path) = setup();
    let api = Arc::new(MockApi::new());
    api.push_playback(Ok(Some(playing_observation())));
    let p = poller(api, authorized_store(), Arc::new(RecordingScheduler::unbounded()), &db_path);

    assert!(matches!(p.poll_once().await.unwrap(), PollOutcome::Playing(_)));

    let conn = rusqlite::Connection::open(&db_path).unwrap();
    let rows = db::recent_events(&conn, 10).unwrap();
    assert_eq!(rows.len(), 1);
    let ev = &rows[0];
    assert_eq!(ev.song_uri, "spotify:track:abc");
    assert_eq!(ev.context_uri, "spotify:playlist:xyz");
    assert_eq!(ev.progress_ms, 1500);
    assert!(ev.is_shuffling);
    assert_eq!(ev.device, "dev1");
    assert_eq!(ev.play_time_ms, 1000);
}

#[tokio::test]
async fn playing_without_context_stores_empty_string() {
    let (_td, db_path) = setup();
    let api = Arc::new(MockApi::new());
    api.push_playback(Ok(Some(PlaybackObservation { context_uri: None, ..playing_observation() })));
    let p = poller(api, authorized_store(), Arc::new(RecordingScheduler::unbounded()), &db_path);
    p.poll_once().await.unwrap();

    let conn = rusqlite::Connection::open(&db_path).unwrap();
    let context: String = conn.query_row("SELECT contextUri FROM tracks", [], |r| r.get(0)).unwrap();
    assert_eq!(context, "");
}

#[tokio::test]
async fn poll_without_token_fails_without_calling_server() {
    let (_td, db_path) = setup();
    let api = Arc::new(MockApi::new());
    let p = poller(api.clone(), Arc::new(CredentialStore::new()), Arc::new(RecordingScheduler::unbounded()), &db_path);

    assert!(p.poll_once().await.is_err());
    assert!(p.tick().await.is_none());
    assert!(api.seen_access_tokens().is_empty());
}

#[tokio::test]
async fn append_failure_is_reported_and_swallowed_by_tick() {
    let td = tempfile::tempdir().unwrap();
    // Schema never created: the insert fails.
    let db_path = td.path().join("no-schema.db");
    let api = Arc::new(MockApi::new());
    api.push_playback(Ok(Some(playing_observation())));
    api.push_playback(Ok(Some(playing_observation())));
    let p = poller(api, authorized_store(), Arc::new(RecordingScheduler::unbounded()), &db_path);

    assert!(p.poll_once().await.is_err());
    assert!(p.tick().await.is_none());
}

#[tokio::test]
async fn failed_polls_do_not_stop_the_schedule() {
    let (_td, db_path) = setup();
    let api = Arc::new(MockApi::new());
    api.push_playback(Err(ApiError::Transport("timeout".into())));
    api.push_playback(Err(ApiError::Malformed("garbage".into())));
    api.push_playback(Ok(Some(playing_observation())));

    let (tx, rx) = watch::channel(false);
    let scheduler = Arc::new(RecordingScheduler::stopping_after(3, tx));
    poller(api.clone(), authorized_store(), scheduler.clone(), &db_path)
        .run(rx)
        .await;

    assert_eq!(api.seen_access_tokens().len(), 3);
    assert_eq!(scheduler.delays(), vec![Duration::from_secs(60); 3]);
    assert_eq!(row_count(&db_path), 1);
}

#[tokio::test]
async fn poll_uses_latest_token_from_store() {
    let (_td, db_path) = setup();
    let api = Arc::new(MockApi::new());
    let store = authorized_store();
    let p = poller(api.clone(), store.clone(), Arc::new(RecordingScheduler::unbounded()), &db_path);

    p.poll_once().await.unwrap();
    store.set(credential("a1", "r0", 3600)).await;
    p.poll_once().await.unwrap();

    assert_eq!(api.seen_access_tokens(), vec!["a0".to_string(), "a1".to_string()]);
}
