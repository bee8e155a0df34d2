//! Legacy audio migration tests
//!
//! Covers idempotence (a second run migrates nothing), partial tolerance
//! (one corrupt payload doesn't abort the batch), and the crash-repair
//! path where a blob landed but the cleaned snapshot never did.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use mdj_common::{EventBus, Tuning};
use mdj_session::db::init::{init_audio_schema, init_metadata_schema};
use mdj_session::store::types::{Track, TrackKind, TrackSource};
use mdj_session::{AudioStore, MetadataStore, MigrationPhase, SessionStore};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use std::sync::Arc;

async fn mem_pool() -> SqlitePool {
    SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap()
}

async fn store_with_audio() -> (Arc<SessionStore>, Arc<AudioStore>) {
    let audio_pool = mem_pool().await;
    init_audio_schema(&audio_pool).await.unwrap();
    let meta_pool = mem_pool().await;
    init_metadata_schema(&meta_pool).await.unwrap();

    let tuning = Tuning::default();
    let audio = Arc::new(AudioStore::new(audio_pool, tuning.clone()));
    let store = SessionStore::new(
        MetadataStore::new(meta_pool),
        Some(audio.clone()),
        EventBus::new(64),
        tuning,
    );
    (store, audio)
}

fn legacy_track(id: &str, payload: &[u8]) -> Track {
    let mut track = Track::new(id, id, TrackKind::Song, TrackSource::UserUploaded);
    track.audio_data = Some(BASE64.encode(payload));
    track
}

fn corrupt_track(id: &str) -> Track {
    let mut track = Track::new(id, id, TrackKind::Song, TrackSource::UserUploaded);
    track.audio_data = Some("!!! this is not base64 !!!".to_string());
    track
}

#[tokio::test]
async fn test_migration_moves_payloads_into_blob_store() {
    let (store, audio) = store_with_audio().await;
    store.add_track(legacy_track("a", b"aaaa"));
    store.add_track(legacy_track("b", b"bbbbbb"));

    assert_eq!(store.pending_migration_count().await, 2);

    let report = store.migrate_legacy_audio().await;
    assert_eq!(report.migrated_count, 2);
    assert_eq!(report.total_size_bytes, 10);
    assert!(report.errors.is_empty());
    assert_eq!(report.phase(), MigrationPhase::Success);

    // Bytes are retrievable and metadata was cleaned
    assert_eq!(audio.get("a").await.unwrap(), Some(b"aaaa".to_vec()));
    assert_eq!(audio.get("b").await.unwrap(), Some(b"bbbbbb".to_vec()));
    for id in ["a", "b"] {
        let track = store.get_track(id).unwrap();
        assert!(track.audio_data.is_none());
        assert!(track.has_local_audio);
        assert!(track.url.starts_with("mem://"));
    }
}

#[tokio::test]
async fn test_migration_idempotent() {
    let (store, _audio) = store_with_audio().await;
    store.add_track(legacy_track("a", b"payload"));

    let first = store.migrate_legacy_audio().await;
    assert_eq!(first.migrated_count, 1);
    let pending_after_first = store.pending_migration_count().await;
    assert_eq!(pending_after_first, 0);

    // A second run with no intervening writes migrates nothing
    let second = store.migrate_legacy_audio().await;
    assert_eq!(second.migrated_count, 0);
    assert!(second.errors.is_empty());
    assert!(store.pending_migration_count().await <= pending_after_first);
}

#[tokio::test]
async fn test_migration_partial_tolerance() {
    let (store, audio) = store_with_audio().await;
    store.add_track(legacy_track("good-1", b"one"));
    store.add_track(corrupt_track("bad"));
    store.add_track(legacy_track("good-2", b"two"));

    let report = store.migrate_legacy_audio().await;

    // One failure, the rest committed
    assert_eq!(report.migrated_count, 2);
    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].track_id, "bad");
    assert_eq!(report.phase(), MigrationPhase::PartialFailure);

    assert_eq!(audio.get("good-1").await.unwrap(), Some(b"one".to_vec()));
    assert_eq!(audio.get("good-2").await.unwrap(), Some(b"two".to_vec()));
    assert_eq!(audio.get("bad").await.unwrap(), None);

    // The corrupt track is still pending; a retry re-reports it
    assert_eq!(store.pending_migration_count().await, 1);
    let retry = store.migrate_legacy_audio().await;
    assert_eq!(retry.migrated_count, 0);
    assert_eq!(retry.errors.len(), 1);
    assert_eq!(retry.phase(), MigrationPhase::Failed);
}

#[tokio::test]
async fn test_migration_repairs_interrupted_run() {
    let (store, audio) = store_with_audio().await;

    // Simulate a crash between the blob save and the snapshot write: the
    // blob exists but the track still carries its payload
    store.add_track(legacy_track("t1", b"bytes"));
    audio.save("t1", b"bytes").await.unwrap();

    let report = store.migrate_legacy_audio().await;

    // Repair is not a migration: nothing re-decoded, nothing counted
    assert_eq!(report.migrated_count, 0);
    assert!(report.errors.is_empty());
    assert_eq!(report.phase(), MigrationPhase::Success);

    let track = store.get_track("t1").unwrap();
    assert!(track.audio_data.is_none());
    assert!(track.has_local_audio);
    assert_eq!(store.pending_migration_count().await, 0);
}

#[tokio::test]
async fn test_migration_with_nothing_pending_is_success() {
    let (store, _audio) = store_with_audio().await;
    store.add_track(Track::new("plain", "P", TrackKind::Effect, TrackSource::TtsGenerated));

    assert_eq!(store.pending_migration_count().await, 0);
    let report = store.migrate_legacy_audio().await;
    assert_eq!(report.migrated_count, 0);
    assert!(report.errors.is_empty());
    assert_eq!(store.snapshot().migration_phase, MigrationPhase::Success);
}

#[tokio::test]
async fn test_migration_quota_failure_is_per_track() {
    // Budget fits the first payload but not the second
    let audio_pool = mem_pool().await;
    init_audio_schema(&audio_pool).await.unwrap();
    let meta_pool = mem_pool().await;
    init_metadata_schema(&meta_pool).await.unwrap();
    let tuning = Tuning {
        storage_budget_bytes: 6,
        ..Tuning::default()
    };
    let audio = Arc::new(AudioStore::new(audio_pool, tuning.clone()));
    let store = SessionStore::new(
        MetadataStore::new(meta_pool),
        Some(audio.clone()),
        EventBus::new(64),
        tuning,
    );

    store.add_track(legacy_track("small", b"1234"));
    store.add_track(legacy_track("large", b"123456789"));

    let report = store.migrate_legacy_audio().await;
    assert_eq!(report.migrated_count, 1);
    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].track_id, "large");
    assert!(report.errors[0].error.contains("quota"));
}
