//! Audio store and quota integrity tests
//!
//! Verifies that quota usage tracks the stored entries exactly (no leaked
//! or phantom bytes) and that the full add/save/remove lifecycle keeps the
//! binary store and track metadata consistent.

use mdj_common::{EventBus, QuotaLevel, Tuning};
use mdj_session::db::init::{init_audio_schema, init_metadata_schema};
use mdj_session::store::types::{Track, TrackKind, TrackSource};
use mdj_session::{AudioStore, MetadataStore, SessionStore};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration;

async fn mem_pool() -> SqlitePool {
    SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap()
}

async fn audio_store(budget: u64) -> AudioStore {
    let pool = mem_pool().await;
    init_audio_schema(&pool).await.unwrap();
    let tuning = Tuning {
        storage_budget_bytes: budget,
        ..Tuning::default()
    };
    AudioStore::new(pool, tuning)
}

async fn session_store(budget: u64) -> (Arc<SessionStore>, Arc<AudioStore>) {
    let audio = Arc::new(audio_store(budget).await);
    let meta_pool = mem_pool().await;
    init_metadata_schema(&meta_pool).await.unwrap();
    let tuning = Tuning {
        storage_budget_bytes: budget,
        ..Tuning::default()
    };
    let store = SessionStore::new(
        MetadataStore::new(meta_pool),
        Some(audio.clone()),
        EventBus::new(64),
        tuning,
    );
    (store, audio)
}

#[tokio::test]
async fn test_quota_tracks_entries_exactly() {
    let store = audio_store(1_000_000).await;

    store.save("a", &[0u8; 100]).await.unwrap();
    store.save("b", &[0u8; 250]).await.unwrap();
    store.save("c", &[0u8; 50]).await.unwrap();
    assert_eq!(store.quota().await.used_bytes, 400);

    // Overwrite replaces, never accumulates
    store.save("b", &[0u8; 10]).await.unwrap();
    assert_eq!(store.quota().await.used_bytes, 160);

    store.delete("a").await.unwrap();
    assert_eq!(store.quota().await.used_bytes, 60);

    // Deleting something absent changes nothing
    store.delete("never-existed").await.unwrap();
    assert_eq!(store.quota().await.used_bytes, 60);

    store.delete("b").await.unwrap();
    store.delete("c").await.unwrap();
    assert_eq!(store.quota().await.used_bytes, 0);
}

#[tokio::test]
async fn test_warning_levels_follow_usage() {
    let store = audio_store(100).await;

    store.save("a", &[0u8; 60]).await.unwrap();
    assert_eq!(store.quota().await.level, QuotaLevel::Normal);

    store.save("b", &[0u8; 15]).await.unwrap();
    assert_eq!(store.quota().await.level, QuotaLevel::Warning);

    store.save("c", &[0u8; 15]).await.unwrap();
    assert_eq!(store.quota().await.level, QuotaLevel::Danger);

    store.save("d", &[0u8; 6]).await.unwrap();
    assert_eq!(store.quota().await.level, QuotaLevel::Critical);
}

#[tokio::test]
async fn test_quota_exceeded_is_not_silently_dropped() {
    let store = audio_store(100).await;
    store.save("a", &[0u8; 90]).await.unwrap();

    let err = store.save("b", &[0u8; 20]).await.unwrap_err();
    assert!(matches!(err, mdj_common::Error::QuotaExceeded { .. }));

    // The failed save left nothing behind
    assert_eq!(store.get("b").await.unwrap(), None);
    assert_eq!(store.quota().await.used_bytes, 90);
}

#[tokio::test]
async fn test_session_scenario_upload_lifecycle() {
    // Start session, add 3 tracks (2 tts, 1 upload), save the upload's
    // bytes, then remove it and watch storage follow
    let (store, audio) = session_store(1_000_000).await;

    store.start_session();
    store.add_track(Track::new("tts-1", "Intro", TrackKind::Intro, TrackSource::TtsGenerated));
    store.add_track(Track::new("tts-2", "Outro", TrackKind::Transition, TrackSource::TtsGenerated));
    store.add_track(Track::new("up-1", "My Song", TrackKind::Song, TrackSource::UserUploaded));

    store
        .attach_track_audio("up-1", vec![7u8; 2048])
        .await
        .unwrap();

    let quota = audio.quota().await;
    assert!(quota.used_bytes > 0);
    assert_eq!(quota.used_bytes, 2048);

    let track = store.get_track("up-1").unwrap();
    assert!(track.has_local_audio);
    assert!(track.url.starts_with("mem://"));
    assert!(audio.resolve_url(&track.url).is_some());

    let url = track.url.clone();
    assert!(store.remove_track("up-1"));
    assert!(store.get_track("up-1").is_none());

    // Binary deletion runs in the background
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(audio.get("up-1").await.unwrap(), None);
    assert_eq!(audio.quota().await.used_bytes, 0);
    assert!(audio.resolve_url(&url).is_none());

    // The other tracks are untouched
    assert!(store.get_track("tts-1").is_some());
    assert!(store.get_track("tts-2").is_some());
}

#[tokio::test]
async fn test_attach_audio_to_missing_track_fails_cleanly() {
    let (store, audio) = session_store(1_000_000).await;
    let err = store
        .attach_track_audio("nope", vec![1, 2, 3])
        .await
        .unwrap_err();
    assert!(matches!(err, mdj_common::Error::NotFound(_)));
    assert_eq!(audio.quota().await.used_bytes, 0);
}

#[tokio::test]
async fn test_quota_exceeded_surfaces_through_store() {
    let (store, _audio) = session_store(100).await;
    store.add_track(Track::new("big", "Big", TrackKind::Song, TrackSource::UserUploaded));

    let err = store
        .attach_track_audio("big", vec![0u8; 500])
        .await
        .unwrap_err();
    assert!(matches!(err, mdj_common::Error::QuotaExceeded { .. }));

    // In-memory metadata was not corrupted by the failure
    let track = store.get_track("big").unwrap();
    assert!(!track.has_local_audio);
    assert_eq!(track.url, "");
}
