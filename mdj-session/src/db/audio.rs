//! Persistent audio blob store
//!
//! Binary storage tier for track audio, keyed by track id. Owns quota
//! derivation against the configured storage budget and the registry of
//! ephemeral playback references, so that acquire/release pairing cannot
//! be missed by callers scattered across the store.
//!
//! Save and get perform a single attempt each; retrying is the caller's
//! decision. Only `open` retries (see `db::init`).

use crate::db::init::{init_audio_schema, open_database};
use mdj_common::{Error, Result, StorageQuota, Tuning};
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, RwLock};
use tracing::{debug, warn};
use uuid::Uuid;

/// Scheme prefix for ephemeral playback references minted by this store
pub const EPHEMERAL_URL_SCHEME: &str = "mem://";

/// Registry of outstanding ephemeral references.
///
/// Single owner per track id: minting a new reference for a track revokes
/// the previous one, releasing its bytes.
#[derive(Default)]
struct UrlRegistry {
    /// track id -> currently valid url
    current: HashMap<String, String>,
    /// url -> referenced bytes
    blobs: HashMap<String, Arc<Vec<u8>>>,
}

/// Persistent audio store over the binary SQLite tier
pub struct AudioStore {
    db: SqlitePool,
    tuning: Tuning,
    urls: RwLock<UrlRegistry>,
}

impl AudioStore {
    /// Wrap an already-open pool (schema must exist; see `init_audio_schema`)
    pub fn new(db: SqlitePool, tuning: Tuning) -> Self {
        Self {
            db,
            tuning,
            urls: RwLock::new(UrlRegistry::default()),
        }
    }

    /// Open (or create) the binary store at `db_path`.
    ///
    /// Retries with backoff before failing with `StorageUnavailable`.
    pub async fn open(db_path: &Path, tuning: Tuning) -> Result<Self> {
        let pool = open_database(db_path, &tuning).await?;
        init_audio_schema(&pool)
            .await
            .map_err(|e| Error::StorageUnavailable(e.to_string()))?;
        Ok(Self::new(pool, tuning))
    }

    /// Upsert audio content for a track.
    ///
    /// Fails with `QuotaExceeded` when the write would not fit in the
    /// remaining budget (an overwrite is charged only for its size delta).
    /// On success any previously minted ephemeral reference for this track
    /// is revoked.
    pub async fn save(&self, track_id: &str, bytes: &[u8]) -> Result<()> {
        let existing_size: Option<i64> =
            sqlx::query_scalar("SELECT size FROM audio_blobs WHERE track_id = ?")
                .bind(track_id)
                .fetch_optional(&self.db)
                .await
                .map_err(|e| Error::Write(e.to_string()))?;

        let used = self.used_bytes().await.map_err(|e| Error::Write(e.to_string()))?;
        let used_after = used - existing_size.unwrap_or(0).max(0) as u64 + bytes.len() as u64;
        let budget = self.tuning.storage_budget_bytes;
        if budget > 0 && used_after > budget {
            let available = budget.saturating_sub(used);
            return Err(Error::QuotaExceeded {
                needed: bytes.len() as u64,
                available,
            });
        }

        sqlx::query(
            r#"
            INSERT INTO audio_blobs (track_id, data, size, updated_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(track_id) DO UPDATE SET
                data = excluded.data,
                size = excluded.size,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(track_id)
        .bind(bytes)
        .bind(bytes.len() as i64)
        .bind(mdj_common::time::now().to_rfc3339())
        .execute(&self.db)
        .await
        .map_err(|e| Error::Write(e.to_string()))?;

        // The old bytes are gone; any reference to them must not outlive them
        self.revoke_url(track_id);

        debug!("Saved {} bytes of audio for track {}", bytes.len(), track_id);
        Ok(())
    }

    /// Fetch audio content for a track. Absence is not an error.
    pub async fn get(&self, track_id: &str) -> Result<Option<Vec<u8>>> {
        let row: Option<(Vec<u8>,)> =
            sqlx::query_as("SELECT data FROM audio_blobs WHERE track_id = ?")
                .bind(track_id)
                .fetch_optional(&self.db)
                .await
                .map_err(|e| Error::Read(e.to_string()))?;

        Ok(row.map(|(data,)| data))
    }

    /// Fetch audio for several tracks at once.
    ///
    /// Missing ids are simply absent from the result map (partial success
    /// by design).
    pub async fn get_multiple(&self, track_ids: &[String]) -> Result<HashMap<String, Vec<u8>>> {
        let mut found = HashMap::new();
        for id in track_ids {
            if let Some(bytes) = self.get(id).await? {
                found.insert(id.clone(), bytes);
            }
        }
        Ok(found)
    }

    /// Check whether a blob exists for a track without loading it
    pub async fn contains(&self, track_id: &str) -> Result<bool> {
        let row: Option<i64> = sqlx::query_scalar("SELECT 1 FROM audio_blobs WHERE track_id = ?")
            .bind(track_id)
            .fetch_optional(&self.db)
            .await
            .map_err(|e| Error::Read(e.to_string()))?;
        Ok(row.is_some())
    }

    /// Delete a track's audio. Idempotent: no error if it was never present.
    /// Also revokes the track's ephemeral reference.
    pub async fn delete(&self, track_id: &str) -> Result<()> {
        sqlx::query("DELETE FROM audio_blobs WHERE track_id = ?")
            .bind(track_id)
            .execute(&self.db)
            .await
            .map_err(|e| Error::Write(e.to_string()))?;

        self.revoke_url(track_id);

        debug!("Deleted audio for track {}", track_id);
        Ok(())
    }

    /// Sum of stored blob sizes
    pub async fn used_bytes(&self) -> Result<u64> {
        let used: i64 = sqlx::query_scalar("SELECT COALESCE(SUM(size), 0) FROM audio_blobs")
            .fetch_one(&self.db)
            .await?;
        Ok(used.max(0) as u64)
    }

    /// Compute the current storage quota snapshot.
    ///
    /// Must not fail: on a driver error this returns the zeroed
    /// "quota unknown" snapshot so callers degrade gracefully.
    pub async fn quota(&self) -> StorageQuota {
        match self.used_bytes().await {
            Ok(used) => {
                let total = self.tuning.storage_budget_bytes;
                let percentage = if total > 0 {
                    (used as f64 / total as f64) * 100.0
                } else {
                    0.0
                };
                StorageQuota {
                    used_bytes: used,
                    total_bytes: total,
                    percentage,
                    level: self.tuning.quota_thresholds.classify(percentage),
                }
            }
            Err(e) => {
                warn!("Failed to compute storage quota: {}", e);
                StorageQuota::unknown()
            }
        }
    }

    /// Classify a usage percentage with this store's configured thresholds
    pub fn warning_level(&self, percentage: f64) -> mdj_common::QuotaLevel {
        self.tuning.quota_thresholds.classify(percentage)
    }

    // ------------------------------------------------------------------
    // Ephemeral playback references
    // ------------------------------------------------------------------

    /// Mint an ephemeral playback reference for a track's bytes.
    ///
    /// Revokes the track's previous reference first, so there is at most
    /// one live reference per track.
    pub fn mint_url(&self, track_id: &str, bytes: Vec<u8>) -> String {
        let url = format!("{}{}", EPHEMERAL_URL_SCHEME, Uuid::new_v4());
        let mut reg = self.urls.write().unwrap();
        if let Some(old) = reg.current.insert(track_id.to_string(), url.clone()) {
            reg.blobs.remove(&old);
        }
        reg.blobs.insert(url.clone(), Arc::new(bytes));
        url
    }

    /// Release the track's current ephemeral reference, if any
    pub fn revoke_url(&self, track_id: &str) {
        let mut reg = self.urls.write().unwrap();
        if let Some(url) = reg.current.remove(track_id) {
            reg.blobs.remove(&url);
        }
    }

    /// Resolve an ephemeral reference to its bytes
    pub fn resolve_url(&self, url: &str) -> Option<Arc<Vec<u8>>> {
        self.urls.read().unwrap().blobs.get(url).cloned()
    }

    /// Release every outstanding reference (store re-open, session reset)
    pub fn revoke_all_urls(&self) {
        let mut reg = self.urls.write().unwrap();
        reg.current.clear();
        reg.blobs.clear();
    }

    /// Number of live ephemeral references
    pub fn url_count(&self) -> usize {
        self.urls.read().unwrap().blobs.len()
    }
}

impl std::fmt::Debug for AudioStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioStore")
            .field("urls", &self.url_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn test_store(budget: u64) -> AudioStore {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        init_audio_schema(&pool).await.unwrap();
        let tuning = Tuning {
            storage_budget_bytes: budget,
            ..Tuning::default()
        };
        AudioStore::new(pool, tuning)
    }

    #[tokio::test]
    async fn test_save_get_roundtrip() {
        let store = test_store(1024).await;
        store.save("t1", b"abc").await.unwrap();
        assert_eq!(store.get("t1").await.unwrap(), Some(b"abc".to_vec()));
        assert_eq!(store.get("missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_save_overwrites() {
        let store = test_store(1024).await;
        store.save("t1", b"first").await.unwrap();
        store.save("t1", b"second!").await.unwrap();
        assert_eq!(store.get("t1").await.unwrap(), Some(b"second!".to_vec()));
        assert_eq!(store.used_bytes().await.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_quota_exceeded() {
        let store = test_store(10).await;
        store.save("t1", b"12345").await.unwrap();

        let err = store.save("t2", b"1234567").await.unwrap_err();
        match err {
            Error::QuotaExceeded { needed, available } => {
                assert_eq!(needed, 7);
                assert_eq!(available, 5);
            }
            other => panic!("expected QuotaExceeded, got {:?}", other),
        }

        // Overwrite is charged only the delta: replacing 5 bytes with 9
        // still fits a 10 byte budget
        store.save("t1", b"123456789").await.unwrap();
    }

    #[tokio::test]
    async fn test_delete_idempotent() {
        let store = test_store(1024).await;
        store.save("t1", b"abc").await.unwrap();
        store.delete("t1").await.unwrap();
        store.delete("t1").await.unwrap();
        assert_eq!(store.get("t1").await.unwrap(), None);
        assert_eq!(store.used_bytes().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_get_multiple_partial() {
        let store = test_store(1024).await;
        store.save("a", b"1").await.unwrap();
        store.save("b", b"22").await.unwrap();

        let found = store
            .get_multiple(&["a".to_string(), "b".to_string(), "ghost".to_string()])
            .await
            .unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(found["a"], b"1".to_vec());
        assert_eq!(found["b"], b"22".to_vec());
        assert!(!found.contains_key("ghost"));
    }

    #[tokio::test]
    async fn test_mint_revokes_previous_url() {
        let store = test_store(1024).await;
        let url1 = store.mint_url("t1", b"one".to_vec());
        let url2 = store.mint_url("t1", b"two".to_vec());

        assert_ne!(url1, url2);
        assert!(store.resolve_url(&url1).is_none());
        assert_eq!(store.resolve_url(&url2).unwrap().as_slice(), b"two");
        assert_eq!(store.url_count(), 1);
    }

    #[tokio::test]
    async fn test_save_revokes_url() {
        let store = test_store(1024).await;
        let url = store.mint_url("t1", b"stale".to_vec());
        store.save("t1", b"fresh").await.unwrap();
        assert!(store.resolve_url(&url).is_none());
    }

    #[tokio::test]
    async fn test_quota_snapshot() {
        let store = test_store(100).await;
        store.save("t1", b"0123456789").await.unwrap();

        let q = store.quota().await;
        assert_eq!(q.used_bytes, 10);
        assert_eq!(q.total_bytes, 100);
        assert!((q.percentage - 10.0).abs() < f64::EPSILON);
        assert_eq!(q.level, mdj_common::QuotaLevel::Normal);
    }
}
