//! Metadata tier access
//!
//! Key-value persistence for the session state snapshot (never binary
//! audio, never ephemeral references) plus the archive of closed session
//! records. The snapshot lives under a versioned namespace key; the
//! previous-generation key is kept readable so old saves rehydrate.

use crate::store::types::SessionRecord;
use mdj_common::Result;
use sqlx::SqlitePool;
use tracing::debug;

/// Versioned namespace key for the current snapshot format
pub const STATE_KEY: &str = "magic-dj/state/v2";

/// Snapshot key of the previous storage generation (inline base64 audio)
pub const LEGACY_STATE_KEY: &str = "magic-dj/state/v1";

/// Key-value metadata store over the `app_state` table
#[derive(Clone)]
pub struct MetadataStore {
    db: SqlitePool,
}

impl MetadataStore {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Read a raw value by key
    pub async fn get(&self, key: &str) -> Result<Option<String>> {
        let value: Option<String> = sqlx::query_scalar("SELECT value FROM app_state WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.db)
            .await?;
        Ok(value)
    }

    /// Upsert a raw value by key
    pub async fn set(&self, key: &str, value: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO app_state (key, value, updated_at)
            VALUES (?, ?, ?)
            ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(mdj_common::time::now().to_rfc3339())
        .execute(&self.db)
        .await?;

        debug!("Persisted {} ({} bytes)", key, value.len());
        Ok(())
    }

    /// Remove a key. Idempotent.
    pub async fn remove(&self, key: &str) -> Result<()> {
        sqlx::query("DELETE FROM app_state WHERE key = ?")
            .bind(key)
            .execute(&self.db)
            .await?;
        Ok(())
    }

    /// Archive a closed session record
    pub async fn insert_session(&self, record: &SessionRecord) -> Result<()> {
        let logs = serde_json::to_string(&record.operation_logs)
            .map_err(|e| mdj_common::Error::Internal(e.to_string()))?;

        sqlx::query(
            r#"
            INSERT OR REPLACE INTO sessions (
                id, start_time, end_time, duration_seconds,
                mode_switch_count, ai_interaction_count, operation_logs
            ) VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&record.id)
        .bind(record.start_time.to_rfc3339())
        .bind(record.end_time.map(|t| t.to_rfc3339()))
        .bind(record.duration_seconds as i64)
        .bind(i64::from(record.mode_switch_count))
        .bind(i64::from(record.ai_interaction_count))
        .bind(logs)
        .execute(&self.db)
        .await?;

        debug!("Archived session {}", record.id);
        Ok(())
    }

    /// Number of archived sessions
    pub async fn session_count(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sessions")
            .fetch_one(&self.db)
            .await?;
        Ok(count)
    }
}

impl std::fmt::Debug for MetadataStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetadataStore").finish()
    }
}
