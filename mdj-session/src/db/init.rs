//! Database initialization
//!
//! Opens/creates the engine databases with automatic schema creation.
//! Opening retries with exponential backoff before declaring the store
//! unavailable, so a transient lock (another console instance shutting
//! down, a slow external drive) does not disable local audio for the
//! whole session.

use mdj_common::{Error, Result, Tuning};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use std::path::Path;
use tracing::{info, warn};

/// Current schema version for both tiers
///
/// **IMPORTANT:** Increment this when adding new migrations
const CURRENT_SCHEMA_VERSION: i32 = 1;

/// Open a database with retry and backoff.
///
/// Backoff is `open_retry_base_ms * attempt` for each retry. After
/// `open_retry_count` retries the store is declared unavailable and the
/// caller decides how to degrade.
pub async fn open_database(db_path: &Path, tuning: &Tuning) -> Result<SqlitePool> {
    let mut attempt: u32 = 0;
    loop {
        match try_open(db_path).await {
            Ok(pool) => return Ok(pool),
            Err(e) if attempt < tuning.open_retry_count => {
                attempt += 1;
                let delay = std::time::Duration::from_millis(
                    tuning.open_retry_base_ms * u64::from(attempt),
                );
                warn!(
                    "Failed to open {} (attempt {}): {} - retrying in {:?}",
                    db_path.display(),
                    attempt,
                    e,
                    delay
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => {
                return Err(Error::StorageUnavailable(format!(
                    "{}: {}",
                    db_path.display(),
                    e
                )));
            }
        }
    }
}

/// Single open attempt: create parent directory, connect, set pragmas
async fn try_open(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(&db_url)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    sqlx::query("PRAGMA foreign_keys = ON").execute(&pool).await?;

    // WAL allows concurrent readers with one writer
    sqlx::query("PRAGMA journal_mode = WAL").execute(&pool).await?;

    sqlx::query("PRAGMA busy_timeout = 5000").execute(&pool).await?;

    Ok(pool)
}

/// Create the metadata tier schema (idempotent)
pub async fn init_metadata_schema(pool: &SqlitePool) -> Result<()> {
    create_schema_version_table(pool).await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS app_state (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS sessions (
            id TEXT PRIMARY KEY,
            start_time TEXT NOT NULL,
            end_time TEXT,
            duration_seconds INTEGER NOT NULL,
            mode_switch_count INTEGER NOT NULL DEFAULT 0,
            ai_interaction_count INTEGER NOT NULL DEFAULT 0,
            operation_logs TEXT NOT NULL DEFAULT '[]'
        )
        "#,
    )
    .execute(pool)
    .await?;

    ensure_schema_version(pool).await
}

/// Create the binary tier schema (idempotent)
pub async fn init_audio_schema(pool: &SqlitePool) -> Result<()> {
    create_schema_version_table(pool).await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS audio_blobs (
            track_id TEXT PRIMARY KEY,
            data BLOB NOT NULL,
            size INTEGER NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    ensure_schema_version(pool).await
}

async fn create_schema_version_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

async fn ensure_schema_version(pool: &SqlitePool) -> Result<()> {
    let version: Option<i32> =
        sqlx::query_scalar("SELECT version FROM schema_version ORDER BY version DESC LIMIT 1")
            .fetch_optional(pool)
            .await?;

    match version {
        Some(v) if v >= CURRENT_SCHEMA_VERSION => Ok(()),
        _ => {
            sqlx::query("INSERT OR IGNORE INTO schema_version (version) VALUES (?)")
                .bind(CURRENT_SCHEMA_VERSION)
                .execute(pool)
                .await?;
            info!("Schema initialized at v{}", CURRENT_SCHEMA_VERSION);
            Ok(())
        }
    }
}
