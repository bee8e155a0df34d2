//! Magic DJ session engine - maintenance entry point
//!
//! Opens the engine's local data folder, reports storage and migration
//! status, and optionally runs the legacy audio migration. The console UI
//! embeds the library; this binary exists for headless inspection and
//! repair of a root folder.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use mdj_common::config;
use mdj_session::SessionEngine;

/// Command-line arguments for mdj-session
#[derive(Parser, Debug)]
#[command(name = "mdj-session")]
#[command(about = "Magic DJ session engine maintenance tool")]
#[command(version)]
struct Args {
    /// Root folder containing the engine databases
    #[arg(short, long, env = "MDJ_ROOT_FOLDER")]
    root_folder: Option<PathBuf>,

    /// Config file to load tuning from
    #[arg(short, long, env = "MDJ_CONFIG")]
    config: Option<PathBuf>,

    /// Run the legacy audio migration instead of only reporting it
    #[arg(long)]
    migrate: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mdj_session=info,mdj_common=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    let tuning = match config::load_config_file(args.config.as_deref()) {
        Ok(file) => file.tuning,
        Err(e) => {
            if args.config.is_some() {
                // An explicitly named file must exist
                return Err(anyhow::anyhow!("{}", e));
            }
            info!("No config file loaded ({}); using defaults", e);
            mdj_common::Tuning::default()
        }
    };

    let root_folder = config::resolve_root_folder(args.root_folder.as_deref(), "MDJ_ROOT_FOLDER");
    info!("Root folder: {}", root_folder.display());

    let engine = SessionEngine::open(&root_folder, tuning)
        .await
        .context("Failed to open session engine")?;

    let state = engine.store.snapshot();
    info!("{} track(s) in library", state.persisted.tracks.len());

    if let Some(error) = engine.store.storage_error() {
        warn!("Storage degraded: {}", error);
    }

    if let Some(audio) = &engine.audio {
        let quota = audio.quota().await;
        info!(
            "Storage: {} / {} bytes ({:.1}%, {:?})",
            quota.used_bytes, quota.total_bytes, quota.percentage, quota.level
        );
    }

    let pending = engine.store.pending_migration_count().await;
    if pending == 0 {
        info!("No legacy audio payloads pending migration");
        return Ok(());
    }

    if !args.migrate {
        info!(
            "{} track(s) pending legacy audio migration (run with --migrate)",
            pending
        );
        return Ok(());
    }

    let report = engine.store.migrate_legacy_audio().await;
    info!(
        "Migration: {} migrated, {} bytes moved",
        report.migrated_count, report.total_size_bytes
    );
    for failure in &report.errors {
        warn!("  {} failed: {}", failure.track_id, failure.error);
    }

    Ok(())
}
