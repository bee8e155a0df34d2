//! Engine assembly
//!
//! Opens the two storage tiers under a root folder, wires the state store
//! and event bus together, and runs the startup sequence: rehydrate,
//! restore audio references, report pending migrations. A binary-store
//! failure degrades the engine to "no local audio persistence" instead of
//! failing the open.

use crate::db::audio::AudioStore;
use crate::db::init::{init_metadata_schema, open_database};
use crate::db::metadata::MetadataStore;
use crate::store::SessionStore;
use mdj_common::{EventBus, Result, SessionEvent, Tuning};
use std::path::Path;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Metadata tier database file name
const STATE_DB: &str = "state.db";
/// Binary tier database file name
const AUDIO_DB: &str = "audio.db";

/// The assembled session engine
pub struct SessionEngine {
    pub store: Arc<SessionStore>,
    pub audio: Option<Arc<AudioStore>>,
    pub bus: EventBus,
    tuning: Tuning,
}

impl SessionEngine {
    /// Open the engine under `root_folder`.
    ///
    /// The metadata tier is required; the binary tier is opened with retry
    /// and its unavailability only disables local audio for this session.
    pub async fn open(root_folder: &Path, tuning: Tuning) -> Result<Self> {
        std::fs::create_dir_all(root_folder)?;
        info!("Opening session engine in {}", root_folder.display());

        let meta_pool = open_database(&root_folder.join(STATE_DB), &tuning).await?;
        init_metadata_schema(&meta_pool).await?;
        let meta = MetadataStore::new(meta_pool);

        let audio = match AudioStore::open(&root_folder.join(AUDIO_DB), tuning.clone()).await {
            Ok(store) => Some(Arc::new(store)),
            Err(e) => {
                error!("Binary audio store unavailable: {}", e);
                None
            }
        };

        let bus = EventBus::new(tuning.event_bus_capacity);
        let store = SessionStore::new(meta, audio.clone(), bus.clone(), tuning.clone());

        if audio.is_none() {
            store.set_storage_error(
                "local audio persistence is disabled for this session".to_string(),
            );
        }

        store.rehydrate().await;

        let pending = store.pending_migration_count().await;
        if pending > 0 {
            info!("{} track(s) pending legacy audio migration", pending);
        }

        Ok(Self {
            store,
            audio,
            bus,
            tuning,
        })
    }

    /// Spawn the background quota monitor, which recomputes usage on a
    /// fixed interval and broadcasts it for UI display. Returns `None`
    /// when the binary store is unavailable.
    pub fn spawn_quota_monitor(&self) -> Option<JoinHandle<()>> {
        let audio = self.audio.clone()?;
        let bus = self.bus.clone();
        let period = std::time::Duration::from_secs(self.tuning.quota_refresh_secs.max(1));

        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            // The immediate first tick would duplicate the open-time report
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let quota = audio.quota().await;
                if quota.total_bytes == 0 {
                    warn!("Quota monitor could not compute usage");
                }
                bus.emit(SessionEvent::QuotaChanged { quota });
            }
        }))
    }

    pub fn tuning(&self) -> &Tuning {
        &self.tuning
    }
}

impl std::fmt::Debug for SessionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionEngine")
            .field("audio_available", &self.audio.is_some())
            .finish()
    }
}
