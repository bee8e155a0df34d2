//! Legacy audio migration
//!
//! The previous storage generation kept track audio inline in the metadata
//! snapshot as base64 text, paying ~33% size inflation and the metadata
//! tier's per-entry ceiling. This module moves those payloads into the
//! binary store, one track at a time: a failed track is recorded and the
//! batch continues, so re-running after a partial failure only touches
//! what is still pending.

use crate::store::SessionStore;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use mdj_common::SessionEvent;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Migration lifecycle, surfaced through the state store
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MigrationPhase {
    #[default]
    Idle,
    Migrating,
    /// Every pending track migrated (or nothing was pending); does not
    /// re-trigger automatically
    Success,
    /// Some tracks migrated, some failed; re-enterable on user retry
    PartialFailure,
    /// Nothing migrated; re-enterable on user retry
    Failed,
}

/// One per-track migration failure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationError {
    pub track_id: String,
    pub error: String,
}

/// Outcome of one migration run. Partial success is representable: both
/// the success count and the per-track failures are carried together.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationReport {
    pub migrated_count: usize,
    pub total_size_bytes: u64,
    pub errors: Vec<MigrationError>,
}

impl MigrationReport {
    /// Phase this run ended in
    pub fn phase(&self) -> MigrationPhase {
        if self.errors.is_empty() {
            MigrationPhase::Success
        } else if self.migrated_count > 0 {
            MigrationPhase::PartialFailure
        } else {
            MigrationPhase::Failed
        }
    }
}

impl SessionStore {
    /// Number of tracks still carrying a legacy inline payload with no
    /// corresponding binary-store entry. Read-only; cheap enough to call
    /// on every load.
    pub async fn pending_migration_count(&self) -> usize {
        let candidates: Vec<String> = {
            let st = self.snapshot();
            st.persisted
                .tracks
                .iter()
                .filter(|t| t.audio_data.is_some())
                .map(|t| t.id.clone())
                .collect()
        };
        if candidates.is_empty() {
            return 0;
        }

        let Some(audio) = &self.audio else {
            // Binary store down: everything with a payload is still pending
            return candidates.len();
        };

        let mut pending = 0usize;
        for id in &candidates {
            // A failed existence probe counts as pending (conservative)
            if !audio.contains(id).await.unwrap_or(false) {
                pending += 1;
            }
        }
        pending
    }

    /// Move every pending inline payload into the binary store.
    ///
    /// Per-track failures accumulate in the report while the batch
    /// continues; tracks whose blob already exists (a crash between save
    /// and snapshot write) are repaired by clearing the payload without
    /// being re-decoded or counted as migrated.
    pub async fn migrate_legacy_audio(&self) -> MigrationReport {
        let pending: Vec<(String, String)> = {
            let st = self.snapshot();
            st.persisted
                .tracks
                .iter()
                .filter_map(|t| t.audio_data.clone().map(|data| (t.id.clone(), data)))
                .collect()
        };

        let mut report = MigrationReport::default();

        if pending.is_empty() {
            self.with_state(|st| st.migration_phase = MigrationPhase::Success);
            return report;
        }

        let Some(audio) = self.audio.clone() else {
            warn!("Cannot migrate legacy audio: binary store unavailable");
            for (track_id, _) in &pending {
                report.errors.push(MigrationError {
                    track_id: track_id.clone(),
                    error: "binary store unavailable".to_string(),
                });
            }
            self.with_state(|st| st.migration_phase = MigrationPhase::Failed);
            return report;
        };

        info!("Migrating {} legacy audio payload(s)", pending.len());
        self.with_state(|st| st.migration_phase = MigrationPhase::Migrating);

        let mut repaired = 0usize;
        for (track_id, payload) in pending {
            // Crash-repair path: the blob landed on a previous run but the
            // cleaned snapshot never did
            match audio.contains(&track_id).await {
                Ok(true) => {
                    self.finish_track_migration(&audio, &track_id).await;
                    repaired += 1;
                    continue;
                }
                Ok(false) => {}
                Err(e) => {
                    report.errors.push(MigrationError {
                        track_id,
                        error: e.to_string(),
                    });
                    continue;
                }
            }

            let bytes = match BASE64.decode(payload.as_bytes()) {
                Ok(bytes) => bytes,
                Err(e) => {
                    warn!("Track {} has a corrupt inline payload: {}", track_id, e);
                    report.errors.push(MigrationError {
                        track_id,
                        error: format!("corrupt inline payload: {}", e),
                    });
                    continue;
                }
            };

            if let Err(e) = audio.save(&track_id, &bytes).await {
                warn!("Failed to migrate track {}: {}", track_id, e);
                report.errors.push(MigrationError {
                    track_id,
                    error: e.to_string(),
                });
                continue;
            }

            self.finish_track_migration(&audio, &track_id).await;
            report.migrated_count += 1;
            report.total_size_bytes += bytes.len() as u64;
        }

        if repaired > 0 {
            info!("Repaired {} previously interrupted migration(s)", repaired);
        }

        let phase = report.phase();
        self.with_state(|st| st.migration_phase = phase);

        // One snapshot write for the whole batch; a failure here leaves the
        // payloads in place and the next run repairs via the blob check
        if let Err(e) = self.persist().await {
            warn!("Failed to persist migrated snapshot: {}", e);
        } else if phase == MigrationPhase::Success {
            // The legacy-generation snapshot is no longer needed
            if let Err(e) = self.meta.remove(crate::db::metadata::LEGACY_STATE_KEY).await {
                warn!("Failed to drop legacy snapshot: {}", e);
            }
        }

        info!(
            "Migration finished: {} migrated, {} failed ({} bytes moved)",
            report.migrated_count,
            report.errors.len(),
            report.total_size_bytes
        );
        self.event_bus().emit(SessionEvent::MigrationCompleted {
            migrated_count: report.migrated_count,
            error_count: report.errors.len(),
        });

        report
    }

    /// Mark one track as migrated: clear the inline payload and mint a
    /// playable reference for the stored bytes
    async fn finish_track_migration(&self, audio: &crate::db::audio::AudioStore, track_id: &str) {
        let url = match audio.get(track_id).await {
            Ok(Some(bytes)) => Some(audio.mint_url(track_id, bytes)),
            _ => None,
        };
        self.with_state(|st| {
            if let Some(track) = st.persisted.tracks.iter_mut().find(|t| t.id == track_id) {
                track.audio_data = None;
                track.has_local_audio = true;
                if let Some(url) = url {
                    track.url = url;
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_phase_success() {
        let report = MigrationReport {
            migrated_count: 3,
            total_size_bytes: 300,
            errors: vec![],
        };
        assert_eq!(report.phase(), MigrationPhase::Success);
    }

    #[test]
    fn test_report_phase_partial() {
        let report = MigrationReport {
            migrated_count: 2,
            total_size_bytes: 200,
            errors: vec![MigrationError {
                track_id: "bad".to_string(),
                error: "corrupt".to_string(),
            }],
        };
        assert_eq!(report.phase(), MigrationPhase::PartialFailure);
    }

    #[test]
    fn test_report_phase_failed() {
        let report = MigrationReport {
            migrated_count: 0,
            total_size_bytes: 0,
            errors: vec![MigrationError {
                track_id: "bad".to_string(),
                error: "corrupt".to_string(),
            }],
        };
        assert_eq!(report.phase(), MigrationPhase::Failed);
    }

    #[test]
    fn test_empty_run_is_success() {
        assert_eq!(MigrationReport::default().phase(), MigrationPhase::Success);
    }
}
