//! Track configuration export/import
//!
//! User-facing, versioned track-config files. Export embeds locally stored
//! audio as inline base64 so the file is self-contained; import validates
//! the whole file before touching any state (all-or-nothing, unlike the
//! per-track migration batch).

use crate::store::types::Track;
use crate::store::SessionStore;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chrono::{DateTime, Utc};
use mdj_common::{Error, Result, SessionEvent};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// The only file format version this build reads or writes
pub const TRACK_CONFIG_VERSION: &str = "1.0";

/// Exported track-config file
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackConfigFile {
    pub version: String,
    pub exported_at: DateTime<Utc>,
    pub tracks: Vec<Track>,
}

/// Validate and parse a track-config file.
///
/// Rejection happens before any state mutation: wrong `version`, a
/// non-array `tracks`, or any track missing string `id`/`name`/`type`
/// fails the whole file with `Validation`.
pub fn parse_track_config(json: &str) -> Result<TrackConfigFile> {
    let value: serde_json::Value = serde_json::from_str(json)
        .map_err(|e| Error::Validation(format!("not valid JSON: {}", e)))?;

    match value.get("version").and_then(|v| v.as_str()) {
        Some(TRACK_CONFIG_VERSION) => {}
        Some(other) => {
            return Err(Error::Validation(format!(
                "unsupported config version: {}",
                other
            )));
        }
        None => return Err(Error::Validation("missing config version".to_string())),
    }

    let tracks = value
        .get("tracks")
        .and_then(|t| t.as_array())
        .ok_or_else(|| Error::Validation("tracks must be an array".to_string()))?;

    for (index, track) in tracks.iter().enumerate() {
        for field in ["id", "name", "type"] {
            if track.get(field).and_then(|f| f.as_str()).is_none() {
                return Err(Error::Validation(format!(
                    "track {} is missing string field '{}'",
                    index, field
                )));
            }
        }
    }

    serde_json::from_value(value).map_err(|e| Error::Validation(format!("malformed track: {}", e)))
}

impl SessionStore {
    /// Export the track library as a self-contained config file.
    ///
    /// Tracks with locally stored audio are embedded as inline base64;
    /// ephemeral references are never exported.
    pub async fn export_track_config(&self) -> TrackConfigFile {
        let mut tracks = self.snapshot().persisted.tracks;

        for track in tracks.iter_mut() {
            if track.has_local_audio && track.audio_data.is_none() {
                if let Some(audio) = &self.audio {
                    match audio.get(&track.id).await {
                        Ok(Some(bytes)) => {
                            track.audio_data = Some(BASE64.encode(&bytes));
                        }
                        Ok(None) => {
                            warn!("Track {} claims local audio but has none", track.id)
                        }
                        Err(e) => warn!("Could not embed audio for {}: {}", track.id, e),
                    }
                }
            }
            track.url = String::new();
        }

        TrackConfigFile {
            version: TRACK_CONFIG_VERSION.to_string(),
            exported_at: mdj_common::time::now(),
            tracks,
        }
    }

    /// Import a parsed config file into the track library.
    ///
    /// Inline payloads become playable ephemeral references immediately but
    /// are NOT written to the binary store; the next migration check picks
    /// them up. Returns the number of imported tracks.
    pub fn import_track_config(&self, file: TrackConfigFile) -> usize {
        let mut imported = 0usize;
        let mut track_ids = Vec::new();

        {
            for mut track in file.tracks {
                track.url = String::new();
                track.has_local_audio = false;

                if let (Some(payload), Some(audio)) = (&track.audio_data, &self.audio) {
                    match BASE64.decode(payload.as_bytes()) {
                        Ok(bytes) => {
                            track.url = audio.mint_url(&track.id, bytes);
                        }
                        Err(e) => {
                            warn!("Imported track {} has undecodable audio: {}", track.id, e)
                        }
                    }
                }

                track_ids.push(track.id.clone());
                self.with_state(|st| {
                    match st
                        .persisted
                        .tracks
                        .iter_mut()
                        .find(|t| t.id == track.id)
                    {
                        Some(existing) => *existing = track.clone(),
                        None => st.persisted.tracks.push(track.clone()),
                    }
                });
                imported += 1;
            }
        }

        info!("Imported {} track(s) from config file", imported);
        for track_id in track_ids {
            self.event_bus().emit(SessionEvent::TrackAdded { track_id });
        }
        self.spawn_persist();
        imported
    }
}
