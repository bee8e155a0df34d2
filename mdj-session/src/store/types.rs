//! Session model types
//!
//! The canonical data model owned by the session store, plus the persisted
//! snapshot shape. Persisted JSON uses camelCase keys for compatibility
//! with the console's existing saved data, and every snapshot field carries
//! a serde default so a snapshot written by an older build rehydrates
//! field-by-field instead of being wholesale-overwritten.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What a track is used for during a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TrackKind {
    Intro,
    Transition,
    Effect,
    Song,
    Filler,
    Rescue,
}

/// Where a track's audio came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TrackSource {
    /// Synthesized by the TTS pipeline; bytes live in the binary store
    TtsGenerated,
    /// Uploaded by the user; the binary store is the only durable home
    UserUploaded,
    /// Shipped with the console as a static asset path
    Builtin,
}

fn default_volume() -> f32 {
    1.0
}

/// A named audio asset playable in a session.
///
/// `url` is an ephemeral, session-local playable reference and is never
/// persisted (except verbatim static builtin asset paths). `audio_data` is
/// the legacy inline base64 payload that only pre-migration snapshots still
/// carry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Track {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: TrackKind,
    pub source: TrackSource,
    #[serde(default)]
    pub hotkey: Option<String>,
    #[serde(default, rename = "loop")]
    pub looped: bool,
    #[serde(default)]
    pub text_content: Option<String>,
    #[serde(default = "default_volume")]
    pub volume: f32,
    #[serde(default)]
    pub duration_secs: Option<f64>,
    /// True iff binary content exists for this id in the audio store
    #[serde(default)]
    pub has_local_audio: bool,
    #[serde(default)]
    pub url: String,
    /// Legacy inline base64 audio, cleared by migration
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_data: Option<String>,
}

impl Track {
    /// Minimal constructor used by tests and importers
    pub fn new(id: impl Into<String>, name: impl Into<String>, kind: TrackKind, source: TrackSource) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            kind,
            source,
            hotkey: None,
            looped: false,
            text_content: None,
            volume: default_volume(),
            duration_secs: None,
            has_local_audio: false,
            url: String::new(),
            audio_data: None,
        }
    }
}

/// Playback channels of the console
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelType {
    Music,
    Voice,
    Effects,
}

impl ChannelType {
    pub const ALL: [ChannelType; 3] = [ChannelType::Music, ChannelType::Voice, ChannelType::Effects];

    pub fn as_str(self) -> &'static str {
        match self {
            ChannelType::Music => "music",
            ChannelType::Voice => "voice",
            ChannelType::Effects => "effects",
        }
    }
}

/// One value per channel, with exhaustive typed access.
///
/// Replaces a free-form string-keyed dictionary: adding a channel variant
/// forces every access site to handle it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", bound(deserialize = "T: serde::de::DeserializeOwned + Default"))]
pub struct ChannelMap<T> {
    #[serde(default)]
    pub music: T,
    #[serde(default)]
    pub voice: T,
    #[serde(default)]
    pub effects: T,
}

impl<T> ChannelMap<T> {
    pub fn get(&self, channel: ChannelType) -> &T {
        match channel {
            ChannelType::Music => &self.music,
            ChannelType::Voice => &self.voice,
            ChannelType::Effects => &self.effects,
        }
    }

    pub fn get_mut(&mut self, channel: ChannelType) -> &mut T {
        match channel {
            ChannelType::Music => &mut self.music,
            ChannelType::Voice => &mut self.voice,
            ChannelType::Effects => &mut self.effects,
        }
    }
}

/// An entry in a channel queue, referencing a track by id (weak reference)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueItem {
    pub id: String,
    pub track_id: String,
}

/// Per-channel playback state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ChannelState {
    /// Index of the current queue item, -1 when none
    pub current_index: i64,
    pub volume: f32,
    pub is_muted: bool,
}

impl Default for ChannelState {
    fn default() -> Self {
        Self {
            current_index: -1,
            volume: 1.0,
            is_muted: false,
        }
    }
}

/// Cue item lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CueStatus {
    Pending,
    Playing,
    Done,
}

/// An entry in the cue list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CueItem {
    pub id: String,
    pub track_id: String,
    pub order: u32,
    pub status: CueStatus,
}

/// Ordered, position-tracked sequence of queued tracks for sequential
/// playback. `current_position` is -1 when nothing is cued.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CueList {
    #[serde(default)]
    pub items: Vec<CueItem>,
    #[serde(default = "default_cue_position")]
    pub current_position: i64,
}

fn default_cue_position() -> i64 {
    -1
}

impl Default for CueList {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            current_position: -1,
        }
    }
}

/// DJ console settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DjSettings {
    /// Advance the cue list automatically when a track finishes
    pub auto_advance: bool,
    pub crossfade_ms: u64,
    /// Music volume while the voice channel is active (0..1)
    pub duck_volume: f32,
    pub voice_persona: String,
}

impl Default for DjSettings {
    fn default() -> Self {
        Self {
            auto_advance: true,
            crossfade_ms: 250,
            duck_volume: 0.3,
            voice_persona: "dj".to_string(),
        }
    }
}

/// Partial settings update; `None` fields are left unchanged (shallow merge)
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DjSettingsPatch {
    pub auto_advance: Option<bool>,
    pub crossfade_ms: Option<u64>,
    pub duck_volume: Option<f32>,
    pub voice_persona: Option<String>,
}

impl DjSettings {
    pub fn apply(&mut self, patch: DjSettingsPatch) {
        if let Some(v) = patch.auto_advance {
            self.auto_advance = v;
        }
        if let Some(v) = patch.crossfade_ms {
            self.crossfade_ms = v;
        }
        if let Some(v) = patch.duck_volume {
            self.duck_volume = v.clamp(0.0, 1.0);
        }
        if let Some(v) = patch.voice_persona {
            self.voice_persona = v;
        }
    }
}

/// One logged control action inside a session record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationLogEntry {
    pub timestamp: DateTime<Utc>,
    pub operation: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub track_id: Option<String>,
}

/// Record of one live session. One active record at a time; closed on stop
/// with a frozen duration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub id: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub duration_seconds: u64,
    #[serde(default)]
    pub operation_logs: Vec<OperationLogEntry>,
    #[serde(default)]
    pub mode_switch_count: u32,
    #[serde(default)]
    pub ai_interaction_count: u32,
}

impl SessionRecord {
    pub fn start(now: DateTime<Utc>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            start_time: now,
            end_time: None,
            duration_seconds: 0,
            operation_logs: Vec::new(),
            mode_switch_count: 0,
            ai_interaction_count: 0,
        }
    }

    /// Elapsed seconds recomputed from wall clock (no increment drift)
    pub fn elapsed_seconds(&self, now: DateTime<Utc>) -> u64 {
        (now - self.start_time).num_seconds().max(0) as u64
    }
}

/// The snapshot written to the metadata tier under the versioned state key.
///
/// Every field defaults, so rehydration merges field-by-field: a snapshot
/// missing a newly introduced field receives that field's default.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PersistedState {
    pub settings: DjSettings,
    pub master_volume: f32,
    pub tracks: Vec<Track>,
    pub channel_queues: ChannelMap<Vec<QueueItem>>,
    pub channel_states: ChannelMap<ChannelState>,
    pub cue_list: CueList,
}

impl Default for PersistedState {
    fn default() -> Self {
        Self {
            settings: DjSettings::default(),
            master_volume: 0.8,
            tracks: Vec::new(),
            channel_queues: ChannelMap::default(),
            channel_states: ChannelMap::default(),
            cue_list: CueList::default(),
        }
    }
}
