//! Session/track state store
//!
//! Canonical in-memory model behind an injectable instance: no ambient
//! global. Mutators are synchronous and always succeed in memory; the
//! persistence side effect is a separate operation (`persist` to await,
//! `spawn_persist` to fire and forget) whose failures land in the
//! `storage_error` field instead of being thrown out of a mutator.
//!
//! Operations against the same track id apply in submission order because
//! the synchronous mutation always happens before the async side effect is
//! scheduled.

pub mod types;

use crate::db::audio::{AudioStore, EPHEMERAL_URL_SCHEME};
use crate::db::metadata::{MetadataStore, LEGACY_STATE_KEY, STATE_KEY};
use crate::migration::MigrationPhase;
use crate::ops::{OperationKind, OperationQueue, PendingOperation};
use mdj_common::{Error, EventBus, Result, SessionEvent, Tuning};
use std::sync::{Arc, Mutex, RwLock, Weak};
use tracing::{debug, info, warn};
use types::*;
use uuid::Uuid;

/// Everything the store knows, cloneable for snapshots.
///
/// `persisted` is the part written to the metadata tier; the rest is
/// runtime-only.
#[derive(Debug, Clone, Default)]
pub struct SessionState {
    pub persisted: PersistedState,
    pub active_session: Option<SessionRecord>,
    pub migration_phase: MigrationPhase,
    pub storage_error: Option<String>,
}

/// The session/track state store
pub struct SessionStore {
    state: RwLock<SessionState>,
    pub(crate) meta: MetadataStore,
    pub(crate) audio: Option<Arc<AudioStore>>,
    bus: EventBus,
    ops: Mutex<OperationQueue>,
    pub(crate) tuning: Tuning,
    /// Self-reference for scheduling background side effects from
    /// synchronous mutators
    weak: Weak<SessionStore>,
}

impl SessionStore {
    pub fn new(
        meta: MetadataStore,
        audio: Option<Arc<AudioStore>>,
        bus: EventBus,
        tuning: Tuning,
    ) -> Arc<Self> {
        let window = mdj_common::time::millis_to_duration(tuning.debounce_window_ms);
        Arc::new_cyclic(|weak| Self {
            state: RwLock::new(SessionState::default()),
            meta,
            audio,
            bus,
            ops: Mutex::new(OperationQueue::new(window)),
            tuning,
            weak: weak.clone(),
        })
    }

    /// Clone of the full current state
    pub fn snapshot(&self) -> SessionState {
        self.state.read().unwrap().clone()
    }

    /// Subscribe to state-change events
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<SessionEvent> {
        self.bus.subscribe()
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.bus
    }

    /// Last persistence failure, if any
    pub fn storage_error(&self) -> Option<String> {
        self.state.read().unwrap().storage_error.clone()
    }

    pub(crate) fn set_storage_error(&self, error: String) {
        warn!("Storage degraded: {}", error);
        self.state.write().unwrap().storage_error = Some(error.clone());
        self.bus.emit(SessionEvent::StorageDegraded { error });
    }

    pub(crate) fn with_state<R>(&self, f: impl FnOnce(&mut SessionState) -> R) -> R {
        f(&mut self.state.write().unwrap())
    }

    // ==================================================================
    // Rehydration
    // ==================================================================

    /// Load the persisted snapshot and restore playable audio references.
    ///
    /// Persistence failures degrade (compiled-in defaults + `storage_error`)
    /// instead of failing the caller; a missing current-format snapshot
    /// falls back to the previous storage generation.
    pub async fn rehydrate(&self) {
        let raw = match self.meta.get(STATE_KEY).await {
            Ok(Some(json)) => Some(json),
            Ok(None) => match self.meta.get(LEGACY_STATE_KEY).await {
                Ok(found) => {
                    if found.is_some() {
                        info!("No current snapshot; rehydrating from legacy key");
                    }
                    found
                }
                Err(e) => {
                    self.set_storage_error(format!("failed to load state: {}", e));
                    None
                }
            },
            Err(e) => {
                self.set_storage_error(format!("failed to load state: {}", e));
                None
            }
        };

        if let Some(json) = raw {
            match serde_json::from_str::<PersistedState>(&json) {
                Ok(persisted) => {
                    let tracks = persisted.tracks.len();
                    self.state.write().unwrap().persisted = persisted;
                    info!("Rehydrated state ({} tracks)", tracks);
                }
                Err(e) => {
                    // Keep compiled-in defaults; the bad snapshot stays on
                    // disk for manual inspection
                    self.set_storage_error(format!("corrupt state snapshot: {}", e));
                }
            }
        }

        self.restore_local_audio().await;
    }

    /// Restore ephemeral references for every track that claims local
    /// audio, demoting tracks whose blob is gone (ghosts).
    pub async fn restore_local_audio(&self) {
        let ids: Vec<String> = {
            let st = self.state.read().unwrap();
            st.persisted
                .tracks
                .iter()
                .filter(|t| t.has_local_audio)
                .map(|t| t.id.clone())
                .collect()
        };
        if ids.is_empty() {
            return;
        }

        let Some(audio) = &self.audio else {
            // No binary store this session: everything claiming local
            // audio is unplayable and must not pretend otherwise
            let mut st = self.state.write().unwrap();
            for track in st.persisted.tracks.iter_mut().filter(|t| t.has_local_audio) {
                track.has_local_audio = false;
                track.url = String::new();
            }
            warn!("Binary store unavailable; demoted {} track(s)", ids.len());
            return;
        };

        let found = match audio.get_multiple(&ids).await {
            Ok(found) => found,
            Err(e) => {
                // Driver failure is not a miss; leave metadata untouched
                self.set_storage_error(format!("failed to restore audio: {}", e));
                return;
            }
        };

        let mut ghosts = 0usize;
        {
            let mut st = self.state.write().unwrap();
            for track in st.persisted.tracks.iter_mut() {
                if !track.has_local_audio {
                    continue;
                }
                match found.get(&track.id) {
                    Some(bytes) => {
                        track.url = audio.mint_url(&track.id, bytes.clone());
                    }
                    None => {
                        track.has_local_audio = false;
                        track.url = String::new();
                        ghosts += 1;
                    }
                }
            }
        }
        if ghosts > 0 {
            warn!("Demoted {} ghost track(s) with missing audio", ghosts);
        }
        debug!("Restored {} audio reference(s)", found.len());
    }

    // ==================================================================
    // Persistence boundary
    // ==================================================================

    /// Write the persisted part of the state to the metadata tier.
    ///
    /// Ephemeral references are never written: `url` is persisted as ""
    /// except for verbatim static builtin asset paths.
    pub async fn persist(&self) -> Result<()> {
        let snapshot = {
            let st = self.state.read().unwrap();
            let mut persisted = st.persisted.clone();
            for track in persisted.tracks.iter_mut() {
                track.url = persistable_url(track);
            }
            persisted
        };

        let json = serde_json::to_string(&snapshot)
            .map_err(|e| Error::Internal(format!("state serialization: {}", e)))?;

        match self.meta.set(STATE_KEY, &json).await {
            Ok(()) => {
                self.state.write().unwrap().storage_error = None;
                Ok(())
            }
            Err(e) => {
                self.set_storage_error(format!("failed to persist state: {}", e));
                Err(e)
            }
        }
    }

    /// Fire-and-forget persistence; failures are recorded in
    /// `storage_error` and never reach the caller.
    pub fn spawn_persist(&self) {
        let Some(store) = self.weak.upgrade() else {
            return;
        };
        tokio::spawn(async move {
            // persist() already records the failure
            let _ = store.persist().await;
        });
    }

    // ==================================================================
    // Track CRUD (synchronous mutators)
    // ==================================================================

    /// Add a track (or replace one with the same id)
    pub fn add_track(&self, track: Track) {
        let track_id = track.id.clone();
        {
            let mut st = self.state.write().unwrap();
            match st.persisted.tracks.iter_mut().find(|t| t.id == track.id) {
                Some(existing) => *existing = track,
                None => st.persisted.tracks.push(track),
            }
        }
        self.bus.emit(SessionEvent::TrackAdded { track_id });
        self.spawn_persist();
    }

    /// Replace a track's metadata by id. Returns false when absent.
    pub fn update_track(&self, track: Track) -> bool {
        let track_id = track.id.clone();
        let updated = {
            let mut st = self.state.write().unwrap();
            match st.persisted.tracks.iter_mut().find(|t| t.id == track.id) {
                Some(existing) => {
                    *existing = track;
                    true
                }
                None => false,
            }
        };
        if updated {
            self.bus.emit(SessionEvent::TrackUpdated { track_id });
            self.spawn_persist();
        }
        updated
    }

    pub fn get_track(&self, track_id: &str) -> Option<Track> {
        self.state
            .read()
            .unwrap()
            .persisted
            .tracks
            .iter()
            .find(|t| t.id == track_id)
            .cloned()
    }

    /// Remove a track.
    ///
    /// Completes synchronously in memory (including purging queue and cue
    /// references); the binary deletion and reference revocation run in the
    /// background, and their failure never blocks the metadata removal.
    pub fn remove_track(&self, track_id: &str) -> bool {
        let removed = {
            let mut st = self.state.write().unwrap();
            let before = st.persisted.tracks.len();
            st.persisted.tracks.retain(|t| t.id != track_id);
            let removed = st.persisted.tracks.len() < before;
            if removed {
                purge_track_refs(&mut st.persisted, track_id);
            }
            removed
        };

        if !removed {
            return false;
        }

        self.bus.emit(SessionEvent::TrackRemoved {
            track_id: track_id.to_string(),
        });

        if let Some(audio) = self.audio.clone() {
            let id = track_id.to_string();
            let bus = self.bus.clone();
            tokio::spawn(async move {
                if let Err(e) = audio.delete(&id).await {
                    // Metadata removal already happened; log and continue
                    warn!("Background audio delete for {} failed: {}", id, e);
                }
                bus.emit(SessionEvent::QuotaChanged {
                    quota: audio.quota().await,
                });
            });
        }
        self.spawn_persist();
        true
    }

    /// Save audio bytes for an existing track and make it playable.
    ///
    /// Unlike the synchronous mutators this suspends on the binary store;
    /// quota and write errors surface to the caller untouched (no hidden
    /// retry).
    pub async fn attach_track_audio(&self, track_id: &str, bytes: Vec<u8>) -> Result<()> {
        if self.get_track(track_id).is_none() {
            return Err(Error::NotFound(format!("track {}", track_id)));
        }
        let Some(audio) = &self.audio else {
            return Err(Error::StorageUnavailable(
                "local audio persistence is disabled".to_string(),
            ));
        };

        audio.save(track_id, &bytes).await?;
        let url = audio.mint_url(track_id, bytes);

        {
            let mut st = self.state.write().unwrap();
            if let Some(track) = st.persisted.tracks.iter_mut().find(|t| t.id == track_id) {
                track.has_local_audio = true;
                track.url = url;
                track.audio_data = None;
            }
        }

        self.bus.emit(SessionEvent::TrackUpdated {
            track_id: track_id.to_string(),
        });
        self.bus.emit(SessionEvent::QuotaChanged {
            quota: audio.quota().await,
        });
        self.spawn_persist();
        Ok(())
    }

    // ==================================================================
    // Channel queues
    // ==================================================================

    /// Append a track reference to a channel queue, returning the item id
    pub fn enqueue(&self, channel: ChannelType, track_id: &str) -> String {
        let item_id = Uuid::new_v4().to_string();
        {
            let mut st = self.state.write().unwrap();
            st.persisted.channel_queues.get_mut(channel).push(QueueItem {
                id: item_id.clone(),
                track_id: track_id.to_string(),
            });
        }
        self.emit_queue_changed(channel);
        self.spawn_persist();
        item_id
    }

    /// Remove a queue item by id, keeping the channel cursor on the same
    /// logical item
    pub fn remove_queue_item(&self, channel: ChannelType, item_id: &str) -> bool {
        let removed = {
            let mut st = self.state.write().unwrap();
            let queue = st.persisted.channel_queues.get_mut(channel);
            match queue.iter().position(|q| q.id == item_id) {
                Some(index) => {
                    queue.remove(index);
                    let new_len = queue.len();
                    let chan = st.persisted.channel_states.get_mut(channel);
                    chan.current_index =
                        cursor_after_remove(chan.current_index, index, new_len);
                    true
                }
                None => false,
            }
        };
        if removed {
            self.emit_queue_changed(channel);
            self.spawn_persist();
        }
        removed
    }

    /// Splice-and-reinsert reorder of a channel queue
    pub fn reorder_queue(&self, channel: ChannelType, from: usize, to: usize) -> bool {
        let moved = {
            let mut st = self.state.write().unwrap();
            let queue = st.persisted.channel_queues.get_mut(channel);
            if from >= queue.len() {
                false
            } else {
                let item = queue.remove(from);
                let to = to.min(queue.len());
                queue.insert(to, item);
                let chan = st.persisted.channel_states.get_mut(channel);
                chan.current_index = cursor_after_reorder(chan.current_index, from, to);
                true
            }
        };
        if moved {
            self.emit_queue_changed(channel);
            self.spawn_persist();
        }
        moved
    }

    /// Point a channel at a queue index (-1 for none). Out-of-range
    /// indexes clamp to the queue bounds.
    pub fn set_channel_index(&self, channel: ChannelType, index: i64) {
        {
            let mut st = self.state.write().unwrap();
            let len = st.persisted.channel_queues.get(channel).len() as i64;
            let chan = st.persisted.channel_states.get_mut(channel);
            chan.current_index = index.clamp(-1, (len - 1).max(-1));
        }
        self.emit_queue_changed(channel);
        self.spawn_persist();
    }

    pub fn set_channel_volume(&self, channel: ChannelType, volume: f32) {
        {
            let mut st = self.state.write().unwrap();
            st.persisted.channel_states.get_mut(channel).volume = volume.clamp(0.0, 1.0);
        }
        self.emit_queue_changed(channel);
        self.spawn_persist();
    }

    pub fn set_channel_muted(&self, channel: ChannelType, muted: bool) {
        {
            let mut st = self.state.write().unwrap();
            st.persisted.channel_states.get_mut(channel).is_muted = muted;
        }
        self.emit_queue_changed(channel);
        self.spawn_persist();
    }

    fn emit_queue_changed(&self, channel: ChannelType) {
        self.bus.emit(SessionEvent::QueueChanged {
            channel: channel.as_str().to_string(),
        });
    }

    // ==================================================================
    // Cue list
    // ==================================================================

    /// Append a track to the cue list, returning the cue item id
    pub fn add_cue_item(&self, track_id: &str) -> String {
        let item_id = Uuid::new_v4().to_string();
        {
            let mut st = self.state.write().unwrap();
            let cue = &mut st.persisted.cue_list;
            let order = cue.items.len() as u32;
            cue.items.push(CueItem {
                id: item_id.clone(),
                track_id: track_id.to_string(),
                order,
                status: CueStatus::Pending,
            });
        }
        self.bus.emit(SessionEvent::CueChanged);
        self.spawn_persist();
        item_id
    }

    /// Remove a cue item by id.
    ///
    /// Removing an item before the cursor decrements the cursor so it
    /// keeps pointing at the same logical item; removing the last
    /// remaining item resets the cursor to -1.
    pub fn remove_cue_item(&self, item_id: &str) -> bool {
        let removed = {
            let mut st = self.state.write().unwrap();
            let cue = &mut st.persisted.cue_list;
            match cue.items.iter().position(|c| c.id == item_id) {
                Some(index) => {
                    cue.items.remove(index);
                    cue.current_position =
                        cursor_after_remove(cue.current_position, index, cue.items.len());
                    renumber_cue(cue);
                    true
                }
                None => false,
            }
        };
        if removed {
            self.bus.emit(SessionEvent::CueChanged);
            self.spawn_persist();
        }
        removed
    }

    /// Splice-and-reinsert reorder of the cue list
    pub fn reorder_cue(&self, from: usize, to: usize) -> bool {
        let moved = {
            let mut st = self.state.write().unwrap();
            let cue = &mut st.persisted.cue_list;
            if from >= cue.items.len() {
                false
            } else {
                let item = cue.items.remove(from);
                let to = to.min(cue.items.len());
                cue.items.insert(to, item);
                cue.current_position = cursor_after_reorder(cue.current_position, from, to);
                renumber_cue(cue);
                true
            }
        };
        if moved {
            self.bus.emit(SessionEvent::CueChanged);
            self.spawn_persist();
        }
        moved
    }

    /// Move the cue cursor to the next item, returning its track id.
    ///
    /// The previous current item is marked done; walking past the end
    /// resets the cursor to -1.
    pub fn advance_cue(&self) -> Option<String> {
        let next_track = {
            let mut st = self.state.write().unwrap();
            let cue = &mut st.persisted.cue_list;
            if cue.items.is_empty() {
                cue.current_position = -1;
                None
            } else {
                if cue.current_position >= 0 {
                    if let Some(item) = cue.items.get_mut(cue.current_position as usize) {
                        item.status = CueStatus::Done;
                    }
                }
                let next = cue.current_position + 1;
                if (next as usize) < cue.items.len() {
                    cue.current_position = next;
                    let item = &mut cue.items[next as usize];
                    item.status = CueStatus::Playing;
                    Some(item.track_id.clone())
                } else {
                    cue.current_position = -1;
                    None
                }
            }
        };
        self.bus.emit(SessionEvent::CueChanged);
        self.spawn_persist();
        next_track
    }

    // ==================================================================
    // Settings
    // ==================================================================

    pub fn update_settings(&self, patch: DjSettingsPatch) {
        {
            let mut st = self.state.write().unwrap();
            st.persisted.settings.apply(patch);
        }
        self.bus.emit(SessionEvent::SettingsChanged);
        self.spawn_persist();
    }

    pub fn set_master_volume(&self, volume: f32) {
        {
            let mut st = self.state.write().unwrap();
            st.persisted.master_volume = volume.clamp(0.0, 1.0);
        }
        self.bus.emit(SessionEvent::SettingsChanged);
        self.spawn_persist();
    }

    // ==================================================================
    // Session timer and record
    // ==================================================================

    /// Start a live session. Returns the active session id; a session
    /// already in progress is kept (one active record at a time).
    pub fn start_session(&self) -> String {
        let mut st = self.state.write().unwrap();
        if let Some(active) = &st.active_session {
            warn!("Session {} already active", active.id);
            return active.id.clone();
        }
        let record = SessionRecord::start(mdj_common::time::now());
        let id = record.id.clone();
        let started = record.start_time;
        st.active_session = Some(record);
        drop(st);

        info!("Session {} started", id);
        self.bus.emit(SessionEvent::SessionStarted {
            session_id: id.clone(),
            timestamp: started,
        });
        id
    }

    /// Recompute the active session's elapsed time from the wall clock.
    /// Returns the elapsed seconds, or None when no session is active.
    pub fn tick_session(&self) -> Option<u64> {
        let now = mdj_common::time::now();
        let mut st = self.state.write().unwrap();
        let active = st.active_session.as_mut()?;
        active.duration_seconds = active.elapsed_seconds(now);
        Some(active.duration_seconds)
    }

    /// Close the active session, freezing its duration, and archive it in
    /// the background. Returns the closed record.
    pub fn stop_session(&self) -> Option<SessionRecord> {
        let record = {
            let now = mdj_common::time::now();
            let mut st = self.state.write().unwrap();
            let mut record = st.active_session.take()?;
            record.duration_seconds = record.elapsed_seconds(now);
            record.end_time = Some(now);
            record
        };

        info!(
            "Session {} ended after {}s",
            record.id, record.duration_seconds
        );
        self.bus.emit(SessionEvent::SessionEnded {
            session_id: record.id.clone(),
            duration_seconds: record.duration_seconds,
        });

        // Archival failure must not lose the in-memory record we return
        if let Some(store) = self.weak.upgrade() {
            let archived = record.clone();
            tokio::spawn(async move {
                if let Err(e) = store.meta.insert_session(&archived).await {
                    store.set_storage_error(format!("failed to archive session: {}", e));
                }
            });
        }

        self.clear_operations();
        Some(record)
    }

    /// Append a control action to the active session's log
    pub fn log_operation(&self, operation: &str, track_id: Option<&str>) {
        let mut st = self.state.write().unwrap();
        if let Some(active) = st.active_session.as_mut() {
            active.operation_logs.push(OperationLogEntry {
                timestamp: mdj_common::time::now(),
                operation: operation.to_string(),
                track_id: track_id.map(str::to_string),
            });
        }
    }

    pub fn record_mode_switch(&self) {
        let mut st = self.state.write().unwrap();
        if let Some(active) = st.active_session.as_mut() {
            active.mode_switch_count += 1;
        }
    }

    pub fn record_ai_interaction(&self) {
        let mut st = self.state.write().unwrap();
        if let Some(active) = st.active_session.as_mut() {
            active.ai_interaction_count += 1;
        }
    }

    // ==================================================================
    // Operation arbitration
    // ==================================================================

    /// Offer a control action to the debounce queue. `true` means execute
    /// now; `false` means it was buffered for the next drain.
    pub fn accept_operation(&self, kind: OperationKind, track_id: Option<String>) -> bool {
        let accepted = self
            .ops
            .lock()
            .unwrap()
            .accept(kind, track_id.clone());
        if accepted {
            self.log_operation(kind.as_str(), track_id.as_deref());
        }
        accepted
    }

    /// Drain the debounce buffer, returning the one operation to execute
    pub fn drain_operations(&self) -> Option<PendingOperation> {
        let winner = self.ops.lock().unwrap().drain();
        if let Some(op) = &winner {
            self.log_operation(op.kind.as_str(), op.track_id.as_deref());
        }
        winner
    }

    /// Drop all buffered operations without executing any
    pub fn clear_operations(&self) {
        self.ops.lock().unwrap().clear();
    }
}

impl std::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStore").finish()
    }
}

/// The url value allowed into the metadata tier for a track
fn persistable_url(track: &Track) -> String {
    if track.source == TrackSource::Builtin && !track.url.starts_with(EPHEMERAL_URL_SCHEME) {
        track.url.clone()
    } else {
        String::new()
    }
}

/// Cursor adjustment after removing `removed_index` from a sequence now
/// `new_len` long
fn cursor_after_remove(cursor: i64, removed_index: usize, new_len: usize) -> i64 {
    if new_len == 0 || cursor < 0 {
        return if new_len == 0 { -1 } else { cursor };
    }
    let removed = removed_index as i64;
    if removed < cursor {
        cursor - 1
    } else if removed == cursor {
        // The cursor now addresses the successor; clamp when the removed
        // item was the tail
        cursor.min(new_len as i64 - 1)
    } else {
        cursor
    }
}

/// Cursor adjustment after a splice-and-reinsert move so it keeps pointing
/// at the same logical item
fn cursor_after_reorder(cursor: i64, from: usize, to: usize) -> i64 {
    if cursor < 0 {
        return cursor;
    }
    let cur = cursor as usize;
    if from == cur {
        return to as i64;
    }
    let mut index = cur;
    if from < index {
        index -= 1;
    }
    if to <= index {
        index += 1;
    }
    index as i64
}

/// Keep cue `order` fields dense after structural changes
fn renumber_cue(cue: &mut CueList) {
    for (index, item) in cue.items.iter_mut().enumerate() {
        item.order = index as u32;
    }
}

/// Drop queue and cue references to a removed track, keeping cursors on
/// the same logical items
fn purge_track_refs(persisted: &mut PersistedState, track_id: &str) {
    for channel in ChannelType::ALL {
        loop {
            let queue = persisted.channel_queues.get_mut(channel);
            let Some(index) = queue.iter().position(|q| q.track_id == track_id) else {
                break;
            };
            queue.remove(index);
            let new_len = queue.len();
            let chan = persisted.channel_states.get_mut(channel);
            chan.current_index = cursor_after_remove(chan.current_index, index, new_len);
        }
    }

    loop {
        let cue = &mut persisted.cue_list;
        let Some(index) = cue.items.iter().position(|c| c.track_id == track_id) else {
            break;
        };
        cue.items.remove(index);
        cue.current_position = cursor_after_remove(cue.current_position, index, cue.items.len());
    }
    renumber_cue(&mut persisted.cue_list);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cursor_after_remove_before_cursor() {
        // Removing i < p shifts the cursor down by one
        assert_eq!(cursor_after_remove(3, 0, 4), 2);
        assert_eq!(cursor_after_remove(3, 2, 4), 2);
    }

    #[test]
    fn test_cursor_after_remove_at_cursor() {
        // Cursor keeps its index (now the successor)
        assert_eq!(cursor_after_remove(1, 1, 3), 1);
        // ... clamped when the removed item was the tail
        assert_eq!(cursor_after_remove(2, 2, 2), 1);
    }

    #[test]
    fn test_cursor_after_remove_after_cursor() {
        assert_eq!(cursor_after_remove(1, 3, 4), 1);
    }

    #[test]
    fn test_cursor_after_remove_last_item() {
        assert_eq!(cursor_after_remove(0, 0, 0), -1);
        assert_eq!(cursor_after_remove(-1, 0, 0), -1);
    }

    #[test]
    fn test_cursor_after_remove_no_cursor() {
        assert_eq!(cursor_after_remove(-1, 1, 3), -1);
    }

    #[test]
    fn test_cursor_after_reorder_moves_with_item() {
        // The item under the cursor moves
        assert_eq!(cursor_after_reorder(1, 1, 3), 3);
        // An item moves from before the cursor to after it
        assert_eq!(cursor_after_reorder(2, 0, 3), 1);
        // An item moves from after the cursor to before it
        assert_eq!(cursor_after_reorder(1, 3, 0), 2);
        // Move entirely after the cursor
        assert_eq!(cursor_after_reorder(0, 2, 3), 0);
        assert_eq!(cursor_after_reorder(-1, 0, 2), -1);
    }

    #[test]
    fn test_persistable_url() {
        let mut track = Track::new("t1", "T", TrackKind::Song, TrackSource::Builtin);
        track.url = "assets/fanfare.mp3".to_string();
        assert_eq!(persistable_url(&track), "assets/fanfare.mp3");

        track.url = format!("{}abc", EPHEMERAL_URL_SCHEME);
        assert_eq!(persistable_url(&track), "");

        let mut tts = Track::new("t2", "T", TrackKind::Song, TrackSource::TtsGenerated);
        tts.url = "anything".to_string();
        assert_eq!(persistable_url(&tts), "");
    }
}
