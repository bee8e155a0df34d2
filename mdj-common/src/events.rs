//! Event types for the Magic DJ session engine
//!
//! Provides shared event definitions and the EventBus used to notify UI
//! subscribers of state changes. Events are broadcast via the EventBus and
//! can be serialized for transport to a front end.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Storage usage warning level, classified from the usage percentage.
///
/// Drives the severity of the storage banner shown by the console.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuotaLevel {
    Normal,
    Warning,
    Danger,
    Critical,
}

/// Derived storage usage snapshot for the local audio cache.
///
/// `total_bytes == 0` means the usage could not be determined; callers
/// treat that as "quota unknown" and degrade gracefully.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageQuota {
    pub used_bytes: u64,
    pub total_bytes: u64,
    /// Usage as a percentage of the budget (0.0 when the budget is unknown)
    pub percentage: f64,
    pub level: QuotaLevel,
}

impl StorageQuota {
    /// Best-effort fallback when usage cannot be computed
    pub fn unknown() -> Self {
        Self {
            used_bytes: 0,
            total_bytes: 0,
            percentage: 0.0,
            level: QuotaLevel::Normal,
        }
    }
}

/// Session engine event types
///
/// Broadcast to all subscribers (UI layers, loggers) on every observable
/// state change.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SessionEvent {
    /// A track was added to the library
    TrackAdded { track_id: String },

    /// Track metadata changed
    TrackUpdated { track_id: String },

    /// A track was removed; its local audio deletion happens in the background
    TrackRemoved { track_id: String },

    /// A channel queue changed (enqueue, removal, or reorder)
    QueueChanged { channel: String },

    /// The cue list changed (item added/removed/reordered or cursor moved)
    CueChanged,

    /// DJ settings or master volume changed
    SettingsChanged,

    /// A live session started
    SessionStarted {
        session_id: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// The live session ended
    SessionEnded {
        session_id: String,
        duration_seconds: u64,
    },

    /// Storage usage was recomputed (after a save/delete or on the monitor tick)
    QuotaChanged { quota: StorageQuota },

    /// A legacy audio migration run finished
    MigrationCompleted {
        migrated_count: usize,
        error_count: usize,
    },

    /// A persistence side effect failed; in-memory state is still valid
    StorageDegraded { error: String },
}

// ========================================
// EventBus Implementation
// ========================================

/// Central event distribution bus for engine-wide events
///
/// Uses tokio::broadcast internally, providing:
/// - Non-blocking publish (slow subscribers don't block mutators)
/// - Multiple concurrent subscribers
/// - Automatic cleanup when subscribers drop
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<SessionEvent>,
}

impl EventBus {
    /// Creates a new EventBus with the specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Subscribe to all future events
    ///
    /// Events emitted before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// A send error only means there are currently no subscribers, which is
    /// not a failure for the emitting component.
    pub fn emit(&self, event: SessionEvent) {
        let _ = self.tx.send(event);
    }

    /// Number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}
