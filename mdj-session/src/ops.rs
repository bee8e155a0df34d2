//! Operation priority queue
//!
//! During a live session several control actions can fire within a few
//! milliseconds of each other (a child mashing the interrupt and emergency
//! stop buttons at once). The queue enforces a debounce window after each
//! accepted operation: operations arriving inside the window are buffered,
//! and when the buffer is drained only the single highest-priority
//! operation survives. Lower-priority operations buffered in the same
//! window are discarded, never executed late.
//!
//! Guarantees:
//! - at most one executed operation per debounce window
//! - a lower-priority operation never executes ahead of a higher-priority
//!   one that arrived in the same window

use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::debug;

/// Session control actions, in strict priority order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    /// Cut off AI speech immediately
    Interrupt,
    /// Hard-stop the whole session
    EmergencyEnd,
    /// Submit the pending interaction without waiting
    ForceSubmit,
    /// Start or toggle track playback
    Playback,
}

impl OperationKind {
    /// Lower number = higher priority; the order is a strict total order
    pub const fn priority(self) -> u8 {
        match self {
            OperationKind::Interrupt => 1,
            OperationKind::EmergencyEnd => 2,
            OperationKind::ForceSubmit => 3,
            OperationKind::Playback => 4,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            OperationKind::Interrupt => "interrupt",
            OperationKind::EmergencyEnd => "emergency_end",
            OperationKind::ForceSubmit => "force_submit",
            OperationKind::Playback => "playback",
        }
    }
}

/// A buffered control action. Created when an action arrives inside the
/// debounce window; consumed at most once on drain; never mutated.
#[derive(Debug, Clone)]
pub struct PendingOperation {
    pub kind: OperationKind,
    pub track_id: Option<String>,
    pub queued_at: Instant,
}

/// Debounce/priority arbitration for session control actions
#[derive(Debug)]
pub struct OperationQueue {
    window: Duration,
    last_accepted: Option<Instant>,
    buffer: Vec<PendingOperation>,
}

impl OperationQueue {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_accepted: None,
            buffer: Vec::new(),
        }
    }

    /// Offer an operation to the queue.
    ///
    /// Returns `true` when the operation arrived outside the debounce
    /// window: the caller executes it immediately and the window resets.
    /// Returns `false` when it was buffered; the caller must NOT execute
    /// it and should wait for a drain.
    pub fn accept(&mut self, kind: OperationKind, track_id: Option<String>) -> bool {
        self.accept_at(kind, track_id, Instant::now())
    }

    fn accept_at(&mut self, kind: OperationKind, track_id: Option<String>, now: Instant) -> bool {
        let inside_window = self
            .last_accepted
            .is_some_and(|last| now.duration_since(last) < self.window);

        if inside_window {
            debug!("Buffered {} inside debounce window", kind.as_str());
            self.buffer.push(PendingOperation {
                kind,
                track_id,
                queued_at: now,
            });
            false
        } else {
            self.last_accepted = Some(now);
            true
        }
    }

    /// Drain the buffer, returning the single highest-priority operation
    /// (ties broken by arrival order: first arrival wins) or `None` when
    /// nothing is buffered.
    ///
    /// The whole buffer is cleared, including the discarded lower-priority
    /// entries. A non-empty drain counts as the window's one executed
    /// operation and resets the window.
    pub fn drain(&mut self) -> Option<PendingOperation> {
        self.drain_at(Instant::now())
    }

    fn drain_at(&mut self, now: Instant) -> Option<PendingOperation> {
        if self.buffer.is_empty() {
            return None;
        }

        // min_by_key returns the first minimum, which is the earliest
        // arrival among equal priorities
        let winner = self
            .buffer
            .iter()
            .min_by_key(|op| op.kind.priority())
            .cloned();

        let discarded = self.buffer.len() - 1;
        if discarded > 0 {
            debug!(
                "Collapsed {} buffered operation(s) into {}",
                discarded,
                winner.as_ref().map_or("?", |w| w.kind.as_str())
            );
        }

        self.buffer.clear();
        self.last_accepted = Some(now);
        winner
    }

    /// Drop every buffered operation without executing any (session end or
    /// reset). The window is not reset.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    /// Number of operations currently buffered
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }
}
