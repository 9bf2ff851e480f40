//! Queue notifications and the broadcast emitter that carries them.

use std::sync::atomic::{AtomicU64, Ordering};

use recap_core::errors::FailureCategory;
use recap_core::ids::SceneId;
use serde::Serialize;
use tokio::sync::broadcast;

/// Default broadcast channel capacity.
const DEFAULT_CAPACITY: usize = 256;

/// Queue progress snapshot.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueProgress {
    /// 1-based ordinal of the item being processed; 0 when idle.
    pub current_ordinal: usize,
    /// Items in the current batch.
    pub total: usize,
    /// Scene being summarized.
    pub active_id: Option<SceneId>,
    /// Items still waiting.
    pub pending_count: usize,
}

/// How a queue item ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemOutcome {
    /// Summary inserted.
    Completed,
    /// Cancelled while active.
    Cancelled,
    /// Worker gave up; the scene is in `error`.
    Failed,
}

/// Queue state transition.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum QueueEvent {
    /// A scene joined the pending list.
    Enqueued {
        /// Scene id.
        scene_id: SceneId,
        /// Snapshot after the change.
        progress: QueueProgress,
    },
    /// A scene became active.
    Started {
        /// Scene id.
        scene_id: SceneId,
        /// Snapshot after the change.
        progress: QueueProgress,
    },
    /// The active scene finished.
    Finished {
        /// Scene id.
        scene_id: SceneId,
        /// How it ended.
        outcome: ItemOutcome,
        /// Snapshot after the change.
        progress: QueueProgress,
    },
    /// A pending scene was removed before it started.
    Cancelled {
        /// Scene id.
        scene_id: SceneId,
        /// Snapshot after the change.
        progress: QueueProgress,
    },
    /// The pending list emptied and processing stopped.
    Drained,
    /// A transient failure; the worker will retry after `delay_ms`.
    RetryNotice {
        /// Scene id.
        scene_id: SceneId,
        /// Attempt that failed (1-based).
        attempt: u32,
        /// Attempt budget.
        max_attempts: u32,
        /// Backoff before the next attempt.
        delay_ms: u64,
        /// Classified cause.
        category: FailureCategory,
    },
}

impl QueueEvent {
    /// Scene the event concerns, if any.
    pub fn scene_id(&self) -> Option<&SceneId> {
        match self {
            Self::Enqueued { scene_id, .. }
            | Self::Started { scene_id, .. }
            | Self::Finished { scene_id, .. }
            | Self::Cancelled { scene_id, .. }
            | Self::RetryNotice { scene_id, .. } => Some(scene_id),
            Self::Drained => None,
        }
    }
}

/// Broadcast-based event emitter.
///
/// Non-blocking: `emit` never awaits. Slow receivers lag rather than block
/// the queue.
pub struct EventEmitter {
    tx: broadcast::Sender<QueueEvent>,
    emit_count: AtomicU64,
}

impl EventEmitter {
    /// Create an emitter with the default capacity.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Create an emitter with a custom capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self {
            tx,
            emit_count: AtomicU64::new(0),
        }
    }

    /// Emit to all subscribers. Returns how many received it.
    pub fn emit(&self, event: QueueEvent) -> usize {
        let _ = self.emit_count.fetch_add(1, Ordering::Relaxed);
        self.tx.send(event).unwrap_or(0)
    }

    /// Receive every event emitted after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<QueueEvent> {
        self.tx.subscribe()
    }

    /// Active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Total events emitted.
    pub fn emit_count(&self) -> u64 {
        self.emit_count.load(Ordering::Relaxed)
    }
}

impl Default for EventEmitter {
    fn default() -> Self {
        Self::new()
    }
}
