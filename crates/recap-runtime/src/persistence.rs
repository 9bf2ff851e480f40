//! Persistence seam.
//!
//! Recap does not own storage. After a mutation it hands the current sequence
//! and store to the host, which decides how and when to write them.

use recap_core::messages::Message;

use crate::store::SceneStore;

/// Host hook for saving chat state.
///
/// Both calls are fire-and-forget and run while the chat lock is held, so
/// implementations must not block: copy what they need and defer the I/O.
pub trait Persistence: Send + Sync {
    /// Save the message sequence.
    fn persist_sequence(&self, messages: &[Message]);

    /// Save the scene store.
    fn persist_scenes(&self, store: &SceneStore);
}

/// Discards everything.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopPersistence;

impl Persistence for NoopPersistence {
    fn persist_sequence(&self, _messages: &[Message]) {}

    fn persist_scenes(&self, _store: &SceneStore) {}
}
