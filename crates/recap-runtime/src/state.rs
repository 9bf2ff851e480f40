//! Shared chat state.

use std::sync::Arc;

use parking_lot::Mutex;
use recap_core::messages::Message;

use crate::store::SceneStore;

/// The message sequence and its scenes, mutated together.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ChatState {
    /// Host-owned message sequence.
    pub messages: Vec<Message>,
    /// Scenes over `messages`.
    pub store: SceneStore,
}

impl ChatState {
    /// Wrap existing state.
    pub fn new(messages: Vec<Message>, store: SceneStore) -> Self {
        Self { messages, store }
    }
}

/// Handle shared by the manager, queue and worker.
///
/// Never held across an `.await`.
pub type SharedChat = Arc<Mutex<ChatState>>;
