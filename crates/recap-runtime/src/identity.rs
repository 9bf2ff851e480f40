//! Stable identity index.
//!
//! Positions in the host's sequence shift on every insert and delete, so
//! scenes refer to messages by [`StableId`]. IDs are attached lazily and
//! resolved back to positions either through a prebuilt [`IdIndex`] or a
//! linear scan.

use std::collections::HashMap;

use recap_core::ids::{IdGenerator, StableId};
use recap_core::messages::Message;

/// Cached `id -> position` map for one snapshot of the sequence.
///
/// Stale as soon as the sequence changes shape; [`resolve`] validates every
/// hit against the live message before trusting it.
#[derive(Clone, Debug, Default)]
pub struct IdIndex {
    positions: HashMap<StableId, usize>,
}

impl IdIndex {
    /// Cached position for `id`, unvalidated.
    pub fn get(&self, id: &StableId) -> Option<usize> {
        self.positions.get(id).copied()
    }

    /// Number of distinct ids indexed.
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    /// Whether no ids are indexed.
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}

/// Return the message's stable id, minting and attaching one if absent.
pub fn ensure_id(message: &mut Message, ids: &dyn IdGenerator) -> StableId {
    message.stable_id.get_or_insert_with(|| ids.stable_id()).clone()
}

/// Build an index in one pass. The earliest occurrence of a duplicated id wins.
pub fn build_index(messages: &[Message]) -> IdIndex {
    let mut positions = HashMap::with_capacity(messages.len());
    for (pos, message) in messages.iter().enumerate() {
        if let Some(id) = &message.stable_id {
            let _ = positions.entry(id.clone()).or_insert(pos);
        }
    }
    IdIndex { positions }
}

/// Resolve `id` to its current position.
///
/// A cache hit is accepted only if the message at that position still carries
/// `id`; otherwise falls back to a scan for the earliest match.
pub fn resolve(messages: &[Message], id: &StableId, cache: Option<&IdIndex>) -> Option<usize> {
    if let Some(pos) = cache.and_then(|index| index.get(id))
        && messages.get(pos).is_some_and(|m| m.has_id(id))
    {
        return Some(pos);
    }
    messages.iter().position(|m| m.has_id(id))
}
