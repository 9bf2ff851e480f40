//! Render projection.
//!
//! Derives per-message display state from the store and the sequence. Cheap
//! to recompute and never stored.

use std::collections::HashMap;

use recap_core::ids::{SceneId, StableId};
use recap_core::messages::Message;
use serde::Serialize;

use crate::identity::{build_index, resolve};
use crate::store::{SceneStatus, SceneStore};

/// How a message relates to a scene.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MessageRole {
    /// Not part of any scene.
    Plain,
    /// A scene source.
    Source {
        /// First surviving source of its scene.
        first: bool,
        /// Last surviving source of its scene.
        last: bool,
    },
    /// The scene's generated summary.
    Summary,
}

/// Display state for one message.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageView {
    /// Position in the sequence.
    pub position: usize,
    /// Stable id, if assigned.
    pub stable_id: Option<StableId>,
    /// Hidden from display.
    pub hidden: bool,
    /// Relation to its scene.
    pub role: MessageRole,
    /// Owning scene.
    pub scene_id: Option<SceneId>,
    /// Owning scene's status.
    pub status: Option<SceneStatus>,
    /// Owning scene is folded.
    pub folded: bool,
    /// Owning scene's summary is stale.
    pub stale: bool,
}

/// Project the store onto the sequence.
pub fn render(store: &SceneStore, messages: &[Message]) -> Vec<MessageView> {
    let index = build_index(messages);
    let mut owners: HashMap<usize, (&SceneId, MessageRole)> = HashMap::new();

    for scene in store.iter() {
        let positions: Vec<usize> = scene
            .source_ids
            .iter()
            .filter_map(|sid| resolve(messages, sid, Some(&index)))
            .collect();
        if let (Some(&first), Some(&last)) = (positions.first(), positions.last()) {
            for &pos in &positions {
                let role = MessageRole::Source {
                    first: pos == first,
                    last: pos == last,
                };
                let _ = owners.entry(pos).or_insert((&scene.id, role));
            }
        }
        if let Some(pos) = scene
            .summary_id
            .as_ref()
            .and_then(|sid| resolve(messages, sid, Some(&index)))
        {
            let _ = owners.insert(pos, (&scene.id, MessageRole::Summary));
        }
    }

    messages
        .iter()
        .enumerate()
        .map(|(position, message)| {
            let owner = owners.get(&position);
            let scene = owner.and_then(|(id, _)| store.get(id));
            MessageView {
                position,
                stable_id: message.stable_id.clone(),
                hidden: message.hidden,
                role: owner.map_or(MessageRole::Plain, |(_, role)| *role),
                scene_id: scene.map(|s| s.id.clone()),
                status: scene.map(|s| s.status),
                folded: scene.is_some_and(|s| s.folded),
                stale: scene.is_some_and(|s| s.stale),
            }
        })
        .collect()
}
