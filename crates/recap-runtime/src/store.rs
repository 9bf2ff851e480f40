//! Scene store.
//!
//! Owns every [`Scene`] keyed by [`SceneId`] and enforces the structural
//! rules at creation: a scene has at least one source, never lists a source
//! twice, and never claims a message another scene already claims. Each
//! member message is tagged with the scene id so membership can be read from
//! either side.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::ops::RangeInclusive;

use recap_core::ids::{IdGenerator, SceneId, StableId};
use recap_core::messages::Message;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::errors::SceneError;
use crate::identity::{build_index, ensure_id, resolve};

// ─────────────────────────────────────────────────────────────────────────────
// Types
// ─────────────────────────────────────────────────────────────────────────────

/// Scene lifecycle status.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SceneStatus {
    /// Declared, no summary.
    Defined,
    /// Waiting in the summarization queue.
    Queued,
    /// Summarizer call in flight.
    Summarizing,
    /// Summary inserted.
    Completed,
    /// Last summarization failed.
    Error,
}

impl SceneStatus {
    /// Wire name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Defined => "defined",
            Self::Queued => "queued",
            Self::Summarizing => "summarizing",
            Self::Completed => "completed",
            Self::Error => "error",
        }
    }

    /// `queued` or `summarizing`. Never valid at session start.
    pub fn is_transient(self) -> bool {
        matches!(self, Self::Queued | Self::Summarizing)
    }
}

impl fmt::Display for SceneStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A contiguous run of messages summarized as a unit.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scene {
    /// Never reused.
    pub id: SceneId,
    /// Member messages in sequence order.
    pub source_ids: Vec<StableId>,
    /// Generated summary message, present only while completed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary_id: Option<StableId>,
    /// Lifecycle status.
    pub status: SceneStatus,
    /// Extra instructions appended to the summarization prompt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_guidance: Option<String>,
    /// Sources hidden behind the summary.
    #[serde(default)]
    pub folded: bool,
    /// A source was edited after the summary was generated.
    #[serde(default)]
    pub stale: bool,
    /// Cause of the most recent failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    /// RFC 3339 creation time.
    #[serde(default)]
    pub created_at: String,
}

impl Scene {
    /// Whether `id` is one of this scene's sources.
    pub fn has_source(&self, id: &StableId) -> bool {
        self.source_ids.contains(id)
    }
}

/// Partial update for [`SceneStore::update`].
///
/// `None` leaves a field untouched. For clearable fields the inner `Option`
/// is the new value, so `Some(None)` clears.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ScenePatch {
    /// New status.
    pub status: Option<SceneStatus>,
    /// Replacement source list.
    pub source_ids: Option<Vec<StableId>>,
    /// New summary id.
    pub summary_id: Option<Option<StableId>>,
    /// New custom guidance.
    pub custom_guidance: Option<Option<String>>,
    /// New folded flag.
    pub folded: Option<bool>,
    /// New stale flag.
    pub stale: Option<bool>,
    /// New failure cause.
    pub last_error: Option<Option<String>>,
}

impl ScenePatch {
    fn apply(self, scene: &mut Scene) {
        if let Some(v) = self.status {
            scene.status = v;
        }
        if let Some(v) = self.source_ids {
            scene.source_ids = v;
        }
        if let Some(v) = self.summary_id {
            scene.summary_id = v;
        }
        if let Some(v) = self.custom_guidance {
            scene.custom_guidance = v;
        }
        if let Some(v) = self.folded {
            scene.folded = v;
        }
        if let Some(v) = self.stale {
            scene.stale = v;
        }
        if let Some(v) = self.last_error {
            scene.last_error = v;
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Store
// ─────────────────────────────────────────────────────────────────────────────

/// All scenes of one chat.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneStore {
    scenes: BTreeMap<SceneId, Scene>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    issued: BTreeSet<SceneId>,
}

impl SceneStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a scene over `range` (inclusive positions).
    ///
    /// Rejects empty sequences, bad bounds, summary messages inside the range
    /// and overlap with existing scenes. On success every member gets a
    /// stable id and a membership tag.
    pub fn create(
        &mut self,
        messages: &mut [Message],
        range: RangeInclusive<usize>,
        custom_guidance: Option<String>,
        ids: &dyn IdGenerator,
    ) -> Result<Scene, SceneError> {
        let (start, end) = (*range.start(), *range.end());
        if start > end {
            return Err(SceneError::InvertedRange { start, end });
        }
        if end >= messages.len() {
            return Err(SceneError::OutOfBounds {
                start,
                end,
                len: messages.len(),
            });
        }
        if let Some(position) = (start..=end).find(|&p| messages[p].is_summary()) {
            return Err(SceneError::SummaryInRange { position });
        }
        let overlapping = self.overlaps(messages, start..=end);
        if !overlapping.is_empty() {
            debug!(start, end, scenes = ?overlapping, "scene creation rejected: overlap");
            return Err(SceneError::Overlap {
                start,
                end,
                scenes: overlapping,
            });
        }

        let id = self.mint_id(ids);
        let mut source_ids = Vec::with_capacity(end - start + 1);
        for message in &mut messages[start..=end] {
            let mut sid = ensure_id(message, ids);
            // An unhealed copy inside the range; give it its own identity.
            if source_ids.contains(&sid) {
                sid = ids.stable_id();
                message.stable_id = Some(sid.clone());
            }
            let _ = message.scenes.insert(id.clone());
            source_ids.push(sid);
        }

        let scene = Scene {
            id: id.clone(),
            source_ids,
            summary_id: None,
            status: SceneStatus::Defined,
            custom_guidance: custom_guidance
                .map(|g| g.trim().to_owned())
                .filter(|g| !g.is_empty()),
            folded: false,
            stale: false,
            last_error: None,
            created_at: chrono::Utc::now().to_rfc3339(),
        };
        let _ = self.scenes.insert(id.clone(), scene.clone());
        info!(scene_id = %id, start, end, "scene created");
        Ok(scene)
    }

    fn mint_id(&mut self, ids: &dyn IdGenerator) -> SceneId {
        loop {
            let id = ids.scene_id();
            if !self.scenes.contains_key(&id) && self.issued.insert(id.clone()) {
                return id;
            }
            debug!(scene_id = %id, "scene id collision, redrawing");
        }
    }

    /// Look up a scene.
    pub fn get(&self, id: &SceneId) -> Option<&Scene> {
        self.scenes.get(id)
    }

    pub(crate) fn get_mut(&mut self, id: &SceneId) -> Option<&mut Scene> {
        self.scenes.get_mut(id)
    }

    /// Apply `patch`. Returns `false` for an unknown id.
    pub fn update(&mut self, id: &SceneId, patch: ScenePatch) -> bool {
        match self.scenes.get_mut(id) {
            Some(scene) => {
                patch.apply(scene);
                true
            }
            None => false,
        }
    }

    /// Remove a scene and strip its membership tags.
    ///
    /// Visibility and the summary message are the caller's concern.
    pub fn delete(&mut self, messages: &mut [Message], id: &SceneId) -> Option<Scene> {
        let scene = self.scenes.remove(id)?;
        for message in messages.iter_mut() {
            let _ = message.scenes.remove(id);
        }
        debug!(scene_id = %id, "scene removed from store");
        Some(scene)
    }

    /// Scenes ordered by the position of their first source.
    ///
    /// Scenes whose first source no longer resolves sort first.
    pub fn list_ordered_by_position(&self, messages: &[Message]) -> Vec<&Scene> {
        let index = build_index(messages);
        let mut ordered: Vec<(Option<usize>, &Scene)> = self
            .scenes
            .values()
            .map(|scene| {
                let first = scene
                    .source_ids
                    .first()
                    .and_then(|sid| resolve(messages, sid, Some(&index)));
                (first, scene)
            })
            .collect();
        ordered.sort_by_key(|(first, _)| *first);
        ordered.into_iter().map(|(_, scene)| scene).collect()
    }

    /// Scenes claiming the message at `position`.
    ///
    /// More than one entry means a transient inconsistency that reconciliation
    /// will heal.
    pub fn membership(&self, messages: &[Message], position: usize) -> Vec<SceneId> {
        let Some(sid) = messages.get(position).and_then(|m| m.stable_id.as_ref()) else {
            return Vec::new();
        };
        self.scenes
            .values()
            .filter(|scene| scene.has_source(sid))
            .map(|scene| scene.id.clone())
            .collect()
    }

    /// Scenes claiming any message in `range`, in order of first hit.
    pub fn overlaps(&self, messages: &[Message], range: RangeInclusive<usize>) -> Vec<SceneId> {
        let mut found = Vec::new();
        for position in range {
            if position >= messages.len() {
                break;
            }
            for id in self.membership(messages, position) {
                if !found.contains(&id) {
                    found.push(id);
                }
            }
        }
        found
    }

    /// Iterate scenes in id order.
    pub fn iter(&self) -> impl Iterator<Item = &Scene> {
        self.scenes.values()
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut Scene> {
        self.scenes.values_mut()
    }

    /// Snapshot of all scene ids.
    pub fn ids(&self) -> Vec<SceneId> {
        self.scenes.keys().cloned().collect()
    }

    /// Number of scenes.
    pub fn len(&self) -> usize {
        self.scenes.len()
    }

    /// Whether the store holds no scenes.
    pub fn is_empty(&self) -> bool {
        self.scenes.is_empty()
    }
}
