//! Chat message as seen by Recap.
//!
//! The host application owns the message sequence and may insert, remove or
//! clone entries at any time. Recap only reads the speaker/text, and writes
//! the bookkeeping fields: the lazily assigned [`StableId`], the `hidden`
//! flag used for folding, the scene membership tags, and the `summary_for`
//! tag on generated summary messages.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::ids::{SceneId, StableId};

/// One element of the host's ordered message sequence.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Speaker display name.
    pub name: String,
    /// Whether the user (rather than a character/assistant) wrote this message.
    #[serde(default)]
    pub is_user: bool,
    /// Message body.
    #[serde(default)]
    pub text: String,
    /// Stable identifier; assigned on first use by the identity index.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stable_id: Option<StableId>,
    /// Hidden from display and prompt processing.
    #[serde(default)]
    pub hidden: bool,
    /// Scenes that claim this message as a source.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub scenes: BTreeSet<SceneId>,
    /// Set on a generated summary message: the scene it summarizes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary_for: Option<SceneId>,
}

impl Message {
    /// A message written by the user.
    #[must_use]
    pub fn user(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_user: true,
            text: text.into(),
            ..Self::default()
        }
    }

    /// A message written by a character or assistant.
    #[must_use]
    pub fn character(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_user: false,
            text: text.into(),
            ..Self::default()
        }
    }

    /// A generated summary message for `scene`.
    #[must_use]
    pub fn summary(name: impl Into<String>, text: impl Into<String>, scene: SceneId) -> Self {
        Self {
            name: name.into(),
            is_user: false,
            text: text.into(),
            summary_for: Some(scene),
            ..Self::default()
        }
    }

    /// Whether this message is a generated scene summary.
    #[must_use]
    pub fn is_summary(&self) -> bool {
        self.summary_for.is_some()
    }

    /// Whether this message declares membership in `scene`.
    #[must_use]
    pub fn belongs_to(&self, scene: &SceneId) -> bool {
        self.scenes.contains(scene)
    }

    /// Whether `id` is this message's stable identifier.
    #[must_use]
    pub fn has_id(&self, id: &StableId) -> bool {
        self.stable_id.as_ref() == Some(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn constructors_set_speaker_side() {
        assert!(Message::user("Ann", "hi").is_user);
        assert!(!Message::character("Bot", "hello").is_user);
    }

    #[test]
    fn summary_message_is_tagged() {
        let msg = Message::summary("Recap", "They met.", SceneId::from("s1"));
        assert!(msg.is_summary());
        assert_eq!(msg.summary_for.as_deref(), Some("s1"));
        assert!(msg.scenes.is_empty());
    }

    #[test]
    fn minimal_json_fills_defaults() {
        let msg: Message = serde_json::from_value(json!({ "name": "Ann" })).unwrap();
        assert!(!msg.hidden);
        assert!(msg.stable_id.is_none());
        assert!(msg.scenes.is_empty());
        assert!(!msg.is_summary());
    }

    #[test]
    fn camel_case_wire_names() {
        let mut msg = Message::user("Ann", "hi");
        msg.stable_id = Some(StableId::from("m-1"));
        let _ = msg.scenes.insert(SceneId::from("s1"));
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["stableId"], "m-1");
        assert_eq!(value["isUser"], true);
        assert_eq!(value["scenes"][0], "s1");
        assert!(value.get("summaryFor").is_none());
    }

    #[test]
    fn has_id_and_membership() {
        let mut msg = Message::user("Ann", "hi");
        let id = StableId::from("m-1");
        assert!(!msg.has_id(&id));
        msg.stable_id = Some(id.clone());
        assert!(msg.has_id(&id));
        let _ = msg.scenes.insert(SceneId::from("s1"));
        assert!(msg.belongs_to(&SceneId::from("s1")));
        assert!(!msg.belongs_to(&SceneId::from("s2")));
    }
}
