//! Scene lifecycle transitions.
//!
//! ```text
//! defined ──enqueue──▶ queued ──dequeue──▶ summarizing ──ok──▶ completed
//!    ▲                   │                     │   │               │
//!    │◀──── cancel ──────┘◀────── cancel ──────┘   └──fail──▶ error │
//!    │◀──────────────────────── undo ──────────────────────────────┘
//! ```
//!
//! `error` re-enters `queued` like `defined`. Refused transitions return
//! [`SceneError::InvalidTransition`] and leave the scene untouched.

use recap_core::ids::{SceneId, StableId};
use recap_core::messages::Message;
use tracing::{debug, info, warn};

use crate::errors::SceneError;
use crate::identity::{build_index, resolve};
use crate::reconcile::set_hidden;
use crate::store::{Scene, SceneStatus, SceneStore};

/// Cause recorded on scenes found mid-summarization when a chat loads.
pub const INTERRUPTED_CAUSE: &str =
    "interrupted: summarization did not finish before the chat was closed";

fn refuse(scene: &Scene, action: &'static str) -> SceneError {
    warn!(scene_id = %scene.id, status = %scene.status, action, "scene transition refused");
    SceneError::InvalidTransition {
        id: scene.id.clone(),
        status: scene.status,
        action,
    }
}

fn scene_mut<'a>(store: &'a mut SceneStore, id: &SceneId) -> Result<&'a mut Scene, SceneError> {
    store.get_mut(id).ok_or_else(|| SceneError::NotFound(id.clone()))
}

/// `defined`/`error` → `queued`.
pub fn mark_queued(store: &mut SceneStore, id: &SceneId) -> Result<(), SceneError> {
    let scene = scene_mut(store, id)?;
    match scene.status {
        SceneStatus::Defined | SceneStatus::Error => {
            scene.status = SceneStatus::Queued;
            debug!(scene_id = %id, "scene queued");
            Ok(())
        }
        _ => Err(refuse(scene, "queue")),
    }
}

/// `queued` → `summarizing`, clearing any previous failure.
///
/// `defined` and `error` are accepted too, for direct invocation outside the
/// queue.
pub fn begin_summarizing(store: &mut SceneStore, id: &SceneId) -> Result<(), SceneError> {
    let scene = scene_mut(store, id)?;
    match scene.status {
        SceneStatus::Queued | SceneStatus::Defined | SceneStatus::Error => {
            scene.status = SceneStatus::Summarizing;
            scene.last_error = None;
            Ok(())
        }
        _ => Err(refuse(scene, "summarize")),
    }
}

/// `summarizing` → `completed`: record the summary and fold the sources.
pub fn complete(
    store: &mut SceneStore,
    messages: &mut [Message],
    id: &SceneId,
    summary_id: StableId,
) -> Result<(), SceneError> {
    let scene = scene_mut(store, id)?;
    if scene.status != SceneStatus::Summarizing {
        return Err(refuse(scene, "complete"));
    }
    scene.status = SceneStatus::Completed;
    scene.summary_id = Some(summary_id);
    scene.folded = true;
    scene.stale = false;
    scene.last_error = None;
    let index = build_index(messages);
    set_hidden(messages, &scene.source_ids, &index, true);
    info!(scene_id = %id, "scene completed");
    Ok(())
}

/// `queued`/`summarizing` → `defined` after cancellation.
///
/// Returns `false` (no change) from any other state.
pub fn revert_cancelled(store: &mut SceneStore, id: &SceneId) -> bool {
    match store.get_mut(id) {
        Some(scene) if scene.status.is_transient() => {
            scene.status = SceneStatus::Defined;
            scene.last_error = None;
            debug!(scene_id = %id, "scene reverted after cancel");
            true
        }
        _ => false,
    }
}

/// `summarizing`/`queued` → `error` with `cause`.
///
/// Returns `false` (no change) from any other state.
pub fn fail(store: &mut SceneStore, id: &SceneId, cause: impl Into<String>) -> bool {
    match store.get_mut(id) {
        Some(scene) if scene.status.is_transient() => {
            let cause = cause.into();
            warn!(scene_id = %id, cause = %cause, "scene summarization failed");
            scene.status = SceneStatus::Error;
            scene.last_error = Some(cause);
            true
        }
        _ => false,
    }
}

/// `completed` → `defined`: remove the summary message and un-hide sources.
pub fn undo(
    store: &mut SceneStore,
    messages: &mut Vec<Message>,
    id: &SceneId,
) -> Result<(), SceneError> {
    let scene = scene_mut(store, id)?;
    if scene.status != SceneStatus::Completed {
        return Err(refuse(scene, "undo"));
    }
    if let Some(sid) = scene.summary_id.take() {
        remove_summary(messages, &sid);
    }
    scene.status = SceneStatus::Defined;
    scene.folded = false;
    scene.stale = false;
    let index = build_index(messages);
    set_hidden(messages, &scene.source_ids, &index, false);
    info!(scene_id = %id, "scene summary undone");
    Ok(())
}

/// Fold or unfold a completed scene.
pub fn set_folded(
    store: &mut SceneStore,
    messages: &mut [Message],
    id: &SceneId,
    folded: bool,
) -> Result<(), SceneError> {
    let scene = scene_mut(store, id)?;
    if scene.status != SceneStatus::Completed {
        return Err(refuse(scene, if folded { "fold" } else { "unfold" }));
    }
    scene.folded = folded;
    let index = build_index(messages);
    set_hidden(messages, &scene.source_ids, &index, folded);
    Ok(())
}

/// Delete a scene outright, restoring visibility and removing its summary.
pub fn delete_scene(
    store: &mut SceneStore,
    messages: &mut Vec<Message>,
    id: &SceneId,
) -> Result<Scene, SceneError> {
    let scene = store.get(id).cloned().ok_or_else(|| SceneError::NotFound(id.clone()))?;
    if let Some(sid) = &scene.summary_id {
        remove_summary(messages, sid);
    }
    let index = build_index(messages);
    set_hidden(messages, &scene.source_ids, &index, false);
    let removed = store.delete(messages, id).unwrap_or(scene);
    info!(scene_id = %id, "scene deleted");
    Ok(removed)
}

/// Flag the completed scene owning `position` as stale.
///
/// Returns the scene id when a flag was set.
pub fn mark_edited(
    store: &mut SceneStore,
    messages: &[Message],
    position: usize,
) -> Option<SceneId> {
    let owner = store.membership(messages, position).into_iter().next()?;
    let scene = store.get_mut(&owner)?;
    if scene.status != SceneStatus::Completed {
        return None;
    }
    scene.stale = true;
    debug!(scene_id = %owner, position, "source edited, summary marked stale");
    Some(owner)
}

/// Force every `queued`/`summarizing` scene into `error`.
///
/// Run once when a chat loads: nothing can be in flight at that point.
pub fn recover_interrupted(store: &mut SceneStore) -> Vec<SceneId> {
    let mut recovered = Vec::new();
    for scene in store.iter_mut() {
        if scene.status.is_transient() {
            scene.status = SceneStatus::Error;
            scene.last_error = Some(INTERRUPTED_CAUSE.to_owned());
            recovered.push(scene.id.clone());
        }
    }
    if !recovered.is_empty() {
        warn!(count = recovered.len(), "recovered interrupted scenes");
    }
    recovered
}

fn remove_summary(messages: &mut Vec<Message>, summary_id: &StableId) {
    if let Some(pos) = resolve(messages, summary_id, None) {
        let _ = messages.remove(pos);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use recap_core::ids::SequentialIds;

    fn setup(
        n: usize,
        range: std::ops::RangeInclusive<usize>,
    ) -> (Vec<Message>, SceneStore, SceneId) {
        let ids = SequentialIds::new("id");
        let mut seq: Vec<Message> = (0..n)
            .map(|i| Message::character("Ann", format!("{i}")))
            .collect();
        let mut store = SceneStore::new();
        let scene = store.create(&mut seq, range, None, &ids).unwrap();
        (seq, store, scene.id)
    }

    fn summarized(
        seq: &mut Vec<Message>,
        store: &mut SceneStore,
        id: &SceneId,
        at: usize,
    ) -> StableId {
        begin_summarizing(store, id).unwrap();
        let sid = StableId::from("sum");
        let mut summary = Message::summary("Scene Summary", "recap", id.clone());
        summary.stable_id = Some(sid.clone());
        seq.insert(at, summary);
        complete(store, seq, id, sid.clone()).unwrap();
        sid
    }

    #[test]
    fn queue_only_from_defined_or_error() {
        let (_, mut store, id) = setup(3, 0..=1);
        mark_queued(&mut store, &id).unwrap();
        assert_matches!(
            mark_queued(&mut store, &id),
            Err(SceneError::InvalidTransition { status: SceneStatus::Queued, .. })
        );
        assert!(fail(&mut store, &id, "boom"));
        mark_queued(&mut store, &id).unwrap();
        assert_eq!(store.get(&id).unwrap().status, SceneStatus::Queued);
    }

    #[test]
    fn begin_clears_last_error_and_guards_reentry() {
        let (_, mut store, id) = setup(3, 0..=1);
        mark_queued(&mut store, &id).unwrap();
        assert!(fail(&mut store, &id, "boom"));
        begin_summarizing(&mut store, &id).unwrap();
        let scene = store.get(&id).unwrap();
        assert_eq!(scene.status, SceneStatus::Summarizing);
        assert!(scene.last_error.is_none());
        assert!(begin_summarizing(&mut store, &id).is_err());
    }

    #[test]
    fn unknown_scene_is_not_found() {
        let mut store = SceneStore::new();
        let ghost = SceneId::from("ghost");
        assert_matches!(mark_queued(&mut store, &ghost), Err(SceneError::NotFound(_)));
        assert!(!revert_cancelled(&mut store, &ghost));
    }

    #[test]
    fn complete_hides_sources_and_folds() {
        let (mut seq, mut store, id) = setup(4, 0..=2);
        let sid = summarized(&mut seq, &mut store, &id, 3);
        let scene = store.get(&id).unwrap();
        assert_eq!(scene.status, SceneStatus::Completed);
        assert_eq!(scene.summary_id.as_ref(), Some(&sid));
        assert!(scene.folded);
        assert!(seq[..3].iter().all(|m| m.hidden));
        assert!(!seq[3].hidden && !seq[4].hidden);
    }

    #[test]
    fn cancel_reverts_only_transient_states() {
        let (_, mut store, id) = setup(2, 0..=1);
        assert!(!revert_cancelled(&mut store, &id));
        mark_queued(&mut store, &id).unwrap();
        assert!(revert_cancelled(&mut store, &id));
        assert!(!revert_cancelled(&mut store, &id));
        assert_eq!(store.get(&id).unwrap().status, SceneStatus::Defined);
    }

    #[test]
    fn undo_round_trip_keeps_sources() {
        let (mut seq, mut store, id) = setup(4, 1..=2);
        let before = store.get(&id).unwrap().source_ids.clone();
        let _ = summarized(&mut seq, &mut store, &id, 3);
        assert_eq!(seq.len(), 5);

        undo(&mut store, &mut seq, &id).unwrap();
        let scene = store.get(&id).unwrap();
        assert_eq!(scene.status, SceneStatus::Defined);
        assert_eq!(scene.source_ids, before);
        assert!(scene.summary_id.is_none());
        assert!(!scene.folded && !scene.stale);
        assert_eq!(seq.len(), 4);
        assert!(seq.iter().all(|m| !m.hidden && !m.is_summary()));
    }

    #[test]
    fn undo_requires_completed() {
        let (mut seq, mut store, id) = setup(2, 0..=1);
        assert_matches!(
            undo(&mut store, &mut seq, &id),
            Err(SceneError::InvalidTransition { action: "undo", .. })
        );
    }

    #[test]
    fn fold_toggles_visibility() {
        let (mut seq, mut store, id) = setup(3, 0..=1);
        assert!(set_folded(&mut store, &mut seq, &id, true).is_err());
        let _ = summarized(&mut seq, &mut store, &id, 2);

        set_folded(&mut store, &mut seq, &id, false).unwrap();
        assert!(!store.get(&id).unwrap().folded);
        assert!(seq.iter().all(|m| !m.hidden));

        set_folded(&mut store, &mut seq, &id, true).unwrap();
        assert!(seq[0].hidden && seq[1].hidden);
    }

    #[test]
    fn delete_scene_restores_everything() {
        let (mut seq, mut store, id) = setup(3, 0..=1);
        let _ = summarized(&mut seq, &mut store, &id, 2);

        let removed = delete_scene(&mut store, &mut seq, &id).unwrap();
        assert_eq!(removed.id, id);
        assert!(store.is_empty());
        assert_eq!(seq.len(), 3);
        assert!(seq.iter().all(|m| !m.hidden && m.scenes.is_empty() && !m.is_summary()));
        assert_matches!(delete_scene(&mut store, &mut seq, &id), Err(SceneError::NotFound(_)));
    }

    #[test]
    fn edits_mark_only_completed_scenes_stale() {
        let (mut seq, mut store, id) = setup(3, 0..=1);
        assert!(mark_edited(&mut store, &seq, 0).is_none());
        let _ = summarized(&mut seq, &mut store, &id, 2);
        assert_eq!(mark_edited(&mut store, &seq, 1), Some(id.clone()));
        assert!(store.get(&id).unwrap().stale);
        assert!(mark_edited(&mut store, &seq, 3).is_none());

        undo(&mut store, &mut seq, &id).unwrap();
        assert!(!store.get(&id).unwrap().stale);
    }

    #[test]
    fn interrupted_scenes_become_errors() {
        let (mut seq, mut store, first) = setup(6, 0..=1);
        let ids = SequentialIds::new("x");
        let second = store.create(&mut seq, 2..=3, None, &ids).unwrap().id;
        let third = store.create(&mut seq, 4..=5, None, &ids).unwrap().id;
        mark_queued(&mut store, &first).unwrap();
        begin_summarizing(&mut store, &second).unwrap();

        let recovered = recover_interrupted(&mut store);
        assert_eq!(recovered.len(), 2);
        for id in [&first, &second] {
            let scene = store.get(id).unwrap();
            assert_eq!(scene.status, SceneStatus::Error);
            assert_eq!(scene.last_error.as_deref(), Some(INTERRUPTED_CAUSE));
        }
        assert_eq!(store.get(&third).unwrap().status, SceneStatus::Defined);
    }
}
