//! Reconciliation after external edits to the message sequence.
//!
//! The host deletes and duplicates messages without telling the store. Two
//! passes bring scenes back in line with what is actually there:
//!
//! - [`reconcile_deletions`] drops vanished sources, deletes scenes left with
//!   none, and resets scenes whose summary message disappeared.
//! - [`reconcile_duplicates`] gives every copied message a fresh identity and
//!   adds it to the scenes its original belonged to.
//!
//! Both passes are idempotent.

use std::collections::{BTreeSet, HashMap};

use recap_core::ids::{IdGenerator, SceneId, StableId};
use recap_core::messages::Message;
use tracing::{debug, info};

use crate::identity::{IdIndex, build_index, resolve};
use crate::store::{SceneStatus, SceneStore};

/// Outcome of a deletion pass. The three sets are disjoint.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DeletionReport {
    /// Scenes removed because no source survived.
    pub deleted: Vec<SceneId>,
    /// Scenes that lost some sources but kept their state.
    pub modified: Vec<SceneId>,
    /// Scenes reset to `defined` because their summary message vanished.
    pub summary_lost: Vec<SceneId>,
}

impl DeletionReport {
    /// Nothing changed.
    pub fn is_empty(&self) -> bool {
        self.deleted.is_empty() && self.modified.is_empty() && self.summary_lost.is_empty()
    }
}

/// Bring the store in line with messages that are gone.
pub fn reconcile_deletions(store: &mut SceneStore, messages: &mut [Message]) -> DeletionReport {
    let index = build_index(messages);
    let mut report = DeletionReport::default();

    for id in store.ids() {
        let Some(scene) = store.get_mut(&id) else {
            continue;
        };
        let before = scene.source_ids.len();
        scene
            .source_ids
            .retain(|sid| resolve(messages, sid, Some(&index)).is_some());
        let trimmed = scene.source_ids.len() != before;

        if scene.source_ids.is_empty() {
            let summary = scene.summary_id.take();
            let _ = store.delete(messages, &id);
            if let Some(pos) = summary.and_then(|sid| resolve(messages, &sid, Some(&index))) {
                messages[pos].summary_for = None;
            }
            debug!(scene_id = %id, "scene deleted: no sources left");
            report.deleted.push(id);
            continue;
        }

        let lost = scene
            .summary_id
            .as_ref()
            .is_some_and(|sid| resolve(messages, sid, Some(&index)).is_none());
        if lost {
            scene.status = SceneStatus::Defined;
            scene.folded = false;
            scene.stale = false;
            scene.summary_id = None;
            set_hidden(messages, &scene.source_ids, &index, false);
            debug!(scene_id = %id, "summary message lost, scene reset");
            report.summary_lost.push(id);
        } else if trimmed {
            report.modified.push(id);
        }
    }

    if !report.is_empty() {
        info!(
            deleted = report.deleted.len(),
            modified = report.modified.len(),
            summary_lost = report.summary_lost.len(),
            "deletion reconciliation applied"
        );
    }
    report
}

/// Re-identify copied messages and enrol each copy in its original's scenes.
///
/// The earliest occurrence keeps the id. Each later copy gets a fresh id,
/// inserted into every scene that lists the original, after the original
/// (or after the previous copy of it). Returns the number of copies repaired.
pub fn reconcile_duplicates(
    store: &mut SceneStore,
    messages: &mut [Message],
    ids: &dyn IdGenerator,
) -> usize {
    let mut seen: BTreeSet<StableId> = BTreeSet::new();
    let mut last_copy: HashMap<StableId, StableId> = HashMap::new();
    let mut repairs = 0;

    for message in messages.iter_mut() {
        let Some(original) = message.stable_id.clone() else {
            continue;
        };
        if seen.insert(original.clone()) {
            continue;
        }

        let fresh = ids.stable_id();
        let anchor = last_copy.get(&original).unwrap_or(&original).clone();
        let declared = std::mem::take(&mut message.scenes);
        let mut joined = BTreeSet::new();

        for scene in store.iter_mut() {
            let lists_original = scene.has_source(&original);
            if !lists_original && !declared.contains(&scene.id) {
                continue;
            }
            match scene.source_ids.iter().position(|s| *s == anchor) {
                Some(at) => scene.source_ids.insert(at + 1, fresh.clone()),
                None => scene.source_ids.push(fresh.clone()),
            }
            let _ = joined.insert(scene.id.clone());
        }

        message.stable_id = Some(fresh.clone());
        message.scenes = joined;
        message.summary_for = None;
        debug!(original = %original, copy = %fresh, "duplicate message re-identified");
        let _ = last_copy.insert(original, fresh);
        repairs += 1;
    }

    if repairs > 0 {
        info!(repairs, "duplication reconciliation applied");
    }
    repairs
}

pub(crate) fn set_hidden(
    messages: &mut [Message],
    sources: &[StableId],
    index: &IdIndex,
    hidden: bool,
) {
    for sid in sources {
        if let Some(pos) = resolve(messages, sid, Some(index)) {
            messages[pos].hidden = hidden;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::ScenePatch;
    use proptest::prelude::*;
    use recap_core::ids::SequentialIds;

    fn chat(n: usize) -> Vec<Message> {
        (0..n).map(|i| Message::character("Ann", format!("line {i}"))).collect()
    }

    /// Mark a scene completed with a summary message inserted after it.
    fn complete_with_summary(
        store: &mut SceneStore,
        seq: &mut Vec<Message>,
        scene: &SceneId,
        at: usize,
    ) -> StableId {
        let sid = StableId::from("summary-1");
        let mut summary = Message::summary("Scene Summary", "recap", scene.clone());
        summary.stable_id = Some(sid.clone());
        seq.insert(at, summary);
        let sources = store.get(scene).unwrap().source_ids.clone();
        let index = build_index(seq);
        set_hidden(seq, &sources, &index, true);
        assert!(store.update(
            scene,
            ScenePatch {
                status: Some(SceneStatus::Completed),
                summary_id: Some(Some(sid.clone())),
                folded: Some(true),
                ..ScenePatch::default()
            }
        ));
        sid
    }

    #[test]
    fn deleting_a_middle_source_trims_the_scene() {
        let ids = SequentialIds::new("id");
        let mut seq = chat(5);
        let mut store = SceneStore::new();
        let scene = store.create(&mut seq, 1..=3, None, &ids).unwrap();
        let (a, c) = (scene.source_ids[0].clone(), scene.source_ids[2].clone());

        let _ = seq.remove(2);
        let report = reconcile_deletions(&mut store, &mut seq);

        assert_eq!(report.modified, vec![scene.id.clone()]);
        assert!(report.deleted.is_empty() && report.summary_lost.is_empty());
        let after = store.get(&scene.id).unwrap();
        assert_eq!(after.source_ids, vec![a, c]);
        assert_eq!(after.status, SceneStatus::Defined);
    }

    #[test]
    fn losing_the_summary_resets_the_scene() {
        let ids = SequentialIds::new("id");
        let mut seq = chat(4);
        let mut store = SceneStore::new();
        let scene = store.create(&mut seq, 0..=2, None, &ids).unwrap();
        let _ = complete_with_summary(&mut store, &mut seq, &scene.id, 3);
        assert!(seq[..3].iter().all(|m| m.hidden));

        let _ = seq.remove(3);
        let report = reconcile_deletions(&mut store, &mut seq);

        assert_eq!(report.summary_lost, vec![scene.id.clone()]);
        assert!(report.modified.is_empty());
        let after = store.get(&scene.id).unwrap();
        assert_eq!(after.status, SceneStatus::Defined);
        assert!(after.summary_id.is_none());
        assert!(!after.folded);
        assert!(seq.iter().all(|m| !m.hidden));
    }

    #[test]
    fn summary_loss_takes_precedence_over_trim() {
        let ids = SequentialIds::new("id");
        let mut seq = chat(4);
        let mut store = SceneStore::new();
        let scene = store.create(&mut seq, 0..=2, None, &ids).unwrap();
        let _ = complete_with_summary(&mut store, &mut seq, &scene.id, 3);

        let _ = seq.remove(3);
        let _ = seq.remove(0);
        let report = reconcile_deletions(&mut store, &mut seq);
        assert_eq!(report.summary_lost, vec![scene.id]);
        assert!(report.modified.is_empty());
    }

    #[test]
    fn emptied_scene_is_deleted_and_summary_untagged() {
        let ids = SequentialIds::new("id");
        let mut seq = chat(3);
        let mut store = SceneStore::new();
        let scene = store.create(&mut seq, 0..=1, None, &ids).unwrap();
        let _ = complete_with_summary(&mut store, &mut seq, &scene.id, 2);

        let _ = seq.drain(0..2);
        let report = reconcile_deletions(&mut store, &mut seq);

        assert_eq!(report.deleted, vec![scene.id.clone()]);
        assert!(store.get(&scene.id).is_none());
        assert!(!seq[0].is_summary());
    }

    #[test]
    fn deletion_pass_is_idempotent() {
        let ids = SequentialIds::new("id");
        let mut seq = chat(6);
        let mut store = SceneStore::new();
        let _ = store.create(&mut seq, 0..=2, None, &ids).unwrap();
        let _ = store.create(&mut seq, 3..=5, None, &ids).unwrap();
        let _ = seq.remove(4);
        let _ = seq.remove(1);

        let first = reconcile_deletions(&mut store, &mut seq);
        assert!(!first.is_empty());
        let snapshot = store.clone();
        assert!(reconcile_deletions(&mut store, &mut seq).is_empty());
        assert_eq!(store, snapshot);
    }

    #[test]
    fn copy_is_inserted_after_its_original() {
        let ids = SequentialIds::new("id");
        let mut seq = chat(4);
        let mut store = SceneStore::new();
        let scene = store.create(&mut seq, 0..=2, None, &ids).unwrap();
        let original = scene.source_ids[1].clone();

        let copy = seq[1].clone();
        seq.insert(2, copy);
        assert_eq!(reconcile_duplicates(&mut store, &mut seq, &ids), 1);

        let fresh = seq[2].stable_id.clone().unwrap();
        assert_ne!(fresh, original);
        let sources = &store.get(&scene.id).unwrap().source_ids;
        assert_eq!(sources.len(), 4);
        assert_eq!(sources[1], original);
        assert_eq!(sources[2], fresh);
        assert!(seq[2].belongs_to(&scene.id));
    }

    #[test]
    fn several_copies_keep_sequence_order() {
        let ids = SequentialIds::new("id");
        let mut seq = chat(3);
        let mut store = SceneStore::new();
        let scene = store.create(&mut seq, 0..=1, None, &ids).unwrap();
        let original = scene.source_ids[0].clone();

        let copy = seq[0].clone();
        seq.push(copy.clone());
        seq.push(copy);
        assert_eq!(reconcile_duplicates(&mut store, &mut seq, &ids), 2);

        let first_copy = seq[3].stable_id.clone().unwrap();
        let second_copy = seq[4].stable_id.clone().unwrap();
        let sources = &store.get(&scene.id).unwrap().source_ids;
        assert_eq!(
            sources,
            &vec![original, first_copy, second_copy, scene.source_ids[1].clone()]
        );
    }

    #[test]
    fn retagged_copy_still_joins_the_originals_scene() {
        let ids = SequentialIds::new("id");
        let mut seq = chat(5);
        let mut store = SceneStore::new();
        let home = store.create(&mut seq, 0..=1, None, &ids).unwrap();
        let other = store.create(&mut seq, 3..=4, None, &ids).unwrap();
        let original = home.source_ids[0].clone();

        // The first copy claims only the other scene; the second is a plain copy.
        let mut first = seq[0].clone();
        first.scenes = [other.id.clone()].into_iter().collect();
        let second = seq[0].clone();
        seq.insert(2, first);
        seq.insert(3, second);
        assert_eq!(reconcile_duplicates(&mut store, &mut seq, &ids), 2);

        let first_copy = seq[2].stable_id.clone().unwrap();
        let second_copy = seq[3].stable_id.clone().unwrap();
        assert_eq!(
            store.get(&home.id).unwrap().source_ids,
            vec![original, first_copy.clone(), second_copy, home.source_ids[1].clone()]
        );
        assert!(seq[2].belongs_to(&home.id) && seq[2].belongs_to(&other.id));
        assert_eq!(store.get(&other.id).unwrap().source_ids.last(), Some(&first_copy));
    }

    #[test]
    fn copied_summary_loses_its_tag() {
        let ids = SequentialIds::new("id");
        let mut seq = chat(3);
        let mut store = SceneStore::new();
        let scene = store.create(&mut seq, 0..=1, None, &ids).unwrap();
        let summary = complete_with_summary(&mut store, &mut seq, &scene.id, 2);

        let copy = seq[2].clone();
        seq.push(copy);
        assert_eq!(reconcile_duplicates(&mut store, &mut seq, &ids), 1);

        assert!(seq[2].has_id(&summary) && seq[2].is_summary());
        assert!(!seq[4].is_summary());
        assert_eq!(store.get(&scene.id).unwrap().source_ids.len(), 2);
    }

    #[test]
    fn tagged_copy_of_unlisted_message_is_appended() {
        let ids = SequentialIds::new("id");
        let mut seq = chat(3);
        let mut store = SceneStore::new();
        let scene = store.create(&mut seq, 0..=1, None, &ids).unwrap();
        // The original's id was dropped from the scene but its tag survived.
        seq[2].stable_id = Some(StableId::from("loose"));
        let _ = seq[2].scenes.insert(scene.id.clone());
        let copy = seq[2].clone();
        seq.push(copy);

        assert_eq!(reconcile_duplicates(&mut store, &mut seq, &ids), 1);
        let sources = &store.get(&scene.id).unwrap().source_ids;
        assert_eq!(sources.last(), seq[3].stable_id.as_ref());
    }

    #[test]
    fn duplicate_pass_is_idempotent() {
        let ids = SequentialIds::new("id");
        let mut seq = chat(3);
        let mut store = SceneStore::new();
        let _ = store.create(&mut seq, 0..=2, None, &ids).unwrap();
        let copy = seq[1].clone();
        seq.push(copy);
        assert_eq!(reconcile_duplicates(&mut store, &mut seq, &ids), 1);
        assert_eq!(reconcile_duplicates(&mut store, &mut seq, &ids), 0);
    }

    // ── Properties ──────────────────────────────────────────────────────────

    /// Build a chat of `len` messages with scenes over disjoint windows.
    fn seeded(len: usize, cuts: &[usize]) -> (Vec<Message>, SceneStore, SequentialIds) {
        let ids = SequentialIds::new("p");
        let mut seq = chat(len);
        let mut store = SceneStore::new();
        let mut bounds: Vec<usize> = cuts.iter().map(|c| c % len).collect();
        bounds.sort_unstable();
        bounds.dedup();
        for pair in bounds.chunks(2) {
            if let [start, end] = pair {
                let _ = store.create(&mut seq, *start..=*end, None, &ids);
            }
        }
        (seq, store, ids)
    }

    proptest! {
        #[test]
        fn deletion_leaves_only_live_sources(
            len in 2usize..24,
            cuts in proptest::collection::vec(0usize..64, 0..8),
            removals in proptest::collection::vec(0usize..64, 0..12),
        ) {
            let (mut seq, mut store, _) = seeded(len, &cuts);
            for r in removals {
                if !seq.is_empty() {
                    let at = r % seq.len();
                    let _ = seq.remove(at);
                }
            }
            let _ = reconcile_deletions(&mut store, &mut seq);
            for scene in store.iter() {
                prop_assert!(!scene.source_ids.is_empty());
                for sid in &scene.source_ids {
                    prop_assert!(resolve(&seq, sid, None).is_some());
                }
            }
        }

        #[test]
        fn duplication_leaves_unique_ids(
            len in 2usize..16,
            cuts in proptest::collection::vec(0usize..64, 0..6),
            copies in proptest::collection::vec((0usize..64, 0usize..64), 0..6),
        ) {
            let (mut seq, mut store, ids) = seeded(len, &cuts);
            for (from, to) in copies {
                let copy = seq[from % seq.len()].clone();
                let at = to % (seq.len() + 1);
                seq.insert(at, copy);
            }
            let before = store.clone();
            let _ = reconcile_duplicates(&mut store, &mut seq, &ids);

            let live: Vec<_> = seq.iter().filter_map(|m| m.stable_id.clone()).collect();
            let unique: BTreeSet<_> = live.iter().cloned().collect();
            prop_assert_eq!(live.len(), unique.len());

            for old in before.iter() {
                let now = store.get(&old.id).unwrap();
                for sid in &old.source_ids {
                    prop_assert!(now.has_source(sid));
                }
                let mut seen = BTreeSet::new();
                for sid in &now.source_ids {
                    prop_assert!(seen.insert(sid.clone()));
                }
            }
        }
    }
}
