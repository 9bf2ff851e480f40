//! Manager façade.
//!
//! [`SceneManager`] ties the pieces together for a host: it owns the shared
//! chat state, the queue and its worker, and exposes scene CRUD, lifecycle
//! operations, queue control, and the hooks the host calls after it edits
//! the sequence on its own.

use std::ops::RangeInclusive;
use std::sync::Arc;

use parking_lot::Mutex;
use recap_core::ids::{IdGenerator, SceneId, UuidV7Generator};
use recap_settings::RecapSettings;
use tokio::sync::broadcast;
use tracing::{debug, info, instrument};

use crate::errors::SceneError;
use crate::events::{EventEmitter, QueueEvent, QueueProgress};
use crate::lifecycle;
use crate::persistence::{NoopPersistence, Persistence};
use crate::queue::{CancelOutcome, SummaryQueue};
use crate::reconcile::{DeletionReport, reconcile_deletions, reconcile_duplicates};
use crate::selection::SelectionSession;
use crate::state::{ChatState, SharedChat};
use crate::store::{Scene, ScenePatch, SceneStatus};
use crate::summarizer::Summarizer;
use crate::view::{MessageView, render};
use crate::worker::SummarizeWorker;

/// What [`SceneManager::on_chat_loaded`] repaired.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LoadReport {
    /// Scenes found mid-summarization and moved to `error`.
    pub recovered: Vec<SceneId>,
    /// Copied messages given fresh ids.
    pub duplicates: usize,
    /// Deletion pass result.
    pub deletions: DeletionReport,
}

/// Entry point for hosts.
pub struct SceneManager {
    chat: SharedChat,
    queue: SummaryQueue,
    emitter: Arc<EventEmitter>,
    ids: Arc<dyn IdGenerator>,
    persistence: Arc<dyn Persistence>,
}

impl SceneManager {
    /// Build a manager over `state`.
    ///
    /// Does not run load-time recovery; call [`Self::on_chat_loaded`] for that.
    pub fn new(
        state: ChatState,
        summarizer: Arc<dyn Summarizer>,
        persistence: Arc<dyn Persistence>,
        ids: Arc<dyn IdGenerator>,
        settings: &RecapSettings,
    ) -> Self {
        let chat: SharedChat = Arc::new(Mutex::new(state));
        let emitter = Arc::new(EventEmitter::new());
        let worker = SummarizeWorker::new(
            Arc::clone(&chat),
            summarizer,
            Arc::clone(&persistence),
            Arc::clone(&ids),
            Arc::clone(&emitter),
            settings,
        );
        let queue = SummaryQueue::new(
            Arc::clone(&chat),
            Arc::new(worker),
            Arc::clone(&emitter),
            settings.queue.yield_ms,
        );
        Self {
            chat,
            queue,
            emitter,
            ids,
            persistence,
        }
    }

    /// UUID v7 ids, no persistence, global settings.
    pub fn with_defaults(state: ChatState, summarizer: Arc<dyn Summarizer>) -> Self {
        Self::new(
            state,
            summarizer,
            Arc::new(NoopPersistence),
            Arc::new(UuidV7Generator),
            &recap_settings::get_settings(),
        )
    }

    /// Shared chat state. Do not hold the lock across an `.await`.
    pub fn chat(&self) -> &SharedChat {
        &self.chat
    }

    /// Run `f` with the chat locked.
    pub fn with_chat<R>(&self, f: impl FnOnce(&mut ChatState) -> R) -> R {
        f(&mut self.chat.lock())
    }

    /// Queue notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<QueueEvent> {
        self.emitter.subscribe()
    }

    fn persist(&self, chat: &ChatState, sequence: bool) {
        if sequence {
            self.persistence.persist_sequence(&chat.messages);
        }
        self.persistence.persist_scenes(&chat.store);
    }

    // ── Scenes ──────────────────────────────────────────────────────────────

    /// Declare a scene over `range`.
    pub fn create_scene(
        &self,
        range: RangeInclusive<usize>,
        custom_guidance: Option<String>,
    ) -> Result<Scene, SceneError> {
        let mut chat = self.chat.lock();
        let ChatState { messages, store } = &mut *chat;
        let scene = store.create(messages, range, custom_guidance, self.ids.as_ref())?;
        self.persist(&chat, true);
        Ok(scene)
    }

    /// Declare a scene over the session's selection.
    pub fn create_from_selection(
        &self,
        selection: &SelectionSession,
        custom_guidance: Option<String>,
    ) -> Result<Scene, SceneError> {
        let range = selection.range().ok_or(SceneError::EmptySelection)?;
        self.create_scene(range, custom_guidance)
    }

    /// Snapshot of one scene.
    pub fn scene(&self, id: &SceneId) -> Option<Scene> {
        self.chat.lock().store.get(id).cloned()
    }

    /// All scenes in position order.
    pub fn scenes(&self) -> Vec<Scene> {
        let chat = self.chat.lock();
        chat.store
            .list_ordered_by_position(&chat.messages)
            .into_iter()
            .cloned()
            .collect()
    }

    /// Patch a scene. Returns `false` for an unknown id.
    pub fn update_scene(&self, id: &SceneId, patch: ScenePatch) -> bool {
        let mut chat = self.chat.lock();
        let updated = chat.store.update(id, patch);
        if updated {
            self.persist(&chat, false);
        }
        updated
    }

    /// Delete a scene, cancelling it first if queued or running.
    #[instrument(skip_all, fields(scene_id = %id))]
    pub fn delete_scene(&self, id: &SceneId) -> Result<Scene, SceneError> {
        let _ = self.queue.cancel(id);
        let mut chat = self.chat.lock();
        let ChatState { messages, store } = &mut *chat;
        let removed = lifecycle::delete_scene(store, messages, id)?;
        self.persist(&chat, true);
        Ok(removed)
    }

    /// Scenes claiming any message in `range`.
    pub fn find_overlaps(&self, range: RangeInclusive<usize>) -> Vec<SceneId> {
        let chat = self.chat.lock();
        chat.store.overlaps(&chat.messages, range)
    }

    /// Scenes claiming the message at `position`.
    pub fn membership(&self, position: usize) -> Vec<SceneId> {
        let chat = self.chat.lock();
        chat.store.membership(&chat.messages, position)
    }

    // ── Lifecycle ───────────────────────────────────────────────────────────

    /// Remove a completed scene's summary and show its sources again.
    pub fn undo(&self, id: &SceneId) -> Result<(), SceneError> {
        let mut chat = self.chat.lock();
        let ChatState { messages, store } = &mut *chat;
        lifecycle::undo(store, messages, id)?;
        self.persist(&chat, true);
        Ok(())
    }

    /// Fold or unfold a completed scene.
    pub fn set_folded(&self, id: &SceneId, folded: bool) -> Result<(), SceneError> {
        let mut chat = self.chat.lock();
        let ChatState { messages, store } = &mut *chat;
        lifecycle::set_folded(store, messages, id, folded)?;
        self.persist(&chat, true);
        Ok(())
    }

    /// Undo a completed scene if needed, then queue it again.
    pub fn resummarize(&self, id: &SceneId) -> Result<bool, SceneError> {
        {
            let mut chat = self.chat.lock();
            let ChatState { messages, store } = &mut *chat;
            let status = store
                .get(id)
                .map(|s| s.status)
                .ok_or_else(|| SceneError::NotFound(id.clone()))?;
            if status == SceneStatus::Completed {
                lifecycle::undo(store, messages, id)?;
                self.persist(&chat, true);
            }
        }
        Ok(self.queue.enqueue(id))
    }

    // ── Queue ───────────────────────────────────────────────────────────────

    /// Queue one scene for summarization.
    pub fn enqueue(&self, id: &SceneId) -> bool {
        let accepted = self.queue.enqueue(id);
        if accepted {
            self.persist(&self.chat.lock(), false);
        }
        accepted
    }

    /// Queue several scenes as one batch.
    pub fn enqueue_many(&self, ids: &[SceneId]) -> usize {
        let accepted = self.queue.enqueue_many(ids);
        if accepted > 0 {
            self.persist(&self.chat.lock(), false);
        }
        accepted
    }

    /// Queue every `defined` or `error` scene, in position order.
    pub fn enqueue_unsummarized(&self) -> usize {
        let ids: Vec<SceneId> = self
            .scenes()
            .into_iter()
            .filter(|s| matches!(s.status, SceneStatus::Defined | SceneStatus::Error))
            .map(|s| s.id)
            .collect();
        self.enqueue_many(&ids)
    }

    /// Cancel one scene.
    pub fn cancel(&self, id: &SceneId) -> CancelOutcome {
        let outcome = self.queue.cancel(id);
        if outcome == CancelOutcome::Dequeued {
            self.persist(&self.chat.lock(), false);
        }
        outcome
    }

    /// Cancel everything queued or running.
    pub fn cancel_all(&self) {
        self.queue.cancel_all();
        self.persist(&self.chat.lock(), false);
    }

    /// Whether the queue is running.
    pub fn is_processing(&self) -> bool {
        self.queue.is_processing()
    }

    /// Scene being summarized.
    pub fn active_id(&self) -> Option<SceneId> {
        self.queue.active_id()
    }

    /// Scenes waiting.
    pub fn pending_ids(&self) -> Vec<SceneId> {
        self.queue.pending_ids()
    }

    /// Queue progress.
    pub fn progress(&self) -> QueueProgress {
        self.queue.progress()
    }

    // ── Host hooks ──────────────────────────────────────────────────────────

    /// The host removed messages.
    pub fn on_messages_deleted(&self) -> DeletionReport {
        let report = {
            let mut chat = self.chat.lock();
            let ChatState { messages, store } = &mut *chat;
            let report = reconcile_deletions(store, messages);
            if !report.is_empty() {
                self.persist(&chat, true);
            }
            report
        };
        for id in &report.deleted {
            let _ = self.queue.cancel(id);
        }
        report
    }

    /// The host copied messages.
    pub fn on_messages_duplicated(&self) -> usize {
        let mut chat = self.chat.lock();
        let ChatState { messages, store } = &mut *chat;
        let repairs = reconcile_duplicates(store, messages, self.ids.as_ref());
        if repairs > 0 {
            self.persist(&chat, true);
        }
        repairs
    }

    /// The host edited the message at `position`.
    pub fn on_message_edited(&self, position: usize) -> Option<SceneId> {
        let mut chat = self.chat.lock();
        let ChatState { messages, store } = &mut *chat;
        let stale = lifecycle::mark_edited(store, messages, position);
        if stale.is_some() {
            self.persist(&chat, false);
        }
        stale
    }

    /// Replace the chat with freshly loaded state and repair it.
    ///
    /// Cancels anything in flight first, then recovers interrupted scenes and
    /// runs both reconciliation passes.
    #[instrument(skip_all)]
    pub fn on_chat_loaded(&self, state: ChatState) -> LoadReport {
        self.queue.cancel_all();
        let mut chat = self.chat.lock();
        *chat = state;
        let ChatState { messages, store } = &mut *chat;

        let recovered = lifecycle::recover_interrupted(store);
        let duplicates = reconcile_duplicates(store, messages, self.ids.as_ref());
        let deletions = reconcile_deletions(store, messages);
        let report = LoadReport {
            recovered,
            duplicates,
            deletions,
        };
        if report != LoadReport::default() {
            self.persist(&chat, true);
        }
        info!(
            messages = chat.messages.len(),
            scenes = chat.store.len(),
            recovered = report.recovered.len(),
            duplicates = report.duplicates,
            "chat loaded"
        );
        report
    }

    /// Current display projection.
    pub fn render(&self) -> Vec<MessageView> {
        let chat = self.chat.lock();
        debug!(messages = chat.messages.len(), "rendering");
        render(&chat.store, &chat.messages)
    }
}
