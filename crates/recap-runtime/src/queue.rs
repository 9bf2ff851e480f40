//! Single-flight summarization queue.
//!
//! Scenes are processed strictly one at a time, in FIFO order. Each active
//! item owns a [`CancellationToken`]; cancelling a pending item just removes
//! it, cancelling the active one signals its token and lets the worker wind
//! down.
//!
//! Lock order: queue state, then chat. The worker only ever takes the chat
//! lock, and neither lock is held across an `.await`.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use metrics::gauge;
use parking_lot::Mutex;
use recap_core::ids::SceneId;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::errors::RuntimeError;
use crate::events::{EventEmitter, ItemOutcome, QueueEvent, QueueProgress};
use crate::lifecycle;
use crate::state::SharedChat;
use crate::store::SceneStatus;
use crate::worker::SceneWorker;

/// Result of [`SummaryQueue::cancel`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CancelOutcome {
    /// Removed from the pending list and reverted to `defined`.
    Dequeued,
    /// Active; its token was signalled.
    Signalled,
    /// Neither pending nor active. Nothing changed.
    NotQueued,
}

struct ActiveItem {
    scene_id: SceneId,
    cancel: CancellationToken,
}

#[derive(Default)]
struct QueueState {
    pending: VecDeque<SceneId>,
    active: Option<ActiveItem>,
    processing: bool,
    batch_total: usize,
    batch_done: usize,
}

impl QueueState {
    fn contains(&self, id: &SceneId) -> bool {
        self.pending.contains(id) || self.active.as_ref().is_some_and(|a| a.scene_id == *id)
    }

    fn progress(&self) -> QueueProgress {
        QueueProgress {
            current_ordinal: if self.batch_total == 0 {
                0
            } else {
                (self.batch_done + 1).min(self.batch_total)
            },
            total: self.batch_total,
            active_id: self.active.as_ref().map(|a| a.scene_id.clone()),
            pending_count: self.pending.len(),
        }
    }

    fn reset_batch(&mut self) {
        self.batch_total = 0;
        self.batch_done = 0;
    }

    #[allow(clippy::cast_precision_loss)]
    fn record_pending(&self) {
        gauge!("scene_queue_pending").set(self.pending.len() as f64);
    }
}

struct QueueInner {
    state: Mutex<QueueState>,
    chat: SharedChat,
    worker: Arc<dyn SceneWorker>,
    emitter: Arc<EventEmitter>,
    yield_ms: u64,
}

/// Cloneable handle to the queue.
#[derive(Clone)]
pub struct SummaryQueue {
    inner: Arc<QueueInner>,
}

impl SummaryQueue {
    /// Create an idle queue.
    pub fn new(
        chat: SharedChat,
        worker: Arc<dyn SceneWorker>,
        emitter: Arc<EventEmitter>,
        yield_ms: u64,
    ) -> Self {
        Self {
            inner: Arc::new(QueueInner {
                state: Mutex::new(QueueState::default()),
                chat,
                worker,
                emitter,
                yield_ms,
            }),
        }
    }

    /// Subscribe to queue notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<QueueEvent> {
        self.inner.emitter.subscribe()
    }

    /// Append a scene and start processing if idle.
    ///
    /// Returns `false` when the scene is unknown, already queued or active,
    /// or not in `defined`/`error`. Processing starts only inside a Tokio
    /// runtime; otherwise the item waits for the next call that has one.
    #[instrument(skip_all, fields(scene_id = %scene_id))]
    pub fn enqueue(&self, scene_id: &SceneId) -> bool {
        let mut state = self.inner.state.lock();
        if state.contains(scene_id) {
            debug!("already queued");
            return false;
        }
        if let Err(e) = lifecycle::mark_queued(&mut self.inner.chat.lock().store, scene_id) {
            debug!(error = %e, "enqueue refused");
            return false;
        }
        state.pending.push_back(scene_id.clone());
        state.batch_total += 1;
        state.record_pending();
        let progress = state.progress();
        let start = self.claim_loop(&mut state);
        drop(state);

        let _ = self.inner.emitter.emit(QueueEvent::Enqueued {
            scene_id: scene_id.clone(),
            progress,
        });
        if start {
            self.spawn_loop();
        }
        true
    }

    /// Enqueue several scenes as one batch. Returns how many were accepted.
    ///
    /// Progress totals restart from whatever is still pending or active.
    pub fn enqueue_many<'a>(&self, scene_ids: impl IntoIterator<Item = &'a SceneId>) -> usize {
        {
            let mut state = self.inner.state.lock();
            state.batch_total = state.pending.len() + usize::from(state.active.is_some());
            state.batch_done = 0;
        }
        scene_ids.into_iter().filter(|id| self.enqueue(id)).count()
    }

    /// Cancel one scene, pending or active.
    #[instrument(skip_all, fields(scene_id = %scene_id))]
    pub fn cancel(&self, scene_id: &SceneId) -> CancelOutcome {
        let mut state = self.inner.state.lock();
        if let Some(pos) = state.pending.iter().position(|id| id == scene_id) {
            let _ = state.pending.remove(pos);
            let _ = lifecycle::revert_cancelled(&mut self.inner.chat.lock().store, scene_id);
            state.batch_done += 1;
            state.record_pending();
            let progress = state.progress();
            drop(state);
            info!("pending scene cancelled");
            let _ = self.inner.emitter.emit(QueueEvent::Cancelled {
                scene_id: scene_id.clone(),
                progress,
            });
            return CancelOutcome::Dequeued;
        }
        if let Some(active) = state.active.as_ref().filter(|a| a.scene_id == *scene_id) {
            info!("cancelling active scene");
            active.cancel.cancel();
            return CancelOutcome::Signalled;
        }
        CancelOutcome::NotQueued
    }

    /// Cancel everything: signal the active item and drop all pending ones.
    #[instrument(skip(self))]
    pub fn cancel_all(&self) {
        let mut state = self.inner.state.lock();
        if let Some(active) = &state.active {
            active.cancel.cancel();
        }
        let dropped: Vec<SceneId> = state.pending.drain(..).collect();
        {
            let mut chat = self.inner.chat.lock();
            for id in &dropped {
                let _ = lifecycle::revert_cancelled(&mut chat.store, id);
            }
        }
        state.reset_batch();
        state.record_pending();
        let progress = state.progress();
        drop(state);

        info!(dropped = dropped.len(), "queue cancelled");
        for scene_id in dropped {
            let _ = self.inner.emitter.emit(QueueEvent::Cancelled {
                scene_id,
                progress: progress.clone(),
            });
        }
    }

    /// Whether the processing loop is running.
    pub fn is_processing(&self) -> bool {
        self.inner.state.lock().processing
    }

    /// Scene currently being summarized.
    pub fn active_id(&self) -> Option<SceneId> {
        self.inner.state.lock().active.as_ref().map(|a| a.scene_id.clone())
    }

    /// Scenes waiting, in order.
    pub fn pending_ids(&self) -> Vec<SceneId> {
        self.inner.state.lock().pending.iter().cloned().collect()
    }

    /// Current progress snapshot.
    pub fn progress(&self) -> QueueProgress {
        self.inner.state.lock().progress()
    }

    /// Mark the loop as running if it is idle and a runtime is available.
    fn claim_loop(&self, state: &mut QueueState) -> bool {
        if state.processing {
            return false;
        }
        if tokio::runtime::Handle::try_current().is_err() {
            warn!("no tokio runtime; queue will start on the next enqueue inside one");
            return false;
        }
        state.processing = true;
        true
    }

    fn spawn_loop(&self) {
        let queue = self.clone();
        drop(tokio::spawn(async move { queue.run_loop().await }));
    }

    async fn run_loop(self) {
        debug!("queue loop started");
        loop {
            let (scene_id, cancel, progress) = {
                let mut state = self.inner.state.lock();
                let Some(next) = state.pending.pop_front() else {
                    state.processing = false;
                    state.reset_batch();
                    drop(state);
                    debug!("queue drained");
                    let _ = self.inner.emitter.emit(QueueEvent::Drained);
                    return;
                };
                let cancel = CancellationToken::new();
                state.active = Some(ActiveItem {
                    scene_id: next.clone(),
                    cancel: cancel.clone(),
                });
                state.record_pending();
                (next, cancel, state.progress())
            };

            let _ = self.inner.emitter.emit(QueueEvent::Started {
                scene_id: scene_id.clone(),
                progress,
            });

            let outcome = match self.inner.worker.run(scene_id.clone(), cancel).await {
                Ok(()) => ItemOutcome::Completed,
                Err(RuntimeError::Cancelled) => {
                    self.settle(&scene_id, None);
                    ItemOutcome::Cancelled
                }
                Err(e) => {
                    warn!(scene_id = %scene_id, error = %e, "summarization failed");
                    self.settle(&scene_id, Some(&e));
                    ItemOutcome::Failed
                }
            };

            let progress = {
                let mut state = self.inner.state.lock();
                state.active = None;
                if state.batch_total > 0 {
                    state.batch_done += 1;
                }
                state.progress()
            };
            let _ = self.inner.emitter.emit(QueueEvent::Finished {
                scene_id,
                outcome,
                progress,
            });

            if self.inner.yield_ms > 0 {
                tokio::time::sleep(Duration::from_millis(self.inner.yield_ms)).await;
            } else {
                tokio::task::yield_now().await;
            }
        }
    }

    /// Make sure a scene the worker left mid-flight lands somewhere stable.
    fn settle(&self, scene_id: &SceneId, failure: Option<&RuntimeError>) {
        let mut chat = self.inner.chat.lock();
        let stuck = chat
            .store
            .get(scene_id)
            .is_some_and(|s| s.status == SceneStatus::Summarizing);
        if !stuck {
            return;
        }
        match failure {
            Some(e) => {
                let _ = lifecycle::fail(&mut chat.store, scene_id, e.cause());
            }
            None => {
                let _ = lifecycle::revert_cancelled(&mut chat.store, scene_id);
            }
        }
    }
}
