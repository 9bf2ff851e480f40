//! Summarization worker.
//!
//! Runs one scene through `summarizing` to `completed`, `error`, or back to
//! `defined` on cancellation. The chat lock is taken only for the short
//! synchronous steps on either side of the summarizer call.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use metrics::counter;
use recap_core::errors::{FailureCategory, FailureClass, classify_failure, classify_response};
use recap_core::ids::{IdGenerator, SceneId};
use recap_core::messages::Message;
use recap_core::retry::RetryPolicy;
use recap_core::text::truncate_with_suffix;
use recap_settings::{RecapSettings, SummarizationSettings};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::errors::{RuntimeError, SceneError};
use crate::events::{EventEmitter, QueueEvent};
use crate::identity::{build_index, ensure_id, resolve};
use crate::lifecycle;
use crate::persistence::Persistence;
use crate::state::{ChatState, SharedChat};
use crate::store::SceneStatus;
use crate::summarizer::{Summarizer, SummarizerError, build_prompt};

/// Runs a single scene to completion.
#[async_trait]
pub trait SceneWorker: Send + Sync {
    /// Summarize `scene_id`, stopping early once `cancel` fires.
    ///
    /// Returns [`RuntimeError::Cancelled`] when cancelled; the scene has
    /// already been put back in `defined`. Any other error leaves it in
    /// `error`.
    async fn run(&self, scene_id: SceneId, cancel: CancellationToken) -> Result<(), RuntimeError>;
}

/// The production [`SceneWorker`], backed by a [`Summarizer`].
pub struct SummarizeWorker {
    chat: SharedChat,
    summarizer: Arc<dyn Summarizer>,
    persistence: Arc<dyn Persistence>,
    ids: Arc<dyn IdGenerator>,
    emitter: Arc<EventEmitter>,
    settings: SummarizationSettings,
    retry: RetryPolicy,
}

impl SummarizeWorker {
    /// Create a worker over shared chat state.
    pub fn new(
        chat: SharedChat,
        summarizer: Arc<dyn Summarizer>,
        persistence: Arc<dyn Persistence>,
        ids: Arc<dyn IdGenerator>,
        emitter: Arc<EventEmitter>,
        settings: &RecapSettings,
    ) -> Self {
        Self {
            chat,
            summarizer,
            persistence,
            ids,
            emitter,
            settings: settings.summarization.clone(),
            retry: RetryPolicy::from(&settings.retry),
        }
    }

    /// Call the summarizer until it yields usable text, retries run out, or
    /// the token fires.
    async fn generate(
        &self,
        scene_id: &SceneId,
        prompt: &str,
        cancel: &CancellationToken,
    ) -> Result<String, RuntimeError> {
        let max_attempts = self.retry.max_attempts();
        let mut attempt = 0u32;

        loop {
            if cancel.is_cancelled() {
                return Err(RuntimeError::Cancelled);
            }
            attempt += 1;
            let outcome = self.summarizer.summarize(prompt, cancel.clone()).await;
            if cancel.is_cancelled() {
                return Err(RuntimeError::Cancelled);
            }

            let (class, message) = match outcome {
                Ok(text) => match classify_response(&text) {
                    None => return Ok(text.trim().to_owned()),
                    Some(class) => (class, describe_response(class, &text)),
                },
                Err(SummarizerError::Cancelled) => return Err(RuntimeError::Cancelled),
                Err(SummarizerError::Failed { message }) => (classify_failure(&message), message),
            };

            if !class.is_retryable() || attempt >= max_attempts {
                debug!(scene_id = %scene_id, attempt, category = %class.category(), "giving up");
                return Err(RuntimeError::Summarization {
                    category: class.category(),
                    message,
                    attempts: attempt,
                });
            }

            let delay_ms = self.retry.delay_ms(attempt - 1, rand::random::<f64>());
            counter!(
                "scene_summary_retries_total",
                "category" => class.category().to_string()
            )
            .increment(1);
            warn!(
                scene_id = %scene_id,
                attempt,
                max_attempts,
                delay_ms,
                category = %class.category(),
                error = %message,
                "summarization attempt failed, retrying"
            );
            let _ = self.emitter.emit(QueueEvent::RetryNotice {
                scene_id: scene_id.clone(),
                attempt,
                max_attempts,
                delay_ms,
                category: class.category(),
            });

            tokio::select! {
                () = tokio::time::sleep(Duration::from_millis(delay_ms)) => {}
                () = cancel.cancelled() => return Err(RuntimeError::Cancelled),
            }
        }
    }

    /// Insert the summary after the last surviving source and complete.
    fn finish(&self, scene_id: &SceneId, text: String) -> Result<(), RuntimeError> {
        let mut chat = self.chat.lock();
        let ChatState { messages, store } = &mut *chat;

        let Some(scene) = store.get(scene_id) else {
            debug!(scene_id = %scene_id, "scene deleted while summarizing, dropping result");
            return Ok(());
        };
        if scene.status != SceneStatus::Summarizing {
            debug!(
                scene_id = %scene_id,
                status = %scene.status,
                "scene moved on while summarizing, dropping result"
            );
            return Ok(());
        }

        let index = build_index(messages);
        let Some(last) = scene
            .source_ids
            .iter()
            .filter_map(|sid| resolve(messages, sid, Some(&index)))
            .max()
        else {
            return Err(RuntimeError::SourcesGone(scene_id.clone()));
        };

        let mut summary =
            Message::summary(self.settings.summary_name.clone(), text, scene_id.clone());
        let summary_id = ensure_id(&mut summary, self.ids.as_ref());
        messages.insert(last + 1, summary);
        lifecycle::complete(store, messages, scene_id, summary_id)?;

        self.persistence.persist_sequence(messages);
        self.persistence.persist_scenes(store);
        counter!("scene_summaries_total", "outcome" => "completed").increment(1);
        info!(scene_id = %scene_id, position = last + 1, "summary inserted");
        Ok(())
    }

    fn revert(&self, scene_id: &SceneId) {
        let mut chat = self.chat.lock();
        if lifecycle::revert_cancelled(&mut chat.store, scene_id) {
            self.persistence.persist_scenes(&chat.store);
        }
        counter!("scene_summaries_total", "outcome" => "cancelled").increment(1);
    }

    fn fail(&self, scene_id: &SceneId, err: &RuntimeError) {
        let cause = truncate_with_suffix(&err.cause(), self.settings.max_error_chars, "...");
        let mut chat = self.chat.lock();
        if lifecycle::fail(&mut chat.store, scene_id, cause) {
            self.persistence.persist_scenes(&chat.store);
        }
        counter!("scene_summaries_total", "outcome" => "error").increment(1);
    }
}

#[async_trait]
impl SceneWorker for SummarizeWorker {
    #[instrument(skip_all, fields(scene_id = %scene_id))]
    async fn run(&self, scene_id: SceneId, cancel: CancellationToken) -> Result<(), RuntimeError> {
        if cancel.is_cancelled() {
            self.revert(&scene_id);
            return Err(RuntimeError::Cancelled);
        }

        let prompt = {
            let mut chat = self.chat.lock();
            let ChatState { messages, store } = &mut *chat;
            lifecycle::begin_summarizing(store, &scene_id)?;
            self.persistence.persist_scenes(store);
            let scene = store
                .get(&scene_id)
                .ok_or_else(|| SceneError::NotFound(scene_id.clone()))?;
            build_prompt(scene, messages, &self.settings)
        };

        let result = match self.generate(&scene_id, &prompt, &cancel).await {
            Ok(text) => self.finish(&scene_id, text),
            Err(e) => Err(e),
        };

        match result {
            Ok(()) => Ok(()),
            Err(RuntimeError::Cancelled) => {
                self.revert(&scene_id);
                Err(RuntimeError::Cancelled)
            }
            Err(e) => {
                self.fail(&scene_id, &e);
                Err(e)
            }
        }
    }
}

fn describe_response(class: FailureClass, text: &str) -> String {
    match class.category() {
        FailureCategory::EmptyResponse => "summarizer returned an empty response".to_owned(),
        _ => format!("summarizer declined: {}", text.trim()),
    }
}
