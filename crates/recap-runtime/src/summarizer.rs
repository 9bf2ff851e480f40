//! Summarizer seam and prompt construction.
//!
//! The runtime never talks to a model directly. The host supplies a
//! [`Summarizer`] that turns a prompt into text and honours the
//! cancellation token.

use async_trait::async_trait;
use recap_core::messages::Message;
use recap_core::text::{collapse_whitespace, truncate_with_suffix};
use recap_settings::SummarizationSettings;
use tokio_util::sync::CancellationToken;

use crate::identity::{build_index, resolve};
use crate::store::Scene;

// =============================================================================
// Summarizer Trait
// =============================================================================

/// Produces a summary for a prompt.
///
/// Implementations should return [`SummarizerError::Cancelled`] promptly once
/// `cancel` fires; the worker treats any other error text as a failure to
/// classify.
#[async_trait]
pub trait Summarizer: Send + Sync {
    /// Summarize `prompt`.
    async fn summarize(
        &self,
        prompt: &str,
        cancel: CancellationToken,
    ) -> Result<String, SummarizerError>;
}

/// Errors a [`Summarizer`] can report.
#[derive(Debug, thiserror::Error)]
pub enum SummarizerError {
    /// The call stopped because the token fired.
    #[error("summarizer call cancelled")]
    Cancelled,

    /// The call failed; `message` is classified for retry.
    #[error("summarizer call failed: {message}")]
    Failed {
        /// Provider error text.
        message: String,
    },
}

impl SummarizerError {
    /// Convenience constructor for [`SummarizerError::Failed`].
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed {
            message: message.into(),
        }
    }
}

// =============================================================================
// Prompt
// =============================================================================

/// Built-in instructions used when no template is configured.
pub const DEFAULT_INSTRUCTIONS: &str = "Summarize the following scene from an ongoing story. \
Keep names, decisions, and anything later messages may depend on. \
Write in past tense, third person, as a single concise paragraph.";

const TRUNCATION_SUFFIX: &str = " [...]";

/// Assemble the summarization prompt for `scene`.
///
/// Layout: instructions (or the configured template), the scene's custom
/// guidance, then a transcript of the sources as `Name: text` lines.
/// Sources that no longer resolve are skipped.
pub fn build_prompt(
    scene: &Scene,
    messages: &[Message],
    settings: &SummarizationSettings,
) -> String {
    let instructions = settings
        .prompt_template
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .unwrap_or(DEFAULT_INSTRUCTIONS);

    let mut prompt = String::from(instructions);
    if let Some(guidance) = &scene.custom_guidance {
        prompt.push_str("\n\nAdditional guidance: ");
        prompt.push_str(guidance);
    }

    prompt.push_str("\n\n<transcript>\n");
    let index = build_index(messages);
    for sid in &scene.source_ids {
        let Some(pos) = resolve(messages, sid, Some(&index)) else {
            continue;
        };
        let message = &messages[pos];
        let text = collapse_whitespace(&message.text);
        let text = truncate_with_suffix(&text, settings.max_message_chars, TRUNCATION_SUFFIX);
        prompt.push_str(&message.name);
        prompt.push_str(": ");
        prompt.push_str(&text);
        prompt.push('\n');
    }
    prompt.push_str("</transcript>");
    prompt
}
