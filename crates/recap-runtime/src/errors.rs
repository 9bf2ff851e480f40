//! Runtime error types.
//!
//! [`SceneError`] covers validation failures reported synchronously to the
//! caller with no state mutated. [`RuntimeError`] is the summarization path's
//! error, scoped to one scene at a time.

use recap_core::errors::FailureCategory;
use recap_core::ids::SceneId;

use crate::store::SceneStatus;

fn join_ids(ids: &[SceneId]) -> String {
    ids.iter().map(SceneId::as_str).collect::<Vec<_>>().join(", ")
}

/// Validation failures for scene operations.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum SceneError {
    /// No scene with this id.
    #[error("scene not found: {0}")]
    NotFound(SceneId),

    /// The requested range intersects existing scenes.
    #[error("range {start}..={end} overlaps existing scene(s): {}", join_ids(.scenes))]
    Overlap {
        /// First requested position.
        start: usize,
        /// Last requested position.
        end: usize,
        /// Scenes already claiming messages in the range.
        scenes: Vec<SceneId>,
    },

    /// The range does not fit the current sequence.
    #[error("range {start}..={end} is outside the chat ({len} messages)")]
    OutOfBounds {
        /// First requested position.
        start: usize,
        /// Last requested position.
        end: usize,
        /// Current sequence length.
        len: usize,
    },

    /// Start comes after end.
    #[error("invalid range: start {start} is after end {end}")]
    InvertedRange {
        /// First requested position.
        start: usize,
        /// Last requested position.
        end: usize,
    },

    /// A generated summary cannot be a scene source.
    #[error("message {position} is a scene summary and cannot be a source")]
    SummaryInRange {
        /// Position of the summary message.
        position: usize,
    },

    /// Nothing is selected.
    #[error("no messages selected")]
    EmptySelection,

    /// The scene's current state does not allow the requested transition.
    #[error("scene {id} is {status}; cannot {action}")]
    InvalidTransition {
        /// Scene id.
        id: SceneId,
        /// Current status.
        status: SceneStatus,
        /// Attempted action.
        action: &'static str,
    },
}

/// Errors raised on the summarization path.
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    /// Validation failure (unknown scene, refused transition).
    #[error(transparent)]
    Scene(#[from] SceneError),

    /// The cancellation token fired. Not a failure.
    #[error("summarization cancelled")]
    Cancelled,

    /// Every source vanished while the summarizer was running.
    #[error("scene {0} has no source messages left to summarize")]
    SourcesGone(SceneId),

    /// Summarization gave up.
    #[error("summarization failed after {attempts} attempt(s) [{category}]: {message}")]
    Summarization {
        /// Classified failure category.
        category: FailureCategory,
        /// Human-readable cause.
        message: String,
        /// Attempts made, including the first.
        attempts: u32,
    },
}

impl RuntimeError {
    /// Whether this is the cancellation signal rather than a failure.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Short cause suitable for a scene's `last_error`.
    pub fn cause(&self) -> String {
        match self {
            Self::Summarization { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }
}
