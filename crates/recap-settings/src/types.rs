//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase", default)]`, so partial
//! JSON is accepted and missing fields get their production default.

use recap_core::retry::{
    DEFAULT_BASE_DELAY_MS, DEFAULT_JITTER_FACTOR, DEFAULT_MAX_DELAY_MS, DEFAULT_MAX_RETRIES,
    RetryPolicy,
};
use serde::{Deserialize, Serialize};

/// Root settings type.
///
/// Loaded from `~/.recap/settings.json` with defaults applied for missing
/// fields. Example:
///
/// ```json
/// {
///   "summarization": { "summaryName": "Chapter Recap" },
///   "retry": { "maxRetries": 4 }
/// }
/// ```
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RecapSettings {
    /// Settings schema version.
    pub version: String,
    /// Prompt and summary-message settings.
    pub summarization: SummarizationSettings,
    /// Retry bounds for summarizer calls.
    pub retry: RetrySettings,
    /// Queue pacing.
    pub queue: QueueSettings,
    /// Logging configuration.
    pub logging: LoggingSettings,
}

impl Default for RecapSettings {
    fn default() -> Self {
        Self {
            version: "0.1.0".to_string(),
            summarization: SummarizationSettings::default(),
            retry: RetrySettings::default(),
            queue: QueueSettings::default(),
            logging: LoggingSettings::default(),
        }
    }
}

impl RecapSettings {
    /// Clamp out-of-range values and correct invalid invariants.
    ///
    /// Called automatically during loading. Values are corrected with a
    /// warning rather than rejected.
    pub fn validate(&mut self) {
        let retry = &mut self.retry;
        if !(0.0..=1.0).contains(&retry.jitter_factor) {
            let clamped = retry.jitter_factor.clamp(0.0, 1.0);
            tracing::warn!(
                "jitter_factor out of range ({}), clamped to {clamped}",
                retry.jitter_factor
            );
            retry.jitter_factor = clamped;
        }
        if retry.max_delay_ms < retry.base_delay_ms {
            tracing::warn!(
                "retry max_delay_ms ({}) < base_delay_ms ({}), correcting",
                retry.max_delay_ms,
                retry.base_delay_ms
            );
            retry.max_delay_ms = retry.base_delay_ms;
        }

        let s = &mut self.summarization;
        if s.max_error_chars < MIN_ERROR_CHARS {
            tracing::warn!(
                "max_error_chars too small ({}), raised to {MIN_ERROR_CHARS}",
                s.max_error_chars
            );
            s.max_error_chars = MIN_ERROR_CHARS;
        }
        if s.summary_name.trim().is_empty() {
            tracing::warn!("summary_name is blank, restoring default");
            s.summary_name = DEFAULT_SUMMARY_NAME.to_string();
        }
    }
}

const MIN_ERROR_CHARS: usize = 32;
const DEFAULT_SUMMARY_NAME: &str = "Scene Summary";

/// Prompt and summary-message settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SummarizationSettings {
    /// Replaces the built-in summarization instructions when set.
    pub prompt_template: Option<String>,
    /// Speaker name on inserted summary messages.
    pub summary_name: String,
    /// Per-message cap on transcript text sent to the summarizer (bytes).
    pub max_message_chars: usize,
    /// Cap on the recorded `last_error` text (bytes).
    pub max_error_chars: usize,
}

impl Default for SummarizationSettings {
    fn default() -> Self {
        Self {
            prompt_template: None,
            summary_name: DEFAULT_SUMMARY_NAME.to_string(),
            max_message_chars: 4000,
            max_error_chars: 500,
        }
    }
}

/// Retry configuration for summarizer calls.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RetrySettings {
    /// Retries allowed after the first attempt.
    pub max_retries: u32,
    /// Base delay between retries in milliseconds.
    pub base_delay_ms: u64,
    /// Maximum delay between retries in milliseconds.
    pub max_delay_ms: u64,
    /// Jitter factor (0.0–1.0) applied to retry delays.
    pub jitter_factor: f64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            base_delay_ms: DEFAULT_BASE_DELAY_MS,
            max_delay_ms: DEFAULT_MAX_DELAY_MS,
            jitter_factor: DEFAULT_JITTER_FACTOR,
        }
    }
}

impl From<&RetrySettings> for RetryPolicy {
    fn from(s: &RetrySettings) -> Self {
        Self {
            max_retries: s.max_retries,
            base_delay_ms: s.base_delay_ms,
            max_delay_ms: s.max_delay_ms,
            jitter_factor: s.jitter_factor,
        }
    }
}

/// Queue pacing.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct QueueSettings {
    /// Cooperative pause between queue items, letting observers settle.
    pub yield_ms: u64,
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self { yield_ms: 50 }
    }
}

/// Logging configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default filter when `RUST_LOG` is unset.
    pub level: String,
    /// Emit JSON lines instead of compact text.
    pub json: bool,
}

/// Output format picked by [`LoggingSettings::format`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogFormat {
    /// Compact human-readable lines.
    Compact,
    /// One JSON object per line.
    Json,
}

impl LoggingSettings {
    /// Format requested by the `json` flag.
    pub fn format(&self) -> LogFormat {
        if self.json { LogFormat::Json } else { LogFormat::Compact }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
            json: false,
        }
    }
}
