//! Summarizer failure classification.
//!
//! Matches failure text against known patterns to decide whether a
//! summarization attempt may be retried. Two inputs are classified:
//!
//! - [`classify_failure`]: the text of an error raised by the summarizer
//! - [`classify_response`]: the text the model returned, which may be blank
//!   or a safety refusal even though the call itself succeeded
//!
//! Safety-filter refusals, auth failures, rate limiting and exhausted quota
//! are non-retryable: repeating the request immediately will not change the
//! outcome and only burns the retry budget. Everything else is transient.

use serde::{Deserialize, Serialize};

// ─────────────────────────────────────────────────────────────────────────────
// Types
// ─────────────────────────────────────────────────────────────────────────────

/// What kind of failure a summarization attempt hit.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureCategory {
    /// The provider or model refused on content/safety grounds.
    ContentFilter,
    /// Invalid or missing credentials.
    Authentication,
    /// Credentials lack access.
    Authorization,
    /// Rate limit exceeded.
    RateLimit,
    /// Usage quota or credits exhausted.
    Quota,
    /// Connectivity or timeout.
    Network,
    /// Provider-side 5xx or overload.
    Server,
    /// The model returned nothing usable.
    EmptyResponse,
    /// Unrecognized failure.
    Unknown,
}

impl std::fmt::Display for FailureCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::ContentFilter => "content_filter",
            Self::Authentication => "authentication",
            Self::Authorization => "authorization",
            Self::RateLimit => "rate_limit",
            Self::Quota => "quota",
            Self::Network => "network",
            Self::Server => "server",
            Self::EmptyResponse => "empty_response",
            Self::Unknown => "unknown",
        })
    }
}

/// Retry decision for a failed attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FailureClass {
    /// Worth another attempt if budget remains.
    Transient(FailureCategory),
    /// Fail immediately without consuming retry budget.
    NonRetryable(FailureCategory),
}

impl FailureClass {
    /// Whether another attempt is allowed.
    #[must_use]
    pub fn is_retryable(self) -> bool {
        matches!(self, Self::Transient(_))
    }

    /// The underlying category.
    #[must_use]
    pub fn category(self) -> FailureCategory {
        match self {
            Self::Transient(c) | Self::NonRetryable(c) => c,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Pattern matching
// ─────────────────────────────────────────────────────────────────────────────

struct FailurePattern {
    /// Receives the lowercased failure text.
    check: fn(&str) -> bool,
    category: FailureCategory,
    is_retryable: bool,
}

/// Known error-text patterns, checked in order.
fn error_patterns() -> &'static [FailurePattern] {
    static PATTERNS: &[FailurePattern] = &[
        // Safety filters
        FailurePattern {
            check: |s| {
                s.contains("content_filter")
                    || s.contains("content filter")
                    || s.contains("prohibited_content")
                    || s.contains("safety")
                    || s.contains("blocked by")
            },
            category: FailureCategory::ContentFilter,
            is_retryable: false,
        },
        // Authentication
        FailurePattern {
            check: |s| {
                s.contains("401")
                    || s.contains("unauthorized")
                    || s.contains("authentication")
                    || s.contains("invalid api key")
                    || (s.contains("invalid") && s.contains("x-api-key"))
            },
            category: FailureCategory::Authentication,
            is_retryable: false,
        },
        // Authorization
        FailurePattern {
            check: |s| {
                s.contains("403") || s.contains("forbidden") || s.contains("permission_denied")
            },
            category: FailureCategory::Authorization,
            is_retryable: false,
        },
        // Rate limiting
        FailurePattern {
            check: |s| {
                s.contains("429")
                    || (s.contains("rate") && s.contains("limit"))
                    || s.contains("too many requests")
            },
            category: FailureCategory::RateLimit,
            is_retryable: false,
        },
        // Quota
        FailurePattern {
            check: |s| {
                s.contains("quota")
                    || (s.contains("insufficient")
                        && (s.contains("credits") || s.contains("balance")))
            },
            category: FailureCategory::Quota,
            is_retryable: false,
        },
        // Network
        FailurePattern {
            check: |s| {
                s.contains("etimedout")
                    || s.contains("econnreset")
                    || s.contains("econnrefused")
                    || s.contains("timed out")
                    || s.contains("timeout")
                    || s.contains("network")
            },
            category: FailureCategory::Network,
            is_retryable: true,
        },
        // Server
        FailurePattern {
            check: |s| {
                s.contains("500")
                    || s.contains("502")
                    || s.contains("503")
                    || s.contains("overloaded")
            },
            category: FailureCategory::Server,
            is_retryable: true,
        },
    ];
    PATTERNS
}

/// Refusal phrasings seen in model replies.
const REFUSAL_PHRASES: &[&str] = &[
    "i can't assist with",
    "i cannot assist with",
    "i can't help with",
    "i cannot help with",
    "i'm sorry, but i can't",
    "i'm unable to continue",
    "violates our content policy",
    "against my content policy",
];

// ─────────────────────────────────────────────────────────────────────────────
// Public API
// ─────────────────────────────────────────────────────────────────────────────

/// Classify the text of a summarizer error.
///
/// Unrecognized failures are transient.
#[must_use]
pub fn classify_failure(error_text: &str) -> FailureClass {
    let lower = error_text.to_lowercase();
    for pattern in error_patterns() {
        if (pattern.check)(&lower) {
            return if pattern.is_retryable {
                FailureClass::Transient(pattern.category)
            } else {
                FailureClass::NonRetryable(pattern.category)
            };
        }
    }
    FailureClass::Transient(FailureCategory::Unknown)
}

/// Classify a reply the model returned without error.
///
/// Returns `None` when the reply is usable as a summary.
#[must_use]
pub fn classify_response(text: &str) -> Option<FailureClass> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Some(FailureClass::Transient(FailureCategory::EmptyResponse));
    }
    let lower = trimmed.to_lowercase();
    if REFUSAL_PHRASES.iter().any(|p| lower.contains(p)) {
        return Some(FailureClass::NonRetryable(FailureCategory::ContentFilter));
    }
    None
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn rate_limit_is_not_retryable() {
        let class = classify_failure("Provider error: Rate Limit reached for requests");
        assert_eq!(class, FailureClass::NonRetryable(FailureCategory::RateLimit));
        assert!(!class.is_retryable());
    }

    #[test]
    fn http_429_is_rate_limit() {
        assert_eq!(
            classify_failure("HTTP 429").category(),
            FailureCategory::RateLimit
        );
        assert_eq!(
            classify_failure("Too Many Requests").category(),
            FailureCategory::RateLimit
        );
    }

    #[test]
    fn auth_failures_are_not_retryable() {
        assert_matches!(
            classify_failure("401 Unauthorized"),
            FailureClass::NonRetryable(FailureCategory::Authentication)
        );
        assert_matches!(
            classify_failure("invalid x-api-key"),
            FailureClass::NonRetryable(FailureCategory::Authentication)
        );
        assert_matches!(
            classify_failure("403 Forbidden"),
            FailureClass::NonRetryable(FailureCategory::Authorization)
        );
    }

    #[test]
    fn safety_block_is_not_retryable() {
        assert_matches!(
            classify_failure("finish_reason=SAFETY"),
            FailureClass::NonRetryable(FailureCategory::ContentFilter)
        );
        assert_matches!(
            classify_failure("response blocked by content_filter"),
            FailureClass::NonRetryable(FailureCategory::ContentFilter)
        );
    }

    #[test]
    fn quota_is_not_retryable() {
        assert_matches!(
            classify_failure("insufficient credits on account"),
            FailureClass::NonRetryable(FailureCategory::Quota)
        );
    }

    #[test]
    fn network_and_server_are_transient() {
        assert_eq!(
            classify_failure("request timed out"),
            FailureClass::Transient(FailureCategory::Network)
        );
        assert_eq!(
            classify_failure("502 Bad Gateway"),
            FailureClass::Transient(FailureCategory::Server)
        );
        assert_eq!(
            classify_failure("API is overloaded"),
            FailureClass::Transient(FailureCategory::Server)
        );
    }

    #[test]
    fn unknown_errors_are_transient() {
        let class = classify_failure("something odd happened");
        assert_eq!(class, FailureClass::Transient(FailureCategory::Unknown));
        assert!(class.is_retryable());
    }

    #[test]
    fn blank_response_is_transient() {
        assert_eq!(
            classify_response("   \n"),
            Some(FailureClass::Transient(FailureCategory::EmptyResponse))
        );
    }

    #[test]
    fn refusal_response_is_not_retryable() {
        assert_eq!(
            classify_response("I'm sorry, but I can't summarize this conversation."),
            Some(FailureClass::NonRetryable(FailureCategory::ContentFilter))
        );
    }

    #[test]
    fn ordinary_response_is_usable() {
        assert_eq!(classify_response("Ann and Bob met at the docks."), None);
    }

    #[test]
    fn category_display_is_snake_case() {
        assert_eq!(FailureCategory::RateLimit.to_string(), "rate_limit");
        assert_eq!(FailureCategory::EmptyResponse.to_string(), "empty_response");
    }
}
