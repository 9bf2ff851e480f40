//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`RecapSettings::default()`]
//! 2. If `~/.recap/settings.json` exists, deep-merge user values over defaults
//! 3. Apply `RECAP_*` environment variable overrides (highest priority)
//! 4. [`RecapSettings::validate`]
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use crate::errors::Result;
use crate::types::RecapSettings;

/// Resolve the path to the settings file (`~/.recap/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".recap").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<RecapSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults; invalid JSON is an error.
pub fn load_settings_from_path(path: &Path) -> Result<RecapSettings> {
    let defaults = serde_json::to_value(RecapSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    let mut settings: RecapSettings = serde_json::from_value(merged)?;
    apply_env_overrides(&mut settings);
    settings.validate();
    Ok(settings)
}

/// Recursive deep merge of two JSON values.
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = if let Some(target_val) = target_map.remove(&key) {
                    deep_merge(target_val, source_val)
                } else {
                    source_val
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply environment variable overrides to loaded settings.
///
/// Invalid values are ignored with a warning (fall back to file/default).
pub fn apply_env_overrides(settings: &mut RecapSettings) {
    if let Some(v) = read_env_u64("RECAP_MAX_RETRIES", 0, 20) {
        settings.retry.max_retries = v as u32;
    }
    if let Some(v) = read_env_u64("RECAP_RETRY_BASE_DELAY_MS", 0, 600_000) {
        settings.retry.base_delay_ms = v;
    }
    if let Some(v) = read_env_u64("RECAP_QUEUE_YIELD_MS", 0, 10_000) {
        settings.queue.yield_ms = v;
    }
    if let Some(v) = read_env_string("RECAP_SUMMARY_NAME") {
        settings.summarization.summary_name = v;
    }
    if let Some(v) = read_env_string("RECAP_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = read_env_bool("RECAP_LOG_JSON") {
        settings.logging.json = v;
    }
}

// ── Pure parsing functions (testable without env vars) ──────────────────────

/// Parse a string as a `u64` within an inclusive range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.trim().parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a boolean flag: `1`/`true`/`yes`/`on` or `0`/`false`/`no`/`off`.
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn read_env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn read_env_u64(name: &str, min: u64, max: u64) -> Option<u64> {
    let val = std::env::var(name).ok()?;
    let result = parse_u64_range(&val, min, max);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid u64 env var, ignoring");
    }
    result
}

fn read_env_bool(name: &str) -> Option<bool> {
    let val = std::env::var(name).ok()?;
    let result = parse_bool(&val);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid bool env var, ignoring");
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::SettingsError;

    #[test]
    fn bool_flags() {
        assert_eq!(parse_bool(" TRUE "), Some(true));
        assert_eq!(parse_bool("off"), Some(false));
        assert_eq!(parse_bool("maybe"), None);
    }

    #[test]
    fn merge_nested_override() {
        let target = serde_json::json!({"retry": {"maxRetries": 2, "baseDelayMs": 1000}});
        let source = serde_json::json!({"retry": {"maxRetries": 5}});
        let merged = deep_merge(target, source);
        assert_eq!(merged["retry"]["maxRetries"], 5);
        assert_eq!(merged["retry"]["baseDelayMs"], 1000);
    }

    #[test]
    fn merge_null_preserves_target() {
        let merged = deep_merge(serde_json::json!({"a": 1}), serde_json::json!({"a": null}));
        assert_eq!(merged["a"], 1);
    }

    #[test]
    fn merge_array_replace() {
        let merged = deep_merge(
            serde_json::json!({"items": [1, 2, 3]}),
            serde_json::json!({"items": [4]}),
        );
        assert_eq!(merged["items"], serde_json::json!([4]));
    }

    #[test]
    fn merge_primitive_replaces_object() {
        let merged = deep_merge(
            serde_json::json!({"a": {"nested": true}}),
            serde_json::json!({"a": 42}),
        );
        assert_eq!(merged["a"], 42);
    }

    #[test]
    fn load_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = load_settings_from_path(&dir.path().join("nope.json")).unwrap();
        assert_eq!(settings.summarization.summary_name, "Scene Summary");
    }

    #[test]
    fn load_partial_file_merges_over_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{"summarization": {"promptTemplate": "Summarize briefly."}, "queue": {"yieldMs": 0}}"#,
        )
        .unwrap();
        let settings = load_settings_from_path(&path).unwrap();
        assert_eq!(
            settings.summarization.prompt_template.as_deref(),
            Some("Summarize briefly.")
        );
        assert_eq!(settings.queue.yield_ms, 0);
        assert_eq!(settings.summarization.max_error_chars, 500);
    }

    #[test]
    fn load_invalid_json_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "{ not json").unwrap();
        let err = load_settings_from_path(&path).unwrap_err();
        assert!(matches!(err, SettingsError::Json(_)));
    }

    #[test]
    fn load_validates_after_merge() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"retry": {"jitterFactor": -4.0}}"#).unwrap();
        let settings = load_settings_from_path(&path).unwrap();
        assert!(settings.retry.jitter_factor.abs() < f64::EPSILON);
    }

    #[test]
    fn parse_u64_range_bounds() {
        assert_eq!(parse_u64_range("5", 0, 10), Some(5));
        assert_eq!(parse_u64_range(" 10 ", 0, 10), Some(10));
        assert_eq!(parse_u64_range("11", 0, 10), None);
        assert_eq!(parse_u64_range("-1", 0, 10), None);
        assert_eq!(parse_u64_range("abc", 0, 10), None);
    }

    #[test]
    fn settings_path_ends_with_recap_dir() {
        let path = settings_path();
        assert!(path.ends_with(".recap/settings.json"));
    }
}
