//! # recap-settings
//!
//! Configuration management with layered sources for Recap.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`RecapSettings::default()`]
//! 2. **User file**: `~/.recap/settings.json` (deep-merged over defaults)
//! 3. **Environment variables**: `RECAP_*` overrides (highest priority)
//!
//! The global snapshot is reloadable: [`reload_settings_from_path`] swaps the
//! cached value so later [`get_settings`] calls see fresh data, while callers
//! holding an earlier `Arc` keep a consistent view.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{deep_merge, load_settings, load_settings_from_path, settings_path};
pub use types::*;

use std::path::Path;
use std::sync::Arc;

use parking_lot::RwLock;

/// Global settings snapshot.
static SETTINGS: RwLock<Option<Arc<RecapSettings>>> = parking_lot::const_rwlock(None);

/// Get the global settings instance.
///
/// On first call, loads from `~/.recap/settings.json` with env overrides;
/// falls back to compiled defaults if loading fails.
pub fn get_settings() -> Arc<RecapSettings> {
    if let Some(s) = SETTINGS.read().as_ref() {
        return Arc::clone(s);
    }

    let mut guard = SETTINGS.write();
    // Another thread may have initialized while we waited
    if let Some(s) = guard.as_ref() {
        return Arc::clone(s);
    }

    let settings = Arc::new(match load_settings() {
        Ok(s) => s,
        Err(e) => {
            tracing::warn!(error = %e, "failed to load settings, using defaults");
            RecapSettings::default()
        }
    });
    *guard = Some(Arc::clone(&settings));
    settings
}

/// Replace the global settings with a specific value.
pub fn init_settings(settings: RecapSettings) {
    *SETTINGS.write() = Some(Arc::new(settings));
}

/// Reload settings from a specific file path and swap the global cache.
pub fn reload_settings_from_path(path: &Path) {
    let new = Arc::new(match load_settings_from_path(path) {
        Ok(s) => s,
        Err(e) => {
            tracing::warn!(
                error = %e,
                ?path,
                "failed to reload settings, falling back to defaults"
            );
            RecapSettings::default()
        }
    });
    *SETTINGS.write() = Some(new);
    tracing::info!(?path, "settings reloaded from disk");
}

/// Install the global tracing subscriber described by `logging`.
///
/// `RUST_LOG` still wins over `logging.level`. Only the first call in a
/// process takes effect; the returned format is the one requested.
pub fn init_logging(logging: &LoggingSettings) -> LogFormat {
    let format = logging.format();
    match format {
        LogFormat::Json => recap_core::logging::init_json_subscriber(&logging.level),
        LogFormat::Compact => recap_core::logging::init_subscriber(&logging.level),
    }
    tracing::debug!(level = %logging.level, ?format, "logging initialized");
    format
}

#[cfg(test)]
pub(crate) fn reset_settings() {
    *SETTINGS.write() = None;
}
