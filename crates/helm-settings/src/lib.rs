//! # helm-settings
//!
//! Configuration with layered sources for the Helm run core.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`HelmSettings::default()`]
//! 2. **User file**: `~/.helm/settings.json` (deep-merged over defaults)
//! 3. **Environment variables**: `HELM_*` overrides (highest priority)
//!
//! Library crates never read the global; they receive the values they need
//! through constructors. Only the binary calls [`get_settings`].

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{
    apply_overrides, deep_merge, load_settings, load_settings_from_path, settings_path,
};
pub use types::*;

use std::sync::OnceLock;

static SETTINGS: OnceLock<HelmSettings> = OnceLock::new();

/// Get the global settings instance.
///
/// On first call, loads `~/.helm/settings.json` with env var overrides and
/// falls back to compiled defaults if loading fails.
pub fn get_settings() -> &'static HelmSettings {
    SETTINGS.get_or_init(|| {
        load_settings().unwrap_or_else(|e| {
            tracing::warn!(error = %e, "failed to load settings, using defaults");
            HelmSettings::default()
        })
    })
}

/// Initialize the global settings with a specific value.
///
/// Returns the value back if the global was already initialized.
#[allow(clippy::result_large_err)]
pub fn init_settings(settings: HelmSettings) -> std::result::Result<(), HelmSettings> {
    SETTINGS.set(settings)
}
