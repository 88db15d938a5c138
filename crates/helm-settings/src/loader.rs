//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`HelmSettings::default()`]
//! 2. If `~/.helm/settings.json` exists, deep-merge user values over defaults
//! 3. Apply `HELM_*` environment overrides (highest priority)
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use helm_core::QueueMode;
use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::{Result, SettingsError};
use crate::types::HelmSettings;

/// Resolve the path to the settings file (`~/.helm/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".helm").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<HelmSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults. Invalid JSON is an error.
pub fn load_settings_from_path(path: &Path) -> Result<HelmSettings> {
    let mut settings = load_file_layer(path)?;
    apply_overrides(&mut settings, |name| std::env::var(name).ok());
    Ok(settings)
}

fn load_file_layer(path: &Path) -> Result<HelmSettings> {
    let defaults = serde_json::to_value(HelmSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path).map_err(|source| SettingsError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let user: Value = serde_json::from_str(&content).map_err(|source| SettingsError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    Ok(serde_json::from_value(merged)?)
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

/// Apply `HELM_*` overrides read through `lookup`.
///
/// Empty, unparsable or out-of-range values are ignored with a warning.
pub fn apply_overrides<F>(settings: &mut HelmSettings, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let read = |name: &str| lookup(name).filter(|v| !v.is_empty());

    if let Some(v) = read("HELM_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = read("HELM_LOG_JSON") {
        match parse_bool(&v) {
            Some(b) => settings.logging.json = b,
            None => warn!(key = "HELM_LOG_JSON", value = %v, "invalid boolean env var, ignoring"),
        }
    }
    if let Some(mode) = read("HELM_STEERING_MODE").and_then(|v| parse_mode("HELM_STEERING_MODE", &v)) {
        settings.scheduler.steering_mode = mode;
    }
    if let Some(mode) = read("HELM_FOLLOW_UP_MODE").and_then(|v| parse_mode("HELM_FOLLOW_UP_MODE", &v)) {
        settings.scheduler.follow_up_mode = mode;
    }
    if let Some(v) = read("HELM_MAX_ROUND_TRIPS") {
        match parse_u64_range(&v, 1, 10_000).and_then(|n| u32::try_from(n).ok()) {
            Some(n) => settings.engine.max_round_trips = n,
            None => warn!(key = "HELM_MAX_ROUND_TRIPS", value = %v, "invalid integer env var, ignoring"),
        }
    }
    if let Some(v) = read("HELM_HOOK_TIMEOUT_MS") {
        match parse_u64_range(&v, 1, 600_000) {
            Some(n) => settings.hooks.timeout_ms = Some(n),
            None => warn!(key = "HELM_HOOK_TIMEOUT_MS", value = %v, "invalid integer env var, ignoring"),
        }
    }
    if let Some(v) = read("HELM_EVENT_CAPACITY") {
        match parse_usize_range(&v, 1, 1_048_576) {
            Some(n) => settings.events.capacity = n,
            None => warn!(key = "HELM_EVENT_CAPACITY", value = %v, "invalid integer env var, ignoring"),
        }
    }
}

fn parse_mode(key: &str, value: &str) -> Option<QueueMode> {
    match value.parse() {
        Ok(mode) => Some(mode),
        Err(e) => {
            warn!(key, error = %e, "invalid queue mode env var, ignoring");
            None
        }
    }
}

/// Parse a string as a boolean.
///
/// Accepts (case-insensitive): `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`.
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse a string as a `u64` within an inclusive range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `usize` within an inclusive range.
pub fn parse_usize_range(val: &str, min: usize, max: usize) -> Option<usize> {
    let n: usize = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}
