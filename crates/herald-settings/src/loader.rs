//! Settings loading with deep merge and environment variable overrides.
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use crate::errors::Result;
use crate::types::{herald_home, HeraldSettings};

/// Resolve the path to the settings file (`~/.herald/settings.json`).
pub fn settings_path() -> PathBuf {
    herald_home().join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<HeraldSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults; invalid JSON or an invalid merged value
/// is an error.
pub fn load_settings_from_path(path: &Path) -> Result<HeraldSettings> {
    let defaults = serde_json::to_value(HeraldSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    let mut settings: HeraldSettings = serde_json::from_value(merged)?;
    apply_env_overrides(&mut settings);
    settings.validate()?;
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

/// Apply `HERALD_*` environment overrides. Invalid values are ignored with a
/// warning.
pub fn apply_env_overrides(settings: &mut HeraldSettings) {
    apply_overrides(settings, |name| std::env::var(name).ok());
}

/// Same as [`apply_env_overrides`] but reading from `lookup`, so tests do not
/// touch the process environment.
pub fn apply_overrides(settings: &mut HeraldSettings, lookup: impl Fn(&str) -> Option<String>) {
    let string = |name: &str| lookup(name).filter(|v| !v.is_empty());

    // ── Hub ─────────────────────────────────────────────────────────
    if let Some(v) = string("HERALD_HOST") {
        settings.hub.host = v;
    }
    if let Some(v) = string("HERALD_PORT") {
        match parse_u16_range(&v, 1, 65535) {
            Some(port) => settings.hub.port = port,
            None => tracing::warn!(key = "HERALD_PORT", value = %v, "invalid port, ignoring"),
        }
    }
    if let Some(v) = string("HERALD_HISTORY_LIMIT") {
        match parse_usize_range(&v, 1, 10_000) {
            Some(limit) => settings.hub.history_limit = limit,
            None => tracing::warn!(key = "HERALD_HISTORY_LIMIT", value = %v, "invalid limit, ignoring"),
        }
    }
    if let Some(v) = string("HERALD_ADMIN_TOKEN") {
        settings.hub.admin_token = Some(v.clone());
        settings.client.admin_token = Some(v);
    }

    // ── Client ──────────────────────────────────────────────────────
    if let Some(v) = string("HERALD_HUB_URL") {
        settings.client.hub_url = v;
    }
    if let Some(v) = string("HERALD_DEFAULT_LANGUAGE") {
        settings.client.default_language = v;
    }
    if let Some(v) = string("HERALD_SOUND") {
        match parse_bool(&v) {
            Some(on) => settings.client.sound_enabled = on,
            None => tracing::warn!(key = "HERALD_SOUND", value = %v, "invalid boolean, ignoring"),
        }
    }
    if let Some(v) = string("HERALD_AUDIO_PLAYER") {
        settings.client.audio_player = Some(v);
    }
    if let Some(v) = string("HERALD_DATA_DIR") {
        settings.client.data_dir = PathBuf::from(v);
    }

    // ── Logging ─────────────────────────────────────────────────────
    if let Some(v) = string("HERALD_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = string("HERALD_LOG_JSON") {
        if let Some(json) = parse_bool(&v) {
            settings.logging.json = json;
        }
    }
}

/// Accepts (case-insensitive): `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`.
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

pub fn parse_u16_range(val: &str, min: u16, max: u16) -> Option<u16> {
    let n: u16 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

pub fn parse_usize_range(val: &str, min: usize, max: usize) -> Option<usize> {
    let n: usize = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}
