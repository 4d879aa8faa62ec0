//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`RookSettings::default()`]
//! 2. If the settings file exists, deep-merge its values over the defaults
//! 3. Apply `ROOK_*` environment variable overrides (highest priority)
//! 4. Validate the result

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use crate::errors::Result;
use crate::types::{HubScope, RookSettings};

/// Directory holding the settings file and, by default, the database.
pub fn rook_home() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".rook")
}

/// Resolve the path to the settings file (`~/.rook/settings.json`).
pub fn settings_path() -> PathBuf {
    rook_home().join("settings.json")
}

/// Resolve a possibly relative path against [`rook_home`].
pub fn resolve_path(raw: &str) -> PathBuf {
    let path = PathBuf::from(raw);
    if path.is_absolute() {
        path
    } else {
        rook_home().join(path)
    }
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<RookSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults; a file with invalid JSON is an error.
pub fn load_settings_from_path(path: &Path) -> Result<RookSettings> {
    let mut settings = load_file_layer(path)?;
    apply_env_overrides(&mut settings, |name| std::env::var(name).ok());
    settings.validate()?;
    Ok(settings)
}

fn load_file_layer(path: &Path) -> Result<RookSettings> {
    let defaults = serde_json::to_value(RookSettings::default())?;
    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };
    Ok(serde_json::from_value(merged)?)
}

/// Recursive deep merge of two JSON values.
///
/// - Objects are merged recursively (source overrides target per-key)
/// - Arrays and primitives are replaced entirely by source
/// - Null values in source are skipped (preserving target)
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

/// Apply environment overrides read through `lookup`.
///
/// Invalid values are ignored with a warning and the file/default value is
/// kept.
pub fn apply_env_overrides<F>(settings: &mut RookSettings, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let env = EnvReader { lookup };

    if let Some(v) = env.string("ROOK_HOST") {
        settings.server.host = v;
    }
    if let Some(v) = env.u64_in("ROOK_PORT", 0, u64::from(u16::MAX)) {
        settings.server.port = v as u16;
    }
    if let Some(v) = env.u64_in("ROOK_MAX_MESSAGE_SIZE", 1, 16 * 1024 * 1024) {
        settings.server.max_message_size = v as usize;
    }
    if let Some(v) = env.u64_in("ROOK_OUTBOUND_QUEUE", 1, 65_536) {
        settings.server.outbound_queue_capacity = v as usize;
    }
    if let Some(v) = env.u64_in("ROOK_PONG_WAIT_MS", 100, 3_600_000) {
        settings.server.pong_wait_ms = v;
    }
    if let Some(v) = env.u64_in("ROOK_PING_PERIOD_MS", 50, 3_600_000) {
        settings.server.ping_period_ms = Some(v);
    }
    if let Some(v) = env.u64_in("ROOK_WRITE_WAIT_MS", 100, 600_000) {
        settings.server.write_wait_ms = v;
    }
    if let Some(v) = env.string("ROOK_HUB_SCOPE") {
        match v.parse::<HubScope>() {
            Ok(scope) => settings.server.hub_scope = scope,
            Err(e) => tracing::warn!(key = "ROOK_HUB_SCOPE", value = %v, error = %e, "ignoring"),
        }
    }
    if let Some(v) = env.string("ROOK_DB") {
        settings.store.db_path = v;
    }
    if let Some(v) = env.u64_in("ROOK_RETENTION_DAYS", 1, 36_500) {
        settings.store.retention_days = Some(v as u32);
    }
    if let Some(v) = env.u64_in("ROOK_SEARCH_DEPTH", 1, 6) {
        settings.engine.search_depth = v as u8;
    }
    if let Some(v) = env.string("ROOK_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = env.bool("ROOK_LOG_JSON") {
        settings.logging.json = v;
    }
}

// ── Pure parsing functions ──────────────────────────────────────────────────

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
    let n: u64 = val.trim().parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

struct EnvReader<F> {
    lookup: F,
}

impl<F> EnvReader<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn string(&self, name: &str) -> Option<String> {
        (self.lookup)(name).filter(|v| !v.is_empty())
    }

    fn bool(&self, name: &str) -> Option<bool> {
        let val = self.string(name)?;
        let result = parse_bool(&val);
        if result.is_none() {
            tracing::warn!(key = name, value = %val, "invalid boolean env var, ignoring");
        }
        result
    }

    fn u64_in(&self, name: &str, min: u64, max: u64) -> Option<u64> {
        let val = self.string(name)?;
        let result = parse_u64_range(&val, min, max);
        if result.is_none() {
            tracing::warn!(key = name, value = %val, "invalid integer env var, ignoring");
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::errors::SettingsError;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn merge_nested_override() {
        let target = serde_json::json!({"server": {"port": 8080, "host": "localhost"}});
        let source = serde_json::json!({"server": {"port": 9090}});
        let merged = deep_merge(target, source);
        assert_eq!(merged["server"]["port"], 9090);
        assert_eq!(merged["server"]["host"], "localhost");
    }

    #[test]
    fn merge_null_preserves_target() {
        let merged = deep_merge(
            serde_json::json!({"a": 1, "b": 2}),
            serde_json::json!({"a": null}),
        );
        assert_eq!(merged["a"], 1);
        assert_eq!(merged["b"], 2);
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
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = load_file_layer(&dir.path().join("nope.json")).unwrap();
        assert_eq!(settings, RookSettings::default());
    }

    #[test]
    fn file_values_override_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{"server":{"port":9191,"outbound_queue_capacity":8},"engine":{"search_depth":2}}"#,
        )
        .unwrap();
        let settings = load_file_layer(&path).unwrap();
        assert_eq!(settings.server.port, 9191);
        assert_eq!(settings.server.outbound_queue_capacity, 8);
        assert_eq!(settings.server.max_message_size, 512);
        assert_eq!(settings.engine.search_depth, 2);
    }

    #[test]
    fn invalid_json_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(load_file_layer(&path), Err(SettingsError::Json(_))));
    }

    #[test]
    fn env_overrides_apply() {
        let mut settings = RookSettings::default();
        apply_env_overrides(
            &mut settings,
            env(&[
                ("ROOK_PORT", "7000"),
                ("ROOK_HOST", "127.0.0.1"),
                ("ROOK_HUB_SCOPE", "global"),
                ("ROOK_RETENTION_DAYS", "30"),
                ("ROOK_LOG_JSON", "yes"),
            ]),
        );
        assert_eq!(settings.server.port, 7000);
        assert_eq!(settings.server.host, "127.0.0.1");
        assert_eq!(settings.server.hub_scope, HubScope::Global);
        assert_eq!(settings.store.retention_days, Some(30));
        assert!(settings.logging.json);
    }

    #[test]
    fn invalid_env_values_are_ignored() {
        let mut settings = RookSettings::default();
        apply_env_overrides(
            &mut settings,
            env(&[
                ("ROOK_PORT", "99999"),
                ("ROOK_OUTBOUND_QUEUE", "0"),
                ("ROOK_HUB_SCOPE", "planet"),
                ("ROOK_LOG_JSON", "maybe"),
            ]),
        );
        assert_eq!(settings, RookSettings::default());
    }

    #[test]
    fn empty_env_values_are_ignored() {
        let mut settings = RookSettings::default();
        apply_env_overrides(&mut settings, env(&[("ROOK_HOST", "")]));
        assert_eq!(settings.server.host, "0.0.0.0");
    }

    #[test]
    fn parse_helpers() {
        assert_eq!(parse_bool("ON"), Some(true));
        assert_eq!(parse_bool("off"), Some(false));
        assert_eq!(parse_bool("2"), None);
        assert_eq!(parse_u64_range("10", 1, 10), Some(10));
        assert_eq!(parse_u64_range("11", 1, 10), None);
        assert_eq!(parse_u64_range("-1", 0, 10), None);
    }

    #[test]
    fn relative_paths_resolve_under_home() {
        assert!(resolve_path("games.db").ends_with(".rook/games.db"));
        assert_eq!(resolve_path("/var/lib/rook.db"), PathBuf::from("/var/lib/rook.db"));
    }
}
