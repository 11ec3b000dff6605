//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`TetherSettings::default()`]
//! 2. If the settings file exists, deep-merge its values over defaults
//! 3. Apply `TETHER_*` environment variable overrides (highest priority)
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use crate::errors::Result;
use crate::types::{LogFormat, TetherSettings};

/// Resolve the default settings file path (`~/.tether/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".tether").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<TetherSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// If the file does not exist, returns defaults (plus env overrides). If the
/// file contains invalid JSON, returns an error.
pub fn load_settings_from_path(path: &Path) -> Result<TetherSettings> {
    let mut settings = merge_file(path)?;
    apply_env_overrides(&mut settings);
    Ok(settings)
}

fn merge_file(path: &Path) -> Result<TetherSettings> {
    let defaults = serde_json::to_value(TetherSettings::default())?;

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

/// Apply `TETHER_*` environment variable overrides.
pub fn apply_env_overrides(settings: &mut TetherSettings) {
    apply_overrides(settings, |name| std::env::var(name).ok());
}

/// Apply overrides from an arbitrary variable source.
///
/// Each variable has strict parsing rules; invalid values are ignored with a
/// warning and the file/default value is kept.
pub fn apply_overrides<F>(settings: &mut TetherSettings, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let env = EnvSource { lookup };

    // ── Relay ───────────────────────────────────────────────────────
    if let Some(v) = env.string("TETHER_LISTEN") {
        settings.relay.listen = v;
    }
    if let Some(v) = env.string("TETHER_DEVICE") {
        settings.relay.device = v;
    }
    if let Some(v) = env.string("TETHER_WS_PATH") {
        settings.relay.ws_path = v;
    }
    if let Some(v) = env.u64("TETHER_READ_TIMEOUT_MS", 1, 3_600_000) {
        settings.relay.read_timeout_ms = v;
    }
    if let Some(v) = env.u64("TETHER_WRITE_TIMEOUT_MS", 1, 3_600_000) {
        settings.relay.write_timeout_ms = v;
    }
    if let Some(v) = env.u64("TETHER_CONNECT_TIMEOUT_MS", 1, 3_600_000) {
        settings.relay.connect_timeout_ms = v;
    }
    if let Some(v) = env.u64("TETHER_SHUTDOWN_TIMEOUT_MS", 1, 3_600_000) {
        settings.relay.shutdown_timeout_ms = v;
    }
    if let Some(v) = env.usize("TETHER_SOCKET_BUFFER_SIZE", 1, 16 * 1024 * 1024) {
        settings.relay.socket_buffer_size = v;
    }

    // ── Device ──────────────────────────────────────────────────────
    if let Some(v) = env.string("TETHER_DEVICE_LISTEN") {
        settings.device.listen = v;
    }
    if let Some(v) = env.usize("TETHER_DEVICE_MIN_LEN", 0, 1024 * 1024) {
        settings.device.min_payload_len = v;
    }
    if let Some(v) = env.usize("TETHER_DEVICE_MAX_LEN", 0, 1024 * 1024) {
        settings.device.max_payload_len = v;
    }
    if let Some(v) = env.u64("TETHER_DEVICE_INTERVAL_MS", 1, 3_600_000) {
        settings.device.interval_ms = v;
    }
    if let Some(v) = env.u64("TETHER_DEVICE_TIMEOUT_MS", 1, 3_600_000) {
        settings.device.timeout_ms = v;
    }

    // ── Logging ─────────────────────────────────────────────────────
    if let Some(v) = env.string("TETHER_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = env.string("TETHER_LOG_FORMAT") {
        match parse_log_format(&v) {
            Some(format) => settings.logging.format = format,
            None => tracing::warn!(key = "TETHER_LOG_FORMAT", value = %v, "invalid log format, ignoring"),
        }
    }
}

// ── Pure parsing functions (testable without env vars) ──────────────────────

/// Parse a string as a `u64` within a range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `usize` within a range.
pub fn parse_usize_range(val: &str, min: usize, max: usize) -> Option<usize> {
    let n: usize = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a log format name (case-insensitive).
pub fn parse_log_format(val: &str) -> Option<LogFormat> {
    match val.to_lowercase().as_str() {
        "compact" | "text" => Some(LogFormat::Compact),
        "json" => Some(LogFormat::Json),
        _ => None,
    }
}

// ── Variable readers (thin wrappers) ────────────────────────────────────────

struct EnvSource<F> {
    lookup: F,
}

impl<F> EnvSource<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn string(&self, name: &str) -> Option<String> {
        (self.lookup)(name).filter(|v| !v.is_empty())
    }

    fn u64(&self, name: &str, min: u64, max: u64) -> Option<u64> {
        let val = (self.lookup)(name)?;
        let result = parse_u64_range(&val, min, max);
        if result.is_none() {
            tracing::warn!(key = name, value = %val, "invalid u64 env var, ignoring");
        }
        result
    }

    fn usize(&self, name: &str, min: usize, max: usize) -> Option<usize> {
        let val = (self.lookup)(name)?;
        let result = parse_usize_range(&val, min, max);
        if result.is_none() {
            tracing::warn!(key = name, value = %val, "invalid usize env var, ignoring");
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::errors::SettingsError;

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    // ── deep_merge ──────────────────────────────────────────────────

    #[test]
    fn merge_nested_override() {
        let target = serde_json::json!({
            "relay": {"listen": "a:1", "device": "b:2"}
        });
        let source = serde_json::json!({
            "relay": {"listen": "c:3"}
        });
        let merged = deep_merge(target, source);
        assert_eq!(merged["relay"]["listen"], "c:3");
        assert_eq!(merged["relay"]["device"], "b:2");
    }

    #[test]
    fn merge_null_preserves_target() {
        let target = serde_json::json!({"a": 1, "b": 2});
        let source = serde_json::json!({"a": null});
        let merged = deep_merge(target, source);
        assert_eq!(merged["a"], 1);
        assert_eq!(merged["b"], 2);
    }

    #[test]
    fn merge_array_replace() {
        let target = serde_json::json!({"items": [1, 2, 3]});
        let source = serde_json::json!({"items": [4]});
        assert_eq!(deep_merge(target, source)["items"], serde_json::json!([4]));
    }

    // ── file loading ────────────────────────────────────────────────

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = merge_file(&dir.path().join("absent.json")).unwrap();
        assert_eq!(settings, TetherSettings::default());
    }

    #[test]
    fn file_values_override_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{"relay":{"device":"10.0.0.5:1242","readTimeoutMs":100},"logging":{"level":"debug"}}"#,
        )
        .unwrap();
        let settings = merge_file(&path).unwrap();
        assert_eq!(settings.relay.device, "10.0.0.5:1242");
        assert_eq!(settings.relay.read_timeout_ms, 100);
        assert_eq!(settings.relay.write_timeout_ms, 5_000);
        assert_eq!(settings.logging.level, "debug");
    }

    #[test]
    fn invalid_json_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "{not json").unwrap();
        let err = merge_file(&path).unwrap_err();
        assert!(matches!(err, SettingsError::Json(_)));
    }

    // ── overrides ───────────────────────────────────────────────────

    #[test]
    fn overrides_apply() {
        let mut settings = TetherSettings::default();
        apply_overrides(
            &mut settings,
            vars(&[
                ("TETHER_LISTEN", "0.0.0.0:9000"),
                ("TETHER_DEVICE", "device:1242"),
                ("TETHER_READ_TIMEOUT_MS", "1500"),
                ("TETHER_DEVICE_MIN_LEN", "10"),
                ("TETHER_DEVICE_MAX_LEN", "20"),
                ("TETHER_LOG_FORMAT", "JSON"),
            ]),
        );
        assert_eq!(settings.relay.listen, "0.0.0.0:9000");
        assert_eq!(settings.relay.device, "device:1242");
        assert_eq!(settings.relay.read_timeout_ms, 1_500);
        assert_eq!(settings.device.min_payload_len, 10);
        assert_eq!(settings.device.max_payload_len, 20);
        assert_eq!(settings.logging.format, LogFormat::Json);
    }

    #[test]
    fn invalid_override_is_ignored() {
        let mut settings = TetherSettings::default();
        apply_overrides(
            &mut settings,
            vars(&[
                ("TETHER_READ_TIMEOUT_MS", "0"),
                ("TETHER_WRITE_TIMEOUT_MS", "soon"),
                ("TETHER_LOG_FORMAT", "xml"),
            ]),
        );
        assert_eq!(settings.relay.read_timeout_ms, 5_000);
        assert_eq!(settings.relay.write_timeout_ms, 5_000);
        assert_eq!(settings.logging.format, LogFormat::Compact);
    }

    #[test]
    fn empty_string_override_is_ignored() {
        let mut settings = TetherSettings::default();
        apply_overrides(&mut settings, vars(&[("TETHER_DEVICE", "")]));
        assert_eq!(settings.relay.device, "127.0.0.1:1242");
    }

    #[test]
    fn parse_ranges() {
        assert_eq!(parse_u64_range("5", 1, 10), Some(5));
        assert_eq!(parse_u64_range("11", 1, 10), None);
        assert_eq!(parse_u64_range("-1", 1, 10), None);
        assert_eq!(parse_usize_range("0", 0, 10), Some(0));
    }

    #[test]
    fn parse_log_formats() {
        assert_eq!(parse_log_format("compact"), Some(LogFormat::Compact));
        assert_eq!(parse_log_format("Text"), Some(LogFormat::Compact));
        assert_eq!(parse_log_format("json"), Some(LogFormat::Json));
        assert_eq!(parse_log_format("yaml"), None);
    }
}
