//! Settings loading from configuration files and the environment.
//!
//! ## Loading Order
//!
//! 1. Start with default settings.
//! 2. Merge a TOML or JSON document over the defaults.
//! 3. Apply environment variable overrides (highest priority).
//!
//! ## Environment Variables
//!
//! | Env Var | Setting |
//! |---|---|
//! | `DATABASE` | `database.dialect` |
//! | `QUERY_TRACE` | `database.query_trace` |
//! | `MYSQL_HOST`, `MYSQL_PORT`, `MYSQL_USER`, `MYSQL_PASSWORD`, `MYSQL_DB` | `database.mysql.*` |
//! | `POSTGRES_HOST`, `POSTGRES_PORT`, `POSTGRES_USER`, `POSTGRES_PASSWORD`, `POSTGRES_DB` | `database.postgresql.*` |
//! | `SQLITE_PATH` | `database.sqlite.path` |
//! | `USING_FREE_TIER` | caps `database.mysql.connection_limit` at 4 |
//! | `LOG_LEVEL` | `log_level` |
//! | `DEBUG` | `debug` |
//!
//! ```rust,no_run
//! use strata_core::settings_loader;
//!
//! let settings = settings_loader::from_toml_file_with_env("config/database.toml").unwrap();
//! ```

use std::path::{Path, PathBuf};

use crate::error::StrataError;
use crate::settings::{ServerSettings, Settings};

/// Pool size used when running on a constrained hosting tier.
const FREE_TIER_CONNECTION_LIMIT: usize = 4;

/// Loads settings from a TOML string, keeping defaults for absent keys.
pub fn from_toml_str(toml_str: &str) -> Result<Settings, StrataError> {
    let toml_value: toml::Value = toml::from_str(toml_str)
        .map_err(|e| StrataError::ConfigurationError(format!("Failed to parse TOML: {e}")))?;
    merge_over_defaults(toml_to_json(toml_value), "TOML")
}

/// Loads settings from a TOML file.
pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Settings, StrataError> {
    from_toml_str(&read_config(path.as_ref(), "TOML")?)
}

/// Loads settings from a TOML file, then applies environment overrides.
pub fn from_toml_file_with_env(path: impl AsRef<Path>) -> Result<Settings, StrataError> {
    let mut settings = from_toml_file(path)?;
    apply_env_overrides(&mut settings);
    Ok(settings)
}

/// Loads settings from a JSON string, keeping defaults for absent keys.
pub fn from_json_str(json_str: &str) -> Result<Settings, StrataError> {
    let json_value: serde_json::Value = serde_json::from_str(json_str)
        .map_err(|e| StrataError::ConfigurationError(format!("Failed to parse JSON: {e}")))?;
    merge_over_defaults(json_value, "JSON")
}

/// Loads settings from a JSON file.
pub fn from_json_file(path: impl AsRef<Path>) -> Result<Settings, StrataError> {
    from_json_str(&read_config(path.as_ref(), "JSON")?)
}

/// Loads settings from a JSON file, then applies environment overrides.
pub fn from_json_file_with_env(path: impl AsRef<Path>) -> Result<Settings, StrataError> {
    let mut settings = from_json_file(path)?;
    apply_env_overrides(&mut settings);
    Ok(settings)
}

/// Loads settings from environment variables alone, starting from defaults.
pub fn from_env() -> Settings {
    let mut settings = Settings::default();
    apply_env_overrides(&mut settings);
    settings
}

/// Applies process environment overrides to `settings`.
pub fn apply_env_overrides(settings: &mut Settings) {
    apply_overrides(settings, |key| std::env::var(key).ok());
}

/// Applies overrides read through `lookup`.
///
/// Numeric values that fail to parse are ignored, leaving the previous value
/// in place.
pub fn apply_overrides<F>(settings: &mut Settings, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(val) = lookup("DATABASE") {
        settings.database.dialect = val.trim().to_lowercase();
    }
    if let Some(val) = lookup("QUERY_TRACE") {
        settings.database.query_trace = parse_flag(&val);
    }
    if let Some(val) = lookup("LOG_LEVEL") {
        settings.log_level = val;
    }
    if let Some(val) = lookup("DEBUG") {
        settings.debug = parse_flag(&val);
    }
    if let Some(val) = lookup("SQLITE_PATH") {
        settings.database.sqlite.path = PathBuf::from(val);
    }

    apply_server_overrides(&mut settings.database.mysql, "MYSQL", &lookup);
    apply_server_overrides(&mut settings.database.postgresql, "POSTGRES", &lookup);

    if lookup("USING_FREE_TIER").is_some_and(|v| parse_flag(&v)) {
        settings.database.mysql.connection_limit = Some(FREE_TIER_CONNECTION_LIMIT);
    }
}

fn apply_server_overrides<F>(server: &mut ServerSettings, prefix: &str, lookup: &F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(val) = lookup(&format!("{prefix}_HOST")) {
        server.host = val;
    }
    if let Some(port) = lookup(&format!("{prefix}_PORT")).and_then(|v| v.parse::<u16>().ok()) {
        server.port = port;
    }
    if let Some(val) = lookup(&format!("{prefix}_USER")) {
        server.user = val;
    }
    if let Some(val) = lookup(&format!("{prefix}_PASSWORD")) {
        server.password = val;
    }
    if let Some(val) = lookup(&format!("{prefix}_DB")) {
        server.database = val;
    }
}

fn parse_flag(val: &str) -> bool {
    matches!(val.trim().to_lowercase().as_str(), "true" | "1" | "yes" | "on")
}

// ============================================================
// Helpers
// ============================================================

fn read_config(path: &Path, format: &str) -> Result<String, StrataError> {
    std::fs::read_to_string(path).map_err(|e| {
        StrataError::ConfigurationError(format!(
            "Failed to read {format} file '{}': {e}",
            path.display()
        ))
    })
}

fn merge_over_defaults(value: serde_json::Value, format: &str) -> Result<Settings, StrataError> {
    let defaults = serde_json::to_value(Settings::default()).map_err(|e| {
        StrataError::ConfigurationError(format!("Failed to serialize default settings: {e}"))
    })?;
    serde_json::from_value(merge_json(defaults, value)).map_err(|e| {
        StrataError::ConfigurationError(format!("Failed to deserialize settings from {format}: {e}"))
    })
}

fn toml_to_json(value: toml::Value) -> serde_json::Value {
    match value {
        toml::Value::String(s) => serde_json::Value::String(s),
        toml::Value::Integer(i) => serde_json::json!(i),
        toml::Value::Float(f) => serde_json::json!(f),
        toml::Value::Boolean(b) => serde_json::Value::Bool(b),
        toml::Value::Datetime(dt) => serde_json::Value::String(dt.to_string()),
        toml::Value::Array(items) => {
            serde_json::Value::Array(items.into_iter().map(toml_to_json).collect())
        }
        toml::Value::Table(table) => serde_json::Value::Object(
            table
                .into_iter()
                .map(|(k, v)| (k, toml_to_json(v)))
                .collect(),
        ),
    }
}

/// Deep-merges `overlay` into `base`; scalars in `overlay` win.
fn merge_json(base: serde_json::Value, overlay: serde_json::Value) -> serde_json::Value {
    match (base, overlay) {
        (serde_json::Value::Object(mut base_map), serde_json::Value::Object(overlay_map)) => {
            for (key, value) in overlay_map {
                let merged = match base_map.remove(&key) {
                    Some(existing) => merge_json(existing, value),
                    None => value,
                };
                base_map.insert(key, merged);
            }
            serde_json::Value::Object(base_map)
        }
        (_, overlay) => overlay,
    }
}
