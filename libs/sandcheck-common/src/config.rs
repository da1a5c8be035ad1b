// Engine configuration
// Defaults are safe for a shared host; every value can be overridden from the environment

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Globals left reachable inside the sandbox after lockdown
pub const DEFAULT_ALLOWED_GLOBALS: &[&str] = &[
    "Object",
    "Array",
    "String",
    "Number",
    "Boolean",
    "Symbol",
    "BigInt",
    "Math",
    "JSON",
    "Date",
    "RegExp",
    "Map",
    "Set",
    "WeakMap",
    "WeakSet",
    "Promise",
    "Error",
    "TypeError",
    "RangeError",
    "SyntaxError",
    "ReferenceError",
    "URIError",
    "ArrayBuffer",
    "Uint8Array",
    "Int32Array",
    "Float64Array",
    "parseInt",
    "parseFloat",
    "isNaN",
    "isFinite",
    "encodeURIComponent",
    "decodeURIComponent",
    "NaN",
    "Infinity",
    "undefined",
    "console",
    "module",
];

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {name}: {value:?} ({reason})")]
    InvalidValue {
        name: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Time limit applied when a fixture does not set one
    pub default_time_limit_ms: u64,
    /// Ceiling no fixture or assertion can exceed
    pub hard_time_limit_ms: u64,
    /// Loop iterations allowed per execution; fixtures may only lower it
    pub iteration_cap: u64,
    pub recursion_limit: usize,
    pub max_source_bytes: usize,
    pub max_output_bytes: usize,
    /// Time limit for each UI assertion (one render session)
    pub ui_time_limit_ms: u64,
    pub allowed_globals: Vec<String>,
    /// Extra challenge definitions (JSON)
    pub challenges_path: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_time_limit_ms: 2_000,
            hard_time_limit_ms: 10_000,
            iteration_cap: 1_000_000,
            recursion_limit: 1_000,
            max_source_bytes: 64 * 1024,
            max_output_bytes: 1024 * 1024,
            ui_time_limit_ms: 3_000,
            allowed_globals: DEFAULT_ALLOWED_GLOBALS.iter().map(|g| g.to_string()).collect(),
            challenges_path: None,
        }
    }
}

impl EngineConfig {
    /// Defaults overlaid with `SANDCHECK_*` environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as `from_env`, reading variables through `lookup`
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(v) = parse_var(&lookup, "SANDCHECK_TIME_LIMIT_MS")? {
            config.default_time_limit_ms = v;
        }
        if let Some(v) = parse_var(&lookup, "SANDCHECK_HARD_TIME_LIMIT_MS")? {
            config.hard_time_limit_ms = v;
        }
        if let Some(v) = parse_var(&lookup, "SANDCHECK_ITERATION_CAP")? {
            config.iteration_cap = v;
        }
        if let Some(v) = parse_var(&lookup, "SANDCHECK_RECURSION_LIMIT")? {
            config.recursion_limit = v;
        }
        if let Some(v) = parse_var(&lookup, "SANDCHECK_MAX_SOURCE_BYTES")? {
            config.max_source_bytes = v;
        }
        if let Some(v) = parse_var(&lookup, "SANDCHECK_UI_TIME_LIMIT_MS")? {
            config.ui_time_limit_ms = v;
        }
        if let Some(path) = lookup("SANDCHECK_CHALLENGES") {
            if !path.trim().is_empty() {
                config.challenges_path = Some(PathBuf::from(path));
            }
        }

        if config.hard_time_limit_ms == 0 {
            return Err(ConfigError::InvalidValue {
                name: "SANDCHECK_HARD_TIME_LIMIT_MS",
                value: "0".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }

        Ok(config)
    }

    /// Clamp a requested time limit to the hard ceiling
    pub fn effective_time_limit_ms(&self, requested: Option<u64>) -> u64 {
        requested
            .unwrap_or(self.default_time_limit_ms)
            .min(self.hard_time_limit_ms)
            .max(1)
    }

    /// Clamp a requested iteration cap to the configured ceiling
    pub fn effective_iteration_cap(&self, requested: Option<u64>) -> u64 {
        requested
            .unwrap_or(self.iteration_cap)
            .min(self.iteration_cap)
            .max(1)
    }
}

fn parse_var<F, T>(lookup: &F, name: &'static str) -> Result<Option<T>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(name) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| ConfigError::InvalidValue {
                name,
                value: raw.clone(),
                reason: e.to_string(),
            }),
    }
}
