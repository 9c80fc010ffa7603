//! Environment variable and config file support for
//! [`EngineBuilder`](super::builder::EngineBuilder).
//!
//! # Configuration Precedence
//!
//! Settings are resolved in this order (highest priority first):
//!
//! 1. **Programmatic**: values set via builder methods (`max_tokens(64)`)
//! 2. **Environment variables**: values from `ORC_*` env vars
//! 3. **Config file**: values loaded from a TOML file (requires `config-file` feature)
//! 4. **Defaults**: built-in defaults from [`EngineConfig::default()`]
//!
//! # Supported Environment Variables
//!
//! | Variable | Type | Maps to |
//! |----------|------|---------|
//! | `ORC_MAX_TOKENS` | `usize` | `max_tokens` |
//! | `ORC_MAX_PUBLICATIONS` | `usize` | `max_publications` |
//! | `ORC_BLOCKING_MIN_THREADS` | `usize` | `blocking.min_threads` |
//! | `ORC_BLOCKING_MAX_THREADS` | `usize` | `blocking.max_threads` |
//! | `ORC_TRACE_CAPACITY` | `usize` | `trace_capacity` |
//! | `ORC_REPORT_ROUNDS` | `bool` | `report_rounds` |

use crate::error::Error;
use crate::runtime::config::EngineConfig;

/// Environment variable name for the live token limit.
pub const ENV_MAX_TOKENS: &str = "ORC_MAX_TOKENS";
/// Environment variable name for the publication limit.
pub const ENV_MAX_PUBLICATIONS: &str = "ORC_MAX_PUBLICATIONS";
/// Environment variable name for blocking pool minimum threads.
pub const ENV_BLOCKING_MIN_THREADS: &str = "ORC_BLOCKING_MIN_THREADS";
/// Environment variable name for blocking pool maximum threads.
pub const ENV_BLOCKING_MAX_THREADS: &str = "ORC_BLOCKING_MAX_THREADS";
/// Environment variable name for the trace buffer size.
pub const ENV_TRACE_CAPACITY: &str = "ORC_TRACE_CAPACITY";
/// Environment variable name for per-round reports.
pub const ENV_REPORT_ROUNDS: &str = "ORC_REPORT_ROUNDS";

/// Apply environment variable overrides to an [`EngineConfig`].
///
/// Only variables that are set in the environment are applied.
/// Returns an error if a variable is set but contains an unparseable value.
pub fn apply_env_overrides(config: &mut EngineConfig) -> Result<(), Error> {
    if let Some(val) = read_env(ENV_MAX_TOKENS) {
        config.max_tokens = Some(parse_usize(ENV_MAX_TOKENS, &val)?);
    }
    if let Some(val) = read_env(ENV_MAX_PUBLICATIONS) {
        config.max_publications = Some(parse_usize(ENV_MAX_PUBLICATIONS, &val)?);
    }
    if let Some(val) = read_env(ENV_BLOCKING_MIN_THREADS) {
        config.blocking.min_threads = parse_usize(ENV_BLOCKING_MIN_THREADS, &val)?;
    }
    if let Some(val) = read_env(ENV_BLOCKING_MAX_THREADS) {
        config.blocking.max_threads = parse_usize(ENV_BLOCKING_MAX_THREADS, &val)?;
    }
    if let Some(val) = read_env(ENV_TRACE_CAPACITY) {
        config.trace_capacity = parse_usize(ENV_TRACE_CAPACITY, &val)?;
    }
    if let Some(val) = read_env(ENV_REPORT_ROUNDS) {
        config.report_rounds = parse_bool(ENV_REPORT_ROUNDS, &val)?;
    }
    Ok(())
}

fn read_env(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

fn parse_usize(var_name: &str, val: &str) -> Result<usize, Error> {
    val.trim().parse::<usize>().map_err(|e| {
        Error::config(format!(
            "invalid value for {var_name}: expected unsigned integer, got {val:?} ({e})"
        ))
    })
}

fn parse_bool(var_name: &str, val: &str) -> Result<bool, Error> {
    match val.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(Error::config(format!(
            "invalid value for {var_name}: expected bool (true/false/1/0/yes/no), got {val:?}"
        ))),
    }
}

// =========================================================================
// TOML config file support (feature-gated)
// =========================================================================

/// TOML-deserializable engine configuration.
///
/// ```toml
/// [limits]
/// max_tokens = 100000
/// max_publications = 10
///
/// [blocking]
/// min_threads = 0
/// max_threads = 32
/// thread_name_prefix = "orc"
///
/// [diagnostics]
/// trace_capacity = 4096
/// report_rounds = true
/// ```
#[cfg(feature = "config-file")]
#[derive(serde::Deserialize, Default, Debug)]
pub struct EngineTomlConfig {
    /// Limits.
    #[serde(default)]
    pub limits: LimitsToml,
    /// Blocking pool settings.
    #[serde(default)]
    pub blocking: BlockingToml,
    /// Diagnostics settings.
    #[serde(default)]
    pub diagnostics: DiagnosticsToml,
}

/// Limits section of the TOML config.
#[cfg(feature = "config-file")]
#[derive(serde::Deserialize, Default, Debug)]
pub struct LimitsToml {
    /// Live token limit.
    pub max_tokens: Option<usize>,
    /// Publication limit.
    pub max_publications: Option<usize>,
}

/// Blocking pool section of the TOML config.
#[cfg(feature = "config-file")]
#[derive(serde::Deserialize, Default, Debug)]
pub struct BlockingToml {
    /// Minimum number of blocking threads.
    pub min_threads: Option<usize>,
    /// Maximum number of blocking threads.
    pub max_threads: Option<usize>,
    /// Thread name prefix.
    pub thread_name_prefix: Option<String>,
}

/// Diagnostics section of the TOML config.
#[cfg(feature = "config-file")]
#[derive(serde::Deserialize, Default, Debug)]
pub struct DiagnosticsToml {
    /// Trace buffer size.
    pub trace_capacity: Option<usize>,
    /// Per-round reports.
    pub report_rounds: Option<bool>,
}

/// Apply a parsed TOML config to an [`EngineConfig`].
///
/// Only fields that are `Some` in the TOML struct override the config.
#[cfg(feature = "config-file")]
pub fn apply_toml_config(config: &mut EngineConfig, toml: &EngineTomlConfig) {
    if let Some(v) = toml.limits.max_tokens {
        config.max_tokens = Some(v);
    }
    if let Some(v) = toml.limits.max_publications {
        config.max_publications = Some(v);
    }
    if let Some(v) = toml.blocking.min_threads {
        config.blocking.min_threads = v;
    }
    if let Some(v) = toml.blocking.max_threads {
        config.blocking.max_threads = v;
    }
    if let Some(ref v) = toml.blocking.thread_name_prefix {
        config.blocking.thread_name_prefix.clone_from(v);
    }
    if let Some(v) = toml.diagnostics.trace_capacity {
        config.trace_capacity = v;
    }
    if let Some(v) = toml.diagnostics.report_rounds {
        config.report_rounds = v;
    }
}

/// Parse a TOML string into an [`EngineTomlConfig`].
#[cfg(feature = "config-file")]
pub fn parse_toml_str(toml_str: &str) -> Result<EngineTomlConfig, Error> {
    toml::from_str(toml_str)
        .map_err(|e| Error::config(format!("failed to parse TOML config: {e}")))
}

/// Read and parse a TOML file into an [`EngineTomlConfig`].
#[cfg(feature = "config-file")]
pub fn parse_toml_file(path: &std::path::Path) -> Result<EngineTomlConfig, Error> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::config(format!(
            "failed to read config file {}: {e}",
            path.display()
        ))
    })?;
    parse_toml_str(&content)
}
