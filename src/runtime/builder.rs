//! Engine builder.

use crate::error::Error;
use crate::runtime::config::EngineConfig;
use crate::runtime::engine::Engine;
use crate::runtime::env_config;

/// Builder for constructing an [`Engine`] with custom configuration.
///
/// Loaders apply in call order, so call the file and environment loaders
/// first and the programmatic setters after them to get the documented
/// precedence (programmatic > environment > file > defaults):
///
/// ```ignore
/// let engine = EngineBuilder::new()
///     .with_env_overrides()?
///     .max_publications(1)
///     .build()?;
/// ```
#[derive(Debug, Clone, Default)]
pub struct EngineBuilder {
    config: EngineConfig,
}

impl EngineBuilder {
    /// Create a new builder with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: EngineConfig::default(),
        }
    }

    /// Start from an explicit configuration.
    #[must_use]
    pub const fn from_config(config: EngineConfig) -> Self {
        Self { config }
    }

    /// Apply `ORC_*` environment variables.
    pub fn with_env_overrides(mut self) -> Result<Self, Error> {
        env_config::apply_env_overrides(&mut self.config)?;
        Ok(self)
    }

    /// Apply a TOML config file.
    #[cfg(feature = "config-file")]
    pub fn with_toml_file(mut self, path: &std::path::Path) -> Result<Self, Error> {
        let parsed = env_config::parse_toml_file(path)?;
        env_config::apply_toml_config(&mut self.config, &parsed);
        Ok(self)
    }

    /// Apply TOML config text.
    #[cfg(feature = "config-file")]
    pub fn with_toml_str(mut self, toml: &str) -> Result<Self, Error> {
        let parsed = env_config::parse_toml_str(toml)?;
        env_config::apply_toml_config(&mut self.config, &parsed);
        Ok(self)
    }

    /// Set the live token limit.
    #[must_use]
    pub const fn max_tokens(mut self, limit: usize) -> Self {
        self.config.max_tokens = Some(limit);
        self
    }

    /// Stop after `limit` top-level publications.
    #[must_use]
    pub const fn max_publications(mut self, limit: usize) -> Self {
        self.config.max_publications = Some(limit);
        self
    }

    /// Configure blocking pool thread limits.
    #[must_use]
    pub const fn blocking_threads(mut self, min: usize, max: usize) -> Self {
        self.config.blocking.min_threads = min;
        self.config.blocking.max_threads = max;
        self
    }

    /// Set the blocking thread name prefix.
    #[must_use]
    pub fn thread_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.blocking.thread_name_prefix = prefix.into();
        self
    }

    /// Keep the last `capacity` engine events in a trace buffer.
    #[must_use]
    pub const fn trace_capacity(mut self, capacity: usize) -> Self {
        self.config.trace_capacity = capacity;
        self
    }

    /// Log a report at every round.
    #[must_use]
    pub const fn report_rounds(mut self, enable: bool) -> Self {
        self.config.report_rounds = enable;
        self
    }

    /// Returns the configuration built so far.
    #[must_use]
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Build an engine from this configuration.
    pub fn build(self) -> Result<Engine, Error> {
        Engine::with_config(self.config)
    }
}
