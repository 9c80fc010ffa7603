//! Engine configuration types.
//!
//! These types hold the concrete values that drive engine behavior. In most
//! cases you should use [`EngineBuilder`](super::builder::EngineBuilder)
//! rather than creating an [`EngineConfig`] directly.
//!
//! # Defaults
//!
//! | Field | Default |
//! |-------|---------|
//! | `max_tokens` | `None` (unbounded) |
//! | `max_publications` | `None` (unbounded) |
//! | `blocking.min_threads` | 0 |
//! | `blocking.max_threads` | 16 |
//! | `blocking.thread_name_prefix` | `"orc"` |
//! | `trace_capacity` | 0 (tracing off) |
//! | `report_rounds` | false |

/// Configuration for the blocking pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockingPoolConfig {
    /// Minimum number of blocking threads.
    pub min_threads: usize,
    /// Maximum number of blocking threads.
    pub max_threads: usize,
    /// Name prefix for blocking threads.
    pub thread_name_prefix: String,
}

impl BlockingPoolConfig {
    /// Normalize configuration values to safe defaults.
    pub fn normalize(&mut self) {
        if self.max_threads == 0 {
            self.max_threads = 1;
        }
        if self.max_threads < self.min_threads {
            self.max_threads = self.min_threads;
        }
        if self.thread_name_prefix.is_empty() {
            self.thread_name_prefix = "orc".to_string();
        }
    }
}

impl Default for BlockingPoolConfig {
    fn default() -> Self {
        Self {
            min_threads: 0,
            max_threads: 16,
            thread_name_prefix: "orc".to_string(),
        }
    }
}

/// Engine configuration.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EngineConfig {
    /// Maximum number of live tokens; exceeding it is fatal to the run.
    pub max_tokens: Option<usize>,
    /// Stop the run after this many top-level publications.
    pub max_publications: Option<usize>,
    /// Blocking pool configuration.
    pub blocking: BlockingPoolConfig,
    /// Size of the trace ring buffer; 0 disables tracing.
    pub trace_capacity: usize,
    /// Log queue sizes and logical time at every round.
    pub report_rounds: bool,
}

impl EngineConfig {
    /// Normalize configuration values to safe defaults.
    pub fn normalize(&mut self) {
        if self.max_tokens == Some(0) {
            self.max_tokens = Some(1);
        }
        self.blocking.normalize();
    }
}
