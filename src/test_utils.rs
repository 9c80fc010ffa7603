//! Test utilities for the engine.
//!
//! This module provides shared helpers for unit tests:
//! - Consistent tracing-based logging initialization
//! - Phase and completion macros for readable test output
//! - A one-call graph runner
//!
//! # Example
//! ```ignore
//! use crate::test_utils::{init_test_logging, run_graph};
//!
//! #[test]
//! fn my_test() {
//!     init_test_logging();
//!     let sink = run_graph(Node::value(1));
//!     assert_eq!(sink.published, vec![Value::Int(1)]);
//! }
//! ```

use crate::graph::Node;
use crate::runtime::{CollectingSink, EngineBuilder};
use crate::types::Env;
use parking_lot::{const_mutex, Mutex, MutexGuard};
use std::sync::{Arc, Once};
use tracing_subscriber::fmt::format::FmtSpan;

static INIT_LOGGING: Once = Once::new();
static ENV_LOCK: Mutex<()> = const_mutex(());

/// Initialize test logging with trace-level output.
///
/// Safe to call multiple times; only initializes once.
pub fn init_test_logging() {
    init_test_logging_with_level(tracing::Level::TRACE);
}

/// Initialize test logging with a custom level.
///
/// The first call wins; later calls are no-ops.
pub fn init_test_logging_with_level(level: tracing::Level) {
    INIT_LOGGING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_max_level(level)
            .with_test_writer()
            .with_file(true)
            .with_line_number(true)
            .with_target(true)
            .with_thread_ids(true)
            .with_span_events(FmtSpan::CLOSE)
            .with_ansi(false)
            .try_init();
    });
}

/// Acquire the global environment lock for tests that mutate env vars.
pub(crate) fn env_lock() -> MutexGuard<'static, ()> {
    ENV_LOCK.lock()
}

/// Run `node` in an empty environment on a default engine, checking that
/// region membership balanced out.
pub(crate) fn run_graph(node: Arc<Node>) -> CollectingSink {
    let mut engine = EngineBuilder::new().build().expect("default engine");
    let mut sink = CollectingSink::new();
    let summary = engine
        .run(node, Env::new(), &mut sink)
        .expect("run should succeed");
    assert!(summary.is_balanced(), "unbalanced regions: {summary:?}");
    assert_eq!(sink.finished, 1);
    sink
}

/// Log a test phase transition with a visual separator.
#[macro_export]
macro_rules! test_phase {
    ($name:expr) => {
        tracing::info!(phase = %$name, "========================================");
        tracing::info!(phase = %$name, "TEST PHASE: {}", $name);
        tracing::info!(phase = %$name, "========================================");
    };
}

/// Log test completion with summary.
#[macro_export]
macro_rules! test_complete {
    ($name:expr) => {
        tracing::info!(test = %$name, "test completed successfully: {}", $name);
    };
    ($name:expr, $($key:ident = $value:expr),* $(,)?) => {
        tracing::info!(
            test = %$name,
            $($key = %$value,)*
            "test completed successfully: {}",
            $name
        );
    };
}
