#![allow(dead_code)]
#![allow(unused_imports)]
//! Shared integration test utilities.
//!
//! Import with:
//! ```ignore
//! #[macro_use]
//! mod common;
//! use common::*;
//! ```

use orc_engine::graph::Node;
use orc_engine::runtime::{CollectingSink, EngineBuilder, RunSummary};
use orc_engine::site::{FnSite, Response};
use orc_engine::types::{Env, Value};
use proptest::prelude::ProptestConfig;
use proptest::test_runner::RngSeed;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Once};
use tracing_subscriber::fmt::format::FmtSpan;

static INIT_LOGGING: Once = Once::new();

/// Seed used for property tests under CI when none is given.
pub const DEFAULT_PROPTEST_SEED: u64 = 0x5EED_5EED;

/// Proptest configuration for `cases` cases.
///
/// `ORC_PROPTEST_SEED` pins the RNG seed (CI pins [`DEFAULT_PROPTEST_SEED`]
/// when unset) unless proptest's own `PROPTEST_RNG_SEED` already did.
/// `ORC_PROPTEST_MAX_SHRINK_ITERS` bounds shrinking.
#[must_use]
pub fn test_proptest_config(cases: u32) -> ProptestConfig {
    let mut config = ProptestConfig::with_cases(cases);
    let seed = env_u64("ORC_PROPTEST_SEED")
        .or_else(|| std::env::var_os("CI").map(|_| DEFAULT_PROPTEST_SEED));
    if let Some(seed) = seed.filter(|_| matches!(config.rng_seed, RngSeed::Random)) {
        config.rng_seed = RngSeed::Fixed(seed);
    }
    if let Some(iters) = env_u64("ORC_PROPTEST_MAX_SHRINK_ITERS") {
        config.max_shrink_iters = u32::try_from(iters).unwrap_or(u32::MAX);
    }
    config
}

fn env_u64(name: &str) -> Option<u64> {
    std::env::var(name).ok()?.parse().ok()
}

/// Initialize test logging with trace-level output.
pub fn init_test_logging() {
    init_test_logging_with_level(tracing::Level::TRACE);
}

/// Initialize test logging with a custom level.
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

/// Run `node` on an engine built by `builder`, returning the summary and
/// everything the sink saw.
pub fn run_with(builder: EngineBuilder, node: Arc<Node>) -> (RunSummary, CollectingSink) {
    let mut engine = builder.build().expect("failed to build engine");
    let mut sink = CollectingSink::new();
    let summary = engine
        .run(node, Env::new(), &mut sink)
        .expect("run failed");
    (summary, sink)
}

/// Run `node` on a default engine.
pub fn run(node: Arc<Node>) -> (RunSummary, CollectingSink) {
    run_with(EngineBuilder::new(), node)
}

/// Integer publications, in order.
pub fn ints(sink: &CollectingSink) -> Vec<i64> {
    sink.published.iter().filter_map(Value::as_int).collect()
}

/// A site that counts its calls and publishes its single argument.
pub fn counting_site(name: &str) -> (Value, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&calls);
    let site = FnSite::new(name, move |mut args| {
        seen.fetch_add(1, Ordering::SeqCst);
        match args.len() {
            0 => Response::Publish(Value::Signal),
            _ => Response::Publish(args.remove(0)),
        }
    });
    (Value::site(site), calls)
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

/// Log a section within a test phase.
#[macro_export]
macro_rules! test_section {
    ($name:expr) => {
        tracing::debug!(section = %$name, "--- {} ---", $name);
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

/// Log before assertions for context.
#[macro_export]
macro_rules! assert_with_log {
    ($cond:expr, $msg:expr, $expected:expr, $actual:expr) => {
        tracing::debug!(
            expected = ?$expected,
            actual = ?$actual,
            "Asserting: {}",
            $msg
        );
        assert!($cond, "{}: expected {:?}, got {:?}", $msg, $expected, $actual);
    };
}
