//! Engine benchmark suite.
//!
//! Benchmarks whole runs of representative expression graphs:
//! - Wide parallel trees: token fork and region accounting overhead
//! - Recursion: closure calls, frames and the otherwise combinator
//! - Pruning chains: future cells, parking and region close cascades
//! - Ready queue: raw schedule/pop throughput

#![allow(missing_docs)]
#![allow(clippy::semicolon_if_nothing_returned)]

use criterion::{
    black_box, criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion, Throughput,
};

use orc_engine::graph::{Arg, Binder, Def, Node};
use orc_engine::runtime::{CollectingSink, EngineBuilder, ReadyQueue};
use orc_engine::site::{FnSite, IfSite, Response};
use orc_engine::types::{Env, TokenId, Value};
use std::sync::Arc;

// =============================================================================
// HELPER FUNCTIONS
// =============================================================================

fn run_once(node: &Arc<Node>) -> usize {
    let mut engine = EngineBuilder::new().build().expect("engine");
    let mut sink = CollectingSink::new();
    engine
        .run(Arc::clone(node), Env::new(), &mut sink)
        .expect("run");
    sink.published.len()
}

/// A balanced parallel tree with `2^depth` value leaves.
fn wide(depth: u32) -> Arc<Node> {
    if depth == 0 {
        return Node::value(1);
    }
    Node::parallel(wide(depth - 1), wide(depth - 1))
}

/// `def down(n) = (zero(n) >z> if(z) >> 0) ; (pred(n) >m> down(m))`
fn countdown(n: i64) -> Arc<Node> {
    let pred = Value::site(FnSite::new("pred", |args| match args[0].as_int() {
        Some(n) if n > 0 => Response::Publish(Value::Int(n - 1)),
        _ => Response::Halt,
    }));
    let is_zero = Value::site(FnSite::new("zero", |args| {
        Response::Publish(Value::Bool(args[0].as_int() == Some(0)))
    }));
    let done = Node::sequential(
        Node::call(Arg::value(is_zero), vec![Arg::var(0)]),
        Binder::var("z"),
        Node::sequential(
            Node::call(Arg::value(Value::site(IfSite)), vec![Arg::var(0)]),
            Binder::Discard,
            Node::value(0),
        ),
    );
    let next = Node::sequential(
        Node::call(Arg::value(pred), vec![Arg::var(0)]),
        Binder::var("m"),
        Node::call(Arg::var(2), vec![Arg::var(0)]),
    );
    Node::defs(
        vec![Def::new("down", 1, Node::otherwise(done, next))],
        Node::call(Arg::var(0), vec![Arg::value(n)]),
    )
}

/// `x <x< (x <x< (... <x< (1 | 2)))`, `links` deep.
fn pruning_chain(links: u32) -> Arc<Node> {
    let mut node = Node::parallel(Node::value(1), Node::value(2));
    for _ in 0..links {
        node = Node::pruning(Node::let_(vec![Arg::var(0)]), Binder::var("x"), node);
    }
    node
}

// =============================================================================
// ENGINE BENCHMARKS
// =============================================================================

fn bench_parallel(c: &mut Criterion) {
    let mut group = c.benchmark_group("engine/parallel");

    for &depth in &[4u32, 8, 12] {
        let node = wide(depth);
        group.throughput(Throughput::Elements(1 << depth));
        group.bench_with_input(BenchmarkId::new("wide_tree", depth), &node, |b, node| {
            b.iter(|| black_box(run_once(node)))
        });
    }

    group.finish();
}

fn bench_recursion(c: &mut Criterion) {
    let mut group = c.benchmark_group("engine/recursion");

    for &n in &[100i64, 1_000] {
        let node = countdown(n);
        group.throughput(Throughput::Elements(n as u64));
        group.bench_with_input(BenchmarkId::new("countdown", n), &node, |b, node| {
            b.iter(|| black_box(run_once(node)))
        });
    }

    group.finish();
}

fn bench_pruning(c: &mut Criterion) {
    let mut group = c.benchmark_group("engine/pruning");

    for &links in &[10u32, 100] {
        let node = pruning_chain(links);
        group.throughput(Throughput::Elements(u64::from(links)));
        group.bench_with_input(BenchmarkId::new("chain", links), &node, |b, node| {
            b.iter(|| black_box(run_once(node)))
        });
    }

    group.finish();
}

// =============================================================================
// READY QUEUE BENCHMARKS
// =============================================================================

fn bench_ready_queue(c: &mut Criterion) {
    let mut group = c.benchmark_group("engine/ready_queue");

    for &count in &[10u32, 100, 1000] {
        group.throughput(Throughput::Elements(u64::from(count)));
        group.bench_with_input(
            BenchmarkId::new("schedule_then_pop", count),
            &count,
            |b, &count| {
                b.iter_batched(
                    ReadyQueue::new,
                    |mut queue| {
                        for i in 0..count {
                            queue.schedule(TokenId::new_for_test(i, 0));
                        }
                        while let Some(token) = queue.pop() {
                            black_box(token);
                        }
                    },
                    BatchSize::SmallInput,
                )
            },
        );
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_parallel,
    bench_recursion,
    bench_pruning,
    bench_ready_queue,
);

criterion_main!(benches);
