//! End-to-end engine tests.
//!
//! Each test builds a small expression graph by hand, runs it to completion
//! and checks what reached the sink, in what order, and that every region
//! closed cleanly.

#[macro_use]
mod common;

use common::*;
use orc_engine::error::{ErrorKind, TokenErrorKind};
use orc_engine::graph::{Arg, Binder, Def, Location, Node};
use orc_engine::runtime::{CollectingSink, EngineBuilder};
use orc_engine::site::{BlockingSite, CallHandle, ErrorSite, IfSite, Ltimer, Response, Rtimer, Site};
use orc_engine::trace::{TraceData, TraceEvent, TraceEventKind};
use orc_engine::types::{EngineState, Env, Value};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;

fn init_test(name: &str) {
    init_test_logging();
    test_phase!(name);
}

/// A site that never answers; it keeps the handles so dropping them does
/// not halt the callers.
#[derive(Default)]
struct Silent {
    parked: Mutex<Vec<CallHandle>>,
}

impl Site for Silent {
    fn name(&self) -> &str {
        "silent"
    }

    fn call(&self, _args: Vec<Value>, handle: CallHandle) {
        self.parked.lock().push(handle);
    }
}

/// A site that hands its call handle to the test thread.
struct Outside {
    tx: Mutex<mpsc::Sender<CallHandle>>,
}

impl Site for Outside {
    fn name(&self) -> &str {
        "outside"
    }

    fn call(&self, _args: Vec<Value>, handle: CallHandle) {
        let _ = self.tx.lock().send(handle);
    }
}

fn wait_for_state(handle: &orc_engine::runtime::EngineHandle, state: EngineState) {
    for _ in 0..5_000 {
        if handle.state() == state {
            return;
        }
        thread::sleep(Duration::from_millis(1));
    }
    panic!("engine never reached {state:?}");
}

// ============================================================================
// Scenarios
// ============================================================================

#[test]
fn parallel_calls_publish_each_value_once() {
    init_test("parallel_calls_publish_each_value_once");
    let (publish, calls) = counting_site("publish");
    let node = Node::parallel(
        Node::call(Arg::value(publish.clone()), vec![Arg::value("a")]),
        Node::call(Arg::value(publish), vec![Arg::value("b")]),
    );
    let (summary, sink) = run(node);

    let mut seen: Vec<String> = sink
        .published
        .iter()
        .filter_map(|v| v.as_str().map(str::to_owned))
        .collect();
    seen.sort();
    assert_eq!(seen, vec!["a".to_string(), "b".to_string()]);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(sink.finished, 1);
    assert!(summary.is_balanced());
    test_complete!("parallel_calls_publish_each_value_once");
}

#[test]
fn pruning_lets_exactly_one_value_through() {
    init_test("pruning_lets_exactly_one_value_through");
    let (publish, calls) = counting_site("publish");
    let node = Node::pruning(
        Node::call(Arg::value(publish), vec![Arg::var(0)]),
        Binder::var("x"),
        Node::parallel(Node::value(1), Node::value(2)),
    );
    let (summary, sink) = run(node);

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    let published = ints(&sink);
    assert_eq!(published.len(), 1);
    assert!(published[0] == 1 || published[0] == 2);
    assert!(summary.is_balanced());
    test_complete!("pruning_lets_exactly_one_value_through");
}

#[test]
fn sequential_after_stop_never_runs() {
    init_test("sequential_after_stop_never_runs");
    let (publish, calls) = counting_site("publish");
    let node = Node::sequential(
        Node::stop(),
        Binder::var("x"),
        Node::call(Arg::value(publish), vec![Arg::value("never")]),
    );
    let (summary, sink) = run(node);

    assert!(sink.published.is_empty());
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(sink.finished, 1);
    assert_eq!(summary.rounds, 0);
    test_complete!("sequential_after_stop_never_runs");
}

// ============================================================================
// Pruning and otherwise
// ============================================================================

#[test]
fn pruned_branches_are_dead_before_target_resumes() {
    init_test("pruned_branches_are_dead_before_target_resumes");
    let completed = Arc::new(AtomicUsize::new(0));
    let slow = {
        let completed = Arc::clone(&completed);
        Value::site(BlockingSite::new("slow", move |_| {
            thread::sleep(Duration::from_millis(30));
            completed.fetch_add(1, Ordering::SeqCst);
            Response::Publish(Value::Int(2))
        }))
    };
    let (follow, follow_calls) = counting_site("follow");
    // (x <x< ((slow() >> follow(2)) | 1)) | (Rtimer(150) >> stop)
    // The timer keeps the run alive until after the slow call answers.
    let losing = Node::sequential(
        Node::call(Arg::value(slow), vec![]),
        Binder::var("y"),
        Node::call(Arg::value(follow), vec![Arg::var(0)]),
    );
    let node = Node::parallel(
        Node::pruning(
            Node::let_(vec![Arg::var(0)]),
            Binder::var("x"),
            Node::parallel(losing, Node::value(1)),
        ),
        Node::sequential(
            Node::call(Arg::value(Value::site(Rtimer)), vec![Arg::value(150)]),
            Binder::Discard,
            Node::stop(),
        ),
    );
    let mut engine = EngineBuilder::new().trace_capacity(4096).build().unwrap();
    let mut sink = CollectingSink::new();
    let summary = engine.run(node, Env::new(), &mut sink).unwrap();

    assert_eq!(ints(&sink), vec![1]);
    assert!(summary.is_balanced());
    assert_with_log!(
        completed.load(Ordering::SeqCst) == 1,
        "slow call answered during the run",
        1,
        completed.load(Ordering::SeqCst)
    );
    assert_with_log!(
        follow_calls.load(Ordering::SeqCst) == 0,
        "continuation of a pruned branch never runs",
        0,
        follow_calls.load(Ordering::SeqCst)
    );

    test_section!("trace");
    let trace = engine.trace().unwrap();
    assert_eq!(trace.overwritten(), 0);
    let events: Vec<&TraceEvent> = trace.iter().collect();
    let token_of = |event: &TraceEvent| match event.data {
        TraceData::Token { token, region } => Some((token, region)),
        _ => None,
    };
    let pruning_region = events
        .iter()
        .find_map(|event| match (event.kind, &event.data) {
            (TraceEventKind::RegionOpen, TraceData::Region { region, parent: Some(_) }) => {
                Some(*region)
            }
            _ => None,
        })
        .expect("pruning region opened");

    // The slow caller's answer is the one discarded resumption.
    let discarded: Vec<String> = events
        .iter()
        .filter_map(|event| match (event.kind, &event.data) {
            (TraceEventKind::Discard, TraceData::Message(token)) => Some(token.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(discarded.len(), 1);
    assert!(events
        .iter()
        .filter(|event| event.kind == TraceEventKind::Admit)
        .filter_map(|event| token_of(event))
        .all(|(token, _)| token.to_string() != discarded[0]));

    // When the target is admitted, nothing started in the pruning region is
    // still alive; the only other live token is the timer caller.
    let target_admitted = events
        .iter()
        .position(|event| event.kind == TraceEventKind::Admit)
        .expect("target admitted");
    let mut live = 0_i64;
    let mut live_in_source = 0_i64;
    for event in &events[..target_admitted] {
        let delta = match event.kind {
            TraceEventKind::Fork => 1,
            TraceEventKind::Death => -1,
            _ => continue,
        };
        if let Some((_, region)) = token_of(event) {
            live += delta;
            if region == pruning_region {
                live_in_source += delta;
            }
        }
    }
    assert_eq!(live_in_source, 0);
    assert_eq!(live, 2);
    let discard_at = events
        .iter()
        .position(|event| event.kind == TraceEventKind::Discard)
        .expect("discard traced");
    assert!(discard_at > target_admitted);
    test_complete!("pruned_branches_are_dead_before_target_resumes");
}

#[test]
fn silent_pruning_sources_kill_their_targets() {
    init_test("silent_pruning_sources_kill_their_targets");
    let (publish, calls) = counting_site("publish");
    let reader = |publish: Value| {
        Node::pruning(
            Node::call(Arg::value(publish), vec![Arg::var(0)]),
            Binder::var("x"),
            Node::stop(),
        )
    };
    let node = Node::parallel(
        reader(publish.clone()),
        Node::parallel(reader(publish), Node::value(3)),
    );
    let (summary, sink) = run(node);

    assert_eq!(ints(&sink), vec![3]);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert!(summary.is_balanced());
    test_complete!("silent_pruning_sources_kill_their_targets");
}

#[test]
fn otherwise_falls_back_after_asynchronous_halt() {
    init_test("otherwise_falls_back_after_asynchronous_halt");
    let never = Value::site(BlockingSite::new("never", |_| Response::Halt));
    let node = Node::otherwise(Node::call(Arg::value(never), vec![]), Node::value(5));
    let (summary, sink) = run(node);

    assert_eq!(ints(&sink), vec![5]);
    assert!(summary.is_balanced());
    test_complete!("otherwise_falls_back_after_asynchronous_halt");
}

#[test]
fn if_site_guards_a_sequence() {
    init_test("if_site_guards_a_sequence");
    let guarded = |cond: bool, n: i64| {
        Node::sequential(
            Node::call(Arg::value(Value::site(IfSite)), vec![Arg::value(cond)]),
            Binder::Discard,
            Node::value(n),
        )
    };
    let (_, sink) = run(Node::parallel(guarded(true, 1), guarded(false, 2)));
    assert_eq!(ints(&sink), vec![1]);
    test_complete!("if_site_guards_a_sequence");
}

// ============================================================================
// Closures, exceptions and errors
// ============================================================================

#[test]
fn deep_recursion_completes() {
    init_test("deep_recursion_completes");
    let pred = Value::site(orc_engine::site::FnSite::new("pred", |args| {
        match args[0].as_int() {
            Some(n) if n > 0 => Response::Publish(Value::Int(n - 1)),
            _ => Response::Halt,
        }
    }));
    let is_zero = Value::site(orc_engine::site::FnSite::new("zero", |args| {
        Response::Publish(Value::Bool(args[0].as_int() == Some(0)))
    }));
    // def down(n) = (zero(n) >z> if(z) >> "done") ; (pred(n) >m> down(m))
    let done = Node::sequential(
        Node::call(Arg::value(is_zero), vec![Arg::var(0)]),
        Binder::var("z"),
        Node::sequential(
            Node::call(Arg::value(Value::site(IfSite)), vec![Arg::var(0)]),
            Binder::Discard,
            Node::value("done"),
        ),
    );
    let next = Node::sequential(
        Node::call(Arg::value(pred), vec![Arg::var(0)]),
        Binder::var("m"),
        Node::call(Arg::var(2), vec![Arg::var(0)]),
    );
    let node = Node::defs(
        vec![Def::new("down", 1, Node::otherwise(done, next))],
        Node::call(Arg::var(0), vec![Arg::value(2_000)]),
    );
    let (summary, sink) = run(node);

    assert_eq!(sink.published, vec![Value::str("done")]);
    assert!(summary.is_balanced());
    test_complete!("deep_recursion_completes", rounds = summary.rounds);
}

#[test]
fn caught_exceptions_reach_the_handler() {
    init_test("caught_exceptions_reach_the_handler");
    // try (1 | throw 2) catch e -> e
    let node = Node::catch(
        Node::parallel(Node::value(1), Node::throw(Arg::value(2))),
        Node::let_(vec![Arg::var(0)]),
    );
    let (summary, sink) = run(node);

    let mut seen = ints(&sink);
    seen.sort_unstable();
    assert_eq!(seen, vec![1, 2]);
    assert!(sink.errors.is_empty());
    assert!(summary.is_balanced());
    test_complete!("caught_exceptions_reach_the_handler");
}

#[test]
fn site_failures_are_reported_with_backtrace() {
    init_test("site_failures_are_reported_with_backtrace");
    // def check() = @main.orc:4:9 Error("bad input")
    // check() | 7
    let body = Node::located(
        Location::new("main.orc", 4, 9),
        Node::call(
            Arg::value(Value::site(ErrorSite)),
            vec![Arg::value("bad input")],
        ),
    );
    let node = Node::defs(
        vec![Def::new("check", 0, body)],
        Node::parallel(
            Node::located(
                Location::new("main.orc", 10, 1),
                Node::call(Arg::var(0), vec![]),
            ),
            Node::value(7),
        ),
    );
    let (_, sink) = run(node);

    assert_eq!(ints(&sink), vec![7]);
    assert_eq!(sink.errors.len(), 1);
    let error = &sink.errors[0];
    assert!(matches!(error.kind, TokenErrorKind::SiteFailure { .. }));
    assert_eq!(error.location, Some(Location::new("main.orc", 4, 9)));
    assert_eq!(error.backtrace.len(), 1);
    assert_eq!(&*error.backtrace[0].callee, "check");
    assert_eq!(
        error.backtrace[0].location,
        Some(Location::new("main.orc", 10, 1))
    );
    let rendered = error.render();
    assert!(rendered.contains("bad input"), "{rendered}");
    test_complete!("site_failures_are_reported_with_backtrace");
}

#[test]
fn bad_timer_argument_is_a_type_error() {
    init_test("bad_timer_argument_is_a_type_error");
    let node = Node::call(Arg::value(Value::site(Ltimer)), vec![Arg::value("soon")]);
    let (_, sink) = run(node);
    assert!(matches!(
        sink.errors[0].kind,
        TokenErrorKind::ArgumentType { position: 0, .. }
    ));
    test_complete!("bad_timer_argument_is_a_type_error");
}

// ============================================================================
// Limits and lifecycle
// ============================================================================

#[test]
fn publication_limit_stops_an_infinite_producer() {
    init_test("publication_limit_stops_an_infinite_producer");
    // def tick() = 1 | tick()
    let body = Node::parallel(Node::value(1), Node::call(Arg::var(0), vec![]));
    let node = Node::defs(
        vec![Def::new("tick", 0, body)],
        Node::call(Arg::var(0), vec![]),
    );
    let (summary, sink) = run_with(EngineBuilder::new().max_publications(3), node);

    assert_eq!(ints(&sink), vec![1, 1, 1]);
    assert_eq!(summary.publications, 3);
    assert_eq!(sink.finished, 1);
    assert!(summary.is_balanced());
    test_complete!("publication_limit_stops_an_infinite_producer");
}

#[test]
fn token_limit_aborts_the_run() {
    init_test("token_limit_aborts_the_run");
    let body = Node::parallel(Node::call(Arg::var(0), vec![]), Node::call(Arg::var(0), vec![]));
    let node = Node::defs(
        vec![Def::new("split", 0, body)],
        Node::call(Arg::var(0), vec![]),
    );
    let mut engine = EngineBuilder::new().max_tokens(64).build().unwrap();
    let mut sink = CollectingSink::new();
    let err = engine.run(node, Env::new(), &mut sink).unwrap_err();

    assert_eq!(err.kind(), ErrorKind::ResourceExhausted);
    assert_eq!(sink.finished, 1);
    assert_eq!(engine.live_tokens(), 0);
    assert_eq!(engine.state(), EngineState::Dead);
    assert!(engine.summary().is_balanced());
    test_complete!("token_limit_aborts_the_run");
}

#[test]
fn terminate_from_another_thread_stops_a_blocked_engine() {
    init_test("terminate_from_another_thread_stops_a_blocked_engine");
    let silent = Arc::new(Silent::default());
    let node = Node::parallel(
        Node::call(Arg::value(Value::Site(silent.clone())), vec![]),
        Node::value(1),
    );
    let mut engine = EngineBuilder::new().build().unwrap();
    let handle = engine.handle();
    let stopper = thread::spawn(move || {
        wait_for_state(&handle, EngineState::Blocked);
        handle.terminate();
    });

    let mut sink = CollectingSink::new();
    let summary = engine.run(node, Env::new(), &mut sink).unwrap();
    stopper.join().unwrap();

    assert_eq!(ints(&sink), vec![1]);
    assert_eq!(sink.finished, 1);
    assert!(summary.is_balanced());
    assert_eq!(engine.state(), EngineState::Dead);

    // Late answers after death are dropped.
    for late in silent.parked.lock().drain(..) {
        late.publish(Value::Int(99));
    }
    assert_eq!(ints(&sink), vec![1]);
    test_complete!("terminate_from_another_thread_stops_a_blocked_engine");
}

#[test]
fn responses_from_other_threads_resume_the_caller() {
    init_test("responses_from_other_threads_resume_the_caller");
    let (tx, rx) = mpsc::channel();
    let outside = Value::site(Outside { tx: Mutex::new(tx) });
    let node = Node::call(Arg::value(outside), vec![]);
    let mut engine = EngineBuilder::new().build().unwrap();
    let handle = engine.handle();
    let responder = thread::spawn(move || {
        let call = rx.recv().unwrap();
        wait_for_state(&handle, EngineState::Blocked);
        call.publish(Value::Int(42));
    });

    let mut sink = CollectingSink::new();
    let summary = engine.run(node, Env::new(), &mut sink).unwrap();
    responder.join().unwrap();

    assert_eq!(ints(&sink), vec![42]);
    assert_eq!(summary.rounds, 1);
    test_complete!("responses_from_other_threads_resume_the_caller");
}

#[test]
fn paused_engine_holds_responses_until_unpaused() {
    init_test("paused_engine_holds_responses_until_unpaused");
    let (tx, rx) = mpsc::channel();
    let outside = Value::site(Outside { tx: Mutex::new(tx) });
    let (echo, echo_calls) = counting_site("echo");
    // outside() >x> echo(x)
    let node = Node::sequential(
        Node::call(Arg::value(outside), vec![]),
        Binder::var("x"),
        Node::call(Arg::value(echo), vec![Arg::var(0)]),
    );
    let mut engine = EngineBuilder::new().build().unwrap();
    let handle = engine.handle();
    let calls = Arc::clone(&echo_calls);
    let controller = thread::spawn(move || {
        let call = rx.recv().unwrap();
        wait_for_state(&handle, EngineState::Blocked);

        test_section!("paused");
        handle.pause();
        assert!(handle.is_paused());
        call.publish(Value::Int(42));
        thread::sleep(Duration::from_millis(50));
        let while_paused = calls.load(Ordering::SeqCst);
        assert_eq!(handle.state(), EngineState::Blocked);

        test_section!("unpaused");
        handle.unpause();
        while_paused
    });

    let mut sink = CollectingSink::new();
    let summary = engine.run(node, Env::new(), &mut sink).unwrap();
    let while_paused = controller.join().unwrap();

    assert_with_log!(
        while_paused == 0,
        "no step while paused",
        0,
        while_paused
    );
    assert_eq!(echo_calls.load(Ordering::SeqCst), 1);
    assert_eq!(ints(&sink), vec![42]);
    assert_eq!(summary.rounds, 1);
    assert!(!engine.handle().is_paused());
    test_complete!("paused_engine_holds_responses_until_unpaused");
}

#[test]
fn terminate_ends_a_paused_run() {
    init_test("terminate_ends_a_paused_run");
    let silent = Arc::new(Silent::default());
    let node = Node::parallel(
        Node::call(Arg::value(Value::Site(silent.clone())), vec![]),
        Node::value(1),
    );
    let mut engine = EngineBuilder::new().build().unwrap();
    let handle = engine.handle();
    let stopper = thread::spawn(move || {
        wait_for_state(&handle, EngineState::Blocked);
        handle.pause();
        handle.terminate();
    });

    let mut sink = CollectingSink::new();
    let summary = engine.run(node, Env::new(), &mut sink).unwrap();
    stopper.join().unwrap();

    assert_eq!(ints(&sink), vec![1]);
    assert_eq!(sink.finished, 1);
    assert!(summary.is_balanced());
    assert_eq!(engine.state(), EngineState::Dead);
    test_complete!("terminate_ends_a_paused_run");
}

#[test]
fn real_timer_publishes_after_immediate_work() {
    init_test("real_timer_publishes_after_immediate_work");
    let node = Node::parallel(
        Node::sequential(
            Node::call(Arg::value(Value::site(Rtimer)), vec![Arg::value(20)]),
            Binder::Discard,
            Node::value(2),
        ),
        Node::value(1),
    );
    let (_, sink) = run(node);
    assert_eq!(ints(&sink), vec![1, 2]);
    test_complete!("real_timer_publishes_after_immediate_work");
}

#[test]
fn logical_timers_fire_in_time_order() {
    init_test("logical_timers_fire_in_time_order");
    let after = |ticks: i64, label: &str| {
        Node::sequential(
            Node::call(Arg::value(Value::site(Ltimer)), vec![Arg::value(ticks)]),
            Binder::Discard,
            Node::value(label),
        )
    };
    let node = Node::parallel(
        after(3, "late"),
        Node::parallel(after(1, "early"), after(2, "middle")),
    );
    let (summary, sink) = run(node);

    assert_eq!(
        sink.published,
        vec![Value::str("early"), Value::str("middle"), Value::str("late")]
    );
    assert_eq!(summary.logical_time, 3);
    test_complete!("logical_timers_fire_in_time_order");
}

// ============================================================================
// Round ordering
// ============================================================================

fn wide(depth: u32, next: &mut i64) -> Arc<Node> {
    if depth == 0 {
        *next += 1;
        return Node::value(*next);
    }
    let left = wide(depth - 1, next);
    let right = wide(depth - 1, next);
    Node::parallel(left, right)
}

#[test]
fn resumptions_wait_for_the_ready_queue_to_drain() {
    init_test("resumptions_wait_for_the_ready_queue_to_drain");
    let quick = Value::site(BlockingSite::new("quick", |_| {
        Response::Publish(Value::Int(-1))
    }));
    let mut next = 0;
    let tree = wide(7, &mut next);
    let node = Node::parallel(Node::call(Arg::value(quick), vec![]), tree);
    let mut engine = EngineBuilder::new().trace_capacity(4096).build().unwrap();
    let mut sink = CollectingSink::new();
    let summary = engine.run(node, Env::new(), &mut sink).unwrap();

    let published = ints(&sink);
    assert_eq!(published.len(), 129);
    assert_eq!(published.last(), Some(&-1));
    assert_eq!(summary.rounds, 1);

    // The admission happens only once every tree publication is out.
    let trace = engine.trace().unwrap();
    let admitted = trace
        .iter()
        .position(|e| e.kind == TraceEventKind::Admit)
        .unwrap();
    let publications_before = trace
        .iter()
        .take(admitted)
        .filter(|e| e.kind == TraceEventKind::Publish)
        .count();
    assert_eq!(publications_before, 128);
    test_complete!("resumptions_wait_for_the_ready_queue_to_drain");
}
