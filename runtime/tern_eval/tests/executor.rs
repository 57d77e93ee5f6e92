//! End-to-end behavior of the execution envelope.

#![allow(clippy::unwrap_used, reason = "tests use unwrap to panic on unexpected state")]

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use tern_eval::{CancelToken, Environment, EvalErrorKind, Executor, Function, Value};
use tern_ir::build::*;
use tern_ir::{Stmt, TypeExpr};

/// Environment with a `print` host function writing to the returned log.
fn printing_env() -> (Environment, Arc<Mutex<Vec<String>>>) {
    let env = Environment::new();
    let log = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&log);
    let print = Function::wrap("print", move |v: Value| sink.lock().push(v.to_string()));
    env.define_value("print", Value::Func(print)).unwrap();
    (env, log)
}

fn fixture() -> Stmt {
    program(vec![
        assign1("a", int(1)),
        assign1("b", int(2)),
        if_(eq(ident("a"), ident("b")), vec![return1(ident("a"))], vec![], None),
        return1(ident("b")),
    ])
}

/// `x = 0; for { x = x + 1 }; print("after")`
fn endless_then_print() -> Stmt {
    program(vec![
        assign1("x", int(0)),
        loop_(None, vec![assign1("x", add(ident("x"), int(1)))]),
        expr_stmt(call("print", vec![string("after")])),
    ])
}

#[test]
fn eleven_cycles_through_executor() {
    let exec = Executor::new().unwrap();
    assert_eq!(exec.run(&CancelToken::new(), fixture()).unwrap(), Value::Int(2));
    assert_eq!(exec.cycles(), 11);
}

#[test]
fn bytecode_evaluates_like_the_tree() {
    let exec = Executor::new().unwrap();
    let cancel = CancelToken::new();
    let tree = program(vec![
        assign1("a", array(vec![int(1), int(2), int(3)])),
        assign(
            vec![index(ident("a"), int(0))],
            vec![add(index(ident("a"), int(0)), int(1))],
        ),
        return1(ident("a")),
    ]);
    let from_tree = exec.run(&cancel, tree.clone()).unwrap();
    let from_bytes = exec.run(&cancel, tern_bytecode::encode(&tree)).unwrap();
    assert_eq!(from_tree.to_string(), "[2 2 3]");
    assert_eq!(from_tree, from_bytes);
}

#[test]
fn cancellation_stops_a_loop_before_later_output() {
    let (env, log) = printing_env();
    let exec = Executor::builder().env(env).build().unwrap();
    let cancel = CancelToken::new();
    let canceller = cancel.clone();
    let stopper = thread::spawn(move || {
        thread::sleep(Duration::from_millis(50));
        canceller.cancel();
    });
    let err = exec.run(&cancel, endless_then_print()).unwrap_err();
    stopper.join().unwrap();
    assert!(err.is_cancelled());
    assert!(log.lock().is_empty());
}

#[test]
fn pause_freezes_the_cycle_counter() {
    let exec = Executor::new().unwrap();
    exec.environment()
        .define_value("print", Value::Func(Function::wrap("print", |_: Value| ())))
        .unwrap();
    let mut handle = exec
        .run_async(&CancelToken::new(), endless_then_print())
        .unwrap();
    thread::sleep(Duration::from_millis(30));
    exec.pause();
    thread::sleep(Duration::from_millis(50));
    let frozen = exec.cycles();
    thread::sleep(Duration::from_millis(100));
    assert_eq!(exec.cycles(), frozen);
    assert!(handle.try_wait().is_none());

    exec.resume();
    thread::sleep(Duration::from_millis(30));
    assert!(exec.cycles() > frozen);

    exec.stop();
    assert!(handle.wait().unwrap_err().is_cancelled());
}

#[test]
fn stop_cancels_a_paused_run() {
    let exec = Executor::new().unwrap();
    exec.pause();
    let handle = exec
        .run_async(&CancelToken::new(), endless_then_print())
        .unwrap();
    thread::sleep(Duration::from_millis(20));
    exec.stop();
    assert!(handle.wait().unwrap_err().is_cancelled());
    exec.resume();
}

#[test]
fn rate_limit_throttles_steps() {
    let exec = Executor::builder()
        .rate_limit(5, Duration::from_millis(50))
        .build()
        .unwrap();
    let started = Instant::now();
    assert_eq!(exec.run(&CancelToken::new(), fixture()).unwrap(), Value::Int(2));
    assert!(started.elapsed() >= Duration::from_millis(90));
}

#[test]
fn watchdog_cancels_scope_leaks() {
    let exec = Executor::builder()
        .max_env_count(200)
        .watchdog_interval(Duration::from_millis(10))
        .build()
        .unwrap();
    let leak = program(vec![
        assign1("fs", array(vec![])),
        loop_(
            None,
            vec![assign(
                vec![index(ident("fs"), len(ident("fs")))],
                vec![func(None, &[], vec![])],
            )],
        ),
    ]);
    let err = exec.run(&CancelToken::new(), leak).unwrap_err();
    assert!(err.is_cancelled());
}

#[test]
fn spawned_task_failure_wins() {
    let exec = Executor::new().unwrap();
    let chan_int = TypeExpr::Chan(Box::new(TypeExpr::named("int")));
    let program = program(vec![
        expr_stmt(func(Some("fail"), &[], vec![throw(string("bad"))])),
        spawn(call("fail", vec![])),
        assign1("ch", make(chan_int, None, None)),
        expr_stmt(recv(ident("ch"))),
    ]);
    let err = exec.run(&CancelToken::new(), program).unwrap_err();
    assert!(matches!(err.kind, EvalErrorKind::Thrown { .. }));
}

#[test]
fn has_reports_reachable_functions() {
    let env = Environment::new();
    let mut targets = Vec::new();
    for name in ["used", "unused"] {
        let f = Function::wrap(name, || -> i64 { panic!("host functions never run during validation") });
        env.define_value(name, Value::Func(f.clone())).unwrap();
        targets.push(Value::Func(f));
    }
    let exec = Executor::builder().env(env).build().unwrap();
    let program = program(vec![
        assign1("x", int(1)),
        if_(
            eq(ident("x"), int(2)),
            vec![expr_stmt(call("used", vec![]))],
            vec![],
            None,
        ),
    ]);
    assert_eq!(exec.has(program.clone(), &targets).unwrap(), vec![true, false]);
    exec.validate(program).unwrap();
    assert!(!exec.environment().has("x"));
}

#[test]
fn validation_reports_errors_in_untaken_branches() {
    let exec = Executor::new().unwrap();
    let program = program(vec![if_(
        boolean(false),
        vec![expr_stmt(call("nowhere", vec![]))],
        vec![],
        None,
    )]);
    let err = exec.validate(program.clone()).unwrap_err();
    assert!(matches!(err.kind, EvalErrorKind::UnknownSymbol { .. }));
    assert_eq!(exec.run(&CancelToken::new(), program).unwrap(), Value::Invalid);
}

/// `g = func(){ h = func(){return 1}; return h() }`, called `calls` times.
fn nested_closures(calls: i64) -> Stmt {
    program(vec![
        assign1(
            "g",
            func(
                None,
                &[],
                vec![
                    assign1("h", func(None, &[], vec![return1(int(1))])),
                    return1(call("h", vec![])),
                ],
            ),
        ),
        cfor(
            Some(assign1("i", int(0))),
            Some(lt(ident("i"), int(calls))),
            Some(incr(ident("i"))),
            vec![expr_stmt(call("g", vec![]))],
        ),
        return1(int(7)),
    ])
}

#[test]
fn finished_calls_release_their_scopes() {
    let exec = Executor::new().unwrap();
    let before = exec.environment().child_count();
    assert_eq!(exec.run(&CancelToken::new(), nested_closures(1000)).unwrap(), Value::Int(7));
    assert_eq!(exec.environment().child_count(), before);
}

#[test]
fn watchdog_ignores_released_scopes() {
    let exec = Executor::builder()
        .max_env_count(200)
        .watchdog_interval(Duration::from_millis(5))
        .build()
        .unwrap();
    assert_eq!(exec.run(&CancelToken::new(), nested_closures(2000)).unwrap(), Value::Int(7));
}

#[test]
fn spawned_writers_share_a_map() {
    let exec = Executor::new().unwrap();
    let chan_int = TypeExpr::Chan(Box::new(TypeExpr::named("int")));
    let writer = func(
        None,
        &["k"],
        vec![
            cfor(
                Some(assign1("j", int(0))),
                Some(lt(ident("j"), int(50))),
                Some(incr(ident("j"))),
                vec![assign(vec![index(ident("m"), ident("k"))], vec![ident("j")])],
            ),
            send(ident("done"), int(1)),
        ],
    );
    let mut body = vec![
        assign1("m", map(vec![])),
        assign1("done", make(chan_int, Some(int(4)), None)),
        assign1("w", writer),
    ];
    for key in ["a", "b", "c", "d"] {
        body.push(spawn(call("w", vec![string(key)])));
    }
    body.extend([
        assign1("seen", int(0)),
        cfor(
            Some(assign1("i", int(0))),
            Some(lt(ident("i"), int(4))),
            Some(incr(ident("i"))),
            vec![
                assign1("seen", add(ident("seen"), len(ident("m")))),
                expr_stmt(recv(ident("done"))),
            ],
        ),
        return1(array(vec![
            len(ident("m")),
            index(ident("m"), string("a")),
            index(ident("m"), string("d")),
        ])),
    ]);
    let value = exec.run(&CancelToken::new(), program(body)).unwrap();
    assert_eq!(value.to_string(), "[4 49 49]");
}
