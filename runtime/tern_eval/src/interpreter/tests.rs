use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use tern_ir::build::*;
use tern_ir::{FuncDecl, Param, Stmt, TypeExpr};
use tern_value::{Environment, EvalError, EvalErrorKind, Function, Type, Value};

use super::{evaluate_expression, evaluate_statement, Flow, Interpreter};
use crate::context::{CancelToken, RunContext};
use crate::eval_mode::EvalMode;

fn interpreter(mode: EvalMode) -> Interpreter {
    Interpreter::new(Arc::new(RunContext::new(CancelToken::new()).with_mode(mode)))
}

fn run_in(env: &Environment, program: &Stmt) -> Result<Value, EvalError> {
    interpreter(EvalMode::Run).run_program(env, program)
}

fn run(program: &Stmt) -> Result<Value, EvalError> {
    run_in(&Environment::new(), program)
}

/// Host `push(s)` appending to a shared log.
fn logger(env: &Environment) -> Arc<Mutex<Vec<String>>> {
    let log = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&log);
    let push = Function::wrap("push", move |s: String| sink.lock().push(s));
    env.define_value("push", Value::Func(push)).unwrap();
    log
}

fn ints(values: &[i64]) -> Value {
    Value::slice(values.iter().map(|v| Value::Int(*v)).collect(), Type::Any)
}

#[test]
fn test_eleven_cycle_fixture() {
    let interp = interpreter(EvalMode::Run);
    let program = program(vec![
        assign1("a", int(1)),
        assign1("b", int(2)),
        if_(eq(ident("a"), ident("b")), vec![return1(ident("a"))], vec![], None),
        return1(ident("b")),
    ]);
    let value = interp.run_program(&Environment::new(), &program).unwrap();
    assert_eq!(value, Value::Int(2));
    assert_eq!(interp.context().stats().cycles(), 11);
}

#[test]
fn test_arithmetic() {
    let ctx = Arc::new(RunContext::new(CancelToken::new()));
    let env = Environment::new();
    let eval = |e| evaluate_expression(&ctx, &env, &e).unwrap();
    assert_eq!(eval(add(int(1), float(1.5))), Value::Float(2.5));
    assert_eq!(eval(add(string("a"), int(1))), Value::string("a1"));
    assert_eq!(eval(rem(int(7), int(2))), Value::Int(1));
    assert_eq!(eval(div(int(7), int(2))), Value::Float(3.5));
    assert_eq!(eval(number("0x1F")), Value::Int(31));
    assert_eq!(eval(number("1e3")), Value::Float(1000.0));
}

#[test]
fn test_statement_flow() {
    let ctx = Arc::new(RunContext::new(CancelToken::new()));
    let env = Environment::new();
    assert_eq!(
        evaluate_statement(&ctx, &env, &return1(int(5))).unwrap(),
        Flow::Return(Value::Int(5))
    );
    assert_eq!(evaluate_statement(&ctx, &env, &break_()).unwrap(), Flow::Break);
    assert!(Flow::Continue.into_result().is_err());
}

#[test]
fn test_increment_first_element() {
    let env = Environment::new();
    let program = program(vec![
        assign1("a", array(vec![int(1), int(2), int(3)])),
        assign(
            vec![index(ident("a"), int(0))],
            vec![add(index(ident("a"), int(0)), int(1))],
        ),
    ]);
    run_in(&env, &program).unwrap();
    assert_eq!(env.get_value("a").unwrap(), ints(&[2, 2, 3]));
}

#[test]
fn test_index_append_and_out_of_range() {
    let env = Environment::new();
    let append = program(vec![
        assign1("a", array(vec![int(1), int(2), int(3)])),
        assign(vec![index(ident("a"), int(3))], vec![int(4)]),
    ]);
    run_in(&env, &append).unwrap();
    assert_eq!(env.get_value("a").unwrap(), ints(&[1, 2, 3, 4]));

    let gap = program(vec![assign(vec![index(ident("a"), int(6))], vec![int(1)])]);
    let err = run_in(&env, &gap).unwrap_err();
    assert!(matches!(err.kind, EvalErrorKind::IndexOutOfRange { index: 6, len: 4 }));
}

#[test]
fn test_named_function_call() {
    let program = program(vec![
        expr_stmt(func(
            Some("f"),
            &["x"],
            vec![return1(add(ident("x"), int(1)))],
        )),
        return1(call("f", vec![int(3)])),
    ]);
    assert_eq!(run(&program).unwrap(), Value::Int(4));
}

#[test]
fn test_recursion() {
    let fib = func(
        Some("fib"),
        &["n"],
        vec![
            if_(lt(ident("n"), int(2)), vec![return1(ident("n"))], vec![], None),
            return1(add(
                call("fib", vec![sub(ident("n"), int(1))]),
                call("fib", vec![sub(ident("n"), int(2))]),
            )),
        ],
    );
    let program = program(vec![expr_stmt(fib), return1(call("fib", vec![int(10)]))]);
    assert_eq!(run(&program).unwrap(), Value::Int(55));
}

#[test]
fn test_block_scope_isolation() {
    let env = Environment::new();
    let program = program(vec![
        assign1("a", int(1)),
        block(vec![assign1("b", int(2)), assign1("a", int(3))]),
    ]);
    run_in(&env, &program).unwrap();
    assert_eq!(env.get_value("a").unwrap(), Value::Int(3));
    assert!(!env.has("b"));
}

#[test]
fn test_closure_keeps_captured_scope() {
    let counter = func(
        None,
        &[],
        vec![
            assign1("n", add(ident("n"), int(1))),
            return1(ident("n")),
        ],
    );
    let program = program(vec![
        expr_stmt(func(
            Some("mk"),
            &[],
            vec![assign1("n", int(0)), return1(counter)],
        )),
        assign1("c", call("mk", vec![])),
        expr_stmt(call("c", vec![])),
        return1(call("c", vec![])),
    ]);
    assert_eq!(run(&program).unwrap(), Value::Int(2));
}

#[test]
fn test_variadic_parameters() {
    let decl = FuncDecl {
        name: Some("count".to_string()),
        params: vec![Param::untyped("first"), Param::untyped("rest")],
        variadic: true,
        returns: None,
        body: vec![return1(len(ident("rest")))],
    };
    let program = program(vec![
        expr_stmt(func_decl(decl)),
        return1(call("count", vec![int(1), int(2), int(3)])),
    ]);
    assert_eq!(run(&program).unwrap(), Value::Int(2));
}

#[test]
fn test_declared_return_type_is_checked() {
    let decl = FuncDecl {
        name: Some("f".to_string()),
        params: vec![],
        variadic: false,
        returns: Some(vec![TypeExpr::named("int")]),
        body: vec![return1(array(vec![]))],
    };
    let program = program(vec![
        expr_stmt(func_decl(decl)),
        expr_stmt(call("f", vec![])),
    ]);
    let err = run(&program).unwrap_err();
    assert!(matches!(err.kind, EvalErrorKind::ReturnMismatch { .. }));
}

#[test]
fn test_multiple_results_destructure() {
    let env = Environment::new();
    let program = program(vec![
        expr_stmt(func(Some("pair"), &[], vec![return_(vec![int(1), int(2)])])),
        var(&["a", "b"], None, vec![call("pair", vec![])]),
        assign1("m", map(vec![(string("k"), int(7))])),
        var(&["v", "ok"], None, vec![index(ident("m"), string("z"))]),
    ]);
    run_in(&env, &program).unwrap();
    assert_eq!(env.get_value("a").unwrap(), Value::Int(1));
    assert_eq!(env.get_value("b").unwrap(), Value::Int(2));
    assert_eq!(env.get_value("ok").unwrap(), Value::Bool(false));
}

#[test]
fn test_typed_and_immutable_bindings() {
    let typed = program(vec![var(&["x"], Some(TypeExpr::named("int")), vec![array(vec![])])]);
    assert!(run(&typed).is_err());

    let constant_reassigned = program(vec![constant("k", int(1)), assign1("k", int(2))]);
    let err = run(&constant_reassigned).unwrap_err();
    assert!(matches!(err.kind, EvalErrorKind::ImmutableBinding { .. }));
}

#[test]
fn test_pointer_store() {
    let env = Environment::new();
    let program = program(vec![
        assign1("x", int(1)),
        assign1("p", addr(ident("x"))),
        assign(vec![deref(ident("p"))], vec![int(5)]),
    ]);
    run_in(&env, &program).unwrap();
    assert_eq!(env.get_value("x").unwrap(), Value::Int(5));
}

#[test]
fn test_defers_run_last_in_first_out() {
    let env = Environment::new();
    let log = logger(&env);
    let program = program(vec![
        expr_stmt(func(
            Some("f"),
            &[],
            vec![
                defer(call("push", vec![string("a")])),
                defer(call("push", vec![string("b")])),
                expr_stmt(call("push", vec![string("body")])),
            ],
        )),
        defer(call("push", vec![string("end")])),
        expr_stmt(call("f", vec![])),
    ]);
    run_in(&env, &program).unwrap();
    assert_eq!(*log.lock(), vec!["body", "b", "a", "end"]);
}

#[test]
fn test_try_catch_finally() {
    let env = Environment::new();
    let program = program(vec![
        assign1("r", string("")),
        try_(
            vec![throw(string("boom"))],
            Some("e"),
            vec![assign1("r", ident("e"))],
            Some(vec![assign1("r", add(ident("r"), string("!")))]),
        ),
    ]);
    run_in(&env, &program).unwrap();
    assert_eq!(env.get_value("r").unwrap(), Value::string("boom!"));
}

#[test]
fn test_runtime_errors_are_catchable() {
    let env = Environment::new();
    let program = program(vec![
        assign1("r", nil()),
        try_(
            vec![assign1("x", rem(int(1), int(0)))],
            Some("e"),
            vec![assign1("r", ident("e"))],
            None,
        ),
    ]);
    run_in(&env, &program).unwrap();
    assert!(matches!(env.get_value("r").unwrap(), Value::Str(_)));
}

#[test]
fn test_cancellation_is_not_catchable() {
    let token = CancelToken::new();
    let env = Environment::new();
    let trigger = token.clone();
    env.define_value("stop", Value::Func(Function::wrap("stop", move || trigger.cancel())))
        .unwrap();
    let interp = Interpreter::new(Arc::new(RunContext::new(token)));
    let program = program(vec![try_(
        vec![expr_stmt(call("stop", vec![])), assign1("x", int(1))],
        Some("e"),
        vec![assign1("caught", boolean(true))],
        None,
    )]);
    let err = interp.run_program(&env, &program).unwrap_err();
    assert!(err.is_cancelled());
    assert!(!env.has("caught"));
}

#[test]
fn test_loops() {
    let env = Environment::new();
    let program = program(vec![
        assign1("sum", int(0)),
        for_in(
            &["v"],
            array(vec![int(1), int(2), int(3)]),
            vec![assign1("sum", add(ident("sum"), ident("v")))],
        ),
        assign1("keys", string("")),
        for_in(
            &["k"],
            map(vec![(string("b"), int(2)), (string("a"), int(1))]),
            vec![assign1("keys", add(ident("keys"), ident("k")))],
        ),
        assign1("n", int(0)),
        cfor(
            Some(assign1("i", int(0))),
            Some(lt(ident("i"), int(10))),
            Some(incr(ident("i"))),
            vec![
                if_(eq(ident("i"), int(5)), vec![break_()], vec![], None),
                assign1("n", add(ident("n"), int(1))),
            ],
        ),
        assign1("j", int(0)),
        loop_(
            Some(lt(ident("j"), int(3))),
            vec![assign1("j", add(ident("j"), int(1)))],
        ),
    ]);
    run_in(&env, &program).unwrap();
    assert_eq!(env.get_value("sum").unwrap(), Value::Int(6));
    assert_eq!(env.get_value("keys").unwrap(), Value::string("ab"));
    assert_eq!(env.get_value("n").unwrap(), Value::Int(5));
    assert_eq!(env.get_value("j").unwrap(), Value::Int(3));
    assert!(!env.has("i"));
}

#[test]
fn test_switch_break() {
    let env = Environment::new();
    let program = program(vec![
        assign1("x", int(3)),
        assign1("r", string("")),
        switch(
            ident("x"),
            vec![
                (vec![int(1), int(2)], vec![assign1("r", string("low"))]),
                (
                    vec![int(3)],
                    vec![
                        assign1("r", string("three")),
                        break_(),
                        assign1("r", string("never")),
                    ],
                ),
            ],
            Some(vec![assign1("r", string("other"))]),
        ),
    ]);
    run_in(&env, &program).unwrap();
    assert_eq!(env.get_value("r").unwrap(), Value::string("three"));
}

#[test]
fn test_channels_and_select() {
    let env = Environment::new();
    let chan_int = TypeExpr::Chan(Box::new(TypeExpr::named("int")));
    let program = program(vec![
        assign1("ch", make(chan_int.clone(), Some(int(2)), None)),
        send(ident("ch"), int(1)),
        send(ident("ch"), int(2)),
        close(ident("ch")),
        assign1("sum", int(0)),
        for_in(
            &["v"],
            ident("ch"),
            vec![assign1("sum", add(ident("sum"), ident("v")))],
        ),
        assign1("empty", make(chan_int.clone(), None, None)),
        assign1("r", string("")),
        select(
            vec![(expr_stmt(recv(ident("empty"))), vec![assign1("r", string("got"))])],
            Some(vec![assign1("r", string("default"))]),
        ),
        assign1("ready", make(chan_int, Some(int(1)), None)),
        send(ident("ready"), int(9)),
        assign1("got", int(0)),
        select(
            vec![(
                receive(ident("ready"), Some(ident("v")), None),
                vec![assign1("got", ident("v"))],
            )],
            None,
        ),
    ]);
    run_in(&env, &program).unwrap();
    assert_eq!(env.get_value("sum").unwrap(), Value::Int(3));
    assert_eq!(env.get_value("r").unwrap(), Value::string("default"));
    assert_eq!(env.get_value("got").unwrap(), Value::Int(9));
}

#[test]
fn test_validation_visits_every_branch() {
    let env = Environment::new();
    let invoked = Arc::new(AtomicUsize::new(0));
    let mut ids = Vec::new();
    for name in ["a", "b", "c", "unused"] {
        let invoked = Arc::clone(&invoked);
        let f = Function::wrap(name, move || {
            invoked.fetch_add(1, Ordering::SeqCst);
            1i64
        });
        ids.push(f.id());
        env.define_value(name, Value::Func(f)).unwrap();
    }
    let program = program(vec![
        assign1("x", int(1)),
        if_(
            eq(ident("x"), int(2)),
            vec![expr_stmt(call("a", vec![]))],
            vec![(eq(ident("x"), int(3)), vec![expr_stmt(call("b", vec![]))])],
            Some(vec![expr_stmt(call("c", vec![]))]),
        ),
    ]);
    let interp = interpreter(EvalMode::Validate);
    interp.validate_program(&env, &program).unwrap();
    let seen: Vec<bool> = ids
        .iter()
        .map(|id| interp.context().validation().was_called(*id))
        .collect();
    assert_eq!(seen, vec![true, true, true, false]);
    assert_eq!(invoked.load(Ordering::SeqCst), 0);
}

#[test]
fn test_validation_checks_function_bodies() {
    let env = Environment::new();
    let log = logger(&env);
    let program = program(vec![
        expr_stmt(func(
            Some("f"),
            &["x"],
            vec![expr_stmt(call("push", vec![ident("x")])), expr_stmt(call("missing", vec![]))],
        )),
    ]);
    let err = interpreter(EvalMode::Validate)
        .validate_program(&env, &program)
        .unwrap_err();
    assert!(matches!(err.kind, EvalErrorKind::UnknownSymbol { .. }));
    assert!(log.lock().is_empty());
}

#[test]
fn test_validation_visits_empty_range_bodies() {
    for iterable in [array(vec![]), map(vec![]), string(""), nil()] {
        let program = program(vec![
            assign1("xs", iterable),
            for_in(&["k", "v"], ident("xs"), vec![expr_stmt(call("nosuch", vec![]))]),
        ]);
        let err = interpreter(EvalMode::Validate)
            .validate_program(&Environment::new(), &program)
            .unwrap_err();
        assert!(matches!(err.kind, EvalErrorKind::UnknownSymbol { .. }));

        assert_eq!(run(&program).unwrap(), Value::Invalid);
    }
}

#[test]
fn test_number_literal_forms() {
    use super::expr::parse_number;

    assert_eq!(parse_number("0x1e").unwrap(), Value::Int(30));
    assert_eq!(parse_number("0X1E").unwrap(), Value::Int(30));
    assert_eq!(parse_number("-0x10").unwrap(), Value::Int(-16));
    assert_eq!(parse_number("1e3").unwrap(), Value::Float(1000.0));
    assert_eq!(parse_number("1E3").unwrap(), Value::Float(1000.0));
    assert_eq!(parse_number("2.5").unwrap(), Value::Float(2.5));
    assert_eq!(parse_number("42").unwrap(), Value::Int(42));
    assert!(parse_number("0xzz").is_err());
}

#[test]
fn test_inverted_slice_bounds_report_begin() {
    use super::expr::slice_bounds;

    let err = slice_bounds(Some(&Value::Int(3)), Some(&Value::Int(1)), 4).unwrap_err();
    assert!(matches!(err.kind, EvalErrorKind::IndexOutOfRange { index: 3, len: 1 }));
    assert_eq!(slice_bounds(None, None, 4).unwrap(), (0, 4));
    assert!(slice_bounds(Some(&Value::Int(-1)), None, 4).is_err());
}
