use pretty_assertions::assert_eq;

use super::*;

#[test]
fn test_factory_sets_kind_and_message() {
    let err = index_out_of_range(5, 3);
    assert!(matches!(
        err.kind,
        EvalErrorKind::IndexOutOfRange { index: 5, len: 3 }
    ));
    assert_eq!(err.message, "index out of range [5] with length 3");
    assert_eq!(err.pos, None);
}

#[test]
fn test_display_with_position() {
    let err = undefined_symbol("x").at(Position::new(3, 7));
    assert_eq!(err.to_string(), "3:7 undefined symbol 'x'");
}

#[test]
fn test_display_without_position() {
    assert_eq!(modulo_by_zero().to_string(), "integer divide by zero");
}

#[test]
fn test_innermost_position_wins() {
    let err = undefined_symbol("x")
        .at(Position::new(2, 1))
        .rewrap(Position::new(1, 1));
    assert_eq!(err.pos, Some(Position::new(2, 1)));
}

#[test]
fn test_unknown_position_is_not_attached() {
    let err = undefined_symbol("x").at(Position::NONE);
    assert_eq!(err.pos, None);
    let err = err.at(Position::new(4, 2));
    assert_eq!(err.pos, Some(Position::new(4, 2)));
}

#[test]
fn test_result_ext_converts_and_positions() {
    let failed: Result<(), EnvError> = Err(EnvError::ImmutableBinding("k".to_string()));
    let err = failed.at(Position::new(9, 9)).unwrap_err();
    assert!(matches!(err.kind, EvalErrorKind::ImmutableBinding { ref name } if name == "k"));
    assert_eq!(err.to_string(), "9:9 cannot assign to immutable binding 'k'");
}

#[test]
fn test_argument_count_messages() {
    assert_eq!(
        wrong_argument_count("f", 2, 1, false).message,
        "function f wants 2 arguments but received 1"
    );
    assert_eq!(
        wrong_argument_count("g", 1, 0, true).message,
        "function g wants at least 1 arguments but received 0"
    );
}

#[test]
fn test_operation_message_uses_symbol() {
    let err = invalid_operation(BinaryOp::Sub, "string", "int");
    assert_eq!(err.message, "invalid operation: string - int");
}

#[test]
fn test_catch_value() {
    assert_eq!(thrown(Value::Int(7)).catch_value(), Value::Int(7));
    assert_eq!(
        undefined_symbol("y").catch_value(),
        Value::string("undefined symbol 'y'")
    );
}

#[test]
fn test_cancelled() {
    assert!(cancelled().is_cancelled());
    assert!(!EvalError::new("boom").is_cancelled());
}

#[test]
fn test_convert_error_display() {
    let plain = ConvertError::new("string", "int");
    assert_eq!(plain.to_string(), "cannot convert string to int");
    let detailed = plain.with_detail("not a number");
    assert_eq!(detailed.to_string(), "cannot convert string to int: not a number");
}

#[test]
fn test_convert_error_into_eval_error() {
    let err: EvalError = ConvertError::new("bool", "[]int").into();
    assert!(matches!(
        err.kind,
        EvalErrorKind::TypeCannotBeAssigned { ref from, ref to } if from == "bool" && to == "[]int"
    ));
}

#[test]
fn test_env_error_carries_name() {
    let err: EvalError = EnvError::InvalidSymbol("a.b".to_string()).into();
    assert_eq!(err.message, "invalid symbol 'a.b'");
    let typed = EnvError::TypeCannotBeAssigned {
        name: "n".to_string(),
        from: "string".to_string(),
        to: "int".to_string(),
    };
    assert_eq!(typed.to_string(), "'n': type string cannot be assigned to type int");
}

#[test]
fn test_host_error_wraps_eval_error() {
    let host: HostError = undefined_symbol("q").into();
    assert!(matches!(host, HostError::Eval(_)));
    assert_eq!(host.to_string(), "undefined symbol 'q'");
    assert_eq!(HostError::from("bad input").to_string(), "bad input");
}
