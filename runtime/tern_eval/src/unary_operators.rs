//! Unary operator implementations for the evaluator.

use tern_ir::UnaryOp;
use tern_value::errors::invalid_unary;
use tern_value::{EvalResult, Value};

/// Evaluate a unary operation using direct pattern matching.
///
/// `!` applies condition semantics, so it accepts any value.
pub fn evaluate_unary(value: &Value, op: UnaryOp) -> EvalResult {
    match (value, op) {
        (Value::Int(n), UnaryOp::Neg) => Ok(Value::Int(n.wrapping_neg())),
        (Value::Float(f), UnaryOp::Neg) => Ok(Value::Float(-f)),
        (_, UnaryOp::Not) => Ok(Value::Bool(!value.truthy())),
        (Value::Int(n), UnaryOp::BitNot) => Ok(Value::Int(!*n)),
        _ => Err(invalid_unary(op, &value.type_name())),
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    reason = "tests use unwrap to panic on unexpected state"
)]
mod tests {
    use tern_ir::UnaryOp;
    use tern_value::{EvalErrorKind, Value};

    use super::evaluate_unary;

    #[test]
    fn negation() {
        assert_eq!(evaluate_unary(&Value::Int(3), UnaryOp::Neg).unwrap(), Value::Int(-3));
        assert_eq!(evaluate_unary(&Value::Float(1.5), UnaryOp::Neg).unwrap(), Value::Float(-1.5));
        assert_eq!(
            evaluate_unary(&Value::Int(i64::MIN), UnaryOp::Neg).unwrap(),
            Value::Int(i64::MIN)
        );
    }

    #[test]
    fn not_uses_truthiness() {
        assert_eq!(evaluate_unary(&Value::Bool(true), UnaryOp::Not).unwrap(), Value::Bool(false));
        assert_eq!(evaluate_unary(&Value::Nil, UnaryOp::Not).unwrap(), Value::Bool(true));
        assert_eq!(evaluate_unary(&Value::string("x"), UnaryOp::Not).unwrap(), Value::Bool(false));
    }

    #[test]
    fn bit_not() {
        assert_eq!(evaluate_unary(&Value::Int(0), UnaryOp::BitNot).unwrap(), Value::Int(-1));
    }

    #[test]
    fn invalid_operand() {
        let err = evaluate_unary(&Value::string("x"), UnaryOp::Neg).unwrap_err();
        assert!(matches!(err.kind, EvalErrorKind::InvalidUnary { .. }));
    }
}
