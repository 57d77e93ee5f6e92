//! Binary operator implementations for the evaluator.
//!
//! Direct enum-based dispatch over the operand pair. The rules:
//!
//! - `+` on two sequences concatenates; on a sequence and a scalar appends
//!   (the scalar is converted to the element type)
//! - `+` with a string on either side concatenates the display forms
//! - arithmetic promotes to float when either side is a float
//! - `<`, `<=`, `>`, `>=` compare as float (strings compare lexically)
//! - `/` is always float division
//! - `%`, bit operations and shifts are always integer
//!
//! `&&`, `||` and `??` short-circuit in the evaluator; the versions here are
//! the strict fallbacks.

use tern_ir::BinaryOp;
use tern_value::errors::{invalid_operation, modulo_by_zero};
use tern_value::{convert, EvalError, EvalResult, SliceValue, Value};

/// Evaluate a binary operation using direct pattern matching.
#[expect(
    clippy::needless_pass_by_value,
    reason = "operands are consumed by the sequence and string paths"
)]
pub fn evaluate_binary(left: Value, right: Value, op: BinaryOp) -> EvalResult {
    match op {
        BinaryOp::And => return Ok(Value::Bool(left.truthy() && right.truthy())),
        BinaryOp::Or => return Ok(Value::Bool(left.truthy() || right.truthy())),
        BinaryOp::Coalesce => return Ok(if left.is_nil() { right } else { left }),
        BinaryOp::Eq => return Ok(Value::Bool(left == right)),
        BinaryOp::NotEq => return Ok(Value::Bool(left != right)),
        _ => {}
    }

    match (&left, &right) {
        (Value::Slice(a), Value::Slice(b)) if op == BinaryOp::Add => concat_slices(a, b),
        (Value::Slice(a), scalar) if op == BinaryOp::Add => append_scalar(a, scalar.clone()),
        (Value::Str(a), Value::Str(b)) if op.is_comparison() => Ok(compare_strings(a, b, op)),
        (Value::Str(_), _) | (_, Value::Str(_)) => eval_string_binary(&left, &right, op),
        (Value::Int(a), Value::Int(b)) => eval_int_binary(*a, *b, op),
        (a, b) if a.is_number() && b.is_number() => match (a.as_float(), b.as_float()) {
            (Some(x), Some(y)) => eval_float_binary(x, y, op, a, b),
            _ => Err(mismatch(op, a, b)),
        },
        _ => Err(mismatch(op, &left, &right)),
    }
}

#[cold]
fn mismatch(op: BinaryOp, left: &Value, right: &Value) -> EvalError {
    invalid_operation(op, &left.type_name(), &right.type_name())
}

fn concat_slices(a: &SliceValue, b: &SliceValue) -> EvalResult {
    let elem = a.elem().clone();
    let mut items = a.to_vec();
    for item in b.to_vec() {
        items.push(convert(item, &elem)?);
    }
    Ok(Value::slice(items, elem))
}

fn append_scalar(a: &SliceValue, scalar: Value) -> EvalResult {
    let elem = a.elem().clone();
    let mut items = a.to_vec();
    items.push(convert(scalar, &elem)?);
    Ok(Value::slice(items, elem))
}

fn compare_strings(a: &str, b: &str, op: BinaryOp) -> Value {
    Value::Bool(match op {
        BinaryOp::Lt => a < b,
        BinaryOp::LtEq => a <= b,
        BinaryOp::Gt => a > b,
        BinaryOp::GtEq => a >= b,
        _ => false,
    })
}

/// Operations with a string on at least one side.
fn eval_string_binary(left: &Value, right: &Value, op: BinaryOp) -> EvalResult {
    match (op, left, right) {
        (BinaryOp::Add, _, _) => Ok(Value::string(format!("{left}{right}"))),
        (BinaryOp::Mul, Value::Str(s), Value::Int(n)) | (BinaryOp::Mul, Value::Int(n), Value::Str(s)) => {
            let count = usize::try_from(*n)
                .map_err(|_| EvalError::new(format!("negative repeat count {n}")))?;
            Ok(Value::string(s.repeat(count)))
        }
        _ => Err(mismatch(op, left, right)),
    }
}

fn eval_int_binary(a: i64, b: i64, op: BinaryOp) -> EvalResult {
    match op {
        BinaryOp::Add => Ok(Value::Int(a.wrapping_add(b))),
        BinaryOp::Sub => Ok(Value::Int(a.wrapping_sub(b))),
        BinaryOp::Mul => Ok(Value::Int(a.wrapping_mul(b))),
        #[expect(clippy::cast_precision_loss, reason = "division is defined as float")]
        BinaryOp::Div => Ok(Value::Float(a as f64 / b as f64)),
        BinaryOp::Mod => int_rem(a, b),
        BinaryOp::Pow => Ok(int_pow(a, b)),
        BinaryOp::Lt | BinaryOp::LtEq | BinaryOp::Gt | BinaryOp::GtEq => {
            #[expect(clippy::cast_precision_loss, reason = "comparisons are defined as float")]
            let (x, y) = (a as f64, b as f64);
            Ok(compare_floats(x, y, op))
        }
        BinaryOp::BitAnd => Ok(Value::Int(a & b)),
        BinaryOp::BitOr => Ok(Value::Int(a | b)),
        BinaryOp::BitXor => Ok(Value::Int(a ^ b)),
        BinaryOp::Shl => shift(a, b, i64::checked_shl),
        BinaryOp::Shr => shift(a, b, i64::checked_shr),
        _ => Err(invalid_operation(op, "int", "int")),
    }
}

fn eval_float_binary(a: f64, b: f64, op: BinaryOp, left: &Value, right: &Value) -> EvalResult {
    match op {
        BinaryOp::Add => Ok(Value::Float(a + b)),
        BinaryOp::Sub => Ok(Value::Float(a - b)),
        BinaryOp::Mul => Ok(Value::Float(a * b)),
        BinaryOp::Div => Ok(Value::Float(a / b)),
        BinaryOp::Pow => Ok(Value::Float(a.powf(b))),
        BinaryOp::Lt | BinaryOp::LtEq | BinaryOp::Gt | BinaryOp::GtEq => {
            Ok(compare_floats(a, b, op))
        }
        // Integer-only operators truncate float operands.
        BinaryOp::Mod
        | BinaryOp::BitAnd
        | BinaryOp::BitOr
        | BinaryOp::BitXor
        | BinaryOp::Shl
        | BinaryOp::Shr => {
            #[expect(clippy::cast_possible_truncation, reason = "integer operators truncate")]
            let (x, y) = (a as i64, b as i64);
            eval_int_binary(x, y, op)
        }
        _ => Err(mismatch(op, left, right)),
    }
}

fn compare_floats(a: f64, b: f64, op: BinaryOp) -> Value {
    Value::Bool(match op {
        BinaryOp::Lt => a < b,
        BinaryOp::LtEq => a <= b,
        BinaryOp::Gt => a > b,
        BinaryOp::GtEq => a >= b,
        _ => false,
    })
}

fn int_rem(a: i64, b: i64) -> EvalResult {
    if b == 0 {
        return Err(modulo_by_zero());
    }
    Ok(Value::Int(a.wrapping_rem(b)))
}

/// Integer power for a non-negative exponent that fits `u32`; float otherwise.
fn int_pow(a: i64, b: i64) -> Value {
    match u32::try_from(b) {
        Ok(exp) => Value::Int(a.wrapping_pow(exp)),
        #[expect(clippy::cast_precision_loss, reason = "negative exponents yield floats")]
        Err(_) => Value::Float((a as f64).powf(b as f64)),
    }
}

fn shift(a: i64, b: i64, op: fn(i64, u32) -> Option<i64>) -> EvalResult {
    u32::try_from(b)
        .ok()
        .and_then(|amount| op(a, amount))
        .map(Value::Int)
        .ok_or_else(|| EvalError::new(format!("shift amount {b} out of range (0-63)")))
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    reason = "tests use unwrap to panic on unexpected state"
)]
mod tests {
    use pretty_assertions::assert_eq;
    use tern_ir::BinaryOp;
    use tern_value::{EvalErrorKind, Type, Value};

    use super::evaluate_binary;

    fn eval(left: impl Into<Value>, op: BinaryOp, right: impl Into<Value>) -> Value {
        evaluate_binary(left.into(), right.into(), op).unwrap()
    }

    #[test]
    fn float_promotion() {
        assert_eq!(eval(1, BinaryOp::Add, 1.5), Value::Float(2.5));
        assert_eq!(eval(2.0, BinaryOp::Mul, 3), Value::Float(6.0));
        assert_eq!(eval(2, BinaryOp::Add, 3), Value::Int(5));
    }

    #[test]
    fn division_is_float() {
        assert!(matches!(eval(7, BinaryOp::Div, 2), Value::Float(f) if (f - 3.5).abs() < f64::EPSILON));
        assert!(matches!(eval(1, BinaryOp::Div, 0), Value::Float(f) if f.is_infinite()));
    }

    #[test]
    fn modulo_is_integer() {
        assert_eq!(eval(7, BinaryOp::Mod, 2), Value::Int(1));
        assert_eq!(eval(7.9, BinaryOp::Mod, 2), Value::Int(1));
        let err = evaluate_binary(Value::Int(1), Value::Int(0), BinaryOp::Mod).unwrap_err();
        assert!(matches!(err.kind, EvalErrorKind::ModuloByZero));
    }

    #[test]
    fn string_concatenation() {
        assert_eq!(eval("a", BinaryOp::Add, 1), Value::string("a1"));
        assert_eq!(eval(1.5, BinaryOp::Add, "x"), Value::string("1.5x"));
        assert_eq!(eval("ab", BinaryOp::Mul, 3), Value::string("ababab"));
        assert_eq!(eval("a", BinaryOp::Eq, "a"), Value::Bool(true));
        assert_eq!(eval("a", BinaryOp::Lt, "b"), Value::Bool(true));
    }

    #[test]
    fn comparisons_cross_numeric_kinds() {
        assert_eq!(eval(1, BinaryOp::Lt, 1.5), Value::Bool(true));
        assert_eq!(eval(2, BinaryOp::GtEq, 2.0), Value::Bool(true));
        assert_eq!(eval(2, BinaryOp::Eq, 2.0), Value::Bool(true));
        assert_eq!(eval(2, BinaryOp::NotEq, "2"), Value::Bool(true));
    }

    #[test]
    fn bit_operations_and_shifts() {
        assert_eq!(eval(6, BinaryOp::BitAnd, 3), Value::Int(2));
        assert_eq!(eval(6, BinaryOp::BitOr, 3), Value::Int(7));
        assert_eq!(eval(6, BinaryOp::BitXor, 3), Value::Int(5));
        assert_eq!(eval(1, BinaryOp::Shl, 4), Value::Int(16));
        assert_eq!(eval(16, BinaryOp::Shr, 2), Value::Int(4));
        assert!(evaluate_binary(Value::Int(1), Value::Int(64), BinaryOp::Shl).is_err());
    }

    #[test]
    fn power() {
        assert_eq!(eval(2, BinaryOp::Pow, 10), Value::Int(1024));
        assert_eq!(eval(2, BinaryOp::Pow, -1), Value::Float(0.5));
        assert_eq!(eval(4.0, BinaryOp::Pow, 0.5), Value::Float(2.0));
    }

    #[test]
    fn sequence_concat_and_append() {
        let a = Value::slice(vec![Value::Int(1)], Type::INT);
        let b = Value::slice(vec![Value::Int(2)], Type::INT);
        let joined = eval(a.clone(), BinaryOp::Add, b);
        assert_eq!(joined.to_string(), "[1 2]");
        let appended = eval(a.clone(), BinaryOp::Add, 2.0);
        assert_eq!(appended.to_string(), "[1 2]");
        assert_eq!(a.to_string(), "[1]");
    }

    #[test]
    fn logical_fallbacks() {
        assert_eq!(eval(true, BinaryOp::And, 0), Value::Bool(false));
        assert_eq!(eval(0, BinaryOp::Or, "x"), Value::Bool(true));
        assert_eq!(evaluate_binary(Value::Nil, Value::Int(3), BinaryOp::Coalesce).unwrap(), Value::Int(3));
        assert_eq!(eval(1, BinaryOp::Coalesce, 3), Value::Int(1));
    }

    #[test]
    fn mismatched_operands_fail() {
        let err = evaluate_binary(Value::Bool(true), Value::Int(1), BinaryOp::Sub).unwrap_err();
        assert!(matches!(err.kind, EvalErrorKind::InvalidOperation { .. }));
        assert!(evaluate_binary(Value::Nil, Value::Int(1), BinaryOp::Add).is_err());
    }
}
