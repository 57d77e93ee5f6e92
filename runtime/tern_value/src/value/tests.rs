use std::sync::atomic::{AtomicUsize, Ordering};

use pretty_assertions::assert_eq;

use super::*;
use crate::errors::{EvalErrorKind, HostError};
use crate::types::{FuncType, StructType};

fn ints(items: &[i64]) -> Value {
    Value::slice(items.iter().copied().map(Value::Int).collect(), Type::INT)
}

fn point_type() -> Arc<StructType> {
    Arc::new(StructType::new(
        Some("Point".to_string()),
        vec![("x".to_string(), Type::INT), ("y".to_string(), Type::INT)],
    ))
}

// === Truthiness ===

#[test]
fn test_truthy() {
    assert!(!Value::Nil.truthy());
    assert!(!Value::Invalid.truthy());
    assert!(!Value::Int(0).truthy());
    assert!(Value::Int(-1).truthy());
    assert!(!Value::Float(0.0).truthy());
    assert!(!Value::string("").truthy());
    assert!(Value::string("x").truthy());
    assert!(!ints(&[]).truthy());
    assert!(ints(&[0]).truthy());
    assert!(!Value::map(Type::String, Type::INT).truthy());
    assert!(Value::Type(Type::INT).truthy());
}

// === Equality ===

#[test]
fn test_numeric_equality_crosses_int_and_float() {
    assert_eq!(Value::Int(2), Value::Float(2.0));
    assert_ne!(Value::Int(2), Value::Float(2.5));
    assert_ne!(Value::Int(1), Value::string("1"));
}

#[test]
fn test_nil_equality() {
    assert_eq!(Value::Nil, Value::Invalid);
    assert_ne!(Value::Nil, Value::Int(0));
}

#[test]
fn test_structural_equality() {
    assert_eq!(ints(&[1, 2, 3]), ints(&[1, 2, 3]));
    assert_ne!(ints(&[1, 2]), ints(&[1, 2, 3]));

    let a = MapValue::new(Type::String, Type::INT);
    a.insert(MapKey::Str("k".into()), Value::Int(1));
    let b = MapValue::new(Type::String, Type::INT);
    b.insert(MapKey::Str("k".into()), Value::Int(1));
    assert_eq!(Value::Map(a), Value::Map(b.clone()));
    b.insert(MapKey::Str("k".into()), Value::Int(2));
    assert_ne!(Value::Map(b), Value::map(Type::String, Type::INT));

    let p = StructValue::new(point_type(), vec![Value::Int(1), Value::Int(2)]);
    let q = StructValue::new(point_type(), vec![Value::Int(1), Value::Int(2)]);
    assert_eq!(Value::Struct(p), Value::Struct(q));
}

#[test]
fn test_pointer_equality_is_identity() {
    let a = Pointer::new(Value::Int(1));
    let b = Pointer::new(Value::Int(1));
    assert_eq!(Value::Ptr(a.clone()), Value::Ptr(a.clone()));
    assert_ne!(Value::Ptr(a), Value::Ptr(b));
}

// === Display ===

#[test]
fn test_display() {
    assert_eq!(Value::Nil.to_string(), "<nil>");
    assert_eq!(Value::Float(2.5).to_string(), "2.5");
    assert_eq!(Value::Float(f64::INFINITY).to_string(), "+Inf");
    assert_eq!(ints(&[1, 2, 3]).to_string(), "[1 2 3]");

    let m = MapValue::new(Type::String, Type::INT);
    m.insert(MapKey::Str("b".into()), Value::Int(2));
    m.insert(MapKey::Str("a".into()), Value::Int(1));
    assert_eq!(Value::Map(m).to_string(), "map[a:1 b:2]");

    let p = StructValue::new(point_type(), vec![Value::Int(1), Value::Int(2)]);
    assert_eq!(Value::Struct(p.clone()).to_string(), "{x:1 y:2}");
    assert_eq!(Value::Ptr(Pointer::new(Value::Struct(p))).to_string(), "&{x:1 y:2}");
}

#[test]
fn test_type_of() {
    assert_eq!(Value::Int(1).type_of(), Type::INT);
    assert_eq!(ints(&[1]).type_of(), Type::slice(Type::INT));
    assert_eq!(
        Value::array(vec![Value::Bool(true)], Type::Bool).type_of(),
        Type::array(1, Type::Bool)
    );
    assert_eq!(Value::Nil.type_name(), "nil");
    assert_eq!(
        Value::Ptr(Pointer::new(Value::string("s"))).type_name(),
        "*string"
    );
    assert_eq!(Value::array(vec![], Type::INT).kind_name(), "array");
}

// === Aggregates ===

#[test]
fn test_slice_copies_alias() {
    let a = ints(&[1, 2, 3]);
    let b = a.clone();
    let Value::Slice(s) = &a else { unreachable!() };
    assert!(s.set(0, Value::Int(9)));
    assert_eq!(b, ints(&[9, 2, 3]));
}

#[test]
fn test_slice_sub_is_a_copy() {
    let s = SliceValue::new(vec![Value::Int(1), Value::Int(2), Value::Int(3)], Type::INT);
    let part = s.sub(1, 3).unwrap();
    part.set(0, Value::Int(0));
    assert_eq!(s.get(1), Some(Value::Int(2)));
    assert!(s.sub(2, 5).is_none());
}

#[test]
fn test_splice_grows_and_shrinks() {
    let s = SliceValue::new(vec![Value::Int(1), Value::Int(2), Value::Int(3)], Type::INT);
    assert!(s.splice(1, 2, vec![Value::Int(7), Value::Int(8)]));
    assert_eq!(Value::Slice(s.clone()), ints(&[1, 7, 8, 3]));
    assert!(s.splice(0, 3, vec![]));
    assert_eq!(Value::Slice(s), ints(&[3]));
}

#[test]
fn test_arrays_do_not_grow() {
    let a = SliceValue::array(vec![Value::Int(0); 2], Type::INT);
    assert!(!a.push(Value::Int(1)));
    assert!(!a.splice(0, 1, vec![]));
    assert!(a.splice(0, 1, vec![Value::Int(5)]));
    assert_eq!(a.len(), 2);
}

#[test]
fn test_struct_copy_on_write() {
    let p = StructValue::new(point_type(), vec![Value::Int(1), Value::Int(2)]);
    let mut q = p.clone();
    *q.field_mut(0).unwrap() = Value::Int(10);
    assert_eq!(p.field("x"), Some(Value::Int(1)));
    assert_eq!(q.field("x"), Some(Value::Int(10)));
}

#[test]
fn test_map_keys_are_ordered() {
    let m = MapValue::new(Type::Any, Type::Any);
    m.insert(MapKey::Str("b".into()), Value::Nil);
    m.insert(MapKey::Int(3), Value::Nil);
    m.insert(MapKey::Int(-1), Value::Nil);
    m.insert(MapKey::Bool(true), Value::Nil);
    assert_eq!(
        m.keys(),
        vec![
            Value::Bool(true),
            Value::Int(-1),
            Value::Int(3),
            Value::string("b")
        ]
    );
    assert!(MapKey::from_value(&ints(&[])).is_none());
}

#[test]
fn test_deep_clone_detaches() {
    let a = ints(&[1, 2]);
    let b = a.deep_clone();
    let Value::Slice(s) = &a else { unreachable!() };
    s.set(0, Value::Int(5));
    assert_eq!(b, ints(&[1, 2]));
}

// === Pointers ===

#[test]
fn test_pointer_to_field_mutates_struct() {
    let cell = Pointer::new(Value::Struct(StructValue::zero(point_type())));
    let y = cell.field(1);
    y.store(Value::Int(4)).unwrap();
    assert_eq!(y.load().unwrap(), Value::Int(4));
    let Value::Struct(p) = cell.load().unwrap() else {
        unreachable!()
    };
    assert_eq!(p.field("y"), Some(Value::Int(4)));
}

#[test]
fn test_pointer_to_element() {
    let s = SliceValue::new(vec![Value::Int(1)], Type::INT);
    let p = Pointer::elem(s.clone(), 0);
    p.store(Value::Int(3)).unwrap();
    assert_eq!(s.get(0), Some(Value::Int(3)));
    assert_eq!(Pointer::elem(s, 4).load(), Err(DanglingPointer));
}

// === Channels ===

#[test]
fn test_channel_close_is_one_shot() {
    let ch = Channel::new(Type::INT, 2);
    ch.sender().unwrap().send(Value::Int(1)).unwrap();
    assert_eq!(ch.len(), 1);
    assert!(ch.close());
    assert!(!ch.close());
    assert!(ch.sender().is_none());
    assert_eq!(ch.receiver().recv().unwrap(), Value::Int(1));
    assert!(ch.receiver().recv().is_err());
}

// === Functions ===

fn add_fn() -> Function {
    Function::wrap("add", |a: i64, b: i64| a + b)
}

#[test]
fn test_wrap_derives_signature() {
    let f = add_fn();
    assert_eq!(f.ty().params, vec![Type::INT, Type::INT]);
    assert_eq!(f.ty().returns, Some(vec![Type::INT]));
    assert!(f.is_host());
    assert_eq!(f.call(vec![Value::Int(2), Value::Int(3)]).unwrap(), Value::Int(5));
}

#[test]
fn test_call_converts_arguments() {
    let f = add_fn();
    assert_eq!(
        f.call(vec![Value::Float(2.9), Value::Int(1)]).unwrap(),
        Value::Int(3)
    );
    let err = f.call(vec![Value::string("x"), Value::Int(1)]).unwrap_err();
    assert!(matches!(
        err.kind,
        EvalErrorKind::WrongArgumentType { index: 0, .. }
    ));
}

#[test]
fn test_fixed_arity_mismatch() {
    let err = add_fn().call(vec![Value::Int(1)]).unwrap_err();
    assert!(matches!(
        err.kind,
        EvalErrorKind::WrongArgumentCount {
            expected: 2,
            got: 1,
            variadic: false,
            ..
        }
    ));
}

fn count_fn() -> Function {
    Function::host(
        "count",
        FuncType::new(vec![Type::String, Type::slice(Type::INT)], true, None),
        |args| {
            let Value::Slice(rest) = &args[1] else {
                return Err(HostError::msg("tail is not a slice"));
            };
            Ok(Value::Int(i64::try_from(rest.len()).unwrap_or(-1)))
        },
    )
}

#[test]
fn test_variadic_collects_tail() {
    let f = count_fn();
    let three = vec![
        Value::string("p"),
        Value::Int(1),
        Value::Int(2),
        Value::Int(3),
    ];
    assert_eq!(f.call(three).unwrap(), Value::Int(3));
    assert_eq!(f.call(vec![Value::string("p")]).unwrap(), Value::Int(0));
    assert!(f.call(vec![]).is_err());
}

#[test]
fn test_spread_passes_slice_through() {
    let f = count_fn();
    let args = vec![Value::string("p"), ints(&[4, 5])];
    assert_eq!(f.call_with(args, true).unwrap(), Value::Int(2));
}

#[test]
fn test_spread_into_fixed_callee() {
    let args = vec![ints(&[4, 5])];
    assert_eq!(add_fn().call_with(args, true).unwrap(), Value::Int(9));
}

#[test]
fn test_host_error_becomes_host_failure() {
    let f = Function::host("fail", FuncType::new(vec![], false, None), |_| {
        Err(HostError::msg("disk full"))
    });
    let err = f.call(vec![]).unwrap_err();
    assert!(matches!(err.kind, EvalErrorKind::HostFailure { .. }));
    assert_eq!(err.message, "fail: disk full");
}

#[test]
fn test_host_panic_is_recovered() {
    let f = Function::host("boom", FuncType::new(vec![], false, None), |_| {
        panic!("exploded")
    });
    let err = f.call(vec![]).unwrap_err();
    assert!(matches!(
        err.kind,
        EvalErrorKind::HostPanic { ref message, .. } if message == "exploded"
    ));
}

#[test]
fn test_result_return() {
    let parse = Function::wrap("parse", |s: String| -> Result<i64, HostError> {
        s.parse::<i64>().map_err(|e| HostError::msg(e.to_string()))
    });
    assert_eq!(parse.call(vec![Value::string("42")]).unwrap(), Value::Int(42));
    assert!(parse.call(vec![Value::string("x")]).is_err());
}

#[test]
fn test_tuple_return_is_a_slice() {
    let divmod = Function::wrap("divmod", |a: i64, b: i64| (a / b, a % b));
    assert_eq!(divmod.ty().returns, Some(vec![Type::INT, Type::INT]));
    let out = divmod.call(vec![Value::Int(7), Value::Int(2)]).unwrap();
    assert_eq!(out, Value::slice(vec![Value::Int(3), Value::Int(1)], Type::Any));
}

#[test]
fn test_bound_method_gets_receiver() {
    let calls = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&calls);
    let method = Function::host(
        "scale",
        FuncType::new(vec![Type::Any, Type::INT], false, Some(vec![Type::INT])),
        move |args| {
            seen.fetch_add(1, Ordering::SeqCst);
            let (Value::Int(recv), Value::Int(by)) = (&args[0], &args[1]) else {
                return Err(HostError::msg("bad arguments"));
            };
            Ok(Value::Int(recv * by))
        },
    );
    let bound = method.bind(Value::Int(6));
    assert_eq!(bound.ty().params, vec![Type::INT]);
    assert_eq!(bound.id(), method.id());
    assert_eq!(bound.call(vec![Value::Int(7)]).unwrap(), Value::Int(42));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}
