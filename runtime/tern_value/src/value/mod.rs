//! Dynamic values.
//!
//! `Value` is the single runtime representation of every script datum.
//! Scalars are stored inline; aggregates share their storage through `Arc`
//! so that copies alias (slices, maps) or copy on write (structs).

mod aggregate;
mod channel;
mod function;
mod pointer;

use std::fmt;
use std::sync::Arc;

pub use aggregate::{FloatKey, MapKey, MapValue, SliceValue, StructValue};
pub use channel::Channel;
pub use function::{debug_escape, marshal_args, Function, HostFn, IntoHostFn, ScriptBody};
pub use pointer::{Cell, DanglingPointer, Pointer};

use crate::env::Environment;
use crate::types::Type;

/// A dynamically typed value.
#[derive(Clone, Default)]
pub enum Value {
    /// Absence of a value (a statement with no result, a missing entry).
    #[default]
    Invalid,
    /// Present but nil.
    Nil,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Arc<str>),
    Slice(SliceValue),
    Map(MapValue),
    Struct(StructValue),
    Ptr(Pointer),
    Func(Function),
    Chan(Channel),
    Env(Environment),
    Type(Type),
}

impl Value {
    pub fn string(s: impl Into<Arc<str>>) -> Value {
        Value::Str(s.into())
    }

    pub fn slice(items: Vec<Value>, elem: Type) -> Value {
        Value::Slice(SliceValue::new(items, elem))
    }

    pub fn array(items: Vec<Value>, elem: Type) -> Value {
        Value::Slice(SliceValue::array(items, elem))
    }

    /// Empty map.
    pub fn map(key: Type, value: Type) -> Value {
        Value::Map(MapValue::new(key, value))
    }

    /// `Invalid` or `Nil`.
    #[inline]
    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Invalid | Value::Nil)
    }

    #[inline]
    pub fn is_invalid(&self) -> bool {
        matches!(self, Value::Invalid)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    /// Numeric value widened to `f64`.
    #[allow(clippy::cast_precision_loss)]
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Int(n) => Some(*n as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_func(&self) -> Option<&Function> {
        match self {
            Value::Func(f) => Some(f),
            _ => None,
        }
    }

    #[inline]
    pub fn is_number(&self) -> bool {
        matches!(self, Value::Int(_) | Value::Float(_))
    }

    /// Condition semantics: `false`, nil, zero numbers and empty strings,
    /// slices and maps are false; everything else is true.
    pub fn truthy(&self) -> bool {
        match self {
            Value::Invalid | Value::Nil => false,
            Value::Bool(b) => *b,
            Value::Int(n) => *n != 0,
            Value::Float(f) => *f != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::Slice(s) => !s.is_empty(),
            Value::Map(m) => !m.is_empty(),
            Value::Struct(_)
            | Value::Ptr(_)
            | Value::Func(_)
            | Value::Chan(_)
            | Value::Env(_)
            | Value::Type(_) => true,
        }
    }

    /// Dynamic type. Nil has no type of its own and reports `any`.
    pub fn type_of(&self) -> Type {
        match self {
            Value::Invalid | Value::Nil => Type::Any,
            Value::Bool(_) => Type::Bool,
            Value::Int(_) => Type::INT,
            Value::Float(_) => Type::FLOAT,
            Value::Str(_) => Type::String,
            Value::Slice(s) => s.ty(),
            Value::Map(m) => m.ty(),
            Value::Struct(s) => s.ty(),
            Value::Ptr(p) => Type::ptr(p.load().map_or(Type::Any, |v| v.type_of())),
            Value::Func(f) => Type::Func(Arc::new(f.ty().clone())),
            Value::Chan(c) => c.ty(),
            Value::Env(_) => Type::Env,
            Value::Type(_) => Type::Type,
        }
    }

    /// Type as shown in diagnostics.
    pub fn type_name(&self) -> String {
        match self {
            Value::Invalid => "invalid".to_string(),
            Value::Nil => "nil".to_string(),
            other => other.type_of().to_string(),
        }
    }

    /// Category name, without element types.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Invalid => "invalid",
            Value::Nil => "nil",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "string",
            Value::Slice(s) if s.is_array() => "array",
            Value::Slice(_) => "slice",
            Value::Map(_) => "map",
            Value::Struct(_) => "struct",
            Value::Ptr(_) => "ptr",
            Value::Func(_) => "func",
            Value::Chan(_) => "chan",
            Value::Env(_) => "env",
            Value::Type(_) => "type",
        }
    }

    /// Deep copy of slices and maps; structs already copy on write.
    #[must_use]
    pub fn deep_clone(&self) -> Value {
        match self {
            Value::Slice(s) => {
                let items = s.read().iter().map(Value::deep_clone).collect();
                if s.is_array() {
                    Value::array(items, s.elem().clone())
                } else {
                    Value::slice(items, s.elem().clone())
                }
            }
            Value::Map(m) => {
                let entries = m
                    .entries()
                    .into_iter()
                    .map(|(k, v)| (k, v.deep_clone()))
                    .collect();
                Value::Map(MapValue::from_entries(
                    m.key_type().clone(),
                    m.value_type().clone(),
                    entries,
                ))
            }
            other => other.clone(),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (a, b) if a.is_nil() && b.is_nil() => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            #[allow(clippy::cast_precision_loss)]
            (Value::Int(a), Value::Float(b)) | (Value::Float(b), Value::Int(a)) => *a as f64 == *b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Slice(a), Value::Slice(b)) => {
                a.ptr_eq(b) || {
                    let (a, b) = (a.to_vec(), b.to_vec());
                    a == b
                }
            }
            (Value::Map(a), Value::Map(b)) => a.ptr_eq(b) || a.entries() == b.entries(),
            (Value::Struct(a), Value::Struct(b)) => {
                **a.struct_type() == **b.struct_type()
                    && a.iter().map(|(_, v)| v).eq(b.iter().map(|(_, v)| v))
            }
            (Value::Ptr(a), Value::Ptr(b)) => a.ptr_eq(b),
            (Value::Func(a), Value::Func(b)) => a.id() == b.id(),
            (Value::Chan(a), Value::Chan(b)) => a.ptr_eq(b),
            (Value::Env(a), Value::Env(b)) => a.ptr_eq(b),
            (Value::Type(a), Value::Type(b)) => a == b,
            _ => false,
        }
    }
}

fn write_float(f: &mut fmt::Formatter<'_>, v: f64) -> fmt::Result {
    if v.is_infinite() {
        f.write_str(if v > 0.0 { "+Inf" } else { "-Inf" })
    } else if v.is_nan() {
        f.write_str("NaN")
    } else {
        write!(f, "{v}")
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Invalid => f.write_str("<invalid>"),
            Value::Nil => f.write_str("<nil>"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(n) => write!(f, "{n}"),
            Value::Float(v) => write_float(f, *v),
            Value::Str(s) => f.write_str(s),
            Value::Slice(s) => {
                f.write_str("[")?;
                for (i, item) in s.read().iter().enumerate() {
                    if i > 0 {
                        f.write_str(" ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
            Value::Map(m) => {
                f.write_str("map[")?;
                for (i, (k, v)) in m.entries().iter().enumerate() {
                    if i > 0 {
                        f.write_str(" ")?;
                    }
                    write!(f, "{k}:{v}")?;
                }
                f.write_str("]")
            }
            Value::Struct(s) => {
                f.write_str("{")?;
                for (i, (name, v)) in s.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" ")?;
                    }
                    write!(f, "{name}:{v}")?;
                }
                f.write_str("}")
            }
            Value::Ptr(p) => match p.load() {
                Ok(v @ Value::Struct(_)) => write!(f, "&{v}"),
                Ok(_) => write!(f, "{p:?}"),
                Err(_) => f.write_str("<dangling>"),
            },
            Value::Func(func) => write!(f, "func {}", func.name()),
            Value::Chan(c) => write!(f, "{}", c.ty()),
            Value::Env(e) => match e.name() {
                Some(name) => write!(f, "env {name}"),
                None => f.write_str("env"),
            },
            Value::Type(t) => write!(f, "{t}"),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Invalid => f.write_str("Invalid"),
            Value::Nil => f.write_str("Nil"),
            Value::Bool(b) => f.debug_tuple("Bool").field(b).finish(),
            Value::Int(n) => f.debug_tuple("Int").field(n).finish(),
            Value::Float(v) => f.debug_tuple("Float").field(v).finish(),
            Value::Str(s) => f.debug_tuple("Str").field(s).finish(),
            Value::Slice(s) => f.debug_tuple("Slice").field(&*s.read()).finish(),
            Value::Map(m) => f.debug_map().entries(m.entries()).finish(),
            Value::Struct(s) => {
                let mut d = f.debug_struct(s.struct_type().name().unwrap_or("struct"));
                for (name, v) in s.iter() {
                    d.field(name, v);
                }
                d.finish()
            }
            Value::Ptr(p) => write!(f, "{p:?}"),
            Value::Func(func) => write!(f, "{func:?}"),
            Value::Chan(c) => write!(f, "{c:?}"),
            Value::Env(e) => write!(f, "{e:?}"),
            Value::Type(t) => f.debug_tuple("Type").field(t).finish(),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::string(s)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::string(s)
    }
}

impl From<Function> for Value {
    fn from(f: Function) -> Self {
        Value::Func(f)
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    reason = "tests use unwrap to panic on unexpected state"
)]
mod tests;
