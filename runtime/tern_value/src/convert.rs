//! Value-to-type conversion and typed host marshalling.
//!
//! [`convert`] is the one place that decides whether a value may flow into a
//! typed slot: a typed binding, a function parameter, a map or slice element.
//! The [`FromValue`]/[`IntoValue`] traits build on it to move data between
//! script values and native Rust types.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::env::Environment;
use crate::errors::{ConvertError, HostError};
use crate::types::{FloatKind, StructType, Type};
use crate::value::{Channel, Function, MapKey, MapValue, SliceValue, StructValue, Value};

/// Convert `value` so it can be stored in a slot of type `ty`.
///
/// Aggregates that already have the target type are returned unchanged (and
/// keep aliasing their source); otherwise a converted copy is built.
pub fn convert(value: Value, ty: &Type) -> Result<Value, ConvertError> {
    let fail = |v: &Value| ConvertError::new(v.type_name(), ty.to_string());

    if ty.is_any() {
        return Ok(value);
    }
    if value.is_nil() {
        return if ty.is_nillable() {
            Ok(ty.zero())
        } else {
            Err(fail(&value))
        };
    }

    match (ty, value) {
        (Type::Bool, v @ Value::Bool(_)) => Ok(v),
        (Type::Int(kind), Value::Int(n)) => Ok(Value::Int(kind.wrap(n))),
        #[allow(clippy::cast_possible_truncation)]
        (Type::Int(kind), Value::Float(f)) => Ok(Value::Int(kind.wrap(f as i64))),
        #[allow(clippy::cast_precision_loss)]
        (Type::Float(kind), Value::Int(n)) => Ok(Value::Float(round_float(*kind, n as f64))),
        (Type::Float(kind), Value::Float(f)) => Ok(Value::Float(round_float(*kind, f))),
        (Type::String, v @ Value::Str(_)) => Ok(v),

        (Type::Slice(elem), Value::Slice(s)) => {
            if !s.is_array() && s.elem() == &**elem {
                return Ok(Value::Slice(s));
            }
            let items = convert_items(&s, elem)?;
            Ok(Value::slice(items, Type::clone(elem)))
        }
        (Type::Array(len, elem), Value::Slice(s)) => {
            if s.is_array() && s.len() == *len && s.elem() == &**elem {
                return Ok(Value::Slice(s));
            }
            if s.len() > *len {
                return Err(ConvertError::new(s.ty().to_string(), ty.to_string())
                    .with_detail(format!("{} elements do not fit", s.len())));
            }
            let mut items = convert_items(&s, elem)?;
            items.resize_with(*len, || elem.zero());
            Ok(Value::array(items, Type::clone(elem)))
        }

        (Type::Map(key, val), Value::Map(m)) => {
            if m.key_type() == &**key && m.value_type() == &**val {
                return Ok(Value::Map(m));
            }
            let mut entries = BTreeMap::new();
            for (k, v) in m.entries() {
                let k = convert(k.to_value(), key)?;
                let k = MapKey::from_value(&k)
                    .ok_or_else(|| ConvertError::new(k.type_name(), key.to_string()))?;
                entries.insert(k, convert(v, val)?);
            }
            Ok(Value::Map(MapValue::from_entries(
                Type::clone(key),
                Type::clone(val),
                entries,
            )))
        }

        (Type::Struct(st), Value::Struct(sv)) => {
            if Arc::ptr_eq(st, sv.struct_type()) {
                return Ok(Value::Struct(sv));
            }
            if **st == **sv.struct_type() || sv.struct_type().name().is_none() {
                let fields: Vec<(String, Value)> = sv
                    .iter()
                    .map(|(n, v)| (n.to_string(), v.clone()))
                    .collect();
                return build_struct(st, fields, &sv.ty());
            }
            Err(ConvertError::new(sv.ty().to_string(), ty.to_string()))
        }
        (Type::Struct(st), Value::Map(m)) if matches!(m.key_type(), Type::String | Type::Any) => {
            let mut fields = Vec::with_capacity(m.len());
            for (k, v) in m.entries() {
                match k {
                    MapKey::Str(name) => fields.push((name.to_string(), v)),
                    other => {
                        return Err(ConvertError::new(m.ty().to_string(), ty.to_string())
                            .with_detail(format!("key {other} is not a field name")))
                    }
                }
            }
            build_struct(st, fields, &m.ty())
        }

        (Type::Func(ft), Value::Func(f)) => {
            let have = f.ty();
            if !ft.variadic && !have.variadic && ft.params.len() != have.params.len() {
                return Err(fail(&Value::Func(f)).with_detail("parameter count differs"));
            }
            Ok(Value::Func(f))
        }

        (Type::Ptr(_), v @ Value::Ptr(_))
        | (Type::Chan(_), v @ Value::Chan(_))
        | (Type::Env, v @ Value::Env(_))
        | (Type::Type, v @ Value::Type(_)) => Ok(v),

        (_, v) => Err(fail(&v)),
    }
}

#[allow(clippy::cast_possible_truncation)]
fn round_float(kind: FloatKind, v: f64) -> f64 {
    match kind {
        FloatKind::F32 => f64::from(v as f32),
        FloatKind::F64 => v,
    }
}

fn convert_items(s: &SliceValue, elem: &Type) -> Result<Vec<Value>, ConvertError> {
    s.to_vec().into_iter().map(|v| convert(v, elem)).collect()
}

/// Struct of type `st` from named field values; missing fields get zeros.
fn build_struct(
    st: &Arc<StructType>,
    fields: Vec<(String, Value)>,
    from: &Type,
) -> Result<Value, ConvertError> {
    let mut values: Vec<Value> = st.fields().iter().map(|(_, t)| t.zero()).collect();
    for (name, v) in fields {
        let Some(index) = st.field_index(&name) else {
            return Err(ConvertError::new(from.to_string(), st.to_string())
                .with_detail(format!("unknown field '{name}'")));
        };
        let field_ty = st.field_type(index).unwrap_or(&Type::Any);
        values[index] = convert(v, field_ty)?;
    }
    Ok(Value::Struct(StructValue::new(Arc::clone(st), values)))
}

/// Native types a script value can be read as.
pub trait FromValue: Sized {
    /// Script type a parameter of this native type declares.
    fn ty() -> Type;
    fn from_value(value: Value) -> Result<Self, ConvertError>;
}

/// Native types that become script values.
pub trait IntoValue {
    fn ty() -> Type;
    fn into_value(self) -> Value;
}

/// Result shapes a typed host function may return.
///
/// Multiple results are returned to the script as a slice.
pub trait HostReturn {
    fn returns() -> Vec<Type>;
    fn into_return(self) -> Result<Value, HostError>;
}

impl<T: IntoValue> HostReturn for T {
    fn returns() -> Vec<Type> {
        vec![T::ty()]
    }

    fn into_return(self) -> Result<Value, HostError> {
        Ok(self.into_value())
    }
}

impl HostReturn for () {
    fn returns() -> Vec<Type> {
        Vec::new()
    }

    fn into_return(self) -> Result<Value, HostError> {
        Ok(Value::Invalid)
    }
}

impl<A: IntoValue, B: IntoValue> HostReturn for (A, B) {
    fn returns() -> Vec<Type> {
        vec![A::ty(), B::ty()]
    }

    fn into_return(self) -> Result<Value, HostError> {
        Ok(Value::slice(
            vec![self.0.into_value(), self.1.into_value()],
            Type::Any,
        ))
    }
}

impl<A: IntoValue, B: IntoValue, C: IntoValue> HostReturn for (A, B, C) {
    fn returns() -> Vec<Type> {
        vec![A::ty(), B::ty(), C::ty()]
    }

    fn into_return(self) -> Result<Value, HostError> {
        Ok(Value::slice(
            vec![self.0.into_value(), self.1.into_value(), self.2.into_value()],
            Type::Any,
        ))
    }
}

impl<T: HostReturn, E: Into<HostError>> HostReturn for Result<T, E> {
    fn returns() -> Vec<Type> {
        T::returns()
    }

    fn into_return(self) -> Result<Value, HostError> {
        self.map_err(Into::into)?.into_return()
    }
}

fn mismatch(value: &Value, to: &Type) -> ConvertError {
    ConvertError::new(value.type_name(), to.to_string())
}

macro_rules! scalar_conversions {
    ($($native:ty => $ty:expr, $variant:ident, |$v:ident| $from:expr, |$n:ident| $into:expr;)*) => {
        $(
            impl FromValue for $native {
                fn ty() -> Type {
                    $ty
                }

                fn from_value(value: Value) -> Result<Self, ConvertError> {
                    let ty = <Self as FromValue>::ty();
                    match convert(value, &ty)? {
                        Value::$variant($v) => $from,
                        other => Err(mismatch(&other, &ty)),
                    }
                }
            }

            impl IntoValue for $native {
                fn ty() -> Type {
                    $ty
                }

                fn into_value(self) -> Value {
                    let $n = self;
                    $into
                }
            }
        )*
    };
}

scalar_conversions! {
    bool => Type::Bool, Bool, |v| Ok(v), |n| Value::Bool(n);
    i64 => Type::INT, Int, |v| Ok(v), |n| Value::Int(n);
    i32 => Type::Int(crate::types::IntKind::I32), Int,
        |v| i32::try_from(v).map_err(|_| ConvertError::new("int", "int32").with_detail("out of range")),
        |n| Value::Int(i64::from(n));
    usize => Type::INT, Int,
        |v| usize::try_from(v).map_err(|_| ConvertError::new("int", "usize").with_detail("negative")),
        |n| Value::Int(i64::try_from(n).unwrap_or(i64::MAX));
    f64 => Type::FLOAT, Float, |v| Ok(v), |n| Value::Float(n);
    String => Type::String, Str, |v| Ok(v.to_string()), |n| Value::string(n);
}

impl IntoValue for &str {
    fn ty() -> Type {
        Type::String
    }

    fn into_value(self) -> Value {
        Value::string(self)
    }
}

impl FromValue for Value {
    fn ty() -> Type {
        Type::Any
    }

    fn from_value(value: Value) -> Result<Self, ConvertError> {
        Ok(value)
    }
}

impl IntoValue for Value {
    fn ty() -> Type {
        Type::Any
    }

    fn into_value(self) -> Value {
        self
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn ty() -> Type {
        T::ty()
    }

    fn from_value(value: Value) -> Result<Self, ConvertError> {
        if value.is_nil() {
            return Ok(None);
        }
        T::from_value(value).map(Some)
    }
}

impl<T: IntoValue> IntoValue for Option<T> {
    fn ty() -> Type {
        T::ty()
    }

    fn into_value(self) -> Value {
        self.map_or(Value::Nil, IntoValue::into_value)
    }
}

impl<T: FromValue> FromValue for Vec<T> {
    fn ty() -> Type {
        Type::slice(T::ty())
    }

    fn from_value(value: Value) -> Result<Self, ConvertError> {
        match value {
            Value::Slice(s) => s.to_vec().into_iter().map(T::from_value).collect(),
            other => Err(mismatch(&other, &<Self as FromValue>::ty())),
        }
    }
}

impl<T: IntoValue> IntoValue for Vec<T> {
    fn ty() -> Type {
        Type::slice(T::ty())
    }

    fn into_value(self) -> Value {
        Value::slice(
            self.into_iter().map(IntoValue::into_value).collect(),
            T::ty(),
        )
    }
}

macro_rules! handle_conversions {
    ($($native:ty => $ty:expr, $variant:ident;)*) => {
        $(
            impl FromValue for $native {
                fn ty() -> Type {
                    $ty
                }

                fn from_value(value: Value) -> Result<Self, ConvertError> {
                    match value {
                        Value::$variant(inner) => Ok(inner),
                        other => Err(mismatch(&other, &<Self as FromValue>::ty())),
                    }
                }
            }

            impl IntoValue for $native {
                fn ty() -> Type {
                    $ty
                }

                fn into_value(self) -> Value {
                    Value::$variant(self)
                }
            }
        )*
    };
}

handle_conversions! {
    Function => Type::func(vec![Type::slice(Type::Any)], true, None), Func;
    Environment => Type::Env, Env;
    SliceValue => Type::slice(Type::Any), Slice;
    MapValue => Type::map(Type::Any, Type::Any), Map;
    Channel => Type::chan(Type::Any), Chan;
    Type => Type::Type, Type;
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    reason = "tests use unwrap to panic on unexpected state"
)]
