//! Runtime type descriptors.
//!
//! A `Type` is what a declared type expression resolves to. Types drive
//! conversions on typed bindings and parameters, the zero value of `var x T`
//! and `make(T)`, and the zero results a host function produces in validation
//! mode.

use std::fmt;
use std::sync::Arc;

use crate::value::{Function, StructValue, Value};

/// Width and signedness of an integer type. Values are always stored as
/// `i64`; the kind decides how a conversion wraps.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum IntKind {
    Int,
    I8,
    I16,
    I32,
    I64,
    Uint,
    U8,
    U16,
    U32,
    U64,
}

impl IntKind {
    pub const fn name(self) -> &'static str {
        match self {
            IntKind::Int => "int",
            IntKind::I8 => "int8",
            IntKind::I16 => "int16",
            IntKind::I32 => "int32",
            IntKind::I64 => "int64",
            IntKind::Uint => "uint",
            IntKind::U8 => "uint8",
            IntKind::U16 => "uint16",
            IntKind::U32 => "uint32",
            IntKind::U64 => "uint64",
        }
    }

    /// Truncate `v` to this width, two's complement.
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_lossless,
        clippy::cast_possible_wrap
    )]
    pub const fn wrap(self, v: i64) -> i64 {
        match self {
            IntKind::Int | IntKind::I64 | IntKind::Uint | IntKind::U64 => v,
            IntKind::I8 => v as i8 as i64,
            IntKind::I16 => v as i16 as i64,
            IntKind::I32 => v as i32 as i64,
            IntKind::U8 => v as u8 as i64,
            IntKind::U16 => v as u16 as i64,
            IntKind::U32 => v as u32 as i64,
        }
    }
}

#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum FloatKind {
    F32,
    F64,
}

impl FloatKind {
    pub const fn name(self) -> &'static str {
        match self {
            FloatKind::F32 => "float32",
            FloatKind::F64 => "float64",
        }
    }
}

/// A struct type: ordered fields plus host-supplied methods.
///
/// Methods take the receiver as their first argument. A method with
/// `pointer_receiver` set receives a pointer to the struct instead of a
/// copy, so it can mutate the caller's value.
pub struct StructType {
    name: Option<String>,
    fields: Vec<(String, Type)>,
    methods: Vec<Method>,
}

#[derive(Clone)]
pub struct Method {
    pub name: String,
    pub func: Function,
    pub pointer_receiver: bool,
}

impl StructType {
    pub fn new(name: Option<String>, fields: Vec<(String, Type)>) -> Self {
        StructType {
            name,
            fields,
            methods: Vec::new(),
        }
    }

    /// Attach a method; the function's first parameter is the receiver.
    #[must_use]
    pub fn with_method(
        mut self,
        name: impl Into<String>,
        func: Function,
        pointer_receiver: bool,
    ) -> Self {
        self.methods.push(Method {
            name: name.into(),
            func,
            pointer_receiver,
        });
        self
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn fields(&self) -> &[(String, Type)] {
        &self.fields
    }

    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|(n, _)| n == name)
    }

    pub fn field_type(&self, index: usize) -> Option<&Type> {
        self.fields.get(index).map(|(_, t)| t)
    }

    pub fn method(&self, name: &str) -> Option<&Method> {
        self.methods.iter().find(|m| m.name == name)
    }
}

impl PartialEq for StructType {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.fields == other.fields
    }
}

impl fmt::Display for StructType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(name) = &self.name {
            return f.write_str(name);
        }
        f.write_str("struct {")?;
        for (i, (name, ty)) in self.fields.iter().enumerate() {
            if i > 0 {
                f.write_str(";")?;
            }
            write!(f, " {name} {ty}")?;
        }
        f.write_str(" }")
    }
}

impl fmt::Debug for StructType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

static ANY: Type = Type::Any;

/// Shape of a callable.
///
/// For a variadic function the last entry of `params` is the slice type that
/// collects the trailing arguments. `returns` is `None` when the function did
/// not declare its results.
#[derive(Clone, PartialEq, Debug)]
pub struct FuncType {
    pub params: Vec<Type>,
    pub variadic: bool,
    pub returns: Option<Vec<Type>>,
}

impl FuncType {
    pub fn new(params: Vec<Type>, variadic: bool, returns: Option<Vec<Type>>) -> Self {
        FuncType {
            params,
            variadic,
            returns,
        }
    }

    /// Element type of the variadic tail.
    pub fn variadic_elem(&self) -> Option<&Type> {
        if !self.variadic {
            return None;
        }
        match self.params.last() {
            Some(Type::Slice(elem)) => Some(elem),
            Some(_) => Some(&ANY),
            None => None,
        }
    }

    /// The shape seen through a bound receiver.
    #[must_use]
    pub fn without_receiver(&self) -> FuncType {
        FuncType {
            params: self.params.iter().skip(1).cloned().collect(),
            variadic: self.variadic && self.params.len() > 1,
            returns: self.returns.clone(),
        }
    }
}

/// Runtime type descriptor.
#[derive(Clone, PartialEq, Debug)]
pub enum Type {
    Any,
    Bool,
    Int(IntKind),
    Float(FloatKind),
    String,
    Slice(Arc<Type>),
    Array(usize, Arc<Type>),
    Map(Arc<Type>, Arc<Type>),
    Struct(Arc<StructType>),
    Ptr(Arc<Type>),
    Func(Arc<FuncType>),
    Chan(Arc<Type>),
    Env,
    Type,
}

impl Type {
    pub const INT: Type = Type::Int(IntKind::Int);
    pub const FLOAT: Type = Type::Float(FloatKind::F64);

    pub fn slice(elem: Type) -> Type {
        Type::Slice(Arc::new(elem))
    }

    pub fn array(len: usize, elem: Type) -> Type {
        Type::Array(len, Arc::new(elem))
    }

    pub fn map(key: Type, value: Type) -> Type {
        Type::Map(Arc::new(key), Arc::new(value))
    }

    pub fn ptr(elem: Type) -> Type {
        Type::Ptr(Arc::new(elem))
    }

    pub fn chan(elem: Type) -> Type {
        Type::Chan(Arc::new(elem))
    }

    pub fn func(params: Vec<Type>, variadic: bool, returns: Option<Vec<Type>>) -> Type {
        Type::Func(Arc::new(FuncType::new(params, variadic, returns)))
    }

    pub fn structure(ty: StructType) -> Type {
        Type::Struct(Arc::new(ty))
    }

    /// Value of a fresh, uninitialized binding of this type.
    ///
    /// Maps, pointers, functions, channels, scopes and types start out nil;
    /// slices start empty; arrays are filled with element zeros.
    pub fn zero(&self) -> Value {
        match self {
            Type::Any
            | Type::Map(..)
            | Type::Ptr(_)
            | Type::Func(_)
            | Type::Chan(_)
            | Type::Env
            | Type::Type => Value::Nil,
            Type::Bool => Value::Bool(false),
            Type::Int(_) => Value::Int(0),
            Type::Float(_) => Value::Float(0.0),
            Type::String => Value::string(""),
            Type::Slice(elem) => Value::slice(Vec::new(), Type::clone(elem)),
            Type::Array(len, elem) => {
                let items = (0..*len).map(|_| elem.zero()).collect();
                Value::array(items, Type::clone(elem))
            }
            Type::Struct(st) => Value::Struct(StructValue::zero(Arc::clone(st))),
        }
    }

    pub fn is_any(&self) -> bool {
        matches!(self, Type::Any)
    }

    /// Whether nil converts to this type.
    pub fn is_nillable(&self) -> bool {
        matches!(
            self,
            Type::Any
                | Type::Map(..)
                | Type::Ptr(_)
                | Type::Func(_)
                | Type::Chan(_)
                | Type::Slice(_)
                | Type::Env
                | Type::Type
        )
    }

    /// Short category name used in diagnostics.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Type::Any => "any",
            Type::Bool => "bool",
            Type::Int(k) => k.name(),
            Type::Float(k) => k.name(),
            Type::String => "string",
            Type::Slice(_) => "slice",
            Type::Array(..) => "array",
            Type::Map(..) => "map",
            Type::Struct(_) => "struct",
            Type::Ptr(_) => "ptr",
            Type::Func(_) => "func",
            Type::Chan(_) => "chan",
            Type::Env => "env",
            Type::Type => "type",
        }
    }

    /// Resolve a built-in type name.
    pub fn builtin(name: &str) -> Option<Type> {
        Some(match name {
            "bool" => Type::Bool,
            "int" => Type::INT,
            "int8" => Type::Int(IntKind::I8),
            "int16" => Type::Int(IntKind::I16),
            "int32" | "rune" => Type::Int(IntKind::I32),
            "int64" => Type::Int(IntKind::I64),
            "uint" => Type::Int(IntKind::Uint),
            "uint8" | "byte" => Type::Int(IntKind::U8),
            "uint16" => Type::Int(IntKind::U16),
            "uint32" => Type::Int(IntKind::U32),
            "uint64" => Type::Int(IntKind::U64),
            "float32" => Type::Float(FloatKind::F32),
            "float64" | "float" => Type::FLOAT,
            "string" => Type::String,
            "any" | "interface" | "error" => Type::Any,
            _ => return None,
        })
    }

    /// Names the global scope starts with.
    pub const BUILTIN_NAMES: [&'static str; 20] = [
        "bool", "int", "int8", "int16", "int32", "int64", "uint", "uint8", "uint16", "uint32",
        "uint64", "byte", "rune", "float32", "float64", "float", "string", "any", "interface",
        "error",
    ];
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Any => f.write_str("any"),
            Type::Bool => f.write_str("bool"),
            Type::Int(k) => f.write_str(k.name()),
            Type::Float(k) => f.write_str(k.name()),
            Type::String => f.write_str("string"),
            Type::Slice(elem) => write!(f, "[]{elem}"),
            Type::Array(len, elem) => write!(f, "[{len}]{elem}"),
            Type::Map(k, v) => write!(f, "map[{k}]{v}"),
            Type::Ptr(elem) => write!(f, "*{elem}"),
            Type::Chan(elem) => write!(f, "chan {elem}"),
            Type::Env => f.write_str("env"),
            Type::Type => f.write_str("type"),
            Type::Struct(st) => fmt::Display::fmt(&**st, f),
            Type::Func(ft) => {
                f.write_str("func(")?;
                for (i, p) in ft.params.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    match p {
                        Type::Slice(elem) if ft.variadic && i + 1 == ft.params.len() => {
                            write!(f, "...{elem}")?;
                        }
                        _ => write!(f, "{p}")?,
                    }
                }
                f.write_str(")")?;
                match ft.returns.as_deref() {
                    None | Some([]) => Ok(()),
                    Some([single]) => write!(f, " {single}"),
                    Some(many) => {
                        f.write_str(" (")?;
                        for (i, r) in many.iter().enumerate() {
                            if i > 0 {
                                f.write_str(", ")?;
                            }
                            write!(f, "{r}")?;
                        }
                        f.write_str(")")
                    }
                }
            }
        }
    }
}
