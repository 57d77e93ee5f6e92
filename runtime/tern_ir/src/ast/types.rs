//! Type expressions and function declarations.

use std::fmt;

use super::stmt::Stmt;

/// A type as written in source, resolved against the environment at runtime.
#[derive(Clone, Eq, PartialEq, Hash, Debug)]
pub enum TypeExpr {
    /// `int`, `string`, `any`, a user-defined name, or a qualified `pkg.Type`.
    Named(String),
    /// `[]T`.
    Slice(Box<TypeExpr>),
    /// `[N]T`.
    Array(u32, Box<TypeExpr>),
    /// `map[K]V`.
    Map(Box<TypeExpr>, Box<TypeExpr>),
    /// `*T`.
    Ptr(Box<TypeExpr>),
    /// `chan T`.
    Chan(Box<TypeExpr>),
    /// `func(A, B...) (R1, R2)`.
    Func {
        params: Vec<TypeExpr>,
        variadic: bool,
        returns: Vec<TypeExpr>,
    },
    /// `struct { a T; b U }`.
    Struct(Vec<(String, TypeExpr)>),
}

impl TypeExpr {
    /// Shorthand for a named type.
    pub fn named(name: impl Into<String>) -> Self {
        TypeExpr::Named(name.into())
    }
}

impl fmt::Display for TypeExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeExpr::Named(name) => f.write_str(name),
            TypeExpr::Slice(elem) => write!(f, "[]{elem}"),
            TypeExpr::Array(len, elem) => write!(f, "[{len}]{elem}"),
            TypeExpr::Map(key, value) => write!(f, "map[{key}]{value}"),
            TypeExpr::Ptr(elem) => write!(f, "*{elem}"),
            TypeExpr::Chan(elem) => write!(f, "chan {elem}"),
            TypeExpr::Func {
                params,
                variadic,
                returns,
            } => {
                f.write_str("func(")?;
                for (i, param) in params.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    if *variadic && i + 1 == params.len() {
                        f.write_str("...")?;
                    }
                    write!(f, "{param}")?;
                }
                f.write_str(")")?;
                match returns.as_slice() {
                    [] => Ok(()),
                    [single] => write!(f, " {single}"),
                    many => {
                        f.write_str(" (")?;
                        for (i, ret) in many.iter().enumerate() {
                            if i > 0 {
                                f.write_str(", ")?;
                            }
                            write!(f, "{ret}")?;
                        }
                        f.write_str(")")
                    }
                }
            }
            TypeExpr::Struct(fields) => {
                f.write_str("struct {")?;
                for (i, (name, ty)) in fields.iter().enumerate() {
                    if i > 0 {
                        f.write_str(";")?;
                    }
                    write!(f, " {name} {ty}")?;
                }
                f.write_str(" }")
            }
        }
    }
}

/// A function parameter.
#[derive(Clone, Eq, PartialEq, Hash, Debug)]
pub struct Param {
    pub name: String,
    /// Declared type; untyped parameters accept any value.
    pub ty: Option<TypeExpr>,
    /// Whether the body may reassign the parameter.
    pub mutable: bool,
}

impl Param {
    /// An untyped, mutable parameter.
    pub fn untyped(name: impl Into<String>) -> Self {
        Param {
            name: name.into(),
            ty: None,
            mutable: true,
        }
    }

    /// A typed, mutable parameter.
    pub fn typed(name: impl Into<String>, ty: TypeExpr) -> Self {
        Param {
            name: name.into(),
            ty: Some(ty),
            mutable: true,
        }
    }
}

/// A function literal.
///
/// When `variadic` is set, the last parameter collects the remaining
/// arguments as a slice. `returns` is `None` when no return types were
/// declared; in that case any returned value is accepted unchecked.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct FuncDecl {
    pub name: Option<String>,
    pub params: Vec<Param>,
    pub variadic: bool,
    pub returns: Option<Vec<TypeExpr>>,
    pub body: Vec<Stmt>,
}

impl FuncDecl {
    /// Name used in diagnostics.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("<anonymous>")
    }
}
