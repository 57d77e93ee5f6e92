//! Expression Types
//!
//! Expression node and its variants.

use std::fmt;
use std::sync::Arc;

use super::operators::{BinaryOp, UnaryOp};
use super::types::{FuncDecl, TypeExpr};
use crate::{Position, Positioned};

/// Literal values as written in source.
///
/// Numbers keep their source text; the evaluator decides between integer and
/// floating point when the literal is visited.
#[derive(Clone, Eq, PartialEq, Hash, Debug)]
pub enum Literal {
    Number(String),
    Str(String),
    Bool(bool),
    Nil,
}

/// Expression node.
#[derive(Clone, Eq, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub pos: Position,
}

impl Expr {
    pub fn new(kind: ExprKind, pos: Position) -> Self {
        Expr { kind, pos }
    }

    /// Whether this expression can appear on the left of an assignment.
    pub fn is_assignable(&self) -> bool {
        match &self.kind {
            ExprKind::Ident(_)
            | ExprKind::Member { .. }
            | ExprKind::Index { .. }
            | ExprKind::Slice { .. }
            | ExprKind::Deref(_) => true,
            ExprKind::Paren(inner) => inner.is_assignable(),
            _ => false,
        }
    }
}

impl fmt::Debug for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} @ {:?}", self.kind, self.pos)
    }
}

impl Positioned for Expr {
    fn position(&self) -> Position {
        self.pos
    }
}

/// Expression kinds.
#[derive(Clone, Eq, PartialEq, Debug)]
pub enum ExprKind {
    /// Number, string, bool or nil literal.
    Literal(Literal),
    /// Variable reference.
    Ident(String),
    /// Parenthesized expression.
    Paren(Box<Expr>),
    /// `-x`, `!x`, `^x`.
    Unary { op: UnaryOp, expr: Box<Expr> },
    /// `&x`.
    Addr(Box<Expr>),
    /// `*x`.
    Deref(Box<Expr>),
    /// `lhs op rhs`.
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    /// `cond ? then : otherwise`.
    Ternary {
        cond: Box<Expr>,
        then: Box<Expr>,
        otherwise: Box<Expr>,
    },
    /// `expr.name`.
    Member { expr: Box<Expr>, name: String },
    /// `expr[index]`.
    Index { expr: Box<Expr>, index: Box<Expr> },
    /// `expr[begin:end]`, either bound optional.
    Slice {
        expr: Box<Expr>,
        begin: Option<Box<Expr>>,
        end: Option<Box<Expr>>,
    },
    /// `[a, b, c]` or `[]T{a, b}`.
    Array { ty: Option<TypeExpr>, elems: Vec<Expr> },
    /// `{k: v}` or `map[K]V{k: v}`.
    Map {
        ty: Option<TypeExpr>,
        entries: Vec<(Expr, Expr)>,
    },
    /// `T{field: value}`; anonymous when `ty` is absent.
    Struct {
        ty: Option<TypeExpr>,
        fields: Vec<(String, Expr)>,
    },
    /// Function literal (named literals also bind themselves).
    Func(Arc<FuncDecl>),
    /// `name(args)`; `spread` marks `name(xs...)`.
    Call {
        name: String,
        args: Vec<Expr>,
        spread: bool,
    },
    /// `callee(args)` where the callee is any expression.
    AnonCall {
        callee: Box<Expr>,
        args: Vec<Expr>,
        spread: bool,
    },
    /// `target op= value`; `x++` is `x += 1`.
    OpAssign {
        target: Box<Expr>,
        op: BinaryOp,
        value: Box<Expr>,
    },
    /// `len(expr)`.
    Len(Box<Expr>),
    /// `item in list`.
    Include { item: Box<Expr>, list: Box<Expr> },
    /// `make(T)`, `make(T, len)`, `make(T, len, cap)`.
    Make {
        ty: TypeExpr,
        len: Option<Box<Expr>>,
        cap: Option<Box<Expr>>,
    },
    /// `<-chan`.
    Recv(Box<Expr>),
    /// `delete(target)` or `delete(target, key)`.
    Delete {
        target: Box<Expr>,
        key: Option<Box<Expr>>,
    },
}
