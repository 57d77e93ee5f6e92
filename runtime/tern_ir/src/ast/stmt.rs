//! Statement Types
//!
//! Statement node and its variants.

use std::fmt;

use super::expr::Expr;
use super::types::TypeExpr;
use crate::{Position, Positioned};

/// Statement node.
#[derive(Clone, Eq, PartialEq)]
pub struct Stmt {
    pub kind: StmtKind,
    pub pos: Position,
}

impl Stmt {
    pub fn new(kind: StmtKind, pos: Position) -> Self {
        Stmt { kind, pos }
    }
}

impl fmt::Debug for Stmt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} @ {:?}", self.kind, self.pos)
    }
}

impl Positioned for Stmt {
    fn position(&self) -> Position {
        self.pos
    }
}

/// One `case a, b:` arm of a `switch`.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct SwitchCase {
    pub pos: Position,
    pub values: Vec<Expr>,
    pub body: Vec<Stmt>,
}

/// One `case <op>:` arm of a `select`.
///
/// `op` is a `Send`, a `Receive`, or an expression statement wrapping `Recv`.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct SelectCase {
    pub pos: Position,
    pub op: Box<Stmt>,
    pub body: Vec<Stmt>,
}

/// Statement kinds.
#[derive(Clone, Eq, PartialEq, Debug)]
pub enum StmtKind {
    /// Sequence of statements evaluated in order.
    Block(Vec<Stmt>),
    /// Expression evaluated for its effect; its value is the block's value.
    Expr(Expr),
    /// `var a, b T = x, y`; immutable when `mutable` is false.
    Var {
        names: Vec<String>,
        ty: Option<TypeExpr>,
        values: Vec<Expr>,
        mutable: bool,
    },
    /// `a, b = x, y`.
    Assign { targets: Vec<Expr>, values: Vec<Expr> },
    /// `if cond {} else if c2 {} else {}`.
    ///
    /// Each entry in `else_ifs` is an `If` without its own else branches.
    If {
        cond: Expr,
        then: Vec<Stmt>,
        else_ifs: Vec<Stmt>,
        otherwise: Option<Vec<Stmt>>,
    },
    /// `try {} catch err {} finally {}`.
    Try {
        body: Vec<Stmt>,
        binding: Option<String>,
        catch: Vec<Stmt>,
        finally: Option<Vec<Stmt>>,
    },
    /// `for {}` or `for cond {}`.
    Loop { cond: Option<Expr>, body: Vec<Stmt> },
    /// `for k, v in iterable {}`.
    For {
        vars: Vec<String>,
        iterable: Expr,
        body: Vec<Stmt>,
    },
    /// `for init; cond; post {}`.
    CFor {
        init: Option<Box<Stmt>>,
        cond: Option<Expr>,
        post: Option<Expr>,
        body: Vec<Stmt>,
    },
    /// `switch value { case ...: default: }`.
    Switch {
        value: Expr,
        cases: Vec<SwitchCase>,
        default: Option<Vec<Stmt>>,
    },
    /// `select { case ...: default: }`.
    Select {
        cases: Vec<SelectCase>,
        default: Option<Vec<Stmt>>,
    },
    /// `throw value`.
    Throw(Expr),
    /// `return a, b`.
    Return(Vec<Expr>),
    Break,
    Continue,
    /// `module name { ... }`.
    Module { name: String, body: Vec<Stmt> },
    /// `go f(x)`: evaluate the call on a new task.
    Spawn(Expr),
    /// `defer f(x)`: run the call when the enclosing function exits.
    Defer(Expr),
    /// `chan <- value`.
    Send { chan: Expr, value: Expr },
    /// `value, ok = <-chan`; both targets optional.
    Receive {
        chan: Expr,
        value: Option<Expr>,
        ok: Option<Expr>,
    },
    /// `close(chan)`.
    Close(Expr),
}
