//! Program tree nodes.
//!
//! Statements and expressions are `{ kind, pos }` pairs whose `kind` is a
//! closed enum. Child nodes are owned (`Box`/`Vec`); function literals hold
//! their declaration behind an `Arc` so the evaluator can capture it in a
//! function value without cloning the body.

mod expr;
mod operators;
mod stmt;
mod types;

pub use expr::{Expr, ExprKind, Literal};
pub use operators::{BinaryOp, UnaryOp};
pub use stmt::{SelectCase, Stmt, StmtKind, SwitchCase};
pub use types::{FuncDecl, Param, TypeExpr};
