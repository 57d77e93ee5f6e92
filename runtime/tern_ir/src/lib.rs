//! Tern IR - the program tree consumed by the Tern runtime.
//!
//! This crate contains the read-only data structures handed to the evaluator:
//! - `Position` for diagnostics (line/column, never semantic)
//! - Statement and expression nodes (`Stmt`, `Expr`) as closed sum types
//! - Function declarations and type expressions
//! - A small builder module for constructing trees without a parser
//!
//! # Design Philosophy
//!
//! - **Closed variants**: every node kind is an enum variant, so the evaluator
//!   and the bytecode codec each handle the full set in one exhaustive match.
//! - **Built once**: trees are produced by a parser or the bytecode decoder and
//!   never mutated during evaluation. Function bodies are shared through `Arc`
//!   so function values can outlive the tree that created them.

pub mod ast;
pub mod build;
mod position;

pub use ast::{
    BinaryOp, Expr, ExprKind, FuncDecl, Literal, Param, SelectCase, Stmt, StmtKind, SwitchCase,
    TypeExpr, UnaryOp,
};
pub use position::{Position, Positioned};
