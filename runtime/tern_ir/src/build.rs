//! Tree builders.
//!
//! Hosts that embed the runtime without a parser, and the test suites, build
//! programs with these helpers. Every node starts at `Position::NONE`; use
//! `Expr::at` / `Stmt::at` to attach a position.
//!
//! ```text
//! use tern_ir::build::*;
//! let program = program(vec![
//!     assign1("a", int(1)),
//!     return1(add(ident("a"), float(1.5))),
//! ]);
//! ```

use std::sync::Arc;

use crate::{
    BinaryOp, Expr, ExprKind, FuncDecl, Literal, Param, Position, SelectCase, Stmt, StmtKind,
    SwitchCase, TypeExpr, UnaryOp,
};

impl Expr {
    /// Attach a position.
    #[must_use]
    pub fn at(mut self, line: i32, column: i32) -> Self {
        self.pos = Position::new(line, column);
        self
    }
}

impl Stmt {
    /// Attach a position.
    #[must_use]
    pub fn at(mut self, line: i32, column: i32) -> Self {
        self.pos = Position::new(line, column);
        self
    }
}

#[inline]
fn expr(kind: ExprKind) -> Expr {
    Expr::new(kind, Position::NONE)
}

#[inline]
fn stmt(kind: StmtKind) -> Stmt {
    Stmt::new(kind, Position::NONE)
}

#[inline]
fn boxed(e: Expr) -> Box<Expr> {
    Box::new(e)
}

// Literals

pub fn int(value: i64) -> Expr {
    expr(ExprKind::Literal(Literal::Number(value.to_string())))
}

/// Float literal; the text always contains a `.` or an exponent.
pub fn float(value: f64) -> Expr {
    expr(ExprKind::Literal(Literal::Number(format!("{value:?}"))))
}

/// Number literal from its source text (`"0x1F"`, `"1e3"`, `"42"`).
pub fn number(text: &str) -> Expr {
    expr(ExprKind::Literal(Literal::Number(text.to_string())))
}

pub fn string(value: &str) -> Expr {
    expr(ExprKind::Literal(Literal::Str(value.to_string())))
}

pub fn boolean(value: bool) -> Expr {
    expr(ExprKind::Literal(Literal::Bool(value)))
}

pub fn nil() -> Expr {
    expr(ExprKind::Literal(Literal::Nil))
}

// Names and operators

pub fn ident(name: &str) -> Expr {
    expr(ExprKind::Ident(name.to_string()))
}

pub fn paren(inner: Expr) -> Expr {
    expr(ExprKind::Paren(boxed(inner)))
}

pub fn unary(op: UnaryOp, operand: Expr) -> Expr {
    expr(ExprKind::Unary {
        op,
        expr: boxed(operand),
    })
}

pub fn addr(operand: Expr) -> Expr {
    expr(ExprKind::Addr(boxed(operand)))
}

pub fn deref(operand: Expr) -> Expr {
    expr(ExprKind::Deref(boxed(operand)))
}

pub fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Expr {
    expr(ExprKind::Binary {
        op,
        lhs: boxed(lhs),
        rhs: boxed(rhs),
    })
}

pub fn add(lhs: Expr, rhs: Expr) -> Expr {
    binary(BinaryOp::Add, lhs, rhs)
}

pub fn sub(lhs: Expr, rhs: Expr) -> Expr {
    binary(BinaryOp::Sub, lhs, rhs)
}

pub fn mul(lhs: Expr, rhs: Expr) -> Expr {
    binary(BinaryOp::Mul, lhs, rhs)
}

pub fn div(lhs: Expr, rhs: Expr) -> Expr {
    binary(BinaryOp::Div, lhs, rhs)
}

pub fn rem(lhs: Expr, rhs: Expr) -> Expr {
    binary(BinaryOp::Mod, lhs, rhs)
}

pub fn eq(lhs: Expr, rhs: Expr) -> Expr {
    binary(BinaryOp::Eq, lhs, rhs)
}

pub fn lt(lhs: Expr, rhs: Expr) -> Expr {
    binary(BinaryOp::Lt, lhs, rhs)
}

pub fn ternary(cond: Expr, then: Expr, otherwise: Expr) -> Expr {
    expr(ExprKind::Ternary {
        cond: boxed(cond),
        then: boxed(then),
        otherwise: boxed(otherwise),
    })
}

// Access

pub fn member(target: Expr, name: &str) -> Expr {
    expr(ExprKind::Member {
        expr: boxed(target),
        name: name.to_string(),
    })
}

pub fn index(target: Expr, at: Expr) -> Expr {
    expr(ExprKind::Index {
        expr: boxed(target),
        index: boxed(at),
    })
}

pub fn slice(target: Expr, begin: Option<Expr>, end: Option<Expr>) -> Expr {
    expr(ExprKind::Slice {
        expr: boxed(target),
        begin: begin.map(boxed),
        end: end.map(boxed),
    })
}

// Composites

pub fn array(elems: Vec<Expr>) -> Expr {
    expr(ExprKind::Array { ty: None, elems })
}

pub fn typed_array(ty: TypeExpr, elems: Vec<Expr>) -> Expr {
    expr(ExprKind::Array { ty: Some(ty), elems })
}

pub fn map(entries: Vec<(Expr, Expr)>) -> Expr {
    expr(ExprKind::Map { ty: None, entries })
}

pub fn typed_map(ty: TypeExpr, entries: Vec<(Expr, Expr)>) -> Expr {
    expr(ExprKind::Map {
        ty: Some(ty),
        entries,
    })
}

pub fn struct_lit(ty: Option<TypeExpr>, fields: Vec<(&str, Expr)>) -> Expr {
    expr(ExprKind::Struct {
        ty,
        fields: fields
            .into_iter()
            .map(|(name, value)| (name.to_string(), value))
            .collect(),
    })
}

// Functions and calls

/// Function literal with untyped parameters and no declared returns.
pub fn func(name: Option<&str>, params: &[&str], body: Vec<Stmt>) -> Expr {
    func_decl(FuncDecl {
        name: name.map(str::to_string),
        params: params.iter().map(|p| Param::untyped(*p)).collect(),
        variadic: false,
        returns: None,
        body,
    })
}

pub fn func_decl(decl: FuncDecl) -> Expr {
    expr(ExprKind::Func(Arc::new(decl)))
}

pub fn call(name: &str, args: Vec<Expr>) -> Expr {
    expr(ExprKind::Call {
        name: name.to_string(),
        args,
        spread: false,
    })
}

/// `name(args...)`: the last argument is spread into the variadic parameter.
pub fn call_spread(name: &str, args: Vec<Expr>) -> Expr {
    expr(ExprKind::Call {
        name: name.to_string(),
        args,
        spread: true,
    })
}

pub fn anon_call(callee: Expr, args: Vec<Expr>) -> Expr {
    expr(ExprKind::AnonCall {
        callee: boxed(callee),
        args,
        spread: false,
    })
}

pub fn op_assign(target: Expr, op: BinaryOp, value: Expr) -> Expr {
    expr(ExprKind::OpAssign {
        target: boxed(target),
        op,
        value: boxed(value),
    })
}

/// `target++`.
pub fn incr(target: Expr) -> Expr {
    op_assign(target, BinaryOp::Add, int(1))
}

// Built-ins

pub fn len(target: Expr) -> Expr {
    expr(ExprKind::Len(boxed(target)))
}

pub fn include(item: Expr, list: Expr) -> Expr {
    expr(ExprKind::Include {
        item: boxed(item),
        list: boxed(list),
    })
}

pub fn make(ty: TypeExpr, len: Option<Expr>, cap: Option<Expr>) -> Expr {
    expr(ExprKind::Make {
        ty,
        len: len.map(boxed),
        cap: cap.map(boxed),
    })
}

pub fn recv(chan: Expr) -> Expr {
    expr(ExprKind::Recv(boxed(chan)))
}

pub fn delete(target: Expr, key: Option<Expr>) -> Expr {
    expr(ExprKind::Delete {
        target: boxed(target),
        key: key.map(boxed),
    })
}

// Statements

/// Root block of a program.
pub fn program(stmts: Vec<Stmt>) -> Stmt {
    stmt(StmtKind::Block(stmts))
}

pub fn block(stmts: Vec<Stmt>) -> Stmt {
    stmt(StmtKind::Block(stmts))
}

pub fn expr_stmt(e: Expr) -> Stmt {
    stmt(StmtKind::Expr(e))
}

pub fn var(names: &[&str], ty: Option<TypeExpr>, values: Vec<Expr>) -> Stmt {
    stmt(StmtKind::Var {
        names: names.iter().map(|n| (*n).to_string()).collect(),
        ty,
        values,
        mutable: true,
    })
}

pub fn constant(name: &str, value: Expr) -> Stmt {
    stmt(StmtKind::Var {
        names: vec![name.to_string()],
        ty: None,
        values: vec![value],
        mutable: false,
    })
}

pub fn assign(targets: Vec<Expr>, values: Vec<Expr>) -> Stmt {
    stmt(StmtKind::Assign { targets, values })
}

/// `name = value`.
pub fn assign1(name: &str, value: Expr) -> Stmt {
    assign(vec![ident(name)], vec![value])
}

pub fn if_(
    cond: Expr,
    then: Vec<Stmt>,
    else_ifs: Vec<(Expr, Vec<Stmt>)>,
    otherwise: Option<Vec<Stmt>>,
) -> Stmt {
    stmt(StmtKind::If {
        cond,
        then,
        else_ifs: else_ifs
            .into_iter()
            .map(|(cond, then)| {
                stmt(StmtKind::If {
                    cond,
                    then,
                    else_ifs: Vec::new(),
                    otherwise: None,
                })
            })
            .collect(),
        otherwise,
    })
}

pub fn try_(
    body: Vec<Stmt>,
    binding: Option<&str>,
    catch: Vec<Stmt>,
    finally: Option<Vec<Stmt>>,
) -> Stmt {
    stmt(StmtKind::Try {
        body,
        binding: binding.map(str::to_string),
        catch,
        finally,
    })
}

pub fn loop_(cond: Option<Expr>, body: Vec<Stmt>) -> Stmt {
    stmt(StmtKind::Loop { cond, body })
}

pub fn for_in(vars: &[&str], iterable: Expr, body: Vec<Stmt>) -> Stmt {
    stmt(StmtKind::For {
        vars: vars.iter().map(|v| (*v).to_string()).collect(),
        iterable,
        body,
    })
}

pub fn cfor(init: Option<Stmt>, cond: Option<Expr>, post: Option<Expr>, body: Vec<Stmt>) -> Stmt {
    stmt(StmtKind::CFor {
        init: init.map(Box::new),
        cond,
        post,
        body,
    })
}

pub fn switch(value: Expr, cases: Vec<(Vec<Expr>, Vec<Stmt>)>, default: Option<Vec<Stmt>>) -> Stmt {
    stmt(StmtKind::Switch {
        value,
        cases: cases
            .into_iter()
            .map(|(values, body)| SwitchCase {
                pos: Position::NONE,
                values,
                body,
            })
            .collect(),
        default,
    })
}

pub fn select(cases: Vec<(Stmt, Vec<Stmt>)>, default: Option<Vec<Stmt>>) -> Stmt {
    stmt(StmtKind::Select {
        cases: cases
            .into_iter()
            .map(|(op, body)| SelectCase {
                pos: Position::NONE,
                op: Box::new(op),
                body,
            })
            .collect(),
        default,
    })
}

pub fn throw(value: Expr) -> Stmt {
    stmt(StmtKind::Throw(value))
}

pub fn return_(values: Vec<Expr>) -> Stmt {
    stmt(StmtKind::Return(values))
}

pub fn return1(value: Expr) -> Stmt {
    return_(vec![value])
}

pub fn break_() -> Stmt {
    stmt(StmtKind::Break)
}

pub fn continue_() -> Stmt {
    stmt(StmtKind::Continue)
}

pub fn module(name: &str, body: Vec<Stmt>) -> Stmt {
    stmt(StmtKind::Module {
        name: name.to_string(),
        body,
    })
}

pub fn spawn(call: Expr) -> Stmt {
    stmt(StmtKind::Spawn(call))
}

pub fn defer(call: Expr) -> Stmt {
    stmt(StmtKind::Defer(call))
}

pub fn send(chan: Expr, value: Expr) -> Stmt {
    stmt(StmtKind::Send { chan, value })
}

pub fn receive(chan: Expr, value: Option<Expr>, ok: Option<Expr>) -> Stmt {
    stmt(StmtKind::Receive { chan, value, ok })
}

pub fn close(chan: Expr) -> Stmt {
    stmt(StmtKind::Close(chan))
}
