//! Tree to bytes.

use tern_ir::{
    BinaryOp, Expr, ExprKind, FuncDecl, Literal, Param, Position, Stmt, StmtKind, TypeExpr,
    UnaryOp,
};
use tern_stack::ensure_sufficient_stack;

use crate::opcode as op;
use crate::{MAGIC, VERSION};

/// Append-only writer for one program.
pub(crate) struct Encoder {
    buf: Vec<u8>,
}

impl Encoder {
    pub(crate) fn new() -> Self {
        let mut buf = Vec::with_capacity(256);
        buf.extend_from_slice(MAGIC);
        buf.extend_from_slice(&VERSION.to_be_bytes());
        Encoder { buf }
    }

    pub(crate) fn finish(self) -> Vec<u8> {
        self.buf
    }

    // Primitives

    fn u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    fn bool(&mut self, v: bool) {
        self.buf.push(u8::from(v));
    }

    fn i32(&mut self, v: i32) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    fn len(&mut self, n: usize) {
        self.i32(i32::try_from(n).unwrap_or(i32::MAX));
    }

    fn str(&mut self, s: &str) {
        self.len(s.len());
        self.buf.extend_from_slice(s.as_bytes());
    }

    fn strings(&mut self, items: &[String]) {
        self.len(items.len());
        for s in items {
            self.str(s);
        }
    }

    fn opt_str(&mut self, s: Option<&str>) {
        self.bool(s.is_some());
        if let Some(s) = s {
            self.str(s);
        }
    }

    fn header(&mut self, opcode: u8, pos: Position) {
        self.u8(opcode);
        self.i32(pos.line);
        self.i32(pos.column);
    }

    fn binary_op(&mut self, bin: BinaryOp) {
        let idx = BinaryOp::ALL.iter().position(|b| *b == bin).unwrap_or(0);
        self.u8(u8::try_from(idx).unwrap_or(0));
    }

    fn unary_op(&mut self, un: UnaryOp) {
        let idx = UnaryOp::ALL.iter().position(|u| *u == un).unwrap_or(0);
        self.u8(u8::try_from(idx).unwrap_or(0));
    }

    // Statements

    pub(crate) fn stmt(&mut self, stmt: &Stmt) {
        ensure_sufficient_stack(|| self.stmt_inner(stmt));
    }

    fn stmts(&mut self, stmts: &[Stmt]) {
        self.len(stmts.len());
        for s in stmts {
            self.stmt(s);
        }
    }

    /// Presence flag, then the list; keeps `None` distinct from empty.
    fn opt_stmts(&mut self, stmts: Option<&[Stmt]>) {
        self.bool(stmts.is_some());
        if let Some(stmts) = stmts {
            self.stmts(stmts);
        }
    }

    fn opt_stmt(&mut self, stmt: Option<&Stmt>) {
        match stmt {
            Some(s) => self.stmt(s),
            None => self.u8(op::NIL),
        }
    }

    fn stmt_inner(&mut self, stmt: &Stmt) {
        let pos = stmt.pos;
        match &stmt.kind {
            StmtKind::Block(body) => {
                self.header(op::BLOCK, pos);
                self.stmts(body);
            }
            StmtKind::Expr(e) => {
                self.header(op::EXPR_STMT, pos);
                self.expr(e);
            }
            StmtKind::Var {
                names,
                ty,
                values,
                mutable,
            } => {
                self.header(op::VAR, pos);
                self.strings(names);
                self.opt_type(ty.as_ref());
                self.exprs(values);
                self.bool(*mutable);
            }
            StmtKind::Assign { targets, values } => {
                self.header(op::ASSIGN, pos);
                self.exprs(targets);
                self.exprs(values);
            }
            StmtKind::If {
                cond,
                then,
                else_ifs,
                otherwise,
            } => {
                self.header(op::IF, pos);
                self.expr(cond);
                self.stmts(then);
                self.stmts(else_ifs);
                self.opt_stmts(otherwise.as_deref());
            }
            StmtKind::Try {
                body,
                binding,
                catch,
                finally,
            } => {
                self.header(op::TRY, pos);
                self.stmts(body);
                self.opt_str(binding.as_deref());
                self.stmts(catch);
                self.opt_stmts(finally.as_deref());
            }
            StmtKind::Loop { cond, body } => {
                self.header(op::LOOP, pos);
                self.opt_expr(cond.as_ref());
                self.stmts(body);
            }
            StmtKind::For {
                vars,
                iterable,
                body,
            } => {
                self.header(op::FOR, pos);
                self.strings(vars);
                self.expr(iterable);
                self.stmts(body);
            }
            StmtKind::CFor {
                init,
                cond,
                post,
                body,
            } => {
                self.header(op::CFOR, pos);
                self.opt_stmt(init.as_deref());
                self.opt_expr(cond.as_ref());
                self.opt_expr(post.as_ref());
                self.stmts(body);
            }
            StmtKind::Switch {
                value,
                cases,
                default,
            } => {
                self.header(op::SWITCH, pos);
                self.expr(value);
                self.len(cases.len());
                for case in cases {
                    self.i32(case.pos.line);
                    self.i32(case.pos.column);
                    self.exprs(&case.values);
                    self.stmts(&case.body);
                }
                self.opt_stmts(default.as_deref());
            }
            StmtKind::Select { cases, default } => {
                self.header(op::SELECT, pos);
                self.len(cases.len());
                for case in cases {
                    self.i32(case.pos.line);
                    self.i32(case.pos.column);
                    self.stmt(&case.op);
                    self.stmts(&case.body);
                }
                self.opt_stmts(default.as_deref());
            }
            StmtKind::Throw(e) => {
                self.header(op::THROW, pos);
                self.expr(e);
            }
            StmtKind::Return(values) => {
                self.header(op::RETURN, pos);
                self.exprs(values);
            }
            StmtKind::Break => self.header(op::BREAK, pos),
            StmtKind::Continue => self.header(op::CONTINUE, pos),
            StmtKind::Module { name, body } => {
                self.header(op::MODULE, pos);
                self.str(name);
                self.stmts(body);
            }
            StmtKind::Spawn(e) => {
                self.header(op::SPAWN, pos);
                self.expr(e);
            }
            StmtKind::Defer(e) => {
                self.header(op::DEFER, pos);
                self.expr(e);
            }
            StmtKind::Send { chan, value } => {
                self.header(op::SEND, pos);
                self.expr(chan);
                self.expr(value);
            }
            StmtKind::Receive { chan, value, ok } => {
                self.header(op::RECEIVE, pos);
                self.expr(chan);
                self.opt_expr(value.as_ref());
                self.opt_expr(ok.as_ref());
            }
            StmtKind::Close(e) => {
                self.header(op::CLOSE, pos);
                self.expr(e);
            }
        }
    }

    // Expressions

    fn expr(&mut self, expr: &Expr) {
        ensure_sufficient_stack(|| self.expr_inner(expr));
    }

    fn exprs(&mut self, exprs: &[Expr]) {
        self.len(exprs.len());
        for e in exprs {
            self.expr(e);
        }
    }

    fn opt_expr(&mut self, expr: Option<&Expr>) {
        match expr {
            Some(e) => self.expr(e),
            None => self.u8(op::NIL),
        }
    }

    fn expr_inner(&mut self, expr: &Expr) {
        let pos = expr.pos;
        match &expr.kind {
            ExprKind::Literal(lit) => match lit {
                Literal::Number(text) => {
                    self.header(op::NUMBER, pos);
                    self.str(text);
                }
                Literal::Str(s) => {
                    self.header(op::STRING, pos);
                    self.str(s);
                }
                Literal::Bool(b) => {
                    self.header(op::BOOL, pos);
                    self.bool(*b);
                }
                Literal::Nil => self.header(op::NIL_LITERAL, pos),
            },
            ExprKind::Ident(name) => {
                self.header(op::IDENT, pos);
                self.str(name);
            }
            ExprKind::Paren(inner) => {
                self.header(op::PAREN, pos);
                self.expr(inner);
            }
            ExprKind::Unary { op: un, expr } => {
                self.header(op::UNARY, pos);
                self.unary_op(*un);
                self.expr(expr);
            }
            ExprKind::Addr(inner) => {
                self.header(op::ADDR, pos);
                self.expr(inner);
            }
            ExprKind::Deref(inner) => {
                self.header(op::DEREF, pos);
                self.expr(inner);
            }
            ExprKind::Binary { op: bin, lhs, rhs } => {
                self.header(op::BINARY, pos);
                self.binary_op(*bin);
                self.expr(lhs);
                self.expr(rhs);
            }
            ExprKind::Ternary {
                cond,
                then,
                otherwise,
            } => {
                self.header(op::TERNARY, pos);
                self.expr(cond);
                self.expr(then);
                self.expr(otherwise);
            }
            ExprKind::Member { expr, name } => {
                self.header(op::MEMBER, pos);
                self.expr(expr);
                self.str(name);
            }
            ExprKind::Index { expr, index } => {
                self.header(op::INDEX, pos);
                self.expr(expr);
                self.expr(index);
            }
            ExprKind::Slice { expr, begin, end } => {
                self.header(op::SLICE, pos);
                self.expr(expr);
                self.opt_expr(begin.as_deref());
                self.opt_expr(end.as_deref());
            }
            ExprKind::Array { ty, elems } => {
                self.header(op::ARRAY, pos);
                self.opt_type(ty.as_ref());
                self.exprs(elems);
            }
            ExprKind::Map { ty, entries } => {
                self.header(op::MAP, pos);
                self.opt_type(ty.as_ref());
                self.len(entries.len());
                for (k, v) in entries {
                    self.expr(k);
                    self.expr(v);
                }
            }
            ExprKind::Struct { ty, fields } => {
                self.header(op::STRUCT, pos);
                self.opt_type(ty.as_ref());
                self.len(fields.len());
                for (name, value) in fields {
                    self.str(name);
                    self.expr(value);
                }
            }
            ExprKind::Func(decl) => {
                self.header(op::FUNC, pos);
                self.func_decl(decl);
            }
            ExprKind::Call { name, args, spread } => {
                self.header(op::CALL, pos);
                self.str(name);
                self.exprs(args);
                self.bool(*spread);
            }
            ExprKind::AnonCall {
                callee,
                args,
                spread,
            } => {
                self.header(op::ANON_CALL, pos);
                self.expr(callee);
                self.exprs(args);
                self.bool(*spread);
            }
            ExprKind::OpAssign {
                target,
                op: bin,
                value,
            } => {
                self.header(op::OP_ASSIGN, pos);
                self.expr(target);
                self.binary_op(*bin);
                self.expr(value);
            }
            ExprKind::Len(inner) => {
                self.header(op::LEN, pos);
                self.expr(inner);
            }
            ExprKind::Include { item, list } => {
                self.header(op::INCLUDE, pos);
                self.expr(item);
                self.expr(list);
            }
            ExprKind::Make { ty, len, cap } => {
                self.header(op::MAKE, pos);
                self.ty(ty);
                self.opt_expr(len.as_deref());
                self.opt_expr(cap.as_deref());
            }
            ExprKind::Recv(chan) => {
                self.header(op::RECV, pos);
                self.expr(chan);
            }
            ExprKind::Delete { target, key } => {
                self.header(op::DELETE, pos);
                self.expr(target);
                self.opt_expr(key.as_deref());
            }
        }
    }

    fn func_decl(&mut self, decl: &FuncDecl) {
        self.opt_str(decl.name.as_deref());
        self.len(decl.params.len());
        for Param { name, ty, mutable } in &decl.params {
            self.str(name);
            self.opt_type(ty.as_ref());
            self.bool(*mutable);
        }
        self.bool(decl.variadic);
        self.bool(decl.returns.is_some());
        if let Some(returns) = &decl.returns {
            self.types(returns);
        }
        self.stmts(&decl.body);
    }

    // Types

    fn ty(&mut self, ty: &TypeExpr) {
        match ty {
            TypeExpr::Named(name) => {
                self.u8(op::TY_NAMED);
                self.str(name);
            }
            TypeExpr::Slice(elem) => {
                self.u8(op::TY_SLICE);
                self.ty(elem);
            }
            TypeExpr::Array(len, elem) => {
                self.u8(op::TY_ARRAY);
                self.buf.extend_from_slice(&len.to_be_bytes());
                self.ty(elem);
            }
            TypeExpr::Map(key, value) => {
                self.u8(op::TY_MAP);
                self.ty(key);
                self.ty(value);
            }
            TypeExpr::Ptr(elem) => {
                self.u8(op::TY_PTR);
                self.ty(elem);
            }
            TypeExpr::Chan(elem) => {
                self.u8(op::TY_CHAN);
                self.ty(elem);
            }
            TypeExpr::Func {
                params,
                variadic,
                returns,
            } => {
                self.u8(op::TY_FUNC);
                self.types(params);
                self.bool(*variadic);
                self.types(returns);
            }
            TypeExpr::Struct(fields) => {
                self.u8(op::TY_STRUCT);
                self.len(fields.len());
                for (name, ty) in fields {
                    self.str(name);
                    self.ty(ty);
                }
            }
        }
    }

    fn types(&mut self, types: &[TypeExpr]) {
        self.len(types.len());
        for t in types {
            self.ty(t);
        }
    }

    fn opt_type(&mut self, ty: Option<&TypeExpr>) {
        match ty {
            Some(t) => self.ty(t),
            None => self.u8(op::NIL),
        }
    }
}
