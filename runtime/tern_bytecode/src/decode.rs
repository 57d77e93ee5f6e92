//! Bytes to tree. Structural mirror of `encode`.

use std::sync::Arc;

use tern_ir::{
    BinaryOp, Expr, ExprKind, FuncDecl, Literal, Param, Position, SelectCase, Stmt, StmtKind,
    SwitchCase, TypeExpr, UnaryOp,
};
use tern_stack::ensure_sufficient_stack;

use crate::opcode as op;
use crate::{DecodeError, MAGIC, VERSION};

type DecodeResult<T> = Result<T, DecodeError>;

/// Cursor over one encoded program.
pub(crate) struct Decoder<'a> {
    bytes: &'a [u8],
    offset: usize,
}

impl<'a> Decoder<'a> {
    /// Check the header and position the cursor on the root node.
    pub(crate) fn new(bytes: &'a [u8]) -> DecodeResult<Self> {
        if !bytes.starts_with(MAGIC) {
            return Err(DecodeError::BadMagic);
        }
        let mut decoder = Decoder {
            bytes,
            offset: MAGIC.len(),
        };
        let found = u16::from_be_bytes(decoder.take::<2>()?);
        if found != VERSION {
            return Err(DecodeError::UnsupportedVersion {
                found,
                expected: VERSION,
            });
        }
        Ok(decoder)
    }

    /// Reject anything after the root node.
    pub(crate) fn finish(self) -> DecodeResult<()> {
        let count = self.bytes.len() - self.offset;
        if count == 0 {
            Ok(())
        } else {
            Err(DecodeError::TrailingBytes { count })
        }
    }

    // Primitives

    fn take<const N: usize>(&mut self) -> DecodeResult<[u8; N]> {
        let end = self.offset + N;
        let Some(chunk) = self.bytes.get(self.offset..end) else {
            return Err(DecodeError::UnexpectedEof {
                offset: self.offset,
            });
        };
        let mut out = [0u8; N];
        out.copy_from_slice(chunk);
        self.offset = end;
        Ok(out)
    }

    fn u8(&mut self) -> DecodeResult<u8> {
        let [b] = self.take::<1>()?;
        Ok(b)
    }

    fn peek(&self) -> DecodeResult<u8> {
        self.bytes
            .get(self.offset)
            .copied()
            .ok_or(DecodeError::UnexpectedEof {
                offset: self.offset,
            })
    }

    fn bool(&mut self) -> DecodeResult<bool> {
        Ok(self.u8()? != 0)
    }

    fn i32(&mut self) -> DecodeResult<i32> {
        Ok(i32::from_be_bytes(self.take::<4>()?))
    }

    fn len(&mut self) -> DecodeResult<usize> {
        let offset = self.offset;
        let len = self.i32()?;
        usize::try_from(len).map_err(|_| DecodeError::NegativeLength { len, offset })
    }

    fn str(&mut self) -> DecodeResult<String> {
        let len = self.len()?;
        let start = self.offset;
        let Some(raw) = self.bytes.get(start..start + len) else {
            return Err(DecodeError::UnexpectedEof { offset: start });
        };
        let s = std::str::from_utf8(raw)
            .map_err(|_| DecodeError::InvalidUtf8 { offset: start })?
            .to_string();
        self.offset = start + len;
        Ok(s)
    }

    fn strings(&mut self) -> DecodeResult<Vec<String>> {
        let n = self.len()?;
        let mut out = Vec::with_capacity(n.min(64));
        for _ in 0..n {
            out.push(self.str()?);
        }
        Ok(out)
    }

    fn opt_str(&mut self) -> DecodeResult<Option<String>> {
        if self.bool()? {
            Ok(Some(self.str()?))
        } else {
            Ok(None)
        }
    }

    fn pos(&mut self) -> DecodeResult<Position> {
        let line = self.i32()?;
        let column = self.i32()?;
        Ok(Position::new(line, column))
    }

    fn binary_op(&mut self) -> DecodeResult<BinaryOp> {
        let offset = self.offset;
        let idx = self.u8()?;
        BinaryOp::ALL
            .get(usize::from(idx))
            .copied()
            .ok_or(DecodeError::UnknownOpcode {
                opcode: idx,
                offset,
            })
    }

    fn unary_op(&mut self) -> DecodeResult<UnaryOp> {
        let offset = self.offset;
        let idx = self.u8()?;
        UnaryOp::ALL
            .get(usize::from(idx))
            .copied()
            .ok_or(DecodeError::UnknownOpcode {
                opcode: idx,
                offset,
            })
    }

    /// Consume a `NIL` marker if one is next.
    fn nil(&mut self) -> DecodeResult<bool> {
        if self.peek()? == op::NIL {
            self.offset += 1;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    // Statements

    pub(crate) fn stmt(&mut self) -> DecodeResult<Stmt> {
        ensure_sufficient_stack(|| self.stmt_inner())
    }

    fn stmts(&mut self) -> DecodeResult<Vec<Stmt>> {
        let n = self.len()?;
        let mut out = Vec::with_capacity(n.min(64));
        for _ in 0..n {
            out.push(self.stmt()?);
        }
        Ok(out)
    }

    fn opt_stmts(&mut self) -> DecodeResult<Option<Vec<Stmt>>> {
        if self.bool()? {
            Ok(Some(self.stmts()?))
        } else {
            Ok(None)
        }
    }

    fn opt_stmt(&mut self) -> DecodeResult<Option<Stmt>> {
        if self.nil()? {
            Ok(None)
        } else {
            Ok(Some(self.stmt()?))
        }
    }

    fn stmt_inner(&mut self) -> DecodeResult<Stmt> {
        let offset = self.offset;
        let opcode = self.u8()?;
        if !(op::BLOCK..op::NUMBER).contains(&opcode) {
            return Err(unexpected("statement", opcode, offset));
        }
        let pos = self.pos()?;
        let kind = match opcode {
            op::BLOCK => StmtKind::Block(self.stmts()?),
            op::EXPR_STMT => StmtKind::Expr(self.expr()?),
            op::VAR => StmtKind::Var {
                names: self.strings()?,
                ty: self.opt_type()?,
                values: self.exprs()?,
                mutable: self.bool()?,
            },
            op::ASSIGN => StmtKind::Assign {
                targets: self.exprs()?,
                values: self.exprs()?,
            },
            op::IF => StmtKind::If {
                cond: self.expr()?,
                then: self.stmts()?,
                else_ifs: self.stmts()?,
                otherwise: self.opt_stmts()?,
            },
            op::TRY => StmtKind::Try {
                body: self.stmts()?,
                binding: self.opt_str()?,
                catch: self.stmts()?,
                finally: self.opt_stmts()?,
            },
            op::LOOP => StmtKind::Loop {
                cond: self.opt_expr()?,
                body: self.stmts()?,
            },
            op::FOR => StmtKind::For {
                vars: self.strings()?,
                iterable: self.expr()?,
                body: self.stmts()?,
            },
            op::CFOR => StmtKind::CFor {
                init: self.opt_stmt()?.map(Box::new),
                cond: self.opt_expr()?,
                post: self.opt_expr()?,
                body: self.stmts()?,
            },
            op::SWITCH => {
                let value = self.expr()?;
                let n = self.len()?;
                let mut cases = Vec::with_capacity(n.min(64));
                for _ in 0..n {
                    cases.push(SwitchCase {
                        pos: self.pos()?,
                        values: self.exprs()?,
                        body: self.stmts()?,
                    });
                }
                StmtKind::Switch {
                    value,
                    cases,
                    default: self.opt_stmts()?,
                }
            }
            op::SELECT => {
                let n = self.len()?;
                let mut cases = Vec::with_capacity(n.min(64));
                for _ in 0..n {
                    cases.push(SelectCase {
                        pos: self.pos()?,
                        op: Box::new(self.stmt()?),
                        body: self.stmts()?,
                    });
                }
                StmtKind::Select {
                    cases,
                    default: self.opt_stmts()?,
                }
            }
            op::THROW => StmtKind::Throw(self.expr()?),
            op::RETURN => StmtKind::Return(self.exprs()?),
            op::BREAK => StmtKind::Break,
            op::CONTINUE => StmtKind::Continue,
            op::MODULE => StmtKind::Module {
                name: self.str()?,
                body: self.stmts()?,
            },
            op::SPAWN => StmtKind::Spawn(self.expr()?),
            op::DEFER => StmtKind::Defer(self.expr()?),
            op::SEND => StmtKind::Send {
                chan: self.expr()?,
                value: self.expr()?,
            },
            op::RECEIVE => StmtKind::Receive {
                chan: self.expr()?,
                value: self.opt_expr()?,
                ok: self.opt_expr()?,
            },
            op::CLOSE => StmtKind::Close(self.expr()?),
            _ => return Err(DecodeError::UnknownOpcode { opcode, offset }),
        };
        Ok(Stmt::new(kind, pos))
    }

    // Expressions

    fn expr(&mut self) -> DecodeResult<Expr> {
        ensure_sufficient_stack(|| self.expr_inner())
    }

    fn boxed(&mut self) -> DecodeResult<Box<Expr>> {
        Ok(Box::new(self.expr()?))
    }

    fn exprs(&mut self) -> DecodeResult<Vec<Expr>> {
        let n = self.len()?;
        let mut out = Vec::with_capacity(n.min(64));
        for _ in 0..n {
            out.push(self.expr()?);
        }
        Ok(out)
    }

    fn opt_expr(&mut self) -> DecodeResult<Option<Expr>> {
        if self.nil()? {
            Ok(None)
        } else {
            Ok(Some(self.expr()?))
        }
    }

    fn opt_boxed(&mut self) -> DecodeResult<Option<Box<Expr>>> {
        Ok(self.opt_expr()?.map(Box::new))
    }

    fn expr_inner(&mut self) -> DecodeResult<Expr> {
        let offset = self.offset;
        let opcode = self.u8()?;
        if !(op::NUMBER..op::TY_NAMED).contains(&opcode) {
            return Err(unexpected("expression", opcode, offset));
        }
        let pos = self.pos()?;
        let kind = match opcode {
            op::NUMBER => ExprKind::Literal(Literal::Number(self.str()?)),
            op::STRING => ExprKind::Literal(Literal::Str(self.str()?)),
            op::BOOL => ExprKind::Literal(Literal::Bool(self.bool()?)),
            op::NIL_LITERAL => ExprKind::Literal(Literal::Nil),
            op::IDENT => ExprKind::Ident(self.str()?),
            op::PAREN => ExprKind::Paren(self.boxed()?),
            op::UNARY => ExprKind::Unary {
                op: self.unary_op()?,
                expr: self.boxed()?,
            },
            op::ADDR => ExprKind::Addr(self.boxed()?),
            op::DEREF => ExprKind::Deref(self.boxed()?),
            op::BINARY => ExprKind::Binary {
                op: self.binary_op()?,
                lhs: self.boxed()?,
                rhs: self.boxed()?,
            },
            op::TERNARY => ExprKind::Ternary {
                cond: self.boxed()?,
                then: self.boxed()?,
                otherwise: self.boxed()?,
            },
            op::MEMBER => ExprKind::Member {
                expr: self.boxed()?,
                name: self.str()?,
            },
            op::INDEX => ExprKind::Index {
                expr: self.boxed()?,
                index: self.boxed()?,
            },
            op::SLICE => ExprKind::Slice {
                expr: self.boxed()?,
                begin: self.opt_boxed()?,
                end: self.opt_boxed()?,
            },
            op::ARRAY => ExprKind::Array {
                ty: self.opt_type()?,
                elems: self.exprs()?,
            },
            op::MAP => {
                let ty = self.opt_type()?;
                let n = self.len()?;
                let mut entries = Vec::with_capacity(n.min(64));
                for _ in 0..n {
                    let key = self.expr()?;
                    let value = self.expr()?;
                    entries.push((key, value));
                }
                ExprKind::Map { ty, entries }
            }
            op::STRUCT => {
                let ty = self.opt_type()?;
                let n = self.len()?;
                let mut fields = Vec::with_capacity(n.min(64));
                for _ in 0..n {
                    let name = self.str()?;
                    let value = self.expr()?;
                    fields.push((name, value));
                }
                ExprKind::Struct { ty, fields }
            }
            op::FUNC => ExprKind::Func(Arc::new(self.func_decl()?)),
            op::CALL => ExprKind::Call {
                name: self.str()?,
                args: self.exprs()?,
                spread: self.bool()?,
            },
            op::ANON_CALL => ExprKind::AnonCall {
                callee: self.boxed()?,
                args: self.exprs()?,
                spread: self.bool()?,
            },
            op::OP_ASSIGN => ExprKind::OpAssign {
                target: self.boxed()?,
                op: self.binary_op()?,
                value: self.boxed()?,
            },
            op::LEN => ExprKind::Len(self.boxed()?),
            op::INCLUDE => ExprKind::Include {
                item: self.boxed()?,
                list: self.boxed()?,
            },
            op::MAKE => ExprKind::Make {
                ty: self.ty()?,
                len: self.opt_boxed()?,
                cap: self.opt_boxed()?,
            },
            op::RECV => ExprKind::Recv(self.boxed()?),
            op::DELETE => ExprKind::Delete {
                target: self.boxed()?,
                key: self.opt_boxed()?,
            },
            _ => return Err(DecodeError::UnknownOpcode { opcode, offset }),
        };
        Ok(Expr::new(kind, pos))
    }

    fn func_decl(&mut self) -> DecodeResult<FuncDecl> {
        let name = self.opt_str()?;
        let n = self.len()?;
        let mut params = Vec::with_capacity(n.min(16));
        for _ in 0..n {
            params.push(Param {
                name: self.str()?,
                ty: self.opt_type()?,
                mutable: self.bool()?,
            });
        }
        let variadic = self.bool()?;
        let returns = if self.bool()? {
            Some(self.types()?)
        } else {
            None
        };
        Ok(FuncDecl {
            name,
            params,
            variadic,
            returns,
            body: self.stmts()?,
        })
    }

    // Types

    fn ty(&mut self) -> DecodeResult<TypeExpr> {
        ensure_sufficient_stack(|| self.ty_inner())
    }

    fn ty_boxed(&mut self) -> DecodeResult<Box<TypeExpr>> {
        Ok(Box::new(self.ty()?))
    }

    fn ty_inner(&mut self) -> DecodeResult<TypeExpr> {
        let offset = self.offset;
        let tag = self.u8()?;
        Ok(match tag {
            op::TY_NAMED => TypeExpr::Named(self.str()?),
            op::TY_SLICE => TypeExpr::Slice(self.ty_boxed()?),
            op::TY_ARRAY => {
                let len = u32::from_be_bytes(self.take::<4>()?);
                TypeExpr::Array(len, self.ty_boxed()?)
            }
            op::TY_MAP => TypeExpr::Map(self.ty_boxed()?, self.ty_boxed()?),
            op::TY_PTR => TypeExpr::Ptr(self.ty_boxed()?),
            op::TY_CHAN => TypeExpr::Chan(self.ty_boxed()?),
            op::TY_FUNC => TypeExpr::Func {
                params: self.types()?,
                variadic: self.bool()?,
                returns: self.types()?,
            },
            op::TY_STRUCT => {
                let n = self.len()?;
                let mut fields = Vec::with_capacity(n.min(16));
                for _ in 0..n {
                    let name = self.str()?;
                    fields.push((name, self.ty()?));
                }
                TypeExpr::Struct(fields)
            }
            other if other < op::TY_NAMED => return Err(unexpected("type", other, offset)),
            other => {
                return Err(DecodeError::UnknownOpcode {
                    opcode: other,
                    offset,
                })
            }
        })
    }

    fn types(&mut self) -> DecodeResult<Vec<TypeExpr>> {
        let n = self.len()?;
        let mut out = Vec::with_capacity(n.min(16));
        for _ in 0..n {
            out.push(self.ty()?);
        }
        Ok(out)
    }

    fn opt_type(&mut self) -> DecodeResult<Option<TypeExpr>> {
        if self.nil()? {
            Ok(None)
        } else {
            Ok(Some(self.ty()?))
        }
    }
}

/// Opcode from the wrong family, or past the end of every family.
#[cold]
fn unexpected(expected: &'static str, opcode: u8, offset: usize) -> DecodeError {
    if opcode > op::TY_STRUCT {
        DecodeError::UnknownOpcode { opcode, offset }
    } else {
        DecodeError::UnexpectedOpcode {
            expected,
            opcode,
            offset,
        }
    }
}
