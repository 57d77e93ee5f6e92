//! Built-in operations: `len`, `in`, `make`, `delete`, channel operations
//! and `select`.
//!
//! Every blocking channel operation races the run's cancellation token, so
//! a cancelled run never stays parked on a channel nobody will serve.

use crossbeam::channel::{select, Select, Sender};
use tern_ir::{Expr, ExprKind, SelectCase, Stmt, StmtKind};
use tern_value::errors::{
    cancelled, close_of_closed, invalid_delete, invalid_make, nil_dereference, send_on_closed,
};
use tern_value::{convert, Channel, Environment, EvalError, EvalResult, MapKey, ResultExt, Type, Value};

use super::expr::map_key;
use super::scope_guard::ScopeGuard;
use super::{Flow, Interpreter};

/// A `select` case with its operands evaluated.
enum SelectOp<'a> {
    Send {
        tx: Sender<Value>,
        value: Value,
    },
    Recv {
        chan: Channel,
        value: Option<&'a Expr>,
        ok: Option<&'a Expr>,
    },
    /// Nil channel: never ready.
    Never,
}

/// A case registered with the dynamic select.
enum Armed<'o, 'a> {
    Send {
        tx: &'o Sender<Value>,
        value: &'o Value,
    },
    Recv {
        chan: &'o Channel,
        value: Option<&'a Expr>,
        ok: Option<&'a Expr>,
    },
}

impl Interpreter {
    /// `len(x)`: characters of a string, elements of a slice or map, items
    /// buffered in a channel. Nil has length zero.
    pub(super) fn len_of(&self, value: &Value) -> EvalResult {
        let len = match value {
            Value::Str(s) => s.chars().count(),
            Value::Slice(s) => s.len(),
            Value::Map(m) => self.ctx.with_map_lock(|| m.len()),
            Value::Chan(c) => c.len(),
            Value::Nil => 0,
            Value::Invalid if self.mode().is_validating() => return Ok(Value::Invalid),
            other => {
                return Err(EvalError::new(format!(
                    "invalid argument {} for len",
                    other.type_name()
                )));
            }
        };
        Ok(Value::Int(i64::try_from(len).unwrap_or(i64::MAX)))
    }

    /// `item in list`: element of a slice, key of a map, substring of a
    /// string.
    pub(super) fn includes(&self, item: &Value, list: &Value) -> EvalResult {
        if self.mode().is_validating() && (item.is_invalid() || list.is_invalid()) {
            return Ok(Value::Invalid);
        }
        let found = match list {
            Value::Slice(s) => s.read().iter().any(|v| v == item),
            Value::Map(m) => match convert(item.clone(), m.key_type()) {
                Ok(key) => MapKey::from_value(&key)
                    .is_some_and(|key| self.ctx.with_map_lock(|| m.contains(&key))),
                Err(_) => false,
            },
            Value::Str(s) => s.contains(&*item.to_string()),
            Value::Nil => false,
            other => {
                return Err(EvalError::new(format!(
                    "cannot search {} with in",
                    other.type_name()
                )));
            }
        };
        Ok(Value::Bool(found))
    }

    /// `make(T, len, cap)`.
    pub(super) fn make(&self, ty: &Type, len: Option<&Value>, cap: Option<&Value>) -> EvalResult {
        let size = |v: Option<&Value>, what: &str| -> Result<Option<usize>, EvalError> {
            match v {
                None | Some(Value::Invalid) => Ok(None),
                Some(Value::Int(n)) => usize::try_from(*n)
                    .map(Some)
                    .map_err(|_| invalid_make(format!("negative {what} {n}"))),
                Some(other) => Err(invalid_make(format!(
                    "{what} must be an integer, got {}",
                    other.type_name()
                ))),
            }
        };
        let len = size(len, "len")?;
        let cap = size(cap, "cap")?;
        match ty {
            Type::Slice(elem) => {
                let len = len.unwrap_or(0);
                let cap = cap.unwrap_or(len);
                if len > cap {
                    return Err(invalid_make(format!("len {len} larger than cap {cap}")));
                }
                let mut items = Vec::with_capacity(cap);
                items.resize_with(len, || elem.zero());
                Ok(Value::slice(items, Type::clone(elem)))
            }
            Type::Map(key, value) => Ok(Value::map(Type::clone(key), Type::clone(value))),
            Type::Chan(elem) => Ok(Value::Chan(Channel::new(Type::clone(elem), len.unwrap_or(0)))),
            Type::Array(..) | Type::Struct(_) => Ok(ty.zero()),
            other => Err(invalid_make(format!("cannot make {other}"))),
        }
    }

    /// `delete("name")`, `delete("name", true)`, `delete(m, key)`.
    ///
    /// A symbol is removed from the current scope, or with a truthy second
    /// argument from the first enclosing scope that holds it.
    pub(super) fn delete(&self, env: &Environment, target: &Value, key: Option<&Value>) -> Result<(), EvalError> {
        if !self.mode().writes_aggregates() {
            return Ok(());
        }
        match target {
            Value::Str(name) if key.is_some_and(Value::truthy) => Ok(env.delete_global(name)?),
            Value::Str(name) => Ok(env.delete(name)?),
            Value::Map(m) => {
                let Some(key) = key else {
                    return Err(invalid_delete("map without a key"));
                };
                let key = map_key(m, key.clone())?;
                self.ctx.with_map_lock(|| m.remove(&key));
                Ok(())
            }
            Value::Nil => Ok(()),
            other => Err(invalid_delete(other.kind_name())),
        }
    }

    /// `close(ch)`. Closing nil does nothing.
    pub(super) fn close(&self, chan: &Value) -> Result<(), EvalError> {
        match chan {
            Value::Chan(c) if self.mode().performs_channel_ops() => {
                if c.close() {
                    Ok(())
                } else {
                    Err(close_of_closed())
                }
            }
            Value::Chan(_) | Value::Nil => Ok(()),
            Value::Invalid if self.mode().is_validating() => Ok(()),
            other => Err(EvalError::new(format!("cannot close {}", other.type_name()))),
        }
    }

    /// `ch <- value`.
    pub(super) fn send(&self, chan: &Value, value: Value) -> Result<(), EvalError> {
        let chan = match chan {
            Value::Chan(c) => c,
            Value::Invalid if self.mode().is_validating() => return Ok(()),
            Value::Nil | Value::Invalid => return Err(nil_dereference()),
            other => return Err(EvalError::new(format!("cannot send to {}", other.type_name()))),
        };
        let value = if value.is_invalid() && self.mode().is_validating() {
            chan.elem().zero()
        } else {
            convert(value, chan.elem())?
        };
        if !self.mode().performs_channel_ops() {
            return Ok(());
        }
        let tx = chan.sender().ok_or_else(send_on_closed)?;
        let signal = self.ctx.cancel_token().signal();
        select! {
            send(tx, value) -> sent => sent.map_err(|_| send_on_closed()),
            recv(signal) -> _ => Err(cancelled()),
        }
    }

    /// `<-ch`: the received value and whether the channel was still open.
    /// A closed, drained channel yields the element zero value.
    pub(super) fn receive(&self, chan: &Value) -> Result<(Value, bool), EvalError> {
        let chan = match chan {
            Value::Chan(c) => c,
            Value::Invalid if self.mode().is_validating() => return Ok((Value::Invalid, true)),
            Value::Nil | Value::Invalid => return Err(nil_dereference()),
            other => {
                return Err(EvalError::new(format!(
                    "cannot receive from {}",
                    other.type_name()
                )));
            }
        };
        if !self.mode().performs_channel_ops() {
            return Ok((chan.elem().zero(), true));
        }
        let signal = self.ctx.cancel_token().signal();
        select! {
            recv(chan.receiver()) -> msg => Ok(match msg {
                Ok(value) => (value, true),
                Err(_) => (chan.elem().zero(), false),
            }),
            recv(signal) -> _ => Err(cancelled()),
        }
    }

    /// `select { case ...: default: }`. Blocks until one case is ready, or
    /// runs `default` when none is. Operands of every case are evaluated
    /// first.
    pub(super) fn select(
        &self,
        env: &Environment,
        cases: &[SelectCase],
        default: Option<&[Stmt]>,
    ) -> Result<Flow, EvalError> {
        let mut ops = Vec::with_capacity(cases.len());
        for case in cases {
            ops.push(self.select_op(env, &case.op).at(case.pos)?);
        }
        if !self.mode().performs_channel_ops() {
            return self.validate_select(env, cases, ops, default);
        }

        let signal = self.ctx.cancel_token().signal();
        let mut sel = Select::new();
        let mut armed = Vec::with_capacity(ops.len());
        for (i, op) in ops.iter().enumerate() {
            let (handle, op) = match op {
                SelectOp::Send { tx, value } => (sel.send(tx), Armed::Send { tx, value }),
                SelectOp::Recv { chan, value, ok } => (
                    sel.recv(chan.receiver()),
                    Armed::Recv {
                        chan,
                        value: *value,
                        ok: *ok,
                    },
                ),
                SelectOp::Never => continue,
            };
            armed.push((handle, i, op));
        }
        sel.recv(signal);
        let oper = match default {
            Some(body) => match sel.try_select() {
                Ok(oper) => oper,
                Err(_) => return self.select_body(&ScopeGuard::block(env), body),
            },
            None => sel.select(),
        };
        let picked = oper.index();
        let Some((_, i, op)) = armed.iter().find(|(handle, ..)| *handle == picked) else {
            let _ = oper.recv(signal);
            return Err(cancelled());
        };
        let i = *i;
        let scope = ScopeGuard::block(env);
        match op {
            Armed::Send { tx, value } => {
                oper.send(*tx, (*value).clone())
                    .map_err(|_| send_on_closed().at(cases[i].pos))?;
            }
            Armed::Recv { chan, value, ok } => {
                let (received, open) = match oper.recv(chan.receiver()) {
                    Ok(v) => (v, true),
                    Err(_) => (chan.elem().zero(), false),
                };
                self.bind_received(&scope, *value, *ok, received, open)?;
            }
        }
        self.select_body(&scope, &cases[i].body)
    }

    fn validate_select(
        &self,
        env: &Environment,
        cases: &[SelectCase],
        ops: Vec<SelectOp<'_>>,
        default: Option<&[Stmt]>,
    ) -> Result<Flow, EvalError> {
        for (case, op) in cases.iter().zip(ops) {
            let scope = ScopeGuard::block(env);
            if let SelectOp::Recv { chan, value, ok } = op {
                self.bind_received(&scope, value, ok, chan.elem().zero(), true)?;
            }
            self.eval_stmts(&scope, &case.body)?;
        }
        if let Some(body) = default {
            self.eval_stmts(&ScopeGuard::block(env), body)?;
        }
        Ok(Flow::Normal(Value::Invalid))
    }

    /// Evaluate the operands of one `select` case.
    fn select_op<'a>(&self, env: &Environment, op: &'a Stmt) -> Result<SelectOp<'a>, EvalError> {
        self.ctx.step().map_err(|e| e.rewrap(op.pos))?;
        let (chan, value, ok) = match &op.kind {
            StmtKind::Send { chan, value } => {
                let chan = self.eval_expr(env, chan)?;
                let value = self.eval_expr(env, value)?;
                return match chan {
                    Value::Chan(c) => {
                        let value = if value.is_invalid() && self.mode().is_validating() {
                            c.elem().zero()
                        } else {
                            convert(value, c.elem())?
                        };
                        match c.sender() {
                            Some(tx) => Ok(SelectOp::Send { tx, value }),
                            None if self.mode().performs_channel_ops() => Err(send_on_closed()),
                            None => Ok(SelectOp::Never),
                        }
                    }
                    Value::Nil | Value::Invalid => Ok(SelectOp::Never),
                    other => Err(EvalError::new(format!("cannot send to {}", other.type_name()))),
                };
            }
            StmtKind::Receive { chan, value, ok } => (chan, value.as_ref(), ok.as_ref()),
            StmtKind::Expr(Expr {
                kind: ExprKind::Recv(chan),
                ..
            }) => (&**chan, None, None),
            _ => return Err(EvalError::new("select case must be a send or receive")),
        };
        match self.eval_expr(env, chan)? {
            Value::Chan(chan) => Ok(SelectOp::Recv { chan, value, ok }),
            Value::Nil | Value::Invalid => Ok(SelectOp::Never),
            other => Err(EvalError::new(format!(
                "cannot receive from {}",
                other.type_name()
            ))),
        }
    }

    fn bind_received(
        &self,
        scope: &Environment,
        value: Option<&Expr>,
        ok: Option<&Expr>,
        received: Value,
        open: bool,
    ) -> Result<(), EvalError> {
        if let Some(target) = value {
            self.assign_to(scope, target, received)?;
        }
        if let Some(target) = ok {
            self.assign_to(scope, target, Value::Bool(open))?;
        }
        Ok(())
    }

    /// `break` leaves the select.
    fn select_body(&self, scope: &Environment, body: &[Stmt]) -> Result<Flow, EvalError> {
        match self.eval_stmts(scope, body)? {
            Flow::Break => Ok(Flow::Normal(Value::Invalid)),
            flow => Ok(flow),
        }
    }
}
