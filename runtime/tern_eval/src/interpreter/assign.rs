//! Assignment targets and declarations.
//!
//! An identifier target defines the name in the current scope unless some
//! enclosing scope already holds it, in which case that binding is set.
//! Indexing one past the end of a slice appends; any other out-of-range
//! index fails. A nil map (or a nil variable used as one) is created on the
//! first write.

use tern_ir::{Expr, ExprKind, TypeExpr};
use tern_value::errors::{cannot_index, index_out_of_range, nil_dereference, no_such_member, no_support_member_op};
use tern_value::{
    convert, Environment, EvalError, MapValue, Mutability, ResultExt, SliceValue, Type, Value,
};

use super::expr::{map_key, slice_bounds};
use super::types::resolve_opt;
use super::Interpreter;

impl Interpreter {
    /// `var a, b T = x, y`.
    pub(super) fn declare(
        &self,
        env: &Environment,
        names: &[String],
        ty: Option<&TypeExpr>,
        values: &[Expr],
        mutable: bool,
    ) -> Result<(), EvalError> {
        let ty = resolve_opt(env, ty)?;
        let zero = || ty.as_ref().map_or(Value::Nil, Type::zero);
        let values = if values.is_empty() {
            names.iter().map(|_| zero()).collect()
        } else {
            self.eval_values(env, values, names.len())?
        };
        let mutability = if mutable {
            Mutability::Mutable
        } else {
            Mutability::Immutable
        };
        for (name, value) in names.iter().zip(values) {
            let value = if value.is_invalid() && self.mode().is_validating() {
                zero()
            } else {
                value
            };
            env.define_with(name, value, ty.clone(), mutability)?;
        }
        Ok(())
    }

    /// `a, b = x, y`. Right-hand sides are evaluated before any target is
    /// written.
    pub(super) fn assign(&self, env: &Environment, targets: &[Expr], values: &[Expr]) -> Result<(), EvalError> {
        let values = self.eval_values(env, values, targets.len())?;
        for (target, value) in targets.iter().zip(values) {
            self.assign_to(env, target, value)?;
        }
        Ok(())
    }

    /// Evaluate right-hand sides for `count` targets. A single right-hand
    /// side may produce several values: the comma-ok forms `m[k]` and `<-ch`,
    /// or a call returning multiple results.
    pub(super) fn eval_values(&self, env: &Environment, exprs: &[Expr], count: usize) -> Result<Vec<Value>, EvalError> {
        if exprs.len() == count {
            return exprs.iter().map(|e| self.eval_expr(env, e)).collect();
        }
        match exprs {
            [single] if count > 1 => self.eval_multi(env, single, count),
            _ => Err(EvalError::new(format!(
                "assignment mismatch: {count} variables but {} values",
                exprs.len()
            ))),
        }
    }

    fn eval_multi(&self, env: &Environment, expr: &Expr, count: usize) -> Result<Vec<Value>, EvalError> {
        let mismatch = || {
            EvalError::new(format!("assignment mismatch: {count} variables but 1 value")).at(expr.pos)
        };
        if count == 2 {
            match &expr.kind {
                ExprKind::Index { expr: base, index } => {
                    self.ctx.step().map_err(|e| e.rewrap(expr.pos))?;
                    let base = self.eval_expr(env, base)?;
                    let index = self.eval_expr(env, index)?;
                    if let Value::Map(m) = &base {
                        let key = map_key(m, index).at(expr.pos)?;
                        let found = self.ctx.with_map_lock(|| m.get(&key));
                        let ok = found.is_some();
                        let value = found.unwrap_or_else(|| m.value_type().zero());
                        return Ok(vec![value, Value::Bool(ok)]);
                    }
                    let value = self.index_value(&base, index).at(expr.pos)?;
                    return Ok(vec![value, Value::Bool(true)]);
                }
                ExprKind::Recv(chan) => {
                    self.ctx.step().map_err(|e| e.rewrap(expr.pos))?;
                    let chan = self.eval_expr(env, chan)?;
                    let (value, ok) = self.receive(&chan).at(expr.pos)?;
                    return Ok(vec![value, Value::Bool(ok)]);
                }
                _ => {}
            }
        }
        match self.eval_expr(env, expr)? {
            Value::Slice(s) if s.len() == count => Ok(s.to_vec()),
            Value::Invalid if self.mode().is_validating() => Ok(vec![Value::Invalid; count]),
            _ => Err(mismatch()),
        }
    }

    /// Store `value` into the place named by `target`.
    pub(super) fn assign_to(&self, env: &Environment, target: &Expr, value: Value) -> Result<(), EvalError> {
        match &target.kind {
            ExprKind::Ident(name) => self.assign_name(env, name, value).at(target.pos),
            ExprKind::Paren(inner) => self.assign_to(env, inner, value),
            ExprKind::Member { expr: base, name } => {
                let base_value = self.eval_expr(env, base)?;
                self.assign_member(env, base, base_value, name, value).at(target.pos)
            }
            ExprKind::Index { expr: base, index } => {
                let base_value = self.eval_expr(env, base)?;
                let index = self.eval_expr(env, index)?;
                self.assign_index(env, base, base_value, index, value).at(target.pos)
            }
            ExprKind::Slice { expr: base, begin, end } => {
                let base_value = self.eval_expr(env, base)?;
                let begin = self.eval_opt(env, begin.as_deref())?;
                let end = self.eval_opt(env, end.as_deref())?;
                self.assign_slice(env, base, base_value, begin.as_ref(), end.as_ref(), value)
                    .at(target.pos)
            }
            ExprKind::Deref(inner) => match self.eval_expr(env, inner)? {
                Value::Ptr(ptr) => {
                    if self.mode().writes_aggregates() {
                        ptr.store(value).map_err(|_| nil_dereference().at(target.pos))?;
                    }
                    Ok(())
                }
                Value::Invalid if self.mode().is_validating() => Ok(()),
                _ => Err(nil_dereference().at(target.pos)),
            },
            _ => Err(EvalError::new("cannot assign to this expression").at(target.pos)),
        }
    }

    fn assign_name(&self, env: &Environment, name: &str, value: Value) -> Result<(), EvalError> {
        if let Some((path, member)) = name.rsplit_once('.') {
            return match self.lookup_path(env, path)? {
                Value::Env(module) => store_in_module(&module, member, value),
                other => Err(no_support_member_op(other.kind_name())),
            };
        }
        if !env.has(name) {
            return Ok(env.define_value(name, value)?);
        }
        if value.is_invalid() && self.mode().is_validating() {
            return Ok(());
        }
        Ok(env.set_value(name, value)?)
    }

    fn assign_member(
        &self,
        env: &Environment,
        base: &Expr,
        base_value: Value,
        name: &str,
        value: Value,
    ) -> Result<(), EvalError> {
        match base_value {
            Value::Env(module) => store_in_module(&module, name, value),
            Value::Map(m) => self.store_map(&m, Value::string(name), value),
            Value::Nil if base.is_assignable() => {
                let m = MapValue::new(Type::String, Type::Any);
                self.store_map(&m, Value::string(name), value)?;
                self.assign_to(env, base, Value::Map(m))
            }
            Value::Struct(mut s) => {
                let index = s
                    .struct_type()
                    .field_index(name)
                    .ok_or_else(|| no_such_member(name, &s.ty().to_string()))?;
                let field_ty = s.struct_type().field_type(index).cloned().unwrap_or(Type::Any);
                let value = convert(value, &field_ty)?;
                if let Some(slot) = s.field_mut(index) {
                    *slot = value;
                }
                self.assign_to(env, base, Value::Struct(s))
            }
            Value::Ptr(ptr) => match ptr.load().map_err(|_| nil_dereference())? {
                Value::Struct(s) => {
                    let index = s
                        .struct_type()
                        .field_index(name)
                        .ok_or_else(|| no_such_member(name, &s.ty().to_string()))?;
                    let field_ty = s.struct_type().field_type(index).cloned().unwrap_or(Type::Any);
                    let value = convert(value, &field_ty)?;
                    if self.mode().writes_aggregates() {
                        ptr.field(index).store(value).map_err(|_| nil_dereference())?;
                    }
                    Ok(())
                }
                Value::Map(m) => self.store_map(&m, Value::string(name), value),
                Value::Nil | Value::Invalid => Err(nil_dereference()),
                other => Err(no_support_member_op(other.kind_name())),
            },
            Value::Invalid if self.mode().is_validating() => Ok(()),
            Value::Nil | Value::Invalid => Err(nil_dereference()),
            other => Err(no_support_member_op(other.kind_name())),
        }
    }

    fn assign_index(
        &self,
        env: &Environment,
        base: &Expr,
        base_value: Value,
        index: Value,
        value: Value,
    ) -> Result<(), EvalError> {
        match base_value {
            Value::Slice(s) => self.store_index(&s, &index, value),
            Value::Map(m) => self.store_map(&m, index, value),
            Value::Nil if base.is_assignable() => {
                let m = MapValue::new(Type::Any, Type::Any);
                self.store_map(&m, index, value)?;
                self.assign_to(env, base, Value::Map(m))
            }
            Value::Str(s) => {
                let updated = replace_chars(&s, &index, &value)?;
                self.assign_to(env, base, Value::string(updated))
            }
            Value::Ptr(ptr) => match ptr.load().map_err(|_| nil_dereference())? {
                Value::Slice(s) => self.store_index(&s, &index, value),
                Value::Map(m) => self.store_map(&m, index, value),
                Value::Str(s) => {
                    let updated = replace_chars(&s, &index, &value)?;
                    if self.mode().writes_aggregates() {
                        ptr.store(Value::string(updated)).map_err(|_| nil_dereference())?;
                    }
                    Ok(())
                }
                other => Err(cannot_index(other.kind_name(), &index.type_name())),
            },
            Value::Env(module) => match index {
                Value::Str(name) => store_in_module(&module, &name, value),
                other => Err(cannot_index("env", &other.type_name())),
            },
            Value::Invalid if self.mode().is_validating() => Ok(()),
            other => Err(cannot_index(other.kind_name(), &index.type_name())),
        }
    }

    /// `base[begin:end] = value`: the range is replaced in place by the
    /// elements of `value` (or by `value` itself when it is not a slice).
    fn assign_slice(
        &self,
        env: &Environment,
        base: &Expr,
        base_value: Value,
        begin: Option<&Value>,
        end: Option<&Value>,
        value: Value,
    ) -> Result<(), EvalError> {
        match base_value {
            Value::Slice(s) => {
                let (b, e) = slice_bounds(begin, end, s.len())?;
                let items = match value {
                    Value::Slice(src) => src.to_vec(),
                    other => vec![other],
                };
                let items = items
                    .into_iter()
                    .map(|item| convert(item, s.elem()))
                    .collect::<Result<Vec<_>, _>>()?;
                if self.mode().writes_aggregates() && !s.splice(b, e, items) {
                    return Err(EvalError::new(format!(
                        "cannot resize {} by slice assignment",
                        s.ty()
                    )));
                }
                Ok(())
            }
            Value::Str(s) => {
                let (b, e) = slice_bounds(begin, end, s.chars().count())?;
                let mut updated: String = s.chars().take(b).collect();
                updated.push_str(&value.to_string());
                updated.extend(s.chars().skip(e));
                self.assign_to(env, base, Value::string(updated))
            }
            Value::Invalid if self.mode().is_validating() => Ok(()),
            other => Err(no_support_member_op(other.kind_name())),
        }
    }

    /// Set `s[index]`, appending when `index` equals the length.
    fn store_index(&self, s: &SliceValue, index: &Value, value: Value) -> Result<(), EvalError> {
        let value = convert(value, s.elem())?;
        let n = match index {
            Value::Int(n) => *n,
            other => return Err(cannot_index(s.ty().kind_name(), &other.type_name())),
        };
        let len = s.len();
        let Ok(i) = usize::try_from(n) else {
            return Err(index_out_of_range(n, len));
        };
        if !self.mode().writes_aggregates() {
            return if i < len || (i == len && !s.is_array()) {
                Ok(())
            } else {
                Err(index_out_of_range(n, len))
            };
        }
        let stored = if i < len {
            s.set(i, value)
        } else if i == len {
            s.push(value)
        } else {
            false
        };
        if stored {
            Ok(())
        } else {
            Err(index_out_of_range(n, len))
        }
    }

    fn store_map(&self, m: &MapValue, key: Value, value: Value) -> Result<(), EvalError> {
        let key = map_key(m, key)?;
        let value = convert(value, m.value_type())?;
        if self.mode().writes_aggregates() {
            self.ctx.with_map_lock(|| m.insert(key, value));
        }
        Ok(())
    }
}

fn store_in_module(module: &Environment, name: &str, value: Value) -> Result<(), EvalError> {
    if module.has_local(name) {
        Ok(module.set_value(name, value)?)
    } else {
        Ok(module.define_value(name, value)?)
    }
}

/// Copy of `s` with the character at `index` replaced by the display form
/// of `value`; an index equal to the length appends.
fn replace_chars(s: &str, index: &Value, value: &Value) -> Result<String, EvalError> {
    let len = s.chars().count();
    let n = match index {
        Value::Int(n) => *n,
        other => return Err(cannot_index("string", &other.type_name())),
    };
    let i = usize::try_from(n)
        .ok()
        .filter(|i| *i <= len)
        .ok_or_else(|| index_out_of_range(n, len))?;
    let mut out: String = s.chars().take(i).collect();
    out.push_str(&value.to_string());
    out.extend(s.chars().skip(i + 1));
    Ok(out)
}
