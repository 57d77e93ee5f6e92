//! Expression evaluation.

use std::collections::BTreeMap;
use std::sync::Arc;

use tern_ir::{BinaryOp, Expr, ExprKind, Literal, TypeExpr};
use tern_stack::ensure_sufficient_stack;
use tern_value::errors::{
    cannot_index, index_out_of_range, invalid_map_key, invalid_number, nil_dereference,
    no_such_member, no_support_member_op,
};
use tern_value::{
    convert, Environment, EvalError, EvalResult, MapKey, MapValue, Pointer, ResultExt, StructType,
    StructValue, Type, Value,
};

use super::{resolve_type, Interpreter};
use crate::operators::evaluate_binary;
use crate::unary_operators::evaluate_unary;

/// Parse numeric literal text. Hex is recognized before the float check,
/// so `0x1e` is an integer; `e` and `E` both mark an exponent.
pub(crate) fn parse_number(text: &str) -> EvalResult {
    let (negative, digits) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text),
    };
    if let Some(hex) = digits
        .strip_prefix("0x")
        .or_else(|| digits.strip_prefix("0X"))
    {
        let n = i64::from_str_radix(hex, 16).map_err(|_| invalid_number(text))?;
        return Ok(Value::Int(if negative { n.wrapping_neg() } else { n }));
    }
    if text.contains(['.', 'e', 'E']) {
        return text
            .parse::<f64>()
            .map(Value::Float)
            .map_err(|_| invalid_number(text));
    }
    text.parse::<i64>()
        .map(Value::Int)
        .map_err(|_| invalid_number(text))
}

/// Checked conversion of a script index.
pub(super) fn to_index(index: &Value, len: usize) -> Result<usize, EvalError> {
    let n = match index {
        Value::Int(n) => *n,
        #[allow(clippy::cast_possible_truncation)]
        Value::Float(f) if f.fract() == 0.0 => *f as i64,
        other => return Err(cannot_index("sequence", &other.type_name())),
    };
    usize::try_from(n)
        .ok()
        .filter(|i| *i < len)
        .ok_or_else(|| index_out_of_range(n, len))
}

/// Convert a value to a key of `map`.
pub(super) fn map_key(map: &MapValue, key: Value) -> Result<MapKey, EvalError> {
    let kind = key.type_name();
    let key = convert(key, map.key_type())?;
    MapKey::from_value(&key).ok_or_else(|| invalid_map_key(&kind))
}

impl Interpreter {
    /// Evaluate an expression: pass the cycle gate, then dispatch.
    pub fn eval_expr(&self, env: &Environment, expr: &Expr) -> EvalResult {
        self.ctx.step().map_err(|e| e.rewrap(expr.pos))?;
        ensure_sufficient_stack(|| self.exec_expr(env, expr)).map_err(|e| e.rewrap(expr.pos))
    }

    fn exec_expr(&self, env: &Environment, expr: &Expr) -> EvalResult {
        match &expr.kind {
            ExprKind::Literal(lit) => Ok(match lit {
                Literal::Number(text) => parse_number(text)?,
                Literal::Str(s) => Value::string(s.as_str()),
                Literal::Bool(b) => Value::Bool(*b),
                Literal::Nil => Value::Nil,
            }),
            ExprKind::Ident(name) => self.lookup_path(env, name),
            ExprKind::Paren(inner) => self.eval_expr(env, inner),
            ExprKind::Unary { op, expr: operand } => {
                let value = self.eval_expr(env, operand)?;
                if value.is_invalid() && self.mode().is_validating() {
                    return Ok(Value::Invalid);
                }
                evaluate_unary(&value, *op)
            }
            ExprKind::Addr(target) => self.addr_of(env, target).map(Value::Ptr),
            ExprKind::Deref(target) => match self.eval_expr(env, target)? {
                Value::Ptr(ptr) => ptr.load().map_err(|_| nil_dereference()),
                Value::Invalid if self.mode().is_validating() => Ok(Value::Invalid),
                Value::Invalid | Value::Nil => Err(nil_dereference()),
                other => Err(EvalError::new(format!(
                    "invalid indirect of {}",
                    other.type_name()
                ))),
            },
            ExprKind::Binary { op, lhs, rhs } => self.eval_binary(env, *op, lhs, rhs),
            ExprKind::Ternary {
                cond,
                then,
                otherwise,
            } => {
                let cond = self.eval_expr(env, cond)?;
                if self.mode().visits_all_branches() {
                    let then = self.eval_expr(env, then)?;
                    self.eval_expr(env, otherwise)?;
                    return Ok(then);
                }
                if cond.truthy() {
                    self.eval_expr(env, then)
                } else {
                    self.eval_expr(env, otherwise)
                }
            }
            ExprKind::Member { expr: base, name } => self.eval_member(env, base, name),
            ExprKind::Index { expr: base, index } => {
                let base = self.eval_expr(env, base)?;
                let index = self.eval_expr(env, index)?;
                self.index_value(&base, index)
            }
            ExprKind::Slice { expr: base, begin, end } => {
                let base = self.eval_expr(env, base)?;
                let begin = self.eval_opt(env, begin.as_deref())?;
                let end = self.eval_opt(env, end.as_deref())?;
                self.slice_value(&base, begin.as_ref(), end.as_ref())
            }
            ExprKind::Array { ty, elems } => self.eval_array(env, ty.as_ref(), elems),
            ExprKind::Map { ty, entries } => self.eval_map(env, ty.as_ref(), entries),
            ExprKind::Struct { ty, fields } => self.eval_struct(env, ty.as_ref(), fields),
            ExprKind::Func(decl) => self.eval_func_literal(env, decl),
            ExprKind::Call { .. } | ExprKind::AnonCall { .. } => self.eval_call(env, expr),
            ExprKind::OpAssign { target, op, value } => {
                let current = self.eval_expr(env, target)?;
                let rhs = self.eval_expr(env, value)?;
                let updated = self.binary_values(*op, current, rhs)?;
                self.assign_to(env, target, updated.clone())?;
                Ok(updated)
            }
            ExprKind::Len(target) => {
                let value = self.eval_expr(env, target)?;
                self.len_of(&value)
            }
            ExprKind::Include { item, list } => {
                let item = self.eval_expr(env, item)?;
                let list = self.eval_expr(env, list)?;
                self.includes(&item, &list)
            }
            ExprKind::Make { ty, len, cap } => {
                let ty = resolve_type(env, ty)?;
                let len = self.eval_opt(env, len.as_deref())?;
                let cap = self.eval_opt(env, cap.as_deref())?;
                self.make(&ty, len.as_ref(), cap.as_ref())
            }
            ExprKind::Recv(chan) => {
                let chan = self.eval_expr(env, chan)?;
                self.receive(&chan).map(|(value, _)| value)
            }
            ExprKind::Delete { target, key } => {
                let target = self.eval_expr(env, target)?;
                let key = self.eval_opt(env, key.as_deref())?;
                self.delete(env, &target, key.as_ref())?;
                Ok(Value::Invalid)
            }
        }
    }

    pub(super) fn eval_opt(&self, env: &Environment, expr: Option<&Expr>) -> Result<Option<Value>, EvalError> {
        expr.map(|e| self.eval_expr(env, e)).transpose()
    }

    /// `&&` and `||` short-circuit on the left operand, `??` evaluates its
    /// right operand only for a nil left one.
    fn eval_binary(&self, env: &Environment, op: BinaryOp, lhs: &Expr, rhs: &Expr) -> EvalResult {
        let left = self.eval_expr(env, lhs)?;
        if op.short_circuits() && !self.mode().visits_all_branches() {
            match op {
                BinaryOp::And if !left.truthy() => return Ok(Value::Bool(false)),
                BinaryOp::Or if left.truthy() => return Ok(Value::Bool(true)),
                BinaryOp::Coalesce if !left.is_nil() => return Ok(left),
                _ => {}
            }
        }
        let right = self.eval_expr(env, rhs)?;
        self.binary_values(op, left, right)
    }

    /// Apply a binary operator. During validation an unknown operand makes
    /// the result unknown.
    pub(super) fn binary_values(&self, op: BinaryOp, left: Value, right: Value) -> EvalResult {
        if self.mode().is_validating() && (left.is_invalid() || right.is_invalid()) {
            return Ok(Value::Invalid);
        }
        evaluate_binary(left, right, op)
    }

    /// Address of an expression. Places (variables, struct fields, slice
    /// elements) yield pointers into their storage; other values are boxed
    /// into a fresh cell.
    pub(super) fn addr_of(&self, env: &Environment, target: &Expr) -> Result<Pointer, EvalError> {
        match &target.kind {
            ExprKind::Ident(name) if !name.contains('.') => env.addr(name).at(target.pos),
            ExprKind::Paren(inner) => self.addr_of(env, inner),
            ExprKind::Deref(inner) => match self.eval_expr(env, inner)? {
                Value::Ptr(ptr) => Ok(ptr),
                _ => Err(nil_dereference().at(target.pos)),
            },
            ExprKind::Member { expr: base, name } => {
                let holder = if base.is_assignable() {
                    self.addr_of(env, base)?
                } else {
                    Pointer::new(self.eval_expr(env, base)?)
                };
                // Fields are reached through one level of pointer.
                let holder = match holder.load().map_err(|_| nil_dereference())? {
                    Value::Ptr(inner) => inner,
                    _ => holder,
                };
                match holder.load().map_err(|_| nil_dereference())? {
                    Value::Struct(s) => match s.struct_type().field_index(name) {
                        Some(i) => Ok(holder.field(i)),
                        None => Err(no_such_member(name, &s.ty().to_string()).at(target.pos)),
                    },
                    other => Ok(Pointer::new(self.member_value(&other, name)?)),
                }
            }
            ExprKind::Index { expr: base, index } => {
                let base_value = self.eval_expr(env, base)?;
                let index = self.eval_expr(env, index)?;
                match base_value {
                    Value::Slice(s) => {
                        let i = to_index(&index, s.len()).at(target.pos)?;
                        Ok(Pointer::elem(s, i))
                    }
                    other => Ok(Pointer::new(self.index_value(&other, index)?)),
                }
            }
            _ => Ok(Pointer::new(self.eval_expr(env, target)?)),
        }
    }

    fn eval_member(&self, env: &Environment, base: &Expr, name: &str) -> EvalResult {
        let value = self.eval_expr(env, base)?;
        if let Some(bound) = self.bound_method(env, base, &value, name)? {
            return Ok(bound);
        }
        self.member_value(&value, name)
    }

    /// Method `name` of a struct (or pointer to struct) value, bound to its
    /// receiver. Pointer-receiver methods on a plain struct take the
    /// address of the place it came from, or of a copy when it has none.
    fn bound_method(
        &self,
        env: &Environment,
        base: &Expr,
        value: &Value,
        name: &str,
    ) -> Result<Option<Value>, EvalError> {
        let (st, is_ptr) = match value {
            Value::Struct(s) => (Arc::clone(s.struct_type()), false),
            Value::Ptr(p) => match p.load() {
                Ok(Value::Struct(s)) => (Arc::clone(s.struct_type()), true),
                _ => return Ok(None),
            },
            _ => return Ok(None),
        };
        let Some(method) = st.method(name) else {
            return Ok(None);
        };
        let receiver = match (method.pointer_receiver, is_ptr) {
            (true, true) => value.clone(),
            (true, false) if base.is_assignable() => Value::Ptr(self.addr_of(env, base)?),
            (true, false) => Value::Ptr(Pointer::new(value.clone())),
            (false, true) => match value {
                Value::Ptr(p) => p.load().map_err(|_| nil_dereference())?,
                _ => value.clone(),
            },
            (false, false) => value.clone(),
        };
        Ok(Some(Value::Func(method.func.bind(receiver))))
    }

    /// Field, module member or map entry `name` of `value`.
    pub(super) fn member_value(&self, value: &Value, name: &str) -> EvalResult {
        match value {
            Value::Env(module) => Ok(module.get_value(name)?),
            Value::Struct(s) => s
                .field(name)
                .ok_or_else(|| no_such_member(name, &s.ty().to_string())),
            Value::Ptr(p) => {
                let target = p.load().map_err(|_| nil_dereference())?;
                if target.is_nil() {
                    return Err(nil_dereference());
                }
                self.member_value(&target, name)
            }
            Value::Map(m) => {
                let key = map_key(m, Value::string(name))?;
                Ok(self
                    .ctx
                    .with_map_lock(|| m.get(&key))
                    .unwrap_or_else(|| m.value_type().zero()))
            }
            Value::Invalid if self.mode().is_validating() => Ok(Value::Invalid),
            Value::Nil | Value::Invalid => Err(nil_dereference()),
            other => Err(no_support_member_op(other.kind_name())),
        }
    }

    /// `base[index]`. Missing map keys read as the value type's zero value;
    /// a nil map reads as empty.
    pub(super) fn index_value(&self, base: &Value, index: Value) -> EvalResult {
        match base {
            Value::Slice(s) => {
                let i = to_index(&index, s.len())?;
                s.get(i)
                    .ok_or_else(|| index_out_of_range(i64::try_from(i).unwrap_or(i64::MAX), s.len()))
            }
            Value::Str(s) => {
                let len = s.chars().count();
                let i = to_index(&index, len)?;
                Ok(s.chars().nth(i).map_or(Value::Invalid, |c| Value::string(c.to_string())))
            }
            Value::Map(m) => {
                let key = map_key(m, index)?;
                Ok(self
                    .ctx
                    .with_map_lock(|| m.get(&key))
                    .unwrap_or_else(|| m.value_type().zero()))
            }
            Value::Ptr(p) => {
                let target = p.load().map_err(|_| nil_dereference())?;
                self.index_value(&target, index)
            }
            Value::Env(module) => match index {
                Value::Str(name) => Ok(module.get_value(&name)?),
                other => Err(cannot_index("env", &other.type_name())),
            },
            Value::Nil => Ok(Value::Nil),
            Value::Invalid if self.mode().is_validating() => Ok(Value::Invalid),
            other => Err(cannot_index(other.kind_name(), &index.type_name())),
        }
    }

    /// `base[begin:end]`: always a copy.
    pub(super) fn slice_value(&self, base: &Value, begin: Option<&Value>, end: Option<&Value>) -> EvalResult {
        match base {
            Value::Slice(s) => {
                let (b, e) = slice_bounds(begin, end, s.len())?;
                s.sub(b, e)
                    .map(Value::Slice)
                    .ok_or_else(|| index_out_of_range(i64::try_from(e).unwrap_or(i64::MAX), s.len()))
            }
            Value::Str(s) => {
                let len = s.chars().count();
                let (b, e) = slice_bounds(begin, end, len)?;
                Ok(Value::string(s.chars().skip(b).take(e - b).collect::<String>()))
            }
            Value::Ptr(p) => {
                let target = p.load().map_err(|_| nil_dereference())?;
                self.slice_value(&target, begin, end)
            }
            Value::Invalid if self.mode().is_validating() => Ok(Value::Invalid),
            other => Err(no_support_member_op(other.kind_name())),
        }
    }

    fn eval_array(&self, env: &Environment, ty: Option<&TypeExpr>, elems: &[Expr]) -> EvalResult {
        let ty = match ty {
            Some(ty) => resolve_type(env, ty)?,
            None => Type::slice(Type::Any),
        };
        let mut items = Vec::with_capacity(elems.len());
        for elem in elems {
            items.push(self.eval_expr(env, elem)?);
        }
        if !matches!(ty, Type::Slice(_) | Type::Array(..)) {
            return Err(EvalError::new(format!("invalid array literal type {ty}")));
        }
        Ok(convert(Value::slice(items, Type::Any), &ty)?)
    }

    fn eval_map(&self, env: &Environment, ty: Option<&TypeExpr>, entries: &[(Expr, Expr)]) -> EvalResult {
        let (key_ty, value_ty) = match ty.map(|ty| resolve_type(env, ty)).transpose()? {
            Some(Type::Map(k, v)) => (Type::clone(&k), Type::clone(&v)),
            Some(other) => return Err(EvalError::new(format!("invalid map literal type {other}"))),
            None => (Type::Any, Type::Any),
        };
        let mut map = BTreeMap::new();
        for (key, value) in entries {
            let key_value = self.eval_expr(env, key)?;
            let kind = key_value.type_name();
            let key_value = convert(key_value, &key_ty).at(key.pos)?;
            let key = MapKey::from_value(&key_value).ok_or_else(|| invalid_map_key(&kind).at(key.pos))?;
            let value = convert(self.eval_expr(env, value)?, &value_ty).at(value.pos)?;
            map.insert(key, value);
        }
        Ok(Value::Map(MapValue::from_entries(key_ty, value_ty, map)))
    }

    fn eval_struct(
        &self,
        env: &Environment,
        ty: Option<&TypeExpr>,
        fields: &[(String, Expr)],
    ) -> EvalResult {
        let Some(ty) = ty else {
            let mut types = Vec::with_capacity(fields.len());
            let mut values = Vec::with_capacity(fields.len());
            for (name, expr) in fields {
                let value = self.eval_expr(env, expr)?;
                types.push((name.clone(), Type::Any));
                values.push(value);
            }
            let st = Arc::new(StructType::new(None, types));
            return Ok(Value::Struct(StructValue::new(st, values)));
        };
        let st = match resolve_type(env, ty)? {
            Type::Struct(st) => st,
            other => return Err(EvalError::new(format!("{other} is not a struct type"))),
        };
        let mut value = StructValue::zero(Arc::clone(&st));
        for (name, expr) in fields {
            let index = st
                .field_index(name)
                .ok_or_else(|| no_such_member(name, &Type::Struct(Arc::clone(&st)).to_string()).at(expr.pos))?;
            let field_ty = st.field_type(index).cloned().unwrap_or(Type::Any);
            let field_value = convert(self.eval_expr(env, expr)?, &field_ty).at(expr.pos)?;
            if let Some(slot) = value.field_mut(index) {
                *slot = field_value;
            }
        }
        Ok(Value::Struct(value))
    }
}

/// Resolve `[begin:end]` against `len`.
pub(super) fn slice_bounds(
    begin: Option<&Value>,
    end: Option<&Value>,
    len: usize,
) -> Result<(usize, usize), EvalError> {
    let bound = |v: Option<&Value>, default: usize| -> Result<usize, EvalError> {
        match v {
            None | Some(Value::Invalid | Value::Nil) => Ok(default),
            Some(Value::Int(n)) => usize::try_from(*n)
                .ok()
                .filter(|i| *i <= len)
                .ok_or_else(|| index_out_of_range(*n, len)),
            Some(other) => Err(cannot_index("sequence", &other.type_name())),
        }
    };
    let b = bound(begin, 0)?;
    let e = bound(end, len)?;
    if b > e {
        return Err(index_out_of_range(i64::try_from(b).unwrap_or(i64::MAX), e));
    }
    Ok((b, e))
}
