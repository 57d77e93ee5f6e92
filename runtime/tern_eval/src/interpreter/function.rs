//! Script function bodies.
//!
//! A function literal evaluates to a [`Function`] whose body is a
//! [`ScriptFunction`]: the shared declaration, the scope it closed over, and
//! the parameter and result types resolved when the literal was evaluated.
//! Argument marshalling has already happened by the time `invoke` runs, so
//! the body only binds, evaluates, runs deferred calls and checks results.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use smallvec::SmallVec;
use tern_ir::FuncDecl;
use tern_stack::ensure_sufficient_stack;
use tern_value::errors::{host_panic, return_mismatch, unexpected_signal};
use tern_value::value::debug_escape;
use tern_value::{
    convert, Environment, EvalError, EvalResult, FuncType, Mutability, ScriptBody, Type, Value,
};

use super::scope_guard::ScopeGuard;
use super::types::resolve_opt;
use super::{Flow, Interpreter};

/// Body of a function literal.
pub struct ScriptFunction {
    /// Run that evaluated the literal; used when no run is active on the
    /// calling thread.
    interp: Interpreter,
    decl: Arc<FuncDecl>,
    closure: Environment,
    /// Declared parameter types; the variadic one is already a slice type.
    params: SmallVec<[Option<Type>; 4]>,
    returns: Option<Vec<Type>>,
}

impl ScriptFunction {
    /// Resolve the declaration's types in `closure`.
    pub(super) fn new(
        interp: Interpreter,
        decl: Arc<FuncDecl>,
        closure: Environment,
    ) -> Result<Self, EvalError> {
        let last = decl.params.len().saturating_sub(1);
        let mut params = SmallVec::with_capacity(decl.params.len());
        for (i, param) in decl.params.iter().enumerate() {
            let ty = resolve_opt(&closure, param.ty.as_ref())?;
            params.push(if decl.variadic && i == last {
                Some(Type::slice(ty.unwrap_or(Type::Any)))
            } else {
                ty
            });
        }
        let returns = match &decl.returns {
            Some(types) => Some(
                types
                    .iter()
                    .map(|ty| super::resolve_type(&closure, ty))
                    .collect::<Result<Vec<_>, _>>()?,
            ),
            None => None,
        };
        Ok(ScriptFunction {
            interp,
            decl,
            closure,
            params,
            returns,
        })
    }

    pub fn name(&self) -> &str {
        self.decl.display_name()
    }

    /// Signature seen by callers.
    pub fn func_type(&self) -> FuncType {
        FuncType::new(
            self.params
                .iter()
                .map(|ty| ty.clone().unwrap_or(Type::Any))
                .collect(),
            self.decl.variadic,
            self.returns.clone(),
        )
    }

    /// Identity of the declaration; every closure over it shares it.
    pub fn decl_id(&self) -> usize {
        Arc::as_ptr(&self.decl) as usize
    }

    fn bind_params(&self, scope: &Environment, args: Vec<Value>) -> Result<(), EvalError> {
        for ((param, ty), arg) in self.decl.params.iter().zip(&self.params).zip(args) {
            let mutability = if param.mutable {
                Mutability::Mutable
            } else {
                Mutability::Immutable
            };
            scope.define_with(&param.name, arg, ty.clone(), mutability)?;
        }
        Ok(())
    }

    fn run(&self, interp: &Interpreter, args: Vec<Value>) -> EvalResult {
        tracing::trace!(function = self.name(), args = args.len(), "call");
        let scope = ScopeGuard::function(&self.closure);
        self.bind_params(&scope, args)?;
        let outcome = ensure_sufficient_stack(|| interp.eval_stmts(&scope, &self.decl.body));
        let deferred = interp.run_defers(&scope);
        let value = match outcome? {
            Flow::Return(value) => value,
            Flow::Normal(_) => Value::Invalid,
            Flow::Break => return Err(unexpected_signal("break")),
            Flow::Continue => return Err(unexpected_signal("continue")),
        };
        deferred?;
        self.check_returns(value)
    }

    /// Validate returned values against the declared result types.
    fn check_returns(&self, value: Value) -> EvalResult {
        let Some(types) = &self.returns else {
            return Ok(value);
        };
        let name = self.name();
        match types.as_slice() {
            [] if value.is_invalid() => Ok(value),
            [] => Err(return_mismatch(name, "function declares no results")),
            [single] => convert(value, single).map_err(|e| return_mismatch(name, e.to_string())),
            many => {
                let Value::Slice(values) = &value else {
                    return Err(return_mismatch(
                        name,
                        format!("expected {} results", many.len()),
                    ));
                };
                let values = values.to_vec();
                if values.len() != many.len() {
                    return Err(return_mismatch(
                        name,
                        format!("expected {} results, got {}", many.len(), values.len()),
                    ));
                }
                let converted = values
                    .into_iter()
                    .zip(many)
                    .map(|(v, ty)| convert(v, ty).map_err(|e| return_mismatch(name, e.to_string())))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Value::slice(converted, Type::Any))
            }
        }
    }

    /// Validate the body once with every parameter bound to its zero value
    /// (unknown for untyped ones).
    pub(crate) fn validate_body(&self, interp: &Interpreter) -> Result<(), EvalError> {
        let scope = ScopeGuard::function(&self.closure);
        let zeros = self
            .params
            .iter()
            .map(|ty| ty.as_ref().map_or(Value::Invalid, Type::zero))
            .collect();
        self.bind_params(&scope, zeros)?;
        interp.eval_stmts(&scope, &self.decl.body)?;
        Ok(())
    }
}

impl ScriptBody for ScriptFunction {
    fn invoke(&self, args: Vec<Value>) -> EvalResult {
        let interp = Interpreter::active().unwrap_or_else(|| self.interp.clone());
        if debug_escape() {
            return self.run(&interp, args);
        }
        match panic::catch_unwind(AssertUnwindSafe(|| self.run(&interp, args))) {
            Ok(result) => result,
            Err(payload) => {
                let message = payload
                    .downcast_ref::<&str>()
                    .map(ToString::to_string)
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                Err(host_panic(self.name(), message))
            }
        }
    }

    fn closure(&self) -> Option<&Environment> {
        Some(&self.closure)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
