//! Calls, function literals, deferred calls and spawned tasks.

use std::sync::Arc;
use std::thread;

use tern_ir::{Expr, ExprKind, FuncDecl, Position};
use tern_stack::ensure_sufficient_stack;
use tern_value::errors::{not_callable, undefined_symbol};
use tern_value::value::marshal_args;
use tern_value::{
    convert, DeferredCall, Environment, EvalError, EvalResult, FuncType, Function, ResultExt,
    ScriptBody, Type, Value,
};

use super::function::ScriptFunction;
use super::types::zero_results;
use super::Interpreter;

/// A call with its callee and arguments evaluated.
pub(super) struct PreparedCall {
    pub callee: Value,
    pub args: Vec<Value>,
    pub spread: bool,
}

impl Interpreter {
    /// Evaluate a function literal. Named literals also bind themselves in
    /// the current scope.
    pub(super) fn eval_func_literal(&self, env: &Environment, decl: &Arc<FuncDecl>) -> EvalResult {
        let body = Arc::new(ScriptFunction::new(self.clone(), Arc::clone(decl), env.clone())?);
        let script: Arc<dyn ScriptBody> = body.clone();
        let func = Function::script(decl.display_name(), body.func_type(), script);
        if self.mode().is_validating() {
            self.ctx.validation().enqueue(body);
        }
        let value = Value::Func(func);
        if let Some(name) = &decl.name {
            env.define_value(name, value.clone())?;
        }
        Ok(value)
    }

    /// Look up a possibly dotted name (`pkg.fn`) through module scopes. A
    /// name with no value binding may still name a type.
    pub(super) fn lookup_path(&self, env: &Environment, path: &str) -> EvalResult {
        let mut parts = path.split('.');
        let first = parts.next().unwrap_or(path);
        let mut value = match env.get_value(first) {
            Ok(value) => value,
            Err(err) => {
                return match Type::builtin(path).map_or_else(|| env.get_type(path), Ok) {
                    Ok(ty) => Ok(Value::Type(ty)),
                    Err(_) => Err(err.into()),
                };
            }
        };
        for part in parts {
            value = match &value {
                Value::Env(module) => module.get_value(part)?,
                _ => return Err(undefined_symbol(path)),
            };
        }
        Ok(value)
    }

    /// Evaluate the callee and arguments of a call expression.
    pub(super) fn prepare_call(&self, env: &Environment, expr: &Expr) -> Result<PreparedCall, EvalError> {
        let (callee, args, spread) = match &expr.kind {
            ExprKind::Call { name, args, spread } => (self.lookup_path(env, name).at(expr.pos)?, args, *spread),
            ExprKind::AnonCall {
                callee,
                args,
                spread,
            } => (self.eval_expr(env, callee)?, args, *spread),
            ExprKind::Paren(inner) => return self.prepare_call(env, inner),
            _ => {
                return Err(EvalError::new("expression is not a function call").at(expr.pos));
            }
        };
        let args = self.eval_args(env, args)?;
        Ok(PreparedCall {
            callee,
            args,
            spread,
        })
    }

    fn eval_args(&self, env: &Environment, args: &[Expr]) -> Result<Vec<Value>, EvalError> {
        let mut values = Vec::with_capacity(args.len());
        for arg in args {
            values.push(self.eval_expr(env, arg)?);
        }
        Ok(values)
    }

    /// Evaluate and perform a call expression.
    pub(super) fn eval_call(&self, env: &Environment, expr: &Expr) -> EvalResult {
        let call = self.prepare_call(env, expr)?;
        self.apply(call, expr.pos)
    }

    /// Perform a prepared call.
    ///
    /// A type in callee position converts its single argument. In
    /// validation mode the arguments are still marshalled, but no body runs:
    /// the declared results' zero values stand in for the result.
    pub(super) fn apply(&self, call: PreparedCall, pos: Position) -> EvalResult {
        let PreparedCall {
            callee,
            args,
            spread,
        } = call;
        match callee {
            Value::Func(func) => self.call_function(&func, args, spread).map_err(|e| e.rewrap(pos)),
            Value::Type(ty) => match <[Value; 1]>::try_from(args) {
                Ok([arg]) => convert(arg, &ty).at(pos),
                Err(args) => Err(EvalError::new(format!(
                    "conversion to {ty} takes 1 argument, got {}",
                    args.len()
                ))
                .at(pos)),
            },
            Value::Invalid if self.mode().is_validating() => Ok(Value::Invalid),
            other => Err(not_callable(other.kind_name()).at(pos)),
        }
    }

    pub(super) fn call_function(&self, func: &Function, args: Vec<Value>, spread: bool) -> EvalResult {
        if self.mode().invokes_host() {
            return ensure_sufficient_stack(|| func.call_with(args, spread));
        }
        self.ctx.validation().record_call(func.id());
        marshal_args(func.name(), func.ty(), fill_unknown(func.ty(), args), spread)?;
        Ok(zero_results(func.ty().returns.as_deref()))
    }

    /// `defer call`: evaluate now, run when the enclosing function exits.
    pub(super) fn defer_call(&self, env: &Environment, expr: &Expr) -> Result<(), EvalError> {
        let PreparedCall {
            callee,
            args,
            spread,
        } = self.prepare_call(env, expr)?;
        let func = match callee {
            Value::Func(func) => func,
            Value::Invalid if self.mode().is_validating() => return Ok(()),
            other => return Err(not_callable(other.kind_name()).at(expr.pos)),
        };
        if !self.mode().performs_effects() {
            self.ctx.validation().record_call(func.id());
            return Ok(());
        }
        env.push_defer(DeferredCall {
            func,
            args,
            spread,
            pos: expr.pos,
        });
        Ok(())
    }

    /// Run the deferred calls of `scope`, last registered first. Every call
    /// runs; the first failure is reported.
    pub(super) fn run_defers(&self, scope: &Environment) -> Result<(), EvalError> {
        let mut first_error = None;
        for call in scope.take_defers() {
            let result = self
                .call_function(&call.func, call.args, call.spread)
                .map_err(|e| e.rewrap(call.pos));
            if let Err(err) = result {
                first_error.get_or_insert(err);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// `go call`: evaluate the callee and arguments now, run the call on a
    /// new thread. Failures go to the run's task-error channel.
    pub(super) fn spawn_call(&self, env: &Environment, expr: &Expr) -> Result<(), EvalError> {
        let PreparedCall {
            callee,
            args,
            spread,
        } = self.prepare_call(env, expr)?;
        let func = match callee {
            Value::Func(func) => func,
            Value::Invalid if self.mode().is_validating() => return Ok(()),
            other => return Err(not_callable(other.kind_name()).at(expr.pos)),
        };
        if !self.mode().performs_effects() {
            self.ctx.validation().record_call(func.id());
            return Ok(());
        }
        let interp = self.clone();
        let pos = expr.pos;
        thread::Builder::new()
            .name(format!("tern-task-{}", func.name()))
            .spawn(move || {
                let _active = interp.activate();
                let result = ensure_sufficient_stack(|| func.call_with(args, spread));
                match result {
                    Ok(_) => {}
                    Err(err) if err.is_cancelled() => {}
                    Err(err) => interp.ctx.report_task_error(err.rewrap(pos)),
                }
            })
            .map_err(|e| EvalError::new(format!("failed to spawn task: {e}")).at(pos))?;
        Ok(())
    }
}

/// Replace unknown (`Invalid`) arguments with the zero value of the
/// parameter they land on, so validation checks shapes without tripping
/// over values it could not compute.
fn fill_unknown(ty: &FuncType, args: Vec<Value>) -> Vec<Value> {
    let fixed = if ty.variadic {
        ty.params.len().saturating_sub(1)
    } else {
        ty.params.len()
    };
    args.into_iter()
        .enumerate()
        .map(|(i, arg)| {
            if !arg.is_invalid() {
                return arg;
            }
            let param = if i < fixed {
                ty.params.get(i)
            } else {
                ty.variadic_elem()
            };
            param.map_or(Value::Nil, Type::zero)
        })
        .collect()
}
