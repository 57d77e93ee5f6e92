//! Statements, blocks, loops and branches.

use std::ops::ControlFlow;

use tern_ir::{BinaryOp, Expr, Stmt, StmtKind, SwitchCase};
use tern_stack::ensure_sufficient_stack;
use tern_value::errors::{cancelled, thrown};
use tern_value::{Environment, EvalError, Type, Value};

use super::scope_guard::ScopeGuard;
use super::{Flow, Interpreter};

impl Interpreter {
    /// Evaluate a statement: pass the cycle gate, then dispatch.
    pub fn eval_stmt(&self, env: &Environment, stmt: &Stmt) -> Result<Flow, EvalError> {
        self.ctx.step().map_err(|e| e.rewrap(stmt.pos))?;
        ensure_sufficient_stack(|| self.exec_stmt(env, stmt)).map_err(|e| e.rewrap(stmt.pos))
    }

    /// Evaluate statements in order in `env`. The value of the last one is
    /// the sequence's value; a flow signal stops the sequence.
    pub(super) fn eval_stmts(&self, env: &Environment, stmts: &[Stmt]) -> Result<Flow, EvalError> {
        let mut last = Value::Invalid;
        for stmt in stmts {
            match self.eval_stmt(env, stmt)? {
                Flow::Normal(value) => last = value,
                signal if self.mode().propagates_branch_signals() => return Ok(signal),
                _ => {}
            }
        }
        Ok(Flow::Normal(last))
    }

    pub(super) fn exec_stmt(&self, env: &Environment, stmt: &Stmt) -> Result<Flow, EvalError> {
        let none = Ok(Flow::Normal(Value::Invalid));
        match &stmt.kind {
            StmtKind::Block(stmts) => self.eval_stmts(&ScopeGuard::block(env), stmts),
            StmtKind::Expr(expr) => Ok(Flow::Normal(self.eval_expr(env, expr)?)),
            StmtKind::Var {
                names,
                ty,
                values,
                mutable,
            } => {
                self.declare(env, names, ty.as_ref(), values, *mutable)?;
                none
            }
            StmtKind::Assign { targets, values } => {
                self.assign(env, targets, values)?;
                none
            }
            StmtKind::If {
                cond,
                then,
                else_ifs,
                otherwise,
            } => self.exec_if(env, cond, then, else_ifs, otherwise.as_deref()),
            StmtKind::Try {
                body,
                binding,
                catch,
                finally,
            } => self.exec_try(env, body, binding.as_deref(), catch, finally.as_deref()),
            StmtKind::Loop { cond, body } => self.exec_loop(env, cond.as_ref(), body),
            StmtKind::For {
                vars,
                iterable,
                body,
            } => self.exec_for(env, vars, iterable, body),
            StmtKind::CFor {
                init,
                cond,
                post,
                body,
            } => self.exec_cfor(env, init.as_deref(), cond.as_ref(), post.as_ref(), body),
            StmtKind::Switch {
                value,
                cases,
                default,
            } => self.exec_switch(env, value, cases, default.as_deref()),
            StmtKind::Select { cases, default } => self.select(env, cases, default.as_deref()),
            StmtKind::Throw(expr) => {
                let value = self.eval_expr(env, expr)?;
                if self.mode().performs_effects() {
                    return Err(thrown(value));
                }
                none
            }
            StmtKind::Return(exprs) => {
                let value = match exprs.as_slice() {
                    [] => Value::Invalid,
                    [single] => self.eval_expr(env, single)?,
                    many => {
                        let values = many
                            .iter()
                            .map(|e| self.eval_expr(env, e))
                            .collect::<Result<Vec<_>, _>>()?;
                        Value::slice(values, Type::Any)
                    }
                };
                Ok(Flow::Return(value))
            }
            StmtKind::Break => Ok(Flow::Break),
            StmtKind::Continue => Ok(Flow::Continue),
            StmtKind::Module { name, body } => {
                let module = env.new_module(name)?;
                self.eval_stmts(&module, body)?;
                Ok(Flow::Normal(Value::Env(module)))
            }
            StmtKind::Spawn(call) => {
                self.spawn_call(env, call)?;
                none
            }
            StmtKind::Defer(call) => {
                self.defer_call(env, call)?;
                none
            }
            StmtKind::Send { chan, value } => {
                let chan = self.eval_expr(env, chan)?;
                let value = self.eval_expr(env, value)?;
                self.send(&chan, value)?;
                none
            }
            StmtKind::Receive { chan, value, ok } => {
                let chan = self.eval_expr(env, chan)?;
                let (received, open) = self.receive(&chan)?;
                if let Some(target) = value {
                    self.assign_to(env, target, received)?;
                }
                if let Some(target) = ok {
                    self.assign_to(env, target, Value::Bool(open))?;
                }
                none
            }
            StmtKind::Close(chan) => {
                let chan = self.eval_expr(env, chan)?;
                self.close(&chan)?;
                none
            }
        }
    }

    /// Validation visits every branch and discards their outcomes.
    fn exec_if(
        &self,
        env: &Environment,
        cond: &Expr,
        then: &[Stmt],
        else_ifs: &[Stmt],
        otherwise: Option<&[Stmt]>,
    ) -> Result<Flow, EvalError> {
        let all = self.mode().visits_all_branches();
        if self.eval_expr(env, cond)?.truthy() && !all {
            return self.eval_stmts(&ScopeGuard::block(env), then);
        }
        if all {
            self.eval_stmts(&ScopeGuard::block(env), then)?;
        }
        for branch in else_ifs {
            let StmtKind::If { cond, then, .. } = &branch.kind else {
                return Err(EvalError::new("malformed else-if branch").at(branch.pos));
            };
            self.ctx.step().map_err(|e| e.rewrap(branch.pos))?;
            let taken = self.eval_expr(env, cond)?.truthy();
            if all {
                self.eval_stmts(&ScopeGuard::block(env), then)?;
            } else if taken {
                return self.eval_stmts(&ScopeGuard::block(env), then);
            }
        }
        match otherwise {
            Some(body) if all => {
                self.eval_stmts(&ScopeGuard::block(env), body)?;
                Ok(Flow::Normal(Value::Invalid))
            }
            Some(body) => self.eval_stmts(&ScopeGuard::block(env), body),
            None => Ok(Flow::Normal(Value::Invalid)),
        }
    }

    /// Cancellation is never caught. A flow signal from `finally` replaces
    /// the outcome of the body and handler.
    fn exec_try(
        &self,
        env: &Environment,
        body: &[Stmt],
        binding: Option<&str>,
        catch: &[Stmt],
        finally: Option<&[Stmt]>,
    ) -> Result<Flow, EvalError> {
        let handle = |caught: Value| -> Result<Flow, EvalError> {
            let scope = ScopeGuard::block(env);
            if let Some(name) = binding {
                scope.define_value(name, caught)?;
            }
            self.eval_stmts(&scope, catch)
        };
        let outcome = match self.eval_stmts(&ScopeGuard::block(env), body) {
            Ok(flow) if self.mode().is_validating() => handle(Value::Nil).map(|_| flow),
            Err(err) if !err.is_cancelled() => {
                tracing::trace!(error = %err, "caught");
                handle(err.catch_value())
            }
            other => other,
        };
        if let Some(finally) = finally {
            let flow = self.eval_stmts(&ScopeGuard::block(env), finally)?;
            if flow.is_signal() {
                return Ok(flow);
            }
        }
        outcome
    }

    /// One loop iteration in a fresh scope. `Break` carries the flow that
    /// ends the loop.
    fn iterate(&self, scope: &Environment, body: &[Stmt]) -> Result<ControlFlow<Flow>, EvalError> {
        if self.ctx.cancel_token().is_cancelled() {
            return Err(cancelled());
        }
        Ok(match self.eval_stmts(scope, body)? {
            Flow::Break => ControlFlow::Break(Flow::Normal(Value::Invalid)),
            Flow::Return(value) => ControlFlow::Break(Flow::Return(value)),
            Flow::Normal(_) | Flow::Continue => ControlFlow::Continue(()),
        })
    }

    fn under_limit(&self, iterations: usize) -> bool {
        self.mode().loop_limit().is_none_or(|limit| iterations < limit)
    }

    fn exec_loop(&self, env: &Environment, cond: Option<&Expr>, body: &[Stmt]) -> Result<Flow, EvalError> {
        let mut iterations = 0;
        while self.under_limit(iterations) {
            if let Some(cond) = cond {
                let go = self.eval_expr(env, cond)?.truthy();
                if !go && !self.mode().is_validating() {
                    break;
                }
            }
            iterations += 1;
            if let ControlFlow::Break(flow) = self.iterate(&ScopeGuard::block(env), body)? {
                return Ok(flow);
            }
        }
        Ok(Flow::Normal(Value::Invalid))
    }

    fn exec_cfor(
        &self,
        env: &Environment,
        init: Option<&Stmt>,
        cond: Option<&Expr>,
        post: Option<&Expr>,
        body: &[Stmt],
    ) -> Result<Flow, EvalError> {
        let scope = ScopeGuard::block(env);
        if let Some(init) = init {
            self.eval_stmt(&scope, init)?;
        }
        let mut iterations = 0;
        while self.under_limit(iterations) {
            if let Some(cond) = cond {
                let go = self.eval_expr(&scope, cond)?.truthy();
                if !go && !self.mode().is_validating() {
                    break;
                }
            }
            iterations += 1;
            if let ControlFlow::Break(flow) = self.iterate(&ScopeGuard::block(&scope), body)? {
                return Ok(flow);
            }
            if let Some(post) = post {
                self.eval_expr(&scope, post)?;
            }
        }
        Ok(Flow::Normal(Value::Invalid))
    }

    /// `for k, v in iterable`. With one variable it binds the element of a
    /// slice, string or channel, and the key of a map. Slices are iterated
    /// over a snapshot taken when the loop starts.
    fn exec_for(&self, env: &Environment, vars: &[String], iterable: &Expr, body: &[Stmt]) -> Result<Flow, EvalError> {
        if vars.len() > 2 {
            return Err(EvalError::new(format!(
                "range permits at most two iteration variables, got {}",
                vars.len()
            )));
        }
        let iterable = self.eval_expr(env, iterable)?;
        let mut items: Vec<(Value, Value)> = match &iterable {
            Value::Slice(s) => index_pairs(s.to_vec()),
            Value::Str(s) => index_pairs(s.chars().map(|c| Value::string(c.to_string())).collect()),
            Value::Map(m) => self
                .ctx
                .with_map_lock(|| m.entries())
                .into_iter()
                .map(|(k, v)| (k.to_value(), v))
                .collect(),
            Value::Chan(_) => return self.exec_for_chan(env, vars, &iterable, body),
            Value::Nil => Vec::new(),
            Value::Invalid if self.mode().is_validating() => Vec::new(),
            other => {
                return Err(EvalError::new(format!("cannot range over {}", other.type_name())));
            }
        };
        if items.is_empty() && self.mode().is_validating() {
            items.push((Value::Invalid, Value::Invalid));
        }
        let single_is_key = matches!(iterable, Value::Map(_));
        let limit = self.mode().loop_limit().unwrap_or(usize::MAX);
        for (key, value) in items.into_iter().take(limit) {
            let scope = ScopeGuard::block(env);
            match vars {
                [one] => scope.define_value(one, if single_is_key { key } else { value })?,
                [k, v] => {
                    scope.define_value(k, key)?;
                    scope.define_value(v, value)?;
                }
                _ => {}
            }
            if let ControlFlow::Break(flow) = self.iterate(&scope, body)? {
                return Ok(flow);
            }
        }
        Ok(Flow::Normal(Value::Invalid))
    }

    /// Receive until the channel is closed and drained.
    fn exec_for_chan(&self, env: &Environment, vars: &[String], chan: &Value, body: &[Stmt]) -> Result<Flow, EvalError> {
        let mut index = 0i64;
        while self.under_limit(usize::try_from(index).unwrap_or(usize::MAX)) {
            let (value, open) = self.receive(chan)?;
            if !open {
                break;
            }
            let scope = ScopeGuard::block(env);
            match vars {
                [one] => scope.define_value(one, value)?,
                [k, v] => {
                    scope.define_value(k, Value::Int(index))?;
                    scope.define_value(v, value)?;
                }
                _ => {}
            }
            index += 1;
            if let ControlFlow::Break(flow) = self.iterate(&scope, body)? {
                return Ok(flow);
            }
        }
        Ok(Flow::Normal(Value::Invalid))
    }

    /// The first case with a value equal to the subject runs; `break` leaves
    /// the switch.
    fn exec_switch(
        &self,
        env: &Environment,
        subject: &Expr,
        cases: &[SwitchCase],
        default: Option<&[Stmt]>,
    ) -> Result<Flow, EvalError> {
        let subject = self.eval_expr(env, subject)?;
        let all = self.mode().visits_all_branches();
        for case in cases {
            let mut matched = false;
            for candidate in &case.values {
                let candidate = self.eval_expr(env, candidate)?;
                if self.binary_values(BinaryOp::Eq, subject.clone(), candidate)?.truthy() {
                    matched = true;
                    break;
                }
            }
            if all {
                self.eval_stmts(&ScopeGuard::block(env), &case.body)?;
            } else if matched {
                return self.switch_body(env, &case.body);
            }
        }
        match default {
            Some(body) if all => {
                self.eval_stmts(&ScopeGuard::block(env), body)?;
                Ok(Flow::Normal(Value::Invalid))
            }
            Some(body) => self.switch_body(env, body),
            None => Ok(Flow::Normal(Value::Invalid)),
        }
    }

    fn switch_body(&self, env: &Environment, body: &[Stmt]) -> Result<Flow, EvalError> {
        match self.eval_stmts(&ScopeGuard::block(env), body)? {
            Flow::Break => Ok(Flow::Normal(Value::Invalid)),
            flow => Ok(flow),
        }
    }
}

fn index_pairs(values: Vec<Value>) -> Vec<(Value, Value)> {
    (0i64..).zip(values).map(|(i, v)| (Value::Int(i), v)).collect()
}
