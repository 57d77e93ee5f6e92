//! Tree-walking evaluator.
//!
//! [`Interpreter`] walks statements and expressions against an
//! [`Environment`]. Statements produce a [`Flow`]; `break`, `continue` and
//! `return` travel upward as flow signals, never as errors. Every visit of a
//! statement or expression first passes the run's cycle gate
//! ([`RunContext::step`]); assignment targets are resolved without counting.
//!
//! # Layout
//!
//! - `stmt`: statements, blocks, loops and branches
//! - `expr`: expressions, member/index/slice resolution, literals
//! - `assign`: assignment targets and declarations
//! - `call`: calls, function literals and deferred calls
//! - `builtins`: `len`, `in`, `make`, `delete`, channel operations, `select`
//! - `types`: type expressions to runtime types
//! - `scope_guard`: releases block and function scopes on exit

mod assign;
mod builtins;
mod call;
mod expr;
mod function;
mod scope_guard;
mod stmt;
mod types;

use std::cell::RefCell;
use std::sync::Arc;

use tern_ir::{Expr, Stmt, StmtKind};
use tern_value::errors::unexpected_signal;
use tern_value::{Environment, EvalError, EvalResult, Value};

use crate::context::RunContext;
use crate::eval_mode::EvalMode;

pub use function::ScriptFunction;
pub use types::resolve_type;

/// Outcome of a statement.
#[derive(Clone, Debug, PartialEq)]
pub enum Flow {
    /// Completed; carries the value of an expression statement.
    Normal(Value),
    Break,
    Continue,
    Return(Value),
}

impl Flow {
    /// Whether this outcome stops the enclosing block.
    #[inline]
    pub fn is_signal(&self) -> bool {
        !matches!(self, Flow::Normal(_))
    }

    /// Value of a completed program: the returned or last expression value.
    pub fn into_result(self) -> EvalResult {
        match self {
            Flow::Normal(v) | Flow::Return(v) => Ok(v),
            Flow::Break => Err(unexpected_signal("break")),
            Flow::Continue => Err(unexpected_signal("continue")),
        }
    }
}

thread_local! {
    /// Interpreter of the run executing on this thread. Script functions
    /// created by an earlier run evaluate under the caller's run.
    static ACTIVE: RefCell<Option<Interpreter>> = const { RefCell::new(None) };
}

/// Restores the previously active interpreter on drop.
struct ActiveGuard {
    previous: Option<Interpreter>,
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        let previous = self.previous.take();
        ACTIVE.with(|slot| *slot.borrow_mut() = previous);
    }
}

/// Evaluator bound to one run.
#[derive(Clone)]
pub struct Interpreter {
    ctx: Arc<RunContext>,
}

impl Interpreter {
    pub fn new(ctx: Arc<RunContext>) -> Self {
        Interpreter { ctx }
    }

    pub fn context(&self) -> &Arc<RunContext> {
        &self.ctx
    }

    #[inline]
    pub fn mode(&self) -> EvalMode {
        self.ctx.mode()
    }

    /// The interpreter of the run on this thread, if any.
    pub(crate) fn active() -> Option<Interpreter> {
        ACTIVE.with(|slot| slot.borrow().clone())
    }

    /// Make `self` the active interpreter until the guard drops.
    fn activate(&self) -> ActiveGuard {
        let previous = ACTIVE.with(|slot| slot.borrow_mut().replace(self.clone()));
        ActiveGuard { previous }
    }

    /// Evaluate a program root.
    ///
    /// A root block runs directly in `env`, so its definitions stay visible
    /// to the host afterwards. Calls deferred at top level run when the
    /// program ends.
    #[tracing::instrument(level = "debug", skip_all)]
    pub fn run_program(&self, env: &Environment, program: &Stmt) -> EvalResult {
        let _active = self.activate();
        self.ctx.step().map_err(|e| e.rewrap(program.pos))?;
        let outcome = match &program.kind {
            StmtKind::Block(stmts) => self.eval_stmts(env, stmts),
            _ => self.exec_stmt(env, program),
        };
        let deferred = self.run_defers(env);
        let value = outcome?.into_result()?;
        deferred?;
        tracing::debug!(cycles = self.ctx.stats().cycles(), "program finished");
        Ok(value)
    }

    /// Validate a program root, then every function body discovered on the
    /// way until none are left.
    #[tracing::instrument(level = "debug", skip_all)]
    pub fn validate_program(&self, env: &Environment, program: &Stmt) -> Result<(), EvalError> {
        let _active = self.activate();
        self.ctx.step().map_err(|e| e.rewrap(program.pos))?;
        match &program.kind {
            StmtKind::Block(stmts) => self.eval_stmts(env, stmts)?,
            _ => self.exec_stmt(env, program)?,
        };
        let mut validated = 0usize;
        while let Some(func) = self.ctx.validation().next_pending() {
            func.validate_body(self)?;
            validated += 1;
        }
        tracing::debug!(
            functions = validated,
            cycles = self.ctx.stats().cycles(),
            "validation finished"
        );
        Ok(())
    }
}

/// Evaluate one statement under `ctx`.
pub fn evaluate_statement(
    ctx: &Arc<RunContext>,
    env: &Environment,
    stmt: &Stmt,
) -> Result<Flow, EvalError> {
    let interp = Interpreter::new(Arc::clone(ctx));
    let _active = interp.activate();
    interp.eval_stmt(env, stmt)
}

/// Evaluate one expression under `ctx`.
pub fn evaluate_expression(ctx: &Arc<RunContext>, env: &Environment, expr: &Expr) -> EvalResult {
    let interp = Interpreter::new(Arc::clone(ctx));
    let _active = interp.activate();
    interp.eval_expr(env, expr)
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    reason = "tests use unwrap to panic on unexpected state"
)]
mod tests;
