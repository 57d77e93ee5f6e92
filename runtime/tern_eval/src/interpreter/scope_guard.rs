//! RAII guard for evaluator-owned scopes.
//!
//! Blocks, loop iterations and function invocations each get a fresh child
//! scope. When the construct exits the guard calls
//! [`Environment::destroy`], which releases the scope unless something that
//! outlives the construct (an escaped closure, a spawned task, a pointer to
//! one of its variables) still refers to it. Dropping runs on every exit
//! path, errors and unwinding included.
//!
//! ```text
//! let scope = ScopeGuard::block(env);
//! scope.define_value("i", Value::Int(0))?;
//! self.eval_stmts(&scope, body)
//! // destroyed here
//! ```

use std::ops::Deref;

use tern_value::Environment;

/// Owns a scope for the duration of one construct.
pub(super) struct ScopeGuard {
    env: Environment,
}

impl ScopeGuard {
    /// Fresh block scope under `parent`.
    pub(super) fn block(parent: &Environment) -> Self {
        ScopeGuard {
            env: parent.new_env(),
        }
    }

    /// Fresh function scope under `closure`.
    pub(super) fn function(closure: &Environment) -> Self {
        ScopeGuard {
            env: closure.new_function_env(),
        }
    }
}

impl Deref for ScopeGuard {
    type Target = Environment;

    fn deref(&self) -> &Environment {
        &self.env
    }
}

impl Drop for ScopeGuard {
    fn drop(&mut self) {
        self.env.destroy();
    }
}
