//! Tern Eval - evaluator and execution envelope for the Tern runtime.
//!
//! This crate runs program trees from `tern_ir` against `tern_value`
//! environments.
//!
//! # Architecture
//!
//! The evaluator uses:
//! - `Interpreter`: tree walker producing `Flow` for statements and values for
//!   expressions, parameterized by `EvalMode` (run or validate)
//! - `RunContext`: per-run bundle of cancellation, pause gate, rate limiter,
//!   statistics, map lock and validation state; its `step` is the cycle gate
//!   every evaluation passes
//! - `evaluate_binary` / `evaluate_unary`: direct enum-based operator dispatch
//! - `Executor`: envelope that runs programs on worker threads, supervises
//!   them with a watchdog and collects spawned-task failures
//! - `corelib`: the optional core helper functions
//!
//! # Re-exports
//!
//! Value types from `tern_value` are re-exported for convenience:
//! `Value`, `Environment`, `Function`, `Type`, `EvalError`, `EvalResult`.

pub mod context;
pub mod corelib;
pub mod eval_mode;
pub mod executor;
pub mod interpreter;
mod operators;
mod unary_operators;

use std::sync::Once;

pub use context::{CancelToken, PauseGate, RateLimiter, RunContext, Stats, ValidationState};
pub use corelib::import_core;
pub use eval_mode::EvalMode;
pub use executor::{Executor, ExecutorBuilder, ExecutorConfig, ExecutorError, Input, Parser, RunHandle};
pub use interpreter::{evaluate_expression, evaluate_statement, Flow, Interpreter};
pub use operators::evaluate_binary;
pub use unary_operators::evaluate_unary;

pub use tern_value::{Environment, EvalError, EvalErrorKind, EvalResult, Function, Type, Value};

static TRACING_INIT: Once = Once::new();

/// Install a `tracing` subscriber for diagnostics.
///
/// The filter comes from `TERN_LOG`, then `RUST_LOG`, and defaults to
/// `warn`. Safe to call more than once; does nothing if the host already
/// installed a global subscriber.
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        use tracing_subscriber::{fmt, prelude::*, EnvFilter};

        let filter = std::env::var("TERN_LOG")
            .ok()
            .and_then(|directives| EnvFilter::try_new(directives).ok())
            .or_else(|| EnvFilter::try_from_default_env().ok())
            .unwrap_or_else(|| EnvFilter::new("warn"));
        let installed = tracing_subscriber::registry()
            .with(fmt::layer().with_target(true).with_level(true))
            .with(filter)
            .try_init();
        if installed.is_err() {
            tracing::debug!("a global subscriber is already installed");
        }
    });
}
