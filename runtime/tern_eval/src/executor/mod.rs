//! Execution envelope.
//!
//! An [`Executor`] owns a root environment and runs programs against it, one
//! worker thread per run. It wires each run's [`RunContext`] to the shared
//! pause gate and statistics, installs the optional rate limiter, starts the
//! watchdog, and collects the result together with failures reported by
//! spawned tasks. A task failure that arrives before the main result wins
//! and cancels the run; later ones are logged.
//!
//! ```text
//! let exec = Executor::builder().rate_limit(1000, Duration::from_secs(1)).build()?;
//! let value = exec.run(&CancelToken::new(), program)?;
//! ```

mod watchdog;

use std::fmt;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam::channel::{self, select, Receiver};
use parking_lot::Mutex;
use tern_bytecode::DecodeError;
use tern_ir::Stmt;
use tern_value::{Environment, EvalError, EvalResult, Value};

use crate::context::{CancelToken, PauseGate, RateLimiter, RunContext, Stats};
use crate::corelib::import_core;
use crate::eval_mode::EvalMode;
use crate::interpreter::Interpreter;
use watchdog::Watchdog;

/// Program handed to an executor.
#[derive(Clone, Debug)]
pub enum Input {
    /// An already built tree.
    Program(Arc<Stmt>),
    /// Serialized tree; bytes without the bytecode signature are treated as
    /// UTF-8 source.
    Bytecode(Vec<u8>),
    /// Source text, handed to the configured [`Parser`].
    Source(String),
}

impl From<Stmt> for Input {
    fn from(program: Stmt) -> Self {
        Input::Program(Arc::new(program))
    }
}

impl From<Arc<Stmt>> for Input {
    fn from(program: Arc<Stmt>) -> Self {
        Input::Program(program)
    }
}

impl From<Vec<u8>> for Input {
    fn from(bytes: Vec<u8>) -> Self {
        Input::Bytecode(bytes)
    }
}

impl From<String> for Input {
    fn from(source: String) -> Self {
        Input::Source(source)
    }
}

impl From<&str> for Input {
    fn from(source: &str) -> Self {
        Input::Source(source.to_string())
    }
}

/// Turns source text into a program tree. Supplied by the host.
pub trait Parser: Send + Sync {
    fn parse(&self, source: &str) -> Result<Stmt, EvalError>;
}

/// Failures of the envelope itself.
#[derive(Debug, thiserror::Error)]
pub enum ExecutorError {
    #[error("source input needs a parser, and none is configured")]
    NoParser,
    #[error(transparent)]
    Parse(EvalError),
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error("source is neither bytecode nor valid utf-8")]
    NotText,
    #[error("run finished without delivering a result")]
    Lost,
    #[error("failed to start {what} thread: {source}")]
    Spawn {
        what: &'static str,
        source: std::io::Error,
    },
}

impl From<ExecutorError> for EvalError {
    fn from(e: ExecutorError) -> Self {
        match e {
            ExecutorError::Parse(err) => err,
            other => EvalError::new(other.to_string()),
        }
    }
}

/// Executor settings.
#[derive(Clone, Debug)]
pub struct ExecutorConfig {
    /// At most `count` evaluation steps per `period`.
    pub rate_limit: Option<(u32, Duration)>,
    /// Live scopes under the root before the watchdog cancels a run; `0`
    /// disables the watchdog.
    pub max_env_count: usize,
    pub watchdog_interval: Duration,
    /// Define `typeOf`, `toString` and the other core helpers.
    pub import_core: bool,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        ExecutorConfig {
            rate_limit: None,
            max_env_count: 0,
            watchdog_interval: Duration::from_secs(1),
            import_core: true,
        }
    }
}

/// Builder for [`Executor`].
#[derive(Default)]
pub struct ExecutorBuilder {
    env: Option<Environment>,
    config: ExecutorConfig,
    parser: Option<Arc<dyn Parser>>,
}

impl ExecutorBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Template environment; the executor works on a deep copy of it.
    #[must_use]
    pub fn env(mut self, env: Environment) -> Self {
        self.env = Some(env);
        self
    }

    #[must_use]
    pub fn rate_limit(mut self, count: u32, period: Duration) -> Self {
        self.config.rate_limit = Some((count, period));
        self
    }

    #[must_use]
    pub fn max_env_count(mut self, limit: usize) -> Self {
        self.config.max_env_count = limit;
        self
    }

    #[must_use]
    pub fn watchdog_interval(mut self, interval: Duration) -> Self {
        self.config.watchdog_interval = interval;
        self
    }

    #[must_use]
    pub fn import_core(mut self, import: bool) -> Self {
        self.config.import_core = import;
        self
    }

    #[must_use]
    pub fn parser(mut self, parser: Arc<dyn Parser>) -> Self {
        self.parser = Some(parser);
        self
    }

    #[must_use]
    pub fn config(mut self, config: ExecutorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> Result<Executor, EvalError> {
        let env = self
            .env
            .map_or_else(Environment::new, |template| template.deep_copy());
        if self.config.import_core {
            import_core(&env)?;
        }
        tracing::debug!(config = ?self.config, "executor built");
        Ok(Executor {
            shared: Arc::new(Shared {
                env,
                config: self.config,
                parser: self.parser,
                pause: Arc::new(PauseGate::new()),
                stats: Arc::new(Stats::new()),
                active: Mutex::new(Vec::new()),
            }),
        })
    }
}

struct Shared {
    env: Environment,
    config: ExecutorConfig,
    parser: Option<Arc<dyn Parser>>,
    pause: Arc<PauseGate>,
    stats: Arc<Stats>,
    /// Tokens of runs in flight, fired by `stop`.
    active: Mutex<Vec<CancelToken>>,
}

impl Drop for Shared {
    fn drop(&mut self) {
        // Closures stored in the environment hold their defining scopes.
        self.env.clear();
    }
}

/// Runs programs against a shared root environment. Clones share the
/// environment, the pause gate and the statistics.
#[derive(Clone)]
pub struct Executor {
    shared: Arc<Shared>,
}

impl Executor {
    pub fn builder() -> ExecutorBuilder {
        ExecutorBuilder::new()
    }

    /// Executor over a fresh environment with the default configuration.
    pub fn new() -> Result<Self, EvalError> {
        ExecutorBuilder::new().build()
    }

    /// Run a program to completion.
    #[tracing::instrument(level = "debug", skip_all)]
    pub fn run(&self, cancel: &CancelToken, input: impl Into<Input>) -> EvalResult {
        self.run_async(cancel, input)?.wait()
    }

    /// Start a program on its own thread.
    #[tracing::instrument(level = "debug", skip_all)]
    pub fn run_async(&self, cancel: &CancelToken, input: impl Into<Input>) -> Result<RunHandle, EvalError> {
        let program = self.resolve(input.into())?;
        Ok(self.start(cancel.clone(), program)?)
    }

    fn start(&self, cancel: CancelToken, program: Arc<Stmt>) -> Result<RunHandle, ExecutorError> {
        let config = &self.shared.config;
        let (task_tx, task_rx) = channel::unbounded();
        let limiter = config
            .rate_limit
            .map(|(count, period)| Arc::new(RateLimiter::new(count, period)));
        self.shared.stats.reset();
        let ctx = RunContext::new(cancel.clone())
            .with_pause_gate(Arc::clone(&self.shared.pause))
            .with_rate_limiter(limiter)
            .with_stats(Arc::clone(&self.shared.stats))
            .with_task_errors(task_tx);

        let watchdog = if config.max_env_count > 0 {
            Some(Watchdog::spawn(
                self.shared.env.clone(),
                cancel.clone(),
                config.max_env_count,
                config.watchdog_interval,
            )?)
        } else {
            None
        };

        let (result_tx, result_rx) = channel::bounded(1);
        let env = self.shared.env.clone();
        thread::Builder::new()
            .name("tern-run".to_string())
            .spawn(move || {
                let interp = Interpreter::new(Arc::new(ctx));
                let result = interp.run_program(&env, &program);
                if result_tx.send(result).is_err() {
                    tracing::debug!("run result dropped; nobody is waiting");
                }
            })
            .map_err(|source| ExecutorError::Spawn {
                what: "run",
                source,
            })?;

        self.shared.active.lock().push(cancel.clone());
        Ok(RunHandle {
            executor: self.clone(),
            cancel,
            result_rx,
            task_rx: Some(task_rx),
            outcome: None,
            _watchdog: watchdog,
        })
    }

    /// Dry-run a program on a copy of the environment: every branch is
    /// visited once, no host function runs and nothing is written.
    #[tracing::instrument(level = "debug", skip_all)]
    pub fn validate(&self, input: impl Into<Input>) -> Result<(), EvalError> {
        self.validated(input.into()).map(|_| ())
    }

    /// Which of `targets` (function values) the program could call.
    pub fn has(&self, input: impl Into<Input>, targets: &[Value]) -> Result<Vec<bool>, EvalError> {
        let interp = self.validated(input.into())?;
        let seen = interp.context().validation();
        Ok(targets
            .iter()
            .map(|target| match target {
                Value::Func(func) => seen.was_called(func.id()),
                _ => false,
            })
            .collect())
    }

    fn validated(&self, input: Input) -> Result<Interpreter, EvalError> {
        let program = self.resolve(input)?;
        let env = self.shared.env.deep_copy();
        let ctx = RunContext::new(CancelToken::new()).with_mode(EvalMode::Validate);
        let interp = Interpreter::new(Arc::new(ctx));
        let result = interp.validate_program(&env, &program);
        env.clear();
        result.map(|()| interp)
    }

    fn resolve(&self, input: Input) -> Result<Arc<Stmt>, ExecutorError> {
        match input {
            Input::Program(program) => Ok(program),
            Input::Bytecode(bytes) if tern_bytecode::is_bytecode(&bytes) => {
                Ok(Arc::new(tern_bytecode::decode(&bytes)?))
            }
            Input::Bytecode(bytes) => {
                let source = String::from_utf8(bytes).map_err(|_| ExecutorError::NotText)?;
                self.parse(&source)
            }
            Input::Source(source) if tern_bytecode::is_bytecode(source.as_bytes()) => {
                Ok(Arc::new(tern_bytecode::decode(source.as_bytes())?))
            }
            Input::Source(source) => self.parse(&source),
        }
    }

    fn parse(&self, source: &str) -> Result<Arc<Stmt>, ExecutorError> {
        let parser = self.shared.parser.as_ref().ok_or(ExecutorError::NoParser)?;
        parser.parse(source).map(Arc::new).map_err(ExecutorError::Parse)
    }

    /// Close the pause gate: every run blocks at its next step.
    pub fn pause(&self) {
        self.shared.pause.pause();
    }

    pub fn resume(&self) {
        self.shared.pause.resume();
    }

    pub fn is_paused(&self) -> bool {
        self.shared.pause.is_paused()
    }

    /// Cancel every run in flight, paused ones included.
    pub fn stop(&self) {
        let active = std::mem::take(&mut *self.shared.active.lock());
        tracing::debug!(runs = active.len(), "stopping");
        for token in active {
            token.cancel();
        }
        self.shared.pause.wake();
    }

    /// Evaluation steps taken by the current (or last) run.
    pub fn cycles(&self) -> u64 {
        self.shared.stats.cycles()
    }

    /// The root environment runs evaluate in.
    pub fn environment(&self) -> Environment {
        self.shared.env.clone()
    }

    fn unregister(&self, cancel: &CancelToken) {
        self.shared.active.lock().retain(|token| !token.ptr_eq(cancel));
    }
}

impl fmt::Debug for Executor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Executor")
            .field("config", &self.shared.config)
            .field("paused", &self.is_paused())
            .field("cycles", &self.cycles())
            .finish_non_exhaustive()
    }
}

/// A run in flight.
pub struct RunHandle {
    executor: Executor,
    cancel: CancelToken,
    result_rx: Receiver<EvalResult>,
    /// Dropped once the outcome is known; later task failures are then
    /// logged by the reporting task.
    task_rx: Option<Receiver<EvalError>>,
    outcome: Option<EvalResult>,
    _watchdog: Option<Watchdog>,
}

impl RunHandle {
    /// Block until the run finishes.
    pub fn wait(mut self) -> EvalResult {
        if let Some(outcome) = self.outcome.take() {
            return outcome;
        }
        let outcome = match &self.task_rx {
            Some(task_rx) => select! {
                recv(self.result_rx) -> result => result.unwrap_or_else(|_| Err(ExecutorError::Lost.into())),
                recv(task_rx) -> failed => match failed {
                    Ok(err) => {
                        self.cancel.cancel();
                        Err(err)
                    }
                    Err(_) => self.result_rx.recv().unwrap_or_else(|_| Err(ExecutorError::Lost.into())),
                },
            },
            None => self.result_rx.recv().unwrap_or_else(|_| Err(ExecutorError::Lost.into())),
        };
        self.finish(outcome)
    }

    /// Wait up to `timeout`; `None` if the run is still going.
    pub fn wait_timeout(&mut self, timeout: Duration) -> Option<&EvalResult> {
        if self.outcome.is_none() {
            let outcome = match &self.task_rx {
                Some(task_rx) => select! {
                    recv(self.result_rx) -> result => Some(result.unwrap_or_else(|_| Err(ExecutorError::Lost.into()))),
                    recv(task_rx) -> failed => match failed {
                        Ok(err) => {
                            self.cancel.cancel();
                            Some(Err(err))
                        }
                        Err(_) => self.result_rx.recv_timeout(timeout).ok(),
                    },
                    default(timeout) => None,
                },
                None => self.result_rx.recv_timeout(timeout).ok(),
            };
            let outcome = outcome.map(|outcome| self.finish(outcome));
            self.outcome = outcome;
        }
        self.outcome.as_ref()
    }

    /// Poll without blocking.
    pub fn try_wait(&mut self) -> Option<&EvalResult> {
        self.wait_timeout(Duration::ZERO)
    }

    pub fn is_finished(&mut self) -> bool {
        self.try_wait().is_some()
    }

    /// Cancel this run.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    fn finish(&mut self, outcome: EvalResult) -> EvalResult {
        if let Some(task_rx) = self.task_rx.take() {
            for err in task_rx.try_iter() {
                tracing::warn!(error = %err, "spawned task failed after the run finished");
            }
        }
        self.executor.unregister(&self.cancel);
        if let Err(err) = &outcome {
            tracing::debug!(error = %err, "run failed");
        }
        outcome
    }
}

impl Drop for RunHandle {
    fn drop(&mut self) {
        self.executor.unregister(&self.cancel);
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    reason = "tests use unwrap to panic on unexpected state"
)]
