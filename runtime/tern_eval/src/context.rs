//! Per-run parameters threaded through every evaluation step.
//!
//! A [`RunContext`] is created once per run (or validation pass) and shared
//! by the main path and every task it spawns. It bundles the cooperative
//! control plane:
//!
//! - [`CancelToken`]: one-shot, idempotent cancellation broadcast
//! - [`PauseGate`]: level-triggered pause/resume
//! - [`RateLimiter`]: optional token-window throttle on evaluation cycles
//! - [`Stats`]: the cycle counter
//! - the run-wide map lock and the validation bookkeeping
//!
//! [`RunContext::step`] is the cycle gate every statement and expression
//! visit passes before doing any work.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use parking_lot::{Condvar, Mutex};
use rustc_hash::FxHashSet;
use tern_value::errors::cancelled;
use tern_value::EvalError;

use crate::eval_mode::EvalMode;
use crate::interpreter::ScriptFunction;

/// How often a paused waiter re-checks a cancellation it was not woken for.
const CANCEL_POLL: Duration = Duration::from_millis(20);

struct CancelInner {
    fired: AtomicBool,
    /// Dropped on cancel; `signal` then reports disconnection to every
    /// receiver at once.
    trigger: Mutex<Option<Sender<()>>>,
    signal: Receiver<()>,
}

/// Cancellation broadcast shared by a run and everything it spawns.
#[derive(Clone)]
pub struct CancelToken {
    inner: Arc<CancelInner>,
}

impl CancelToken {
    pub fn new() -> Self {
        let (trigger, signal) = channel::bounded(0);
        CancelToken {
            inner: Arc::new(CancelInner {
                fired: AtomicBool::new(false),
                trigger: Mutex::new(Some(trigger)),
                signal,
            }),
        }
    }

    /// Fire the token. Repeated calls are no-ops.
    pub fn cancel(&self) {
        self.inner.fired.store(true, Ordering::Release);
        self.inner.trigger.lock().take();
    }

    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.inner.fired.load(Ordering::Acquire)
    }

    /// Receiver that becomes ready (disconnected) once the token fires.
    /// Used as an extra arm in channel selects.
    pub fn signal(&self) -> &Receiver<()> {
        &self.inner.signal
    }

    /// Sleep for `duration`, waking early on cancellation. Returns `true`
    /// when the token fired.
    pub fn sleep(&self, duration: Duration) -> bool {
        match self.inner.signal.recv_timeout(duration) {
            Err(RecvTimeoutError::Timeout) => self.is_cancelled(),
            Ok(()) | Err(RecvTimeoutError::Disconnected) => true,
        }
    }

    pub fn ptr_eq(&self, other: &CancelToken) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancelToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// Gate that is open while running and closed while paused.
///
/// Pausing twice is the same as pausing once; resuming releases every
/// waiter.
#[derive(Default)]
pub struct PauseGate {
    paused: Mutex<bool>,
    resumed: Condvar,
}

impl PauseGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pause(&self) {
        *self.paused.lock() = true;
    }

    pub fn resume(&self) {
        *self.paused.lock() = false;
        self.resumed.notify_all();
    }

    pub fn is_paused(&self) -> bool {
        *self.paused.lock()
    }

    /// Wake waiters so they re-check cancellation.
    pub fn wake(&self) {
        self.resumed.notify_all();
    }

    /// Block while paused. A fired token wins over the pause.
    pub fn wait(&self, cancel: &CancelToken) -> Result<(), EvalError> {
        let mut paused = self.paused.lock();
        while *paused {
            if cancel.is_cancelled() {
                return Err(cancelled());
            }
            self.resumed.wait_for(&mut paused, CANCEL_POLL);
        }
        Ok(())
    }
}

struct Window {
    start: Instant,
    used: u32,
}

/// Allows `count` evaluation cycles per `period`.
pub struct RateLimiter {
    count: u32,
    period: Duration,
    window: Mutex<Window>,
}

impl RateLimiter {
    pub fn new(count: u32, period: Duration) -> Self {
        RateLimiter {
            count: count.max(1),
            period,
            window: Mutex::new(Window {
                start: Instant::now(),
                used: 0,
            }),
        }
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Take one token, blocking until the next window opens when the current
    /// one is spent.
    pub fn acquire(&self, cancel: &CancelToken) -> Result<(), EvalError> {
        loop {
            let wait = {
                let mut window = self.window.lock();
                let now = Instant::now();
                if now.duration_since(window.start) >= self.period {
                    window.start = now;
                    window.used = 0;
                }
                if window.used < self.count {
                    window.used += 1;
                    return Ok(());
                }
                (window.start + self.period).saturating_duration_since(now)
            };
            if cancel.sleep(wait) {
                return Err(cancelled());
            }
        }
    }
}

/// Run statistics.
#[derive(Default, Debug)]
pub struct Stats {
    cycles: AtomicU64,
}

impl Stats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Evaluation steps taken so far.
    pub fn cycles(&self) -> u64 {
        self.cycles.load(Ordering::Relaxed)
    }

    #[inline]
    pub(crate) fn tick(&self) {
        self.cycles.fetch_add(1, Ordering::Relaxed);
    }

    pub fn reset(&self) {
        self.cycles.store(0, Ordering::Relaxed);
    }
}

/// Bookkeeping of a validation pass.
#[derive(Default)]
pub struct ValidationState {
    /// Identities of every function value called.
    seen: Mutex<FxHashSet<usize>>,
    /// Declarations already queued, so each body is validated once.
    queued: Mutex<FxHashSet<usize>>,
    pending: Mutex<VecDeque<Arc<ScriptFunction>>>,
}

impl ValidationState {
    pub fn record_call(&self, id: usize) {
        self.seen.lock().insert(id);
    }

    pub fn was_called(&self, id: usize) -> bool {
        self.seen.lock().contains(&id)
    }

    /// Queue a function body; `false` if its declaration was queued before.
    pub(crate) fn enqueue(&self, func: Arc<ScriptFunction>) -> bool {
        if !self.queued.lock().insert(func.decl_id()) {
            return false;
        }
        self.pending.lock().push_back(func);
        true
    }

    pub(crate) fn next_pending(&self) -> Option<Arc<ScriptFunction>> {
        self.pending.lock().pop_front()
    }
}

/// Parameters of one run, shared by the main path and spawned tasks.
pub struct RunContext {
    cancel: CancelToken,
    pause: Arc<PauseGate>,
    limiter: Option<Arc<RateLimiter>>,
    stats: Arc<Stats>,
    map_lock: Mutex<()>,
    mode: EvalMode,
    validation: ValidationState,
    task_errors: Sender<EvalError>,
}

impl RunContext {
    /// Context with an open pause gate, no rate limit, fresh statistics and
    /// a task-error channel nobody listens on.
    pub fn new(cancel: CancelToken) -> Self {
        let (task_errors, _) = channel::unbounded();
        RunContext {
            cancel,
            pause: Arc::new(PauseGate::new()),
            limiter: None,
            stats: Arc::new(Stats::new()),
            map_lock: Mutex::new(()),
            mode: EvalMode::Run,
            validation: ValidationState::default(),
            task_errors,
        }
    }

    #[must_use]
    pub fn with_mode(mut self, mode: EvalMode) -> Self {
        self.mode = mode;
        self
    }

    #[must_use]
    pub fn with_pause_gate(mut self, pause: Arc<PauseGate>) -> Self {
        self.pause = pause;
        self
    }

    #[must_use]
    pub fn with_rate_limiter(mut self, limiter: Option<Arc<RateLimiter>>) -> Self {
        self.limiter = limiter;
        self
    }

    #[must_use]
    pub fn with_stats(mut self, stats: Arc<Stats>) -> Self {
        self.stats = stats;
        self
    }

    #[must_use]
    pub fn with_task_errors(mut self, task_errors: Sender<EvalError>) -> Self {
        self.task_errors = task_errors;
        self
    }

    /// The cycle gate: cancellation check, pause wait, rate-limit wait, then
    /// one cycle is counted.
    #[inline]
    pub fn step(&self) -> Result<(), EvalError> {
        if self.cancel.is_cancelled() {
            return Err(cancelled());
        }
        self.pause.wait(&self.cancel)?;
        if let Some(limiter) = &self.limiter {
            limiter.acquire(&self.cancel)?;
        }
        self.stats.tick();
        Ok(())
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    #[inline]
    pub fn mode(&self) -> EvalMode {
        self.mode
    }

    pub fn stats(&self) -> &Stats {
        &self.stats
    }

    pub fn validation(&self) -> &ValidationState {
        &self.validation
    }

    /// Run `f` holding the run-wide map lock.
    pub fn with_map_lock<R>(&self, f: impl FnOnce() -> R) -> R {
        let _guard = self.map_lock.lock();
        f()
    }

    /// Report a spawned task's failure to whoever awaits the run.
    pub fn report_task_error(&self, err: EvalError) {
        if let Err(unsent) = self.task_errors.send(err) {
            tracing::warn!(error = %unsent.0, "spawned task failed");
        }
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    reason = "tests use unwrap to panic on unexpected state"
)]
