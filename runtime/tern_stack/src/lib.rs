//! Stack growth guard.
//!
//! The evaluator and the bytecode codec both recurse once per tree level. A
//! script with deeply nested expressions, or a long chain of script function
//! calls, would otherwise exhaust the thread's stack. Wrap each recursive
//! step in [`ensure_sufficient_stack`] and the stack is extended on demand.
//!
//! Native targets grow through `stacker`; on `wasm32` the guard is a plain
//! call.

/// Grow when less than this remains.
const RED_ZONE: usize = 128 * 1024;

/// Size of each new stack segment.
const SEGMENT: usize = 1024 * 1024;

/// Run `f`, first growing the stack if fewer than `RED_ZONE` bytes remain.
#[inline]
#[cfg(not(target_arch = "wasm32"))]
pub fn ensure_sufficient_stack<R>(f: impl FnOnce() -> R) -> R {
    stacker::maybe_grow(RED_ZONE, SEGMENT, f)
}

#[inline]
#[cfg(target_arch = "wasm32")]
pub fn ensure_sufficient_stack<R>(f: impl FnOnce() -> R) -> R {
    f()
}
