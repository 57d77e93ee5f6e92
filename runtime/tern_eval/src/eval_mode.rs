//! Evaluation modes.
//!
//! The evaluator is parameterized by an `EvalMode` carried in the run
//! context. Every construct whose behavior differs between a real run and a
//! validation pass asks one of the policy methods below instead of matching
//! on the mode directly.

/// Evaluation mode of a run.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum EvalMode {
    /// Normal execution.
    #[default]
    Run,
    /// Dry run: every branch visited once, side effects suppressed.
    Validate,
}

impl EvalMode {
    #[inline]
    pub fn is_validating(self) -> bool {
        matches!(self, Self::Validate)
    }

    /// Whether every branch of a conditional is visited, not just the taken one.
    #[inline]
    pub fn visits_all_branches(self) -> bool {
        self.is_validating()
    }

    /// Number of iterations a loop is capped at, or `None` for unbounded.
    #[inline]
    pub fn loop_limit(self) -> Option<usize> {
        match self {
            Self::Run => None,
            Self::Validate => Some(1),
        }
    }

    /// Whether host functions are invoked. When not, calls produce the zero
    /// values of the declared result types.
    #[inline]
    pub fn invokes_host(self) -> bool {
        matches!(self, Self::Run)
    }

    /// Whether writes into slices, maps and through pointers are performed.
    #[inline]
    pub fn writes_aggregates(self) -> bool {
        matches!(self, Self::Run)
    }

    /// Whether channel sends, receives and closes are performed.
    #[inline]
    pub fn performs_channel_ops(self) -> bool {
        matches!(self, Self::Run)
    }

    /// Whether `throw`, `go` and `defer` take effect.
    #[inline]
    pub fn performs_effects(self) -> bool {
        matches!(self, Self::Run)
    }

    /// Whether break/continue/return escape the construct that produced them.
    #[inline]
    pub fn propagates_branch_signals(self) -> bool {
        matches!(self, Self::Run)
    }
}
