//! Step result types.

use crate::{engine::ErrorReason, state::ExecutionState};

/// One state produced by a step.
#[derive(Debug, Clone)]
pub enum Successor {
    /// Execution continues; the state is feasible and ready to be stepped again.
    Active(ExecutionState),

    /// The path terminated normally (`halt`).
    Exited(ExecutionState),

    /// The path cannot continue.
    Errored {
        /// The state as it was when the failure occurred
        state: ExecutionState,
        /// Diagnostic
        reason: ErrorReason,
    },
}

impl Successor {
    /// The state carried by this successor.
    #[must_use]
    pub fn state(&self) -> &ExecutionState {
        match self {
            Successor::Active(state) | Successor::Exited(state) => state,
            Successor::Errored { state, .. } => state,
        }
    }

    /// Consumes the successor, returning its state.
    #[must_use]
    pub fn into_state(self) -> ExecutionState {
        match self {
            Successor::Active(state) | Successor::Exited(state) => state,
            Successor::Errored { state, .. } => state,
        }
    }

    /// Checks if the successor can be stepped further.
    #[must_use]
    pub fn is_active(&self) -> bool {
        matches!(self, Successor::Active(_))
    }
}

/// Outcome of stepping one state.
///
/// An empty successor list is legal: a hook may suppress the path, or every branch
/// direction may be infeasible.
#[derive(Debug, Clone, Default)]
pub struct StepResult {
    /// Successors in emission order; for branches the taken side comes first.
    pub successors: Vec<Successor>,

    /// Candidate successors discarded as unsatisfiable.
    pub pruned: usize,

    /// Whether a hook summary replaced the instruction.
    pub hooked: bool,
}

impl StepResult {
    pub(crate) fn single(successor: Successor) -> Self {
        StepResult {
            successors: vec![successor],
            pruned: 0,
            hooked: false,
        }
    }

    pub(crate) fn errored(state: ExecutionState, reason: ErrorReason) -> Self {
        Self::single(Successor::Errored { state, reason })
    }

    /// Number of successors.
    #[must_use]
    pub fn len(&self) -> usize {
        self.successors.len()
    }

    /// Checks if the step produced no successors.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.successors.is_empty()
    }

    /// Successors that can be stepped further.
    pub fn active(&self) -> impl Iterator<Item = &ExecutionState> {
        self.successors.iter().filter_map(|s| match s {
            Successor::Active(state) => Some(state),
            _ => None,
        })
    }
}
