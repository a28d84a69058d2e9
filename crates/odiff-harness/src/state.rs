//! Engine state machine
//!
//! `Uninitialized → Configured → (Setup → Executed → Compared)* → Done`, with
//! `Failed` reachable from every non-terminal state. Run-to-completion mode
//! goes `Configured → Executed → Compared → Done`.

use crate::error::{HarnessError, Result};

/// Engine states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HarnessState {
    /// Nothing constructed yet
    Uninitialized,
    /// Both instances configured and allocated
    Configured,
    /// Initial condition applied and scanned for the next routine
    Setup,
    /// Routine ran on both sides
    Executed,
    /// Post-routine check passed
    Compared,
    /// All routines passed
    Done,
    /// Aborted
    Failed,
}

impl HarnessState {
    /// True for `Done` and `Failed`
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }
}

/// States reachable from `from`
#[must_use]
pub fn allowed_transitions(from: HarnessState) -> Vec<HarnessState> {
    use HarnessState::*;
    match from {
        Uninitialized => vec![Configured, Failed],
        Configured => vec![Setup, Executed, Failed],
        Setup => vec![Executed, Done, Failed],
        Executed => vec![Compared, Failed],
        Compared => vec![Setup, Done, Failed],
        Done | Failed => vec![],
    }
}

/// Check a transition
///
/// # Errors
/// [`HarnessError::IllegalTransition`] if `to` is not reachable from `from`.
pub fn validate_transition(from: HarnessState, to: HarnessState) -> Result<()> {
    if allowed_transitions(from).contains(&to) {
        Ok(())
    } else {
        Err(HarnessError::IllegalTransition { from, to })
    }
}
