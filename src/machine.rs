//! Block state machines - legality and idempotence of transitions.
//!
//! The main channel walks Placeholder → Loading → Complete, with Failed as
//! the alternate terminal; the prefetch channel walks NotStarted →
//! InProgress → Complete/Failed without ever touching the rendered view.
//! Everything here is pure: the controller asks [`advance_main`] what an
//! attempted transition means and applies the answer.

use crate::error::{report, Diagnostic};

// =============================================================================
// States
// =============================================================================

/// Rendered lifecycle of a block instance.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MainState {
    Placeholder,
    Loading,
    Complete,
    Failed,
}

impl MainState {
    /// Complete and Failed accept no further transitions.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Complete | Self::Failed)
    }

    pub(crate) fn name(self) -> &'static str {
        match self {
            Self::Placeholder => "Placeholder",
            Self::Loading => "Loading",
            Self::Complete => "Complete",
            Self::Failed => "Failed",
        }
    }
}

/// Loading lifecycle of a block instance's prefetch channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PrefetchState {
    NotStarted,
    InProgress,
    Complete,
    Failed,
}

// =============================================================================
// Transitions
// =============================================================================

/// Outcome of an attempted main-state transition.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Advance {
    /// Legal edge: apply the new state and re-render.
    Apply,
    /// Same state: idempotent no-op.
    Ignore,
    /// Would violate monotonicity; already reported as a diagnostic.
    Rejected,
}

/// Classify a main-state transition.
///
/// Legal edges: Placeholder → Loading, Placeholder → Complete (cached
/// bundle), Placeholder → Failed (failed prefetch), Loading → Complete,
/// Loading → Failed. Anything else is rejected with an
/// [`Diagnostic::IllegalTransition`].
pub(crate) fn advance_main(from: MainState, to: MainState) -> Advance {
    use MainState::*;

    if from == to {
        return Advance::Ignore;
    }
    let legal = matches!(
        (from, to),
        (Placeholder, Loading)
            | (Placeholder, Complete)
            | (Placeholder, Failed)
            | (Loading, Complete)
            | (Loading, Failed)
    );
    if legal {
        Advance::Apply
    } else {
        report(Diagnostic::IllegalTransition {
            from: from.name(),
            to: to.name(),
        });
        Advance::Rejected
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{reset_diagnostics, take_diagnostics};

    const ALL: [MainState; 4] = [
        MainState::Placeholder,
        MainState::Loading,
        MainState::Complete,
        MainState::Failed,
    ];

    #[test]
    fn test_only_monotone_edges_apply() {
        reset_diagnostics();

        let legal = [
            (MainState::Placeholder, MainState::Loading),
            (MainState::Placeholder, MainState::Complete),
            (MainState::Placeholder, MainState::Failed),
            (MainState::Loading, MainState::Complete),
            (MainState::Loading, MainState::Failed),
        ];

        for from in ALL {
            for to in ALL {
                let expected = if from == to {
                    Advance::Ignore
                } else if legal.contains(&(from, to)) {
                    Advance::Apply
                } else {
                    Advance::Rejected
                };
                assert_eq!(
                    advance_main(from, to),
                    expected,
                    "transition {from:?} -> {to:?}"
                );
            }
        }
    }

    #[test]
    fn test_terminal_states_report_diagnostics() {
        reset_diagnostics();

        assert_eq!(
            advance_main(MainState::Complete, MainState::Loading),
            Advance::Rejected
        );
        assert_eq!(
            advance_main(MainState::Failed, MainState::Complete),
            Advance::Rejected
        );

        let diagnostics = take_diagnostics();
        assert_eq!(diagnostics.len(), 2);
        assert_eq!(
            diagnostics[0],
            Diagnostic::IllegalTransition {
                from: "Complete",
                to: "Loading"
            }
        );
    }

    #[test]
    fn test_same_state_is_silent() {
        reset_diagnostics();

        for state in ALL {
            assert_eq!(advance_main(state, state), Advance::Ignore);
        }
        assert!(take_diagnostics().is_empty());
    }

    #[test]
    fn test_terminal_classification() {
        assert!(!MainState::Placeholder.is_terminal());
        assert!(!MainState::Loading.is_terminal());
        assert!(MainState::Complete.is_terminal());
        assert!(MainState::Failed.is_terminal());
    }
}
