//! Error types and runtime diagnostics.
//!
//! Two distinct severities live here:
//! - [`LoadError`] travels as a value through the shared load cell and ends up
//!   driving the Failed state of any block that observes it.
//! - [`Diagnostic`] covers non-fatal conditions (an anchor that could not be
//!   resolved, a disposer that panicked, an attempted transition out of a
//!   terminal state). Diagnostics are logged through the `log` facade and
//!   recorded in a thread-local buffer that tests can drain.
//!
//! No error is allowed to escape into the surrounding view's change-detection
//! cycle: every entry point in this crate recovers locally and reports here.

use std::cell::RefCell;

use thiserror::Error;

// =============================================================================
// Load Errors
// =============================================================================

/// Failure produced by a dependency loader.
///
/// Recorded once on the descriptor's load cell; every later load request
/// observes the same rejection (no retry at this layer).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("dependency load failed: {reason}")]
pub struct LoadError {
    /// Human-readable reason, carried through to the error sub-view decision.
    pub reason: String,
}

impl LoadError {
    /// Create a load error with the given reason.
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

// =============================================================================
// Diagnostics
// =============================================================================

/// Non-fatal conditions surfaced by the runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Diagnostic {
    /// An anchor lookup failed at trigger arming time. The trigger is inert;
    /// the block stays in Placeholder unless another trigger fires.
    UnresolvedTrigger {
        /// The requested anchor name, or `None` for an implicit anchor.
        anchor: Option<String>,
    },
    /// A cleanup disposer panicked. Execution of the remaining disposers
    /// continues.
    DisposerFailed,
    /// A transition out of a terminal state was attempted and ignored.
    IllegalTransition {
        from: &'static str,
        to: &'static str,
    },
}

thread_local! {
    /// Diagnostics recorded since the last drain. Test-facing.
    static RECORDED: RefCell<Vec<Diagnostic>> = const { RefCell::new(Vec::new()) };
}

/// Log a diagnostic and record it for later inspection.
pub(crate) fn report(diagnostic: Diagnostic) {
    match &diagnostic {
        Diagnostic::UnresolvedTrigger { anchor } => match anchor {
            Some(name) => log::warn!("defer trigger anchor '{name}' could not be resolved"),
            None => log::warn!("defer trigger has no placeholder to take an implicit anchor from"),
        },
        Diagnostic::DisposerFailed => {
            log::error!("a defer cleanup disposer panicked; continuing with remaining disposers");
        }
        Diagnostic::IllegalTransition { from, to } => {
            // Ignored silently in release builds.
            #[cfg(debug_assertions)]
            log::warn!("ignored defer state transition {from} -> {to}");
            #[cfg(not(debug_assertions))]
            let _ = (from, to);
        }
    }

    RECORDED.with(|recorded| recorded.borrow_mut().push(diagnostic));
}

/// Drain all diagnostics recorded so far.
pub fn take_diagnostics() -> Vec<Diagnostic> {
    RECORDED.with(|recorded| std::mem::take(&mut *recorded.borrow_mut()))
}

/// Clear recorded diagnostics (for testing).
pub fn reset_diagnostics() {
    RECORDED.with(|recorded| recorded.borrow_mut().clear());
}
