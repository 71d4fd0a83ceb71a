//! Environment wiring - platform flag, host hooks, and installers.
//!
//! The runtime is configured the way the host's injection surface would do it:
//! install-style free functions over thread-local cells, with a reset for
//! tests. Everything has a working default — a browser platform with inert
//! no-op hooks — so nothing here needs to be called before creating blocks.
//!
//! # What lives here
//!
//! - the platform flag gating DOM-bound trigger sources
//! - the clock and DOM hook registrations consumed by [`scheduler`](crate::scheduler)
//! - the optional dependency-loader interceptor
//! - the change notifier: the host's hook for scheduling a render pass after
//!   the runtime mutates views
//! - the block behavior toggle used by test fixtures

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use crate::loader::LoaderInterceptor;
use crate::scheduler::{ClockHooks, DomHooks, NoopClock, NoopDom};

// =============================================================================
// Types
// =============================================================================

/// Identifies the platform the runtime executes on.
///
/// On [`Platform::Server`], `interaction`, `hover`, and `viewport` triggers
/// arm as no-ops and never fire; `when` and `immediate` remain active.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Platform {
    Browser,
    Server,
}

/// Controls whether blocks run their triggers.
///
/// [`DeferBehavior::Manual`] suspends trigger arming and `when` polling so
/// test fixtures can drive states explicitly through
/// [`DeferInstance::fire`](crate::instance::DeferInstance::fire).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeferBehavior {
    Playthrough,
    Manual,
}

// =============================================================================
// State
// =============================================================================

thread_local! {
    static PLATFORM: Cell<Platform> = const { Cell::new(Platform::Browser) };

    static BEHAVIOR: Cell<DeferBehavior> = const { Cell::new(DeferBehavior::Playthrough) };

    static INTERCEPTOR: RefCell<Option<LoaderInterceptor>> = const { RefCell::new(None) };

    static CLOCK: RefCell<Rc<dyn ClockHooks>> = RefCell::new(Rc::new(NoopClock));

    static DOM: RefCell<Rc<dyn DomHooks>> = RefCell::new(Rc::new(NoopDom));

    static CHANGE_NOTIFIER: RefCell<Option<Rc<dyn Fn()>>> = const { RefCell::new(None) };
}

// =============================================================================
// Platform
// =============================================================================

/// Set the platform identifier.
pub fn set_platform(platform: Platform) {
    PLATFORM.with(|cell| cell.set(platform));
}

/// Get the current platform identifier.
pub fn platform() -> Platform {
    PLATFORM.with(|cell| cell.get())
}

/// Whether DOM-bound trigger sources may register listeners and observers.
pub(crate) fn dom_triggers_active() -> bool {
    platform() == Platform::Browser
}

// =============================================================================
// Behavior
// =============================================================================

/// Set the block behavior (test fixtures use [`DeferBehavior::Manual`]).
pub fn set_behavior(behavior: DeferBehavior) {
    BEHAVIOR.with(|cell| cell.set(behavior));
}

/// Get the current block behavior.
pub fn behavior() -> DeferBehavior {
    BEHAVIOR.with(|cell| cell.get())
}

// =============================================================================
// Loader Interceptor
// =============================================================================

/// Install or clear the dependency-loader interceptor.
///
/// The interceptor transforms the raw compiler-emitted loader before its
/// single invocation; it must not alter the at-most-once contract. Absence
/// means identity.
pub fn set_loader_interceptor(interceptor: Option<LoaderInterceptor>) {
    INTERCEPTOR.with(|cell| *cell.borrow_mut() = interceptor);
}

pub(crate) fn loader_interceptor() -> Option<LoaderInterceptor> {
    INTERCEPTOR.with(|cell| cell.borrow().clone())
}

// =============================================================================
// Clock / DOM Hooks
// =============================================================================

/// Install the clock hooks backing timeouts and idle callbacks.
pub fn set_clock_hooks(clock: Rc<dyn ClockHooks>) {
    CLOCK.with(|cell| *cell.borrow_mut() = clock);
}

pub(crate) fn clock_hooks() -> Rc<dyn ClockHooks> {
    CLOCK.with(|cell| cell.borrow().clone())
}

/// Install the DOM hooks backing event listeners and intersection observers.
pub fn set_dom_hooks(dom: Rc<dyn DomHooks>) {
    DOM.with(|cell| *cell.borrow_mut() = dom);
}

pub(crate) fn dom_hooks() -> Rc<dyn DomHooks> {
    DOM.with(|cell| cell.borrow().clone())
}

// =============================================================================
// Change Notifier
// =============================================================================

/// Install the host's change notifier.
///
/// Invoked after every runtime-driven view mutation and after every callback
/// delivered through the scheduler seams, so the host can schedule change
/// detection.
pub fn set_change_notifier(notifier: Rc<dyn Fn()>) {
    CHANGE_NOTIFIER.with(|cell| *cell.borrow_mut() = Some(notifier));
}

/// Notify the host that runtime state changed.
pub(crate) fn notify_change() {
    let notifier = CHANGE_NOTIFIER.with(|cell| cell.borrow().clone());
    if let Some(notifier) = notifier {
        notifier();
    }
}

// =============================================================================
// Reset (for testing)
// =============================================================================

/// Restore every environment cell to its default.
pub fn reset_environment() {
    PLATFORM.with(|cell| cell.set(Platform::Browser));
    BEHAVIOR.with(|cell| cell.set(DeferBehavior::Playthrough));
    INTERCEPTOR.with(|cell| *cell.borrow_mut() = None);
    CLOCK.with(|cell| *cell.borrow_mut() = Rc::new(NoopClock));
    DOM.with(|cell| *cell.borrow_mut() = Rc::new(NoopDom));
    CHANGE_NOTIFIER.with(|cell| *cell.borrow_mut() = None);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        reset_environment();

        assert_eq!(platform(), Platform::Browser);
        assert_eq!(behavior(), DeferBehavior::Playthrough);
        assert!(loader_interceptor().is_none());
        assert!(dom_triggers_active());

        // The default notifier is absent; notifying must be harmless.
        notify_change();
    }

    #[test]
    fn test_platform_gates_dom_triggers() {
        reset_environment();

        set_platform(Platform::Server);
        assert!(!dom_triggers_active());

        set_platform(Platform::Browser);
        assert!(dom_triggers_active());
    }

    #[test]
    fn test_reset_restores_defaults() {
        reset_environment();

        set_platform(Platform::Server);
        set_behavior(DeferBehavior::Manual);

        reset_environment();
        assert_eq!(platform(), Platform::Browser);
        assert_eq!(behavior(), DeferBehavior::Playthrough);
    }
}
