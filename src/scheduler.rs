//! Scheduler primitives - idle, timeout, and DOM-event seams.
//!
//! Everything in this crate that waits on the outside world goes through the
//! hooks defined here: a clock (timeouts and idle callbacks) and a DOM surface
//! (event listeners and intersection observation). Production installs
//! platform-backed hooks through [`environment`](crate::environment); tests
//! install the deterministic fakes from [`testing`](crate::testing); on
//! non-DOM platforms the defaults are no-ops, which makes every DOM-bound
//! trigger inert without special-casing callers.
//!
//! Each wrapper returns a [`Disposer`]. Callbacks are delivered inside the
//! host's reactive context: after the callback runs, the installed change
//! notifier is invoked so the host can schedule a render pass.

use std::rc::Rc;

use crate::environment;
use crate::view::ElementId;

// =============================================================================
// Disposer
// =============================================================================

/// Cleanup function returned by every subscription in this crate.
///
/// Call it to release the underlying listener, timer, or observer entry.
pub type Disposer = Box<dyn FnOnce()>;

/// A disposer that releases nothing.
pub(crate) fn noop_disposer() -> Disposer {
    Box::new(|| {})
}

// =============================================================================
// Hook Identifiers
// =============================================================================

/// Identifies a pending timeout at the clock hooks.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TimerId(pub u64);

/// Identifies a pending idle callback at the clock hooks.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct IdleId(pub u64);

/// Identifies a registered DOM event listener.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ListenerId(pub u64);

/// Identifies an intersection observer created through the DOM hooks.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ObserverHandle(pub u64);

/// DOM event kinds the trigger sources listen for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DomEventKind {
    Click,
    KeyDown,
    MouseEnter,
}

// =============================================================================
// Platform Hooks
// =============================================================================

/// Clock surface: timeouts and frame-idle callbacks.
///
/// Implementations must tolerate cancellation of ids that already fired.
pub trait ClockHooks {
    fn set_timeout(&self, delay_ms: u64, callback: Box<dyn FnOnce()>) -> TimerId;
    fn clear_timeout(&self, timer: TimerId);
    fn request_idle(&self, callback: Box<dyn FnOnce()>) -> IdleId;
    fn cancel_idle(&self, idle: IdleId);
}

/// DOM surface: event listener registration and intersection observation.
///
/// The observer side mirrors the platform API shape: one observer instance
/// watches many elements and reports `(element, is_intersecting)` pairs. The
/// process-wide sharing policy lives in
/// [`triggers::viewport`](crate::triggers::viewport), not here.
pub trait DomHooks {
    fn add_listener(
        &self,
        element: ElementId,
        event: DomEventKind,
        callback: Rc<dyn Fn()>,
    ) -> ListenerId;
    fn remove_listener(&self, listener: ListenerId);

    fn create_observer(&self, callback: Rc<dyn Fn(ElementId, bool)>) -> ObserverHandle;
    fn observe(&self, observer: ObserverHandle, element: ElementId);
    fn unobserve(&self, observer: ObserverHandle, element: ElementId);
    fn disconnect(&self, observer: ObserverHandle);
}

/// Clock that never fires. Default on platforms without a usable clock;
/// `timer` and `idle` triggers armed against it stay pending forever.
pub struct NoopClock;

impl ClockHooks for NoopClock {
    fn set_timeout(&self, _delay_ms: u64, _callback: Box<dyn FnOnce()>) -> TimerId {
        TimerId(0)
    }
    fn clear_timeout(&self, _timer: TimerId) {}
    fn request_idle(&self, _callback: Box<dyn FnOnce()>) -> IdleId {
        IdleId(0)
    }
    fn cancel_idle(&self, _idle: IdleId) {}
}

/// DOM surface that registers nothing and never reports.
pub struct NoopDom;

impl DomHooks for NoopDom {
    fn add_listener(
        &self,
        _element: ElementId,
        _event: DomEventKind,
        _callback: Rc<dyn Fn()>,
    ) -> ListenerId {
        ListenerId(0)
    }
    fn remove_listener(&self, _listener: ListenerId) {}
    fn create_observer(&self, _callback: Rc<dyn Fn(ElementId, bool)>) -> ObserverHandle {
        ObserverHandle(0)
    }
    fn observe(&self, _observer: ObserverHandle, _element: ElementId) {}
    fn unobserve(&self, _observer: ObserverHandle, _element: ElementId) {}
    fn disconnect(&self, _observer: ObserverHandle) {}
}

// =============================================================================
// Wrappers
// =============================================================================

/// Run a delivered callback inside the host's reactive context.
fn deliver(callback: impl FnOnce()) {
    callback();
    environment::notify_change();
}

/// Arm a timeout. The returned disposer cancels it.
pub fn on_timeout(delay_ms: u64, callback: impl FnOnce() + 'static) -> Disposer {
    let clock = environment::clock_hooks();
    let timer = clock.set_timeout(delay_ms, Box::new(move || deliver(callback)));
    Box::new(move || clock.clear_timeout(timer))
}

/// Arm a frame-idle callback. The returned disposer cancels it.
///
/// This is the raw per-request wrapper; the coalescing policy that keeps at
/// most one idle request outstanding lives in
/// [`triggers::idle`](crate::triggers::idle).
pub fn on_idle(callback: impl FnOnce() + 'static) -> Disposer {
    let clock = environment::clock_hooks();
    let idle = clock.request_idle(Box::new(move || deliver(callback)));
    Box::new(move || clock.cancel_idle(idle))
}

/// Register a DOM event listener. The returned disposer removes it.
///
/// On non-DOM platforms nothing is registered and the disposer is a no-op.
pub fn on_event(element: ElementId, event: DomEventKind, callback: Rc<dyn Fn()>) -> Disposer {
    if !environment::dom_triggers_active() {
        return noop_disposer();
    }

    let dom = environment::dom_hooks();
    let listener = dom.add_listener(
        element,
        event,
        Rc::new(move || deliver(|| callback())),
    );
    Box::new(move || dom.remove_listener(listener))
}
