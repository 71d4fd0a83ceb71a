//! Deterministic fakes for the platform seams.
//!
//! Production hooks the scheduler seams up to platform globals; tests install
//! these instead and drive time, events, and intersection reports by hand:
//!
//! ```ignore
//! use defer_runtime::testing;
//!
//! let (clock, dom) = testing::install();
//! // ... create blocks ...
//! clock.advance(500);        // fire due timers
//! clock.fire_idle();         // deliver the pending idle callback
//! dom.click(anchor);         // dispatch a DOM event
//! dom.intersect(anchor);     // report an intersection
//! ```
//!
//! Both fakes expose the counters the cleanup invariants are asserted
//! against: pending timers, pending idle requests, live listeners, observed
//! elements, and a log of removed listeners.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use crate::environment;
use crate::error;
use crate::instance;
use crate::loader::{Bundle, DependencyLoader, LoadHandle};
use crate::scheduler::{
    ClockHooks, DomEventKind, DomHooks, IdleId, ListenerId, ObserverHandle, TimerId,
};
use crate::triggers;
use crate::view::{self, ElementId};

// =============================================================================
// Install / Reset
// =============================================================================

/// Reset all runtime state and install fresh fakes for both seams.
pub fn install() -> (Rc<TestClock>, Rc<TestDom>) {
    reset_runtime();
    let clock = TestClock::new();
    let dom = TestDom::new();
    environment::set_clock_hooks(clock.clone());
    environment::set_dom_hooks(dom.clone());
    (clock, dom)
}

/// Reset every piece of process-wide runtime state.
pub fn reset_runtime() {
    environment::reset_environment();
    instance::reset_instances();
    view::reset_views();
    triggers::idle::reset_idle();
    triggers::viewport::reset_viewport();
    error::reset_diagnostics();
}

// =============================================================================
// Test Clock
// =============================================================================

struct PendingTimer {
    id: TimerId,
    due: u64,
    callback: Box<dyn FnOnce()>,
}

struct PendingIdle {
    id: IdleId,
    callback: Box<dyn FnOnce()>,
}

struct ClockInner {
    now: u64,
    next_timer: u64,
    next_idle: u64,
    timers: Vec<PendingTimer>,
    idles: Vec<PendingIdle>,
}

/// Manual clock. Timers fire when [`advance`](TestClock::advance) crosses
/// their deadline; idle callbacks fire when the test says the frame is idle.
pub struct TestClock {
    inner: RefCell<ClockInner>,
}

impl TestClock {
    pub fn new() -> Rc<Self> {
        Rc::new(Self {
            inner: RefCell::new(ClockInner {
                now: 0,
                next_timer: 0,
                next_idle: 0,
                timers: Vec::new(),
                idles: Vec::new(),
            }),
        })
    }

    /// Advance the clock, firing due timers in deadline order. Timers armed
    /// by a firing callback run too if they fall within the window.
    pub fn advance(&self, ms: u64) {
        let target = self.inner.borrow().now + ms;
        loop {
            let next = {
                let mut inner = self.inner.borrow_mut();
                let mut earliest: Option<usize> = None;
                for (index, timer) in inner.timers.iter().enumerate() {
                    if timer.due > target {
                        continue;
                    }
                    earliest = match earliest {
                        Some(best) if inner.timers[best].due <= timer.due => Some(best),
                        _ => Some(index),
                    };
                }
                match earliest {
                    Some(index) => {
                        let timer = inner.timers.remove(index);
                        inner.now = inner.now.max(timer.due);
                        Some(timer.callback)
                    }
                    None => {
                        inner.now = target;
                        None
                    }
                }
            };
            match next {
                Some(callback) => callback(),
                None => break,
            }
        }
    }

    /// Deliver every pending idle callback, FIFO.
    pub fn fire_idle(&self) {
        let callbacks: Vec<Box<dyn FnOnce()>> = {
            let mut inner = self.inner.borrow_mut();
            inner.idles.drain(..).map(|idle| idle.callback).collect()
        };
        for callback in callbacks {
            callback();
        }
    }

    pub fn now(&self) -> u64 {
        self.inner.borrow().now
    }

    /// Timers armed and not yet fired or cancelled.
    pub fn pending_timers(&self) -> usize {
        self.inner.borrow().timers.len()
    }

    /// Idle requests outstanding. The coalescing invariant keeps this ≤ 1
    /// no matter how many blocks wait on idle.
    pub fn pending_idle(&self) -> usize {
        self.inner.borrow().idles.len()
    }
}

impl ClockHooks for TestClock {
    fn set_timeout(&self, delay_ms: u64, callback: Box<dyn FnOnce()>) -> TimerId {
        let mut inner = self.inner.borrow_mut();
        inner.next_timer += 1;
        let id = TimerId(inner.next_timer);
        let due = inner.now + delay_ms;
        inner.timers.push(PendingTimer { id, due, callback });
        id
    }

    fn clear_timeout(&self, timer: TimerId) {
        self.inner.borrow_mut().timers.retain(|t| t.id != timer);
    }

    fn request_idle(&self, callback: Box<dyn FnOnce()>) -> IdleId {
        let mut inner = self.inner.borrow_mut();
        inner.next_idle += 1;
        let id = IdleId(inner.next_idle);
        inner.idles.push(PendingIdle { id, callback });
        id
    }

    fn cancel_idle(&self, idle: IdleId) {
        self.inner.borrow_mut().idles.retain(|i| i.id != idle);
    }
}

// =============================================================================
// Test DOM
// =============================================================================

struct ListenerRec {
    id: ListenerId,
    element: ElementId,
    event: DomEventKind,
    callback: Rc<dyn Fn()>,
}

struct ObserverRec {
    handle: ObserverHandle,
    callback: Rc<dyn Fn(ElementId, bool)>,
    observed: Vec<ElementId>,
    connected: bool,
}

struct DomInner {
    next_listener: u64,
    listeners: Vec<ListenerRec>,
    removed: Vec<(ElementId, DomEventKind)>,
    next_observer: u64,
    observers: Vec<ObserverRec>,
}

/// Manual DOM surface: a listener table plus an intersection-observer table,
/// with test-side dispatch.
pub struct TestDom {
    inner: RefCell<DomInner>,
}

impl TestDom {
    pub fn new() -> Rc<Self> {
        Rc::new(Self {
            inner: RefCell::new(DomInner {
                next_listener: 0,
                listeners: Vec::new(),
                removed: Vec::new(),
                next_observer: 0,
                observers: Vec::new(),
            }),
        })
    }

    /// Dispatch an event to every listener registered for it.
    pub fn dispatch(&self, element: ElementId, event: DomEventKind) {
        let callbacks: Vec<Rc<dyn Fn()>> = {
            let inner = self.inner.borrow();
            inner
                .listeners
                .iter()
                .filter(|l| l.element == element && l.event == event)
                .map(|l| l.callback.clone())
                .collect()
        };
        for callback in callbacks {
            callback();
        }
    }

    pub fn click(&self, element: ElementId) {
        self.dispatch(element, DomEventKind::Click);
    }

    pub fn keydown(&self, element: ElementId) {
        self.dispatch(element, DomEventKind::KeyDown);
    }

    pub fn mouse_enter(&self, element: ElementId) {
        self.dispatch(element, DomEventKind::MouseEnter);
    }

    /// Report `is_intersecting = true` for the element to every connected
    /// observer watching it.
    pub fn intersect(&self, element: ElementId) {
        let callbacks: Vec<Rc<dyn Fn(ElementId, bool)>> = {
            let inner = self.inner.borrow();
            inner
                .observers
                .iter()
                .filter(|o| o.connected && o.observed.contains(&element))
                .map(|o| o.callback.clone())
                .collect()
        };
        for callback in callbacks {
            callback(element, true);
        }
    }

    /// Live listener registrations.
    pub fn listener_count(&self) -> usize {
        self.inner.borrow().listeners.len()
    }

    /// Live listener registrations for one (element, event) pair.
    pub fn listeners_on(&self, element: ElementId, event: DomEventKind) -> usize {
        self.inner
            .borrow()
            .listeners
            .iter()
            .filter(|l| l.element == element && l.event == event)
            .count()
    }

    /// Every `(element, event)` removal since construction, in order. The
    /// spy for asserting eager listener release.
    pub fn removed_listeners(&self) -> Vec<(ElementId, DomEventKind)> {
        self.inner.borrow().removed.clone()
    }

    /// Connected observers.
    pub fn observer_count(&self) -> usize {
        self.inner
            .borrow()
            .observers
            .iter()
            .filter(|o| o.connected)
            .count()
    }

    /// Elements observed across all connected observers.
    pub fn observed_element_count(&self) -> usize {
        self.inner
            .borrow()
            .observers
            .iter()
            .filter(|o| o.connected)
            .map(|o| o.observed.len())
            .sum()
    }
}

impl DomHooks for TestDom {
    fn add_listener(
        &self,
        element: ElementId,
        event: DomEventKind,
        callback: Rc<dyn Fn()>,
    ) -> ListenerId {
        let mut inner = self.inner.borrow_mut();
        inner.next_listener += 1;
        let id = ListenerId(inner.next_listener);
        inner.listeners.push(ListenerRec {
            id,
            element,
            event,
            callback,
        });
        id
    }

    fn remove_listener(&self, listener: ListenerId) {
        let mut inner = self.inner.borrow_mut();
        if let Some(index) = inner.listeners.iter().position(|l| l.id == listener) {
            let record = inner.listeners.remove(index);
            inner.removed.push((record.element, record.event));
        }
    }

    fn create_observer(&self, callback: Rc<dyn Fn(ElementId, bool)>) -> ObserverHandle {
        let mut inner = self.inner.borrow_mut();
        inner.next_observer += 1;
        let handle = ObserverHandle(inner.next_observer);
        inner.observers.push(ObserverRec {
            handle,
            callback,
            observed: Vec::new(),
            connected: true,
        });
        handle
    }

    fn observe(&self, observer: ObserverHandle, element: ElementId) {
        let mut inner = self.inner.borrow_mut();
        if let Some(record) = inner
            .observers
            .iter_mut()
            .find(|o| o.handle == observer && o.connected)
        {
            if !record.observed.contains(&element) {
                record.observed.push(element);
            }
        }
    }

    fn unobserve(&self, observer: ObserverHandle, element: ElementId) {
        let mut inner = self.inner.borrow_mut();
        if let Some(record) = inner.observers.iter_mut().find(|o| o.handle == observer) {
            record.observed.retain(|observed| *observed != element);
        }
    }

    fn disconnect(&self, observer: ObserverHandle) {
        let mut inner = self.inner.borrow_mut();
        if let Some(record) = inner.observers.iter_mut().find(|o| o.handle == observer) {
            record.connected = false;
            record.observed.clear();
        }
    }
}

// =============================================================================
// Manual Loader
// =============================================================================

/// A dependency loader the test settles by hand, with an invocation counter.
pub struct ManualLoader {
    handle: Rc<RefCell<Option<LoadHandle>>>,
    calls: Rc<Cell<usize>>,
}

impl ManualLoader {
    /// Build the loader and its control half.
    pub fn new() -> (DependencyLoader, ManualLoader) {
        let handle: Rc<RefCell<Option<LoadHandle>>> = Rc::new(RefCell::new(None));
        let calls = Rc::new(Cell::new(0usize));

        let loader: DependencyLoader = {
            let handle = handle.clone();
            let calls = calls.clone();
            Rc::new(move |load_handle: LoadHandle| {
                calls.set(calls.get() + 1);
                *handle.borrow_mut() = Some(load_handle);
            })
        };
        (loader, ManualLoader { handle, calls })
    }

    /// How many times the loader has been invoked. The at-most-once contract
    /// says this never exceeds 1.
    pub fn calls(&self) -> usize {
        self.calls.get()
    }

    pub fn invoked(&self) -> bool {
        self.calls.get() > 0
    }

    /// Resolve the in-flight load.
    pub fn resolve(&self, bundle: Bundle) {
        self.current_handle().resolve(bundle);
    }

    /// Reject the in-flight load.
    pub fn reject(&self, error: crate::error::LoadError) {
        self.current_handle().reject(error);
    }

    /// Take the raw handle to settle later or out of band.
    pub fn take_handle(&self) -> LoadHandle {
        self.handle
            .borrow_mut()
            .take()
            .expect("dependency loader has not been invoked")
    }

    fn current_handle(&self) -> LoadHandle {
        self.handle
            .borrow()
            .clone()
            .expect("dependency loader has not been invoked")
    }
}
