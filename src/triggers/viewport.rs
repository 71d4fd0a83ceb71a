//! Viewport trigger source - shared intersection observation.
//!
//! All `viewport` subscriptions in the process share a single intersection
//! observer, created on first use and disconnected once the observed set
//! empties. Each subscription fires on the first `is_intersecting = true`
//! report for its element; the element is unobserved in the same step.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::environment;
use crate::scheduler::{noop_disposer, Disposer, ObserverHandle};
use crate::view::ElementId;

struct SharedObserver {
    handle: ObserverHandle,
    subscribers: HashMap<ElementId, Vec<(u64, Box<dyn FnOnce()>)>>,
    next_id: u64,
}

thread_local! {
    static OBSERVER: RefCell<Option<SharedObserver>> = const { RefCell::new(None) };
}

/// Subscribe to the first intersection of `element`. The returned disposer
/// unsubscribes and, when it was the last entry, disconnects the observer.
pub(crate) fn arm(element: ElementId, on_fire: Box<dyn FnOnce()>) -> Disposer {
    if !environment::dom_triggers_active() {
        return noop_disposer();
    }
    let dom = environment::dom_hooks();

    // Init-on-first-use: one observer for the whole process.
    let existing = OBSERVER.with(|observer| observer.borrow().as_ref().map(|shared| shared.handle));
    let handle = match existing {
        Some(handle) => handle,
        None => {
            let handle = dom.create_observer(Rc::new(dispatch));
            OBSERVER.with(|observer| {
                *observer.borrow_mut() = Some(SharedObserver {
                    handle,
                    subscribers: HashMap::new(),
                    next_id: 0,
                })
            });
            handle
        }
    };

    let (id, first_for_element) = OBSERVER.with(|observer| {
        let mut observer = observer.borrow_mut();
        match observer.as_mut() {
            Some(shared) => {
                let id = shared.next_id;
                shared.next_id += 1;
                let entry = shared.subscribers.entry(element).or_default();
                let first = entry.is_empty();
                entry.push((id, on_fire));
                (id, first)
            }
            None => (0, false),
        }
    });
    if first_for_element {
        dom.observe(handle, element);
    }

    Box::new(move || disarm(element, id))
}

/// Intersection report from the platform observer.
fn dispatch(element: ElementId, is_intersecting: bool) {
    if !is_intersecting {
        return;
    }

    let (fired, teardown) = OBSERVER.with(|observer| {
        let mut observer = observer.borrow_mut();
        let Some(shared) = observer.as_mut() else {
            return (Vec::new(), None);
        };
        let fired = shared.subscribers.remove(&element).unwrap_or_default();
        if fired.is_empty() {
            return (fired, None);
        }
        let empty = shared.subscribers.is_empty();
        let handle = shared.handle;
        if empty {
            *observer = None;
        }
        (fired, Some((handle, empty)))
    });

    if let Some((handle, empty)) = teardown {
        let dom = environment::dom_hooks();
        dom.unobserve(handle, element);
        if empty {
            dom.disconnect(handle);
        }
    }

    let any_fired = !fired.is_empty();
    for (_, callback) in fired {
        callback();
    }
    if any_fired {
        environment::notify_change();
    }
}

fn disarm(element: ElementId, id: u64) {
    let teardown = OBSERVER.with(|observer| {
        let mut observer = observer.borrow_mut();
        let Some(shared) = observer.as_mut() else {
            return None;
        };
        let Some(entry) = shared.subscribers.get_mut(&element) else {
            return None;
        };
        entry.retain(|(subscriber, _)| *subscriber != id);
        if !entry.is_empty() {
            return None;
        }
        shared.subscribers.remove(&element);
        let empty = shared.subscribers.is_empty();
        let handle = shared.handle;
        if empty {
            *observer = None;
        }
        Some((handle, empty))
    });

    if let Some((handle, empty)) = teardown {
        let dom = environment::dom_hooks();
        dom.unobserve(handle, element);
        if empty {
            dom.disconnect(handle);
        }
    }
}

/// Number of elements currently observed (for testing).
pub fn observed_element_count() -> usize {
    OBSERVER.with(|observer| {
        observer
            .borrow()
            .as_ref()
            .map(|shared| shared.subscribers.len())
            .unwrap_or(0)
    })
}

/// Whether the shared observer currently exists (for testing).
pub fn observer_active() -> bool {
    OBSERVER.with(|observer| observer.borrow().is_some())
}

/// Drop all observer state (for testing).
pub fn reset_viewport() {
    OBSERVER.with(|observer| *observer.borrow_mut() = None);
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;
    use crate::environment::{reset_environment, set_dom_hooks, set_platform, Platform};
    use crate::testing::TestDom;

    fn setup() -> Rc<TestDom> {
        reset_environment();
        reset_viewport();
        let dom = TestDom::new();
        set_dom_hooks(dom.clone());
        dom
    }

    fn counter() -> (Rc<Cell<u32>>, Box<dyn FnOnce()>) {
        let count = Rc::new(Cell::new(0u32));
        let count_clone = count.clone();
        (count, Box::new(move || count_clone.set(count_clone.get() + 1)))
    }

    #[test]
    fn test_subscriptions_share_one_observer() {
        let dom = setup();
        let (_c1, f1) = counter();
        let (_c2, f2) = counter();

        let _d1 = arm(1, f1);
        let _d2 = arm(2, f2);

        assert_eq!(dom.observer_count(), 1);
        assert_eq!(observed_element_count(), 2);
    }

    #[test]
    fn test_fires_on_first_intersection_only() {
        let dom = setup();
        let (count, on_fire) = counter();

        let _dispose = arm(1, on_fire);
        dom.intersect(1);
        dom.intersect(1);

        assert_eq!(count.get(), 1);
        assert_eq!(observed_element_count(), 0);
    }

    #[test]
    fn test_fire_unobserves_and_disconnects_when_empty() {
        let dom = setup();
        let (c1, f1) = counter();
        let (c2, f2) = counter();

        let _d1 = arm(1, f1);
        let _d2 = arm(2, f2);

        dom.intersect(1);
        assert_eq!(c1.get(), 1);
        assert_eq!(c2.get(), 0);
        assert!(observer_active(), "element 2 is still observed");

        dom.intersect(2);
        assert_eq!(c2.get(), 1);
        assert!(!observer_active(), "empty observed set disconnects");
        assert_eq!(dom.observer_count(), 0);
    }

    #[test]
    fn test_disarm_tears_down_when_last() {
        let dom = setup();
        let (count, on_fire) = counter();

        let dispose = arm(1, on_fire);
        assert!(observer_active());

        dispose();
        assert!(!observer_active());
        assert_eq!(dom.observer_count(), 0);

        dom.intersect(1);
        assert_eq!(count.get(), 0);
    }

    #[test]
    fn test_two_subscribers_same_element() {
        let dom = setup();
        let (c1, f1) = counter();
        let (c2, f2) = counter();

        let _d1 = arm(1, f1);
        let _d2 = arm(1, f2);
        assert_eq!(observed_element_count(), 1);

        dom.intersect(1);
        assert_eq!(c1.get(), 1);
        assert_eq!(c2.get(), 1);
        assert!(!observer_active());
    }

    #[test]
    fn test_inert_on_server_platform() {
        let dom = setup();
        set_platform(Platform::Server);
        let (count, on_fire) = counter();

        let dispose = arm(1, on_fire);
        assert!(!observer_active());
        assert_eq!(dom.observer_count(), 0);
        dom.intersect(1);
        assert_eq!(count.get(), 0);
        dispose();
    }
}
