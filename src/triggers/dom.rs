//! Interaction and hover trigger sources.
//!
//! `interaction` listens for `click` and `keydown` on its anchor; `hover`
//! listens for `mouseenter`. Listeners attach synchronously on arming and are
//! removed before the single fire is delivered, so a second event in the same
//! task finds nothing to invoke. On non-DOM platforms the scheduler seam
//! registers nothing and these sources are inert.

use std::cell::RefCell;
use std::rc::Rc;

use crate::scheduler::{self, Disposer, DomEventKind};
use crate::view::ElementId;

/// Arm an `interaction` trigger on the anchor.
pub(crate) fn arm_interaction(anchor: ElementId, on_fire: Box<dyn FnOnce()>) -> Disposer {
    arm_listeners(anchor, &[DomEventKind::Click, DomEventKind::KeyDown], on_fire)
}

/// Arm a `hover` trigger on the anchor.
pub(crate) fn arm_hover(anchor: ElementId, on_fire: Box<dyn FnOnce()>) -> Disposer {
    arm_listeners(anchor, &[DomEventKind::MouseEnter], on_fire)
}

fn arm_listeners(
    anchor: ElementId,
    events: &[DomEventKind],
    on_fire: Box<dyn FnOnce()>,
) -> Disposer {
    let pending: Rc<RefCell<Option<Box<dyn FnOnce()>>>> = Rc::new(RefCell::new(Some(on_fire)));
    let listeners: Rc<RefCell<Vec<Disposer>>> = Rc::new(RefCell::new(Vec::new()));

    let handler: Rc<dyn Fn()> = {
        let pending = pending.clone();
        let listeners = listeners.clone();
        Rc::new(move || {
            let Some(callback) = pending.borrow_mut().take() else {
                return;
            };
            // Listeners come off before the callback runs; the source has
            // disarmed itself by the time the controller hears the fire.
            let removals: Vec<Disposer> = listeners.borrow_mut().drain(..).collect();
            for remove in removals {
                remove();
            }
            callback();
        })
    };

    for event in events {
        let disposer = scheduler::on_event(anchor, *event, handler.clone());
        listeners.borrow_mut().push(disposer);
    }

    Box::new(move || {
        pending.borrow_mut().take();
        let removals: Vec<Disposer> = listeners.borrow_mut().drain(..).collect();
        for remove in removals {
            remove();
        }
    })
}
