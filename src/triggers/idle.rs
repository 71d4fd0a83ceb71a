//! Coalesced idle trigger source.
//!
//! A repeat construct can create N sibling blocks that all ask for `on idle`;
//! issuing N platform idle requests would be pure waste. Instead a
//! process-wide queue holds every armed subscriber and keeps exactly one idle
//! request outstanding. When it fires, subscribers run in FIFO arming order
//! and the queue empties. Disarming the last subscriber cancels the pending
//! request.

use std::cell::RefCell;

use crate::scheduler::{self, Disposer};

struct IdleQueue {
    subscribers: Vec<(u64, Box<dyn FnOnce()>)>,
    /// Cancels the one outstanding idle request, when there is one.
    pending_cancel: Option<Disposer>,
    next_id: u64,
}

thread_local! {
    static QUEUE: RefCell<IdleQueue> = RefCell::new(IdleQueue {
        subscribers: Vec::new(),
        pending_cancel: None,
        next_id: 0,
    });
}

/// Subscribe to the next idle period. The returned disposer unsubscribes.
pub(crate) fn arm(callback: Box<dyn FnOnce()>) -> Disposer {
    let id = QUEUE.with(|queue| {
        let mut queue = queue.borrow_mut();
        let id = queue.next_id;
        queue.next_id += 1;
        queue.subscribers.push((id, callback));
        id
    });

    let needs_request = QUEUE.with(|queue| queue.borrow().pending_cancel.is_none());
    if needs_request {
        let cancel = scheduler::on_idle(flush);
        QUEUE.with(|queue| queue.borrow_mut().pending_cancel = Some(cancel));
    }

    Box::new(move || disarm(id))
}

/// Deliver the shared idle callback: every armed subscriber, FIFO.
fn flush() {
    let subscribers = QUEUE.with(|queue| {
        let mut queue = queue.borrow_mut();
        queue.pending_cancel = None;
        std::mem::take(&mut queue.subscribers)
    });
    for (_, callback) in subscribers {
        callback();
    }
}

fn disarm(id: u64) {
    let cancel = QUEUE.with(|queue| {
        let mut queue = queue.borrow_mut();
        queue.subscribers.retain(|(subscriber, _)| *subscriber != id);
        if queue.subscribers.is_empty() {
            queue.pending_cancel.take()
        } else {
            None
        }
    });
    if let Some(cancel) = cancel {
        cancel();
    }
}

/// Number of armed idle subscribers (for testing).
pub fn subscriber_count() -> usize {
    QUEUE.with(|queue| queue.borrow().subscribers.len())
}

/// Whether an idle request is currently outstanding (for testing).
pub fn request_outstanding() -> bool {
    QUEUE.with(|queue| queue.borrow().pending_cancel.is_some())
}

/// Drop all queue state (for testing).
pub fn reset_idle() {
    QUEUE.with(|queue| {
        let mut queue = queue.borrow_mut();
        queue.subscribers.clear();
        queue.pending_cancel = None;
        queue.next_id = 0;
    });
}
