//! Dependency load coordination.
//!
//! Each descriptor owns one load cell. The first [`load`] call — whichever
//! channel or instance makes it — invokes the compiler-emitted loader exactly
//! once; every other call just observes the shared cell. Outcomes are final:
//! a resolved bundle is cached on the descriptor for later instances, and a
//! rejection is re-delivered to every later request without retrying.
//!
//! The loader itself is continuation-passing: it receives a [`LoadHandle`]
//! and settles it whenever the host's async machinery finishes. The runtime
//! never blocks on it and never throws through it — failures travel as
//! [`LoadError`] values.

use std::cell::RefCell;
use std::rc::Rc;

use crate::descriptor::DeferDescriptor;
use crate::environment;
use crate::error::LoadError;
use crate::view::DirectiveDef;

// =============================================================================
// Types
// =============================================================================

/// Ordered set of resolved definitions required by the main sub-view.
pub type Bundle = Vec<DirectiveDef>;

/// The compiler-emitted async producer of a block's dependency bundle.
///
/// Invoked at most once per descriptor; settles the given handle when done.
pub type DependencyLoader = Rc<dyn Fn(LoadHandle)>;

/// Environment-provided transform applied to the raw loader before its single
/// invocation. Absence means identity.
pub type LoaderInterceptor = Rc<dyn Fn(DependencyLoader) -> DependencyLoader>;

/// Observer of a load cell's final outcome.
pub type LoadObserver = Box<dyn FnOnce(&LoadOutcome)>;

/// Final result of a dependency load.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LoadOutcome {
    Resolved(Bundle),
    Failed(LoadError),
}

/// Shared load state stored on the descriptor.
pub(crate) enum LoadCell {
    NotStarted,
    Pending(Vec<LoadObserver>),
    Settled(LoadOutcome),
}

// =============================================================================
// Load Handle
// =============================================================================

/// Settles a descriptor's load cell. Handed to the dependency loader; the
/// first settle wins and later ones are ignored.
#[derive(Clone)]
pub struct LoadHandle {
    cell: Rc<RefCell<LoadCell>>,
}

impl LoadHandle {
    pub fn resolve(&self, bundle: Bundle) {
        self.settle(LoadOutcome::Resolved(bundle));
    }

    pub fn reject(&self, error: LoadError) {
        self.settle(LoadOutcome::Failed(error));
    }

    fn settle(&self, outcome: LoadOutcome) {
        let observers = {
            let mut cell = self.cell.borrow_mut();
            if let LoadCell::Settled(_) = &*cell {
                return;
            }
            match std::mem::replace(&mut *cell, LoadCell::Settled(outcome.clone())) {
                LoadCell::Pending(observers) => observers,
                _ => Vec::new(),
            }
        };
        for observer in observers {
            observer(&outcome);
        }
    }
}

// =============================================================================
// Load API
// =============================================================================

/// Request the descriptor's dependency bundle and observe the outcome.
///
/// Idempotent: the loader runs on the first call only; later calls attach to
/// the pending cell or receive the settled outcome synchronously.
pub fn load(descriptor: &DeferDescriptor, observer: LoadObserver) {
    let (deliver, invoke) = {
        let mut cell = descriptor.load.borrow_mut();
        match &mut *cell {
            LoadCell::Settled(outcome) => (Some((observer, outcome.clone())), false),
            LoadCell::Pending(observers) => {
                observers.push(observer);
                (None, false)
            }
            LoadCell::NotStarted => {
                *cell = LoadCell::Pending(vec![observer]);
                (None, true)
            }
        }
    };

    if let Some((observer, outcome)) = deliver {
        observer(&outcome);
        return;
    }
    if invoke {
        let raw = descriptor.loader.clone();
        let effective = match environment::loader_interceptor() {
            Some(interceptor) => interceptor(raw),
            None => raw,
        };
        effective(LoadHandle {
            cell: descriptor.load.clone(),
        });
    }
}

/// Start loading without observing the outcome. Programmatic counterpart of a
/// prefetch trigger; shares the same cell and the same at-most-once contract.
pub fn prefetch(descriptor: &DeferDescriptor) {
    load(descriptor, Box::new(|_| {}));
}

/// The bundle cached on the descriptor, once a load has resolved.
pub fn cached_bundle(descriptor: &DeferDescriptor) -> Option<Bundle> {
    match &*descriptor.load.borrow() {
        LoadCell::Settled(LoadOutcome::Resolved(bundle)) => Some(bundle.clone()),
        _ => None,
    }
}
