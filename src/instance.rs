//! Defer instance controller.
//!
//! One [`DeferInstance`] exists per descriptor occurrence in a rendered view.
//! At creation it renders the placeholder, arms both trigger channels, and
//! registers itself with the enclosing view's destruction path. From then on
//! it owns the block's lifecycle:
//!
//! - prefetch fires start the shared dependency load without touching the
//!   rendered view;
//! - the first main fire releases every remaining trigger subscription and
//!   transitions per the state machine — synchronously to Complete when the
//!   bundle is already cached, through Loading otherwise;
//! - `when` expressions are polled once per [`detect_changes`] pass, firing
//!   on their first truthy reading.
//!
//! Destruction cancels timers, listeners, and observer entries synchronously.
//! An in-flight dependency load cannot be cancelled; its resolution is
//! ignored by a destroyed instance while the bundle stays cached on the
//! descriptor for later instances.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use crate::cleanup::CleanupRegistry;
use crate::descriptor::{DeferDescriptor, TriggerChannel, TriggerKind};
use crate::environment::{self, DeferBehavior};
use crate::loader::{self, LoadOutcome};
use crate::machine::{self, Advance, MainState, PrefetchState};
use crate::resolver;
use crate::scheduler::{self, Disposer};
use crate::triggers::{dom, idle, viewport};
use crate::view::{self, ContainerId, ElementId, ViewId};

// =============================================================================
// Instance Registry
// =============================================================================

thread_local! {
    static INSTANCES: RefCell<Vec<Rc<DeferInstance>>> = const { RefCell::new(Vec::new()) };
}

/// Poll every live instance's `when` triggers.
///
/// The host calls this once per change-detection pass; each expression is
/// read once and fires its channel on the first truthy reading. Inactive
/// under [`DeferBehavior::Manual`].
pub fn detect_changes() {
    if environment::behavior() == DeferBehavior::Manual {
        return;
    }
    let instances: Vec<Rc<DeferInstance>> = INSTANCES.with(|list| list.borrow().clone());
    for instance in instances {
        instance.poll_when();
    }
}

/// Number of live (not yet destroyed) instances.
pub fn live_instance_count() -> usize {
    INSTANCES.with(|list| list.borrow().len())
}

/// Drop every registered instance (for testing).
pub fn reset_instances() {
    INSTANCES.with(|list| list.borrow_mut().clear());
}

fn unregister(instance: &DeferInstance) {
    INSTANCES.with(|list| {
        list.borrow_mut()
            .retain(|other| !std::ptr::eq(Rc::as_ptr(other), instance as *const DeferInstance));
    });
}

// =============================================================================
// Instance
// =============================================================================

/// Runtime occurrence of a defer descriptor, bound to a host container.
pub struct DeferInstance {
    descriptor: Rc<DeferDescriptor>,
    container: ContainerId,
    main_state: Cell<MainState>,
    prefetch_state: Cell<PrefetchState>,
    main_fired: Cell<bool>,
    prefetch_fired: Cell<bool>,
    destroyed: Cell<bool>,
    cleanup: RefCell<CleanupRegistry>,
    when_main: RefCell<Vec<Rc<dyn Fn() -> bool>>>,
    when_prefetch: RefCell<Vec<Rc<dyn Fn() -> bool>>>,
    weak_self: Weak<DeferInstance>,
}

impl DeferInstance {
    /// Create and wire an instance into `container`.
    ///
    /// Renders the placeholder (if any), arms both channels, and ties the
    /// instance's release to the enclosing view's destruction. `immediate`
    /// triggers fire before this returns.
    pub fn create(descriptor: Rc<DeferDescriptor>, container: ContainerId) -> Rc<Self> {
        let instance = Rc::new_cyclic(|weak| Self {
            descriptor,
            container,
            main_state: Cell::new(MainState::Placeholder),
            prefetch_state: Cell::new(PrefetchState::NotStarted),
            main_fired: Cell::new(false),
            prefetch_fired: Cell::new(false),
            destroyed: Cell::new(false),
            cleanup: RefCell::new(CleanupRegistry::new()),
            when_main: RefCell::new(Vec::new()),
            when_prefetch: RefCell::new(Vec::new()),
            weak_self: weak.clone(),
        });
        INSTANCES.with(|list| list.borrow_mut().push(instance.clone()));

        if let Some(owner) = view::container_owner(container) {
            let weak = Rc::downgrade(&instance);
            view::on_destroy(owner, move || {
                if let Some(instance) = weak.upgrade() {
                    instance.destroy();
                }
            });
        }

        if instance.descriptor.placeholder.is_some() {
            view::swap(container, instance.descriptor.placeholder.as_ref());
        }

        if environment::behavior() == DeferBehavior::Playthrough {
            instance.arm_triggers();
        }
        instance
    }

    /// Rendered lifecycle state of the main channel.
    pub fn main_state(&self) -> MainState {
        self.main_state.get()
    }

    /// Loading state of the prefetch channel.
    pub fn prefetch_state(&self) -> PrefetchState {
        self.prefetch_state.get()
    }

    /// The host container this instance renders into.
    pub fn container(&self) -> ContainerId {
        self.container
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.get()
    }

    // -------------------------------------------------------------------------
    // Trigger wiring
    // -------------------------------------------------------------------------

    fn arm_triggers(self: &Rc<Self>) {
        let placeholder_view = view::active_view(self.container);
        let owner = view::container_owner(self.container);
        let mut immediate: Vec<TriggerChannel> = Vec::new();

        for spec in &self.descriptor.triggers {
            let channel = spec.channel;
            match &spec.kind {
                TriggerKind::When(getter) => match channel {
                    TriggerChannel::Main => self.when_main.borrow_mut().push(getter.clone()),
                    TriggerChannel::Prefetch => {
                        self.when_prefetch.borrow_mut().push(getter.clone())
                    }
                },
                TriggerKind::Immediate => immediate.push(channel),
                TriggerKind::Idle => {
                    let disposer = idle::arm(self.fire_once(channel));
                    self.cleanup.borrow_mut().add(disposer);
                }
                TriggerKind::Timer(delay_ms) => {
                    let disposer = scheduler::on_timeout(*delay_ms, self.fire_once(channel));
                    self.cleanup.borrow_mut().add(disposer);
                }
                TriggerKind::Interaction(anchor) => {
                    self.arm_dom(channel, anchor.as_deref(), owner, placeholder_view, dom::arm_interaction);
                }
                TriggerKind::Hover(anchor) => {
                    self.arm_dom(channel, anchor.as_deref(), owner, placeholder_view, dom::arm_hover);
                }
                TriggerKind::Viewport(anchor) => {
                    self.arm_dom(channel, anchor.as_deref(), owner, placeholder_view, viewport::arm);
                }
            }
        }

        // Prefetch immediates first: a same-task main immediate then finds
        // the load already in progress and shares it.
        immediate.sort_by_key(|channel| match channel {
            TriggerChannel::Prefetch => 0,
            TriggerChannel::Main => 1,
        });
        for channel in immediate {
            self.fire(channel);
        }
    }

    fn arm_dom(
        self: &Rc<Self>,
        channel: TriggerChannel,
        anchor: Option<&str>,
        owner: Option<ViewId>,
        placeholder_view: Option<ViewId>,
        arm: fn(ElementId, Box<dyn FnOnce()>) -> Disposer,
    ) {
        if !environment::dom_triggers_active() {
            return;
        }
        let Some(owner) = owner else {
            return;
        };
        let Some(element) = resolver::resolve_anchor(owner, placeholder_view, anchor) else {
            // Diagnostic already surfaced; the trigger stays inert.
            return;
        };
        let disposer = arm(element, self.fire_once(channel));
        self.cleanup.borrow_mut().add(disposer);
    }

    fn fire_once(self: &Rc<Self>, channel: TriggerChannel) -> Box<dyn FnOnce()> {
        let weak = Rc::downgrade(self);
        Box::new(move || {
            if let Some(instance) = weak.upgrade() {
                instance.fire(channel);
            }
        })
    }

    /// Poll `when` expressions, firing each channel on its first truthy read.
    fn poll_when(self: &Rc<Self>) {
        if self.destroyed.get() {
            return;
        }
        if !self.prefetch_fired.get() {
            let getters: Vec<Rc<dyn Fn() -> bool>> = self.when_prefetch.borrow().clone();
            if getters.iter().any(|getter| getter()) {
                self.fire(TriggerChannel::Prefetch);
            }
        }
        if !self.main_fired.get() && self.main_state.get() == MainState::Placeholder {
            let getters: Vec<Rc<dyn Fn() -> bool>> = self.when_main.borrow().clone();
            if getters.iter().any(|getter| getter()) {
                self.fire(TriggerChannel::Main);
            }
        }
    }

    // -------------------------------------------------------------------------
    // Fires and transitions
    // -------------------------------------------------------------------------

    /// Deliver a trigger fire on the given channel.
    ///
    /// At most one fire per channel takes effect across the instance's
    /// lifetime; later deliveries are discarded. Public so manual-behavior
    /// fixtures can drive blocks directly.
    pub fn fire(self: &Rc<Self>, channel: TriggerChannel) {
        if self.destroyed.get() {
            return;
        }
        match channel {
            TriggerChannel::Prefetch => self.fire_prefetch(),
            TriggerChannel::Main => self.fire_main(),
        }
    }

    fn fire_prefetch(self: &Rc<Self>) {
        if self.prefetch_fired.replace(true) {
            return;
        }
        if self.prefetch_state.get() != PrefetchState::NotStarted {
            return;
        }
        self.prefetch_state.set(PrefetchState::InProgress);

        let weak = self.weak_self.clone();
        loader::load(
            &self.descriptor,
            Box::new(move |outcome| {
                let Some(instance) = weak.upgrade() else {
                    return;
                };
                if instance.destroyed.get() {
                    return;
                }
                instance.prefetch_state.set(match outcome {
                    LoadOutcome::Resolved(_) => PrefetchState::Complete,
                    LoadOutcome::Failed(_) => PrefetchState::Failed,
                });
            }),
        );
    }

    fn fire_main(self: &Rc<Self>) {
        if self.main_fired.replace(true) {
            return;
        }
        if self.main_state.get() != MainState::Placeholder {
            return;
        }

        // The block is loading: every remaining subscription goes away now,
        // on both channels.
        self.release_triggers();

        match self.prefetch_state.get() {
            // Bundle already cached: no Loading flash.
            PrefetchState::Complete => self.transition(MainState::Complete),
            PrefetchState::Failed => self.transition(MainState::Failed),
            PrefetchState::NotStarted | PrefetchState::InProgress => {
                self.transition(MainState::Loading);
                let weak = self.weak_self.clone();
                loader::load(
                    &self.descriptor,
                    Box::new(move |outcome| {
                        let Some(instance) = weak.upgrade() else {
                            return;
                        };
                        if instance.destroyed.get() {
                            return;
                        }
                        match outcome {
                            LoadOutcome::Resolved(_) => instance.transition(MainState::Complete),
                            LoadOutcome::Failed(_) => instance.transition(MainState::Failed),
                        }
                    }),
                );
            }
        }
    }

    fn transition(&self, next: MainState) {
        let current = self.main_state.get();
        match machine::advance_main(current, next) {
            Advance::Apply => {
                self.main_state.set(next);
                self.render(next);
                environment::notify_change();
            }
            Advance::Ignore | Advance::Rejected => {}
        }
    }

    fn render(&self, state: MainState) {
        if !view::container_exists(self.container) {
            return;
        }
        match state {
            MainState::Placeholder => {
                view::swap(self.container, self.descriptor.placeholder.as_ref());
            }
            MainState::Loading => {
                // Without a loading template the placeholder stays rendered.
                if self.descriptor.loading.is_some() {
                    view::swap(self.container, self.descriptor.loading.as_ref());
                }
            }
            MainState::Complete => {
                let rendered = view::swap(self.container, Some(&self.descriptor.main));
                if let (Some(view_id), Some(bundle)) =
                    (rendered, loader::cached_bundle(&self.descriptor))
                {
                    view::attach_directives(view_id, &bundle);
                }
            }
            MainState::Failed => {
                view::swap(self.container, self.descriptor.error.as_ref());
            }
        }
    }

    fn release_triggers(&self) {
        self.cleanup.borrow_mut().run_all();
        self.when_main.borrow_mut().clear();
        self.when_prefetch.borrow_mut().clear();
    }

    // -------------------------------------------------------------------------
    // Destruction
    // -------------------------------------------------------------------------

    /// Release every subscription and detach from the container.
    ///
    /// Idempotent. Invoked automatically when the enclosing view is
    /// destroyed. The descriptor's cached bundle survives.
    pub fn destroy(&self) {
        if self.destroyed.replace(true) {
            return;
        }
        self.release_triggers();
        if view::container_exists(self.container) {
            view::swap(self.container, None);
        }
        unregister(self);
    }
}
