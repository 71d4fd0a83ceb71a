//! End-to-end defer block scenarios, driven through the deterministic fakes.

use std::cell::Cell;
use std::rc::Rc;

use defer_runtime::testing::{install, ManualLoader};
use defer_runtime::view::{self, ContainerId, DirectiveDef, Template, ViewId};
use defer_runtime::{
    detect_changes, live_instance_count, set_loader_interceptor, set_platform, DeferDescriptor,
    DeferInstance, DependencyLoader, Diagnostic, DomEventKind, LoadError, LoadHandle, MainState,
    Platform, PrefetchState, TriggerKind, TriggerSpec,
};

fn component(tag: &'static str) -> Template {
    Template::new(move |b| {
        b.component(tag);
    })
}

fn empty() -> Template {
    Template::new(|_| {})
}

fn getter(flag: &Rc<Cell<bool>>) -> Rc<dyn Fn() -> bool> {
    let flag = flag.clone();
    Rc::new(move || flag.get())
}

fn host() -> (ContainerId, ViewId) {
    let root = view::instantiate(&empty(), None);
    let container = view::create_container(root);
    (container, root)
}

fn rendered(container: ContainerId) -> Vec<String> {
    view::content_directives(container)
        .into_iter()
        .map(|directive| directive.name)
        .collect()
}

#[test]
fn s1_when_trigger_walks_placeholder_loading_main() {
    let _env = install();
    let (container, _root) = host();
    let (loader, control) = ManualLoader::new();

    let is_visible = Rc::new(Cell::new(false));
    let descriptor = Rc::new(
        DeferDescriptor::new(empty(), loader)
            .with_placeholder(component("PlaceholderCmp"))
            .with_loading(component("LoadingCmp"))
            .with_trigger(TriggerSpec::main(TriggerKind::When(getter(&is_visible)))),
    );
    let instance = DeferInstance::create(descriptor, container);

    detect_changes();
    assert_eq!(instance.main_state(), MainState::Placeholder);
    assert_eq!(rendered(container), ["PlaceholderCmp"]);

    is_visible.set(true);
    detect_changes();
    assert_eq!(instance.main_state(), MainState::Loading);
    assert_eq!(rendered(container), ["LoadingCmp"]);

    control.resolve(vec![DirectiveDef::component("MainCmp")]);
    assert_eq!(instance.main_state(), MainState::Complete);
    assert_eq!(rendered(container), ["MainCmp"]);
    assert_eq!(control.calls(), 1);
}

#[test]
fn s2_loader_rejection_renders_queryable_error_view() {
    let _env = install();
    let (container, _root) = host();
    let (loader, control) = ManualLoader::new();

    let is_visible = Rc::new(Cell::new(false));
    let descriptor = Rc::new(
        DeferDescriptor::new(empty(), loader)
            .with_placeholder(component("PlaceholderCmp"))
            .with_loading(component("LoadingCmp"))
            .with_error(component("ErrorCmp"))
            .with_trigger(TriggerSpec::main(TriggerKind::When(getter(&is_visible)))),
    );
    let instance = DeferInstance::create(descriptor, container);

    is_visible.set(true);
    detect_changes();
    control.reject(LoadError::new("chunk fetch failed"));

    assert_eq!(instance.main_state(), MainState::Failed);
    assert_eq!(
        rendered(container),
        ["ErrorCmp"],
        "directives in the error sub-view must be live for queries"
    );
}

#[test]
fn s3_immediate_trigger_with_intercepted_loader() {
    let _env = install();
    let (container, _root) = host();
    let (loader, control) = ManualLoader::new();

    let counter = Rc::new(Cell::new(0u32));
    let counter_clone = counter.clone();
    set_loader_interceptor(Some(Rc::new(move |raw: DependencyLoader| {
        let counter = counter_clone.clone();
        Rc::new(move |handle: LoadHandle| {
            counter.set(counter.get() + 1);
            raw(handle);
        }) as DependencyLoader
    })));

    let descriptor = Rc::new(
        DeferDescriptor::new(empty(), loader)
            .with_loading(component("LoadingCmp"))
            .with_trigger(TriggerSpec::main(TriggerKind::Immediate)),
    );
    let instance = DeferInstance::create(descriptor, container);

    // End of the creation pass: loading is the first visible state.
    assert_eq!(instance.main_state(), MainState::Loading);
    assert_eq!(rendered(container), ["LoadingCmp"]);
    assert_eq!(counter.get(), 1);

    control.resolve(vec![DirectiveDef::component("MainCmp")]);
    assert_eq!(instance.main_state(), MainState::Complete);
    assert_eq!(rendered(container), ["MainCmp"]);
    assert_eq!(counter.get(), 1);
}

#[test]
fn s4_prefetch_then_fire_loads_once() {
    let _env = install();
    let (container, _root) = host();
    let (loader, control) = ManualLoader::new();

    let defer_cond = Rc::new(Cell::new(false));
    let prefetch_cond = Rc::new(Cell::new(false));
    let descriptor = Rc::new(
        DeferDescriptor::new(empty(), loader)
            .with_placeholder(component("PlaceholderCmp"))
            .with_loading(component("LoadingCmp"))
            .with_trigger(TriggerSpec::main(TriggerKind::When(getter(&defer_cond))))
            .with_trigger(TriggerSpec::prefetch(TriggerKind::When(getter(
                &prefetch_cond,
            )))),
    );
    let instance = DeferInstance::create(descriptor, container);

    prefetch_cond.set(true);
    detect_changes();
    assert_eq!(control.calls(), 1);
    assert_eq!(instance.prefetch_state(), PrefetchState::InProgress);
    assert_eq!(
        rendered(container),
        ["PlaceholderCmp"],
        "prefetch must not touch the rendered view"
    );

    control.resolve(vec![DirectiveDef::component("MainCmp")]);
    assert_eq!(instance.prefetch_state(), PrefetchState::Complete);
    assert_eq!(rendered(container), ["PlaceholderCmp"]);

    defer_cond.set(true);
    detect_changes();
    // Cached bundle: straight to Complete, no Loading flash.
    assert_eq!(instance.main_state(), MainState::Complete);
    assert_eq!(rendered(container), ["MainCmp"]);
    assert_eq!(control.calls(), 1);
}

#[test]
fn s5_idle_triggers_coalesce_across_sibling_instances() {
    let (clock, _dom) = install();
    let root = view::instantiate(&empty(), None);
    let (loader, control) = ManualLoader::new();

    let descriptor = Rc::new(
        DeferDescriptor::new(empty(), loader)
            .with_placeholder(component("PlaceholderCmp"))
            .with_trigger(TriggerSpec::main(TriggerKind::Idle)),
    );

    let instances: Vec<_> = (0..3)
        .map(|_| {
            let container = view::create_container(root);
            DeferInstance::create(descriptor.clone(), container)
        })
        .collect();

    assert_eq!(live_instance_count(), 3);
    assert_eq!(clock.pending_idle(), 1, "one idle request for three blocks");

    clock.fire_idle();
    for instance in &instances {
        assert_eq!(instance.main_state(), MainState::Loading);
    }
    assert_eq!(control.calls(), 1);

    control.resolve(vec![DirectiveDef::component("MainCmp")]);
    for instance in &instances {
        assert_eq!(instance.main_state(), MainState::Complete);
        assert_eq!(rendered(instance.container()), ["MainCmp"]);
    }
}

#[test]
fn s6_interaction_trigger_with_external_anchor() {
    let (_clock, dom) = install();
    let root = view::instantiate(
        &Template::new(|b| {
            let button = b.element("button");
            b.local_ref("openButton", button);
        }),
        None,
    );
    let anchor = view::local_ref(root, "openButton").unwrap();
    let container = view::create_container(root);
    let (loader, control) = ManualLoader::new();

    let descriptor = Rc::new(
        DeferDescriptor::new(empty(), loader)
            .with_placeholder(component("PlaceholderCmp"))
            .with_trigger(TriggerSpec::main(TriggerKind::Interaction(Some(
                "openButton".into(),
            )))),
    );
    let instance = DeferInstance::create(descriptor, container);
    assert_eq!(dom.listeners_on(anchor, DomEventKind::Click), 1);
    assert_eq!(dom.listeners_on(anchor, DomEventKind::KeyDown), 1);

    dom.click(anchor);
    control.resolve(vec![DirectiveDef::component("MainCmp")]);

    assert_eq!(instance.main_state(), MainState::Complete);
    assert_eq!(rendered(container), ["MainCmp"]);

    let removed = dom.removed_listeners();
    assert!(removed.contains(&(anchor, DomEventKind::Click)));
    assert!(removed.contains(&(anchor, DomEventKind::KeyDown)));
    assert_eq!(dom.listener_count(), 0);
}

#[test]
fn cleanup_is_complete_after_view_destruction() {
    let (clock, dom) = install();
    let root = view::instantiate(
        &Template::new(|b| {
            let button = b.element("button");
            b.local_ref("anchor", button);
        }),
        None,
    );
    let container = view::create_container(root);
    let (loader, control) = ManualLoader::new();

    let descriptor = Rc::new(
        DeferDescriptor::new(empty(), loader)
            .with_placeholder(component("PlaceholderCmp"))
            .with_trigger(TriggerSpec::main(TriggerKind::Timer(1_000)))
            .with_trigger(TriggerSpec::main(TriggerKind::Idle))
            .with_trigger(TriggerSpec::prefetch(TriggerKind::Interaction(Some(
                "anchor".into(),
            ))))
            .with_trigger(TriggerSpec::main(TriggerKind::Hover(Some("anchor".into()))))
            .with_trigger(TriggerSpec::main(TriggerKind::Viewport(Some(
                "anchor".into(),
            )))),
    );
    let _instance = DeferInstance::create(descriptor, container);

    assert_eq!(clock.pending_timers(), 1);
    assert_eq!(clock.pending_idle(), 1);
    assert!(dom.listener_count() > 0);
    assert_eq!(dom.observed_element_count(), 1);

    view::destroy_view(root);

    assert_eq!(clock.pending_timers(), 0, "timers cancelled");
    assert_eq!(clock.pending_idle(), 0, "idle request cancelled");
    assert_eq!(dom.listener_count(), 0, "listeners removed");
    assert_eq!(dom.observed_element_count(), 0, "observer entries released");
    assert_eq!(dom.observer_count(), 0, "shared observer disconnected");
    assert_eq!(live_instance_count(), 0);

    clock.advance(5_000);
    clock.fire_idle();
    assert!(!control.invoked(), "no trigger path survives destruction");
}

#[test]
fn projection_follows_the_slotted_sub_view() {
    let _env = install();
    let root = view::instantiate(
        &Template::new(|b| {
            let content = b.element("span");
            b.local_ref("projected", content);
        }),
        None,
    );
    let projected = view::local_ref(root, "projected").unwrap();
    let container = view::create_container(root);
    view::set_projected_content(container, vec![projected]);
    let (loader, control) = ManualLoader::new();

    let descriptor = Rc::new(
        DeferDescriptor::new(
            // The main template has no projection slot.
            component("MainCmp"),
            loader,
        )
        .with_placeholder(Template::new(|b| {
            b.component("PlaceholderCmp");
            b.projection_slot();
        }))
        .with_trigger(TriggerSpec::main(TriggerKind::Immediate)),
    );

    // Manual stepping: hold the load so the placeholder phase is observable.
    defer_runtime::set_behavior(defer_runtime::DeferBehavior::Manual);
    let instance = DeferInstance::create(descriptor, container);

    let placeholder_view = view::active_view(container).unwrap();
    assert!(
        view::rendered_nodes(placeholder_view).contains(&projected),
        "slotted placeholder shows projected content"
    );

    instance.fire(defer_runtime::TriggerChannel::Main);
    control.resolve(Vec::new());
    let main_view = view::active_view(container).unwrap();
    assert!(
        !view::rendered_nodes(main_view).contains(&projected),
        "sub-view without a slot renders no projected content"
    );
}

#[test]
fn dom_triggers_are_inert_on_server_platform() {
    let (clock, dom) = install();
    set_platform(Platform::Server);
    let (container, _root) = host();
    let (loader, control) = ManualLoader::new();

    let is_visible = Rc::new(Cell::new(false));
    let descriptor = Rc::new(
        DeferDescriptor::new(empty(), loader)
            .with_placeholder(component("PlaceholderCmp"))
            .with_trigger(TriggerSpec::main(TriggerKind::Interaction(None)))
            .with_trigger(TriggerSpec::main(TriggerKind::Hover(None)))
            .with_trigger(TriggerSpec::main(TriggerKind::Viewport(None)))
            .with_trigger(TriggerSpec::main(TriggerKind::When(getter(&is_visible)))),
    );
    let instance = DeferInstance::create(descriptor, container);

    assert_eq!(dom.listener_count(), 0);
    assert_eq!(dom.observer_count(), 0);
    assert_eq!(clock.pending_timers(), 0);

    // `when` stays active on every platform.
    is_visible.set(true);
    detect_changes();
    assert_eq!(instance.main_state(), MainState::Loading);
    assert_eq!(control.calls(), 1);
}

#[test]
fn unresolved_anchor_leaves_block_in_placeholder() {
    let _env = install();
    let (container, _root) = host();
    let (loader, control) = ManualLoader::new();

    let descriptor = Rc::new(
        DeferDescriptor::new(empty(), loader)
            .with_placeholder(component("PlaceholderCmp"))
            .with_trigger(TriggerSpec::main(TriggerKind::Interaction(Some(
                "missing".into(),
            )))),
    );
    let instance = DeferInstance::create(descriptor, container);

    assert_eq!(instance.main_state(), MainState::Placeholder);
    assert!(!control.invoked());
    assert!(defer_runtime::take_diagnostics().contains(&Diagnostic::UnresolvedTrigger {
        anchor: Some("missing".into())
    }));
}

#[test]
fn timer_zero_fires_on_flush_not_synchronously() {
    let (clock, _dom) = install();
    let (container, _root) = host();
    let (loader, control) = ManualLoader::new();

    let descriptor = Rc::new(
        DeferDescriptor::new(empty(), loader)
            .with_placeholder(component("PlaceholderCmp"))
            .with_trigger(TriggerSpec::main(TriggerKind::Timer(0))),
    );
    let instance = DeferInstance::create(descriptor, container);

    // Unlike `immediate`, timer(0) waits for the scheduling boundary.
    assert_eq!(instance.main_state(), MainState::Placeholder);
    assert!(!control.invoked());

    clock.advance(0);
    assert_eq!(instance.main_state(), MainState::Loading);
    assert_eq!(control.calls(), 1);
}
