//! View registry - embedded views, containers, refs, projection, queries.
//!
//! The swapper and the trigger resolver drive rendering through this module.
//! Views are indices into a thread-local registry; each view records its
//! lexical parent, its DOM nodes, its named local refs, the directives it
//! instantiated, and an optional projection slot. A [`ContainerId`] is the
//! host anchor a defer block renders into: at most one view is attached to a
//! container at any time.
//!
//! # Ownership
//!
//! A view owns the containers declared inside it; destroying the view tears
//! down each container's attached view first, then runs the view's destroy
//! callbacks in reverse registration order. Nothing here owns a defer
//! instance — instances subscribe to their enclosing view's destruction via
//! [`on_destroy`] and release themselves.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

// =============================================================================
// Identifiers
// =============================================================================

/// A DOM node handle. Opaque to the runtime; anchors resolve to these.
pub type ElementId = usize;

/// An embedded view handle.
pub type ViewId = usize;

/// A host anchor that renders at most one view at a time.
pub type ContainerId = usize;

// =============================================================================
// Directives
// =============================================================================

/// What kind of definition a [`DirectiveDef`] resolves to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DirectiveKind {
    Component,
    Directive,
    Pipe,
}

/// A resolved component, directive, or pipe definition.
///
/// Dependency bundles are ordered lists of these; content queries enumerate
/// them per rendered view.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DirectiveDef {
    pub name: String,
    pub kind: DirectiveKind,
}

impl DirectiveDef {
    pub fn component(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: DirectiveKind::Component,
        }
    }

    pub fn directive(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: DirectiveKind::Directive,
        }
    }

    pub fn pipe(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: DirectiveKind::Pipe,
        }
    }
}

// =============================================================================
// Templates
// =============================================================================

/// A compiler-emitted view factory.
///
/// Instantiating a template runs its build closure against a fresh
/// [`ViewBuilder`]; the collected nodes, refs, and directives become the new
/// view's content.
#[derive(Clone)]
pub struct Template {
    build: Rc<dyn Fn(&mut ViewBuilder)>,
}

impl Template {
    pub fn new(build: impl Fn(&mut ViewBuilder) + 'static) -> Self {
        Self {
            build: Rc::new(build),
        }
    }
}

impl fmt::Debug for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Template")
    }
}

/// Collects the content of a view while its template builds.
pub struct ViewBuilder {
    nodes: Vec<ElementId>,
    refs: HashMap<String, ElementId>,
    directives: Vec<DirectiveDef>,
    projection_index: Option<usize>,
}

impl ViewBuilder {
    fn new() -> Self {
        Self {
            nodes: Vec::new(),
            refs: HashMap::new(),
            directives: Vec::new(),
            projection_index: None,
        }
    }

    /// Append a plain element node.
    pub fn element(&mut self, tag: &str) -> ElementId {
        let element = next_element_id();
        ELEMENT_TAGS.with(|tags| tags.borrow_mut().insert(element, tag.to_string()));
        self.nodes.push(element);
        element
    }

    /// Append a component: a host element plus its component definition.
    /// Returns the host element, which is what component anchors resolve to.
    pub fn component(&mut self, name: &str) -> ElementId {
        let host = self.element(name);
        self.directives.push(DirectiveDef::component(name));
        host
    }

    /// Attach a non-component directive to the view.
    pub fn directive(&mut self, name: &str) {
        self.directives.push(DirectiveDef::directive(name));
    }

    /// Name an element so trigger anchors and tests can look it up.
    pub fn local_ref(&mut self, name: &str, element: ElementId) {
        self.refs.insert(name.to_string(), element);
    }

    /// Declare a projection slot at the current position. Projected content
    /// supplied to the enclosing container renders here.
    pub fn projection_slot(&mut self) {
        self.projection_index = Some(self.nodes.len());
    }
}

// =============================================================================
// Registry State
// =============================================================================

struct ViewRecord {
    parent: Option<ViewId>,
    /// Container this view is attached in, if it was rendered through one.
    container: Option<ContainerId>,
    nodes: Vec<ElementId>,
    refs: HashMap<String, ElementId>,
    directives: Vec<DirectiveDef>,
    projection_index: Option<usize>,
    /// Containers declared inside this view, torn down with it.
    containers: Vec<ContainerId>,
}

struct ContainerRecord {
    owner: ViewId,
    active: Option<ViewId>,
    projected: Vec<ElementId>,
}

thread_local! {
    static VIEWS: RefCell<HashMap<ViewId, ViewRecord>> = RefCell::new(HashMap::new());

    static CONTAINERS: RefCell<HashMap<ContainerId, ContainerRecord>> = RefCell::new(HashMap::new());

    static DESTROY_CALLBACKS: RefCell<HashMap<ViewId, Vec<Box<dyn FnOnce()>>>> =
        RefCell::new(HashMap::new());

    static ELEMENT_TAGS: RefCell<HashMap<ElementId, String>> = RefCell::new(HashMap::new());

    static NEXT_VIEW: Cell<ViewId> = const { Cell::new(0) };
    static NEXT_CONTAINER: Cell<ContainerId> = const { Cell::new(0) };
    static NEXT_ELEMENT: Cell<ElementId> = const { Cell::new(0) };
}

fn next_view_id() -> ViewId {
    NEXT_VIEW.with(|next| {
        let id = next.get();
        next.set(id + 1);
        id
    })
}

fn next_container_id() -> ContainerId {
    NEXT_CONTAINER.with(|next| {
        let id = next.get();
        next.set(id + 1);
        id
    })
}

fn next_element_id() -> ElementId {
    NEXT_ELEMENT.with(|next| {
        let id = next.get();
        next.set(id + 1);
        id
    })
}

// =============================================================================
// Views
// =============================================================================

/// Instantiate a template as an embedded view under the given lexical parent.
pub fn instantiate(template: &Template, parent: Option<ViewId>) -> ViewId {
    let mut builder = ViewBuilder::new();
    (template.build)(&mut builder);

    let view = next_view_id();
    let record = ViewRecord {
        parent,
        container: None,
        nodes: builder.nodes,
        refs: builder.refs,
        directives: builder.directives,
        projection_index: builder.projection_index,
        containers: Vec::new(),
    };
    VIEWS.with(|views| views.borrow_mut().insert(view, record));
    view
}

/// Destroy a view: its containers' attached views first, then its destroy
/// callbacks in reverse registration order.
pub fn destroy_view(view: ViewId) {
    let record = VIEWS.with(|views| views.borrow_mut().remove(&view));
    let Some(record) = record else { return };

    // Detach from the container that rendered this view, if it still exists.
    if let Some(container) = record.container {
        CONTAINERS.with(|containers| {
            if let Some(rec) = containers.borrow_mut().get_mut(&container) {
                if rec.active == Some(view) {
                    rec.active = None;
                }
            }
        });
    }

    // Tear down owned containers before this view's own callbacks run.
    for container in record.containers.iter().rev() {
        let attached = CONTAINERS
            .with(|containers| containers.borrow_mut().remove(container))
            .and_then(|rec| rec.active);
        if let Some(child) = attached {
            destroy_view(child);
        }
    }

    let callbacks = DESTROY_CALLBACKS.with(|cbs| cbs.borrow_mut().remove(&view));
    if let Some(callbacks) = callbacks {
        for callback in callbacks.into_iter().rev() {
            callback();
        }
    }

    ELEMENT_TAGS.with(|tags| {
        let mut tags = tags.borrow_mut();
        for element in &record.nodes {
            tags.remove(element);
        }
    });
}

/// Register a callback to run when the view is destroyed.
pub fn on_destroy(view: ViewId, callback: impl FnOnce() + 'static) {
    DESTROY_CALLBACKS.with(|cbs| {
        cbs.borrow_mut()
            .entry(view)
            .or_default()
            .push(Box::new(callback));
    });
}

/// Whether the view is still alive.
pub fn view_exists(view: ViewId) -> bool {
    VIEWS.with(|views| views.borrow().contains_key(&view))
}

/// Lexical parent of a view.
pub fn parent_view(view: ViewId) -> Option<ViewId> {
    VIEWS.with(|views| views.borrow().get(&view).and_then(|record| record.parent))
}

/// Look up a named local ref declared in the view.
pub fn local_ref(view: ViewId, name: &str) -> Option<ElementId> {
    VIEWS.with(|views| {
        views
            .borrow()
            .get(&view)
            .and_then(|record| record.refs.get(name).copied())
    })
}

/// Directives instantiated in the view, template-declared and bundle-attached.
pub fn view_directives(view: ViewId) -> Vec<DirectiveDef> {
    VIEWS.with(|views| {
        views
            .borrow()
            .get(&view)
            .map(|record| record.directives.clone())
            .unwrap_or_default()
    })
}

/// Attach bundle-resolved definitions to a rendered view.
pub fn attach_directives(view: ViewId, bundle: &[DirectiveDef]) {
    VIEWS.with(|views| {
        if let Some(record) = views.borrow_mut().get_mut(&view) {
            record.directives.extend(bundle.iter().cloned());
        }
    });
}

/// The view's nodes in render order, with projected content spliced in at the
/// projection slot when the view declares one.
pub fn rendered_nodes(view: ViewId) -> Vec<ElementId> {
    let (mut nodes, slot) = VIEWS.with(|views| {
        let views = views.borrow();
        match views.get(&view) {
            Some(record) => (
                record.nodes.clone(),
                record
                    .projection_index
                    .map(|index| (index, record.container)),
            ),
            None => (Vec::new(), None),
        }
    });

    if let Some((index, Some(container))) = slot {
        let projected = CONTAINERS.with(|containers| {
            containers
                .borrow()
                .get(&container)
                .map(|record| record.projected.clone())
                .unwrap_or_default()
        });
        nodes.splice(index..index, projected);
    }
    nodes
}

/// First rendered DOM node of the view. Implicit trigger anchors use this.
pub fn first_rendered_node(view: ViewId) -> Option<ElementId> {
    rendered_nodes(view).first().copied()
}

/// Tag an element was created with (debugging and tests).
pub fn element_tag(element: ElementId) -> Option<String> {
    ELEMENT_TAGS.with(|tags| tags.borrow().get(&element).cloned())
}

/// Number of live views.
pub fn live_view_count() -> usize {
    VIEWS.with(|views| views.borrow().len())
}

// =============================================================================
// Containers
// =============================================================================

/// Declare a container (host anchor) inside the given view.
pub fn create_container(owner: ViewId) -> ContainerId {
    let container = next_container_id();
    CONTAINERS.with(|containers| {
        containers.borrow_mut().insert(
            container,
            ContainerRecord {
                owner,
                active: None,
                projected: Vec::new(),
            },
        );
    });
    VIEWS.with(|views| {
        if let Some(record) = views.borrow_mut().get_mut(&owner) {
            record.containers.push(container);
        }
    });
    container
}

/// Whether the container is still alive.
pub fn container_exists(container: ContainerId) -> bool {
    CONTAINERS.with(|containers| containers.borrow().contains_key(&container))
}

/// The view a container was declared in.
pub fn container_owner(container: ContainerId) -> Option<ViewId> {
    CONTAINERS.with(|containers| {
        containers
            .borrow()
            .get(&container)
            .map(|record| record.owner)
    })
}

/// The view currently attached to the container, if any.
pub fn active_view(container: ContainerId) -> Option<ViewId> {
    CONTAINERS.with(|containers| {
        containers
            .borrow()
            .get(&container)
            .and_then(|record| record.active)
    })
}

/// Supply projected content from the enclosing component. It renders inside
/// whichever attached view declares a projection slot.
pub fn set_projected_content(container: ContainerId, nodes: Vec<ElementId>) {
    CONTAINERS.with(|containers| {
        if let Some(record) = containers.borrow_mut().get_mut(&container) {
            record.projected = nodes;
        }
    });
}

/// Destroy the attached view (if any) and render the given template instead.
///
/// Passing `None` leaves the container empty. Returns the new view.
pub fn swap(container: ContainerId, template: Option<&Template>) -> Option<ViewId> {
    let previous = CONTAINERS.with(|containers| {
        containers
            .borrow_mut()
            .get_mut(&container)
            .and_then(|record| record.active.take())
    });
    if let Some(previous) = previous {
        destroy_view(previous);
    }

    let template = template?;
    let owner = container_owner(container)?;
    let view = instantiate(template, Some(owner));

    VIEWS.with(|views| {
        if let Some(record) = views.borrow_mut().get_mut(&view) {
            record.container = Some(container);
        }
    });
    CONTAINERS.with(|containers| {
        if let Some(record) = containers.borrow_mut().get_mut(&container) {
            record.active = Some(view);
        }
    });
    Some(view)
}

/// Content-query seam: the directives live in the container's attached view.
///
/// Queries declared on the enclosing component re-resolve through this after
/// every swap and observe exactly the active sub-view's directives.
pub fn content_directives(container: ContainerId) -> Vec<DirectiveDef> {
    active_view(container)
        .map(view_directives)
        .unwrap_or_default()
}

// =============================================================================
// Reset (for testing)
// =============================================================================

/// Clear every view, container, and callback.
pub fn reset_views() {
    VIEWS.with(|views| views.borrow_mut().clear());
    CONTAINERS.with(|containers| containers.borrow_mut().clear());
    DESTROY_CALLBACKS.with(|cbs| cbs.borrow_mut().clear());
    ELEMENT_TAGS.with(|tags| tags.borrow_mut().clear());
    NEXT_VIEW.with(|next| next.set(0));
    NEXT_CONTAINER.with(|next| next.set(0));
    NEXT_ELEMENT.with(|next| next.set(0));
}
