//! Trigger anchor resolution.
//!
//! DOM-bound triggers name an anchor by local ref, or take the implicit one:
//! the first DOM node of the placeholder sub-view. Named lookup searches the
//! placeholder first, then walks outward through each lexically enclosing
//! view scope up to the template root. Component refs already record the
//! component's host element, so whatever a ref resolves to is observable
//! directly. A miss surfaces [`Diagnostic::UnresolvedTrigger`] and leaves the
//! trigger inert.

use crate::error::{report, Diagnostic};
use crate::view::{self, ElementId, ViewId};

/// Resolve a trigger anchor.
///
/// `start_view` is the view the defer block sits in; `placeholder_view` is
/// the rendered placeholder sub-view, when there is one. Resolution runs
/// after the placeholder renders because anchors may reference its content.
pub fn resolve_anchor(
    start_view: ViewId,
    placeholder_view: Option<ViewId>,
    anchor: Option<&str>,
) -> Option<ElementId> {
    let found = match anchor {
        None => placeholder_view.and_then(view::first_rendered_node),
        Some(name) => placeholder_view
            .and_then(|placeholder| view::local_ref(placeholder, name))
            .or_else(|| search_enclosing_scopes(start_view, name)),
    };

    if found.is_none() {
        report(Diagnostic::UnresolvedTrigger {
            anchor: anchor.map(String::from),
        });
    }
    found
}

fn search_enclosing_scopes(start: ViewId, name: &str) -> Option<ElementId> {
    let mut current = Some(start);
    while let Some(scope) = current {
        if let Some(element) = view::local_ref(scope, name) {
            return Some(element);
        }
        current = view::parent_view(scope);
    }
    None
}
