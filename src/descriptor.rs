//! Defer descriptors - the compiler-emitted contract.
//!
//! One [`DeferDescriptor`] exists per defer block site in a template. It is
//! immutable apart from its interior load cell, and shared (`Rc`) across every
//! runtime instance the site produces, which is what makes the at-most-once
//! loader guarantee hold across instances.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::loader::{DependencyLoader, LoadCell};
use crate::view::Template;

// =============================================================================
// Trigger Specs
// =============================================================================

/// Which of the two independent subscriptions a trigger feeds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TriggerChannel {
    /// Drives the rendered lifecycle (Placeholder → Loading → Complete/Failed).
    Main,
    /// Drives dependency loading only; never changes the rendered view.
    Prefetch,
}

/// The recognised trigger kinds.
///
/// `When` carries the boolean expression as a getter, read once per
/// change-detection pass. The three DOM-bound kinds carry an optional anchor
/// ref name; `None` means the implicit anchor (the placeholder's first DOM
/// node).
#[derive(Clone)]
pub enum TriggerKind {
    When(Rc<dyn Fn() -> bool>),
    Immediate,
    Idle,
    Timer(u64),
    Interaction(Option<String>),
    Hover(Option<String>),
    Viewport(Option<String>),
}

impl fmt::Debug for TriggerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::When(_) => f.write_str("When(..)"),
            Self::Immediate => f.write_str("Immediate"),
            Self::Idle => f.write_str("Idle"),
            Self::Timer(ms) => write!(f, "Timer({ms})"),
            Self::Interaction(anchor) => write!(f, "Interaction({anchor:?})"),
            Self::Hover(anchor) => write!(f, "Hover({anchor:?})"),
            Self::Viewport(anchor) => write!(f, "Viewport({anchor:?})"),
        }
    }
}

/// One entry of a descriptor's trigger set.
#[derive(Clone, Debug)]
pub struct TriggerSpec {
    pub kind: TriggerKind,
    pub channel: TriggerChannel,
}

impl TriggerSpec {
    /// A main-channel trigger.
    pub fn main(kind: TriggerKind) -> Self {
        Self {
            kind,
            channel: TriggerChannel::Main,
        }
    }

    /// A prefetch-channel trigger.
    pub fn prefetch(kind: TriggerKind) -> Self {
        Self {
            kind,
            channel: TriggerChannel::Prefetch,
        }
    }
}

// =============================================================================
// Descriptor
// =============================================================================

/// Static description of one defer block site.
///
/// Carries the four sub-template factories (main required, the rest
/// optional), the trigger set for both channels, the dependency loader, and
/// the shared load cell that caches the loader's single outcome.
pub struct DeferDescriptor {
    pub(crate) main: Template,
    pub(crate) placeholder: Option<Template>,
    pub(crate) loading: Option<Template>,
    pub(crate) error: Option<Template>,
    pub(crate) triggers: Vec<TriggerSpec>,
    pub(crate) loader: DependencyLoader,
    pub(crate) load: Rc<RefCell<LoadCell>>,
}

impl DeferDescriptor {
    /// A descriptor with only the required pieces: the main template and its
    /// dependency loader. Sub-templates and triggers are added with the
    /// `with_*` methods.
    pub fn new(main: Template, loader: DependencyLoader) -> Self {
        Self {
            main,
            placeholder: None,
            loading: None,
            error: None,
            triggers: Vec::new(),
            loader,
            load: Rc::new(RefCell::new(LoadCell::NotStarted)),
        }
    }

    pub fn with_placeholder(mut self, template: Template) -> Self {
        self.placeholder = Some(template);
        self
    }

    pub fn with_loading(mut self, template: Template) -> Self {
        self.loading = Some(template);
        self
    }

    pub fn with_error(mut self, template: Template) -> Self {
        self.error = Some(template);
        self
    }

    pub fn with_trigger(mut self, trigger: TriggerSpec) -> Self {
        self.triggers.push(trigger);
        self
    }
}

impl fmt::Debug for DeferDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeferDescriptor")
            .field("placeholder", &self.placeholder.is_some())
            .field("loading", &self.loading.is_some())
            .field("error", &self.error.is_some())
            .field("triggers", &self.triggers)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::view::ViewBuilder;

    fn noop_template() -> Template {
        Template::new(|_: &mut ViewBuilder| {})
    }

    #[test]
    fn test_builder_surface() {
        let descriptor = DeferDescriptor::new(noop_template(), Rc::new(|_| {}))
            .with_placeholder(noop_template())
            .with_trigger(TriggerSpec::main(TriggerKind::Immediate))
            .with_trigger(TriggerSpec::prefetch(TriggerKind::Idle));

        assert!(descriptor.placeholder.is_some());
        assert!(descriptor.loading.is_none());
        assert_eq!(descriptor.triggers.len(), 2);
        assert_eq!(descriptor.triggers[0].channel, TriggerChannel::Main);
        assert_eq!(descriptor.triggers[1].channel, TriggerChannel::Prefetch);
    }

    #[test]
    fn test_trigger_kind_debug_names() {
        assert_eq!(format!("{:?}", TriggerKind::Timer(250)), "Timer(250)");
        assert_eq!(
            format!("{:?}", TriggerKind::Hover(Some("btn".into()))),
            "Hover(Some(\"btn\"))"
        );
    }
}
