//! # defer-runtime
//!
//! Runtime for deferred template blocks: regions of a view that load their
//! code-split dependencies and render lazily, driven by declarative triggers.
//!
//! ## Architecture
//!
//! A compiler emits one immutable [`DeferDescriptor`] per block site. At view
//! creation, a [`DeferInstance`] is wired up per occurrence:
//!
//! ```text
//! trigger sources ──▶ instance controller ──▶ state machine ──▶ view swap
//!                             │                            (placeholder / loading
//!                             ▼                             / main / error)
//!                      load coordinator ── at-most-once per descriptor
//! ```
//!
//! Two independent channels subscribe per instance: **main** drives the
//! rendered lifecycle, **prefetch** only starts the dependency load. Both
//! observe the descriptor's single shared load, so the loader runs at most
//! once no matter how many instances or channels ask.
//!
//! The runtime is single-threaded cooperative: state lives in thread-local
//! registries and every entry point executes on the UI task loop. Suspension
//! happens only at the platform seams — the dependency load, idle callbacks,
//! and DOM events — all injectable through [`environment`] and replaced by
//! deterministic fakes in [`testing`].
//!
//! ## Modules
//!
//! - [`descriptor`] - compiler-emitted block descriptors and trigger specs
//! - [`instance`] - per-occurrence controller and the `when`-polling pass
//! - [`loader`] - shared, memoised dependency load coordination
//! - [`machine`] - state machines and transition legality
//! - [`triggers`] - one source per trigger kind, with shared idle/viewport state
//! - [`resolver`] - trigger anchor lookup across view scopes
//! - [`view`] - embedded views, containers, projection, content queries
//! - [`scheduler`] - clock and DOM seams behind testable hooks
//! - [`cleanup`] - scoped disposer registry
//! - [`environment`] - platform flag, interceptor, hook installation
//! - [`error`] - load errors and diagnostics
//! - [`testing`] - deterministic clock/DOM fakes and a manual loader

pub mod cleanup;
pub mod descriptor;
pub mod environment;
pub mod error;
pub mod instance;
pub mod loader;
pub mod machine;
pub mod resolver;
pub mod scheduler;
pub mod testing;
pub mod triggers;
pub mod view;

// Re-export the working surface.
pub use descriptor::{DeferDescriptor, TriggerChannel, TriggerKind, TriggerSpec};
pub use environment::{
    reset_environment, set_behavior, set_change_notifier, set_clock_hooks, set_dom_hooks,
    set_loader_interceptor, set_platform, DeferBehavior, Platform,
};
pub use error::{take_diagnostics, Diagnostic, LoadError};
pub use instance::{detect_changes, live_instance_count, DeferInstance};
pub use loader::{
    cached_bundle, load, prefetch, Bundle, DependencyLoader, LoadHandle, LoadOutcome,
    LoaderInterceptor,
};
pub use machine::{MainState, PrefetchState};
pub use scheduler::{
    ClockHooks, Disposer, DomEventKind, DomHooks, IdleId, ListenerId, NoopClock, NoopDom,
    ObserverHandle, TimerId,
};
pub use view::{
    ContainerId, DirectiveDef, DirectiveKind, ElementId, Template, ViewBuilder, ViewId,
};
