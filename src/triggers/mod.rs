//! Trigger sources - one implementation per trigger kind.
//!
//! Every source follows the same capability shape: arming takes the
//! single-fire callback and returns a [`Disposer`](crate::scheduler::Disposer)
//! that releases the subscription. Sources disarm themselves before
//! delivering their fire, so at most one fire per subscription can ever reach
//! the block controller.
//!
//! Kinds with no module here have no subscription machinery: `immediate`
//! fires synchronously during instance creation and `when` expressions are
//! polled by [`instance::detect_changes`](crate::instance::detect_changes).
//!
//! Two sources manage process-wide shared state, initialised on first use and
//! torn down when their subscriber sets empty:
//! - [`idle`] keeps at most one idle request outstanding for any number of
//!   subscribers;
//! - [`viewport`] multiplexes every viewport subscription over a single
//!   intersection observer.

pub mod dom;
pub mod idle;
pub mod viewport;
