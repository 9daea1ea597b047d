//! Runtime core: orchestration and teardown.
//!
//! The public API of this module is [`Supervisor`] (with its [`SupervisorBuilder`]) and
//! the [`ServiceHandle`] it returns.
//!
//! Internal modules:
//! - [`supervisor`]: the invocation state machine, `scoped()`, event delivery;
//! - [`builder`]: wires the bus, subscribers and the host seams;
//! - [`handle`]: the scoped handle and its at-most-once teardown;
//! - [`shutdown`]: cancellation token / OS signal interruption.

mod builder;
mod handle;
mod shutdown;
mod supervisor;

pub use builder::SupervisorBuilder;
pub use handle::{Readiness, ServiceHandle, ServiceInfo};
pub use supervisor::Supervisor;
