//! Configuration: supervisor defaults, installations, invocation settings, validation.
//!
//! - [`SupervisorConfig`] runtime-wide defaults (log tag, log file, fallback port/timeout).
//! - [`Installation`] / [`InstallationRegistry`] administrator-configured defaults,
//!   kept as a copy-on-write snapshot.
//! - [`ServiceConfig`] / [`Host`] what one invocation asks for and where it runs.
//! - [`validate`] field checks for configuration front ends.

mod registry;
mod service;
mod supervisor;
pub mod validate;

pub use registry::InstallationRegistry;
pub use service::{Host, Installation, Platform, ServiceConfig};
pub use supervisor::{DEFAULT_PORT, DEFAULT_START_TIMEOUT, SupervisorConfig};
