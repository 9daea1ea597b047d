//! Runtime events: types and broadcast bus.
//!
//! This module groups the event **data model** and the **bus** used to
//! publish/subscribe to events emitted while a service is brought up and torn down.
//!
//! ## Contents
//! - [`EventKind`], [`Event`] event classification and payload metadata
//! - [`Bus`] thin wrapper over `tokio::sync::broadcast`
//! - [`OutputSink`] bounded, lossless queue for the service's stdout/stderr lines
//!
//! ## Quick reference
//! - **Publishers**: `Supervisor`, `ServiceHandle`, `SubscriberSet` workers (overflow/panic).
//! - **Output**: the launcher's forwarders write to an `OutputSink`.
//! - **Consumers**: the supervisor's listener, which fans both out to `SubscriberSet`.

mod bus;
mod event;
mod output;

pub use bus::Bus;
pub use event::{Event, EventKind};
pub use output::OutputSink;
