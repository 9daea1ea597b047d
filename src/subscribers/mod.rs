//! # Event subscribers.
//!
//! This module provides the [`Subscribe`] trait, the [`SubscriberSet`] fan-out, and the
//! built-in [`LogWriter`] that turns events into build-log lines.
//!
//! ## Architecture
//! ```text
//! Supervisor / ServiceHandle / output forwarders
//!        │ publish(Event)
//!        ▼
//!       Bus ──► listener ──► SubscriberSet::emit(&Event)
//!                                 ├──► LogWriter ("[MongoDB] ..." lines)
//!                                 └──► custom subscribers
//! ```

#[cfg(feature = "logging")]
mod log;
mod subscriber;
mod subscriber_set;

#[cfg(feature = "logging")]
pub use log::{LogWriter, MemoryLog};
pub use subscriber::Subscribe;
pub use subscriber_set::SubscriberSet;
