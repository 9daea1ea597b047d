//! # mongovisor
//!
//! **Mongovisor** brings up a MongoDB server process for the duration of a task (typically
//! a CI build), waits until it answers, and guarantees the process is killed afterwards.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!   ServiceConfig (invocation)     InstallationRegistry (copy-on-write snapshot)
//!            │                                 │
//!            └───────────────┬─────────────────┘
//!                            ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │  Supervisor                                                       │
//! │  - ArgumentBuilder  (config layers → CommandLine)                 │
//! │  - Channel          (absolute-path check, data dir reset, probe   │
//! │                      executed on the service host)                │
//! │  - Launch           (starts the process locally or through the    │
//! │                      channel, forwards its output losslessly)     │
//! │  - Bus + SubscriberSet (build log, custom subscribers)            │
//! └──────┬──────────────────┬──────────────────┬──────────────────────┘
//!        ▼                  ▼                  ▼
//!  prepare data dir   start process   probe <host>:<port> (listDatabases)
//!                                              │
//!                                              ▼
//!                              ServiceHandle { info, readiness }
//!                                              │ release() / drop / scoped() exit
//!                                              ▼
//!                               kill if alive, else "already dead"
//! ```
//!
//! ### Event flow
//! ```text
//! Supervisor ─┬─► Bus (broadcast) ──────┐
//! handles ────┘                         ├─► listener ──► SubscriberSet ──► LogWriter: "[MongoDB] ..."
//! forwarders ───► OutputSink (bounded) ─┘                             └──► custom Subscribe impls
//! ```
//!
//! ## Features
//! | Area              | Description                                                  | Key types / traits                          |
//! |-------------------|--------------------------------------------------------------|---------------------------------------------|
//! | **Supervision**   | Start, gate, hand off and tear down one service process.      | [`Supervisor`], [`ServiceHandle`]           |
//! | **Configuration** | Layered invocation/installation settings, TOML registry.      | [`ServiceConfig`], [`InstallationRegistry`] |
//! | **Command line**  | Deterministic argument assembly.                               | [`ArgumentBuilder`], [`CommandLine`]        |
//! | **Host seams**    | Run host-dependent work locally or through a stream.           | [`Channel`], [`Launch`], [`ChannelLauncher`]|
//! | **Readiness**     | Bounded wire-protocol round trip.                               | [`probe::await_ready`], [`probe::check`]    |
//! | **Subscriber API**| Hook into supervision events.                                  | [`Subscribe`], [`Event`]                    |
//! | **Errors**        | Typed errors with stable labels.                               | [`ServiceError`], [`ChannelError`]          |
//!
//! ## Optional features
//! - `logging` (default): exports the [`LogWriter`] build-log subscriber.
//!
//! ## Example
//! ```rust,no_run
//! use std::sync::Arc;
//! use mongovisor::{
//!     Host, Installation, InstallationRegistry, ServiceConfig, ServiceError, Supervisor,
//!     SupervisorConfig,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), ServiceError> {
//!     let registry = Arc::new(InstallationRegistry::load_from_file("installations.toml")?);
//!
//!     let sup = Supervisor::builder(SupervisorConfig::default())
//!         .with_registry(registry)
//!         .build();
//!
//!     let config = ServiceConfig::new("mongo-7").with_parameters("--quiet");
//!     let handle = sup.start(&config, &Host::local("/tmp/build-42")).await?;
//!     if handle.readiness().is_ready() {
//!         // talk to the database at handle.info().address
//!     }
//!     handle.release().await;
//!
//!     sup.shutdown().await;
//!     Ok(())
//! }
//! ```

mod args;
mod core;
mod error;
mod events;
mod launcher;
mod subscribers;

pub mod channel;
pub mod config;
pub mod probe;

// ---- Public re-exports ----

pub use args::{
    ArgumentBuilder, CommandLine, DEFAULT_LOG_FILE, ParameterToken, resolve_data_dir, tokenize,
};
pub use channel::{Channel, LocalChannel, StreamChannel};
pub use config::{
    Host, Installation, InstallationRegistry, Platform, ServiceConfig, SupervisorConfig,
};
pub use core::{Readiness, ServiceHandle, ServiceInfo, Supervisor, SupervisorBuilder};
pub use error::{ChannelError, ProbeError, ServiceError};
pub use events::{Bus, Event, EventKind, OutputSink};
pub use launcher::{ChannelLauncher, Launch, LocalLauncher, LocalProcess, Process, RemoteProcess};
pub use subscribers::{Subscribe, SubscriberSet};

// Optional: built-in build-log subscriber.
#[cfg(feature = "logging")]
pub use subscribers::{LogWriter, MemoryLog};
