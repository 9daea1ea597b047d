//! # Scoped service handle.
//!
//! [`ServiceHandle`] is what the supervisor hands to the caller once the process was
//! launched. Its single operation, [`ServiceHandle::release`], tears the service down:
//!
//! ```text
//! release(self)
//!   ├─ alive → publish ProcessKilling     → kill + reap   (error → KillFailed, logged only)
//!   └─ dead  → publish ProcessAlreadyDead
//!
//! drop(unreleased handle)
//!   └─ start_kill (no waiting) → kill sent → publish ProcessKilling
//! ```
//!
//! `release` consumes the handle, so teardown runs at most once per launched process.

use std::path::Path;

use crate::args::CommandLine;
use crate::events::{Bus, Event, EventKind};
use crate::launcher::Process;

/// Outcome of the readiness gate for a launched service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    /// The service answered the readiness request.
    Ready,
    /// The probe completed without a successful answer within the deadline.
    NotReady,
    /// The probe could not be evaluated; see the `ProbeErrored` event.
    Unknown,
}

impl Readiness {
    /// `true` only for [`Readiness::Ready`].
    pub fn is_ready(self) -> bool {
        matches!(self, Readiness::Ready)
    }
}

/// Facts about a launched service, shared with the protected task.
#[derive(Debug, Clone)]
pub struct ServiceInfo {
    /// Command line the service was started with.
    pub command: CommandLine,
    /// Address the readiness probe targeted.
    pub address: String,
    /// Port the service was expected to listen on.
    pub port: u16,
    /// Process id at launch, if reported.
    pub pid: Option<u32>,
    /// Readiness gate outcome.
    pub readiness: Readiness,
}

impl ServiceInfo {
    /// Data directory passed as `--dbpath`.
    pub fn data_dir(&self) -> &Path {
        &self.command.data_dir
    }
}

/// Owns a launched service process until it is released.
pub struct ServiceHandle {
    process: Option<Box<dyn Process>>,
    bus: Bus,
    info: ServiceInfo,
}

impl ServiceHandle {
    pub(crate) fn new(process: Box<dyn Process>, bus: Bus, info: ServiceInfo) -> Self {
        Self {
            process: Some(process),
            bus,
            info,
        }
    }

    /// Launch facts and readiness outcome.
    pub fn info(&self) -> &ServiceInfo {
        &self.info
    }

    /// Readiness gate outcome.
    pub fn readiness(&self) -> Readiness {
        self.info.readiness
    }

    /// Port the service was expected to listen on.
    pub fn port(&self) -> u16 {
        self.info.port
    }

    /// Data directory passed as `--dbpath`.
    pub fn data_dir(&self) -> &Path {
        self.info.data_dir()
    }

    /// `true` while the service process has not exited.
    pub async fn is_alive(&mut self) -> bool {
        match self.process.as_mut() {
            Some(process) => process.is_alive().await,
            None => false,
        }
    }

    /// Kills the service if it is still running and waits until it is gone.
    ///
    /// Never fails: a kill error is published as `KillFailed`.
    pub async fn release(mut self) {
        if let Some(process) = self.process.take() {
            teardown(process, &self.bus).await;
        }
    }
}

impl std::fmt::Debug for ServiceHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceHandle")
            .field("info", &self.info)
            .field("released", &self.process.is_none())
            .finish()
    }
}

impl Drop for ServiceHandle {
    fn drop(&mut self) {
        let Some(mut process) = self.process.take() else {
            return;
        };
        let pid = process.id();
        match process.start_kill() {
            Ok(false) => {}
            Ok(true) => self
                .bus
                .publish(Event::new(EventKind::ProcessKilling).with_pid(pid)),
            Err(e) => {
                self.bus
                    .publish(Event::new(EventKind::ProcessKilling).with_pid(pid));
                self.bus.publish(
                    Event::new(EventKind::KillFailed)
                        .with_pid(pid)
                        .with_reason(e.to_string()),
                );
            }
        }
    }
}

async fn teardown(mut process: Box<dyn Process>, bus: &Bus) {
    let pid = process.id();
    if !process.is_alive().await {
        bus.publish(Event::new(EventKind::ProcessAlreadyDead).with_pid(pid));
        return;
    }

    bus.publish(Event::new(EventKind::ProcessKilling).with_pid(pid));
    if let Err(e) = process.kill().await {
        tracing::warn!(?pid, error = %e, "failed to kill service process");
        bus.publish(
            Event::new(EventKind::KillFailed)
                .with_pid(pid)
                .with_reason(e.to_string()),
        );
    }
}
