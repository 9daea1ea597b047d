//! # Runtime events emitted by the supervisor, the launcher and service handles.
//!
//! The [`EventKind`] enum classifies event types across four categories:
//! - **Setup events**: data directory preparation and launch
//! - **Readiness events**: probe start and its outcome
//! - **Teardown events**: kill / already-dead / kill failure
//! - **Runtime events**: subscriber health, shutdown requests, process output
//!
//! The [`Event`] struct carries additional metadata such as timestamps, pid, address,
//! paths and reasons. [`Event::message`] renders the line written to the build log.
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases monotonically.
//! Use `seq` to restore the exact order when events are delivered out of order.
//!
//! ## Example
//! ```rust
//! use mongovisor::{Event, EventKind};
//!
//! let ev = Event::new(EventKind::ServiceReady).with_address("localhost:27017");
//!
//! assert_eq!(ev.kind, EventKind::ServiceReady);
//! assert_eq!(ev.message(), "Server ready at localhost:27017");
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::{Duration, SystemTime};

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of runtime events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    // === Subscriber events ===
    /// Subscriber panicked during event processing.
    ///
    /// Sets:
    /// - `reason`: `subscriber=<name> info=<panic message>`
    SubscriberPanicked,

    /// Subscriber dropped an event (queue full or worker closed).
    ///
    /// Sets:
    /// - `reason`: `subscriber=<name> reason=<full|closed>`
    SubscriberOverflow,

    // === Setup events ===
    /// The data directory was wiped and recreated.
    ///
    /// Sets:
    /// - `path`: data directory
    DirectoryPrepared,

    /// About to start the service process.
    ///
    /// Sets:
    /// - `reason`: rendered command line
    LaunchRequested,

    /// The operating system created the service process.
    ///
    /// Sets:
    /// - `pid`: process id, when the platform reports one
    ProcessStarted,

    /// One line of the service's stdout/stderr, verbatim.
    ///
    /// Sets:
    /// - `reason`: the line, without its terminator
    ProcessOutput,

    // === Readiness events ===
    /// Readiness probe is about to run.
    ///
    /// Sets:
    /// - `address`: probe target
    /// - `timeout_ms`: effective deadline
    ProbeStarted,

    /// The service answered the readiness request.
    ///
    /// Sets:
    /// - `address`: probe target
    ServiceReady,

    /// The probe completed without a successful answer.
    ///
    /// Sets:
    /// - `address`: probe target
    ServiceNotReady,

    /// The probe could not be evaluated (channel failure).
    ///
    /// Sets:
    /// - `reason`: error message
    ProbeErrored,

    // === Teardown events ===
    /// The service process is alive and is being killed.
    ///
    /// Sets:
    /// - `pid`: process id, when known
    ProcessKilling,

    /// The service process had already exited; nothing to kill.
    ///
    /// Sets:
    /// - `pid`: process id, when known
    ProcessAlreadyDead,

    /// Sending the kill signal failed.
    ///
    /// Sets:
    /// - `pid`: process id, when known
    /// - `reason`: error message
    KillFailed,

    // === Invocation events ===
    /// Shutdown requested (OS signal or cancellation token) while a task was running.
    ShutdownRequested,
}

/// Runtime event with optional metadata.
///
/// - `seq`: monotonic global sequence for ordering
/// - `at`: wall-clock timestamp (for logs)
/// - other optional fields are set depending on the [`EventKind`]
#[derive(Clone, Debug)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,

    /// Event classification.
    pub kind: EventKind,
    /// Human-readable reason (errors, overflow details, command line, output line).
    pub reason: Option<Arc<str>>,
    /// Probe target address.
    pub address: Option<Arc<str>>,
    /// Filesystem path the event is about.
    pub path: Option<Arc<Path>>,
    /// Service process id.
    pub pid: Option<u32>,
    /// Probe timeout in milliseconds (compact).
    pub timeout_ms: Option<u32>,
}

impl Event {
    /// Creates a new event of the given kind with current timestamp and next sequence number.
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            reason: None,
            address: None,
            path: None,
            pid: None,
            timeout_ms: None,
        }
    }

    /// Attaches a human-readable reason.
    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Attaches a probe address.
    #[inline]
    pub fn with_address(mut self, address: impl Into<Arc<str>>) -> Self {
        self.address = Some(address.into());
        self
    }

    /// Attaches a path.
    #[inline]
    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(Arc::from(path.into()));
        self
    }

    /// Attaches a process id, if known.
    #[inline]
    pub fn with_pid(mut self, pid: Option<u32>) -> Self {
        self.pid = pid;
        self
    }

    /// Attaches a timeout duration (stored as milliseconds).
    #[inline]
    pub fn with_timeout(mut self, d: Duration) -> Self {
        let ms = d.as_millis().min(u128::from(u32::MAX)) as u32;
        self.timeout_ms = Some(ms);
        self
    }

    /// Creates a subscriber overflow event.
    #[inline]
    pub fn subscriber_overflow(subscriber: &'static str, reason: &'static str) -> Self {
        Event::new(EventKind::SubscriberOverflow)
            .with_reason(format!("subscriber={subscriber} reason={reason}"))
    }

    /// Creates a subscriber panic event.
    #[inline]
    pub fn subscriber_panicked(subscriber: &'static str, info: String) -> Self {
        Event::new(EventKind::SubscriberPanicked)
            .with_reason(format!("subscriber={subscriber} info={info}"))
    }

    /// Creates a process output event carrying one line.
    #[inline]
    pub fn output(line: impl Into<Arc<str>>) -> Self {
        Event::new(EventKind::ProcessOutput).with_reason(line)
    }

    /// `true` for lines produced by the service itself rather than by the supervisor.
    #[inline]
    pub fn is_process_output(&self) -> bool {
        matches!(self.kind, EventKind::ProcessOutput)
    }

    /// Renders the build-log message for this event (without the tag prefix).
    pub fn message(&self) -> String {
        let reason = self.reason.as_deref().unwrap_or("unknown");
        let address = self.address.as_deref().unwrap_or("unknown");
        match self.kind {
            EventKind::SubscriberPanicked => format!("subscriber panicked: {reason}"),
            EventKind::SubscriberOverflow => format!("subscriber dropped an event: {reason}"),
            EventKind::DirectoryPrepared => match &self.path {
                Some(path) => format!("Prepared data directory {}", path.display()),
                None => "Prepared data directory".to_string(),
            },
            EventKind::LaunchRequested => format!("Executing mongodb start command: {reason}"),
            EventKind::ProcessStarted => match self.pid {
                Some(pid) => format!("mongodb process started (pid {pid})"),
                None => "mongodb process started".to_string(),
            },
            EventKind::ProcessOutput => self.reason.as_deref().unwrap_or_default().to_string(),
            EventKind::ProbeStarted => match self.timeout_ms {
                Some(ms) => format!("Starting... (waiting up to {ms} ms for {address})"),
                None => "Starting...".to_string(),
            },
            EventKind::ServiceReady => format!("Server ready at {address}"),
            EventKind::ServiceNotReady => "ERROR: Failed to start mongodb".to_string(),
            EventKind::ProbeErrored => {
                format!("ERROR: could not check whether mongodb started: {reason}")
            }
            EventKind::ProcessKilling => "Killing mongodb process...".to_string(),
            EventKind::ProcessAlreadyDead => {
                "Will not kill mongodb process as it is already dead.".to_string()
            }
            EventKind::KillFailed => format!("Failed to kill mongodb process: {reason}"),
            EventKind::ShutdownRequested => "Shutdown requested; tearing down".to_string(),
        }
    }
}
