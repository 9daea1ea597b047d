//! # Global supervisor configuration.
//!
//! Provides [`SupervisorConfig`] centralized settings for the supervisor runtime.
//!
//! Config is used in two ways:
//! 1. **Supervisor creation**: `Supervisor::builder(config)`
//! 2. **Invocation defaults**: the last fallback when neither the invocation nor the
//!    installation sets a port or a start timeout.
//!
//! ## Sentinel values
//! - `start_timeout = 0s` → use [`DEFAULT_START_TIMEOUT`] (the probe never runs unbounded)
//! - `bus_capacity = 0` → clamped to 1 by the bus
//! - `output_capacity = 0` → clamped to 1

use std::time::Duration;

use crate::args::DEFAULT_LOG_FILE;

/// Port the service listens on when nothing else is configured.
pub const DEFAULT_PORT: u16 = 27017;

/// Readiness deadline used when every layer leaves the timeout at zero.
pub const DEFAULT_START_TIMEOUT: Duration = Duration::from_millis(15_000);

/// Global configuration for the supervisor runtime.
///
/// ## Field semantics
/// - `tag`: Prefix of every supervisory log line (`[<tag>] <message>`)
/// - `log_file`: File name, relative to the workspace, passed as `--logpath`
/// - `probe_host`: Host the readiness probe connects to, as seen from the service host
/// - `default_port`: Port probed when neither invocation nor installation sets one
/// - `start_timeout`: Readiness deadline when neither invocation nor installation sets one
/// - `bus_capacity`: Event bus ring buffer size (min 1; clamped by Bus)
/// - `output_capacity`: Lines of process output buffered before the launcher waits
#[derive(Clone, Debug)]
pub struct SupervisorConfig {
    /// Tag written in front of every supervisory log line.
    pub tag: String,

    /// Name of the service's own log file inside the workspace.
    pub log_file: String,

    /// Host name the readiness probe connects to.
    ///
    /// The probe runs on the service host, so this is almost always `localhost`.
    pub probe_host: String,

    /// Port used by the probe when the service is started without `--port`.
    pub default_port: u16,

    /// Default readiness deadline.
    ///
    /// - `Duration::ZERO` = use [`DEFAULT_START_TIMEOUT`]
    pub start_timeout: Duration,

    /// Capacity of the event bus broadcast channel ring buffer.
    ///
    /// Slow subscribers that lag behind more than `bus_capacity` messages will
    /// receive `Lagged` and skip older items. Process output does not travel on the bus.
    pub bus_capacity: usize,

    /// Capacity of the process output queue.
    ///
    /// Output is never dropped: when the queue is full the forwarders stop reading the
    /// process's pipes until subscribers catch up.
    pub output_capacity: usize,
}

impl SupervisorConfig {
    /// Returns the fallback readiness deadline, never zero.
    #[inline]
    pub fn default_start_timeout(&self) -> Duration {
        if self.start_timeout == Duration::ZERO {
            DEFAULT_START_TIMEOUT
        } else {
            self.start_timeout
        }
    }

    /// Returns a bus capacity clamped to a minimum of 1.
    #[inline]
    pub fn bus_capacity_clamped(&self) -> usize {
        self.bus_capacity.max(1)
    }

    /// Returns an output queue capacity clamped to a minimum of 1.
    #[inline]
    pub fn output_capacity_clamped(&self) -> usize {
        self.output_capacity.max(1)
    }
}

impl Default for SupervisorConfig {
    /// Default configuration:
    ///
    /// - `tag = "MongoDB"`
    /// - `log_file = "mongodb.log"`
    /// - `probe_host = "localhost"`
    /// - `default_port = 27017`
    /// - `start_timeout = 15s`
    /// - `bus_capacity = 1024`
    /// - `output_capacity = 1024`
    fn default() -> Self {
        Self {
            tag: "MongoDB".to_string(),
            log_file: DEFAULT_LOG_FILE.to_string(),
            probe_host: "localhost".to_string(),
            default_port: DEFAULT_PORT,
            start_timeout: DEFAULT_START_TIMEOUT,
            bus_capacity: 1024,
            output_capacity: 1024,
        }
    }
}
