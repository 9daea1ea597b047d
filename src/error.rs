//! Error types used by the supervisor, the execution channel and the readiness probe.
//!
//! This module defines three enums:
//!
//! - [`ServiceError`]: failures that stop an invocation before (or instead of) handing
//!   a service handle to the caller.
//! - [`ChannelError`]: failures of the execution channel that carries requests to the
//!   host owning the service process.
//! - [`ProbeError`]: reasons a readiness round trip did not succeed. These are advisory:
//!   the readiness gate converts them into `false`.
//!
//! All types provide `as_label` (stable snake_case, for logs/metrics) and `as_message`.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// # Errors produced while bringing a service up.
///
/// Everything here is fatal for the invocation: no process is left running by the
/// supervisor when one of these is returned, except for [`ServiceError::Canceled`],
/// which is reported *after* teardown already ran.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ServiceError {
    /// No installation or workspace could be resolved for the invocation.
    #[error("configuration error: {reason}")]
    Configuration {
        /// What was missing.
        reason: String,
    },

    /// The data directory could not be cleared or recreated.
    #[error("failed to prepare data directory {path:?}: {error}")]
    Setup {
        /// Directory that was being prepared.
        path: PathBuf,
        /// Underlying error message.
        error: String,
    },

    /// The operating system refused to start the service process.
    #[error("failed to launch {program:?}: {source}")]
    Launch {
        /// Executable that was being started.
        program: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The execution channel failed while resolving launch facts.
    #[error("execution channel failed: {0}")]
    Channel(#[from] ChannelError),

    /// The protected task was cancelled; the service was torn down.
    #[error("task cancelled")]
    Canceled,
}

impl ServiceError {
    /// Shorthand for a [`ServiceError::Configuration`].
    pub fn configuration(reason: impl Into<String>) -> Self {
        ServiceError::Configuration {
            reason: reason.into(),
        }
    }

    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use mongovisor::ServiceError;
    ///
    /// let err = ServiceError::configuration("No MongoDB installation available");
    /// assert_eq!(err.as_label(), "service_configuration");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            ServiceError::Configuration { .. } => "service_configuration",
            ServiceError::Setup { .. } => "service_setup",
            ServiceError::Launch { .. } => "service_launch",
            ServiceError::Channel(_) => "service_channel",
            ServiceError::Canceled => "service_canceled",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        match self {
            ServiceError::Configuration { reason } => format!("configuration: {reason}"),
            ServiceError::Setup { path, error } => {
                format!("setup: {} ({error})", path.display())
            }
            ServiceError::Launch { program, source } => {
                format!("launch: {} ({source})", program.display())
            }
            ServiceError::Channel(e) => format!("channel: {}", e.as_message()),
            ServiceError::Canceled => "task cancelled".to_string(),
        }
    }

    /// Indicates whether the error happened before any process was started.
    pub fn is_pre_launch(&self) -> bool {
        matches!(
            self,
            ServiceError::Configuration { .. }
                | ServiceError::Setup { .. }
                | ServiceError::Launch { .. }
                | ServiceError::Channel(_)
        )
    }
}

/// # Errors produced by an execution channel.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ChannelError {
    /// The transport failed while sending or receiving a frame.
    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),

    /// A frame could not be encoded or decoded.
    #[error("malformed frame: {0}")]
    Codec(#[from] serde_json::Error),

    /// The request was executed on the remote side and failed there.
    #[error("remote execution failed: {error}")]
    Remote {
        /// Error reported by the remote side.
        error: String,
    },

    /// The peer closed the channel or answered out of protocol.
    #[error("channel closed: {reason}")]
    Closed {
        /// Why the exchange could not complete.
        reason: String,
    },
}

impl ChannelError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            ChannelError::Transport(_) => "channel_transport",
            ChannelError::Codec(_) => "channel_codec",
            ChannelError::Remote { .. } => "channel_remote",
            ChannelError::Closed { .. } => "channel_closed",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        match self {
            ChannelError::Transport(e) => format!("transport: {e}"),
            ChannelError::Codec(e) => format!("codec: {e}"),
            ChannelError::Remote { error } => format!("remote: {error}"),
            ChannelError::Closed { reason } => format!("closed: {reason}"),
        }
    }
}

/// # Reasons a readiness round trip failed.
///
/// Never escapes [`crate::probe::await_ready`]; available through [`crate::probe::check`].
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ProbeError {
    /// No server answered within the deadline.
    #[error("no response within {timeout:?}")]
    Timeout {
        /// The deadline that was exceeded.
        timeout: Duration,
    },

    /// Every connection attempt was refused until the deadline; carries the last error.
    #[error("connection refused: {0}")]
    Refused(#[source] std::io::Error),

    /// The server answered, but not with a successful reply.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The connection failed mid-exchange.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProbeError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use mongovisor::ProbeError;
    /// use std::time::Duration;
    ///
    /// let err = ProbeError::Timeout { timeout: Duration::from_secs(1) };
    /// assert_eq!(err.as_label(), "probe_timeout");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            ProbeError::Timeout { .. } => "probe_timeout",
            ProbeError::Refused(_) => "probe_refused",
            ProbeError::Protocol(_) => "probe_protocol",
            ProbeError::Io(_) => "probe_io",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        match self {
            ProbeError::Timeout { timeout } => format!("timeout: {timeout:?}"),
            ProbeError::Refused(e) => format!("refused: {e}"),
            ProbeError::Protocol(msg) => format!("protocol: {msg}"),
            ProbeError::Io(e) => format!("io: {e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pre_launch_classification() {
        assert!(ServiceError::configuration("x").is_pre_launch());
        assert!(
            ServiceError::Setup {
                path: PathBuf::from("/tmp/db"),
                error: "denied".into(),
            }
            .is_pre_launch()
        );
        assert!(!ServiceError::Canceled.is_pre_launch());
    }

    #[test]
    fn test_channel_error_wraps_into_service_error() {
        let err: ServiceError = ChannelError::Remote {
            error: "boom".into(),
        }
        .into();
        assert_eq!(err.as_label(), "service_channel");
        assert_eq!(err.as_message(), "channel: remote: boom");
    }
}
