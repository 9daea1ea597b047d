//! # Process launcher.
//!
//! A [`Launch`] implementation starts the service from a [`CommandLine`] and returns a
//! [`Process`] the supervisor owns until teardown.
//!
//! ```text
//! Launch::start(cmd, output)
//!   ├─► service host creates the process    (error → ServiceError::Launch, not retried)
//!   ├─► stdout/stderr forwarders            line ──► OutputSink (ProcessOutput, verbatim)
//!   └─► Box<dyn Process>                    id() / is_alive() / kill() / start_kill()
//! ```
//!
//! - [`LocalLauncher`] runs the command on this host with [`tokio::process`].
//! - [`ChannelLauncher`] runs it on the service host behind a [`Channel`](crate::Channel)
//!   and polls its output back.

mod local;
mod remote;

use std::io;
use std::time::Duration;

use async_trait::async_trait;

use crate::args::CommandLine;
use crate::error::ServiceError;
use crate::events::OutputSink;

pub use local::{LocalLauncher, LocalProcess};
pub use remote::{ChannelLauncher, RemoteProcess};

/// How long `kill` waits for output forwarding to finish after the process is gone.
pub(crate) const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Starts service processes.
#[async_trait]
pub trait Launch: Send + Sync + 'static {
    /// Starts `cmd` and returns once the service host created the process.
    ///
    /// Every output line of the process is queued on `output`, in order, as it arrives.
    async fn start(
        &self,
        cmd: &CommandLine,
        output: &OutputSink,
    ) -> Result<Box<dyn Process>, ServiceError>;
}

/// A started service process.
#[async_trait]
pub trait Process: Send + 'static {
    /// OS process id, if the service host reports one.
    fn id(&self) -> Option<u32>;

    /// `true` while the process has not exited.
    async fn is_alive(&mut self) -> bool;

    /// Kills the process and waits until it is gone.
    async fn kill(&mut self) -> io::Result<()>;

    /// Requests the kill without waiting. Safe to call from `Drop`.
    ///
    /// Returns `Ok(false)` when the process is already known to have exited and nothing
    /// was sent.
    fn start_kill(&mut self) -> io::Result<bool>;
}
