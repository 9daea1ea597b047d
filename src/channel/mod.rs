//! # Execution channel to the service host.
//!
//! The service process may run on another machine than the supervisor. Everything that
//! depends on *that* machine's filesystem or network goes through a [`Channel`]:
//!
//! ```text
//! Supervisor ──► Channel::call(Request) ──► service host ──► Response
//!
//! Request::CheckAbsolutePath { path }                → Response::AbsolutePath { absolute }
//! Request::PrepareDirectory  { path }                → Response::DirectoryPrepared
//! Request::ProbeReadiness    { address, timeout }    → Response::Readiness { ready }
//! Request::Launch            { program, args }       → Response::Launched { process, pid }
//! Request::ReadOutput        { process, max_lines }  → Response::Output { lines, eof }
//! Request::IsAlive           { process }             → Response::Alive { alive }
//! Request::Kill              { process }             → Response::Killed
//!                        (any request, failed there) → Response::Failed { error }
//! ```
//!
//! The request set is closed: hosts execute these units of work and nothing else.
//! `process` is a host-assigned handle, not an OS pid; the host keeps every process it
//! launched until it is killed or has exited with its output fully read.
//!
//! ## Implementations
//! - [`LocalChannel`]: the service host is this process's host.
//! - [`StreamChannel`]: JSON lines over any byte stream; the other end runs [`serve`]
//!   (see the `mongovisor-agent` binary).
//!
//! ## Rules
//! - No retries; transport failures and remote failures are returned to the caller.
//! - A remote unit's own failure arrives as [`ChannelError::Remote`].

mod local;
mod stream;

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ChannelError;

pub use local::{LocalChannel, prepare_directory};
pub use stream::{StreamChannel, serve};

/// Unit of work executed on the service host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Request {
    /// Is `path` absolute on the service host?
    CheckAbsolutePath { path: String },
    /// Delete `path` recursively if present, then recreate it empty.
    PrepareDirectory { path: PathBuf },
    /// Run the readiness round trip against `address` from the service host.
    ProbeReadiness { address: String, timeout_ms: u64 },
    /// Start `program` with `args` on the service host.
    Launch { program: String, args: Vec<String> },
    /// Return up to `max_lines` buffered output lines of a launched process.
    ///
    /// Waits briefly for the first line when none is buffered.
    ReadOutput { process: u64, max_lines: usize },
    /// Has the launched process not exited yet?
    IsAlive { process: u64 },
    /// Kill the launched process and wait until it is gone.
    Kill { process: u64 },
}

/// Result of a [`Request`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    AbsolutePath { absolute: bool },
    DirectoryPrepared,
    Readiness { ready: bool },
    Launched { process: u64, pid: Option<u32> },
    /// `eof` is set once both output streams of the process are closed and read.
    Output { lines: Vec<String>, eof: bool },
    Alive { alive: bool },
    Killed,
    /// The unit of work failed on the service host.
    Failed { error: String },
}

impl Response {
    /// Turns [`Response::Failed`] into [`ChannelError::Remote`].
    pub fn into_result(self) -> Result<Response, ChannelError> {
        match self {
            Response::Failed { error } => Err(ChannelError::Remote { error }),
            other => Ok(other),
        }
    }
}

fn unexpected(request: &'static str, response: Response) -> ChannelError {
    ChannelError::Closed {
        reason: format!("unexpected response to {request}: {response:?}"),
    }
}

/// Transport that executes [`Request`]s on the service host.
#[async_trait]
pub trait Channel: Send + Sync + 'static {
    /// Executes one request and returns its response.
    ///
    /// `Response::Failed` may be returned as-is; the typed helpers below convert it.
    async fn call(&self, request: Request) -> Result<Response, ChannelError>;

    /// Asks the service host whether `path` is absolute there.
    async fn is_absolute(&self, path: &str) -> Result<bool, ChannelError> {
        let request = Request::CheckAbsolutePath {
            path: path.to_string(),
        };
        match self.call(request).await?.into_result()? {
            Response::AbsolutePath { absolute } => Ok(absolute),
            other => Err(unexpected("check_absolute_path", other)),
        }
    }

    /// Wipes and recreates `path` on the service host.
    async fn prepare_directory(&self, path: PathBuf) -> Result<(), ChannelError> {
        match self
            .call(Request::PrepareDirectory { path })
            .await?
            .into_result()?
        {
            Response::DirectoryPrepared => Ok(()),
            other => Err(unexpected("prepare_directory", other)),
        }
    }

    /// Runs the readiness gate on the service host.
    async fn probe_readiness(&self, address: &str, timeout: Duration) -> Result<bool, ChannelError> {
        let request = Request::ProbeReadiness {
            address: address.to_string(),
            timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
        };
        match self.call(request).await?.into_result()? {
            Response::Readiness { ready } => Ok(ready),
            other => Err(unexpected("probe_readiness", other)),
        }
    }

    /// Starts a process on the service host; returns its handle and OS pid.
    async fn launch(
        &self,
        program: String,
        args: Vec<String>,
    ) -> Result<(u64, Option<u32>), ChannelError> {
        match self
            .call(Request::Launch { program, args })
            .await?
            .into_result()?
        {
            Response::Launched { process, pid } => Ok((process, pid)),
            other => Err(unexpected("launch", other)),
        }
    }

    /// Fetches the next batch of output lines of a launched process.
    async fn read_output(
        &self,
        process: u64,
        max_lines: usize,
    ) -> Result<(Vec<String>, bool), ChannelError> {
        match self
            .call(Request::ReadOutput { process, max_lines })
            .await?
            .into_result()?
        {
            Response::Output { lines, eof } => Ok((lines, eof)),
            other => Err(unexpected("read_output", other)),
        }
    }

    /// Asks whether a launched process is still running.
    async fn is_running(&self, process: u64) -> Result<bool, ChannelError> {
        match self.call(Request::IsAlive { process }).await?.into_result()? {
            Response::Alive { alive } => Ok(alive),
            other => Err(unexpected("is_alive", other)),
        }
    }

    /// Kills a launched process.
    async fn kill_process(&self, process: u64) -> Result<(), ChannelError> {
        match self.call(Request::Kill { process }).await?.into_result()? {
            Response::Killed => Ok(()),
            other => Err(unexpected("kill", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_wire_format() {
        let json = serde_json::to_string(&Request::ProbeReadiness {
            address: "localhost:27017".into(),
            timeout_ms: 15000,
        })
        .unwrap();
        assert_eq!(
            json,
            r#"{"type":"probe_readiness","address":"localhost:27017","timeout_ms":15000}"#
        );
    }

    #[test]
    fn test_process_requests_wire_format() {
        let json = serde_json::to_string(&Request::Launch {
            program: "/opt/mongodb/bin/mongod".into(),
            args: vec!["--port".into(), "27018".into()],
        })
        .unwrap();
        assert_eq!(
            json,
            r#"{"type":"launch","program":"/opt/mongodb/bin/mongod","args":["--port","27018"]}"#
        );

        let json = serde_json::to_string(&Response::Output {
            lines: vec!["waiting for connections".into()],
            eof: false,
        })
        .unwrap();
        assert_eq!(
            json,
            r#"{"type":"output","lines":["waiting for connections"],"eof":false}"#
        );

        let back: Request = serde_json::from_str(r#"{"type":"kill","process":3}"#).unwrap();
        assert_eq!(back, Request::Kill { process: 3 });
    }

    #[test]
    fn test_failed_response_becomes_remote_error() {
        let err = Response::Failed {
            error: "permission denied".into(),
        }
        .into_result()
        .unwrap_err();
        assert!(matches!(err, ChannelError::Remote { error } if error == "permission denied"));
    }

    struct Confused;

    #[async_trait]
    impl Channel for Confused {
        async fn call(&self, _request: Request) -> Result<Response, ChannelError> {
            Ok(Response::DirectoryPrepared)
        }
    }

    #[tokio::test]
    async fn test_mismatched_response_is_rejected() {
        let err = Confused.is_absolute("/data").await.unwrap_err();
        assert_eq!(err.as_label(), "channel_closed");
    }
}
