//! Launches the service on the host behind a [`Channel`].
//!
//! ```text
//! ChannelLauncher::start(cmd) ──► Launch { program, args } ──► Launched { process, pid }
//!                                                   │
//!   output poller: ReadOutput { process } ◄─────────┘ loop until eof ──► OutputSink
//!
//! RemoteProcess::is_alive   ──► IsAlive { process }
//! RemoteProcess::kill       ──► Kill { process }, then wait for the poller to reach eof
//! RemoteProcess::start_kill ──► Kill { process } on a spawned task
//! ```

use std::io;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinHandle;

use crate::args::CommandLine;
use crate::channel::Channel;
use crate::error::{ChannelError, ServiceError};
use crate::events::OutputSink;
use crate::launcher::{DRAIN_TIMEOUT, Launch, Process};

/// Most lines fetched by one `ReadOutput` request.
const OUTPUT_BATCH: usize = 512;

/// Pause after an empty batch, for hosts that answer `ReadOutput` without waiting.
const OUTPUT_IDLE: Duration = Duration::from_millis(50);

/// Starts processes on the service host through a [`Channel`].
#[derive(Clone)]
pub struct ChannelLauncher {
    channel: Arc<dyn Channel>,
}

impl ChannelLauncher {
    /// Creates a launcher that sends its requests over `channel`.
    pub fn new(channel: Arc<dyn Channel>) -> Self {
        Self { channel }
    }
}

fn launch_error(program: &Path, source: io::Error) -> ServiceError {
    ServiceError::Launch {
        program: program.to_path_buf(),
        source,
    }
}

#[async_trait]
impl Launch for ChannelLauncher {
    async fn start(
        &self,
        cmd: &CommandLine,
        output: &OutputSink,
    ) -> Result<Box<dyn Process>, ServiceError> {
        let not_utf8 = || {
            launch_error(
                &cmd.program,
                io::Error::new(io::ErrorKind::InvalidInput, "command line is not valid UTF-8"),
            )
        };
        let program = cmd.program.to_str().ok_or_else(not_utf8)?.to_string();
        let args = cmd
            .args
            .iter()
            .map(|arg| arg.to_str().map(str::to_string))
            .collect::<Option<Vec<_>>>()
            .ok_or_else(not_utf8)?;

        let (id, pid) = match self.channel.launch(program, args).await {
            Ok(launched) => launched,
            Err(ChannelError::Remote { error }) => {
                return Err(launch_error(&cmd.program, io::Error::other(error)));
            }
            Err(e) => return Err(e.into()),
        };

        let poller = tokio::spawn(forward_output(
            Arc::clone(&self.channel),
            id,
            output.clone(),
        ));
        tracing::debug!(
            program = %cmd.program.display(),
            process = id,
            ?pid,
            "remote process spawned"
        );
        Ok(Box::new(RemoteProcess {
            channel: Arc::clone(&self.channel),
            id,
            pid,
            exited: false,
            poller: Some(poller),
        }))
    }
}

/// Polls the host for output lines and queues them on `output` until eof.
async fn forward_output(channel: Arc<dyn Channel>, id: u64, output: OutputSink) {
    loop {
        match channel.read_output(id, OUTPUT_BATCH).await {
            Ok((lines, eof)) => {
                let idle = lines.is_empty();
                for line in lines {
                    if !output.line(line).await {
                        return;
                    }
                }
                if eof {
                    return;
                }
                if idle {
                    tokio::time::sleep(OUTPUT_IDLE).await;
                }
            }
            Err(e) => {
                tracing::warn!(process = id, error = %e, "remote output polling stopped");
                return;
            }
        }
    }
}

/// Process started by [`ChannelLauncher`] on the service host.
pub struct RemoteProcess {
    channel: Arc<dyn Channel>,
    id: u64,
    pid: Option<u32>,
    exited: bool,
    poller: Option<JoinHandle<()>>,
}

impl RemoteProcess {
    /// Handle the service host assigned to the process.
    pub fn handle(&self) -> u64 {
        self.id
    }
}

fn channel_io(e: ChannelError) -> io::Error {
    match e {
        ChannelError::Transport(io) => io,
        other => io::Error::other(other.as_message()),
    }
}

#[async_trait]
impl Process for RemoteProcess {
    fn id(&self) -> Option<u32> {
        self.pid
    }

    async fn is_alive(&mut self) -> bool {
        if self.exited {
            return false;
        }
        match self.channel.is_running(self.id).await {
            Ok(alive) => {
                self.exited = !alive;
                alive
            }
            Err(e) => {
                // Unknown state counts as alive so teardown still sends the kill.
                tracing::warn!(process = self.id, error = %e, "liveness check failed");
                true
            }
        }
    }

    async fn kill(&mut self) -> io::Result<()> {
        self.channel.kill_process(self.id).await.map_err(channel_io)?;
        self.exited = true;
        if let Some(poller) = self.poller.take() {
            if tokio::time::timeout(DRAIN_TIMEOUT, poller).await.is_err() {
                tracing::debug!(process = self.id, "output poller still running after kill");
            }
        }
        Ok(())
    }

    fn start_kill(&mut self) -> io::Result<bool> {
        if self.exited {
            return Ok(false);
        }
        let runtime = tokio::runtime::Handle::try_current().map_err(io::Error::other)?;
        let channel = Arc::clone(&self.channel);
        let id = self.id;
        runtime.spawn(async move {
            if let Err(e) = channel.kill_process(id).await {
                tracing::warn!(process = id, error = %e, "failed to kill remote process");
            }
        });
        self.exited = true;
        Ok(true)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::channel::{LocalChannel, StreamChannel, serve};
    use crate::events::EventKind;
    use std::ffi::OsString;
    use std::path::PathBuf;
    use tokio::io::duplex;

    /// A launcher talking JSON lines to an in-memory agent.
    fn remote() -> ChannelLauncher {
        let (client, server) = duplex(64 * 1024);
        let (cr, cw) = tokio::io::split(client);
        let (sr, sw) = tokio::io::split(server);
        tokio::spawn(async move { serve(sr, sw, &LocalChannel::new()).await });
        ChannelLauncher::new(Arc::new(StreamChannel::new(cr, cw)))
    }

    fn sh(script: &str) -> CommandLine {
        CommandLine {
            program: PathBuf::from("/bin/sh"),
            args: vec![OsString::from("-c"), OsString::from(script)],
            data_dir: PathBuf::from("/tmp"),
        }
    }

    #[tokio::test]
    async fn test_remote_launch_is_alive_and_kill() {
        let (sink, _rx) = OutputSink::channel(64);
        let mut child = remote().start(&sh("sleep 30"), &sink).await.unwrap();

        assert!(child.id().is_some());
        assert!(child.is_alive().await);
        child.kill().await.unwrap();
        assert!(!child.is_alive().await);
        assert!(!child.start_kill().unwrap());
    }

    #[tokio::test]
    async fn test_remote_output_reaches_sink_in_order() {
        let (sink, mut rx) = OutputSink::channel(8);
        let script = "i=1; while [ $i -le 2000 ]; do echo line-$i; i=$((i + 1)); done";
        let mut child = remote().start(&sh(script), &sink).await.unwrap();
        drop(sink);

        let mut seen = Vec::new();
        while let Some(ev) = rx.recv().await {
            assert_eq!(ev.kind, EventKind::ProcessOutput);
            seen.push(ev.reason.unwrap().to_string());
        }
        let expected: Vec<String> = (1..=2000).map(|i| format!("line-{i}")).collect();
        assert_eq!(seen, expected);

        child.kill().await.unwrap();
    }

    #[tokio::test]
    async fn test_remote_missing_executable_is_launch_error() {
        let (sink, _rx) = OutputSink::channel(8);
        let cmd = CommandLine {
            program: PathBuf::from("/nonexistent/mongod"),
            args: Vec::new(),
            data_dir: PathBuf::from("/tmp"),
        };

        let err = remote().start(&cmd, &sink).await.err().unwrap();
        assert_eq!(err.as_label(), "service_launch");
        assert!(err.as_message().contains("/nonexistent/mongod"));
    }

    #[tokio::test]
    async fn test_non_utf8_argument_is_rejected_before_sending() {
        use std::os::unix::ffi::OsStringExt;

        let (sink, _rx) = OutputSink::channel(8);
        let mut cmd = sh("true");
        cmd.args.push(OsString::from_vec(vec![0x66, 0xff]));

        let err = remote().start(&cmd, &sink).await.err().unwrap();
        assert_eq!(err.as_label(), "service_launch");
    }
}
