//! Launches the service on the local host.

use std::io;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;

use crate::args::CommandLine;
use crate::error::ServiceError;
use crate::events::OutputSink;
use crate::launcher::{DRAIN_TIMEOUT, Launch, Process};

/// Starts processes with [`tokio::process::Command`].
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalLauncher;

impl LocalLauncher {
    /// Creates a local launcher.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Launch for LocalLauncher {
    async fn start(
        &self,
        cmd: &CommandLine,
        output: &OutputSink,
    ) -> Result<Box<dyn Process>, ServiceError> {
        let mut child = Command::new(&cmd.program)
            .args(&cmd.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ServiceError::Launch {
                program: cmd.program.clone(),
                source,
            })?;

        let mut forwarders = Vec::with_capacity(2);
        if let Some(out) = child.stdout.take() {
            forwarders.push(tokio::spawn(forward_lines(out, output.clone())));
        }
        if let Some(err) = child.stderr.take() {
            forwarders.push(tokio::spawn(forward_lines(err, output.clone())));
        }

        tracing::debug!(program = %cmd.program.display(), pid = ?child.id(), "process spawned");
        Ok(Box::new(LocalProcess { child, forwarders }))
    }
}

/// Queues every line of `stream` on `output`, without parsing it.
///
/// Stops reading while the queue is full; stops for good once its receiver is gone.
async fn forward_lines<R>(stream: R, output: OutputSink)
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(stream);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf);
                let line = line.trim_end_matches(['\n', '\r']);
                if !output.line(line).await {
                    break;
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "service output stream failed");
                break;
            }
        }
    }
}

/// Child process started by [`LocalLauncher`].
pub struct LocalProcess {
    child: Child,
    forwarders: Vec<JoinHandle<()>>,
}

#[async_trait]
impl Process for LocalProcess {
    fn id(&self) -> Option<u32> {
        self.child.id()
    }

    async fn is_alive(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }

    async fn kill(&mut self) -> io::Result<()> {
        if self.child.try_wait()?.is_none() {
            self.child.kill().await?;
        }
        for handle in self.forwarders.drain(..) {
            // A grandchild may still hold the pipes open.
            if tokio::time::timeout(DRAIN_TIMEOUT, handle).await.is_err() {
                tracing::debug!("output forwarder still running after kill");
            }
        }
        Ok(())
    }

    fn start_kill(&mut self) -> io::Result<bool> {
        if self.child.try_wait()?.is_some() {
            return Ok(false);
        }
        self.child.start_kill()?;
        Ok(true)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::events::{Event, EventKind};
    use std::ffi::OsString;
    use std::path::PathBuf;
    use std::time::Duration;
    use tokio::sync::mpsc;

    fn sh(script: &str) -> CommandLine {
        CommandLine {
            program: PathBuf::from("/bin/sh"),
            args: vec![OsString::from("-c"), OsString::from(script)],
            data_dir: PathBuf::from("/tmp"),
        }
    }

    async fn next_line(rx: &mut mpsc::Receiver<Event>) -> String {
        let ev = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(ev.kind, EventKind::ProcessOutput);
        ev.reason.unwrap().to_string()
    }

    #[tokio::test]
    async fn test_output_is_forwarded_verbatim() {
        let (sink, mut rx) = OutputSink::channel(64);

        let mut child = LocalLauncher::new()
            .start(&sh("echo '  waiting for connections '; echo oops >&2"), &sink)
            .await
            .unwrap();

        let mut lines = vec![next_line(&mut rx).await, next_line(&mut rx).await];
        lines.sort();
        assert_eq!(lines, vec!["  waiting for connections ", "oops"]);

        child.kill().await.unwrap();
    }

    #[tokio::test]
    async fn test_output_burst_is_not_dropped() {
        let (sink, mut rx) = OutputSink::channel(16);

        let mut child = LocalLauncher::new()
            .start(
                &sh("i=1; while [ $i -le 20000 ]; do echo $i; i=$((i + 1)); done"),
                &sink,
            )
            .await
            .unwrap();
        drop(sink);

        let mut count = 0u32;
        while let Some(ev) = rx.recv().await {
            count += 1;
            assert_eq!(ev.reason.as_deref(), Some(count.to_string().as_str()));
            if count % 1000 == 0 {
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        }
        assert_eq!(count, 20000);
        child.kill().await.unwrap();
    }

    #[tokio::test]
    async fn test_kill_stops_a_live_process() {
        let (sink, _rx) = OutputSink::channel(8);
        let mut child = LocalLauncher::new().start(&sh("sleep 30"), &sink).await.unwrap();

        assert!(child.id().is_some());
        assert!(child.is_alive().await);
        child.kill().await.unwrap();
        assert!(!child.is_alive().await);
    }

    #[tokio::test]
    async fn test_exited_process_is_not_alive() {
        let (sink, _rx) = OutputSink::channel(8);
        let mut child = LocalLauncher::new().start(&sh("exit 0"), &sink).await.unwrap();

        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while child.is_alive().await && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(!child.is_alive().await);
        assert!(!child.start_kill().unwrap());
    }

    #[tokio::test]
    async fn test_start_kill_reports_sent_signal() {
        let (sink, _rx) = OutputSink::channel(8);
        let mut child = LocalLauncher::new().start(&sh("sleep 30"), &sink).await.unwrap();

        assert!(child.start_kill().unwrap());
        child.kill().await.unwrap();
        assert!(!child.is_alive().await);
    }

    #[tokio::test]
    async fn test_missing_executable_is_launch_error() {
        let (sink, _rx) = OutputSink::channel(8);
        let cmd = CommandLine {
            program: PathBuf::from("/nonexistent/mongod"),
            args: Vec::new(),
            data_dir: PathBuf::from("/tmp"),
        };

        let err = LocalLauncher::new().start(&cmd, &sink).await.err().unwrap();
        assert_eq!(err.as_label(), "service_launch");
        assert!(err.is_pre_launch());
    }
}
