//! # In-process channel.
//!
//! [`LocalChannel`] executes requests on the machine it runs on. It is used directly when
//! supervisor and service share a host, and by [`serve`](super::serve) on the agent side.
//!
//! Launched processes are kept in a table shared by every clone of the channel:
//!
//! ```text
//! Launch     ──► LocalLauncher::start ──► table[id] = { process, output queue }
//! ReadOutput ──► drain table[id].output   (eof + exited → entry removed)
//! IsAlive    ──► table[id].process        (unknown id → not alive)
//! Kill       ──► table[id].process.kill   (unknown id → nothing to kill)
//! ```
//!
//! Dropping the last clone drops the table, which kills every process still in it.

use std::collections::HashMap;
use std::ffi::OsString;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc::{self, error::TryRecvError};

use crate::args::CommandLine;
use crate::channel::{Channel, Request, Response};
use crate::error::{ChannelError, ServiceError};
use crate::events::{Event, OutputSink};
use crate::launcher::{Launch, LocalLauncher, Process};
use crate::probe;

/// How long `ReadOutput` waits for a first line before answering with an empty batch.
const OUTPUT_WAIT: Duration = Duration::from_millis(200);

/// Output lines buffered per hosted process before its forwarders wait for a reader.
const HOSTED_OUTPUT_CAPACITY: usize = 16 * 1024;

struct Hosted {
    process: tokio::sync::Mutex<Box<dyn Process>>,
    output: tokio::sync::Mutex<mpsc::Receiver<Event>>,
}

#[derive(Default)]
struct ProcessTable {
    last_id: AtomicU64,
    entries: Mutex<HashMap<u64, Arc<Hosted>>>,
}

impl ProcessTable {
    fn entries(&self) -> MutexGuard<'_, HashMap<u64, Arc<Hosted>>> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn insert(&self, hosted: Hosted) -> u64 {
        let id = self.last_id.fetch_add(1, Ordering::Relaxed) + 1;
        self.entries().insert(id, Arc::new(hosted));
        id
    }

    fn get(&self, id: u64) -> Option<Arc<Hosted>> {
        self.entries().get(&id).cloned()
    }

    fn remove(&self, id: u64) {
        self.entries().remove(&id);
    }
}

/// Executes requests on the local host.
#[derive(Clone, Default)]
pub struct LocalChannel {
    processes: Arc<ProcessTable>,
}

impl fmt::Debug for LocalChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalChannel")
            .field("processes", &self.processes.entries().len())
            .finish()
    }
}

impl LocalChannel {
    /// Creates a local channel with an empty process table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Executes `request`; failures are reported as [`Response::Failed`].
    pub async fn handle(&self, request: Request) -> Response {
        match request {
            Request::CheckAbsolutePath { path } => Response::AbsolutePath {
                absolute: Path::new(&path).is_absolute(),
            },
            Request::PrepareDirectory { path } => match prepare_directory(&path).await {
                Ok(()) => Response::DirectoryPrepared,
                Err(e) => Response::Failed {
                    error: format!("{}: {e}", path.display()),
                },
            },
            Request::ProbeReadiness {
                address,
                timeout_ms,
            } => Response::Readiness {
                ready: probe::await_ready(&address, Duration::from_millis(timeout_ms)).await,
            },
            Request::Launch { program, args } => self.spawn_hosted(program, args).await,
            Request::ReadOutput { process, max_lines } => {
                self.drain_output(process, max_lines).await
            }
            Request::IsAlive { process } => match self.processes.get(process) {
                Some(hosted) => Response::Alive {
                    alive: hosted.process.lock().await.is_alive().await,
                },
                None => Response::Alive { alive: false },
            },
            Request::Kill { process } => self.kill_hosted(process).await,
        }
    }

    async fn spawn_hosted(&self, program: String, args: Vec<String>) -> Response {
        let cmd = CommandLine {
            program: PathBuf::from(program),
            args: args.into_iter().map(OsString::from).collect(),
            data_dir: PathBuf::new(),
        };
        let (sink, output) = OutputSink::channel(HOSTED_OUTPUT_CAPACITY);
        match LocalLauncher::new().start(&cmd, &sink).await {
            Ok(process) => {
                let pid = process.id();
                let id = self.processes.insert(Hosted {
                    process: tokio::sync::Mutex::new(process),
                    output: tokio::sync::Mutex::new(output),
                });
                tracing::debug!(process = id, ?pid, "hosting launched process");
                Response::Launched { process: id, pid }
            }
            Err(ServiceError::Launch { source, .. }) => Response::Failed {
                error: source.to_string(),
            },
            Err(e) => Response::Failed {
                error: e.as_message(),
            },
        }
    }

    async fn drain_output(&self, id: u64, max_lines: usize) -> Response {
        let Some(hosted) = self.processes.get(id) else {
            return Response::Output {
                lines: Vec::new(),
                eof: true,
            };
        };

        let mut lines = Vec::new();
        let mut eof = false;
        {
            let mut output = hosted.output.lock().await;
            match tokio::time::timeout(OUTPUT_WAIT, output.recv()).await {
                Ok(Some(ev)) => lines.extend(line_of(ev)),
                Ok(None) => eof = true,
                Err(_) => {}
            }
            while !eof && lines.len() < max_lines.max(1) {
                match output.try_recv() {
                    Ok(ev) => lines.extend(line_of(ev)),
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Disconnected) => eof = true,
                }
            }
        }

        if eof && !hosted.process.lock().await.is_alive().await {
            self.processes.remove(id);
        }
        Response::Output { lines, eof }
    }

    async fn kill_hosted(&self, id: u64) -> Response {
        let Some(hosted) = self.processes.get(id) else {
            return Response::Killed;
        };
        let result = hosted.process.lock().await.kill().await;
        match result {
            Ok(()) => Response::Killed,
            Err(e) => Response::Failed {
                error: e.to_string(),
            },
        }
    }
}

fn line_of(ev: Event) -> Option<String> {
    ev.reason.map(|line| line.to_string())
}

#[async_trait]
impl Channel for LocalChannel {
    async fn call(&self, request: Request) -> Result<Response, ChannelError> {
        Ok(self.handle(request).await)
    }
}

/// Deletes `path` recursively if it exists, then recreates it as an empty directory.
///
/// Idempotent: preparing twice in a row leaves an empty directory and never fails on
/// "already exists".
pub async fn prepare_directory(path: &Path) -> io::Result<()> {
    match tokio::fs::symlink_metadata(path).await {
        Ok(meta) if meta.is_dir() => tokio::fs::remove_dir_all(path).await?,
        Ok(_) => tokio::fs::remove_file(path).await?,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(e),
    }
    tokio::fs::create_dir_all(path).await
}
