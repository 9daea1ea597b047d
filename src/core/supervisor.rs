//! # Supervisor: brings a service up, hands it out, and guarantees its teardown.
//!
//! The [`Supervisor`] owns the event bus, the [`SubscriberSet`] (through its listener
//! task), the installation registry, and the two seams that touch the service host: a
//! [`Launch`] implementation and a [`Channel`]. Process output reaches the listener on
//! its own lossless queue ([`OutputSink`]).
//!
//! ## Invocation state machine
//! ```text
//! start(config, host)
//!   Idle
//!    ├─ resolve installation, workspace, executable      (missing → Configuration)
//!    ├─ channel: is dbpath absolute on the host?         (failure → Channel)
//!    ├─ ArgumentBuilder → CommandLine
//!    ▼
//!   DirectoryPrepared   channel: wipe + recreate data dir  (failure → Setup)
//!    ▼
//!   Launched            launcher.start(cmd, output)        (failure → Launch)
//!    ▼
//!   GateEvaluated       channel: probe <probe_host>:<port> within the effective timeout
//!    │                    ready → ServiceReady | not ready → ServiceNotReady
//!    │                    probe error → ProbeErrored
//!    ▼
//!   Handed-off          Ok(ServiceHandle)   (always, once the process was launched)
//!    ▼
//!   TornDown            handle.release() / drop(handle)
//! ```
//!
//! ## Event flow
//! ```text
//! Supervisor / ServiceHandle ── publish(Event) ──► Bus ──► listener ──► SubscriberSet::emit
//! output forwarders ── OutputSink::line ══ bounded ══► listener ──► SubscriberSet::emit_wait
//!                                                                    └► [queue S1] ... [queue SN]
//!
//! shutdown(): listener drains the bus and the output queue, then
//! SubscriberSet::shutdown() flushes the subscriber queues
//! ```
//!
//! ## Example
//! ```rust,no_run
//! use std::sync::Arc;
//! use mongovisor::{
//!     Host, Installation, InstallationRegistry, ServiceConfig, ServiceError, Supervisor,
//!     SupervisorConfig,
//! };
//! #[cfg(feature = "logging")]
//! use mongovisor::LogWriter;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), ServiceError> {
//!     let cfg = SupervisorConfig::default();
//!     let registry = Arc::new(InstallationRegistry::new(vec![
//!         Installation::new("mongo-7", "/opt/mongodb/bin/mongod"),
//!     ]));
//!
//!     let mut subs: Vec<Arc<dyn mongovisor::Subscribe>> = Vec::new();
//!     #[cfg(feature = "logging")]
//!     subs.push(Arc::new(LogWriter::stdout(cfg.tag.clone())));
//!
//!     let sup = Supervisor::builder(cfg)
//!         .with_registry(registry)
//!         .with_subscribers(subs)
//!         .build();
//!
//!     let config = ServiceConfig::new("mongo-7").with_port(27018);
//!     let host = Host::local("/var/lib/ci/workspace");
//!
//!     let count = sup
//!         .scoped(&config, &host, |info, _token| async move {
//!             // run integration tests against info.address
//!             Ok::<_, ServiceError>(info.port)
//!         })
//!         .await?;
//!
//!     sup.shutdown().await;
//!     assert_eq!(count, 27018);
//!     Ok(())
//! }
//! ```

use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::{
    args::ArgumentBuilder,
    channel::Channel,
    config::{Host, InstallationRegistry, ServiceConfig, SupervisorConfig},
    error::ServiceError,
    events::{Bus, Event, EventKind, OutputSink},
    launcher::Launch,
    probe,
    subscribers::SubscriberSet,
};

use super::{
    builder::SupervisorBuilder,
    handle::{Readiness, ServiceHandle, ServiceInfo},
    shutdown,
};

struct Listener {
    stop: CancellationToken,
    join: JoinHandle<()>,
}

/// Starts supervised services and delivers their events to subscribers.
pub struct Supervisor {
    cfg: SupervisorConfig,
    bus: Bus,
    output: OutputSink,
    registry: Arc<InstallationRegistry>,
    launcher: Arc<dyn Launch>,
    channel: Arc<dyn Channel>,
    os_signals: bool,
    runtime_token: CancellationToken,
    listener: Mutex<Option<Listener>>,
}

impl Supervisor {
    /// Returns a builder for a supervisor with the given configuration.
    pub fn builder(cfg: SupervisorConfig) -> SupervisorBuilder {
        SupervisorBuilder::new(cfg)
    }

    pub(crate) fn new_internal(
        cfg: SupervisorConfig,
        bus: Bus,
        subs: SubscriberSet,
        registry: Arc<InstallationRegistry>,
        launcher: Arc<dyn Launch>,
        channel: Arc<dyn Channel>,
        os_signals: bool,
    ) -> Self {
        let (output, output_rx) = OutputSink::channel(cfg.output_capacity_clamped());
        let listener = Self::subscriber_listener(&bus, output_rx, subs);
        Self {
            cfg,
            bus,
            output,
            registry,
            launcher,
            channel,
            os_signals,
            runtime_token: CancellationToken::new(),
            listener: Mutex::new(Some(listener)),
        }
    }

    /// Global configuration.
    pub fn config(&self) -> &SupervisorConfig {
        &self.cfg
    }

    /// Event bus; publish custom events or subscribe to raw events here.
    pub fn bus(&self) -> &Bus {
        &self.bus
    }

    /// Installation registry consulted by every invocation.
    pub fn registry(&self) -> &Arc<InstallationRegistry> {
        &self.registry
    }

    /// `true` when [`Supervisor::scoped`] also stops on termination signals.
    ///
    /// See [`SupervisorBuilder::with_os_signals`].
    pub fn observes_signals(&self) -> bool {
        self.os_signals
    }

    /// Parent of every token handed to [`Supervisor::scoped`] tasks.
    ///
    /// Cancelling it interrupts all running scoped invocations.
    pub fn cancel_token(&self) -> CancellationToken {
        self.runtime_token.clone()
    }

    /// Prepares the data directory, launches the service and waits for readiness.
    ///
    /// Once the process is launched a handle is always returned, whatever the readiness
    /// outcome; errors are only returned when nothing was started.
    pub async fn start(
        &self,
        config: &ServiceConfig,
        host: &Host,
    ) -> Result<ServiceHandle, ServiceError> {
        let installation = self.registry.find(&config.installation).ok_or_else(|| {
            ServiceError::configuration(format!(
                "No MongoDB installation available (requested {:?})",
                config.installation
            ))
        })?;
        let workspace = host
            .workspace
            .as_deref()
            .ok_or_else(|| ServiceError::configuration("No Workspace available"))?;
        let program = installation.executable_for(host.platform).ok_or_else(|| {
            ServiceError::configuration(format!(
                "installation {:?} has no executable for {:?}",
                installation.name, host.platform
            ))
        })?;

        let dbpath_is_absolute = match config.dbpath() {
            Some(path) => self.channel.is_absolute(path).await?,
            None => false,
        };
        let cmd = ArgumentBuilder::new(config, &installation, workspace)
            .platform(host.platform)
            .log_file(&self.cfg.log_file)
            .build(program, dbpath_is_absolute);

        self.channel
            .prepare_directory(cmd.data_dir.clone())
            .await
            .map_err(|e| ServiceError::Setup {
                path: cmd.data_dir.clone(),
                error: e.as_message(),
            })?;
        self.bus
            .publish(Event::new(EventKind::DirectoryPrepared).with_path(cmd.data_dir.clone()));

        self.bus
            .publish(Event::new(EventKind::LaunchRequested).with_reason(cmd.to_string()));
        let process = self.launcher.start(&cmd, &self.output).await?;
        let pid = process.id();
        self.bus
            .publish(Event::new(EventKind::ProcessStarted).with_pid(pid));

        let timeout = self.effective_timeout(config.effective_start_timeout(&installation));
        let port = config
            .effective_port(&installation)
            .unwrap_or(self.cfg.default_port);
        let address = probe::address(&self.cfg.probe_host, Some(port));
        let readiness = self.evaluate(&address, timeout).await;

        let info = ServiceInfo {
            command: cmd,
            address,
            port,
            pid,
            readiness,
        };
        Ok(ServiceHandle::new(process, self.bus.clone(), info))
    }

    /// Runs `task` while the service is up and releases the service afterwards.
    ///
    /// The service is released whether the task returns `Ok` or `Err`, or the
    /// invocation is interrupted: the token passed to `task` or [`Supervisor::cancel_token`]
    /// is cancelled, or, with [`SupervisorBuilder::with_os_signals`], a termination signal
    /// arrives. An interrupted invocation returns [`ServiceError::Canceled`].
    pub async fn scoped<F, Fut, T, E>(
        &self,
        config: &ServiceConfig,
        host: &Host,
        task: F,
    ) -> Result<T, E>
    where
        F: FnOnce(ServiceInfo, CancellationToken) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<ServiceError>,
    {
        let handle = self.start(config, host).await?;
        let token = self.runtime_token.child_token();
        let fut = task(handle.info().clone(), token.clone());

        let outcome = tokio::select! {
            res = fut => Some(res),
            why = shutdown::interrupted(&token, self.os_signals) => {
                self.bus.publish(
                    Event::new(EventKind::ShutdownRequested).with_reason(why.as_str()),
                );
                token.cancel();
                None
            }
        };

        handle.release().await;
        match outcome {
            Some(res) => res,
            None => Err(ServiceError::Canceled.into()),
        }
    }

    /// Stops the event listener after every published event reached the subscribers.
    ///
    /// Idempotent; events published afterwards are not delivered.
    pub async fn shutdown(&self) {
        let listener = self
            .listener
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(Listener { stop, join }) = listener {
            stop.cancel();
            let _ = join.await;
        }
    }

    fn effective_timeout(&self, configured: Duration) -> Duration {
        if configured.is_zero() {
            self.cfg.default_start_timeout()
        } else {
            configured
        }
    }

    async fn evaluate(&self, address: &str, timeout: Duration) -> Readiness {
        self.bus.publish(
            Event::new(EventKind::ProbeStarted)
                .with_address(address)
                .with_timeout(timeout),
        );
        match self.channel.probe_readiness(address, timeout).await {
            Ok(true) => {
                self.bus
                    .publish(Event::new(EventKind::ServiceReady).with_address(address));
                Readiness::Ready
            }
            Ok(false) => {
                self.bus
                    .publish(Event::new(EventKind::ServiceNotReady).with_address(address));
                Readiness::NotReady
            }
            Err(e) => {
                tracing::warn!(address, error = %e, "readiness could not be evaluated");
                self.bus.publish(
                    Event::new(EventKind::ProbeErrored)
                        .with_address(address)
                        .with_reason(e.as_message()),
                );
                Readiness::Unknown
            }
        }
    }

    /// Forwards bus events and process output to the subscriber set.
    ///
    /// Output waits for room in subscriber queues; bus events never do. On stop, drains
    /// what is still buffered in both and flushes every queue.
    fn subscriber_listener(
        bus: &Bus,
        mut output: mpsc::Receiver<Event>,
        set: SubscriberSet,
    ) -> Listener {
        let mut rx = bus.subscribe();
        let stop = CancellationToken::new();
        let token = stop.clone();

        let join = tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    res = rx.recv() => match res {
                        Ok(ev) => set.emit(&ev),
                        Err(RecvError::Lagged(skipped)) => {
                            tracing::warn!(skipped, "event listener lagged behind the bus");
                        }
                        Err(RecvError::Closed) => break,
                    },
                    Some(line) = output.recv() => set.emit_wait(&line).await,
                    _ = token.cancelled() => break,
                }
            }
            output.close();
            while let Some(line) = output.recv().await {
                set.emit_wait(&line).await;
            }
            loop {
                match rx.try_recv() {
                    Ok(ev) => set.emit(&ev),
                    Err(TryRecvError::Lagged(_)) => continue,
                    Err(_) => break,
                }
            }
            set.shutdown().await;
        });

        Listener { stop, join }
    }
}

impl Drop for Supervisor {
    fn drop(&mut self) {
        let listener = self
            .listener
            .get_mut()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(listener) = listener {
            listener.stop.cancel();
        }
    }
}
