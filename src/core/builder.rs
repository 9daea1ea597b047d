use std::sync::Arc;

use crate::{
    channel::{Channel, LocalChannel},
    config::{InstallationRegistry, SupervisorConfig},
    events::Bus,
    launcher::{ChannelLauncher, Launch, LocalLauncher},
    subscribers::{Subscribe, SubscriberSet},
};

use super::supervisor::Supervisor;

/// Builder for constructing a [`Supervisor`].
///
/// Unset seams default to this host: [`LocalLauncher`] and [`LocalChannel`], with an
/// empty [`InstallationRegistry`]. A channel set without a launcher also carries the
/// launch: the process then starts on the channel's host through a [`ChannelLauncher`].
pub struct SupervisorBuilder {
    cfg: SupervisorConfig,
    subscribers: Vec<Arc<dyn Subscribe>>,
    registry: Option<Arc<InstallationRegistry>>,
    launcher: Option<Arc<dyn Launch>>,
    channel: Option<Arc<dyn Channel>>,
    os_signals: bool,
}

impl SupervisorBuilder {
    /// Creates a new builder with the given configuration.
    pub fn new(cfg: SupervisorConfig) -> Self {
        Self {
            cfg,
            subscribers: Vec::new(),
            registry: None,
            launcher: None,
            channel: None,
            os_signals: false,
        }
    }

    /// Sets event subscribers, e.g. a [`LogWriter`](crate::LogWriter) for the build log.
    ///
    /// Subscribers receive runtime events through dedicated workers with bounded queues.
    pub fn with_subscribers(mut self, subscribers: Vec<Arc<dyn Subscribe>>) -> Self {
        self.subscribers = subscribers;
        self
    }

    /// Uses a shared installation registry.
    pub fn with_registry(mut self, registry: Arc<InstallationRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Replaces the process launcher.
    pub fn with_launcher(mut self, launcher: impl Launch) -> Self {
        self.launcher = Some(Arc::new(launcher));
        self
    }

    /// Replaces the execution channel to the service host.
    pub fn with_channel(mut self, channel: impl Channel) -> Self {
        self.channel = Some(Arc::new(channel));
        self
    }

    /// Lets [`Supervisor::scoped`] also stop on `SIGINT`/`SIGTERM`/`SIGQUIT` (Ctrl-C on
    /// Windows).
    ///
    /// Off by default. Once a scoped invocation listened for them, Tokio keeps its signal
    /// handlers installed for the rest of the process, so the default action of these
    /// signals (terminating the process) no longer applies. Enable this only in binaries
    /// that handle shutdown through the supervisor.
    pub fn with_os_signals(mut self) -> Self {
        self.os_signals = true;
        self
    }

    /// Builds the supervisor and starts delivering events to subscribers.
    ///
    /// Must be called inside a Tokio runtime.
    pub fn build(self) -> Arc<Supervisor> {
        let bus = Bus::new(self.cfg.bus_capacity_clamped());
        let subs = SubscriberSet::new(self.subscribers, bus.clone());

        let registry = self.registry.unwrap_or_default();
        let (launcher, channel): (Arc<dyn Launch>, Arc<dyn Channel>) =
            match (self.launcher, self.channel) {
                (Some(launcher), Some(channel)) => (launcher, channel),
                (Some(launcher), None) => (launcher, Arc::new(LocalChannel::new())),
                (None, Some(channel)) => {
                    (Arc::new(ChannelLauncher::new(Arc::clone(&channel))), channel)
                }
                (None, None) => (
                    Arc::new(LocalLauncher::new()),
                    Arc::new(LocalChannel::new()),
                ),
            };

        Arc::new(Supervisor::new_internal(
            self.cfg,
            bus,
            subs,
            registry,
            launcher,
            channel,
            self.os_signals,
        ))
    }
}
