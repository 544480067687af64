//! The running proxy configuration service and its dispatch loop.

use crate::core::{PollingConfigService, ProxyConfigServiceBuilder};
use crate::error::{ProxyWatchError, Result};
use crate::notify::{ChangeCoordinator, Observer, ObserverId, SignalId, WatchLocation};
use crate::proxy::ProxyConfig;
use arc_swap::ArcSwap;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{Instant, MissedTickBehavior};

#[cfg(feature = "metrics")]
use crate::metrics::ServiceMetrics;

/// Why a recheck ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecheckTrigger {
    /// The read performed at startup.
    Initial,
    /// The fallback poll interval elapsed.
    Poll,
    /// A watched location changed.
    Signal,
    /// [`ProxyConfigService::force_recheck_now`] was called.
    Forced,
}

impl RecheckTrigger {
    /// Lowercase name, used as a log field and metric attribute.
    pub fn as_str(&self) -> &'static str {
        match self {
            RecheckTrigger::Initial => "initial",
            RecheckTrigger::Poll => "poll",
            RecheckTrigger::Signal => "signal",
            RecheckTrigger::Forced => "forced",
        }
    }
}

pub(crate) enum Command {
    AddObserver {
        observer: Observer<ProxyConfig>,
        reply: oneshot::Sender<ObserverId>,
    },
    RemoveObserver(ObserverId),
    ForceRecheck,
    WatchedLocations(oneshot::Sender<Vec<WatchLocation>>),
    Shutdown(oneshot::Sender<()>),
}

/// Handle to a running proxy configuration service.
///
/// Cheap to clone; every clone talks to the same dispatch loop. The loop
/// stops on [`shutdown`](Self::shutdown) or once every handle is dropped.
///
/// # Examples
///
/// ```rust,no_run
/// use proxywatch::prelude::*;
///
/// # async fn example() -> Result<()> {
/// let service = ProxyConfigService::builder().start().await?;
///
/// // Lock-free snapshot
/// let config = service.current();
/// println!("auto detect: {}", config.auto_detect());
///
/// let _handle = service
///     .add_observer(|config| println!("proxy settings changed: {}", config.proxy_rules()))
///     .await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct ProxyConfigService {
    commands: mpsc::UnboundedSender<Command>,
    current: Arc<ArcSwap<ProxyConfig>>,
}

impl ProxyConfigService {
    /// Create a builder for the service.
    pub fn builder() -> ProxyConfigServiceBuilder {
        ProxyConfigServiceBuilder::new()
    }

    pub(crate) fn spawn(dispatch: DispatchLoop) -> Self {
        let (commands, command_rx) = mpsc::unbounded_channel();
        let current = dispatch.poller.shared();
        tokio::spawn(dispatch.run(command_rx));
        Self { commands, current }
    }

    /// The last observed configuration.
    ///
    /// Lock-free; never waits on the dispatch loop.
    pub fn current(&self) -> Arc<ProxyConfig> {
        self.current.load_full()
    }

    /// Register `observer` for configuration changes.
    ///
    /// The observer runs on the dispatch loop with every configuration
    /// that differs from the one before it. The first registration also
    /// starts watching the settings locations. Dropping the returned
    /// handle unregisters the observer.
    ///
    /// # Errors
    ///
    /// Returns [`ProxyWatchError::ServiceStopped`] after shutdown.
    pub async fn add_observer<F>(&self, observer: F) -> Result<ObserverHandle>
    where
        F: Fn(&Arc<ProxyConfig>) + Send + Sync + 'static,
    {
        let (reply, response) = oneshot::channel();
        self.send(Command::AddObserver {
            observer: Box::new(observer),
            reply,
        })?;
        let id = response.await.map_err(|_| ProxyWatchError::ServiceStopped)?;
        Ok(ObserverHandle {
            id,
            commands: self.commands.clone(),
        })
    }

    /// Ask the dispatch loop to reread the settings now.
    ///
    /// Returns once the request is queued; observers hear about a change
    /// the same way they would after a poll.
    ///
    /// # Errors
    ///
    /// Returns [`ProxyWatchError::ServiceStopped`] after shutdown.
    pub fn force_recheck_now(&self) -> Result<()> {
        self.send(Command::ForceRecheck)
    }

    /// Locations currently watched for changes.
    ///
    /// Empty until the first observer registers, and shrinks as locations
    /// fail to re-arm.
    pub async fn watched_locations(&self) -> Result<Vec<WatchLocation>> {
        let (reply, response) = oneshot::channel();
        self.send(Command::WatchedLocations(reply))?;
        response.await.map_err(|_| ProxyWatchError::ServiceStopped)
    }

    /// Stop the dispatch loop and release every watch.
    ///
    /// Waits until the watches are released. Calling it on a stopped
    /// service does nothing.
    pub async fn shutdown(&self) -> Result<()> {
        let (ack, done) = oneshot::channel();
        if self.commands.send(Command::Shutdown(ack)).is_err() {
            return Ok(());
        }
        // A dropped ack means another shutdown won the race.
        let _ = done.await;
        Ok(())
    }

    /// Whether the dispatch loop is still running.
    pub fn is_running(&self) -> bool {
        !self.commands.is_closed()
    }

    fn send(&self, command: Command) -> Result<()> {
        self.commands
            .send(command)
            .map_err(|_| ProxyWatchError::ServiceStopped)
    }
}

/// Keeps an observer registered; dropping it unregisters the observer.
#[must_use = "dropping the handle unregisters the observer"]
pub struct ObserverHandle {
    id: ObserverId,
    commands: mpsc::UnboundedSender<Command>,
}

impl ObserverHandle {
    /// Identity of the registered observer.
    pub fn id(&self) -> ObserverId {
        self.id
    }
}

impl Drop for ObserverHandle {
    fn drop(&mut self) {
        // Service already stopped otherwise.
        let _ = self.commands.send(Command::RemoveObserver(self.id));
    }
}

/// State owned by the dispatch task.
pub(crate) struct DispatchLoop {
    pub(crate) poller: PollingConfigService<ProxyConfig>,
    pub(crate) coordinator: ChangeCoordinator,
    pub(crate) signals: mpsc::UnboundedReceiver<SignalId>,
    #[cfg(feature = "metrics")]
    pub(crate) metrics: Option<ServiceMetrics>,
}

impl DispatchLoop {
    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>) {
        let period = self.poller.poll_interval();
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::debug!(poll_interval = ?period, "Dispatch loop started");

        let shutdown_ack = loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.recheck(RecheckTrigger::Poll).await;
                    #[cfg(feature = "metrics")]
                    self.record(|m| m.update_config_age());
                }
                Some(fired) = self.signals.recv() => {
                    self.on_signal(fired).await;
                    ticker.reset();
                }
                command = commands.recv() => match command {
                    Some(Command::AddObserver { observer, reply }) => {
                        self.add_observer(observer, reply).await;
                    }
                    Some(Command::RemoveObserver(id)) => {
                        if self.poller.remove_observer(id) {
                            tracing::debug!(observer = %id, "Observer removed");
                            self.observers_changed();
                        }
                    }
                    Some(Command::ForceRecheck) => {
                        self.recheck(RecheckTrigger::Forced).await;
                        ticker.reset();
                    }
                    Some(Command::WatchedLocations(reply)) => {
                        let _ = reply.send(self.coordinator.watched_locations());
                    }
                    Some(Command::Shutdown(ack)) => break Some(ack),
                    None => break None,
                },
            }
        };

        // Fail queued and future requests before releasing the watches.
        drop(commands);
        self.coordinator.shutdown().await;
        tracing::info!("Proxy configuration service stopped");

        // The signal receiver goes before the ack.
        drop(self);
        if let Some(ack) = shutdown_ack {
            let _ = ack.send(());
        }
    }

    async fn recheck(&mut self, trigger: RecheckTrigger) -> bool {
        #[cfg(feature = "metrics")]
        let timer = self.metrics.as_ref().map(|m| m.start_recheck(trigger));

        let changed = self.poller.check_for_changes_now().await;
        tracing::debug!(trigger = trigger.as_str(), changed, "Recheck complete");

        #[cfg(feature = "metrics")]
        self.record(|m| {
            if let Some(timer) = timer {
                m.record_recheck(timer, changed);
            }
        });
        changed
    }

    async fn on_signal(&mut self, fired: SignalId) {
        #[cfg(feature = "metrics")]
        let timer = self
            .metrics
            .as_ref()
            .map(|m| m.start_recheck(RecheckTrigger::Signal));

        match self.coordinator.on_signal(fired, &mut self.poller).await {
            Ok(outcome) => {
                tracing::debug!(
                    signal = %fired,
                    rearmed = outcome.rearmed,
                    changed = outcome.changed,
                    "Change signal handled"
                );
                #[cfg(feature = "metrics")]
                self.record(|m| {
                    m.record_signal(outcome.rearmed);
                    if let Some(timer) = timer {
                        m.record_recheck(timer, outcome.changed);
                    }
                    m.update_watch_count(self.coordinator.registry().len());
                });
            }
            Err(e) => {
                tracing::error!(signal = %fired, error = %e, "Change signal dropped");
                debug_assert!(
                    !matches!(e, ProxyWatchError::UntrackedSignal(_)),
                    "untracked change signal {}",
                    fired
                );
            }
        }
    }

    async fn add_observer(
        &mut self,
        observer: Observer<ProxyConfig>,
        reply: oneshot::Sender<ObserverId>,
    ) {
        let added = self.coordinator.ensure_populated().await;
        if added > 0 {
            tracing::debug!(added, "Watching settings locations");
            #[cfg(feature = "metrics")]
            self.record(|m| m.update_watch_count(self.coordinator.registry().len()));
        }

        let id = self.poller.add_observer_boxed(observer);
        if reply.send(id).is_err() {
            // Caller went away before hearing back.
            self.poller.remove_observer(id);
            return;
        }
        tracing::debug!(observer = %id, "Observer added");
        self.observers_changed();
    }

    fn observers_changed(&self) {
        tracing::trace!(observers = self.poller.observer_count(), "Observer set changed");
        #[cfg(feature = "metrics")]
        self.record(|m| m.update_observer_count(self.poller.observer_count()));
    }

    #[cfg(feature = "metrics")]
    fn record(&self, record: impl FnOnce(&ServiceMetrics)) {
        if let Some(metrics) = &self.metrics {
            record(metrics);
        }
    }
}
