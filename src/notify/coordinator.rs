//! Routes fired signals back to their watch points.

use super::{
    ChangeSourceFactory, SignalDispatcher, SignalId, WatchLocation, WatchRegistry, WatchRoots,
};
use crate::core::PollingConfigService;
use crate::core::blocking::run_blocking;
use crate::error::{ProxyWatchError, Result};
use std::sync::Arc;
use tokio::sync::mpsc;

/// What handling one fired signal did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignalOutcome {
    /// Whether the watch point was armed again. A point that was not is
    /// gone from the registry for good.
    pub rearmed: bool,
    /// Whether the recheck that followed saw a different configuration.
    pub changed: bool,
}

/// Owns the watch registry and reacts to its signals.
///
/// On each fired signal the matching point is re-armed first, then the
/// poller rechecks. Re-arming before reading means a change landing during
/// the read still fires the fresh signal. The recheck happens whether or
/// not the re-arm worked.
pub struct ChangeCoordinator {
    registry: WatchRegistry,
    locations: Vec<WatchLocation>,
    roots: WatchRoots,
    factory: Arc<dyn ChangeSourceFactory>,
    dispatcher: SignalDispatcher,
}

impl ChangeCoordinator {
    /// Create a coordinator for `locations` and the receiver its signals
    /// arrive on.
    pub fn new(
        locations: Vec<WatchLocation>,
        roots: WatchRoots,
        factory: Arc<dyn ChangeSourceFactory>,
    ) -> (Self, mpsc::UnboundedReceiver<SignalId>) {
        let (dispatcher, signals) = SignalDispatcher::channel();
        let coordinator = Self {
            registry: WatchRegistry::new(),
            locations,
            roots,
            factory,
            dispatcher,
        };
        (coordinator, signals)
    }

    /// Populate the registry on the blocking pool, once.
    ///
    /// Returns the number of points added.
    pub async fn ensure_populated(&mut self) -> usize {
        if self.registry.is_populated() {
            return 0;
        }

        // Ids a population run may hand out, whether or not it finishes.
        let reserved = self.registry.next_signal() + self.locations.len() as u64;
        let mut registry = std::mem::take(&mut self.registry);
        let locations = self.locations.clone();
        let roots = self.roots.clone();
        let factory = Arc::clone(&self.factory);
        let dispatcher = self.dispatcher.clone();

        let populated = run_blocking(move || {
            let added =
                registry.ensure_populated(&locations, &roots, factory.as_ref(), &dispatcher);
            (registry, added)
        })
        .await;

        match populated {
            Ok((registry, added)) => {
                self.registry = registry;
                tracing::info!(
                    watching = self.registry.len(),
                    of = self.locations.len(),
                    "Watch registry populated"
                );
                added
            }
            Err(e) => {
                tracing::error!(error = %e, "Watch registry population failed, polling only");
                self.registry = WatchRegistry::abandoned(reserved);
                0
            }
        }
    }

    /// Handle a fired signal: re-arm its point, then recheck.
    ///
    /// # Errors
    ///
    /// Returns [`ProxyWatchError::UntrackedSignal`] if no live point owns
    /// `fired`. No recheck happens in that case.
    pub async fn on_signal<T>(
        &mut self,
        fired: SignalId,
        poller: &mut PollingConfigService<T>,
    ) -> Result<SignalOutcome>
    where
        T: Default + PartialEq + Send + Sync + 'static,
    {
        let Some(index) = self.registry.position(fired) else {
            if self.registry.is_lost(fired) {
                // Armed before population failed: still a real change.
                tracing::debug!(signal = %fired, "Signal from a lost watch point");
                let changed = poller.check_for_changes_now().await;
                return Ok(SignalOutcome {
                    rearmed: false,
                    changed,
                });
            }
            tracing::error!(signal = %fired, "Signal does not belong to any tracked watch point");
            return Err(ProxyWatchError::UntrackedSignal(fired));
        };

        let mut point = self.registry.take(index);
        let location = *point.location();
        let dispatcher = self.dispatcher.clone();

        // A point that fails to arm is dropped on the blocking pool.
        let rearmed = run_blocking(move || point.arm(&dispatcher).then_some(point)).await;

        let rearmed = match rearmed {
            Ok(Some(point)) => {
                tracing::trace!(%location, signal = %fired, "Watch re-armed");
                self.registry.restore(index, point);
                true
            }
            Ok(None) => {
                tracing::warn!(%location, "Watch point retired, location now covered by polling only");
                false
            }
            Err(e) => {
                tracing::error!(%location, error = %e, "Re-arming watch point failed");
                false
            }
        };

        let changed = poller.check_for_changes_now().await;
        Ok(SignalOutcome { rearmed, changed })
    }

    /// The live registry.
    pub fn registry(&self) -> &WatchRegistry {
        &self.registry
    }

    /// Locations currently watched for changes.
    pub fn watched_locations(&self) -> Vec<WatchLocation> {
        self.registry.locations()
    }

    /// Release every watch point on the blocking pool.
    pub async fn shutdown(&mut self) {
        let mut registry = std::mem::take(&mut self.registry);
        let released = registry.len();
        if let Err(e) = run_blocking(move || registry.clear()).await {
            tracing::error!(error = %e, "Releasing watch points failed");
            return;
        }
        tracing::debug!(released, "Watch points released");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::{ChangeSource, Signal, WATCH_LOCATIONS};
    use std::path::Path;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
    use std::time::Duration;

    /// Per-location behaviour of the mock change sources.
    #[derive(Default)]
    struct Behaviour {
        /// Locations whose first arm fails.
        refuse_initial: Vec<String>,
        /// Locations whose re-arms fail.
        refuse_rearm: Vec<String>,
        /// Locations whose open panics.
        panic_on_open: Vec<String>,
        arms: Mutex<Vec<String>>,
        pending: Mutex<Vec<Signal>>,
    }

    #[derive(Clone, Default)]
    struct MockFactory(Arc<Behaviour>);

    struct MockSource {
        name: String,
        armed_once: bool,
        behaviour: Arc<Behaviour>,
    }

    impl ChangeSource for MockSource {
        fn arm(&mut self, signal: Signal) -> Result<()> {
            self.behaviour.arms.lock().unwrap().push(self.name.clone());
            let refused = if self.armed_once {
                &self.behaviour.refuse_rearm
            } else {
                &self.behaviour.refuse_initial
            };
            if refused.contains(&self.name) {
                return Err(ProxyWatchError::WatchError("refused".to_string()));
            }
            self.armed_once = true;
            self.behaviour.pending.lock().unwrap().push(signal);
            Ok(())
        }
    }

    impl ChangeSourceFactory for MockFactory {
        fn open(&self, location: &WatchLocation, _: &Path) -> Result<Box<dyn ChangeSource>> {
            if self.0.panic_on_open.contains(&location.to_string()) {
                panic!("open {} crashed", location);
            }
            Ok(Box::new(MockSource {
                name: location.to_string(),
                armed_once: false,
                behaviour: Arc::clone(&self.0),
            }))
        }
    }

    impl MockFactory {
        fn arm_count(&self, name: &str) -> usize {
            self.0.arms.lock().unwrap().iter().filter(|n| *n == name).count()
        }

        /// Fire the pending signal of the first location still waiting.
        fn fire_first(&self) -> Option<SignalId> {
            let mut pending = self.0.pending.lock().unwrap();
            if pending.is_empty() {
                return None;
            }
            let signal = pending.remove(0);
            let id = signal.id();
            signal.fire();
            Some(id)
        }
    }

    async fn counting_poller(
        reads: Arc<AtomicUsize>,
        value: Arc<AtomicU32>,
    ) -> PollingConfigService<u32> {
        PollingConfigService::new(Duration::from_secs(10), move || {
            reads.fetch_add(1, Ordering::SeqCst);
            value.load(Ordering::SeqCst)
        })
        .await
    }

    fn coordinator(
        factory: &MockFactory,
        locations: &[WatchLocation],
    ) -> (ChangeCoordinator, mpsc::UnboundedReceiver<SignalId>) {
        ChangeCoordinator::new(
            locations.to_vec(),
            WatchRoots::new("/home/u/.config", "/etc"),
            Arc::new(factory.clone()),
        )
    }

    #[tokio::test]
    async fn test_populates_once() {
        let factory = MockFactory::default();
        let (mut coordinator, _signals) = coordinator(&factory, &WATCH_LOCATIONS);

        assert_eq!(coordinator.ensure_populated().await, 3);
        assert_eq!(coordinator.ensure_populated().await, 0);
        assert_eq!(coordinator.watched_locations(), WATCH_LOCATIONS.to_vec());
    }

    #[tokio::test]
    async fn test_survivor_signal_triggers_recheck() {
        let factory = MockFactory(Arc::new(Behaviour {
            refuse_initial: vec!["machine:proxywatch".to_string()],
            ..Default::default()
        }));
        let (mut coordinator, mut signals) = coordinator(&factory, &WATCH_LOCATIONS[..2]);
        assert_eq!(coordinator.ensure_populated().await, 1);

        let reads = Arc::new(AtomicUsize::new(0));
        let value = Arc::new(AtomicU32::new(1));
        let mut poller = counting_poller(Arc::clone(&reads), Arc::clone(&value)).await;
        value.store(2, Ordering::SeqCst);

        let fired = factory.fire_first().unwrap();
        assert_eq!(signals.recv().await, Some(fired));

        let outcome = coordinator.on_signal(fired, &mut poller).await.unwrap();
        assert_eq!(
            outcome,
            SignalOutcome {
                rearmed: true,
                changed: true
            }
        );
        assert_eq!(reads.load(Ordering::SeqCst), 2);
        assert_eq!(*poller.current(), 2);
    }

    #[tokio::test]
    async fn test_failed_rearm_retires_point_for_good() {
        let factory = MockFactory(Arc::new(Behaviour {
            refuse_rearm: vec!["user:proxywatch".to_string()],
            ..Default::default()
        }));
        let (mut coordinator, mut signals) = coordinator(&factory, &WATCH_LOCATIONS[..1]);
        coordinator.ensure_populated().await;

        let reads = Arc::new(AtomicUsize::new(0));
        let mut poller = counting_poller(Arc::clone(&reads), Arc::new(AtomicU32::new(1))).await;

        let fired = factory.fire_first().unwrap();
        signals.recv().await;
        let outcome = coordinator.on_signal(fired, &mut poller).await.unwrap();

        // Recheck still ran.
        assert!(!outcome.rearmed);
        assert_eq!(reads.load(Ordering::SeqCst), 2);
        assert!(coordinator.registry().is_empty());

        // The same signal is now unknown and nothing re-arms the location.
        let again = coordinator.on_signal(fired, &mut poller).await;
        assert!(matches!(again, Err(ProxyWatchError::UntrackedSignal(id)) if id == fired));
        assert_eq!(factory.arm_count("user:proxywatch"), 2);
        assert_eq!(reads.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_unknown_signal_is_an_error() {
        let factory = MockFactory::default();
        let (mut coordinator, _signals) = coordinator(&factory, &WATCH_LOCATIONS);
        coordinator.ensure_populated().await;

        let reads = Arc::new(AtomicUsize::new(0));
        let mut poller = counting_poller(Arc::clone(&reads), Arc::new(AtomicU32::new(0))).await;

        let result = coordinator
            .on_signal(SignalId::from_raw(1_000), &mut poller)
            .await;
        assert!(matches!(result, Err(ProxyWatchError::UntrackedSignal(_))));
        assert_eq!(reads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_panicking_population_is_not_retried() {
        let factory = MockFactory(Arc::new(Behaviour {
            panic_on_open: vec!["machine:proxywatch".to_string()],
            ..Default::default()
        }));
        let (mut coordinator, mut signals) = coordinator(&factory, &WATCH_LOCATIONS);

        assert_eq!(coordinator.ensure_populated().await, 0);
        assert!(coordinator.registry().is_populated());
        assert!(coordinator.registry().is_empty());
        assert!(coordinator.registry().next_signal() >= WATCH_LOCATIONS.len() as u64);

        assert_eq!(coordinator.ensure_populated().await, 0);
        assert_eq!(factory.arm_count("user:proxywatch"), 1);

        // The point armed before the crash is gone but its signal still
        // means a change: recheck without re-arming.
        let reads = Arc::new(AtomicUsize::new(0));
        let mut poller = counting_poller(Arc::clone(&reads), Arc::new(AtomicU32::new(0))).await;
        let lost = factory.fire_first().unwrap();
        assert_eq!(signals.recv().await, Some(lost));
        assert!(coordinator.registry().is_lost(lost));
        let outcome = coordinator.on_signal(lost, &mut poller).await.unwrap();
        assert!(!outcome.rearmed);
        assert_eq!(reads.load(Ordering::SeqCst), 2);
        assert_eq!(factory.arm_count("user:proxywatch"), 1);

        let unknown = SignalId::from_raw(1_000);
        let result = coordinator.on_signal(unknown, &mut poller).await;
        assert!(matches!(result, Err(ProxyWatchError::UntrackedSignal(_))));
    }

    #[tokio::test]
    async fn test_shutdown_releases_points() {
        let factory = MockFactory::default();
        let (mut coordinator, _signals) = coordinator(&factory, &WATCH_LOCATIONS);
        coordinator.ensure_populated().await;

        coordinator.shutdown().await;
        assert!(coordinator.registry().is_empty());
    }
}
