//! Time-based configuration polling with change detection.

use crate::core::blocking::run_blocking;
use crate::notify::{Observer, ObserverId, ObserverSet};
use arc_swap::ArcSwap;
use std::sync::Arc;
use std::time::Duration;

/// Reads the current value of a polled configuration. Blocking.
pub type Reader<T> = Arc<dyn Fn() -> T + Send + Sync>;

/// Keeps the last observed value of a configuration and tells observers
/// when a fresh read differs from it.
///
/// Not itself a task: the owner decides when to call
/// [`check_for_changes_now`](Self::check_for_changes_now), typically on a
/// ticker of [`poll_interval`](Self::poll_interval). Each read runs on the
/// blocking pool and is awaited before the next one starts, so comparing
/// and notifying always happen against the value the previous read stored.
///
/// # Examples
///
/// ```rust
/// use proxywatch::core::PollingConfigService;
/// use std::sync::Arc;
/// use std::sync::atomic::{AtomicU32, Ordering};
/// use std::time::Duration;
///
/// # async fn example() {
/// let source = Arc::new(AtomicU32::new(1));
/// let reader_source = Arc::clone(&source);
/// let mut poller = PollingConfigService::new(Duration::from_secs(10), move || {
///     reader_source.load(Ordering::SeqCst)
/// })
/// .await;
///
/// source.store(2, Ordering::SeqCst);
/// assert!(poller.check_for_changes_now().await);
/// assert_eq!(*poller.current(), 2);
/// # }
/// ```
pub struct PollingConfigService<T> {
    interval: Duration,
    reader: Reader<T>,
    current: Arc<ArcSwap<T>>,
    observers: ObserverSet<T>,
}

impl<T> PollingConfigService<T>
where
    T: Default + PartialEq + Send + Sync + 'static,
{
    /// Create a poller and perform the initial read.
    ///
    /// If the initial read panics the poller starts from `T::default()`.
    pub async fn new<F>(interval: Duration, reader: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        let reader: Reader<T> = Arc::new(reader);
        let initial = match run_blocking({
            let reader = Arc::clone(&reader);
            move || reader()
        })
        .await
        {
            Ok(value) => value,
            Err(e) => {
                tracing::error!(error = %e, "Initial configuration read failed, using default");
                T::default()
            }
        };

        Self {
            interval,
            reader,
            current: Arc::new(ArcSwap::from_pointee(initial)),
            observers: ObserverSet::new(),
        }
    }

    /// Read now, outside the polling cycle.
    ///
    /// Stores the fresh value and notifies every observer if it differs
    /// from the last observed one. Returns whether it differed. A read
    /// that panics keeps the previous value.
    pub async fn check_for_changes_now(&mut self) -> bool {
        let reader = Arc::clone(&self.reader);
        let fresh = match run_blocking(move || reader()).await {
            Ok(value) => value,
            Err(e) => {
                tracing::error!(error = %e, "Configuration read failed, keeping previous value");
                return false;
            }
        };

        if *self.current.load_full() == fresh {
            tracing::trace!("Configuration unchanged");
            return false;
        }

        let fresh = Arc::new(fresh);
        self.current.store(Arc::clone(&fresh));
        tracing::debug!(observers = self.observers.len(), "Configuration changed");
        self.observers.notify_all(&fresh);
        true
    }

    /// Register a change observer.
    pub fn add_observer<F>(&mut self, observer: F) -> ObserverId
    where
        F: Fn(&Arc<T>) + Send + Sync + 'static,
    {
        self.observers.add(observer)
    }

    /// Register an already boxed change observer.
    pub fn add_observer_boxed(&mut self, observer: Observer<T>) -> ObserverId {
        self.observers.add_boxed(observer)
    }

    /// Unregister an observer. Returns `false` if it was not registered.
    pub fn remove_observer(&mut self, id: ObserverId) -> bool {
        self.observers.remove(id)
    }

    /// Number of registered observers.
    pub fn observer_count(&self) -> usize {
        self.observers.len()
    }
}

impl<T> PollingConfigService<T> {
    /// The last observed value.
    pub fn current(&self) -> Arc<T> {
        self.current.load_full()
    }

    /// The cell holding the last observed value, for lock-free readers on
    /// other tasks.
    pub fn shared(&self) -> Arc<ArcSwap<T>> {
        Arc::clone(&self.current)
    }

    /// Interval between regular polls.
    pub fn poll_interval(&self) -> Duration {
        self.interval
    }
}
