//! Observer fan-out for configuration changes.

use std::fmt;
use std::sync::Arc;

/// Callback invoked with each changed value.
pub type Observer<T> = Box<dyn Fn(&Arc<T>) + Send + Sync>;

/// Identity of a registered observer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

impl fmt::Display for ObserverId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "observer-{}", self.0)
    }
}

/// Ordered set of observers.
///
/// Owned by the dispatch loop, so registration and notification never run
/// concurrently and no locking is needed.
///
/// # Examples
///
/// ```rust
/// use proxywatch::notify::ObserverSet;
/// use std::sync::Arc;
///
/// let mut observers: ObserverSet<u32> = ObserverSet::new();
/// let id = observers.add(|value| println!("changed to {}", value));
/// observers.notify_all(&Arc::new(7));
/// assert!(observers.remove(id));
/// ```
pub struct ObserverSet<T> {
    observers: Vec<(ObserverId, Observer<T>)>,
    next_id: u64,
}

impl<T> ObserverSet<T> {
    /// Create an empty set.
    pub fn new() -> Self {
        Self {
            observers: Vec::new(),
            next_id: 0,
        }
    }

    /// Register `observer`; it is notified after those added before it.
    pub fn add<F>(&mut self, observer: F) -> ObserverId
    where
        F: Fn(&Arc<T>) + Send + Sync + 'static,
    {
        self.add_boxed(Box::new(observer))
    }

    /// Register an already boxed observer.
    pub fn add_boxed(&mut self, observer: Observer<T>) -> ObserverId {
        let id = ObserverId(self.next_id);
        self.next_id += 1;
        self.observers.push((id, observer));
        id
    }

    /// Unregister `id`. Returns `false` if it was not registered.
    pub fn remove(&mut self, id: ObserverId) -> bool {
        let before = self.observers.len();
        self.observers.retain(|(observer_id, _)| *observer_id != id);
        self.observers.len() != before
    }

    /// Call every observer with `value`, in registration order.
    pub fn notify_all(&self, value: &Arc<T>) {
        for (_id, observer) in &self.observers {
            observer(value);
        }
    }

    /// Number of registered observers.
    pub fn len(&self) -> usize {
        self.observers.len()
    }

    /// Whether no observer is registered.
    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }
}

impl<T> Default for ObserverSet<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_add_and_notify() {
        let mut observers = ObserverSet::new();
        let counter = Arc::new(AtomicUsize::new(0));

        let counter_clone = Arc::clone(&counter);
        observers.add(move |value: &Arc<usize>| {
            counter_clone.fetch_add(**value, Ordering::SeqCst);
        });

        observers.notify_all(&Arc::new(2));
        observers.notify_all(&Arc::new(3));
        assert_eq!(counter.load(Ordering::SeqCst), 5);
    }

    #[test]
    fn test_notification_order() {
        let mut observers = ObserverSet::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        for name in ["first", "second"] {
            let seen = Arc::clone(&seen);
            observers.add(move |_: &Arc<()>| seen.lock().unwrap().push(name));
        }

        observers.notify_all(&Arc::new(()));
        assert_eq!(*seen.lock().unwrap(), vec!["first", "second"]);
    }

    #[test]
    fn test_remove() {
        let mut observers: ObserverSet<()> = ObserverSet::new();
        let counter = Arc::new(AtomicUsize::new(0));

        let counter_clone = Arc::clone(&counter);
        let id = observers.add(move |_| {
            counter_clone.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(observers.len(), 1);

        assert!(observers.remove(id));
        assert!(!observers.remove(id));
        assert!(observers.is_empty());

        observers.notify_all(&Arc::new(()));
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_ids_not_reused() {
        let mut observers: ObserverSet<()> = ObserverSet::new();
        let a = observers.add(|_| {});
        observers.remove(a);
        let b = observers.add(|_| {});
        assert_ne!(a, b);
    }
}
