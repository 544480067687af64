//! The set of live watch points.

use super::{ChangeSourceFactory, SignalDispatcher, SignalId, WatchLocation, WatchPoint, WatchRoots};

/// Owns every live [`WatchPoint`], at most one per location.
///
/// Populated once, on the first observer registration. Locations that fail
/// to open or arm are left out and not retried for the registry's lifetime;
/// the fallback poll still covers them.
#[derive(Debug, Default)]
pub struct WatchRegistry {
    points: Vec<WatchPoint>,
    next_signal: u64,
    populated: bool,
    /// Ids below this were handed out by a population that never finished.
    lost_below: u64,
}

impl WatchRegistry {
    /// Create an empty, unpopulated registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Open and arm a point for every location, once.
    ///
    /// Later calls do nothing. Duplicate locations are collapsed. Returns
    /// the number of points added by this call.
    ///
    /// Blocking: opening and arming touch the filesystem. The service runs
    /// this on the blocking pool.
    pub fn ensure_populated(
        &mut self,
        locations: &[WatchLocation],
        roots: &WatchRoots,
        factory: &dyn ChangeSourceFactory,
        dispatcher: &SignalDispatcher,
    ) -> usize {
        if self.populated {
            return 0;
        }
        self.populated = true;

        let before = self.points.len();
        for location in locations {
            if self.contains(location) {
                continue;
            }

            let signal = SignalId::from_raw(self.next_signal);
            self.next_signal += 1;

            let path = location.resolve(roots);
            let mut point = match WatchPoint::create(*location, path, signal, factory) {
                Ok(point) => point,
                Err(e) => {
                    tracing::warn!(%location, error = %e, "Skipping watch location");
                    continue;
                }
            };

            if !point.arm(dispatcher) {
                tracing::warn!(%location, "Skipping watch location that failed to arm");
                continue;
            }

            tracing::debug!(%location, %signal, path = %point.path().display(), "Watching location");
            self.points.push(point);
        }

        self.points.len() - before
    }

    /// A populated registry with no points, standing in for one whose
    /// population was cut short. Signal ids below `next_signal` are never
    /// handed out again and count as lost.
    pub(crate) fn abandoned(next_signal: u64) -> Self {
        Self {
            points: Vec::new(),
            next_signal,
            populated: true,
            lost_below: next_signal,
        }
    }

    /// Whether `signal` belonged to a point lost with an abandoned
    /// population.
    pub fn is_lost(&self, signal: SignalId) -> bool {
        signal.raw() < self.lost_below
    }

    /// The id the next opened point will get.
    pub(crate) fn next_signal(&self) -> u64 {
        self.next_signal
    }

    /// Whether population has already run.
    pub fn is_populated(&self) -> bool {
        self.populated
    }

    /// Whether a point for `location` is live.
    pub fn contains(&self, location: &WatchLocation) -> bool {
        self.points.iter().any(|point| point.location() == location)
    }

    /// Index of the point owning `signal`.
    pub fn position(&self, signal: SignalId) -> Option<usize> {
        self.points
            .iter()
            .position(|point| point.signal_id() == signal)
    }

    /// Remove and return the point at `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of bounds.
    pub fn take(&mut self, index: usize) -> WatchPoint {
        self.points.remove(index)
    }

    /// Put a point back at `index` after [`take`](Self::take).
    pub fn restore(&mut self, index: usize, point: WatchPoint) {
        let index = index.min(self.points.len());
        self.points.insert(index, point);
    }

    /// Live points in location order.
    pub fn points(&self) -> &[WatchPoint] {
        &self.points
    }

    /// Locations of the live points.
    pub fn locations(&self) -> Vec<WatchLocation> {
        self.points.iter().map(|point| *point.location()).collect()
    }

    /// Number of live points.
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Whether no point is live.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Release every point. Blocking, like population.
    pub fn clear(&mut self) {
        self.points.clear();
    }
}
