//! Service metrics using OpenTelemetry.

use crate::core::RecheckTrigger;
use opentelemetry::KeyValue;
use opentelemetry::metrics::{Counter, Gauge, Histogram, Meter};
use std::sync::Arc;
use std::time::Instant;

/// Metrics collector for the proxy configuration service.
///
/// # Examples
///
/// ```rust,no_run
/// use proxywatch::core::RecheckTrigger;
/// use proxywatch::metrics::ServiceMetrics;
/// use opentelemetry::global;
///
/// let metrics = ServiceMetrics::new(global::meter("proxywatch"));
///
/// let timer = metrics.start_recheck(RecheckTrigger::Poll);
/// // ... read and compare ...
/// metrics.record_recheck(timer, false);
/// ```
#[derive(Clone)]
pub struct ServiceMetrics {
    rechecks: Counter<u64>,
    changes: Counter<u64>,
    recheck_duration: Histogram<f64>,
    read_failures: Counter<u64>,
    signals: Counter<u64>,
    retired_watches: Counter<u64>,
    active_watches: Gauge<i64>,
    active_observers: Gauge<i64>,
    config_age_seconds: Gauge<i64>,
    last_change: Arc<parking_lot::Mutex<Instant>>,
}

impl ServiceMetrics {
    /// Create a collector registering its instruments on `meter`.
    pub fn new(meter: Meter) -> Self {
        let rechecks = meter
            .u64_counter("proxywatch.recheck.count")
            .with_description("Configuration rechecks, by trigger")
            .build();

        let changes = meter
            .u64_counter("proxywatch.recheck.changes")
            .with_description("Rechecks that observed a different configuration")
            .build();

        let recheck_duration = meter
            .f64_histogram("proxywatch.recheck.duration")
            .with_description("Duration of rechecks in seconds")
            .with_unit("s")
            .build();

        let read_failures = meter
            .u64_counter("proxywatch.read.failures")
            .with_description("Settings reads that failed and fell back to direct")
            .build();

        let signals = meter
            .u64_counter("proxywatch.watch.signals")
            .with_description("Change signals received from watch points")
            .build();

        let retired_watches = meter
            .u64_counter("proxywatch.watch.retired")
            .with_description("Watch points dropped after failing to re-arm")
            .build();

        let active_watches = meter
            .i64_gauge("proxywatch.watch.active")
            .with_description("Live watch points")
            .build();

        let active_observers = meter
            .i64_gauge("proxywatch.observers.active")
            .with_description("Registered change observers")
            .build();

        let config_age_seconds = meter
            .i64_gauge("proxywatch.config.age")
            .with_description("Time since the configuration last changed in seconds")
            .with_unit("s")
            .build();

        Self {
            rechecks,
            changes,
            recheck_duration,
            read_failures,
            signals,
            retired_watches,
            active_watches,
            active_observers,
            config_age_seconds,
            last_change: Arc::new(parking_lot::Mutex::new(Instant::now())),
        }
    }

    /// Count a recheck and start its timer.
    ///
    /// Pass the returned `Instant` to [`record_recheck`](Self::record_recheck).
    pub fn start_recheck(&self, trigger: RecheckTrigger) -> Instant {
        self.rechecks
            .add(1, &[KeyValue::new("trigger", trigger.as_str())]);
        Instant::now()
    }

    /// Record a finished recheck.
    pub fn record_recheck(&self, start: Instant, changed: bool) {
        self.recheck_duration
            .record(start.elapsed().as_secs_f64(), &[]);
        if changed {
            self.changes.add(1, &[]);
            *self.last_change.lock() = Instant::now();
        }
    }

    /// Record a settings read that failed.
    pub fn record_read_failure(&self) {
        self.read_failures.add(1, &[]);
    }

    /// Record a change signal and whether its point survived re-arming.
    pub fn record_signal(&self, rearmed: bool) {
        self.signals.add(1, &[]);
        if !rearmed {
            self.retired_watches.add(1, &[]);
        }
    }

    /// Update the number of live watch points.
    pub fn update_watch_count(&self, count: usize) {
        self.active_watches.record(count as i64, &[]);
    }

    /// Update the number of registered observers.
    pub fn update_observer_count(&self, count: usize) {
        self.active_observers.record(count as i64, &[]);
    }

    /// Update the configuration age gauge.
    pub fn update_config_age(&self) {
        let age_secs = self.last_change.lock().elapsed().as_secs() as i64;
        self.config_age_seconds.record(age_secs, &[]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opentelemetry::global;

    #[test]
    fn test_metrics_operations() {
        let metrics = ServiceMetrics::new(global::meter("test"));

        for trigger in [
            RecheckTrigger::Initial,
            RecheckTrigger::Poll,
            RecheckTrigger::Signal,
            RecheckTrigger::Forced,
        ] {
            let timer = metrics.start_recheck(trigger);
            metrics.record_recheck(timer, trigger == RecheckTrigger::Signal);
        }

        metrics.record_read_failure();
        metrics.record_signal(true);
        metrics.record_signal(false);
        metrics.update_watch_count(2);
        metrics.update_observer_count(1);
        metrics.update_config_age();
    }

    #[test]
    fn test_change_resets_age() {
        let metrics = ServiceMetrics::new(global::meter("test"));
        std::thread::sleep(std::time::Duration::from_millis(10));
        let before = metrics.last_change.lock().elapsed();

        let timer = metrics.start_recheck(RecheckTrigger::Forced);
        metrics.record_recheck(timer, true);
        assert!(metrics.last_change.lock().elapsed() < before);
    }
}
