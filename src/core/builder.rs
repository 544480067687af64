//! Builder for starting a ProxyConfigService.

use crate::core::service::DispatchLoop;
use crate::core::{PollingConfigService, ProxyConfigService, RecheckTrigger, ServiceSettings};
use crate::error::{ProxyWatchError, Result};
use crate::notify::{
    ChangeCoordinator, ChangeSourceFactory, WATCH_LOCATIONS, WatchRoots, default_factory,
};
use crate::sources::{ProxySettingsSource, SettingsStore, parse};
use std::sync::Arc;
use std::time::Duration;

#[cfg(feature = "metrics")]
use crate::metrics::ServiceMetrics;

/// Builder for a [`ProxyConfigService`].
///
/// Defaults: the tiered [`SettingsStore`] under [`WatchRoots::system`], a
/// 10 second fallback poll, and the change sources of this build
/// ([`default_factory`]).
///
/// # Examples
///
/// ```rust,no_run
/// use proxywatch::prelude::*;
/// use proxywatch::notify::WatchRoots;
/// use std::time::Duration;
///
/// # async fn example() -> Result<()> {
/// let service = ProxyConfigService::builder()
///     .with_poll_interval(Duration::from_secs(30))
///     .with_roots(WatchRoots::new("/tmp/sandbox/user", "/tmp/sandbox/machine"))
///     .start()
///     .await?;
/// # Ok(())
/// # }
/// ```
pub struct ProxyConfigServiceBuilder {
    settings: ServiceSettings,
    poll_interval: Option<Duration>,
    roots: Option<WatchRoots>,
    source: Option<Arc<dyn ProxySettingsSource>>,
    factory: Option<Arc<dyn ChangeSourceFactory>>,
    #[cfg(feature = "metrics")]
    metrics: Option<ServiceMetrics>,
}

impl ProxyConfigServiceBuilder {
    /// Create a builder with default settings.
    pub fn new() -> Self {
        Self {
            settings: ServiceSettings::default(),
            poll_interval: None,
            roots: None,
            source: None,
            factory: None,
            #[cfg(feature = "metrics")]
            metrics: None,
        }
    }

    /// Use previously loaded service settings.
    ///
    /// An interval set with [`with_poll_interval`](Self::with_poll_interval)
    /// takes precedence over the one in `settings`.
    ///
    /// ```rust,no_run
    /// use proxywatch::prelude::*;
    ///
    /// # async fn example() -> Result<()> {
    /// let service = ProxyConfigService::builder()
    ///     .with_settings(ServiceSettings::from_env()?)
    ///     .start()
    ///     .await?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn with_settings(mut self, settings: ServiceSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Set the fallback poll interval exactly, sub-second values included.
    /// Must be non-zero.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = Some(interval);
        self
    }

    fn poll_interval(&self) -> Duration {
        self.poll_interval
            .unwrap_or_else(|| self.settings.poll_interval())
    }

    /// Anchor the watch locations (and the default settings store) at
    /// `roots` instead of the system directories.
    pub fn with_roots(mut self, roots: WatchRoots) -> Self {
        self.roots = Some(roots);
        self
    }

    /// Read raw settings from `source` instead of the settings store.
    ///
    /// Watch locations still decide when to reread.
    pub fn with_source<S: ProxySettingsSource + 'static>(mut self, source: S) -> Self {
        self.source = Some(Arc::new(source));
        self
    }

    /// Open watch points through `factory`.
    pub fn with_change_sources<F: ChangeSourceFactory + 'static>(mut self, factory: F) -> Self {
        self.factory = Some(Arc::new(factory));
        self
    }

    /// Record service metrics on `meter`.
    #[cfg(feature = "metrics")]
    pub fn with_metrics(mut self, meter: opentelemetry::metrics::Meter) -> Self {
        self.metrics = Some(ServiceMetrics::new(meter));
        self
    }

    /// Perform the initial read and spawn the dispatch loop.
    ///
    /// Locations are not watched until the first observer registers.
    ///
    /// # Errors
    ///
    /// Returns an error if called outside a tokio runtime or if the poll
    /// interval is zero.
    pub async fn start(self) -> Result<ProxyConfigService> {
        tokio::runtime::Handle::try_current().map_err(|_| {
            ProxyWatchError::Other("ProxyConfigService must start inside a tokio runtime".into())
        })?;

        let interval = self.poll_interval();
        if interval.is_zero() {
            return Err(ProxyWatchError::Other(
                "Poll interval must be non-zero".to_string(),
            ));
        }

        let roots = self.roots.unwrap_or_else(WatchRoots::system);
        let source: Arc<dyn ProxySettingsSource> = match self.source {
            Some(source) => source,
            None => Arc::new(SettingsStore::new(&roots)),
        };
        let factory = self.factory.unwrap_or_else(default_factory);

        tracing::info!(
            source = %source.name(),
            poll_interval = ?interval,
            "Starting proxy configuration service"
        );

        #[cfg(feature = "metrics")]
        let read_metrics = self.metrics.clone();
        let reader = move || {
            let raw = source.read();
            #[cfg(feature = "metrics")]
            if let (Err(_), Some(metrics)) = (&raw, &read_metrics) {
                metrics.record_read_failure();
            }
            parse(raw)
        };

        #[cfg(feature = "metrics")]
        let timer = self
            .metrics
            .as_ref()
            .map(|m| m.start_recheck(RecheckTrigger::Initial));

        let poller = PollingConfigService::new(interval, reader).await;
        tracing::debug!(
            trigger = RecheckTrigger::Initial.as_str(),
            direct = poller.current().is_direct(),
            "Initial proxy configuration read"
        );

        #[cfg(feature = "metrics")]
        if let (Some(metrics), Some(timer)) = (&self.metrics, timer) {
            metrics.record_recheck(timer, true);
        }

        let (coordinator, signals) = ChangeCoordinator::new(WATCH_LOCATIONS.to_vec(), roots, factory);

        Ok(ProxyConfigService::spawn(DispatchLoop {
            poller,
            coordinator,
            signals,
            #[cfg(feature = "metrics")]
            metrics: self.metrics,
        }))
    }
}

impl Default for ProxyConfigServiceBuilder {
    fn default() -> Self {
        Self::new()
    }
}
