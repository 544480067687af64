//! OpenTelemetry metrics for the proxy configuration service.
//!
//! Tracks:
//! - Rechecks by trigger, and how many of them saw a change
//! - Recheck duration
//! - Settings read failures
//! - Change signals, and watch points retired while re-arming
//! - Live watch points and registered observers
//! - Age of the current configuration
//!
//! # Examples
//!
//! ```rust,no_run
//! use proxywatch::prelude::*;
//! use opentelemetry::global;
//!
//! # async fn example() -> Result<()> {
//! let service = ProxyConfigService::builder()
//!     .with_metrics(global::meter("my-app"))
//!     .start()
//!     .await?;
//! # Ok(())
//! # }
//! ```

mod service_metrics;

pub use service_metrics::ServiceMetrics;
