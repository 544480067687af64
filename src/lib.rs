//! # proxywatch
//!
//! System proxy configuration with change notifications and fallback polling.
//!
//! ## Overview
//!
//! `proxywatch` keeps an up-to-date [`ProxyConfig`](proxy::ProxyConfig) for a
//! process and tells observers whenever it changes:
//! - Tiered settings store (machine, user, machine policy) read through `config`
//! - Per-location change watches that re-arm after every change
//! - Time-based fallback polling that bounds staleness when watches fail
//! - Lock-free reads of the current configuration using `arc-swap`
//! - Observers notified only when the parsed configuration differs
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use proxywatch::prelude::*;
//! use url::Url;
//!
//! # async fn example() -> proxywatch::error::Result<()> {
//! let service = ProxyConfigService::builder().start().await?;
//!
//! // Zero-cost snapshot
//! let config = service.current();
//! let target = Url::parse("http://example.com/").expect("valid url");
//! match config.manual_proxy_for_url(&target) {
//!     Some(proxy) => println!("via {}", proxy),
//!     None => println!("direct"),
//! }
//!
//! // Hear about changes; the first observer starts the watches
//! let _handle = service
//!     .add_observer(|config| println!("proxy changed: {}", config.proxy_rules()))
//!     .await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Feature Flags
//!
//! - `fs-watch` (default): watch the settings directories with `notify`.
//!   Without it the service polls only.
//! - `metrics`: OpenTelemetry instruments for rechecks, signals and watches.

#![warn(missing_docs, rust_2024_compatibility)]
#![deny(unsafe_code)]

pub mod core;
pub mod error;
pub mod notify;
pub mod proxy;
pub mod sources;

#[cfg(feature = "metrics")]
pub mod metrics;

/// Convenient re-exports for common usage patterns.
pub mod prelude {
    pub use crate::core::{ObserverHandle, ProxyConfigService, ProxyConfigServiceBuilder, ServiceSettings};
    pub use crate::error::{ProxyWatchError, Result};
    pub use crate::proxy::{BypassRules, PacUrl, ProxyConfig, ProxyRules, ProxyServer};
}
