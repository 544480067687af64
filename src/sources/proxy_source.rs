//! Raw proxy settings and the trait for reading them.

use crate::error::Result;
use serde::Deserialize;

/// Proxy settings exactly as the platform store reports them.
///
/// Every field is optional; an absent field leaves the matching part of the
/// parsed [`ProxyConfig`](crate::proxy::ProxyConfig) at its default.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct RawProxySettings {
    /// Auto-detect (WPAD) flag.
    pub auto_detect: Option<bool>,
    /// Proxy rules string, e.g. `http=proxy:80;ftp=proxy:21`.
    pub proxy: Option<String>,
    /// Bypass list separated by `;` or whitespace.
    pub proxy_bypass: Option<String>,
    /// PAC script URL.
    pub auto_config_url: Option<String>,
}

/// Trait for raw proxy settings readers.
///
/// Implementations may block (filesystem, registry, system APIs); callers
/// run them on the blocking pool. Any native buffers backing a read are
/// released before `read` returns.
pub trait ProxySettingsSource: Send + Sync {
    /// Read the current raw settings.
    ///
    /// # Errors
    ///
    /// Returns an error if the settings could not be obtained at all.
    fn read(&self) -> Result<RawProxySettings>;

    /// Get a human-readable name for this source (for logging/debugging).
    fn name(&self) -> String;
}

impl<F> ProxySettingsSource for F
where
    F: Fn() -> Result<RawProxySettings> + Send + Sync,
{
    fn read(&self) -> Result<RawProxySettings> {
        self()
    }

    fn name(&self) -> String {
        "closure".to_string()
    }
}
