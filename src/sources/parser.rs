//! Turns raw store settings into a [`ProxyConfig`].

use super::{ProxySettingsSource, RawProxySettings};
use crate::error::Result;
use crate::proxy::{PacUrl, ProxyConfig, ProxyRules};

/// Parse the outcome of a raw settings read.
///
/// A failed read yields the direct-connection configuration; the failure is
/// only logged. Observers never see an error.
pub fn parse(raw: Result<RawProxySettings>) -> ProxyConfig {
    match raw {
        Ok(raw) => parse_settings(&raw),
        Err(e) => {
            tracing::error!(error = %e, "Proxy settings read failed, using direct connection");
            ProxyConfig::direct()
        }
    }
}

/// Parse settings that were read successfully.
///
/// Malformed proxy entries and bypass tokens are skipped one by one; the
/// rest of the configuration still applies.
///
/// # Examples
///
/// ```rust
/// use proxywatch::sources::{RawProxySettings, parse_settings};
///
/// let raw = RawProxySettings {
///     auto_detect: Some(true),
///     proxy: Some("http=1.2.3.4:80;ftp=1.2.3.4:21".to_string()),
///     proxy_bypass: Some("*.local; 10.0.0.0/8".to_string()),
///     auto_config_url: None,
/// };
/// let config = parse_settings(&raw);
/// assert!(config.auto_detect());
/// assert_eq!(config.proxy_rules().bypass_rules.len(), 2);
/// assert!(config.pac_url().is_none());
/// ```
pub fn parse_settings(raw: &RawProxySettings) -> ProxyConfig {
    let mut rules = ProxyRules::new();
    if let Some(proxy) = &raw.proxy {
        rules.set_from_rules_string(proxy);
    }
    if let Some(bypass) = &raw.proxy_bypass {
        rules.bypass_rules.extend_from_list(bypass);
    }

    let pac_url = raw
        .auto_config_url
        .as_deref()
        .filter(|url| !url.trim().is_empty())
        .map(PacUrl::parse);

    ProxyConfig::new(raw.auto_detect.unwrap_or(false), rules, pac_url)
}

/// Read `source` and parse the result.
pub fn read_proxy_config(source: &dyn ProxySettingsSource) -> ProxyConfig {
    parse(source.read())
}
