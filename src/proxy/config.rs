//! The parsed proxy configuration handed to observers.

use super::{ProxyRules, ProxyServer};
use serde::Serialize;
use std::fmt;
use url::Url;

/// Location of a proxy auto-config (PAC) script.
///
/// A PAC string that does not parse as a URL is kept as [`PacUrl::Invalid`]
/// so the rest of the configuration still applies.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PacUrl {
    /// A well-formed URL.
    Valid(Url),
    /// The raw string, which did not parse.
    Invalid(String),
}

impl PacUrl {
    /// Parse `raw`, falling back to [`PacUrl::Invalid`].
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        match Url::parse(raw) {
            Ok(url) => Self::Valid(url),
            Err(e) => {
                tracing::debug!(pac_url = raw, error = %e, "Keeping unparseable PAC URL");
                Self::Invalid(raw.to_string())
            }
        }
    }

    /// The URL, if it parsed.
    pub fn url(&self) -> Option<&Url> {
        match self {
            Self::Valid(url) => Some(url),
            Self::Invalid(_) => None,
        }
    }

    /// Whether the URL parsed.
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid(_))
    }

    /// The URL text.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Valid(url) => url.as_str(),
            Self::Invalid(raw) => raw,
        }
    }
}

impl fmt::Display for PacUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A complete proxy configuration snapshot.
///
/// Snapshots are produced fresh by every read and shared behind `Arc`, so
/// they are never modified after construction. Two snapshots compare equal
/// when every field matches; observers are only notified when the new
/// snapshot differs from the previous one.
///
/// The default value is the direct-connection configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProxyConfig {
    auto_detect: bool,
    proxy_rules: ProxyRules,
    pac_url: Option<PacUrl>,
}

impl ProxyConfig {
    /// Assemble a configuration.
    pub fn new(auto_detect: bool, proxy_rules: ProxyRules, pac_url: Option<PacUrl>) -> Self {
        Self {
            auto_detect,
            proxy_rules,
            pac_url,
        }
    }

    /// The "no proxy in use" configuration.
    pub fn direct() -> Self {
        Self::default()
    }

    /// Whether WPAD auto-detection is enabled.
    pub fn auto_detect(&self) -> bool {
        self.auto_detect
    }

    /// Manual proxy rules.
    pub fn proxy_rules(&self) -> &ProxyRules {
        &self.proxy_rules
    }

    /// PAC script location, if configured.
    pub fn pac_url(&self) -> Option<&PacUrl> {
        self.pac_url.as_ref()
    }

    /// Whether every request goes direct.
    pub fn is_direct(&self) -> bool {
        !self.auto_detect && self.pac_url.is_none() && self.proxy_rules.is_empty()
    }

    /// Server from the manual rules for `url`.
    ///
    /// Auto-detection and PAC scripts are not evaluated here.
    pub fn manual_proxy_for_url(&self, url: &Url) -> Option<&ProxyServer> {
        self.proxy_rules.proxy_for_url(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_direct_default() {
        let config = ProxyConfig::direct();
        assert!(config.is_direct());
        assert!(!config.auto_detect());
        assert!(config.pac_url().is_none());
        assert_eq!(config, ProxyConfig::default());
    }

    #[test]
    fn test_pac_url_parse() {
        let pac = PacUrl::parse("http://wpad/wpad.dat");
        assert!(pac.is_valid());
        assert_eq!(pac.as_str(), "http://wpad/wpad.dat");

        let pac = PacUrl::parse("not a url");
        assert!(!pac.is_valid());
        assert_eq!(pac.url(), None);
        assert_eq!(pac.to_string(), "not a url");
    }

    #[test]
    fn test_invalid_pac_url_ignores_surrounding_whitespace() {
        let pac = PacUrl::parse("  not a url\t");
        assert_eq!(pac, PacUrl::Invalid("not a url".to_string()));
        assert_eq!(pac, PacUrl::parse("not a url"));
        assert_eq!(PacUrl::parse(" http://wpad/wpad.dat "), PacUrl::parse("http://wpad/wpad.dat"));
    }

    #[test]
    fn test_equality_drives_change_detection() {
        let a = ProxyConfig::new(true, ProxyRules::from_rules_string("p:1"), None);
        let b = ProxyConfig::new(true, ProxyRules::from_rules_string("p:1"), None);
        let c = ProxyConfig::new(true, ProxyRules::from_rules_string("p:2"), None);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(!a.is_direct());
    }

    #[test]
    fn test_manual_proxy_for_url() {
        let config = ProxyConfig::new(false, ProxyRules::from_rules_string("p:3128"), None);
        let url = Url::parse("http://example.com/").unwrap();
        assert_eq!(config.manual_proxy_for_url(&url).unwrap().port(), 3128);
    }
}
