//! Environment variable proxy settings source.

use super::{ProxySettingsSource, RawProxySettings};
use crate::error::Result;

type Lookup = Box<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Per-scheme variables, in the order they appear in the rules string.
const SCHEME_VARS: [(&str, &str); 3] = [
    ("http", "http_proxy"),
    ("https", "https_proxy"),
    ("ftp", "ftp_proxy"),
];

/// Proxy settings from the conventional `*_proxy` environment variables.
///
/// Reads `http_proxy`, `https_proxy`, `ftp_proxy`, `all_proxy` and
/// `no_proxy`, preferring the lowercase spelling. `all_proxy` becomes the
/// default proxy and the commas in `no_proxy` become bypass separators.
///
/// # Examples
///
/// ```rust
/// use proxywatch::sources::{EnvProxySource, ProxySettingsSource};
///
/// let source = EnvProxySource::with_lookup(|name| match name {
///     "https_proxy" => Some("http://proxy:3128".to_string()),
///     "no_proxy" => Some("localhost,.corp".to_string()),
///     _ => None,
/// });
/// let raw = source.read().unwrap();
/// assert_eq!(raw.proxy.as_deref(), Some("https=proxy:3128"));
/// assert_eq!(raw.proxy_bypass.as_deref(), Some("localhost;.corp"));
/// ```
pub struct EnvProxySource {
    lookup: Lookup,
}

impl EnvProxySource {
    /// Read from the process environment.
    pub fn new() -> Self {
        Self::with_lookup(|name| std::env::var(name).ok())
    }

    /// Read variables through `lookup` instead of the process environment.
    pub fn with_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String> + Send + Sync + 'static,
    {
        Self {
            lookup: Box::new(lookup),
        }
    }

    fn var(&self, name: &str) -> Option<String> {
        [name.to_ascii_lowercase(), name.to_ascii_uppercase()]
            .iter()
            .find_map(|key| (self.lookup)(key.as_str()))
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    }
}

impl Default for EnvProxySource {
    fn default() -> Self {
        Self::new()
    }
}

/// Drop `user:password@` from a proxy URL.
fn strip_userinfo(value: &str) -> String {
    let (scheme, rest) = match value.split_once("://") {
        Some((scheme, rest)) => (Some(scheme), rest),
        None => (None, value),
    };
    let rest = rest.rsplit_once('@').map_or(rest, |(_, host)| host);
    let rest = rest.trim_end_matches('/');
    match scheme {
        // The rules grammar treats a bare server as HTTP already.
        Some(scheme) if !scheme.eq_ignore_ascii_case("http") => format!("{}://{}", scheme, rest),
        _ => rest.to_string(),
    }
}

impl ProxySettingsSource for EnvProxySource {
    fn read(&self) -> Result<RawProxySettings> {
        let mut entries: Vec<String> = SCHEME_VARS
            .iter()
            .filter_map(|(scheme, var)| {
                self.var(var)
                    .map(|value| format!("{}={}", scheme, strip_userinfo(&value)))
            })
            .collect();
        if let Some(all) = self.var("all_proxy") {
            entries.push(strip_userinfo(&all));
        }

        let proxy = (!entries.is_empty()).then(|| entries.join(";"));
        let proxy_bypass = self.var("no_proxy").map(|list| list.replace(',', ";"));

        Ok(RawProxySettings {
            auto_detect: None,
            proxy,
            proxy_bypass,
            auto_config_url: None,
        })
    }

    fn name(&self) -> String {
        "env:*_proxy".to_string()
    }
}
