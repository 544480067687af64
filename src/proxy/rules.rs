//! Per-scheme proxy server rules.

use super::BypassRules;
use crate::error::{ProxyWatchError, Result};
use serde::{Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::net::Ipv6Addr;
use url::Url;

/// Scheme spoken to the proxy server itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ServerScheme {
    /// No proxy; connect directly.
    Direct,
    /// Plain HTTP proxy.
    Http,
    /// HTTP proxy reached over TLS.
    Https,
    /// SOCKS version 4.
    Socks4,
    /// SOCKS version 5.
    Socks5,
}

impl ServerScheme {
    /// Parse a `scheme://` prefix. `socks` means SOCKS5.
    pub fn from_prefix(prefix: &str) -> Option<Self> {
        match prefix.trim().to_ascii_lowercase().as_str() {
            "direct" => Some(Self::Direct),
            "http" => Some(Self::Http),
            "https" => Some(Self::Https),
            "socks4" => Some(Self::Socks4),
            "socks5" | "socks" => Some(Self::Socks5),
            _ => None,
        }
    }

    /// Port used when the server string has none.
    pub fn default_port(self) -> u16 {
        match self {
            Self::Direct => 0,
            Self::Http => 80,
            Self::Https => 443,
            Self::Socks4 | Self::Socks5 => 1080,
        }
    }

    /// Canonical lowercase name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Direct => "direct",
            Self::Http => "http",
            Self::Https => "https",
            Self::Socks4 => "socks4",
            Self::Socks5 => "socks5",
        }
    }
}

/// URL schemes that can carry a dedicated proxy entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UrlScheme {
    /// `http://` destinations.
    Http,
    /// `https://` destinations.
    Https,
    /// `ftp://` destinations.
    Ftp,
}

impl UrlScheme {
    /// Parse a URL scheme name, ignoring ASCII case.
    pub fn parse(scheme: &str) -> Option<Self> {
        match scheme.trim().to_ascii_lowercase().as_str() {
            "http" => Some(Self::Http),
            "https" => Some(Self::Https),
            "ftp" => Some(Self::Ftp),
            _ => None,
        }
    }

    /// Canonical lowercase name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Http => "http",
            Self::Https => "https",
            Self::Ftp => "ftp",
        }
    }
}

/// A single proxy server: scheme, host and port.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProxyServer {
    scheme: ServerScheme,
    host: String,
    port: u16,
}

impl ProxyServer {
    /// Create a server. The host is stored lowercased.
    pub fn new(scheme: ServerScheme, host: impl Into<String>, port: u16) -> Self {
        Self {
            scheme,
            host: host.into().to_ascii_lowercase(),
            port,
        }
    }

    /// The "connect directly" pseudo-server.
    pub fn direct() -> Self {
        Self {
            scheme: ServerScheme::Direct,
            host: String::new(),
            port: 0,
        }
    }

    /// Parse `[scheme://]host[:port]`.
    ///
    /// `default_scheme` applies when no `scheme://` prefix is present, and the
    /// scheme's default port applies when no port is present.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use proxywatch::proxy::{ProxyServer, ServerScheme};
    ///
    /// let server = ProxyServer::from_uri("socks5://proxy:1081", ServerScheme::Http).unwrap();
    /// assert_eq!(server.scheme(), ServerScheme::Socks5);
    /// assert_eq!(server.port(), 1081);
    ///
    /// let server = ProxyServer::from_uri("1.2.3.4", ServerScheme::Http).unwrap();
    /// assert_eq!(server.to_string(), "1.2.3.4:80");
    /// ```
    pub fn from_uri(uri: &str, default_scheme: ServerScheme) -> Result<Self> {
        let uri = uri.trim();
        if uri.is_empty() {
            return Err(ProxyWatchError::ParseError("empty proxy server".to_string()));
        }

        let (scheme, rest) = match uri.split_once("://") {
            Some((prefix, rest)) => {
                let scheme = ServerScheme::from_prefix(prefix).ok_or_else(|| {
                    ProxyWatchError::ParseError(format!("unknown proxy scheme '{}'", prefix))
                })?;
                (scheme, rest)
            }
            None => (default_scheme, uri),
        };

        if scheme == ServerScheme::Direct {
            return Ok(Self::direct());
        }

        let (host, port) = split_host_port(rest.trim_end_matches('/'))?;
        if host.is_empty() {
            return Err(ProxyWatchError::ParseError(format!(
                "missing host in proxy server '{}'",
                uri
            )));
        }

        Ok(Self::new(scheme, host, port.unwrap_or(scheme.default_port())))
    }

    /// Scheme used to talk to the proxy.
    pub fn scheme(&self) -> ServerScheme {
        self.scheme
    }

    /// Host name or IP literal (IPv6 without brackets).
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Port number.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Whether this is the direct pseudo-server.
    pub fn is_direct(&self) -> bool {
        self.scheme == ServerScheme::Direct
    }

    /// `host:port`, bracketing IPv6 literals.
    pub fn host_and_port(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

impl fmt::Display for ProxyServer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.scheme {
            ServerScheme::Direct => write!(f, "direct://"),
            ServerScheme::Http => write!(f, "{}", self.host_and_port()),
            scheme => write!(f, "{}://{}", scheme.as_str(), self.host_and_port()),
        }
    }
}

impl Serialize for ProxyServer {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Split `host[:port]`, accepting bracketed or bare IPv6 literals.
pub(crate) fn split_host_port(input: &str) -> Result<(String, Option<u16>)> {
    let parse_port = |port: &str| {
        port.parse::<u16>()
            .map_err(|_| ProxyWatchError::ParseError(format!("invalid port '{}'", port)))
    };

    if let Some(stripped) = input.strip_prefix('[') {
        let (host, after) = stripped.split_once(']').ok_or_else(|| {
            ProxyWatchError::ParseError(format!("unterminated IPv6 literal '{}'", input))
        })?;
        host.parse::<Ipv6Addr>()
            .map_err(|_| ProxyWatchError::ParseError(format!("invalid IPv6 literal '{}'", host)))?;
        let port = match after {
            "" => None,
            _ => {
                let port = after.strip_prefix(':').ok_or_else(|| {
                    ProxyWatchError::ParseError(format!("unexpected text after '{}'", host))
                })?;
                Some(parse_port(port)?)
            }
        };
        return Ok((host.to_string(), port));
    }

    if input.parse::<Ipv6Addr>().is_ok() {
        return Ok((input.to_string(), None));
    }

    if input.contains(|c: char| c.is_whitespace() || c == '/') {
        return Err(ProxyWatchError::ParseError(format!(
            "invalid host '{}'",
            input
        )));
    }

    match input.rsplit_once(':') {
        Some((host, port)) => Ok((host.to_string(), Some(parse_port(port)?))),
        None => Ok((input.to_string(), None)),
    }
}

/// Proxy server assignments plus the bypass list.
///
/// Built from the multi-scheme rules grammar:
///
/// ```text
/// http=proxy:80;https=secure:443;ftp=ftp-proxy:21;socks=socks-host:1080;fallback:8080
/// ```
///
/// Entries are `;`-separated. `scheme=server` sets a dedicated proxy for one
/// URL scheme, `socks=server` sets a SOCKS proxy for schemes with no entry,
/// and a bare `server` is the default for every scheme without an entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProxyRules {
    proxies_for_scheme: BTreeMap<UrlScheme, ProxyServer>,
    default_proxy: Option<ProxyServer>,
    fallback_proxy: Option<ProxyServer>,
    /// Destinations that are never proxied.
    pub bypass_rules: BypassRules,
}

impl ProxyRules {
    /// Create empty rules (direct for everything).
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a rules string into fresh rules with an empty bypass list.
    pub fn from_rules_string(rules: &str) -> Self {
        let mut parsed = Self::new();
        parsed.set_from_rules_string(rules);
        parsed
    }

    /// Replace the server assignments with those parsed from `rules`.
    ///
    /// The bypass list is left untouched. Malformed entries are skipped
    /// individually.
    pub fn set_from_rules_string(&mut self, rules: &str) {
        self.proxies_for_scheme.clear();
        self.default_proxy = None;
        self.fallback_proxy = None;

        for entry in rules.split(';').map(str::trim).filter(|e| !e.is_empty()) {
            match entry.split_once('=') {
                None => match ProxyServer::from_uri(entry, ServerScheme::Http) {
                    Ok(server) => self.default_proxy = Some(server),
                    Err(e) => tracing::debug!(entry, error = %e, "Skipping proxy entry"),
                },
                Some((scheme, server)) if scheme.trim().eq_ignore_ascii_case("socks") => {
                    match ProxyServer::from_uri(server, ServerScheme::Socks4) {
                        Ok(server) => self.fallback_proxy = Some(server),
                        Err(e) => tracing::debug!(entry, error = %e, "Skipping proxy entry"),
                    }
                }
                Some((scheme, server)) => {
                    let Some(scheme) = UrlScheme::parse(scheme) else {
                        tracing::debug!(entry, "Skipping proxy entry with unknown scheme");
                        continue;
                    };
                    match ProxyServer::from_uri(server, ServerScheme::Http) {
                        Ok(server) => {
                            self.proxies_for_scheme.insert(scheme, server);
                        }
                        Err(e) => tracing::debug!(entry, error = %e, "Skipping proxy entry"),
                    }
                }
            }
        }
    }

    /// Serialize the server assignments back to the rules grammar.
    pub fn to_rules_string(&self) -> String {
        let mut entries: Vec<String> = self
            .proxies_for_scheme
            .iter()
            .map(|(scheme, server)| format!("{}={}", scheme.as_str(), server))
            .collect();
        if let Some(fallback) = &self.fallback_proxy {
            entries.push(format!("socks={}", fallback));
        }
        if let Some(default) = &self.default_proxy {
            entries.push(default.to_string());
        }
        entries.join(";")
    }

    /// Proxy dedicated to `scheme`, if any.
    pub fn proxy_for_scheme(&self, scheme: UrlScheme) -> Option<&ProxyServer> {
        self.proxies_for_scheme.get(&scheme)
    }

    /// All dedicated per-scheme assignments, in scheme order.
    pub fn proxies_for_scheme(&self) -> &BTreeMap<UrlScheme, ProxyServer> {
        &self.proxies_for_scheme
    }

    /// Default proxy for schemes without a dedicated entry.
    pub fn default_proxy(&self) -> Option<&ProxyServer> {
        self.default_proxy.as_ref()
    }

    /// SOCKS proxy for schemes with neither a dedicated nor a default entry.
    pub fn fallback_proxy(&self) -> Option<&ProxyServer> {
        self.fallback_proxy.as_ref()
    }

    /// Whether no server is assigned and nothing is bypassed.
    pub fn is_empty(&self) -> bool {
        self.proxies_for_scheme.is_empty()
            && self.default_proxy.is_none()
            && self.fallback_proxy.is_none()
            && self.bypass_rules.is_empty()
    }

    /// Server to use for `url`, or `None` for a direct connection.
    pub fn proxy_for_url(&self, url: &Url) -> Option<&ProxyServer> {
        if self.bypass_rules.matches(url) {
            return None;
        }
        UrlScheme::parse(url.scheme())
            .and_then(|scheme| self.proxies_for_scheme.get(&scheme))
            .or(self.default_proxy.as_ref())
            .or(self.fallback_proxy.as_ref())
            .filter(|server| !server.is_direct())
    }
}

impl fmt::Display for ProxyRules {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_rules_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_defaults() {
        let server = ProxyServer::from_uri("proxy.example.com", ServerScheme::Http).unwrap();
        assert_eq!(server.scheme(), ServerScheme::Http);
        assert_eq!(server.host(), "proxy.example.com");
        assert_eq!(server.port(), 80);

        let server = ProxyServer::from_uri("https://Secure.Example.com", ServerScheme::Http).unwrap();
        assert_eq!(server.scheme(), ServerScheme::Https);
        assert_eq!(server.host(), "secure.example.com");
        assert_eq!(server.port(), 443);
        assert_eq!(server.to_string(), "https://secure.example.com:443");
    }

    #[test]
    fn test_server_ipv6() {
        let server = ProxyServer::from_uri("[::1]:3128", ServerScheme::Http).unwrap();
        assert_eq!(server.host(), "::1");
        assert_eq!(server.port(), 3128);
        assert_eq!(server.to_string(), "[::1]:3128");
    }

    #[test]
    fn test_server_errors() {
        assert!(ProxyServer::from_uri("", ServerScheme::Http).is_err());
        assert!(ProxyServer::from_uri("gopher://host", ServerScheme::Http).is_err());
        assert!(ProxyServer::from_uri("host:notaport", ServerScheme::Http).is_err());
        assert!(ProxyServer::from_uri("host:99999", ServerScheme::Http).is_err());
        assert!(ProxyServer::from_uri(":8080", ServerScheme::Http).is_err());
        assert!(ProxyServer::from_uri("[::1", ServerScheme::Http).is_err());
    }

    #[test]
    fn test_direct_server() {
        let server = ProxyServer::from_uri("direct://", ServerScheme::Http).unwrap();
        assert!(server.is_direct());
        assert_eq!(server.to_string(), "direct://");
    }

    #[test]
    fn test_single_proxy() {
        let rules = ProxyRules::from_rules_string("proxy:8080");
        assert!(rules.proxies_for_scheme().is_empty());
        assert_eq!(rules.default_proxy().unwrap().to_string(), "proxy:8080");
    }

    #[test]
    fn test_per_scheme() {
        let rules = ProxyRules::from_rules_string("http=1.2.3.4:80;ftp=1.2.3.4:21");
        assert_eq!(
            rules.proxy_for_scheme(UrlScheme::Http).unwrap().to_string(),
            "1.2.3.4:80"
        );
        assert_eq!(
            rules.proxy_for_scheme(UrlScheme::Ftp).unwrap().to_string(),
            "1.2.3.4:21"
        );
        assert!(rules.proxy_for_scheme(UrlScheme::Https).is_none());
        assert!(rules.default_proxy().is_none());
    }

    #[test]
    fn test_bare_entry_is_default() {
        let rules = ProxyRules::from_rules_string("HTTPS=secure:443; other:3128");
        assert_eq!(
            rules.proxy_for_scheme(UrlScheme::Https).unwrap().host(),
            "secure"
        );
        assert_eq!(rules.default_proxy().unwrap().host(), "other");
    }

    #[test]
    fn test_socks_fallback() {
        let rules = ProxyRules::from_rules_string("http=web:80;socks=sock:1080");
        let fallback = rules.fallback_proxy().unwrap();
        assert_eq!(fallback.scheme(), ServerScheme::Socks4);
        assert_eq!(rules.to_rules_string(), "http=web:80;socks=socks4://sock:1080");
    }

    #[test]
    fn test_malformed_entries_skipped() {
        let rules = ProxyRules::from_rules_string("gopher=g:70;http=;ftp=f:bad;https=ok:443;;");
        assert_eq!(rules.proxies_for_scheme().len(), 1);
        assert_eq!(
            rules.proxy_for_scheme(UrlScheme::Https).unwrap().host(),
            "ok"
        );
    }

    #[test]
    fn test_reparse_resets_servers_keeps_bypass() {
        let mut rules = ProxyRules::from_rules_string("http=a:1");
        rules.bypass_rules.add_rule_from_string("*.local");
        rules.set_from_rules_string("b:2");
        assert!(rules.proxy_for_scheme(UrlScheme::Http).is_none());
        assert_eq!(rules.default_proxy().unwrap().host(), "b");
        assert_eq!(rules.bypass_rules.len(), 1);
    }

    #[test]
    fn test_proxy_for_url() {
        let mut rules = ProxyRules::from_rules_string("http=web:80;fallback:3128");
        rules.bypass_rules.add_rule_from_string("*.internal");

        let url = Url::parse("http://example.com/").unwrap();
        assert_eq!(rules.proxy_for_url(&url).unwrap().host(), "web");

        let url = Url::parse("https://example.com/").unwrap();
        assert_eq!(rules.proxy_for_url(&url).unwrap().host(), "fallback");

        let url = Url::parse("http://build.internal/").unwrap();
        assert!(rules.proxy_for_url(&url).is_none());
    }

    #[test]
    fn test_empty_rules() {
        let rules = ProxyRules::from_rules_string("");
        assert!(rules.is_empty());
        assert_eq!(rules.to_rules_string(), "");
        let url = Url::parse("http://example.com/").unwrap();
        assert!(rules.proxy_for_url(&url).is_none());
    }
}
