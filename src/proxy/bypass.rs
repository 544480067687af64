//! Bypass rules: destinations that are never sent through a proxy.

use super::rules::split_host_port;
use crate::error::{ProxyWatchError, Result};
use serde::{Serialize, Serializer};
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use url::{Host, Url};

/// Characters separating tokens in a bypass list.
pub const BYPASS_SEPARATORS: &[char] = &[';', ' ', '\t', '\n', '\r'];

/// One bypass pattern.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum BypassRule {
    /// `<local>`: plain host names without a dot, plus loopback.
    Local,
    /// Host name pattern with optional `*` wildcards.
    Hostname {
        /// Restrict to this URL scheme.
        scheme: Option<String>,
        /// Lowercased pattern, e.g. `*.example.com`.
        pattern: String,
        /// Restrict to this port.
        port: Option<u16>,
    },
    /// CIDR block such as `10.0.0.0/8`.
    IpBlock {
        /// Restrict to this URL scheme.
        scheme: Option<String>,
        /// Network address with host bits cleared.
        network: IpAddr,
        /// Prefix length in bits.
        prefix_len: u8,
    },
}

impl BypassRule {
    /// Parse a single bypass token.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use proxywatch::proxy::BypassRule;
    ///
    /// let rule = BypassRule::parse(".example.com").unwrap();
    /// assert_eq!(rule.to_string(), "*.example.com");
    ///
    /// let rule = BypassRule::parse("192.168.1.7/16").unwrap();
    /// assert_eq!(rule.to_string(), "192.168.0.0/16");
    /// ```
    pub fn parse(token: &str) -> Result<Self> {
        let token = token.trim();
        if token.is_empty() {
            return Err(ProxyWatchError::ParseError("empty bypass rule".to_string()));
        }
        if token.eq_ignore_ascii_case("<local>") {
            return Ok(Self::Local);
        }

        let (scheme, rest) = match token.split_once("://") {
            Some((scheme, rest)) => {
                if scheme.is_empty() {
                    return Err(ProxyWatchError::ParseError(format!(
                        "missing scheme in bypass rule '{}'",
                        token
                    )));
                }
                (Some(scheme.to_ascii_lowercase()), rest)
            }
            None => (None, token),
        };

        if let Some((addr, prefix)) = rest.split_once('/') {
            return Self::parse_ip_block(scheme, addr, prefix);
        }

        let (host, port) = split_host_port(rest)?;
        if host.is_empty() {
            return Err(ProxyWatchError::ParseError(format!(
                "missing host in bypass rule '{}'",
                token
            )));
        }

        let mut pattern = host.to_ascii_lowercase();
        if pattern.starts_with('.') {
            pattern.insert(0, '*');
        }

        Ok(Self::Hostname {
            scheme,
            pattern,
            port,
        })
    }

    fn parse_ip_block(scheme: Option<String>, addr: &str, prefix: &str) -> Result<Self> {
        let addr = addr.trim_start_matches('[').trim_end_matches(']');
        let ip: IpAddr = addr
            .parse()
            .map_err(|_| ProxyWatchError::ParseError(format!("invalid IP address '{}'", addr)))?;
        let prefix_len: u8 = prefix
            .parse()
            .map_err(|_| ProxyWatchError::ParseError(format!("invalid prefix '{}'", prefix)))?;

        let max = if ip.is_ipv4() { 32 } else { 128 };
        if prefix_len > max {
            return Err(ProxyWatchError::ParseError(format!(
                "prefix /{} too long for {}",
                prefix_len, ip
            )));
        }

        Ok(Self::IpBlock {
            scheme,
            network: mask(ip, prefix_len),
            prefix_len,
        })
    }

    /// Whether `url` is covered by this rule.
    pub fn matches(&self, url: &Url) -> bool {
        let Some(host) = url.host() else {
            return false;
        };

        match self {
            Self::Local => match host {
                Host::Domain(name) => !name.contains('.') || name == "localhost",
                Host::Ipv4(ip) => ip.is_loopback(),
                Host::Ipv6(ip) => ip.is_loopback(),
            },
            Self::Hostname {
                scheme,
                pattern,
                port,
            } => {
                if !scheme_matches(scheme.as_deref(), url) {
                    return false;
                }
                if port.is_some() && *port != url.port_or_known_default() {
                    return false;
                }
                let host = match host {
                    Host::Domain(name) => name.to_ascii_lowercase(),
                    Host::Ipv4(ip) => ip.to_string(),
                    Host::Ipv6(ip) => ip.to_string(),
                };
                wildcard_match(pattern, &host)
            }
            Self::IpBlock {
                scheme,
                network,
                prefix_len,
            } => {
                if !scheme_matches(scheme.as_deref(), url) {
                    return false;
                }
                let ip = match host {
                    Host::Ipv4(ip) => IpAddr::V4(ip),
                    Host::Ipv6(ip) => IpAddr::V6(ip),
                    Host::Domain(_) => return false,
                };
                ip.is_ipv4() == network.is_ipv4() && mask(ip, *prefix_len) == *network
            }
        }
    }
}

impl fmt::Display for BypassRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local => write!(f, "<local>"),
            Self::Hostname {
                scheme,
                pattern,
                port,
            } => {
                if let Some(scheme) = scheme {
                    write!(f, "{}://", scheme)?;
                }
                if pattern.contains(':') {
                    write!(f, "[{}]", pattern)?;
                } else {
                    write!(f, "{}", pattern)?;
                }
                if let Some(port) = port {
                    write!(f, ":{}", port)?;
                }
                Ok(())
            }
            Self::IpBlock {
                scheme,
                network,
                prefix_len,
            } => {
                if let Some(scheme) = scheme {
                    write!(f, "{}://", scheme)?;
                }
                write!(f, "{}/{}", network, prefix_len)
            }
        }
    }
}

impl Serialize for BypassRule {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

fn scheme_matches(scheme: Option<&str>, url: &Url) -> bool {
    scheme.is_none_or(|scheme| scheme == url.scheme())
}

fn mask(ip: IpAddr, prefix_len: u8) -> IpAddr {
    match ip {
        IpAddr::V4(v4) => {
            let bits = u32::from(v4);
            let masked = match prefix_len {
                0 => 0,
                len => bits & (u32::MAX << (32 - u32::from(len))),
            };
            IpAddr::V4(Ipv4Addr::from(masked))
        }
        IpAddr::V6(v6) => {
            let bits = u128::from(v6);
            let masked = match prefix_len {
                0 => 0,
                len => bits & (u128::MAX << (128 - u32::from(len))),
            };
            IpAddr::V6(Ipv6Addr::from(masked))
        }
    }
}

/// Glob match where `*` matches any run of characters.
fn wildcard_match(pattern: &str, text: &str) -> bool {
    let pattern = pattern.as_bytes();
    let text = text.as_bytes();
    let (mut p, mut t) = (0, 0);
    let mut star: Option<(usize, usize)> = None;

    while t < text.len() {
        if p < pattern.len() && pattern[p] == b'*' {
            star = Some((p, t));
            p += 1;
        } else if p < pattern.len() && pattern[p] == text[t] {
            p += 1;
            t += 1;
        } else if let Some((star_p, star_t)) = star {
            p = star_p + 1;
            t = star_t + 1;
            star = Some((star_p, star_t + 1));
        } else {
            return false;
        }
    }

    pattern[p..].iter().all(|&c| c == b'*')
}

/// Ordered, duplicate-free list of bypass rules.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct BypassRules {
    rules: Vec<BypassRule>,
}

impl BypassRules {
    /// Create an empty list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from a separator-delimited bypass string.
    pub fn from_list(list: &str) -> Self {
        let mut rules = Self::new();
        rules.extend_from_list(list);
        rules
    }

    /// Add `rule` unless an equal rule is already present.
    ///
    /// Returns `true` if the rule was added.
    pub fn add_rule(&mut self, rule: BypassRule) -> bool {
        if self.rules.contains(&rule) {
            return false;
        }
        self.rules.push(rule);
        true
    }

    /// Parse and add one token. Unparseable tokens are skipped.
    ///
    /// Returns `true` if a new rule was added.
    pub fn add_rule_from_string(&mut self, token: &str) -> bool {
        match BypassRule::parse(token) {
            Ok(rule) => self.add_rule(rule),
            Err(e) => {
                tracing::debug!(token, error = %e, "Skipping bypass rule");
                false
            }
        }
    }

    /// Tokenize `list` on [`BYPASS_SEPARATORS`] and add every rule.
    ///
    /// Returns the number of rules added.
    pub fn extend_from_list(&mut self, list: &str) -> usize {
        list.split(BYPASS_SEPARATORS)
            .filter(|token| !token.is_empty())
            .filter(|token| self.add_rule_from_string(token))
            .count()
    }

    /// Whether any rule covers `url`.
    pub fn matches(&self, url: &Url) -> bool {
        self.rules.iter().any(|rule| rule.matches(url))
    }

    /// The rules in insertion order.
    pub fn rules(&self) -> &[BypassRule] {
        &self.rules
    }

    /// Iterate over the rules.
    pub fn iter(&self) -> std::slice::Iter<'_, BypassRule> {
        self.rules.iter()
    }

    /// Number of rules.
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Whether the list is empty.
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl<'a> IntoIterator for &'a BypassRules {
    type Item = &'a BypassRule;
    type IntoIter = std::slice::Iter<'a, BypassRule>;

    fn into_iter(self) -> Self::IntoIter {
        self.rules.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    fn strings(rules: &BypassRules) -> Vec<String> {
        rules.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn test_parse_hostname_forms() {
        assert_eq!(BypassRule::parse("*.Local").unwrap().to_string(), "*.local");
        assert_eq!(
            BypassRule::parse("https://*.corp:8443").unwrap().to_string(),
            "https://*.corp:8443"
        );
        assert_eq!(BypassRule::parse("[::1]:80").unwrap().to_string(), "[::1]:80");
        assert_eq!(BypassRule::parse("<LOCAL>").unwrap(), BypassRule::Local);
    }

    #[test]
    fn test_parse_ip_blocks() {
        assert_eq!(BypassRule::parse("10.0.0.0/8").unwrap().to_string(), "10.0.0.0/8");
        assert_eq!(BypassRule::parse("fe80::1/10").unwrap().to_string(), "fe80::/10");
        assert!(BypassRule::parse("10.0.0.0/33").is_err());
        assert!(BypassRule::parse("10.0.0/8").is_err());
        assert!(BypassRule::parse("10.0.0.0/x").is_err());
    }

    #[test]
    fn test_parse_errors() {
        assert!(BypassRule::parse("").is_err());
        assert!(BypassRule::parse("://host").is_err());
        assert!(BypassRule::parse("host:port").is_err());
        assert!(BypassRule::parse("http://").is_err());
    }

    #[test]
    fn test_list_tokenizing() {
        let rules = BypassRules::from_list("*.local; 10.0.0.0/8");
        assert_eq!(strings(&rules), vec!["*.local", "10.0.0.0/8"]);

        let rules = BypassRules::from_list(";;\t*.local\r\n\n 10.0.0.0/8;  ;");
        assert_eq!(strings(&rules), vec!["*.local", "10.0.0.0/8"]);
    }

    #[test]
    fn test_list_skips_bad_tokens_and_duplicates() {
        let mut rules = BypassRules::new();
        let added = rules.extend_from_list("a.com bad:port a.com 10.0.0.0/99 b.com");
        assert_eq!(added, 2);
        assert_eq!(strings(&rules), vec!["a.com", "b.com"]);
    }

    #[test]
    fn test_hostname_matching() {
        let rule = BypassRule::parse("*.example.com").unwrap();
        assert!(rule.matches(&url("http://www.example.com/")));
        assert!(rule.matches(&url("https://a.b.EXAMPLE.com/")));
        assert!(!rule.matches(&url("http://example.com/")));
        assert!(!rule.matches(&url("http://example.org/")));

        let rule = BypassRule::parse("http://intranet:8080").unwrap();
        assert!(rule.matches(&url("http://intranet:8080/")));
        assert!(!rule.matches(&url("http://intranet/")));
        assert!(!rule.matches(&url("https://intranet:8080/")));
    }

    #[test]
    fn test_ip_block_matching() {
        let rule = BypassRule::parse("10.0.0.0/8").unwrap();
        assert!(rule.matches(&url("http://10.1.2.3/")));
        assert!(!rule.matches(&url("http://11.1.2.3/")));
        assert!(!rule.matches(&url("http://[::1]/")));
        assert!(!rule.matches(&url("http://ten.example/")));

        let rule = BypassRule::parse("::/0").unwrap();
        assert!(rule.matches(&url("http://[2001:db8::1]/")));
        assert!(!rule.matches(&url("http://1.2.3.4/")));
    }

    #[test]
    fn test_local_matching() {
        let rule = BypassRule::Local;
        assert!(rule.matches(&url("http://printer/")));
        assert!(rule.matches(&url("http://localhost:3000/")));
        assert!(rule.matches(&url("http://127.0.0.1/")));
        assert!(rule.matches(&url("http://[::1]/")));
        assert!(!rule.matches(&url("http://example.com/")));
        assert!(!rule.matches(&url("http://10.0.0.1/")));
    }

    #[test]
    fn test_wildcard_match() {
        assert!(wildcard_match("*", "anything"));
        assert!(wildcard_match("a*c", "abbbc"));
        assert!(wildcard_match("*.x.*", "a.x.b"));
        assert!(!wildcard_match("a*c", "abd"));
        assert!(wildcard_match("exact", "exact"));
        assert!(!wildcard_match("exact", "exactly"));
    }
}
