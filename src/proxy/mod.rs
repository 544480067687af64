//! Structured proxy configuration model.

mod bypass;
mod config;
mod rules;

pub use bypass::{BYPASS_SEPARATORS, BypassRule, BypassRules};
pub use config::{PacUrl, ProxyConfig};
pub use rules::{ProxyRules, ProxyServer, ServerScheme, UrlScheme};
