//! Raw proxy settings sources and the parser that consumes them.

mod env;
mod parser;
mod proxy_source;
mod store;

pub use env::EnvProxySource;
pub use parser::{parse, parse_settings, read_proxy_config};
pub use proxy_source::{ProxySettingsSource, RawProxySettings};
pub use store::{SETTINGS_FILE_STEM, SettingsStore};
