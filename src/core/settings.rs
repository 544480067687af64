//! Tunables of the service itself.

use crate::error::{ProxyWatchError, Result};
use config::{Config, Environment};
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

/// Fallback poll interval used when nothing else is configured.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Prefix of the environment variables read by [`ServiceSettings::from_env`].
pub const ENV_PREFIX: &str = "PROXYWATCH";

/// Service tunables.
///
/// # Examples
///
/// ```rust,no_run
/// use proxywatch::core::ServiceSettings;
///
/// // PROXYWATCH_POLL_INTERVAL_SECS=30
/// let settings = ServiceSettings::from_env()?;
/// println!("polling every {:?}", settings.poll_interval());
/// # Ok::<(), proxywatch::error::ProxyWatchError>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ServiceSettings {
    /// Seconds between fallback polls.
    pub poll_interval_secs: u64,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            poll_interval_secs: DEFAULT_POLL_INTERVAL.as_secs(),
        }
    }
}

impl ServiceSettings {
    /// Load from `PROXYWATCH_*` process environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`ProxyWatchError::ParseError`] if a variable holds a value
    /// of the wrong type.
    pub fn from_env() -> Result<Self> {
        Self::load(Environment::with_prefix(ENV_PREFIX).try_parsing(true))
    }

    /// Load from an explicit variable map instead of the process environment.
    pub fn from_env_vars(vars: HashMap<String, String>) -> Result<Self> {
        Self::load(
            Environment::with_prefix(ENV_PREFIX)
                .try_parsing(true)
                .source(Some(vars)),
        )
    }

    fn load(env: Environment) -> Result<Self> {
        Config::builder()
            .add_source(env)
            .build()
            .and_then(|config| config.try_deserialize::<Self>())
            .map_err(|e| ProxyWatchError::ParseError(format!("Invalid service settings: {}", e)))
    }

    /// The fallback poll interval.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}
