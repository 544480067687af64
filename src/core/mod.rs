//! Service core: polling, settings and the dispatch loop.

pub(crate) mod blocking;
mod builder;
mod poller;
mod service;
mod settings;

pub use builder::ProxyConfigServiceBuilder;
pub use poller::{PollingConfigService, Reader};
pub use service::{ObserverHandle, ProxyConfigService, RecheckTrigger};
pub use settings::{DEFAULT_POLL_INTERVAL, ENV_PREFIX, ServiceSettings};
