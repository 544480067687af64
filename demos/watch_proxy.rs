//! Print the system proxy configuration every time it changes.
//!
//! ```text
//! RUST_LOG=proxywatch=debug cargo run --example watch_proxy
//! ```
//!
//! `PROXYWATCH_POLL_INTERVAL_SECS` sets the fallback poll interval.

use proxywatch::prelude::*;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("proxywatch=info")),
        )
        .init();

    let settings = ServiceSettings::from_env()?;
    let service = ProxyConfigService::builder()
        .with_settings(settings)
        .start()
        .await?;

    print_config("current", &service.current());

    let _handle = service
        .add_observer(|config| print_config("changed", config))
        .await?;

    for location in service.watched_locations().await? {
        tracing::info!(%location, "Watching");
    }

    tokio::signal::ctrl_c().await?;
    service.shutdown().await
}

fn print_config(label: &str, config: &ProxyConfig) {
    match serde_json::to_string_pretty(config) {
        Ok(json) => println!("{}: {}", label, json),
        Err(e) => tracing::error!(error = %e, "Failed to serialize configuration"),
    }
}
