//! Tiered settings store backed by files in the watched directories.

use super::{ProxySettingsSource, RawProxySettings};
use crate::error::{ProxyWatchError, Result};
use crate::notify::{Tier, WATCH_LOCATIONS, WatchRoots};
use config::File;
use serde::Deserialize;
use std::path::PathBuf;

/// Base name of the settings file inside each location directory.
///
/// Any extension the `config` crate understands is accepted
/// (`settings.toml`, `settings.json`, `settings.yaml`).
pub const SETTINGS_FILE_STEM: &str = "settings";

/// Keys of one settings file.
#[derive(Debug, Default, Deserialize)]
struct StoreEntries {
    auto_detect: Option<bool>,
    proxy_enable: Option<bool>,
    proxy_server: Option<String>,
    proxy_override: Option<String>,
    auto_config_url: Option<String>,
}

impl From<StoreEntries> for RawProxySettings {
    fn from(entries: StoreEntries) -> Self {
        // A disabled manual proxy is not reported at all.
        let proxy = match entries.proxy_enable {
            Some(false) => None,
            _ => entries.proxy_server,
        };
        Self {
            auto_detect: entries.auto_detect,
            proxy,
            proxy_bypass: entries.proxy_override,
            auto_config_url: entries.auto_config_url,
        }
    }
}

/// Reads proxy settings from the tier directories of [`WATCH_LOCATIONS`].
///
/// Files are merged by tier priority, so a machine policy overrides the
/// user's settings, which override machine defaults. Missing files are
/// skipped; a malformed file fails the whole read.
///
/// # Examples
///
/// ```rust,no_run
/// use proxywatch::notify::WatchRoots;
/// use proxywatch::sources::{ProxySettingsSource, SettingsStore};
///
/// let store = SettingsStore::new(&WatchRoots::system());
/// let raw = store.read()?;
/// println!("proxy: {:?}", raw.proxy);
/// # Ok::<(), proxywatch::error::ProxyWatchError>(())
/// ```
pub struct SettingsStore {
    tiers: Vec<(Tier, PathBuf)>,
}

impl SettingsStore {
    /// Create a store reading the standard locations under `roots`.
    pub fn new(roots: &WatchRoots) -> Self {
        let mut tiers: Vec<(Tier, PathBuf)> = WATCH_LOCATIONS
            .iter()
            .map(|location| (location.tier, location.resolve(roots)))
            .collect();
        tiers.sort_by_key(|(tier, _)| tier.priority());
        Self { tiers }
    }

    /// Tier directories in merge order (lowest priority first).
    pub fn tier_dirs(&self) -> &[(Tier, PathBuf)] {
        &self.tiers
    }
}

impl ProxySettingsSource for SettingsStore {
    fn read(&self) -> Result<RawProxySettings> {
        let mut builder = config::Config::builder();
        for (_, dir) in &self.tiers {
            builder = builder.add_source(File::from(dir.join(SETTINGS_FILE_STEM)).required(false));
        }

        let merged = builder
            .build()
            .map_err(|e| ProxyWatchError::ReadError(format!("Failed to load settings: {}", e)))?;

        let entries = merged.try_deserialize::<StoreEntries>().map_err(|e| {
            ProxyWatchError::ReadError(format!("Failed to parse settings: {}", e))
        })?;

        Ok(entries.into())
    }

    fn name(&self) -> String {
        let dirs: Vec<String> = self
            .tiers
            .iter()
            .map(|(_, dir)| dir.display().to_string())
            .collect();
        format!("store:{}", dirs.join(","))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn setup() -> (TempDir, WatchRoots) {
        let temp_dir = TempDir::new().unwrap();
        let roots = WatchRoots::new(temp_dir.path().join("user"), temp_dir.path().join("etc"));
        (temp_dir, roots)
    }

    fn write_tier(roots: &WatchRoots, index: usize, contents: &str) {
        let dir = WATCH_LOCATIONS[index].resolve(roots);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("settings.toml"), contents).unwrap();
    }

    #[test]
    fn test_missing_files_read_as_empty() {
        let (_temp_dir, roots) = setup();
        let store = SettingsStore::new(&roots);
        assert_eq!(store.read().unwrap(), RawProxySettings::default());
    }

    #[test]
    fn test_single_tier() {
        let (_temp_dir, roots) = setup();
        write_tier(
            &roots,
            0,
            r#"
auto_detect = true
proxy_server = "http=1.2.3.4:80"
proxy_override = "*.local"
"#,
        );

        let raw = SettingsStore::new(&roots).read().unwrap();
        assert_eq!(raw.auto_detect, Some(true));
        assert_eq!(raw.proxy.as_deref(), Some("http=1.2.3.4:80"));
        assert_eq!(raw.proxy_bypass.as_deref(), Some("*.local"));
        assert_eq!(raw.auto_config_url, None);
    }

    #[test]
    fn test_policy_overrides_user_overrides_machine() {
        let (_temp_dir, roots) = setup();
        write_tier(&roots, 1, "proxy_server = \"machine:1\"\nauto_detect = true");
        write_tier(&roots, 0, "proxy_server = \"user:2\"");
        write_tier(&roots, 2, "auto_config_url = \"http://policy/pac\"");

        let raw = SettingsStore::new(&roots).read().unwrap();
        assert_eq!(raw.proxy.as_deref(), Some("user:2"));
        assert_eq!(raw.auto_detect, Some(true));
        assert_eq!(raw.auto_config_url.as_deref(), Some("http://policy/pac"));

        write_tier(&roots, 2, "proxy_server = \"policy:3\"");
        let raw = SettingsStore::new(&roots).read().unwrap();
        assert_eq!(raw.proxy.as_deref(), Some("policy:3"));
    }

    #[test]
    fn test_disabled_proxy_not_reported() {
        let (_temp_dir, roots) = setup();
        write_tier(&roots, 0, "proxy_enable = false\nproxy_server = \"p:1\"");
        let raw = SettingsStore::new(&roots).read().unwrap();
        assert_eq!(raw.proxy, None);
    }

    #[test]
    fn test_malformed_file_fails_read() {
        let (_temp_dir, roots) = setup();
        write_tier(&roots, 0, "proxy_server = [unterminated");
        let result = SettingsStore::new(&roots).read();
        assert!(matches!(result, Err(ProxyWatchError::ReadError(_))));
    }

    #[test]
    fn test_tier_order() {
        let (_temp_dir, roots) = setup();
        let store = SettingsStore::new(&roots);
        let tiers: Vec<Tier> = store.tier_dirs().iter().map(|(t, _)| *t).collect();
        assert_eq!(tiers, vec![Tier::Machine, Tier::User, Tier::MachinePolicy]);
        assert!(store.name().starts_with("store:"));
    }
}
