//! The fixed table of places proxy settings can live.

use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};

/// Precedence tier a location belongs to.
///
/// Later tiers override earlier ones when settings are merged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Tier {
    /// Machine-wide defaults.
    Machine,
    /// Settings of the current user.
    User,
    /// Machine policy that overrides everything else.
    MachinePolicy,
}

impl Tier {
    /// Merge priority (higher = takes precedence).
    pub fn priority(self) -> i32 {
        match self {
            Self::Machine => 100,
            Self::User => 200,
            Self::MachinePolicy => 300,
        }
    }
}

/// Base directory a location is anchored at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum WatchRoot {
    /// The user's configuration directory.
    UserConfig,
    /// The machine-wide configuration directory.
    MachineConfig,
}

/// One watchable settings location.
///
/// Identity is the `(root, path)` pair.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct WatchLocation {
    /// Precedence tier of the settings stored here.
    pub tier: Tier,
    /// Base directory.
    pub root: WatchRoot,
    /// Directory relative to `root`.
    pub path: &'static str,
}

impl WatchLocation {
    /// Whether both locations address the same place.
    pub fn same_place(&self, other: &WatchLocation) -> bool {
        self.root == other.root && self.path == other.path
    }

    /// Absolute directory under `roots`.
    pub fn resolve(&self, roots: &WatchRoots) -> PathBuf {
        roots.dir(self.root).join(self.path)
    }
}

impl PartialEq for WatchLocation {
    fn eq(&self, other: &Self) -> bool {
        self.same_place(other)
    }
}

impl Eq for WatchLocation {}

impl fmt::Display for WatchLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let root = match self.root {
            WatchRoot::UserConfig => "user",
            WatchRoot::MachineConfig => "machine",
        };
        write!(f, "{}:{}", root, self.path)
    }
}

/// Every location proxy settings are read from and watched at.
///
/// Not exhaustive of every place a platform may keep proxy state; anything
/// missed here is still picked up by the fallback poll.
pub const WATCH_LOCATIONS: [WatchLocation; 3] = [
    WatchLocation {
        tier: Tier::User,
        root: WatchRoot::UserConfig,
        path: "proxywatch",
    },
    WatchLocation {
        tier: Tier::Machine,
        root: WatchRoot::MachineConfig,
        path: "proxywatch",
    },
    WatchLocation {
        tier: Tier::MachinePolicy,
        root: WatchRoot::MachineConfig,
        path: "policies/proxywatch",
    },
];

/// Concrete directories for each [`WatchRoot`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchRoots {
    user: PathBuf,
    machine: PathBuf,
}

impl WatchRoots {
    /// Use explicit directories (sandboxes, tests).
    pub fn new(user: impl Into<PathBuf>, machine: impl Into<PathBuf>) -> Self {
        Self {
            user: user.into(),
            machine: machine.into(),
        }
    }

    /// Platform defaults: the user config dir and the machine config dir.
    pub fn system() -> Self {
        let user = dirs::config_dir().unwrap_or_else(|| PathBuf::from(".config"));
        Self {
            user,
            machine: machine_config_dir(),
        }
    }

    /// Directory for `root`.
    pub fn dir(&self, root: WatchRoot) -> &Path {
        match root {
            WatchRoot::UserConfig => &self.user,
            WatchRoot::MachineConfig => &self.machine,
        }
    }
}

impl Default for WatchRoots {
    fn default() -> Self {
        Self::system()
    }
}

#[cfg(windows)]
fn machine_config_dir() -> PathBuf {
    std::env::var_os("ProgramData")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(r"C:\ProgramData"))
}

#[cfg(not(windows))]
fn machine_config_dir() -> PathBuf {
    PathBuf::from("/etc")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_covers_all_tiers() {
        let tiers: Vec<Tier> = WATCH_LOCATIONS.iter().map(|l| l.tier).collect();
        assert!(tiers.contains(&Tier::User));
        assert!(tiers.contains(&Tier::Machine));
        assert!(tiers.contains(&Tier::MachinePolicy));
    }

    #[test]
    fn test_table_has_unique_places() {
        for (i, a) in WATCH_LOCATIONS.iter().enumerate() {
            for b in &WATCH_LOCATIONS[i + 1..] {
                assert!(!a.same_place(b), "{} listed twice", a);
            }
        }
    }

    #[test]
    fn test_identity_ignores_tier() {
        let a = WatchLocation {
            tier: Tier::User,
            root: WatchRoot::UserConfig,
            path: "x",
        };
        let b = WatchLocation {
            tier: Tier::Machine,
            ..a
        };
        assert_eq!(a, b);
    }

    #[test]
    fn test_resolve() {
        let roots = WatchRoots::new("/home/u/.config", "/etc");
        assert_eq!(
            WATCH_LOCATIONS[0].resolve(&roots),
            PathBuf::from("/home/u/.config/proxywatch")
        );
        assert_eq!(
            WATCH_LOCATIONS[2].resolve(&roots),
            PathBuf::from("/etc/policies/proxywatch")
        );
    }

    #[test]
    fn test_tier_priority_order() {
        assert!(Tier::Machine.priority() < Tier::User.priority());
        assert!(Tier::User.priority() < Tier::MachinePolicy.priority());
    }
}
