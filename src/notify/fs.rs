//! Directory watching through the `notify` crate.

use super::{ChangeSource, ChangeSourceFactory, Signal, WatchLocation};
use crate::error::{ProxyWatchError, Result};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher as NotifyWatcher};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Change source watching a settings directory and everything below it.
///
/// The `notify` watcher runs continuously; one-shot semantics come from the
/// pending-signal slot, which the event callback empties on the first
/// create, modify or remove event after arming.
///
/// # Examples
///
/// ```rust,no_run
/// use proxywatch::notify::{ChangeSource, FsChangeSource};
///
/// # fn example(signal: proxywatch::notify::Signal) -> proxywatch::error::Result<()> {
/// let mut source = FsChangeSource::open("/etc/proxywatch")?;
/// source.arm(signal)?;
/// # Ok(())
/// # }
/// ```
pub struct FsChangeSource {
    path: PathBuf,
    watcher: RecommendedWatcher,
    pending: Arc<Mutex<Option<Signal>>>,
    watching: bool,
}

impl FsChangeSource {
    /// Open `path` for change notification.
    ///
    /// # Errors
    ///
    /// Returns [`ProxyWatchError::NotFound`] if the path does not exist,
    /// [`ProxyWatchError::AccessDenied`] if it cannot be listed, or
    /// [`ProxyWatchError::WatchError`] if the watcher cannot be created.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let metadata = std::fs::metadata(&path)
            .map_err(|e| ProxyWatchError::from_location_io(path.clone(), e))?;
        if metadata.is_dir() {
            std::fs::read_dir(&path)
                .map_err(|e| ProxyWatchError::from_location_io(path.clone(), e))?;
        }

        let pending: Arc<Mutex<Option<Signal>>> = Arc::new(Mutex::new(None));
        let slot = Arc::clone(&pending);

        let watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
            Ok(event) if is_change(&event.kind) => {
                if let Some(signal) = slot.lock().take() {
                    // Receiver gone means the service is shutting down.
                    let _ = signal.fire();
                }
            }
            Ok(_) => {}
            Err(e) => tracing::warn!(error = %e, "Directory watch backend error"),
        })
        .map_err(|e| ProxyWatchError::WatchError(format!("Failed to create watcher: {}", e)))?;

        Ok(Self {
            path,
            watcher,
            pending,
            watching: false,
        })
    }

    /// The watched directory.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn is_change(kind: &EventKind) -> bool {
    matches!(
        kind,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
    )
}

impl ChangeSource for FsChangeSource {
    fn arm(&mut self, signal: Signal) -> Result<()> {
        // Re-register so a deleted or replaced directory fails here instead
        // of going quiet.
        if self.watching {
            let _ = self.watcher.unwatch(&self.path);
            self.watching = false;
        }

        self.watcher
            .watch(&self.path, RecursiveMode::Recursive)
            .map_err(|e| {
                ProxyWatchError::WatchError(format!(
                    "Failed to watch {}: {}",
                    self.path.display(),
                    e
                ))
            })?;
        self.watching = true;

        *self.pending.lock() = Some(signal);
        Ok(())
    }
}

/// Opens an [`FsChangeSource`] for every location.
#[derive(Debug, Default, Clone, Copy)]
pub struct FsChangeSourceFactory;

impl ChangeSourceFactory for FsChangeSourceFactory {
    fn open(&self, _location: &WatchLocation, path: &Path) -> Result<Box<dyn ChangeSource>> {
        Ok(Box::new(FsChangeSource::open(path)?))
    }
}
