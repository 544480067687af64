//! A single watched settings location.

use super::{Signal, SignalDispatcher, SignalId, WatchLocation};
use crate::error::{ProxyWatchError, Result};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// A platform change-notification primitive for one location.
///
/// `arm` registers interest in the *next* change only: the source fires the
/// given signal at most once and then stays quiet until armed again. A
/// change anywhere below a hierarchical location counts as a change.
///
/// Dropping the source releases the native watch together with any pending
/// signal.
pub trait ChangeSource: Send {
    /// Register `signal` to fire on the next change.
    ///
    /// # Errors
    ///
    /// Returns an error if the registration fails; the source is then
    /// considered unusable.
    fn arm(&mut self, signal: Signal) -> Result<()>;
}

/// Opens [`ChangeSource`]s for watch locations.
///
/// Opening may block on I/O.
pub trait ChangeSourceFactory: Send + Sync {
    /// Open `path` (the resolved `location`) for change notification only.
    ///
    /// # Errors
    ///
    /// Returns [`ProxyWatchError::NotFound`] or
    /// [`ProxyWatchError::AccessDenied`] when the location cannot be opened.
    fn open(&self, location: &WatchLocation, path: &Path) -> Result<Box<dyn ChangeSource>>;
}

/// Factory for builds without a notification backend.
///
/// Every open fails with [`ProxyWatchError::WatchNotSupported`], leaving
/// the fallback poll as the only change detection.
#[derive(Debug, Default, Clone, Copy)]
pub struct PollOnly;

impl ChangeSourceFactory for PollOnly {
    fn open(&self, _location: &WatchLocation, _path: &Path) -> Result<Box<dyn ChangeSource>> {
        Err(ProxyWatchError::WatchNotSupported)
    }
}

/// The change-source factory for this build.
pub fn default_factory() -> Arc<dyn ChangeSourceFactory> {
    #[cfg(feature = "fs-watch")]
    {
        Arc::new(super::FsChangeSourceFactory)
    }
    #[cfg(not(feature = "fs-watch"))]
    {
        Arc::new(PollOnly)
    }
}

/// Lifecycle of a [`WatchPoint`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchState {
    /// Opened but never armed.
    Unarmed,
    /// Waiting for the next change.
    Armed,
    /// Arming failed; the point is never armed again.
    Retired,
}

/// One watched location: its change source plus its signal identity.
pub struct WatchPoint {
    location: WatchLocation,
    path: PathBuf,
    signal: SignalId,
    source: Box<dyn ChangeSource>,
    state: WatchState,
}

impl WatchPoint {
    /// Open `location` (resolved to `path`) through `factory`.
    ///
    /// Blocking.
    pub fn create(
        location: WatchLocation,
        path: PathBuf,
        signal: SignalId,
        factory: &dyn ChangeSourceFactory,
    ) -> Result<Self> {
        let source = factory.open(&location, &path)?;
        Ok(Self {
            location,
            path,
            signal,
            source,
            state: WatchState::Unarmed,
        })
    }

    /// Arm for the next change, delivering through `dispatcher`.
    ///
    /// Returns `false` if the signal cannot be bound or the source refuses
    /// the registration. A point that fails to arm is retired and every
    /// later call returns `false` without touching the source.
    pub fn arm(&mut self, dispatcher: &SignalDispatcher) -> bool {
        if self.state == WatchState::Retired {
            return false;
        }

        let Some(signal) = dispatcher.bind(self.signal) else {
            tracing::warn!(location = %self.location, "Signal dispatcher closed, cannot arm");
            self.state = WatchState::Retired;
            return false;
        };

        match self.source.arm(signal) {
            Ok(()) => {
                self.state = WatchState::Armed;
                true
            }
            Err(e) => {
                tracing::warn!(location = %self.location, error = %e, "Failed to arm watch");
                self.state = WatchState::Retired;
                false
            }
        }
    }

    /// Identity of this point's signal.
    pub fn signal_id(&self) -> SignalId {
        self.signal
    }

    /// The watched location.
    pub fn location(&self) -> &WatchLocation {
        &self.location
    }

    /// Resolved directory.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current lifecycle state.
    pub fn state(&self) -> WatchState {
        self.state
    }
}

impl fmt::Debug for WatchPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatchPoint")
            .field("location", &self.location)
            .field("path", &self.path)
            .field("signal", &self.signal)
            .field("state", &self.state)
            .finish()
    }
}
