//! Change notification for the settings locations.
//!
//! Each location is a [`WatchPoint`] wrapping a one-shot [`ChangeSource`].
//! A fired [`Signal`] reaches the service's dispatch loop through the
//! [`SignalDispatcher`], where the [`ChangeCoordinator`] re-arms the point
//! and asks the poller for a recheck.

mod coordinator;
mod location;
mod observer;
mod registry;
mod signal;
mod watch_point;

#[cfg(feature = "fs-watch")]
mod fs;

pub use coordinator::{ChangeCoordinator, SignalOutcome};
pub use location::{Tier, WATCH_LOCATIONS, WatchLocation, WatchRoot, WatchRoots};
pub use observer::{Observer, ObserverId, ObserverSet};
pub use registry::WatchRegistry;
pub use signal::{Signal, SignalDispatcher, SignalId};
pub use watch_point::{
    ChangeSource, ChangeSourceFactory, PollOnly, WatchPoint, WatchState, default_factory,
};

#[cfg(feature = "fs-watch")]
pub use fs::{FsChangeSource, FsChangeSourceFactory};
