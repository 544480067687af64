//! Error types for proxywatch.

use crate::notify::SignalId;
use std::path::PathBuf;

/// Result type alias for proxywatch operations.
pub type Result<T> = std::result::Result<T, ProxyWatchError>;

/// Errors that can occur while reading or watching proxy configuration.
///
/// Observers never see these: a failed read degrades to a direct-connection
/// configuration and a failed watch is dropped in favour of the fallback poll.
#[derive(Debug, thiserror::Error)]
pub enum ProxyWatchError {
    /// The watch location does not exist.
    #[error("Watch location not found: {}", .0.display())]
    NotFound(PathBuf),

    /// The watch location exists but cannot be opened for notifications.
    #[error("Access denied to watch location: {}", .0.display())]
    AccessDenied(PathBuf),

    /// The underlying change notification mechanism failed.
    #[error("Watch error: {0}")]
    WatchError(String),

    /// This build has no change notification backend.
    #[error("Change notifications are not supported in this build")]
    WatchNotSupported,

    /// The raw proxy settings could not be obtained.
    #[error("Failed to read proxy settings: {0}")]
    ReadError(String),

    /// A proxy settings value could not be parsed.
    #[error("Failed to parse proxy settings: {0}")]
    ParseError(String),

    /// A signal fired that belongs to no tracked watch point.
    ///
    /// This is a bookkeeping bug, not a runtime condition.
    #[error("Signal {0} does not belong to any tracked watch point")]
    UntrackedSignal(SignalId),

    /// The service dispatch loop is no longer running.
    #[error("Proxy config service has stopped")]
    ServiceStopped,

    /// IO error occurred.
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// Generic error for other cases.
    #[error("Proxy watch error: {0}")]
    Other(String),
}

impl ProxyWatchError {
    /// Map an IO error on `path` to the watch-location taxonomy.
    pub(crate) fn from_location_io(path: PathBuf, err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound(path),
            std::io::ErrorKind::PermissionDenied => Self::AccessDenied(path),
            _ => Self::IoError(err),
        }
    }
}
