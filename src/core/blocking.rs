//! Boundary between the dispatch loop and the blocking pool.

use crate::error::{ProxyWatchError, Result};

/// Run `f` on the tokio blocking pool and await its result.
///
/// A panic inside `f` surfaces as [`ProxyWatchError::Other`].
pub(crate) async fn run_blocking<F, R>(f: F) -> Result<R>
where
    F: FnOnce() -> R + Send + 'static,
    R: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ProxyWatchError::Other(format!("Blocking task failed: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_returns_value() {
        let value = run_blocking(|| 6 * 7).await.unwrap();
        assert_eq!(value, 42);
    }

    #[tokio::test]
    async fn test_panic_becomes_error() {
        let result: Result<()> = run_blocking(|| panic!("reader exploded")).await;
        assert!(matches!(result, Err(ProxyWatchError::Other(_))));
    }
}
