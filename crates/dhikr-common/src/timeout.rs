//! Timeout utilities.

use std::future::Future;
use std::time::Duration;

/// Run an operation with a timeout.
///
/// Elapsing the deadline drops the in-flight future and yields
/// [`DhikrError::Timeout`](crate::DhikrError::Timeout).
pub async fn with_timeout<T, F, Fut>(timeout: Duration, operation: F) -> crate::Result<T>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = T>,
{
    tokio::time::timeout(timeout, operation())
        .await
        .map_err(|_| crate::DhikrError::Timeout(timeout))
}
