//! The network seam.

use std::time::Duration;

use async_trait::async_trait;
use dhikr_common::with_timeout;

use crate::fetch::{Request, Response};
use crate::SwError;

/// Sends requests to the real network on behalf of the worker.
///
/// An `Err` means no response was obtained at all (offline, DNS, reset).
/// HTTP error statuses come back as `Ok` responses.
#[async_trait]
pub trait Network: Send + Sync {
    async fn fetch(&self, request: &Request) -> Result<Response, SwError>;
}

/// Fetch with an upper bound; elapsing it counts as a network failure.
pub(crate) async fn fetch_bounded<N: Network + ?Sized>(
    network: &N,
    request: &Request,
    timeout: Duration,
) -> Result<Response, SwError> {
    with_timeout(timeout, || network.fetch(request)).await?
}
