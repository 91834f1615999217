//! Optional upper bound on a single collaborator call.

use std::future::Future;
use std::time::Duration;

/// Awaits `fut`, giving up after `limit` if one is set.
///
/// Returns `Err(limit)` on timeout so the caller can report how long it
/// waited.  With `limit = None` the future is awaited to completion.
pub(crate) async fn within<F: Future>(limit: Option<Duration>, fut: F) -> Result<F::Output, Duration> {
    match limit {
        Some(limit) => tokio::time::timeout(limit, fut).await.map_err(|_| limit),
        None => Ok(fut.await),
    }
}
