//! Timeout helpers.

use std::future::Future;
use std::time::Duration;

use crate::error::ChatError;

/// Await `future`, bounded by `duration` when one is given.
pub async fn maybe_timeout<T>(
    duration: Option<Duration>,
    future: impl Future<Output = T>,
) -> Result<T, ChatError> {
    match duration {
        Some(limit) => tokio::time::timeout(limit, future)
            .await
            .map_err(|_| ChatError::Timeout(limit.as_millis() as u64)),
        None => Ok(future.await),
    }
}
