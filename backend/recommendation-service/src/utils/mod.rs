//! Timeout wrapper for upstream calls

use std::future::Future;
use std::time::Duration;
use tokio::time::timeout;
use tracing::warn;

use crate::error::{AppError, Result};

/// Execute a fallible upstream call with a deadline. Dropping the inner
/// future on expiry cancels the call.
pub async fn with_timeout<F, T>(service: &'static str, duration: Duration, future: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match timeout(duration, future).await {
        Ok(result) => result,
        Err(_) => {
            warn!(service, timeout_ms = duration.as_millis() as u64, "Upstream call timed out");
            Err(AppError::Timeout {
                service,
                elapsed_ms: duration.as_millis() as u64,
            })
        }
    }
}
