//! Timeout helpers for transport-level policies.
//!
//! Links themselves never time out; a stalled peer is the transport's problem.

use crate::error::{LinkError, Result};
use std::future::Future;
use std::time::Duration;
use tracing::debug;

/// Default time a fresh connection gets to deliver its handshake header
pub const HEADER_TIMEOUT: Duration = Duration::from_secs(10);

/// Default time the server waits for live links to drain on shutdown
pub const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// Interval between drain checks while shutting down
pub const DRAIN_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Run `fut`, mapping an elapsed deadline to [`LinkError::Timeout`].
pub async fn with_timeout_error<F, T>(fut: F, duration: Duration) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(duration, fut).await {
        Ok(result) => result,
        Err(_) => {
            debug!(timeout_ms = duration.as_millis() as u64, "Operation timed out");
            Err(LinkError::Timeout)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_elapsed_maps_to_timeout() {
        let result: Result<()> = with_timeout_error(
            async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            },
            Duration::from_secs(1),
        )
        .await;
        assert!(matches!(result, Err(LinkError::Timeout)));
    }

    #[tokio::test]
    async fn test_inner_error_passes_through() {
        let result: Result<()> =
            with_timeout_error(async { Err(LinkError::ConnectionClosed) }, HEADER_TIMEOUT).await;
        assert!(matches!(result, Err(LinkError::ConnectionClosed)));
    }
}
