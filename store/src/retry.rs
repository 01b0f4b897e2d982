use std::future::Future;
use std::time::Duration;

use models::ControlPlaneError;
use tracing::warn;

const MAX_ATTEMPTS: u32 = 3;
const BACKOFF: Duration = Duration::from_millis(100);

/// Retries a store operation up to `MAX_ATTEMPTS` times with a fixed delay
/// between attempts, surfacing `StoreUnavailable` only once every attempt
/// has failed. Only `StoreUnavailable` is retried -- every other error
/// variant means the store answered and the caller's input was the problem.
pub async fn with_retry<T, F, Fut>(op_name: &str, mut op: F) -> crate::Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = crate::Result<T>>,
{
    let mut last_err = None;
    for attempt in 1..=MAX_ATTEMPTS {
        match op().await {
            Ok(value) => return Ok(value),
            Err(ControlPlaneError::StoreUnavailable(msg)) => {
                warn!(op_name, attempt, error = %msg, "store operation failed, retrying");
                last_err = Some(ControlPlaneError::StoreUnavailable(msg));
                if attempt < MAX_ATTEMPTS {
                    tokio::time::sleep(BACKOFF).await;
                }
            }
            Err(other) => return Err(other),
        }
    }
    Err(last_err.unwrap_or_else(|| ControlPlaneError::StoreUnavailable(op_name.to_string())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn succeeds_without_retry_when_first_attempt_succeeds() {
        let calls = AtomicU32::new(0);
        let result = with_retry("put", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok::<_, ControlPlaneError>(42)
        })
        .await
        .unwrap();
        assert_eq!(result, 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retries_store_unavailable_then_succeeds() {
        let calls = AtomicU32::new(0);
        let result = with_retry("get", || async {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            if n < 2 {
                Err(ControlPlaneError::StoreUnavailable("down".to_string()))
            } else {
                Ok(7)
            }
        })
        .await
        .unwrap();
        assert_eq!(result, 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn exhausts_retries_and_surfaces_store_unavailable() {
        let result = with_retry("delete", || async {
            Err::<(), _>(ControlPlaneError::StoreUnavailable("down".to_string()))
        })
        .await;
        assert!(matches!(result, Err(ControlPlaneError::StoreUnavailable(_))));
    }

    #[tokio::test]
    async fn does_not_retry_non_store_errors() {
        let calls = AtomicU32::new(0);
        let result = with_retry("put", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err::<(), _>(ControlPlaneError::InvalidInput("bad".to_string()))
        })
        .await;
        assert!(matches!(result, Err(ControlPlaneError::InvalidInput(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
