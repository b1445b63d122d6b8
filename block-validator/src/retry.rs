//! A jittered exponential-backoff retry helper shared by the subtree
//! fetcher (C5) and the order/blessing check's meta-store lookups (§4.6
//! check 11, §7 "retried with backoff up to the budget; breaching the
//! budget surfaces as a storage error, not an invalidity").

use std::time::Duration;

use rand::Rng;
use store_iface::StoreError;

/// The backoff before the `attempt`-th retry (0-indexed): doubles each
/// attempt, capped at `max`, then jittered uniformly between zero and the
/// capped value.
pub fn jittered_backoff(initial: Duration, max: Duration, attempt: u32) -> Duration {
    let exp = initial.as_millis() as u64 * 2u64.saturating_pow(attempt.min(16));
    let capped = exp.min(max.as_millis() as u64).max(1);
    Duration::from_millis(rand::thread_rng().gen_range(0..=capped))
}

/// Retries `call` up to `max_attempts` times, sleeping a jittered backoff
/// between attempts, stopping early on a non-retryable
/// [`StoreError`]. Exhausting the budget surfaces the last retryable
/// error rather than converting it into an invalidity.
pub async fn retry_storage_call<F, Fut, T>(
    initial_backoff: Duration,
    max_backoff: Duration,
    max_attempts: u32,
    mut call: F,
) -> Result<T, StoreError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, StoreError>>,
{
    let mut last_error = None;
    for attempt in 0..max_attempts.max(1) {
        if attempt > 0 {
            tokio::time::sleep(jittered_backoff(initial_backoff, max_backoff, attempt - 1)).await;
        }

        match call().await {
            Ok(value) => return Ok(value),
            Err(error) if error.is_retryable() => last_error = Some(error),
            Err(error) => return Err(error),
        }
    }

    Err(last_error.unwrap_or_else(|| StoreError::storage("exhausted retry budget")))
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use store_iface::ErrorKind;

    use super::*;

    #[tokio::test]
    async fn succeeds_after_transient_failures() {
        let attempts = AtomicUsize::new(0);
        let result = retry_storage_call(Duration::from_millis(1), Duration::from_millis(2), 5, || {
            let attempt = attempts.fetch_add(1, Ordering::SeqCst);
            async move {
                if attempt < 2 {
                    Err(StoreError::storage("transient"))
                } else {
                    Ok(attempt)
                }
            }
        })
        .await
        .unwrap();

        assert_eq!(result, 2);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn stops_immediately_on_non_retryable_error() {
        let attempts = AtomicUsize::new(0);
        let result: Result<(), StoreError> = retry_storage_call(Duration::from_millis(1), Duration::from_millis(2), 5, || {
            attempts.fetch_add(1, Ordering::SeqCst);
            async { Err(StoreError::new(ErrorKind::InvalidArgument, "bad input")) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn surfaces_last_error_once_budget_exhausted() {
        let result: Result<(), StoreError> = retry_storage_call(Duration::from_millis(1), Duration::from_millis(2), 3, || async {
            Err(StoreError::storage("still failing"))
        })
        .await;

        assert!(matches!(result, Err(e) if e.kind == ErrorKind::Storage));
    }
}
