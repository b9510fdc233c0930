use std::future::Future;

use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::{
    error::{NetError, NetResult},
    types::RetryPolicy,
};

/// Run one logical fetch with the engine's retry policy.
///
/// `op` is invoked up to `policy.max_retries` times. Only errors classified
/// retryable by [`NetError::is_retryable`] are retried; the backoff before
/// retry `k` is `base * 2^k`. Both the in-flight attempt and the backoff
/// sleep race `cancel`; cancellation surfaces as [`NetError::Cancelled`].
pub async fn with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    mut op: F,
) -> NetResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = NetResult<T>>,
{
    let max_attempts = policy.max_retries.max(1);
    let mut attempt = 0;

    loop {
        attempt += 1;

        let result = tokio::select! {
            () = cancel.cancelled() => return Err(NetError::Cancelled),
            result = op() => result,
        };

        let error = match result {
            Ok(value) => return Ok(value),
            Err(error) => error,
        };

        if !error.is_retryable() || attempt >= max_attempts {
            return Err(error);
        }

        let delay = policy.delay_for_attempt(attempt);
        warn!(
            attempt,
            max_attempts,
            delay_ms = delay.as_millis() as u64,
            error = %error,
            "strand-net: transient fetch fault, backing off"
        );

        tokio::select! {
            () = cancel.cancelled() => return Err(NetError::Cancelled),
            () = sleep(delay) => {}
        }

        debug!(attempt = attempt + 1, "strand-net: retrying fetch");
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::atomic::{AtomicU32, Ordering},
        time::Duration,
    };

    use super::*;

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            max_retries: 3,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(10),
        }
    }

    #[tokio::test]
    async fn succeeds_after_transient_faults() {
        let calls = AtomicU32::new(0);
        let cancel = CancellationToken::new();

        let result = with_retry(&fast_policy(), &cancel, || async {
            match calls.fetch_add(1, Ordering::SeqCst) {
                0 | 1 => Err(NetError::Connection("connection reset by peer".into())),
                _ => Ok(42_u32),
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let cancel = CancellationToken::new();

        let result: NetResult<()> = with_retry(&fast_policy(), &cancel, || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(NetError::Timeout)
        })
        .await;

        assert!(matches!(result, Err(NetError::Timeout)));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn terminal_errors_do_not_retry() {
        let calls = AtomicU32::new(0);
        let cancel = CancellationToken::new();

        let result: NetResult<()> = with_retry(&fast_policy(), &cancel, || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(NetError::Request("bad request".into()))
        })
        .await;

        assert!(matches!(result, Err(NetError::Request(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cancellation_during_backoff_surfaces_as_cancelled() {
        let cancel = CancellationToken::new();
        let policy = RetryPolicy {
            max_retries: 3,
            base_delay: Duration::from_secs(60),
            max_delay: Duration::from_secs(60),
        };

        let calls = AtomicU32::new(0);
        let task = {
            let cancel = cancel.clone();
            async move {
                with_retry(&policy, &cancel, || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>(NetError::Timeout)
                })
                .await
            }
        };

        let handle = tokio::spawn(task);
        tokio::time::sleep(Duration::from_millis(20)).await;
        cancel.cancel();

        let result = handle.await.unwrap();
        assert!(matches!(result, Err(NetError::Cancelled)));
    }
}
