//! Bounded waits and retries for provider calls.
//!
//! Every network call is wrapped in a timeout. Reads are idempotent, so they
//! are also retried with exponential backoff when the failure looks
//! transient. Transaction submission is never retried.

use std::{future::Future, time::Duration};

use alloy::rpc::types::{TransactionReceipt, TransactionRequest};

use crate::{
    error::{Error, Result},
    evm::Provider,
};

/// Exponential backoff for read calls.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Attempts after the first one.
    pub max_retries: u32,
    pub base_delay: Duration,
    pub multiplier: f64,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(250),
            multiplier: 2.0,
            max_delay: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    /// Never retries.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Delay before retry number `attempt`, counting from zero.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let factor = self.multiplier.powi(attempt.min(i32::MAX as u32) as i32);
        self.base_delay.mul_f64(factor).min(self.max_delay)
    }
}

/// Timeouts and retries applied to every call made by a client.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RpcSettings {
    /// Upper bound for a single call, and for waiting on a receipt.
    pub timeout: Duration,
    pub retry: RetryPolicy,
}

impl Default for RpcSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(60),
            retry: RetryPolicy::default(),
        }
    }
}

/// Runs `fut`, failing with [`Error::Timeout`] if it doesn't finish in time.
pub async fn bounded<T, F>(timeout: Duration, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::time::timeout(timeout, fut)
        .await
        .unwrap_or(Err(Error::Timeout(timeout)))
}

/// Runs an idempotent read, retrying transient failures.
///
/// `call` is invoked once per attempt. `what` names the call in log lines.
pub async fn read<T, F, Fut>(settings: &RpcSettings, what: &str, mut call: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0;
    loop {
        match bounded(settings.timeout, call()).await {
            Err(err) if err.is_retryable() && attempt < settings.retry.max_retries => {
                let delay = settings.retry.delay_for_attempt(attempt);
                log::warn!("{what} failed: {err}, retrying in {delay:?}");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            result => return result,
        }
    }
}

/// Submits a transaction once and waits for its receipt.
///
/// Both the submission and the wait are bounded by `timeout`. A receipt with
/// a failed status is reported as [`Error::Reverted`].
pub async fn send_and_confirm<P: Provider>(
    provider: &P,
    request: TransactionRequest,
    timeout: Duration,
) -> Result<TransactionReceipt> {
    let pending = bounded(timeout, async {
        provider
            .send_transaction(request)
            .await
            .map_err(Error::from_submission)
    })
    .await?;
    let hash = *pending.tx_hash();
    log::debug!("submitted {hash}");

    let receipt = bounded(timeout, async {
        pending.get_receipt().await.map_err(Error::from)
    })
    .await?;
    if !receipt.status() {
        return Err(Error::Reverted(hash));
    }
    Ok(receipt)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use alloy::transports::RpcError;

    use super::*;

    fn fast(max_retries: u32) -> RpcSettings {
        RpcSettings {
            timeout: Duration::from_millis(50),
            retry: RetryPolicy {
                max_retries,
                base_delay: Duration::from_millis(1),
                multiplier: 2.0,
                max_delay: Duration::from_millis(4),
            },
        }
    }

    #[test]
    fn test_delay_for_attempt() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for_attempt(0), Duration::from_millis(250));
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(500));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_secs(1));
        assert_eq!(policy.delay_for_attempt(10), Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_bounded_times_out() {
        let result: Result<()> = bounded(Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;
        assert!(matches!(result, Err(Error::Timeout(_))));
    }

    #[tokio::test]
    async fn test_read_retries_transient_errors() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let value = read(&fast(3), "flaky", move || async move {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(Error::Timeout(Duration::ZERO))
            } else {
                Ok(7)
            }
        })
        .await
        .unwrap();
        assert_eq!(value, 7);
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_read_gives_up() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: Result<()> = read(&fast(2), "down", move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err::<(), _>(Error::Timeout(Duration::ZERO))
        })
        .await;
        assert!(matches!(result, Err(Error::Timeout(_))));
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_read_does_not_retry_permanent_errors() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: Result<()> = read(&fast(3), "bad", move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err::<(), _>(Error::Rpc(RpcError::local_usage_str("no signer")))
        })
        .await;
        assert!(matches!(result, Err(Error::Rpc(_))));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }
}
