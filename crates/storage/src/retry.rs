//! Bounded retry for transient backend failures
//!
//! Only `BackendUnavailable` is retried, and only for operations that are
//! idempotent from the engine's point of view: reads, deletes, and writes
//! whose repetition at worst produces an additional sibling. Validation
//! and not-found conditions are deterministic and pass through untouched.

use std::future::Future;
use std::time::Duration;

use shelf_core::Result;

/// Backoff parameters for one class of backend calls
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,
    /// Delay before the first retry; doubles per subsequent attempt
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(25),
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries
    pub fn none() -> Self {
        RetryPolicy {
            max_attempts: 1,
            base_delay: Duration::ZERO,
        }
    }

    fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay * 2u32.saturating_pow(attempt.saturating_sub(1))
    }
}

/// Run `op` with bounded backoff on retryable failures
///
/// `op` is re-invoked from scratch on each attempt; it must therefore be
/// safe to repeat. The final error is returned unchanged once attempts
/// are exhausted.
pub async fn with_retry<T, F, Fut>(policy: RetryPolicy, what: &str, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_retryable() && attempt < policy.max_attempts => {
                let delay = policy.delay_for(attempt);
                tracing::warn!(
                    operation = what,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "backend unavailable, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

/// Decorator injecting transient failures, for exercising retry paths
#[cfg(any(test, feature = "test-util"))]
pub mod test_util {
    use std::sync::atomic::{AtomicU32, Ordering};

    use async_trait::async_trait;
    use shelf_core::{Error, Result};

    use crate::kv::{Bucket, IndexEntry, IndexHit, IndexQuery, KvBackend, VersionSet, VersionToken};

    /// Fails the first `failures` calls of every method, then delegates
    pub struct FlakyBackend<B> {
        inner: B,
        remaining: AtomicU32,
    }

    impl<B> FlakyBackend<B> {
        /// Wrap `inner`, failing the first `failures` calls
        pub fn new(inner: B, failures: u32) -> Self {
            FlakyBackend {
                inner,
                remaining: AtomicU32::new(failures),
            }
        }

        fn trip(&self) -> Result<()> {
            let remaining = self.remaining.load(Ordering::Relaxed);
            if remaining > 0 {
                self.remaining.store(remaining - 1, Ordering::Relaxed);
                return Err(Error::BackendUnavailable("injected failure".to_string()));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl<B: KvBackend> KvBackend for FlakyBackend<B> {
        async fn get(&self, bucket: Bucket, key: &str) -> Result<VersionSet> {
            self.trip()?;
            self.inner.get(bucket, key).await
        }

        async fn put(
            &self,
            bucket: Bucket,
            key: &str,
            value: serde_json::Value,
            indexes: Vec<IndexEntry>,
            observed: &[VersionToken],
        ) -> Result<VersionToken> {
            self.trip()?;
            self.inner.put(bucket, key, value, indexes, observed).await
        }

        async fn delete(&self, bucket: Bucket, key: &str) -> Result<()> {
            self.trip()?;
            self.inner.delete(bucket, key).await
        }

        async fn index_query(&self, bucket: Bucket, query: &IndexQuery) -> Result<Vec<IndexHit>> {
            self.trip()?;
            self.inner.index_query(bucket, query).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shelf_core::Error;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn test_success_passes_through() {
        let calls = AtomicU32::new(0);
        let result: Result<u32> = with_retry(RetryPolicy::default(), "op", || {
            calls.fetch_add(1, Ordering::Relaxed);
            async { Ok(7) }
        })
        .await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_transient_failure_retried() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
        };
        let result: Result<&str> = with_retry(policy, "op", || {
            let n = calls.fetch_add(1, Ordering::Relaxed);
            async move {
                if n < 2 {
                    Err(Error::BackendUnavailable("down".into()))
                } else {
                    Ok("up")
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), "up");
        assert_eq!(calls.load(Ordering::Relaxed), 3);
    }

    #[tokio::test]
    async fn test_attempts_are_bounded() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy {
            max_attempts: 2,
            base_delay: Duration::from_millis(1),
        };
        let result: Result<()> = with_retry(policy, "op", || {
            calls.fetch_add(1, Ordering::Relaxed);
            async { Err(Error::BackendUnavailable("down".into())) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::Relaxed), 2);
    }

    #[tokio::test]
    async fn test_deterministic_failures_not_retried() {
        use shelf_core::StoreId;
        let calls = AtomicU32::new(0);
        let result: Result<()> = with_retry(RetryPolicy::default(), "op", || {
            calls.fetch_add(1, Ordering::Relaxed);
            async { Err(Error::StoreNotFound(StoreId::new("s"))) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::Relaxed), 1, "not-found never retries");
    }
}
