use crate::error::StoreError;
use crate::store::KeyValueStore;
use async_trait::async_trait;
use backon::{ExponentialBuilder, Retryable};
use std::time::Duration;

/// Backoff applied to retried reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_attempts: usize,
    pub min_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            min_delay: Duration::from_millis(10),
            max_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    fn backoff(&self) -> ExponentialBuilder {
        ExponentialBuilder::default()
            .with_min_delay(self.min_delay)
            .with_max_delay(self.max_delay)
            .with_max_times(self.max_attempts)
    }
}

/// Honors the `retry` hint of `get` by retrying transient failures.
///
/// Writes and reads without the hint are passed through untouched.
#[derive(Debug)]
pub struct RetryingStore<S> {
    inner: S,
    policy: RetryPolicy,
}

impl<S: KeyValueStore> RetryingStore<S> {
    pub fn new(inner: S) -> Self {
        Self::with_policy(inner, RetryPolicy::default())
    }

    pub fn with_policy(inner: S, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    #[must_use]
    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }
}

#[async_trait]
impl<S: KeyValueStore> KeyValueStore for RetryingStore<S> {
    async fn get(&self, key: &str, retry: bool) -> Result<Option<Vec<u8>>, StoreError> {
        if !retry {
            return self.inner.get(key, false).await;
        }

        (|| self.inner.get(key, true))
            .retry(self.policy.backoff())
            .when(StoreError::is_transient)
            .notify(|err: &StoreError, after: Duration| {
                diagnostics::log_warn!(
                    "Retrying read of {key} in {delay_ms}ms: {error}",
                    key: key,
                    delay_ms: after.as_millis() as u64,
                    error: err.to_string()
                );
            })
            .await
    }

    async fn set(&self, key: &str, value: Option<Vec<u8>>) -> Result<(), StoreError> {
        self.inner.set(key, value).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use crate::testing::{CountingStore, FaultyStore};

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            min_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
        }
    }

    /// Fails its first `failures` gets with a transient error.
    struct Flaky {
        inner: MemoryStore,
        failures: std::sync::atomic::AtomicUsize,
    }

    #[async_trait]
    impl KeyValueStore for Flaky {
        async fn get(&self, key: &str, retry: bool) -> Result<Option<Vec<u8>>, StoreError> {
            use std::sync::atomic::Ordering;
            if self
                .failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(StoreError::unavailable("busy"));
            }
            self.inner.get(key, retry).await
        }

        async fn set(&self, key: &str, value: Option<Vec<u8>>) -> Result<(), StoreError> {
            self.inner.set(key, value).await
        }
    }

    fn flaky(failures: usize) -> CountingStore<Flaky> {
        CountingStore::new(Flaky {
            inner: MemoryStore::new(),
            failures: failures.into(),
        })
    }

    #[tokio::test]
    async fn test_transient_get_is_retried() {
        let store = RetryingStore::with_policy(flaky(2), fast_policy());
        store.set("k", Some(vec![9])).await.unwrap();

        assert_eq!(store.get("k", true).await.unwrap(), Some(vec![9]));
        assert_eq!(store.inner().gets(), 3);
    }

    #[tokio::test]
    async fn test_retries_are_bounded() {
        let store = RetryingStore::with_policy(flaky(10), fast_policy());
        assert!(store.get("k", true).await.is_err());
        assert_eq!(store.inner().gets(), 4);
    }

    #[tokio::test]
    async fn test_no_retry_without_hint() {
        let store = RetryingStore::with_policy(flaky(1), fast_policy());
        assert!(store.get("k", false).await.is_err());
        assert_eq!(store.inner().gets(), 1);
    }

    #[tokio::test]
    async fn test_permanent_errors_are_not_retried() {
        let faulty = FaultyStore::new(MemoryStore::new());
        faulty.fail_get(1);
        // Injected failures are io::ErrorKind::Other, which is not transient
        let store = RetryingStore::with_policy(CountingStore::new(faulty), fast_policy());

        assert!(store.get("k", true).await.is_err());
        assert_eq!(store.inner().gets(), 1);
        assert_eq!(store.get("k", true).await.unwrap(), None);
    }
}
