use crate::error::StoreError;
use async_trait::async_trait;
use std::sync::Arc;

/// Key-value backend the filesystem persists into.
///
/// Values are opaque bytes. Implementations must be safe for concurrent
/// use; the filesystem shares one store among all of its nodes.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Fetch the value under `key`, `None` if absent.
    ///
    /// `retry` is a hint from the caller that transient failures may be
    /// retried before giving up. Stores are free to ignore it.
    async fn get(&self, key: &str, retry: bool) -> Result<Option<Vec<u8>>, StoreError>;

    /// Store `value` under `key`. `None` removes the key.
    async fn set(&self, key: &str, value: Option<Vec<u8>>) -> Result<(), StoreError>;
}

/// Shared handle to a store.
pub type StoreRef = Arc<dyn KeyValueStore>;

#[async_trait]
impl<S: KeyValueStore + ?Sized> KeyValueStore for Arc<S> {
    async fn get(&self, key: &str, retry: bool) -> Result<Option<Vec<u8>>, StoreError> {
        (**self).get(key, retry).await
    }

    async fn set(&self, key: &str, value: Option<Vec<u8>>) -> Result<(), StoreError> {
        (**self).set(key, value).await
    }
}
