//! Store and generator doubles for tests.
//!
//! [`CountingStore`] records every backend call, [`FaultyStore`] fails
//! chosen calls, and [`SequentialBlockGenerator`] hands out predictable ids.

use crate::block::{Block, BlockGenerator, BlockId};
use crate::error::StoreError;
use crate::store::KeyValueStore;
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Mutex;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};

/// A backend call seen by [`CountingStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Get(String),
    Set(String),
    Delete(String),
}

/// Wraps a store and records the calls made through it.
#[derive(Debug)]
pub struct CountingStore<S> {
    inner: S,
    calls: Mutex<Vec<Call>>,
}

impl<S: KeyValueStore> CountingStore<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn gets(&self) -> usize {
        self.count(|c| matches!(c, Call::Get(_)))
    }

    /// Writes, including deletions.
    pub fn sets(&self) -> usize {
        self.count(|c| matches!(c, Call::Set(_) | Call::Delete(_)))
    }

    pub fn deletes(&self) -> usize {
        self.count(|c| matches!(c, Call::Delete(_)))
    }

    pub fn reset(&self) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.clear();
        }
    }

    fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.calls
            .lock()
            .map(|c| c.iter().filter(|call| pred(call)).count())
            .unwrap_or(0)
    }

    fn record(&self, call: Call) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(call);
        }
    }
}

#[async_trait]
impl<S: KeyValueStore> KeyValueStore for CountingStore<S> {
    async fn get(&self, key: &str, retry: bool) -> Result<Option<Vec<u8>>, StoreError> {
        self.record(Call::Get(key.to_string()));
        self.inner.get(key, retry).await
    }

    async fn set(&self, key: &str, value: Option<Vec<u8>>) -> Result<(), StoreError> {
        if value.is_some() {
            self.record(Call::Set(key.to_string()));
        } else {
            self.record(Call::Delete(key.to_string()));
        }
        self.inner.set(key, value).await
    }
}

/// Wraps a store and fails selected calls.
///
/// Call numbers are 1-based and count every call of that kind made since
/// the store was created, failed ones included.
#[derive(Debug)]
pub struct FaultyStore<S> {
    inner: S,
    get_count: AtomicUsize,
    set_count: AtomicUsize,
    failing_gets: Mutex<HashSet<usize>>,
    failing_sets: Mutex<HashSet<usize>>,
    failing_keys: Mutex<HashSet<String>>,
}

impl<S: KeyValueStore> FaultyStore<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            get_count: AtomicUsize::new(0),
            set_count: AtomicUsize::new(0),
            failing_gets: Mutex::new(HashSet::new()),
            failing_sets: Mutex::new(HashSet::new()),
            failing_keys: Mutex::new(HashSet::new()),
        }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Fail the `n`th `get`.
    pub fn fail_get(&self, n: usize) {
        if let Ok(mut gets) = self.failing_gets.lock() {
            _ = gets.insert(n);
        }
    }

    /// Fail the `n`th `set` (deletions count as sets).
    pub fn fail_set(&self, n: usize) {
        if let Ok(mut sets) = self.failing_sets.lock() {
            _ = sets.insert(n);
        }
    }

    /// Fail every `set` of `key` until [`FaultyStore::heal`].
    pub fn fail_key<K: Into<String>>(&self, key: K) {
        if let Ok(mut keys) = self.failing_keys.lock() {
            _ = keys.insert(key.into());
        }
    }

    /// Stop failing anything.
    pub fn heal(&self) {
        if let Ok(mut gets) = self.failing_gets.lock() {
            gets.clear();
        }
        if let Ok(mut sets) = self.failing_sets.lock() {
            sets.clear();
        }
        if let Ok(mut keys) = self.failing_keys.lock() {
            keys.clear();
        }
    }

    fn injected(what: &str, key: &str) -> StoreError {
        StoreError::Io(std::io::Error::other(format!("injected {what} failure: {key}")))
    }
}

#[async_trait]
impl<S: KeyValueStore> KeyValueStore for FaultyStore<S> {
    async fn get(&self, key: &str, retry: bool) -> Result<Option<Vec<u8>>, StoreError> {
        let n = self.get_count.fetch_add(1, Ordering::SeqCst) + 1;
        let fail = self
            .failing_gets
            .lock()
            .map(|g| g.contains(&n))
            .unwrap_or(false);
        if fail {
            return Err(Self::injected("get", key));
        }
        self.inner.get(key, retry).await
    }

    async fn set(&self, key: &str, value: Option<Vec<u8>>) -> Result<(), StoreError> {
        let n = self.set_count.fetch_add(1, Ordering::SeqCst) + 1;
        let by_number = self
            .failing_sets
            .lock()
            .map(|s| s.contains(&n))
            .unwrap_or(false);
        let by_key = self
            .failing_keys
            .lock()
            .map(|k| k.contains(key))
            .unwrap_or(false);
        if by_number || by_key {
            return Err(Self::injected("set", key));
        }
        self.inner.set(key, value).await
    }
}

/// Hands out ids 1, 2, 3, ... so tests can predict backend keys.
#[derive(Debug)]
pub struct SequentialBlockGenerator {
    next: AtomicI64,
}

impl SequentialBlockGenerator {
    #[must_use]
    pub fn new() -> Self {
        Self::starting_at(1)
    }

    #[must_use]
    pub fn starting_at(first: i64) -> Self {
        Self {
            next: AtomicI64::new(first),
        }
    }

    fn next_id(&self) -> BlockId {
        BlockId::new(self.next.fetch_add(1, Ordering::SeqCst))
    }
}

impl Default for SequentialBlockGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl BlockGenerator for SequentialBlockGenerator {
    fn new_block(&self) -> Block {
        Block::new(self.next_id())
    }

    fn new_named_block(&self, name: &str) -> Block {
        Block::named(self.next_id(), name)
    }
}
