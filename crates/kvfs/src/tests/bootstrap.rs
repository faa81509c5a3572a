use std::sync::Arc;

use futures::future::join_all;

use super::{memory_fs, reopen, sequential_fs};
use crate::block::BlockId;
use crate::error::Error;
use crate::fs::{FS, ROOT_KEY, decode_root_key, encode_root_key};
use crate::memory::MemoryStore;
use crate::store::KeyValueStore;
use crate::testing::{Call, CountingStore, FaultyStore};

#[tokio::test]
async fn test_fresh_root_is_empty() {
    let (store, fs) = memory_fs();
    let root = fs.root().await.unwrap();

    assert!(root.list().await.is_empty());
    assert_eq!(root.name().await, "/");
    assert_eq!(root.id(), BlockId::new(1));

    let key = store.get(ROOT_KEY, false).await.unwrap().unwrap();
    assert_eq!(key.len(), 80);
    assert_eq!(decode_root_key(&key).unwrap(), BlockId::new(1));
    assert!(store.contains_key("1"));
}

#[tokio::test]
async fn test_root_bootstrap_is_idempotent() {
    let store = Arc::new(CountingStore::new(MemoryStore::new()));
    let fs = sequential_fs(store.clone());

    let first = fs.root().await.unwrap();
    assert_eq!(
        store.calls(),
        vec![
            Call::Get(ROOT_KEY.into()),
            Call::Set("1".into()),
            Call::Set(ROOT_KEY.into()),
        ]
    );

    store.reset();
    let second = fs.root().await.unwrap();
    assert!(store.calls().is_empty());
    assert_eq!(first, second);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_bootstrap_creates_one_root() {
    let store = Arc::new(CountingStore::new(MemoryStore::new()));
    let fs = Arc::new(sequential_fs(store.clone()));

    let tasks = (0..8).map(|_| {
        let fs = fs.clone();
        tokio::spawn(async move { fs.root().await })
    });
    let roots: Vec<_> = join_all(tasks)
        .await
        .into_iter()
        .map(|r| r.unwrap().unwrap())
        .collect();

    assert!(roots.iter().all(|r| *r == roots[0]));
    assert_eq!(store.gets(), 1);
    assert_eq!(store.sets(), 2);
}

#[tokio::test]
async fn test_existing_root_is_loaded() {
    let (store, fs) = memory_fs();
    let root = fs.root().await.unwrap();
    _ = root.mkdir("a").await.unwrap();
    _ = root.create("b").await.unwrap();

    let other = reopen(store.clone(), 100);
    let loaded = other.root().await.unwrap();
    assert_eq!(loaded.id(), root.id());
    assert_eq!(loaded.name().await, "/");

    let names: Vec<_> = loaded.list().await.into_iter().map(|e| e.name).collect();
    assert_eq!(names, vec!["a", "b"]);
}

#[tokio::test]
async fn test_root_key_read_failure_is_retryable() {
    let store = Arc::new(FaultyStore::new(MemoryStore::new()));
    let fs = sequential_fs(store.clone());
    store.fail_get(1);

    let err = fs.root().await.unwrap_err();
    assert!(matches!(&err, Error::BackendRead { key, .. } if key == ROOT_KEY));
    assert!(err.is_io());
    assert!(store.inner().is_empty());

    let root = fs.root().await.unwrap();
    assert!(root.list().await.is_empty());
}

#[tokio::test]
async fn test_root_node_write_failure_leaves_nothing_behind() {
    let store = Arc::new(FaultyStore::new(MemoryStore::new()));
    let fs = sequential_fs(store.clone());
    store.fail_set(1);

    let err = fs.root().await.unwrap_err();
    assert!(matches!(&err, Error::BackendWrite { key, .. } if key == "1"));
    assert!(store.inner().is_empty());

    // The next attempt starts over with a new block
    let root = fs.root().await.unwrap();
    assert_eq!(root.id(), BlockId::new(2));
    let key = store.inner().get(ROOT_KEY, false).await.unwrap().unwrap();
    assert_eq!(decode_root_key(&key).unwrap(), BlockId::new(2));
}

#[tokio::test]
async fn test_root_key_write_failure_is_retryable() {
    let store = Arc::new(FaultyStore::new(MemoryStore::new()));
    let fs = sequential_fs(store.clone());
    store.fail_set(2);

    let err = fs.root().await.unwrap_err();
    assert!(matches!(&err, Error::BackendWrite { key, .. } if key == ROOT_KEY));
    // The node record was written and is now an orphan
    assert!(store.inner().contains_key("1"));
    assert!(!store.inner().contains_key(ROOT_KEY));

    let root = fs.root().await.unwrap();
    assert_eq!(root.id(), BlockId::new(2));
}

#[tokio::test]
async fn test_corrupt_root_key() {
    let store = Arc::new(MemoryStore::new());
    store.set(ROOT_KEY, Some(vec![0xff, 0xff, 0xff])).await.unwrap();
    let fs = sequential_fs(store.clone());

    let err = fs.root().await.unwrap_err();
    assert!(matches!(err, Error::CorruptRootKey(_)));
    assert_eq!(err.errno(), libc::EIO);
    // Nothing was created over the damaged key
    assert_eq!(store.len(), 1);
}

#[tokio::test]
async fn test_corrupt_root_node() {
    let store = Arc::new(MemoryStore::new());
    store
        .set(ROOT_KEY, Some(encode_root_key(BlockId::new(7)).unwrap()))
        .await
        .unwrap();
    store.set("7", Some(b"not a directory".to_vec())).await.unwrap();
    let fs = sequential_fs(store.clone());

    let err = fs.root().await.unwrap_err();
    assert!(matches!(&err, Error::CorruptRootNode { id, .. } if *id == BlockId::new(7)));

    // Repairing the record lets a later call succeed
    store
        .set("7", Some(br#"{"name":"/","id":7,"dirs":[],"files":[]}"#.to_vec()))
        .await
        .unwrap();
    let root = fs.root().await.unwrap();
    assert_eq!(root.id(), BlockId::new(7));
}

#[tokio::test]
async fn test_missing_root_node() {
    let store = Arc::new(MemoryStore::new());
    store
        .set(ROOT_KEY, Some(encode_root_key(BlockId::new(9)).unwrap()))
        .await
        .unwrap();

    let fs = FS::new(store);
    assert!(matches!(
        fs.root().await,
        Err(Error::CorruptRootNode { .. })
    ));
}
