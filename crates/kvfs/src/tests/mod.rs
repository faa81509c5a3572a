mod bootstrap;

use std::sync::Arc;

use crate::fs::FS;
use crate::memory::MemoryStore;
use crate::store::StoreRef;
use crate::testing::SequentialBlockGenerator;

/// Filesystem whose block ids are 1, 2, 3, ... in allocation order.
fn sequential_fs(store: StoreRef) -> FS {
    FS::with_generator(store, Arc::new(SequentialBlockGenerator::new()))
}

/// Second instance over the same store, continuing the id sequence.
fn reopen(store: StoreRef, next_id: i64) -> FS {
    FS::with_generator(store, Arc::new(SequentialBlockGenerator::starting_at(next_id)))
}

fn memory_fs() -> (Arc<MemoryStore>, FS) {
    let store = Arc::new(MemoryStore::new());
    let fs = sequential_fs(store.clone());
    (store, fs)
}

fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}
