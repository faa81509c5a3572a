//! A filesystem tree kept in a key-value store.
//!
//! Every directory, file and data block is one record under its own key;
//! the well-known key [`fs::ROOT_KEY`] points at the root directory. Nodes
//! cache their records in memory and write them back when dirty.

pub mod block;
pub mod dir;
pub mod disk;
pub mod error;
pub mod file;
pub mod fs;
pub mod memory;
pub mod node;
pub mod retry;
pub mod store;
pub mod testing;

pub use block::{BLOCK_SIZE, BlockGenerator, BlockId, RandomizedBlockGenerator};
pub use disk::DiskStore;
pub use error::{Error, Result, StoreError};
pub use file::SetAttr;
pub use fs::FS;
pub use memory::MemoryStore;
pub use node::{Attr, DIR_MODE, DirEntry, FILE_MODE, MAX_NAME_LEN, Node, NodeKind};
pub use retry::{RetryPolicy, RetryingStore};
pub use store::{KeyValueStore, StoreRef};

#[cfg(test)]
mod tests;
