//! Storage units: the records the filesystem persists, one per key.
//!
//! Directories, files and data blocks all embed a [`Block`] carrying their
//! identifier and dirty flag, and implement [`StorageUnit`] to move
//! themselves in and out of a [`KeyValueStore`].

use crate::error::{Error, Result};
use crate::store::KeyValueStore;
use async_trait::async_trait;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Size of one data block in bytes.
pub const BLOCK_SIZE: u64 = 4096;

/// Number of data blocks needed to hold `size` bytes.
#[must_use]
pub fn block_count(size: u64) -> u64 {
    size.div_ceil(BLOCK_SIZE)
}

/// Identifier of a storage unit; its decimal form is the backend key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlockId(i64);

impl BlockId {
    #[must_use]
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    #[must_use]
    pub fn as_i64(self) -> i64 {
        self.0
    }

    /// Backend key for this identifier.
    #[must_use]
    pub fn key(self) -> String {
        self.0.to_string()
    }
}

impl std::fmt::Display for BlockId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity and write-back state shared by every storage unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Block {
    #[serde(default)]
    pub name: String,
    pub id: BlockId,
    #[serde(skip)]
    dirty: bool,
}

impl Block {
    #[must_use]
    pub fn new(id: BlockId) -> Self {
        Self::named(id, "")
    }

    #[must_use]
    pub fn named<S: Into<String>>(id: BlockId, name: S) -> Self {
        Self {
            name: name.into(),
            id,
            dirty: false,
        }
    }
}

// The dirty flag is in-memory state only
impl PartialEq for Block {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.name == other.name
    }
}

impl Eq for Block {}

/// Produces identifiers for new storage units.
pub trait BlockGenerator: Send + Sync {
    /// A fresh unnamed block.
    fn new_block(&self) -> Block;

    /// A fresh block carrying a directory entry name.
    fn new_named_block(&self, name: &str) -> Block;
}

/// Draws identifiers uniformly from the non-negative `i64` range.
///
/// Uniqueness is not checked. With 2^63 possible values the chance of any
/// collision is about 5e-8 among a million live units and about 5% among a
/// billion.
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomizedBlockGenerator;

impl RandomizedBlockGenerator {
    fn next_id() -> BlockId {
        BlockId(rand::thread_rng().gen_range(0..=i64::MAX))
    }
}

impl BlockGenerator for RandomizedBlockGenerator {
    fn new_block(&self) -> Block {
        Block::new(Self::next_id())
    }

    fn new_named_block(&self, name: &str) -> Block {
        Block::named(Self::next_id(), name)
    }
}

/// Conversion of a unit's payload to and from its stored bytes.
pub trait Marshal {
    fn marshal(&self) -> Result<Vec<u8>>;

    fn unmarshal(&mut self, bytes: &[u8]) -> Result<()>;
}

/// A record addressable by id that reads and writes itself through a store.
#[async_trait]
pub trait StorageUnit: Marshal + Send + Sync {
    fn block(&self) -> &Block;

    fn block_mut(&mut self) -> &mut Block;

    fn id(&self) -> BlockId {
        self.block().id
    }

    fn mark_dirty(&mut self) {
        self.block_mut().dirty = true;
    }

    fn is_dirty(&self) -> bool {
        self.block().dirty
    }

    /// Persist the unit. A clean unit is not written at all.
    ///
    /// On failure the dirty flag stays set so the write can be retried.
    async fn write(&mut self, store: &dyn KeyValueStore) -> Result<()> {
        if !self.is_dirty() {
            return Ok(());
        }

        let key = self.id().key();
        let encoded = self.marshal()?;
        store
            .set(&key, Some(encoded))
            .await
            .map_err(|e| Error::backend_write(&key, e))?;

        self.block_mut().dirty = false;
        Ok(())
    }

    /// Replace the unit's payload with the stored copy, leaving it clean.
    ///
    /// An absent key decodes from empty bytes.
    async fn read(&mut self, store: &dyn KeyValueStore) -> Result<()> {
        let key = self.id().key();
        let encoded = store
            .get(&key, true)
            .await
            .map_err(|e| Error::backend_read(&key, e))?;

        self.unmarshal(encoded.as_deref().unwrap_or_default())?;
        self.block_mut().dirty = false;
        Ok(())
    }

    /// Remove the unit's key from the store.
    async fn delete(&self, store: &dyn KeyValueStore) -> Result<()> {
        let key = self.id().key();
        store
            .set(&key, None)
            .await
            .map_err(|e| Error::backend_write(&key, e))
    }
}

/// One fragment of file content; stored as the raw bytes with no envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataBlock {
    block: Block,
    pub data: Vec<u8>,
}

impl DataBlock {
    #[must_use]
    pub fn new(block: Block) -> Self {
        Self {
            block,
            data: Vec::new(),
        }
    }

    /// Handle for reading an existing block.
    #[must_use]
    pub fn with_id(id: BlockId) -> Self {
        Self::new(Block::new(id))
    }
}

impl Marshal for DataBlock {
    fn marshal(&self) -> Result<Vec<u8>> {
        Ok(self.data.clone())
    }

    fn unmarshal(&mut self, bytes: &[u8]) -> Result<()> {
        self.data = bytes.to_vec();
        Ok(())
    }
}

impl StorageUnit for DataBlock {
    fn block(&self) -> &Block {
        &self.block
    }

    fn block_mut(&mut self) -> &mut Block {
        &mut self.block
    }
}
