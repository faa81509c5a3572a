use std::collections::HashMap;
use std::ops::Deref;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::block::{BLOCK_SIZE, Block, BlockId, DataBlock, Marshal, StorageUnit, block_count};
use crate::error::{Error, Result};
use crate::node::{Attr, Context, FILE_MODE, NodeKind};

/// Persisted form of a file: its size and the ids of its data blocks.
///
/// `blocks.len() == block_count(size)` holds for every stored record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileNode {
    #[serde(flatten)]
    block: Block,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub blocks: Vec<BlockId>,
}

impl FileNode {
    #[must_use]
    pub fn new(block: Block) -> Self {
        Self {
            block,
            size: 0,
            blocks: Vec::new(),
        }
    }

    /// Empty record to be filled by `read`.
    #[must_use]
    pub fn with_id(id: BlockId) -> Self {
        Self::new(Block::new(id))
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.block.name
    }
}

impl Marshal for FileNode {
    fn marshal(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(Error::Encode)
    }

    fn unmarshal(&mut self, bytes: &[u8]) -> Result<()> {
        let decoded: FileNode = serde_json::from_slice(bytes).map_err(Error::Decode)?;
        if decoded.blocks.len() as u64 != block_count(decoded.size) {
            return Err(Error::Decode(serde::de::Error::custom(format!(
                "file of {} bytes lists {} blocks",
                decoded.size,
                decoded.blocks.len()
            ))));
        }
        self.block.name = decoded.block.name;
        self.size = decoded.size;
        self.blocks = decoded.blocks;
        Ok(())
    }
}

impl StorageUnit for FileNode {
    fn block(&self) -> &Block {
        &self.block
    }

    fn block_mut(&mut self) -> &mut Block {
        &mut self.block
    }
}

/// Size change requested by the host; unset fields are left alone.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SetAttr {
    pub size: Option<u64>,
}

/// File record plus the data blocks materialized so far, keyed by id.
struct FileState {
    node: FileNode,
    cache: HashMap<BlockId, DataBlock>,
}

impl FileState {
    fn attr(&self) -> Attr {
        Attr {
            id: self.node.id(),
            kind: NodeKind::File,
            size: self.node.size,
            blocks: self.node.blocks.len() as u64,
            mode: FILE_MODE,
        }
    }

    /// Data block `index`, read from the store on first use.
    ///
    /// `None` when `index` lies past the end of the file.
    async fn get_block(&mut self, index: u64, ctx: &Context) -> Result<Option<&mut DataBlock>> {
        if index >= block_count(self.node.size) {
            return Ok(None);
        }
        let Some(&id) = self.node.blocks.get(index as usize) else {
            return Ok(None);
        };

        if !self.cache.contains_key(&id) {
            diagnostics::log_debug!("Loading block {index} ({id})", index: index, id: id.as_i64());
            let mut data = DataBlock::with_id(id);
            data.read(ctx.store.as_ref()).await?;
            _ = self.cache.insert(id, data);
        }

        Ok(self.cache.get_mut(&id))
    }

    /// Bytes from `offset`, never crossing a block boundary.
    ///
    /// Parts of the block never written read as zeros.
    async fn read(&mut self, offset: u64, len: usize, ctx: &Context) -> Result<Vec<u8>> {
        let size = self.node.size;
        if offset >= size || len == 0 {
            return Ok(Vec::new());
        }

        let index = offset / BLOCK_SIZE;
        let begin = (offset % BLOCK_SIZE) as usize;
        let valid = (size - index * BLOCK_SIZE).min(BLOCK_SIZE) as usize;
        let end = valid.min(begin.saturating_add(len));

        let block = self
            .get_block(index, ctx)
            .await?
            .ok_or(Error::MissingBlock { index })?;

        let mut out = vec![0; end - begin];
        if begin < block.data.len() {
            let stored = block.data.len().min(end);
            out[..stored - begin].copy_from_slice(&block.data[begin..stored]);
        }
        Ok(out)
    }

    /// Splice `data` in at `offset`, growing the file as needed.
    ///
    /// Writes at most up to the end of the block holding `offset` and
    /// returns the number of bytes taken.
    async fn write(&mut self, offset: u64, data: &[u8], ctx: &Context) -> Result<usize> {
        if data.is_empty() {
            return Ok(0);
        }

        let end = offset + data.len() as u64;
        if end > self.node.size {
            self.set_size(end, ctx).await;
        }

        let index = offset / BLOCK_SIZE;
        let begin = (offset % BLOCK_SIZE) as usize;
        let count = (BLOCK_SIZE as usize - begin).min(data.len());

        let block = self
            .get_block(index, ctx)
            .await?
            .ok_or(Error::MissingBlock { index })?;

        if block.data.len() < begin {
            block.data.resize(begin, 0);
        }
        let stop = begin + count;
        if block.data.len() < stop {
            block.data.truncate(begin);
            block.data.extend_from_slice(&data[..count]);
        } else {
            block.data[begin..stop].copy_from_slice(&data[..count]);
        }
        block.mark_dirty();
        self.node.mark_dirty();

        Ok(count)
    }

    /// Resize to `new_size`, allocating or deleting whole blocks.
    ///
    /// Deleting dropped blocks is best effort: failures are logged and the
    /// blocks are left orphaned in the store.
    async fn set_size(&mut self, new_size: u64, ctx: &Context) {
        let old_size = self.node.size;
        let new_count = block_count(new_size) as usize;
        let current = self.node.blocks.len();

        if new_count < current {
            diagnostics::log_debug!("Reducing number of blocks to {count}", count: new_count);
            let dropped: Vec<BlockId> = self.node.blocks.drain(new_count..).collect();
            for id in dropped {
                _ = self.cache.remove(&id);
                if let Err(e) = DataBlock::with_id(id).delete(ctx.store.as_ref()).await {
                    diagnostics::log_warn!("Unable to delete block {id}: {error}", id: id.as_i64(), error: e.to_string());
                }
            }
        } else if new_count > current {
            diagnostics::log_debug!("Increasing number of blocks to {count}", count: new_count);
            for _ in current..new_count {
                let mut data = DataBlock::new(ctx.generator.new_block());
                data.mark_dirty();
                self.node.blocks.push(data.id());
                _ = self.cache.insert(data.id(), data);
            }
        }

        // A shrink that ends inside a block leaves stale bytes in it
        let tail = (new_size % BLOCK_SIZE) as usize;
        if new_size < old_size && tail != 0 {
            match self.get_block(new_size / BLOCK_SIZE, ctx).await {
                Ok(Some(block)) if block.data.len() > tail => {
                    block.data.truncate(tail);
                    block.mark_dirty();
                }
                Ok(_) => {}
                Err(e) => {
                    diagnostics::log_warn!("Unable to trim last block: {error}", error: e.to_string());
                }
            }
        }

        self.node.size = new_size;
        self.node.mark_dirty();
    }

    /// Write every dirty cached block, then the file record.
    ///
    /// Block write failures are logged and skipped; the block stays cached
    /// and dirty for the next flush. Written blocks leave the cache.
    async fn flush(&mut self, ctx: &Context) -> Result<()> {
        let store = ctx.store.as_ref();
        let dirty: Vec<BlockId> = self
            .cache
            .iter()
            .filter(|(_, block)| block.is_dirty())
            .map(|(id, _)| *id)
            .collect();

        for id in dirty {
            let Some(block) = self.cache.get_mut(&id) else {
                continue;
            };
            match block.write(store).await {
                Ok(()) => {
                    _ = self.cache.remove(&id);
                }
                Err(e) => {
                    diagnostics::log_warn!("Unable to write block {id} due to error: {error}", id: id.as_i64(), error: e.to_string());
                }
            }
        }

        self.node.write(store).await
    }
}

/// In-memory file: the record and block cache behind one lock.
pub struct File {
    id: BlockId,
    state: Mutex<FileState>,
    ctx: Arc<Context>,
}

impl File {
    pub(crate) fn new(node: FileNode, ctx: Arc<Context>) -> Self {
        Self {
            id: node.id(),
            state: Mutex::new(FileState {
                node,
                cache: HashMap::new(),
            }),
            ctx,
        }
    }
}

impl Drop for File {
    fn drop(&mut self) {
        self.ctx.release(self.id);
    }
}

/// A handle for a refcounted file.
#[derive(Clone)]
pub struct Handle(Arc<File>);

impl Handle {
    pub(crate) fn from_arc(file: Arc<File>) -> Self {
        Self(file)
    }

    #[must_use]
    pub fn id(&self) -> BlockId {
        self.id
    }

    pub async fn name(&self) -> String {
        self.state.lock().await.node.name().to_string()
    }

    pub async fn attr(&self) -> Attr {
        self.state.lock().await.attr()
    }

    pub async fn size(&self) -> u64 {
        self.state.lock().await.node.size
    }

    /// Copy of the current record.
    pub async fn snapshot(&self) -> FileNode {
        self.state.lock().await.node.clone()
    }

    /// Read up to `len` bytes at `offset`, within a single block.
    ///
    /// Returns an empty buffer at or past the end of the file. Callers
    /// wanting more than one block loop, or use [`Handle::read_to_end`].
    pub async fn read(&self, offset: u64, len: usize) -> Result<Vec<u8>> {
        self.state.lock().await.read(offset, len, &self.ctx).await
    }

    /// Write `data` at `offset`, within a single block.
    ///
    /// Returns how many leading bytes of `data` were written. Callers loop
    /// for the rest, or use [`Handle::write_all`].
    pub async fn write(&self, offset: u64, data: &[u8]) -> Result<usize> {
        self.state.lock().await.write(offset, data, &self.ctx).await
    }

    /// Truncate or extend the file.
    pub async fn set_size(&self, size: u64) {
        self.state.lock().await.set_size(size, &self.ctx).await;
    }

    /// Apply a size change and write it back before returning.
    pub async fn setattr(&self, req: SetAttr) -> Result<Attr> {
        let mut state = self.state.lock().await;
        if let Some(size) = req.size {
            if size != state.node.size {
                state.set_size(size, &self.ctx).await;
                state.flush(&self.ctx).await?;
            }
        }
        Ok(state.attr())
    }

    pub async fn flush(&self) -> Result<()> {
        diagnostics::log_debug!("flush file {id}", id: self.id.as_i64());
        self.state.lock().await.flush(&self.ctx).await
    }

    pub async fn fsync(&self) -> Result<()> {
        self.flush().await
    }

    /// The whole content, block by block.
    pub async fn read_to_end(&self) -> Result<Vec<u8>> {
        let mut state = self.state.lock().await;
        let size = state.node.size;
        let mut out = Vec::with_capacity(size as usize);
        while (out.len() as u64) < size {
            let chunk = state
                .read(out.len() as u64, BLOCK_SIZE as usize, &self.ctx)
                .await?;
            if chunk.is_empty() {
                break;
            }
            out.extend_from_slice(&chunk);
        }
        Ok(out)
    }

    /// Write all of `data` at `offset`, block by block.
    pub async fn write_all(&self, offset: u64, data: &[u8]) -> Result<()> {
        let mut state = self.state.lock().await;
        let mut done = 0;
        while done < data.len() {
            done += state
                .write(offset + done as u64, &data[done..], &self.ctx)
                .await?;
        }
        Ok(())
    }

    /// Lifecycle hints from the host; logged only.
    #[must_use]
    pub fn open(&self) -> Handle {
        diagnostics::log_debug!("open file {id}", id: self.id.as_i64());
        self.clone()
    }

    pub fn release(&self) {
        diagnostics::log_debug!("release file {id}", id: self.id.as_i64());
    }

    pub fn forget(&self) {
        diagnostics::log_debug!("forget file {id}", id: self.id.as_i64());
    }

    /// Number of data blocks currently held in memory.
    pub async fn cached_blocks(&self) -> usize {
        self.state.lock().await.cache.len()
    }
}

impl Deref for Handle {
    type Target = File;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl PartialEq for Handle {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl std::fmt::Debug for Handle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "(file {})", self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use crate::testing::{Call, CountingStore, FaultyStore, SequentialBlockGenerator};

    fn test_ctx(store: crate::store::StoreRef) -> Arc<Context> {
        Context::new(store, Arc::new(SequentialBlockGenerator::starting_at(100)))
    }

    fn new_state(id: i64) -> FileState {
        FileState {
            node: FileNode::with_id(BlockId::new(id)),
            cache: HashMap::new(),
        }
    }

    fn pattern(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8).collect()
    }

    #[test]
    fn test_file_node_roundtrip() {
        let mut node = FileNode::new(Block::named(BlockId::new(9), "f"));
        node.size = 5000;
        node.blocks = vec![BlockId::new(1), BlockId::new(2)];

        let mut decoded = FileNode::with_id(BlockId::new(9));
        decoded.unmarshal(&node.marshal().unwrap()).unwrap();
        assert_eq!(decoded, node);
    }

    #[test]
    fn test_file_node_rejects_inconsistent_block_list() {
        let bytes = br#"{"name":"f","id":9,"size":5000,"blocks":[1]}"#;
        let mut node = FileNode::with_id(BlockId::new(9));
        assert!(matches!(node.unmarshal(bytes), Err(Error::Decode(_))));
    }

    #[tokio::test]
    async fn test_set_size_allocates_and_deletes() {
        let store = Arc::new(CountingStore::new(MemoryStore::new()));
        let ctx = test_ctx(store.clone());
        let mut state = new_state(1);

        state.set_size(4095, &ctx).await;
        assert_eq!(state.node.blocks, vec![BlockId::new(100)]);

        state.set_size(12288, &ctx).await;
        assert_eq!(state.node.blocks.len(), 3);
        assert_eq!(store.sets(), 0);

        // Same block count, nothing allocated or deleted
        state.set_size(10000, &ctx).await;
        assert_eq!(state.node.blocks.len(), 3);
        assert_eq!(store.deletes(), 0);

        state.set_size(4096, &ctx).await;
        assert_eq!(state.node.blocks, vec![BlockId::new(100)]);
        assert_eq!(
            store.calls(),
            vec![Call::Delete("101".into()), Call::Delete("102".into())]
        );
        assert_eq!(state.cache.len(), 1);
        assert!(state.node.is_dirty());
    }

    #[tokio::test]
    async fn test_set_size_survives_delete_failure() {
        let store = Arc::new(FaultyStore::new(MemoryStore::new()));
        let ctx = test_ctx(store.clone());
        let mut state = new_state(1);

        state.set_size(3 * BLOCK_SIZE, &ctx).await;
        store.fail_key("101");
        state.set_size(BLOCK_SIZE, &ctx).await;

        assert_eq!(state.node.size, BLOCK_SIZE);
        assert_eq!(state.node.blocks.len(), 1);
    }

    #[tokio::test]
    async fn test_write_splices_within_block() {
        let ctx = test_ctx(Arc::new(MemoryStore::new()));
        let mut state = new_state(1);
        let data = pattern(4096);

        assert_eq!(state.write(0, &data[..1000], &ctx).await.unwrap(), 1000);
        assert_eq!(state.node.size, 1000);

        assert_eq!(state.write(0, &data, &ctx).await.unwrap(), 4096);
        assert_eq!(state.node.size, 4096);

        // Overwrite bytes 200..300, keeping what follows
        let patch = vec![0xAA; 100];
        assert_eq!(state.write(200, &patch, &ctx).await.unwrap(), 100);
        assert_eq!(state.node.size, 4096);

        let block = state.get_block(0, &ctx).await.unwrap().unwrap();
        assert_eq!(block.data.len(), 4096);
        assert_eq!(&block.data[..200], &data[..200]);
        assert_eq!(&block.data[200..300], &patch[..]);
        assert_eq!(&block.data[300..], &data[300..]);
    }

    #[tokio::test]
    async fn test_write_stops_at_block_boundary() {
        let ctx = test_ctx(Arc::new(MemoryStore::new()));
        let mut state = new_state(1);
        let data = pattern(200);

        let written = state.write(BLOCK_SIZE - 50, &data, &ctx).await.unwrap();
        assert_eq!(written, 50);
        // The file already covers the whole request
        assert_eq!(state.node.size, BLOCK_SIZE + 150);
        assert_eq!(state.node.blocks.len(), 2);
    }

    #[tokio::test]
    async fn test_read_holes_and_bounds() {
        let ctx = test_ctx(Arc::new(MemoryStore::new()));
        let mut state = new_state(1);

        state.set_size(100, &ctx).await;
        assert_eq!(state.read(0, 1000, &ctx).await.unwrap(), vec![0; 100]);
        assert!(state.read(100, 10, &ctx).await.unwrap().is_empty());
        assert!(state.read(5000, 10, &ctx).await.unwrap().is_empty());

        _ = state.write(10, b"abc", &ctx).await.unwrap();
        assert_eq!(state.read(9, 5, &ctx).await.unwrap(), b"\0abc\0");
    }

    #[tokio::test]
    async fn test_shrink_trims_tail() {
        let ctx = test_ctx(Arc::new(MemoryStore::new()));
        let mut state = new_state(1);

        _ = state.write(0, &[7; 100], &ctx).await.unwrap();
        state.set_size(10, &ctx).await;
        state.set_size(100, &ctx).await;

        let content = state.read(0, 100, &ctx).await.unwrap();
        assert_eq!(&content[..10], &[7; 10]);
        assert_eq!(&content[10..], &[0; 90][..]);
    }

    #[tokio::test]
    async fn test_flush_writes_blocks_before_record() {
        let store = Arc::new(CountingStore::new(MemoryStore::new()));
        let ctx = test_ctx(store.clone());
        let mut state = new_state(1);

        _ = state.write(0, &pattern(1000), &ctx).await.unwrap();
        state.flush(&ctx).await.unwrap();

        assert_eq!(
            store.calls(),
            vec![Call::Set("100".into()), Call::Set("1".into())]
        );
        assert!(state.cache.is_empty());
        assert!(!state.node.is_dirty());

        // Nothing dirty, nothing written
        store.reset();
        state.flush(&ctx).await.unwrap();
        assert_eq!(store.sets(), 0);

        // Evicted blocks come back from the store
        assert_eq!(state.read(0, 1000, &ctx).await.unwrap(), pattern(1000));
        assert_eq!(store.calls(), vec![Call::Get("100".into())]);
    }

    #[tokio::test]
    async fn test_flush_is_best_effort_for_blocks() {
        let store = Arc::new(FaultyStore::new(MemoryStore::new()));
        let ctx = test_ctx(store.clone());
        let mut state = new_state(1);

        state.set_size(2 * BLOCK_SIZE, &ctx).await;
        store.fail_key("100");
        state.flush(&ctx).await.unwrap();

        // The failed block stays cached and dirty, the other was written
        assert_eq!(state.cache.len(), 1);
        assert!(state.cache[&BlockId::new(100)].is_dirty());
        assert!(store.inner().contains_key("101"));
        assert!(store.inner().contains_key("1"));

        store.heal();
        state.flush(&ctx).await.unwrap();
        assert!(state.cache.is_empty());
        assert!(store.inner().contains_key("100"));
    }

    #[tokio::test]
    async fn test_flush_reports_record_failure() {
        let store = Arc::new(FaultyStore::new(MemoryStore::new()));
        let ctx = test_ctx(store.clone());
        let mut state = new_state(1);

        _ = state.write(0, b"x", &ctx).await.unwrap();
        store.fail_key("1");
        let err = state.flush(&ctx).await.unwrap_err();
        assert!(err.is_io());
        assert!(state.node.is_dirty());
    }
}
