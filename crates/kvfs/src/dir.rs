use std::ops::Deref;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::block::{Block, BlockId, Marshal, StorageUnit};
use crate::error::{Error, Result};
use crate::file::{self, FileNode};
use crate::node::{Attr, Context, DIR_MODE, DirEntry, MAX_NAME_LEN, Node, NodeKind};

/// Named reference from a directory to a child record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChildRef {
    pub name: String,
    pub id: BlockId,
}

impl From<&Block> for ChildRef {
    fn from(block: &Block) -> Self {
        Self {
            name: block.name.clone(),
            id: block.id,
        }
    }
}

/// Persisted form of a directory: two ordered entry lists.
///
/// Names are unique across both lists; insertion order is the listing order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryNode {
    #[serde(flatten)]
    block: Block,
    #[serde(default)]
    pub dirs: Vec<ChildRef>,
    #[serde(default)]
    pub files: Vec<ChildRef>,
}

impl DirectoryNode {
    #[must_use]
    pub fn new(block: Block) -> Self {
        Self {
            block,
            dirs: Vec::new(),
            files: Vec::new(),
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

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.dirs.is_empty() && self.files.is_empty()
    }
}

impl Marshal for DirectoryNode {
    fn marshal(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(Error::Encode)
    }

    fn unmarshal(&mut self, bytes: &[u8]) -> Result<()> {
        let decoded: DirectoryNode = serde_json::from_slice(bytes).map_err(Error::Decode)?;
        // The key the record was read from stays authoritative for the id
        self.block.name = decoded.block.name;
        self.dirs = decoded.dirs;
        self.files = decoded.files;
        Ok(())
    }
}

impl StorageUnit for DirectoryNode {
    fn block(&self) -> &Block {
        &self.block
    }

    fn block_mut(&mut self) -> &mut Block {
        &mut self.block
    }
}

/// In-memory directory: the record plus the lock guarding its entry lists.
pub struct Directory {
    id: BlockId,
    state: RwLock<DirectoryNode>,
    ctx: Arc<Context>,
}

impl Directory {
    pub(crate) fn new(node: DirectoryNode, ctx: Arc<Context>) -> Self {
        Self {
            id: node.id(),
            state: RwLock::new(node),
            ctx,
        }
    }
}

impl Drop for Directory {
    fn drop(&mut self) {
        self.ctx.release(self.id);
    }
}

/// A handle for a refcounted directory.
#[derive(Clone)]
pub struct Handle(Arc<Directory>);

/// Result of scanning a directory for a name.
struct Found {
    kind: NodeKind,
    position: usize,
    node: Node,
}

fn check_name(name: &str) -> Result<()> {
    if name.is_empty() || name == "." || name == ".." || name.contains('/') {
        return Err(Error::invalid_path(name));
    }
    if name.len() > MAX_NAME_LEN {
        return Err(Error::name_too_long(name));
    }
    Ok(())
}

impl Handle {
    pub(crate) fn from_arc(dir: Arc<Directory>) -> Self {
        Self(dir)
    }

    #[must_use]
    pub fn id(&self) -> BlockId {
        self.id
    }

    pub async fn name(&self) -> String {
        self.state.read().await.name().to_string()
    }

    #[must_use]
    pub fn attr(&self) -> Attr {
        Attr {
            id: self.id,
            kind: NodeKind::Directory,
            size: 0,
            blocks: 0,
            mode: DIR_MODE,
        }
    }

    pub async fn is_empty(&self) -> bool {
        self.state.read().await.is_empty()
    }

    /// Copy of the current record.
    pub async fn snapshot(&self) -> DirectoryNode {
        self.state.read().await.clone()
    }

    /// Find `name` among the entries and materialize it.
    pub async fn lookup(&self, name: &str) -> Result<Node> {
        let state = self.state.read().await;
        Ok(self.lookup_unlocked(&state, name).await?.node)
    }

    /// Scan subdirectories, then files, for an exact match.
    ///
    /// The caller holds this directory's lock in either mode.
    async fn lookup_unlocked(&self, state: &DirectoryNode, name: &str) -> Result<Found> {
        if let Some(position) = state.dirs.iter().position(|e| e.name == name) {
            let dir = self.ctx.load_directory(state.dirs[position].id).await?;
            return Ok(Found {
                kind: NodeKind::Directory,
                position,
                node: Node::Directory(dir),
            });
        }

        if let Some(position) = state.files.iter().position(|e| e.name == name) {
            let file = self.ctx.load_file(state.files[position].id).await?;
            return Ok(Found {
                kind: NodeKind::File,
                position,
                node: Node::File(file),
            });
        }

        Err(Error::not_found(name))
    }

    /// Fail unless `name` is free, judged on the entry lists alone.
    ///
    /// Must run under the write lock: this is where concurrent creators of
    /// the same name are ordered.
    fn ensure_absent(state: &DirectoryNode, name: &str) -> Result<()> {
        if state.dirs.iter().chain(&state.files).any(|e| e.name == name) {
            return Err(Error::already_exists(name));
        }
        Ok(())
    }

    /// Create an empty subdirectory.
    pub async fn mkdir(&self, name: &str) -> Result<Handle> {
        check_name(name)?;
        let store = self.ctx.store.as_ref();

        let mut state = self.state.write().await;
        Self::ensure_absent(&state, name)?;

        let block = self.ctx.generator.new_named_block(name);
        let mut child = DirectoryNode::new(block.clone());
        child.mark_dirty();
        child.write(store).await?;

        state.dirs.push(ChildRef::from(&block));
        state.mark_dirty();
        if let Err(e) = state.write(store).await {
            // The child record is already stored and is left orphaned
            _ = state.dirs.pop();
            return Err(e);
        }

        diagnostics::log_debug!("mkdir {name} as {id}", name: name, id: block.id.as_i64());
        Ok(self.ctx.adopt_directory(child))
    }

    /// Create an empty file.
    pub async fn create(&self, name: &str) -> Result<file::Handle> {
        check_name(name)?;
        let store = self.ctx.store.as_ref();

        let mut state = self.state.write().await;
        Self::ensure_absent(&state, name)?;

        let block = self.ctx.generator.new_named_block(name);
        let mut child = FileNode::new(block.clone());
        child.mark_dirty();
        child.write(store).await?;

        state.files.push(ChildRef::from(&block));
        state.mark_dirty();
        if let Err(e) = state.write(store).await {
            _ = state.files.pop();
            return Err(e);
        }

        diagnostics::log_debug!("create {name} as {id}", name: name, id: block.id.as_i64());
        Ok(self.ctx.adopt_file(child))
    }

    /// Unlink a file or an empty subdirectory.
    ///
    /// The child's own records stay in the store.
    pub async fn remove(&self, name: &str) -> Result<()> {
        check_name(name)?;
        let store = self.ctx.store.as_ref();

        let mut state = self.state.write().await;
        let found = self.lookup_unlocked(&state, name).await?;

        let removed = match (&found.kind, &found.node) {
            (NodeKind::Directory, Node::Directory(child)) => {
                // Lock order is always parent, then child
                if !child.is_empty().await {
                    return Err(Error::directory_not_empty(name));
                }
                state.dirs.remove(found.position)
            }
            _ => state.files.remove(found.position),
        };

        state.mark_dirty();
        if let Err(e) = state.write(store).await {
            match found.kind {
                NodeKind::Directory => state.dirs.insert(found.position, removed),
                NodeKind::File => state.files.insert(found.position, removed),
            }
            return Err(e);
        }

        diagnostics::log_debug!("removed {kind} {name}", kind: found.kind.to_string(), name: name);
        Ok(())
    }

    /// Entries in listing order: subdirectories, then files.
    ///
    /// Children are not read from the store.
    pub async fn list(&self) -> Vec<DirEntry> {
        let state = self.state.read().await;
        let dirs = state.dirs.iter().map(|e| DirEntry {
            name: e.name.clone(),
            id: e.id,
            kind: NodeKind::Directory,
        });
        let files = state.files.iter().map(|e| DirEntry {
            name: e.name.clone(),
            id: e.id,
            kind: NodeKind::File,
        });
        dirs.chain(files).collect()
    }

    pub fn forget(&self) {
        diagnostics::log_debug!("forget directory {id}", id: self.id.as_i64());
    }
}

impl Deref for Handle {
    type Target = Directory;

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
        write!(f, "(directory {})", self.id)
    }
}
