use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};

use crate::block::{BlockGenerator, BlockId, StorageUnit};
use crate::dir::{self, Directory, DirectoryNode};
use crate::error::Result;
use crate::file::{self, File, FileNode};
use crate::store::StoreRef;

/// Mode bits reported for directories.
pub const DIR_MODE: u32 = 0o555;

/// Mode bits reported for files.
pub const FILE_MODE: u32 = 0o444;

/// Longest accepted entry name, in bytes.
pub const MAX_NAME_LEN: usize = 255;

/// Kind of a directory entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Directory,
    File,
}

impl std::fmt::Display for NodeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NodeKind::Directory => write!(f, "directory"),
            NodeKind::File => write!(f, "file"),
        }
    }
}

/// A materialized filesystem node.
#[derive(Clone, Debug)]
pub enum Node {
    Directory(dir::Handle),
    File(file::Handle),
}

impl Node {
    #[must_use]
    pub fn id(&self) -> BlockId {
        match self {
            Node::Directory(d) => d.id(),
            Node::File(f) => f.id(),
        }
    }

    #[must_use]
    pub fn kind(&self) -> NodeKind {
        match self {
            Node::Directory(_) => NodeKind::Directory,
            Node::File(_) => NodeKind::File,
        }
    }

    pub async fn attr(&self) -> Attr {
        match self {
            Node::Directory(d) => d.attr(),
            Node::File(f) => f.attr().await,
        }
    }

    #[must_use]
    pub fn as_dir(&self) -> Option<&dir::Handle> {
        match self {
            Node::Directory(d) => Some(d),
            Node::File(_) => None,
        }
    }

    #[must_use]
    pub fn as_file(&self) -> Option<&file::Handle> {
        match self {
            Node::File(f) => Some(f),
            Node::Directory(_) => None,
        }
    }

    /// Lifecycle hint from the host; logged only.
    pub fn forget(&self) {
        match self {
            Node::Directory(d) => d.forget(),
            Node::File(f) => f.forget(),
        }
    }
}

/// Attributes reported to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Attr {
    pub id: BlockId,
    pub kind: NodeKind,
    pub size: u64,
    pub blocks: u64,
    pub mode: u32,
}

/// One row of a directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    pub id: BlockId,
    pub kind: NodeKind,
}

enum LiveNode {
    Directory(Weak<Directory>),
    File(Weak<File>),
}

impl LiveNode {
    fn is_dead(&self) -> bool {
        match self {
            LiveNode::Directory(w) => w.strong_count() == 0,
            LiveNode::File(w) => w.strong_count() == 0,
        }
    }
}

/// State shared by every node of one filesystem.
///
/// Nodes hold this instead of a reference to their parent. It also tracks
/// the nodes currently in memory, so that two lookups of the same entry
/// share one lock and one block cache.
pub(crate) struct Context {
    pub(crate) store: StoreRef,
    pub(crate) generator: Arc<dyn BlockGenerator>,
    live: Mutex<HashMap<BlockId, LiveNode>>,
}

impl Context {
    pub(crate) fn new(store: StoreRef, generator: Arc<dyn BlockGenerator>) -> Arc<Self> {
        Arc::new(Self {
            store,
            generator,
            live: Mutex::new(HashMap::new()),
        })
    }

    fn live_directory(&self, id: BlockId) -> Option<dir::Handle> {
        let live = self.live.lock().ok()?;
        match live.get(&id) {
            Some(LiveNode::Directory(w)) => w.upgrade().map(dir::Handle::from_arc),
            _ => None,
        }
    }

    fn live_file(&self, id: BlockId) -> Option<file::Handle> {
        let live = self.live.lock().ok()?;
        match live.get(&id) {
            Some(LiveNode::File(w)) => w.upgrade().map(file::Handle::from_arc),
            _ => None,
        }
    }

    /// Wrap a directory record in a handle, unless one is already live.
    pub(crate) fn adopt_directory(self: &Arc<Self>, node: DirectoryNode) -> dir::Handle {
        let id = node.id();
        let Ok(mut live) = self.live.lock() else {
            return dir::Handle::from_arc(Arc::new(Directory::new(node, self.clone())));
        };
        if let Some(LiveNode::Directory(w)) = live.get(&id) {
            if let Some(existing) = w.upgrade() {
                return dir::Handle::from_arc(existing);
            }
        }
        let dir = Arc::new(Directory::new(node, self.clone()));
        _ = live.insert(id, LiveNode::Directory(Arc::downgrade(&dir)));
        dir::Handle::from_arc(dir)
    }

    /// Wrap a file record in a handle, unless one is already live.
    pub(crate) fn adopt_file(self: &Arc<Self>, node: FileNode) -> file::Handle {
        let id = node.id();
        let Ok(mut live) = self.live.lock() else {
            return file::Handle::from_arc(Arc::new(File::new(node, self.clone())));
        };
        if let Some(LiveNode::File(w)) = live.get(&id) {
            if let Some(existing) = w.upgrade() {
                return file::Handle::from_arc(existing);
            }
        }
        let file = Arc::new(File::new(node, self.clone()));
        _ = live.insert(id, LiveNode::File(Arc::downgrade(&file)));
        file::Handle::from_arc(file)
    }

    /// Live handle for `id`, or a fresh one read from the store.
    pub(crate) async fn load_directory(self: &Arc<Self>, id: BlockId) -> Result<dir::Handle> {
        if let Some(dir) = self.live_directory(id) {
            return Ok(dir);
        }
        diagnostics::log_debug!("Reading directory {id}", id: id.as_i64());
        let mut node = DirectoryNode::with_id(id);
        node.read(self.store.as_ref()).await?;
        Ok(self.adopt_directory(node))
    }

    /// Live handle for `id`, or a fresh one read from the store.
    pub(crate) async fn load_file(self: &Arc<Self>, id: BlockId) -> Result<file::Handle> {
        if let Some(file) = self.live_file(id) {
            return Ok(file);
        }
        diagnostics::log_debug!("Reading file {id}", id: id.as_i64());
        let mut node = FileNode::with_id(id);
        node.read(self.store.as_ref()).await?;
        Ok(self.adopt_file(node))
    }

    /// Called as a node's last handle goes away.
    pub(crate) fn release(&self, id: BlockId) {
        if let Ok(mut live) = self.live.lock() {
            if live.get(&id).is_some_and(LiveNode::is_dead) {
                _ = live.remove(&id);
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn live_count(&self) -> usize {
        self.live.lock().map(|l| l.len()).unwrap_or(0)
    }
}
