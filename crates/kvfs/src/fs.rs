use std::sync::Arc;

use tokio::sync::OnceCell;

use crate::block::{BlockGenerator, BlockId, RandomizedBlockGenerator, StorageUnit};
use crate::dir::{self, DirectoryNode};
use crate::error::{Error, Result};
use crate::node::{Context, Node};
use crate::store::StoreRef;

/// Well-known key holding the encoded id of the root directory.
pub const ROOT_KEY: &str = "ROOT";

/// Size of the buffer the root id is encoded into.
pub const ROOT_KEY_LEN: usize = 80;

/// Name given to a freshly created root directory.
const ROOT_NAME: &str = "/";

/// Encode a root id as a signed varint at the start of a fixed buffer.
pub fn encode_root_key(id: BlockId) -> Result<Vec<u8>> {
    let mut buffer = vec![0u8; ROOT_KEY_LEN];
    _ = postcard::to_slice(&id.as_i64(), &mut buffer).map_err(Error::CorruptRootKey)?;
    Ok(buffer)
}

/// Decode the leading varint of a root key value; trailing bytes are ignored.
pub fn decode_root_key(bytes: &[u8]) -> Result<BlockId> {
    let (id, _rest) = postcard::take_from_bytes::<i64>(bytes).map_err(Error::CorruptRootKey)?;
    Ok(BlockId::new(id))
}

/// Main filesystem structure
///
/// Owns the backend handle and the cached root. The root is resolved on the
/// first call to [`FS::root`]; concurrent first callers wait for one
/// bootstrap, and a failed bootstrap leaves nothing cached.
pub struct FS {
    ctx: Arc<Context>,
    root: OnceCell<dir::Handle>,
}

impl FS {
    /// Filesystem over `store` with randomly drawn block ids.
    pub fn new(store: StoreRef) -> Self {
        Self::with_generator(store, Arc::new(RandomizedBlockGenerator))
    }

    pub fn with_generator(store: StoreRef, generator: Arc<dyn BlockGenerator>) -> Self {
        Self {
            ctx: Context::new(store, generator),
            root: OnceCell::new(),
        }
    }

    #[must_use]
    pub fn store(&self) -> &StoreRef {
        &self.ctx.store
    }

    /// The root directory, created in the store if it does not exist yet.
    pub async fn root(&self) -> Result<dir::Handle> {
        self.root
            .get_or_try_init(|| self.resolve_root())
            .await
            .cloned()
    }

    async fn resolve_root(&self) -> Result<dir::Handle> {
        let store = self.ctx.store.as_ref();
        let existing = store.get(ROOT_KEY, true).await.map_err(|e| {
            diagnostics::log_error!("Unable to read root key: {error}", error: e.to_string());
            Error::backend_read(ROOT_KEY, e)
        })?;

        match existing {
            None => self.create_root().await,
            Some(bytes) => self.load_root(&bytes).await,
        }
    }

    async fn create_root(&self) -> Result<dir::Handle> {
        let store = self.ctx.store.as_ref();
        let mut root = DirectoryNode::new(self.ctx.generator.new_named_block(ROOT_NAME));
        let id = root.id();

        root.mark_dirty();
        if let Err(e) = root.write(store).await {
            diagnostics::log_error!("Error while creating root node: {error}", error: e.to_string());
            return Err(e);
        }

        let key = encode_root_key(id)?;
        if let Err(e) = store.set(ROOT_KEY, Some(key)).await {
            diagnostics::log_error!("Error while creating root key: {error}", error: e.to_string());
            return Err(Error::backend_write(ROOT_KEY, e));
        }

        diagnostics::log_info!("Created root directory {id}", id: id.as_i64());
        Ok(self.ctx.adopt_directory(root))
    }

    async fn load_root(&self, bytes: &[u8]) -> Result<dir::Handle> {
        let id = decode_root_key(bytes).inspect_err(|e| {
            diagnostics::log_error!("Error while decoding root key: {error}", error: e.to_string());
        })?;

        let root = self.ctx.load_directory(id).await.map_err(|e| {
            diagnostics::log_error!("Error while loading root {id}: {error}", id: id.as_i64(), error: e.to_string());
            Error::CorruptRootNode {
                id,
                source: Box::new(e),
            }
        })?;

        diagnostics::log_info!("Loaded root directory {id}", id: id.as_i64());
        Ok(root)
    }

    #[cfg(test)]
    pub(crate) fn live_count(&self) -> usize {
        self.ctx.live_count()
    }

    /// Walk an absolute path from the root.
    pub async fn resolve(&self, path: &str) -> Result<Node> {
        let parts = split_path(path)?;
        let mut node = Node::Directory(self.root().await?);
        for (depth, name) in parts.iter().enumerate() {
            let Node::Directory(dir) = &node else {
                return Err(Error::not_a_directory(join(&parts[..depth])));
            };
            node = dir.lookup(name).await?;
        }
        Ok(node)
    }

    /// The directory containing `path`, and the final component.
    pub async fn resolve_parent(&self, path: &str) -> Result<(dir::Handle, String)> {
        let mut parts = split_path(path)?;
        let Some(name) = parts.pop() else {
            return Err(Error::invalid_path(path));
        };
        let parent = self.resolve(&join(&parts)).await?;
        match parent {
            Node::Directory(dir) => Ok((dir, name.to_string())),
            Node::File(_) => Err(Error::not_a_directory(join(&parts))),
        }
    }
}

fn split_path(path: &str) -> Result<Vec<&str>> {
    if !path.starts_with('/') {
        return Err(Error::invalid_path(path));
    }
    let mut parts = Vec::new();
    for part in path.split('/') {
        match part {
            "" | "." => {}
            ".." => return Err(Error::invalid_path(path)),
            name => parts.push(name),
        }
    }
    Ok(parts)
}

fn join(parts: &[&str]) -> String {
    format!("/{}", parts.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_key_encoding() {
        let buffer = encode_root_key(BlockId::new(1)).unwrap();
        assert_eq!(buffer.len(), ROOT_KEY_LEN);
        // Zigzag: 1 encodes as 2
        assert_eq!(buffer[0], 2);
        assert!(buffer[1..].iter().all(|b| *b == 0));

        let big = BlockId::new(i64::MAX - 3);
        assert_eq!(decode_root_key(&encode_root_key(big).unwrap()).unwrap(), big);
    }

    #[test]
    fn test_root_key_decode_errors() {
        assert!(matches!(decode_root_key(&[]), Err(Error::CorruptRootKey(_))));
        assert!(matches!(
            decode_root_key(&[0xff; 11]),
            Err(Error::CorruptRootKey(_))
        ));
        // Trailing garbage after the varint is ignored
        assert_eq!(decode_root_key(&[0x0a, 0xff, 0xff]).unwrap(), BlockId::new(5));
    }

    #[test]
    fn test_split_path() {
        assert_eq!(split_path("/").unwrap(), Vec::<&str>::new());
        assert_eq!(split_path("/a//b/./c/").unwrap(), vec!["a", "b", "c"]);
        assert!(matches!(split_path("a/b"), Err(Error::InvalidPath(_))));
        assert!(matches!(split_path("/a/../b"), Err(Error::InvalidPath(_))));
        assert!(matches!(split_path(""), Err(Error::InvalidPath(_))));
    }
}
