use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Result, anyhow};
use kvfs::{DiskStore, FS, NodeKind, RetryingStore};

/// Environment variable naming the store directory.
pub const STORE_ENV: &str = "KVFS_STORE";

/// Get the store path with an optional override, falling back to `KVFS_STORE`
pub fn get_store_path_with_override(override_path: Option<PathBuf>) -> Result<PathBuf> {
    if let Some(path) = override_path {
        return Ok(path);
    }

    env::var(STORE_ENV)
        .map(PathBuf::from)
        .map_err(|_| anyhow!("{STORE_ENV} environment variable not set and no --store given"))
}

/// Where the commands find their store.
#[derive(Debug, Clone)]
pub struct StoreContext {
    store_path: Option<PathBuf>,
}

impl StoreContext {
    #[must_use]
    pub fn new(store_path: Option<PathBuf>) -> Self {
        Self { store_path }
    }

    pub fn store_path(&self) -> Result<PathBuf> {
        get_store_path_with_override(self.store_path.clone())
    }

    /// Open the disk store, with retried reads, and wrap it in a filesystem.
    pub async fn open_fs(&self) -> Result<FS> {
        let path = self.store_path()?;
        let store = DiskStore::open(&path)
            .await
            .map_err(|e| anyhow!("Failed to open store at {}: {}", path.display(), e))?;

        diagnostics::log_debug!("Using store at {path}", path: path.display().to_string());
        Ok(FS::new(Arc::new(RetryingStore::new(store))))
    }
}

/// Single-character kind column, `ls -l` style.
#[must_use]
pub fn kind_marker(kind: NodeKind) -> char {
    match kind {
        NodeKind::Directory => 'd',
        NodeKind::File => '-',
    }
}

/// Permission bits as `rwxrwxrwx`.
#[must_use]
pub fn format_mode(mode: u32) -> String {
    let flags = ['r', 'w', 'x'];
    (0..9)
        .map(|bit| {
            if mode & (1 << (8 - bit)) != 0 {
                flags[bit % 3]
            } else {
                '-'
            }
        })
        .collect()
}
