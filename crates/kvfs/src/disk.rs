//! Key-value store keeping one file per key in a directory.

use crate::error::StoreError;
use crate::store::KeyValueStore;
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::io::AsyncWriteExt;

/// Store backed by a local directory.
///
/// Values are written to a temporary sibling and renamed into place, so a
/// concurrent reader sees either the old or the new value.
#[derive(Debug)]
pub struct DiskStore {
    root: PathBuf,
    temp_seq: AtomicU64,
}

impl DiskStore {
    /// Open the store at `root`, creating the directory if needed.
    pub async fn open<P: AsRef<Path>>(root: P) -> Result<Self, StoreError> {
        let root = root.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&root).await?;
        diagnostics::log_debug!("Opened disk store at {path}", path: root.display().to_string());
        Ok(Self {
            root,
            temp_seq: AtomicU64::new(0),
        })
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, StoreError> {
        let valid = !key.is_empty()
            && key
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-');
        if !valid {
            return Err(StoreError::unavailable(format!("unsupported key {key:?}")));
        }
        Ok(self.root.join(key))
    }

    fn temp_path_for(&self, key: &str) -> PathBuf {
        let seq = self.temp_seq.fetch_add(1, Ordering::Relaxed);
        self.root
            .join(format!(".{key}.{}.{seq}.tmp", std::process::id()))
    }
}

#[async_trait]
impl KeyValueStore for DiskStore {
    async fn get(&self, key: &str, _retry: bool) -> Result<Option<Vec<u8>>, StoreError> {
        let path = self.path_for(key)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn set(&self, key: &str, value: Option<Vec<u8>>) -> Result<(), StoreError> {
        let path = self.path_for(key)?;

        let Some(value) = value else {
            return match tokio::fs::remove_file(&path).await {
                Err(e) if e.kind() != ErrorKind::NotFound => Err(e.into()),
                _ => Ok(()),
            };
        };

        let temp_path = self.temp_path_for(key);
        let written = async {
            let mut file = tokio::fs::File::create(&temp_path).await?;
            file.write_all(&value).await?;
            file.sync_all().await?;
            tokio::fs::rename(&temp_path, &path).await
        }
        .await;

        if let Err(e) = written {
            _ = tokio::fs::remove_file(&temp_path).await;
            return Err(e.into());
        }
        Ok(())
    }
}
