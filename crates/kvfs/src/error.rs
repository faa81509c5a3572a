use crate::block::BlockId;

pub type Result<T> = std::result::Result<T, Error>;

/// Failure reported by a key-value backend.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    pub fn unavailable<S: Into<String>>(msg: S) -> Self {
        StoreError::Unavailable(msg.into())
    }

    /// Whether repeating the same call might succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            StoreError::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::Interrupted
                    | std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::WouldBlock
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
            ),
            StoreError::Unavailable(_) => true,
        }
    }
}

/// Represents errors that can occur in filesystem operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Backend read failed for key {key}: {source}")]
    BackendRead {
        key: String,
        #[source]
        source: StoreError,
    },

    #[error("Backend write failed for key {key}: {source}")]
    BackendWrite {
        key: String,
        #[source]
        source: StoreError,
    },

    #[error("Root key does not hold a valid block id: {0}")]
    CorruptRootKey(#[source] postcard::Error),

    #[error("Root directory {id} could not be loaded: {source}")]
    CorruptRootNode {
        id: BlockId,
        #[source]
        source: Box<Error>,
    },

    #[error("Entry not found: {0}")]
    NotFound(String),

    #[error("Entry already exists: {0}")]
    AlreadyExists(String),

    #[error("Directory not empty: {0}")]
    DirectoryNotEmpty(String),

    #[error("Name too long: {0}")]
    NameTooLong(String),

    #[error("Encode error: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("Decode error: {0}")]
    Decode(#[source] serde_json::Error),

    #[error("Not a directory: {0}")]
    NotADirectory(String),

    #[error("Not a file: {0}")]
    NotAFile(String),

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("File lists no data block at index {index}")]
    MissingBlock { index: u64 },
}

impl Error {
    pub fn backend_read<K: Into<String>>(key: K, source: StoreError) -> Self {
        Error::BackendRead {
            key: key.into(),
            source,
        }
    }

    pub fn backend_write<K: Into<String>>(key: K, source: StoreError) -> Self {
        Error::BackendWrite {
            key: key.into(),
            source,
        }
    }

    pub fn not_found<S: AsRef<str>>(name: S) -> Self {
        Error::NotFound(name.as_ref().into())
    }

    pub fn already_exists<S: AsRef<str>>(name: S) -> Self {
        Error::AlreadyExists(name.as_ref().into())
    }

    pub fn directory_not_empty<S: AsRef<str>>(name: S) -> Self {
        Error::DirectoryNotEmpty(name.as_ref().into())
    }

    pub fn name_too_long<S: AsRef<str>>(name: S) -> Self {
        Error::NameTooLong(name.as_ref().into())
    }

    pub fn not_a_directory<S: AsRef<str>>(path: S) -> Self {
        Error::NotADirectory(path.as_ref().into())
    }

    pub fn not_a_file<S: AsRef<str>>(path: S) -> Self {
        Error::NotAFile(path.as_ref().into())
    }

    pub fn invalid_path<S: AsRef<str>>(path: S) -> Self {
        Error::InvalidPath(path.as_ref().into())
    }

    /// True for failures of the backend itself.
    #[must_use]
    pub fn is_io(&self) -> bool {
        matches!(self, Error::BackendRead { .. } | Error::BackendWrite { .. })
    }

    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }

    /// Nearest POSIX error code, for a kernel bridge to hand back.
    #[must_use]
    pub fn errno(&self) -> i32 {
        match self {
            Error::NotFound(_) => libc::ENOENT,
            Error::AlreadyExists(_) => libc::EEXIST,
            Error::DirectoryNotEmpty(_) => libc::ENOTEMPTY,
            Error::NameTooLong(_) => libc::ENAMETOOLONG,
            Error::NotADirectory(_) => libc::ENOTDIR,
            Error::NotAFile(_) => libc::EISDIR,
            Error::InvalidPath(_) => libc::EINVAL,
            Error::BackendRead { .. }
            | Error::BackendWrite { .. }
            | Error::CorruptRootKey(_)
            | Error::CorruptRootNode { .. }
            | Error::MissingBlock { .. }
            | Error::Encode(_)
            | Error::Decode(_) => libc::EIO,
        }
    }
}
