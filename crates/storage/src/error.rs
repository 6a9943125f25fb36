//! Error types for block providers.

use thiserror::Error;

/// Result type alias for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;

/// Errors raised by a [`crate::provider::BlockProvider`].
#[derive(Debug, Error)]
pub enum StorageError {
    /// Underlying I/O failure (local file, cache directory).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A WAL id named in a read request does not exist.
    #[error("no such wal: {0}")]
    NoSuchWal(u64),

    /// A read request asked for bytes past the end of the addressed wal.
    #[error("short read at wal {wal_id} offset {offset}: wanted {want}, got {got}")]
    ShortRead {
        /// The wal file read from.
        wal_id: u64,
        /// Offset the read started at.
        offset: u64,
        /// Bytes requested.
        want: usize,
        /// Bytes actually available.
        got: usize,
    },

    /// The object store failed to serve a fetch after the retry budget was
    /// exhausted (spec §4.2 partial-failure semantics, §7 `RemoteUnavailable`).
    #[error("remote object store unavailable for key {0}")]
    RemoteUnavailable(String),

    /// `page_size` was asked to change after the provider's first write.
    #[error("page size is fixed at {existing} and cannot change to {requested}")]
    PageSizeFixed {
        /// The size fixed at first write.
        existing: u32,
        /// The size the caller asked for.
        requested: u32,
    },

    /// The cache mapping file (`cache_mappings.json`) failed to parse.
    #[error("corrupt cache mapping file: {0}")]
    CorruptCacheMapping(String),
}
