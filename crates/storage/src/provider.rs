//! The `BlockProvider` contract: fixed-size page I/O shared by the file,
//! memory, and cloud implementations.

use crate::error::Result;
use std::io::Read;

/// An atom's physical address: which WAL file, at what offset, how long.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Location {
    /// Monotonically increasing WAL identifier.
    pub wal_id: u64,
    /// Byte offset within that WAL.
    pub offset: u64,
    /// Length in bytes.
    pub length: u32,
}

impl Location {
    /// Build a new location.
    pub fn new(wal_id: u64, offset: u64, length: u32) -> Self {
        Location { wal_id, offset, length }
    }
}

/// A readable handle over bytes returned by [`BlockProvider::get_reader`].
pub struct ByteSource {
    inner: Box<dyn Read + Send>,
}

impl ByteSource {
    /// Wrap any `Read` implementation as a `ByteSource`.
    pub fn new(inner: Box<dyn Read + Send>) -> Self {
        ByteSource { inner }
    }

    /// Read exactly `len` bytes, or fail with a short read.
    pub fn read_exact_bytes(&mut self, len: usize) -> std::io::Result<Vec<u8>> {
        let mut buf = vec![0u8; len];
        self.inner.read_exact(&mut buf)?;
        Ok(buf)
    }

    /// Read all remaining bytes, for sequential WAL scans that don't know
    /// a frame's length up front.
    pub fn read_to_end(&mut self) -> std::io::Result<Vec<u8>> {
        let mut buf = Vec::new();
        self.inner.read_to_end(&mut buf)?;
        Ok(buf)
    }
}

/// Fixed-size page I/O over a storage medium.
///
/// Implementations: [`crate::file::FileBlockProvider`] (local directory of
/// WAL files), [`crate::memory::MemoryBlockProvider`] (RAM, for tests), and
/// [`crate::cloud::CloudBlockProvider`] (S3-compatible object store with a
/// local LRU/FS cache). Page size is fixed at construction and invariant for
/// the lifetime of the space (spec §4.2, §6).
pub trait BlockProvider: Send + Sync {
    /// Open a reader positioned at `(wal_id, position)`.
    fn get_reader(&self, wal_id: u64, position: u64) -> Result<ByteSource>;

    /// Append `bytes` to the active WAL, returning its durable location.
    /// The returned `length` always equals `bytes.len()`.
    fn append(&self, bytes: &[u8]) -> Result<Location>;

    /// Flush any buffered writes to durable storage. For the cloud provider
    /// this blocks until pending uploads drain (spec §4.2).
    fn sync(&self) -> Result<()>;

    /// Enumerate known WAL identifiers in ascending order.
    fn list_wals(&self) -> Result<Vec<u64>>;

    /// The fixed page size this provider was opened with.
    fn page_size(&self) -> u32;
}
