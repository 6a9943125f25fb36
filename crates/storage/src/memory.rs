//! RAM-backed block provider, used by tests and by `MemoryStorage`.

use crate::error::{Result, StorageError};
use crate::provider::{BlockProvider, ByteSource, Location};
use parking_lot::Mutex;
use std::io::Cursor;

const DEFAULT_WAL_SOFT_LIMIT: u64 = 64 * 1024 * 1024;

struct Inner {
    /// `wal_id -> bytes`. A new wal is opened once the active one crosses
    /// `wal_soft_limit`, mirroring the file provider's segment rollover.
    wals: Vec<Vec<u8>>,
    page_size: u32,
    wal_soft_limit: u64,
}

/// An in-memory [`BlockProvider`]. Nothing is durable across process
/// restarts; intended for tests and `Storage::MemoryStorage`.
pub struct MemoryBlockProvider {
    inner: Mutex<Inner>,
}

impl MemoryBlockProvider {
    /// Create a new memory provider with the given fixed page size.
    pub fn new(page_size: u32) -> Self {
        Self::with_wal_soft_limit(page_size, DEFAULT_WAL_SOFT_LIMIT)
    }

    /// Create a new memory provider with an explicit WAL rollover threshold.
    pub fn with_wal_soft_limit(page_size: u32, wal_soft_limit: u64) -> Self {
        MemoryBlockProvider {
            inner: Mutex::new(Inner { wals: vec![Vec::new()], page_size, wal_soft_limit }),
        }
    }
}

impl Default for MemoryBlockProvider {
    fn default() -> Self {
        Self::new(4096)
    }
}

impl BlockProvider for MemoryBlockProvider {
    fn get_reader(&self, wal_id: u64, position: u64) -> Result<ByteSource> {
        let inner = self.inner.lock();
        let wal = inner
            .wals
            .get(wal_id as usize)
            .ok_or(StorageError::NoSuchWal(wal_id))?;
        if position as usize > wal.len() {
            return Err(StorageError::ShortRead {
                wal_id,
                offset: position,
                want: 0,
                got: 0,
            });
        }
        let bytes = wal[position as usize..].to_vec();
        Ok(ByteSource::new(Box::new(Cursor::new(bytes))))
    }

    fn append(&self, bytes: &[u8]) -> Result<Location> {
        let mut inner = self.inner.lock();
        if inner.wals.last().map(|w| w.len() as u64).unwrap_or(0) >= inner.wal_soft_limit {
            inner.wals.push(Vec::new());
        }
        let wal_id = (inner.wals.len() - 1) as u64;
        let offset = inner.wals[wal_id as usize].len() as u64;
        inner.wals[wal_id as usize].extend_from_slice(bytes);
        Ok(Location::new(wal_id, offset, bytes.len() as u32))
    }

    fn sync(&self) -> Result<()> {
        Ok(())
    }

    fn list_wals(&self) -> Result<Vec<u64>> {
        let inner = self.inner.lock();
        Ok((0..inner.wals.len() as u64).collect())
    }

    fn page_size(&self) -> u32 {
        self.inner.lock().page_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_then_read_round_trips() {
        let provider = MemoryBlockProvider::new(4096);
        let loc = provider.append(b"hello").unwrap();
        assert_eq!(loc.wal_id, 0);
        assert_eq!(loc.offset, 0);

        let mut reader = provider.get_reader(loc.wal_id, loc.offset).unwrap();
        let bytes = reader.read_exact_bytes(loc.length as usize).unwrap();
        assert_eq!(bytes, b"hello");
    }

    #[test]
    fn rolls_over_to_new_wal_past_soft_limit() {
        let provider = MemoryBlockProvider::with_wal_soft_limit(4096, 4);
        let loc1 = provider.append(b"abcd").unwrap();
        let loc2 = provider.append(b"efgh").unwrap();
        assert_eq!(loc1.wal_id, 0);
        assert_eq!(loc2.wal_id, 1);
        assert_eq!(provider.list_wals().unwrap(), vec![0, 1]);
    }

    #[test]
    fn unknown_wal_is_an_error() {
        let provider = MemoryBlockProvider::new(4096);
        assert!(matches!(provider.get_reader(7, 0), Err(StorageError::NoSuchWal(7))));
    }
}
