//! A directory of WAL files, buffered and fsynced on demand.

use crate::error::{Result, StorageError};
use crate::provider::{BlockProvider, ByteSource, Location};
use parking_lot::Mutex;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

const DEFAULT_SEGMENT_SOFT_LIMIT: u64 = 64 * 1024 * 1024;

fn wal_path(dir: &Path, wal_id: u64) -> PathBuf {
    dir.join(format!("wal-{:06}.log", wal_id))
}

struct ActiveWal {
    wal_id: u64,
    writer: BufWriter<File>,
    size: u64,
}

struct Inner {
    dir: PathBuf,
    active: ActiveWal,
    page_size: u32,
    segment_soft_limit: u64,
}

/// A [`BlockProvider`] backed by a directory of append-only WAL files, named
/// `wal-NNNNNN.log` by monotonic `wal_id` (spec §4.2). Writes are buffered
/// in a `BufWriter` and only become durable on [`BlockProvider::sync`].
pub struct FileBlockProvider {
    inner: Mutex<Inner>,
}

impl FileBlockProvider {
    /// Open (or create) a file block provider rooted at `dir`.
    ///
    /// Scans for existing `wal-*.log` files; the highest-numbered one
    /// becomes the active (appendable) segment, new ones roll over once
    /// they exceed `segment_soft_limit`.
    pub fn open(dir: impl AsRef<Path>, page_size: u32) -> Result<Self> {
        Self::open_with_soft_limit(dir, page_size, DEFAULT_SEGMENT_SOFT_LIMIT)
    }

    /// Like [`FileBlockProvider::open`] but with an explicit rollover size,
    /// primarily for tests that want to exercise multi-segment behavior.
    pub fn open_with_soft_limit(
        dir: impl AsRef<Path>,
        page_size: u32,
        segment_soft_limit: u64,
    ) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;

        let mut existing: Vec<u64> = fs::read_dir(&dir)?
            .filter_map(|e| e.ok())
            .filter_map(|e| {
                let name = e.file_name();
                let name = name.to_str()?;
                name.strip_prefix("wal-")?.strip_suffix(".log")?.parse::<u64>().ok()
            })
            .collect();
        existing.sort_unstable();

        let wal_id = existing.last().copied().unwrap_or(0);
        let path = wal_path(&dir, wal_id);
        let file = OpenOptions::new().create(true).append(true).read(true).open(&path)?;
        let size = file.metadata()?.len();

        let active = ActiveWal { wal_id, writer: BufWriter::new(file), size };
        tracing::debug!(wal_id, size, "opened file block provider");

        Ok(FileBlockProvider {
            inner: Mutex::new(Inner { dir, active, page_size, segment_soft_limit }),
        })
    }
}

impl BlockProvider for FileBlockProvider {
    fn get_reader(&self, wal_id: u64, position: u64) -> Result<ByteSource> {
        let inner = self.inner.lock();
        let path = wal_path(&inner.dir, wal_id);
        if !path.exists() {
            return Err(StorageError::NoSuchWal(wal_id));
        }
        let mut file = File::open(&path)?;
        file.seek(SeekFrom::Start(position))?;
        Ok(ByteSource::new(Box::new(file)))
    }

    fn append(&self, bytes: &[u8]) -> Result<Location> {
        let mut inner = self.inner.lock();
        if inner.active.size >= inner.segment_soft_limit {
            inner.active.writer.flush()?;
            inner.active.writer.get_ref().sync_all()?;
            let next_id = inner.active.wal_id + 1;
            let dir = inner.dir.clone();
            let path = wal_path(&dir, next_id);
            let file = OpenOptions::new().create(true).append(true).read(true).open(&path)?;
            inner.active = ActiveWal { wal_id: next_id, writer: BufWriter::new(file), size: 0 };
            tracing::info!(wal_id = next_id, "rolled over to new wal segment");
        }

        let wal_id = inner.active.wal_id;
        let offset = inner.active.size;
        inner.active.writer.write_all(bytes)?;
        inner.active.size += bytes.len() as u64;
        Ok(Location::new(wal_id, offset, bytes.len() as u32))
    }

    fn sync(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.active.writer.flush()?;
        inner.active.writer.get_ref().sync_all()?;
        Ok(())
    }

    fn list_wals(&self) -> Result<Vec<u64>> {
        let inner = self.inner.lock();
        let mut ids: Vec<u64> = fs::read_dir(&inner.dir)?
            .filter_map(|e| e.ok())
            .filter_map(|e| {
                let name = e.file_name();
                let name = name.to_str()?;
                name.strip_prefix("wal-")?.strip_suffix(".log")?.parse::<u64>().ok()
            })
            .collect();
        ids.sort_unstable();
        Ok(ids)
    }

    fn page_size(&self) -> u32 {
        self.inner.lock().page_size
    }
}
