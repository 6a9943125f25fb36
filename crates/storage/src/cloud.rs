//! A [`BlockProvider`] over an S3-compatible object store, backed by an
//! in-memory LRU, a local FS cache directory, and a local staging area for
//! writes not yet uploaded (spec §4.2).

use crate::cache_mappings::CacheMappingFile;
use crate::error::{Result, StorageError};
use crate::file::FileBlockProvider;
use crate::object_store::ObjectStoreClient;
use crate::page_cache::PageCache;
use crate::provider::{BlockProvider, ByteSource, Location};
use parking_lot::Mutex;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{mpsc, Arc};
use std::thread::JoinHandle;
use std::time::Duration;

const MEMORY_CACHE_BUDGET_BYTES: usize = 16 * 1024 * 1024;
const MAX_FETCH_RETRIES: u32 = 3;
const MAX_UPLOAD_RETRIES: u32 = 5;

fn page_key(wal_id: u64, offset: u64) -> String {
    format!("{wal_id}/{offset}")
}

fn object_key(wal_id: u64, offset: u64) -> String {
    format!("wal/{wal_id}/{offset}")
}

enum WorkerMsg {
    Upload(Location),
    Shutdown,
}

struct Shared {
    local: FileBlockProvider,
    store: Arc<dyn ObjectStoreClient>,
    cache_dir: PathBuf,
    mapping: Mutex<CacheMappingFile>,
    memory_cache: PageCache,
    pending_uploads: AtomicUsize,
}

impl Shared {
    fn mapping_path(&self) -> PathBuf {
        self.cache_dir.join("cache_mappings.json")
    }

    fn upload_one(&self, loc: Location) -> Result<()> {
        let mut reader = self.local.get_reader(loc.wal_id, loc.offset)?;
        let bytes = reader
            .read_exact_bytes(loc.length as usize)
            .map_err(StorageError::Io)?;
        let key = object_key(loc.wal_id, loc.offset);

        let mut attempt = 0;
        loop {
            match self.store.put(&key, &bytes) {
                Ok(()) => {
                    let mut mapping = self.mapping.lock();
                    mapping.upsert(page_key(loc.wal_id, loc.offset), key.clone(), bytes.len() as u64);
                    mapping.save(&self.mapping_path())?;
                    tracing::debug!(wal_id = loc.wal_id, offset = loc.offset, "uploaded page");
                    return Ok(());
                }
                Err(e) if attempt < MAX_UPLOAD_RETRIES => {
                    attempt += 1;
                    let backoff = Duration::from_millis(50 * (1u64 << attempt.min(6)));
                    tracing::warn!(error = %e, attempt, "upload failed, retrying with backoff");
                    std::thread::sleep(backoff);
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn fetch_into_cache(&self, wal_id: u64, offset: u64) -> Result<Vec<u8>> {
        let key = {
            let mapping = self.mapping.lock();
            mapping.lookup(&page_key(wal_id, offset)).map(|s| s.to_string())
        }
        .unwrap_or_else(|| object_key(wal_id, offset));

        let cache_path = self.cache_dir.join(key.replace('/', "_"));
        if let Ok(bytes) = std::fs::read(&cache_path) {
            return Ok(bytes);
        }

        let mut attempt = 0;
        loop {
            match self.store.get(&key) {
                Ok(Some(bytes)) => {
                    std::fs::write(&cache_path, &bytes)?;
                    let mut mapping = self.mapping.lock();
                    mapping.upsert(page_key(wal_id, offset), key.clone(), bytes.len() as u64);
                    mapping.save(&self.mapping_path())?;
                    return Ok(bytes);
                }
                Ok(None) => return Err(StorageError::NoSuchWal(wal_id)),
                Err(e) if attempt < MAX_FETCH_RETRIES => {
                    attempt += 1;
                    tracing::warn!(error = %e, attempt, "fetch failed, retrying");
                    std::thread::sleep(Duration::from_millis(20 * attempt as u64));
                }
                Err(_) => return Err(StorageError::RemoteUnavailable(key)),
            }
        }
    }
}

/// Cloud-backed [`BlockProvider`]: local durability for writers, with a
/// background uploader draining to the object store and a three-tier read
/// path (memory → local cache → object store) for anything not already on
/// this machine's disk.
pub struct CloudBlockProvider {
    shared: Arc<Shared>,
    worker_tx: mpsc::Sender<WorkerMsg>,
    worker: Option<JoinHandle<()>>,
    shutting_down: Arc<AtomicBool>,
}

impl CloudBlockProvider {
    /// Open a cloud provider staging writes under `cache_dir` and uploading
    /// to `store` every `upload_interval_ms` (spec §6 `upload_interval_ms`,
    /// `cache_dir`).
    pub fn open(
        cache_dir: impl AsRef<Path>,
        page_size: u32,
        store: Arc<dyn ObjectStoreClient>,
        upload_interval_ms: u64,
    ) -> Result<Self> {
        let cache_dir = cache_dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&cache_dir)?;
        let local = FileBlockProvider::open(cache_dir.join("staging"), page_size)?;
        let mapping = CacheMappingFile::load(&cache_dir.join("cache_mappings.json"))?;

        let shared = Arc::new(Shared {
            local,
            store,
            cache_dir,
            mapping: Mutex::new(mapping),
            memory_cache: PageCache::new(MEMORY_CACHE_BUDGET_BYTES),
            pending_uploads: AtomicUsize::new(0),
        });

        let (tx, rx) = mpsc::channel::<WorkerMsg>();
        let worker_shared = Arc::clone(&shared);
        let interval = Duration::from_millis(upload_interval_ms.max(1));
        let worker = std::thread::spawn(move || {
            for msg in rx {
                match msg {
                    WorkerMsg::Upload(loc) => {
                        if let Err(e) = worker_shared.upload_one(loc) {
                            tracing::error!(error = %e, "upload permanently failed");
                        }
                        worker_shared.pending_uploads.fetch_sub(1, Ordering::SeqCst);
                        std::thread::sleep(interval);
                    }
                    WorkerMsg::Shutdown => break,
                }
            }
        });

        Ok(CloudBlockProvider {
            shared,
            worker_tx: tx,
            worker: Some(worker),
            shutting_down: Arc::new(AtomicBool::new(false)),
        })
    }
}

impl BlockProvider for CloudBlockProvider {
    fn get_reader(&self, wal_id: u64, position: u64) -> Result<ByteSource> {
        let key = page_key(wal_id, position);
        if let Some(bytes) = self.shared.memory_cache.get(&key) {
            return Ok(ByteSource::new(Box::new(Cursor::new(bytes))));
        }

        // Prefer local staging if this wal is one we wrote ourselves.
        if self.shared.local.list_wals().unwrap_or_default().contains(&wal_id) {
            return self.shared.local.get_reader(wal_id, position);
        }

        let bytes = self.shared.fetch_into_cache(wal_id, position)?;
        self.shared.memory_cache.put(key, bytes.clone());
        Ok(ByteSource::new(Box::new(Cursor::new(bytes))))
    }

    fn append(&self, bytes: &[u8]) -> Result<Location> {
        let loc = self.shared.local.append(bytes)?;
        self.shared.pending_uploads.fetch_add(1, Ordering::SeqCst);
        let _ = self.worker_tx.send(WorkerMsg::Upload(loc));
        Ok(loc)
    }

    fn sync(&self) -> Result<()> {
        self.shared.local.sync()?;
        while self.shared.pending_uploads.load(Ordering::SeqCst) > 0 {
            std::thread::sleep(Duration::from_millis(5));
        }
        Ok(())
    }

    fn list_wals(&self) -> Result<Vec<u64>> {
        self.shared.local.list_wals()
    }

    fn page_size(&self) -> u32 {
        self.shared.local.page_size()
    }
}

impl Drop for CloudBlockProvider {
    fn drop(&mut self) {
        if self.shutting_down.swap(true, Ordering::SeqCst) {
            return;
        }
        let _ = self.worker_tx.send(WorkerMsg::Shutdown);
        if let Some(handle) = self.worker.take() {
            let _ = handle.join();
        }
    }
}
