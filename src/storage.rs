//! `Storage`: the embedded API's constructors over every block-provider
//! backend (spec §6 "Embedded API surface" / "Configuration options").

use crate::error::Result;
use protobase_atom::AtomId;
use protobase_cluster::{CloudClusterFileStorage, ClusterFileStorage};
use protobase_storage::{BlockProvider, CloudBlockProvider, FileBlockProvider, InMemoryObjectStore, MemoryBlockProvider, ObjectStoreClient};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

const DEFAULT_PAGE_SIZE: u32 = 4096;
const DEFAULT_UPLOAD_INTERVAL_MS: u64 = 250;

/// The configuration options named in spec §6: cloud upload cadence and
/// cache root, cluster identity and bootstrap peers, and the fixed page
/// size every block provider is opened with.
#[derive(Debug, Clone)]
pub struct Config {
    /// Fixed page size; cannot change after a provider's first write.
    pub page_size: u32,
    /// Delay between background upload batches (cloud backends).
    pub upload_interval_ms: u64,
    /// Root directory for the local object/page cache (cloud backends).
    pub cache_dir: PathBuf,
    /// This server's identity, used in cluster votes and cloud page cache
    /// namespacing (`cloud_page_cache/server_<id>`).
    pub server_id: u32,
    /// The address this server accepts peer connections on.
    pub listen_addr: SocketAddr,
    /// Bootstrap peer list: `(server_id, address)` for every other member.
    pub servers: Vec<(u32, SocketAddr)>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            page_size: DEFAULT_PAGE_SIZE,
            upload_interval_ms: DEFAULT_UPLOAD_INTERVAL_MS,
            cache_dir: PathBuf::from("./protobase-cache"),
            server_id: 0,
            listen_addr: "127.0.0.1:0".parse().expect("valid loopback address"),
            servers: Vec::new(),
        }
    }
}

/// Which peer currently believes `object` holds `base` — supplied by the
/// caller for `cluster_file`/`cloud_cluster_file` since root-map state
/// lives in `protobase-txn`, a layer above this crate.
pub type LocalRootView = Arc<dyn Fn(&str) -> AtomId + Send + Sync>;

/// One of the pluggable storage backends a [`crate::Database`] opens over.
///
/// Every variant is also a [`BlockProvider`]; `Cluster`/`CloudCluster`
/// additionally expose coordinated root updates (see
/// [`Storage::propose_root_update`]).
pub enum Storage {
    /// In-memory, non-durable — tests and scratch spaces.
    Memory(Arc<MemoryBlockProvider>),
    /// A local directory of WAL files.
    StandaloneFile(Arc<FileBlockProvider>),
    /// File storage with peer-voted exclusivity on root updates.
    Cluster(Arc<ClusterFileStorage>),
    /// An S3-compatible object store with a local cache.
    Cloud(Arc<CloudBlockProvider>),
    /// Cluster coordination composed with cloud storage and a namespaced
    /// cloud page cache.
    CloudCluster(Arc<CloudClusterFileStorage>),
}

impl Storage {
    /// `MemoryStorage()`.
    pub fn memory(page_size: u32) -> Self {
        Storage::Memory(Arc::new(MemoryBlockProvider::new(page_size)))
    }

    /// `StandaloneFileStorage(block_provider)`.
    pub fn standalone_file(dir: impl AsRef<Path>, page_size: u32) -> Result<Self> {
        Ok(Storage::StandaloneFile(Arc::new(FileBlockProvider::open(dir, page_size)?)))
    }

    /// `ClusterFileStorage(...)`: local durability plus majority-vote root
    /// updates across `config.servers`.
    pub fn cluster_file(dir: impl AsRef<Path>, config: &Config, local_view: LocalRootView) -> Result<Self> {
        let local: Arc<dyn BlockProvider> = Arc::new(FileBlockProvider::open(dir, config.page_size)?);
        let cluster = ClusterFileStorage::open(local, config.server_id, config.listen_addr, config.servers.clone(), local_view)?;
        Ok(Storage::Cluster(Arc::new(cluster)))
    }

    /// `CloudFileStorage(block_provider)`.
    pub fn cloud_file(config: &Config, store: Arc<dyn ObjectStoreClient>) -> Result<Self> {
        let provider = CloudBlockProvider::open(&config.cache_dir, config.page_size, store, config.upload_interval_ms)?;
        Ok(Storage::Cloud(Arc::new(provider)))
    }

    /// `CloudFileStorage` backed by an in-process object store, for tests
    /// that want cloud-shaped behavior (caching, retry, sidecar mapping)
    /// without a real bucket.
    pub fn cloud_file_in_memory(config: &Config) -> Result<Self> {
        Self::cloud_file(config, Arc::new(InMemoryObjectStore::new()))
    }

    /// `CloudClusterFileStorage(...)`: cluster coordination composed with
    /// cloud storage, rooted at `cloud_page_cache/server_<id>`.
    pub fn cloud_cluster_file(config: &Config, store: Arc<dyn ObjectStoreClient>, local_view: LocalRootView) -> Result<Self> {
        let cluster = CloudClusterFileStorage::open(
            &config.cache_dir,
            config.page_size,
            store,
            config.upload_interval_ms,
            config.server_id,
            config.listen_addr,
            config.servers.clone(),
            local_view,
        )?;
        Ok(Storage::CloudCluster(Arc::new(cluster)))
    }

    /// The block provider an [`protobase_txn::ObjectSpace`] opens over.
    pub(crate) fn block_provider(&self) -> Arc<dyn BlockProvider> {
        match self {
            Storage::Memory(p) => Arc::clone(p) as Arc<dyn BlockProvider>,
            Storage::StandaloneFile(p) => Arc::clone(p) as Arc<dyn BlockProvider>,
            Storage::Cluster(p) => Arc::clone(p) as Arc<dyn BlockProvider>,
            Storage::Cloud(p) => Arc::clone(p) as Arc<dyn BlockProvider>,
            Storage::CloudCluster(p) => Arc::clone(p) as Arc<dyn BlockProvider>,
        }
    }

    /// Propose a coordinated root update (spec §4.8); a no-op that always
    /// succeeds on non-clustered backends, since there's no one to vote.
    pub fn propose_root_update(&self, object: &str, base: AtomId, proposed: AtomId) -> Result<()> {
        match self {
            Storage::Cluster(c) => Ok(c.propose_root_update(object, base, proposed)?),
            Storage::CloudCluster(c) => Ok(c.propose_root_update(object, base, proposed)?),
            _ => Ok(()),
        }
    }
}
