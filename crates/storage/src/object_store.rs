//! Abstraction over the S3-compatible object store backing
//! [`crate::cloud::CloudBlockProvider`].
//!
//! Keeping this behind a trait (rather than binding directly to an SDK)
//! mirrors how storage backends are abstracted in comparable systems —
//! callers plug in whatever client they have (AWS SDK, MinIO, a test
//! double) as long as it can put/get/list byte blobs by key.

use crate::error::Result;

/// A minimal S3-compatible object store client.
pub trait ObjectStoreClient: Send + Sync {
    /// Fetch the full contents of `key`, or `Ok(None)` if absent.
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Upload `bytes` under `key`, overwriting any existing object.
    fn put(&self, key: &str, bytes: &[u8]) -> Result<()>;

    /// List keys under `prefix`.
    fn list(&self, prefix: &str) -> Result<Vec<String>>;
}

/// An in-memory object store, standing in for a real S3-compatible
/// endpoint in tests and in environments with no network access.
#[derive(Default)]
pub struct InMemoryObjectStore {
    objects: parking_lot::Mutex<std::collections::BTreeMap<String, Vec<u8>>>,
    /// When set, [`ObjectStoreClient::get`]/[`ObjectStoreClient::put`] fail
    /// unconditionally — used to simulate an unreachable remote in tests
    /// (spec §8 scenario S6).
    unavailable: std::sync::atomic::AtomicBool,
}

impl InMemoryObjectStore {
    /// Create an empty, initially-available store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Toggle simulated remote availability.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, std::sync::atomic::Ordering::SeqCst);
    }
}

impl ObjectStoreClient for InMemoryObjectStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        if self.unavailable.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(crate::error::StorageError::RemoteUnavailable(key.to_string()));
        }
        Ok(self.objects.lock().get(key).cloned())
    }

    fn put(&self, key: &str, bytes: &[u8]) -> Result<()> {
        if self.unavailable.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(crate::error::StorageError::RemoteUnavailable(key.to_string()));
        }
        self.objects.lock().insert(key.to_string(), bytes.to_vec());
        Ok(())
    }

    fn list(&self, prefix: &str) -> Result<Vec<String>> {
        Ok(self
            .objects
            .lock()
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }
}
