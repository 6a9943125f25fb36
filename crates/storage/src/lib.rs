//! Fixed-size page I/O over local FS, memory, and cloud object storage,
//! plus the shared byte-budgeted page cache (spec §4.2, §6, §8).

#![warn(missing_docs)]

pub mod cache_mappings;
pub mod cloud;
pub mod error;
pub mod file;
pub mod memory;
pub mod object_store;
pub mod page_cache;
pub mod provider;

pub use cache_mappings::{CacheMappingEntry, CacheMappingFile};
pub use cloud::CloudBlockProvider;
pub use error::{Result, StorageError};
pub use file::FileBlockProvider;
pub use memory::MemoryBlockProvider;
pub use object_store::{InMemoryObjectStore, ObjectStoreClient};
pub use page_cache::PageCache;
pub use provider::{BlockProvider, ByteSource, Location};
