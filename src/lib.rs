//! # ProtoBase
//!
//! An embeddable, transactional object database: versioned persistent
//! collections (`List`, `Set`, `HashDictionary`, `Dictionary`,
//! `RepeatedKeysDictionary`, `Vector`) over a content-addressed atom graph,
//! snapshot-isolated transactions with rebase-on-conflict commit, and a
//! cooperative query planner that pushes predicates onto secondary
//! indexes — including approximate nearest-neighbor vector search.
//!
//! # Quick Start
//!
//! ```no_run
//! use protobase::{Database, Storage};
//! use protobase_atom::{Atom, AtomId, AtomTag, Value};
//! use protobase_collections::dictionary;
//!
//! fn main() -> protobase::Result<()> {
//!     let storage = Storage::memory(4096);
//!     let db = Database::open(storage, 8)?;
//!
//!     let mut txn = db.new_transaction();
//!     let root = txn.get_root_object("users")?.unwrap_or(AtomId::NIL);
//!
//!     let mut body = Vec::new();
//!     Value::Str("active".into()).encode(&mut body);
//!     let value_id = txn.put_atom(Atom { tag: AtomTag::Value, body, refs: Vec::new() });
//!     let updated = dictionary::put(&mut txn, root, "alice", value_id)?;
//!     txn.set_root_object_no_rebase("users", updated);
//!     db.commit(txn)?;
//!
//!     Ok(())
//! }
//! ```
//!
//! # Layout
//!
//! | Crate | Purpose |
//! |-------|---------|
//! | `protobase-atom` | content-addressed atoms, canonical encoding |
//! | `protobase-collections` | `List`/`Set`/`HashDictionary`/`Dictionary`/`RepeatedKeysDictionary`/`Vector` |
//! | `protobase-wal` / `protobase-txn` | durability, object space, transactions |
//! | `protobase-index` | secondary indexes, vector search |
//! | `protobase-query` | plan algebra, predicate pushdown, execution |
//! | `protobase-cluster` | majority-vote root updates, namespaced cloud page cache |
//!
//! This crate composes them behind [`Storage`] and [`Database`]; the
//! component crates are also usable directly when an embedder needs
//! lower-level control (building a custom index, hand-assembling a plan).

#![warn(missing_docs)]

mod arrow_bridge;
mod database;
mod error;
mod init_tracing;
mod storage;

pub use database::Database;
pub use error::{Error, Result};
pub use init_tracing::init_tracing;
pub use storage::{Config, LocalRootView, Storage};

pub use arrow_bridge::{scan_parquet, table_to_parquet, to_arrow, vectors_fixed_size_list};

// Re-export the component crates so an embedder can reach collection,
// index, and query operations without depending on them directly.
pub use protobase_atom as atom;
pub use protobase_cluster as cluster;
pub use protobase_collections as collections;
pub use protobase_index as index;
pub use protobase_query as query;
pub use protobase_txn as txn;
