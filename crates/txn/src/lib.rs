//! Object space and transaction layer: snapshot isolation, the root object
//! table, and rebase-on-conflict commit (spec §4.4).
//!
//! An [`ObjectSpace`] owns the durable resources (block provider, WAL, atom
//! cache, commit mutex) for one database file or cluster member. A
//! [`Transaction`] is a snapshot-isolated unit of work opened against it;
//! readers never block, and writers that race to change the same named
//! root object resolve the conflict via a caller-supplied [`RebaseFn`]
//! rather than failing outright.

#![warn(missing_docs)]

pub mod atom_store;
pub mod error;
pub mod space;
pub mod transaction;

pub use atom_store::{AtomCache, AtomReader};
pub use error::{Result, TxnError};
pub use space::ObjectSpace;
pub use transaction::{RebaseFn, Transaction};
