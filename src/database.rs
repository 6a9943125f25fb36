//! `Database`: `ObjectSpace(storage)` plus the coordinated-commit glue a
//! cluster backend needs (spec §6 embedded API surface).

use crate::error::Result;
use crate::storage::Storage;
use protobase_atom::{Atom, AtomId};
use protobase_txn::{ObjectSpace, Transaction};

/// One open ProtoBase space: a [`Storage`] backend plus the object space
/// built over it.
///
/// Mirrors spec §6's `ObjectSpace(storage)` / `space.get_database(name)` /
/// `db.new_transaction()` surface; `Transaction::get_root_object`,
/// `set_root_object`, and `commit` are used exactly as
/// `protobase_txn::Transaction` defines them; this type only adds the
/// storage-aware commit path.
pub struct Database {
    storage: Storage,
    space: ObjectSpace,
}

impl Database {
    /// Open a space over `storage`, replaying its WAL to recover the
    /// current root (spec §4.4). `max_rebase_attempts` bounds the commit
    /// retry loop (default 8, per spec §5).
    ///
    /// Aborts the process if recovery finds the durable graph already
    /// inconsistent (a corrupt frame, a dangling reference) rather than
    /// simply truncated, per the fatal-error contract.
    pub fn open(storage: Storage, max_rebase_attempts: u32) -> Result<Self> {
        let space = ObjectSpace::open(storage.block_provider(), max_rebase_attempts)
            .map_err(|e| crate::error::Error::from(e).abort_if_invariant_violated())?;
        Ok(Database { storage, space })
    }

    /// The currently published root id.
    pub fn current_root(&self) -> AtomId {
        self.space.current_root()
    }

    /// Look up `name` in the root map, creating it via `empty_value` if
    /// absent.
    pub fn get_database(&self, name: &str, empty_value: impl FnOnce() -> Atom) -> Result<AtomId> {
        self.space
            .get_database(name, empty_value)
            .map_err(|e| crate::error::Error::from(e).abort_if_invariant_violated())
    }

    /// Begin a new snapshot-isolated transaction.
    pub fn new_transaction(&self) -> Transaction<'_> {
        self.space.new_transaction()
    }

    /// Commit `txn` with no cluster coordination — the common path for
    /// `Memory`/`StandaloneFile`/`Cloud` storage, and also valid (just
    /// uncoordinated) against a clustered backend.
    ///
    /// Aborts the process (does not return) if the commit fails in a way
    /// that means a durability invariant has already been broken, per the
    /// fatal-error contract — see `Error::abort_if_invariant_violated`.
    pub fn commit(&self, txn: Transaction<'_>) -> Result<AtomId> {
        txn.commit().map_err(|e| crate::error::Error::from(e).abort_if_invariant_violated())
    }

    /// Commit `txn`, first voting the update to `object` through to quorum
    /// on a `Cluster`/`CloudCluster` backend (a no-op vote on every other
    /// backend). `base` is the value this transaction's snapshot observed
    /// for `object` before `set_root_object` was called; `proposed` is the
    /// value passed to it. A lost vote returns `Error::Cluster` and leaves
    /// `txn` uncommitted — its staged atoms are discarded when it drops,
    /// and the WAL is untouched.
    pub fn commit_root_update(&self, object: &str, base: AtomId, proposed: AtomId, txn: Transaction<'_>) -> Result<AtomId> {
        self.storage.propose_root_update(object, base, proposed)?;
        self.commit(txn)
    }
}
