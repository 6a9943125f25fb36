//! The in-memory atom index: a durable, content-addressed object graph kept
//! fully resident as decoded [`Atom`] values, keyed by identity.
//!
//! This is distinct from [`protobase_storage::PageCache`], which caches raw
//! page *bytes* read from remote storage. The atom cache here is the
//! logical index that makes "fetch atom by id" an O(1) lookup at all —
//! without it, resolving a reference would mean re-scanning the WAL.
//! Populated by [`crate::space::recover_atom_cache`] at startup and kept
//! current as each commit publishes new atoms.

use dashmap::DashMap;
use protobase_atom::{Atom, AtomId};

/// Anything that can resolve an atom by identity. Implemented by
/// [`AtomCache`] and used as a trait object so rebase closures (supplied by
/// `protobase-collections`) don't need to depend on this crate's concrete
/// types.
pub trait AtomReader: Send + Sync {
    /// Resolve `id` to its content, or `None` if unknown.
    fn get_atom(&self, id: &AtomId) -> Option<Atom>;
}

/// A growing, never-evicting index of every atom this space has ever
/// durably written or recovered. Safe for concurrent readers while a
/// commit is in flight; new atoms become visible only once the frame that
/// introduces them has been published (see `ObjectSpace::commit`).
#[derive(Default)]
pub struct AtomCache {
    atoms: DashMap<AtomId, Atom>,
}

impl AtomCache {
    /// An empty cache.
    pub fn new() -> Self {
        AtomCache { atoms: DashMap::new() }
    }

    /// Insert or overwrite an atom. Content addressing means a re-insert of
    /// an atom already present is always a no-op in effect.
    pub fn insert(&self, atom: Atom) {
        let id = atom.id();
        self.atoms.insert(id, atom);
    }

    /// Bulk-insert, used by recovery.
    pub fn insert_all(&self, atoms: impl IntoIterator<Item = Atom>) {
        for atom in atoms {
            self.insert(atom);
        }
    }

    /// Number of distinct atoms currently indexed.
    pub fn len(&self) -> usize {
        self.atoms.len()
    }

    /// Whether the cache holds no atoms.
    pub fn is_empty(&self) -> bool {
        self.atoms.is_empty()
    }
}

impl AtomReader for AtomCache {
    fn get_atom(&self, id: &AtomId) -> Option<Atom> {
        self.atoms.get(id).map(|entry| entry.value().clone())
    }
}
