//! Snapshot-isolated transactions and the rebase-on-conflict commit
//! protocol (spec §4.4).

use crate::atom_store::AtomReader;
use crate::error::{Result, TxnError};
use crate::space::ObjectSpace;
use protobase_atom::{Atom, AtomId, RootMapData};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{instrument, warn};

/// Merges a local change against a concurrently-committed base, producing a
/// new value to retry the commit with. Supplied by the collection type
/// (`protobase-collections`) that owns the root object's semantics; the
/// object space itself is agnostic to what a root object's bytes mean.
///
/// Takes `&mut Transaction` (rather than a read-only view) because a real
/// merge usually needs to stage new atoms — e.g. a three-way set merge
/// builds a fresh HAMT root. Arguments after the transaction are
/// `(old_base, new_base, local_change)` matching spec §4.4/§4.5: `old_base`
/// is the value this transaction's snapshot was taken against, `new_base`
/// is the value currently committed, and `local_change` is this
/// transaction's proposed new value.
pub type RebaseFn = dyn Fn(&mut Transaction<'_>, AtomId, AtomId, AtomId) -> Result<AtomId> + Send + Sync;

struct RootChange {
    /// Value of this root object when the transaction's snapshot was taken.
    base: AtomId,
    /// This transaction's proposed new value, updated in place by rebase.
    local_new: AtomId,
    /// How to merge `local_new` against a concurrently-advanced base value.
    /// `None` means the write cannot be rebased: any conflict is fatal.
    rebase: Option<Arc<RebaseFn>>,
}

/// A snapshot-isolated unit of work against an [`ObjectSpace`].
///
/// Reads resolve against the root snapshotted at construction and never
/// block on other transactions. Writes are staged in memory and only
/// become visible to other transactions once `commit()` succeeds.
pub struct Transaction<'s> {
    space: &'s ObjectSpace,
    snapshot_root: AtomId,
    staged_atoms: HashMap<AtomId, Atom>,
    root_changes: HashMap<String, RootChange>,
}

impl<'s> Transaction<'s> {
    pub(crate) fn new(space: &'s ObjectSpace, snapshot_root: AtomId) -> Self {
        Transaction {
            space,
            snapshot_root,
            staged_atoms: HashMap::new(),
            root_changes: HashMap::new(),
        }
    }

    /// Stage a new atom, returning its identity. Staged atoms are visible
    /// to this transaction's own reads immediately, and to the rest of the
    /// space only once `commit()` publishes them.
    pub fn put_atom(&mut self, atom: Atom) -> AtomId {
        let id = atom.id();
        self.staged_atoms.insert(id, atom);
        id
    }

    /// Resolve an atom, checking this transaction's staging map before
    /// falling back to the space's durable atom cache.
    pub fn get_atom(&self, id: &AtomId) -> Result<Atom> {
        if let Some(atom) = self.staged_atoms.get(id) {
            return Ok(atom.clone());
        }
        self.space.atoms().get_atom(id).ok_or(TxnError::UnknownAtom(*id))
    }

    /// Read the current value of a named root object against this
    /// transaction's snapshot.
    pub fn get_root_object(&self, name: &str) -> Result<Option<AtomId>> {
        if let Some(change) = self.root_changes.get(name) {
            return Ok(Some(change.local_new));
        }
        let map = self.space.root_map_at(self.snapshot_root)?;
        Ok(map.get(name))
    }

    /// Stage a new value for a named root object. `rebase` merges this
    /// write against a concurrently-committed value if the fast path
    /// (§4.4 step 2) isn't available at commit time.
    pub fn set_root_object(&mut self, name: &str, new_value: AtomId, rebase: Arc<RebaseFn>) {
        let base = self.get_root_object(name).ok().flatten().unwrap_or(AtomId::NIL);
        self.root_changes.insert(
            name.to_string(),
            RootChange { base, local_new: new_value, rebase: Some(rebase) },
        );
    }

    /// Stage a root object write with no rebase strategy: any concurrent
    /// change to this name makes the transaction unconditionally conflict.
    /// Used for one-shot creation transactions (`ObjectSpace::get_database`).
    pub fn set_root_object_no_rebase(&mut self, name: &str, new_value: AtomId) {
        let base = self.get_root_object(name).ok().flatten().unwrap_or(AtomId::NIL);
        self.root_changes.insert(name.to_string(), RootChange { base, local_new: new_value, rebase: None });
    }

    /// Commit the transaction: acquire the commit mutex, fast-path if no
    /// concurrent writer has advanced the root since this snapshot was
    /// taken, otherwise rebase each modified root object against the
    /// current committed value, retrying up to the space's configured
    /// attempt budget (spec §4.4, §5).
    #[instrument(level = "debug", skip(self), fields(snapshot_root = %self.snapshot_root))]
    pub fn commit(mut self) -> Result<AtomId> {
        let _guard = self.space.commit_mutex().lock();

        let max_attempts = self.space.max_rebase_attempts();
        let mut attempt = 0u32;

        loop {
            let current_root = self.space.current_root();

            if current_root == self.snapshot_root || self.root_changes.is_empty() {
                return self.publish(current_root);
            }

            if attempt >= max_attempts {
                let object = self
                    .root_changes
                    .keys()
                    .next()
                    .cloned()
                    .unwrap_or_else(|| "<unknown>".to_string());
                return Err(TxnError::Conflict { object, attempts: attempt });
            }
            attempt += 1;

            let new_base_map = self.space.root_map_at(current_root)?;
            let names: Vec<String> = self.root_changes.keys().cloned().collect();
            for name in names {
                let new_base = new_base_map.get(&name).unwrap_or(AtomId::NIL);
                let mut change = self.root_changes.remove(&name).expect("name came from this map's keys");
                if new_base != change.base {
                    match change.rebase.clone() {
                        Some(rebase) => {
                            warn!(object = %name, attempt, "rebasing root object against concurrent update");
                            let merged = rebase(&mut self, change.base, new_base, change.local_new)?;
                            change.local_new = merged;
                            change.base = new_base;
                        }
                        None => {
                            return Err(TxnError::Conflict { object: name, attempts: attempt });
                        }
                    }
                }
                self.root_changes.insert(name, change);
            }

            self.snapshot_root = current_root;
        }
    }

    fn publish(self, current_root: AtomId) -> Result<AtomId> {
        if self.root_changes.is_empty() {
            return Ok(current_root);
        }

        let base_map = self.space.root_map_at(current_root)?;
        let mut entries: HashMap<String, AtomId> = base_map.entries.into_iter().collect();
        for (name, change) in &self.root_changes {
            entries.insert(name.clone(), change.local_new);
        }
        let mut entries: Vec<(String, AtomId)> = entries.into_iter().collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        let new_root_map = RootMapData { entries };
        let root_atom = new_root_map.to_atom();
        let new_root_id = root_atom.id();

        let mut atoms: Vec<Atom> = self.staged_atoms.into_values().collect();
        atoms.push(root_atom);

        let txn_id = self.space.wal().reserve_txn_id();
        self.space.wal().append_frame(txn_id, atoms.clone(), new_root_id)?;
        self.space.wal().sync()?;

        for atom in atoms {
            self.space.atoms().insert(atom);
        }
        self.space.publish(new_root_id);

        Ok(new_root_id)
    }
}

impl<'s> AtomReader for Transaction<'s> {
    fn get_atom(&self, id: &AtomId) -> Option<Atom> {
        Transaction::get_atom(self, id).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::space::ObjectSpace;
    use protobase_atom::{AtomTag, Value};
    use protobase_storage::{BlockProvider, MemoryBlockProvider};

    fn value_atom(s: &str) -> Atom {
        let mut body = Vec::new();
        Value::Str(s.into()).encode(&mut body);
        Atom { tag: AtomTag::Value, body, refs: vec![] }
    }

    fn unconditional_overwrite() -> Arc<RebaseFn> {
        Arc::new(|_txn, _old_base, _new_base, local| Ok(local))
    }

    #[test]
    fn fast_path_commit_when_no_concurrent_writer() {
        let provider: Arc<dyn BlockProvider> = Arc::new(MemoryBlockProvider::new(4096));
        let space = ObjectSpace::open(provider, 8).unwrap();

        let mut txn = space.new_transaction();
        let id = txn.put_atom(value_atom("hello"));
        txn.set_root_object("greeting", id, unconditional_overwrite());
        let new_root = txn.commit().unwrap();
        assert_eq!(space.current_root(), new_root);

        let read_txn = space.new_transaction();
        assert_eq!(read_txn.get_root_object("greeting").unwrap(), Some(id));
    }

    #[test]
    fn concurrent_writers_on_disjoint_names_both_succeed_via_rebase() {
        let provider: Arc<dyn BlockProvider> = Arc::new(MemoryBlockProvider::new(4096));
        let space = ObjectSpace::open(provider, 8).unwrap();

        let mut txn_a = space.new_transaction();
        let mut txn_b = space.new_transaction();

        let id_a = txn_a.put_atom(value_atom("a"));
        txn_a.set_root_object("a", id_a, unconditional_overwrite());

        let id_b = txn_b.put_atom(value_atom("b"));
        txn_b.set_root_object("b", id_b, unconditional_overwrite());

        txn_a.commit().unwrap();
        txn_b.commit().unwrap();

        let read_txn = space.new_transaction();
        assert_eq!(read_txn.get_root_object("a").unwrap(), Some(id_a));
        assert_eq!(read_txn.get_root_object("b").unwrap(), Some(id_b));
    }

    #[test]
    fn no_rebase_strategy_conflicts_on_concurrent_change() {
        let provider: Arc<dyn BlockProvider> = Arc::new(MemoryBlockProvider::new(4096));
        let space = ObjectSpace::open(provider, 8).unwrap();

        let mut txn_a = space.new_transaction();
        let mut txn_b = space.new_transaction();

        let id_a = txn_a.put_atom(value_atom("a"));
        txn_a.set_root_object_no_rebase("shared", id_a);
        let id_b = txn_b.put_atom(value_atom("b"));
        txn_b.set_root_object_no_rebase("shared", id_b);

        txn_a.commit().unwrap();
        let err = txn_b.commit().unwrap_err();
        assert!(matches!(err, TxnError::Conflict { .. }));
    }

    #[test]
    fn rebase_merges_concurrent_updates_to_the_same_name() {
        let provider: Arc<dyn BlockProvider> = Arc::new(MemoryBlockProvider::new(4096));
        let space = ObjectSpace::open(provider, 8).unwrap();

        // Seed an initial value.
        let mut seed = space.new_transaction();
        let seed_id = seed.put_atom(value_atom("seed"));
        seed.set_root_object("counter", seed_id, unconditional_overwrite());
        seed.commit().unwrap();

        let mut txn_a = space.new_transaction();
        let mut txn_b = space.new_transaction();

        let id_a = txn_a.put_atom(value_atom("from-a"));
        txn_a.set_root_object("counter", id_a, unconditional_overwrite());
        let id_b = txn_b.put_atom(value_atom("from-b"));
        // B's rebase strategy: keep whatever is currently committed,
        // simulating a merge that folds the remote change in.
        txn_b.set_root_object(
            "counter",
            id_b,
            Arc::new(|_txn, _old_base, new_base, _local| Ok(new_base)),
        );

        txn_a.commit().unwrap();
        txn_b.commit().unwrap();

        let read_txn = space.new_transaction();
        assert_eq!(read_txn.get_root_object("counter").unwrap(), Some(id_a));
    }

    #[test]
    fn exhausting_rebase_attempts_returns_conflict() {
        let provider: Arc<dyn BlockProvider> = Arc::new(MemoryBlockProvider::new(4096));
        let space = ObjectSpace::open(provider, 1).unwrap();

        let mut seed = space.new_transaction();
        let seed_id = seed.put_atom(value_atom("seed"));
        seed.set_root_object("x", seed_id, unconditional_overwrite());
        seed.commit().unwrap();

        let mut txn = space.new_transaction();
        let id = txn.put_atom(value_atom("mine"));
        // A rebase strategy that never converges, simulating a merge
        // function that reports the conflict as unresolvable.
        txn.set_root_object(
            "x",
            id,
            Arc::new(|_txn, _old_base, _new_base, _local| {
                Err(TxnError::Conflict { object: "x".into(), attempts: 0 })
            }),
        );

        // Advance the committed value concurrently so the fast path can't
        // apply and the rebase closure above is invoked.
        let mut other = space.new_transaction();
        let other_id = other.put_atom(value_atom("theirs"));
        other.set_root_object("x", other_id, unconditional_overwrite());
        other.commit().unwrap();

        let err = txn.commit().unwrap_err();
        assert!(matches!(err, TxnError::Conflict { .. }));
    }
}
