//! Persistent `HashDictionary`: `key atom -> value atom`, backed by the
//! shared HAMT core (spec §4.5).

use crate::error::Result;
use crate::hamt;
use protobase_atom::AtomId;
use protobase_txn::{AtomReader, Transaction};

/// Look up `key`'s value.
pub fn get(atoms: &dyn AtomReader, root: AtomId, key: AtomId) -> Result<Option<AtomId>> {
    hamt::get(atoms, root, key)
}

/// Insert or overwrite `key -> value`.
pub fn put(txn: &mut Transaction<'_>, root: AtomId, key: AtomId, value: AtomId) -> Result<AtomId> {
    hamt::put(txn, root, key, value)
}

/// Remove `key` if present.
pub fn remove(txn: &mut Transaction<'_>, root: AtomId, key: AtomId) -> Result<AtomId> {
    hamt::remove(txn, root, key)
}

/// Number of entries.
pub fn len(atoms: &dyn AtomReader, root: AtomId) -> Result<u64> {
    hamt::len(atoms, root)
}

/// Every `(key, value)` pair, in an unspecified but deterministic-per-structure order.
pub fn to_vec(atoms: &dyn AtomReader, root: AtomId) -> Result<Vec<(AtomId, AtomId)>> {
    let mut out = Vec::new();
    hamt::for_each(atoms, root, |k, v| out.push((k, v)))?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use protobase_atom::{Atom, AtomTag, Value};
    use protobase_storage::{BlockProvider, MemoryBlockProvider};
    use protobase_txn::ObjectSpace;
    use std::sync::Arc;

    fn value_atom(s: &str) -> Atom {
        let mut body = Vec::new();
        Value::Str(s.into()).encode(&mut body);
        Atom { tag: AtomTag::Value, body, refs: vec![] }
    }

    #[test]
    fn put_get_remove_round_trip() {
        let provider: Arc<dyn BlockProvider> = Arc::new(MemoryBlockProvider::new(4096));
        let space = ObjectSpace::open(provider, 8).unwrap();
        let mut txn = space.new_transaction();

        let k = txn.put_atom(value_atom("name"));
        let v = txn.put_atom(value_atom("ada"));
        let root = put(&mut txn, AtomId::NIL, k, v).unwrap();
        assert_eq!(get(&txn, root, k).unwrap(), Some(v));
        assert_eq!(len(&txn, root).unwrap(), 1);

        let root = remove(&mut txn, root, k).unwrap();
        assert_eq!(get(&txn, root, k).unwrap(), None);
    }
}
