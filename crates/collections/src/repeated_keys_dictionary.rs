//! `RepeatedKeysDictionary`: `key atom -> Set<value atom>`, letting a single
//! key carry more than one value (spec §4.5). Built directly on
//! [`crate::hash_dictionary`] whose values are themselves [`crate::set`]
//! roots rather than bare atoms.
//!
//! Root-object writes against a `RepeatedKeysDictionary` are expected to
//! use [`merge_rebase`] as their [`protobase_txn::RebaseFn`]: on a
//! concurrent update to the same root, each key's value set is merged
//! three-way against the last common base rather than the whole write
//! unconditionally conflicting.

use crate::error::Result;
use crate::{hash_dictionary, set};
use protobase_atom::AtomId;
use protobase_txn::{AtomReader, Transaction};
use std::collections::HashSet;

/// Every value recorded under `key`, or an empty vec if the key is absent.
pub fn get(atoms: &dyn AtomReader, root: AtomId, key: AtomId) -> Result<Vec<AtomId>> {
    match hash_dictionary::get(atoms, root, key)? {
        Some(set_root) => set::to_vec(atoms, set_root),
        None => Ok(Vec::new()),
    }
}

/// Whether `key` has `value` recorded against it.
pub fn contains(atoms: &dyn AtomReader, root: AtomId, key: AtomId, value: AtomId) -> Result<bool> {
    match hash_dictionary::get(atoms, root, key)? {
        Some(set_root) => set::contains(atoms, set_root, value),
        None => Ok(false),
    }
}

/// Number of distinct keys.
pub fn len(atoms: &dyn AtomReader, root: AtomId) -> Result<u64> {
    hash_dictionary::len(atoms, root)
}

/// Record `value` under `key`, creating the key's value set if absent.
pub fn set_at(txn: &mut Transaction<'_>, root: AtomId, key: AtomId, value: AtomId) -> Result<AtomId> {
    let current_set = hash_dictionary::get(txn, root, key)?.unwrap_or(AtomId::NIL);
    let new_set = set::add(txn, current_set, value)?;
    hash_dictionary::put(txn, root, key, new_set)
}

/// Drop `key` and every value recorded under it.
pub fn remove_at(txn: &mut Transaction<'_>, root: AtomId, key: AtomId) -> Result<AtomId> {
    hash_dictionary::remove(txn, root, key)
}

/// Remove just `value` from `key`'s set, dropping `key` entirely if that
/// empties it.
pub fn remove_record_at(txn: &mut Transaction<'_>, root: AtomId, key: AtomId, value: AtomId) -> Result<AtomId> {
    let Some(current_set) = hash_dictionary::get(txn, root, key)? else {
        return Ok(root);
    };
    let new_set = set::remove(txn, current_set, value)?;
    if new_set.is_nil() {
        hash_dictionary::remove(txn, root, key)
    } else {
        hash_dictionary::put(txn, root, key, new_set)
    }
}

/// Every `(key, values)` pair.
pub fn to_vec(atoms: &dyn AtomReader, root: AtomId) -> Result<Vec<(AtomId, Vec<AtomId>)>> {
    hash_dictionary::to_vec(atoms, root)?
        .into_iter()
        .map(|(k, set_root)| Ok((k, set::to_vec(atoms, set_root)?)))
        .collect()
}

fn all_keys(atoms: &dyn AtomReader, roots: &[AtomId]) -> Result<Vec<AtomId>> {
    let mut seen = HashSet::new();
    let mut keys = Vec::new();
    for root in roots {
        for (k, _) in hash_dictionary::to_vec(atoms, *root)? {
            if seen.insert(k) {
                keys.push(k);
            }
        }
    }
    Ok(keys)
}

/// Three-way merge for a `RepeatedKeysDictionary` root object, suitable as a
/// [`protobase_txn::RebaseFn`] passed to
/// [`protobase_txn::Transaction::set_root_object`].
///
/// For every key touched by the local transaction, merges its value set as
/// `((base ∪ localAdds) ∪ remoteAdds) − (localRemoves ∪ remoteRemoves)`:
/// additions from either side are kept, but either side removing a value
/// wins over the other side keeping it. Keys the local transaction never
/// touched are left exactly as the concurrently-committed `new_base` has
/// them.
pub fn merge_rebase(
    txn: &mut Transaction<'_>,
    base_root: AtomId,
    new_base_root: AtomId,
    local_root: AtomId,
) -> protobase_txn::Result<AtomId> {
    let keys = all_keys(txn, &[base_root, new_base_root, local_root]).map_err(to_txn_error)?;

    let mut merged_root = new_base_root;
    for key in keys {
        let base_set = hash_dictionary::get(txn, base_root, key).map_err(to_txn_error)?.unwrap_or(AtomId::NIL);
        let local_set = hash_dictionary::get(txn, local_root, key).map_err(to_txn_error)?.unwrap_or(AtomId::NIL);
        let remote_set = hash_dictionary::get(txn, new_base_root, key).map_err(to_txn_error)?.unwrap_or(AtomId::NIL);

        if local_set == base_set {
            // This transaction never touched the key; whatever the
            // concurrently-committed value already has stands.
            continue;
        }

        let local_adds = set::difference(txn, local_set, base_set).map_err(to_txn_error)?;
        let local_removes = set::difference(txn, base_set, local_set).map_err(to_txn_error)?;
        let remote_adds = set::difference(txn, remote_set, base_set).map_err(to_txn_error)?;
        let remote_removes = set::difference(txn, base_set, remote_set).map_err(to_txn_error)?;

        let unioned = set::union(txn, base_set, local_adds).map_err(to_txn_error)?;
        let unioned = set::union(txn, unioned, remote_adds).map_err(to_txn_error)?;
        let all_removes = set::union(txn, local_removes, remote_removes).map_err(to_txn_error)?;
        let merged_set = set::difference(txn, unioned, all_removes).map_err(to_txn_error)?;

        merged_root = if merged_set.is_nil() {
            hash_dictionary::remove(txn, merged_root, key).map_err(to_txn_error)?
        } else {
            hash_dictionary::put(txn, merged_root, key, merged_set).map_err(to_txn_error)?
        };
    }

    Ok(merged_root)
}

fn to_txn_error(err: crate::error::CollectionError) -> protobase_txn::TxnError {
    match err {
        crate::error::CollectionError::Txn(e) => e,
        other => protobase_txn::TxnError::NoSuchRootObject(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use protobase_atom::{Atom, AtomTag, Value};
    use protobase_storage::{BlockProvider, MemoryBlockProvider};
    use protobase_txn::ObjectSpace;
    use std::collections::HashSet as StdHashSet;
    use std::sync::Arc;

    fn value_atom(s: &str) -> Atom {
        let mut body = Vec::new();
        Value::Str(s.into()).encode(&mut body);
        Atom { tag: AtomTag::Value, body, refs: vec![] }
    }

    fn space() -> ObjectSpace {
        let provider: Arc<dyn BlockProvider> = Arc::new(MemoryBlockProvider::new(4096));
        ObjectSpace::open(provider, 8).unwrap()
    }

    #[test]
    fn set_at_accumulates_multiple_values_per_key() {
        let space = space();
        let mut txn = space.new_transaction();
        let key = txn.put_atom(value_atom("tag:rust"));
        let v1 = txn.put_atom(value_atom("doc-1"));
        let v2 = txn.put_atom(value_atom("doc-2"));

        let root = set_at(&mut txn, AtomId::NIL, key, v1).unwrap();
        let root = set_at(&mut txn, root, key, v2).unwrap();

        let got: StdHashSet<AtomId> = get(&txn, root, key).unwrap().into_iter().collect();
        assert_eq!(got, [v1, v2].into_iter().collect());
    }

    #[test]
    fn remove_record_drops_only_that_value() {
        let space = space();
        let mut txn = space.new_transaction();
        let key = txn.put_atom(value_atom("tag:rust"));
        let v1 = txn.put_atom(value_atom("doc-1"));
        let v2 = txn.put_atom(value_atom("doc-2"));

        let root = set_at(&mut txn, AtomId::NIL, key, v1).unwrap();
        let root = set_at(&mut txn, root, key, v2).unwrap();
        let root = remove_record_at(&mut txn, root, key, v1).unwrap();

        assert_eq!(get(&txn, root, key).unwrap(), vec![v2]);
    }

    #[test]
    fn remove_record_emptying_the_set_drops_the_key() {
        let space = space();
        let mut txn = space.new_transaction();
        let key = txn.put_atom(value_atom("tag:rust"));
        let v1 = txn.put_atom(value_atom("doc-1"));

        let root = set_at(&mut txn, AtomId::NIL, key, v1).unwrap();
        let root = remove_record_at(&mut txn, root, key, v1).unwrap();

        assert_eq!(len(&txn, root).unwrap(), 0);
    }

    #[test]
    fn concurrent_adds_to_different_keys_both_survive_rebase() {
        let space = space();

        let mut seed = space.new_transaction();
        let key_a = seed.put_atom(value_atom("a"));
        let key_b = seed.put_atom(value_atom("b"));
        seed.set_root_object_no_rebase("index", AtomId::NIL);
        seed.commit().unwrap();

        let mut txn_1 = space.new_transaction();
        let mut txn_2 = space.new_transaction();

        let v1 = txn_1.put_atom(value_atom("v1"));
        let root_1 = set_at(&mut txn_1, AtomId::NIL, key_a, v1).unwrap();
        txn_1.set_root_object("index", root_1, Arc::new(merge_rebase));

        let v2 = txn_2.put_atom(value_atom("v2"));
        let root_2 = set_at(&mut txn_2, AtomId::NIL, key_b, v2).unwrap();
        txn_2.set_root_object("index", root_2, Arc::new(merge_rebase));

        txn_1.commit().unwrap();
        txn_2.commit().unwrap();

        let read_txn = space.new_transaction();
        let final_root = read_txn.get_root_object("index").unwrap().unwrap();
        assert_eq!(get(&read_txn, final_root, key_a).unwrap(), vec![v1]);
        assert_eq!(get(&read_txn, final_root, key_b).unwrap(), vec![v2]);
    }

    #[test]
    fn concurrent_remove_wins_over_concurrent_keep() {
        let space = space();

        let mut seed = space.new_transaction();
        let key = seed.put_atom(value_atom("key"));
        let v = seed.put_atom(value_atom("v"));
        let base_root = set_at(&mut seed, AtomId::NIL, key, v).unwrap();
        seed.set_root_object_no_rebase("index", base_root);
        seed.commit().unwrap();

        // txn_1 removes v from key; txn_2 adds an unrelated value under the
        // same key without touching v. The remove must survive the merge.
        let mut txn_1 = space.new_transaction();
        let mut txn_2 = space.new_transaction();

        let root_1 = remove_record_at(&mut txn_1, base_root, key, v).unwrap();
        txn_1.set_root_object("index", root_1, Arc::new(merge_rebase));

        let other = txn_2.put_atom(value_atom("other"));
        let root_2 = set_at(&mut txn_2, base_root, key, other).unwrap();
        txn_2.set_root_object("index", root_2, Arc::new(merge_rebase));

        txn_1.commit().unwrap();
        txn_2.commit().unwrap();

        let read_txn = space.new_transaction();
        let final_root = read_txn.get_root_object("index").unwrap().unwrap();
        let got: StdHashSet<AtomId> = get(&read_txn, final_root, key).unwrap().into_iter().collect();
        assert_eq!(got, [other].into_iter().collect());
    }
}
