//! Persistent `Set`: a HAMT of member identities with the usual algebraic
//! operations, each returning a new persistent set (spec §4.5).

use crate::error::Result;
use crate::hamt;
use protobase_atom::AtomId;
use protobase_txn::{AtomReader, Transaction};

/// Whether `member` is present.
pub fn contains(atoms: &dyn AtomReader, root: AtomId, member: AtomId) -> Result<bool> {
    Ok(hamt::get(atoms, root, member)?.is_some())
}

/// Number of members.
pub fn len(atoms: &dyn AtomReader, root: AtomId) -> Result<u64> {
    hamt::len(atoms, root)
}

/// Add `member`, returning the new root. A no-op (same root returned via
/// identical content) if already present.
pub fn add(txn: &mut Transaction<'_>, root: AtomId, member: AtomId) -> Result<AtomId> {
    hamt::put(txn, root, member, member)
}

/// Remove `member` if present.
pub fn remove(txn: &mut Transaction<'_>, root: AtomId, member: AtomId) -> Result<AtomId> {
    hamt::remove(txn, root, member)
}

/// Every member, in an unspecified but deterministic-per-structure order.
pub fn to_vec(atoms: &dyn AtomReader, root: AtomId) -> Result<Vec<AtomId>> {
    let mut out = Vec::new();
    hamt::for_each(atoms, root, |k, _| out.push(k))?;
    Ok(out)
}

/// Members present in either set.
pub fn union(txn: &mut Transaction<'_>, a: AtomId, b: AtomId) -> Result<AtomId> {
    let mut merged = a;
    let members_of_b = to_vec(txn, b)?;
    for member in members_of_b {
        merged = hamt::put(txn, merged, member, member)?;
    }
    Ok(merged)
}

/// Members present in both sets. Walks whichever side has fewer members.
pub fn intersection(txn: &mut Transaction<'_>, a: AtomId, b: AtomId) -> Result<AtomId> {
    let a_len = hamt::len(txn, a)?;
    let b_len = hamt::len(txn, b)?;
    let (smaller, larger) = if a_len <= b_len { (a, b) } else { (b, a) };
    let members = to_vec(txn, smaller)?;
    let mut result = AtomId::NIL;
    for member in members {
        if hamt::get(txn, larger, member)?.is_some() {
            result = hamt::put(txn, result, member, member)?;
        }
    }
    Ok(result)
}

/// Members in `a` that are not in `b`.
pub fn difference(txn: &mut Transaction<'_>, a: AtomId, b: AtomId) -> Result<AtomId> {
    let members = to_vec(txn, a)?;
    let mut result = AtomId::NIL;
    for member in members {
        if hamt::get(txn, b, member)?.is_none() {
            result = hamt::put(txn, result, member, member)?;
        }
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use protobase_atom::{Atom, AtomTag, Value};
    use protobase_storage::{BlockProvider, MemoryBlockProvider};
    use protobase_txn::ObjectSpace;
    use std::collections::HashSet;
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

    fn build(txn: &mut Transaction<'_>, items: &[&str]) -> (AtomId, Vec<AtomId>) {
        let mut root = AtomId::NIL;
        let mut ids = Vec::new();
        for s in items {
            let id = txn.put_atom(value_atom(s));
            root = add(txn, root, id).unwrap();
            ids.push(id);
        }
        (root, ids)
    }

    #[test]
    fn add_and_contains() {
        let space = space();
        let mut txn = space.new_transaction();
        let (root, ids) = build(&mut txn, &["a", "b", "c"]);
        assert!(contains(&txn, root, ids[0]).unwrap());
        assert_eq!(len(&txn, root).unwrap(), 3);
    }

    #[test]
    fn remove_drops_member() {
        let space = space();
        let mut txn = space.new_transaction();
        let (root, ids) = build(&mut txn, &["a", "b"]);
        let root = remove(&mut txn, root, ids[0]).unwrap();
        assert!(!contains(&txn, root, ids[0]).unwrap());
        assert!(contains(&txn, root, ids[1]).unwrap());
    }

    #[test]
    fn union_contains_all_members_of_both() {
        let space = space();
        let mut txn = space.new_transaction();
        let (a, a_ids) = build(&mut txn, &["a", "b"]);
        let (b, b_ids) = build(&mut txn, &["b", "c"]);
        let u = union(&mut txn, a, b).unwrap();
        let got: HashSet<AtomId> = to_vec(&txn, u).unwrap().into_iter().collect();
        let expected: HashSet<AtomId> = [a_ids[0], a_ids[1], b_ids[1]].into_iter().collect();
        assert_eq!(got, expected);
    }

    #[test]
    fn intersection_keeps_common_members_only() {
        let space = space();
        let mut txn = space.new_transaction();
        let (a, a_ids) = build(&mut txn, &["a", "b"]);
        let (b, _) = build(&mut txn, &["b", "c"]);
        let i = intersection(&mut txn, a, b).unwrap();
        assert_eq!(to_vec(&txn, i).unwrap(), vec![a_ids[1]]);
    }

    #[test]
    fn difference_drops_members_present_in_other() {
        let space = space();
        let mut txn = space.new_transaction();
        let (a, a_ids) = build(&mut txn, &["a", "b"]);
        let (b, _) = build(&mut txn, &["b", "c"]);
        let d = difference(&mut txn, a, b).unwrap();
        assert_eq!(to_vec(&txn, d).unwrap(), vec![a_ids[0]]);
    }
}
