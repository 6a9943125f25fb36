//! Hash array mapped trie core shared by `HashDictionary`, `Set`, and
//! `RepeatedKeysDictionary` (spec §4.5).
//!
//! Keys and values are atom identities. Because atoms are content-addressed,
//! two keys are equal iff their atom ids are equal — there is no separate
//! key-equality hook to invoke. The hash consumed to route through the trie
//! is derived from the key atom's own content hash (its id), so string keys
//! hash canonically by construction: the id of a `Value::Str` atom is
//! already a content hash of its canonical UTF-8 bytes.
//!
//! A root is `AtomId::NIL` (empty), a bare [`HamtCollisionLeafData`] atom
//! (one entry, or several genuinely colliding ones once all 60 hash bits
//! are exhausted), or a [`HamtBranchData`] atom.

use crate::error::{CollectionError, Result};
use protobase_atom::{Atom, AtomId, HamtBranchData, HamtCollisionLeafData};
use protobase_txn::{AtomReader, Transaction};

const BITS_PER_LEVEL: u32 = 5;
/// `64 / 5` rounded down: how many levels before the hash is exhausted and
/// any further keys landing in the same slot are a genuine collision.
const MAX_LEVEL: u32 = 12;

fn hash_key(key: AtomId) -> u64 {
    u64::from_le_bytes(key.as_bytes()[0..8].try_into().unwrap())
}

fn chunk(hash: u64, level: u32) -> u32 {
    ((hash >> (level.min(MAX_LEVEL) * BITS_PER_LEVEL)) & 0x1f) as u32
}

enum Node {
    Branch(HamtBranchData),
    Collision(HamtCollisionLeafData),
}

fn load(atoms: &dyn AtomReader, id: AtomId) -> Result<Node> {
    let atom = atoms.get_atom(&id).ok_or_else(|| {
        CollectionError::CorruptNode(format!("missing hamt node atom {id}"))
    })?;
    match atom.tag {
        protobase_atom::AtomTag::HamtBranch => Ok(Node::Branch(HamtBranchData::from_atom(&atom)?)),
        protobase_atom::AtomTag::HamtCollisionLeaf => {
            Ok(Node::Collision(HamtCollisionLeafData::from_atom(&atom)?))
        }
        other => Err(CollectionError::CorruptNode(format!("unexpected tag {other:?} in hamt"))),
    }
}

fn stage(txn: &mut Transaction<'_>, atom: Atom) -> AtomId {
    txn.put_atom(atom)
}

fn make_leaf(txn: &mut Transaction<'_>, key: AtomId, value: AtomId) -> AtomId {
    stage(txn, HamtCollisionLeafData { pairs: vec![(key, value)] }.to_atom())
}

fn make_branch(txn: &mut Transaction<'_>, bitmap: u32, children: Vec<AtomId>) -> AtomId {
    stage(txn, HamtBranchData { bitmap, children }.to_atom())
}

/// Look up `key`'s value, or `None` if absent.
pub fn get(atoms: &dyn AtomReader, root: AtomId, key: AtomId) -> Result<Option<AtomId>> {
    if root.is_nil() {
        return Ok(None);
    }
    get_at(atoms, root, key, hash_key(key), 0)
}

fn get_at(atoms: &dyn AtomReader, node: AtomId, key: AtomId, hash: u64, level: u32) -> Result<Option<AtomId>> {
    match load(atoms, node)? {
        Node::Collision(leaf) => Ok(leaf.pairs.iter().find(|(k, _)| *k == key).map(|(_, v)| *v)),
        Node::Branch(b) => {
            let bit = chunk(hash, level);
            let mask = 1u32 << bit;
            if b.bitmap & mask == 0 {
                return Ok(None);
            }
            let idx = b.slot_index(bit).expect("bit set implies slot present");
            get_at(atoms, b.children[idx], key, hash, level + 1)
        }
    }
}

/// Insert or overwrite `key -> value`, returning the new root.
pub fn put(txn: &mut Transaction<'_>, root: AtomId, key: AtomId, value: AtomId) -> Result<AtomId> {
    put_at(txn, root, key, value, hash_key(key), 0)
}

fn put_at(
    txn: &mut Transaction<'_>,
    node: AtomId,
    key: AtomId,
    value: AtomId,
    hash: u64,
    level: u32,
) -> Result<AtomId> {
    if node.is_nil() {
        return Ok(make_leaf(txn, key, value));
    }
    match load(txn, node)? {
        Node::Collision(leaf) if leaf.pairs.len() == 1 => {
            let (existing_key, existing_value) = leaf.pairs[0];
            if existing_key == key {
                return Ok(make_leaf(txn, key, value));
            }
            if level >= MAX_LEVEL {
                return Ok(stage(
                    txn,
                    HamtCollisionLeafData { pairs: vec![(existing_key, existing_value), (key, value)] }
                        .to_atom(),
                ));
            }
            // Both keys route to the same slot at this level; merge one
            // level deeper and wrap the result in a single-bit branch.
            let existing_leaf = make_leaf(txn, existing_key, existing_value);
            let merged = put_at(txn, existing_leaf, key, value, hash, level + 1)?;
            let bit = chunk(hash, level);
            Ok(make_branch(txn, 1 << bit, vec![merged]))
        }
        Node::Collision(leaf) => {
            let mut pairs = leaf.pairs.clone();
            if let Some(pair) = pairs.iter_mut().find(|(k, _)| *k == key) {
                pair.1 = value;
            } else {
                pairs.push((key, value));
            }
            Ok(stage(txn, HamtCollisionLeafData { pairs }.to_atom()))
        }
        Node::Branch(b) => {
            let bit = chunk(hash, level);
            let mask = 1u32 << bit;
            if b.bitmap & mask != 0 {
                let idx = b.slot_index(bit).expect("bit set implies slot present");
                let mut children = b.children.clone();
                children[idx] = put_at(txn, children[idx], key, value, hash, level + 1)?;
                Ok(make_branch(txn, b.bitmap, children))
            } else {
                let idx = (b.bitmap & (mask - 1)).count_ones() as usize;
                let mut children = b.children.clone();
                children.insert(idx, make_leaf(txn, key, value));
                Ok(make_branch(txn, b.bitmap | mask, children))
            }
        }
    }
}

enum RemoveOutcome {
    NotFound,
    Removed(AtomId),
}

/// Remove `key` if present, returning the new root (unchanged if absent).
pub fn remove(txn: &mut Transaction<'_>, root: AtomId, key: AtomId) -> Result<AtomId> {
    if root.is_nil() {
        return Ok(root);
    }
    match remove_at(txn, root, key, hash_key(key), 0)? {
        RemoveOutcome::NotFound => Ok(root),
        RemoveOutcome::Removed(new_root) => Ok(new_root),
    }
}

fn remove_at(txn: &mut Transaction<'_>, node: AtomId, key: AtomId, hash: u64, level: u32) -> Result<RemoveOutcome> {
    match load(txn, node)? {
        Node::Collision(leaf) => match leaf.pairs.iter().position(|(k, _)| *k == key) {
            None => Ok(RemoveOutcome::NotFound),
            Some(pos) => {
                let mut pairs = leaf.pairs.clone();
                pairs.remove(pos);
                if pairs.is_empty() {
                    Ok(RemoveOutcome::Removed(AtomId::NIL))
                } else {
                    Ok(RemoveOutcome::Removed(stage(txn, HamtCollisionLeafData { pairs }.to_atom())))
                }
            }
        },
        Node::Branch(b) => {
            let bit = chunk(hash, level);
            let mask = 1u32 << bit;
            if b.bitmap & mask == 0 {
                return Ok(RemoveOutcome::NotFound);
            }
            let idx = b.slot_index(bit).expect("bit set implies slot present");
            match remove_at(txn, b.children[idx], key, hash, level + 1)? {
                RemoveOutcome::NotFound => Ok(RemoveOutcome::NotFound),
                RemoveOutcome::Removed(new_child) => {
                    if new_child.is_nil() {
                        let new_bitmap = b.bitmap & !mask;
                        let mut children = b.children.clone();
                        children.remove(idx);
                        if new_bitmap == 0 {
                            Ok(RemoveOutcome::Removed(AtomId::NIL))
                        } else if children.len() == 1 {
                            // Structural invariant: a branch always has >=2
                            // populated slots, so collapse to the sole child.
                            Ok(RemoveOutcome::Removed(children[0]))
                        } else {
                            Ok(RemoveOutcome::Removed(make_branch(txn, new_bitmap, children)))
                        }
                    } else {
                        let mut children = b.children.clone();
                        children[idx] = new_child;
                        Ok(RemoveOutcome::Removed(make_branch(txn, b.bitmap, children)))
                    }
                }
            }
        }
    }
}

/// Visit every `(key, value)` pair in the trie, in an unspecified but
/// deterministic-per-structure order.
pub fn for_each(atoms: &dyn AtomReader, root: AtomId, mut visit: impl FnMut(AtomId, AtomId)) -> Result<()> {
    if root.is_nil() {
        return Ok(());
    }
    walk(atoms, root, &mut visit)
}

fn walk(atoms: &dyn AtomReader, node: AtomId, visit: &mut impl FnMut(AtomId, AtomId)) -> Result<()> {
    match load(atoms, node)? {
        Node::Collision(leaf) => {
            for (k, v) in leaf.pairs {
                visit(k, v);
            }
            Ok(())
        }
        Node::Branch(b) => {
            for child in b.children {
                walk(atoms, child, visit)?;
            }
            Ok(())
        }
    }
}

/// Count entries via a full traversal. HAMT branches don't cache subtree
/// counts (unlike `List`), so this is O(n); callers that need frequent
/// length queries should track counts themselves at a higher layer.
pub fn len(atoms: &dyn AtomReader, root: AtomId) -> Result<u64> {
    let mut count = 0u64;
    for_each(atoms, root, |_, _| count += 1)?;
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use protobase_atom::{AtomTag, Value};
    use protobase_storage::{BlockProvider, MemoryBlockProvider};
    use protobase_txn::ObjectSpace;
    use std::sync::Arc;

    fn atom(tag: AtomTag, s: &str) -> Atom {
        let mut body = Vec::new();
        Value::Str(s.into()).encode(&mut body);
        Atom { tag, body, refs: vec![] }
    }

    fn space() -> ObjectSpace {
        let provider: Arc<dyn BlockProvider> = Arc::new(MemoryBlockProvider::new(4096));
        ObjectSpace::open(provider, 8).unwrap()
    }

    #[test]
    fn put_then_get_round_trips() {
        let space = space();
        let mut txn = space.new_transaction();
        let k1 = txn.put_atom(atom(AtomTag::Value, "k1"));
        let v1 = txn.put_atom(atom(AtomTag::Value, "v1"));
        let root = put(&mut txn, AtomId::NIL, k1, v1).unwrap();
        assert_eq!(get(&txn, root, k1).unwrap(), Some(v1));
    }

    #[test]
    fn many_inserts_are_all_retrievable() {
        let space = space();
        let mut txn = space.new_transaction();
        let mut root = AtomId::NIL;
        let mut pairs = Vec::new();
        for i in 0..500 {
            let k = txn.put_atom(atom(AtomTag::Value, &format!("key-{i}")));
            let v = txn.put_atom(atom(AtomTag::Value, &format!("val-{i}")));
            root = put(&mut txn, root, k, v).unwrap();
            pairs.push((k, v));
        }
        for (k, v) in &pairs {
            assert_eq!(get(&txn, root, *k).unwrap(), Some(*v));
        }
        assert_eq!(len(&txn, root).unwrap(), 500);
    }

    #[test]
    fn overwrite_replaces_value() {
        let space = space();
        let mut txn = space.new_transaction();
        let k = txn.put_atom(atom(AtomTag::Value, "k"));
        let v1 = txn.put_atom(atom(AtomTag::Value, "v1"));
        let v2 = txn.put_atom(atom(AtomTag::Value, "v2"));
        let root = put(&mut txn, AtomId::NIL, k, v1).unwrap();
        let root = put(&mut txn, root, k, v2).unwrap();
        assert_eq!(get(&txn, root, k).unwrap(), Some(v2));
        assert_eq!(len(&txn, root).unwrap(), 1);
    }

    #[test]
    fn remove_collapses_branch_to_single_child() {
        let space = space();
        let mut txn = space.new_transaction();
        let mut root = AtomId::NIL;
        let mut keys = Vec::new();
        for i in 0..200 {
            let k = txn.put_atom(atom(AtomTag::Value, &format!("key-{i}")));
            let v = txn.put_atom(atom(AtomTag::Value, &format!("val-{i}")));
            root = put(&mut txn, root, k, v).unwrap();
            keys.push(k);
        }
        for k in &keys[1..] {
            root = remove(&mut txn, root, *k).unwrap();
        }
        assert_eq!(len(&txn, root).unwrap(), 1);
        assert_eq!(get(&txn, root, keys[0]).unwrap().is_some(), true);
    }

    #[test]
    fn removing_everything_empties_the_root() {
        let space = space();
        let mut txn = space.new_transaction();
        let k = txn.put_atom(atom(AtomTag::Value, "only"));
        let v = txn.put_atom(atom(AtomTag::Value, "val"));
        let root = put(&mut txn, AtomId::NIL, k, v).unwrap();
        let root = remove(&mut txn, root, k).unwrap();
        assert!(root.is_nil());
    }

    #[test]
    fn removing_absent_key_is_a_no_op() {
        let space = space();
        let mut txn = space.new_transaction();
        let k = txn.put_atom(atom(AtomTag::Value, "present"));
        let v = txn.put_atom(atom(AtomTag::Value, "val"));
        let absent = txn.put_atom(atom(AtomTag::Value, "absent"));
        let root = put(&mut txn, AtomId::NIL, k, v).unwrap();
        let root2 = remove(&mut txn, root, absent).unwrap();
        assert_eq!(root, root2);
    }
}
