//! `Dictionary`: a string-keyed [`crate::hash_dictionary`], taking care of
//! wrapping/unwrapping keys as `Value::Str` atoms so callers work in plain
//! `&str` rather than juggling atom identities for keys themselves.

use crate::error::{CollectionError, Result};
use crate::hash_dictionary;
use protobase_atom::{Atom, AtomId, AtomTag, Value};
use protobase_txn::{AtomReader, Transaction};

fn key_atom(key: &str) -> Atom {
    let mut body = Vec::new();
    Value::Str(key.to_string()).encode(&mut body);
    Atom { tag: AtomTag::Value, body, refs: Vec::new() }
}

fn decode_key(atoms: &dyn AtomReader, id: AtomId) -> Result<String> {
    let atom = atoms
        .get_atom(&id)
        .ok_or_else(|| CollectionError::CorruptNode(format!("missing dictionary key atom {id}")))?;
    match Value::decode(&atom.body)?.0 {
        Value::Str(s) => Ok(s),
        other => Err(CollectionError::CorruptNode(format!("dictionary key is not a string: {other:?}"))),
    }
}

/// Look up `key`'s value atom.
pub fn get(atoms: &dyn AtomReader, root: AtomId, key: &str) -> Result<Option<AtomId>> {
    let key_id = key_atom(key).id();
    hash_dictionary::get(atoms, root, key_id)
}

/// Insert or overwrite `key -> value`. The key atom is staged on every
/// call; content addressing means re-staging an already-durable key is a
/// no-op in effect.
pub fn put(txn: &mut Transaction<'_>, root: AtomId, key: &str, value: AtomId) -> Result<AtomId> {
    let key_id = txn.put_atom(key_atom(key));
    hash_dictionary::put(txn, root, key_id, value)
}

/// Remove `key` if present.
pub fn remove(txn: &mut Transaction<'_>, root: AtomId, key: &str) -> Result<AtomId> {
    let key_id = key_atom(key).id();
    hash_dictionary::remove(txn, root, key_id)
}

/// Number of entries.
pub fn len(atoms: &dyn AtomReader, root: AtomId) -> Result<u64> {
    hash_dictionary::len(atoms, root)
}

/// Every `(key, value)` pair, keys decoded back to `String`.
pub fn to_vec(atoms: &dyn AtomReader, root: AtomId) -> Result<Vec<(String, AtomId)>> {
    hash_dictionary::to_vec(atoms, root)?
        .into_iter()
        .map(|(k, v)| Ok((decode_key(atoms, k)?, v)))
        .collect()
}
