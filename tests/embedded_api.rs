//! End-to-end coverage of the embedded API surface: opening a space,
//! reading and writing collections through transactions, and committing
//! against a root object that another transaction has already moved.

use protobase::{Config, Database, Storage};
use protobase_atom::{Atom, AtomId, AtomTag, MetricHint, Value};
use protobase_collections::{dictionary, list, repeated_keys_dictionary, set, vector};
use std::sync::Arc;

fn value_atom(v: &str) -> Atom {
    let mut body = Vec::new();
    Value::Str(v.to_string()).encode(&mut body);
    Atom { tag: AtomTag::Value, body, refs: Vec::new() }
}

fn int_atom(n: i64) -> Atom {
    let mut body = Vec::new();
    Value::I64(n).encode(&mut body);
    Atom { tag: AtomTag::Value, body, refs: Vec::new() }
}

#[test]
fn dictionary_round_trip_through_commit() {
    let db = Database::open(Storage::memory(4096), 8).unwrap();

    let mut txn = db.new_transaction();
    let alice = txn.put_atom(value_atom("active"));
    let root = dictionary::put(&mut txn, AtomId::NIL, "alice", alice).unwrap();
    txn.set_root_object_no_rebase("users", root);
    let published = db.commit(txn).unwrap();
    assert_eq!(db.current_root(), published);

    let txn = db.new_transaction();
    let root = txn.get_root_object("users").unwrap().unwrap();
    let got = dictionary::get(&txn, root, "alice").unwrap().unwrap();
    assert_eq!(got, alice);
    assert!(dictionary::get(&txn, root, "bob").unwrap().is_none());
}

#[test]
fn list_append_and_order_statistics() {
    let db = Database::open(Storage::memory(4096), 8).unwrap();
    let mut txn = db.new_transaction();

    let mut root = AtomId::NIL;
    for n in 0..50 {
        let value = txn.put_atom(int_atom(n));
        root = list::append(&mut txn, root, value).unwrap();
    }

    assert_eq!(list::len(&txn, root).unwrap(), 50);
    let tenth = list::get(&txn, root, 10).unwrap();
    let atom = txn.get_atom(&tenth).unwrap();
    assert_eq!(Value::decode(&atom.body).unwrap().0, Value::I64(10));

    let tail = list::tail(&mut txn, root, 40).unwrap();
    assert_eq!(list::len(&txn, tail).unwrap(), 10);
}

#[test]
fn set_union_and_intersection() {
    let db = Database::open(Storage::memory(4096), 8).unwrap();
    let mut txn = db.new_transaction();

    let mut evens = AtomId::NIL;
    let mut odds = AtomId::NIL;
    for n in 0..10 {
        let member = txn.put_atom(int_atom(n));
        if n % 2 == 0 {
            evens = set::add(&mut txn, evens, member).unwrap();
        } else {
            odds = set::add(&mut txn, odds, member).unwrap();
        }
    }

    assert_eq!(set::len(&txn, evens).unwrap(), 5);
    let all = set::union(&mut txn, evens, odds).unwrap();
    assert_eq!(set::len(&txn, all).unwrap(), 10);
    let none = set::intersection(&mut txn, evens, odds).unwrap();
    assert_eq!(set::len(&txn, none).unwrap(), 0);
}

#[test]
fn concurrent_commits_rebase_instead_of_conflicting() {
    let db = Database::open(Storage::memory(4096), 8).unwrap();

    let mut setup = db.new_transaction();
    let seed = setup.put_atom(value_atom("seed"));
    let seeded = dictionary::put(&mut setup, AtomId::NIL, "seed", seed).unwrap();
    setup.set_root_object_no_rebase("ledger", seeded);
    db.commit(setup).unwrap();

    // Two transactions both start from the same snapshot and both add a
    // different key; the second commit must rebase its HAMT insert against
    // the first transaction's already-published change rather than losing it.
    let mut first = db.new_transaction();
    let first_root = first.get_root_object("ledger").unwrap().unwrap();
    let a = first.put_atom(value_atom("a"));
    let first_new = dictionary::put(&mut first, first_root, "a", a).unwrap();
    let rebase = Arc::new(|txn: &mut protobase_txn::Transaction<'_>, _old_base: AtomId, new_base: AtomId, _local_change: AtomId| {
        Ok(dictionary::put(txn, new_base, "a", a).expect("rebasing the 'a' insert onto the new base"))
    });
    first.set_root_object("ledger", first_new, rebase);

    let mut second = db.new_transaction();
    let second_root = second.get_root_object("ledger").unwrap().unwrap();
    let b = second.put_atom(value_atom("b"));
    let second_new = dictionary::put(&mut second, second_root, "b", b).unwrap();
    second.set_root_object_no_rebase("ledger", second_new);
    db.commit(second).unwrap();

    db.commit(first).unwrap();

    let txn = db.new_transaction();
    let root = txn.get_root_object("ledger").unwrap().unwrap();
    assert!(dictionary::get(&txn, root, "seed").unwrap().is_some());
    assert!(dictionary::get(&txn, root, "b").unwrap().is_some());
}

#[test]
fn repeated_keys_dictionary_rebase_keeps_both_concurrent_additions() {
    let db = Database::open(Storage::memory(4096), 8).unwrap();

    let mut t1 = db.new_transaction();
    let mut t2 = db.new_transaction();

    let tags_key = t1.put_atom(value_atom("tags"));
    let sale = t1.put_atom(value_atom("sale"));
    let t1_root = repeated_keys_dictionary::set_at(&mut t1, AtomId::NIL, tags_key, sale).unwrap();
    t1.set_root_object("catalog", t1_root, Arc::new(repeated_keys_dictionary::merge_rebase));
    db.commit(t1).unwrap();

    let new_value = t2.put_atom(value_atom("new"));
    let t2_root = repeated_keys_dictionary::set_at(&mut t2, AtomId::NIL, tags_key, new_value).unwrap();
    t2.set_root_object("catalog", t2_root, Arc::new(repeated_keys_dictionary::merge_rebase));
    db.commit(t2).unwrap();

    let txn = db.new_transaction();
    let root = txn.get_root_object("catalog").unwrap().unwrap();
    let values = repeated_keys_dictionary::get(&txn, root, tags_key).unwrap();
    assert_eq!(values.len(), 2, "both concurrent additions should survive the rebase, got {values:?}");
    assert!(values.contains(&sale));
    assert!(values.contains(&new_value));
}

#[test]
fn vector_round_trip_and_similarity() {
    let db = Database::open(Storage::memory(4096), 8).unwrap();
    let mut txn = db.new_transaction();

    let a = vector::build(&mut txn, vec![1.0, 0.0, 0.0], MetricHint::Cosine);
    let b = vector::build(&mut txn, vec![0.0, 1.0, 0.0], MetricHint::Cosine);

    let (a_values, a_metric) = vector::load(&txn, a).unwrap();
    let (b_values, _b_metric) = vector::load(&txn, b).unwrap();
    assert_eq!(a_metric, MetricHint::Cosine);

    let similarity = vector::cosine_similarity(&a_values, &b_values).unwrap();
    assert!(similarity.abs() < 1e-6, "orthogonal vectors should have ~0 cosine similarity, got {similarity}");
}

#[test]
fn reopening_standalone_file_storage_recovers_committed_root() {
    let dir = tempfile::tempdir().unwrap();

    let published = {
        let db = Database::open(Storage::standalone_file(dir.path(), 4096).unwrap(), 8).unwrap();
        let mut txn = db.new_transaction();
        let value = txn.put_atom(value_atom("durable"));
        let root = dictionary::put(&mut txn, AtomId::NIL, "k", value).unwrap();
        txn.set_root_object_no_rebase("store", root);
        db.commit(txn).unwrap()
    };

    let reopened = Database::open(Storage::standalone_file(dir.path(), 4096).unwrap(), 8).unwrap();
    assert_eq!(reopened.current_root(), published);
    let txn = reopened.new_transaction();
    let root = txn.get_root_object("store").unwrap().unwrap();
    assert!(dictionary::get(&txn, root, "k").unwrap().is_some());
}

#[test]
fn cloud_storage_falls_back_through_its_own_cache() {
    let config = Config { cache_dir: tempfile::tempdir().unwrap().path().to_path_buf(), ..Config::default() };
    let db = Database::open(Storage::cloud_file_in_memory(&config).unwrap(), 8).unwrap();

    let mut txn = db.new_transaction();
    let value = txn.put_atom(value_atom("cloud"));
    let root = dictionary::put(&mut txn, AtomId::NIL, "k", value).unwrap();
    txn.set_root_object_no_rebase("store", root);
    db.commit(txn).unwrap();

    let txn = db.new_transaction();
    let root = txn.get_root_object("store").unwrap().unwrap();
    assert!(dictionary::get(&txn, root, "k").unwrap().is_some());
}
