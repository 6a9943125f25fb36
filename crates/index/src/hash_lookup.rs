//! `HashLookupIndex`: exact-match lookup over scalar keys extracted from
//! records, the non-vector counterpart of `ExactVectorIndex` (spec §4.6).

use crate::definition::{ExtractedKey, IndexDefinition};
use crate::error::Result;
use crate::queryable::QueryableIndex;
use protobase_atom::AtomId;
use protobase_txn::AtomReader;
use rustc_hash::FxHashMap;

/// A built hash-lookup index: `extracted key -> record atoms`.
pub struct HashLookupIndex {
    name: String,
    buckets: FxHashMap<AtomId, Vec<AtomId>>,
    len: usize,
}

impl HashLookupIndex {
    /// Scan `records`, extracting a scalar key from each via `definition`'s
    /// extractor, and bucket records by key.
    pub fn build(
        atoms: &dyn AtomReader,
        definition: &IndexDefinition,
        records: impl IntoIterator<Item = AtomId>,
    ) -> Result<Self> {
        let mut buckets: FxHashMap<AtomId, Vec<AtomId>> = FxHashMap::default();
        let mut len = 0usize;
        for record in records {
            match (definition.extractor)(atoms, record)? {
                ExtractedKey::Scalar(key) => {
                    buckets.entry(key).or_default().push(record);
                    len += 1;
                }
                ExtractedKey::Vector(_) => {
                    tracing::warn!(index = %definition.name, "vector key extracted for a hash-lookup index, ignoring");
                }
            }
        }
        Ok(HashLookupIndex { name: definition.name.clone(), buckets, len })
    }
}

impl QueryableIndex for HashLookupIndex {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookup(&self, key: AtomId) -> Vec<AtomId> {
        self.buckets.get(&key).cloned().unwrap_or_default()
    }

    fn cost_estimate(&self, key: AtomId) -> usize {
        self.buckets.get(&key).map(Vec::len).unwrap_or(0)
    }

    fn len(&self) -> usize {
        self.len
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use protobase_atom::{Atom, AtomTag, Value};
    use protobase_storage::{BlockProvider, MemoryBlockProvider};
    use protobase_txn::{ObjectSpace, Transaction};
    use std::sync::Arc;

    fn value_atom(s: &str) -> Atom {
        let mut body = Vec::new();
        Value::Str(s.into()).encode(&mut body);
        Atom { tag: AtomTag::Value, body, refs: vec![] }
    }

    fn category_extractor() -> Arc<crate::definition::ExtractorFn> {
        Arc::new(|atoms, record| {
            let atom = atoms.get_atom(&record).expect("record atom present");
            Ok(ExtractedKey::Scalar(atom.refs[0]))
        })
    }

    fn make_record(txn: &mut Transaction<'_>, category: AtomId) -> AtomId {
        txn.put_atom(Atom { tag: AtomTag::Value, body: Vec::new(), refs: vec![category] })
    }

    #[test]
    fn lookup_returns_every_record_sharing_a_key() {
        let provider: Arc<dyn BlockProvider> = Arc::new(MemoryBlockProvider::new(4096));
        let space = ObjectSpace::open(provider, 8).unwrap();
        let mut txn = space.new_transaction();

        let cat_a = txn.put_atom(value_atom("a"));
        let cat_b = txn.put_atom(value_atom("b"));
        let r1 = make_record(&mut txn, cat_a);
        let r2 = make_record(&mut txn, cat_a);
        let r3 = make_record(&mut txn, cat_b);

        let def = IndexDefinition::hash_lookup("by_category", category_extractor());
        let index = HashLookupIndex::build(&txn, &def, [r1, r2, r3]).unwrap();

        let mut got = index.lookup(cat_a);
        got.sort();
        let mut want = vec![r1, r2];
        want.sort();
        assert_eq!(got, want);
        assert_eq!(index.lookup(cat_b), vec![r3]);
        assert_eq!(index.len(), 3);
    }
}
