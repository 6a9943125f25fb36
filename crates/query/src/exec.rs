//! Plan execution: walks a (usually already `optimize()`d) tree and
//! materializes a `DBCollections` result (spec §4.7). Because `List` is
//! persistent, the returned root supports O(1) `slice(lo, hi)` pagination
//! with no re-execution.

use crate::catalog::IndexCatalog;
use crate::error::{QueryError, Result};
use crate::expression::{decode_value, value_atom_id, Expression, Operand, Term};
use crate::plan::{Plan, Source};
use protobase_atom::{AtomId, MetricHint};
use protobase_collections::{dictionary, hash_dictionary, list, set, vector};
use protobase_txn::Transaction;
use std::collections::{HashMap, HashSet};

/// The result of executing a plan: either a flat, ordered stream of
/// records (most plans) or a grouping of records by key (`GroupByPlan`).
pub enum DbCollection {
    /// A `List` root, in the plan's result order (source order, or
    /// similarity rank for a vector-search-rooted plan).
    List(AtomId),
    /// A `HashDictionary` root: group key atom id -> `List` root of members.
    HashDictionary(AtomId),
}

/// One candidate record plus its similarity score, when the plan that
/// produced it ranked results (a `VectorSearch`/`IndexLookup` branch, or
/// anything built on top of one).
struct Ranked {
    record: AtomId,
    score: Option<f32>,
}

/// Execute `plan` to a materialized result.
pub fn execute(plan: &Plan, txn: &mut Transaction<'_>, catalog: &IndexCatalog) -> Result<DbCollection> {
    if let Plan::GroupBy { key_fn, based_on } = plan {
        let records = eval_records(based_on, txn, catalog)?;
        let mut order = Vec::new();
        let mut groups: HashMap<AtomId, Vec<AtomId>> = HashMap::new();
        for r in &records {
            let key = key_fn(txn, r.record)?;
            groups.entry(key).or_insert_with(|| {
                order.push(key);
                Vec::new()
            });
            groups.get_mut(&key).expect("just inserted").push(r.record);
        }
        let mut dict_root = AtomId::NIL;
        for key in order {
            let members = groups.remove(&key).expect("key came from this map");
            let mut member_list = AtomId::NIL;
            for member in members {
                member_list = list::append(txn, member_list, member)?;
            }
            dict_root = hash_dictionary::put(txn, dict_root, key, member_list)?;
        }
        return Ok(DbCollection::HashDictionary(dict_root));
    }

    let records = eval_records(plan, txn, catalog)?;
    let mut list_root = AtomId::NIL;
    for r in records {
        list_root = list::append(txn, list_root, r.record)?;
    }
    Ok(DbCollection::List(list_root))
}

fn eval_records(plan: &Plan, txn: &mut Transaction<'_>, catalog: &IndexCatalog) -> Result<Vec<Ranked>> {
    match plan {
        Plan::From(Source::List(root)) => {
            Ok(list::to_vec(txn, *root)?.into_iter().map(|record| Ranked { record, score: None }).collect())
        }
        Plan::From(Source::Set(root)) => {
            Ok(set::to_vec(txn, *root)?.into_iter().map(|record| Ranked { record, score: None }).collect())
        }
        Plan::Where { predicate, based_on } => {
            let base = eval_records(based_on, txn, catalog)?;
            let mut kept = Vec::with_capacity(base.len());
            for candidate in base {
                let mut matches_all = true;
                for term in predicate {
                    if !record_matches(txn, candidate.record, term)? {
                        matches_all = false;
                        break;
                    }
                }
                if matches_all {
                    kept.push(candidate);
                }
            }
            Ok(kept)
        }
        Plan::GroupBy { .. } => Err(QueryError::MalformedExpression(
            "GroupByPlan only valid as the root of a plan, not nested inside another node".into(),
        )),
        Plan::AndMerge(children) => {
            let mut branches = children.iter().map(|c| eval_records(c, txn, catalog)).collect::<Result<Vec<_>>>()?;
            if branches.is_empty() {
                return Ok(Vec::new());
            }
            let first = branches.remove(0);
            let rest: Vec<HashSet<AtomId>> =
                branches.iter().map(|b| b.iter().map(|r| r.record).collect()).collect();
            Ok(first.into_iter().filter(|r| rest.iter().all(|ids| ids.contains(&r.record))).collect())
        }
        Plan::VectorSearch { index, query, k, threshold, based_on } => {
            let base: HashSet<AtomId> = eval_records(based_on, txn, catalog)?.into_iter().map(|r| r.record).collect();
            let index = catalog
                .find_by_name(index)
                .ok_or_else(|| QueryError::NoSuchIndex(index.clone()))?;
            let hits = index.search(query, *k, *threshold)?;
            Ok(hits
                .into_iter()
                .filter(|(record, _)| base.contains(record))
                .map(|(record, score)| Ranked { record, score: Some(score) })
                .collect())
        }
        Plan::IndexLookup { index, term, based_on } => {
            let base: HashSet<AtomId> = eval_records(based_on, txn, catalog)?.into_iter().map(|r| r.record).collect();
            let index = catalog
                .find_by_name(index)
                .ok_or_else(|| QueryError::NoSuchIndex(index.clone()))?;
            let keys: Vec<AtomId> = match term {
                Term::Cmp { operand: Operand::One(v), .. } => vec![value_atom_id(v)],
                Term::Cmp { operand: Operand::Many(values), .. } => values.iter().map(value_atom_id).collect(),
                Term::Near { .. } => {
                    return Err(QueryError::MalformedExpression("near[] term reached IndexLookup, expected VectorSearch".into()))
                }
            };
            let mut seen = HashSet::new();
            let mut out = Vec::new();
            for key in keys {
                for record in index.lookup(key) {
                    if base.contains(&record) && seen.insert(record) {
                        out.push(Ranked { record, score: None });
                    }
                }
            }
            Ok(out)
        }
    }
}

fn record_matches(txn: &mut Transaction<'_>, record: AtomId, term: &Term) -> Result<bool> {
    match term {
        Term::Cmp { field, op, operand } => {
            let field_id = match dictionary::get(txn, record, field)? {
                Some(id) => id,
                None => return Ok(false),
            };
            let field_atom = txn.get_atom(&field_id).map_err(|_| QueryError::MissingField(record, field.clone()))?;
            let field_value = decode_value(&field_atom);
            Ok(Expression::matches_scalar(*op, operand, field_id, field_value.as_ref()))
        }
        Term::Near { field, query, threshold, .. } => {
            let field_id = match dictionary::get(txn, record, field)? {
                Some(id) => id,
                None => return Ok(false),
            };
            let (values, metric) = vector::load(txn, field_id)?;
            if values.len() as u32 != query.len() as u32 {
                return Err(QueryError::DimensionMismatch {
                    field: field.clone(),
                    expected: values.len() as u32,
                    got: query.len() as u32,
                });
            }
            let score = match metric {
                MetricHint::Cosine => vector::cosine_similarity(query, &values)?,
                MetricHint::L2 => 1.0 / (1.0 + vector::l2_distance(query, &values)?),
            };
            Ok(threshold.map(|t| score >= t).unwrap_or(true))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::IndexCatalog;
    use crate::expression::{CmpOp, Operand};
    use protobase_atom::{Atom, AtomTag, Value};
    use protobase_index::{ExactVectorIndex, ExtractedKey, ExtractorFn, HashLookupIndex, IndexDefinition};
    use protobase_storage::{BlockProvider, MemoryBlockProvider};
    use protobase_txn::ObjectSpace;
    use std::sync::Arc;

    fn status_extractor() -> Arc<ExtractorFn> {
        Arc::new(|atoms, record| {
            let id = dictionary::get(atoms, record, "status")?.expect("status present");
            Ok(ExtractedKey::Scalar(id))
        })
    }

    fn embedding_extractor() -> Arc<ExtractorFn> {
        Arc::new(|atoms, record| {
            let field_id = dictionary::get(atoms, record, "embedding")?.expect("embedding present");
            let (values, _) = vector::load(atoms, field_id)?;
            Ok(ExtractedKey::Vector(values))
        })
    }

    fn make_record(txn: &mut Transaction<'_>, status: &str, embedding: Vec<f32>) -> AtomId {
        let mut body = Vec::new();
        Value::Str(status.to_string()).encode(&mut body);
        let status_id = txn.put_atom(Atom { tag: AtomTag::Value, body, refs: Vec::new() });
        let embedding_id = vector::build(txn, embedding, MetricHint::Cosine);
        let root = dictionary::put(txn, AtomId::NIL, "status", status_id).unwrap();
        dictionary::put(txn, root, "embedding", embedding_id).unwrap()
    }

    #[test]
    fn optimize_pushes_a_conjunction_onto_a_hash_index_and_a_vector_index() {
        let provider: Arc<dyn BlockProvider> = Arc::new(MemoryBlockProvider::new(4096));
        let space = ObjectSpace::open(provider, 8).unwrap();
        let mut txn = space.new_transaction();

        let r1 = make_record(&mut txn, "active", vec![1.0, 0.0, 0.0]);
        let r2 = make_record(&mut txn, "inactive", vec![0.9, 0.1, 0.0]);
        let r3 = make_record(&mut txn, "active", vec![0.0, 1.0, 0.0]);
        let mut list_root = AtomId::NIL;
        for r in [r1, r2, r3] {
            list_root = list::append(&mut txn, list_root, r).unwrap();
        }

        let status_def = IndexDefinition::hash_lookup("by_status", status_extractor());
        let status_index = HashLookupIndex::build(&txn, &status_def, [r1, r2, r3]).unwrap();
        let embedding_def = IndexDefinition::exact_vector("by_embedding", embedding_extractor());
        let embedding_index = ExactVectorIndex::build(&txn, &embedding_def, MetricHint::Cosine, 3, [r1, r2, r3]).unwrap();

        let mut catalog = IndexCatalog::new();
        catalog.register("status", Arc::new(status_index) as Arc<dyn protobase_index::QueryableIndex>);
        catalog.register("embedding", Arc::new(embedding_index) as Arc<dyn protobase_index::QueryableIndex>);

        let raw = Plan::Where {
            predicate: vec![
                Term::Cmp { field: "status".into(), op: CmpOp::Eq, operand: Operand::One(Value::Str("active".into())) },
                Term::Near { field: "embedding".into(), query: vec![1.0, 0.0, 0.0], threshold: Some(0.9), k: Some(5) },
            ],
            based_on: Box::new(Plan::From(Source::List(list_root))),
        };

        let optimized = raw.optimize(&catalog);
        let explanation = optimized.explain();
        assert!(explanation.contains("IndexLookup"), "expected pushdown in:\n{explanation}");
        assert!(explanation.contains("VectorSearch"), "expected pushdown in:\n{explanation}");

        let result = execute(&optimized, &mut txn, &catalog).unwrap();
        let DbCollection::List(root) = result else { panic!("expected a List result") };
        let ids = list::to_vec(&txn, root).unwrap();
        assert_eq!(ids, vec![r1]);
    }

    #[test]
    fn unoptimized_where_still_evaluates_correctly_by_linear_scan() {
        let provider: Arc<dyn BlockProvider> = Arc::new(MemoryBlockProvider::new(4096));
        let space = ObjectSpace::open(provider, 8).unwrap();
        let mut txn = space.new_transaction();

        let r1 = make_record(&mut txn, "active", vec![1.0, 0.0, 0.0]);
        let r2 = make_record(&mut txn, "inactive", vec![0.0, 1.0, 0.0]);
        let mut list_root = AtomId::NIL;
        for r in [r1, r2] {
            list_root = list::append(&mut txn, list_root, r).unwrap();
        }

        let plan = Plan::Where {
            predicate: vec![Term::Cmp {
                field: "status".into(),
                op: CmpOp::Eq,
                operand: Operand::One(Value::Str("active".into())),
            }],
            based_on: Box::new(Plan::From(Source::List(list_root))),
        };

        let empty_catalog = IndexCatalog::new();
        let result = execute(&plan, &mut txn, &empty_catalog).unwrap();
        let DbCollection::List(root) = result else { panic!("expected a List result") };
        assert_eq!(list::to_vec(&txn, root).unwrap(), vec![r1]);
    }
}
