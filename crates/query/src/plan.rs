//! The plan tree: `FromPlan`, `WherePlan`, `GroupByPlan`, `AndMergePlan`,
//! `VectorSearchPlan`, and the bottom-up `optimize()` pass that pushes
//! predicate terms down onto indexes (spec §4.7).

use crate::catalog::IndexCatalog;
use crate::expression::Term;
use protobase_atom::AtomId;
use protobase_txn::AtomReader;
use std::fmt::Write as _;
use std::sync::Arc;

/// Pure function grouping a record under a key, for `GroupByPlan`.
pub type KeyFn = dyn Fn(&dyn AtomReader, AtomId) -> crate::Result<AtomId> + Send + Sync;

/// Which persistent collection a `FromPlan` reads.
#[derive(Debug, Clone, Copy)]
pub enum Source {
    /// A `List` root.
    List(AtomId),
    /// A `Set` root.
    Set(AtomId),
}

/// A node in a query plan tree.
///
/// `IndexLookup` isn't part of the algebra a caller builds by hand —
/// `optimize()` introduces it in place of a `WherePlan` term once it has
/// found an index able to serve that term directly, so the same tree
/// shape can be `explain()`-ed either way.
pub enum Plan {
    /// The base stream: every member of a `List` or `Set`.
    From(Source),
    /// A linear filter over `based_on`'s stream.
    Where {
        /// The conjunction of terms a record must satisfy.
        predicate: Vec<Term>,
        /// The plan this filters.
        based_on: Box<Plan>,
    },
    /// Groups `based_on`'s stream by `key_fn`, discarding the original order.
    GroupBy {
        /// The grouping key function.
        key_fn: Arc<KeyFn>,
        /// The plan this groups.
        based_on: Box<Plan>,
    },
    /// Intersects several record streams by record identity.
    AndMerge(Vec<Plan>),
    /// A ranked `near[]` search, evaluated directly against an index.
    VectorSearch {
        /// The index name to search; resolved against the catalog at optimize time.
        index: String,
        /// The query vector.
        query: Vec<f32>,
        /// Optional result cap.
        k: Option<usize>,
        /// Optional minimum similarity score.
        threshold: Option<f32>,
        /// The plan the search restricts (only records from this plan's
        /// stream are eligible results); `From` when the whole collection
        /// is in play.
        based_on: Box<Plan>,
    },
    /// A term resolved to an index lookup rather than a linear scan, with
    /// the result intersected against `based_on`. Introduced by `optimize()`.
    IndexLookup {
        /// The index name the term was pushed onto.
        index: String,
        /// The pushed-down term, kept for `explain()`.
        term: Term,
        /// The plan this is intersected against.
        based_on: Box<Plan>,
    },
}

impl Plan {
    /// Traverse the tree bottom-up, pushing `WherePlan` terms onto any
    /// index in `catalog` that can serve them, per spec §4.7:
    ///
    /// 1. Split the predicate into a conjunction of terms.
    /// 2. For each term, ask the catalog `can_handle(term)`.
    /// 3. A handled `near[]` term becomes a `VectorSearch`; other handled
    ///    terms become `IndexLookup`.
    /// 4. Unhandled terms form a residual `Where` wrapped in `AndMerge`
    ///    alongside the pushed-down branches.
    /// 5. If no index applies, the plan remains a linear `Where`.
    pub fn optimize(self, catalog: &IndexCatalog) -> Plan {
        match self {
            Plan::Where { predicate, based_on } => {
                let based_on = Box::new(based_on.optimize(catalog));
                let mut handled: Vec<Plan> = Vec::new();
                let mut residual: Vec<Term> = Vec::new();
                for term in predicate {
                    match catalog.can_handle(&term) {
                        Some(entry) if term.is_near() => {
                            let (query, k, threshold) = match &term {
                                Term::Near { query, k, threshold, .. } => (query.clone(), *k, *threshold),
                                _ => unreachable!("can_handle only returns Some(..) for Near on a near term"),
                            };
                            handled.push(Plan::VectorSearch {
                                index: entry.index.name().to_string(),
                                query,
                                k,
                                threshold,
                                based_on: Box::new(clone_shallow(&based_on)),
                            });
                        }
                        Some(entry) => {
                            handled.push(Plan::IndexLookup {
                                index: entry.index.name().to_string(),
                                term,
                                based_on: Box::new(clone_shallow(&based_on)),
                            });
                        }
                        None => residual.push(term),
                    }
                }
                if handled.is_empty() {
                    return Plan::Where { predicate: residual, based_on };
                }
                if !residual.is_empty() {
                    handled.push(Plan::Where { predicate: residual, based_on });
                }
                if handled.len() == 1 {
                    handled.into_iter().next().expect("checked len == 1")
                } else {
                    Plan::AndMerge(handled)
                }
            }
            Plan::GroupBy { key_fn, based_on } => {
                Plan::GroupBy { key_fn, based_on: Box::new(based_on.optimize(catalog)) }
            }
            Plan::AndMerge(children) => {
                Plan::AndMerge(children.into_iter().map(|c| c.optimize(catalog)).collect())
            }
            Plan::VectorSearch { index, query, k, threshold, based_on } => {
                Plan::VectorSearch { index, query, k, threshold, based_on: Box::new(based_on.optimize(catalog)) }
            }
            other => other,
        }
    }

    /// A textual rendering of the plan tree, for debugging.
    pub fn explain(&self) -> String {
        let mut out = String::new();
        self.explain_into(&mut out, 0);
        out
    }

    fn explain_into(&self, out: &mut String, depth: usize) {
        let indent = "  ".repeat(depth);
        match self {
            Plan::From(Source::List(id)) => { let _ = writeln!(out, "{indent}From(List {id})"); }
            Plan::From(Source::Set(id)) => { let _ = writeln!(out, "{indent}From(Set {id})"); }
            Plan::Where { predicate, based_on } => {
                let _ = writeln!(out, "{indent}Where({} term(s))", predicate.len());
                based_on.explain_into(out, depth + 1);
            }
            Plan::GroupBy { based_on, .. } => {
                let _ = writeln!(out, "{indent}GroupBy");
                based_on.explain_into(out, depth + 1);
            }
            Plan::AndMerge(children) => {
                let _ = writeln!(out, "{indent}AndMerge({} branch(es))", children.len());
                for child in children {
                    child.explain_into(out, depth + 1);
                }
            }
            Plan::VectorSearch { index, k, threshold, based_on, .. } => {
                let _ = writeln!(out, "{indent}VectorSearch(index={index:?}, k={k:?}, threshold={threshold:?})");
                based_on.explain_into(out, depth + 1);
            }
            Plan::IndexLookup { index, term, based_on } => {
                let _ = writeln!(out, "{indent}IndexLookup(index={index:?}, field={:?})", term.field());
                based_on.explain_into(out, depth + 1);
            }
        }
    }
}

/// `optimize()` fans one `based_on` branch out to several pushed-down
/// plans, each re-applying it against their own index's candidates; since
/// a `From`/`IndexLookup`/`VectorSearch` base is cheap to re-describe and
/// carries no open resources, a shallow structural copy is simplest here.
fn clone_shallow(plan: &Plan) -> Plan {
    match plan {
        Plan::From(source) => Plan::From(*source),
        Plan::Where { predicate, based_on } => {
            Plan::Where { predicate: predicate.clone(), based_on: Box::new(clone_shallow(based_on)) }
        }
        Plan::GroupBy { key_fn, based_on } => {
            Plan::GroupBy { key_fn: key_fn.clone(), based_on: Box::new(clone_shallow(based_on)) }
        }
        Plan::AndMerge(children) => Plan::AndMerge(children.iter().map(clone_shallow).collect()),
        Plan::VectorSearch { index, query, k, threshold, based_on } => Plan::VectorSearch {
            index: index.clone(),
            query: query.clone(),
            k: *k,
            threshold: *threshold,
            based_on: Box::new(clone_shallow(based_on)),
        },
        Plan::IndexLookup { index, term, based_on } => {
            Plan::IndexLookup { index: index.clone(), term: term.clone(), based_on: Box::new(clone_shallow(based_on)) }
        }
    }
}
