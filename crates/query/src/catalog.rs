//! The set of indexes `Plan::optimize` may push predicate terms onto.

use crate::expression::Term;
use protobase_index::QueryableIndex;
use std::sync::Arc;

/// One index registered against a field, available to the optimizer.
pub struct IndexEntry {
    /// The field the index was built over.
    pub field: String,
    /// The index itself.
    pub index: Arc<dyn QueryableIndex>,
}

/// The indexes visible to `Plan::optimize` for one source collection.
///
/// A field may have more than one index registered (e.g. a `HashLookup`
/// for equality and an `HnswVector` for `near[]` on the same field); the
/// optimizer picks whichever entry's index class can actually serve a
/// given term.
#[derive(Default)]
pub struct IndexCatalog {
    entries: Vec<IndexEntry>,
}

impl IndexCatalog {
    /// An empty catalog — every `WherePlan` stays a linear scan.
    pub fn new() -> Self {
        IndexCatalog::default()
    }

    /// Register `index`, keyed by the field it was built over.
    pub fn register(&mut self, field: impl Into<String>, index: Arc<dyn QueryableIndex>) {
        self.entries.push(IndexEntry { field: field.into(), index });
    }

    /// `can_handle(term)`: the first registered index able to serve `term`
    /// directly, or `None` if the term must fall through to a linear scan.
    pub fn can_handle(&self, term: &Term) -> Option<&IndexEntry> {
        match term {
            Term::Near { field, .. } => {
                self.entries.iter().find(|e| &e.field == field && e.index.supports_vector_search())
            }
            Term::Cmp { field, op, .. } => {
                use crate::expression::CmpOp;
                if !matches!(op, CmpOp::Eq | CmpOp::In) {
                    return None;
                }
                self.entries.iter().find(|e| &e.field == field && !e.index.supports_vector_search())
            }
        }
    }

    /// Every entry registered for `field`.
    pub fn entries_for(&self, field: &str) -> impl Iterator<Item = &IndexEntry> {
        self.entries.iter().filter(move |e| e.field == field)
    }

    /// The index registered under `name`, for resolving a pushed-down
    /// `Plan::IndexLookup`/`Plan::VectorSearch` back to its backing index
    /// at execution time.
    pub fn find_by_name(&self, name: &str) -> Option<&Arc<dyn QueryableIndex>> {
        self.entries.iter().find(|e| e.index.name() == name).map(|e| &e.index)
    }
}
