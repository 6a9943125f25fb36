//! The `QueryableIndex` contract every index class implements (spec §4.6).

use crate::error::{IndexError, Result};
use protobase_atom::AtomId;

/// An estimate of how expensive a lookup or search will be, used by the
/// query planner to order predicate pushdown and join evaluation. Lower is
/// cheaper; the unit is "candidate records touched", not wall-clock time.
pub type Cost = usize;

/// A secondary index over a `List` or `Set`: maps extracted keys back to
/// the record atoms that produced them.
///
/// `search` is meaningful only for vector-backed indexes; the default
/// implementation reports that the index doesn't support it, so scalar
/// indexes need not override it.
pub trait QueryableIndex: Send + Sync {
    /// The index's name, as given in its `IndexDefinition`.
    fn name(&self) -> &str;

    /// Every record filed under `key`, or empty if none.
    fn lookup(&self, key: AtomId) -> Vec<AtomId>;

    /// Estimated candidate count a lookup of `key` would touch.
    fn cost_estimate(&self, key: AtomId) -> Cost;

    /// Total number of records indexed.
    fn len(&self) -> usize;

    /// Whether the index has no records.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether this index answers `search` at all, so callers (notably the
    /// query planner's `can_handle`) can route `near[]` terms without
    /// probing with a dummy query.
    fn supports_vector_search(&self) -> bool {
        false
    }

    /// Ranked nearest neighbors of `query`, optionally capped to `k` results
    /// and/or filtered to similarity scores `>= threshold`. Unsupported on
    /// non-vector indexes.
    fn search(&self, query: &[f32], k: Option<usize>, threshold: Option<f32>) -> Result<Vec<(AtomId, f32)>> {
        let _ = (query, k, threshold);
        Err(IndexError::NotAVectorIndex(self.name().to_string()))
    }
}
