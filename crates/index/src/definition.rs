//! `IndexDefinition`: names an index, the class of structure backing it,
//! and the pure function that extracts a key (or vector) from a record
//! atom (spec §4.6).

use crate::error::Result;
use protobase_atom::AtomId;
use protobase_txn::AtomReader;
use std::sync::Arc;

/// What an extractor produces for one record: either a scalar lookup key
/// or a dense vector for similarity search.
#[derive(Debug, Clone)]
pub enum ExtractedKey {
    /// A scalar key atom, for hash-lookup indexes.
    Scalar(AtomId),
    /// A dense float vector, for vector indexes.
    Vector(Vec<f32>),
}

/// Pure function from a record atom to the key (or vector) an index should
/// file it under. Must not have side effects — it may be invoked during
/// both index build and later re-validation.
pub type ExtractorFn = dyn Fn(&dyn AtomReader, AtomId) -> Result<ExtractedKey> + Send + Sync;

/// Which structure backs an index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexClass {
    /// `HashLookupIndex`: exact-match lookup over scalar keys.
    HashLookup,
    /// `ExactVectorIndex`: linear scan, exact nearest-neighbor.
    ExactVector,
    /// `HNSWVectorIndex`: approximate nearest-neighbor graph.
    HnswVector,
}

/// Tuning knobs for an `HNSWVectorIndex`. Ignored by other index classes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HnswParams {
    /// Max bidirectional connections per layer (layer 0 gets `2*m`).
    pub m: usize,
    /// Beam width used while building the graph.
    pub ef_construction: usize,
    /// Beam width used while searching the graph.
    pub ef_search: usize,
}

impl Default for HnswParams {
    fn default() -> Self {
        HnswParams { m: 16, ef_construction: 200, ef_search: 50 }
    }
}

/// An index attached to a `List` or `Set`: a name, the structure backing
/// it, and the extractor that turns each member record into the key (or
/// vector) the index files it under.
#[derive(Clone)]
pub struct IndexDefinition {
    /// Index name, used to reference it from query plans.
    pub name: String,
    /// Which structure backs this index.
    pub class: IndexClass,
    /// How to pull a key/vector out of a record atom.
    pub extractor: Arc<ExtractorFn>,
    /// HNSW tuning, meaningful only when `class == IndexClass::HnswVector`.
    pub hnsw_params: HnswParams,
}

impl std::fmt::Debug for IndexDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexDefinition")
            .field("name", &self.name)
            .field("class", &self.class)
            .field("hnsw_params", &self.hnsw_params)
            .finish_non_exhaustive()
    }
}

impl IndexDefinition {
    /// Build a scalar hash-lookup index definition.
    pub fn hash_lookup(name: impl Into<String>, extractor: Arc<ExtractorFn>) -> Self {
        IndexDefinition {
            name: name.into(),
            class: IndexClass::HashLookup,
            extractor,
            hnsw_params: HnswParams::default(),
        }
    }

    /// Build an exact (linear-scan) vector index definition.
    pub fn exact_vector(name: impl Into<String>, extractor: Arc<ExtractorFn>) -> Self {
        IndexDefinition {
            name: name.into(),
            class: IndexClass::ExactVector,
            extractor,
            hnsw_params: HnswParams::default(),
        }
    }

    /// Build an HNSW vector index definition.
    pub fn hnsw_vector(name: impl Into<String>, extractor: Arc<ExtractorFn>, hnsw_params: HnswParams) -> Self {
        IndexDefinition { name: name.into(), class: IndexClass::HnswVector, extractor, hnsw_params }
    }
}
