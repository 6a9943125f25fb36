//! Secondary indexes over `List`/`Set` collections: scalar hash lookup,
//! exact vector search, and approximate (HNSW) vector search, all behind
//! the single [`QueryableIndex`] contract the query planner pushes
//! predicates onto (spec §4.6).

#![warn(missing_docs)]

mod definition;
mod error;
mod exact_vector;
mod hash_lookup;
mod hnsw;
mod queryable;

pub use definition::{ExtractedKey, ExtractorFn, HnswParams, IndexClass, IndexDefinition};
pub use error::{IndexError, Result};
pub use exact_vector::ExactVectorIndex;
pub use hash_lookup::HashLookupIndex;
pub use hnsw::HnswVectorIndex;
pub use queryable::{Cost, QueryableIndex};
