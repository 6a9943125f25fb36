//! Error types for secondary indexes.

use protobase_atom::AtomError;
use protobase_collections::CollectionError;
use thiserror::Error;

/// Result type alias for index operations.
pub type Result<T> = std::result::Result<T, IndexError>;

/// Errors raised while building or querying a secondary index.
#[derive(Debug, Error)]
pub enum IndexError {
    /// An atom backing an indexed record or vector failed to decode.
    #[error("atom error: {0}")]
    Atom(#[from] AtomError),

    /// A collection operation failed while scanning the indexed source.
    #[error("collection error: {0}")]
    Collection(#[from] CollectionError),

    /// `search` was called on an index that isn't a vector index.
    #[error("index {0:?} does not support vector search")]
    NotAVectorIndex(String),

    /// A query vector's dimension didn't match the index's declared dimension.
    #[error("vector dimension mismatch: index has {index_dim}, query has {query_dim}")]
    DimensionMismatch {
        /// Dimension the index was built with.
        index_dim: u32,
        /// Dimension of the offending query vector.
        query_dim: u32,
    },

    /// Loading a persisted index failed because the sidecar was malformed.
    #[error("corrupt index sidecar: {0}")]
    CorruptSidecar(String),

    /// An I/O error occurred while saving or loading an index.
    #[error("index I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The sidecar's declared JSON metadata failed to parse.
    #[error("index metadata error: {0}")]
    Metadata(#[from] serde_json::Error),
}
