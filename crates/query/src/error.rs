//! Error types for query compilation and execution.

use protobase_atom::AtomError;
use protobase_collections::CollectionError;
use protobase_index::IndexError;
use thiserror::Error;

/// Result type alias for query operations.
pub type Result<T> = std::result::Result<T, QueryError>;

/// Errors raised while compiling, optimizing, or executing a query plan.
#[derive(Debug, Error)]
pub enum QueryError {
    /// An atom backing a record or field failed to decode.
    #[error("atom error: {0}")]
    Atom(#[from] AtomError),

    /// A collection operation failed while scanning a source or building a result.
    #[error("collection error: {0}")]
    Collection(#[from] CollectionError),

    /// An index lookup or vector search failed.
    #[error("index error: {0}")]
    Index(#[from] IndexError),

    /// `Expression::compile` was given a malformed term.
    #[error("malformed filter expression: {0}")]
    MalformedExpression(String),

    /// A plan referenced an index name not present in the catalog passed to `optimize`.
    #[error("no such index: {0:?}")]
    NoSuchIndex(String),

    /// A record was missing the field a comparison or `near[]` term referenced.
    #[error("record {0} has no field {1:?}")]
    MissingField(protobase_atom::AtomId, String),

    /// A `near[]` term's query vector dimension didn't match the field's.
    #[error("vector dimension mismatch for field {field:?}: expected {expected}, got {got}")]
    DimensionMismatch {
        /// Field the `near[]` term searched on.
        field: String,
        /// Dimension the stored vectors actually have.
        expected: u32,
        /// Dimension of the query vector supplied.
        got: u32,
    },
}
