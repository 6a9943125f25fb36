//! Error types for the persistent collection engine.

use protobase_atom::AtomError;
use protobase_txn::TxnError;
use thiserror::Error;

/// Result type alias for collection operations.
pub type Result<T> = std::result::Result<T, CollectionError>;

/// Errors raised by `List`, `Set`, `HashDictionary`, `Dictionary`,
/// `RepeatedKeysDictionary`, and `Vector` operations.
#[derive(Debug, Error)]
pub enum CollectionError {
    /// An atom backing this collection failed to encode or decode.
    #[error("atom error: {0}")]
    Atom(#[from] AtomError),

    /// The owning transaction or object space failed.
    #[error("transaction error: {0}")]
    Txn(#[from] TxnError),

    /// A `List` index was out of `[0, len)`.
    #[error("index {index} out of range for length {len}")]
    IndexError {
        /// The offending index.
        index: u64,
        /// The collection's length at the time of the operation.
        len: u64,
    },

    /// An atom expected to carry a particular node type had the wrong tag.
    #[error("corrupt collection node: {0}")]
    CorruptNode(String),

    /// A `Vector` operation received vectors of mismatched dimension.
    #[error("vector dimension mismatch: {a} vs {b}")]
    DimensionMismatch {
        /// Dimension of the first operand.
        a: u32,
        /// Dimension of the second operand.
        b: u32,
    },
}
