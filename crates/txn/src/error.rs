//! Error types for the object space and transaction layer.

use protobase_atom::AtomError;
use protobase_storage::StorageError;
use protobase_wal::WalError;
use thiserror::Error;

/// Result type alias for transaction operations.
pub type Result<T> = std::result::Result<T, TxnError>;

/// Errors raised by [`crate::space::ObjectSpace`] and [`crate::transaction::Transaction`].
#[derive(Debug, Error)]
pub enum TxnError {
    /// The underlying block provider failed.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// A WAL frame failed to write or decode.
    #[error("wal error: {0}")]
    Wal(#[from] WalError),

    /// An atom failed to encode or decode.
    #[error("atom error: {0}")]
    Atom(#[from] AtomError),

    /// The requested atom identity is not present in the space's atom cache.
    #[error("unknown atom {0}")]
    UnknownAtom(protobase_atom::AtomId),

    /// A named root object does not exist and `create_if_absent` was false.
    #[error("no such root object: {0}")]
    NoSuchRootObject(String),

    /// Commit could not resolve a concurrent update after exhausting the
    /// rebase retry budget (spec §4.4).
    #[error("conflict on {object}: could not rebase after {attempts} attempt(s)")]
    Conflict {
        /// The root object name that conflicted.
        object: String,
        /// How many rebase attempts were made before giving up.
        attempts: u32,
    },
}
