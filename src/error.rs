//! The unified error type surfaced at the embedding boundary.

use thiserror::Error;

/// Result type alias for the facade crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Every error any ProtoBase layer can raise, collapsed to one enum so an
/// embedding host only needs to match one type.
#[derive(Debug, Error)]
pub enum Error {
    /// A block provider (file, memory, cloud) failed.
    #[error(transparent)]
    Storage(#[from] protobase_storage::StorageError),

    /// The object space or a transaction failed.
    #[error(transparent)]
    Txn(#[from] protobase_txn::TxnError),

    /// An atom failed to encode, decode, or resolve.
    #[error(transparent)]
    Atom(#[from] protobase_atom::AtomError),

    /// A persistent collection operation failed.
    #[error(transparent)]
    Collection(#[from] protobase_collections::CollectionError),

    /// A secondary index operation failed.
    #[error(transparent)]
    Index(#[from] protobase_index::IndexError),

    /// A query plan failed to compile or execute.
    #[error(transparent)]
    Query(#[from] protobase_query::QueryError),

    /// Cluster coordination failed (no quorum, peer unreachable, protocol).
    #[error(transparent)]
    Cluster(#[from] protobase_cluster::ClusterError),

    /// An `arrow`/`parquet` entry point was called without the
    /// `arrow-bridge` feature enabled.
    #[error("Arrow/Parquet bridge is not available: rebuild with --features arrow-bridge")]
    ArrowNotAvailable,

    /// An invariant the system relies on to reason about durability was
    /// violated (e.g. a torn frame, a double commit). Unlike every other
    /// variant here, this is never retried: the process aborts at the call
    /// site that detects it, per the documented fatal-error contract.
    #[error("invariant violated: {0}")]
    InvariantViolated(String),
}

impl Error {
    /// True for the subset of errors that mean a durability invariant has
    /// already been broken rather than a recoverable condition (a
    /// conflicting writer, an unreachable peer, a missing atom). A fixed
    /// page size changing under a reopened provider, or a root map frame
    /// failing its checksum, means the on-disk state can no longer be
    /// trusted to reason about.
    fn is_invariant_violation(&self) -> bool {
        use protobase_storage::StorageError;
        use protobase_txn::TxnError;
        use protobase_wal::WalError;
        match self {
            Error::InvariantViolated(_) => true,
            Error::Storage(StorageError::PageSizeFixed { .. } | StorageError::CorruptCacheMapping(_)) => true,
            Error::Txn(TxnError::Storage(StorageError::PageSizeFixed { .. } | StorageError::CorruptCacheMapping(_))) => true,
            // `BadMagic`/`ChecksumMismatch` are the expected signal of a torn
            // tail during WAL recovery (truncated, not fatal); these three
            // mean the durable graph itself is inconsistent.
            Error::Txn(TxnError::Wal(
                WalError::CorruptFrame(_) | WalError::DanglingReference(_) | WalError::InvariantViolated(_),
            )) => true,
            _ => false,
        }
    }

    /// Abort the process if this error means a durability invariant has
    /// already been broken (spec §7: "fatal and must abort the process").
    /// Every other error is returned unchanged for the caller to handle.
    pub(crate) fn abort_if_invariant_violated(self) -> Self {
        if self.is_invariant_violation() {
            tracing::error!(error = %self, "durability invariant violated, aborting process");
            std::process::abort();
        }
        self
    }
}
