//! Error types for cluster coordination and the cloud page cache.

use protobase_atom::AtomId;
use thiserror::Error;

/// Result type alias for cluster operations.
pub type Result<T> = std::result::Result<T, ClusterError>;

/// Errors raised by [`crate::cluster_storage::ClusterFileStorage`] and
/// [`crate::cloud_cluster_storage::CloudClusterFileStorage`].
#[derive(Debug, Error)]
pub enum ClusterError {
    /// The underlying block provider failed.
    #[error("storage error: {0}")]
    Storage(#[from] protobase_storage::StorageError),

    /// The transaction layer failed (rebase, commit, atom decode).
    #[error("transaction error: {0}")]
    Txn(#[from] protobase_txn::TxnError),

    /// A peer socket failed at the TCP layer.
    #[error("I/O error talking to peer: {0}")]
    Io(#[from] std::io::Error),

    /// A peer sent bytes that didn't decode as a [`crate::message::ClusterMessage`].
    #[error("malformed cluster message: {0}")]
    Protocol(#[from] serde_json::Error),

    /// A root update's vote request was proposed before the peer responded,
    /// or the peer closed its socket mid-exchange.
    #[error("peer {0} unreachable")]
    PeerUnreachable(String),

    /// A root update failed to reach a majority of the cluster. Per the
    /// quorum contract, the caller's transaction is never committed: the
    /// WAL is left exactly as it was before the vote was proposed.
    #[error("root update for {proposed} did not reach quorum: needed {needed}, got {got}")]
    NoQuorum {
        /// The root id that was proposed and rejected.
        proposed: AtomId,
        /// Votes required for a majority (`peers / 2 + 1`, counting self).
        needed: usize,
        /// Votes actually granted, including the local vote.
        got: usize,
    },
}
