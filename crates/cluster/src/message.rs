//! Wire messages exchanged between cluster peers.

use protobase_atom::AtomId;
use serde::{Deserialize, Serialize};

/// One message on a peer connection.
///
/// Framed as a little-endian `u32` byte length followed by the JSON body
/// (see [`crate::network::send_message`]/[`crate::network::recv_message`]);
/// JSON rather than a bespoke binary layout because this traffic is small,
/// infrequent compared to page I/O, and benefits from being inspectable on
/// the wire during cluster debugging.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ClusterMessage {
    /// Ask a peer to vote on a proposed root update for `object` (a root map
    /// entry name), replacing `base` with `proposed`. A peer grants the vote
    /// iff its own view of `object` still matches `base` — the same
    /// optimistic-concurrency check a local rebase performs, extended across
    /// the network.
    VoteRequest {
        /// The id of the server proposing this update.
        proposer: u32,
        /// The root map entry being updated.
        object: String,
        /// The value the proposer last observed for `object`.
        base: AtomId,
        /// The value the proposer wants to commit.
        proposed: AtomId,
    },
    /// A peer's answer to a `VoteRequest`.
    VoteResponse {
        /// Whether the peer's view of `base` still matched.
        granted: bool,
    },
    /// Broadcast after a root update reaches quorum and commits locally, so
    /// peers can advance their view of the WAL head without polling.
    RootUpdated {
        /// The server that committed the update.
        server_id: u32,
        /// The root map entry that changed.
        object: String,
        /// Its new value.
        new_root: AtomId,
    },
    /// Ask a peer to serve a logical page, used by
    /// [`crate::cloud_cluster_storage::CloudClusterFileStorage`]'s tiered
    /// read path when a page isn't already cached locally.
    PageRequest {
        /// WAL identifier of the page.
        wal_id: u64,
        /// Byte offset of the page within that WAL.
        offset: u64,
        /// Number of bytes requested.
        length: u32,
    },
    /// A peer's answer to a `PageRequest`: the page bytes, or `None` if the
    /// peer doesn't have them either.
    PageResponse {
        /// The page bytes, if found.
        bytes: Option<Vec<u8>>,
    },
}
