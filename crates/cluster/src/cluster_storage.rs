//! [`ClusterFileStorage`]: file storage layered with peer-voted exclusivity
//! on root object updates (spec §4.8).

use crate::error::{ClusterError, Result};
use crate::message::ClusterMessage;
use crate::network::NetworkManager;
use protobase_atom::AtomId;
use protobase_storage::{BlockProvider, ByteSource, Location};
use protobase_txn::Transaction;
use std::net::SocketAddr;
use std::sync::Arc;

/// A [`BlockProvider`] that delegates page I/O to `inner` unchanged, and
/// adds majority-vote coordination for root object updates across a fixed
/// set of peers.
///
/// Page reads and appends are never voted on — every member durably writes
/// its own WAL independently, exactly as a standalone [`protobase_storage::FileBlockProvider`]
/// would. Only the root pointer that names which atoms are "the current
/// database" is exclusive, and that exclusivity is enforced above the
/// `BlockProvider` layer, in [`ClusterFileStorage::propose_root_update`].
pub struct ClusterFileStorage {
    inner: Arc<dyn BlockProvider>,
    network: NetworkManager,
    server_id: u32,
}

impl ClusterFileStorage {
    /// Wrap `inner` with peer coordination. `listen_addr` is where this
    /// member accepts peer connections; `peers` names every other member's
    /// id and address. `local_view` answers "what do I currently believe
    /// `object`'s value is", used to grant or refuse incoming vote requests
    /// — the caller supplies it (typically backed by its own
    /// [`protobase_txn::ObjectSpace`]) since root-map state lives above this
    /// crate.
    pub fn open(
        inner: Arc<dyn BlockProvider>,
        server_id: u32,
        listen_addr: SocketAddr,
        peers: Vec<(u32, SocketAddr)>,
        local_view: Arc<dyn Fn(&str) -> AtomId + Send + Sync>,
    ) -> Result<Self> {
        let on_request = Arc::new(move |msg: ClusterMessage| -> ClusterMessage { answer(&local_view, msg) });
        let network = NetworkManager::start(listen_addr, peers, on_request)?;
        Ok(ClusterFileStorage { inner, network, server_id })
    }

    /// Assemble from an already-started network (shared with
    /// [`crate::cloud_cluster_storage::CloudClusterFileStorage`], which
    /// needs the same listener to also answer `PageRequest`).
    pub(crate) fn from_parts(inner: Arc<dyn BlockProvider>, server_id: u32, network: NetworkManager) -> Self {
        ClusterFileStorage { inner, network, server_id }
    }

    /// This server's cluster-assigned id.
    pub fn server_id(&self) -> u32 {
        self.server_id
    }

    /// The address this member actually accepts peer connections on.
    pub fn local_addr(&self) -> SocketAddr {
        self.network.local_addr()
    }

    /// The peer network, shared with [`crate::cloud_cluster_storage::CloudClusterFileStorage`].
    pub(crate) fn network(&self) -> &NetworkManager {
        &self.network
    }

    /// Propose replacing `object`'s value from `base` to `proposed`, and
    /// block until a majority of the cluster (this server included) has
    /// voted to grant it. A peer grants the vote iff its own view of
    /// `object` still equals `base`.
    ///
    /// On quorum, broadcasts `RootUpdated` so peers can advance their view
    /// of the WAL head without polling, and returns `Ok(())` — the caller
    /// is then clear to actually commit `proposed` locally. On a lost vote,
    /// returns `NoQuorum` and touches nothing: no local commit has happened
    /// and no peer has been told anything changed.
    pub fn propose_root_update(&self, object: &str, base: AtomId, proposed: AtomId) -> Result<()> {
        let total_members = self.network.peer_count() + 1;
        let needed = total_members / 2 + 1;
        let mut granted = 1; // the proposer's own vote.

        let request = ClusterMessage::VoteRequest {
            proposer: self.server_id,
            object: object.to_string(),
            base,
            proposed,
        };
        for (_, reply) in self.network.broadcast(&request) {
            if let ClusterMessage::VoteResponse { granted: true } = reply {
                granted += 1;
            }
        }

        if granted < needed {
            tracing::warn!(object, needed, got = granted, "root update did not reach quorum");
            return Err(ClusterError::NoQuorum { proposed, needed, got: granted });
        }

        self.network.broadcast(&ClusterMessage::RootUpdated {
            server_id: self.server_id,
            object: object.to_string(),
            new_root: proposed,
        });
        Ok(())
    }

    /// Convenience for the common case of a transaction that changed a
    /// single named root object: vote on the update, then commit only if
    /// quorum was reached. `base`/`proposed` must match what `txn` staged
    /// for `object` (the caller already has both, from
    /// [`protobase_txn::Transaction::get_root_object`] before and after
    /// calling `set_root_object`).
    ///
    /// A transaction that touches several root objects should call
    /// `propose_root_update` once per name before invoking `txn.commit()`
    /// directly, so a single lost vote aborts before any of them commit.
    pub fn commit_coordinated(&self, object: &str, base: AtomId, proposed: AtomId, txn: Transaction<'_>) -> Result<AtomId> {
        self.propose_root_update(object, base, proposed)?;
        Ok(txn.commit()?)
    }
}

/// Answer a `VoteRequest`/`RootUpdated`/`PageRequest` the way a plain
/// (non-cloud) cluster member would. Shared with
/// [`crate::cloud_cluster_storage::CloudClusterFileStorage`], which only
/// needs to override the `PageRequest` arm to serve from its own cache
/// tiers instead of always answering "don't have it".
pub(crate) fn answer(local_view: &Arc<dyn Fn(&str) -> AtomId + Send + Sync>, msg: ClusterMessage) -> ClusterMessage {
    match msg {
        ClusterMessage::VoteRequest { object, base, .. } => {
            let granted = local_view(&object) == base;
            ClusterMessage::VoteResponse { granted }
        }
        ClusterMessage::RootUpdated { .. } => {
            // Informational; still answered so the broadcaster's blocking
            // exchange() doesn't stall waiting for a reply that never comes.
            ClusterMessage::VoteResponse { granted: true }
        }
        ClusterMessage::PageRequest { .. } => ClusterMessage::PageResponse { bytes: None },
        other @ (ClusterMessage::VoteResponse { .. } | ClusterMessage::PageResponse { .. }) => other,
    }
}

impl BlockProvider for ClusterFileStorage {
    fn get_reader(&self, wal_id: u64, position: u64) -> protobase_storage::Result<ByteSource> {
        self.inner.get_reader(wal_id, position)
    }

    fn append(&self, bytes: &[u8]) -> protobase_storage::Result<Location> {
        self.inner.append(bytes)
    }

    fn sync(&self) -> protobase_storage::Result<()> {
        self.inner.sync()
    }

    fn list_wals(&self) -> protobase_storage::Result<Vec<u64>> {
        self.inner.list_wals()
    }

    fn page_size(&self) -> u32 {
        self.inner.page_size()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ClusterError;
    use parking_lot::Mutex;
    use protobase_storage::MemoryBlockProvider;
    use std::collections::HashMap;

    fn fixed_view(entries: &[(&str, AtomId)]) -> Arc<dyn Fn(&str) -> AtomId + Send + Sync> {
        let map: HashMap<String, AtomId> = entries.iter().map(|(k, v)| (k.to_string(), *v)).collect();
        let map = Mutex::new(map);
        Arc::new(move |name: &str| map.lock().get(name).copied().unwrap_or(AtomId::NIL))
    }

    fn open_node(id: u32, port: u16, peer_port: u16, view: Arc<dyn Fn(&str) -> AtomId + Send + Sync>) -> ClusterFileStorage {
        let inner: Arc<dyn BlockProvider> = Arc::new(MemoryBlockProvider::new(4096));
        let listen_addr: SocketAddr = format!("127.0.0.1:{port}").parse().unwrap();
        let peer_addr: SocketAddr = format!("127.0.0.1:{peer_port}").parse().unwrap();
        let peer_id = if id == 1 { 2 } else { 1 };
        ClusterFileStorage::open(inner, id, listen_addr, vec![(peer_id, peer_addr)], view).unwrap()
    }

    #[test]
    fn propose_root_update_reaches_quorum_when_peer_agrees() {
        let base = AtomId::of(b"base");
        let proposed = AtomId::of(b"proposed");

        let node_a = open_node(1, 48771, 48772, fixed_view(&[("accounts", base)]));
        let node_b = open_node(2, 48772, 48771, fixed_view(&[("accounts", base)]));

        node_a.propose_root_update("accounts", base, proposed).unwrap();
        drop(node_b);
    }

    #[test]
    fn propose_root_update_fails_when_peer_disagrees() {
        let base = AtomId::of(b"base");
        let stale = AtomId::of(b"stale");
        let proposed = AtomId::of(b"proposed");

        let node_a = open_node(1, 48773, 48774, fixed_view(&[("accounts", base)]));
        let node_b = open_node(2, 48774, 48773, fixed_view(&[("accounts", stale)]));

        let err = node_a.propose_root_update("accounts", base, proposed).unwrap_err();
        assert!(matches!(err, ClusterError::NoQuorum { .. }));
        drop(node_b);
    }
}
