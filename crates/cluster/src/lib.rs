//! Peer coordination and the namespaced cloud page cache for clustered
//! ProtoBase spaces (spec §4.8).
//!
//! [`ClusterFileStorage`] layers majority-vote exclusivity for root object
//! updates over any local [`protobase_storage::BlockProvider`]; peer
//! sockets are maintained by [`network::NetworkManager`], and a successful
//! update is broadcast so peers can advance their view of the WAL head
//! without polling. [`CloudClusterFileStorage`] composes the same
//! coordination with [`protobase_storage::CloudBlockProvider`], additionally
//! serving peers' page requests from a `server_id`-namespaced cache
//! directory.

#![warn(missing_docs)]

mod cloud_cluster_storage;
mod cluster_storage;
mod error;
mod message;
mod network;

pub use cloud_cluster_storage::{cloud_page_cache_dir, CloudClusterFileStorage};
pub use cluster_storage::ClusterFileStorage;
pub use error::{ClusterError, Result};
pub use message::ClusterMessage;
pub use network::NetworkManager;
