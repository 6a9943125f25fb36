//! Durable commit: serialize a [`Frame`] and append it to the active WAL.

use crate::error::Result;
use crate::frame::Frame;
use protobase_atom::{Atom, AtomId};
use protobase_storage::{BlockProvider, Location};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{instrument, trace};

/// Appends committed transactions to a [`BlockProvider`] as encoded frames.
///
/// Transaction ids are assigned by this writer and handed back to the
/// caller so the commit path (in `protobase-txn`) can stamp them onto the
/// new root map atom before the frame is built.
pub struct WalWriter {
    provider: Arc<dyn BlockProvider>,
    next_txn_id: AtomicU64,
}

impl WalWriter {
    /// Wrap a block provider, starting transaction ids at `first_txn_id`
    /// (the caller determines this from recovery: `max_txn_id + 1`, or `0`
    /// for a brand-new space).
    pub fn new(provider: Arc<dyn BlockProvider>, first_txn_id: u64) -> Self {
        WalWriter { provider, next_txn_id: AtomicU64::new(first_txn_id) }
    }

    /// Reserve the next transaction id without writing anything. Used by the
    /// commit path to stamp the id into atoms before building the frame.
    pub fn reserve_txn_id(&self) -> u64 {
        self.next_txn_id.fetch_add(1, Ordering::SeqCst)
    }

    /// Encode and append a frame for `txn_id`, returning its durable
    /// location. Does not itself call `sync`; callers needing durability
    /// before acknowledging a commit should call [`WalWriter::sync`].
    #[instrument(level = "debug", skip(self, atoms), fields(txn_id, atom_count = atoms.len()))]
    pub fn append_frame(
        &self,
        txn_id: u64,
        atoms: Vec<Atom>,
        new_root_id: AtomId,
    ) -> Result<Location> {
        let frame = Frame { txn_id, atoms, new_root_id };
        let bytes = frame.encode();
        let location = self.provider.append(&bytes)?;
        trace!(wal_id = location.wal_id, offset = location.offset, "frame appended");
        Ok(location)
    }

    /// Flush the underlying provider to durable storage.
    pub fn sync(&self) -> Result<()> {
        Ok(self.provider.sync()?)
    }
}
