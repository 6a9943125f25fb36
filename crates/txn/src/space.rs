//! [`ObjectSpace`]: the per-database handle owning the block provider, the
//! WAL, the current root, the atom cache, and the commit mutex (spec §4.4).

use crate::atom_store::AtomCache;
use crate::error::{Result, TxnError};
use crate::transaction::Transaction;
use parking_lot::{Mutex, RwLock};
use protobase_atom::{Atom, AtomId, RootMapData};
use protobase_storage::BlockProvider;
use protobase_wal::{recover, Frame, RecoveryOutcome, WalWriter};
use std::sync::Arc;
use tracing::{info, instrument};

/// Owns every durable resource for one ProtoBase space: the page storage,
/// the write-ahead log, the live root id, and the atom cache that makes
/// content-addressed lookups possible without re-scanning the WAL.
///
/// Readers (via [`Transaction`]) never block. Writers serialize at commit
/// time through `commit_mutex`.
pub struct ObjectSpace {
    wal: WalWriter,
    atoms: AtomCache,
    current_root: RwLock<AtomId>,
    commit_mutex: Mutex<()>,
    max_rebase_attempts: u32,
}

impl ObjectSpace {
    /// Open a space over `provider`, replaying its WAL to rebuild the atom
    /// cache and determine the current root and next transaction id.
    #[instrument(level = "info", skip(provider))]
    pub fn open(provider: Arc<dyn BlockProvider>, max_rebase_attempts: u32) -> Result<Self> {
        let RecoveryOutcome { root_id, max_txn_id, frame_count, .. } = recover(provider.as_ref())?;
        info!(frame_count, "replayed wal frames during open");

        let atoms = AtomCache::new();
        for atom in replay_atoms(provider.as_ref())? {
            atoms.insert(atom);
        }

        let next_txn_id = if frame_count == 0 { 0 } else { max_txn_id + 1 };
        let wal = WalWriter::new(provider, next_txn_id);
        let current_root = RwLock::new(root_id.unwrap_or(AtomId::NIL));

        Ok(ObjectSpace {
            wal,
            atoms,
            current_root,
            commit_mutex: Mutex::new(()),
            max_rebase_attempts,
        })
    }

    /// The atom cache backing all reads in this space.
    pub fn atoms(&self) -> &AtomCache {
        &self.atoms
    }

    /// The currently published root id.
    pub fn current_root(&self) -> AtomId {
        *self.current_root.read()
    }

    /// Begin a new snapshot-isolated transaction against the current root.
    pub fn new_transaction(&self) -> Transaction<'_> {
        Transaction::new(self, self.current_root())
    }

    /// Look up `name` in the current root map, creating it (as a committed
    /// no-op transaction installing an empty-value placeholder supplied by
    /// the caller) if absent.
    pub fn get_database(&self, name: &str, empty_value: impl FnOnce() -> Atom) -> Result<AtomId> {
        if let Some(id) = self.root_map_lookup(self.current_root(), name)? {
            return Ok(id);
        }
        let mut txn = self.new_transaction();
        let placeholder = empty_value();
        let id = placeholder.id();
        self.atoms.insert(placeholder);
        txn.set_root_object_no_rebase(name, id);
        txn.commit()?;
        Ok(id)
    }

    fn root_map_lookup(&self, root: AtomId, name: &str) -> Result<Option<AtomId>> {
        if root.is_nil() {
            return Ok(None);
        }
        let root_atom = self.atoms.get_atom(&root).ok_or(TxnError::UnknownAtom(root))?;
        let map = RootMapData::from_atom(&root_atom)?;
        Ok(map.get(name))
    }

    /// Resolve a committed root map's entries, for rebase and diagnostics.
    pub(crate) fn root_map_at(&self, root: AtomId) -> Result<RootMapData> {
        if root.is_nil() {
            return Ok(RootMapData { entries: Vec::new() });
        }
        let root_atom = self.atoms.get_atom(&root).ok_or(TxnError::UnknownAtom(root))?;
        Ok(RootMapData::from_atom(&root_atom)?)
    }

    pub(crate) fn wal(&self) -> &WalWriter {
        &self.wal
    }

    pub(crate) fn commit_mutex(&self) -> &Mutex<()> {
        &self.commit_mutex
    }

    pub(crate) fn max_rebase_attempts(&self) -> u32 {
        self.max_rebase_attempts
    }

    pub(crate) fn publish(&self, new_root: AtomId) {
        *self.current_root.write() = new_root;
    }
}

/// Decode every atom out of every durable WAL frame, in order, for rebuilding
/// the atom cache at startup.
fn replay_atoms(provider: &dyn BlockProvider) -> Result<Vec<Atom>> {
    let mut atoms = Vec::new();
    for wal_id in provider.list_wals()? {
        let mut reader = provider.get_reader(wal_id, 0)?;
        let bytes = reader.read_to_end()?;
        let mut offset = 0usize;
        while offset < bytes.len() {
            match Frame::decode(&bytes[offset..]) {
                Ok((frame, consumed)) => {
                    offset += consumed;
                    atoms.extend(frame.atoms);
                }
                Err(_) => break,
            }
        }
    }
    Ok(atoms)
}
