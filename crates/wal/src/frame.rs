//! The WAL frame: `[magic:4][txn_id:8][atom_count:varint][atoms...][new_root_id:16][checksum:4]`.
//!
//! Atoms appear before the frame's root reference so a reader that has
//! loaded them can validate the root is reachable (spec §4.3).

use crate::error::{Result, WalError};
use protobase_atom::{read_varint, write_varint, Atom, AtomId};

/// Magic bytes identifying a ProtoBase WAL frame.
pub const FRAME_MAGIC: [u8; 4] = *b"PBFR";

/// A single committed transaction's durable record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// The committing transaction's id.
    pub txn_id: u64,
    /// Every atom newly staged by this commit, in a topological order such
    /// that each atom's refs were already written earlier in this list (or
    /// are already durable from a prior frame).
    pub atoms: Vec<Atom>,
    /// The root-map atom identity this frame installs as current.
    pub new_root_id: AtomId,
}

impl Frame {
    /// Encode this frame to its durable wire format, including the CRC-32
    /// checksum over `[txn_id..new_root_id]`.
    pub fn encode(&self) -> Vec<u8> {
        let mut body = Vec::new();
        body.extend_from_slice(&self.txn_id.to_le_bytes());
        write_varint(self.atoms.len() as u64, &mut body);
        for atom in &self.atoms {
            body.extend_from_slice(&atom.canonical_bytes());
        }
        body.extend_from_slice(self.new_root_id.as_bytes());

        let checksum = crc32fast::hash(&body);

        let mut out = Vec::with_capacity(4 + body.len() + 4);
        out.extend_from_slice(&FRAME_MAGIC);
        out.extend_from_slice(&body);
        out.extend_from_slice(&checksum.to_le_bytes());
        out
    }

    /// Decode a single frame from the front of `bytes`, validating its
    /// checksum. Returns the frame and the number of bytes consumed.
    pub fn decode(bytes: &[u8]) -> Result<(Frame, usize)> {
        if bytes.len() < 4 {
            return Err(WalError::CorruptFrame("truncated magic".into()));
        }
        if bytes[0..4] != FRAME_MAGIC {
            return Err(WalError::BadMagic);
        }
        let mut cursor = 4usize;

        let txn_id_end = cursor + 8;
        let txn_id_bytes = bytes
            .get(cursor..txn_id_end)
            .ok_or_else(|| WalError::CorruptFrame("truncated txn_id".into()))?;
        let txn_id = u64::from_le_bytes(txn_id_bytes.try_into().unwrap());
        cursor = txn_id_end;

        let (atom_count, used) = read_varint(&bytes[cursor..])?;
        cursor += used;

        let mut atoms = Vec::with_capacity(atom_count as usize);
        for _ in 0..atom_count {
            let (atom, consumed) = Atom::decode(&bytes[cursor..])?;
            cursor += consumed;
            atoms.push(atom);
        }

        let root_end = cursor + 16;
        let root_bytes = bytes
            .get(cursor..root_end)
            .ok_or_else(|| WalError::CorruptFrame("truncated new_root_id".into()))?;
        let mut root = [0u8; 16];
        root.copy_from_slice(root_bytes);
        let new_root_id = AtomId(root);
        cursor = root_end;

        let checksum_end = cursor + 4;
        let checksum_bytes = bytes
            .get(cursor..checksum_end)
            .ok_or_else(|| WalError::CorruptFrame("truncated checksum".into()))?;
        let stored_checksum = u32::from_le_bytes(checksum_bytes.try_into().unwrap());

        let computed_checksum = crc32fast::hash(&bytes[4..cursor]);
        if computed_checksum != stored_checksum {
            return Err(WalError::ChecksumMismatch);
        }

        Ok((Frame { txn_id, atoms, new_root_id }, checksum_end))
    }

    /// Every atom identity this frame newly introduces, in frame order.
    pub fn atom_ids(&self) -> Vec<AtomId> {
        self.atoms.iter().map(|a| a.id()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use protobase_atom::{AtomTag, Value};

    fn value_atom(s: &str) -> Atom {
        let mut body = Vec::new();
        Value::Str(s.into()).encode(&mut body);
        Atom { tag: AtomTag::Value, body, refs: vec![] }
    }

    #[test]
    fn round_trips_a_frame_with_atoms() {
        let atoms = vec![value_atom("a"), value_atom("b")];
        let frame = Frame { txn_id: 7, atoms, new_root_id: AtomId::of(b"root") };
        let bytes = frame.encode();
        let (decoded, consumed) = Frame::decode(&bytes).unwrap();
        assert_eq!(consumed, bytes.len());
        assert_eq!(decoded, frame);
    }

    #[test]
    fn rejects_bad_magic() {
        let mut bytes = Frame { txn_id: 1, atoms: vec![], new_root_id: AtomId::NIL }.encode();
        bytes[0] = b'X';
        assert!(matches!(Frame::decode(&bytes), Err(WalError::BadMagic)));
    }

    #[test]
    fn rejects_corrupted_checksum() {
        let mut bytes = Frame { txn_id: 1, atoms: vec![value_atom("x")], new_root_id: AtomId::NIL }.encode();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;
        assert!(matches!(Frame::decode(&bytes), Err(WalError::ChecksumMismatch)));
    }
}
