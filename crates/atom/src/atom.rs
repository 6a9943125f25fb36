//! The atom envelope: `[tag:1][len:varint][body:len][refs_count:varint][refs:refs_count×id]`.

use crate::error::{AtomError, Result};
use crate::id::AtomId;
use crate::tag::AtomTag;
use crate::varint::{read_varint, write_varint};

/// An immutable, content-addressed persistence cell.
///
/// `Atom::id()` is always derived from `canonical_bytes()` — atoms never
/// carry a stored identity, so equal content always yields equal identity
/// (spec invariant 5).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Atom {
    /// The atom's type-specific body format.
    pub tag: AtomTag,
    /// Type-specific payload bytes (see the constructors below for layout).
    pub body: Vec<u8>,
    /// Outbound references to other atoms, by identity.
    pub refs: Vec<AtomId>,
}

impl Atom {
    /// The self-describing, canonical wire encoding of this atom.
    ///
    /// Canonical means: no padding, and callers are responsible for
    /// supplying pre-sorted `refs` where the spec requires it (e.g. HAMT
    /// children sorted by bit index) so that equal logical content always
    /// produces equal bytes.
    pub fn canonical_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(1 + self.body.len() + 16 * self.refs.len() + 8);
        out.push(self.tag as u8);
        write_varint(self.body.len() as u64, &mut out);
        out.extend_from_slice(&self.body);
        write_varint(self.refs.len() as u64, &mut out);
        for r in &self.refs {
            out.extend_from_slice(r.as_bytes());
        }
        out
    }

    /// The content identity of this atom.
    pub fn id(&self) -> AtomId {
        AtomId::of(&self.canonical_bytes())
    }

    /// Decode a single atom from the front of `bytes`.
    ///
    /// Returns the atom and the number of bytes consumed. Does not itself
    /// validate that `refs` resolve to durable atoms — that is a frame-level
    /// concern (see `protobase-wal`).
    pub fn decode(bytes: &[u8]) -> Result<(Atom, usize)> {
        let tag_byte = *bytes.first().ok_or(AtomError::ShortRead { want: 1, got: 0 })?;
        let tag = AtomTag::from_u8(tag_byte)?;
        let mut cursor = 1usize;

        let (body_len, used) = read_varint(&bytes[cursor..])?;
        cursor += used;
        let body_len = body_len as usize;
        let body_end = cursor + body_len;
        let body = bytes
            .get(cursor..body_end)
            .ok_or(AtomError::ShortRead { want: body_end, got: bytes.len() })?
            .to_vec();
        cursor = body_end;

        let (refs_count, used) = read_varint(&bytes[cursor..])?;
        cursor += used;
        let mut refs = Vec::with_capacity(refs_count as usize);
        for _ in 0..refs_count {
            let end = cursor + 16;
            let slice = bytes
                .get(cursor..end)
                .ok_or(AtomError::ShortRead { want: end, got: bytes.len() })?;
            let mut id = [0u8; 16];
            id.copy_from_slice(slice);
            refs.push(AtomId(id));
            cursor = end;
        }

        Ok((Atom { tag, body, refs }, cursor))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    #[test]
    fn round_trips_through_canonical_bytes() {
        let mut body = Vec::new();
        Value::Str("hi".into()).encode(&mut body);
        let atom = Atom {
            tag: AtomTag::Value,
            body,
            refs: vec![AtomId::of(b"child-a"), AtomId::of(b"child-b")],
        };
        let bytes = atom.canonical_bytes();
        let (decoded, consumed) = Atom::decode(&bytes).unwrap();
        assert_eq!(consumed, bytes.len());
        assert_eq!(decoded, atom);
    }

    #[test]
    fn equal_atoms_have_equal_identity() {
        let a = Atom { tag: AtomTag::UserBlob, body: vec![1, 2, 3], refs: vec![] };
        let b = Atom { tag: AtomTag::UserBlob, body: vec![1, 2, 3], refs: vec![] };
        assert_eq!(a.id(), b.id());
    }

    #[test]
    fn rejects_unknown_tag() {
        let bytes = vec![99u8, 0, 0];
        assert!(matches!(Atom::decode(&bytes), Err(AtomError::UnknownTag(99))));
    }

    #[test]
    fn short_read_when_body_truncated() {
        let atom = Atom { tag: AtomTag::UserBlob, body: vec![1, 2, 3, 4], refs: vec![] };
        let mut bytes = atom.canonical_bytes();
        bytes.truncate(bytes.len() - 2);
        assert!(matches!(Atom::decode(&bytes), Err(AtomError::ShortRead { .. })));
    }
}
