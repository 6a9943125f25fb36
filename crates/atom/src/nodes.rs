//! Typed envelope helpers: encode/decode the body of each closed atom kind.
//!
//! `protobase-collections` builds and interprets atoms exclusively through
//! these helpers rather than poking at `Atom::body`/`Atom::refs` directly,
//! so the wire layout stays centralized here per spec §4.1.

use crate::atom::Atom;
use crate::error::{AtomError, Result};
use crate::id::AtomId;
use crate::tag::AtomTag;
use crate::varint::{read_varint, write_varint};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

/// Distance-metric hint carried by a vector header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricHint {
    /// Cosine similarity.
    Cosine,
    /// Euclidean (L2) distance.
    L2,
}

impl MetricHint {
    fn to_byte(self) -> u8 {
        match self {
            MetricHint::Cosine => 0,
            MetricHint::L2 => 1,
        }
    }

    fn from_byte(b: u8) -> Result<Self> {
        match b {
            0 => Ok(MetricHint::Cosine),
            1 => Ok(MetricHint::L2),
            other => Err(AtomError::CorruptAtom(format!("unknown metric hint {other}"))),
        }
    }
}

/// A decoded order-statistic `List` tree node.
///
/// `value`, `left`, `right` are refs; `AtomId::NIL` means "no child".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListNodeData {
    /// Reference to this node's value atom.
    pub value: AtomId,
    /// Left child, or `AtomId::NIL` for none.
    pub left: AtomId,
    /// Right child, or `AtomId::NIL` for none.
    pub right: AtomId,
    /// Balance height of the subtree rooted here.
    pub height: u8,
    /// Total number of values in the subtree rooted here (invariant 4).
    pub subtree_count: u64,
}

impl ListNodeData {
    /// Build the atom for this node.
    pub fn to_atom(&self) -> Atom {
        let mut body = Vec::with_capacity(9);
        body.push(self.height);
        write_varint(self.subtree_count, &mut body);
        Atom {
            tag: AtomTag::ListNode,
            body,
            refs: vec![self.value, self.left, self.right],
        }
    }

    /// Decode a `ListNode` atom's body and refs.
    pub fn from_atom(atom: &Atom) -> Result<Self> {
        if atom.tag != AtomTag::ListNode {
            return Err(AtomError::CorruptAtom("expected ListNode atom".into()));
        }
        if atom.refs.len() != 3 {
            return Err(AtomError::CorruptAtom("ListNode must have exactly 3 refs".into()));
        }
        let height = *atom.body.first().ok_or(AtomError::ShortRead { want: 1, got: 0 })?;
        let (subtree_count, _) = read_varint(&atom.body[1..])?;
        Ok(ListNodeData {
            value: atom.refs[0],
            left: atom.refs[1],
            right: atom.refs[2],
            height,
            subtree_count,
        })
    }
}

/// A decoded HAMT branch node: a 32-bit bitmap plus one child per set bit,
/// sorted by bit index (invariant 4: `popcount(bitmap) == children.len()`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HamtBranchData {
    /// Bitmap of populated slots (5-bit chunks, branch factor 32).
    pub bitmap: u32,
    /// Children, sorted by ascending bit index.
    pub children: Vec<AtomId>,
}

impl HamtBranchData {
    /// Build the atom for this branch. Panics in debug if `bitmap`'s
    /// popcount disagrees with `children.len()` (invariant 4).
    pub fn to_atom(&self) -> Atom {
        debug_assert_eq!(self.bitmap.count_ones() as usize, self.children.len());
        let mut body = Vec::with_capacity(4);
        body.write_u32::<LittleEndian>(self.bitmap).unwrap();
        Atom {
            tag: AtomTag::HamtBranch,
            body,
            refs: self.children.clone(),
        }
    }

    /// Decode a `HamtBranch` atom, validating the popcount invariant.
    pub fn from_atom(atom: &Atom) -> Result<Self> {
        if atom.tag != AtomTag::HamtBranch {
            return Err(AtomError::CorruptAtom("expected HamtBranch atom".into()));
        }
        let mut cursor = &atom.body[..];
        let bitmap = cursor
            .read_u32::<LittleEndian>()
            .map_err(|_| AtomError::ShortRead { want: 4, got: atom.body.len() })?;
        if bitmap.count_ones() as usize != atom.refs.len() {
            return Err(AtomError::CorruptAtom(
                "HAMT bitmap popcount does not match child count".into(),
            ));
        }
        Ok(HamtBranchData { bitmap, children: atom.refs.clone() })
    }

    /// Index of `child` within `children` for the given zero-based bit
    /// position, or `None` if that bit is unset.
    pub fn slot_index(&self, bit: u32) -> Option<usize> {
        if self.bitmap & (1 << bit) == 0 {
            return None;
        }
        let mask = (1u32 << bit) - 1;
        Some((self.bitmap & mask).count_ones() as usize)
    }
}

/// A decoded HAMT collision leaf: equal-hash `(key, value)` pairs chained
/// together. `refs` alternates `[key0, value0, key1, value1, ...]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HamtCollisionLeafData {
    /// Key/value atom-id pairs sharing a hash.
    pub pairs: Vec<(AtomId, AtomId)>,
}

impl HamtCollisionLeafData {
    /// Build the atom for this collision leaf.
    pub fn to_atom(&self) -> Atom {
        let mut refs = Vec::with_capacity(self.pairs.len() * 2);
        for (k, v) in &self.pairs {
            refs.push(*k);
            refs.push(*v);
        }
        Atom { tag: AtomTag::HamtCollisionLeaf, body: Vec::new(), refs }
    }

    /// Decode a `HamtCollisionLeaf` atom.
    pub fn from_atom(atom: &Atom) -> Result<Self> {
        if atom.tag != AtomTag::HamtCollisionLeaf {
            return Err(AtomError::CorruptAtom("expected HamtCollisionLeaf atom".into()));
        }
        if atom.refs.len() % 2 != 0 {
            return Err(AtomError::CorruptAtom("collision leaf refs must be paired".into()));
        }
        let pairs = atom.refs.chunks_exact(2).map(|c| (c[0], c[1])).collect();
        Ok(HamtCollisionLeafData { pairs })
    }
}

/// A decoded root-map entry list: `name -> atom identity`, sorted
/// lexicographically by name for canonicality (spec §6).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RootMapData {
    /// Sorted `(name, target)` entries.
    pub entries: Vec<(String, AtomId)>,
}

impl RootMapData {
    /// Build the atom for this root map. `entries` must already be sorted
    /// by name; this is not re-sorted here so canonicality failures are
    /// caught by the caller rather than silently papered over.
    pub fn to_atom(&self) -> Atom {
        let mut body = Vec::new();
        write_varint(self.entries.len() as u64, &mut body);
        for (name, id) in &self.entries {
            write_varint(name.len() as u64, &mut body);
            body.extend_from_slice(name.as_bytes());
            body.extend_from_slice(id.as_bytes());
        }
        Atom { tag: AtomTag::RootMap, body, refs: Vec::new() }
    }

    /// Decode a `RootMap` atom.
    pub fn from_atom(atom: &Atom) -> Result<Self> {
        if atom.tag != AtomTag::RootMap {
            return Err(AtomError::CorruptAtom("expected RootMap atom".into()));
        }
        let body = &atom.body;
        let (count, used) = read_varint(body)?;
        let mut cursor = used;
        let mut entries = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let (name_len, used) = read_varint(&body[cursor..])?;
            cursor += used;
            let name_end = cursor + name_len as usize;
            let name_bytes = body
                .get(cursor..name_end)
                .ok_or(AtomError::ShortRead { want: name_end, got: body.len() })?;
            let name = String::from_utf8(name_bytes.to_vec()).map_err(|_| AtomError::InvalidUtf8)?;
            cursor = name_end;
            let id_end = cursor + 16;
            let id_bytes = body
                .get(cursor..id_end)
                .ok_or(AtomError::ShortRead { want: id_end, got: body.len() })?;
            let mut id = [0u8; 16];
            id.copy_from_slice(id_bytes);
            cursor = id_end;
            entries.push((name, AtomId(id)));
        }
        let decoded = RootMapData { entries };
        if !decoded.is_canonical() {
            return Err(AtomError::CorruptAtom("root map entries not sorted".into()));
        }
        Ok(decoded)
    }

    /// Whether entries are sorted lexicographically by name (spec §6).
    pub fn is_canonical(&self) -> bool {
        self.entries.windows(2).all(|w| w[0].0 < w[1].0)
    }

    /// Look up a name.
    pub fn get(&self, name: &str) -> Option<AtomId> {
        self.entries
            .binary_search_by(|(n, _)| n.as_str().cmp(name))
            .ok()
            .map(|i| self.entries[i].1)
    }
}

/// A decoded vector header: dimension, metric hint, and a ref to the raw
/// float32 blob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VectorHeaderData {
    /// Number of float32 components.
    pub dim: u32,
    /// Declared distance metric.
    pub metric: MetricHint,
    /// Reference to the `VectorBlob` atom holding the raw floats.
    pub data: AtomId,
}

impl VectorHeaderData {
    /// Build the atom for this header.
    pub fn to_atom(&self) -> Atom {
        let mut body = Vec::with_capacity(5);
        body.write_u32::<LittleEndian>(self.dim).unwrap();
        body.push(self.metric.to_byte());
        Atom { tag: AtomTag::VectorHeader, body, refs: vec![self.data] }
    }

    /// Decode a `VectorHeader` atom.
    pub fn from_atom(atom: &Atom) -> Result<Self> {
        if atom.tag != AtomTag::VectorHeader {
            return Err(AtomError::CorruptAtom("expected VectorHeader atom".into()));
        }
        if atom.refs.len() != 1 {
            return Err(AtomError::CorruptAtom("VectorHeader must have exactly 1 ref".into()));
        }
        let mut cursor = &atom.body[..];
        let dim = cursor
            .read_u32::<LittleEndian>()
            .map_err(|_| AtomError::ShortRead { want: 4, got: atom.body.len() })?;
        let metric = MetricHint::from_byte(
            *atom.body.get(4).ok_or(AtomError::ShortRead { want: 5, got: atom.body.len() })?,
        )?;
        Ok(VectorHeaderData { dim, metric, data: atom.refs[0] })
    }
}

/// Raw float32 vector data, stored verbatim as IEEE-754 little-endian.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorBlobData {
    /// The vector's components.
    pub values: Vec<f32>,
}

impl VectorBlobData {
    /// Build the atom for this blob.
    pub fn to_atom(&self) -> Atom {
        let mut body = Vec::with_capacity(self.values.len() * 4);
        for v in &self.values {
            body.write_f32::<LittleEndian>(*v).unwrap();
        }
        Atom { tag: AtomTag::VectorBlob, body, refs: Vec::new() }
    }

    /// Decode a `VectorBlob` atom.
    pub fn from_atom(atom: &Atom) -> Result<Self> {
        if atom.tag != AtomTag::VectorBlob {
            return Err(AtomError::CorruptAtom("expected VectorBlob atom".into()));
        }
        if atom.body.len() % 4 != 0 {
            return Err(AtomError::CorruptAtom("vector blob length not a multiple of 4".into()));
        }
        let mut values = Vec::with_capacity(atom.body.len() / 4);
        let mut cursor = &atom.body[..];
        while !cursor.is_empty() {
            values.push(cursor.read_f32::<LittleEndian>().unwrap());
        }
        Ok(VectorBlobData { values })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_node_round_trips() {
        let data = ListNodeData {
            value: AtomId::of(b"v"),
            left: AtomId::NIL,
            right: AtomId::of(b"r"),
            height: 3,
            subtree_count: 12,
        };
        let atom = data.to_atom();
        assert_eq!(ListNodeData::from_atom(&atom).unwrap(), data);
    }

    #[test]
    fn hamt_branch_round_trips_and_validates_popcount() {
        let children = vec![AtomId::of(b"a"), AtomId::of(b"b")];
        let bitmap = (1 << 2) | (1 << 5);
        let data = HamtBranchData { bitmap, children };
        let atom = data.to_atom();
        assert_eq!(HamtBranchData::from_atom(&atom).unwrap(), data);
    }

    #[test]
    fn hamt_branch_rejects_popcount_mismatch() {
        let atom = Atom {
            tag: AtomTag::HamtBranch,
            body: 3u32.to_le_bytes().to_vec(), // popcount 2
            refs: vec![AtomId::of(b"only-one")],
        };
        assert!(HamtBranchData::from_atom(&atom).is_err());
    }

    #[test]
    fn slot_index_counts_lower_set_bits() {
        let data = HamtBranchData { bitmap: 0b10110, children: vec![AtomId::NIL; 3] };
        assert_eq!(data.slot_index(1), Some(0));
        assert_eq!(data.slot_index(2), Some(1));
        assert_eq!(data.slot_index(4), Some(2));
        assert_eq!(data.slot_index(0), None);
    }

    #[test]
    fn collision_leaf_round_trips() {
        let data = HamtCollisionLeafData {
            pairs: vec![(AtomId::of(b"k1"), AtomId::of(b"v1")), (AtomId::of(b"k2"), AtomId::of(b"v2"))],
        };
        let atom = data.to_atom();
        assert_eq!(HamtCollisionLeafData::from_atom(&atom).unwrap(), data);
    }

    #[test]
    fn root_map_round_trips_and_enforces_sort_order() {
        let data = RootMapData {
            entries: vec![("alpha".into(), AtomId::of(b"a")), ("beta".into(), AtomId::of(b"b"))],
        };
        let atom = data.to_atom();
        assert_eq!(RootMapData::from_atom(&atom).unwrap(), data);
        assert_eq!(data.get("beta"), Some(AtomId::of(b"b")));
        assert_eq!(data.get("missing"), None);

        let unsorted = RootMapData {
            entries: vec![("zeta".into(), AtomId::of(b"z")), ("alpha".into(), AtomId::of(b"a"))],
        };
        let atom = unsorted.to_atom();
        assert!(RootMapData::from_atom(&atom).is_err());
    }

    #[test]
    fn vector_header_and_blob_round_trip() {
        let blob = VectorBlobData { values: vec![1.0, 2.5, -3.25] };
        let blob_atom = blob.to_atom();
        assert_eq!(VectorBlobData::from_atom(&blob_atom).unwrap(), blob);

        let header = VectorHeaderData { dim: 3, metric: MetricHint::Cosine, data: blob_atom.id() };
        let header_atom = header.to_atom();
        assert_eq!(VectorHeaderData::from_atom(&header_atom).unwrap(), header);
    }
}
