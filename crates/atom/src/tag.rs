//! The closed set of atom node kinds.

use crate::error::{AtomError, Result};

/// Discriminates the type-specific body format of an [`crate::atom::Atom`].
///
/// This is a closed set: an unrecognized tag byte is always [`AtomError::UnknownTag`],
/// never silently ignored (spec §4.1 failure modes).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum AtomTag {
    /// A scalar [`crate::value::Value`] leaf.
    Value = 1,
    /// An order-statistic tree node of a persistent `List`.
    ListNode = 2,
    /// A HAMT branch node (bitmap + children).
    HamtBranch = 3,
    /// A HAMT collision leaf (chained equal-hash key/value pairs).
    HamtCollisionLeaf = 4,
    /// The root map: name -> atom identity.
    RootMap = 5,
    /// A fixed-dimension vector header (dimension, metric hint, data ref).
    VectorHeader = 6,
    /// Raw vector float32 data, referenced by a `VectorHeader`.
    VectorBlob = 7,
    /// An opaque user-supplied blob.
    UserBlob = 8,
}

impl AtomTag {
    /// Parse a tag byte, rejecting anything outside the closed set.
    pub fn from_u8(byte: u8) -> Result<Self> {
        Ok(match byte {
            1 => AtomTag::Value,
            2 => AtomTag::ListNode,
            3 => AtomTag::HamtBranch,
            4 => AtomTag::HamtCollisionLeaf,
            5 => AtomTag::RootMap,
            6 => AtomTag::VectorHeader,
            7 => AtomTag::VectorBlob,
            8 => AtomTag::UserBlob,
            other => return Err(AtomError::UnknownTag(other)),
        })
    }
}
