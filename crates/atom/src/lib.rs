//! Content-addressed immutable atoms and their canonical binary encoding.
//!
//! An [`Atom`] is the unit of persistence in ProtoBase: a stable identity
//! (a 128-bit content hash), a type tag drawn from a closed set of node
//! kinds, a type-specific body, and zero or more outbound references to
//! other atoms by identity. Atoms are immutable post-publication and
//! content-addressed, so equal content always hashes to equal identity.

#![warn(missing_docs)]

pub mod atom;
pub mod error;
pub mod id;
pub mod nodes;
pub mod tag;
pub mod value;
mod varint;

pub use atom::Atom;
pub use error::{AtomError, Result};
pub use id::{AtomId, ATOM_ID_LEN};
pub use nodes::{
    HamtBranchData, HamtCollisionLeafData, ListNodeData, MetricHint, RootMapData,
    VectorBlobData, VectorHeaderData,
};
pub use tag::AtomTag;
pub use value::Value;
pub use varint::{read_varint, write_varint};
