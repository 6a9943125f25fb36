//! Error types for atom encoding and decoding.

use thiserror::Error;

/// Result type alias for atom operations.
pub type Result<T> = std::result::Result<T, AtomError>;

/// Errors raised while decoding or validating atoms.
#[derive(Debug, Error)]
pub enum AtomError {
    /// The provider returned fewer bytes than the atom's declared length.
    #[error("short read: wanted {want} bytes, got {got}")]
    ShortRead {
        /// Bytes the decoder expected to find.
        want: usize,
        /// Bytes actually available.
        got: usize,
    },

    /// The atom's tag byte does not belong to the closed set of node kinds.
    #[error("unknown atom tag: {0}")]
    UnknownTag(u8),

    /// The atom failed structural validation (bad length, unresolved refs,
    /// malformed varint, non-canonical encoding).
    #[error("corrupt atom: {0}")]
    CorruptAtom(String),

    /// A varint continued past the maximum supported width.
    #[error("varint overflow")]
    VarintOverflow,

    /// A string field was not valid UTF-8.
    #[error("invalid utf-8 in atom body")]
    InvalidUtf8,
}
