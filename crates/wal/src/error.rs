//! Error types for WAL frames and recovery.

use protobase_atom::AtomError;
use protobase_storage::StorageError;
use thiserror::Error;

/// Result type alias for WAL operations.
pub type Result<T> = std::result::Result<T, WalError>;

/// Errors raised while writing, reading, or recovering WAL frames.
#[derive(Debug, Error)]
pub enum WalError {
    /// The underlying block provider failed.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// An atom inside the frame failed to decode.
    #[error("atom error: {0}")]
    Atom(#[from] AtomError),

    /// The frame's magic bytes did not match `PBFR`.
    #[error("bad frame magic")]
    BadMagic,

    /// The frame's CRC-32 checksum did not match its content.
    #[error("frame checksum mismatch")]
    ChecksumMismatch,

    /// A frame atom referenced an atom id not present earlier in the same
    /// frame or in the durable graph (spec invariant 1/2).
    #[error("frame references unresolved atom {0}")]
    DanglingReference(String),

    /// Durable data failed validation in a way recovery cannot repair by
    /// truncating a torn tail (spec §7 `CorruptFrame`).
    #[error("corrupt frame: {0}")]
    CorruptFrame(String),

    /// An internal invariant was violated mid-commit; fatal (spec §7).
    #[error("invariant violated: {0}")]
    InvariantViolated(String),
}
