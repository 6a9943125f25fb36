//! Write-ahead log frames, the root map atom's durable envelope, and crash
//! recovery (spec §4.3, §7).
//!
//! A ProtoBase commit is a single [`Frame`]: every atom the transaction
//! newly introduced, followed by the identity of the root map atom it
//! installs. Frames are appended to a [`protobase_storage::BlockProvider`]
//! by [`WalWriter`]; at startup, [`recover`] replays every segment to find
//! the latest durable root and the next free transaction id.

#![warn(missing_docs)]

pub mod error;
pub mod frame;
pub mod recovery;
pub mod writer;

pub use error::{Result, WalError};
pub use frame::{Frame, FRAME_MAGIC};
pub use recovery::{is_recoverable_tail_error, recover, RecoveryOutcome};
pub use writer::WalWriter;
