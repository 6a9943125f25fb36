//! Crash recovery: scan every WAL segment frame-by-frame, replaying commits
//! until the first frame that fails to decode (a torn write from a crash
//! mid-append), which recovery treats as the true end of the log rather
//! than a fatal error (spec §7).

use crate::error::{Result, WalError};
use crate::frame::Frame;
use protobase_atom::AtomId;
use protobase_storage::BlockProvider;
use tracing::{info, instrument, warn};

/// The result of replaying every durable WAL segment at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecoveryOutcome {
    /// The most recently committed root map atom's identity, or `None` if
    /// the log contains no complete frames (a brand-new space).
    pub root_id: Option<AtomId>,
    /// Total number of frames successfully replayed across all segments.
    pub frame_count: u64,
    /// Highest transaction id observed, or `0` if no frames were replayed.
    pub max_txn_id: u64,
    /// If a torn tail was found, `(wal_id, offset)` marking where replay
    /// stopped. Absence means every segment's bytes fully decoded.
    pub truncated_at: Option<(u64, u64)>,
}

impl RecoveryOutcome {
    fn empty() -> Self {
        RecoveryOutcome { root_id: None, frame_count: 0, max_txn_id: 0, truncated_at: None }
    }
}

/// Replay every WAL segment known to `provider`, in ascending `wal_id`
/// order, applying frames in the order they were written.
#[instrument(level = "info", skip(provider))]
pub fn recover(provider: &dyn BlockProvider) -> Result<RecoveryOutcome> {
    let mut outcome = RecoveryOutcome::empty();
    let wal_ids = provider.list_wals()?;

    for wal_id in wal_ids {
        let mut reader = provider.get_reader(wal_id, 0)?;
        let bytes = reader.read_to_end()?;
        let mut offset = 0usize;

        loop {
            if offset == bytes.len() {
                break;
            }
            match Frame::decode(&bytes[offset..]) {
                Ok((frame, consumed)) => {
                    outcome.frame_count += 1;
                    outcome.max_txn_id = outcome.max_txn_id.max(frame.txn_id);
                    outcome.root_id = Some(frame.new_root_id);
                    offset += consumed;
                }
                Err(err) => {
                    warn!(
                        wal_id,
                        offset,
                        error = %err,
                        "torn or corrupt frame tail, truncating replay here"
                    );
                    outcome.truncated_at = Some((wal_id, offset as u64));
                    return finish(outcome);
                }
            }
        }
    }

    finish(outcome)
}

fn finish(outcome: RecoveryOutcome) -> Result<RecoveryOutcome> {
    info!(
        frame_count = outcome.frame_count,
        max_txn_id = outcome.max_txn_id,
        truncated = outcome.truncated_at.is_some(),
        "recovery complete"
    );
    Ok(outcome)
}

/// Distinguish a torn tail (safe to truncate, expected after a crash mid
/// append) from a genuinely corrupt interior frame. Callers that want to
/// treat interior corruption as fatal can match on this after a failed
/// [`recover`] call — though `recover` itself never returns `Err`, since a
/// torn tail is swallowed into `truncated_at`. This helper exists for
/// lower layers that decode an individual frame directly.
pub fn is_recoverable_tail_error(err: &WalError) -> bool {
    matches!(err, WalError::CorruptFrame(_) | WalError::BadMagic | WalError::ChecksumMismatch)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::writer::WalWriter;
    use protobase_atom::{Atom, AtomTag, Value};
    use protobase_storage::MemoryBlockProvider;
    use std::sync::Arc;

    fn value_atom(s: &str) -> Atom {
        let mut body = Vec::new();
        Value::Str(s.into()).encode(&mut body);
        Atom { tag: AtomTag::Value, body, refs: vec![] }
    }

    #[test]
    fn replays_committed_frames_in_order() {
        let provider: Arc<dyn BlockProvider> = Arc::new(MemoryBlockProvider::new(4096));
        let writer = WalWriter::new(provider.clone(), 0);

        let root1 = AtomId::of(b"root-1");
        let root2 = AtomId::of(b"root-2");
        let txn0 = writer.reserve_txn_id();
        writer.append_frame(txn0, vec![value_atom("a")], root1).unwrap();
        let txn1 = writer.reserve_txn_id();
        writer.append_frame(txn1, vec![value_atom("b")], root2).unwrap();
        writer.sync().unwrap();

        let outcome = recover(provider.as_ref()).unwrap();
        assert_eq!(outcome.frame_count, 2);
        assert_eq!(outcome.max_txn_id, 1);
        assert_eq!(outcome.root_id, Some(root2));
        assert!(outcome.truncated_at.is_none());
    }

    #[test]
    fn empty_log_recovers_to_no_root() {
        let provider = MemoryBlockProvider::new(4096);
        let outcome = recover(&provider).unwrap();
        assert_eq!(outcome, RecoveryOutcome::empty());
    }

    #[test]
    fn torn_tail_truncates_without_failing_recovery() {
        let provider: Arc<dyn BlockProvider> = Arc::new(MemoryBlockProvider::new(4096));
        let writer = WalWriter::new(provider.clone(), 0);
        let root1 = AtomId::of(b"root-1");
        let txn0 = writer.reserve_txn_id();
        writer.append_frame(txn0, vec![value_atom("a")], root1).unwrap();

        // Simulate a crash mid-write: append a truncated, bogus second frame.
        provider.append(&[b'P', b'B', b'F', b'R', 0, 1, 2]).unwrap();

        let outcome = recover(provider.as_ref()).unwrap();
        assert_eq!(outcome.frame_count, 1);
        assert_eq!(outcome.root_id, Some(root1));
        assert!(outcome.truncated_at.is_some());
    }
}
