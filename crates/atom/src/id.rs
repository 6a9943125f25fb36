//! Content-addressed atom identity.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The byte width of an [`AtomId`]: a 128-bit BLAKE3-derived content hash.
pub const ATOM_ID_LEN: usize = 16;

/// Stable 128-bit identity of an atom.
///
/// Two atoms with equal logical content hash to equal identity
/// (spec invariant: content addressing). `AtomId::NIL` is reserved as the
/// "no child" sentinel in tree node refs (e.g. a List leaf's left/right).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AtomId(pub [u8; ATOM_ID_LEN]);

impl AtomId {
    /// Sentinel identity meaning "no atom" (e.g. an absent child pointer).
    pub const NIL: AtomId = AtomId([0u8; ATOM_ID_LEN]);

    /// Derive the content identity of `bytes` (the canonical encoding of an
    /// atom's tag + body + refs, see [`crate::atom::Atom::canonical_bytes`]).
    pub fn of(bytes: &[u8]) -> Self {
        let hash = blake3::hash(bytes);
        let mut id = [0u8; ATOM_ID_LEN];
        id.copy_from_slice(&hash.as_bytes()[..ATOM_ID_LEN]);
        AtomId(id)
    }

    /// Whether this is the nil sentinel.
    pub fn is_nil(&self) -> bool {
        *self == AtomId::NIL
    }

    /// Raw bytes of the identity.
    pub fn as_bytes(&self) -> &[u8; ATOM_ID_LEN] {
        &self.0
    }
}

impl fmt::Display for AtomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

/// Error returned when parsing an [`AtomId`] from a hex string fails.
#[derive(Debug, thiserror::Error)]
#[error("invalid atom id: {0}")]
pub struct ParseAtomIdError(String);

impl FromStr for AtomId {
    type Err = ParseAtomIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != ATOM_ID_LEN * 2 {
            return Err(ParseAtomIdError(s.to_string()));
        }
        let mut bytes = [0u8; ATOM_ID_LEN];
        for i in 0..ATOM_ID_LEN {
            let byte = u8::from_str_radix(&s[i * 2..i * 2 + 2], 16)
                .map_err(|_| ParseAtomIdError(s.to_string()))?;
            bytes[i] = byte;
        }
        Ok(AtomId(bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_content_hashes_to_equal_identity() {
        let a = AtomId::of(b"hello world");
        let b = AtomId::of(b"hello world");
        assert_eq!(a, b);
    }

    #[test]
    fn different_content_hashes_differ() {
        assert_ne!(AtomId::of(b"a"), AtomId::of(b"b"));
    }

    #[test]
    fn display_and_parse_round_trip() {
        let id = AtomId::of(b"round trip me");
        let text = id.to_string();
        let parsed: AtomId = text.parse().unwrap();
        assert_eq!(id, parsed);
    }
}
