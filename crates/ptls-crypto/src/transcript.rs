//! Running handshake transcript.

use sha2::{Digest, Sha256};

/// Length of a transcript hash in bytes.
pub const HASH_LEN: usize = 32;

/// Append-only SHA-256 over every handshake byte sent or received.
///
/// Snapshots taken with [`Transcript::hash`] do not disturb the running
/// state, so later messages keep extending the same digest.
#[derive(Clone, Default)]
pub struct Transcript {
    hasher: Sha256,
    len: usize,
}

impl Transcript {
    /// Create an empty transcript.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append handshake bytes in wire order.
    pub fn append(&mut self, bytes: &[u8]) {
        self.hasher.update(bytes);
        self.len += bytes.len();
    }

    /// Hash of everything appended so far.
    pub fn hash(&self) -> [u8; HASH_LEN] {
        self.hasher.clone().finalize().into()
    }

    /// Number of bytes appended so far.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether nothing has been appended yet.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl core::fmt::Debug for Transcript {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Transcript").field("len", &self.len).finish()
    }
}
