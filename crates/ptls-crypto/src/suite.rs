//! The single cipher suite spoken by the lock.
//!
//! ECDH-P256 key agreement, HMAC-SHA256 traffic secrets, AES-128-GCM records
//! and ECDSA-P256-SHA256 signatures. This module ties the primitives together
//! into the one call the handshake needs: turning a secret, a label and a
//! transcript hash into a ready [`MessageCipher`].

use crate::aead::{CipherMode, MessageCipher};
use crate::kdf::{derive_traffic_secret, TrafficLabel};
use crate::Result;

pub use crate::aead::TAG_LEN;
pub use crate::point::{ENCODED_POINT_LEN, FIELD_SIZE};
pub use crate::transcript::HASH_LEN;

/// Which side of the channel a cipher is being derived for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// The mobile client (initiator).
    Client,
    /// The lock (responder).
    Lock,
}

impl Role {
    /// Mode a cipher protecting `label` runs in for this role.
    ///
    /// Client-labelled secrets are written by the client and read by the
    /// lock, and vice versa.
    pub fn mode_for(self, label: TrafficLabel) -> CipherMode {
        match (self, label.is_client()) {
            (Self::Client, true) | (Self::Lock, false) => CipherMode::Encrypt,
            (Self::Client, false) | (Self::Lock, true) => CipherMode::Decrypt,
        }
    }
}

/// Derive the cipher for `label`, bound to `transcript_hash`.
///
/// The intermediate traffic secret is zeroed before returning.
pub fn derive_cipher(
    secret: &[u8],
    label: TrafficLabel,
    transcript_hash: &[u8],
    mode: CipherMode,
) -> Result<MessageCipher> {
    let traffic_secret = derive_traffic_secret(secret, label, transcript_hash)?;
    MessageCipher::new(&traffic_secret, mode)
}

/// Derive the cipher for `label` in the direction `role` uses it.
pub fn derive_cipher_for(
    role: Role,
    secret: &[u8],
    label: TrafficLabel,
    transcript_hash: &[u8],
) -> Result<MessageCipher> {
    derive_cipher(secret, label, transcript_hash, role.mode_for(label))
}
